//! Real-transform pre/post processing.
//!
//! A forward real transform of length `2m` runs as an m-point complex
//! transform over packed even/odd pairs plus a twist into the Hermitian
//! half-spectrum (`real_pre_process_kernel_inplace`); the inverse twist
//! (`real_post_process_kernel_inplace`) undoes it ahead of the m-point
//! inverse passes. Both handle the paired indices `(k, m-k)` per thread,
//! with explicit branches for the k = 0 edge and, when `m` is even, the
//! self-paired quarter point.

use crate::ast::{ident, num, Expr, Stmt};
use runfft_core::kernels::RealTwistSpec;
use runfft_core::{Direction, EmbeddedKind, StockhamSpec};

/// In-LDS twist device function for fused kernels. `idx_q` doubles as the
/// half-length `m` when `idx_p` is zero, so no extra parameter is needed.
pub fn twist_device_function(direction: Direction) -> String {
    match direction {
        Direction::Forward => FORWARD_TWIST.to_string(),
        Direction::Inverse => INVERSE_TWIST.to_string(),
    }
}

const FORWARD_TWIST: &str = r#"__device__ void real_pre_process_kernel_inplace(
    const size_t idx_p,
    const size_t idx_q,
    const size_t quarter_N,
    scalar_type* lds,
    const scalar_type* twd,
    const bool Ndiv4)
{
    if(idx_p == 0)
    {
        const scalar_type y0 = lds[0];
        lds[0].x = y0.x + y0.y;
        lds[0].y = 0;
        lds[idx_q].x = y0.x - y0.y;
        lds[idx_q].y = 0;
        if(Ndiv4)
            lds[quarter_N].y = -lds[quarter_N].y;
    }
    else if(idx_p < quarter_N)
    {
        const scalar_type p = lds[idx_p];
        const scalar_type q = lds[idx_q];
        const scalar_type w = twd[idx_p];
        scalar_type u;
        u.x = (p.x + q.x) * 0.5;
        u.y = (p.y - q.y) * 0.5;
        scalar_type v;
        v.x = (p.x - q.x) * 0.5;
        v.y = (p.y + q.y) * 0.5;
        const real_type zx = w.x * v.x - w.y * v.y;
        const real_type zy = w.x * v.y + w.y * v.x;
        lds[idx_p].x = u.x + zy;
        lds[idx_p].y = u.y - zx;
        lds[idx_q].x = u.x - zy;
        lds[idx_q].y = -u.y - zx;
    }
}
"#;

const INVERSE_TWIST: &str = r#"__device__ void real_post_process_kernel_inplace(
    const size_t idx_p,
    const size_t idx_q,
    const size_t quarter_N,
    scalar_type* lds,
    const scalar_type* twd,
    const bool Ndiv4)
{
    if(idx_p == 0)
    {
        const scalar_type h0 = lds[0];
        const scalar_type hm = lds[idx_q];
        lds[0].x = h0.x + hm.x;
        lds[0].y = h0.x - hm.x;
        if(Ndiv4)
        {
            lds[quarter_N].x = lds[quarter_N].x * 2;
            lds[quarter_N].y = lds[quarter_N].y * -2;
        }
    }
    else if(idx_p < quarter_N)
    {
        const scalar_type p = lds[idx_p];
        const scalar_type q = lds[idx_q];
        const scalar_type w = twd[idx_p];
        scalar_type a;
        a.x = p.x + q.x;
        a.y = p.y - q.y;
        scalar_type b;
        b.x = p.x - q.x;
        b.y = p.y + q.y;
        const real_type zx = w.x * b.x - w.y * b.y;
        const real_type zy = w.x * b.y + w.y * b.x;
        lds[idx_p].x = a.x - zy;
        lds[idx_p].y = a.y + zx;
        lds[idx_q].x = a.x + zy;
        lds[idx_q].y = -a.y + zx;
    }
}
"#;

/// Per-block twist invocations for a fused kernel: each transform's
/// thread group covers the quarter-length pair range, calling the twist
/// once per chunk with the appropriate pair indices.
pub fn embedded_calls(spec: &StockhamSpec, kind: EmbeddedKind) -> Vec<Stmt> {
    let m = spec.length;
    let quarter = m / 2 + m % 2;
    let tpt = spec.threads_per_transform;
    let calls = quarter.div_ceil(tpt);
    let fn_name = match kind {
        EmbeddedKind::RealPre => "real_pre_process_kernel_inplace",
        EmbeddedKind::RealPost => "real_post_process_kernel_inplace",
        EmbeddedKind::None => return Vec::new(),
    };
    let ndiv4 = if m % 2 == 0 { "true" } else { "false" };

    let mut out = Vec::new();
    out.push(Stmt::SyncThreads);
    for i in 0..calls {
        let local = ident("threadIdx.x") % num(tpt);
        let (p, q) = if i == 0 {
            (local.clone(), num(m) - local)
        } else {
            (local.clone() + num(i * tpt), num(m) - local - num(i * tpt))
        };
        out.push(Stmt::CallStmt(
            fn_name.to_string(),
            vec![
                p,
                q,
                num(quarter),
                ident("lds_complex") + ident("offset_lds"),
                ident("twiddles") + num(m - 1),
                Expr::Raw(ndiv4.into()),
            ],
        ));
    }
    out.push(Stmt::SyncThreads);
    out
}

/// Name of the standalone twist kernel for a spec.
pub fn twist_kernel_base_name(spec: &RealTwistSpec) -> String {
    match spec.direction {
        Direction::Forward => format!("real_pre_process_length{}", 2 * spec.half_length),
        Direction::Inverse => format!("real_post_process_length{}", 2 * spec.half_length),
    }
}

/// Standalone twist kernel for half-lengths too large to fuse: one thread
/// per index pair, reading the packed spectrum and writing the Hermitian
/// half-spectrum (or the reverse).
pub fn standalone_global(spec: &RealTwistSpec) -> String {
    let m = spec.half_length;
    let quarter = m / 2 + m % 2;
    let ndiv4 = m % 2 == 0;
    let name = twist_kernel_base_name(spec);
    let forward = spec.direction == Direction::Forward;

    let pair_body = if forward {
        r#"        const scalar_type p = load_global(ibuf, in_base + k * stride_in[0], load_cb_fn, load_cb_data);
        const scalar_type q = load_global(ibuf, in_base + (HALF_N - k) * stride_in[0], load_cb_fn, load_cb_data);
        const scalar_type w = twiddles[k];
        scalar_type u;
        u.x = (p.x + q.x) * 0.5;
        u.y = (p.y - q.y) * 0.5;
        scalar_type v;
        v.x = (p.x - q.x) * 0.5;
        v.y = (p.y + q.y) * 0.5;
        const real_type zx = w.x * v.x - w.y * v.y;
        const real_type zy = w.x * v.y + w.y * v.x;
        scalar_type hp;
        hp.x = u.x + zy;
        hp.y = u.y - zx;
        scalar_type hq;
        hq.x = u.x - zy;
        hq.y = -u.y - zx;
        store_global(obuf, out_base + k * stride_out[0], hp, store_cb_fn, store_cb_data);
        store_global(obuf, out_base + (HALF_N - k) * stride_out[0], hq, store_cb_fn, store_cb_data);"#
    } else {
        r#"        const scalar_type p = load_global(ibuf, in_base + k * stride_in[0], load_cb_fn, load_cb_data);
        const scalar_type q = load_global(ibuf, in_base + (HALF_N - k) * stride_in[0], load_cb_fn, load_cb_data);
        const scalar_type w = twiddles[k];
        scalar_type a;
        a.x = p.x + q.x;
        a.y = p.y - q.y;
        scalar_type b;
        b.x = p.x - q.x;
        b.y = p.y + q.y;
        const real_type zx = w.x * b.x - w.y * b.y;
        const real_type zy = w.x * b.y + w.y * b.x;
        scalar_type yp;
        yp.x = a.x - zy;
        yp.y = a.y + zx;
        scalar_type yq;
        yq.x = a.x + zy;
        yq.y = -a.y + zx;
        store_global(obuf, out_base + k * stride_out[0], yp, store_cb_fn, store_cb_data);
        store_global(obuf, out_base + (HALF_N - k) * stride_out[0], yq, store_cb_fn, store_cb_data);"#
    };

    let zero_body = if forward {
        r#"        const scalar_type y0 = load_global(ibuf, in_base, load_cb_fn, load_cb_data);
        scalar_type h0;
        h0.x = y0.x + y0.y;
        h0.y = 0;
        scalar_type hm;
        hm.x = y0.x - y0.y;
        hm.y = 0;
        store_global(obuf, out_base, h0, store_cb_fn, store_cb_data);
        store_global(obuf, out_base + HALF_N * stride_out[0], hm, store_cb_fn, store_cb_data);"#
    } else {
        r#"        const scalar_type h0 = load_global(ibuf, in_base, load_cb_fn, load_cb_data);
        const scalar_type hm = load_global(ibuf, in_base + HALF_N * stride_in[0], load_cb_fn, load_cb_data);
        scalar_type y0;
        y0.x = h0.x + hm.x;
        y0.y = h0.x - hm.x;
        store_global(obuf, out_base, y0, store_cb_fn, store_cb_data);"#
    };

    let quarter_body = if forward {
        r#"        scalar_type hq = load_global(ibuf, in_base + QUARTER_N * stride_in[0], load_cb_fn, load_cb_data);
        hq.y = -hq.y;
        store_global(obuf, out_base + QUARTER_N * stride_out[0], hq, store_cb_fn, store_cb_data);"#
    } else {
        r#"        scalar_type yq = load_global(ibuf, in_base + QUARTER_N * stride_in[0], load_cb_fn, load_cb_data);
        yq.x = yq.x * 2;
        yq.y = yq.y * -2;
        store_global(obuf, out_base + QUARTER_N * stride_out[0], yq, store_cb_fn, store_cb_data);"#
    };

    let quarter_block = if ndiv4 {
        format!("    if(k == 0)\n    {{\n{quarter_body}\n    }}\n")
    } else {
        String::new()
    };

    format!(
        r#"__global__ void __launch_bounds__(64) {name}(
    const scalar_type* twiddles,
    const size_t dim,
    const size_t* lengths,
    const size_t* stride_in,
    const size_t* stride_out,
    const size_t nbatch,
    void* load_cb_fn,
    void* load_cb_data,
    uint32_t load_cb_lds_bytes,
    void* store_cb_fn,
    void* store_cb_data,
    const scalar_type* ibuf,
    scalar_type* obuf)
{{
    const size_t HALF_N = {m};
    const size_t QUARTER_N = {quarter};
    const size_t blocks_per_batch = (QUARTER_N + 63) / 64;
    const size_t batch = blockIdx.x / blocks_per_batch;
    const size_t k = (blockIdx.x % blocks_per_batch) * 64 + threadIdx.x;
    if(batch >= nbatch || k >= QUARTER_N)
        return;
    const size_t in_base = batch * stride_in[dim];
    const size_t out_base = batch * stride_out[dim];
    if(k == 0)
    {{
{zero_body}
    }}
{quarter_block}    if(k > 0)
    {{
{pair_body}
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::Precision;

    #[test]
    fn twist_functions_pair_symmetric_indices() {
        let fwd = twist_device_function(Direction::Forward);
        assert!(fwd.contains("real_pre_process_kernel_inplace"));
        assert!(fwd.contains("lds[idx_q].y = -u.y - zx;"));
        let inv = twist_device_function(Direction::Inverse);
        assert!(inv.contains("real_post_process_kernel_inplace"));
        assert!(inv.contains("lds[idx_q].y = -a.y + zx;"));
    }

    #[test]
    fn embedded_calls_cover_the_quarter_range() {
        use runfft_core::{ArrayLayout, Placement};
        let spec = StockhamSpec::derive_row(
            64,
            Precision::F32,
            Placement::InPlace,
            ArrayLayout::Real,
            ArrayLayout::HermitianInterleaved,
            Direction::Forward,
            EmbeddedKind::RealPre,
        )
        .unwrap();
        let stmts = embedded_calls(&spec, EmbeddedKind::RealPre);
        // quarter = 32, tpt = 16 -> two calls plus the bracketing syncs.
        let calls = stmts
            .iter()
            .filter(|s| matches!(s, Stmt::CallStmt(name, _) if name.contains("real_pre")))
            .count();
        assert_eq!(calls, 2);
        assert!(matches!(stmts.first(), Some(Stmt::SyncThreads)));
        assert!(matches!(stmts.last(), Some(Stmt::SyncThreads)));
    }

    #[test]
    fn standalone_twist_handles_the_edges() {
        let spec = RealTwistSpec {
            half_length: 4096,
            precision: Precision::F32,
            direction: Direction::Forward,
        };
        let text = standalone_global(&spec);
        assert!(text.contains("real_pre_process_length8192"));
        assert!(text.contains("if(k == 0)"));
        assert!(text.contains("QUARTER_N = 2048"));
        // Even half-length: the quarter point is self-paired.
        assert!(text.contains("hq.y = -hq.y;"));
    }

    #[test]
    fn odd_half_length_skips_the_quarter_point() {
        let spec = RealTwistSpec {
            half_length: 5,
            precision: Precision::F64,
            direction: Direction::Inverse,
        };
        let text = standalone_global(&spec);
        assert!(!text.contains("yq.y = yq.y * -2;"));
    }
}
