//! Stockham kernel generation.
//!
//! Each kernel identity produces two functions: a device function running
//! the radix passes through LDS, and a global kernel that computes
//! offsets, stages global memory through LDS (or registers under
//! `half_lds`) and invokes the device function. The pass structure
//! follows the autosort scheme: every pass multiplies the working height
//! by its radix, keeping intermediate data naturally ordered.

use crate::ast::{call, decl_array, decl_init, ident, num, Expr, Function, Stmt};
use crate::butterfly::butterfly_name;
use crate::real;
use crate::tiling::{self, KernelTiling};
use runfft_core::{Direction, EmbeddedKind, Precision, StockhamSpec, Tiling};

pub fn direction_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "fwd",
        Direction::Inverse => "inv",
    }
}

/// Base name of the kernel pair for a spec.
pub fn kernel_base_name(spec: &StockhamSpec) -> String {
    let mut name = format!(
        "{}_length{}",
        direction_prefix(spec.direction),
        spec.length
    );
    if let Some(l2) = spec.length2 {
        name.push_str(&format!("x{l2}"));
    }
    name.push('_');
    name.push_str(spec.tiling.name());
    if let Some(v) = spec.sbrc_variant {
        name.push_str(match v {
            runfft_core::SbrcVariant::Tile2D => "_2d",
            runfft_core::SbrcVariant::XyZ => "_xy_z",
            runfft_core::SbrcVariant::ZXy => "_z_xy",
        });
    }
    name
}

pub fn device_function_name(spec: &StockhamSpec) -> String {
    format!("{}_device", kernel_base_name(spec))
}

/// Statements `generator(h, hr, dt)` repeated to cover `length/width`
/// butterflies with `threads_per_transform` threads, adding guarded tail
/// iterations when threads don't divide the work evenly.
fn add_work(
    spec: &StockhamSpec,
    width: usize,
    guard: bool,
    mut generator: impl FnMut(usize, usize, usize) -> Vec<Stmt>,
) -> Vec<Stmt> {
    let length = spec.length;
    let tpt = spec.threads_per_transform;
    let height = length as f64 / width as f64 / tpt as f64;
    let mut iheight = height.floor() as usize;
    if height > iheight as f64 && tpt > length / width {
        iheight += 1;
    }

    let mut work = Vec::new();
    for h in 0..iheight {
        work.extend(generator(h, h, 0));
    }

    let mut stmts = Vec::new();
    if guard && !work.is_empty() {
        stmts.push(Stmt::Comment(
            "more than enough threads, some do nothing".into(),
        ));
        let cond = if tpt != length / width {
            ident("write").and(ident("thread").lt(num(length / width)))
        } else {
            ident("write")
        };
        stmts.push(Stmt::If {
            cond,
            then: work,
            otherwise: vec![],
        });
    } else {
        stmts.extend(work);
    }

    if height > iheight as f64 && tpt < length / width {
        stmts.push(Stmt::Comment(
            "not enough threads, some threads do extra work".into(),
        ));
        let dt = iheight * tpt;
        let tail = generator(0, iheight, dt);
        stmts.push(Stmt::If {
            cond: ident("write").and((ident("thread") + num(dt)).lt(num(length / width))),
            then: tail,
            otherwise: vec![],
        });
    }
    stmts
}

fn tid_expr(h: usize, dt: usize, tpt: usize) -> Expr {
    let mut e = ident("thread");
    let add = dt + h * tpt;
    if add > 0 {
        e = e + num(add);
    }
    e
}

#[derive(Clone, Copy, PartialEq)]
enum Component {
    None,
    X,
    Y,
}

fn lds_name(component: Component) -> &'static str {
    match component {
        Component::None => "lds_complex",
        _ => "lds_real",
    }
}

fn reg(hr: usize, width: usize, w: usize, component: Component) -> Expr {
    let r = ident("R").index(num(hr * width + w));
    match component {
        Component::None => r,
        Component::X => r.member("x"),
        Component::Y => r.member("y"),
    }
}

fn load_lds(spec: &StockhamSpec, width: usize, component: Component) -> impl FnMut(usize, usize, usize) -> Vec<Stmt> + '_ {
    move |h, hr, dt| {
        let mut out = Vec::new();
        for w in 0..width {
            let tid = tid_expr(h, dt, spec.threads_per_transform);
            let idx = ident("offset_lds") + (tid + num(w * (spec.length / width))) * ident("lstride");
            out.push(Stmt::Assign(
                reg(hr, width, w, component),
                ident(lds_name(component)).index(idx),
            ));
        }
        out
    }
}

fn store_lds(
    spec: &StockhamSpec,
    width: usize,
    cumheight: usize,
    component: Component,
) -> impl FnMut(usize, usize, usize) -> Vec<Stmt> + '_ {
    move |h, hr, dt| {
        let mut out = Vec::new();
        for w in 0..width {
            let tid = tid_expr(h, dt, spec.threads_per_transform);
            let idx = ident("offset_lds")
                + ((tid.clone() / num(cumheight)) * num(width * cumheight)
                    + tid % num(cumheight)
                    + num(w * cumheight))
                    * ident("lstride");
            out.push(Stmt::Assign(
                ident(lds_name(component)).index(idx),
                reg(hr, width, w, component),
            ));
        }
        out
    }
}

fn apply_twiddle(
    spec: &StockhamSpec,
    width: usize,
    cumheight: usize,
) -> impl FnMut(usize, usize, usize) -> Vec<Stmt> + '_ {
    move |h, hr, dt| {
        let mut out = Vec::new();
        for w in 1..width {
            let tid = tid_expr(h, dt, spec.threads_per_transform);
            let tidx = num(cumheight - 1)
                + num(w - 1)
                + num(width - 1) * (tid % num(cumheight));
            let r = reg(hr, width, w, Component::None);
            out.push(Stmt::Assign(ident("W"), ident("twiddles").index(tidx)));
            out.push(Stmt::Assign(
                ident("t"),
                call("twiddle_mul", vec![r.clone(), ident("W")]),
            ));
            out.push(Stmt::Assign(r, ident("t")));
        }
        out
    }
}

fn butterfly(spec: &StockhamSpec, width: usize) -> impl FnMut(usize, usize, usize) -> Vec<Stmt> + '_ {
    let name = butterfly_name(width, spec.direction);
    move |_h, hr, _dt| {
        vec![Stmt::CallStmt(
            name.clone(),
            vec![ident("R") + num(hr * width)],
        )]
    }
}

/// Multiply the final-pass registers by the outer (large) roots, indexed
/// by the output position within the transform and the block column.
fn large_twiddle_multiply(
    spec: &StockhamSpec,
    width: usize,
    cumheight: usize,
) -> impl FnMut(usize, usize, usize) -> Vec<Stmt> + '_ {
    move |h, hr, dt| {
        let mut out = Vec::new();
        for w in 0..width {
            let tid = tid_expr(h, dt, spec.threads_per_transform);
            let pos = (tid.clone() / num(cumheight)) * num(width * cumheight)
                + tid % num(cumheight)
                + num(w * cumheight);
            let r = reg(hr, width, w, Component::None);
            out.push(Stmt::Assign(
                ident("t"),
                call(
                    "twiddle_mul",
                    vec![
                        r.clone(),
                        ident("large_twd").index(pos * ident("ltwd_cols") + ident("ltwd_col")),
                    ],
                ),
            ));
            out.push(Stmt::Assign(r, ident("t")));
        }
        out
    }
}

/// The per-identity device function: radix passes through LDS.
pub fn generate_device_function(spec: &StockhamSpec) -> Function {
    let mut f = Function::device(device_function_name(spec))
        .arg("scalar_type*", "R")
        .arg("real_type*", "lds_real")
        .arg("scalar_type*", "lds_complex")
        .arg("const scalar_type*", "twiddles")
        .arg("const size_t", "stride_lds")
        .arg("unsigned int", "offset_lds")
        .arg("bool", "write");
    if spec.large_twiddle {
        f = f
            .arg("const scalar_type*", "large_twd")
            .arg("const size_t", "ltwd_cols")
            .arg("const size_t", "ltwd_col");
    }
    if spec.length == 1 {
        return f;
    }

    let body = &mut f.body;
    body.push(decl_init(
        "size_t",
        "thread",
        ident("threadIdx.x") % num(spec.threads_per_transform),
    ));
    body.push(crate::ast::decl("scalar_type", "W"));
    body.push(crate::ast::decl("scalar_type", "t"));
    // Unit for row kernels; the fused 2-D column pass runs strided.
    body.push(decl_init("const size_t", "lstride", ident("stride_lds")));

    let mut cumheight = 1usize;
    let nfactors = spec.factors.len();
    for (npass, &width) in spec.factors.iter().enumerate() {
        let height = spec.length as f64 / width as f64 / spec.threads_per_transform as f64;
        body.push(Stmt::Blank);
        body.push(Stmt::Comment(format!(
            "pass {npass}, width {width}: {} threads do {} radix-{width} butterflies, {height} each",
            spec.threads_per_transform,
            spec.length / width,
        )));
        body.push(Stmt::SyncThreads);

        if spec.half_lds {
            // Registers carry the data between passes; the X/Y staging
            // below moves only one component through LDS at a time.
            if npass > 0 {
                body.extend(add_work(spec, width, false, apply_twiddle(spec, width, cumheight)));
            }
        } else {
            body.extend(add_work(spec, width, false, load_lds(spec, width, Component::None)));
            if npass > 0 {
                body.extend(add_work(spec, width, false, apply_twiddle(spec, width, cumheight)));
            }
        }

        body.extend(add_work(spec, width, false, butterfly(spec, width)));

        if npass + 1 == nfactors && spec.large_twiddle {
            body.extend(add_work(
                spec,
                width,
                false,
                large_twiddle_multiply(spec, width, cumheight),
            ));
        }

        if spec.half_lds {
            if npass + 1 < nfactors {
                let next_width = spec.factors[npass + 1];
                for component in [Component::X, Component::Y] {
                    body.extend(add_work(
                        spec,
                        width,
                        true,
                        store_lds(spec, width, cumheight, component),
                    ));
                    body.push(Stmt::SyncThreads);
                    body.extend(add_work(spec, next_width, false, load_lds(spec, next_width, component)));
                    body.push(Stmt::SyncThreads);
                }
            }
        } else {
            body.push(Stmt::SyncThreads);
            body.extend(add_work(
                spec,
                width,
                true,
                store_lds(spec, width, cumheight, Component::None),
            ));
        }
        cumheight *= width;
    }
    f
}

/// Register-direct global load/store used under `half_lds`: the edge
/// width's access pattern, with guarded tails, one statement per element.
/// The generator receives `(tid, register, w)`.
pub(crate) fn register_edge_work(
    spec: &StockhamSpec,
    width: usize,
    mut generator: impl FnMut(Expr, usize, usize) -> Stmt,
) -> Vec<Stmt> {
    let length = spec.length;
    let tpt = spec.threads_per_transform;
    let height = length as f64 / width as f64 / tpt as f64;
    let mut iheight = height.floor() as usize;
    if height > iheight as f64 && tpt > length / width {
        iheight += 1;
    }

    let mut stmts = Vec::new();
    let mut work = Vec::new();
    for h in 0..iheight {
        for w in 0..width {
            work.push(generator(tid_expr(h, 0, tpt), h * width + w, w));
        }
    }
    if tpt != length / width {
        stmts.push(Stmt::If {
            cond: ident("write").and(ident("thread").lt(num(length / width))),
            then: work,
            otherwise: vec![],
        });
    } else {
        stmts.extend(work);
    }
    if height > iheight as f64 && tpt < length / width {
        let dt = iheight * tpt;
        let mut tail = Vec::new();
        for w in 0..width {
            tail.push(generator(tid_expr(0, dt, tpt), iheight * width + w, w));
        }
        stmts.push(Stmt::If {
            cond: ident("write").and((ident("thread") + num(dt)).lt(num(length / width))),
            then: tail,
            otherwise: vec![],
        });
    }
    stmts
}

/// Arguments shared by every global kernel: twiddles, runtime shape,
/// callback hooks, then the buffers for the spec's layouts.
pub(crate) fn global_args_for(spec: &StockhamSpec, f: Function) -> Function {
    global_args(spec, f)
}

fn global_args(spec: &StockhamSpec, f: Function) -> Function {
    let mut f = f
        .arg("const scalar_type*", "twiddles")
        .arg("const size_t", "dim")
        .arg("const size_t*", "lengths")
        .arg("const size_t*", "stride_in")
        .arg("const size_t*", "stride_out")
        .arg("const size_t", "nbatch")
        .arg("const unsigned int", "lds_padding")
        .arg("void*", "load_cb_fn")
        .arg("void*", "load_cb_data")
        .arg("uint32_t", "load_cb_lds_bytes")
        .arg("void*", "store_cb_fn")
        .arg("void*", "store_cb_data");
    if spec.large_twiddle {
        f = f.arg("const scalar_type*", "large_twiddles");
    }
    for (ty, name) in tiling::buffer_args(spec) {
        f = f.arg(&ty, &name);
    }
    f
}

/// The per-identity global kernel.
pub fn generate_global_function(spec: &StockhamSpec) -> Function {
    if spec.tiling == Tiling::Single2D && spec.length2.is_some() {
        return tiling::single_2d_global(spec);
    }
    let tiling = tiling::for_spec(spec);
    let mut f = global_args(
        spec,
        Function::global(kernel_base_name(spec), spec.threads_per_block),
    );
    let lds_elems = lds_declaration_elems(spec);
    let body = &mut f.body;

    body.push(Stmt::Comment(format!(
        "this kernel: {} threads per transform, {} transforms per block",
        spec.threads_per_transform, spec.transforms_per_block
    )));
    body.push(decl_array("scalar_type", "R", spec.nregisters()));
    if spec.half_lds {
        body.push(Stmt::Raw(format!(
            "__shared__ real_type lds_real[{lds_elems}];"
        )));
        body.push(Stmt::Raw(
            "scalar_type* lds_complex = nullptr;".to_string(),
        ));
    } else {
        body.push(Stmt::Raw(format!(
            "__shared__ scalar_type lds_complex[{lds_elems}];"
        )));
        body.push(Stmt::Raw(
            "real_type* lds_real = reinterpret_cast<real_type*>(lds_complex);".to_string(),
        ));
    }
    body.push(decl_init("size_t", "offset_in", num(0)));
    body.push(decl_init("size_t", "offset_out", num(0)));
    body.push(crate::ast::decl("unsigned int", "offset_lds"));
    body.push(crate::ast::decl("size_t", "batch"));
    body.push(crate::ast::decl("size_t", "transform"));
    body.push(crate::ast::decl("size_t", "thread"));
    body.push(decl_init("bool", "write", Expr::Raw("true".into())));
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("offsets".into()));
    body.extend(tiling.calculate_offsets(spec));
    body.push(Stmt::If {
        cond: ident("batch").ge(ident("nbatch")),
        then: vec![Stmt::Return],
        otherwise: vec![],
    });
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("load global".into()));
    body.extend(tiling.load_from_global(spec));
    body.push(Stmt::Blank);

    if spec.embedded == EmbeddedKind::RealPost {
        body.push(Stmt::Comment(
            "inverse real transform: twist the Hermitian spectrum in lds before the passes".into(),
        ));
        body.extend(real::embedded_calls(spec, EmbeddedKind::RealPost));
        body.push(Stmt::Blank);
    }

    body.push(Stmt::Comment("transform".into()));
    let mut dev_args = vec![
        ident("R"),
        ident("lds_real"),
        ident("lds_complex"),
        ident("twiddles"),
        Expr::Num(1),
        ident("offset_lds"),
        ident("write"),
    ];
    if spec.large_twiddle {
        dev_args.push(ident("large_twiddles"));
        dev_args.push(ident("lengths").index(num(1)));
        dev_args.push(ident("ltwd_col"));
    }
    body.push(Stmt::CallStmt(device_function_name(spec), dev_args));
    body.push(Stmt::Blank);

    if spec.embedded == EmbeddedKind::RealPre {
        body.push(Stmt::Comment(
            "forward real transform: twist into the Hermitian half-spectrum after the passes".into(),
        ));
        body.extend(real::embedded_calls(spec, EmbeddedKind::RealPre));
        body.push(Stmt::Blank);
    }

    body.push(Stmt::Comment("store global".into()));
    body.push(Stmt::SyncThreads);
    body.extend(tiling.store_to_global(spec));
    f
}

/// LDS elements one block needs, padded for the Hermitian extra slot on
/// embedded real kernels.
fn lds_declaration_elems(spec: &StockhamSpec) -> usize {
    let per_transform = match spec.embedded {
        EmbeddedKind::None => spec.length,
        _ => spec.length + 1,
    };
    match spec.tiling {
        Tiling::Single2D => spec.length * spec.length2.unwrap_or(1),
        _ => per_transform * spec.transforms_per_block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::{ArrayLayout, Placement};

    fn spec64() -> StockhamSpec {
        StockhamSpec::derive_row(
            64,
            Precision::F32,
            Placement::InPlace,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            Direction::Forward,
            EmbeddedKind::None,
        )
        .unwrap()
    }

    #[test]
    fn device_function_emits_one_section_per_pass() {
        let f = generate_device_function(&spec64());
        let text = f.to_string();
        assert!(text.contains("fwd_length64_sbrr_device"));
        assert_eq!(text.matches("// pass ").count(), 3);
        // Pass 0 never applies twiddles.
        assert!(text.contains("pass 0, width 4"));
        let pass0 = text.split("pass 1").next().unwrap();
        assert!(!pass0.contains("twiddle_mul"));
        let pass1 = text.split("// pass 1").nth(1).unwrap();
        assert!(pass1.contains("twiddle_mul"));
    }

    #[test]
    fn twiddle_index_follows_the_telescoped_layout() {
        let f = generate_device_function(&spec64());
        let text = f.to_string();
        // Pass 1: base cumheight-1 = 3, stride (width-1) = 3.
        assert!(text.contains("twiddles[(3 + 0) + (3 * (thread % 4))]")
            || text.contains("twiddles[3 + 0 + (3 * (thread % 4))]"),
            "unexpected twiddle indexing:\n{text}");
    }

    #[test]
    fn uneven_thread_counts_get_guarded_work() {
        // Length 26 runs 2 threads per transform: width 13 leaves most
        // threads idle on the store, width 2 needs 6.5 butterflies per
        // thread, so a guarded tail iteration covers the odd half.
        let spec = StockhamSpec::derive_row(
            26,
            Precision::F64,
            Placement::InPlace,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            Direction::Forward,
            EmbeddedKind::None,
        )
        .unwrap();
        let text = generate_device_function(&spec).to_string();
        assert!(text.contains("some threads do extra work"));
        assert!(text.contains("more than enough threads, some do nothing"));
    }

    #[test]
    fn global_function_checks_batch_bounds() {
        let f = generate_global_function(&spec64());
        let text = f.to_string();
        assert!(text.contains("if(batch >= nbatch)"));
        assert!(text.contains("__launch_bounds__(64)"));
        assert!(text.contains("load_cb_fn"));
    }

    #[test]
    fn large_twiddle_kernel_takes_the_outer_table() {
        let spec = StockhamSpec::derive_column_block(
            64,
            Precision::F32,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            Direction::Forward,
        )
        .unwrap();
        let dev = generate_device_function(&spec).to_string();
        assert!(dev.contains("large_twd"));
        assert!(dev.contains("ltwd_col"));
        let glob = generate_global_function(&spec).to_string();
        assert!(glob.contains("large_twiddles"));
    }
}
