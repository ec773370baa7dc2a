//! Tiling variants of the global kernel.
//!
//! A tiling decides three things: how a block maps to transforms (offset
//! calculation), how global memory is staged into LDS, and how results go
//! back out. Row kernels use the flat-batch offset algorithm; block
//! compute kernels map each block onto a 2-D tile so strided global
//! access becomes unit-stride LDS access.

use crate::ast::{call, decl_init, ident, num, Expr, Function, Stmt};
use crate::stockham;
use runfft_core::{ArrayLayout, EmbeddedKind, Placement, SbrcVariant, StockhamSpec, Tiling};

pub(crate) trait KernelTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt>;
    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt>;
    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt>;
}

pub(crate) fn for_spec(spec: &StockhamSpec) -> Box<dyn KernelTiling> {
    match spec.tiling {
        Tiling::Row => Box::new(RowTiling),
        Tiling::ColumnBlock => Box::new(ColumnBlockTiling),
        Tiling::RowToColumnBlock => Box::new(RowToColumnTiling(
            spec.sbrc_variant.unwrap_or(SbrcVariant::Tile2D),
        )),
        Tiling::ColumnToRowBlock => Box::new(ColumnToRowTiling),
        Tiling::Single2D => Box::new(Single2DTiling),
    }
}

// -------------------------------------------------------------------
// Buffer plumbing
// -------------------------------------------------------------------

/// Kernel buffer arguments for the spec's layouts. In-place complex
/// kernels take one buffer set; everything else takes input and output
/// sets (an in-place real transform aliases them at launch time).
pub(crate) fn buffer_args(spec: &StockhamSpec) -> Vec<(String, String)> {
    let single_buf = spec.placement == Placement::InPlace && spec.in_layout == spec.out_layout;
    let mut args = Vec::new();
    if single_buf {
        match spec.in_layout {
            ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
                args.push(("real_type*".to_string(), "bufre".to_string()));
                args.push(("real_type*".to_string(), "bufim".to_string()));
            }
            _ => args.push(("scalar_type*".to_string(), "buf".to_string())),
        }
        return args;
    }
    match spec.in_layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            args.push(("const real_type*".to_string(), "ibufre".to_string()));
            args.push(("const real_type*".to_string(), "ibufim".to_string()));
        }
        ArrayLayout::Real => args.push(("const real_type*".to_string(), "ibuf".to_string())),
        _ => args.push(("const scalar_type*".to_string(), "ibuf".to_string())),
    }
    match spec.out_layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            args.push(("real_type*".to_string(), "obufre".to_string()));
            args.push(("real_type*".to_string(), "obufim".to_string()));
        }
        ArrayLayout::Real => args.push(("real_type*".to_string(), "obuf".to_string())),
        _ => args.push(("scalar_type*".to_string(), "obuf".to_string())),
    }
    args
}

fn single_buf(spec: &StockhamSpec) -> bool {
    spec.placement == Placement::InPlace && spec.in_layout == spec.out_layout
}

/// Expression reading one element of the input buffer.
fn load_expr(spec: &StockhamSpec, idx: Expr) -> Expr {
    let (re, im, one) = if single_buf(spec) {
        ("bufre", "bufim", "buf")
    } else {
        ("ibufre", "ibufim", "ibuf")
    };
    match spec.in_layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            call("load_planar", vec![ident(re), ident(im), idx])
        }
        ArrayLayout::Real => call("load_real_packed", vec![ident(one), idx]),
        _ => Expr::LoadGlobal(Box::new(ident(one)), Box::new(idx)),
    }
}

/// Statement writing one element of the output buffer.
fn store_stmt(spec: &StockhamSpec, idx: Expr, value: Expr) -> Stmt {
    let (re, im, one) = if single_buf(spec) {
        ("bufre", "bufim", "buf")
    } else {
        ("obufre", "obufim", "obuf")
    };
    match spec.out_layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            Stmt::CallStmt("store_planar".into(), vec![ident(re), ident(im), idx, value])
        }
        ArrayLayout::Real => {
            Stmt::CallStmt("store_real_packed".into(), vec![ident(one), idx, value])
        }
        _ => Stmt::StoreGlobal {
            buf: ident(one),
            idx,
            value,
        },
    }
}

/// Complex elements the kernel reads per transform.
fn input_len(spec: &StockhamSpec) -> usize {
    match spec.embedded {
        EmbeddedKind::RealPost => spec.length + 1,
        _ => spec.length,
    }
}

/// Complex elements the kernel writes per transform.
fn output_len(spec: &StockhamSpec) -> usize {
    match spec.embedded {
        EmbeddedKind::RealPre => spec.length + 1,
        _ => spec.length,
    }
}

fn lds_row(spec: &StockhamSpec) -> usize {
    match spec.embedded {
        EmbeddedKind::None => spec.length,
        _ => spec.length + 1,
    }
}

// -------------------------------------------------------------------
// Row tiling (flat batch)
// -------------------------------------------------------------------

struct RowTiling;

impl KernelTiling for RowTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        let mut out = Vec::new();
        out.push(Stmt::Assign(
            ident("transform"),
            ident("blockIdx.x") * num(spec.transforms_per_block)
                + ident("threadIdx.x") / num(spec.threads_per_transform),
        ));
        out.push(Stmt::Raw("size_t tcount = 1;".into()));
        out.push(Stmt::Raw(
            "for(unsigned int j = 1; j < dim; ++j)\n        tcount *= lengths[j];".into(),
        ));
        out.push(Stmt::Assign(ident("batch"), ident("transform") / ident("tcount")));
        out.push(decl_init(
            "size_t",
            "counter_mod",
            ident("transform") % ident("tcount"),
        ));
        if spec.large_twiddle {
            out.push(decl_init("const size_t", "ltwd_col", ident("counter_mod")));
        }
        // Peel one dimension at a time, slowest first.
        out.push(Stmt::Raw(
            "for(unsigned int i = dim - 1; i > 1; --i)\n\
             \x20   {\n\
             \x20       size_t current = 1;\n\
             \x20       for(unsigned int j = 1; j < i; ++j)\n\
             \x20           current *= lengths[j];\n\
             \x20       offset_in += (counter_mod / current) * stride_in[i];\n\
             \x20       offset_out += (counter_mod / current) * stride_out[i];\n\
             \x20       counter_mod %= current;\n\
             \x20   }"
                .into(),
        ));
        out.push(Stmt::Raw("if(dim > 1)".into()));
        out.push(Stmt::Raw("{".into()));
        out.push(Stmt::Raw("    offset_in += counter_mod * stride_in[1];".into()));
        out.push(Stmt::Raw("    offset_out += counter_mod * stride_out[1];".into()));
        out.push(Stmt::Raw("}".into()));
        out.push(Stmt::AddAssign(
            ident("offset_in"),
            ident("batch") * ident("stride_in").index(ident("dim")),
        ));
        out.push(Stmt::AddAssign(
            ident("offset_out"),
            ident("batch") * ident("stride_out").index(ident("dim")),
        ));
        out.push(Stmt::Assign(
            ident("offset_lds"),
            (ident("threadIdx.x") / num(spec.threads_per_transform))
                * (num(lds_row(spec)) + ident("lds_padding")),
        ));
        out.push(Stmt::Assign(
            ident("thread"),
            ident("threadIdx.x") % num(spec.threads_per_transform),
        ));
        out
    }

    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        if spec.half_lds {
            // Registers are loaded straight from global with the width of
            // the first pass.
            let width = spec.factors[0];
            return crate::stockham::register_edge_work(spec, width, |tid, reg, w| {
                let idx = tid + num(w * (spec.length / width));
                Stmt::Assign(
                    ident("R").index(num(reg)),
                    load_expr(spec, ident("offset_in") + idx * ident("stride_in").index(num(0))),
                )
            });
        }
        cooperative_rows(spec, input_len(spec), |flat| {
            Stmt::Assign(
                ident("lds_complex").index(ident("offset_lds") + flat.clone()),
                load_expr(
                    spec,
                    ident("offset_in") + flat * ident("stride_in").index(num(0)),
                ),
            )
        })
    }

    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        if spec.half_lds {
            let width = *spec.factors.last().unwrap();
            let cumheight = spec.length / width;
            return crate::stockham::register_edge_work(spec, width, |tid, reg, w| {
                let pos = (tid.clone() / num(cumheight)) * num(width * cumheight)
                    + tid % num(cumheight)
                    + num(w * cumheight);
                store_stmt(
                    spec,
                    ident("offset_out") + pos * ident("stride_out").index(num(0)),
                    ident("R").index(num(reg)),
                )
            });
        }
        cooperative_rows(spec, output_len(spec), |flat| {
            store_stmt(
                spec,
                ident("offset_out") + flat.clone() * ident("stride_out").index(num(0)),
                ident("lds_complex").index(ident("offset_lds") + flat),
            )
        })
    }
}

/// One transform's elements moved cooperatively by its thread group.
fn cooperative_rows(
    spec: &StockhamSpec,
    elems: usize,
    mut body: impl FnMut(Expr) -> Stmt,
) -> Vec<Stmt> {
    let tpt = spec.threads_per_transform;
    let iters = elems.div_ceil(tpt);
    let mut out = Vec::new();
    for e in 0..iters {
        let flat = if e == 0 {
            ident("thread")
        } else {
            ident("thread") + num(e * tpt)
        };
        let stmt = body(flat.clone());
        if (e + 1) * tpt > elems {
            out.push(Stmt::If {
                cond: ident("write").and(flat.lt(num(elems))),
                then: vec![stmt],
                otherwise: vec![],
            });
        } else {
            out.push(Stmt::If {
                cond: ident("write"),
                then: vec![stmt],
                otherwise: vec![],
            });
        }
    }
    out
}

// -------------------------------------------------------------------
// Column-block tiling (SBCC)
// -------------------------------------------------------------------

struct ColumnBlockTiling;

fn block_tile_offsets(spec: &StockhamSpec) -> Vec<Stmt> {
    let bw = spec.block_width;
    let mut out = Vec::new();
    out.push(Stmt::Comment(
        "blocks tile the column dimension; fold higher dims into the batch index".into(),
    ));
    out.push(decl_init(
        "const size_t",
        "batch_block_size",
        ident("gridDim.x") / ident("nbatch"),
    ));
    out.push(Stmt::Assign(
        ident("batch"),
        ident("blockIdx.x") / ident("batch_block_size"),
    ));
    out.push(decl_init(
        "size_t",
        "counter_mod",
        ident("blockIdx.x") % ident("batch_block_size"),
    ));
    out.push(decl_init(
        "const size_t",
        "col0",
        ident("counter_mod") * num(bw),
    ));
    out.push(Stmt::Assign(
        ident("transform"),
        ident("col0") + ident("threadIdx.x") / num(spec.threads_per_transform),
    ));
    if spec.large_twiddle {
        out.push(decl_init("const size_t", "ltwd_col", ident("transform")));
    }
    out.push(Stmt::AddAssign(
        ident("offset_in"),
        ident("batch") * ident("stride_in").index(ident("dim"))
            + ident("col0") * ident("stride_in").index(num(1)),
    ));
    out.push(Stmt::AddAssign(
        ident("offset_out"),
        ident("batch") * ident("stride_out").index(ident("dim"))
            + ident("col0") * ident("stride_out").index(num(1)),
    ));
    out.push(Stmt::Assign(
        ident("offset_lds"),
        (ident("threadIdx.x") / num(spec.threads_per_transform)) * num(spec.length),
    ));
    out.push(Stmt::Assign(
        ident("thread"),
        ident("threadIdx.x") % num(spec.threads_per_transform),
    ));
    // Columns past the edge contribute no work.
    out.push(Stmt::Assign(
        ident("write"),
        ident("transform").lt(ident("lengths").index(num(1))),
    ));
    out
}

/// Stage a `length x block_width` tile through LDS column-major so each
/// transform sees unit stride.
fn block_tile_move(spec: &StockhamSpec, store: bool) -> Vec<Stmt> {
    let bw = spec.block_width;
    let l = spec.length;
    let total = l * bw;
    let tpb = spec.threads_per_block;
    let mut out = Vec::new();
    for e in 0..total.div_ceil(tpb) {
        let flat = format!("flat{e}");
        let row = format!("row{e}");
        let col = format!("col{e}");
        out.push(decl_init(
            "const size_t",
            &flat,
            if e == 0 {
                ident("threadIdx.x")
            } else {
                ident("threadIdx.x") + num(e * tpb)
            },
        ));
        out.push(decl_init("const size_t", &row, ident(&flat) % num(l)));
        out.push(decl_init("const size_t", &col, ident(&flat) / num(l)));
        let mut cond = (ident("col0") + ident(&col)).lt(ident("lengths").index(num(1)));
        if total % tpb != 0 {
            cond = ident(&flat).lt(num(total)).and(cond);
        }
        let global_idx = |strides: &str| {
            ident(if strides == "in" { "offset_in" } else { "offset_out" })
                + ident(&row) * ident(if strides == "in" { "stride_in" } else { "stride_out" }).index(num(0))
                + ident(&col) * ident(if strides == "in" { "stride_in" } else { "stride_out" }).index(num(1))
        };
        let lds = ident("lds_complex").index(ident(&col) * num(l) + ident(&row));
        let stmt = if store {
            store_stmt(spec, global_idx("out"), lds)
        } else {
            Stmt::Assign(lds, load_expr(spec, global_idx("in")))
        };
        out.push(Stmt::If {
            cond,
            then: vec![stmt],
            otherwise: vec![],
        });
    }
    out
}

impl KernelTiling for ColumnBlockTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        block_tile_offsets(spec)
    }

    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        block_tile_move(spec, false)
    }

    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        block_tile_move(spec, true)
    }
}

// -------------------------------------------------------------------
// Column-to-row tiling (SBCR): strided columns in, contiguous rows out.
// -------------------------------------------------------------------

struct ColumnToRowTiling;

impl KernelTiling for ColumnToRowTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        block_tile_offsets(spec)
    }

    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        block_tile_move(spec, false)
    }

    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        // Rows go out contiguously: element k of column c lands at
        // offset_out + (c*length + k) * stride_out[0].
        let bw = spec.block_width;
        let l = spec.length;
        let total = l * bw;
        let tpb = spec.threads_per_block;
        let mut out = Vec::new();
        for e in 0..total.div_ceil(tpb) {
            let flat = format!("oflat{e}");
            let row = format!("orow{e}");
            let col = format!("ocol{e}");
            out.push(decl_init(
                "const size_t",
                &flat,
                if e == 0 {
                    ident("threadIdx.x")
                } else {
                    ident("threadIdx.x") + num(e * tpb)
                },
            ));
            out.push(decl_init("const size_t", &row, ident(&flat) % num(l)));
            out.push(decl_init("const size_t", &col, ident(&flat) / num(l)));
            let mut cond = (ident("col0") + ident(&col)).lt(ident("lengths").index(num(1)));
            if total % tpb != 0 {
                cond = ident(&flat).lt(num(total)).and(cond);
            }
            let idx = ident("offset_out")
                + (ident(&col) * num(l) + ident(&row)) * ident("stride_out").index(num(0));
            let lds = ident("lds_complex").index(ident(&col) * num(l) + ident(&row));
            out.push(Stmt::If {
                cond,
                then: vec![store_stmt(spec, idx, lds)],
                otherwise: vec![],
            });
        }
        out
    }
}

// -------------------------------------------------------------------
// Row-to-column tiling (SBRC)
// -------------------------------------------------------------------

struct RowToColumnTiling(SbrcVariant);

impl KernelTiling for RowToColumnTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        let bw = spec.block_width;
        let mut out = Vec::new();
        out.push(decl_init(
            "const size_t",
            "batch_block_size",
            ident("gridDim.x") / ident("nbatch"),
        ));
        out.push(Stmt::Assign(
            ident("batch"),
            ident("blockIdx.x") / ident("batch_block_size"),
        ));
        out.push(decl_init(
            "size_t",
            "counter_mod",
            ident("blockIdx.x") % ident("batch_block_size"),
        ));
        match self.0 {
            SbrcVariant::Tile2D => {
                out.push(Stmt::Comment("2-D tile over (row, column) blocks".into()));
                out.push(Stmt::Raw(format!(
                    "const size_t tiles_x = lengths[1] / {bw};"
                )));
                out.push(Stmt::Raw("const size_t tile_x = counter_mod % tiles_x;".into()));
                out.push(Stmt::Raw("const size_t tile_y = counter_mod / tiles_x;".into()));
                out.push(Stmt::Raw(format!(
                    "offset_in += tile_y * stride_in[2] + tile_x * ({bw} * stride_in[1]);"
                )));
                out.push(Stmt::Raw(format!(
                    "offset_out += tile_y * stride_out[2] + tile_x * ({bw} * stride_out[0]);"
                )));
            }
            SbrcVariant::XyZ => {
                out.push(Stmt::Comment(
                    "rows come from the xy plane, columns go out along z".into(),
                ));
                out.push(Stmt::Raw(format!(
                    "const size_t blocks_per_batch = lengths[1] * (lengths[2] / {bw});"
                )));
                out.push(Stmt::Raw(
                    "const size_t read_tile_x = counter_mod % lengths[1];".into(),
                ));
                out.push(Stmt::Raw(
                    "const size_t read_tile_y = counter_mod / lengths[1];".into(),
                ));
                if spec.length.is_power_of_two() && spec.length != 64 {
                    out.push(Stmt::Comment(
                        "diagonal remap avoids bank conflicts on power-of-two rows".into(),
                    ));
                    out.push(Stmt::Raw(format!(
                        "const size_t bid = read_tile_x + {} * read_tile_y;",
                        spec.length
                    )));
                    out.push(Stmt::Raw(format!(
                        "const size_t tile_y = bid % {};",
                        (spec.threads_per_block / bw).max(1)
                    )));
                    out.push(Stmt::Raw(format!(
                        "const size_t tile_x = ((bid / {}) + tile_y) % {};",
                        (spec.threads_per_block / bw).max(1),
                        spec.length
                    )));
                    out.push(Stmt::Raw(format!(
                        "offset_in += tile_y * ({bw} * stride_in[2]) + tile_x * stride_in[1];"
                    )));
                    out.push(Stmt::Raw(format!(
                        "offset_out += tile_x * stride_out[2] + tile_y * ({bw} * stride_out[0]);"
                    )));
                } else {
                    out.push(Stmt::Raw(format!(
                        "offset_in += read_tile_y * ({bw} * stride_in[2]) + read_tile_x * stride_in[1];"
                    )));
                    out.push(Stmt::Raw(format!(
                        "offset_out += read_tile_x * stride_out[2] + read_tile_y * ({bw} * stride_out[0]);"
                    )));
                }
                out.push(Stmt::Raw(
                    "offset_in += (batch / blocks_per_batch) * stride_in[3];".into(),
                ));
                out.push(Stmt::Raw(
                    "offset_out += (batch / blocks_per_batch) * stride_out[3];".into(),
                ));
            }
            SbrcVariant::ZXy => {
                out.push(Stmt::Comment(
                    "rows come from z, columns go out along the xy plane".into(),
                ));
                out.push(Stmt::Raw(format!(
                    "const size_t tiles_y = (lengths[1] * lengths[2]) / {bw};"
                )));
                out.push(Stmt::Raw("const size_t read_tile_y = counter_mod % tiles_y;".into()));
                out.push(Stmt::Raw(format!(
                    "offset_in += read_tile_y * ({bw} * stride_in[1]);"
                )));
                out.push(Stmt::Raw(format!(
                    "offset_out += read_tile_y * ({bw} * stride_out[0]);"
                )));
            }
        }
        out.push(Stmt::AddAssign(
            ident("offset_in"),
            ident("batch") * ident("stride_in").index(ident("dim")),
        ));
        out.push(Stmt::AddAssign(
            ident("offset_out"),
            ident("batch") * ident("stride_out").index(ident("dim")),
        ));
        out.push(Stmt::Assign(
            ident("offset_lds"),
            (ident("threadIdx.x") / num(spec.threads_per_transform)) * num(spec.length),
        ));
        out.push(Stmt::Assign(
            ident("thread"),
            ident("threadIdx.x") % num(spec.threads_per_transform),
        ));
        out
    }

    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        // Rows load contiguously.
        let bw = spec.block_width;
        let l = spec.length;
        let total = l * bw;
        let tpb = spec.threads_per_block;
        let mut out = Vec::new();
        for e in 0..total.div_ceil(tpb) {
            let flat = format!("flat{e}");
            out.push(decl_init(
                "const size_t",
                &flat,
                if e == 0 {
                    ident("threadIdx.x")
                } else {
                    ident("threadIdx.x") + num(e * tpb)
                },
            ));
            let guard = if total % tpb != 0 {
                Some(ident(&flat).lt(num(total)))
            } else {
                None
            };
            let stmt = Stmt::Assign(
                ident("lds_complex").index(ident(&flat)),
                load_expr(
                    spec,
                    ident("offset_in") + ident(&flat) * ident("stride_in").index(num(0)),
                ),
            );
            out.push(match guard {
                Some(cond) => Stmt::If {
                    cond,
                    then: vec![stmt],
                    otherwise: vec![],
                },
                None => stmt,
            });
        }
        out
    }

    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        // Element k of row r goes out transposed: columns become rows.
        let bw = spec.block_width;
        let l = spec.length;
        let total = l * bw;
        let tpb = spec.threads_per_block;
        let mut out = Vec::new();
        for e in 0..total.div_ceil(tpb) {
            let flat = format!("oflat{e}");
            let row = format!("orow{e}");
            let elem = format!("oelem{e}");
            out.push(decl_init(
                "const size_t",
                &flat,
                if e == 0 {
                    ident("threadIdx.x")
                } else {
                    ident("threadIdx.x") + num(e * tpb)
                },
            ));
            out.push(decl_init("const size_t", &row, ident(&flat) / num(l)));
            out.push(decl_init("const size_t", &elem, ident(&flat) % num(l)));
            let idx = ident("offset_out")
                + ident(&elem) * ident("stride_out").index(num(1))
                + ident(&row) * ident("stride_out").index(num(0));
            let stmt = store_stmt(
                spec,
                idx,
                ident("lds_complex").index(ident(&row) * num(l) + ident(&elem)),
            );
            if total % tpb != 0 {
                out.push(Stmt::If {
                    cond: ident(&flat).lt(num(total)),
                    then: vec![stmt],
                    otherwise: vec![],
                });
            } else {
                out.push(stmt);
            }
        }
        out
    }
}

// -------------------------------------------------------------------
// Fused 2-D tiling
// -------------------------------------------------------------------

struct Single2DTiling;

impl KernelTiling for Single2DTiling {
    fn calculate_offsets(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        let _ = spec;
        vec![
            Stmt::Assign(ident("batch"), ident("blockIdx.x")),
            Stmt::Assign(ident("transform"), ident("batch")),
            Stmt::AddAssign(
                ident("offset_in"),
                ident("batch") * ident("stride_in").index(ident("dim")),
            ),
            Stmt::AddAssign(
                ident("offset_out"),
                ident("batch") * ident("stride_out").index(ident("dim")),
            ),
            Stmt::Assign(ident("offset_lds"), num(0)),
            Stmt::Assign(ident("thread"), ident("threadIdx.x")),
        ]
    }

    fn load_from_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        let (l1, l0) = (spec.length, spec.length2.unwrap_or(1));
        tile_2d_move(spec, l0, l1, false)
    }

    fn store_to_global(&self, spec: &StockhamSpec) -> Vec<Stmt> {
        let (l1, l0) = (spec.length, spec.length2.unwrap_or(1));
        tile_2d_move(spec, l0, l1, true)
    }
}

fn tile_2d_move(spec: &StockhamSpec, l0: usize, l1: usize, store: bool) -> Vec<Stmt> {
    let total = l0 * l1;
    let tpb = spec.threads_per_block;
    let mut out = Vec::new();
    let prefix = if store { "o" } else { "i" };
    for e in 0..total.div_ceil(tpb) {
        let flat = format!("{prefix}flat{e}");
        let row = format!("{prefix}row{e}");
        let col = format!("{prefix}col{e}");
        out.push(decl_init(
            "const size_t",
            &flat,
            if e == 0 {
                ident("threadIdx.x")
            } else {
                ident("threadIdx.x") + num(e * tpb)
            },
        ));
        out.push(decl_init("const size_t", &row, ident(&flat) / num(l1)));
        out.push(decl_init("const size_t", &col, ident(&flat) % num(l1)));
        let strides = if store { "stride_out" } else { "stride_in" };
        let offset = if store { "offset_out" } else { "offset_in" };
        let idx = ident(offset)
            + ident(&row) * ident(strides).index(num(1))
            + ident(&col) * ident(strides).index(num(0));
        let lds = ident("lds_complex").index(ident(&row) * num(l1) + ident(&col));
        let stmt = if store {
            store_stmt(spec, idx, lds)
        } else {
            Stmt::Assign(lds, load_expr(spec, idx))
        };
        if total % tpb != 0 {
            out.push(Stmt::If {
                cond: ident(&flat).lt(num(total)),
                then: vec![stmt],
                otherwise: vec![],
            });
        } else {
            out.push(stmt);
        }
    }
    out
}

/// Row- and column-axis sub-specs of a fused 2-D kernel; square kernels
/// share one device function.
pub fn single_2d_axis_specs(spec: &StockhamSpec) -> (StockhamSpec, StockhamSpec) {
    let l0 = spec.length2.expect("single-2d spec carries both axes");
    let mut rows = spec.clone();
    rows.length2 = None;
    rows.factors2 = Vec::new();
    rows.threads_per_transform2 = 0;
    rows.transforms_per_block = l0;
    let mut cols = spec.clone();
    cols.length = l0;
    cols.length2 = None;
    cols.factors = spec.factors2.clone();
    cols.factors2 = Vec::new();
    cols.threads_per_transform = spec.threads_per_transform2;
    cols.threads_per_transform2 = 0;
    cols.transforms_per_block = spec.length;
    (rows, cols)
}

/// The fused 2-D global kernel: both axes back-to-back through LDS.
pub fn single_2d_global(spec: &StockhamSpec) -> Function {
    let (rows, cols) = single_2d_axis_specs(spec);
    let (l1, l0) = (spec.length, spec.length2.unwrap_or(1));
    let tiling = Single2DTiling;
    let mut f = crate::stockham::global_args_for(
        spec,
        Function::global(stockham::kernel_base_name(spec), spec.threads_per_block),
    );
    let body = &mut f.body;
    body.push(Stmt::Comment(format!(
        "fused 2-D kernel: {l0} rows of length {l1}, then {l1} columns of length {l0}"
    )));
    body.push(crate::ast::decl_array(
        "scalar_type",
        "R",
        rows.nregisters().max(cols.nregisters()),
    ));
    body.push(Stmt::Raw(format!(
        "__shared__ scalar_type lds_complex[{}];",
        l0 * l1
    )));
    body.push(Stmt::Raw(
        "real_type* lds_real = reinterpret_cast<real_type*>(lds_complex);".into(),
    ));
    body.push(decl_init("size_t", "offset_in", num(0)));
    body.push(decl_init("size_t", "offset_out", num(0)));
    body.push(crate::ast::decl("unsigned int", "offset_lds"));
    body.push(crate::ast::decl("size_t", "batch"));
    body.push(crate::ast::decl("size_t", "transform"));
    body.push(crate::ast::decl("size_t", "thread"));
    body.push(decl_init("bool", "write", Expr::Raw("true".into())));
    body.push(Stmt::Blank);

    body.extend(tiling.calculate_offsets(spec));
    body.push(Stmt::If {
        cond: ident("batch").ge(ident("nbatch")),
        then: vec![Stmt::Return],
        otherwise: vec![],
    });
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("load the tile".into()));
    body.extend(tiling.load_from_global(spec));
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("row transform".into()));
    body.push(Stmt::Assign(
        ident("write"),
        ident("threadIdx.x").lt(num(rows.threads_per_transform * l0)),
    ));
    // Idle threads park on row 0 so their unguarded lds reads stay in
    // bounds.
    body.push(Stmt::Assign(
        ident("offset_lds"),
        Expr::Ternary(
            Box::new(ident("write")),
            Box::new((ident("threadIdx.x") / num(rows.threads_per_transform)) * num(l1)),
            Box::new(num(0)),
        ),
    ));
    body.push(Stmt::CallStmt(
        stockham::device_function_name(&rows),
        vec![
            ident("R"),
            ident("lds_real"),
            ident("lds_complex"),
            ident("twiddles"),
            num(1),
            ident("offset_lds"),
            ident("write"),
        ],
    ));
    body.push(Stmt::Blank);
    body.push(Stmt::SyncThreads);
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("column transform, strided through lds".into()));
    // A rectangular kernel advances past the row-axis table.
    let col_twiddles = if l0 == l1 {
        ident("twiddles")
    } else {
        ident("twiddles") + num(l1 - 1)
    };
    body.push(Stmt::Assign(
        ident("write"),
        ident("threadIdx.x").lt(num(cols.threads_per_transform * l1)),
    ));
    body.push(Stmt::Assign(
        ident("offset_lds"),
        Expr::Ternary(
            Box::new(ident("write")),
            Box::new(ident("threadIdx.x") / num(cols.threads_per_transform)),
            Box::new(num(0)),
        ),
    ));
    body.push(Stmt::CallStmt(
        stockham::device_function_name(&cols),
        vec![
            ident("R"),
            ident("lds_real"),
            ident("lds_complex"),
            col_twiddles,
            num(l1),
            ident("offset_lds"),
            ident("write"),
        ],
    ));
    body.push(Stmt::Blank);

    body.push(Stmt::Comment("store the tile".into()));
    body.push(Stmt::SyncThreads);
    body.extend(tiling.store_to_global(spec));
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::{Direction, Precision};

    fn cc_spec() -> StockhamSpec {
        StockhamSpec::derive_column_block(
            64,
            Precision::F32,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            Direction::Forward,
        )
        .unwrap()
    }

    #[test]
    fn column_block_guards_edge_columns() {
        let spec = cc_spec();
        let stmts = ColumnBlockTiling.calculate_offsets(&spec);
        let text: String = stmts.iter().map(|s| format!("{s:?}")).collect();
        assert!(text.contains("batch_block_size"));
        let f = crate::stockham::generate_global_function(&spec);
        let rendered = f.to_string();
        assert!(rendered.contains("col0"));
        assert!(rendered.contains("write = transform < (lengths[1]);")
            || rendered.contains("write = transform < lengths[1];"),
            "missing edge guard:\n{rendered}");
    }

    #[test]
    fn sbrc_diagonal_remap_only_for_power_of_two() {
        let mk = |len| {
            StockhamSpec::derive_row_to_column_block(
                len,
                Precision::F32,
                ArrayLayout::ComplexInterleaved,
                ArrayLayout::ComplexInterleaved,
                Direction::Forward,
                SbrcVariant::XyZ,
            )
            .unwrap()
        };
        let remapped = crate::stockham::generate_global_function(&mk(128)).to_string();
        assert!(remapped.contains("diagonal remap"));
        let plain64 = crate::stockham::generate_global_function(&mk(64)).to_string();
        assert!(!plain64.contains("diagonal remap"));
        let plain100 = crate::stockham::generate_global_function(&mk(100)).to_string();
        assert!(!plain100.contains("diagonal remap"));
    }

    #[test]
    fn planar_layouts_route_through_planar_helpers() {
        let mut spec = StockhamSpec::derive_row(
            64,
            Precision::F32,
            Placement::OutOfPlace,
            ArrayLayout::ComplexPlanar,
            ArrayLayout::ComplexPlanar,
            Direction::Forward,
            EmbeddedKind::None,
        )
        .unwrap();
        spec.half_lds = false;
        let text = crate::stockham::generate_global_function(&spec).to_string();
        assert!(text.contains("load_planar(ibufre, ibufim,"));
        assert!(text.contains("store_planar(obufre, obufim,"));
    }

    #[test]
    fn fused_2d_runs_both_axes() {
        let spec = StockhamSpec::derive_single_2d(
            8,
            16,
            Precision::F32,
            Placement::InPlace,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            Direction::Forward,
        )
        .unwrap();
        let text = single_2d_global(&spec).to_string();
        assert!(text.contains("row transform"));
        assert!(text.contains("column transform"));
        // Rectangular kernel advances past the 16-1 row-axis roots.
        assert!(text.contains("twiddles + 15"));
        assert!(text.contains("fwd_length16_2d_device"));
        assert!(text.contains("fwd_length8_2d_device"));
    }
}
