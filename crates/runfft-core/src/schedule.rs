//! Execution schedules.
//!
//! Finalizing a plan walks the step list in order and produces one
//! [`LaunchRecord`] per kernel launch: grid/block shape, LDS demand,
//! symbolic buffer references and runtime shapes. Buffer references stay
//! symbolic (`UserIn`/`UserOut`/`Scratch`) so the accelerator harness binds
//! real pointers at execute time. Intermediate results ping-pong between
//! two scratch regions, so no record ever reads and writes the same buffer
//! (the single-record in-place transform, which works through LDS, is the
//! one exception).

use crate::descriptor::ArrayLayout;
use crate::error::FftError;
use crate::kernels::{KernelId, KernelSpec, Tiling};
use crate::plan::{NodeId, Plan, PlanBuilder, PlanStep, StepKind};
use crate::twiddle::TwiddleId;

/// Symbolic buffer reference, resolved by the harness at execute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRef {
    UserIn,
    UserOut,
    Scratch(usize),
}

/// One kernel launch, in submission order.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub kernel: KernelId,
    pub node: NodeId,
    pub kind: StepKind,
    pub grid: [u32; 3],
    pub block: [u32; 3],
    pub shared_bytes: u32,
    pub input: BufferRef,
    pub output: BufferRef,
    pub in_layout: ArrayLayout,
    pub out_layout: ArrayLayout,
    /// Leading element offsets, one per buffer of the layout.
    pub offset_in: Vec<usize>,
    pub offset_out: Vec<usize>,
    pub twiddles: Option<TwiddleId>,
    pub twiddles2: Option<TwiddleId>,
    pub large_twiddles: Option<TwiddleId>,
    pub lengths: Vec<usize>,
    pub strides_in: Vec<usize>,
    pub strides_out: Vec<usize>,
    pub batch: usize,
}

/// Turn a fully built [`PlanBuilder`] into an executable [`Plan`].
pub(crate) fn finalize(builder: PlanBuilder, root: NodeId) -> Result<Plan, FftError> {
    let PlanBuilder {
        desc,
        mut nodes,
        kernels,
        twiddles,
        steps,
        ..
    } = builder;

    let n = steps.len();
    debug_assert!(n > 0);
    let bpc = desc.precision.bytes_per_complex();

    let mut schedule = Vec::with_capacity(n);
    let mut scratch_elems = [0usize; 2];
    let mut input = BufferRef::UserIn;
    for (i, step) in steps.iter().enumerate() {
        let output = if i == n - 1 {
            BufferRef::UserOut
        } else {
            // Ping-pong: pick the scratch region the step is not reading.
            let slot = match input {
                BufferRef::Scratch(s) => 1 - s,
                _ => 0,
            };
            scratch_elems[slot] = scratch_elems[slot].max(step.elements_out * desc.batch);
            BufferRef::Scratch(slot)
        };

        let (grid, block, shared_bytes) = launch_shape(&kernels, step, desc.batch)?;
        schedule.push(LaunchRecord {
            kernel: step.kernel,
            node: step.node,
            kind: step.kind,
            grid,
            block,
            shared_bytes,
            input,
            output,
            in_layout: if i == 0 {
                desc.input_layout
            } else {
                ArrayLayout::ComplexInterleaved
            },
            out_layout: if i == n - 1 {
                desc.output_layout
            } else {
                ArrayLayout::ComplexInterleaved
            },
            offset_in: if i == 0 {
                desc.ioffset.clone()
            } else {
                vec![0]
            },
            offset_out: if i == n - 1 {
                desc.ooffset.clone()
            } else {
                vec![0]
            },
            twiddles: step.twiddles,
            twiddles2: step.twiddles2,
            large_twiddles: step.large_twiddles,
            lengths: step.lengths.clone(),
            strides_in: step.strides_in.clone(),
            strides_out: step.strides_out.clone(),
            batch: desc.batch,
        });
        input = output;
    }

    let scratch_bytes = (scratch_elems[0] + scratch_elems[1]) * bpc;
    nodes[root.0].scratch_bytes = scratch_bytes;
    log::debug!(
        "schedule: {} launches, {} scratch bytes for {}",
        schedule.len(),
        scratch_bytes,
        desc
    );

    Ok(Plan {
        desc,
        nodes,
        root,
        kernels,
        twiddles,
        steps,
        schedule,
        scratch_bytes,
    })
}

/// Byte offset of each scratch region inside the caller's scratch
/// allocation: region 0 starts at 0, region 1 after region 0.
pub fn scratch_layout(plan: &Plan) -> [usize; 2] {
    let bpc = plan.desc.precision.bytes_per_complex();
    let mut elems = [0usize; 2];
    for (record, step) in plan.schedule.iter().zip(plan.steps.iter()) {
        if let BufferRef::Scratch(s) = record.output {
            elems[s] = elems[s].max(step.elements_out * plan.desc.batch);
        }
    }
    [0, elems[0] * bpc]
}

fn div_ceil(a: usize, b: usize) -> usize {
    a.div_ceil(b.max(1)).max(1)
}

fn launch_shape(
    kernels: &[KernelSpec],
    step: &PlanStep,
    batch: usize,
) -> Result<([u32; 3], [u32; 3], u32), FftError> {
    let spec = &kernels[step.kernel.0];
    match spec {
        KernelSpec::Stockham(s) => {
            let rows: usize = step.lengths[1..].iter().product::<usize>().max(1);
            let shape = match s.tiling {
                Tiling::ColumnBlock | Tiling::RowToColumnBlock | Tiling::ColumnToRowBlock => {
                    let tiles = div_ceil(rows, s.block_width.max(1));
                    (
                        [(tiles * batch) as u32, 1, 1],
                        [s.threads_per_block as u32, 1, 1],
                        s.lds_bytes() as u32,
                    )
                }
                Tiling::Single2D => (
                    [batch as u32, 1, 1],
                    [s.threads_per_block as u32, 1, 1],
                    s.lds_bytes() as u32,
                ),
                Tiling::Row => {
                    let total = rows * batch;
                    (
                        [div_ceil(total, s.transforms_per_block) as u32, 1, 1],
                        [s.threads_per_block as u32, 1, 1],
                        s.lds_bytes() as u32,
                    )
                }
            };
            Ok(shape)
        }
        KernelSpec::Transpose(t) => {
            let cols = *step.lengths.last().unwrap_or(&1);
            let rows: usize = step.lengths[..step.lengths.len() - 1]
                .iter()
                .product::<usize>()
                .max(1);
            Ok((
                [
                    div_ceil(rows, t.tile) as u32,
                    div_ceil(cols, t.tile) as u32,
                    batch as u32,
                ],
                [t.tile as u32, t.tile as u32, 1],
                (t.tile * (t.tile + 1) * t.precision.bytes_per_complex()) as u32,
            ))
        }
        KernelSpec::RealTwist(r) => {
            let work = r.half_length / 2 + 1;
            Ok((
                [(div_ceil(work, 64) * batch) as u32, 1, 1],
                [64, 1, 1],
                0,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FftRequest, Placement, Precision, TransformKind};

    fn plan(req: FftRequest) -> Plan {
        Plan::new(req.normalize().unwrap()).unwrap()
    }

    #[test]
    fn single_kernel_length_64_launch_shape() {
        let p = plan(FftRequest {
            length: vec![64],
            placement: Placement::InPlace,
            ..Default::default()
        });
        assert_eq!(p.schedule.len(), 1);
        let r = &p.schedule[0];
        assert_eq!(r.grid, [1, 1, 1]);
        assert_eq!(r.block, [64, 1, 1]);
        assert_eq!(r.input, BufferRef::UserIn);
        assert_eq!(r.output, BufferRef::UserOut);
        assert_eq!(p.scratch_bytes(), 0);
    }

    #[test]
    fn two_level_4096_ping_pongs_through_one_scratch() {
        let p = plan(FftRequest {
            length: vec![4096],
            placement: Placement::InPlace,
            ..Default::default()
        });
        assert_eq!(p.schedule.len(), 2);
        assert_eq!(p.schedule[0].input, BufferRef::UserIn);
        assert_eq!(p.schedule[0].output, BufferRef::Scratch(0));
        assert_eq!(p.schedule[1].input, BufferRef::Scratch(0));
        assert_eq!(p.schedule[1].output, BufferRef::UserOut);
        // One scratch region of 4096 complex singles.
        assert_eq!(p.scratch_bytes(), 4096 * 8);
    }

    #[test]
    fn no_record_reads_and_writes_the_same_buffer() {
        for req in [
            FftRequest {
                length: vec![4096],
                placement: Placement::InPlace,
                ..Default::default()
            },
            FftRequest {
                length: vec![192, 84, 84],
                ..Default::default()
            },
            FftRequest {
                length: vec![60, 60],
                ..Default::default()
            },
        ] {
            let p = plan(req);
            for r in &p.schedule {
                if p.schedule.len() > 1 {
                    assert_ne!(r.input, r.output);
                }
            }
        }
    }

    #[test]
    fn rank3_schedule_has_six_records() {
        let p = plan(FftRequest {
            length: vec![192, 84, 84],
            ..Default::default()
        });
        assert_eq!(p.schedule.len(), 6);
        // Records are submitted in order; intermediate records use scratch.
        for r in &p.schedule[1..5] {
            assert!(matches!(r.input, BufferRef::Scratch(_)));
        }
    }

    #[test]
    fn offsets_and_layouts_sit_on_the_edges() {
        let p = plan(FftRequest {
            length: vec![4096],
            ioffset: vec![3],
            ooffset: vec![5],
            ..Default::default()
        });
        assert_eq!(p.schedule[0].offset_in, vec![3]);
        assert_eq!(p.schedule[0].offset_out, vec![0]);
        assert_eq!(p.schedule[1].offset_out, vec![5]);
    }

    #[test]
    fn batch_scales_grid_for_row_kernels() {
        let p = plan(FftRequest {
            length: vec![64],
            batch: 9,
            placement: Placement::InPlace,
            ..Default::default()
        });
        // 9 transforms, 4 per block.
        assert_eq!(p.schedule[0].grid, [3, 1, 1]);
    }

    #[test]
    fn real_forward_in_place_single_record() {
        let p = plan(FftRequest {
            length: vec![8],
            batch: 3,
            transform: TransformKind::RealForward,
            placement: Placement::InPlace,
            ..Default::default()
        });
        assert_eq!(p.schedule.len(), 1);
        assert_eq!(p.schedule[0].in_layout, ArrayLayout::Real);
        assert_eq!(p.schedule[0].out_layout, ArrayLayout::HermitianInterleaved);
        assert_eq!(p.scratch_bytes(), 0);
    }

    #[test]
    fn scratch_layout_splits_regions() {
        let p = plan(FftRequest {
            length: vec![192, 84, 84],
            precision: Precision::F32,
            ..Default::default()
        });
        let [a, b] = scratch_layout(&p);
        assert_eq!(a, 0);
        assert_eq!(b, 192 * 84 * 84 * 8);
        assert_eq!(p.scratch_bytes(), 2 * 192 * 84 * 84 * 8);
    }
}
