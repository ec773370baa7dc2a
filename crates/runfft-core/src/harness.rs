//! The seam to the external accelerator harness.
//!
//! The core never touches a device API: it produces kernels and a
//! schedule. Embedders implement [`RtcCompiler`] (the toolchain) and
//! [`DeviceHarness`] (allocation, uploads and launches) and the execute
//! path drives them with resolved launch records. Buffers are opaque ids
//! the harness maps to its own memory, the same shape the in-process
//! provider uses for host-side execution.

use crate::descriptor::ArrayLayout;
use crate::error::FftError;
use crate::plan::Plan;
use crate::schedule::{BufferRef, LaunchRecord};

pub type BufferId = u64;
pub type StreamId = u64;

/// Buffers for one `plan_execute` call. In-place plans pass the same ids
/// for input and output; planar layouts pass two ids per side.
#[derive(Debug, Clone)]
pub struct ExecParams {
    pub input: Vec<BufferId>,
    pub output: Vec<BufferId>,
    pub scratch: [BufferId; 2],
    pub stream: StreamId,
}

/// A launch record with its symbolic buffer references resolved.
#[derive(Debug)]
pub struct ResolvedLaunch<'a> {
    pub record: &'a LaunchRecord,
    pub input: Vec<BufferId>,
    pub output: Vec<BufferId>,
    /// Compiled code object for the record's kernel; empty when the
    /// harness executes without a toolchain.
    pub code_object: &'a [u8],
}

/// The runtime-compilation toolchain.
pub trait RtcCompiler: Send + Sync {
    fn gpu_arch(&self) -> String;
    fn toolchain_version(&self) -> u32;
    fn compile(&self, kernel_name: &str, source: &str) -> anyhow::Result<Vec<u8>>;
}

/// The device side: owns buffers and submits launches in order.
pub trait DeviceHarness: Send + Sync {
    /// Called once per plan before the first launch so the harness can
    /// stage twiddle tables into device memory.
    fn upload_twiddles(&self, plan: &Plan) -> anyhow::Result<()> {
        let _ = plan;
        Ok(())
    }

    fn launch(
        &self,
        plan: &Plan,
        launch: &ResolvedLaunch<'_>,
        stream: StreamId,
    ) -> anyhow::Result<()>;

    fn synchronize(&self, stream: StreamId) -> anyhow::Result<()> {
        let _ = stream;
        Ok(())
    }
}

/// Map a record's symbolic buffers onto the caller's ids.
pub fn resolve_buffers(
    record: &LaunchRecord,
    params: &ExecParams,
) -> (Vec<BufferId>, Vec<BufferId>) {
    let pick = |r: BufferRef, layout: ArrayLayout| -> Vec<BufferId> {
        match r {
            BufferRef::UserIn => params.input[..layout.buffer_count()].to_vec(),
            BufferRef::UserOut => params.output[..layout.buffer_count()].to_vec(),
            BufferRef::Scratch(s) => vec![params.scratch[s]],
        }
    };
    (
        pick(record.input, record.in_layout),
        pick(record.output, record.out_layout),
    )
}

/// Check that the caller supplied a buffer per layout slot.
pub fn validate_exec_params(plan: &Plan, params: &ExecParams) -> Result<(), FftError> {
    let want_in = plan.desc.input_layout.buffer_count();
    let want_out = plan.desc.output_layout.buffer_count();
    if params.input.len() < want_in {
        return Err(FftError::invalid_config(format!(
            "execute: {} input buffers required, {} supplied",
            want_in,
            params.input.len()
        )));
    }
    if params.output.len() < want_out {
        return Err(FftError::invalid_config(format!(
            "execute: {} output buffers required, {} supplied",
            want_out,
            params.output.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FftRequest, Placement};

    #[test]
    fn resolution_follows_the_ping_pong_chain() {
        let plan = Plan::new(
            FftRequest {
                length: vec![4096],
                placement: Placement::InPlace,
                ..Default::default()
            }
            .normalize()
            .unwrap(),
        )
        .unwrap();
        let params = ExecParams {
            input: vec![7],
            output: vec![7],
            scratch: [100, 101],
            stream: 0,
        };
        validate_exec_params(&plan, &params).unwrap();
        let (i0, o0) = resolve_buffers(&plan.schedule[0], &params);
        let (i1, o1) = resolve_buffers(&plan.schedule[1], &params);
        assert_eq!((i0, o0), (vec![7], vec![100]));
        assert_eq!((i1, o1), (vec![100], vec![7]));
    }
}
