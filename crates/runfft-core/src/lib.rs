//! RunFFT plan compiler core.
//!
//! Turns a validated transform descriptor into an executable plan: a tree
//! of compute nodes, interned kernel specifications and twiddle tables,
//! and an ordered launch schedule for an external accelerator harness.
//! Kernel source generation lives in `runfft-codegen`; compiled code
//! objects are cached by `runfft-cache`.

pub mod descriptor;
pub mod error;
pub mod harness;
pub mod kernels;
pub mod plan;
pub mod schedule;
pub mod token;
pub mod twiddle;

pub use descriptor::{
    ArrayLayout, Direction, FftDescriptor, FftRequest, Placement, Precision, TransformKind,
};
pub use error::{last_diagnostic, FftError, FftStatus};
pub use kernels::{EmbeddedKind, KernelId, KernelSpec, SbrcVariant, StockhamSpec, Tiling};
pub use plan::{NodeId, Plan, PlanNode, Scheme, StepKind};
pub use schedule::{BufferRef, LaunchRecord};
pub use twiddle::{TwiddleArena, TwiddleId, TwiddleTable};
