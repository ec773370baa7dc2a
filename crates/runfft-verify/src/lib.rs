//! Numerical test oracle for RunFFT.
//!
//! Seeded deterministic inputs, Hermitian symmetry imposition, rustfft
//! reference transforms, relative L2/L-infinity norms, and a host-side
//! schedule interpreter that stands in for the accelerator harness.

pub mod host;
pub mod input;
pub mod norms;
pub mod oracle;
pub mod reference;

pub use host::HostHarness;
pub use oracle::{run_accuracy_case, run_token_case, AccuracyReport};
