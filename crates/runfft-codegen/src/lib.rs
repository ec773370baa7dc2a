//! RunFFT kernel source generator.
//!
//! Produces device source text for one kernel identity at a time: a
//! support preamble, butterfly templates for the radices in use, real
//! pre/post twist helpers where fused, the per-identity device function
//! and the global kernel for the spec's tiling. Source is assembled from
//! a statement/expression AST (`ast`) with a single printer, so the
//! indexing arithmetic that makes or breaks a Stockham kernel is built
//! structurally.

pub mod ast;
pub mod butterfly;
pub mod preamble;
pub mod real;
pub mod rtc;
pub mod stockham;
pub mod tiling;
pub mod transpose;

use runfft_core::kernels::KernelSpec;
use runfft_core::{EmbeddedKind, Tiling};

pub use rtc::{debug_dump, generator_hash, kernel_metadata_json, kernel_name, GENERATOR_VERSION};

/// Generate the complete source for one kernel identity.
pub fn generate_kernel_source(spec: &KernelSpec) -> String {
    let source = match spec {
        KernelSpec::Stockham(s) => {
            let mut src = preamble::preamble(s.precision);
            let mut radices: Vec<usize> = s.factors.clone();
            radices.extend(s.factors2.iter().copied());
            src.push_str(&butterfly::butterfly_set(&radices, s.direction));
            if s.embedded != EmbeddedKind::None {
                src.push_str(&real::twist_device_function(s.direction));
                src.push('\n');
            }
            if s.tiling == Tiling::Single2D && s.length2.is_some() {
                let (rows, cols) = tiling::single_2d_axis_specs(s);
                src.push_str(&stockham::generate_device_function(&rows).to_string());
                src.push('\n');
                if rows != cols {
                    src.push_str(&stockham::generate_device_function(&cols).to_string());
                    src.push('\n');
                }
            } else {
                src.push_str(&stockham::generate_device_function(s).to_string());
                src.push('\n');
            }
            src.push_str(&stockham::generate_global_function(s).to_string());
            src
        }
        KernelSpec::Transpose(t) => {
            let mut src = preamble::preamble(t.precision);
            src.push_str(&transpose::transpose_global(t));
            src
        }
        KernelSpec::RealTwist(r) => {
            let mut src = preamble::preamble(r.precision);
            src.push_str(&real::standalone_global(r));
            src
        }
    };
    let name = kernel_name(spec);
    log::trace!("generated kernel source for {name} ({} bytes)", source.len());
    debug_dump(spec, &name, &source);
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::{ArrayLayout, Direction, Placement, Precision, StockhamSpec};

    #[test]
    fn stockham_source_is_self_contained() {
        let spec = KernelSpec::Stockham(
            StockhamSpec::derive_row(
                64,
                Precision::F32,
                Placement::InPlace,
                ArrayLayout::ComplexInterleaved,
                ArrayLayout::ComplexInterleaved,
                Direction::Forward,
                runfft_core::EmbeddedKind::None,
            )
            .unwrap(),
        );
        let src = generate_kernel_source(&spec);
        assert!(src.contains("typedef float real_type;"));
        assert!(src.contains("__device__ void fwd_rad4"));
        assert!(src.contains("fwd_length64_sbrr_device"));
        assert!(src.contains("__global__ void __launch_bounds__(64) fwd_length64_sbrr("));
        // Every helper the body calls is defined in the same unit.
        for helper in ["twiddle_mul", "load_global", "store_global"] {
            assert!(src.contains(&format!("{helper}(")), "missing {helper}");
        }
    }

    #[test]
    fn embedded_real_kernel_includes_the_twist() {
        let spec = KernelSpec::Stockham(
            StockhamSpec::derive_row(
                4,
                Precision::F32,
                Placement::InPlace,
                ArrayLayout::Real,
                ArrayLayout::HermitianInterleaved,
                Direction::Forward,
                runfft_core::EmbeddedKind::RealPre,
            )
            .unwrap(),
        );
        let src = generate_kernel_source(&spec);
        assert!(src.contains("real_pre_process_kernel_inplace"));
        assert!(src.contains("load_real_packed"));
    }

    #[test]
    fn identical_identities_generate_identical_source() {
        let mk = || {
            KernelSpec::Stockham(
                StockhamSpec::derive_row(
                    100,
                    Precision::F64,
                    Placement::OutOfPlace,
                    ArrayLayout::ComplexInterleaved,
                    ArrayLayout::ComplexInterleaved,
                    Direction::Inverse,
                    runfft_core::EmbeddedKind::None,
                )
                .unwrap(),
            )
        };
        assert_eq!(generate_kernel_source(&mk()), generate_kernel_source(&mk()));
    }

    #[test]
    fn square_2d_kernel_shares_one_device_function() {
        let spec = KernelSpec::Stockham(
            StockhamSpec::derive_single_2d(
                16,
                16,
                Precision::F32,
                Placement::InPlace,
                ArrayLayout::ComplexInterleaved,
                ArrayLayout::ComplexInterleaved,
                Direction::Forward,
            )
            .unwrap(),
        );
        let src = generate_kernel_source(&spec);
        assert_eq!(src.matches("__device__ void fwd_length16_2d_device").count(), 1);
    }
}
