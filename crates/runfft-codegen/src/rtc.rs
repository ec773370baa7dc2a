//! Kernel identity for the runtime-compilation cache: stable kernel
//! names, the generator hash that invalidates cached code objects when
//! the generator changes, and the debug dump of generated source.

use sha2::{Digest, Sha256};

use runfft_core::kernels::KernelSpec;
use runfft_core::{ArrayLayout, Placement, Precision};

use crate::real::twist_kernel_base_name;
use crate::stockham::kernel_base_name;
use crate::transpose::transpose_kernel_base_name;

/// Bumped whenever generated source changes shape; part of every cache
/// key via [`generator_hash`].
pub const GENERATOR_VERSION: &str = "runfft-generator-1";

fn precision_tag(p: Precision) -> &'static str {
    match p {
        Precision::F32 => "sp",
        Precision::F64 => "dp",
    }
}

fn layout_tag(l: ArrayLayout) -> &'static str {
    match l {
        ArrayLayout::ComplexInterleaved => "ci",
        ArrayLayout::ComplexPlanar => "cp",
        ArrayLayout::Real => "r",
        ArrayLayout::HermitianInterleaved => "hi",
        ArrayLayout::HermitianPlanar => "hp",
    }
}

/// Full kernel name, unique per kernel identity.
pub fn kernel_name(spec: &KernelSpec) -> String {
    match spec {
        KernelSpec::Stockham(s) => {
            let place = match s.placement {
                Placement::InPlace => "ip",
                Placement::OutOfPlace => "op",
            };
            format!(
                "{}_{}_{}_{}_{}",
                kernel_base_name(s),
                precision_tag(s.precision),
                layout_tag(s.in_layout),
                layout_tag(s.out_layout),
                place,
            )
        }
        KernelSpec::Transpose(t) => format!(
            "{}_{}",
            transpose_kernel_base_name(t),
            precision_tag(t.precision)
        ),
        KernelSpec::RealTwist(r) => format!(
            "{}_{}",
            twist_kernel_base_name(r),
            precision_tag(r.precision)
        ),
    }
}

/// SHA-256 of the generator version and the normalized spec encoding.
/// Two processes running the same generator on the same identity agree;
/// a generator change misses the cache and recompiles.
pub fn generator_hash(spec: &KernelSpec) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(GENERATOR_VERSION.as_bytes());
    hasher.update(format!("{spec:?}").as_bytes());
    hasher.finalize().into()
}

/// One-line JSON rendering of a kernel identity, emitted ahead of dumped
/// source so logs stay greppable by field.
pub fn kernel_metadata_json(spec: &KernelSpec) -> String {
    serde_json::to_string(spec).unwrap_or_default()
}

/// Dump generated source to stderr when requested via
/// `RUNFFT_DEBUG_GENERATED_KERNELS`, prefixed with the kernel name and
/// its JSON metadata.
pub fn debug_dump(spec: &KernelSpec, name: &str, source: &str) {
    let enabled = std::env::var("RUNFFT_DEBUG_GENERATED_KERNELS")
        .map(|v| v.trim() == "1")
        .unwrap_or(false);
    if enabled {
        eprintln!("// ---- generated kernel: {name} ----");
        eprintln!("// {}", kernel_metadata_json(spec));
        eprintln!("{source}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::{Direction, EmbeddedKind, StockhamSpec};

    fn spec() -> KernelSpec {
        KernelSpec::Stockham(
            StockhamSpec::derive_row(
                64,
                Precision::F32,
                Placement::InPlace,
                ArrayLayout::ComplexInterleaved,
                ArrayLayout::ComplexInterleaved,
                Direction::Forward,
                EmbeddedKind::None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn names_carry_the_full_identity() {
        assert_eq!(kernel_name(&spec()), "fwd_length64_sbrr_sp_ci_ci_ip");
    }

    #[test]
    fn hash_distinguishes_identities_and_is_stable() {
        let a = generator_hash(&spec());
        let b = generator_hash(&spec());
        assert_eq!(a, b);
        let KernelSpec::Stockham(mut s) = spec() else {
            unreachable!()
        };
        s.direction = Direction::Inverse;
        let c = generator_hash(&KernelSpec::Stockham(s));
        assert_ne!(a, c);
    }

    #[test]
    fn metadata_json_carries_the_identity_fields() {
        let meta = kernel_metadata_json(&spec());
        assert!(meta.contains("\"length\":64"));
        assert!(meta.contains("\"factors\":[4,4,4]"));
        assert!(meta.contains("\"threads_per_block\":64"));
        assert!(meta.contains("\"half_lds\":true"));
    }
}
