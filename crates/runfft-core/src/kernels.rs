//! Kernel specifications (launch shapes, radix factorizations, tiling).
//!
//! A [`StockhamSpec`] is the full identity of a generated kernel: two plan
//! nodes with equal specs share one source string and one compiled code
//! object. Tabulated lengths carry hand-tuned launch parameters; everything
//! else is derived with the greedy descending-radix rules.

use serde::{Deserialize, Serialize};

use crate::descriptor::{ArrayLayout, Direction, Placement, Precision};
use crate::error::FftError;

/// Upper bound on LDS available to one thread block. Sized so two blocks
/// can be resident per compute unit on 64 KiB hardware.
pub const LDS_BYTE_LIMIT: usize = 32 * 1024;

/// Complex-double footprint used for budgeting, independent of precision.
pub const BYTES_PER_ELEMENT: usize = 16;

/// Hard cap on threads per block for generated kernels.
pub const THREADS_PER_BLOCK_MAX: usize = 256;

/// Radices with butterfly templates, in greedy (descending) order.
pub const RADIX_CANDIDATES: &[usize] = &[13, 11, 10, 8, 7, 6, 5, 4, 3, 2];

/// Default number of tile columns for block-compute kernels.
pub const BLOCK_WIDTH: usize = 16;

/// Tiling class of a generated kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tiling {
    /// Plain row kernel: one transform per `threads_per_transform` group.
    Row,
    /// Column-tile block compute (SBCC): strided columns staged through LDS.
    ColumnBlock,
    /// Row-to-column block compute (SBRC).
    RowToColumnBlock,
    /// Column-to-row block compute (SBCR).
    ColumnToRowBlock,
    /// Fused small 2-D kernel running both axes through LDS.
    Single2D,
}

impl Tiling {
    pub fn name(self) -> &'static str {
        match self {
            Tiling::Row => "sbrr",
            Tiling::ColumnBlock => "sbcc",
            Tiling::RowToColumnBlock => "sbrc",
            Tiling::ColumnToRowBlock => "sbcr",
            Tiling::Single2D => "2d",
        }
    }
}

/// Which pair of input dimensions an SBRC tile maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SbrcVariant {
    Tile2D,
    XyZ,
    ZXy,
}

/// Real pre/post processing fused into a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddedKind {
    None,
    /// Real-forward twist producing the Hermitian half-spectrum.
    RealPre,
    /// Real-inverse twist consuming the Hermitian half-spectrum.
    RealPost,
}

/// Identity of one generated Stockham kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockhamSpec {
    pub length: usize,
    /// Second axis for [`Tiling::Single2D`] kernels.
    pub length2: Option<usize>,
    pub precision: Precision,
    pub tiling: Tiling,
    pub factors: Vec<usize>,
    pub factors2: Vec<usize>,
    pub threads_per_transform: usize,
    pub threads_per_transform2: usize,
    pub transforms_per_block: usize,
    pub threads_per_block: usize,
    pub half_lds: bool,
    pub large_twiddle: bool,
    pub block_width: usize,
    pub sbrc_variant: Option<SbrcVariant>,
    pub placement: Placement,
    pub in_layout: ArrayLayout,
    pub out_layout: ArrayLayout,
    pub direction: Direction,
    pub embedded: EmbeddedKind,
    /// Output scale factor, stored as IEEE bits so the spec stays hashable.
    pub scale_bits: u64,
}

/// Identity of a generated transpose kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransposeSpec {
    pub precision: Precision,
    pub tile: usize,
}

/// Tile edge for generated transpose kernels.
pub const TRANSPOSE_TILE: usize = 16;

/// Identity of a standalone real pre/post processing kernel, used when the
/// twist cannot be fused into the innermost transform kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealTwistSpec {
    pub half_length: usize,
    pub precision: Precision,
    pub direction: Direction,
}

/// A kernel referenced from a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelSpec {
    Stockham(StockhamSpec),
    Transpose(TransposeSpec),
    RealTwist(RealTwistSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelId(pub usize);

struct SmallKernelEntry {
    length: usize,
    threads_per_block: usize,
    threads_per_transform: usize,
    factors: &'static [usize],
    half_lds: bool,
}

macro_rules! small {
    ($len:expr, $tpb:expr, $tpt:expr, [$($f:expr),+]) => {
        SmallKernelEntry { length: $len, threads_per_block: $tpb,
            threads_per_transform: $tpt, factors: &[$($f),+], half_lds: true }
    };
    ($len:expr, $tpb:expr, $tpt:expr, [$($f:expr),+], full_lds) => {
        SmallKernelEntry { length: $len, threads_per_block: $tpb,
            threads_per_transform: $tpt, factors: &[$($f),+], half_lds: false }
    };
}

/// Tuned launch parameters for single-kernel lengths.
#[rustfmt::skip]
static SMALL_KERNELS: &[SmallKernelEntry] = &[
    small!(   1,  64,   1, [1]),
    small!(   2,  64,   1, [2]),
    small!(   3,  64,   1, [3]),
    small!(   4, 128,   1, [4]),
    small!(   5, 128,   1, [5]),
    small!(   6, 128,   1, [6]),
    small!(   7,  64,   1, [7]),
    small!(   8,  64,   4, [4, 2]),
    small!(   9,  64,   3, [3, 3]),
    small!(  10,  64,   1, [10]),
    small!(  11, 128,   1, [11]),
    small!(  12, 128,   6, [6, 2]),
    small!(  13,  64,   1, [13]),
    small!(  14, 128,   7, [7, 2]),
    small!(  15, 128,   5, [3, 5]),
    small!(  16,  64,   4, [4, 4]),
    small!(  18,  64,   6, [3, 6]),
    small!(  20, 256,  10, [5, 4]),
    small!(  21, 128,   7, [3, 7]),
    small!(  22,  64,   2, [11, 2]),
    small!(  24, 256,   8, [8, 3]),
    small!(  25, 256,   5, [5, 5]),
    small!(  26,  64,   2, [13, 2]),
    small!(  27, 256,   9, [3, 3, 3]),
    small!(  28,  64,   4, [7, 4]),
    small!(  30, 128,  10, [10, 3]),
    small!(  32,  64,  16, [8, 2, 2]),
    small!(  36,  64,   6, [6, 6]),
    small!(  40, 128,  10, [10, 4]),
    small!(  42, 256,   7, [7, 6]),
    small!(  44,  64,   4, [11, 4]),
    small!(  45, 128,  15, [5, 3, 3]),
    small!(  48,  64,  16, [4, 3, 4]),
    small!(  49,  64,   7, [7, 7]),
    small!(  50, 256,  10, [10, 5]),
    small!(  52,  64,   4, [13, 4]),
    small!(  54, 256,  18, [6, 3, 3]),
    small!(  56, 128,   8, [7, 8]),
    small!(  60,  64,  10, [6, 10]),
    small!(  64,  64,  16, [4, 4, 4]),
    small!(  72,  64,   9, [8, 3, 3]),
    small!(  75, 256,  25, [5, 5, 3]),
    small!(  80,  64,  10, [5, 2, 8]),
    small!(  81, 128,  27, [3, 3, 3, 3]),
    small!(  84, 128,  12, [7, 2, 6]),
    small!(  88, 128,  11, [11, 8]),
    small!(  90,  64,   9, [3, 3, 10]),
    small!(  96, 128,  16, [6, 8, 2], full_lds),
    small!( 100,  64,  10, [10, 10]),
    small!( 104,  64,   8, [13, 8]),
    small!( 108, 256,  36, [6, 6, 3]),
    small!( 112, 256,  16, [8, 2, 7], full_lds),
    small!( 120,  64,  12, [6, 10, 2]),
    small!( 121, 128,  11, [11, 11]),
    small!( 125, 256,  25, [5, 5, 5], full_lds),
    small!( 128, 256,  16, [8, 2, 8]),
    small!( 135, 128,   9, [5, 3, 3, 3]),
    small!( 144, 128,  12, [6, 6, 4]),
    small!( 150,  64,   5, [10, 5, 3]),
    small!( 160, 256,  16, [8, 2, 10]),
    small!( 162, 256,  27, [6, 3, 3, 3]),
    small!( 168, 256,  56, [8, 7, 3], full_lds),
    small!( 169, 256,  13, [13, 13]),
    small!( 176,  64,  16, [11, 8, 2]),
    small!( 180, 256,  60, [10, 6, 3], full_lds),
    small!( 192, 128,  16, [6, 4, 4, 2]),
    small!( 200,  64,  20, [10, 10, 2]),
    small!( 208,  64,  16, [13, 8, 2]),
    small!( 216, 256,  36, [6, 6, 6]),
    small!( 224,  64,  16, [7, 2, 2, 2, 2, 2]),
    small!( 225, 256,  75, [5, 5, 3, 3]),
    small!( 240, 128,  48, [8, 5, 6]),
    small!( 243, 256,  81, [3, 3, 3, 3, 3]),
    small!( 250, 128,  25, [10, 5, 5]),
    small!( 256,  64,  64, [4, 4, 4, 4]),
    small!( 270, 128,  27, [10, 3, 3, 3]),
    small!( 288, 128,  24, [6, 6, 4, 2]),
    small!( 300,  64,  30, [10, 10, 3]),
    small!( 320,  64,  16, [10, 4, 4, 2]),
    small!( 324,  64,  54, [3, 6, 6, 3]),
    small!( 336, 128,  56, [8, 7, 6]),
    small!( 343, 256,  49, [7, 7, 7]),
    small!( 360, 256,  60, [10, 6, 6]),
    small!( 375, 128,  25, [5, 5, 5, 3]),
    small!( 384, 128,  32, [6, 4, 4, 4]),
    small!( 400, 128,  40, [4, 10, 10]),
    small!( 405, 128,  27, [5, 3, 3, 3, 3]),
    small!( 432,  64,  27, [3, 8, 2, 3, 3]),
    small!( 450, 128,  30, [10, 5, 3, 3]),
    small!( 480,  64,  16, [10, 8, 6]),
    small!( 486, 256, 162, [6, 3, 3, 3, 3]),
    small!( 500, 128, 100, [10, 5, 10]),
    small!( 512,  64,  64, [8, 8, 8]),
    small!( 528,  64,  48, [4, 4, 3, 11]),
    small!( 540, 256,  54, [3, 10, 6, 3]),
    small!( 576, 128,  96, [8, 2, 6, 6]),
    small!( 600,  64,  60, [10, 6, 10]),
    small!( 625, 128, 125, [5, 5, 5, 5]),
    small!( 640, 128,  64, [8, 10, 8]),
    small!( 648, 256, 216, [8, 3, 3, 3, 3]),
    small!( 675, 256, 225, [5, 5, 3, 3, 3]),
    small!( 720, 256, 120, [10, 3, 8, 3]),
    small!( 729, 256, 243, [3, 3, 3, 3, 3, 3]),
    small!( 750, 256, 250, [10, 5, 3, 5]),
    small!( 768,  64,  48, [8, 2, 3, 8, 2]),
    small!( 800, 256, 160, [8, 2, 5, 10]),
    small!( 810, 128,  81, [3, 10, 3, 3, 3]),
    small!( 864,  64,  54, [3, 6, 8, 2, 3]),
    small!( 900, 256,  90, [10, 10, 3, 3]),
    small!( 960, 256, 160, [8, 2, 10, 6], full_lds),
    small!( 972, 256, 162, [3, 6, 3, 6, 3]),
    small!(1000, 128, 100, [10, 10, 10]),
    small!(1024, 128, 128, [8, 8, 4, 4]),
    small!(1040, 256, 208, [13, 8, 2, 5]),
    small!(1080, 256, 108, [6, 10, 6, 3]),
    small!(1125, 256, 225, [5, 5, 3, 3, 5]),
    small!(1152, 256, 144, [4, 3, 8, 3, 4]),
    small!(1200, 256,  75, [5, 5, 8, 2, 3]),
    small!(1215, 256, 243, [5, 3, 3, 3, 3, 3]),
    small!(1250, 256, 250, [5, 10, 5, 5]),
    small!(1280, 128,  80, [8, 2, 5, 8, 2]),
    small!(1296, 128, 108, [6, 6, 6, 6]),
    small!(1350, 256, 135, [5, 10, 3, 3, 3]),
    small!(1440, 128,  90, [10, 8, 2, 3, 3]),
    small!(1458, 256, 243, [6, 3, 3, 3, 3, 3]),
    small!(1500, 256, 150, [5, 10, 10, 3]),
    small!(1536, 256, 256, [8, 2, 8, 2, 6]),
    small!(1600, 256, 100, [10, 8, 2, 10]),
    small!(1620, 256, 162, [10, 3, 3, 6, 3]),
    small!(1728, 128, 108, [3, 6, 6, 8, 2]),
    small!(1800, 256, 180, [10, 6, 10, 3]),
    small!(1875, 256, 125, [5, 5, 5, 5, 3]),
    small!(1920, 256, 120, [10, 6, 8, 2, 2]),
    small!(1944, 256, 243, [3, 3, 3, 3, 8, 3]),
    small!(2000, 128, 125, [5, 5, 5, 8, 2]),
    small!(2025, 256, 135, [3, 3, 5, 5, 3, 3]),
    small!(2048, 256, 256, [8, 2, 8, 2, 8]),
];

/// Lengths with tuned column-block (SBCC) kernels; ordered ascending.
#[rustfmt::skip]
static BLOCK_CC_KERNELS: &[(usize, &[usize])] = &[
    (50,  &[10, 5]),
    (52,  &[13, 4]),
    (60,  &[6, 10]),
    (64,  &[8, 8]),
    (72,  &[8, 3, 3]),
    (80,  &[10, 8]),
    (81,  &[3, 3, 3, 3]),
    (84,  &[7, 2, 6]),
    (96,  &[6, 8, 2]),
    (100, &[5, 5, 4]),
    (104, &[13, 8]),
    (108, &[6, 6, 3]),
    (112, &[4, 7, 4]),
    (128, &[8, 4, 4]),
    (160, &[4, 10, 4]),
    (168, &[7, 6, 4]),
    (200, &[8, 5, 5]),
    (208, &[13, 8, 2]),
    (216, &[8, 3, 3, 3]),
    (224, &[8, 7, 4]),
    (240, &[8, 5, 6]),
    (256, &[8, 4, 8]),
    (336, &[6, 7, 8]),
];

/// Lengths with tuned row-to-column (SBRC) kernels:
/// (length, factors, threads_per_block, threads_per_transform, block_width).
#[rustfmt::skip]
static BLOCK_RC_KERNELS: &[(usize, &[usize], usize, usize, usize)] = &[
    (50,  &[10, 5],       50,  5,  10),
    (64,  &[4, 4, 4],     128, 8,  16),
    (81,  &[3, 3, 3, 3],  81,  27, 9),
    (100, &[5, 5, 4],     100, 25, 4),
    (128, &[8, 4, 4],     128, 16, 8),
    (200, &[10, 10, 2],   100, 10, 10),
    (256, &[4, 4, 4, 4],  256, 64, 8),
];

fn small_entry(length: usize) -> Option<&'static SmallKernelEntry> {
    SMALL_KERNELS.iter().find(|e| e.length == length)
}

/// Tabulated radix sequence for `length`, if one exists.
pub fn tabulated_factors(length: usize) -> Option<Vec<usize>> {
    small_entry(length).map(|e| e.factors.to_vec())
}

/// Greedy descending-radix factorization over [`RADIX_CANDIDATES`].
pub fn greedy_factors(length: usize) -> Option<Vec<usize>> {
    if length == 1 {
        return Some(vec![1]);
    }
    let mut rest = length;
    let mut factors = Vec::new();
    while rest > 1 {
        let radix = RADIX_CANDIDATES.iter().copied().find(|r| rest % r == 0)?;
        factors.push(radix);
        rest /= radix;
    }
    Some(factors)
}

/// Radix sequence for `length`: tabulated first, greedy otherwise.
pub fn factor_sequence(length: usize) -> Option<Vec<usize>> {
    tabulated_factors(length).or_else(|| greedy_factors(length))
}

/// True when `length` fits a single kernel through LDS.
pub fn fits_single_kernel(length: usize) -> bool {
    length * BYTES_PER_ELEMENT <= LDS_BYTE_LIMIT && factor_sequence(length).is_some()
}

/// The tuned column-block length table, largest first.
pub fn block_cc_lengths() -> impl Iterator<Item = usize> {
    BLOCK_CC_KERNELS.iter().rev().map(|(l, _)| *l)
}

fn block_cc_factors(length: usize) -> Option<Vec<usize>> {
    BLOCK_CC_KERNELS
        .iter()
        .find(|(l, _)| *l == length)
        .map(|(_, f)| f.to_vec())
}

/// Threads per transform when no table entry applies: one thread per
/// butterfly of the smallest radix, falling back to the largest divisor
/// that keeps every pass height integral.
fn derive_threads_per_transform(length: usize, factors: &[usize]) -> usize {
    let min_w = factors.iter().copied().min().unwrap_or(1).max(1);
    let uwide = length / min_w;
    if uwide >= 1 && uwide <= THREADS_PER_BLOCK_MAX {
        return uwide.max(1);
    }
    let mut best = 1;
    for t in 2..=THREADS_PER_BLOCK_MAX {
        if length % t == 0 && factors.iter().all(|f| (length / t) % f == 0) {
            best = t;
        }
    }
    best
}

/// Registers each work item needs to hold its butterfly operands.
pub fn compute_nregisters(length: usize, factors: &[usize], threads_per_transform: usize) -> usize {
    factors
        .iter()
        .map(|&w| {
            let height = (length as f64) / (w as f64) / (threads_per_transform as f64);
            (height.ceil() as usize) * w
        })
        .max()
        .unwrap_or(1)
}

impl StockhamSpec {
    /// Derive the spec for a plain 1-D row kernel.
    pub fn derive_row(
        length: usize,
        precision: Precision,
        placement: Placement,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        direction: Direction,
        embedded: EmbeddedKind,
    ) -> Result<StockhamSpec, FftError> {
        let entry = small_entry(length);
        let factors = factor_sequence(length).ok_or_else(|| FftError::unsupported_length(length))?;
        let (threads_per_transform, half_lds) = match entry {
            Some(e) => (e.threads_per_transform, e.half_lds),
            None => (derive_threads_per_transform(length, &factors), true),
        };
        // Embedded real processing keeps the full complex spectrum in LDS.
        let half_lds = half_lds && embedded == EmbeddedKind::None;
        let lds_bytes = length * lds_bytes_per_element(half_lds);
        let mut transforms_per_block = (THREADS_PER_BLOCK_MAX / threads_per_transform).max(1);
        if let Some(e) = entry {
            transforms_per_block =
                transforms_per_block.min((e.threads_per_block / threads_per_transform).max(1));
        }
        transforms_per_block = transforms_per_block.min((LDS_BYTE_LIMIT / lds_bytes).max(1));
        let threads_per_block = threads_per_transform * transforms_per_block;

        Ok(StockhamSpec {
            length,
            length2: None,
            precision,
            tiling: Tiling::Row,
            factors,
            factors2: Vec::new(),
            threads_per_transform,
            threads_per_transform2: 0,
            transforms_per_block,
            threads_per_block,
            half_lds,
            large_twiddle: false,
            block_width: 0,
            sbrc_variant: None,
            placement,
            in_layout,
            out_layout,
            direction,
            embedded,
            scale_bits: 1f64.to_bits(),
        })
    }

    /// Derive the spec for a column-block (SBCC) kernel of `length` rows,
    /// folding the outer roots in via the large twiddle table.
    pub fn derive_column_block(
        length: usize,
        precision: Precision,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        direction: Direction,
    ) -> Result<StockhamSpec, FftError> {
        let factors = block_cc_factors(length)
            .or_else(|| factor_sequence(length))
            .ok_or_else(|| FftError::unsupported_length(length))?;
        let min_w = factors.iter().copied().min().unwrap_or(1).max(1);
        let threads_per_transform = length / min_w;
        // Block compute always stages full complex values through LDS.
        let lds_per_column = length * BYTES_PER_ELEMENT;
        let block_width = BLOCK_WIDTH
            .min((LDS_BYTE_LIMIT / lds_per_column).max(1))
            .min((THREADS_PER_BLOCK_MAX / threads_per_transform).max(1));
        Ok(StockhamSpec {
            length,
            length2: None,
            precision,
            tiling: Tiling::ColumnBlock,
            factors,
            factors2: Vec::new(),
            threads_per_transform,
            threads_per_transform2: 0,
            transforms_per_block: block_width,
            threads_per_block: threads_per_transform * block_width,
            half_lds: false,
            large_twiddle: true,
            block_width,
            sbrc_variant: None,
            placement: Placement::OutOfPlace,
            in_layout,
            out_layout,
            direction,
            embedded: EmbeddedKind::None,
            scale_bits: 1f64.to_bits(),
        })
    }

    /// Derive the spec for a row-to-column (SBRC) kernel.
    pub fn derive_row_to_column_block(
        length: usize,
        precision: Precision,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        direction: Direction,
        variant: SbrcVariant,
    ) -> Result<StockhamSpec, FftError> {
        let entry = BLOCK_RC_KERNELS.iter().find(|(l, ..)| *l == length);
        let (factors, threads_per_block, threads_per_transform, block_width) = match entry {
            Some((_, f, tpb, tpt, bw)) => (f.to_vec(), *tpb, *tpt, *bw),
            None => {
                let factors =
                    factor_sequence(length).ok_or_else(|| FftError::unsupported_length(length))?;
                let tpt = derive_threads_per_transform(length, &factors);
                let bw = BLOCK_WIDTH
                    .min((LDS_BYTE_LIMIT / (length * BYTES_PER_ELEMENT)).max(1))
                    .min((THREADS_PER_BLOCK_MAX / tpt).max(1));
                (factors, tpt * bw, tpt, bw)
            }
        };
        Ok(StockhamSpec {
            length,
            length2: None,
            precision,
            tiling: Tiling::RowToColumnBlock,
            factors,
            factors2: Vec::new(),
            threads_per_transform,
            threads_per_transform2: 0,
            transforms_per_block: (threads_per_block / threads_per_transform).max(1),
            threads_per_block,
            half_lds: false,
            large_twiddle: false,
            block_width,
            sbrc_variant: Some(variant),
            placement: Placement::OutOfPlace,
            in_layout,
            out_layout,
            direction,
            embedded: EmbeddedKind::None,
            scale_bits: 1f64.to_bits(),
        })
    }

    /// Derive the spec for a column-to-row (SBCR) kernel.
    pub fn derive_column_to_row_block(
        length: usize,
        precision: Precision,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        direction: Direction,
    ) -> Result<StockhamSpec, FftError> {
        let mut spec =
            StockhamSpec::derive_column_block(length, precision, in_layout, out_layout, direction)?;
        spec.tiling = Tiling::ColumnToRowBlock;
        spec.large_twiddle = false;
        Ok(spec)
    }

    /// Derive the spec for a fused 2-D kernel over `(len0, len1)`, `len1`
    /// being the contiguous axis.
    pub fn derive_single_2d(
        len0: usize,
        len1: usize,
        precision: Precision,
        placement: Placement,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        direction: Direction,
    ) -> Result<StockhamSpec, FftError> {
        let factors0 =
            factor_sequence(len0).ok_or_else(|| FftError::unsupported_length(len0))?;
        let factors1 =
            factor_sequence(len1).ok_or_else(|| FftError::unsupported_length(len1))?;
        let max0 = factors0.iter().copied().max().unwrap_or(1).max(1);
        let max1 = factors1.iter().copied().max().unwrap_or(1).max(1);
        let tpt0 = (len0 / max0).max(1);
        let tpt1 = (len1 / max1).max(1);
        // Row pass: len0 concurrent transforms of len1, and vice versa; the
        // block must cover the larger demand.
        let threads_per_block = (tpt1 * len0).max(tpt0 * len1);
        Ok(StockhamSpec {
            length: len1,
            length2: Some(len0),
            precision,
            tiling: Tiling::Single2D,
            factors: factors1,
            factors2: factors0,
            threads_per_transform: tpt1,
            threads_per_transform2: tpt0,
            transforms_per_block: 1,
            threads_per_block,
            half_lds: false,
            large_twiddle: false,
            block_width: 0,
            sbrc_variant: None,
            placement,
            in_layout,
            out_layout,
            direction,
            embedded: EmbeddedKind::None,
            scale_bits: 1f64.to_bits(),
        })
    }

    pub fn scale(&self) -> f64 {
        f64::from_bits(self.scale_bits)
    }

    pub fn nregisters(&self) -> usize {
        compute_nregisters(self.length, &self.factors, self.threads_per_transform)
    }

    /// LDS bytes one block of this kernel needs.
    pub fn lds_bytes(&self) -> usize {
        let elems = match self.tiling {
            Tiling::Single2D => self.length * self.length2.unwrap_or(1),
            _ => self.length * self.transforms_per_block,
        };
        elems * self.precision.bytes_per_complex() / if self.half_lds { 2 } else { 1 }
    }
}

/// True when a fused 2-D kernel can run `(len0, len1)` in one block.
pub fn fits_single_2d(len0: usize, len1: usize) -> bool {
    if factor_sequence(len0).is_none() || factor_sequence(len1).is_none() {
        return false;
    }
    if len0 > 256 || len1 > 256 {
        return false;
    }
    len0 * len1 * BYTES_PER_ELEMENT <= LDS_BYTE_LIMIT
}

fn lds_bytes_per_element(half_lds: bool) -> usize {
    if half_lds {
        BYTES_PER_ELEMENT / 2
    } else {
        BYTES_PER_ELEMENT
    }
}
