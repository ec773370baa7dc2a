//! Canonical, validated transform descriptors.
//!
//! A raw [`FftRequest`] leaves strides, distances and layouts optional;
//! [`FftRequest::normalize`] fills the gaps in row-major order and enforces
//! every layout/placement invariant, producing an immutable
//! [`FftDescriptor`] that the plan builder consumes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FftError;

/// Floating point precision of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    F32,
    F64,
}

impl Precision {
    pub fn bytes_per_real(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }

    pub fn bytes_per_complex(self) -> usize {
        2 * self.bytes_per_real()
    }

    pub fn epsilon(self) -> f64 {
        match self {
            Precision::F32 => f32::EPSILON as f64,
            Precision::F64 => f64::EPSILON,
        }
    }

    /// Token-grammar name (`single`/`double`).
    pub fn token(self) -> &'static str {
        match self {
            Precision::F32 => "single",
            Precision::F64 => "double",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    /// Sign of the exponent in `exp(sign * 2*pi*i * ...)`.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    InPlace,
    OutOfPlace,
}

impl Placement {
    pub fn token(self) -> &'static str {
        match self {
            Placement::InPlace => "ip",
            Placement::OutOfPlace => "op",
        }
    }
}

/// Memory layout of one side of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayLayout {
    ComplexInterleaved,
    ComplexPlanar,
    Real,
    HermitianInterleaved,
    HermitianPlanar,
}

impl ArrayLayout {
    /// Number of device buffers this layout occupies (2 for planar).
    pub fn buffer_count(self) -> usize {
        match self {
            ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => 2,
            _ => 1,
        }
    }

    pub fn is_planar(self) -> bool {
        self.buffer_count() == 2
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            ArrayLayout::ComplexInterleaved | ArrayLayout::ComplexPlanar
        )
    }

    pub fn is_hermitian(self) -> bool {
        matches!(
            self,
            ArrayLayout::HermitianInterleaved | ArrayLayout::HermitianPlanar
        )
    }

    pub fn is_real(self) -> bool {
        matches!(self, ArrayLayout::Real)
    }

    /// Token-grammar tag.
    pub fn token(self) -> &'static str {
        match self {
            ArrayLayout::ComplexInterleaved => "CI",
            ArrayLayout::ComplexPlanar => "CP",
            ArrayLayout::Real => "R",
            ArrayLayout::HermitianInterleaved => "HI",
            ArrayLayout::HermitianPlanar => "HP",
        }
    }

    pub fn from_token(tag: &str) -> Option<ArrayLayout> {
        match tag {
            "CI" => Some(ArrayLayout::ComplexInterleaved),
            "CP" => Some(ArrayLayout::ComplexPlanar),
            "R" => Some(ArrayLayout::Real),
            "HI" => Some(ArrayLayout::HermitianInterleaved),
            "HP" => Some(ArrayLayout::HermitianPlanar),
            _ => None,
        }
    }
}

/// The four transform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    ComplexForward,
    ComplexInverse,
    RealForward,
    RealInverse,
}

impl TransformKind {
    pub fn direction(self) -> Direction {
        match self {
            TransformKind::ComplexForward | TransformKind::RealForward => Direction::Forward,
            TransformKind::ComplexInverse | TransformKind::RealInverse => Direction::Inverse,
        }
    }

    pub fn is_real(self) -> bool {
        matches!(self, TransformKind::RealForward | TransformKind::RealInverse)
    }

    pub fn token(self) -> &'static str {
        match self {
            TransformKind::ComplexForward => "complex_forward",
            TransformKind::ComplexInverse => "complex_inverse",
            TransformKind::RealForward => "real_forward",
            TransformKind::RealInverse => "real_inverse",
        }
    }

    fn default_input_layout(self) -> ArrayLayout {
        match self {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                ArrayLayout::ComplexInterleaved
            }
            TransformKind::RealForward => ArrayLayout::Real,
            TransformKind::RealInverse => ArrayLayout::HermitianInterleaved,
        }
    }

    fn default_output_layout(self) -> ArrayLayout {
        match self {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                ArrayLayout::ComplexInterleaved
            }
            TransformKind::RealForward => ArrayLayout::HermitianInterleaved,
            TransformKind::RealInverse => ArrayLayout::Real,
        }
    }
}

/// A raw transform request. Empty strides/offsets and zero distances mean
/// "derive from the lengths"; unset layouts default per transform kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FftRequest {
    pub length: Vec<usize>,
    pub batch: usize,
    pub precision: Precision,
    pub transform: TransformKind,
    pub placement: Placement,
    pub input_layout: Option<ArrayLayout>,
    pub output_layout: Option<ArrayLayout>,
    pub istride: Vec<usize>,
    pub ostride: Vec<usize>,
    pub idist: usize,
    pub odist: usize,
    pub ioffset: Vec<usize>,
    pub ooffset: Vec<usize>,
}

impl Default for FftRequest {
    fn default() -> Self {
        Self {
            length: Vec::new(),
            batch: 1,
            precision: Precision::F32,
            transform: TransformKind::ComplexForward,
            placement: Placement::OutOfPlace,
            input_layout: None,
            output_layout: None,
            istride: Vec::new(),
            ostride: Vec::new(),
            idist: 0,
            odist: 0,
            ioffset: Vec::new(),
            ooffset: Vec::new(),
        }
    }
}

/// A fully resolved, validated transform descriptor. All strides and
/// distances are in elements of the owning buffer's element type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FftDescriptor {
    pub length: Vec<usize>,
    pub batch: usize,
    pub precision: Precision,
    pub transform: TransformKind,
    pub placement: Placement,
    pub input_layout: ArrayLayout,
    pub output_layout: ArrayLayout,
    pub istride: Vec<usize>,
    pub ostride: Vec<usize>,
    pub idist: usize,
    pub odist: usize,
    pub ioffset: Vec<usize>,
    pub ooffset: Vec<usize>,
}

/// Row-major strides for `length`, fastest axis last with stride 1.
fn row_major_strides(length: &[usize]) -> Vec<usize> {
    let dim = length.len();
    let mut stride = vec![1usize; dim];
    for i in (0..dim.saturating_sub(1)).rev() {
        stride[i] = stride[i + 1] * length[i + 1];
    }
    stride
}

/// Farthest element index touched by `batch` arrays of the given shape.
pub fn ptrdiff(length: &[usize], stride: &[usize], batch: usize, dist: usize) -> usize {
    if length.is_empty() {
        return 0;
    }
    let mut val = 1usize;
    for (l, s) in length.iter().zip(stride.iter()) {
        val += (l - 1) * s;
    }
    val + (batch - 1) * dist
}

impl FftRequest {
    /// Resolve defaults and enforce every descriptor invariant.
    pub fn normalize(self) -> Result<FftDescriptor, FftError> {
        if self.length.is_empty() || self.length.len() > 3 {
            return Err(FftError::invalid_config(format!(
                "transform rank must be 1..=3, got {}",
                self.length.len()
            )));
        }
        if self.length.contains(&0) {
            return Err(FftError::invalid_config("transform lengths must be >= 1"));
        }
        if self.batch == 0 {
            return Err(FftError::invalid_config("batch must be >= 1"));
        }

        let transform = self.transform;
        let input_layout = self
            .input_layout
            .unwrap_or_else(|| transform.default_input_layout());
        let output_layout = self
            .output_layout
            .unwrap_or_else(|| transform.default_output_layout());

        check_layouts(transform, input_layout, output_layout)?;

        let mut desc = FftDescriptor {
            length: self.length,
            batch: self.batch,
            precision: self.precision,
            transform,
            placement: self.placement,
            input_layout,
            output_layout,
            istride: self.istride,
            ostride: self.ostride,
            idist: self.idist,
            odist: self.odist,
            ioffset: self.ioffset,
            ooffset: self.ooffset,
        };

        desc.fill_strides()?;
        desc.fill_dists();
        desc.fill_offsets()?;
        desc.check_placement()?;
        Ok(desc)
    }
}

fn check_layouts(
    transform: TransformKind,
    input: ArrayLayout,
    output: ArrayLayout,
) -> Result<(), FftError> {
    let ok = match transform {
        TransformKind::ComplexForward | TransformKind::ComplexInverse => {
            input.is_complex() && output.is_complex()
        }
        TransformKind::RealForward => input.is_real() && output.is_hermitian(),
        TransformKind::RealInverse => input.is_hermitian() && output.is_real(),
    };
    if !ok {
        return Err(FftError::invalid_config(format!(
            "layouts {input:?} -> {output:?} are incompatible with {transform:?}"
        )));
    }
    Ok(())
}

impl FftDescriptor {
    pub fn rank(&self) -> usize {
        self.length.len()
    }

    pub fn direction(&self) -> Direction {
        self.transform.direction()
    }

    /// The transform lengths, as requested.
    pub fn logical_length(&self) -> &[usize] {
        &self.length
    }

    /// Total number of logical points, over all axes.
    pub fn length_product(&self) -> usize {
        self.length.iter().product()
    }

    /// Data dimensions of the input side: the Hermitian axis halves to
    /// `L/2 + 1` on real-inverse input.
    pub fn memory_length_in(&self) -> Vec<usize> {
        let mut l = self.length.clone();
        if self.input_layout.is_hermitian() {
            let last = l.len() - 1;
            l[last] = l[last] / 2 + 1;
        }
        l
    }

    /// Data dimensions of the output side.
    pub fn memory_length_out(&self) -> Vec<usize> {
        let mut l = self.length.clone();
        if self.output_layout.is_hermitian() {
            let last = l.len() - 1;
            l[last] = l[last] / 2 + 1;
        }
        l
    }

    /// Bytes per buffer for `element_count` elements of the given layout.
    pub fn buffer_bytes(layout: ArrayLayout, precision: Precision, element_count: usize) -> usize {
        let per_element = match layout {
            ArrayLayout::ComplexInterleaved | ArrayLayout::HermitianInterleaved => {
                precision.bytes_per_complex()
            }
            _ => precision.bytes_per_real(),
        };
        element_count * per_element
    }

    /// Element count a caller must provide per input buffer.
    pub fn input_elements(&self) -> usize {
        let ml = self.memory_length_in();
        ptrdiff(&ml, &self.istride, self.batch, self.idist) + self.ioffset.iter().max().copied().unwrap_or(0)
    }

    /// Element count a caller must provide per output buffer.
    pub fn output_elements(&self) -> usize {
        let ml = self.memory_length_out();
        ptrdiff(&ml, &self.ostride, self.batch, self.odist) + self.ooffset.iter().max().copied().unwrap_or(0)
    }

    /// True when the real side of an in-place real transform carries the
    /// `2*(L/2+1)` row padding.
    fn real_inplace(&self) -> bool {
        self.transform.is_real() && self.placement == Placement::InPlace
    }

    fn fill_strides(&mut self) -> Result<(), FftError> {
        let dim = self.rank();

        let mut in_len = self.memory_length_in();
        if self.real_inplace() && self.input_layout.is_real() {
            in_len[dim - 1] = 2 * (self.length[dim - 1] / 2 + 1);
        }
        if self.istride.is_empty() {
            self.istride = row_major_strides(&in_len);
        } else if self.istride.len() != dim {
            return Err(FftError::invalid_config(format!(
                "istride has {} entries for a rank-{} transform",
                self.istride.len(),
                dim
            )));
        }

        let mut out_len = self.memory_length_out();
        if self.real_inplace() && self.output_layout.is_real() {
            out_len[dim - 1] = 2 * (self.length[dim - 1] / 2 + 1);
        }
        if self.ostride.is_empty() {
            self.ostride = row_major_strides(&out_len);
        } else if self.ostride.len() != dim {
            return Err(FftError::invalid_config(format!(
                "ostride has {} entries for a rank-{} transform",
                self.ostride.len(),
                dim
            )));
        }
        Ok(())
    }

    fn fill_dists(&mut self) {
        let dim = self.rank();
        if self.idist == 0 {
            let mut in_len = self.memory_length_in();
            if self.real_inplace() && self.input_layout.is_real() {
                in_len[dim - 1] = 2 * (self.length[dim - 1] / 2 + 1);
            }
            self.idist = in_len
                .iter()
                .zip(self.istride.iter())
                .map(|(l, s)| l * s)
                .max()
                .unwrap_or(1);
        }
        if self.odist == 0 {
            let mut out_len = self.memory_length_out();
            if self.real_inplace() && self.output_layout.is_real() {
                out_len[dim - 1] = 2 * (self.length[dim - 1] / 2 + 1);
            }
            self.odist = out_len
                .iter()
                .zip(self.ostride.iter())
                .map(|(l, s)| l * s)
                .max()
                .unwrap_or(1);
        }
    }

    fn fill_offsets(&mut self) -> Result<(), FftError> {
        if self.ioffset.is_empty() {
            self.ioffset = vec![0; self.input_layout.buffer_count()];
        }
        if self.ooffset.is_empty() {
            self.ooffset = vec![0; self.output_layout.buffer_count()];
        }
        if self.ioffset.len() != self.input_layout.buffer_count() {
            return Err(FftError::invalid_config(format!(
                "ioffset needs {} entries for {:?}",
                self.input_layout.buffer_count(),
                self.input_layout
            )));
        }
        if self.ooffset.len() != self.output_layout.buffer_count() {
            return Err(FftError::invalid_config(format!(
                "ooffset needs {} entries for {:?}",
                self.output_layout.buffer_count(),
                self.output_layout
            )));
        }
        Ok(())
    }

    fn check_placement(&self) -> Result<(), FftError> {
        if self.placement != Placement::InPlace {
            return Ok(());
        }
        let dim = self.rank();
        match self.transform {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                if self.input_layout != self.output_layout {
                    return Err(FftError::invalid_config(
                        "in-place complex transforms require identical input and output layouts",
                    ));
                }
                if self.istride != self.ostride || self.idist != self.odist {
                    return Err(FftError::invalid_config(
                        "in-place complex transforms require identical strides and distances",
                    ));
                }
                if self.ioffset != self.ooffset {
                    return Err(FftError::invalid_config(
                        "in-place complex transforms require identical buffer offsets",
                    ));
                }
            }
            TransformKind::RealForward | TransformKind::RealInverse => {
                if self.istride[dim - 1] != 1 || self.ostride[dim - 1] != 1 {
                    return Err(FftError::invalid_config(
                        "in-place real transforms require unit stride on the contiguous axis",
                    ));
                }
                let padded = 2 * (self.length[dim - 1] / 2 + 1);
                let (real_stride, real_dist, real_len) = if self.input_layout.is_real() {
                    (&self.istride, self.idist, self.memory_length_in())
                } else {
                    (&self.ostride, self.odist, self.memory_length_out())
                };
                // Row capacity on the real side: next-higher stride for
                // multi-dimensional data, batch distance for rank 1.
                let capacity = if dim > 1 {
                    real_stride[dim - 2]
                } else {
                    real_dist
                };
                let _ = real_len;
                if capacity < padded {
                    return Err(FftError::invalid_config(format!(
                        "in-place real transform needs capacity for {padded} elements on the contiguous axis, found {capacity}"
                    )));
                }
                let ok_offsets = match self.transform {
                    TransformKind::RealForward => self
                        .ioffset
                        .iter()
                        .zip(self.ooffset.iter())
                        .all(|(i, o)| *i == 2 * *o),
                    _ => self
                        .ioffset
                        .iter()
                        .zip(self.ooffset.iter())
                        .all(|(i, o)| 2 * *i == *o),
                };
                if !ok_offsets {
                    return Err(FftError::invalid_config(
                        "in-place real transform offsets must pair the real and complex views of the same bytes",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for FftDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "length:")?;
        for l in &self.length {
            write!(f, " {l}")?;
        }
        write!(f, ", istride:")?;
        for s in &self.istride {
            write!(f, " {s}")?;
        }
        write!(f, ", idist: {}", self.idist)?;
        write!(f, ", ostride:")?;
        for s in &self.ostride {
            write!(f, " {s}")?;
        }
        write!(f, ", odist: {}", self.odist)?;
        write!(f, ", batch: {}", self.batch)?;
        write!(f, ", ioffset:")?;
        for o in &self.ioffset {
            write!(f, " {o}")?;
        }
        write!(f, ", ooffset:")?;
        for o in &self.ooffset {
            write!(f, " {o}")?;
        }
        write!(
            f,
            ", {}, {:?} -> {:?}, {}, {}",
            match self.placement {
                Placement::InPlace => "in-place",
                Placement::OutOfPlace => "out-of-place",
            },
            self.input_layout,
            self.output_layout,
            self.transform.token(),
            self.precision.token(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c2c(length: Vec<usize>) -> FftRequest {
        FftRequest {
            length,
            ..Default::default()
        }
    }

    #[test]
    fn complex_defaults_are_row_major() {
        let desc = c2c(vec![64]).normalize().unwrap();
        assert_eq!(desc.istride, vec![1]);
        assert_eq!(desc.idist, 64);
        assert_eq!(desc.odist, 64);
        assert_eq!(desc.input_layout, ArrayLayout::ComplexInterleaved);
        assert_eq!(desc.ioffset, vec![0]);
    }

    #[test]
    fn multi_dim_strides_prefix_scan() {
        let desc = c2c(vec![4, 8, 16]).normalize().unwrap();
        assert_eq!(desc.istride, vec![128, 16, 1]);
        assert_eq!(desc.idist, 512);
    }

    #[test]
    fn real_forward_in_place_pads_the_contiguous_axis() {
        let desc = FftRequest {
            length: vec![8],
            batch: 3,
            transform: TransformKind::RealForward,
            placement: Placement::InPlace,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(desc.istride, vec![1]);
        assert_eq!(desc.idist, 10); // 2*(8/2+1)
        assert_eq!(desc.odist, 5);
        assert_eq!(desc.memory_length_out(), vec![5]);
    }

    #[test]
    fn real_forward_offsets_must_alias() {
        let err = FftRequest {
            length: vec![8],
            transform: TransformKind::RealForward,
            placement: Placement::InPlace,
            ioffset: vec![1],
            ooffset: vec![1],
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, FftError::InvalidConfig(_)));

        let ok = FftRequest {
            length: vec![8],
            transform: TransformKind::RealForward,
            placement: Placement::InPlace,
            ioffset: vec![2],
            ooffset: vec![1],
            ..Default::default()
        }
        .normalize();
        assert!(ok.is_ok());
    }

    #[test]
    fn in_place_complex_rejects_mismatched_strides() {
        let err = FftRequest {
            length: vec![16],
            placement: Placement::InPlace,
            istride: vec![1],
            ostride: vec![2],
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, FftError::InvalidConfig(_)));
    }

    #[test]
    fn hermitian_layouts_require_real_partner() {
        let err = FftRequest {
            length: vec![16],
            transform: TransformKind::RealForward,
            output_layout: Some(ArrayLayout::ComplexInterleaved),
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, FftError::InvalidConfig(_)));
    }

    #[test]
    fn zero_length_rejected() {
        assert!(c2c(vec![0]).normalize().is_err());
        assert!(c2c(vec![]).normalize().is_err());
        assert!(c2c(vec![2, 2, 2, 2]).normalize().is_err());
    }

    #[test]
    fn ptrdiff_counts_farthest_element() {
        assert_eq!(ptrdiff(&[8], &[1], 3, 10), 28);
        assert_eq!(ptrdiff(&[4, 8], &[8, 1], 1, 32), 32);
    }
}
