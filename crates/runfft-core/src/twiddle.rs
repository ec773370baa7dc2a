//! Precomputed roots-of-unity tables.
//!
//! Pass tables are laid out per pass contiguously: pass `p` of width `W_p`
//! and cumulative height `H_p` contributes `(W_p-1)*H_p` roots at base
//! offset `H_p - 1` (the per-pass sizes telescope, so a full table holds
//! exactly `L - 1` entries). The "large" table for column-block kernels
//! holds `L1*L2` outer roots indexed `[k1*L2 + n2]`. Everything is built in
//! exact double precision on the host and rounded to the transform
//! precision on read.

use std::collections::HashMap;
use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::descriptor::{Direction, Precision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TwiddleId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TwiddleKey {
    Pass {
        length: usize,
        factors: Vec<usize>,
        direction: Direction,
        precision: Precision,
        real_factors: bool,
    },
    Large {
        rows: usize,
        cols: usize,
        direction: Direction,
        precision: Precision,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwiddleKind {
    Pass,
    Large,
}

#[derive(Debug, Clone)]
pub struct TwiddleTable {
    pub kind: TwiddleKind,
    pub length: usize,
    pub factors: Vec<usize>,
    pub direction: Direction,
    pub precision: Precision,
    values: Vec<Complex64>,
    /// Offset of the appended real-twist factors, when present.
    pub real_factor_offset: Option<usize>,
}

impl TwiddleTable {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Table entry rounded to the transform precision.
    pub fn value(&self, idx: usize) -> Complex64 {
        round_to(self.values[idx], self.precision)
    }

    /// Root applied on pass `p` (cumulative height `cumheight`) to register
    /// column `w` of the butterfly owned by thread position `t`.
    pub fn pass_value(&self, cumheight: usize, width: usize, w: usize, t: usize) -> Complex64 {
        debug_assert!(w >= 1 && w < width);
        let idx = cumheight - 1 + (w - 1) + (width - 1) * (t % cumheight);
        self.value(idx)
    }

    /// Real pre/post twist factor `exp(sign*2*pi*i*k / (2*halfN))`.
    pub fn real_factor(&self, k: usize) -> Complex64 {
        let base = self
            .real_factor_offset
            .expect("table carries no real-processing factors");
        self.value(base + k)
    }

    /// Bytes this table occupies on device in its target precision.
    pub fn device_bytes(&self) -> usize {
        self.values.len() * self.precision.bytes_per_complex()
    }
}

fn round_to(v: Complex64, precision: Precision) -> Complex64 {
    match precision {
        Precision::F64 => v,
        Precision::F32 => Complex64::new(v.re as f32 as f64, v.im as f32 as f64),
    }
}

fn root(sign: f64, numerator: f64, denominator: f64) -> Complex64 {
    let theta = sign * 2.0 * PI * numerator / denominator;
    Complex64::new(theta.cos(), theta.sin())
}

/// Pass-table roots for one radix sequence, with optional real-twist
/// factors appended for kernels that fuse real pre/post processing.
fn build_pass_values(
    length: usize,
    factors: &[usize],
    direction: Direction,
    real_factors: bool,
) -> (Vec<Complex64>, Option<usize>) {
    let sign = direction.sign();
    let mut values = Vec::with_capacity(length.saturating_sub(1));
    let mut cumheight = 1usize;
    for &width in factors {
        for k in 0..cumheight {
            for j in 1..width {
                values.push(root(sign, (k * j) as f64, (width * cumheight) as f64));
            }
        }
        cumheight *= width;
    }
    debug_assert!(factors.is_empty() || values.len() == length.saturating_sub(1));

    let real_offset = if real_factors {
        let offset = values.len();
        // Twist roots over the full length 2*halfN, one per spectrum slot.
        for k in 0..=length {
            values.push(root(sign, k as f64, (2 * length) as f64));
        }
        Some(offset)
    } else {
        None
    };
    (values, real_offset)
}

/// Outer roots `exp(sign*2*pi*i * k1*n2 / (rows*cols))` for column-block
/// kernels, row-major over `(k1, n2)`.
fn build_large_values(rows: usize, cols: usize, direction: Direction) -> Vec<Complex64> {
    let sign = direction.sign();
    let n = (rows * cols) as f64;
    let mut values = Vec::with_capacity(rows * cols);
    for k1 in 0..rows {
        for n2 in 0..cols {
            values.push(root(sign, (k1 * n2) as f64, n));
        }
    }
    values
}

/// Interning arena for twiddle tables; nodes with identical parameters
/// share one table for the lifetime of the plan.
#[derive(Debug, Default)]
pub struct TwiddleArena {
    tables: Vec<TwiddleTable>,
    index: HashMap<TwiddleKey, TwiddleId>,
}

impl TwiddleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_pass(
        &mut self,
        length: usize,
        factors: &[usize],
        direction: Direction,
        precision: Precision,
        real_factors: bool,
    ) -> TwiddleId {
        let key = TwiddleKey::Pass {
            length,
            factors: factors.to_vec(),
            direction,
            precision,
            real_factors,
        };
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let (values, real_factor_offset) =
            build_pass_values(length, factors, direction, real_factors);
        let id = TwiddleId(self.tables.len());
        self.tables.push(TwiddleTable {
            kind: TwiddleKind::Pass,
            length,
            factors: factors.to_vec(),
            direction,
            precision,
            values,
            real_factor_offset,
        });
        self.index.insert(key, id);
        id
    }

    /// A table holding only the real pre/post twist factors, for
    /// standalone twist kernels.
    pub fn intern_real_factors(
        &mut self,
        half_length: usize,
        direction: Direction,
        precision: Precision,
    ) -> TwiddleId {
        self.intern_pass(half_length, &[], direction, precision, true)
    }

    pub fn intern_large(
        &mut self,
        rows: usize,
        cols: usize,
        direction: Direction,
        precision: Precision,
    ) -> TwiddleId {
        let key = TwiddleKey::Large {
            rows,
            cols,
            direction,
            precision,
        };
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = TwiddleId(self.tables.len());
        self.tables.push(TwiddleTable {
            kind: TwiddleKind::Large,
            length: rows * cols,
            factors: vec![rows, cols],
            direction,
            precision,
            values: build_large_values(rows, cols, direction),
            real_factor_offset: None,
        });
        self.index.insert(key, id);
        id
    }

    pub fn table(&self, id: TwiddleId) -> &TwiddleTable {
        &self.tables[id.0]
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TwiddleId, &TwiddleTable)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, t)| (TwiddleId(i), t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn length_64_pass_table_has_63_entries() {
        let mut arena = TwiddleArena::new();
        let id = arena.intern_pass(64, &[4, 4, 4], Direction::Forward, Precision::F32, false);
        assert_eq!(arena.table(id).len(), 63);
    }

    #[test]
    fn pass_table_indexing_matches_kernel_layout() {
        let mut arena = TwiddleArena::new();
        let id = arena.intern_pass(64, &[4, 4, 4], Direction::Forward, Precision::F64, false);
        let table = arena.table(id);
        // Pass 1: width 4, cumheight 4; thread position t=2, register w=3:
        // exp(-2*pi*i * k*j / (W*H)) with k = t % H = 2, j = 3.
        let got = table.pass_value(4, 4, 3, 2);
        let theta = -2.0 * PI * (2.0 * 3.0) / 16.0;
        assert!((got.re - theta.cos()).abs() < 1e-14);
        assert!((got.im - theta.sin()).abs() < 1e-14);
    }

    #[test]
    fn inverse_conjugates_forward() {
        let mut arena = TwiddleArena::new();
        let f = arena.intern_pass(8, &[4, 2], Direction::Forward, Precision::F64, false);
        let i = arena.intern_pass(8, &[4, 2], Direction::Inverse, Precision::F64, false);
        let (tf, ti) = (arena.table(f), arena.table(i));
        for idx in 0..tf.len() {
            let a = tf.value(idx);
            let b = ti.value(idx);
            assert!((a.re - b.re).abs() < 1e-15);
            assert!((a.im + b.im).abs() < 1e-15);
        }
    }

    #[test]
    fn large_table_covers_the_full_outer_product() {
        let mut arena = TwiddleArena::new();
        let id = arena.intern_large(256, 16, Direction::Forward, Precision::F32);
        let table = arena.table(id);
        assert_eq!(table.len(), 4096);
        // Entry (k1, n2) = (3, 5): exp(-2*pi*i * 15 / 4096), rounded to f32.
        let v = table.value(3 * 16 + 5);
        let theta = -2.0 * PI * 15.0 / 4096.0;
        assert!((v.re - (theta.cos() as f32 as f64)).abs() < 1e-12);
    }

    #[test]
    fn tables_are_shared_by_identity() {
        let mut arena = TwiddleArena::new();
        let a = arena.intern_pass(64, &[4, 4, 4], Direction::Forward, Precision::F32, false);
        let b = arena.intern_pass(64, &[4, 4, 4], Direction::Forward, Precision::F32, false);
        let c = arena.intern_pass(64, &[4, 4, 4], Direction::Inverse, Precision::F32, false);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn real_factors_are_appended_after_the_pass_roots() {
        let mut arena = TwiddleArena::new();
        let id = arena.intern_pass(4, &[4], Direction::Forward, Precision::F64, true);
        let table = arena.table(id);
        assert_eq!(table.real_factor_offset, Some(3));
        assert_eq!(table.len(), 3 + 5); // L-1 roots + (halfN+1) twist factors
        let w = table.real_factor(1);
        let theta = -2.0 * PI / 8.0;
        assert!((w.re - theta.cos()).abs() < 1e-15);
        assert!((w.im - theta.sin()).abs() < 1e-15);
    }
}
