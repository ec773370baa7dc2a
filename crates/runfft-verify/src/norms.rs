//! Difference norms and tolerances.

use num_complex::Complex64;

use runfft_core::Precision;

#[derive(Debug, Clone, Copy)]
pub struct DiffNorms {
    pub l_2: f64,
    pub l_inf: f64,
}

/// Absolute L2 / L-infinity norms of `a - b`.
pub fn diff_norms(a: &[Complex64], b: &[Complex64]) -> DiffNorms {
    debug_assert_eq!(a.len(), b.len());
    let mut l2 = 0.0f64;
    let mut linf = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let dre = (x.re - y.re).abs();
        let dim = (x.im - y.im).abs();
        linf = linf.max(dre).max(dim);
        l2 += dre * dre + dim * dim;
    }
    DiffNorms {
        l_2: l2.sqrt(),
        l_inf: linf,
    }
}

/// Norms of the data itself, for relative comparison.
pub fn data_norms(a: &[Complex64]) -> DiffNorms {
    let mut l2 = 0.0f64;
    let mut linf = 0.0f64;
    for x in a {
        linf = linf.max(x.re.abs()).max(x.im.abs());
        l2 += x.re * x.re + x.im * x.im;
    }
    DiffNorms {
        l_2: l2.sqrt(),
        l_inf: linf,
    }
}

/// Failure threshold for a transform of `total` logical points: scales
/// with the square root of the problem size and the working precision.
pub fn tolerance(total: usize, precision: Precision) -> f64 {
    const C: f64 = 4.0;
    C * (total as f64).sqrt() * precision.epsilon()
}
