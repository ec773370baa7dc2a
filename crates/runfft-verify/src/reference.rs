//! Trusted CPU reference transforms, backed by rustfft.
//!
//! All transforms are unnormalized in both directions, matching the
//! planner's convention (`inverse(forward(x)) == N * x`).

use num_complex::Complex64;
use rustfft::FftPlanner;

use runfft_core::Direction;

/// In-place transform along `axis` of `batch` dense row-major arrays.
pub fn fft_axis(
    data: &mut [Complex64],
    dims: &[usize],
    batch: usize,
    axis: usize,
    direction: Direction,
) {
    let len = dims[axis];
    if len <= 1 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = match direction {
        Direction::Forward => planner.plan_fft_forward(len),
        Direction::Inverse => planner.plan_fft_inverse(len),
    };
    let per_batch: usize = dims.iter().product();
    let axis_stride: usize = dims[axis + 1..].iter().product();
    let lines = per_batch / len;
    let mut scratch = vec![Complex64::new(0.0, 0.0); len];

    for b in 0..batch {
        let base = b * per_batch;
        for line in 0..lines {
            // Decompose the line index into coordinates of every axis
            // except `axis`.
            let mut rem = line;
            let mut start = base;
            for d in (0..dims.len()).rev() {
                if d == axis {
                    continue;
                }
                let stride: usize = dims[d + 1..].iter().product();
                let coord = rem % dims[d];
                rem /= dims[d];
                start += coord * stride;
            }
            for k in 0..len {
                scratch[k] = data[start + k * axis_stride];
            }
            fft.process(&mut scratch);
            for k in 0..len {
                data[start + k * axis_stride] = scratch[k];
            }
        }
    }
}

/// Dense complex transform over every axis.
pub fn reference_complex(
    input: &[Complex64],
    dims: &[usize],
    batch: usize,
    direction: Direction,
) -> Vec<Complex64> {
    let mut data = input.to_vec();
    for axis in 0..dims.len() {
        fft_axis(&mut data, dims, batch, axis, direction);
    }
    data
}

/// Real-forward reference: full complex transform of the real signal,
/// truncated to the Hermitian half on the last axis.
pub fn reference_real_forward(input: &[f64], dims: &[usize], batch: usize) -> Vec<Complex64> {
    let full: Vec<Complex64> = input.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    let spectrum = reference_complex(&full, dims, batch, Direction::Forward);
    let rank = dims.len();
    let h = dims[rank - 1] / 2 + 1;
    let per_batch: usize = dims.iter().product();
    let row = dims[rank - 1];
    let rows = per_batch / row;
    let mut out = Vec::with_capacity(batch * rows * h);
    for b in 0..batch {
        for r in 0..rows {
            let base = b * per_batch + r * row;
            out.extend_from_slice(&spectrum[base..base + h]);
        }
    }
    out
}

/// Real-inverse reference: expand the Hermitian half-spectrum to the
/// full spectrum, run the unnormalized inverse, and keep the real part
/// (which carries the `N * x` result).
pub fn reference_real_inverse(input: &[Complex64], dims: &[usize], batch: usize) -> Vec<f64> {
    let rank = dims.len();
    let h = dims[rank - 1] / 2 + 1;
    let per_batch: usize = dims.iter().product();
    let row = dims[rank - 1];
    let rows = per_batch / row;
    let half_per_batch = rows * h;

    let mut full = vec![Complex64::new(0.0, 0.0); batch * per_batch];
    for b in 0..batch {
        for idx in 0..per_batch {
            // Coordinates of this full-spectrum element.
            let mut rem = idx;
            let mut coords = vec![0usize; rank];
            for d in (0..rank).rev() {
                coords[d] = rem % dims[d];
                rem /= dims[d];
            }
            let stored = coords[rank - 1] < h;
            let value = if stored {
                let mut hrow = 0usize;
                for d in 0..rank - 1 {
                    hrow = hrow * dims[d] + coords[d];
                }
                input[b * half_per_batch + hrow * h + coords[rank - 1]]
            } else {
                // Conjugate-symmetric partner: negate every coordinate
                // modulo its axis length.
                let mut hrow = 0usize;
                for d in 0..rank - 1 {
                    let neg = (dims[d] - coords[d]) % dims[d];
                    hrow = hrow * dims[d] + neg;
                }
                let k = dims[rank - 1] - coords[rank - 1];
                input[b * half_per_batch + hrow * h + k].conj()
            };
            full[b * per_batch + idx] = value;
        }
    }
    let inv = reference_complex(&full, dims, batch, Direction::Inverse);
    inv.iter().map(|c| c.re).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_then_inverse_scales_by_n() {
        let dims = [4usize, 6];
        let input = crate::input::generate_complex(&dims, 1);
        let fwd = reference_complex(&input, &dims, 1, Direction::Forward);
        let back = reference_complex(&fwd, &dims, 1, Direction::Inverse);
        let n = 24.0;
        for (x, y) in input.iter().zip(back.iter()) {
            assert!((x.re * n - y.re).abs() < 1e-9);
            assert!((x.im * n - y.im).abs() < 1e-9);
        }
    }

    #[test]
    fn real_round_trip_reconstructs_the_signal() {
        let dims = [8usize];
        let x = crate::input::generate_real(&dims, 2);
        let spec = reference_real_forward(&x, &dims, 2);
        assert_eq!(spec.len(), 2 * 5);
        // Nyquist and DC imaginaries vanish for real input.
        for b in 0..2 {
            assert!(spec[b * 5].im.abs() < 1e-12);
            assert!(spec[b * 5 + 4].im.abs() < 1e-12);
        }
        let back = reference_real_inverse(&spec, &dims, 2);
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a * 8.0 - b).abs() < 1e-9);
        }
    }
}
