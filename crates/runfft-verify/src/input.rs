//! Deterministic input generation.
//!
//! Values derive from the linearized element index through SplitMix64, so
//! any element of any descriptor regenerates independently of fill order.
//! Hermitian inputs get conjugate symmetry imposed on the stored
//! half-spectrum so the inverse of a real-forward result is well defined,
//! with the DC and Nyquist imaginaries pinned to zero.

use num_complex::Complex64;

use runfft_core::{ArrayLayout, FftError};

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Uniform value in [-0.5, 0.5) seeded by a linearized index.
pub fn seeded_value(index: u64) -> f64 {
    let bits = splitmix64(index);
    (bits >> 11) as f64 / (1u64 << 53) as f64 - 0.5
}

/// Complex value for one logical element.
pub fn seeded_complex(index: u64) -> Complex64 {
    Complex64::new(seeded_value(2 * index), seeded_value(2 * index + 1))
}

/// Dense complex data for `batch` arrays of `dims`, seeded per element.
pub fn generate_complex(dims: &[usize], batch: usize) -> Vec<Complex64> {
    let per_batch: usize = dims.iter().product();
    (0..batch * per_batch)
        .map(|i| seeded_complex(i as u64))
        .collect()
}

/// Dense real data for `batch` arrays of `dims`.
pub fn generate_real(dims: &[usize], batch: usize) -> Vec<f64> {
    let per_batch: usize = dims.iter().product();
    (0..batch * per_batch)
        .map(|i| seeded_value(i as u64))
        .collect()
}

/// Impose conjugate symmetry on a stored half-spectrum of logical
/// transform `length` (so `dims` has `length[last]/2 + 1` on the last
/// axis). Supported for ranks 1-3 on interleaved data; planar layouts
/// only carry rank-1 symmetry, matching the descriptor-level support.
pub fn impose_hermitian_symmetry(
    data: &mut [Complex64],
    length: &[usize],
    layout: ArrayLayout,
    batch: usize,
) -> Result<(), FftError> {
    if layout == ArrayLayout::HermitianPlanar && length.len() > 1 {
        return Err(FftError::invalid_config(
            "hermitian symmetry imposition unsupported for multi-dimensional planar data",
        ));
    }
    let rank = length.len();
    let h = length[rank - 1] / 2 + 1;
    let last_even = length[rank - 1] % 2 == 0;
    let per_batch: usize = length[..rank - 1].iter().product::<usize>() * h;

    for b in 0..batch {
        let data = &mut data[b * per_batch..(b + 1) * per_batch];
        match rank {
            1 => {
                data[0].im = 0.0;
                if last_even {
                    data[h - 1].im = 0.0;
                }
            }
            2 => {
                let l0 = length[0];
                let idx = |i: usize, k: usize| i * h + k;
                data[idx(0, 0)].im = 0.0;
                if last_even {
                    data[idx(0, h - 1)].im = 0.0;
                }
                if l0 % 2 == 0 {
                    data[idx(l0 / 2, 0)].im = 0.0;
                    if last_even {
                        data[idx(l0 / 2, h - 1)].im = 0.0;
                    }
                }
                for i in 1..(l0 + 1) / 2 {
                    data[idx(l0 - i, 0)] = data[idx(i, 0)].conj();
                    if last_even {
                        data[idx(l0 - i, h - 1)] = data[idx(i, h - 1)].conj();
                    }
                }
            }
            3 => {
                let (l0, l1) = (length[0], length[1]);
                let idx = |i: usize, j: usize, k: usize| (i * l1 + j) * h + k;
                // The k = 0 and (even) k = h-1 planes must each be a
                // valid 2-D hermitian plane over (i, j).
                let planes: Vec<usize> = if last_even { vec![0, h - 1] } else { vec![0] };
                for &k in &planes {
                    data[idx(0, 0, k)].im = 0.0;
                    if l0 % 2 == 0 {
                        data[idx(l0 / 2, 0, k)].im = 0.0;
                    }
                    if l1 % 2 == 0 {
                        data[idx(0, l1 / 2, k)].im = 0.0;
                    }
                    if l0 % 2 == 0 && l1 % 2 == 0 {
                        data[idx(l0 / 2, l1 / 2, k)].im = 0.0;
                    }
                    for j in 1..(l1 + 1) / 2 {
                        data[idx(0, l1 - j, k)] = data[idx(0, j, k)].conj();
                        if l0 % 2 == 0 {
                            data[idx(l0 / 2, l1 - j, k)] = data[idx(l0 / 2, j, k)].conj();
                        }
                    }
                    for i in 1..(l0 + 1) / 2 {
                        data[idx(l0 - i, 0, k)] = data[idx(i, 0, k)].conj();
                        if l1 % 2 == 0 {
                            data[idx(l0 - i, l1 / 2, k)] = data[idx(i, l1 / 2, k)].conj();
                        }
                    }
                    for i in 1..(l0 + 1) / 2 {
                        for j in 1..l1 {
                            data[idx(l0 - i, l1 - j, k)] = data[idx(i, j, k)].conj();
                        }
                    }
                }
            }
            _ => {
                return Err(FftError::invalid_config(
                    "hermitian symmetry imposition supports ranks 1 to 3",
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_values_are_deterministic_and_bounded() {
        assert_eq!(seeded_value(42), seeded_value(42));
        assert_ne!(seeded_value(42), seeded_value(43));
        for i in 0..1000 {
            let v = seeded_value(i);
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn rank1_symmetry_pins_dc_and_nyquist() {
        let mut data = generate_complex(&[5], 2);
        impose_hermitian_symmetry(&mut data, &[8], ArrayLayout::HermitianInterleaved, 2).unwrap();
        for b in 0..2 {
            assert_eq!(data[b * 5].im, 0.0);
            assert_eq!(data[b * 5 + 4].im, 0.0);
        }
    }

    #[test]
    fn rank2_symmetry_conjugates_the_edge_columns() {
        let l0 = 6;
        let h = 5; // length [6, 8]
        let mut data = generate_complex(&[l0, h], 1);
        impose_hermitian_symmetry(&mut data, &[6, 8], ArrayLayout::HermitianInterleaved, 1)
            .unwrap();
        for i in 1..3 {
            assert_eq!(data[(l0 - i) * h], data[i * h].conj());
            assert_eq!(data[(l0 - i) * h + h - 1], data[i * h + h - 1].conj());
        }
        assert_eq!(data[3 * h].im, 0.0); // l0/2 row, k = 0
    }

    #[test]
    fn multi_dim_planar_symmetry_is_rejected() {
        let mut data = generate_complex(&[4, 3], 1);
        let err = impose_hermitian_symmetry(&mut data, &[4, 4], ArrayLayout::HermitianPlanar, 1)
            .unwrap_err();
        assert!(matches!(err, FftError::InvalidConfig(_)));
    }
}
