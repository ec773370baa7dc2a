//! End-to-end accuracy driver.
//!
//! Given a descriptor (or a kernel token), build seeded input, run the
//! plan through the host interpreter, compute the rustfft reference, and
//! report relative L2/L-infinity distances against the size- and
//! precision-scaled tolerance.

use std::sync::Arc;

use num_complex::Complex64;

use runfft::{ExecParams, FftContext, FftDescriptor, FftError, Plan, RtcCache, TransformKind};
use runfft_core::{token, ArrayLayout};

use crate::host::HostHarness;
use crate::input;
use crate::norms::{self, DiffNorms};
use crate::reference;

#[derive(Debug)]
pub struct AccuracyReport {
    pub diff: DiffNorms,
    pub reference: DiffNorms,
    pub tolerance: f64,
}

impl AccuracyReport {
    pub fn linf_relative(&self) -> f64 {
        self.diff.l_inf / self.reference.l_inf.max(f64::MIN_POSITIVE)
    }

    pub fn l2_relative(&self) -> f64 {
        self.diff.l_2 / self.reference.l_2.max(f64::MIN_POSITIVE)
    }

    pub fn passed(&self) -> bool {
        self.linf_relative() <= self.tolerance && self.l2_relative() <= self.tolerance
    }
}

fn scalars_per_buffer(layout: ArrayLayout, elements: usize) -> usize {
    match layout {
        ArrayLayout::ComplexInterleaved | ArrayLayout::HermitianInterleaved => 2 * elements,
        _ => elements,
    }
}

/// Scatter dense row-major complex data into layout buffers.
#[allow(clippy::too_many_arguments)]
fn scatter_complex(
    bufs: &mut [Vec<f64>],
    layout: ArrayLayout,
    offsets: &[usize],
    dims: &[usize],
    strides: &[usize],
    dist: usize,
    batch: usize,
    data: &[Complex64],
) {
    let per_batch: usize = dims.iter().product();
    for b in 0..batch {
        for flat in 0..per_batch {
            let mut rem = flat;
            let mut p = b * dist;
            for d in (0..dims.len()).rev() {
                let idx = rem % dims[d];
                rem /= dims[d];
                p += idx * strides[d];
            }
            let v = data[b * per_batch + flat];
            match layout {
                ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
                    bufs[0][offsets[0] + p] = v.re;
                    bufs[1][offsets[1] + p] = v.im;
                }
                ArrayLayout::Real => unreachable!("real data scatters as scalars"),
                _ => {
                    let base = 2 * (offsets[0] + p);
                    bufs[0][base] = v.re;
                    bufs[0][base + 1] = v.im;
                }
            }
        }
    }
}

/// Gather layout buffers back into dense row-major complex data.
fn gather_complex(
    bufs: &[Vec<f64>],
    layout: ArrayLayout,
    offsets: &[usize],
    dims: &[usize],
    strides: &[usize],
    dist: usize,
    batch: usize,
) -> Vec<Complex64> {
    let per_batch: usize = dims.iter().product();
    let mut out = Vec::with_capacity(batch * per_batch);
    for b in 0..batch {
        for flat in 0..per_batch {
            let mut rem = flat;
            let mut p = b * dist;
            for d in (0..dims.len()).rev() {
                let idx = rem % dims[d];
                rem /= dims[d];
                p += idx * strides[d];
            }
            let v = match layout {
                ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
                    Complex64::new(bufs[0][offsets[0] + p], bufs[1][offsets[1] + p])
                }
                ArrayLayout::Real => Complex64::new(bufs[0][offsets[0] + p], 0.0),
                _ => {
                    let base = 2 * (offsets[0] + p);
                    Complex64::new(bufs[0][base], bufs[0][base + 1])
                }
            };
            out.push(v);
        }
    }
    out
}

fn scatter_real(
    buf: &mut [f64],
    offset: usize,
    dims: &[usize],
    strides: &[usize],
    dist: usize,
    batch: usize,
    data: &[f64],
) {
    let per_batch: usize = dims.iter().product();
    for b in 0..batch {
        for flat in 0..per_batch {
            let mut rem = flat;
            let mut p = b * dist;
            for d in (0..dims.len()).rev() {
                let idx = rem % dims[d];
                rem /= dims[d];
                p += idx * strides[d];
            }
            buf[offset + p] = data[b * per_batch + flat];
        }
    }
}

/// Build input, execute the plan on the host interpreter, and compare
/// against the reference transform.
pub fn run_accuracy_case(desc: FftDescriptor) -> Result<AccuracyReport, FftError> {
    let ctx = FftContext::with_cache(Arc::new(RtcCache::in_memory(runfft_cache_budget())));
    let plan = Plan::new(desc.clone())?;
    let harness = HostHarness::new();

    // Allocate and fill the input side. In-place buffers must cover both
    // views (a padded real row and its Hermitian complex alias differ).
    let in_dims = desc.memory_length_in();
    let in_elems = desc.input_elements();
    let mut in_alloc = scalars_per_buffer(desc.input_layout, in_elems);
    if desc.placement == runfft::Placement::InPlace {
        in_alloc = in_alloc.max(scalars_per_buffer(
            desc.output_layout,
            desc.output_elements(),
        ));
    }
    let in_ids: Vec<u64> = (0..desc.input_layout.buffer_count())
        .map(|_| harness.alloc(in_alloc))
        .collect();
    let mut in_bufs: Vec<Vec<f64>> = in_ids.iter().map(|id| harness.read(*id)).collect();

    let expected: Vec<Complex64>;
    let expected_real: Option<Vec<f64>>;
    match desc.transform {
        TransformKind::ComplexForward | TransformKind::ComplexInverse => {
            let data = input::generate_complex(&desc.length, desc.batch);
            scatter_complex(
                &mut in_bufs,
                desc.input_layout,
                &desc.ioffset,
                &in_dims,
                &desc.istride,
                desc.idist,
                desc.batch,
                &data,
            );
            expected =
                reference::reference_complex(&data, &desc.length, desc.batch, desc.direction());
            expected_real = None;
        }
        TransformKind::RealForward => {
            let data = input::generate_real(&desc.length, desc.batch);
            scatter_real(
                &mut in_bufs[0],
                desc.ioffset[0],
                &in_dims,
                &desc.istride,
                desc.idist,
                desc.batch,
                &data,
            );
            expected = reference::reference_real_forward(&data, &desc.length, desc.batch);
            expected_real = None;
        }
        TransformKind::RealInverse => {
            let mut data = input::generate_complex(&in_dims, desc.batch);
            input::impose_hermitian_symmetry(
                &mut data,
                &desc.length,
                desc.input_layout,
                desc.batch,
            )?;
            scatter_complex(
                &mut in_bufs,
                desc.input_layout,
                &desc.ioffset,
                &in_dims,
                &desc.istride,
                desc.idist,
                desc.batch,
                &data,
            );
            expected = Vec::new();
            expected_real = Some(reference::reference_real_inverse(
                &data,
                &desc.length,
                desc.batch,
            ));
        }
    }
    for (id, buf) in in_ids.iter().zip(in_bufs.into_iter()) {
        harness.write(*id, buf);
    }

    // Output and scratch buffers; in-place plans alias the input ids.
    let out_ids: Vec<u64> = if desc.placement == runfft::Placement::InPlace {
        in_ids.clone()
    } else {
        let out_elems = desc.output_elements();
        (0..desc.output_layout.buffer_count())
            .map(|_| harness.alloc(scalars_per_buffer(desc.output_layout, out_elems)))
            .collect()
    };
    let scratch_scalars = (plan.scratch_bytes() / 8).max(2) * 2;
    let scratch = [
        harness.alloc(scratch_scalars),
        harness.alloc(scratch_scalars),
    ];

    ctx.execute(
        &plan,
        &harness,
        &ExecParams {
            input: in_ids,
            output: out_ids.clone(),
            scratch,
            stream: 0,
        },
    )?;

    // Gather the result and compare.
    let out_dims = desc.memory_length_out();
    let out_bufs: Vec<Vec<f64>> = out_ids.iter().map(|id| harness.read(*id)).collect();
    let actual = gather_complex(
        &out_bufs,
        desc.output_layout,
        &desc.ooffset,
        &out_dims,
        &desc.ostride,
        desc.odist,
        desc.batch,
    );
    let want: Vec<Complex64> = match &expected_real {
        Some(re) => re.iter().map(|&x| Complex64::new(x, 0.0)).collect(),
        None => expected,
    };

    let diff = norms::diff_norms(&actual, &want);
    let reference = norms::data_norms(&want);
    let report = AccuracyReport {
        diff,
        reference,
        tolerance: norms::tolerance(desc.length_product(), desc.precision),
    };
    log::debug!(
        "accuracy: linf {:.3e} l2 {:.3e} tol {:.3e} for {}",
        report.linf_relative(),
        report.l2_relative(),
        report.tolerance,
        desc
    );
    Ok(report)
}

fn runfft_cache_budget() -> u64 {
    64 * 1024 * 1024
}

/// Accuracy case for a kernel token.
pub fn run_token_case(tok: &str) -> Result<AccuracyReport, FftError> {
    run_accuracy_case(token::from_token(tok)?)
}

/// Execute a complex plan on the host interpreter with caller-supplied
/// dense input, returning the dense output. Property tests (linearity,
/// inverse-of-forward, Parseval) compose transforms through this.
pub fn execute_complex(
    desc: &FftDescriptor,
    data: &[Complex64],
) -> Result<Vec<Complex64>, FftError> {
    assert!(
        !desc.transform.is_real(),
        "execute_complex drives complex descriptors only"
    );
    let ctx = FftContext::with_cache(Arc::new(RtcCache::in_memory(runfft_cache_budget())));
    let plan = Plan::new(desc.clone())?;
    let harness = HostHarness::new();

    let in_dims = desc.memory_length_in();
    let in_elems = desc.input_elements();
    let mut in_alloc = scalars_per_buffer(desc.input_layout, in_elems);
    if desc.placement == runfft::Placement::InPlace {
        in_alloc = in_alloc.max(scalars_per_buffer(
            desc.output_layout,
            desc.output_elements(),
        ));
    }
    let in_ids: Vec<u64> = (0..desc.input_layout.buffer_count())
        .map(|_| harness.alloc(in_alloc))
        .collect();
    let mut in_bufs: Vec<Vec<f64>> = in_ids.iter().map(|id| harness.read(*id)).collect();
    scatter_complex(
        &mut in_bufs,
        desc.input_layout,
        &desc.ioffset,
        &in_dims,
        &desc.istride,
        desc.idist,
        desc.batch,
        data,
    );
    for (id, buf) in in_ids.iter().zip(in_bufs.into_iter()) {
        harness.write(*id, buf);
    }

    let out_ids: Vec<u64> = if desc.placement == runfft::Placement::InPlace {
        in_ids.clone()
    } else {
        let out_elems = desc.output_elements();
        (0..desc.output_layout.buffer_count())
            .map(|_| harness.alloc(scalars_per_buffer(desc.output_layout, out_elems)))
            .collect()
    };
    let scratch_scalars = (plan.scratch_bytes() / 8).max(2) * 2;
    let scratch = [
        harness.alloc(scratch_scalars),
        harness.alloc(scratch_scalars),
    ];
    ctx.execute(
        &plan,
        &harness,
        &ExecParams {
            input: in_ids,
            output: out_ids.clone(),
            scratch,
            stream: 0,
        },
    )?;

    let out_bufs: Vec<Vec<f64>> = out_ids.iter().map(|id| harness.read(*id)).collect();
    Ok(gather_complex(
        &out_bufs,
        desc.output_layout,
        &desc.ooffset,
        &desc.memory_length_out(),
        &desc.ostride,
        desc.odist,
        desc.batch,
    ))
}
