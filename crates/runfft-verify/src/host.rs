//! Host-side schedule interpreter.
//!
//! Implements [`DeviceHarness`] over an in-process buffer registry and
//! executes each launch record by applying the node's mathematical
//! effect on host memory: Stockham passes driven by the plan's own
//! twiddle tables and factor sequences, large-twiddle multiplication,
//! transposes (general stride permutes), real twists and the fused 2-D
//! kernel. The oracle uses it as the accelerator, so a numerical failure
//! points at the plan, the tables, or the schedule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use num_complex::Complex64;

use runfft::{
    ArrayLayout, BufferId, DeviceHarness, KernelSpec, LaunchRecord, Plan, ResolvedLaunch, StepKind,
    StreamId,
};
use runfft_core::twiddle::TwiddleTable;
use runfft_core::EmbeddedKind;

#[derive(Default)]
pub struct HostHarness {
    buffers: Mutex<HashMap<BufferId, Vec<f64>>>,
    next_id: AtomicU64,
}

impl HostHarness {
    pub fn new() -> HostHarness {
        HostHarness {
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a zeroed buffer of `scalars` f64 slots.
    pub fn alloc(&self, scalars: usize) -> BufferId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().unwrap().insert(id, vec![0.0; scalars]);
        id
    }

    pub fn write(&self, id: BufferId, data: Vec<f64>) {
        self.buffers.lock().unwrap().insert(id, data);
    }

    pub fn read(&self, id: BufferId) -> Vec<f64> {
        self.buffers
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

impl DeviceHarness for HostHarness {
    fn launch(&self, plan: &Plan, launch: &ResolvedLaunch<'_>, _stream: StreamId) -> Result<()> {
        let mut registry = self.buffers.lock().unwrap();
        // Snapshot the inputs so in-place records read consistent data.
        let inputs: Vec<Vec<f64>> = launch
            .input
            .iter()
            .map(|id| {
                registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown input buffer {id}"))
            })
            .collect::<Result<_>>()?;
        let mut outputs: Vec<Vec<f64>> = launch
            .output
            .iter()
            .map(|id| {
                registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown output buffer {id}"))
            })
            .collect::<Result<_>>()?;

        interpret(plan, launch.record, &inputs, &mut outputs)?;

        for (id, buf) in launch.output.iter().zip(outputs.into_iter()) {
            registry.insert(*id, buf);
        }
        Ok(())
    }
}

fn read_c(bufs: &[Vec<f64>], layout: ArrayLayout, offsets: &[usize], p: usize) -> Complex64 {
    match layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            Complex64::new(bufs[0][offsets[0] + p], bufs[1][offsets[1] + p])
        }
        ArrayLayout::Real => {
            let base = offsets[0] + 2 * p;
            Complex64::new(bufs[0][base], bufs[0][base + 1])
        }
        _ => {
            let base = 2 * (offsets[0] + p);
            Complex64::new(bufs[0][base], bufs[0][base + 1])
        }
    }
}

fn write_c(bufs: &mut [Vec<f64>], layout: ArrayLayout, offsets: &[usize], p: usize, v: Complex64) {
    match layout {
        ArrayLayout::ComplexPlanar | ArrayLayout::HermitianPlanar => {
            bufs[0][offsets[0] + p] = v.re;
            bufs[1][offsets[1] + p] = v.im;
        }
        ArrayLayout::Real => {
            let base = offsets[0] + 2 * p;
            bufs[0][base] = v.re;
            bufs[0][base + 1] = v.im;
        }
        _ => {
            let base = 2 * (offsets[0] + p);
            bufs[0][base] = v.re;
            bufs[0][base + 1] = v.im;
        }
    }
}

/// Naive W-point DFT on the register set, sign per table direction.
fn butterfly(r: &mut [Complex64], sign: f64) {
    let w = r.len();
    if w <= 1 {
        return;
    }
    let mut out = vec![Complex64::new(0.0, 0.0); w];
    for (k, o) in out.iter_mut().enumerate() {
        for (j, v) in r.iter().enumerate() {
            let theta = sign * 2.0 * std::f64::consts::PI * ((j * k) % w) as f64 / w as f64;
            *o += v * Complex64::new(theta.cos(), theta.sin());
        }
    }
    r.copy_from_slice(&out);
}

/// The autosort pass loop, mirroring the generated device function: load
/// at stride `L/W`, twiddle by the telescoped table, butterfly, store at
/// the cumheight-interleaved position.
fn stockham_passes(data: &mut Vec<Complex64>, table: &TwiddleTable) {
    let l = data.len();
    let sign = table.direction.sign();
    let mut tmp = vec![Complex64::new(0.0, 0.0); l];
    let mut cumheight = 1usize;
    for &width in &table.factors {
        let butterflies = l / width;
        for t in 0..butterflies {
            let mut r: Vec<Complex64> = (0..width).map(|j| data[t + j * butterflies]).collect();
            if cumheight > 1 {
                for (j, v) in r.iter_mut().enumerate().skip(1) {
                    *v *= table.pass_value(cumheight, width, j, t);
                }
            }
            butterfly(&mut r, sign);
            for (j, v) in r.iter().enumerate() {
                tmp[(t / cumheight) * (width * cumheight) + t % cumheight + j * cumheight] = *v;
            }
        }
        std::mem::swap(data, &mut tmp);
        cumheight *= width;
    }
}

/// Forward real twist: packed half-length spectrum -> Hermitian
/// half-spectrum of `m + 1` entries.
fn real_twist_forward(y: &[Complex64], table: &TwiddleTable) -> Vec<Complex64> {
    let m = y.len();
    let mut h = vec![Complex64::new(0.0, 0.0); m + 1];
    h[0] = Complex64::new(y[0].re + y[0].im, 0.0);
    h[m] = Complex64::new(y[0].re - y[0].im, 0.0);
    for k in 1..m.div_ceil(2) {
        let q = m - k;
        let u = 0.5 * (y[k] + y[q].conj());
        let v = 0.5 * (y[k] - y[q].conj());
        let z = table.real_factor(k) * v;
        h[k] = Complex64::new(u.re + z.im, u.im - z.re);
        h[q] = Complex64::new(u.re - z.im, -u.im - z.re);
    }
    if m % 2 == 0 {
        h[m / 2] = y[m / 2].conj();
    }
    h
}

/// Inverse real twist: Hermitian half-spectrum (`m + 1` entries) ->
/// packed half-length spectrum, carrying the factor-of-two gain that
/// completes the unnormalized `N * x` convention.
fn real_twist_inverse(hh: &[Complex64], table: &TwiddleTable) -> Vec<Complex64> {
    let m = hh.len() - 1;
    let mut y = vec![Complex64::new(0.0, 0.0); m];
    y[0] = Complex64::new(hh[0].re + hh[m].re, hh[0].re - hh[m].re);
    for k in 1..m.div_ceil(2) {
        let q = m - k;
        let a = hh[k] + hh[q].conj();
        let b = hh[k] - hh[q].conj();
        let z = table.real_factor(k) * b;
        y[k] = Complex64::new(a.re - z.im, a.im + z.re);
        y[q] = Complex64::new(a.re + z.im, -a.im + z.re);
    }
    if m % 2 == 0 {
        y[m / 2] = 2.0 * hh[m / 2].conj();
    }
    y
}

/// Per-(batch, row) base offsets for a record, decomposing the flat row
/// index over the higher dims, fastest first.
fn row_bases(record: &LaunchRecord, b: usize, r: usize) -> (usize, usize) {
    let si = &record.strides_in;
    let so = &record.strides_out;
    let mut base_in = b * si[si.len() - 1];
    let mut base_out = b * so[so.len() - 1];
    let mut rem = r;
    for (j, &dlen) in record.lengths[1..].iter().enumerate() {
        let idx = rem % dlen;
        rem /= dlen;
        base_in += idx * si[j + 1];
        base_out += idx * so[j + 1];
    }
    (base_in, base_out)
}

fn interpret(
    plan: &Plan,
    record: &LaunchRecord,
    inputs: &[Vec<f64>],
    outputs: &mut [Vec<f64>],
) -> Result<()> {
    match record.kind {
        StepKind::Stockham => interpret_stockham(plan, record, inputs, outputs),
        StepKind::Transpose => interpret_transpose(record, inputs, outputs),
        StepKind::RealTwistForward | StepKind::RealTwistInverse => {
            interpret_twist(plan, record, inputs, outputs)
        }
        StepKind::Single2D => interpret_single_2d(plan, record, inputs, outputs),
    }
}

fn interpret_stockham(
    plan: &Plan,
    record: &LaunchRecord,
    inputs: &[Vec<f64>],
    outputs: &mut [Vec<f64>],
) -> Result<()> {
    let KernelSpec::Stockham(spec) = plan.kernel(record.kernel) else {
        return Err(anyhow!("record kind and kernel spec disagree"));
    };
    let table = plan
        .twiddles
        .table(record.twiddles.ok_or_else(|| anyhow!("missing twiddles"))?);
    let l = record.lengths[0];
    let rows: usize = record.lengths[1..].iter().product::<usize>().max(1);
    let in_count = match spec.embedded {
        EmbeddedKind::RealPost => l + 1,
        _ => l,
    };

    for b in 0..record.batch {
        for r in 0..rows {
            let (base_in, base_out) = row_bases(record, b, r);
            let gathered: Vec<Complex64> = (0..in_count)
                .map(|k| {
                    read_c(
                        inputs,
                        record.in_layout,
                        &record.offset_in,
                        base_in + k * record.strides_in[0],
                    )
                })
                .collect();

            let mut data = match spec.embedded {
                EmbeddedKind::RealPost => real_twist_inverse(&gathered, table),
                _ => gathered,
            };
            stockham_passes(&mut data, table);

            if let Some(lt) = record.large_twiddles {
                let large = plan.twiddles.table(lt);
                let cols = large.factors[1];
                for (k, v) in data.iter_mut().enumerate() {
                    *v *= large.value(k * cols + (r % cols));
                }
            }

            let out = match spec.embedded {
                EmbeddedKind::RealPre => real_twist_forward(&data, table),
                _ => data,
            };
            for (k, v) in out.iter().enumerate() {
                write_c(
                    outputs,
                    record.out_layout,
                    &record.offset_out,
                    base_out + k * record.strides_out[0],
                    *v,
                );
            }
        }
    }
    Ok(())
}

/// General stride permute: element at multi-index `idx` reads
/// `sum(idx*strides_in)` and writes `sum(idx*strides_out)`.
fn interpret_transpose(
    record: &LaunchRecord,
    inputs: &[Vec<f64>],
    outputs: &mut [Vec<f64>],
) -> Result<()> {
    let dims = &record.lengths;
    let total: usize = dims.iter().product();
    let si = &record.strides_in;
    let so = &record.strides_out;
    for b in 0..record.batch {
        for flat in 0..total {
            let mut rem = flat;
            let mut pin = b * si[si.len() - 1];
            let mut pout = b * so[so.len() - 1];
            for d in (0..dims.len()).rev() {
                let idx = rem % dims[d];
                rem /= dims[d];
                pin += idx * si[d];
                pout += idx * so[d];
            }
            let v = read_c(inputs, record.in_layout, &record.offset_in, pin);
            write_c(outputs, record.out_layout, &record.offset_out, pout, v);
        }
    }
    Ok(())
}

fn interpret_twist(
    plan: &Plan,
    record: &LaunchRecord,
    inputs: &[Vec<f64>],
    outputs: &mut [Vec<f64>],
) -> Result<()> {
    let table = plan
        .twiddles
        .table(record.twiddles.ok_or_else(|| anyhow!("missing twiddles"))?);
    let m = record.lengths[0];
    let forward = record.kind == StepKind::RealTwistForward;
    let (in_count, out_count) = if forward { (m, m + 1) } else { (m + 1, m) };
    for b in 0..record.batch {
        let base_in = b * record.strides_in[record.strides_in.len() - 1];
        let base_out = b * record.strides_out[record.strides_out.len() - 1];
        let gathered: Vec<Complex64> = (0..in_count)
            .map(|k| {
                read_c(
                    inputs,
                    record.in_layout,
                    &record.offset_in,
                    base_in + k * record.strides_in[0],
                )
            })
            .collect();
        let out = if forward {
            real_twist_forward(&gathered, table)
        } else {
            real_twist_inverse(&gathered, table)
        };
        debug_assert_eq!(out.len(), out_count);
        for (k, v) in out.iter().enumerate() {
            write_c(
                outputs,
                record.out_layout,
                &record.offset_out,
                base_out + k * record.strides_out[0],
                *v,
            );
        }
    }
    Ok(())
}

fn interpret_single_2d(
    plan: &Plan,
    record: &LaunchRecord,
    inputs: &[Vec<f64>],
    outputs: &mut [Vec<f64>],
) -> Result<()> {
    let t1 = plan
        .twiddles
        .table(record.twiddles.ok_or_else(|| anyhow!("missing twiddles"))?);
    let t0 = plan
        .twiddles
        .table(record.twiddles2.ok_or_else(|| anyhow!("missing column twiddles"))?);
    let (l1, l0) = (record.lengths[0], record.lengths[1]);
    for b in 0..record.batch {
        let base_in = b * record.strides_in[record.strides_in.len() - 1];
        let base_out = b * record.strides_out[record.strides_out.len() - 1];
        // Gather the tile, rows contiguous.
        let mut tile = vec![Complex64::new(0.0, 0.0); l0 * l1];
        for row in 0..l0 {
            for col in 0..l1 {
                tile[row * l1 + col] = read_c(
                    inputs,
                    record.in_layout,
                    &record.offset_in,
                    base_in + row * record.strides_in[1] + col * record.strides_in[0],
                );
            }
        }
        // Row transforms along the contiguous axis.
        for row in 0..l0 {
            let mut line = tile[row * l1..(row + 1) * l1].to_vec();
            stockham_passes(&mut line, t1);
            tile[row * l1..(row + 1) * l1].copy_from_slice(&line);
        }
        // Column transforms.
        for col in 0..l1 {
            let mut line: Vec<Complex64> = (0..l0).map(|r| tile[r * l1 + col]).collect();
            stockham_passes(&mut line, t0);
            for (r, v) in line.iter().enumerate() {
                tile[r * l1 + col] = *v;
            }
        }
        for row in 0..l0 {
            for col in 0..l1 {
                write_c(
                    outputs,
                    record.out_layout,
                    &record.offset_out,
                    base_out + row * record.strides_out[1] + col * record.strides_out[0],
                    tile[row * l1 + col],
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::twiddle::TwiddleArena;
    use runfft_core::{Direction, Precision};

    #[test]
    fn stockham_passes_match_the_dft_for_length_4() {
        let mut arena = TwiddleArena::new();
        let id = arena.intern_pass(4, &[2, 2], Direction::Forward, Precision::F64, false);
        let table = arena.table(id);
        let x = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(2.0, -1.0),
            Complex64::new(0.5, 3.0),
            Complex64::new(-1.0, 0.25),
        ];
        let mut got = x.clone();
        stockham_passes(&mut got, table);
        let want = crate::reference::reference_complex(&x, &[4], 1, Direction::Forward);
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).norm() < 1e-12, "{g} vs {w}");
        }
    }

    #[test]
    fn stockham_passes_match_the_dft_for_mixed_radices() {
        let mut arena = TwiddleArena::new();
        for (len, factors) in [(6usize, vec![6]), (12, vec![6, 2]), (35, vec![7, 5])] {
            let id = arena.intern_pass(len, &factors, Direction::Forward, Precision::F64, false);
            let table = arena.table(id);
            let x = crate::input::generate_complex(&[len], 1);
            let mut got = x.clone();
            stockham_passes(&mut got, table);
            let want = crate::reference::reference_complex(&x, &[len], 1, Direction::Forward);
            for (g, w) in got.iter().zip(want.iter()) {
                assert!((g - w).norm() < 1e-10, "len {len}: {g} vs {w}");
            }
        }
    }

    #[test]
    fn real_twists_invert_each_other() {
        let mut arena = TwiddleArena::new();
        let fid = arena.intern_pass(8, &[4, 2], Direction::Forward, Precision::F64, true);
        let iid = arena.intern_pass(8, &[4, 2], Direction::Inverse, Precision::F64, true);
        let y = crate::input::generate_complex(&[8], 1);
        let h = real_twist_forward(&y, arena.table(fid));
        assert_eq!(h.len(), 9);
        assert!(h[0].im.abs() < 1e-15);
        assert!(h[8].im.abs() < 1e-15);
        let back = real_twist_inverse(&h, arena.table(iid));
        for (a, b) in y.iter().zip(back.iter()) {
            // The inverse twist carries the factor-of-two gain.
            assert!((2.0 * a - b).norm() < 1e-12);
        }
    }
}
