//! End-to-end accuracy suite: the concrete plan scenarios plus the
//! universal transform properties, all driven through the host schedule
//! interpreter against the rustfft reference.

use num_complex::Complex64;
use runfft::{
    kernel_name, FftRequest, Placement, Plan, Precision, Scheme, TransformKind,
};
use runfft_verify::oracle::execute_complex;
use runfft_verify::{input, run_accuracy_case, run_token_case};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn c2c(length: Vec<usize>) -> FftRequest {
    FftRequest {
        length,
        ..Default::default()
    }
}

fn check(req: FftRequest) {
    init_logging();
    let desc = req.normalize().unwrap();
    let report = run_accuracy_case(desc.clone()).unwrap();
    assert!(
        report.passed(),
        "accuracy failure for {desc}: linf {:.3e} l2 {:.3e} tol {:.3e}",
        report.linf_relative(),
        report.l2_relative(),
        report.tolerance
    );
}

// ----------------------------------------------------------------
// Concrete scenarios
// ----------------------------------------------------------------

#[test]
fn scenario_length_64_single_kernel() {
    let desc = FftRequest {
        length: vec![64],
        placement: Placement::InPlace,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let plan = Plan::new(desc.clone()).unwrap();
    assert_eq!(plan.schedule.len(), 1);
    assert_eq!(plan.schedule[0].grid, [1, 1, 1]);
    assert_eq!(plan.schedule[0].block, [64, 1, 1]);
    let tw = plan.schedule[0].twiddles.unwrap();
    assert_eq!(plan.twiddles.table(tw).len(), 63);
    check(FftRequest {
        length: vec![64],
        placement: Placement::InPlace,
        ..Default::default()
    });
}

#[test]
fn scenario_length_4096_two_level() {
    let desc = c2c(vec![4096]).normalize().unwrap();
    let plan = Plan::new(desc).unwrap();
    assert_eq!(plan.node(plan.root).scheme, Scheme::L1dCc);
    assert_eq!(plan.schedule.len(), 2);
    assert!(plan.scratch_bytes() > 0);
    let large = plan.node(plan.root).large_twiddle.unwrap();
    assert_eq!(plan.twiddles.table(large).len(), 4096);
    check(c2c(vec![4096]));
    check(FftRequest {
        length: vec![4096],
        placement: Placement::InPlace,
        ..Default::default()
    });
}

#[test]
fn scenario_rank3_trtrtr() {
    // Plan structure at full size; numerics on a smaller 3-D case.
    let plan = Plan::new(c2c(vec![192, 84, 84]).normalize().unwrap()).unwrap();
    assert_eq!(plan.node(plan.root).scheme, Scheme::Trtrtr3D);
    assert_eq!(plan.node(plan.root).children.len(), 6);
    assert_eq!(plan.schedule.len(), 6);
    check(c2c(vec![16, 12, 8]));
}

#[test]
fn scenario_length_35_double() {
    let desc = FftRequest {
        length: vec![35],
        precision: Precision::F64,
        placement: Placement::InPlace,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let plan = Plan::new(desc).unwrap();
    assert_eq!(plan.schedule.len(), 1);
    let runfft::KernelSpec::Stockham(spec) = plan.kernel(plan.schedule[0].kernel) else {
        panic!("expected a stockham kernel");
    };
    assert_eq!(spec.factors, vec![7, 5]);
    check(FftRequest {
        length: vec![35],
        precision: Precision::F64,
        placement: Placement::InPlace,
        ..Default::default()
    });
}

#[test]
fn scenario_real_forward_8_batched_in_place() {
    let desc = FftRequest {
        length: vec![8],
        batch: 3,
        transform: TransformKind::RealForward,
        placement: Placement::InPlace,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    assert_eq!(desc.idist, 10); // 2*(8/2+1)
    let plan = Plan::new(desc.clone()).unwrap();
    assert_eq!(plan.schedule.len(), 1);
    let name = kernel_name(plan.kernel(plan.schedule[0].kernel));
    assert!(name.contains("fwd_length4"), "fused half-length kernel: {name}");
    check(FftRequest {
        length: vec![8],
        batch: 3,
        transform: TransformKind::RealForward,
        placement: Placement::InPlace,
        ..Default::default()
    });
}

#[test]
fn scenario_token_request() {
    init_logging();
    let report = run_token_case(
        "complex_forward_len_64_single_op_batch_2_istride_1_CI_ostride_1_CI_idist_64_odist_64_ioffset_0_ooffset_0",
    )
    .unwrap();
    assert!(report.passed());
}

// ----------------------------------------------------------------
// Plan-shape coverage
// ----------------------------------------------------------------

#[test]
fn accuracy_small_lengths_both_precisions() {
    for len in [1usize, 2, 3, 4, 5, 8, 13, 16, 26, 35, 64, 81, 100, 121, 169, 243] {
        check(c2c(vec![len]));
        check(FftRequest {
            length: vec![len],
            precision: Precision::F64,
            ..Default::default()
        });
    }
}

#[test]
fn accuracy_inverse_direction() {
    for len in [8usize, 35, 64, 100] {
        check(FftRequest {
            length: vec![len],
            transform: TransformKind::ComplexInverse,
            ..Default::default()
        });
    }
}

#[test]
fn accuracy_batched_and_strided() {
    check(FftRequest {
        length: vec![100],
        batch: 7,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![32],
        istride: vec![2],
        idist: 64,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![64],
        ioffset: vec![5],
        ooffset: vec![3],
        ..Default::default()
    });
}

#[test]
fn accuracy_planar_layouts() {
    use runfft::ArrayLayout;
    check(FftRequest {
        length: vec![64],
        input_layout: Some(ArrayLayout::ComplexPlanar),
        output_layout: Some(ArrayLayout::ComplexPlanar),
        ..Default::default()
    });
}

#[test]
fn accuracy_2d_fused_and_rtrt() {
    check(c2c(vec![16, 8])); // fused 2-D kernel
    let plan = Plan::new(c2c(vec![16, 8]).normalize().unwrap()).unwrap();
    assert_eq!(plan.node(plan.root).scheme, Scheme::Single2D);
    check(c2c(vec![60, 60])); // row/transpose decomposition
    let plan = Plan::new(c2c(vec![60, 60]).normalize().unwrap()).unwrap();
    assert_eq!(plan.node(plan.root).scheme, Scheme::Rtrt2D);
}

#[test]
fn accuracy_large_1d_trtrt() {
    init_logging();
    // 9261 = 3^3 * 7^3 has no tuned column-block divisor, forcing the
    // transpose decomposition.
    let desc = FftRequest {
        length: vec![9261],
        precision: Precision::F64,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let plan = Plan::new(desc).unwrap();
    assert_eq!(plan.node(plan.root).scheme, Scheme::L1dTrtrt);
    assert_eq!(plan.schedule.len(), 5);
    check(FftRequest {
        length: vec![9261],
        precision: Precision::F64,
        ..Default::default()
    });
}

#[test]
fn accuracy_real_transforms() {
    // Fused 1-D, both directions, out-of-place and in-place.
    for len in [8usize, 16, 30, 64] {
        check(FftRequest {
            length: vec![len],
            transform: TransformKind::RealForward,
            ..Default::default()
        });
        check(FftRequest {
            length: vec![len],
            transform: TransformKind::RealInverse,
            ..Default::default()
        });
    }
    check(FftRequest {
        length: vec![32],
        batch: 2,
        transform: TransformKind::RealInverse,
        placement: Placement::InPlace,
        ..Default::default()
    });
}

#[test]
fn accuracy_real_large_standalone_twist() {
    init_logging();
    // Half-length 4096 exceeds the single-kernel budget, so the twist
    // runs as its own kernel around a two-level complex subplan.
    let desc = FftRequest {
        length: vec![8192],
        transform: TransformKind::RealForward,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let plan = Plan::new(desc).unwrap();
    assert!(plan.schedule.len() >= 3);
    assert_eq!(plan.node(plan.root).scheme, Scheme::RealPre);
    check(FftRequest {
        length: vec![8192],
        transform: TransformKind::RealForward,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![8192],
        transform: TransformKind::RealInverse,
        ..Default::default()
    });
}

#[test]
fn accuracy_real_multi_dim() {
    check(FftRequest {
        length: vec![6, 8],
        transform: TransformKind::RealForward,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![6, 8],
        transform: TransformKind::RealInverse,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![4, 6, 8],
        transform: TransformKind::RealForward,
        ..Default::default()
    });
    check(FftRequest {
        length: vec![4, 6, 8],
        transform: TransformKind::RealInverse,
        ..Default::default()
    });
}

// ----------------------------------------------------------------
// Universal properties
// ----------------------------------------------------------------

#[test]
fn property_inverse_of_forward() {
    init_logging();
    let fwd = c2c(vec![60]).normalize().unwrap();
    let inv = FftRequest {
        length: vec![60],
        transform: TransformKind::ComplexInverse,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let x = input::generate_complex(&[60], 1);
    let spectrum = execute_complex(&fwd, &x).unwrap();
    let back = execute_complex(&inv, &spectrum).unwrap();
    for (orig, got) in x.iter().zip(back.iter()) {
        assert!((60.0 * orig - got).norm() < 1e-3, "{orig} vs {got}");
    }
}

#[test]
fn property_linearity() {
    init_logging();
    let desc = c2c(vec![64]).normalize().unwrap();
    let x = input::generate_complex(&[64], 1);
    let y: Vec<Complex64> = (0..64).map(|i| input::seeded_complex(1000 + i)).collect();
    let (alpha, beta) = (Complex64::new(0.7, -0.2), Complex64::new(-1.3, 0.4));
    let combined: Vec<Complex64> = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| alpha * a + beta * b)
        .collect();
    let fx = execute_complex(&desc, &x).unwrap();
    let fy = execute_complex(&desc, &y).unwrap();
    let fc = execute_complex(&desc, &combined).unwrap();
    for i in 0..64 {
        let want = alpha * fx[i] + beta * fy[i];
        assert!((want - fc[i]).norm() < 1e-4, "index {i}");
    }
}

#[test]
fn property_parseval() {
    init_logging();
    let desc = c2c(vec![128]).normalize().unwrap();
    let x = input::generate_complex(&[128], 1);
    let fx = execute_complex(&desc, &x).unwrap();
    let energy_in: f64 = x.iter().map(|v| v.norm_sqr()).sum();
    let energy_out: f64 = fx.iter().map(|v| v.norm_sqr()).sum();
    assert!(
        (energy_out - 128.0 * energy_in).abs() <= 1e-4 * energy_out.max(1.0),
        "{energy_out} vs {}",
        128.0 * energy_in
    );
}

#[test]
fn property_real_round_trip() {
    init_logging();
    // forward(x) has zero Nyquist/DC imaginaries; inverse recovers N*x.
    let n = 16usize;
    let fwd = FftRequest {
        length: vec![n],
        transform: TransformKind::RealForward,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let report = run_accuracy_case(fwd).unwrap();
    assert!(report.passed());

    let inv = FftRequest {
        length: vec![n],
        transform: TransformKind::RealInverse,
        ..Default::default()
    }
    .normalize()
    .unwrap();
    let report = run_accuracy_case(inv).unwrap();
    assert!(report.passed());
}

#[test]
fn property_plan_determinism() {
    let mk = || Plan::new(c2c(vec![4096]).normalize().unwrap()).unwrap();
    let (a, b) = (mk(), mk());
    assert_eq!(a.schedule.len(), b.schedule.len());
    for (ra, rb) in a.schedule.iter().zip(b.schedule.iter()) {
        assert_eq!(
            kernel_name(a.kernel(ra.kernel)),
            kernel_name(b.kernel(rb.kernel))
        );
        assert_eq!(ra.grid, rb.grid);
        assert_eq!(ra.lengths, rb.lengths);
    }
}
