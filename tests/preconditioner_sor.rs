//! SOR and symmetric SOR sweeps.
//!
//! Sweeps start from a zero guess, so one forward sweep with ω = 1 on `A z = r` is a single
//! Gauss-Seidel pass that can be written down by hand.

use approx::assert_relative_eq;
use faer::Mat;
use splitsolve::error::KError;
use splitsolve::preconditioner::{MatSorType, Preconditioner, Sor};

/// Tridiagonal matrix with subdiagonal `a`, diagonal `b` and superdiagonal `c`.
fn make_tridiag(n: usize, a: f64, b: f64, c: f64) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            b
        } else if i == j + 1 {
            a
        } else if j == i + 1 {
            c
        } else {
            0.0
        }
    })
}

#[test]
fn sor_identity() {
    let n = 5;
    let a = Mat::<f64>::identity(n, n);
    let mut sor = Sor::new(1.0, 1, MatSorType::APPLY_LOWER);
    sor.setup(&a).unwrap();
    let x = vec![1.0, -2.0, 3.0, 0.5, 0.0];
    let mut y = vec![0.0; n];
    sor.apply(&x, &mut y).unwrap();
    assert_relative_eq!(x.as_slice(), y.as_slice(), epsilon = 1e-12);
}

#[test]
fn sor_tridiag_forward() {
    let n = 5;
    let a = make_tridiag(n, -1.0, 4.0, -1.0);
    let mut sor = Sor::new(1.0, 1, MatSorType::APPLY_LOWER);
    sor.setup(&a).unwrap();
    let x = vec![1.0; n];
    let mut y = vec![0.0; n];
    sor.apply(&x, &mut y).unwrap();

    // unknowns to the right are still zero during the forward pass
    let mut expected = vec![0.0; n];
    for i in 0..n {
        let left = if i > 0 { expected[i - 1] } else { 0.0 };
        expected[i] = (x[i] + left) / 4.0;
    }
    assert_relative_eq!(y.as_slice(), expected.as_slice(), epsilon = 1e-12);
}

#[test]
fn over_relaxation_scales_the_first_update() {
    let a = make_tridiag(4, -1.0, 4.0, -1.0);
    let mut sor = Sor::new(1.5, 1, MatSorType::APPLY_LOWER);
    sor.setup(&a).unwrap();
    let mut y = vec![0.0; 4];
    sor.apply(&[4.0, 0.0, 0.0, 0.0], &mut y).unwrap();
    assert_relative_eq!(y[0], 1.5, epsilon = 1e-12);
}

#[test]
fn ssor_is_symmetric_and_converges_with_sweeps() {
    let n = 6;
    let a = make_tridiag(n, -1.0, 4.0, -1.0);
    let mut one = Sor::symmetric();
    one.setup(&a).unwrap();

    // M⁻¹ of symmetric Gauss-Seidel is symmetric: eᵢᵀ M⁻¹ eⱼ = eⱼᵀ M⁻¹ eᵢ
    let column = |pc: &mut Sor, j: usize| {
        let mut e = vec![0.0; n];
        e[j] = 1.0;
        let mut z = vec![0.0; n];
        pc.apply(&e, &mut z).unwrap();
        z
    };
    let c1 = column(&mut one, 1);
    let c4 = column(&mut one, 4);
    assert_relative_eq!(c1[4], c4[1], epsilon = 1e-12);

    // many sweeps approach the exact solve
    let mut many = Sor::new(1.0, 40, MatSorType::SYMMETRIC_SWEEP);
    many.setup(&a).unwrap();
    let r = vec![1.0; n];
    let mut z = vec![0.0; n];
    many.apply(&r, &mut z).unwrap();
    for i in 0..n {
        let az: f64 = (0..n).map(|j| a[(i, j)] * z[j]).sum();
        assert_relative_eq!(az, r[i], epsilon = 1e-10);
    }
}

#[test]
fn zero_diagonal_fails_setup() {
    let a = make_tridiag(3, 1.0, 0.0, 1.0);
    let err = Sor::symmetric().setup(&a).unwrap_err();
    assert!(matches!(err, KError::ZeroPivot(0)));
}

#[test]
fn sor_display() {
    let sor = Sor::new(1.5, 2, MatSorType::APPLY_LOWER);
    let s = format!("{sor}");
    assert!(s.contains("SOR(omega=1.5"));
    assert!(s.contains("its=2"));
}
