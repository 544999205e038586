//! Iterative kernels against the dense LU solve on random systems.
//!
//! SPD systems are built as `Mᵀ M + I`; non-symmetric ones are random matrices shifted to be
//! diagonally dominant. Every kernel runs with one of the backend preconditioners.

use approx::assert_abs_diff_eq;
use faer::Mat;
use rand::Rng;
use splitsolve::preconditioner::{Identity, Ilu0, Jacobi, Preconditioner, Sor};
use splitsolve::solver::{
    BiCgStabSolver, CgSolver, GmresSolver, LinearSolver, LuSolver, RichardsonSolver,
};
use splitsolve::utils::convergence::{Convergence, KspReason};

fn conv(max_iters: usize) -> Convergence {
    Convergence { rtol: 1e-10, atol: 1e-50, dtol: 1e4, max_iters }
}

fn random_spd(n: usize) -> (Mat<f64>, Vec<f64>) {
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let m = Mat::from_fn(n, n, |i, j| data[j * n + i]);
    let m_t = m.transpose();
    let a = &m_t * &m + Mat::<f64>::identity(n, n);
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn random_dominant(n: usize) -> (Mat<f64>, Vec<f64>) {
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a = Mat::from_fn(n, n, |i, j| data[j * n + i] + if i == j { n as f64 } else { 0.0 });
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn direct(a: &Mat<f64>, b: &[f64]) -> Vec<f64> {
    let mut lu = LuSolver::new();
    lu.factor(a).unwrap();
    let mut x = vec![0.0; b.len()];
    lu.solve_cached(b, &mut x).unwrap();
    x
}

fn check(
    solver: &mut dyn LinearSolver,
    pc: &mut dyn Preconditioner,
    a: &Mat<f64>,
    b: &[f64],
) -> Vec<f64> {
    pc.setup(a).unwrap();
    let mut x = vec![0.0; b.len()];
    let mut norms = Vec::new();
    let mut monitor = |_: usize, r: f64| norms.push(r);
    let stats = solver.solve(a, pc, b, &mut x, &mut monitor).unwrap();
    assert!(stats.converged, "{:?} after {} iterations", stats.reason, stats.iterations);
    assert_eq!(norms.first().copied().map(|r| r > 0.0), Some(true));
    let expected = direct(a, b);
    for (xi, ei) in x.iter().zip(&expected) {
        assert_abs_diff_eq!(xi, ei, epsilon = 1e-6);
    }
    norms
}

#[test]
fn cg_vs_direct_on_spd() {
    let (a, b) = random_spd(10);
    check(&mut CgSolver::new(conv(1000)), &mut Jacobi::new(), &a, &b);
}

#[test]
fn gmres_vs_direct_on_nonsymmetric() {
    let (a, b) = random_dominant(12);
    let norms = check(&mut GmresSolver::new(conv(200), 30), &mut Identity, &a, &b);
    // GMRES residuals never increase
    assert!(norms.windows(2).all(|w| w[1] <= w[0] * (1.0 + 1e-8)));
}

#[test]
fn restarted_gmres_still_converges() {
    let (a, b) = random_dominant(20);
    check(&mut GmresSolver::new(conv(500), 3), &mut Jacobi::new(), &a, &b);
}

#[test]
fn bicgstab_with_ilu() {
    let (a, b) = random_dominant(15);
    check(&mut BiCgStabSolver::new(conv(200)), &mut Ilu0::new(), &a, &b);
}

#[test]
fn richardson_with_symmetric_gauss_seidel() {
    let (a, b) = random_dominant(8);
    check(&mut RichardsonSolver::new(conv(500)), &mut Sor::symmetric(), &a, &b);
}

#[test]
fn iteration_limit_is_reported() {
    let (a, b) = random_spd(10);
    let mut x = vec![0.0; 10];
    let mut pc = Identity;
    let mut monitor = |_: usize, _: f64| {};
    let stats = CgSolver::new(conv(1)).solve(&a, &mut pc, &b, &mut x, &mut monitor).unwrap();
    assert!(!stats.converged);
    assert_eq!(stats.reason, KspReason::DivergedIts);
    assert_eq!(stats.iterations, 1);
}
