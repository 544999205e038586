//! Preconditioned BiCGStab (van der Vorst 1992; Saad §7.4.2).

use faer::Mat;

use crate::core::wrappers::residual;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, Monitor, apply_op, axpy, check_dims, dot, norm};
use crate::utils::convergence::{Convergence, KspReason, SolveStats};

pub struct BiCgStabSolver {
    pub conv: Convergence,
}

impl BiCgStabSolver {
    pub fn new(conv: Convergence) -> Self {
        Self { conv }
    }
}

impl LinearSolver for BiCgStabSolver {
    fn solve(
        &mut self,
        a: &Mat<f64>,
        pc: &mut dyn Preconditioner,
        b: &[f64],
        x: &mut [f64],
        monitor: Monitor<'_>,
    ) -> Result<SolveStats, KError> {
        check_dims(a, b, x)?;
        let n = b.len();
        let mut r = residual(a, x, b);
        let r_hat = r.clone();
        let res0 = norm(&r);
        monitor(0, res0);
        let reason = self.conv.check(res0, res0, 0);
        if reason != KspReason::Iterating {
            return Ok(SolveStats::new(reason, 0, res0));
        }

        let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
        let mut v = vec![0.0; n];
        let mut p = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let breakdown = |i: usize, r: &Vec<f64>| -> Result<SolveStats, KError> {
            Ok(SolveStats::new(KspReason::DivergedBreakdown, i, norm(r)))
        };

        for i in 1..=self.conv.max_iters {
            let rho_new = dot(&r_hat, &r);
            if rho_new == 0.0 || omega == 0.0 {
                return breakdown(i - 1, &r);
            }
            let beta = (rho_new / rho) * (alpha / omega);
            for ((pj, rj), vj) in p.iter_mut().zip(&r).zip(&v) {
                *pj = rj + beta * (*pj - omega * vj);
            }
            pc.apply(&p, &mut p_hat)?;
            v = apply_op(a, &p_hat);
            let rv = dot(&r_hat, &v);
            if rv == 0.0 {
                return breakdown(i - 1, &r);
            }
            alpha = rho_new / rv;

            let mut s = r.clone();
            axpy(-alpha, &v, &mut s);
            pc.apply(&s, &mut s_hat)?;
            let t = apply_op(a, &s_hat);
            let tt = dot(&t, &t);
            omega = if tt == 0.0 { 0.0 } else { dot(&t, &s) / tt };

            axpy(alpha, &p_hat, x);
            axpy(omega, &s_hat, x);
            r = s;
            axpy(-omega, &t, &mut r);
            rho = rho_new;

            let res = norm(&r);
            monitor(i, res);
            let reason = self.conv.check(res, res0, i);
            if reason != KspReason::Iterating {
                return Ok(SolveStats::new(reason, i, res));
            }
        }
        Ok(SolveStats::new(KspReason::DivergedIts, self.conv.max_iters, norm(&r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::Jacobi;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bicgstab_solves_nonsymmetric() {
        let a = Mat::from_fn(3, 3, |i, j| [[4.0, 1.0, 0.0], [2.0, 5.0, 1.0], [0.0, 1.0, 3.0]][i][j]);
        let b = [5.0, 8.0, 4.0];
        let mut x = [0.0; 3];
        let conv = Convergence { rtol: 1e-12, atol: 1e-50, dtol: 1e4, max_iters: 50 };
        let mut pc = Jacobi::new();
        pc.setup(&a).unwrap();
        let stats = BiCgStabSolver::new(conv)
            .solve(&a, &mut pc, &b, &mut x, &mut |_, _| {})
            .unwrap();
        assert!(stats.converged, "{stats:?}");
        for xi in x {
            assert_abs_diff_eq!(xi, 1.0, epsilon = 1e-8);
        }
    }
}
