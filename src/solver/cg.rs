//! Preconditioned Conjugate Gradient (Saad §9.2).

use faer::Mat;

use crate::core::wrappers::residual;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, Monitor, apply_op, axpy, check_dims, dot, norm};
use crate::utils::convergence::{Convergence, KspReason, SolveStats};

pub struct CgSolver {
    pub conv: Convergence,
}

impl CgSolver {
    pub fn new(conv: Convergence) -> Self {
        Self { conv }
    }
}

impl LinearSolver for CgSolver {
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
        let res0 = norm(&r);
        monitor(0, res0);
        let reason = self.conv.check(res0, res0, 0);
        if reason != KspReason::Iterating {
            return Ok(SolveStats::new(reason, 0, res0));
        }

        let mut z = vec![0.0; n];
        pc.apply(&r, &mut z)?;
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        for i in 1..=self.conv.max_iters {
            let ap = apply_op(a, &p);
            let pap = dot(&p, &ap);
            if pap == 0.0 || !pap.is_finite() {
                return Ok(SolveStats::new(KspReason::DivergedBreakdown, i - 1, norm(&r)));
            }
            let alpha = rz / pap;
            axpy(alpha, &p, x);
            axpy(-alpha, &ap, &mut r);

            let res = norm(&r);
            monitor(i, res);
            let reason = self.conv.check(res, res0, i);
            if reason != KspReason::Iterating {
                return Ok(SolveStats::new(reason, i, res));
            }

            pc.apply(&r, &mut z)?;
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            for (pj, zj) in p.iter_mut().zip(&z) {
                *pj = zj + beta * *pj;
            }
            rz = rz_new;
        }
        let res = norm(&r);
        Ok(SolveStats::new(KspReason::DivergedIts, self.conv.max_iters, res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::Identity;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cg_solves_spd() {
        // A = [[4,1,0],[1,3,1],[0,1,2]], x = [1,2,3]
        let a = Mat::from_fn(3, 3, |i, j| [[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]][i][j]);
        let b = [6.0, 10.0, 8.0];
        let mut x = [0.0; 3];
        let conv = Convergence { rtol: 1e-12, atol: 1e-50, dtol: 1e4, max_iters: 20 };
        let stats = CgSolver::new(conv)
            .solve(&a, &mut Identity, &b, &mut x, &mut |_, _| {})
            .unwrap();
        assert!(stats.converged);
        assert!(stats.iterations <= 3);
        for (xi, ei) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert_abs_diff_eq!(*xi, ei, epsilon = 1e-8);
        }
    }

    #[test]
    fn zero_rhs_converges_immediately() {
        let a = Mat::<f64>::identity(2, 2);
        let mut x = [0.0; 2];
        let conv = Convergence { rtol: 1e-8, atol: 1e-50, dtol: 1e4, max_iters: 5 };
        let stats = CgSolver::new(conv)
            .solve(&a, &mut Identity, &[0.0, 0.0], &mut x, &mut |_, _| {})
            .unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.reason, KspReason::ConvergedAtol);
    }
}
