//! Preconditioned Richardson iteration: x ← x + ω M⁻¹ (b − A x).

use faer::Mat;

use crate::core::wrappers::residual;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, Monitor, axpy, check_dims, norm};
use crate::utils::convergence::{Convergence, KspReason, SolveStats};

pub struct RichardsonSolver {
    pub conv: Convergence,
    pub scale: f64,
}

impl RichardsonSolver {
    pub fn new(conv: Convergence) -> Self {
        Self { conv, scale: 1.0 }
    }
}

impl LinearSolver for RichardsonSolver {
    fn solve(
        &mut self,
        a: &Mat<f64>,
        pc: &mut dyn Preconditioner,
        b: &[f64],
        x: &mut [f64],
        monitor: Monitor<'_>,
    ) -> Result<SolveStats, KError> {
        check_dims(a, b, x)?;
        let mut r = residual(a, x, b);
        let res0 = norm(&r);
        monitor(0, res0);
        let mut reason = self.conv.check(res0, res0, 0);
        let mut z = vec![0.0; b.len()];
        let mut its = 0;
        let mut res = res0;
        while reason == KspReason::Iterating {
            pc.apply(&r, &mut z)?;
            axpy(self.scale, &z, x);
            r = residual(a, x, b);
            its += 1;
            res = norm(&r);
            monitor(its, res);
            reason = self.conv.check(res, res0, its);
        }
        Ok(SolveStats::new(reason, its, res))
    }
}
