//! Restarted right-preconditioned GMRES (Saad §9.3.2).
//!
//! The preconditioned directions `z_j = M⁻¹ v_j` are stored and the update is built from them,
//! which is flexible GMRES (Saad §9.4). With a fixed preconditioner it is the same iteration as
//! right-preconditioned GMRES, so both `gmres` and `fgmres` run this kernel. Residual norms reported
//! to the monitor are the unpreconditioned ones from the Givens recurrence.

use faer::Mat;

use crate::core::wrappers::residual;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, Monitor, apply_op, axpy, check_dims, dot, norm};
use crate::utils::convergence::{Convergence, KspReason, SolveStats};

pub struct GmresSolver {
    pub conv: Convergence,
    pub restart: usize,
}

impl GmresSolver {
    pub fn new(conv: Convergence, restart: usize) -> Self {
        Self { conv, restart: restart.max(1) }
    }
}

/// Apply the accumulated rotations to a new Hessenberg column, then eliminate its subdiagonal.
fn rotate(col: &mut [f64], cs: &mut Vec<f64>, sn: &mut Vec<f64>, g: &mut [f64]) -> bool {
    let k = cs.len();
    for i in 0..k {
        let t = cs[i] * col[i] + sn[i] * col[i + 1];
        col[i + 1] = -sn[i] * col[i] + cs[i] * col[i + 1];
        col[i] = t;
    }
    let d = col[k].hypot(col[k + 1]);
    if d == 0.0 {
        return false;
    }
    let (c, s) = (col[k] / d, col[k + 1] / d);
    cs.push(c);
    sn.push(s);
    col[k] = d;
    col[k + 1] = 0.0;
    g[k + 1] = -s * g[k];
    g[k] *= c;
    true
}

impl LinearSolver for GmresSolver {
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
        let m = self.restart;
        let mut r = residual(a, x, b);
        let mut beta = norm(&r);
        let res0 = beta;
        monitor(0, res0);
        let mut reason = self.conv.check(res0, res0, 0);
        if reason != KspReason::Iterating {
            return Ok(SolveStats::new(reason, 0, res0));
        }

        let mut its = 0;
        let mut res = res0;
        loop {
            let mut v: Vec<Vec<f64>> = vec![r.iter().map(|ri| ri / beta).collect()];
            let mut z: Vec<Vec<f64>> = Vec::with_capacity(m);
            let mut h: Vec<Vec<f64>> = Vec::with_capacity(m);
            let (mut cs, mut sn) = (Vec::with_capacity(m), Vec::with_capacity(m));
            let mut g = vec![0.0; m + 1];
            g[0] = beta;

            while h.len() < m {
                let k = h.len();
                let mut zk = vec![0.0; n];
                pc.apply(&v[k], &mut zk)?;
                let mut w = apply_op(a, &zk);
                z.push(zk);

                // modified Gram-Schmidt
                let mut col = vec![0.0; k + 2];
                for (i, vi) in v.iter().enumerate() {
                    col[i] = dot(&w, vi);
                    axpy(-col[i], vi, &mut w);
                }
                let hk1 = norm(&w);
                col[k + 1] = hk1;
                if !hk1.is_finite() {
                    return Ok(SolveStats::new(KspReason::DivergedNanOrInf, its, hk1));
                }
                if !rotate(&mut col, &mut cs, &mut sn, &mut g) {
                    return Ok(SolveStats::new(KspReason::DivergedBreakdown, its, res));
                }
                h.push(col);
                its += 1;
                res = g[k + 1].abs();
                monitor(its, res);
                reason = self.conv.check(res, res0, its);
                if reason != KspReason::Iterating || hk1 == 0.0 {
                    break;
                }
                v.push(w.iter().map(|wi| wi / hk1).collect());
            }

            // y = H⁻¹ g on the leading k×k triangle, then x += Z y
            let k = h.len();
            let mut y = vec![0.0; k];
            for i in (0..k).rev() {
                let mut s = g[i];
                for l in i + 1..k {
                    s -= h[l][i] * y[l];
                }
                y[i] = s / h[i][i];
            }
            for (yj, zj) in y.iter().zip(&z) {
                axpy(*yj, zj, x);
            }

            if reason != KspReason::Iterating {
                return Ok(SolveStats::new(reason, its, res));
            }
            r = residual(a, x, b);
            beta = norm(&r);
            reason = self.conv.check(beta, res0, its);
            if reason != KspReason::Iterating {
                return Ok(SolveStats::new(reason, its, beta));
            }
        }
    }
}
