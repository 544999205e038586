//! Krylov & direct solver kernels of the reference backend.
//!
//! Kernels work on dense `faer` operators and report every residual norm they compute to a
//! monitor callback. They never stop on their own account: the stopping decision is always
//! [`Convergence::check`](crate::utils::convergence::Convergence::check).

use faer::Mat;

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::SolveStats;

/// Per-iteration observer: `(iteration, residual norm)`.
pub type Monitor<'a> = &'a mut dyn FnMut(usize, f64);

/// Common interface for the iterative kernels.
pub trait LinearSolver {
    /// Solve A·x = b starting from the contents of `x`.
    fn solve(
        &mut self,
        a: &Mat<f64>,
        pc: &mut dyn Preconditioner,
        b: &[f64],
        x: &mut [f64],
        monitor: Monitor<'_>,
    ) -> Result<SolveStats, KError>;
}

pub mod bicgstab;
pub mod cg;
pub mod direct_lu;
pub mod gmres;
pub mod richardson;

pub use bicgstab::BiCgStabSolver;
pub use cg::CgSolver;
pub use direct_lu::LuSolver;
pub use gmres::GmresSolver;
pub use richardson::RichardsonSolver;

pub(crate) fn dot(x: &Vec<f64>, y: &Vec<f64>) -> f64 {
    ().dot(x, y)
}

pub(crate) fn norm(x: &Vec<f64>) -> f64 {
    ().norm(x)
}

/// y = A x
pub(crate) fn apply_op(a: &Mat<f64>, x: &Vec<f64>) -> Vec<f64> {
    let mut y = vec![0.0; a.nrows()];
    a.matvec(x, &mut y);
    y
}

/// y += alpha x
pub(crate) fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

pub(crate) fn check_dims(a: &Mat<f64>, b: &[f64], x: &[f64]) -> Result<(), KError> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() || b.len() != x.len() {
        return Err(KError::DimensionMismatch(format!(
            "operator {}x{}, rhs {}, solution {}",
            a.nrows(),
            a.ncols(),
            b.len(),
            x.len()
        )));
    }
    Ok(())
}
