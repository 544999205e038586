//! Direct dense solve using faer's partial-pivoting LU.
//!
//! The factorization is computed once by [`LuSolver::factor`] and reused by every
//! [`LuSolver::solve_cached`] call, which is how `lu` preconditioners and `preonly` direct
//! solves use it.

use faer::linalg::solvers::{PartialPivLu, SolveCore};
use faer::{Conj, Mat, MatMut};

use crate::error::KError;

/// LU solver with a cached factorization.
#[derive(Default)]
pub struct LuSolver {
    factor: Option<PartialPivLu<f64>>,
    n: usize,
}

impl LuSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factor `a`, replacing any previous factorization.
    pub fn factor(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        if a.nrows() != a.ncols() {
            return Err(KError::DimensionMismatch(format!(
                "LU needs a square operator, got {}x{}",
                a.nrows(),
                a.ncols()
            )));
        }
        self.factor = Some(PartialPivLu::new(a.as_ref()));
        self.n = a.nrows();
        Ok(())
    }

    /// Solve with the cached factorization. A singular operator shows up as a non-finite result.
    pub fn solve_cached(&self, b: &[f64], x: &mut [f64]) -> Result<(), KError> {
        let factor = self
            .factor
            .as_ref()
            .ok_or_else(|| KError::FactorError("LU solve before factorization".into()))?;
        if b.len() != self.n || x.len() != self.n {
            return Err(KError::DimensionMismatch(format!(
                "LU of size {} applied to vectors of size {}/{}",
                self.n,
                b.len(),
                x.len()
            )));
        }
        x.copy_from_slice(b);
        let x_mat = MatMut::from_column_major_slice_mut(x, self.n, 1);
        factor.solve_in_place_with_conj(Conj::No, x_mat);
        if x.iter().any(|v| !v.is_finite()) {
            return Err(KError::FactorError("singular operator".into()));
        }
        Ok(())
    }
}
