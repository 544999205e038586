// Direct factorization used as a preconditioner.

use faer::Mat;

use crate::config::FactorizationPackage;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::LuSolver;

/// `lu`: M⁻¹ = A⁻¹ through a dense LU. Every factorization package is realized by the same
/// factorization; the package name is kept for reporting.
pub struct Lu {
    pub package: FactorizationPackage,
    solver: LuSolver,
}

impl Lu {
    pub fn new(package: FactorizationPackage) -> Self {
        Self { package, solver: LuSolver::new() }
    }
}

impl Preconditioner for Lu {
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        log::debug!("lu factorization ({}) of order {}", self.package.name(), a.nrows());
        self.solver.factor(a)
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        self.solver.solve_cached(r, z)
    }
}
