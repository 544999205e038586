// Another Krylov solve used as the preconditioner.

use faer::Mat;

use crate::context::KspContext;
use crate::error::KError;
use crate::preconditioner::Preconditioner;

/// `ksp`: M⁻¹ r is an inner solve of A z = r from a zero initial guess.
pub struct NestedKsp {
    pub ksp: KspContext,
}

impl NestedKsp {
    pub fn new(ksp: KspContext) -> Self {
        Self { ksp }
    }
}

impl Preconditioner for NestedKsp {
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        self.ksp.set_operators(a.clone(), None)
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        z.fill(0.0);
        let stats = self.ksp.solve(r, z)?;
        log::trace!(
            "{}inner solve: {:?} after {} iterations",
            self.ksp.prefix(),
            stats.reason,
            stats.iterations
        );
        Ok(())
    }
}
