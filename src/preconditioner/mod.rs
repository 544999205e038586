//! Preconditioners of the reference backend.
//!
//! Every [`PreconditionerNode`](crate::context::pc_context::PreconditionerNode) variant maps to
//! one implementation here: Jacobi, SOR, ILU(0), dense LU, a nested Krylov solve, and the
//! field-split composite. `apply` takes `&mut self` because nested and split preconditioners run
//! Krylov solves of their own.

use faer::Mat;

use crate::error::KError;

/// A preconditioner M ≈ A⁻¹.
pub trait Preconditioner {
    /// Setup/factorize from the preconditioning operator.
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError>;
    /// Apply M⁻¹ to r, writing z = M⁻¹ r
    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError>;
}

pub mod field_split;
pub mod ilu;
pub mod jacobi;
pub mod lu;
pub mod nested;
pub mod sor;

pub use field_split::FieldSplitPc;
pub use ilu::Ilu0;
pub use jacobi::Jacobi;
pub use lu::Lu;
pub use nested::NestedKsp;
pub use sor::{MatSorType, Sor};

/// `none`: z = r.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Preconditioner for Identity {
    fn setup(&mut self, _a: &Mat<f64>) -> Result<(), KError> {
        Ok(())
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        z.copy_from_slice(r);
        Ok(())
    }
}
