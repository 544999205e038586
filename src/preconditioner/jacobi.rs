// Jacobi preconditioner implementation

use faer::Mat;

use crate::error::KError;
use crate::preconditioner::Preconditioner;

/// Jacobi preconditioner: M⁻¹ = D⁻¹. Zero diagonal entries are treated as 1.
#[derive(Debug, Default, Clone)]
pub struct Jacobi {
    pub(crate) inv_diag: Vec<f64>,
}

impl Jacobi {
    /// new with empty state; user must call `setup`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preconditioner for Jacobi {
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        self.inv_diag = (0..a.nrows())
            .map(|i| {
                let d = a[(i, i)];
                if d != 0.0 { 1.0 / d } else { 1.0 }
            })
            .collect();
        Ok(())
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        if r.len() != self.inv_diag.len() {
            return Err(KError::DimensionMismatch(format!(
                "jacobi of size {} applied to vector of size {}",
                self.inv_diag.len(),
                r.len()
            )));
        }
        for ((zi, ri), di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = di * ri;
        }
        Ok(())
    }
}
