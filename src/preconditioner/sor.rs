use std::fmt;

use bitflags::bitflags;
use faer::Mat;

use crate::error::KError;
use crate::preconditioner::Preconditioner;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MatSorType: u32 {
        const APPLY_LOWER     = 0b01; // forward Gauss–Seidel
        const APPLY_UPPER     = 0b10; // backward
        const SYMMETRIC_SWEEP = Self::APPLY_LOWER.bits() | Self::APPLY_UPPER.bits();
    }
}

/// SOR sweeps on A z = r from a zero initial guess.
pub struct Sor {
    pub its: usize,
    pub sym: MatSorType,
    pub omega: f64,
    a: Option<Mat<f64>>,
    inv_diag: Vec<f64>,
}

impl Sor {
    pub fn new(omega: f64, its: usize, sym: MatSorType) -> Self {
        Self { its, sym, omega, a: None, inv_diag: Vec::new() }
    }

    /// One symmetric sweep with ω = 1 (symmetric Gauss–Seidel).
    pub fn symmetric() -> Self {
        Self::new(1.0, 1, MatSorType::SYMMETRIC_SWEEP)
    }

    fn relax(&self, a: &Mat<f64>, i: usize, r: &[f64], z: &mut [f64]) {
        let n = r.len();
        let mut sigma = 0.0;
        for j in (0..n).filter(|&j| j != i) {
            sigma += a[(i, j)] * z[j];
        }
        z[i] = (1.0 - self.omega) * z[i] + self.omega * (r[i] - sigma) * self.inv_diag[i];
    }
}

impl fmt::Display for Sor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOR(omega={}, its={}, sym={:?})", self.omega, self.its, self.sym)
    }
}

impl Preconditioner for Sor {
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        let n = a.nrows();
        self.inv_diag = Vec::with_capacity(n);
        for i in 0..n {
            let aii = a[(i, i)];
            if aii == 0.0 {
                return Err(KError::ZeroPivot(i));
            }
            self.inv_diag.push(1.0 / aii);
        }
        self.a = Some(a.clone());
        Ok(())
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        let a = self
            .a
            .as_ref()
            .ok_or_else(|| KError::SolveError("SOR applied before setup".into()))?;
        let n = r.len();
        z.fill(0.0);
        for _ in 0..self.its {
            if self.sym.contains(MatSorType::APPLY_LOWER) {
                for i in 0..n {
                    self.relax(a, i, r, z);
                }
            }
            if self.sym.contains(MatSorType::APPLY_UPPER) {
                for i in (0..n).rev() {
                    self.relax(a, i, r, z);
                }
            }
        }
        Ok(())
    }
}
