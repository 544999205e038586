//! ILU(0) factorization with zero fill (Saad §10.3.2, IKJ variant).

use faer::Mat;

use crate::error::KError;
use crate::preconditioner::Preconditioner;

/// Unit-lower L and upper U stored together, on the nonzero pattern of A.
#[derive(Debug)]
pub struct Ilu0 {
    lu: Mat<f64>,
}

impl Ilu0 {
    pub fn new() -> Self {
        Self { lu: Mat::zeros(0, 0) }
    }
}

impl Default for Ilu0 {
    fn default() -> Self {
        Self::new()
    }
}

impl Preconditioner for Ilu0 {
    fn setup(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        let n = a.nrows();
        let mut lu = a.clone();
        for i in 1..n {
            for k in 0..i {
                if a[(i, k)] == 0.0 {
                    continue;
                }
                let pivot = lu[(k, k)];
                if pivot == 0.0 {
                    return Err(KError::ZeroPivot(k));
                }
                let lik = lu[(i, k)] / pivot;
                lu[(i, k)] = lik;
                for j in k + 1..n {
                    if a[(i, j)] != 0.0 {
                        lu[(i, j)] -= lik * lu[(k, j)];
                    }
                }
            }
        }
        if let Some(i) = (0..n).find(|&i| lu[(i, i)] == 0.0) {
            return Err(KError::ZeroPivot(i));
        }
        self.lu = lu;
        Ok(())
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        let n = r.len();
        if n != self.lu.nrows() {
            return Err(KError::DimensionMismatch(format!(
                "ilu of size {} applied to vector of size {n}",
                self.lu.nrows()
            )));
        }
        // solve L y = r
        z.copy_from_slice(r);
        for i in 0..n {
            for j in 0..i {
                z[i] -= self.lu[(i, j)] * z[j];
            }
        }
        // solve U z = y
        for i in (0..n).rev() {
            for j in i + 1..n {
                z[i] -= self.lu[(i, j)] * z[j];
            }
            z[i] /= self.lu[(i, i)];
        }
        Ok(())
    }
}
