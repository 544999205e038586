//! Wrappers for faer dense matrix types and vector operations.
//!
//! Implements the core traits for `faer::Mat` and `Vec<T>` so the reference solvers, the
//! field-split runtime and the nonlinear drivers can share one operator type. Inner products run
//! on Rayon when the `rayon` feature is enabled.

use crate::core::traits::{InnerProduct, MatVec, SubmatrixExtract};
use faer::Mat;
use num_traits::Float;

/// Computes `y = A * x` where `A` is a dense matrix.
impl<T: Float> MatVec<Vec<T>> for Mat<T> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        for i in 0..self.nrows() {
            y[i] = T::zero();
            for j in 0..self.ncols() {
                y[i] = y[i] + self[(i, j)] * x[j];
            }
        }
    }
}

impl<T: Float + From<f64> + Send + Sync> InnerProduct<Vec<T>> for () {
    type Scalar = T;

    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .zip(y.as_slice().par_iter())
                .map(|(xi, yi)| *xi * *yi)
                .reduce(|| T::zero(), |acc, v| acc + v)
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .zip(y.iter())
                .map(|(xi, yi)| *xi * *yi)
                .fold(T::zero(), |acc, v| acc + v)
        }
    }

    fn norm(&self, x: &Vec<T>) -> T {
        self.dot(x, x).sqrt()
    }
}

impl<T: Copy> SubmatrixExtract for Mat<T> {
    fn extract(&self, rows: &[usize], cols: &[usize]) -> Self {
        Mat::from_fn(rows.len(), cols.len(), |i, j| self[(rows[i], cols[j])])
    }
}

/// Frobenius norm of a dense matrix.
pub fn frobenius(a: &Mat<f64>) -> f64 {
    let mut s = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            s += a[(i, j)] * a[(i, j)];
        }
    }
    s.sqrt()
}

/// r = b - A x
pub fn residual(a: &Mat<f64>, x: &[f64], b: &[f64]) -> Vec<f64> {
    let mut ax = vec![0.0; b.len()];
    a.matvec(&x.to_vec(), &mut ax);
    b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_picks_rows_and_cols() {
        let a = Mat::from_fn(4, 4, |i, j| (10 * i + j) as f64);
        let s = a.extract(&[1, 3], &[0, 2]);
        assert_eq!(s.nrows(), 2);
        assert_eq!(s.ncols(), 2);
        assert_eq!(s[(0, 0)], 10.0);
        assert_eq!(s[(1, 1)], 32.0);
        let p = a.principal(&[2]);
        assert_eq!(p[(0, 0)], 22.0);
    }

    #[test]
    fn residual_of_exact_solution_vanishes() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 1.0 });
        let r = residual(&a, &[1.0, 1.0], &[3.0, 3.0]);
        assert_eq!(r, vec![0.0, 0.0]);
    }
}
