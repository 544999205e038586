//! Null-Space Builder: unit constant vectors over disjoint index sets.

use faer::Mat;

use crate::core::MatVec;
use crate::core::wrappers::frobenius;
use crate::dof::IndexSet;
use crate::error::KError;
use crate::parallel::Comm;

/// Relative bound on `||A n||` accepted by [`NullSpace::test`].
const NULL_SPACE_TEST_TOL: f64 = 1e-8;

/// Orthonormal constant vectors attached to one linear operator.
#[derive(Debug, Clone, PartialEq)]
pub struct NullSpace {
    names: Vec<String>,
    vectors: Vec<Vec<f64>>,
}

impl NullSpace {
    /// One vector per index set, of operator row length `len`, valued `1/sqrt(global set size)`
    /// on the set and zero elsewhere. Returns `None` when no sets are given.
    pub fn build(sets: &[IndexSet], len: usize) -> Result<Option<Self>, KError> {
        if sets.is_empty() {
            return Ok(None);
        }
        let mut names = Vec::with_capacity(sets.len());
        let mut vectors = Vec::with_capacity(sets.len());
        for set in sets {
            if set.global_len == 0 {
                return Err(KError::EmptyIndexSet { name: set.name.clone() });
            }
            let value = 1.0 / (set.global_len as f64).sqrt();
            let mut v = vec![0.0; len];
            for &row in &set.local {
                let slot = v.get_mut(row).ok_or_else(|| {
                    KError::DimensionMismatch(format!(
                        "null space {}: row {row} outside operator of size {len}",
                        set.name
                    ))
                })?;
                *slot = value;
            }
            names.push(set.name.clone());
            vectors.push(v);
        }
        Ok(Some(Self { names, vectors }))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vec<f64>] {
        &self.vectors
    }

    /// Project the null space out of `x`.
    pub fn remove(&self, x: &mut [f64], comm: &dyn Comm) {
        for v in &self.vectors {
            let alpha = comm.dot(x, v);
            for (xi, vi) in x.iter_mut().zip(v) {
                *xi -= alpha * vi;
            }
        }
    }

    /// Check that `A` annihilates every vector. Failures are logged, never returned.
    pub fn test(&self, a: &Mat<f64>) -> bool {
        let scale = frobenius(a).max(1.0);
        let mut ok = true;
        for (name, v) in self.names.iter().zip(&self.vectors) {
            let mut av = vec![0.0; a.nrows()];
            a.matvec(v, &mut av);
            let norm = av.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > NULL_SPACE_TEST_TOL * scale {
                log::warn!("null space vector {name} is not in the operator null space: ||A n|| = {norm:e}");
                ok = false;
            }
        }
        ok
    }

    pub fn view(&self, prefix: &str) {
        for (name, v) in self.names.iter().zip(&self.vectors) {
            let support = v.iter().filter(|&&x| x != 0.0).count();
            log::info!("{prefix}null space vector {name}: {support} entries");
        }
    }
}
