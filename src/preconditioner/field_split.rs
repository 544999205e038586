//! Field-split preconditioner runtime.
//!
//! Each split owns the rows `local` of its [`IndexSet`](crate::dof::IndexSet) and a
//! [`KspContext`] solving with the principal block `P[local, local]`. The blocks are combined
//! according to the composite type:
//!
//! - additive: block Jacobi, every split sees the original residual;
//! - multiplicative: block Gauss–Seidel, each split sees the residual updated by the splits
//!   before it;
//! - symmetric multiplicative: a forward then a backward multiplicative sweep;
//! - schur: with splits 0 and 1, `y₀ = K₀⁻¹ r₀`, `z₁ = K₁⁻¹ (r₁ − P₁₀ y₀)`,
//!   `z₀ = K₀⁻¹ (r₀ − P₀₁ z₁)`, where the second split's solver stands for the Schur complement.

use faer::Mat;

use crate::config::CompositeType;
use crate::context::KspContext;
use crate::context::pc_context::FieldSplit;
use crate::core::traits::{MatVec, SubmatrixExtract};
use crate::error::KError;
use crate::preconditioner::Preconditioner;

struct Block {
    name: String,
    rows: Vec<usize>,
    ksp: KspContext,
}

pub struct FieldSplitPc {
    composite: CompositeType,
    blocks: Vec<Block>,
    p: Option<Mat<f64>>,
    /// Off-diagonal blocks P₀₁ and P₁₀ of a Schur split.
    coupling: Option<(Mat<f64>, Mat<f64>)>,
}

fn gather(v: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&i| v[i]).collect()
}

impl FieldSplitPc {
    pub fn new(fs: &FieldSplit) -> Result<Self, KError> {
        let blocks = fs
            .splits
            .iter()
            .map(|s| {
                Ok(Block {
                    name: s.name.clone(),
                    rows: s.index_set.local.clone(),
                    ksp: KspContext::from_node(&s.solver)?,
                })
            })
            .collect::<Result<Vec<_>, KError>>()?;
        Ok(Self { composite: fs.composite, blocks, p: None, coupling: None })
    }

    /// Solve split `k` against the residual restricted to its rows and add the result into `z`.
    fn solve_block(&mut self, k: usize, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        let block = &mut self.blocks[k];
        let rhs = gather(r, &block.rows);
        let mut y = vec![0.0; rhs.len()];
        let stats = block.ksp.solve(&rhs, &mut y)?;
        log::trace!("split {}: {:?} in {} iterations", block.name, stats.reason, stats.iterations);
        for (&i, yi) in block.rows.iter().zip(&y) {
            z[i] += yi;
        }
        Ok(())
    }

    /// Full residual r − P z, for the multiplicative sweeps.
    fn update(&self, r: &[f64], z: &[f64]) -> Result<Vec<f64>, KError> {
        let p = self
            .p
            .as_ref()
            .ok_or_else(|| KError::SolveError("fieldsplit applied before setup".into()))?;
        let mut pz = vec![0.0; r.len()];
        p.matvec(&z.to_vec(), &mut pz);
        Ok(r.iter().zip(&pz).map(|(ri, pi)| ri - pi).collect())
    }

    fn sweep(&mut self, order: &[usize], r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        for &k in order {
            let res = self.update(r, z)?;
            self.solve_block(k, &res, z)?;
        }
        Ok(())
    }

    fn schur(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        let (p01, p10) = self
            .coupling
            .as_ref()
            .ok_or_else(|| KError::SolveError("fieldsplit applied before setup".into()))?;
        let (rows0, rows1) = (self.blocks[0].rows.clone(), self.blocks[1].rows.clone());
        let r0 = gather(r, &rows0);
        let r1 = gather(r, &rows1);

        let mut y0 = vec![0.0; r0.len()];
        self.blocks[0].ksp.solve(&r0, &mut y0)?;

        let mut t = vec![0.0; r1.len()];
        p10.matvec(&y0, &mut t);
        let rhs1: Vec<f64> = r1.iter().zip(&t).map(|(a, b)| a - b).collect();
        let mut z1 = vec![0.0; r1.len()];
        self.blocks[1].ksp.solve(&rhs1, &mut z1)?;

        let mut t = vec![0.0; r0.len()];
        p01.matvec(&z1, &mut t);
        let rhs0: Vec<f64> = r0.iter().zip(&t).map(|(a, b)| a - b).collect();
        let mut z0 = vec![0.0; r0.len()];
        self.blocks[0].ksp.solve(&rhs0, &mut z0)?;

        for (&i, v) in rows0.iter().zip(&z0) {
            z[i] = *v;
        }
        for (&i, v) in rows1.iter().zip(&z1) {
            z[i] = *v;
        }
        Ok(())
    }
}

impl Preconditioner for FieldSplitPc {
    fn setup(&mut self, p: &Mat<f64>) -> Result<(), KError> {
        if self.composite == CompositeType::Special {
            return Err(KError::Unsupported("special fieldsplit composition"));
        }
        let n = p.nrows();
        for block in &mut self.blocks {
            if let Some(&bad) = block.rows.iter().find(|&&i| i >= n) {
                return Err(KError::DimensionMismatch(format!(
                    "split {} has row {bad} outside operator of size {n}",
                    block.name
                )));
            }
            block.ksp.set_operators(p.principal(&block.rows), None)?;
        }
        if self.composite == CompositeType::Schur {
            if self.blocks.len() != 2 {
                return Err(KError::DimensionMismatch(format!(
                    "schur fieldsplit needs 2 splits, found {}",
                    self.blocks.len()
                )));
            }
            let (r0, r1) = (&self.blocks[0].rows, &self.blocks[1].rows);
            self.coupling = Some((p.extract(r0, r1), p.extract(r1, r0)));
        }
        self.p = Some(p.clone());
        Ok(())
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        z.fill(0.0);
        let forward: Vec<usize> = (0..self.blocks.len()).collect();
        match self.composite {
            CompositeType::Additive => {
                for k in forward {
                    self.solve_block(k, r, z)?;
                }
                Ok(())
            }
            CompositeType::Multiplicative => self.sweep(&forward, r, z),
            CompositeType::SymmetricMultiplicative => {
                self.sweep(&forward, r, z)?;
                let backward: Vec<usize> = forward.iter().rev().skip(1).copied().collect();
                self.sweep(&backward, r, z)
            }
            CompositeType::Schur => self.schur(r, z),
            CompositeType::Special => Err(KError::Unsupported("special fieldsplit composition")),
        }
    }
}
