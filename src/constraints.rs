//! Boundary-condition collaborators applied to assembled systems.
//!
//! A [`Constraint`] knows how to modify a linear system, an operator alone, a nonlinear residual
//! and an iterate. Rows are positions in the assembled operator (offsets from the start of the
//! caller's ownership range).

use faer::Mat;

use crate::dof::DofSubset;
use crate::error::KError;

/// Penalty coefficient of a reference point.
pub const SPRING: f64 = f64::MAX * f64::EPSILON;

pub trait Constraint {
    fn name(&self) -> &str;
    /// Constrain a linear system. `a` is `None` when only the right-hand side is reassembled.
    fn apply_system(&self, a: Option<&mut Mat<f64>>, b: &mut [f64]) -> Result<(), KError>;
    /// Constrain an operator on its own (Jacobians, preconditioning operators).
    fn apply_operator(&self, a: &mut Mat<f64>) -> Result<(), KError>;
    /// Constrain a nonlinear residual `f` evaluated at `x`.
    fn apply_residual(&self, f: &mut [f64], x: &[f64]) -> Result<(), KError>;
    /// Impose the constrained values on an iterate.
    fn apply_iterate(&self, x: &mut [f64]) -> Result<(), KError>;
}

/// Rows and their prescribed values.
#[derive(Debug, Clone, PartialEq)]
struct Rows {
    name: String,
    rows: Vec<usize>,
    values: Vec<f64>,
}

impl Rows {
    fn new(name: &str, rows: Vec<usize>, values: Vec<f64>) -> Result<Self, KError> {
        if rows.len() != values.len() {
            return Err(KError::DimensionMismatch(format!(
                "{name}: {} rows but {} values",
                rows.len(),
                values.len()
            )));
        }
        Ok(Self { name: name.to_string(), rows, values })
    }

    fn uniform(name: &str, rows: Vec<usize>, value: f64) -> Self {
        let values = vec![value; rows.len()];
        Self { name: name.to_string(), rows, values }
    }

    fn from_subset(name: &str, dofs: &DofSubset, first_owned: usize, value: f64) -> Self {
        Self::uniform(name, dofs.iter().map(|d| d - first_owned).collect(), value)
    }

    fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows.iter().copied().zip(self.values.iter().copied())
    }

    fn check_len(&self, what: &str, len: usize) -> Result<(), KError> {
        match self.rows.iter().find(|&&r| r >= len) {
            Some(r) => Err(KError::DimensionMismatch(format!(
                "{}: row {r} outside {what} of size {len}",
                self.name
            ))),
            None => Ok(()),
        }
    }

    fn check_system(&self, a: Option<&Mat<f64>>, b: &[f64]) -> Result<(), KError> {
        if let Some(a) = a {
            if a.nrows() != b.len() {
                return Err(KError::DimensionMismatch(format!(
                    "{}: operator has {} rows, vector has {}",
                    self.name,
                    a.nrows(),
                    b.len()
                )));
            }
            self.check_len("operator", a.nrows())?;
        }
        self.check_len("vector", b.len())
    }

    fn check_pair(&self, f: &[f64], x: &[f64]) -> Result<(), KError> {
        if f.len() != x.len() {
            return Err(KError::DimensionMismatch(format!(
                "{}: residual has {} entries, iterate has {}",
                self.name,
                f.len(),
                x.len()
            )));
        }
        self.check_len("vector", x.len())
    }

    fn apply_residual(&self, f: &mut [f64], x: &[f64]) -> Result<(), KError> {
        self.check_pair(f, x)?;
        for (r, v) in self.iter() {
            f[r] = x[r] - v;
        }
        Ok(())
    }

    fn apply_iterate(&self, x: &mut [f64]) -> Result<(), KError> {
        self.check_len("vector", x.len())?;
        for (r, v) in self.iter() {
            x[r] = v;
        }
        Ok(())
    }
}

/// Strong Dirichlet rows: zeroed with a unit diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletRows(Rows);

impl DirichletRows {
    pub fn new(name: &str, rows: Vec<usize>, values: Vec<f64>) -> Result<Self, KError> {
        Rows::new(name, rows, values).map(Self)
    }

    pub fn uniform(name: &str, rows: Vec<usize>, value: f64) -> Self {
        Self(Rows::uniform(name, rows, value))
    }

    /// Every DOF of `dofs`, as rows of an operator starting at `first_owned`.
    pub fn from_subset(name: &str, dofs: &DofSubset, first_owned: usize, value: f64) -> Self {
        Self(Rows::from_subset(name, dofs, first_owned, value))
    }

    fn zero_rows(&self, a: &mut Mat<f64>) {
        for &r in &self.0.rows {
            for j in 0..a.ncols() {
                a[(r, j)] = 0.0;
            }
            a[(r, r)] = 1.0;
        }
    }
}

impl Constraint for DirichletRows {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn apply_system(&self, a: Option<&mut Mat<f64>>, b: &mut [f64]) -> Result<(), KError> {
        self.0.check_system(a.as_deref(), b)?;
        if let Some(a) = a {
            self.zero_rows(a);
        }
        for (r, v) in self.0.iter() {
            b[r] = v;
        }
        Ok(())
    }

    fn apply_operator(&self, a: &mut Mat<f64>) -> Result<(), KError> {
        self.0.check_len("operator", a.nrows())?;
        self.zero_rows(a);
        Ok(())
    }

    fn apply_residual(&self, f: &mut [f64], x: &[f64]) -> Result<(), KError> {
        self.0.apply_residual(f, x)
    }

    fn apply_iterate(&self, x: &mut [f64]) -> Result<(), KError> {
        self.0.apply_iterate(x)
    }
}

/// Pointwise values pinned by a penalty on the diagonal.
///
/// `A[d,d] += SPRING` and `b[d] = SPRING * value`, so the solve drives `x[d]` to `value` without
/// touching the rest of the row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoints(Rows);

impl ReferencePoints {
    pub fn new(name: &str, rows: Vec<usize>, values: Vec<f64>) -> Result<Self, KError> {
        Rows::new(name, rows, values).map(Self)
    }

    /// Pin `rows` to zero.
    pub fn zero(name: &str, rows: Vec<usize>) -> Self {
        Self(Rows::uniform(name, rows, 0.0))
    }

    fn add_springs(&self, a: &mut Mat<f64>) {
        for &r in &self.0.rows {
            a[(r, r)] += SPRING;
        }
    }
}

impl Constraint for ReferencePoints {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn apply_system(&self, a: Option<&mut Mat<f64>>, b: &mut [f64]) -> Result<(), KError> {
        self.0.check_system(a.as_deref(), b)?;
        log::debug!("applying reference points {} to linear system", self.0.name);
        let scale = match a {
            Some(a) => {
                self.add_springs(a);
                SPRING
            }
            None => 1.0,
        };
        for (r, v) in self.0.iter() {
            b[r] = scale * v;
        }
        Ok(())
    }

    fn apply_operator(&self, a: &mut Mat<f64>) -> Result<(), KError> {
        self.0.check_len("operator", a.nrows())?;
        self.add_springs(a);
        Ok(())
    }

    fn apply_residual(&self, f: &mut [f64], x: &[f64]) -> Result<(), KError> {
        self.0.apply_residual(f, x)
    }

    fn apply_iterate(&self, x: &mut [f64]) -> Result<(), KError> {
        self.0.apply_iterate(x)
    }
}

/// Put a unit diagonal on every identically zero row. Returns the rows fixed.
pub fn ident_zeros(a: &mut Mat<f64>) -> Vec<usize> {
    let zero_rows: Vec<usize> = (0..a.nrows())
        .filter(|&i| (0..a.ncols()).all(|j| a[(i, j)] == 0.0))
        .collect();
    for &i in &zero_rows {
        a[(i, i)] = 1.0;
    }
    zero_rows
}
