//! Enumerated solver options.
//!
//! Every enumerated option in the tree (iterative method, preconditioner, field-split composite
//! type, factorization package, nonlinear solver kind, line search) is parsed into a closed enum
//! here. Unknown names are configuration errors carrying the offending path. Monitor selections
//! are bit sets.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::KError;

fn unknown(what: &'static str, name: &str, path: &str) -> KError {
    KError::UnknownValue {
        what,
        value: name.to_string(),
        path: path.to_string(),
    }
}

/// Krylov method of a linear solver node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterativeMethod {
    /// Apply the preconditioner once; tolerances do not apply.
    PreOnly,
    Richardson,
    Cg,
    Gmres,
    Fgmres,
    BiCgStab,
}

impl IterativeMethod {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "preonly" => Self::PreOnly,
            "richardson" => Self::Richardson,
            "cg" => Self::Cg,
            "gmres" => Self::Gmres,
            "fgmres" => Self::Fgmres,
            "bcgs" => Self::BiCgStab,
            _ => return Err(unknown("iterative method", name, path)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PreOnly => "preonly",
            Self::Richardson => "richardson",
            Self::Cg => "cg",
            Self::Gmres => "gmres",
            Self::Fgmres => "fgmres",
            Self::BiCgStab => "bcgs",
        }
    }
}

/// Preconditioners that carry no nested configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimplePc {
    None,
    Jacobi,
    Sor,
    Ilu,
}

impl SimplePc {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "none" => Self::None,
            "jacobi" => Self::Jacobi,
            "sor" => Self::Sor,
            "ilu" => Self::Ilu,
            _ => return Err(unknown("preconditioner", name, path)),
        })
    }
}

/// How the blocks of a field-split preconditioner are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeType {
    Additive,
    Multiplicative,
    SymmetricMultiplicative,
    Special,
    Schur,
}

impl CompositeType {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "additive" => Self::Additive,
            "multiplicative" => Self::Multiplicative,
            "symmetric_multiplicative" => Self::SymmetricMultiplicative,
            "special" => Self::Special,
            "schur" => Self::Schur,
            _ => return Err(unknown("composite type", name, path)),
        })
    }
}

/// Direct solver package used by an `lu` preconditioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorizationPackage {
    Petsc,
    Mumps,
    SuperLu,
    SuperLuDist,
    Umfpack,
    Pastix,
}

impl FactorizationPackage {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "petsc" => Self::Petsc,
            "mumps" => Self::Mumps,
            "superlu" => Self::SuperLu,
            "superlu_dist" => Self::SuperLuDist,
            "umfpack" => Self::Umfpack,
            "pastix" => Self::Pastix,
            _ => return Err(unknown("factorization package", name, path)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Petsc => "petsc",
            Self::Mumps => "mumps",
            Self::SuperLu => "superlu",
            Self::SuperLuDist => "superlu_dist",
            Self::Umfpack => "umfpack",
            Self::Pastix => "pastix",
        }
    }
}

/// Nonlinear solver strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonlinearKind {
    /// Residual/Jacobian Newton iteration run by a nonlinear backend.
    DelegatedNewton,
    /// Hand-rolled Picard iteration.
    FixedPoint,
}

impl NonlinearKind {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "SNES" => Self::DelegatedNewton,
            "Picard" => Self::FixedPoint,
            _ => return Err(unknown("solver type", name, path)),
        })
    }
}

/// Line search used by the Newton backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearch {
    Cubic,
    Quadratic,
    Basic,
    BasicNoNorms,
}

impl LineSearch {
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "cubic" => Self::Cubic,
            "quadratic" => Self::Quadratic,
            "basic" => Self::Basic,
            "basicnonorms" => Self::BasicNoNorms,
            _ => return Err(unknown("line search type", name, path)),
        })
    }
}

bitflags! {
    /// Observers attached to a linear solver node.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct KspMonitors: u8 {
        const PRECONDITIONED_RESIDUAL = 0b0001;
        const TRUE_RESIDUAL           = 0b0010;
        const CONVERGENCE_FILE        = 0b0100;
        const TEST_NULL_SPACE         = 0b1000;
    }
}

bitflags! {
    /// Observers attached to a nonlinear solver.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SnesMonitors: u8 {
        const RESIDUAL         = 0b001;
        const CONVERGENCE_FILE = 0b010;
        const NORMS            = 0b100;
    }
}
