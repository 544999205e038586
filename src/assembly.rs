//! The assembly collaborator: forms in, operators and vectors out.

use std::fmt;

use faer::Mat;
use serde::{Deserialize, Serialize};

use crate::error::KError;

/// Symbolic forms a nonlinear solver assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Form {
    Bilinear,
    BilinearPc,
    Linear,
    Residual,
    Jacobian,
    JacobianPc,
}

impl Form {
    /// Form names as written in the option tree.
    pub fn from_name(path: &str, name: &str) -> Result<Self, KError> {
        Ok(match name {
            "Bilinear" => Self::Bilinear,
            "BilinearPC" => Self::BilinearPc,
            "Linear" => Self::Linear,
            "Residual" => Self::Residual,
            "Jacobian" => Self::Jacobian,
            "JacobianPC" => Self::JacobianPc,
            _ => {
                return Err(KError::UnknownValue {
                    what: "form",
                    value: name.to_string(),
                    path: path.to_string(),
                });
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bilinear => "Bilinear",
            Self::BilinearPc => "BilinearPC",
            Self::Linear => "Linear",
            Self::Residual => "Residual",
            Self::Jacobian => "Jacobian",
            Self::JacobianPc => "JacobianPC",
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Assembles forms at the current iterate, in place.
///
/// Matrices and vectors arrive zeroed and sized to the system's owned rows.
pub trait Assembler {
    fn assemble_matrix(&mut self, form: Form, iterate: &[f64], a: &mut Mat<f64>) -> Result<(), KError>;
    fn assemble_vector(&mut self, form: Form, iterate: &[f64], b: &mut [f64]) -> Result<(), KError>;
}
