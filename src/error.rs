use thiserror::Error;

// Unified error type for splitsolve

#[derive(Error, Debug)]
pub enum KError {
    #[error("missing option: {path}")]
    MissingOption { path: String },
    #[error("invalid option at {path}: {reason}")]
    InvalidOption { path: String, reason: String },
    #[error("unknown {what} \"{value}\" at {path}")]
    UnknownValue {
        what: &'static str,
        value: String,
        path: String,
    },
    #[error("unknown field \"{name}\"")]
    UnknownField { name: String },
    #[error("component {component} out of range for field \"{field}\" ({num_sub_elements} sub-elements)")]
    ComponentOutOfRange {
        field: String,
        component: usize,
        num_sub_elements: usize,
    },
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("empty index set \"{name}\"")]
    EmptyIndexSet { name: String },
    #[error("index {index} is not in the parent index set")]
    NotInParent { index: usize },
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("solve error: {0}")]
    SolveError(String),
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("{solver} diverged: {reason}")]
    Diverged { solver: String, reason: String },
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl KError {
    /// True for errors caused by the configuration tree rather than the numerics.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KError::MissingOption { .. }
                | KError::InvalidOption { .. }
                | KError::UnknownValue { .. }
                | KError::UnknownField { .. }
                | KError::ComponentOutOfRange { .. }
        )
    }

    /// True for breakdowns of a factorization or sweep on the operator it was given.
    pub fn is_numerical(&self) -> bool {
        matches!(self, KError::FactorError(_) | KError::ZeroPivot(_))
    }

    pub(crate) fn missing(path: impl Into<String>) -> Self {
        KError::MissingOption { path: path.into() }
    }

    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        KError::InvalidOption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
