//! Read-only access to the hierarchical option tree.
//!
//! Solvers, preconditioners and index sets are all described by a tree of options addressed by
//! `/`-separated paths such as `solver/type/linear_solver/preconditioner/fieldsplit[1]/name`.
//! A segment written `name[i]` selects the i-th repeated sibling called `name`; an unindexed
//! segment over repeated siblings selects the first one.
//!
//! The store itself is an external collaborator, so it is consumed through the [`OptionStore`]
//! trait. [`OptionTree`] is an in-memory implementation over `serde_json` values.
//!
//! Modules:
//! - [`options`]: closed enums and monitor flag sets for every enumerated option.
//! - [`tree`]: the JSON-backed [`OptionTree`].

use crate::error::KError;

pub mod options;
pub mod tree;

pub use options::*;
pub use tree::OptionTree;

/// A typed leaf value read from the option tree.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Presence-only option (no data attached).
    Flag,
    Int(i64),
    Real(f64),
    Str(String),
    IntList(Vec<i64>),
    RealList(Vec<f64>),
}

/// Query interface of the configuration store.
pub trait OptionStore {
    /// Does an option exist at `path`?
    fn have_option(&self, path: &str) -> bool;
    /// Number of repeated siblings named by the last segment of `path`.
    fn option_count(&self, path: &str) -> usize;
    /// Raw leaf value at `path`, if any.
    fn get_value(&self, path: &str) -> Option<OptionValue>;

    fn get_string(&self, path: &str) -> Result<String, KError> {
        match self.get_value(path) {
            Some(OptionValue::Str(s)) => Ok(s),
            Some(other) => Err(KError::invalid(path, format!("expected a string, found {other:?}"))),
            None => Err(KError::missing(path)),
        }
    }

    fn get_f64(&self, path: &str) -> Result<f64, KError> {
        match self.get_value(path) {
            Some(OptionValue::Real(v)) => Ok(v),
            Some(OptionValue::Int(v)) => Ok(v as f64),
            Some(other) => Err(KError::invalid(path, format!("expected a real, found {other:?}"))),
            None => Err(KError::missing(path)),
        }
    }

    fn get_f64_or(&self, path: &str, default: f64) -> Result<f64, KError> {
        if self.have_option(path) {
            self.get_f64(path)
        } else {
            Ok(default)
        }
    }

    fn get_usize(&self, path: &str) -> Result<usize, KError> {
        match self.get_value(path) {
            Some(OptionValue::Int(v)) if v >= 0 => Ok(v as usize),
            Some(other) => Err(KError::invalid(
                path,
                format!("expected a non-negative integer, found {other:?}"),
            )),
            None => Err(KError::missing(path)),
        }
    }

    fn get_usize_or(&self, path: &str, default: usize) -> Result<usize, KError> {
        if self.have_option(path) {
            self.get_usize(path)
        } else {
            Ok(default)
        }
    }

    fn get_int_list(&self, path: &str) -> Result<Vec<i64>, KError> {
        match self.get_value(path) {
            Some(OptionValue::IntList(v)) => Ok(v),
            Some(OptionValue::Int(v)) => Ok(vec![v]),
            Some(other) => Err(KError::invalid(
                path,
                format!("expected a list of integers, found {other:?}"),
            )),
            None => Err(KError::missing(path)),
        }
    }

    fn get_usize_list(&self, path: &str) -> Result<Vec<usize>, KError> {
        self.get_int_list(path)?
            .into_iter()
            .map(|v| {
                usize::try_from(v)
                    .map_err(|_| KError::invalid(path, format!("negative entry {v}")))
            })
            .collect()
    }
}

/// Join a child segment onto an option path.
pub fn join(path: &str, child: &str) -> String {
    if path.is_empty() {
        child.to_string()
    } else {
        format!("{path}/{child}")
    }
}

/// Path to the i-th repeated sibling `child` under `path`.
pub fn nth(path: &str, child: &str, i: usize) -> String {
    join(path, &format!("{child}[{i}]"))
}
