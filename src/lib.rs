//! splitsolve: hierarchical solver assembly from declarative configuration
//!
//! This crate compiles nested linear-solver and preconditioner trees (including field-split
//! preconditioners over DOF index sets, with null-space removal) from a hierarchical option
//! tree, and drives Picard or Newton nonlinear iterations with them. A serial dense reference
//! backend over Faer executes the compiled trees.

pub mod parallel;

pub mod assembly;
pub mod bucket;
pub mod config;
pub mod constraints;
pub mod context;
pub mod core;
pub mod diagnostics;
pub mod dof;
pub mod error;
pub mod nonlinear;
pub mod nullspace;
pub mod preconditioner;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use assembly::{Assembler, Form};
pub use bucket::SolverBucket;
pub use config::{OptionStore, OptionTree};
pub use context::*;
pub use diagnostics::{ConvergenceLog, DiagnosticsSink};
pub use dof::{DofLayout, DofSubset, IndexSet};
pub use error::*;
pub use nonlinear::{IterationState, NonlinearSolverConfig};
pub use nullspace::NullSpace;
pub use parallel::{Comm, SerialComm};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
