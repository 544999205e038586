//! Solver trees: compilation from options and runtime realization.
//!
//! Modules:
//! - [`pc_context`]: the compiled tree, [`SolverNode`] and [`PreconditionerNode`].
//! - [`compiler`]: the recursive [`SolverCompiler`].
//! - [`ksp_context`]: [`KspContext`], which runs a compiled node on the reference backend.
//!
//! # Example
//! ```rust
//! use splitsolve::config::OptionTree;
//! use splitsolve::context::{KspContext, SolverCompiler};
//! use splitsolve::dof::IntervalLayout;
//! use splitsolve::parallel::SerialComm;
//!
//! let options = OptionTree::from_json_str(r#"{"ls": {
//!     "iterative_method": {"name": "cg", "relative_error": 1e-10, "max_iterations": 20},
//!     "preconditioner": {"name": "jacobi"}}}"#).unwrap();
//! let layout = IntervalLayout::new(4).with_field("u", 0);
//! let node = SolverCompiler::new(&options, &layout, &SerialComm)
//!     .compile("ls", "Poisson_Solver_", None)
//!     .unwrap();
//! let ksp = KspContext::from_node(&node).unwrap();
//! # let _ = ksp;
//! ```

pub mod compiler;
pub mod ksp_context;
pub mod pc_context;

pub use compiler::SolverCompiler;
pub use ksp_context::KspContext;
pub use pc_context::{FieldSplit, PreconditionerNode, SolverNode, Split, Tolerances};
