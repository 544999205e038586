//! Compiled solver tree.
//!
//! A linear solver is a [`SolverNode`]: a Krylov method with its tolerances and monitors, an
//! optional null space, and a [`PreconditionerNode`]. Preconditioners are a closed set of
//! variants; two of them recurse ([`PreconditionerNode::NestedSolver`] and
//! [`PreconditionerNode::FieldSplit`]), so the depth of a tree is bounded only by the nesting of
//! the option tree it was compiled from.
//!
//! A direct solve is represented as `preonly` with a [`PreconditionerNode::Direct`]
//! factorization, see [`SolverNode::is_direct`].
//!
//! # Example
//!
//! ```rust
//! use splitsolve::config::{IterativeMethod, SimplePc};
//! use splitsolve::context::pc_context::{PreconditionerNode, SolverNode, Tolerances};
//! let node = SolverNode::iterative("sys_solver_", IterativeMethod::Cg, Tolerances::new(1e-8, 100))
//!     .with_preconditioner(PreconditionerNode::Simple(SimplePc::Jacobi));
//! assert_eq!(node.depth(), 1);
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::{CompositeType, FactorizationPackage, IterativeMethod, KspMonitors, SimplePc};
use crate::dof::IndexSet;
use crate::nullspace::NullSpace;
use crate::utils::convergence::Convergence;

/// Stopping criteria of an iterative node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
    pub dtol: f64,
    pub max_iterations: usize,
    /// Krylov basis size before a GMRES restart.
    pub restart: usize,
}

impl Tolerances {
    pub const DEFAULT_ATOL: f64 = 1e-50;
    pub const DEFAULT_DTOL: f64 = 1e4;
    pub const DEFAULT_RESTART: usize = 30;

    pub fn new(rtol: f64, max_iterations: usize) -> Self {
        Self {
            rtol,
            atol: Self::DEFAULT_ATOL,
            dtol: Self::DEFAULT_DTOL,
            max_iterations,
            restart: Self::DEFAULT_RESTART,
        }
    }

    pub fn convergence(&self) -> Convergence {
        Convergence {
            rtol: self.rtol,
            atol: self.atol,
            dtol: self.dtol,
            max_iters: self.max_iterations,
        }
    }
}

/// One split of a field-split preconditioner.
#[derive(Debug, Clone)]
pub struct Split {
    pub name: String,
    /// Rows of the parent operator owned by this split.
    pub index_set: IndexSet,
    pub solver: SolverNode,
}

#[derive(Debug, Clone)]
pub struct FieldSplit {
    pub composite: CompositeType,
    /// Splits in declaration order; their index sets are pairwise disjoint.
    pub splits: Vec<Split>,
}

#[derive(Debug, Clone)]
pub enum PreconditionerNode {
    Simple(SimplePc),
    NestedSolver(Box<SolverNode>),
    FieldSplit(FieldSplit),
    Direct(FactorizationPackage),
}

impl PreconditionerNode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple(SimplePc::None) => "none",
            Self::Simple(SimplePc::Jacobi) => "jacobi",
            Self::Simple(SimplePc::Sor) => "sor",
            Self::Simple(SimplePc::Ilu) => "ilu",
            Self::NestedSolver(_) => "ksp",
            Self::FieldSplit(_) => "fieldsplit",
            Self::Direct(_) => "lu",
        }
    }
}

/// A compiled linear solver.
#[derive(Debug, Clone)]
pub struct SolverNode {
    /// Options prefix locating this node in the tree, e.g. `Stokes_Solver_Velocity_`.
    pub prefix: String,
    pub method: IterativeMethod,
    /// `None` for `preonly`.
    pub tolerances: Option<Tolerances>,
    pub monitors: KspMonitors,
    pub preconditioner: PreconditionerNode,
    pub null_space: Option<NullSpace>,
}

impl SolverNode {
    pub fn iterative(prefix: &str, method: IterativeMethod, tolerances: Tolerances) -> Self {
        Self {
            prefix: prefix.to_string(),
            method,
            tolerances: Some(tolerances),
            monitors: KspMonitors::empty(),
            preconditioner: PreconditionerNode::Simple(SimplePc::None),
            null_space: None,
        }
    }

    /// `preonly` + LU.
    pub fn direct(prefix: &str, package: FactorizationPackage) -> Self {
        Self {
            prefix: prefix.to_string(),
            method: IterativeMethod::PreOnly,
            tolerances: None,
            monitors: KspMonitors::empty(),
            preconditioner: PreconditionerNode::Direct(package),
            null_space: None,
        }
    }

    pub fn with_preconditioner(mut self, pc: PreconditionerNode) -> Self {
        self.preconditioner = pc;
        self
    }

    pub fn with_monitors(mut self, monitors: KspMonitors) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn is_direct(&self) -> bool {
        self.method == IterativeMethod::PreOnly
            && matches!(self.preconditioner, PreconditionerNode::Direct(_))
    }

    /// Number of solver levels from this node down to the deepest leaf.
    pub fn depth(&self) -> usize {
        1 + match &self.preconditioner {
            PreconditionerNode::NestedSolver(inner) => inner.depth(),
            PreconditionerNode::FieldSplit(fs) => {
                fs.splits.iter().map(|s| s.solver.depth()).max().unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Indented textual description of the tree.
    pub fn view(&self) -> String {
        let mut out = String::new();
        self.view_into(&mut out, 0);
        out
    }

    fn view_into(&self, out: &mut String, level: usize) {
        let pad = "  ".repeat(level);
        let _ = write!(out, "{pad}KSP {} ({})", self.method.name(), self.prefix);
        if let Some(t) = &self.tolerances {
            let _ = write!(out, " rtol={:e} atol={:e} max_it={}", t.rtol, t.atol, t.max_iterations);
        }
        if let Some(ns) = &self.null_space {
            let _ = write!(out, " null_space={}", ns.len());
        }
        out.push('\n');
        let _ = write!(out, "{pad}  PC {}", self.preconditioner.name());
        match &self.preconditioner {
            PreconditionerNode::Direct(pkg) => {
                let _ = writeln!(out, " package={}", pkg.name());
            }
            PreconditionerNode::FieldSplit(fs) => {
                let _ = writeln!(out, " composite={:?} splits={}", fs.composite, fs.splits.len());
                for split in &fs.splits {
                    let _ = writeln!(out, "{pad}    split {} ({} rows)", split.name, split.index_set.len());
                    split.solver.view_into(out, level + 3);
                }
            }
            PreconditionerNode::NestedSolver(inner) => {
                out.push('\n');
                inner.view_into(out, level + 2);
            }
            PreconditionerNode::Simple(_) => out.push('\n'),
        }
    }
}
