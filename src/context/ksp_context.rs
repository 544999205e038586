//! Runtime realization of a compiled [`SolverNode`].
//!
//! A `KspContext` owns the preconditioner tree built from the node, the operator it solves with
//! and the node's null space. Monitors only observe: they log residual norms, record the residual
//! history (and forward it to an attached [`DiagnosticsSink`]) and run the null-space self test,
//! but never change a stopping decision.
//!
//! # Usage
//!
//! 1. [`KspContext::from_node`] with a compiled node.
//! 2. [`KspContext::set_operators`] with the operator and, optionally, a separate
//!    preconditioning operator.
//! 3. [`KspContext::solve`] as often as needed.

use faer::Mat;

use crate::config::{IterativeMethod, KspMonitors, SimplePc};
use crate::context::pc_context::{PreconditionerNode, SolverNode, Tolerances};
use crate::core::wrappers::residual;
use crate::diagnostics::DiagnosticsSink;
use crate::error::KError;
use crate::nullspace::NullSpace;
use crate::parallel::{Comm, SerialComm};
use crate::preconditioner::{
    FieldSplitPc, Identity, Ilu0, Jacobi, Lu, NestedKsp, Preconditioner, Sor,
};
use crate::solver::{
    BiCgStabSolver, CgSolver, GmresSolver, LinearSolver, RichardsonSolver,
};
use crate::utils::convergence::{KspReason, SolveStats};

/// Build the preconditioner tree of a node.
pub fn build_preconditioner(node: &PreconditionerNode) -> Result<Box<dyn Preconditioner>, KError> {
    Ok(match node {
        PreconditionerNode::Simple(SimplePc::None) => Box::new(Identity),
        PreconditionerNode::Simple(SimplePc::Jacobi) => Box::new(Jacobi::new()),
        PreconditionerNode::Simple(SimplePc::Sor) => Box::new(Sor::symmetric()),
        PreconditionerNode::Simple(SimplePc::Ilu) => Box::new(Ilu0::new()),
        PreconditionerNode::NestedSolver(inner) => {
            Box::new(NestedKsp::new(KspContext::from_node(inner)?))
        }
        PreconditionerNode::FieldSplit(fs) => Box::new(FieldSplitPc::new(fs)?),
        PreconditionerNode::Direct(package) => Box::new(Lu::new(*package)),
    })
}

/// Context of one linear solver of the tree.
pub struct KspContext {
    prefix: String,
    method: IterativeMethod,
    tolerances: Option<Tolerances>,
    monitors: KspMonitors,
    null_space: Option<NullSpace>,
    pc: Box<dyn Preconditioner>,
    a: Option<Mat<f64>>,
    sink: Option<Box<dyn DiagnosticsSink>>,
    solves: usize,
}

impl KspContext {
    pub fn from_node(node: &SolverNode) -> Result<Self, KError> {
        if node.method != IterativeMethod::PreOnly && node.tolerances.is_none() {
            return Err(KError::invalid(
                node.prefix.as_str(),
                format!("{} needs tolerances", node.method.name()),
            ));
        }
        Ok(Self {
            prefix: node.prefix.clone(),
            method: node.method,
            tolerances: node.tolerances,
            monitors: node.monitors,
            null_space: node.null_space.clone(),
            pc: build_preconditioner(&node.preconditioner)?,
            a: None,
            sink: None,
            solves: 0,
        })
    }

    /// Receive the residual history of every solve when the convergence file monitor is on.
    pub fn attach_sink(&mut self, mut sink: Box<dyn DiagnosticsSink>) -> Result<(), KError> {
        sink.write_header(&["KSPSolve".into(), "KSPIteration".into(), "res_norm(l2)".into()])?;
        self.sink = Some(sink);
        Ok(())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn operator(&self) -> Option<&Mat<f64>> {
        self.a.as_ref()
    }

    /// Set the operator `a` and set up the preconditioner with `p` (or `a` when `None`).
    pub fn set_operators(&mut self, a: Mat<f64>, p: Option<&Mat<f64>>) -> Result<(), KError> {
        if a.nrows() != a.ncols() {
            return Err(KError::DimensionMismatch(format!(
                "{}operator is {}x{}",
                self.prefix,
                a.nrows(),
                a.ncols()
            )));
        }
        if let Some(p) = p {
            if p.nrows() != a.nrows() || p.ncols() != a.ncols() {
                return Err(KError::DimensionMismatch(format!(
                    "{}preconditioning operator is {}x{}, operator is {}x{}",
                    self.prefix,
                    p.nrows(),
                    p.ncols(),
                    a.nrows(),
                    a.ncols()
                )));
            }
        }
        if let Some(ns) = &self.null_space {
            if ns.vectors().iter().any(|v| v.len() != a.nrows()) {
                return Err(KError::DimensionMismatch(format!(
                    "{}null space does not match operator of size {}",
                    self.prefix,
                    a.nrows()
                )));
            }
            if self.monitors.contains(KspMonitors::TEST_NULL_SPACE) && ns.test(&a) {
                log::info!("{}null space test passed", self.prefix);
            }
        }
        self.pc.setup(p.unwrap_or(&a))?;
        self.a = Some(a);
        Ok(())
    }

    /// Solve `A x = b` starting from `x` on a single process.
    pub fn solve(&mut self, b: &[f64], x: &mut [f64]) -> Result<SolveStats, KError> {
        self.solve_with_comm(b, x, &SerialComm)
    }

    /// Solve `A x = b` starting from `x`. Null-space projections and the residual norms this
    /// context computes are reduced over `comm`; the Krylov kernels work on the owned rows.
    pub fn solve_with_comm(
        &mut self,
        b: &[f64],
        x: &mut [f64],
        comm: &dyn Comm,
    ) -> Result<SolveStats, KError> {
        let a = self
            .a
            .as_ref()
            .ok_or_else(|| KError::SolveError(format!("{}solve before set_operators", self.prefix)))?;
        let mut rhs = b.to_vec();
        if let Some(ns) = &self.null_space {
            ns.remove(&mut rhs, comm);
        }

        let prefix = &self.prefix;
        let monitors = self.monitors;
        let mut history = Vec::new();
        let mut monitor = |it: usize, rnorm: f64| {
            if monitors.contains(KspMonitors::PRECONDITIONED_RESIDUAL) {
                log::info!("{prefix}{it:3} KSP Residual norm {rnorm:e}");
            }
            if monitors.contains(KspMonitors::CONVERGENCE_FILE) {
                history.push(rnorm);
            }
        };

        let mut stats = if self.method == IterativeMethod::PreOnly {
            self.pc.apply(&rhs, x)?;
            SolveStats::new(KspReason::ConvergedIts, 1, comm.norm(&residual(a, x, &rhs)))
        } else {
            let tol = self.tolerances.ok_or_else(|| {
                KError::invalid(self.prefix.as_str(), format!("{} needs tolerances", self.method.name()))
            })?;
            let conv = tol.convergence();
            let mut solver: Box<dyn LinearSolver> = match self.method {
                IterativeMethod::Cg => Box::new(CgSolver::new(conv)),
                IterativeMethod::Gmres | IterativeMethod::Fgmres => {
                    Box::new(GmresSolver::new(conv, tol.restart))
                }
                IterativeMethod::BiCgStab => Box::new(BiCgStabSolver::new(conv)),
                IterativeMethod::Richardson | IterativeMethod::PreOnly => {
                    Box::new(RichardsonSolver::new(conv))
                }
            };
            solver.solve(a, self.pc.as_mut(), &rhs, x, &mut monitor)?
        };

        if let Some(ns) = &self.null_space {
            ns.remove(x, comm);
        }
        if self.monitors.contains(KspMonitors::TRUE_RESIDUAL) {
            let true_norm = comm.norm(&residual(a, x, b));
            log::info!("{}KSP true residual norm {true_norm:e} ({:?})", self.prefix, stats.reason);
        }
        if let Some(sink) = self.sink.as_mut() {
            for (it, rnorm) in history.iter().enumerate() {
                sink.write_row(&[self.solves as f64, it as f64, *rnorm])?;
            }
        }
        self.solves += 1;
        stats.history = history;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactorizationPackage;
    use approx::assert_abs_diff_eq;

    fn laplacian(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        })
    }

    #[test]
    fn preonly_lu_is_exact() {
        let node = SolverNode::direct("d_", FactorizationPackage::Petsc);
        let mut ksp = KspContext::from_node(&node).unwrap();
        ksp.set_operators(laplacian(4), None).unwrap();
        let mut x = vec![0.0; 4];
        let stats = ksp.solve(&[1.0, 0.0, 0.0, 1.0], &mut x).unwrap();
        assert_eq!(stats.reason, KspReason::ConvergedIts);
        for xi in x {
            assert_abs_diff_eq!(xi, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn convergence_file_monitor_records_history() {
        let node = SolverNode::iterative("c_", IterativeMethod::Cg, Tolerances::new(1e-10, 50))
            .with_monitors(KspMonitors::CONVERGENCE_FILE)
            .with_preconditioner(PreconditionerNode::Simple(SimplePc::Jacobi));
        let mut ksp = KspContext::from_node(&node).unwrap();
        ksp.set_operators(laplacian(6), None).unwrap();
        let mut x = vec![0.0; 6];
        let stats = ksp.solve(&[1.0; 6], &mut x).unwrap();
        assert!(stats.converged);
        assert_eq!(stats.history.len(), stats.iterations + 1);
    }

    #[test]
    fn history_is_forwarded_to_sink() {
        use crate::diagnostics::ConvergenceLog;
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Clone, Default)]
        struct Shared(Rc<RefCell<ConvergenceLog>>);
        impl DiagnosticsSink for Shared {
            fn write_header(&mut self, columns: &[String]) -> Result<(), KError> {
                self.0.borrow_mut().write_header(columns)
            }
            fn write_row(&mut self, values: &[f64]) -> Result<(), KError> {
                self.0.borrow_mut().write_row(values)
            }
        }

        let node = SolverNode::iterative("c_", IterativeMethod::Cg, Tolerances::new(1e-10, 50))
            .with_monitors(KspMonitors::CONVERGENCE_FILE);
        let mut ksp = KspContext::from_node(&node).unwrap();
        let log = Shared::default();
        ksp.attach_sink(Box::new(log.clone())).unwrap();
        ksp.set_operators(laplacian(5), None).unwrap();
        let mut x = vec![0.0; 5];
        let first = ksp.solve(&[1.0; 5], &mut x).unwrap();
        let mut x = vec![0.0; 5];
        let second = ksp.solve(&[2.0; 5], &mut x).unwrap();
        let rows = log.0.borrow().rows.len();
        assert_eq!(rows, first.history.len() + second.history.len());
        assert_eq!(log.0.borrow().column("KSPSolve").unwrap().last(), Some(&1.0));
    }

    /// Serial reductions that count how often they are called.
    #[derive(Default)]
    struct CountingComm(std::cell::Cell<usize>);

    impl Comm for CountingComm {
        fn rank(&self) -> usize {
            0
        }
        fn size(&self) -> usize {
            1
        }
        fn barrier(&self) {}
        fn all_reduce(&self, x: f64) -> f64 {
            self.0.set(self.0.get() + 1);
            x
        }
        fn exclusive_sum(&self, _x: usize) -> usize {
            0
        }
    }

    #[test]
    fn null_space_projections_reduce_over_the_given_comm() {
        let all = crate::dof::DofSubset::full(0..3);
        let set = crate::dof::compose("c", &all, None, None, 0, &SerialComm).unwrap();
        let ns = NullSpace::build(&[set], 3).unwrap();
        let mut node = SolverNode::direct("d_", FactorizationPackage::Petsc);
        node.null_space = ns;
        let mut ksp = KspContext::from_node(&node).unwrap();
        ksp.set_operators(laplacian(3), None).unwrap();
        let comm = CountingComm::default();
        let mut x = vec![0.0; 3];
        ksp.solve_with_comm(&[1.0, 2.0, 3.0], &mut x, &comm).unwrap();
        // rhs and solution projections plus the preonly residual norm
        assert_eq!(comm.0.get(), 3);
    }

    #[test]
    fn solve_before_operators_is_an_error() {
        let node = SolverNode::direct("d_", FactorizationPackage::Petsc);
        let mut ksp = KspContext::from_node(&node).unwrap();
        let mut x = vec![0.0; 2];
        assert!(matches!(ksp.solve(&[1.0, 1.0], &mut x), Err(KError::SolveError(_))));
    }
}
