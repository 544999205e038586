//! One nonlinear solver of a system, filled from the option tree.
//!
//! A [`SolverBucket`] owns everything a solve needs: the parsed [`NonlinearSolverConfig`], the
//! compiled [`SolverNode`] and its runtime [`KspContext`], the forms it assembles, the
//! constraints of its system, and the last converged iterate. [`SolverBucket::solve`] runs the
//! Picard loop or the delegated Newton path depending on the configured solver type.
//!
//! # Example
//! ```rust
//! use splitsolve::bucket::SolverBucket;
//! use splitsolve::config::OptionTree;
//! use splitsolve::dof::IntervalLayout;
//! use splitsolve::parallel::SerialComm;
//!
//! let options = OptionTree::from_json_str(r#"{"solver": {"name": "Solver", "type": {
//!     "name": "Picard", "relative_error": 1e-8, "max_iterations": 10,
//!     "form": [{"name": "Bilinear"}, {"name": "Linear"}, {"name": "Residual"}],
//!     "linear_solver": {"iterative_method": {"name": "preonly"},
//!                       "preconditioner": {"name": "lu", "factorization_package": {"name": "petsc"}}}}}}"#,
//! ).unwrap();
//! let layout = IntervalLayout::new(4).with_field("u", 0);
//! let bucket = SolverBucket::fill(&options, "solver", "Poisson", &layout, &SerialComm).unwrap();
//! assert_eq!(bucket.prefix(), "Poisson_Solver_");
//! ```

use faer::Mat;
use rustc_hash::FxHashMap;

use crate::assembly::{Assembler, Form};
use crate::config::{NonlinearKind, OptionStore, SnesMonitors, join, nth};
use crate::constraints::{Constraint, ident_zeros};
use crate::context::{KspContext, SolverCompiler, SolverNode};
use crate::diagnostics::DiagnosticsSink;
use crate::dof::{DofLayout, FieldRequest, SubsetSpec, resolve};
use crate::error::KError;
use crate::nonlinear::{
    AbortHandler, DelegatedNewton, FixedPointSystem, IterationState, NonlinearProblem,
    NonlinearSolverConfig, Picard,
};
use crate::parallel::Comm;

/// Per-form options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormOptions {
    /// Put a unit diagonal on identically zero rows of the assembled operator.
    pub ident_zeros: bool,
}

/// Owned rows of one field, for per-field residual norms.
#[derive(Debug, Clone, PartialEq)]
struct FieldRows {
    name: String,
    rows: Vec<usize>,
}

/// Writes the nonlinear convergence records.
struct ConvergenceRecorder {
    monitors: SnesMonitors,
    fields: Vec<FieldRows>,
    sink: Option<Box<dyn DiagnosticsSink>>,
}

impl ConvergenceRecorder {
    fn per_field(&self) -> bool {
        self.monitors.contains(SnesMonitors::NORMS) && !self.fields.is_empty()
    }

    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> =
            ["NonlinearIteration", "res_norm(l2)", "relative_error"].map(String::from).into();
        if self.per_field() {
            columns.extend(self.fields.iter().map(|f| format!("res_norm(l2)::{}", f.name)));
        }
        columns
    }

    fn record(
        &mut self,
        prefix: &str,
        comm: &dyn Comm,
        state: &IterationState,
        f: &[f64],
    ) -> Result<(), KError> {
        if self.monitors.contains(SnesMonitors::RESIDUAL) {
            log::info!("{prefix}{:3} SNES Function norm {:e}", state.iteration, state.absolute_error);
        }
        if !self.monitors.contains(SnesMonitors::CONVERGENCE_FILE) {
            return Ok(());
        }
        let per_field = self.per_field();
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let mut row = vec![state.iteration as f64, state.absolute_error, state.relative_error];
        if per_field {
            for field in &self.fields {
                let local: f64 = field.rows.iter().map(|&r| f[r] * f[r]).sum();
                row.push(comm.all_reduce(local).sqrt());
            }
        }
        sink.write_row(&row)
    }
}

/// A nonlinear solver together with its compiled linear solver tree.
pub struct SolverBucket {
    config: NonlinearSolverConfig,
    prefix: String,
    node: SolverNode,
    ksp: KspContext,
    forms: FxHashMap<Form, FormOptions>,
    constraints: Vec<Box<dyn Constraint>>,
    recorder: ConvergenceRecorder,
    iterate: Vec<f64>,
}

impl SolverBucket {
    /// Fill the solver at `path` of system `system`.
    pub fn fill(
        store: &dyn OptionStore,
        path: &str,
        system: &str,
        layout: &dyn DofLayout,
        comm: &dyn Comm,
    ) -> Result<Self, KError> {
        let config = NonlinearSolverConfig::from_options(store, path)?;
        let tpath = join(path, "type");
        let forms = Self::read_forms(store, &tpath, config.kind)?;

        let prefix = format!("{system}_{}_", config.name);
        let node = SolverCompiler::new(store, layout, comm).compile(
            &join(&tpath, "linear_solver"),
            &prefix,
            None,
        )?;
        let ksp = KspContext::from_node(&node)?;

        let owned = layout.ownership_range();
        let mut fields = Vec::with_capacity(layout.num_fields());
        for f in 0..layout.num_fields() {
            let name = layout.field_name(f).to_string();
            let spec = SubsetSpec::new(&name, vec![FieldRequest::new(&name)]);
            let rows = resolve(layout, &spec)?.iter().map(|d| d - owned.start).collect();
            fields.push(FieldRows { name, rows });
        }

        log::debug!(
            "{prefix}: filled {:?} solver with forms {:?}",
            config.kind,
            forms.keys().map(Form::name).collect::<Vec<_>>()
        );

        Ok(Self {
            recorder: ConvergenceRecorder { monitors: config.monitors, fields, sink: None },
            config,
            prefix,
            node,
            ksp,
            forms,
            constraints: Vec::new(),
            iterate: vec![0.0; owned.len()],
        })
    }

    fn read_forms(
        store: &dyn OptionStore,
        tpath: &str,
        kind: NonlinearKind,
    ) -> Result<FxHashMap<Form, FormOptions>, KError> {
        let mut forms = FxHashMap::default();
        for i in 0..store.option_count(&join(tpath, "form")) {
            let fpath = nth(tpath, "form", i);
            let name_path = join(&fpath, "name");
            let form = Form::from_name(&name_path, &store.get_string(&name_path)?)?;
            let options = FormOptions { ident_zeros: store.have_option(&join(&fpath, "ident_zeros")) };
            if forms.insert(form, options).is_some() {
                return Err(KError::invalid(name_path, format!("duplicate form {form}")));
            }
        }
        let required: &[Form] = match kind {
            NonlinearKind::FixedPoint => &[Form::Bilinear, Form::Linear, Form::Residual],
            NonlinearKind::DelegatedNewton => &[Form::Residual, Form::Jacobian],
        };
        for form in required {
            if !forms.contains_key(form) {
                return Err(KError::missing(format!("{tpath}/form::{form}")));
            }
        }
        Ok(forms)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn config(&self) -> &NonlinearSolverConfig {
        &self.config
    }

    pub fn node(&self) -> &SolverNode {
        &self.node
    }

    pub fn has_form(&self, form: Form) -> bool {
        self.forms.contains_key(&form)
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    /// Last converged iterate.
    pub fn solution(&self) -> &[f64] {
        &self.iterate
    }

    pub fn set_solution(&mut self, x: &[f64]) -> Result<(), KError> {
        if x.len() != self.iterate.len() {
            return Err(KError::DimensionMismatch(format!(
                "{}solution has {} entries, system owns {}",
                self.prefix,
                x.len(),
                self.iterate.len()
            )));
        }
        self.iterate.copy_from_slice(x);
        Ok(())
    }

    /// Attach the nonlinear convergence sink and write its header.
    pub fn attach_convergence_sink(&mut self, mut sink: Box<dyn DiagnosticsSink>) -> Result<(), KError> {
        sink.write_header(&self.recorder.columns())?;
        self.recorder.sink = Some(sink);
        Ok(())
    }

    /// Attach a sink for the linear residual history of every linear solve.
    pub fn attach_ksp_sink(&mut self, sink: Box<dyn DiagnosticsSink>) -> Result<(), KError> {
        self.ksp.attach_sink(sink)
    }

    /// Solve from the last converged iterate.
    pub fn solve(
        &mut self,
        assembler: &mut dyn Assembler,
        comm: &dyn Comm,
        abort: &mut dyn AbortHandler,
    ) -> Result<IterationState, KError> {
        let n = self.iterate.len();
        let forms = SystemForms {
            assembler,
            constraints: &self.constraints,
            forms: &self.forms,
            n,
        };
        let recorder = &mut self.recorder;
        let prefix = self.prefix.as_str();
        let mut observer = |state: &IterationState, f: &[f64]| -> Result<(), KError> {
            recorder.record(prefix, comm, state, f)
        };

        match self.config.kind {
            NonlinearKind::FixedPoint => {
                let mut system =
                    PicardSystem { forms, ksp: &mut self.ksp, comm, rhs: vec![0.0; n] };
                Picard::new(&self.config).solve(&mut system, &mut self.iterate, comm, &mut observer, abort)
            }
            NonlinearKind::DelegatedNewton => {
                let mut problem = forms;
                DelegatedNewton::new(&self.config).solve(
                    &mut problem,
                    &mut self.ksp,
                    &mut self.iterate,
                    comm,
                    &mut observer,
                    abort,
                )
            }
        }
    }
}

/// Assembly of the bucket's forms with its constraints applied.
struct SystemForms<'b> {
    assembler: &'b mut dyn Assembler,
    constraints: &'b [Box<dyn Constraint>],
    forms: &'b FxHashMap<Form, FormOptions>,
    n: usize,
}

impl SystemForms<'_> {
    /// Assemble `form` into a fresh operator with the constraints applied to it alone.
    fn operator(&mut self, form: Form, x: &[f64]) -> Result<Option<Mat<f64>>, KError> {
        let Some(options) = self.forms.get(&form).copied() else {
            return Ok(None);
        };
        let mut a = Mat::zeros(self.n, self.n);
        self.assembler.assemble_matrix(form, x, &mut a)?;
        for c in self.constraints {
            c.apply_operator(&mut a)?;
        }
        if options.ident_zeros {
            ident_zeros(&mut a);
        }
        Ok(Some(a))
    }

    fn required_operator(&mut self, form: Form, x: &[f64]) -> Result<Mat<f64>, KError> {
        self.operator(form, x)?
            .ok_or_else(|| KError::missing(format!("form::{form}")))
    }
}

impl NonlinearProblem for SystemForms<'_> {
    fn constrain_iterate(&mut self, x: &mut [f64]) -> Result<(), KError> {
        for c in self.constraints {
            c.apply_iterate(x)?;
        }
        Ok(())
    }

    fn residual(&mut self, x: &[f64], f: &mut [f64]) -> Result<(), KError> {
        f.fill(0.0);
        self.assembler.assemble_vector(Form::Residual, x, f)?;
        for c in self.constraints {
            c.apply_residual(f, x)?;
        }
        Ok(())
    }

    fn jacobian(&mut self, x: &[f64]) -> Result<(Mat<f64>, Option<Mat<f64>>), KError> {
        let j = self.required_operator(Form::Jacobian, x)?;
        let p = self.operator(Form::JacobianPc, x)?;
        Ok((j, p))
    }
}

/// The Picard callbacks: the linearized system is solved with the bucket's linear solver.
struct PicardSystem<'b> {
    forms: SystemForms<'b>,
    ksp: &'b mut KspContext,
    comm: &'b dyn Comm,
    rhs: Vec<f64>,
}

impl FixedPointSystem for PicardSystem<'_> {
    fn assemble(&mut self, x: &[f64]) -> Result<(), KError> {
        let forms = &mut self.forms;
        let options = forms.forms.get(&Form::Bilinear).copied().unwrap_or_default();
        let mut a = Mat::zeros(forms.n, forms.n);
        forms.assembler.assemble_matrix(Form::Bilinear, x, &mut a)?;
        self.rhs.fill(0.0);
        forms.assembler.assemble_vector(Form::Linear, x, &mut self.rhs)?;
        for c in forms.constraints {
            c.apply_system(Some(&mut a), &mut self.rhs)?;
        }
        if options.ident_zeros {
            ident_zeros(&mut a);
        }
        let p = forms.operator(Form::BilinearPc, x)?;
        self.ksp.set_operators(a, p.as_ref())
    }

    fn linear_solve(&mut self, x: &mut [f64]) -> Result<usize, KError> {
        let stats = self.ksp.solve_with_comm(&self.rhs, x, self.comm)?;
        if !stats.converged {
            log::warn!("{}linear solve did not converge ({:?})", self.ksp.prefix(), stats.reason);
        }
        Ok(stats.iterations)
    }

    fn residual(&mut self, x: &[f64], f: &mut [f64]) -> Result<(), KError> {
        self.forms.residual(x, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionTree;
    use crate::dof::IntervalLayout;
    use crate::parallel::SerialComm;

    fn tree(kind: &str, forms: &str) -> OptionTree {
        OptionTree::from_json_str(&format!(
            r#"{{"s": {{"name": "Solver", "type": {{"name": "{kind}", "relative_error": 1e-8,
                "max_iterations": 5, "form": {forms},
                "linear_solver": {{"iterative_method": {{"name": "preonly"}},
                    "preconditioner": {{"name": "lu", "factorization_package": {{"name": "umfpack"}}}}}}}}}}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn required_forms_are_checked() {
        let layout = IntervalLayout::new(3).with_field("u", 0);
        let err = SolverBucket::fill(
            &tree("Picard", r#"[{"name": "Bilinear"}, {"name": "Residual"}]"#),
            "s",
            "Sys",
            &layout,
            &SerialComm,
        )
        .err()
        .unwrap();
        assert!(matches!(err, KError::MissingOption { ref path } if path.ends_with("form::Linear")));

        let ok = SolverBucket::fill(
            &tree("SNES", r#"[{"name": "Residual"}, {"name": "Jacobian", "ident_zeros": null}]"#),
            "s",
            "Sys",
            &layout,
            &SerialComm,
        )
        .unwrap();
        assert!(ok.has_form(Form::Jacobian));
        assert!(!ok.has_form(Form::JacobianPc));
        assert_eq!(ok.solution().len(), 4);
    }

    #[test]
    fn duplicate_form_is_invalid() {
        let layout = IntervalLayout::new(3).with_field("u", 0);
        let err = SolverBucket::fill(
            &tree("SNES", r#"[{"name": "Residual"}, {"name": "Jacobian"}, {"name": "Residual"}]"#),
            "s",
            "Sys",
            &layout,
            &SerialComm,
        )
        .err()
        .unwrap();
        assert!(matches!(err, KError::InvalidOption { .. }));
    }

    #[test]
    fn convergence_columns_include_fields_with_norms_monitor() {
        let recorder = ConvergenceRecorder {
            monitors: SnesMonitors::CONVERGENCE_FILE | SnesMonitors::NORMS,
            fields: vec![FieldRows { name: "u".into(), rows: vec![0, 1] }],
            sink: None,
        };
        assert_eq!(
            recorder.columns(),
            vec!["NonlinearIteration", "res_norm(l2)", "relative_error", "res_norm(l2)::u"]
        );
    }
}
