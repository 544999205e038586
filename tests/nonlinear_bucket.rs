//! Solver buckets driving Picard and Newton iterations on a 1D nonlinear reaction problem.
//!
//! `-u'' + u³ = s` on (0, 1) with `u(0) = u(1) = 0`, discretized by finite differences on the
//! vertices of an [`IntervalLayout`]. The boundary DOFs are resolved from the layout and
//! constrained as Dirichlet rows.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use faer::Mat;
use serde_json::{Value, json};
use splitsolve::assembly::{Assembler, Form};
use splitsolve::bucket::SolverBucket;
use splitsolve::config::OptionTree;
use splitsolve::constraints::DirichletRows;
use splitsolve::diagnostics::{ConvergenceLog, DiagnosticsSink};
use splitsolve::dof::{FieldRequest, IntervalLayout, SubsetSpec, resolve};
use splitsolve::error::KError;
use splitsolve::nonlinear::Phase;
use splitsolve::parallel::SerialComm;

const NCELLS: usize = 16;
const N: usize = NCELLS + 1;

struct Reaction {
    source: f64,
    matrices: usize,
}

impl Reaction {
    fn new(source: f64) -> Self {
        Self { source, matrices: 0 }
    }

    fn laplacian(a: &mut Mat<f64>) {
        let h2 = 1.0 / (NCELLS * NCELLS) as f64;
        for i in 0..N {
            a[(i, i)] += 2.0 / h2;
            if i > 0 {
                a[(i, i - 1)] -= 1.0 / h2;
            }
            if i + 1 < N {
                a[(i, i + 1)] -= 1.0 / h2;
            }
        }
    }
}

impl Assembler for Reaction {
    fn assemble_matrix(&mut self, form: Form, u: &[f64], a: &mut Mat<f64>) -> Result<(), KError> {
        self.matrices += 1;
        Self::laplacian(a);
        let scale = match form {
            Form::Bilinear | Form::BilinearPc => 1.0,
            Form::Jacobian | Form::JacobianPc => 3.0,
            _ => return Err(KError::Unsupported("not a matrix form")),
        };
        for i in 0..N {
            a[(i, i)] += scale * u[i] * u[i];
        }
        Ok(())
    }

    fn assemble_vector(&mut self, form: Form, u: &[f64], b: &mut [f64]) -> Result<(), KError> {
        match form {
            Form::Linear => b.fill(self.source),
            Form::Residual => {
                let mut a = Mat::zeros(N, N);
                Self::laplacian(&mut a);
                for i in 0..N {
                    let lu: f64 = (0..N).map(|j| a[(i, j)] * u[j]).sum();
                    b[i] = lu + u[i].powi(3) - self.source;
                }
            }
            _ => return Err(KError::Unsupported("not a vector form")),
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedLog(Rc<RefCell<ConvergenceLog>>);

impl DiagnosticsSink for SharedLog {
    fn write_header(&mut self, columns: &[String]) -> Result<(), KError> {
        self.0.borrow_mut().write_header(columns)
    }

    fn write_row(&mut self, values: &[f64]) -> Result<(), KError> {
        self.0.borrow_mut().write_row(values)
    }
}

fn layout() -> IntervalLayout {
    IntervalLayout::new(NCELLS).with_field("u", 0)
}

fn gmres_ilu() -> Value {
    json!({"iterative_method": {"name": "gmres", "relative_error": 1e-12, "max_iterations": 100,
                                "monitors": {"convergence_file": null}},
           "preconditioner": {"name": "ilu"}})
}

fn picard(extra: Value) -> Value {
    let mut t = json!({"name": "Picard", "relative_error": 1e-10, "max_iterations": 50,
                       "monitors": {"residual": null, "convergence_file": null, "norms": null},
                       "form": [{"name": "Bilinear"}, {"name": "Linear"}, {"name": "Residual"}],
                       "linear_solver": gmres_ilu()});
    merge(&mut t, extra);
    t
}

fn snes(extra: Value) -> Value {
    let mut t = json!({"name": "SNES", "relative_error": 1e-10, "max_iterations": 30,
                       "snes_type": {"name": "ls", "ls_type": {"name": "cubic"}},
                       "form": [{"name": "Residual"}, {"name": "Jacobian"}],
                       "linear_solver": {"iterative_method": {"name": "preonly"},
                                         "preconditioner": {"name": "lu",
                                                            "factorization_package": {"name": "umfpack"}}}});
    merge(&mut t, extra);
    t
}

fn merge(target: &mut Value, extra: Value) {
    if let (Some(t), Value::Object(e)) = (target.as_object_mut(), extra) {
        t.extend(e);
    }
}

fn bucket(solver_type: Value) -> SolverBucket {
    let store = OptionTree::from_value(json!({"solver": {"name": "Solver", "type": solver_type}}));
    let layout = layout();
    let mut bucket = SolverBucket::fill(&store, "solver", "Reaction", &layout, &SerialComm).unwrap();
    let spec = SubsetSpec::new("ends", vec![FieldRequest::new("u").boundaries(vec![1, 2])]);
    let ends = resolve(&layout, &spec).unwrap();
    assert_eq!(ends.as_slice(), &[0, NCELLS]);
    bucket.add_constraint(Box::new(DirichletRows::from_subset("ends", &ends, 0, 0.0)));
    bucket
}

fn never_abort() -> impl FnMut() {
    || {}
}

fn max_residual(u: &[f64], source: f64) -> f64 {
    let mut f = vec![0.0; N];
    Reaction::new(source).assemble_vector(Form::Residual, u, &mut f).unwrap();
    f[1..N - 1].iter().fold(0.0, |m, v| m.max(v.abs()))
}

#[test]
fn picard_converges_and_records_every_iteration() {
    let mut b = bucket(picard(json!({})));
    let log = SharedLog::default();
    b.attach_convergence_sink(Box::new(log.clone())).unwrap();
    let ksp_log = SharedLog::default();
    b.attach_ksp_sink(Box::new(ksp_log.clone())).unwrap();

    let mut assembler = Reaction::new(10.0);
    let state = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert_eq!(state.phase, Phase::Converged);
    assert!(state.iteration > 1);
    assert!(state.relative_error <= 1e-10);

    let u = b.solution();
    assert_eq!(u[0], 0.0);
    assert_eq!(u[NCELLS], 0.0);
    assert!(max_residual(u, 10.0) < 1e-6);
    for i in 0..N {
        assert_abs_diff_eq!(u[i], u[NCELLS - i], epsilon = 1e-9);
    }

    let log = log.0.borrow();
    assert_eq!(
        log.columns,
        ["NonlinearIteration", "res_norm(l2)", "relative_error", "res_norm(l2)::u"]
    );
    assert_eq!(log.rows.len(), state.iteration + 1);
    assert_eq!(log.rows[0][0], 0.0);
    assert_eq!(log.rows[0][2], 1.0);
    // a single field carries the whole residual
    for row in &log.rows {
        assert_abs_diff_eq!(row[1], row[3], epsilon = 1e-12);
    }

    let solves = ksp_log.0.borrow().column("KSPSolve").unwrap();
    assert_eq!(solves.last().copied(), Some((state.iteration - 1) as f64));
}

#[test]
fn picard_and_newton_agree() {
    let mut p = bucket(picard(json!({})));
    let mut n = bucket(snes(json!({})));
    let mut assembler = Reaction::new(10.0);
    p.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    let state = n.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert_eq!(state.phase, Phase::Converged);
    assert!(state.iteration < 10);
    for (a, b) in p.solution().iter().zip(n.solution()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

#[test]
fn newton_restarts_from_the_last_solution() {
    let mut b = bucket(snes(json!({})));
    let mut assembler = Reaction::new(20.0);
    let first = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert!(first.iteration > 0);
    let second = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert!(second.iteration <= 1);
    assert!(second.initial_error < first.initial_error);
}

#[test]
fn zero_initial_residual_skips_iterations() {
    let mut b = bucket(picard(json!({})));
    let mut assembler = Reaction::new(0.0);
    let state = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert_eq!(state.iteration, 0);
    assert_eq!(state.relative_error, 0.0);
    assert_eq!(state.phase, Phase::Converged);
    assert_eq!(assembler.matrices, 0);
}

#[test]
fn minimum_iterations_are_honoured() {
    let mut b = bucket(picard(json!({"min_iterations": 3})));
    let mut assembler = Reaction::new(0.0);
    let state = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert_eq!(state.iteration, 3);
    assert_eq!(state.phase, Phase::Converged);
}

#[test]
fn picard_failure_escalates_and_keeps_last_solution() {
    let mut b = bucket(picard(json!({"max_iterations": 1, "relative_error": 1e-14})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let err = b.solve(&mut Reaction::new(40.0), &SerialComm, &mut abort).unwrap_err();
    assert!(matches!(err, KError::Diverged { ref solver, .. } if solver == "Solver"));
    assert_eq!(aborted, 1);
    assert!(b.solution().iter().all(|&u| u == 0.0));
}

#[test]
fn ignored_failure_keeps_the_unconverged_iterate() {
    let mut b = bucket(picard(json!({"max_iterations": 1, "relative_error": 1e-14,
                                     "ignore_all_solver_failures": null})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let state = b.solve(&mut Reaction::new(40.0), &SerialComm, &mut abort).unwrap();
    assert_eq!(state.phase, Phase::Converged);
    assert!(state.failure_ignored);
    assert_eq!(state.iteration, 1);
    assert_eq!(aborted, 0);
    assert!(b.solution()[NCELLS / 2] > 0.0);
}

#[test]
fn newton_failure_escalates() {
    let mut b = bucket(snes(json!({"max_iterations": 1, "relative_error": 1e-14})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let err = b.solve(&mut Reaction::new(40.0), &SerialComm, &mut abort).unwrap_err();
    assert!(matches!(err, KError::Diverged { .. }));
    assert_eq!(aborted, 1);
}

/// Assembles every operator as zero, so only the Dirichlet rows survive and LU breaks down.
struct ZeroOperators(Reaction);

impl Assembler for ZeroOperators {
    fn assemble_matrix(&mut self, _form: Form, _u: &[f64], _a: &mut Mat<f64>) -> Result<(), KError> {
        Ok(())
    }

    fn assemble_vector(&mut self, form: Form, u: &[f64], b: &mut [f64]) -> Result<(), KError> {
        self.0.assemble_vector(form, u, b)
    }
}

#[test]
fn singular_newton_step_follows_the_failure_policy() {
    let mut b = bucket(snes(json!({})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let err = b.solve(&mut ZeroOperators(Reaction::new(10.0)), &SerialComm, &mut abort).unwrap_err();
    assert!(matches!(err, KError::Diverged { ref reason, .. } if reason == "DivergedLinearSolve"));
    assert_eq!(aborted, 1);

    let mut b = bucket(snes(json!({"ignore_all_solver_failures": null})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let state = b.solve(&mut ZeroOperators(Reaction::new(10.0)), &SerialComm, &mut abort).unwrap();
    assert!(state.failure_ignored);
    assert_eq!(state.phase, Phase::Converged);
    assert_eq!(aborted, 0);
}

#[test]
fn singular_picard_step_follows_the_failure_policy() {
    let direct = json!({"iterative_method": {"name": "preonly"},
                        "preconditioner": {"name": "lu", "factorization_package": {"name": "mumps"}}});
    let mut b = bucket(picard(json!({"linear_solver": direct.clone()})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let err = b.solve(&mut ZeroOperators(Reaction::new(10.0)), &SerialComm, &mut abort).unwrap_err();
    assert!(matches!(err, KError::Diverged { .. }));
    assert_eq!(aborted, 1);

    let mut b = bucket(picard(json!({"linear_solver": direct, "ignore_all_solver_failures": null})));
    let mut aborted = 0;
    let mut abort = || aborted += 1;
    let state = b.solve(&mut ZeroOperators(Reaction::new(10.0)), &SerialComm, &mut abort).unwrap();
    assert!(state.failure_ignored);
    assert_eq!(state.iteration, 1);
    assert_eq!(aborted, 0);
    assert!(b.solution().iter().all(|&u| u == 0.0));
}

#[test]
fn jacobian_preconditioner_form_is_optional() {
    let mut with_pc = snes(json!({}));
    with_pc["form"] = json!([{"name": "Residual"}, {"name": "Jacobian"}, {"name": "JacobianPC"}]);
    with_pc["linear_solver"] = gmres_ilu();
    let mut b = bucket(with_pc);
    assert!(b.has_form(Form::JacobianPc));
    let mut assembler = Reaction::new(10.0);
    let state = b.solve(&mut assembler, &SerialComm, &mut never_abort()).unwrap();
    assert_eq!(state.phase, Phase::Converged);
    assert!(state.linear_iterations > 0);
    // Jacobian and its preconditioner are assembled on every Newton step
    assert_eq!(assembler.matrices % 2, 0);
}
