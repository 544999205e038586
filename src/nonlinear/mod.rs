//! Nonlinear Iteration Controller.
//!
//! Two strategies drive a nonlinear solve:
//! - [`picard`]: a fixed-point loop that reassembles the linearized operator at every iterate and
//!   hands it to the compiled linear solver.
//! - [`newton`]: Newton iteration delegated to a [`newton::NewtonBackend`], which calls back for
//!   residuals and Jacobians.
//!
//! Both report progress through an [`IterationState`] owned by the solve call and through an
//! [`IterationObserver`]. Failure to converge goes through the [`FailurePolicy`]: either a
//! warning, or a logged error followed by the [`AbortHandler`] and a [`KError::Diverged`].

use serde::{Deserialize, Serialize};

use crate::config::{LineSearch, NonlinearKind, OptionStore, SnesMonitors, join};
use crate::error::KError;

pub mod newton;
pub mod picard;

pub use newton::{DelegatedNewton, LineSearchNewton, NewtonBackend, NonlinearProblem};
pub use picard::{FixedPointSystem, Picard};

/// Called once per nonlinear iteration (iteration 0 included) with the state and the residual.
pub type IterationObserver<'a> = &'a mut dyn FnMut(&IterationState, &[f64]) -> Result<(), KError>;

/// Line-search Newton settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub line_search: LineSearch,
    /// Sufficient decrease parameter.
    pub alpha: f64,
    /// Largest accepted update norm.
    pub max_step: f64,
    /// Smallest step length before the line search gives up.
    pub min_lambda: f64,
    /// Step tolerance relative to the iterate norm.
    pub stol: f64,
    pub max_function_evaluations: usize,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            line_search: LineSearch::Cubic,
            alpha: 1e-4,
            max_step: 1e8,
            min_lambda: 1e-12,
            stol: 1e-8,
            max_function_evaluations: 10000,
        }
    }
}

/// Nonlinear solver options of one solver of a system.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearSolverConfig {
    pub name: String,
    pub kind: NonlinearKind,
    pub rtol: f64,
    pub atol: f64,
    pub max_iterations: usize,
    /// Picard only.
    pub min_iterations: usize,
    pub ignore_failures: bool,
    pub monitors: SnesMonitors,
    /// Newton only.
    pub newton: NewtonSettings,
}

impl NonlinearSolverConfig {
    pub const DEFAULT_ATOL: f64 = 1e-50;

    /// Read the solver at `path` (the subtree holding `name` and `type`).
    pub fn from_options(store: &dyn OptionStore, path: &str) -> Result<Self, KError> {
        let name = store.get_string(&join(path, "name"))?;
        let tpath = join(path, "type");
        let kind_path = join(&tpath, "name");
        let kind = NonlinearKind::from_name(&kind_path, &store.get_string(&kind_path)?)?;

        let mut monitors = SnesMonitors::empty();
        for (option, flag) in [
            ("residual", SnesMonitors::RESIDUAL),
            ("convergence_file", SnesMonitors::CONVERGENCE_FILE),
            ("norms", SnesMonitors::NORMS),
        ] {
            if store.have_option(&join(&tpath, &format!("monitors/{option}"))) {
                monitors |= flag;
            }
        }

        let (min_iterations, newton) = match kind {
            NonlinearKind::FixedPoint => (
                store.get_usize_or(&join(&tpath, "min_iterations"), 0)?,
                NewtonSettings::default(),
            ),
            NonlinearKind::DelegatedNewton => (0, Self::newton_settings(store, &tpath)?),
        };

        Ok(Self {
            name,
            kind,
            rtol: store.get_f64(&join(&tpath, "relative_error"))?,
            atol: store.get_f64_or(&join(&tpath, "absolute_error"), Self::DEFAULT_ATOL)?,
            max_iterations: store.get_usize(&join(&tpath, "max_iterations"))?,
            min_iterations,
            ignore_failures: store.have_option(&join(&tpath, "ignore_all_solver_failures")),
            monitors,
            newton,
        })
    }

    fn newton_settings(store: &dyn OptionStore, tpath: &str) -> Result<NewtonSettings, KError> {
        let defaults = NewtonSettings::default();
        let spath = join(tpath, "snes_type");
        let snes_name_path = join(&spath, "name");
        if store.have_option(&snes_name_path) {
            let snes_type = store.get_string(&snes_name_path)?;
            if snes_type != "ls" {
                return Err(KError::UnknownValue {
                    what: "snes type",
                    value: snes_type,
                    path: snes_name_path,
                });
            }
        }
        let ls_path = join(&spath, "ls_type/name");
        let line_search = if store.have_option(&ls_path) {
            LineSearch::from_name(&ls_path, &store.get_string(&ls_path)?)?
        } else {
            defaults.line_search
        };
        Ok(NewtonSettings {
            line_search,
            alpha: store.get_f64_or(&join(&spath, "alpha"), defaults.alpha)?,
            max_step: store.get_f64_or(&join(&spath, "max_step"), defaults.max_step)?,
            min_lambda: store.get_f64_or(&join(&spath, "min_lambda"), defaults.min_lambda)?,
            stol: store.get_f64_or(&join(tpath, "solution_error"), defaults.stol)?,
            max_function_evaluations: store
                .get_usize_or(&join(tpath, "max_function_evaluations"), defaults.max_function_evaluations)?,
        })
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy { ignore: self.ignore_failures }
    }
}

/// Where a nonlinear solve currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Assembling,
    LinearSolve,
    ResidualCheck,
    Converged,
    Continuing,
    Failed,
}

/// Progress of one nonlinear solve. Created fresh by every solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    pub phase: Phase,
    pub iteration: usize,
    pub absolute_error: f64,
    pub relative_error: f64,
    pub initial_error: f64,
    /// Linear iterations summed over the whole solve.
    pub linear_iterations: usize,
    /// The solve failed and the failure policy let it through as converged.
    pub failure_ignored: bool,
}

impl Default for IterationState {
    fn default() -> Self {
        Self::new()
    }
}

impl IterationState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            iteration: 0,
            absolute_error: 0.0,
            relative_error: 0.0,
            initial_error: 0.0,
            linear_iterations: 0,
            failure_ignored: false,
        }
    }

    /// Record the initial residual norm. A zero initial residual has relative error zero.
    pub fn start(&mut self, r0: f64) {
        self.iteration = 0;
        self.initial_error = r0;
        self.absolute_error = r0;
        self.relative_error = if r0 == 0.0 { 0.0 } else { 1.0 };
    }

    pub fn update(&mut self, r: f64) {
        self.absolute_error = r;
        self.relative_error = if self.initial_error == 0.0 { 0.0 } else { r / self.initial_error };
    }

    /// Either tolerance satisfied by a finite residual.
    pub fn tolerances_met(&self, rtol: f64, atol: f64) -> bool {
        self.absolute_error.is_finite() && !(self.relative_error > rtol && self.absolute_error > atol)
    }
}

/// The run-terminating action taken on unrecoverable divergence.
pub trait AbortHandler {
    fn abort(&mut self);
}

impl<F: FnMut()> AbortHandler for F {
    fn abort(&mut self) {
        self()
    }
}

/// Terminates the process with a failure status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitProcess;

impl AbortHandler for ExitProcess {
    fn abort(&mut self) {
        log::logger().flush();
        std::process::exit(1);
    }
}

/// Ignore-or-escalate handling of a solver that failed to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailurePolicy {
    pub ignore: bool,
}

impl FailurePolicy {
    /// Returns `Ok(())` when the failure is ignored. Otherwise runs `abort` and returns
    /// [`KError::Diverged`] in case `abort` returns.
    pub fn handle(&self, solver: &str, reason: &str, abort: &mut dyn AbortHandler) -> Result<(), KError> {
        if self.ignore {
            log::warn!("{solver} failed to converge ({reason}), ignoring failure");
            return Ok(());
        }
        log::error!("{solver} failed to converge ({reason}), aborting");
        abort.abort();
        Err(KError::Diverged { solver: solver.to_string(), reason: reason.to_string() })
    }
}
