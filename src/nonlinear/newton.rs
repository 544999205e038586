//! Newton iteration delegated to a nonlinear backend.
//!
//! The controller constrains the initial iterate, hands it to a [`NewtonBackend`] together with
//! the residual and Jacobian callbacks of a [`NonlinearProblem`], and inspects the returned
//! [`SnesReason`]. [`LineSearchNewton`] is the reference backend: Newton steps solved with the
//! compiled [`KspContext`], globalized by a backtracking line search.

use faer::Mat;

use crate::config::LineSearch;
use crate::context::KspContext;
use crate::core::traits::MatVec;
use crate::error::KError;
use crate::nonlinear::{
    AbortHandler, FailurePolicy, IterationObserver, IterationState, NewtonSettings,
    NonlinearSolverConfig, Phase,
};
use crate::parallel::Comm;
use crate::utils::convergence::SnesReason;

/// Residual and Jacobian callbacks.
pub trait NonlinearProblem {
    /// Impose boundary values on the initial iterate.
    fn constrain_iterate(&mut self, _x: &mut [f64]) -> Result<(), KError> {
        Ok(())
    }

    fn residual(&mut self, x: &[f64], f: &mut [f64]) -> Result<(), KError>;

    /// Jacobian at `x`, and a separate preconditioning operator when one is assembled.
    fn jacobian(&mut self, x: &[f64]) -> Result<(Mat<f64>, Option<Mat<f64>>), KError>;
}

/// An external nonlinear solver.
pub trait NewtonBackend {
    /// Solve `F(x) = 0` from `x`, recording progress in `state`.
    fn solve(
        &mut self,
        problem: &mut dyn NonlinearProblem,
        ksp: &mut KspContext,
        x: &mut [f64],
        comm: &dyn Comm,
        state: &mut IterationState,
        observer: IterationObserver<'_>,
    ) -> Result<SnesReason, KError>;
}

/// The delegated-Newton path of a nonlinear solver.
pub struct DelegatedNewton {
    name: String,
    policy: FailurePolicy,
    backend: Box<dyn NewtonBackend>,
}

impl DelegatedNewton {
    pub fn new(config: &NonlinearSolverConfig) -> Self {
        Self::with_backend(config, Box::new(LineSearchNewton::new(config)))
    }

    pub fn with_backend(config: &NonlinearSolverConfig, backend: Box<dyn NewtonBackend>) -> Self {
        Self { name: config.name.clone(), policy: config.failure_policy(), backend }
    }

    /// Run the backend from `x`. The iterate is committed to `x` on convergence or when the
    /// failure is ignored.
    pub fn solve(
        &mut self,
        problem: &mut dyn NonlinearProblem,
        ksp: &mut KspContext,
        x: &mut [f64],
        comm: &dyn Comm,
        observer: IterationObserver<'_>,
        abort: &mut dyn AbortHandler,
    ) -> Result<IterationState, KError> {
        let mut work = x.to_vec();
        problem.constrain_iterate(&mut work)?;

        let mut state = IterationState::new();
        let reason = self.backend.solve(problem, ksp, &mut work, comm, &mut state, observer)?;
        log::info!("SNESConvergedReason {}", reason.code());

        if !reason.is_converged() {
            state.phase = Phase::Failed;
            self.policy.handle(&self.name, &format!("{reason:?}"), abort)?;
            state.failure_ignored = true;
        }
        state.phase = Phase::Converged;
        x.copy_from_slice(&work);
        Ok(state)
    }
}

/// An accepted line-search step.
struct Step {
    lambda: f64,
    x: Vec<f64>,
    f: Vec<f64>,
    fnorm: f64,
}

/// Newton's method with a backtracking line search.
#[derive(Debug, Clone)]
pub struct LineSearchNewton {
    rtol: f64,
    atol: f64,
    max_iterations: usize,
    settings: NewtonSettings,
    /// Residual evaluations of the current solve.
    evaluations: usize,
}

impl LineSearchNewton {
    pub fn new(config: &NonlinearSolverConfig) -> Self {
        Self {
            rtol: config.rtol,
            atol: config.atol,
            max_iterations: config.max_iterations,
            settings: config.newton,
            evaluations: 0,
        }
    }

    /// `x - lambda y` and its residual.
    fn trial(
        &mut self,
        problem: &mut dyn NonlinearProblem,
        x: &[f64],
        y: &[f64],
        lambda: f64,
        comm: &dyn Comm,
    ) -> Result<Step, KError> {
        let w: Vec<f64> = x.iter().zip(y).map(|(xi, yi)| xi - lambda * yi).collect();
        let mut g = vec![0.0; w.len()];
        problem.residual(&w, &mut g)?;
        self.evaluations += 1;
        let fnorm = comm.norm(&g);
        Ok(Step { lambda, x: w, f: g, fnorm })
    }

    /// Backtrack along `-y` on the merit function `phi = ||F||^2 / 2`.
    ///
    /// `initslope` is `phi'(0)`. Returns `None` once the step length drops below `min_lambda`.
    fn line_search(
        &mut self,
        problem: &mut dyn NonlinearProblem,
        x: &[f64],
        y: &[f64],
        fnorm: f64,
        initslope: f64,
        comm: &dyn Comm,
    ) -> Result<Option<Step>, KError> {
        let mut step = self.trial(problem, x, y, 1.0, comm)?;
        if matches!(self.settings.line_search, LineSearch::Basic | LineSearch::BasicNoNorms) {
            return Ok(Some(step));
        }

        let phi0 = 0.5 * fnorm * fnorm;
        let mut previous: Option<(f64, f64)> = None;
        loop {
            let lambda = step.lambda;
            let phi = 0.5 * step.fnorm * step.fnorm;
            if phi.is_finite() && phi <= phi0 + self.settings.alpha * lambda * initslope {
                return Ok(Some(step));
            }

            let model = match (self.settings.line_search, previous) {
                _ if !phi.is_finite() => 0.1 * lambda,
                (LineSearch::Cubic, Some((lp, phip))) => {
                    let t1 = phi - phi0 - initslope * lambda;
                    let t2 = phip - phi0 - initslope * lp;
                    let a = (t1 / (lambda * lambda) - t2 / (lp * lp)) / (lambda - lp);
                    let b = (-lp * t1 / (lambda * lambda) + lambda * t2 / (lp * lp)) / (lambda - lp);
                    let d = (b * b - 3.0 * a * initslope).max(0.0);
                    if a == 0.0 {
                        -initslope / (2.0 * b)
                    } else {
                        (-b + d.sqrt()) / (3.0 * a)
                    }
                }
                _ => -initslope * lambda * lambda / (2.0 * (phi - phi0 - initslope * lambda)),
            };
            let next = if model.is_finite() {
                model.clamp(0.1 * lambda, 0.5 * lambda)
            } else {
                0.5 * lambda
            };
            if next < self.settings.min_lambda {
                log::debug!("line search step {next:e} below minimum {:e}", self.settings.min_lambda);
                return Ok(None);
            }
            previous = Some((lambda, phi));
            step = self.trial(problem, x, y, next, comm)?;
        }
    }
}

impl NewtonBackend for LineSearchNewton {
    fn solve(
        &mut self,
        problem: &mut dyn NonlinearProblem,
        ksp: &mut KspContext,
        x: &mut [f64],
        comm: &dyn Comm,
        state: &mut IterationState,
        observer: IterationObserver<'_>,
    ) -> Result<SnesReason, KError> {
        let n = x.len();
        let mut f = vec![0.0; n];
        state.phase = Phase::ResidualCheck;
        problem.residual(x, &mut f)?;
        self.evaluations = 1;
        let mut fnorm = comm.norm(&f);
        state.start(fnorm);
        observer(&*state, &f)?;
        if !fnorm.is_finite() {
            return Ok(SnesReason::DivergedFnormNan);
        }
        if fnorm <= self.atol {
            return Ok(SnesReason::ConvergedFnormAbs);
        }

        for it in 1..=self.max_iterations {
            state.phase = Phase::Assembling;
            let (j, p) = problem.jacobian(x)?;

            state.phase = Phase::LinearSolve;
            let mut y = vec![0.0; n];
            let stats = match ksp
                .set_operators(j, p.as_ref())
                .and_then(|()| ksp.solve_with_comm(&f, &mut y, comm))
            {
                Ok(stats) => stats,
                Err(e) if e.is_numerical() => {
                    log::debug!("{}: linear solve broke down ({e})", ksp.prefix());
                    return Ok(SnesReason::DivergedLinearSolve);
                }
                Err(e) => return Err(e),
            };
            state.linear_iterations += stats.iterations;
            if !stats.converged {
                log::debug!("{}: linear solve failed ({:?})", ksp.prefix(), stats.reason);
                return Ok(SnesReason::DivergedLinearSolve);
            }

            let mut ynorm = comm.norm(&y);
            if ynorm > self.settings.max_step {
                let scale = self.settings.max_step / ynorm;
                y.iter_mut().for_each(|yi| *yi *= scale);
                ynorm = self.settings.max_step;
            }

            let mut initslope = match ksp.operator() {
                Some(jac) => {
                    let mut jy = vec![0.0; n];
                    jac.matvec(&y, &mut jy);
                    -comm.dot(&f, &jy)
                }
                None => -fnorm * fnorm,
            };
            if initslope > 0.0 {
                initslope = -initslope;
            }
            if initslope == 0.0 {
                initslope = -1.0;
            }

            state.phase = Phase::ResidualCheck;
            let Some(step) = self.line_search(problem, x, &y, fnorm, initslope, comm)? else {
                return Ok(SnesReason::DivergedLineSearch);
            };
            x.copy_from_slice(&step.x);
            f = step.f;
            fnorm = step.fnorm;
            state.iteration = it;
            state.update(fnorm);
            observer(&*state, &f)?;

            if !fnorm.is_finite() {
                return Ok(SnesReason::DivergedFnormNan);
            }
            if fnorm <= self.atol {
                return Ok(SnesReason::ConvergedFnormAbs);
            }
            if self.evaluations >= self.settings.max_function_evaluations {
                return Ok(SnesReason::DivergedFunctionCount);
            }
            if fnorm <= self.rtol * state.initial_error {
                return Ok(SnesReason::ConvergedFnormRelative);
            }
            if step.lambda * ynorm <= self.settings.stol * comm.norm(x) {
                return Ok(SnesReason::ConvergedSnormRelative);
            }
            state.phase = Phase::Continuing;
        }
        Ok(SnesReason::DivergedMaxIts)
    }
}
