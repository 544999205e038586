//! Hand-rolled Picard (fixed-point) iteration.

use crate::error::KError;
use crate::nonlinear::{
    AbortHandler, FailurePolicy, IterationObserver, IterationState, NonlinearSolverConfig, Phase,
};
use crate::parallel::Comm;

/// Callbacks of a Picard iteration.
pub trait FixedPointSystem {
    /// Assemble the constrained operators and right-hand side linearized at `x`.
    fn assemble(&mut self, x: &[f64]) -> Result<(), KError>;
    /// Solve the assembled system starting from `x` and leave the solution in `x`.
    /// Returns the linear iteration count.
    fn linear_solve(&mut self, x: &mut [f64]) -> Result<usize, KError>;
    /// Constrained nonlinear residual at `x`.
    fn residual(&mut self, x: &[f64], f: &mut [f64]) -> Result<(), KError>;
}

/// Fixed-point loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Picard {
    name: String,
    rtol: f64,
    atol: f64,
    min_iterations: usize,
    max_iterations: usize,
    policy: FailurePolicy,
}

impl Picard {
    pub fn new(config: &NonlinearSolverConfig) -> Self {
        Self {
            name: config.name.clone(),
            rtol: config.rtol,
            atol: config.atol,
            min_iterations: config.min_iterations,
            max_iterations: config.max_iterations,
            policy: config.failure_policy(),
        }
    }

    /// Iterate from `x` (the last converged value). `x` is overwritten with the new iterate on
    /// success, or when a failure is ignored; it is left untouched when the failure escalates.
    /// A linear solve that breaks down goes through the same failure policy, and an ignored
    /// breakdown stops the loop at the last complete iterate.
    pub fn solve(
        &self,
        system: &mut dyn FixedPointSystem,
        x: &mut [f64],
        comm: &dyn Comm,
        observer: IterationObserver<'_>,
        abort: &mut dyn AbortHandler,
    ) -> Result<IterationState, KError> {
        let mut state = IterationState::new();
        let mut iterate = x.to_vec();
        let mut f = vec![0.0; x.len()];

        state.phase = Phase::ResidualCheck;
        system.residual(&iterate, &mut f)?;
        state.start(comm.norm(&f));
        self.report(&state, &f, observer)?;

        while state.iteration < self.min_iterations
            || (state.iteration < self.max_iterations
                && state.relative_error > self.rtol
                && state.absolute_error > self.atol)
        {
            state.iteration += 1;

            let mut next = iterate.clone();
            match Self::linear_step(system, &mut state, &mut next) {
                Ok(its) => state.linear_iterations += its,
                Err(e) if e.is_numerical() => {
                    state.phase = Phase::Failed;
                    self.policy.handle(&self.name, &format!("linear solve failed: {e}"), abort)?;
                    state.failure_ignored = true;
                    state.phase = Phase::Converged;
                    x.copy_from_slice(&iterate);
                    return Ok(state);
                }
                Err(e) => return Err(e),
            }
            iterate = next;

            state.phase = Phase::ResidualCheck;
            system.residual(&iterate, &mut f)?;
            state.update(comm.norm(&f));
            self.report(&state, &f, observer)?;
            state.phase = Phase::Continuing;
        }

        if !state.tolerances_met(self.rtol, self.atol) {
            state.phase = Phase::Failed;
            let reason = format!(
                "{} iterations, error (absolute, relative) = {:e}, {:e}",
                state.iteration, state.absolute_error, state.relative_error
            );
            self.policy.handle(&self.name, &reason, abort)?;
            state.failure_ignored = true;
        }
        state.phase = Phase::Converged;
        x.copy_from_slice(&iterate);
        Ok(state)
    }

    /// Assemble at `x` and solve the linearized system in place.
    fn linear_step(
        system: &mut dyn FixedPointSystem,
        state: &mut IterationState,
        x: &mut [f64],
    ) -> Result<usize, KError> {
        state.phase = Phase::Assembling;
        system.assemble(x)?;
        state.phase = Phase::LinearSolve;
        system.linear_solve(x)
    }

    fn report(
        &self,
        state: &IterationState,
        f: &[f64],
        observer: IterationObserver<'_>,
    ) -> Result<(), KError> {
        log::info!(
            "{} Error (absolute, relative) = {:e}, {:e}",
            state.iteration,
            state.absolute_error,
            state.relative_error
        );
        observer(state, f)
    }
}
