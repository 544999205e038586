//! Convergence tracking & tolerance checks for iterative solvers.

/// Why a linear solve stopped. Positive codes converged, negative codes diverged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KspReason {
    Iterating,
    ConvergedRtol,
    ConvergedAtol,
    /// Single application of the preconditioner (`preonly`).
    ConvergedIts,
    DivergedIts,
    DivergedDtol,
    DivergedBreakdown,
    DivergedNanOrInf,
}

impl KspReason {
    pub fn code(&self) -> i32 {
        match self {
            Self::Iterating => 0,
            Self::ConvergedRtol => 2,
            Self::ConvergedAtol => 3,
            Self::ConvergedIts => 4,
            Self::DivergedIts => -3,
            Self::DivergedDtol => -4,
            Self::DivergedBreakdown => -5,
            Self::DivergedNanOrInf => -9,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.code() > 0
    }
}

/// Why a Newton solve stopped. Positive codes converged, non-positive codes failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnesReason {
    Iterating,
    ConvergedFnormAbs,
    ConvergedFnormRelative,
    ConvergedSnormRelative,
    DivergedFunctionCount,
    DivergedLinearSolve,
    DivergedFnormNan,
    DivergedMaxIts,
    DivergedLineSearch,
}

impl SnesReason {
    pub fn code(&self) -> i32 {
        match self {
            Self::Iterating => 0,
            Self::ConvergedFnormAbs => 2,
            Self::ConvergedFnormRelative => 3,
            Self::ConvergedSnormRelative => 4,
            Self::DivergedFunctionCount => -2,
            Self::DivergedLinearSolve => -3,
            Self::DivergedFnormNan => -4,
            Self::DivergedMaxIts => -5,
            Self::DivergedLineSearch => -6,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.code() > 0
    }
}

/// Stopping criteria & stats.
#[derive(Clone, Copy, Debug)]
pub struct Convergence {
    pub rtol: f64,
    pub atol: f64,
    pub dtol: f64,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats {
    pub iterations: usize,
    pub final_residual: f64,
    pub converged: bool,
    pub reason: KspReason,
    /// Residual norm per iteration, recorded when a convergence file monitor is attached.
    pub history: Vec<f64>,
}

impl SolveStats {
    pub fn new(reason: KspReason, iterations: usize, final_residual: f64) -> Self {
        Self {
            iterations,
            final_residual,
            converged: reason.is_converged(),
            reason,
            history: Vec::new(),
        }
    }
}

impl Convergence {
    /// Classify the residual `res_norm` at iteration `i` against the initial `res0_norm`.
    pub fn check(&self, res_norm: f64, res0_norm: f64, i: usize) -> KspReason {
        if !res_norm.is_finite() {
            KspReason::DivergedNanOrInf
        } else if res_norm <= self.atol {
            KspReason::ConvergedAtol
        } else if res_norm <= self.rtol * res0_norm {
            KspReason::ConvergedRtol
        } else if res_norm > self.dtol * res0_norm && res0_norm > 0.0 {
            KspReason::DivergedDtol
        } else if i >= self.max_iters {
            KspReason::DivergedIts
        } else {
            KspReason::Iterating
        }
    }
}
