//! Convergence bookkeeping shared by the linear and nonlinear drivers.

pub mod convergence;
