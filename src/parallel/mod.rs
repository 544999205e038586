//! Process-level communication.
//!
//! Every DOF subset handled by this crate is local to the calling process. Whenever a quantity
//! must agree across processes (global index set sizes, parent-relative offsets, residual norms)
//! it goes through a [`Comm`] collective. All processes must make the same collective calls in the
//! same order.

/// Collective operations needed by the solver assembly.
pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Sum of `x` over all processes.
    fn all_reduce(&self, x: f64) -> f64;
    /// Sum of `x` over all processes with a lower rank (zero on rank 0).
    fn exclusive_sum(&self, x: usize) -> usize;

    /// Global sum of a local count.
    fn all_reduce_count(&self, x: usize) -> usize {
        self.all_reduce(x as f64).round() as usize
    }

    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local = a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>();
        self.all_reduce(local)
    }

    /// Global Euclidean norm of a distributed vector.
    fn norm(&self, a: &[f64]) -> f64 {
        self.dot(a, a).sqrt()
    }
}

/// Single-process communicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> f64 {
        x
    }
    fn exclusive_sum(&self, _x: usize) -> usize {
        0
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
