/// MPI-based parallel communication module.
///
/// Implements the [`Comm`](super::Comm) collectives over the MPI world communicator. Only
/// available when the `mpi` feature is enabled.
///
/// # Example
/// ```no_run
/// # #[cfg(feature = "mpi")]
/// # {
/// use splitsolve::parallel::{Comm, MpiComm};
/// let comm = MpiComm::new().expect("MPI already initialized");
/// println!("Rank: {} / {}", comm.rank(), comm.size());
/// comm.barrier();
/// # }
/// ```
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI communicator wrapper for distributed parallelism.
pub struct MpiComm {
    /// Keeps MPI initialized for the lifetime of the communicator.
    _universe: Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI. Returns `None` if MPI was already initialized.
    pub fn new() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Some(MpiComm { _universe: universe, world, rank, size })
    }
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.world.barrier();
    }

    fn all_reduce(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        y
    }

    fn exclusive_sum(&self, x: usize) -> usize {
        let local = x as u64;
        let mut inclusive = 0u64;
        self.world.scan_into(&local, &mut inclusive, &SystemOperation::sum());
        (inclusive - local) as usize
    }
}
