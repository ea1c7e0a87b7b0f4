//! Bootstrap (spec §6 Collaborator contracts): hands each process its rank
//! and the bootstrap group's size, but never messaging -- `Session::open`
//! wires transports separately via [`crate::session::SessionTransport`].

use hxhim_core::Rank;

/// A rank id plus the bootstrap group's total size. Implementations never
/// provide a way to send a message; that is `SessionTransport`'s job.
pub trait Bootstrap: Send + Sync {
    fn rank(&self) -> Rank;
    fn rank_count(&self) -> u32;
}

/// The in-process test implementation: a fixed (rank, rank_count) pair.
/// Tests stand up one `LocalBootstrap` per simulated rank, each on its own
/// thread, sharing a [`crate::session::SessionTransport::Channel`] fabric.
#[derive(Debug, Clone, Copy)]
pub struct LocalBootstrap {
    rank: Rank,
    rank_count: u32,
}

impl LocalBootstrap {
    pub fn new(rank: Rank, rank_count: u32) -> Self {
        LocalBootstrap { rank, rank_count }
    }
}

impl Bootstrap for LocalBootstrap {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn rank_count(&self) -> u32 {
        self.rank_count
    }
}

/// A real MPI communicator's rank/size (spec §6: "a stub for a real
/// MPI-provided communicator"), gated behind the `mpi-transport` feature
/// since it requires a local MPI installation to build.
#[cfg(feature = "mpi-transport")]
pub struct MpiBootstrap {
    rank: Rank,
    rank_count: u32,
}

#[cfg(feature = "mpi-transport")]
impl MpiBootstrap {
    /// Read rank/size off an already-initialized world communicator (call
    /// after `hxhim_wire::backend_mpi::MpiTransport::init`).
    pub fn from_world(world: &mpi::topology::SimpleCommunicator) -> Self {
        use mpi::traits::Communicator;
        MpiBootstrap {
            rank: world.rank(),
            rank_count: world.size() as u32,
        }
    }
}

#[cfg(feature = "mpi-transport")]
impl Bootstrap for MpiBootstrap {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn rank_count(&self) -> u32 {
        self.rank_count
    }
}
