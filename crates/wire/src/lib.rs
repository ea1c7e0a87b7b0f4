//! The wire layer (spec §4.3): a shared message taxonomy plus the transport
//! abstraction implemented by four interchangeable backends -- loopback
//! (same-rank shortcut), in-process channel (multi-rank tests), MPI
//! (`mpi-transport` feature), and RPC (`rpc-transport` feature).

pub mod channel;
pub mod endpoint_group;
pub mod loopback;
pub mod message;
pub mod transport;

#[cfg(feature = "mpi-transport")]
pub mod backend_mpi;

#[cfg(feature = "rpc-transport")]
pub mod backend_rpc;

pub use endpoint_group::EndpointGroup;
pub use loopback::{LocalDispatch, LoopbackTransport, ResponseSlot};
pub use message::{Header, KvEntry, Message};
pub use transport::{destination_of, poll_until_ready, Shutdown, Transport};

#[cfg(feature = "mpi-transport")]
pub use backend_mpi::MpiTransport;

#[cfg(feature = "rpc-transport")]
pub use backend_rpc::RpcTransport;
