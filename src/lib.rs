//! HXHIM: a distributed (subject, predicate, object) triple store for HPC
//! clusters (spec §1 Overview).
//!
//! [`Session`] is the top-level handle: one per rank, built by
//! [`Session::open`] from a [`crate::bootstrap::Bootstrap`] (rank identity)
//! and a [`SessionTransport`] (how this rank reaches every other rank). It
//! owns the client-side request pipeline (`hxhim-client`) and, on ranks that
//! host a shard of the primary index, the local range server
//! (`hxhim-server`).

pub mod bootstrap;
pub mod manifest;
pub mod session;

pub use bootstrap::{Bootstrap, LocalBootstrap};
pub use hxhim_core::config::{Config, ConfigChain};
pub use hxhim_core::{GetOp, HxhimError, HxhimResult, KeyType, Rank, Triple};
pub use hxhim_partition::Destination;
pub use hxhim_results::{Kv, ResultChain, ResultCursor};
pub use hxhim_wire::channel::ChannelFabric;
pub use manifest::Manifest;
pub use session::{Session, SessionTransport};

#[cfg(feature = "mpi-transport")]
pub use bootstrap::MpiBootstrap;
