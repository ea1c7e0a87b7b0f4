//! Shared types and ambient concerns for HXHIM.
//!
//! This crate has no dependency on any other HXHIM crate. It defines:
//! - [`Triple`] and the opcode/type enums shared by the codec, partitioner, wire, and server.
//! - [`HxhimError`] / [`HxhimResult`], the single error type used across the stack.
//! - [`Limits`], the compile-time batch and bulk-operation bounds (§3, §7 InputInvalid/QueueFull).
//! - [`config`], a small composable configuration reader chain.
//! - [`logging`], a `tracing` subscriber initializer driven by the `debug_level` config key.

pub mod config;
pub mod error;
pub mod limits;
pub mod logging;
pub mod types;

pub use error::{ErrorKind, HxhimError, HxhimResult};
pub use limits::Limits;
pub use types::{GetOp, IndexType, KeyType, Rank, Triple, WorkOp};
