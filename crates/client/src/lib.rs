//! The client-side request pipeline (spec §4.5): per-operation queues, a
//! background PUT drainer, and synchronous flush for GET/RANGE-GET/DELETE.

pub mod batch;
pub mod drainer;
pub mod flush;
pub mod pipeline;
pub mod queue;
pub mod router;

pub use pipeline::ClientPipeline;
pub use queue::{DeleteEntry, GetEntry, PutEntry};
pub use router::Router;
