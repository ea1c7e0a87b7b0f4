//! Compile-time batch and bulk-operation bounds (§3 Batch, §7 QueueFull).

/// Compile-time bounds for queues, batches, and bulk calls.
///
/// These mirror the `HXHIM_MAX_BULK_*_OPS` and batch-capacity constants of the
/// original implementation. They are compile-time constants (not runtime config)
/// because the batch node's parallel arrays are sized against them.
pub struct Limits;

impl Limits {
    /// Number of entries held by one batch node before it is considered full.
    pub const BATCH_CAP: usize = 4096;

    /// Maximum number of entries accepted by a single `bput` call.
    pub const MAX_BULK_PUT_OPS: usize = Self::BATCH_CAP;

    /// Maximum number of entries accepted by a single `bget` call.
    pub const MAX_BULK_GET_OPS: usize = Self::BATCH_CAP;

    /// Maximum number of entries accepted by a single `bdelete` call.
    pub const MAX_BULK_DELETE_OPS: usize = Self::BATCH_CAP;

    /// Default watermark: number of full batches that must accumulate before
    /// the background PUT drainer wakes without a forced flush (§4.5).
    pub const DEFAULT_WATERMARK: usize = 2;
}
