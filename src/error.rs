//! Typed failure kinds for the pager and the index.

use thiserror::Error;

use crate::storage::{PageNo, Rid};

/// Failures raised by the buffer pool.
///
/// `PageNotPinned` and `PageNotFound` on unpin are benign double-unpin
/// signals; `Pager::unpin_if_pinned` swallows exactly those two. Everything
/// else is propagated.
#[derive(Debug, Error)]
pub enum PagerError {
    #[error("page {0} is not pinned")]
    PageNotPinned(PageNo),

    #[error("page {0} is not resident in the buffer pool")]
    PageNotFound(PageNo),

    #[error("buffer pool exhausted: every frame is pinned")]
    PoolExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures raised by the index public surface.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `start_scan` given a low operator not in {GT, GTE} or a high
    /// operator not in {LT, LTE}.
    #[error("low operator must be GT or GTE and high operator must be LT or LTE")]
    BadOpcodes,

    #[error("bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("no scan is in progress")]
    ScanNotInitialized,

    /// Normal end-of-range signal from `scan_next`.
    #[error("index scan completed")]
    IndexScanCompleted,

    /// An existing index file disagrees with the caller's relation name,
    /// key byte offset, or attribute type.
    #[error("index metadata mismatch: {0}")]
    BadIndexInfo(String),

    /// A heap record ends before the key field the index was asked to
    /// extract at build time.
    #[error("record {rid:?} too short for a key at byte offset {offset}")]
    RecordTooShort { rid: Rid, offset: usize },

    #[error(transparent)]
    Pager(#[from] PagerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
