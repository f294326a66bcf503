//! Error types for the ring stream filter
//!
//! Two families of failures exist:
//!
//! - Setup errors, reported by [`RingBufferStream::open`]: the filter is not
//!   installed and the source is returned to the caller untouched.
//! - Runtime errors, reported by the consumer API: these are terminal states
//!   on the filter instance. The filter does not recover from them locally.
//!
//! [`RingBufferStream::open`]: crate::RingBufferStream::open

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Errors reported when opening the filter.
///
/// None of these leave a partially constructed filter behind; in particular
/// the producer thread only exists once `open` has returned successfully.
#[derive(Debug, Error)]
pub enum OpenError {
    /// Ring buffering is disabled by configuration; the filter is bypassed.
    #[error("ring buffering is disabled by configuration")]
    Disabled,

    /// The source reported an unknown or zero size.
    #[error("source stream has unknown or zero size")]
    UnknownSize,

    /// The source is already a ring buffering filter; stacking is refused.
    #[error("source stream is already ring buffered")]
    AlreadyBuffered,

    /// Block size, block count, or read step was zero.
    #[error("block size, block count, and read step must be non-zero")]
    EmptyGeometry,

    /// The guard gaps leave no room for the live window.
    #[error("guard gaps ({rw_gap} + {seek_gap}) must be smaller than capacity {capacity}")]
    GuardGapsTooLarge {
        /// Configured read/write guard gap in bytes.
        rw_gap: usize,
        /// Configured seek guard gap in bytes.
        seek_gap: usize,
        /// Total ring capacity in bytes.
        capacity: usize,
    },

    /// Allocating the ring blocks failed.
    #[error("failed to allocate ring storage")]
    Allocation(#[from] TryReserveError),

    /// Spawning the producer thread failed.
    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Errors returned by the consumer API of an installed filter.
#[derive(Debug, Error)]
pub enum RingError {
    /// A blocking call was terminated by close or by a source failure.
    ///
    /// Once observed, every subsequent blocking call on the same filter
    /// returns this error as well.
    #[error("ring stream interrupted by close or source failure")]
    Interrupted,

    /// `set_position` was called on a source that cannot seek.
    #[error("source stream does not support seeking")]
    Unseekable,

    /// Growing the peek scratch buffer failed; shared state is untouched.
    #[error("failed to grow peek scratch buffer")]
    ScratchAlloc(#[from] TryReserveError),
}

impl From<RingError> for io::Error {
    fn from(err: RingError) -> Self {
        let kind = match &err {
            // Terminal condition, not a retryable EINTR.
            RingError::Interrupted => io::ErrorKind::Other,
            RingError::Unseekable => io::ErrorKind::Unsupported,
            RingError::ScratchAlloc(_) => io::ErrorKind::OutOfMemory,
        };
        io::Error::new(kind, err)
    }
}

/// Result type for consumer operations on the filter.
pub type Result<T> = std::result::Result<T, RingError>;
