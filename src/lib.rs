//! Ring Stream - a bounded in-memory ring buffer that wraps a seekable
//! byte stream behind a background read-ahead thread.
//!
//! # Overview
//!
//! The filter sits between a seekable source and a downstream consumer and
//! exposes the same byte-stream contract on both sides:
//!
//! 1. A producer thread reads the source ahead of the consumer and stores
//!    the bytes in a fixed-size circular buffer
//! 2. The consumer reads sequentially, peeks without advancing, and may
//!    reposition; targets inside the in-memory cache window are served
//!    without touching the source
//!
//! # Key Features
//!
//! - Fixed-capacity ring realized as equal-size blocks (1 MiB x 10 by
//!   default) with a live window of unread bytes and a larger cache window
//!   for short-seek lookback
//! - Seek requests classified as short, middle, or long against the cache
//!   window; only long seeks reseek the source
//! - Guard gaps reserved in the ring so a pending seek can always be
//!   resolved without deadlocking the producer against the consumer
//! - Blocking waits on condition variables with a poll timeout, so close
//!   and source failures are observed promptly
//! - `std::io::Read` and `std::io::Seek` impls for downstream code that
//!   speaks `std::io`
//!
//! # Usage
//!
//! The filter is opt-in: `RingConfig::enabled` defaults to false and open
//! fails with [`OpenError::Disabled`] until it is set.
//!
//! ```
//! use ring_stream::{MemorySource, RingBufferStream, RingConfig};
//!
//! let data: Vec<u8> = (0..65536u32).map(|i| (i % 256) as u8).collect();
//! let config = RingConfig {
//!     enabled: true,
//!     ..RingConfig::default()
//! };
//! let filter = RingBufferStream::open(MemorySource::new(data), &config).unwrap();
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(filter.read(&mut buf).unwrap(), 16);
//! assert_eq!(filter.position(), 16);
//!
//! // Backward repositioning is served from the cache window.
//! filter.set_position(4).unwrap();
//! let mut buf = [0u8; 4];
//! assert_eq!(filter.read(&mut buf).unwrap(), 4);
//! assert_eq!(&buf, &[4, 5, 6, 7]);
//! ```

#![deny(missing_docs)]

mod error;
mod filter;
mod producer;
mod ring;
pub mod source;

use std::time::Duration;

pub use error::{OpenError, Result, RingError};
pub use filter::RingBufferStream;
pub use source::{FileSource, MemorySource, SourceStream};

use ring::Geometry;

/// Canonical name of the filter.
pub const FILTER_NAME: &str = "ringbuf";

/// Shortcut names under which the filter can be selected explicitly.
pub const SHORTCUT_NAMES: [&str; 2] = ["ringbuf", "asyncbuf"];

/// Configuration for the ring buffering filter.
///
/// The defaults reproduce the stock geometry: a 10 MiB ring of ten 1 MiB
/// blocks, a 1 KiB read/write guard gap, a 1 MiB seek guard gap, and a
/// 1 MiB read-through threshold for forward seeks. Tests shrink these to
/// exercise window transitions cheaply.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Whether the filter is enabled. Off by default; opening a filter
    /// with `enabled == false` fails with [`OpenError::Disabled`].
    pub enabled: bool,
    /// Size of one ring block in bytes.
    pub block_size: usize,
    /// Number of ring blocks; capacity is `block_size * block_count`.
    pub block_count: usize,
    /// Free bytes reserved between writer and reader.
    pub rw_gap: usize,
    /// Free bytes reserved so a pending seek can be resolved while the
    /// ring is otherwise full.
    pub seek_gap: usize,
    /// Forward distance beyond the cache window that is still read through
    /// instead of reseeking the source.
    pub seek_threshold: u64,
    /// Bytes the producer reads from the source per step.
    pub read_step: usize,
    /// Timeout for all blocking waits; bounds how long shutdown and error
    /// conditions can go unobserved.
    pub poll_interval: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            block_size: 1024 * 1024,
            block_count: 10,
            rw_gap: 1024,
            seek_gap: 1024 * 1024,
            seek_threshold: 1024 * 1024,
            read_step: 32 * 1024,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl RingConfig {
    /// Validate the configured geometry.
    ///
    /// The guard gaps must leave room for a non-empty live window,
    /// otherwise the producer could never write a byte.
    pub(crate) fn geometry(&self) -> std::result::Result<Geometry, OpenError> {
        if self.block_size == 0 || self.block_count == 0 || self.read_step == 0 {
            return Err(OpenError::EmptyGeometry);
        }
        let capacity = self.block_size * self.block_count;
        if self.rw_gap + self.seek_gap >= capacity {
            return Err(OpenError::GuardGapsTooLarge {
                rw_gap: self.rw_gap,
                seek_gap: self.seek_gap,
                capacity,
            });
        }
        Ok(Geometry {
            block_size: self.block_size,
            block_count: self.block_count,
            rw_gap: self.rw_gap,
            seek_gap: self.seek_gap,
            seek_threshold: self.seek_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_stock_geometry() {
        let config = RingConfig::default();
        assert!(!config.enabled);
        let geometry = config.geometry().unwrap();
        assert_eq!(geometry.capacity(), 10 * 1024 * 1024);
        assert_eq!(geometry.usable(), 10 * 1024 * 1024 - 1024 - 1024 * 1024);
    }

    #[test]
    fn shortcut_names_include_canonical_name() {
        assert!(SHORTCUT_NAMES.contains(&FILTER_NAME));
    }
}
