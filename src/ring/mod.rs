//! Ring storage, index arithmetic, and window bookkeeping
//!
//! This module holds the pure state of the filter: the block-backed circular
//! byte store, the live and cache windows, and the pending seek record. Key
//! pieces:
//!
//! - Block-based storage: the capacity is realized as `block_count` equal
//!   boxed blocks; ring position `p` lives in block `p / block_size` at
//!   offset `p % block_size`
//! - The live window `[stream_offset, stream_offset + buffer_size)` of
//!   unread bytes, and the cache window `[cache_offset, cache_offset +
//!   cache_size)` of bytes still resident for short-seek lookback
//! - Classification of a pending seek target against the cache window
//!
//! Nothing here blocks or locks; [`shared`] wraps this state in the mutex
//! and condition variables, and the producer drives the transitions.
//!
//! # Invariants
//! - `buffer_size <= cache_size <= capacity`
//! - `(write_index - read_index) % capacity == buffer_size` while no seek is
//!   pending
//! - `(read_index - cache_index) % capacity == cache_size - buffer_size`
//! - every absolute offset `o` inside the cache window is stored at ring
//!   position `(cache_index + (o - cache_offset)) % capacity`

pub(crate) mod shared;

use std::collections::TryReserveError;

/// Fixed geometry of the ring, validated when the filter opens.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    /// Size of one storage block in bytes.
    pub block_size: usize,
    /// Number of storage blocks.
    pub block_count: usize,
    /// Free bytes reserved between writer and reader.
    pub rw_gap: usize,
    /// Free bytes reserved so a pending seek can always be resolved.
    pub seek_gap: usize,
    /// Forward distance beyond the cache window still treated as a
    /// read-through (middle) seek rather than a source reseek.
    pub seek_threshold: u64,
}

impl Geometry {
    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.block_size * self.block_count
    }

    /// Largest number of unread bytes the ring holds outside a pending
    /// seek: capacity minus both guard gaps.
    pub fn usable(&self) -> usize {
        self.capacity() - self.rw_gap - self.seek_gap
    }
}

/// Classification of a pending seek target against the cache window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeekClass {
    /// Target is inside the cache window; served from memory.
    Short,
    /// Target is just ahead of the cache window, within the threshold; the
    /// producer reads through until the target enters the window.
    Middle,
    /// Target is behind the cache window or too far ahead; the source is
    /// reseeked and the ring reset.
    Long,
}

/// Mutable ring state shared between the producer and the consumer.
///
/// All index fields are modular in `capacity`; offsets are absolute stream
/// positions. The `seek_pos`/`seek_pending` pair holds at most one pending
/// request, newer requests overwriting older unacknowledged ones.
pub(crate) struct RingState {
    geometry: Geometry,
    blocks: Vec<Box<[u8]>>,
    /// Next ring position to be consumed.
    pub read_index: usize,
    /// Next ring position to be written.
    pub write_index: usize,
    /// Unread bytes available to the consumer.
    pub buffer_size: usize,
    /// Oldest ring position still resident for short-seek lookback.
    pub cache_index: usize,
    /// Valid cached bytes, counted from `cache_index`.
    pub cache_size: usize,
    /// Absolute stream offset stored at `cache_index`.
    pub cache_offset: u64,
    /// Absolute stream offset of the next byte the consumer will read.
    pub stream_offset: u64,
    /// Target of the pending seek request, meaningful while `seek_pending`.
    pub seek_pos: u64,
    /// Whether a seek request awaits resolution by the producer.
    pub seek_pending: bool,
    /// Whether the producer has buffered up to the end of the source.
    ///
    /// Set by the producer at EOF, cleared only by the producer when it
    /// resumes after a seek.
    pub buffered_eos: bool,
}

impl RingState {
    /// Allocate the ring blocks for the given geometry.
    ///
    /// Allocation is fallible so an oversized configuration surfaces as an
    /// open error instead of an abort.
    pub fn new(geometry: Geometry) -> Result<Self, TryReserveError> {
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(geometry.block_count)?;
        for _ in 0..geometry.block_count {
            let mut block = Vec::new();
            block.try_reserve_exact(geometry.block_size)?;
            block.resize(geometry.block_size, 0);
            blocks.push(block.into_boxed_slice());
        }
        Ok(Self {
            geometry,
            blocks,
            read_index: 0,
            write_index: 0,
            buffer_size: 0,
            cache_index: 0,
            cache_size: 0,
            cache_offset: 0,
            stream_offset: 0,
            seek_pos: 0,
            seek_pending: false,
            buffered_eos: false,
        })
    }

    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.geometry.capacity()
    }

    /// First absolute offset past the cache window.
    pub fn cache_end(&self) -> u64 {
        self.cache_offset + self.cache_size as u64
    }

    /// Whether `n` more bytes fit without touching either guard gap.
    pub fn fits_outside_gaps(&self, n: usize) -> bool {
        self.buffer_size + n <= self.geometry.usable()
    }

    /// Whether `n` more bytes fit when the seek gap may be consumed.
    ///
    /// Only valid while a seek is pending; this is what lets the producer
    /// make forward progress instead of deadlocking against a consumer that
    /// waits for the seek to complete.
    pub fn fits_inside_seek_gap(&self, n: usize) -> bool {
        self.buffer_size + n <= self.capacity() - self.geometry.rw_gap
    }

    /// Copy `dst.len()` bytes out of the ring starting at position `pos`,
    /// wrapping across block and capacity boundaries.
    ///
    /// The caller guarantees the range holds valid data.
    pub fn copy_out(&self, mut pos: usize, dst: &mut [u8]) {
        let capacity = self.capacity();
        let mut filled = 0;
        while filled < dst.len() {
            let block = pos / self.geometry.block_size;
            let offset = pos % self.geometry.block_size;
            let chunk = (self.geometry.block_size - offset).min(dst.len() - filled);
            dst[filled..filled + chunk].copy_from_slice(&self.blocks[block][offset..offset + chunk]);
            filled += chunk;
            pos = (pos + chunk) % capacity;
        }
    }

    /// Copy `src` into the ring starting at position `pos`, wrapping across
    /// block and capacity boundaries.
    pub fn copy_in(&mut self, mut pos: usize, src: &[u8]) {
        let capacity = self.capacity();
        let block_size = self.geometry.block_size;
        let mut taken = 0;
        while taken < src.len() {
            let block = pos / block_size;
            let offset = pos % block_size;
            let chunk = (block_size - offset).min(src.len() - taken);
            self.blocks[block][offset..offset + chunk].copy_from_slice(&src[taken..taken + chunk]);
            taken += chunk;
            pos = (pos + chunk) % capacity;
        }
    }

    /// Account for `n` bytes consumed from the live window.
    pub fn consume(&mut self, n: usize) {
        self.read_index = (self.read_index + n) % self.capacity();
        self.buffer_size -= n;
        self.stream_offset += n as u64;
    }

    /// Account for `n` bytes appended at `write_index`, then slide the
    /// cache window if it overflowed the capacity.
    ///
    /// The slide evicts down to `capacity - rw_gap - seek_gap`, keeping a
    /// cushion of both guard gaps free ahead of the writer, which is why
    /// `cache_size` can drop well below the capacity right after a slide.
    pub fn commit_write(&mut self, n: usize) {
        let capacity = self.capacity();
        self.write_index = (self.write_index + n) % capacity;
        self.buffer_size += n;
        self.cache_size += n;
        if self.cache_size > capacity {
            let diff = self.cache_size - self.geometry.usable();
            self.cache_index = (self.cache_index + diff) % capacity;
            self.cache_offset += diff as u64;
            self.cache_size -= diff;
        }
    }

    /// Classify the pending seek target against the cache window.
    pub fn classify_seek(&self) -> SeekClass {
        let start = self.cache_offset;
        let end = self.cache_end();
        if self.seek_pos < start || self.seek_pos >= end + self.geometry.seek_threshold {
            SeekClass::Long
        } else if self.seek_pos < end {
            SeekClass::Short
        } else {
            SeekClass::Middle
        }
    }

    /// Resolve a short seek: redirect the read index inside the cache
    /// window and recompute the live window. No source I/O.
    pub fn apply_short_seek(&mut self) {
        let capacity = self.capacity();
        let delta = (self.seek_pos - self.cache_offset) as usize;
        self.read_index = (self.cache_index + delta) % capacity;
        self.buffer_size = (self.write_index + capacity - self.read_index) % capacity;
        self.stream_offset = self.seek_pos;
        self.seek_pending = false;
        self.seek_pos = 0;
    }

    /// Resolve a long seek after the source has been reseeked: empty the
    /// ring and anchor both windows at the new offset.
    ///
    /// The anchor is `seek_pos % capacity` so every absolute offset in the
    /// new window maps to `offset % capacity`, the same alignment the ring
    /// starts with at offset 0.
    pub fn apply_long_seek(&mut self) {
        let anchor = (self.seek_pos % self.capacity() as u64) as usize;
        self.read_index = anchor;
        self.write_index = anchor;
        self.buffer_size = 0;
        self.cache_index = anchor;
        self.cache_size = 0;
        self.cache_offset = self.seek_pos;
        self.stream_offset = self.seek_pos;
        self.seek_pending = false;
        self.seek_pos = 0;
    }

    /// Drop the unread bytes of a middle seek so the producer can keep
    /// writing forward without waiting on the consumer.
    ///
    /// The seek stays pending; the target is reclassified once it has
    /// migrated into the cache window.
    pub fn drop_live_window(&mut self) {
        self.read_index = self.write_index;
        self.buffer_size = 0;
    }
}
