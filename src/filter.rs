//! The ring buffering stream filter
//!
//! [`RingBufferStream`] wraps a [`SourceStream`] and exposes the same
//! byte-stream contract to a downstream consumer: sequential `read`, `peek`
//! without advancing, and repositioning through `set_position`. A producer
//! thread, spawned at open and joined at close, reads the source ahead of
//! the consumer into the shared ring.
//!
//! Consumer calls are serialized by the state mutex. `read` and the control
//! queries take `&self` so the host may close the filter, or post a seek,
//! while a read is blocked waiting for data; `peek` takes `&mut self`
//! because the returned view borrows the filter's scratch buffer and is
//! only valid until the next call.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{OpenError, Result, RingError};
use crate::producer::Producer;
use crate::ring::shared::Shared;
use crate::ring::RingState;
use crate::source::SourceStream;
use crate::RingConfig;

/// Buffered read-ahead filter over a seekable byte stream.
///
/// Create with [`RingBufferStream::open`]; dropping the filter (or calling
/// [`RingBufferStream::close`]) stops and joins the producer thread.
pub struct RingBufferStream {
    shared: Arc<Shared>,
    producer: Mutex<Option<JoinHandle<()>>>,
    stream_size: u64,
    can_seek: bool,
    /// Largest live window the ring can hold; read and peek requests are
    /// truncated to this.
    usable: usize,
    peek_scratch: Vec<u8>,
}

impl RingBufferStream {
    /// Wrap `source` in a ring buffering filter and start the producer.
    ///
    /// # Arguments
    ///
    /// * `source` - The seekable byte stream to buffer
    /// * `config` - Filter configuration; `config.enabled` must be set
    ///
    /// # Errors
    ///
    /// Returns an [`OpenError`] when the filter is disabled, the source has
    /// no usable size or is already ring buffered, the geometry is invalid,
    /// or allocating the ring / spawning the producer fails. The filter is
    /// not installed in any of these cases.
    pub fn open<S>(source: S, config: &RingConfig) -> std::result::Result<Self, OpenError>
    where
        S: SourceStream + 'static,
    {
        if !config.enabled {
            info!("ring buffering disabled, filter bypassed");
            return Err(OpenError::Disabled);
        }
        if source.is_ring_buffered() {
            warn!("source is already ring buffered, refusing to stack");
            return Err(OpenError::AlreadyBuffered);
        }

        let stream_size = source.size();
        if stream_size == 0 {
            warn!("source stream has unknown size, filter bypassed");
            return Err(OpenError::UnknownSize);
        }
        let can_seek = source.can_seek();

        let geometry = config.geometry()?;
        let state = RingState::new(geometry)?;
        let shared = Arc::new(Shared::new(state, config.poll_interval));

        let producer = Producer::new(source, Arc::clone(&shared), stream_size, config.read_step);
        let handle = thread::Builder::new()
            .name("ring-stream-producer".to_string())
            .spawn(move || producer.run())?;

        info!(
            size = stream_size,
            can_seek,
            capacity = geometry.capacity(),
            "ring stream filter loaded"
        );
        Ok(Self {
            shared,
            producer: Mutex::new(Some(handle)),
            stream_size,
            can_seek,
            usable: geometry.usable(),
            peek_scratch: Vec::new(),
        })
    }

    /// Read sequential bytes into `dst`, blocking until enough data is
    /// buffered.
    ///
    /// # Returns
    ///
    /// The number of bytes copied. Short counts (including zero) occur only
    /// at end of stream; requests larger than the ring's usable window are
    /// truncated to it.
    ///
    /// # Errors
    ///
    /// [`RingError::Interrupted`] once the filter is closed or the source
    /// has failed.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        let want = dst.len().min(self.usable);
        let mut state = self.shared.lock();
        let n = self.shared.read_from_ring(&mut state, &mut dst[..want])?;
        if n < want {
            debug!(requested = want, copied = n, "short read at end of stream");
        }
        Ok(n)
    }

    /// Look at upcoming bytes without consuming them.
    ///
    /// The returned view is contiguous even when the bytes wrap around the
    /// ring, and stays valid until the next call on the filter. Requests
    /// larger than the ring's usable window are truncated to it; the view
    /// may also be shorter at end of stream. `peek(0)` returns an empty
    /// view immediately.
    ///
    /// # Errors
    ///
    /// [`RingError::Interrupted`] once the filter is closed or the source
    /// has failed; [`RingError::ScratchAlloc`] when growing the scratch
    /// buffer fails, leaving shared state untouched.
    pub fn peek(&mut self, want: usize) -> Result<&[u8]> {
        if want == 0 {
            return Ok(&[]);
        }
        let want = want.min(self.usable);
        if self.peek_scratch.len() < want {
            let grow = want - self.peek_scratch.len();
            self.peek_scratch.try_reserve(grow)?;
            self.peek_scratch.resize(want, 0);
        }

        let n = {
            let mut state = self.shared.lock();
            self.shared.peek_from_ring(&mut state, &mut self.peek_scratch[..want])?
        };
        Ok(&self.peek_scratch[..n])
    }

    /// Fast seeking is never advertised, regardless of the source.
    pub fn can_fastseek(&self) -> bool {
        false
    }

    /// Whether the source supports repositioning, captured at open.
    pub fn can_seek(&self) -> bool {
        self.can_seek
    }

    /// Total stream size in bytes, captured at open.
    pub fn size(&self) -> u64 {
        self.stream_size
    }

    /// Current consumer position.
    ///
    /// While a seek is pending this is the requested target; afterwards it
    /// advances with every consumed byte.
    pub fn position(&self) -> u64 {
        let state = self.shared.lock();
        if state.seek_pending {
            state.seek_pos
        } else {
            state.stream_offset
        }
    }

    /// Highest stream offset reachable without blocking.
    pub fn cached_size(&self) -> u64 {
        let state = self.shared.lock();
        state.stream_offset + state.buffer_size as u64
    }

    /// Request a reposition to absolute offset `pos`.
    ///
    /// Does not block: the request is posted and resolved by the producer.
    /// A request posted while another is still pending replaces it.
    ///
    /// # Errors
    ///
    /// [`RingError::Unseekable`] when the source cannot seek.
    pub fn set_position(&self, pos: u64) -> Result<()> {
        if !self.can_seek {
            return Err(RingError::Unseekable);
        }
        let mut state = self.shared.lock();
        debug!(seek_pos = pos, replaced = state.seek_pending, "seek requested");
        state.seek_pos = pos;
        state.seek_pending = true;
        self.shared.notify_writers();
        Ok(())
    }

    /// Stop the producer and join it. Called automatically on drop;
    /// idempotent.
    ///
    /// Any consumer call blocked in a wait observes the abort within one
    /// poll interval and returns [`RingError::Interrupted`].
    pub fn close(&self) {
        let handle = self.producer.lock().take();
        if let Some(handle) = handle {
            info!("closing ring stream filter");
            self.shared.set_abort();
            {
                let _state = self.shared.lock();
                self.shared.notify_writers();
                self.shared.notify_readers();
            }
            let _ = handle.join();
            debug!("producer joined");
        }
    }
}

impl Drop for RingBufferStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// The filter satisfies the source contract itself, so it can stand where
/// a source is expected. `is_ring_buffered` is what keeps a second filter
/// from stacking on top.
impl SourceStream for RingBufferStream {
    fn size(&self) -> u64 {
        self.stream_size
    }

    fn can_seek(&self) -> bool {
        self.can_seek
    }

    fn tell(&self) -> u64 {
        self.position()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RingBufferStream::read(self, buf).map_err(io::Error::from)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.set_position(offset).map_err(io::Error::from)
    }

    fn is_ring_buffered(&self) -> bool {
        true
    }
}

impl io::Read for RingBufferStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RingBufferStream::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Seek for RingBufferStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => offset,
            io::SeekFrom::End(delta) => offset_by(self.stream_size, delta)?,
            io::SeekFrom::Current(delta) => offset_by(self.position(), delta)?,
        };
        self.set_position(target)?;
        Ok(target)
    }
}

fn offset_by(base: u64, delta: i64) -> io::Result<u64> {
    let target = if delta < 0 {
        base.checked_sub(delta.unsigned_abs())
    } else {
        base.checked_add(delta as u64)
    };
    target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek position out of range"))
}
