//! Background producer filling the ring from the source
//!
//! A single thread owns the source stream and runs one control cycle per
//! iteration:
//!
//! 1. EOF check: once the source position reaches the stream size, mark the
//!    end of stream as buffered
//! 2. EOS park: idle on the writer condition until a seek arrives or the
//!    filter shuts down; leaving the park clears the buffered-EOS mark
//! 3. Seek resolution: classify a pending request against the cache window
//!    as short, middle, or long and resolve it
//! 4. One read step: pull up to `read_step` bytes from the source and append
//!    them to the ring
//!
//! The long-seek source reseek happens with the state mutex released; the
//! resolution is applied only if the pending target is unchanged afterwards,
//! so a newer request restarts classification instead of being mixed with a
//! stale reseek. Source read or seek failures are terminal: the error flag
//! is set and the loop exits.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ring::shared::Shared;
use crate::ring::SeekClass;
use crate::source::SourceStream;

pub(crate) struct Producer<S> {
    source: S,
    shared: Arc<Shared>,
    stream_size: u64,
    read_step: usize,
}

impl<S: SourceStream> Producer<S> {
    pub fn new(source: S, shared: Arc<Shared>, stream_size: u64, read_step: usize) -> Self {
        Self {
            source,
            shared,
            stream_size,
            read_step,
        }
    }

    /// Thread body. Runs until close aborts the filter, the source fails,
    /// or a seek resolution fails.
    pub fn run(mut self) {
        debug!(size = self.stream_size, step = self.read_step, "producer started");
        let mut chunk = vec![0u8; self.read_step];

        loop {
            if self.shared.interrupted() {
                break;
            }

            self.check_source_eof();

            if !self.park_at_eos() {
                break;
            }

            if !self.resolve_seek() {
                break;
            }

            if !self.step_read(&mut chunk) {
                break;
            }
        }

        // Terminal: whatever is buffered is all there will ever be.
        let mut state = self.shared.lock();
        state.buffered_eos = true;
        self.shared.notify_readers();
        debug!("producer exited");
    }

    /// Mark the end of stream once the source position reaches the size.
    fn check_source_eof(&mut self) {
        if self.source.tell() < self.stream_size {
            return;
        }
        let mut state = self.shared.lock();
        if !state.buffered_eos {
            info!(offset = self.source.tell(), "buffered to end of stream");
            state.buffered_eos = true;
            self.shared.notify_readers();
        }
    }

    /// Idle at end of stream until a seek request or shutdown.
    ///
    /// # Returns
    ///
    /// `false` when the producer must exit.
    fn park_at_eos(&self) -> bool {
        let mut state = self.shared.lock();
        if !state.buffered_eos {
            return true;
        }
        info!("end of stream, waiting for seek or close");
        while !self.shared.interrupted() && !state.seek_pending {
            self.shared.wait_writer(&mut state);
        }
        if self.shared.interrupted() {
            return false;
        }
        // A seek is the sole exit; the loop resumes reading after it.
        state.buffered_eos = false;
        true
    }

    /// Classify and resolve a pending seek request.
    ///
    /// Short and middle seeks complete without source I/O; a middle seek
    /// stays pending so the next iteration reclassifies it after more data
    /// has been read through. A long seek reseeks the source off-lock.
    ///
    /// # Returns
    ///
    /// `false` when the producer must exit.
    fn resolve_seek(&mut self) -> bool {
        let target = {
            let mut state = self.shared.lock();
            if !state.seek_pending {
                return true;
            }
            let target = state.seek_pos;
            match state.classify_seek() {
                SeekClass::Short => {
                    info!(
                        seek_pos = target,
                        start = state.cache_offset,
                        end = state.cache_end(),
                        "short seek inside cache window"
                    );
                    state.apply_short_seek();
                    self.shared.notify_readers();
                    return true;
                }
                SeekClass::Middle => {
                    if state.cache_end() >= self.stream_size {
                        // Nothing left to read through; resolve like a long
                        // seek so the request terminates instead of spinning
                        // at end of stream.
                        info!(seek_pos = target, "middle seek at end of stream, resolving as long");
                        target
                    } else {
                        debug!(
                            seek_pos = target,
                            start = state.cache_offset,
                            end = state.cache_end(),
                            "middle seek ahead of cache window, reading through"
                        );
                        state.drop_live_window();
                        return true;
                    }
                }
                SeekClass::Long => {
                    info!(
                        seek_pos = target,
                        start = state.cache_offset,
                        end = state.cache_end(),
                        "long seek outside cache window"
                    );
                    target
                }
            }
        };

        debug!(seek_pos = target, "reseeking source");
        if let Err(e) = self.source.seek(target) {
            warn!(seek_pos = target, error = %e, "source seek failed");
            self.fail();
            return false;
        }

        let mut state = self.shared.lock();
        // The lock was released around the reseek; apply only if no newer
        // request replaced the target in the meantime.
        if state.seek_pending && state.seek_pos == target {
            state.apply_long_seek();
            self.shared.notify_readers();
        }
        true
    }

    /// Read one step from the source and append it to the ring.
    ///
    /// # Returns
    ///
    /// `false` when the producer must exit.
    fn step_read(&mut self, chunk: &mut [u8]) -> bool {
        let n = match self.source.read(chunk) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "source read failed");
                self.fail();
                return false;
            }
        };

        let mut state = self.shared.lock();
        if n > 0 && self.shared.write_to_ring(&mut state, &chunk[..n]).is_err() {
            return false;
        }
        if n < chunk.len() && !state.buffered_eos {
            info!(bytes = n, "short source read, stream end buffered");
            state.buffered_eos = true;
            self.shared.notify_readers();
        }
        true
    }

    /// Record a terminal source failure and release both sides.
    fn fail(&self) {
        self.shared.set_error();
        let _state = self.shared.lock();
        self.shared.notify_readers();
        self.shared.notify_writers();
    }
}
