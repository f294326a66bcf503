//! Upstream byte stream contract and adapters
//!
//! The filter consumes any seekable byte stream through the narrow
//! [`SourceStream`] capability set: size, seekability, current offset, a
//! blocking short-read `read`, and an absolute `seek`. Two adapters are
//! provided:
//!
//! - [`FileSource`] for regular files, with the size captured when the
//!   source is constructed
//! - [`MemorySource`] for in-memory byte buffers, mainly used by tests and
//!   demos
//!
//! [`RingBufferStream`] implements `SourceStream` itself so filters can be
//! chained where a source is expected; `is_ring_buffered` is what stops a
//! second filter from stacking on top of a first one.
//!
//! [`RingBufferStream`]: crate::RingBufferStream

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A seekable byte stream consumed by the ring filter.
///
/// Implementations must provide blocking reads with short-read semantics:
/// `read` may return fewer bytes than requested, and `Ok(0)` means end of
/// stream. Errors are terminal for the filter; it never retries.
pub trait SourceStream: Send {
    /// Total stream size in bytes.
    ///
    /// A source reporting zero disables the filter at open.
    fn size(&self) -> u64;

    /// Whether the stream supports repositioning.
    fn can_seek(&self) -> bool;

    /// Current absolute read offset.
    fn tell(&self) -> u64;

    /// Blocking read into `buf`; short reads allowed, `Ok(0)` at end of
    /// stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reposition the stream to an absolute offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// True when this stream is itself a ring buffering filter.
    ///
    /// Used to refuse stacking one filter on another.
    fn is_ring_buffered(&self) -> bool {
        false
    }
}

/// File-backed source stream.
///
/// The size is captured at construction and not re-queried, matching the
/// filter's contract of a fixed stream size over its lifetime.
pub struct FileSource {
    file: File,
    path: PathBuf,
    size: u64,
    offset: u64,
}

impl FileSource {
    /// Open a file as a source stream.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file to read
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            size,
            offset: 0,
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceStream for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn tell(&self) -> u64 {
        self.offset
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }
}

/// In-memory source stream over an owned byte vector.
pub struct MemorySource {
    data: Vec<u8>,
    offset: u64,
}

impl MemorySource {
    /// Create a source over the given bytes, positioned at offset 0.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }
}

impl SourceStream for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn tell(&self) -> u64 {
        self.offset
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len().saturating_sub(self.offset as usize);
        let n = buf.len().min(remaining);
        let start = self.offset as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.offset += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond end of source",
            ));
        }
        self.offset = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn memory_source_read_and_seek() {
        let mut source = MemorySource::new((0u8..100).collect());
        assert_eq!(source.size(), 100);
        assert!(source.can_seek());

        let mut buf = [0u8; 10];
        assert_eq!(source.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(source.tell(), 10);

        source.seek(95).unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &[95, 96, 97, 98, 99]);

        // End of stream reads return 0.
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_source_rejects_seek_past_end() {
        let mut source = MemorySource::new(vec![0u8; 10]);
        assert!(source.seek(11).is_err());
        assert_eq!(source.tell(), 0);
    }

    #[test]
    fn file_source_read_and_seek() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("source.dat");
        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&payload)
            .unwrap();

        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.size(), 2048);
        assert_eq!(source.path(), path.as_path());

        let mut buf = [0u8; 256];
        assert_eq!(source.read(&mut buf).unwrap(), 256);
        assert_eq!(&buf[..], &payload[..256]);
        assert_eq!(source.tell(), 256);

        source.seek(1024).unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 256);
        assert_eq!(&buf[..], &payload[1024..1280]);
    }
}
