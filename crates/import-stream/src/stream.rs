use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Unified random-access read/write capability set over files, memory
/// buffers, spill-to-disk temporary buffers, and decoder adapters
/// (SPEC_FULL.md §4.1). Rather than one polymorphic class with an
/// inheritance hierarchy, this is a capability-query trait: every
/// implementation answers `can_read`/`can_write`/`can_seek` honestly, and
/// callers that need a capability they don't have get an `io::Error` at
/// the call site, not a runtime type check.
pub trait ByteStream: Send + std::any::Any {
    fn is_open(&self) -> bool;
    fn can_read(&self) -> bool;
    fn can_write(&self) -> bool;
    fn can_seek(&self) -> bool;

    /// Downcast hook so a stage that needs to know "is this really a
    /// file-backed `TemporaryBuffer`, so I can rename instead of copy"
    /// can ask, without `ByteStream` itself growing a variant tag.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn size(&mut self) -> io::Result<u64>;
    fn set_size(&mut self, n: u64) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;

    /// Streams the remainder of `self` into `dest`, returning the number
    /// of bytes copied. The default implementation is a plain read/write
    /// loop; implementations that can do better (e.g. `std::fs::copy`
    /// between two file-backed streams) should override it.
    fn copy_to(&mut self, dest: &mut dyn ByteStream) -> io::Result<u64> {
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dest.write(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }
}

/// A file-backed stream, opened with explicit desired-access flags so
/// that read-only archive inputs can't accidentally be written to.
pub struct FileStream {
    file: Option<File>,
    path: PathBuf,
    readable: bool,
    writable: bool,
}

impl FileStream {
    pub fn open_read(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok(FileStream {
            file: Some(file),
            path,
            readable: true,
            writable: false,
        })
    }

    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(FileStream {
            file: Some(file),
            path,
            readable: true,
            writable: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStream for FileStream {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }
    fn can_read(&self) -> bool {
        self.readable
    }
    fn can_write(&self) -> bool {
        self.writable
    }
    fn can_seek(&self) -> bool {
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(closed_err)?
            .read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(closed_err)?
            .write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.as_mut().ok_or_else(closed_err)?.seek(pos)
    }

    fn size(&mut self) -> io::Result<u64> {
        self.file.as_ref().ok_or_else(closed_err)?.metadata().map(|m| m.len())
    }

    fn set_size(&mut self, n: u64) -> io::Result<()> {
        self.file.as_ref().ok_or_else(closed_err)?.set_len(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.take();
        Ok(())
    }

    fn copy_to(&mut self, dest: &mut dyn ByteStream) -> io::Result<u64> {
        // No special-case fast path: `dest` is a trait object, so we
        // can't tell at compile time whether it's another `FileStream`.
        // The read/write loop in the default impl is what actually runs;
        // this override exists only to document that choice.
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dest.write(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }
}

/// An auto-growing in-memory stream.
pub struct MemoryStream {
    cursor: Cursor<Vec<u8>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        MemoryStream {
            cursor: Cursor::new(Vec::new()),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        MemoryStream {
            cursor: Cursor::new(data),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.cursor.get_ref().as_slice()
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStream for MemoryStream {
    fn is_open(&self) -> bool {
        true
    }
    fn can_read(&self) -> bool {
        true
    }
    fn can_write(&self) -> bool {
        true
    }
    fn can_seek(&self) -> bool {
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn set_size(&mut self, n: u64) -> io::Result<()> {
        self.cursor.get_mut().resize(n as usize, 0);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn closed_err() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream is closed")
}
