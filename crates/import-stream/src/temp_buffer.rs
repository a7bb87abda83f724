use std::fs;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use crate::stream::{ByteStream, FileStream, MemoryStream};

enum Backing {
    Memory(MemoryStream),
    File(FileStream),
}

/// A stream that starts in memory and transparently migrates to a named
/// temp file once `threshold` bytes have been written (SPEC_FULL.md §4.2).
/// Every migration happens inside `maybe_migrate`, which runs before any
/// write that would grow the buffer past the threshold — so the
/// migration is atomic from the caller's point of view: either the whole
/// write landed in memory, or the whole buffer (old bytes plus the new
/// write) landed on disk.
pub struct TemporaryBuffer {
    backing: Backing,
    threshold: u64,
    temp_dir: PathBuf,
    name_hint: String,
}

impl TemporaryBuffer {
    pub fn new(temp_dir: impl Into<PathBuf>, name_hint: impl Into<String>, threshold: u64) -> Self {
        TemporaryBuffer {
            backing: Backing::Memory(MemoryStream::new()),
            threshold,
            temp_dir: temp_dir.into(),
            name_hint: name_hint.into(),
        }
    }

    pub fn is_memory_stream(&self) -> bool {
        matches!(self.backing, Backing::Memory(_))
    }

    pub fn is_file_stream(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    /// Path of the backing temp file, once migrated. `None` while still
    /// memory-backed.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(f) => Some(f.path()),
            Backing::Memory(_) => None,
        }
    }

    fn migrate_to_file(&mut self) -> io::Result<()> {
        let Backing::Memory(mem) = &mut self.backing else {
            return Ok(());
        };
        let path = self
            .temp_dir
            .join(format!("{}-{}.tmp", self.name_hint, uuid::Uuid::new_v4()));
        let mut file = FileStream::create(&path)?;
        file.write(mem.as_slice())?;
        let pos = 0u64; // existing content is fully flushed; position resets are the caller's job
        let _ = pos;
        self.backing = Backing::File(file);
        Ok(())
    }

    /// Renames the backing temp file to `dest`. Only valid once the
    /// buffer has migrated to a file (`is_file_stream() == true`); an
    /// in-memory instance returns `Err`. Uses `std::fs::rename` when
    /// `dest` is on the same volume (the common case, and the only case
    /// that's actually a rename rather than a copy); falls back to
    /// copy-then-delete across volumes.
    pub fn move_to(&mut self, dest: impl AsRef<Path>) -> io::Result<()> {
        let dest = dest.as_ref();
        let Backing::File(file) = &mut self.backing else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot move_to an in-memory TemporaryBuffer; only a file-backed one",
            ));
        };
        file.close()?;
        let src = file.path().to_path_buf();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(&src, dest) {
            Ok(()) => {}
            Err(err) if is_cross_device(&err) => {
                fs::copy(&src, dest)?;
                fs::remove_file(&src)?;
            }
            Err(err) => return Err(err),
        }
        *file = FileStream::open_read(dest)?;
        Ok(())
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc_exdev())
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV, stable across unix targets; avoids a libc dependency for one constant.
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    // On Windows, std maps ERROR_NOT_SAME_DEVICE to `Other`/`Uncategorized`
    // with no stable raw code to match on; treat any rename failure as
    // potentially cross-volume and fall back to copy, which is always
    // correct even when it wasn't actually necessary.
    true
}

impl ByteStream for TemporaryBuffer {
    fn is_open(&self) -> bool {
        match &self.backing {
            Backing::Memory(_) => true,
            Backing::File(f) => f.is_open(),
        }
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
        match &mut self.backing {
            Backing::Memory(m) => m.read(buf),
            Backing::File(f) => f.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_memory_stream() && self.size()? + buf.len() as u64 > self.threshold {
            self.migrate_to_file()?;
            // Position the file at its end, matching the memory
            // stream's implicit append-at-write-cursor behavior for a
            // buffer that was only ever written to, never seeked.
            let size = ByteStream::size(self)?;
            ByteStream::seek(self, SeekFrom::Start(size))?;
        }
        match &mut self.backing {
            Backing::Memory(m) => m.write(buf),
            Backing::File(f) => f.write(buf),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Memory(m) => m.seek(pos),
            Backing::File(f) => f.seek(pos),
        }
    }

    fn size(&mut self) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Memory(m) => m.size(),
            Backing::File(f) => f.size(),
        }
    }

    fn set_size(&mut self, n: u64) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(m) => m.set_size(n),
            Backing::File(f) => f.set_size(n),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(_) => Ok(()),
            Backing::File(f) => f.close(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stays_in_memory_under_threshold() {
        let mut buf = TemporaryBuffer::new(std::env::temp_dir(), "test", 1024);
        buf.write(b"small").unwrap();
        assert!(buf.is_memory_stream());
    }

    #[test]
    fn migrates_to_file_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = TemporaryBuffer::new(dir.path(), "test", 8);
        buf.write(b"01234567").unwrap();
        assert!(buf.is_memory_stream());
        buf.write(b"8").unwrap();
        assert!(buf.is_file_stream());
    }

    #[test]
    fn move_to_requires_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = TemporaryBuffer::new(dir.path(), "test", 1024);
        buf.write(b"hi").unwrap();
        assert!(buf.move_to(dir.path().join("out.bin")).is_err());
    }

    #[test]
    fn move_to_renames_file_backed_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = TemporaryBuffer::new(dir.path(), "test", 4);
        buf.write(b"0123456789").unwrap();
        assert!(buf.is_file_stream());
        let dest = dir.path().join("final.bin");
        buf.move_to(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
    }
}
