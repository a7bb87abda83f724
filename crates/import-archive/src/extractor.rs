use std::io::{self, Read, Seek, SeekFrom};

use import_stream::ByteStream;
use tracing::warn;

use crate::format::ArchiveFormat;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to read archive: {0}")]
    Io(#[from] io::Error),
    #[error("failed to open zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("unrecognized archive format")]
    UnrecognizedFormat,
}

/// Callbacks the archive walker drives once per member (SPEC_FULL.md
/// §4.3). Kept as a trait rather than a closure bundle so a single
/// implementer can hold open-ended per-archive state (e.g. a running
/// count of bytes extracted, or a handle back to the orchestrator's
/// notification channel).
pub trait Extractor {
    /// Opens the archive's own byte source. Called once per `extract`
    /// call.
    fn open_input(&mut self) -> io::Result<Box<dyn ByteStream>>;

    /// Whether `name_in_archive` should be extracted at all. Directories
    /// are never offered to this callback.
    fn should_extract(&mut self, name_in_archive: &str) -> bool;

    /// Opens the destination stream for an accepted member, called once
    /// before that member's first write.
    fn sink_for(&mut self, name_in_archive: &str) -> io::Result<Box<dyn ByteStream>>;

    /// Called once per accepted member after its last write.
    fn on_complete(&mut self, name_in_archive: &str, sink: Box<dyn ByteStream>);

    /// Called when a member fails to extract. The default logs and
    /// moves on; per SPEC_FULL.md §4.3 a per-entry failure must not
    /// abort extraction of its siblings.
    fn on_entry_failed(&mut self, name_in_archive: &str, err: &ArchiveError) {
        warn!(name = name_in_archive, error = %err, "archive member failed to extract");
    }
}

/// Adapts a `ByteStream` to `std::io::{Read, Seek}` so it can back a
/// `zip::ZipArchive`, which needs random access into the central
/// directory.
struct StdIoAdapter<'a> {
    inner: &'a mut dyn ByteStream,
}

impl Read for StdIoAdapter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for StdIoAdapter<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Walks every member of the archive `extractor.open_input()` provides,
/// extracting the ones `should_extract` accepts. Returns once every
/// member has been offered; a single member's failure is reported to
/// `on_entry_failed` and does not stop the walk.
pub fn extract(format: ArchiveFormat, extractor: &mut dyn Extractor) -> Result<(), ArchiveError> {
    match format {
        ArchiveFormat::Zip => extract_zip(extractor),
        ArchiveFormat::Unknown => Err(ArchiveError::UnrecognizedFormat),
    }
}

fn extract_zip(extractor: &mut dyn Extractor) -> Result<(), ArchiveError> {
    let mut input = extractor.open_input()?;
    let mut archive = {
        let adapter = StdIoAdapter {
            inner: input.as_mut(),
        };
        zip::ZipArchive::new(adapter)?
    };

    for i in 0..archive.len() {
        // Re-borrow per iteration: `ZipFile` holds a mutable borrow of
        // `archive`, and `should_extract`/`sink_for` are free to use
        // `extractor` in between.
        let name = {
            let Ok(entry) = archive.by_index(i) else {
                continue;
            };
            if entry.is_dir() {
                continue;
            }
            entry.name().to_string()
        };

        if !extractor.should_extract(&name) {
            continue;
        }

        if let Err(err) = extract_one(&mut archive, i, &name, extractor) {
            extractor.on_entry_failed(&name, &err);
        }
    }

    Ok(())
}

fn extract_one(
    archive: &mut zip::ZipArchive<StdIoAdapter<'_>>,
    index: usize,
    name: &str,
    extractor: &mut dyn Extractor,
) -> Result<(), ArchiveError> {
    let mut entry = archive.by_index(index)?;
    let mut sink = extractor.sink_for(name)?;

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = entry.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.write(&buf[..n])?;
    }

    extractor.on_complete(name, sink);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use import_stream::{FileStream, MemoryStream};
    use std::collections::HashMap;
    use std::io::Write as _;

    fn build_test_zip() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.start_file("A/B", options).unwrap();
            writer.write_all(b"hello from archive member").unwrap();
            writer.add_directory("A/", options).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    struct TestExtractor {
        zip_bytes: Vec<u8>,
        outputs: HashMap<String, MemoryStream>,
    }

    impl Extractor for TestExtractor {
        fn open_input(&mut self) -> io::Result<Box<dyn ByteStream>> {
            Ok(Box::new(MemoryStream::from_vec(self.zip_bytes.clone())))
        }

        fn should_extract(&mut self, name_in_archive: &str) -> bool {
            name_in_archive == "A/B"
        }

        fn sink_for(&mut self, _name_in_archive: &str) -> io::Result<Box<dyn ByteStream>> {
            Ok(Box::new(MemoryStream::new()))
        }

        fn on_complete(&mut self, name_in_archive: &str, sink: Box<dyn ByteStream>) {
            let mut mem = MemoryStream::new();
            let bytes = {
                let mut sink = sink;
                let mut out = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = sink.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                out
            };
            mem.write(&bytes).unwrap();
            self.outputs.insert(name_in_archive.to_string(), mem);
        }
    }

    #[test]
    fn extracts_accepted_members_only() {
        let mut extractor = TestExtractor {
            zip_bytes: build_test_zip(),
            outputs: HashMap::new(),
        };
        extract(ArchiveFormat::Zip, &mut extractor).unwrap();
        assert_eq!(extractor.outputs.len(), 1);
        assert_eq!(
            extractor.outputs["A/B"].as_slice(),
            b"hello from archive member"
        );
    }

    #[test]
    fn unrecognized_format_errors_without_touching_input() {
        let mut extractor = TestExtractor {
            zip_bytes: Vec::new(),
            outputs: HashMap::new(),
        };
        let err = extract(ArchiveFormat::Unknown, &mut extractor).unwrap_err();
        assert!(matches!(err, ArchiveError::UnrecognizedFormat));
    }

    #[test]
    fn sibling_failure_does_not_abort_walk() {
        struct FailingSinkExtractor {
            zip_bytes: Vec<u8>,
            fail_next: bool,
            completed: Vec<String>,
        }
        impl Extractor for FailingSinkExtractor {
            fn open_input(&mut self) -> io::Result<Box<dyn ByteStream>> {
                Ok(Box::new(MemoryStream::from_vec(self.zip_bytes.clone())))
            }
            fn should_extract(&mut self, _name_in_archive: &str) -> bool {
                true
            }
            fn sink_for(&mut self, _name_in_archive: &str) -> io::Result<Box<dyn ByteStream>> {
                if self.fail_next {
                    self.fail_next = false;
                    Err(io::Error::new(io::ErrorKind::Other, "synthetic failure"))
                } else {
                    Ok(Box::new(MemoryStream::new()))
                }
            }
            fn on_complete(&mut self, name_in_archive: &str, _sink: Box<dyn ByteStream>) {
                self.completed.push(name_in_archive.to_string());
            }
        }

        let mut buf = Vec::new();
        {
            let cursor = io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.start_file("one.txt", options).unwrap();
            writer.write_all(b"one").unwrap();
            writer.start_file("two.txt", options).unwrap();
            writer.write_all(b"two").unwrap();
            writer.finish().unwrap();
        }

        let mut extractor = FailingSinkExtractor {
            zip_bytes: buf,
            fail_next: true,
            completed: Vec::new(),
        };
        extract(ArchiveFormat::Zip, &mut extractor).unwrap();
        assert_eq!(extractor.completed, vec!["two.txt".to_string()]);
    }

    #[test]
    fn file_stream_input_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.zip");
        std::fs::write(&path, build_test_zip()).unwrap();

        struct FileExtractor {
            path: std::path::PathBuf,
            seen: Vec<String>,
        }
        impl Extractor for FileExtractor {
            fn open_input(&mut self) -> io::Result<Box<dyn ByteStream>> {
                Ok(Box::new(FileStream::open_read(&self.path)?))
            }
            fn should_extract(&mut self, _name_in_archive: &str) -> bool {
                true
            }
            fn sink_for(&mut self, _name_in_archive: &str) -> io::Result<Box<dyn ByteStream>> {
                Ok(Box::new(MemoryStream::new()))
            }
            fn on_complete(&mut self, name_in_archive: &str, _sink: Box<dyn ByteStream>) {
                self.seen.push(name_in_archive.to_string());
            }
        }

        let mut extractor = FileExtractor {
            path,
            seen: Vec::new(),
        };
        extract(ArchiveFormat::Zip, &mut extractor).unwrap();
        assert_eq!(extractor.seen, vec!["A/B".to_string()]);
    }
}
