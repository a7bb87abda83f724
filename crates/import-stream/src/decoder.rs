use std::io::{self, SeekFrom};

use crate::stream::ByteStream;

/// A byte-to-byte transform applied as data is written through a
/// `DecoderStream`. `import-envelope`'s CMS decryptor and journal
/// replayer are both `Transform`s: the caller writes ciphertext (or
/// journal-wrapped plaintext) and the wrapped sink receives plaintext
/// (or replayed records).
pub trait Transform: Send {
    /// Consumes `input`, returning the bytes that should be written to
    /// the wrapped sink. May buffer internally (e.g. to accumulate a
    /// full CMS `SignedData` before it can be parsed) and return an
    /// empty vec until enough input has accumulated.
    fn transform(&mut self, input: &[u8]) -> io::Result<Vec<u8>>;

    /// Called once after the last `transform`, to flush any buffered
    /// trailing output.
    fn finish(&mut self) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Adapts a write-only sink stream by running every write through a
/// `Transform` first (SPEC_FULL.md §4.1's "decoder-adapter"
/// implementation). Not seekable or readable — it exists purely to sit
/// between a producer and a sink during a single forward pass.
pub struct DecoderStream<T: Transform> {
    transform: T,
    sink: Box<dyn ByteStream>,
    finished: bool,
}

impl<T: Transform> DecoderStream<T> {
    pub fn new(transform: T, sink: Box<dyn ByteStream>) -> Self {
        DecoderStream {
            transform,
            sink,
            finished: false,
        }
    }

    /// Flushes any buffered trailing output and returns the wrapped
    /// sink. Must be called after the last `write` to guarantee every
    /// byte has been flushed through.
    pub fn finish(mut self) -> io::Result<Box<dyn ByteStream>> {
        if !self.finished {
            let tail = self.transform.finish()?;
            if !tail.is_empty() {
                self.sink.write(&tail)?;
            }
            self.finished = true;
        }
        Ok(self.sink)
    }
}

impl<T: Transform + 'static> ByteStream for DecoderStream<T> {
    fn is_open(&self) -> bool {
        !self.finished
    }
    fn can_read(&self) -> bool {
        false
    }
    fn can_write(&self) -> bool {
        true
    }
    fn can_seek(&self) -> bool {
        false
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "DecoderStream is write-only",
        ))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let out = self.transform.transform(buf)?;
        if !out.is_empty() {
            self.sink.write(&out)?;
        }
        Ok(buf.len())
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "DecoderStream is not seekable",
        ))
    }

    fn size(&mut self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "DecoderStream has no fixed size",
        ))
    }

    fn set_size(&mut self, _n: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "DecoderStream has no fixed size",
        ))
    }

    fn close(&mut self) -> io::Result<()> {
        self.sink.close()
    }
}
