use std::io;

use import_stream::ByteStream;

/// A `ByteStream` over a borrowed `Vec<u8>`, used as a `copy_to`
/// destination when a stage needs the whole payload materialized (CMS
/// decoding, CSV parsing) rather than streamed record-by-record.
pub struct VecSink<'a>(pub &'a mut Vec<u8>);

impl ByteStream for VecSink<'_> {
    fn is_open(&self) -> bool {
        true
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
        Err(io::Error::new(io::ErrorKind::Unsupported, "write-only"))
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        std::io::Write::write(&mut self.0, buf)
    }
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"))
    }
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.0.len() as u64)
    }
    fn set_size(&mut self, n: u64) -> io::Result<()> {
        self.0.resize(n as usize, 0);
        Ok(())
    }
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads the whole remaining content of `stream` into a `Vec<u8>`,
/// rewinding first so it works whether or not the caller already
/// consumed part of the stream.
pub fn read_all(stream: &mut dyn ByteStream) -> io::Result<Vec<u8>> {
    stream.seek(io::SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    let mut sink = VecSink(&mut buf);
    stream.copy_to(&mut sink)?;
    Ok(buf)
}
