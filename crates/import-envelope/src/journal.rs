use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use import_stream::ByteStream;

/// 4-byte prefix marking a journal-wrapped plaintext (SPEC_FULL.md §4.4).
pub const JOURNAL_MAGIC: &[u8; 4] = b"ORCJ";

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to read journal stream: {0}")]
    Io(#[from] io::Error),
    #[error("journal record declares length {0}, which overruns the remaining input")]
    Truncated(u32),
}

/// Whether `prefix` (the start of a decoded CMS plaintext) opens with the
/// journal magic. Callers probe this before calling `replay_journal`.
pub fn is_journal_wrapped(prefix: &[u8]) -> bool {
    prefix.starts_with(JOURNAL_MAGIC)
}

/// Replays a journal-wrapped plaintext: after the magic, a sequence of
/// `(u32 record_len LE, record_len bytes)` records runs to EOF. Each
/// record's payload is written to `sink` in order, concatenated with no
/// added framing — this is the deterministic "replay" the pipeline hands
/// to the classifier as its final payload stream. Returns the total
/// number of payload bytes written.
pub fn replay_journal(plaintext: &[u8], sink: &mut dyn ByteStream) -> Result<u64, JournalError> {
    debug_assert!(is_journal_wrapped(plaintext));
    let mut cursor = Cursor::new(&plaintext[JOURNAL_MAGIC.len()..]);
    let mut total = 0u64;

    loop {
        let len = match cursor.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };

        let mut record = vec![0u8; len as usize];
        cursor.read_exact(&mut record).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                JournalError::Truncated(len)
            } else {
                JournalError::Io(err)
            }
        })?;

        sink.write(&record)?;
        total += record.len() as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use import_stream::MemoryStream;

    fn wrap(records: &[&[u8]]) -> Vec<u8> {
        let mut buf = JOURNAL_MAGIC.to_vec();
        for record in records {
            buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
            buf.extend_from_slice(record);
        }
        buf
    }

    #[test]
    fn detects_magic() {
        assert!(is_journal_wrapped(&wrap(&[b"a"])));
        assert!(!is_journal_wrapped(b"not a journal"));
    }

    #[test]
    fn replays_records_concatenated() {
        let wrapped = wrap(&[b"hello ", b"world"]);
        let mut sink = MemoryStream::new();
        let written = replay_journal(&wrapped, &mut sink).unwrap();
        assert_eq!(written, 11);
        assert_eq!(sink.as_slice(), b"hello world");
    }

    #[test]
    fn empty_journal_replays_nothing() {
        let wrapped = wrap(&[]);
        let mut sink = MemoryStream::new();
        let written = replay_journal(&wrapped, &mut sink).unwrap();
        assert_eq!(written, 0);
        assert!(sink.as_slice().is_empty());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut wrapped = JOURNAL_MAGIC.to_vec();
        wrapped.extend_from_slice(&100u32.to_le_bytes());
        wrapped.extend_from_slice(b"short");
        let mut sink = MemoryStream::new();
        let err = replay_journal(&wrapped, &mut sink).unwrap_err();
        assert!(matches!(err, JournalError::Truncated(100)));
    }
}
