use std::path::{Path, PathBuf};

use import_model::ImportItem;
use import_stream::{ByteStream, FileStream, TemporaryBuffer};

use crate::error::PipelineError;

/// Writes `item`'s content to `extract_root/item.full_name`, creating
/// parent directories on demand and overwriting anything already there
/// (SPEC_FULL.md §6). When the content happens to be a file-backed
/// `TemporaryBuffer`, this is a rename rather than a copy — the same
/// "prefer rename" rule `TemporaryBuffer::move_to` already implements, so
/// this just recognizes the case and delegates to it. Returns the number
/// of bytes extracted and clears `item.content`.
pub fn extract_item(item: &mut ImportItem, extract_root: &Path) -> Result<u64, PipelineError> {
    let dest = extract_root.join(&item.full_name);
    let mut content = item
        .content
        .take()
        .ok_or_else(|| PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "extract_item called on an item with no content",
        )))?;

    if let Some(buffer) = content.as_any_mut().downcast_mut::<TemporaryBuffer>() {
        if buffer.is_file_stream() {
            let bytes = temp_buffer_size(buffer)?;
            buffer.move_to(&dest)?;
            item.output_file = Some(relative(&dest, extract_root));
            return Ok(bytes);
        }
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut sink = FileStream::create(&dest)?;
    let bytes = content.copy_to(&mut sink)?;
    sink.close()?;
    item.output_file = Some(relative(&dest, extract_root));
    Ok(bytes)
}

fn temp_buffer_size(buffer: &mut TemporaryBuffer) -> std::io::Result<u64> {
    ByteStream::size(buffer)
}

fn relative(dest: &Path, root: &Path) -> PathBuf {
    dest.strip_prefix(root).unwrap_or(dest).to_path_buf()
}

#[cfg(test)]
mod test {
    use super::*;
    use import_model::Format;
    use std::io::Write as _;

    #[test]
    fn extracts_memory_backed_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = ImportItem::new("a.txt", "sub/a.txt", Format::Text);
        let mut mem = import_stream::MemoryStream::new();
        mem.write(b"hello").unwrap();
        item.content = Some(Box::new(mem));

        let bytes = extract_item(&mut item, dir.path()).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read(dir.path().join("sub/a.txt")).unwrap(), b"hello");
        assert!(item.content.is_none());
    }

    #[test]
    fn renames_file_backed_temp_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = ImportItem::new("a.bin", "a.bin", Format::Data);
        let mut buf = TemporaryBuffer::new(dir.path(), "item", 4);
        buf.write(b"0123456789").unwrap();
        assert!(buf.is_file_stream());
        item.content = Some(Box::new(buf));

        let bytes = extract_item(&mut item, dir.path()).unwrap();
        assert_eq!(bytes, 10);
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"0123456789");
    }
}
