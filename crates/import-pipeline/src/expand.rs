use std::io;
use std::path::PathBuf;

use import_archive::{archive_format_for, child_names, extract, ArchiveError, Extractor};
use import_model::ImportItem;
use import_stream::{ByteStream, FileStream, TemporaryBuffer};

use crate::format_detect::detect_format_with_magic;

pub(crate) const SPILL_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Expands an `Archive` item classified `Expand`: walks every member and
/// hands each one, built into a fresh `ImportItem` per the naming rule
/// (SPEC_FULL.md §4.3), to `on_child`. All members are offered — filtering
/// by definition table happens after naming, via classification of the
/// child, not before extraction.
pub fn expand_item(
    item: &ImportItem,
    content: Box<dyn ByteStream>,
    temp_dir: &std::path::Path,
    on_child: &mut dyn FnMut(ImportItem),
) -> Result<(), ArchiveError> {
    let format = archive_format_for(&item.name);
    let mut walker = ArchiveWalker {
        input: Some(content),
        parent: item,
        temp_dir: temp_dir.to_path_buf(),
        on_child,
    };
    extract(format, &mut walker)
}

struct ArchiveWalker<'a> {
    input: Option<Box<dyn ByteStream>>,
    parent: &'a ImportItem,
    temp_dir: PathBuf,
    on_child: &'a mut dyn FnMut(ImportItem),
}

impl Extractor for ArchiveWalker<'_> {
    fn open_input(&mut self) -> io::Result<Box<dyn ByteStream>> {
        self.input.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "archive input already consumed")
        })
    }

    fn should_extract(&mut self, _name_in_archive: &str) -> bool {
        true
    }

    fn sink_for(&mut self, name_in_archive: &str) -> io::Result<Box<dyn ByteStream>> {
        Ok(Box::new(TemporaryBuffer::new(
            &self.temp_dir,
            sanitize_hint(name_in_archive),
            SPILL_THRESHOLD,
        )))
    }

    fn on_complete(&mut self, name_in_archive: &str, mut sink: Box<dyn ByteStream>) {
        let (name, full_name) = child_names(self.parent, name_in_archive);
        let size = ByteStream::size(sink.as_mut()).unwrap_or(0);
        ByteStream::seek(sink.as_mut(), io::SeekFrom::Start(0)).ok();

        let mut prefix = [0u8; 16];
        let n = peek_prefix(sink.as_mut(), &mut prefix);
        let format = detect_format_with_magic(&name, &prefix[..n]);

        let mut child = ImportItem::new(name, full_name, format);
        // Every produced member is marked `prefix_sub_item` regardless of
        // the parent's own flag, so that if this child is itself a nested
        // archive, *its* children chain off its full_name (dir + stem)
        // instead of restarting from a bare name (original_source
        // ImportAgent.cpp's `MakeWriteStream`: `output_item.bPrefixSubItem
        // = true` is unconditional).
        child.prefix_sub_item = true;
        child.input_file = self.parent.input_file.clone();
        child.computer_name = self.parent.computer_name.clone();
        child.system_type = self.parent.system_type.clone();
        child.time_stamp = self.parent.time_stamp.clone();
        child.import_start = self.parent.import_start;
        child.mem_bytes_charged = size.min(SPILL_THRESHOLD);
        child.file_bytes_charged = size.saturating_sub(SPILL_THRESHOLD);
        child.content = Some(sink);

        (self.on_child)(child);
    }
}

fn peek_prefix(stream: &mut dyn ByteStream, buf: &mut [u8]) -> usize {
    let n = stream.read(buf).unwrap_or(0);
    stream.seek(io::SeekFrom::Start(0)).ok();
    n
}

/// `TemporaryBuffer`'s name hint ends up in a filesystem path component;
/// in-archive names carry `/` separators that would otherwise nest
/// unrelated temp files into directories that don't exist.
fn sanitize_hint(name_in_archive: &str) -> String {
    name_in_archive.replace(['/', '\\'], "_")
}
