use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use import_stream::ByteStream;
use serde::{Deserialize, Serialize};

use crate::definitions::DefinitionEntry;

/// The recognized content shapes an `ImportItem` can carry. Unlike the
/// parser crate's `Format`, which picks a record decoder, this `Format`
/// picks a pipeline stage: `Envelopped` and `Archive` always re-enqueue
/// work, the rest are leaves that terminate in an extract or an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Envelopped,
    Archive,
    Csv,
    RegistryHive,
    EventLog,
    Xml,
    Data,
    Text,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Envelopped => "envelopped",
            Format::Archive => "archive",
            Format::Csv => "csv",
            Format::RegistryHive => "registry_hive",
            Format::EventLog => "event_log",
            Format::Xml => "xml",
            Format::Data => "data",
            Format::Text => "text",
        };
        f.write_str(s)
    }
}

impl Format {
    /// True for formats that always expand into further `ImportItem`s
    /// rather than terminating the current one.
    pub fn is_container(&self) -> bool {
        matches!(self, Format::Envelopped | Format::Archive)
    }
}

/// The unit of work carried through the pipeline. Classification
/// (`to_ignore`/`to_import`/`to_extract`/`to_expand`) and resource
/// accounting (`mem_bytes_charged`/`file_bytes_charged`) travel with the
/// item itself so that a single untyped channel can carry every stage's
/// work — see `import-pipeline`'s orchestrator.
///
/// `content` is a trait object, so `ImportItem` can't derive `Clone` or
/// `Debug`; every stage that needs the item's *metadata* elsewhere (e.g.
/// an `ImportNotification`) copies the fields it needs rather than the
/// whole item.
pub struct ImportItem {
    pub name: String,
    pub full_name: String,
    pub input_file: Option<PathBuf>,

    /// The item's current bytes. `None` once the item has been fully
    /// consumed by an extract/import stage (SPEC_FULL.md §3).
    pub content: Option<Box<dyn ByteStream>>,

    pub format: Format,

    pub to_ignore: bool,
    pub to_import: bool,
    pub to_extract: bool,
    pub to_expand: bool,

    pub computer_name: String,
    pub system_type: String,
    pub time_stamp: String,
    pub import_start: Option<DateTime<Utc>>,
    pub import_end: Option<DateTime<Utc>>,

    pub definition: Option<DefinitionEntry>,

    pub mem_bytes_charged: u64,
    pub file_bytes_charged: u64,
    pub bytes_extracted: u64,
    pub lines_imported: u64,

    pub output_file: Option<PathBuf>,

    /// When true, archive members extracted from this item inherit
    /// `stem(self.name)` as a path prefix. The expander sets this
    /// unconditionally on every member it produces, so a nested archive's
    /// own children keep chaining off `full_name` once the first level of
    /// expansion has happened, regardless of whether the top-level input
    /// item had it set.
    pub prefix_sub_item: bool,
}

impl ImportItem {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, format: Format) -> Self {
        ImportItem {
            name: name.into(),
            full_name: full_name.into(),
            input_file: None,
            content: None,
            format,
            to_ignore: false,
            to_import: false,
            to_extract: false,
            to_expand: false,
            computer_name: String::new(),
            system_type: String::new(),
            time_stamp: String::new(),
            import_start: None,
            import_end: None,
            definition: None,
            mem_bytes_charged: 0,
            file_bytes_charged: 0,
            bytes_extracted: 0,
            lines_imported: 0,
            output_file: None,
            prefix_sub_item: false,
        }
    }

    /// Total bytes charged against the byte-budget semaphores (§4.7);
    /// released exactly once, at the item's terminal notification.
    pub fn bytes_charged(&self) -> (u64, u64) {
        (self.mem_bytes_charged, self.file_bytes_charged)
    }

    pub fn target_table(&self) -> Option<&str> {
        self.definition
            .as_ref()
            .and_then(|d| d.table.as_deref())
    }
}

impl fmt::Debug for ImportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportItem")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .field("input_file", &self.input_file)
            .field("content", &self.content.is_some())
            .field("format", &self.format)
            .field("to_ignore", &self.to_ignore)
            .field("to_import", &self.to_import)
            .field("to_extract", &self.to_extract)
            .field("to_expand", &self.to_expand)
            .field("mem_bytes_charged", &self.mem_bytes_charged)
            .field("file_bytes_charged", &self.file_bytes_charged)
            .finish_non_exhaustive()
    }
}
