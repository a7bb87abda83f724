use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::ErrorKind;
use crate::item::ImportItem;

/// What actually happened to an item, distinct from what was requested:
/// an item classified `Extract` that hits an I/O error still produces one
/// `ImportNotification`, just with `outcome = Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Extracted,
    Imported,
    Failed(ErrorKind),
}

/// Emitted exactly once per enqueued item, at its terminal state
/// (Invariant 2, §3). Carries everything downstream progress reporting or
/// row-level auditing needs; the orchestrator releases byte budgets and
/// decrements the in-flight counter at the same point this is
/// constructed, never before and never again after.
#[derive(Debug, Clone)]
pub struct ImportNotification {
    pub outcome: Outcome,
    pub lines_imported: u64,
    pub bytes_extracted: u64,
    pub input_file: Option<PathBuf>,
    pub name: String,
    pub full_name: String,
    pub computer_name: String,
    pub system_type: String,
    pub time_stamp: String,
    pub import_start: Option<DateTime<Utc>>,
    pub import_end: Option<DateTime<Utc>>,
    pub output_file: Option<PathBuf>,
    pub table: Option<String>,
}

impl ImportNotification {
    pub fn from_item(item: &ImportItem, outcome: Outcome) -> Self {
        ImportNotification {
            outcome,
            lines_imported: item.lines_imported,
            bytes_extracted: item.bytes_extracted,
            input_file: item.input_file.clone(),
            name: item.name.clone(),
            full_name: item.full_name.clone(),
            computer_name: item.computer_name.clone(),
            system_type: item.system_type.clone(),
            time_stamp: item.time_stamp.clone(),
            import_start: item.import_start,
            import_end: item.import_end,
            output_file: item.output_file.clone(),
            table: item.target_table().map(str::to_owned),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }
}
