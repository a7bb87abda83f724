use serde::{Deserialize, Serialize};

/// How a target table should be prepared before the first row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Append to whatever is already there.
    AsIs,
    /// Empty the table before the first row.
    Truncate,
    /// Refuse to start if the table already exists.
    CreateNew,
}

/// Describes one target table: its name, how it should be prepared, and
/// how many per-table workers may append to it concurrently. One
/// per-table agent stack (`import-pipeline::TableAgent`) is built per
/// `TableDescription` at `initialize_tables` time and lives until
/// `finalize_tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub disposition: Disposition,
    pub concurrency: usize,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub table_lock: bool,
}

impl TableDescription {
    pub fn new(name: impl Into<String>, disposition: Disposition) -> Self {
        TableDescription {
            name: name.into(),
            disposition,
            concurrency: 1,
            compress: false,
            table_lock: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
