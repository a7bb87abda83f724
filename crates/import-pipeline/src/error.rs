use import_model::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table error: {0}")]
    Table(#[from] TableError),
    #[error("archive error: {0}")]
    Archive(#[from] import_archive::ArchiveError),
    #[error("envelope error: {0}")]
    Envelope(#[from] import_envelope::EnvelopeError),
    #[error("journal replay error: {0}")]
    Journal(#[from] import_envelope::JournalError),
    #[error("failed to start a per-table agent during initialize_tables: {0}")]
    TableAgentStartup(String),
}

impl PipelineError {
    /// Maps this error onto the coarse `ErrorKind` carried by a failure
    /// notification (SPEC_FULL.md §7). `TableAgentStartup` has no
    /// mapping because it's fatal to the whole pipeline, not a per-item
    /// failure — callers propagate it out of `initialize_tables` instead
    /// of ever reaching a notification.
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            PipelineError::Io(_) => ErrorKind::IoFailed,
            PipelineError::Table(err) => err.to_error_kind(),
            PipelineError::Archive(import_archive::ArchiveError::UnrecognizedFormat) => {
                ErrorKind::UnrecognizedFormat
            }
            PipelineError::Archive(_) => ErrorKind::IoFailed,
            PipelineError::Envelope(_) => ErrorKind::DecodeFailed,
            PipelineError::Journal(_) => ErrorKind::DecodeFailed,
            PipelineError::TableAgentStartup(_) => ErrorKind::InvalidArgument,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(std::io::Error),
    #[error("failed to parse csv: {0}")]
    Csv(csv::Error),
    #[error("table \"{0}\" already exists and the table description requires CreateNew")]
    AlreadyExists(String),
    #[error("write_end_of_line called before any cell was written for the row")]
    EmptyRow,
    #[error("column count {got} does not match the {expected} columns fixed at table creation")]
    ColumnCountMismatch { expected: usize, got: usize },
}

impl TableError {
    pub fn from_io(err: std::io::Error) -> Self {
        TableError::Io(err)
    }

    pub fn from_csv(err: csv::Error) -> Self {
        TableError::Csv(err)
    }

    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            TableError::Sqlite(_) => ErrorKind::IoFailed,
            TableError::Io(_) => ErrorKind::IoFailed,
            TableError::Csv(_) => ErrorKind::InvalidData,
            TableError::AlreadyExists(_) => ErrorKind::InvalidArgument,
            TableError::EmptyRow | TableError::ColumnCountMismatch { .. } => ErrorKind::InvalidData,
        }
    }
}
