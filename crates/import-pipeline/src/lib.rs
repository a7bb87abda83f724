mod budgets;
mod csv_import;
mod envelope;
mod error;
mod event_log;
mod expand;
mod extract;
mod format_detect;
mod notify;
mod orchestrator;
mod registry_hive;
mod table_agent;
mod table_writer;
mod util;

pub use budgets::{Budgets, DEFAULT_DISK_CAPACITY, DEFAULT_MEMORY_CAPACITY};
pub use envelope::RecipientIdentity;
pub use error::{PipelineError, TableError};
pub use format_detect::{detect_format, detect_format_with_magic};
pub use notify::{NotificationSink, Statistics};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OutputDirs};
pub use registry_hive::{RegistryError, RegistryFindSpec, RegistryRow};
pub use table_writer::{SqliteTableWriter, TableWriter};
