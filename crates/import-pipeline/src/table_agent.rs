use std::path::PathBuf;
use std::sync::Arc;

use import_model::{ErrorKind, Format, ImportItem, Outcome, TableDescription};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::csv_import::import_csv;
use crate::error::TableError;
use crate::event_log::read_event_records;
use crate::notify::NotificationSink;
use crate::registry_hive::{find_registry_rows, RegistryFindSpec};
use crate::table_writer::{finalize_table, SqliteTableWriter, TableWriter};
use crate::util::read_all;

const REGISTRY_COLUMNS: [&str; 3] = ["key_path", "value_name", "value_data"];
const EVENT_LOG_COLUMNS: [&str; 3] = ["chunk_index", "record_id", "body_hex"];
const RAW_COLUMNS: [&str; 1] = ["raw"];

/// One per-table agent (C9): owns the target table's backing SQLite
/// connection and a pool of worker tasks draining a shared queue of
/// items routed to it. The distilled spec describes `concurrency`
/// workers each with their own connection; here `concurrency` instead
/// sizes the pool of tasks doing the (possibly CPU-bound) row
/// preparation, all funnelled through one writer behind a `Mutex` — two
/// connections racing `CREATE TABLE`/disposition handling against each
/// other on the same file is exactly the hazard `table_lock` names, so
/// serializing the one place that matters (the writer) gets the same
/// safety without needing per-connection coordination (DESIGN.md open
/// question).
pub struct TableAgent {
    tx: Option<mpsc::UnboundedSender<ImportItem>>,
    workers: JoinSet<()>,
    db_path: PathBuf,
    table_name: String,
}

impl TableAgent {
    pub fn start(
        description: TableDescription,
        db_path: PathBuf,
        registry_spec: RegistryFindSpec,
        sink: NotificationSink,
    ) -> Result<Self, TableError> {
        let writer = SqliteTableWriter::open(&db_path, &description.name, description.disposition)?;
        let writer: Arc<Mutex<Box<dyn TableWriter>>> = Arc::new(Mutex::new(Box::new(writer)));

        let (tx, rx) = mpsc::unbounded_channel::<ImportItem>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for _ in 0..description.concurrency.max(1) {
            let rx = rx.clone();
            let writer = writer.clone();
            let sink = sink.clone();
            let registry_spec = registry_spec.clone();
            workers.spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(item) = item else { break };
                    process_item(item, &writer, &registry_spec, &sink).await;
                }
            });
        }

        debug!(
            table = %description.name,
            concurrency = description.concurrency,
            "started per-table agent"
        );

        Ok(TableAgent {
            tx: Some(tx),
            workers,
            db_path,
            table_name: description.name,
        })
    }

    /// Routes one item to this table. Panics if called after `finalize`
    /// — the orchestrator never does, since `finalize_tables` runs only
    /// once every item has already reached a terminal notification.
    pub fn send(&self, item: ImportItem) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(item);
        }
    }

    /// Closes the input queue, waits for every worker to drain it, then
    /// runs the table's after-statements (SPEC_FULL.md §4.9).
    pub async fn finalize(mut self) -> Result<(), TableError> {
        self.tx.take(); // dropping every sender lets recv() return None
        while self.workers.join_next().await.is_some() {}

        let conn = rusqlite::Connection::open(&self.db_path)?;
        finalize_table(&conn, &self.table_name)
    }
}

async fn process_item(
    mut item: ImportItem,
    writer: &Arc<Mutex<Box<dyn TableWriter>>>,
    registry_spec: &RegistryFindSpec,
    sink: &NotificationSink,
) {
    let Some(mut content) = item.content.take() else {
        sink.fail(&item, ErrorKind::InvalidData).await;
        return;
    };

    let result = import_one(item.format, content.as_mut(), writer, registry_spec).await;

    match result {
        Ok(lines) => {
            item.lines_imported = lines;
            sink.complete(&item, Outcome::Imported).await;
        }
        Err(err) => {
            warn!(name = %item.name, error = %err, "table import failed");
            sink.fail(&item, err.to_error_kind()).await;
        }
    }
}

/// Parses `content` per `format` and appends the resulting rows through
/// `writer`, returning the row count. `RegistryHive` and `EventLog` are
/// read fully into memory first — both formats need random access (the
/// hive's cell graph; a chunk's record run) that streaming can't give
/// cheaply, same tradeoff CSV's full-buffer read already makes.
async fn import_one(
    format: Format,
    content: &mut dyn import_stream::ByteStream,
    writer: &Arc<Mutex<Box<dyn TableWriter>>>,
    registry_spec: &RegistryFindSpec,
) -> Result<u64, TableError> {
    match format {
        Format::Csv => {
            let mut writer = writer.lock().await;
            import_csv(content, writer.as_mut())
        }
        Format::RegistryHive => {
            let bytes = read_all(content).map_err(TableError::from_io)?;
            let rows = find_registry_rows(&bytes, registry_spec)
                .map_err(|_| TableError::from_io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "not a recognizable registry hive",
                )))?;
            let mut writer = writer.lock().await;
            writer.set_columns(&REGISTRY_COLUMNS.map(String::from))?;
            for row in &rows {
                writer.write_string(&row.key_path)?;
                match &row.value_name {
                    Some(name) => writer.write_string(name)?,
                    None => writer.write_nothing()?,
                }
                match &row.value_data {
                    Some(data) => writer.write_string(data)?,
                    None => writer.write_nothing()?,
                }
                writer.write_end_of_line()?;
            }
            Ok(rows.len() as u64)
        }
        Format::EventLog => {
            let bytes = read_all(content).map_err(TableError::from_io)?;
            let records = read_event_records(&bytes).map_err(|_| {
                TableError::from_io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "not a recognizable event log",
                ))
            })?;
            let mut writer = writer.lock().await;
            writer.set_columns(&EVENT_LOG_COLUMNS.map(String::from))?;
            for record in &records {
                writer.write_integer(record.chunk_index as i64)?;
                writer.write_integer(record.record_id as i64)?;
                writer.write_string(&record.body_hex)?;
                writer.write_end_of_line()?;
            }
            Ok(records.len() as u64)
        }
        Format::Xml | Format::Data | Format::Text => {
            let bytes = read_all(content).map_err(TableError::from_io)?;
            let mut writer = writer.lock().await;
            writer.set_columns(&RAW_COLUMNS.map(String::from))?;
            writer.write_string(&String::from_utf8_lossy(&bytes))?;
            writer.write_end_of_line()?;
            Ok(1)
        }
        Format::Envelopped | Format::Archive => Err(TableError::from_io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "container formats are never routed to a per-table agent",
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use import_model::Disposition;
    use import_stream::MemoryStream;
    fn sink_with_receiver() -> (NotificationSink, mpsc::UnboundedReceiver<import_model::ImportNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            NotificationSink::new(crate::budgets::Budgets::new(1024, 1024), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn csv_items_are_imported_and_notified() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let description = TableDescription::new("rows", Disposition::CreateNew).with_concurrency(2);
        let (sink, mut rx) = sink_with_receiver();

        let agent =
            TableAgent::start(description, db_path.clone(), RegistryFindSpec::default(), sink)
                .unwrap();

        let mut item = ImportItem::new("a.csv", "a.csv", Format::Csv);
        item.content = Some(Box::new(MemoryStream::from_vec(b"x,y\n1,2\n".to_vec())));
        agent.send(item);

        let notification = rx.recv().await.unwrap();
        assert!(notification.is_success());
        assert_eq!(notification.lines_imported, 1);

        agent.finalize().await.unwrap();

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM rows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn an_item_with_no_content_fails_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let description = TableDescription::new("rows", Disposition::AsIs);
        let (sink, mut rx) = sink_with_receiver();
        let agent =
            TableAgent::start(description, db_path, RegistryFindSpec::default(), sink).unwrap();

        let item = ImportItem::new("a.csv", "a.csv", Format::Csv);
        agent.send(item);

        let notification = rx.recv().await.unwrap();
        assert!(!notification.is_success());
        agent.finalize().await.unwrap();
    }
}
