use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use import_classify::classify_item;
use import_model::{DefinitionTable, ErrorKind, Format, ImportItem, Outcome, TableDescription};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::budgets::Budgets;
use crate::envelope::{decode_envelope, RecipientIdentity};
use crate::error::PipelineError;
use crate::expand::{expand_item, SPILL_THRESHOLD};
use crate::extract::extract_item;
use crate::notify::{NotificationSink, Statistics};
use crate::registry_hive::RegistryFindSpec;
use crate::table_agent::TableAgent;

/// Self-addressed work item: every re-enqueue (a decoded envelope's
/// payload, an archive's members) and the quiescence probe itself travel
/// through the same channel the orchestrator reads from (SPEC_FULL.md
/// §4.8).
enum Request {
    Item(ImportItem),
    Complete,
}

/// Everything `initialize_outputs` needs to know about where a run's
/// output goes (SPEC_FULL.md §6's `outputs: {result, import, extract,
/// temp}`).
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub result: PathBuf,
    pub import: PathBuf,
    pub extract: PathBuf,
    pub temp: PathBuf,
}

/// Everything a run needs to construct an `Orchestrator`: where output
/// goes, the definition table driving classification, the decryption
/// identity (absent if this run never needs to open an envelope), and
/// the byte-budget capacities. Table descriptions and the registry-find
/// spec are supplied separately, to `initialize_tables`, since starting
/// per-table agents can fail independently of construction.
pub struct OrchestratorConfig {
    pub outputs: OutputDirs,
    pub definitions: DefinitionTable,
    pub identity: Option<RecipientIdentity>,
    pub memory_capacity: u64,
    pub disk_capacity: u64,
}

/// The state every spawned per-item task needs a cheap, `'static`,
/// `Clone` handle onto: budgets, the self-addressed channel, the
/// notification sink, output directories, and the decryption identity.
/// Kept distinct from `Orchestrator` itself, which additionally owns the
/// per-table agents — state a spawned task never touches directly (it
/// routes through `Orchestrator::route_to_table` on the main loop
/// instead).
#[derive(Clone)]
struct Handle {
    defs: std::sync::Arc<DefinitionTable>,
    budgets: Budgets,
    self_tx: mpsc::UnboundedSender<Request>,
    sink: NotificationSink,
    extract_dir: PathBuf,
    temp_dir: PathBuf,
    identity: Option<RecipientIdentity>,
}

impl Handle {
    /// Charges `item`'s declared bytes and pushes it onto the
    /// self-addressed queue once the budget allows — spawned because
    /// `acquire` can suspend, and this is called from non-async call
    /// sites (the CLI's directory walk) as well as from inside the
    /// scheduling loop itself.
    fn send_request(&self, item: ImportItem) {
        if item.to_ignore {
            return; // dropped before any bytes are charged (§3 invariant)
        }
        let budgets = self.budgets.clone();
        let self_tx = self.self_tx.clone();
        let (mem, file) = item.bytes_charged();
        tokio::spawn(async move {
            budgets.acquire(mem, file).await;
            let _ = self_tx.send(Request::Item(item));
        });
    }

    /// Classifies a freshly produced item (an envelope's payload, an
    /// archive member) against the shared definition table, charges its
    /// budget, and enqueues it — re-enqueued items never inherit their
    /// parent's classification, since their name is unrelated to it.
    ///
    /// Unlike `send_request`, this acquires the child's budget inline on
    /// the caller's own task rather than in a detached `tokio::spawn`.
    /// Callers use it to charge every child *before* releasing the
    /// parent's own charge (via `sink.complete`), so the in-flight
    /// counter never observes zero while a child produced from this
    /// parent is still being handed off — a detached acquire racing the
    /// parent's release could otherwise let the quiescence tick fire and
    /// finalize the run between the two (SPEC_FULL.md §4.8).
    async fn classify_and_charge(&self, mut item: ImportItem) {
        classify_item(&mut item, &self.defs);
        if item.to_ignore {
            return; // dropped before any bytes are charged (§3 invariant)
        }
        let (mem, file) = item.bytes_charged();
        self.budgets.acquire(mem, file).await;
        let _ = self.self_tx.send(Request::Item(item));
    }

    async fn handle_envelope(&self, mut item: ImportItem) {
        let Some(identity) = self.identity.as_ref() else {
            self.sink.fail(&item, ErrorKind::DecodeFailed).await;
            return;
        };
        let Some(content) = item.content.take() else {
            self.sink.fail(&item, ErrorKind::InvalidData).await;
            return;
        };

        match decode_envelope(&item, content, identity, &self.temp_dir) {
            Ok(decoded) => {
                item.bytes_extracted = decoded.bytes_extracted;
                debug!(
                    name = %item.name,
                    recipient = %decoded.recipient_subject,
                    "envelope decoded"
                );

                let mut next = decoded.next;
                let size = decoded.bytes_extracted;
                next.mem_bytes_charged = size.min(SPILL_THRESHOLD);
                next.file_bytes_charged = size.saturating_sub(SPILL_THRESHOLD);
                self.classify_and_charge(next).await;

                self.sink.complete(&item, Outcome::Extracted).await;
            }
            Err(kind) => self.sink.fail(&item, kind).await,
        }
    }

    async fn handle_expand(&self, mut item: ImportItem) {
        let Some(content) = item.content.take() else {
            self.sink.fail(&item, ErrorKind::InvalidData).await;
            return;
        };

        let mut children = Vec::new();
        let result = expand_item(&item, content, &self.temp_dir, &mut |child| {
            children.push(child)
        });

        match result {
            Ok(()) => {
                item.bytes_extracted = children
                    .iter()
                    .map(|c| c.mem_bytes_charged + c.file_bytes_charged)
                    .sum();
                debug!(name = %item.name, members = children.len(), "archive expanded");

                for child in children {
                    self.classify_and_charge(child).await;
                }
                self.sink.complete(&item, Outcome::Extracted).await;
            }
            Err(err) => {
                let kind = match err {
                    import_archive::ArchiveError::UnrecognizedFormat => {
                        ErrorKind::UnrecognizedFormat
                    }
                    _ => ErrorKind::IoFailed,
                };
                self.sink.fail(&item, kind).await;
            }
        }
    }

    async fn handle_extract(&self, mut item: ImportItem) {
        match extract_item(&mut item, &self.extract_dir) {
            Ok(bytes) => {
                item.bytes_extracted = bytes;
                self.sink.complete(&item, Outcome::Extracted).await;
            }
            Err(err) => self.sink.fail(&item, err.to_error_kind()).await,
        }
    }
}

/// The import agent (C8): reads classified `ImportItem`s, dispatches
/// each by `Format`, and runs until no work is in flight and nothing new
/// has arrived (SPEC_FULL.md §4.8).
pub struct Orchestrator {
    handle: Handle,
    self_rx: Option<mpsc::UnboundedReceiver<Request>>,
    table_agents: HashMap<String, TableAgent>,
    outputs: OutputDirs,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> (Self, mpsc::UnboundedReceiver<import_model::ImportNotification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let budgets = Budgets::new(config.memory_capacity, config.disk_capacity);
        let sink = NotificationSink::new(budgets.clone(), notify_tx);
        let (self_tx, self_rx) = mpsc::unbounded_channel();

        let handle = Handle {
            defs: std::sync::Arc::new(config.definitions),
            budgets,
            self_tx,
            sink,
            extract_dir: config.outputs.extract.clone(),
            temp_dir: config.outputs.temp.clone(),
            identity: config.identity,
        };

        let orchestrator = Orchestrator {
            handle,
            self_rx: Some(self_rx),
            table_agents: HashMap::new(),
            outputs: config.outputs,
        };

        (orchestrator, notify_rx)
    }

    /// Creates every output directory a run writes into. Idempotent —
    /// safe to call against a directory tree left over from a previous
    /// run.
    pub fn initialize_outputs(&self) -> std::io::Result<()> {
        for dir in [
            &self.outputs.result,
            &self.outputs.import,
            &self.outputs.extract,
            &self.outputs.temp,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Starts one per-table agent per description, backed by
    /// `<import_dir>/<table name>.sqlite`. A failure here is fatal to
    /// the whole pipeline (SPEC_FULL.md §7), unlike a per-item failure.
    pub fn initialize_tables(
        &mut self,
        tables: Vec<TableDescription>,
        registry_find: RegistryFindSpec,
    ) -> Result<(), PipelineError> {
        for description in tables {
            let db_path = self.db_path_for(&description.name);
            let name = description.name.clone();
            let agent = TableAgent::start(
                description,
                db_path,
                registry_find.clone(),
                self.handle.sink.clone(),
            )
            .map_err(|err| PipelineError::TableAgentStartup(err.to_string()))?;
            self.table_agents.insert(name, agent);
        }
        Ok(())
    }

    fn db_path_for(&self, table_name: &str) -> PathBuf {
        self.outputs.import.join(format!("{table_name}.sqlite"))
    }

    /// Charges and enqueues an already-classified item. The CLI front
    /// end classifies every input item via `import-classify` before
    /// calling this (SPEC_FULL.md §4.11); re-enqueued items produced
    /// internally (archive members, decoded envelopes) are classified by
    /// the orchestrator itself, never through this entry point.
    pub fn send_request(&self, item: ImportItem) {
        self.handle.send_request(item);
    }

    pub fn statistics(&self) -> Statistics {
        self.handle.sink.statistics()
    }

    /// A `watch` channel tracking the in-flight item count — the CLI can
    /// poll this for progress reporting without draining the
    /// notification channel.
    pub fn queued_items_count(&self) -> watch::Receiver<i64> {
        self.handle.budgets.subscribe()
    }

    /// Closes every per-table agent's input queue, waits for its workers
    /// to drain, and runs its after-statements. Ordinarily called by
    /// `run` itself at quiescence; exposed so a caller driving the loop
    /// by hand (tests, a `--timeout` abort path) can still shut tables
    /// down cleanly.
    pub async fn finalize_tables(&mut self) -> Result<(), PipelineError> {
        for (name, agent) in std::mem::take(&mut self.table_agents) {
            agent.finalize().await.map_err(|err| {
                warn!(table = %name, error = %err, "per-table agent finalize failed");
                PipelineError::Table(err)
            })?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, item: ImportItem, joinset: &mut JoinSet<()>) {
        match item.format {
            Format::Envelopped => {
                let handle = self.handle.clone();
                joinset.spawn(async move { handle.handle_envelope(item).await });
            }
            Format::Archive if item.to_expand => {
                let handle = self.handle.clone();
                joinset.spawn(async move { handle.handle_expand(item).await });
            }
            _ if item.to_extract => {
                let handle = self.handle.clone();
                joinset.spawn(async move { handle.handle_extract(item).await });
            }
            _ if item.to_import => {
                self.route_to_table(item).await;
            }
            _ => {
                self.handle.sink.fail(&item, ErrorKind::InvalidArgument).await;
            }
        }
    }

    async fn route_to_table(&mut self, item: ImportItem) {
        let Some(table) = item.target_table().map(str::to_owned) else {
            self.handle.sink.fail(&item, ErrorKind::InvalidArgument).await;
            return;
        };
        match self.table_agents.get(&table) {
            Some(agent) => agent.send(item),
            None => self.handle.sink.fail(&item, ErrorKind::InvalidArgument).await,
        }
    }

    /// Drives the scheduling loop to completion: dispatches every
    /// arriving item, detects quiescence via a 500ms tick against the
    /// in-flight counter, then finalizes every table and returns
    /// (SPEC_FULL.md §4.8).
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        let mut self_rx = self.self_rx.take().expect("run is only ever called once");
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        let mut joinset: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                req = self_rx.recv() => {
                    match req {
                        Some(Request::Item(item)) => self.dispatch(item, &mut joinset).await,
                        Some(Request::Complete) => {
                            while joinset.join_next().await.is_some() {}

                            if self.handle.budgets.in_flight_count() != 0 {
                                continue;
                            }

                            let mut more_arrived = false;
                            while let Ok(req) = self_rx.try_recv() {
                                if let Request::Item(item) = req {
                                    self.dispatch(item, &mut joinset).await;
                                    more_arrived = true;
                                }
                            }
                            if more_arrived || !joinset.is_empty() {
                                continue;
                            }

                            self.finalize_tables().await?;
                            return Ok(());
                        }
                        None => return Ok(()),
                    }
                }
                _ = ticker.tick() => {
                    if self.handle.budgets.in_flight_count() == 0 {
                        let _ = self.handle.self_tx.send(Request::Complete);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use import_model::{Action, DefinitionEntry, Disposition};
    use import_stream::MemoryStream;

    fn config(dir: &std::path::Path, defs: DefinitionTable) -> OrchestratorConfig {
        OrchestratorConfig {
            outputs: OutputDirs {
                result: dir.join("result"),
                import: dir.join("import"),
                extract: dir.join("extract"),
                temp: dir.join("temp"),
            },
            definitions: defs,
            identity: None,
            memory_capacity: 1024 * 1024,
            disk_capacity: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn imports_a_csv_item_end_to_end_and_quiesces() {
        let dir = tempfile::tempdir().unwrap();
        let defs = DefinitionTable::new(vec![DefinitionEntry {
            pattern: "*.csv".into(),
            action: Action::Import,
            table: Some("rows".into()),
            password: None,
        }]);
        let (mut orchestrator, mut notifications) = Orchestrator::new(config(dir.path(), defs));
        orchestrator.initialize_outputs().unwrap();
        orchestrator
            .initialize_tables(vec![TableDescription::new("rows", Disposition::CreateNew)], RegistryFindSpec::default())
            .unwrap();

        let mut item = ImportItem::new("a.csv", "a.csv", Format::Csv);
        item.content = Some(Box::new(MemoryStream::from_vec(b"x,y\n1,2\n".to_vec())));
        import_classify::classify_item(&mut item, &DefinitionTable::new(vec![DefinitionEntry {
            pattern: "*.csv".into(),
            action: Action::Import,
            table: Some("rows".into()),
            password: None,
        }]));
        orchestrator.send_request(item);

        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("run should reach quiescence")
            .unwrap();

        let notification = notifications.recv().await.unwrap();
        assert!(notification.is_success());

        let stats = orchestrator.statistics();
        assert_eq!(stats.items_imported, 1);

        let db_path = dir.path().join("import/rows.sqlite");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM rows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ignored_items_never_produce_a_notification() {
        let dir = tempfile::tempdir().unwrap();
        let defs = DefinitionTable::new(vec![DefinitionEntry {
            pattern: "*.log".into(),
            action: Action::Ignore,
            table: None,
            password: None,
        }]);
        let (mut orchestrator, mut notifications) = Orchestrator::new(config(dir.path(), defs));
        orchestrator.initialize_outputs().unwrap();
        orchestrator.initialize_tables(vec![], RegistryFindSpec::default()).unwrap();

        let mut item = ImportItem::new("a.log", "a.log", Format::Text);
        item.to_ignore = true;
        orchestrator.send_request(item);

        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("run should reach quiescence")
            .unwrap();

        assert!(notifications.try_recv().is_err());
        assert_eq!(orchestrator.statistics().items_completed, 0);
    }
}
