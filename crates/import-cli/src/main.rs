mod config;
mod identity;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use import_model::{ImportItem, Provenance};
use import_pipeline::{Orchestrator, OrchestratorConfig, OutputDirs, RegistryFindSpec};
use import_stream::FileStream;
use tracing::{error, info, warn};

/// Anything larger than this is charged against the disk budget rather
/// than memory — mirrors the spill threshold `import-pipeline` applies to
/// content it produces internally (archive members, decoded envelopes),
/// so freshly walked input files are accounted for on the same terms.
const MEM_CHARGE_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Drives one run of the Import Pipeline end to end: loads configuration,
/// walks the input set, classifies and enqueues every item, then drains
/// the orchestrator to quiescence (SPEC_FULL.md §6).
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration document (tables, definitions, outputs).
    #[clap(long, env = "IMPORT_CONFIG")]
    config: PathBuf,

    /// Directory to walk for input items.
    #[clap(long, conflicts_with = "input_file")]
    input_dir: Option<PathBuf>,

    /// Recurse into subdirectories of `--input-dir`.
    #[clap(long, requires = "input_dir")]
    recursive: bool,

    /// Explicit list of input files, instead of a directory walk.
    #[clap(long = "input-file")]
    input_file: Vec<PathBuf>,

    /// DER-encoded X.509 certificate this run can decrypt envelopes for.
    #[clap(long, requires = "identity_key")]
    identity_cert: Option<PathBuf>,

    /// PKCS#8 DER private key matching `--identity-cert`.
    #[clap(long, requires = "identity_cert")]
    identity_key: Option<PathBuf>,

    /// Abort waiting for the run to finish after this many seconds.
    /// Per-table agents keep draining in the background after the
    /// process would otherwise exit (SPEC_FULL.md §5).
    #[clap(long)]
    timeout: Option<u64>,

    #[clap(long, default_value_t = 40 * 1024 * 1024 * 1024)]
    memory_capacity: u64,

    #[clap(long, default_value_t = 100 * 1024 * 1024 * 1024)]
    disk_capacity: u64,
}

fn init_logging() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new().context("failed to start the tokio runtime")?;
    let outcome = runtime.block_on(run(args));

    match outcome {
        Ok(failed) if failed => std::process::exit(1),
        Ok(_) => Ok(()),
        Err(err) => {
            error!(error = ?err, "import run failed");
            Err(err)
        }
    }
}

/// Returns `Ok(true)` when the run completed but at least one item
/// failed, so `main` can report it via a non-zero exit without treating
/// per-item failures as a hard error.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = config::load(&args.config).context("loading configuration")?;

    let identity = match (&args.identity_cert, &args.identity_key) {
        (Some(cert), Some(key)) => {
            Some(identity::load(cert, key).context("loading decryption identity")?)
        }
        _ => None,
    };

    let definitions = import_model::DefinitionTable::new(config.definitions);
    let tables: Vec<_> = config.tables.into_iter().map(Into::into).collect();

    let (mut orchestrator, mut notifications) = Orchestrator::new(OrchestratorConfig {
        outputs: OutputDirs {
            result: config.outputs.result,
            import: config.outputs.import,
            extract: config.outputs.extract,
            temp: config.outputs.temp,
        },
        definitions: definitions.clone(),
        identity,
        memory_capacity: args.memory_capacity,
        disk_capacity: args.disk_capacity,
    });

    orchestrator
        .initialize_outputs()
        .context("creating output directories")?;
    orchestrator
        .initialize_tables(tables, RegistryFindSpec::default())
        .context("starting per-table agents")?;

    for path in input_paths(&args)? {
        match build_item(&path, &definitions) {
            Ok(item) => orchestrator.send_request(item),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable input item"),
        }
    }

    let mut any_failed = false;
    let drain = tokio::spawn(async move {
        let mut failed = false;
        while let Some(notification) = notifications.recv().await {
            if notification.is_success() {
                info!(
                    name = %notification.name,
                    table = ?notification.table,
                    "item completed"
                );
            } else {
                failed = true;
                warn!(name = %notification.name, outcome = ?notification.outcome, "item failed");
            }
        }
        failed
    });

    let run_result = match args.timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), orchestrator.run()).await,
        None => Ok(orchestrator.run().await),
    };

    let timed_out = run_result.is_err();
    if let Ok(result) = run_result {
        result.context("running the import pipeline")?;
    } else {
        error!(timeout_secs = ?args.timeout, "import run timed out; agents continue draining in the background");
    }

    if let Ok(failed) = drain.await {
        any_failed = any_failed || failed;
    }

    let stats = orchestrator.statistics();
    info!(
        completed = stats.items_completed,
        extracted = stats.items_extracted,
        imported = stats.items_imported,
        failed = stats.items_failed,
        lines_imported = stats.lines_imported,
        bytes_extracted = stats.bytes_extracted,
        "run finished"
    );

    Ok(any_failed || timed_out)
}

fn input_paths(args: &Args) -> anyhow::Result<Vec<PathBuf>> {
    if !args.input_file.is_empty() {
        return Ok(args.input_file.clone());
    }

    let dir = args
        .input_dir
        .as_ref()
        .context("either --input-dir or --input-file is required")?;

    let mut paths = Vec::new();
    let walker = if args.recursive {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    for entry in walker {
        let entry = entry.context("walking input directory")?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn build_item(
    path: &std::path::Path,
    definitions: &import_model::DefinitionTable,
) -> anyhow::Result<ImportItem> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("input path has no file name")?
        .to_string();
    let provenance = Provenance::parse(&name);

    let content = FileStream::open_read(path)?;
    let size = content_size(path)?;
    let format = import_pipeline::detect_format(&name);

    let mut item = ImportItem::new(name.clone(), name.clone(), format);
    item.input_file = Some(path.to_path_buf());
    item.computer_name = provenance.computer_name;
    item.system_type = provenance.system_type;
    item.time_stamp = provenance.time_stamp;
    item.import_start = Some(chrono::Utc::now());
    item.mem_bytes_charged = size.min(MEM_CHARGE_THRESHOLD);
    item.file_bytes_charged = size.saturating_sub(MEM_CHARGE_THRESHOLD);
    item.content = Some(Box::new(content));

    import_classify::classify_item(&mut item, definitions);
    Ok(item)
}

fn content_size(path: &std::path::Path) -> anyhow::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}
