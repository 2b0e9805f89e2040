//! CLI definition and command dispatch for graft.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to `graft-core`.
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (e.g., `--config`, `--batch-size`, `--database-url`)
//! 2. Environment variables (`GRAFT_CONFIG`, `GRAFT_DATABASE_URL`, `GRAFT_VERBOSE`)
//! 3. Config file (`~/.graft/config.yaml` or path from `--config`/`GRAFT_CONFIG`)
//! 4. Built-in defaults

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::ui::table::{self, PlanRow, ViolationRow};
use crate::ui::{format, BarProgress, ColorMode, MessageType, ProgressMode, Style};

use graft_core::statements::is_label;
use graft_core::{
    estimate_total_batches, ConnectionPool, DatabaseConfig, GraftConfig, GraphData, GraphLoader,
    GraphSchema, LoadResult, MemoryEngine, SchemaValidator, TableStagingStore,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// graft – staged, transactional graph-data loader
#[derive(Parser, Debug)]
#[command(name = "graft")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "GRAFT_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "GRAFT_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.graft/config.yaml)
    #[arg(long, global = true, env = "GRAFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "GRAFT_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load graph data from a JSON or YAML file into a graph
    #[command(after_help = r#"EXAMPLES:
    # Load into the graph `social` on the configured database
    graft load people.json --graph social

    # Dry run against the in-memory engine
    graft load people.json --graph social --memory

    # Keep going past bad batches, validating against a schema first
    graft load people.json --graph social --schema schema.yaml --validate --continue-on-error

    # Machine-readable result
    graft load people.json --graph social --json | jq '.vertexCount'
"#)]
    Load(LoadArgs),

    /// Show how a data file would be split into batches
    #[command(after_help = r#"EXAMPLES:
    # Plan with the configured batch size
    graft plan people.json

    # Plan with 100 records per batch
    graft plan people.json --batch-size 100 --json
"#)]
    Plan {
        /// Graph data file (.json, .yaml or .yml)
        file: PathBuf,

        /// Records per batch (default: loader.batchSize from config)
        #[arg(long, value_parser = parse_batch_size)]
        batch_size: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check a data file against a schema without loading it
    #[command(after_help = r#"EXAMPLES:
    # Validate records before a load
    graft validate people.json --schema schema.yaml
"#)]
    Validate {
        /// Graph data file (.json, .yaml or .yml)
        file: PathBuf,

        /// Schema file (.json, .yaml or .yml)
        #[arg(long)]
        schema: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of `graft load`.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Graph data file (.json, .yaml or .yml)
    pub file: PathBuf,

    /// Target graph name
    #[arg(short, long)]
    pub graph: String,

    /// PostgreSQL connection URL (default: database.url from config); ignored with --memory
    #[arg(long, env = "GRAFT_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Load into a throwaway in-memory engine instead of a database
    #[arg(long)]
    pub memory: bool,

    /// Records per batch (default: loader.batchSize from config)
    #[arg(long, value_parser = parse_batch_size)]
    pub batch_size: Option<usize>,

    /// Record failing batches and keep loading
    #[arg(long)]
    pub continue_on_error: bool,

    /// Validate every record before opening the transaction
    #[arg(long)]
    pub validate: bool,

    /// Schema file used for validation and endpoint types
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Transaction timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Leave staged batches in the staging table after the load
    #[arg(long)]
    pub keep_staging: bool,

    /// Output the load result as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("invalid batch size `{}`: {}", s, e))?;
    if n == 0 {
        return Err("batch size must be at least 1".to_string());
    }
    Ok(n)
}

// ============================================================================
// Errors
// ============================================================================

/// A failure with an actionable suggestion.
#[derive(Debug)]
struct Hinted {
    message: String,
    hint: String,
}

impl Hinted {
    fn new(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: hint.into(),
        }
    }
}

impl fmt::Display for Hinted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Hinted {}

fn report_error(style: &Style, err: &anyhow::Error) -> String {
    if let Some(hinted) = err.downcast_ref::<Hinted>() {
        return style.error_with_context(&hinted.message, None, Some(&hinted.hint));
    }

    let cause = err.chain().nth(1).map(ToString::to_string);
    style.error_with_context(&err.to_string(), cause.as_deref(), None)
}

// ============================================================================
// Entry point
// ============================================================================

/// Parse arguments, set up logging and run one command.
///
/// Returns `ExitCode::FAILURE` when the command fails, including a load that
/// did not succeed.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always, debug only with --verbose. Logs go to stderr so that
    // --json output stays parseable.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!(
        "graft_core={0},graft_db={0},graft_cli={0}",
        log_level
    );

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color_mode = ColorMode::parse(&cli.color).unwrap_or_default();
    let style = Style::new(color_mode);

    let config = match &cli.config {
        Some(path) => GraftConfig::from_path(path),
        None => GraftConfig::load_default(),
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your global config at ~/.graft/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to load configuration",
                    Some(&e.to_string()),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Load(args) => handle_load(&style, &config, &args, cli.quiet),
        Command::Plan {
            file,
            batch_size,
            json,
        } => handle_plan(&style, &config, &file, batch_size, json),
        Command::Validate { file, schema, json } => handle_validate(&style, &file, &schema, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", report_error(&style, &e));
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn read_data(path: &Path) -> Result<GraphData> {
    let data = GraphData::from_path(path)?;
    debug!(
        path = %path.display(),
        vertices = data.vertex_record_count(),
        edges = data.edge_record_count(),
        "Read graph data"
    );
    Ok(data)
}

fn read_schema(path: &Path) -> Result<GraphSchema> {
    let schema = GraphSchema::from_path(path)?;
    schema
        .validate()
        .with_context(|| format!("Schema {} is inconsistent", path.display()))?;
    Ok(schema)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Backends
// ============================================================================

/// Engine a load runs against.
enum Backend {
    /// Throwaway in-memory engine; kept so the summary can report its contents.
    Memory(MemoryEngine),
    Database(Arc<dyn ConnectionPool>),
}

impl Backend {
    fn open(config: &GraftConfig, args: &LoadArgs) -> Result<Self> {
        if args.memory {
            debug!("Using the in-memory engine");
            return Ok(Self::Memory(MemoryEngine::new()));
        }

        let url = args
            .database_url
            .clone()
            .or_else(|| config.database.url.clone())
            .ok_or_else(|| {
                Hinted::new(
                    "No database URL configured",
                    "Pass --database-url, set GRAFT_DATABASE_URL or database.url in the config, or use --memory for a dry run",
                )
            })?;

        connect_database(&url, &config.database).map(Self::Database)
    }

    fn pool(&self) -> Arc<dyn ConnectionPool> {
        match self {
            Self::Memory(engine) => Arc::new(engine.pool()),
            Self::Database(pool) => Arc::clone(pool),
        }
    }
}

#[cfg(feature = "postgres")]
fn connect_database(url: &str, database: &DatabaseConfig) -> Result<Arc<dyn ConnectionPool>> {
    use graft_core::{PgConfig, PgPool};

    let mut pg = PgConfig::new(url);
    if !database.session_init.is_empty() {
        pg.session_init = database.session_init.clone();
    }
    if let Some(max) = database.max_connections {
        pg.max_connections = max;
    }

    let pool = PgPool::connect(&pg).context("Failed to connect to PostgreSQL")?;
    Ok(Arc::new(pool))
}

#[cfg(not(feature = "postgres"))]
fn connect_database(_url: &str, _database: &DatabaseConfig) -> Result<Arc<dyn ConnectionPool>> {
    Err(Hinted::new(
        "This build of graft has no PostgreSQL support",
        "Rebuild with `--features postgres`, or use --memory for a dry run",
    )
    .into())
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_load(style: &Style, config: &GraftConfig, args: &LoadArgs, quiet: bool) -> Result<()> {
    let data = read_data(&args.file)?;

    let mut options = config.loader.to_load_options(args.graph.as_str());
    if let Some(batch_size) = args.batch_size {
        options = options.batch_size(batch_size);
    }
    if args.continue_on_error {
        options = options.continue_on_error(true);
    }
    if args.validate {
        options = options.validate_before_load(true);
    }
    if let Some(secs) = args.timeout {
        options = options.transaction_timeout(Duration::from_secs(secs));
    }
    if args.keep_staging {
        options = options.cleanup_staging(false);
    }

    let backend = Backend::open(config, args)?;
    let staging = TableStagingStore::new(config.staging.to_table()?)?;
    let mut loader = GraphLoader::new(backend.pool()).with_staging(Arc::new(staging));
    if let Some(path) = &args.schema {
        loader = loader.with_schema(Arc::new(read_schema(path)?));
    }

    let bar = BarProgress::new(ProgressMode::detect(quiet, args.json, style.color_mode()));
    options = options.progress(Arc::new(bar.clone()));

    info!(
        graph = %args.graph,
        batch_size = options.batch_size,
        continue_on_error = options.continue_on_error,
        "Starting load"
    );
    let result = loader.load_graph_data(&data, &options);
    bar.finish_clear();
    let result = result?;

    if args.json {
        print_json(&result)?;
    } else {
        print_load_summary(style, &args.graph, &result, &backend, quiet);
    }

    if !result.success {
        return Err(anyhow!(
            "Load into `{}` failed with {} error(s); nothing was committed",
            args.graph,
            result.errors.len()
        ));
    }
    Ok(())
}

fn print_load_summary(style: &Style, graph: &str, result: &LoadResult, backend: &Backend, quiet: bool) {
    let counts = format!(
        "{} vertices and {} edges into `{}` in {}",
        format::format_thousands(result.vertex_count),
        format::format_thousands(result.edge_count),
        graph,
        format::format_duration(result.duration)
    );

    if !result.success {
        println!(
            "{}",
            style.message(MessageType::Info, &format!("Batches before the failure held {}", counts))
        );
    } else if result.is_partial() {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                &format!(
                    "Loaded {} with {} error(s) and {} skipped record(s)",
                    counts,
                    result.errors.len(),
                    result.skipped_records
                )
            )
        );
    } else {
        println!("{}", style.message(MessageType::Ok, &format!("Loaded {}", counts)));
    }

    if !quiet {
        println!("{}", style.message_detail("Load ID", &result.load_id));
        println!(
            "{}",
            style.message_detail("Started", &format::format_timestamp(result.started_at))
        );
        if !result.vertex_types.is_empty() {
            println!(
                "{}",
                style.message_detail("Vertex types", &result.vertex_types.join(", "))
            );
        }
        if !result.edge_types.is_empty() {
            println!(
                "{}",
                style.message_detail("Edge types", &result.edge_types.join(", "))
            );
        }
        if let Backend::Memory(engine) = backend {
            println!(
                "{}",
                style.message_detail(
                    "In memory",
                    &format!(
                        "{} vertices, {} edges",
                        engine.vertex_count(graph),
                        engine.edge_count(graph)
                    )
                )
            );
        }
    }

    if result.skipped_records > 0 {
        println!(
            "{}",
            style.message(
                MessageType::Skip,
                &format!("{} record(s) failed validation", result.skipped_records)
            )
        );
    }

    if !quiet {
        for warning in &result.warnings {
            println!("{}", style.message(MessageType::Warn, warning));
        }
    }

    if !result.errors.is_empty() {
        println!();
        println!("{}", style.section("ERRORS"));
        println!("{}", table::render_error_table(&result.errors));
    }
}

fn handle_plan(
    style: &Style,
    config: &GraftConfig,
    file: &Path,
    batch_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let data = read_data(file)?;
    let batch_size = batch_size.unwrap_or(config.loader.batch_size);

    let mut rows = Vec::new();
    for set in data.vertices.iter() {
        rows.push(PlanRow {
            type_name: set.type_name.clone(),
            kind: "vertex",
            records: set.records.len() as u64,
            batches: estimate_total_batches(set.records.len(), batch_size)? as u64,
        });
    }
    for set in data.edges.iter() {
        rows.push(PlanRow {
            type_name: set.type_name.clone(),
            kind: "edge",
            records: set.records.len() as u64,
            batches: estimate_total_batches(set.records.len(), batch_size)? as u64,
        });
    }

    let total_records: u64 = rows.iter().map(|r| r.records).sum();
    let total_batches: u64 = rows.iter().map(|r| r.batches).sum();

    if json {
        let types: Vec<_> = rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "type": row.type_name,
                    "kind": row.kind,
                    "records": row.records,
                    "batches": row.batches,
                })
            })
            .collect();
        return print_json(&serde_json::json!({
            "batchSize": batch_size,
            "totalRecords": total_records,
            "totalBatches": total_batches,
            "types": types,
        }));
    }

    if rows.is_empty() {
        println!("{}", style.message(MessageType::Info, "No records to load"));
        return Ok(());
    }

    println!(
        "{}",
        style.message(
            MessageType::Info,
            &format!(
                "{} records in {} batches of up to {}",
                format::format_thousands(total_records),
                format::format_thousands(total_batches),
                batch_size
            )
        )
    );
    println!();
    println!("{}", table::render_plan_table(&rows));
    Ok(())
}

/// Every violation in `data`, one row per rejected record.
fn collect_violations(schema: &dyn SchemaValidator, data: &GraphData) -> Vec<ViolationRow> {
    let mut rows = Vec::new();
    let mut push = |type_name: &str, record: usize, messages: Vec<String>| {
        if !messages.is_empty() {
            rows.push(ViolationRow {
                type_name: type_name.to_string(),
                record,
                message: messages.join("; "),
            });
        }
    };

    for set in data.vertices.iter() {
        let label_ok = is_label(&set.type_name);
        for (index, record) in set.records.iter().enumerate() {
            let mut messages: Vec<String> = schema
                .validate_vertex(&set.type_name, record)
                .iter()
                .map(ToString::to_string)
                .collect();
            if !label_ok {
                messages.insert(0, format!("type name `{}` is not a valid label", set.type_name));
            }
            push(&set.type_name, index, messages);
        }
    }

    for set in data.edges.iter() {
        let label_ok = is_label(&set.type_name);
        for (index, record) in set.records.iter().enumerate() {
            let mut messages: Vec<String> = schema
                .validate_edge(&set.type_name, record)
                .iter()
                .map(ToString::to_string)
                .collect();
            if !label_ok {
                messages.insert(0, format!("type name `{}` is not a valid label", set.type_name));
            }
            push(&set.type_name, index, messages);
        }
    }

    rows
}

fn handle_validate(style: &Style, file: &Path, schema_path: &Path, json: bool) -> Result<()> {
    let data = read_data(file)?;
    let schema = read_schema(schema_path)?;
    let violations = collect_violations(&schema, &data);
    let checked = data.vertex_record_count() + data.edge_record_count();

    if json {
        let rows: Vec<_> = violations
            .iter()
            .map(|row| {
                serde_json::json!({
                    "type": row.type_name,
                    "record": row.record,
                    "message": row.message,
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "valid": violations.is_empty(),
            "checked": checked,
            "violations": rows,
        }))?;
    } else if violations.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Ok,
                &format!("All {} records match the schema", format::format_thousands(checked as u64))
            )
        );
    } else {
        println!("{}", table::render_violation_table(&violations));
    }

    if !violations.is_empty() {
        return Err(anyhow!(
            "{} of {} records violate the schema",
            violations.len(),
            checked
        ));
    }
    Ok(())
}
