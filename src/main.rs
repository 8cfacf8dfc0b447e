use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use qledger::config::{FileConfig, Overrides, Settings};
use qledger::io::open_codec;
use qledger::registry::{HttpRegistry, QueryRegistry, UnconfiguredRegistry};
use qledger::report::write_report;
use qledger::{PersistMode, Reconciler, Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.log_level.as_deref())?;
    match cli.command {
        Command::Reconcile(args) => execute_reconcile(args),
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|err| ToolError::Logging(err.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn execute_reconcile(args: ReconcileArgs) -> Result<()> {
    if !args.ledger.exists() {
        return Err(ToolError::MissingInput(args.ledger));
    }

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(file, args.overrides())?;

    let codec = open_codec(&args.ledger)?;
    let registry: Box<dyn QueryRegistry> = match &settings.registry_url {
        Some(url) => Box::new(HttpRegistry::new(url, settings.token, settings.timeout)?),
        None => Box::new(UnconfiguredRegistry),
    };
    let reconciler = Reconciler::new(registry, codec, settings.options);

    let report = reconciler.run()?;
    write_report(&mut std::io::stdout().lock(), &report, args.json)
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Reconcile a ledger of long-running queries with the remote query registry."
)]
struct Cli {
    /// Log filter directive (overrides RUST_LOG), e.g. `debug` or `qledger=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge finished query results into the ledger and report what changed.
    Reconcile(ReconcileArgs),
}

#[derive(clap::Args)]
struct ReconcileArgs {
    /// Ledger file (.csv, .tsv or .xlsx).
    ledger: PathBuf,

    /// Base URL of the query registry.
    #[arg(long, env = "QLEDGER_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Environment variable holding the registry bearer token.
    #[arg(long)]
    token_env: Option<String>,

    /// Optional TOML configuration file.
    #[arg(long, env = "QLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Header of the query identifier column.
    #[arg(long)]
    id_column: Option<String>,

    /// Header of the status column.
    #[arg(long)]
    status_column: Option<String>,

    /// Header of the result-size column.
    #[arg(long)]
    size_column: Option<String>,

    /// When to write the ledger back.
    #[arg(long, value_enum)]
    persist: Option<PersistArg>,

    /// Per-request timeout for registry calls, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the report as JSON instead of a text summary.
    #[arg(long)]
    json: bool,
}

impl ReconcileArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            registry_url: self.registry_url.clone(),
            token_env: self.token_env.clone(),
            timeout_secs: self.timeout_secs,
            id_column: self.id_column.clone(),
            status_column: self.status_column.clone(),
            size_column: self.size_column.clone(),
            persist: self.persist.map(PersistMode::from),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PersistArg {
    EachCompletion,
    EndOfRun,
}

impl From<PersistArg> for PersistMode {
    fn from(arg: PersistArg) -> Self {
        match arg {
            PersistArg::EachCompletion => PersistMode::EachCompletion,
            PersistArg::EndOfRun => PersistMode::EndOfRun,
        }
    }
}
