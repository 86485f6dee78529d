use std::path::PathBuf;
use std::process::ExitCode;
use clap::{Parser, Subcommand};
use reference_loader::{
    config::Config,
    context::AppContext,
    domain::models::{ExecutionMode, IngestionResult},
    file_loader::{self, LoadRequest},
    http_service::{run_http_service, IngestionHttpService},
    infrastructure::parser_adapter::ParserAdapter,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Loads prepared reference data into the shared store")]
struct Cli {
    /// YAML config file. Environment variables are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the ingestion HTTP API.
    Serve,
    /// Load a CSV or JSON file into a destination.
    Load {
        #[arg(long)]
        destination: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        clear_first: bool,
        /// "batch" or "row"; defaults to the destination's mode.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ExecutionMode>,
    },
    /// Create test accounts from a JSON array file.
    Provision {
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_mode(value: &str) -> Result<ExecutionMode, String> {
    ExecutionMode::parse(value).ok_or_else(|| format!("expected \"batch\" or \"row\", got \"{value}\""))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("reference_loader=debug".parse()?)
            .add_directive("aws_sdk=warn".parse()?)
            .add_directive("mongodb=info".parse()?))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::from_env()?,
    };
    debug!("Database: {:?}, listener: {}:{}", config.database, config.listener.host, config.listener.port);

    let context = AppContext::from_config(&config).await?;
    info!("Application context initialized successfully");

    match cli.command {
        Command::Serve => {
            let service = IngestionHttpService::new(context, &config.cors_allow_origin, config.max_body_bytes)?;
            run_http_service(&config.listener.host, config.listener.port, service).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { destination, file, clear_first, mode } => {
            let cancel = cancel_on_ctrl_c();
            let result = file_loader::load_file(
                &context.ingestion,
                &ParserAdapter::new(),
                LoadRequest { destination: &destination, path: &file, clear_first, mode },
                &cancel,
            )
            .await?;
            report(&result)
        }
        Command::Provision { file } => {
            let Some(provisioner) = context.provisioner else {
                return Err("IDENTITY_URL and IDENTITY_SERVICE_KEY must be set to provision accounts".into());
            };
            let entries = file_loader::read_records(&ParserAdapter::new(), &file).await?;
            let cancel = cancel_on_ctrl_c();
            let result = provisioner.provision(&entries, &cancel).await;
            report(&result)
        }
    }
}

/// Stops at the next record boundary on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing the current record and stopping");
            token.cancel();
        }
    });
    cancel
}

fn report(result: &IngestionResult) -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if result.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
