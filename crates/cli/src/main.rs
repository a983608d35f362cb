use crate::{
    commands::{Commands, EnvArgs, LoadArgs},
    conn::PostgresConnectionPinger,
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::sql::postgres::connection::PgConnectionFactory;
use engine_config::{
    database::DatabaseSettings,
    mapping::TableMapping,
    settings::{LoadSettings, UNKNOWN_LABEL, batch_size::BatchSize, concurrency::Concurrency},
};
use engine_core::{comparison::compare_runs, registry::RunRegistry};
use engine_runtime::LoadRunner;
use model::execution::run::{RunFilter, RunStatus};
use std::{num::NonZeroUsize, path::Path, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "loadbench",
    version = "0.1.0",
    about = "Batch loader that benchmarks database ingestion runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match run(cli.command, &shutdown).await {
        Ok(code) => code,
        Err(e) if shutdown.is_shutdown_requested() => {
            warn!(error = %e, "Stopped after shutdown request");
            ExitCode::ShutdownRequested
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(command: Commands, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    match command {
        Commands::Load(args) => load(args, shutdown).await,
        Commands::Runs {
            registry,
            provider,
            status,
            batch_size,
            concurrency,
            limit,
            json,
        } => {
            let status = status
                .map(|s| s.parse::<RunStatus>())
                .transpose()
                .map_err(CliError::Config)?;
            let filter = RunFilter {
                provider,
                status,
                batch_size,
                concurrency,
                limit,
            };
            let registry = RunRegistry::open(&registry.output_dir).await?;
            let runs = registry.list_runs(&filter).await?;
            output::print_runs(&runs, json)?;
            Ok(ExitCode::Success)
        }
        Commands::Show { run_id, registry } => {
            let registry = RunRegistry::open(&registry.output_dir).await?;
            let record = registry.get_run(&run_id).await?;
            let summary = registry.artifacts(&record).read_results().await?;
            output::print_run(&record, summary.as_ref())?;
            Ok(ExitCode::Success)
        }
        Commands::Compare {
            registry,
            provider,
            output: report_path,
            table,
        } => {
            let registry = RunRegistry::open(&registry.output_dir).await?;
            let filter = RunFilter {
                provider,
                status: Some(RunStatus::Completed),
                ..Default::default()
            };
            let comparison = compare_runs(&registry.list_runs(&filter).await?);

            match report_path {
                Some(path) => {
                    output::write_comparison(&comparison, &path).await?;
                    info!(path = %path.display(), "Comparison written");
                }
                None if table => output::print_comparison(&comparison),
                None => println!("{}", serde_json::to_string_pretty(&comparison)?),
            }
            Ok(ExitCode::Success)
        }
        Commands::TestConn { env, provider } => {
            let vars = load_env(&env).await?;
            let provider = provider
                .or_else(|| vars.get("CLOUD_PROVIDER").map(str::to_string))
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
            let database = DatabaseSettings::from_env(&provider, vars.all())?;
            info!(provider = %provider, database = ?database, "Testing destination connection");

            PostgresConnectionPinger {
                conn_str: database.connection_url(),
            }
            .ping()
            .await?;
            Ok(ExitCode::Success)
        }
    }
}

async fn load(args: LoadArgs, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    let vars = load_env(&args.env).await?;

    let mut settings = LoadSettings::new(
        BatchSize::try_from(args.batch_size)?,
        Concurrency::try_from(args.concurrency)?,
    )
    .with_env_labels(vars.all());
    if let Some(provider) = args.provider {
        settings.cloud_provider = provider;
    }
    if let Some(instance) = args.instance_type {
        settings.instance_type = instance;
    }
    if let Some(ms) = args.acquire_timeout_ms {
        settings.acquire_timeout = Duration::from_millis(ms);
    }
    if let Some(n) = args.snapshot_interval {
        settings.snapshot_interval = NonZeroUsize::new(n)
            .ok_or_else(|| CliError::Config("--snapshot-interval must be positive".into()))?;
    }
    settings.output_dir = args.registry.output_dir.clone();
    settings.collect_table_counts = args.table_counts;

    let mapping = load_mapping(args.mapping.as_deref())?;
    let database = DatabaseSettings::from_env(&settings.cloud_provider, vars.all())?;
    let factory = Arc::new(PgConnectionFactory::new(&database.connection_url())?);
    let registry = Arc::new(RunRegistry::open(&settings.output_dir).await?);

    let runner = LoadRunner::new(registry, factory, shutdown.cancel_token());
    let report = runner
        .run(&args.input_dir, &mapping, settings.to_run_config(&mapping))
        .await?;

    output::print_summary(&report.summary);
    Ok(ExitCode::for_load(
        report.interrupted || shutdown.is_shutdown_requested(),
        report.summary.status == RunStatus::Failed,
        report.summary.failed_batches,
        args.fail_on_batch_errors,
    ))
}

async fn load_env(args: &EnvArgs) -> Result<EnvManager, CliError> {
    let mut env = EnvManager::new();
    if env.load_optional(&args.env_file).await? {
        info!(path = %args.env_file.display(), "Loaded env file");
    }
    Ok(env)
}

fn load_mapping(path: Option<&Path>) -> Result<TableMapping, CliError> {
    let mapping = match path {
        Some(path) => TableMapping::from_json_file(path)?,
        None => TableMapping::default(),
    };
    mapping.validate()?;
    Ok(mapping)
}
