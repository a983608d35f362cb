use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Load every input file into the destination as one tracked run
    Load(LoadArgs),

    /// List indexed runs, most recent first
    Runs {
        #[command(flatten)]
        registry: RegistryArgs,

        #[arg(long, help = "Only runs for this cloud provider")]
        provider: Option<String>,

        #[arg(long, help = "Only runs with this status (pending, running, completed, failed)")]
        status: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(long, help = "Show at most this many runs")]
        limit: Option<usize>,

        #[arg(long, help = "Print the runs as JSON instead of a table")]
        json: bool,
    },

    /// Print one run's index entry and summary
    Show {
        run_id: String,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Compare throughput and duration across completed runs
    Compare {
        #[command(flatten)]
        registry: RegistryArgs,

        #[arg(long, help = "Only runs for this cloud provider")]
        provider: Option<String>,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<PathBuf>,

        #[arg(long, help = "Print a readable table instead of JSON", conflicts_with = "output")]
        table: bool,
    },

    /// Connect to the configured destination and run a trivial query
    TestConn {
        #[command(flatten)]
        env: EnvArgs,

        #[arg(long, help = "Provider whose credentials to use (defaults to CLOUD_PROVIDER)")]
        provider: Option<String>,
    },
}

#[derive(Args)]
pub struct LoadArgs {
    #[arg(long, help = "Directory holding the JSON input files")]
    pub input_dir: PathBuf,

    #[arg(long, default_value_t = 1000, help = "Records per batch (100, 500, 1000, 2000, 5000)")]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1, help = "Parallel workers and pool size (1, 2, 5, 10)")]
    pub concurrency: usize,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub env: EnvArgs,

    #[arg(long, help = "Cloud provider label (overrides CLOUD_PROVIDER)")]
    pub provider: Option<String>,

    #[arg(long, help = "Instance type label (overrides INSTANCE_TYPE)")]
    pub instance_type: Option<String>,

    #[arg(long, help = "JSON file with file-prefix to table rules")]
    pub mapping: Option<PathBuf>,

    #[arg(long, help = "Milliseconds to wait for a pooled connection")]
    pub acquire_timeout_ms: Option<u64>,

    #[arg(long, help = "Flush the batch log every N batches")]
    pub snapshot_interval: Option<usize>,

    #[arg(long, help = "Record destination row counts before and after the load")]
    pub table_counts: bool,

    #[arg(long, help = "Exit with status 2 when any batch failed")]
    pub fail_on_batch_errors: bool,
}

#[derive(Args)]
pub struct RegistryArgs {
    #[arg(long, default_value = "migration_outputs", help = "Root of run outputs and the run index")]
    pub output_dir: PathBuf,
}

#[derive(Args)]
pub struct EnvArgs {
    #[arg(long, default_value = ".env", help = "Optional KEY=VALUE file layered over the environment")]
    pub env_file: PathBuf,
}
