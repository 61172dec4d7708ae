//! OMX Extract - incremental metadata extraction tool

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use omx_common::logging::{init_logging, LogConfig, LogLevel};
use omx_extract::config::ExtractConfig;
use omx_extract::orchestrator::Orchestrator;
use omx_extract::source::SourceSpec;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "omx-extract")]
#[command(author, version, about = "OMX incremental metadata extraction tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Extract all unchecked partitions for a source
    Extract {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Print the partition plan without fetching anything
    Plan {
        #[command(flatten)]
        args: RunArgs,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Output directory for partition files and checkpoints
    #[arg(short, long, default_value = "./data/biosamples")]
    output: String,

    /// Maximum number of partitions processed concurrently
    #[arg(short, long, default_value_t = omx_extract::config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Records requested per page
    #[arg(long, default_value_t = omx_extract::config::DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Override the source's first available date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last date to extract, inclusive (YYYY-MM-DD, default: yesterday)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Override the source base URL
    #[arg(long, env = "OMX_BASE_URL")]
    base_url: Option<String>,
}

impl RunArgs {
    fn into_parts(self) -> (ExtractConfig, SourceSpec) {
        let mut config = ExtractConfig::new(self.output);
        config.concurrency = self.concurrency;
        config.page_size = self.page_size;
        config.start_date = self.start_date;
        config.as_of = self.as_of;

        let mut source = SourceSpec::ebi_biosamples();
        if let Some(base_url) = self.base_url {
            source = source.with_base_url(base_url);
        }
        (config, source)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.log_file_prefix = "omx-extract".to_string();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    init_logging(&log_config)?;

    match cli.command {
        Command::Extract { args } => {
            let (config, source) = args.into_parts();
            info!(source = %source.id, "Extracting");
            let summary = Orchestrator::new(config, source)?.run().await?;
            if !summary.is_ok() {
                anyhow::bail!(
                    "{} of {} partitions failed; re-run the same command to retry them",
                    summary.failed.len(),
                    summary.total()
                );
            }
        },
        Command::Plan { args } => {
            let (config, source) = args.into_parts();
            let orchestrator = Orchestrator::new(config.clone(), source)?;
            for partition in orchestrator.plan() {
                let checkpointed = partition.is_checkpointed(&config.output_dir);
                println!(
                    "{}\t{}",
                    partition.key(),
                    if checkpointed { "checkpointed" } else { "pending" }
                );
            }
        },
    }

    info!("Done");
    Ok(())
}
