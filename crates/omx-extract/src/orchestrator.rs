//! Run orchestration
//!
//! Plans the partitions for a run, skips the ones a previous run already
//! checkpointed, and processes the rest as independent tokio tasks bounded
//! by a semaphore. Partition failures are isolated: one partition ending
//! `Failed` never aborts its siblings, and every terminal state is counted
//! in the run summary.

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};
use crate::fetch::{http_client, PageFetcher};
use crate::partition::{Partition, PartitionState};
use crate::planner::plan_partitions;
use crate::schema::normalize;
use crate::source::SourceSpec;
use crate::writer::PartitionWriter;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Log fetch progress every this many records within a partition.
const PROGRESS_EVERY: u64 = 10_000;

/// Outcome of one extraction run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Partitions excluded from scheduling because a checkpoint existed.
    pub skipped: usize,
    /// Partitions committed with records.
    pub succeeded: usize,
    /// Partitions committed empty.
    pub empty: usize,
    /// Failed partition keys with the failure reason.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// Whether the run as a whole succeeded.
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total partitions the plan contained.
    pub fn total(&self) -> usize {
        self.skipped + self.succeeded + self.empty + self.failed.len()
    }
}

/// Wires planner, fetcher, normalizer and writer into a run
pub struct Orchestrator {
    config: ExtractConfig,
    source: SourceSpec,
    client: Client,
}

impl Orchestrator {
    pub fn new(config: ExtractConfig, source: SourceSpec) -> Result<Self> {
        config.validate()?;
        let client = http_client()?;
        Ok(Self {
            config,
            source,
            client,
        })
    }

    /// The partitions this run would process, without fetching anything.
    pub fn plan(&self) -> Vec<Partition> {
        let start = self.config.start_date.unwrap_or(self.source.start_date);
        plan_partitions(&self.source.id, start, self.config.effective_as_of())
    }

    /// Execute the run: schedule every unchecked partition under the
    /// concurrency limit, wait for completion, and aggregate the outcome.
    pub async fn run(&self) -> Result<RunSummary> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let partitions = self.plan();
        info!(
            source = %self.source.id,
            partitions = partitions.len(),
            concurrency = self.config.concurrency,
            output_dir = %self.config.output_dir.display(),
            "Starting extraction run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<(String, Result<PartitionState>)> = JoinSet::new();
        let mut summary = RunSummary::default();

        for partition in partitions {
            if partition.is_checkpointed(&self.config.output_dir) {
                summary.skipped += 1;
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let source = self.source.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let key = partition.key();
                // No fetch or write work happens before a slot is acquired;
                // dropping the permit releases the slot on any exit path.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(closed) => {
                        return (key, Err(ExtractError::Config(closed.to_string())));
                    },
                };
                let outcome = process_partition(client, source, config, partition).await;
                (key, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(PartitionState::Done))) => summary.succeeded += 1,
                Ok((_, Ok(PartitionState::DoneEmpty))) => summary.empty += 1,
                Ok((key, Ok(state))) => {
                    // Commit only returns terminal success states.
                    summary
                        .failed
                        .push((key, format!("unexpected terminal state {:?}", state)));
                },
                // Resource failures (disk full, permission denied) cannot be
                // cured by retrying sibling partitions against the same disk:
                // stop scheduling and surface them at run level.
                Ok((key, Err(err @ ExtractError::Io(_)))) => {
                    error!(partition = %key, error = %err, "Resource failure, aborting run");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(err);
                },
                Ok((key, Err(err))) => {
                    error!(partition = %key, error = %err, "Partition failed");
                    summary.failed.push((key, err.to_string()));
                },
                Err(join_err) => {
                    error!(error = %join_err, "Partition task panicked");
                    summary
                        .failed
                        .push(("<unknown>".to_string(), join_err.to_string()));
                },
            }
        }

        info!(
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            empty = summary.empty,
            failed = summary.failed.len(),
            "Extraction run finished"
        );
        for (key, reason) in &summary.failed {
            error!(partition = %key, reason = %reason, "Partition left unchecked, will retry next run");
        }

        Ok(summary)
    }
}

/// Fetch, normalize and commit one partition.
async fn process_partition(
    client: Client,
    source: SourceSpec,
    config: ExtractConfig,
    partition: Partition,
) -> Result<PartitionState> {
    let key = partition.key();
    debug!(partition = %key, "Fetching");

    let entity = source.entity_type;
    let mut fetcher = PageFetcher::new(
        client,
        source,
        partition.clone(),
        config.page_size,
        config.retry.clone(),
    );
    let mut writer = PartitionWriter::new(&config.output_dir, partition);

    let mut last_reported = 0u64;
    while let Some(records) = fetcher.next_page().await? {
        for raw in records {
            writer.push(normalize(&raw, entity));
        }
        if fetcher.records_seen() / PROGRESS_EVERY > last_reported / PROGRESS_EVERY {
            info!(
                partition = %key,
                records = fetcher.records_seen(),
                "Fetch in progress"
            );
        }
        last_reported = fetcher.records_seen();
    }

    debug!(partition = %key, records = writer.record_count(), "Writing");
    writer.commit()
}
