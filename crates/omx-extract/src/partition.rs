//! Partition: the unit of extraction and checkpointing
//!
//! A partition is one inclusive date range for one source. It is addressed by
//! a deterministic key derived from `(source, range_start, range_end)` and is
//! never reprocessed once a checkpoint file exists for that key.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Marker written into the checkpoint of a partition that produced no records.
pub const NO_SAMPLES_MARKER: &str = "NO_SAMPLES";

/// Suffix of the data artifact.
pub const DATA_SUFFIX: &str = "ndjson.gz";

/// Lifecycle of one partition within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Pending,
    Fetching,
    Writing,
    /// Committed with at least one record.
    Done,
    /// Committed with zero records; checkpoint carries [`NO_SAMPLES_MARKER`].
    DoneEmpty,
    /// Terminal for this run only; retried from Pending next run.
    Failed,
}

impl PartitionState {
    /// Whether the state is terminal for the run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PartitionState::Done | PartitionState::DoneEmpty | PartitionState::Failed
        )
    }
}

/// One daily extraction unit for a source
#[derive(Debug, Clone)]
pub struct Partition {
    pub source_id: String,
    /// Inclusive range start.
    pub range_start: NaiveDate,
    /// Inclusive range end; equal to `range_start` at daily granularity.
    pub range_end: NaiveDate,
    pub state: PartitionState,
}

impl Partition {
    pub fn new(source_id: impl Into<String>, range_start: NaiveDate, range_end: NaiveDate) -> Self {
        Self {
            source_id: source_id.into(),
            range_start,
            range_end,
            state: PartitionState::Pending,
        }
    }

    /// Deterministic key, e.g. `biosamples-2021-01-01--2021-01-01--daily`.
    pub fn key(&self) -> String {
        format!(
            "{}-{}--{}--daily",
            self.source_id,
            self.range_start.format("%Y-%m-%d"),
            self.range_end.format("%Y-%m-%d")
        )
    }

    /// Canonical path of the committed data artifact.
    pub fn data_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.{}", self.key(), DATA_SUFFIX))
    }

    /// Temporary path the artifact is serialized to before the atomic rename.
    pub fn tmp_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.{}.tmp", self.key(), DATA_SUFFIX))
    }

    /// Path of the checkpoint file.
    pub fn checkpoint_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.{}.done", self.key(), DATA_SUFFIX))
    }

    /// Whether a previous run already committed this partition.
    pub fn is_checkpointed(&self, output_dir: &Path) -> bool {
        self.checkpoint_path(output_dir).exists()
    }
}

/// Durable marker proving a partition reached a terminal state
///
/// Written only after the data artifact (if any) is fully committed, so its
/// existence is sufficient evidence that the partition needs no reprocessing.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub key: String,
    pub state: PartitionState,
    /// Marker payload; [`NO_SAMPLES_MARKER`] for empty partitions.
    pub payload: Option<String>,
}

impl Checkpoint {
    /// Checkpoint for a partition committed with records.
    pub fn done(partition: &Partition) -> Self {
        Self {
            key: partition.key(),
            state: PartitionState::Done,
            payload: None,
        }
    }

    /// Checkpoint for a partition that produced no records.
    pub fn done_empty(partition: &Partition) -> Self {
        Self {
            key: partition.key(),
            state: PartitionState::DoneEmpty,
            payload: Some(NO_SAMPLES_MARKER.to_string()),
        }
    }

    /// Persist the checkpoint at the partition's checkpoint path.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.payload.as_deref().unwrap_or(""))
    }
}
