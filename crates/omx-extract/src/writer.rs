//! Partition writer
//!
//! Buffers the normalized records of one partition and commits them with a
//! two-step protocol: serialize to a `.tmp` path, atomically rename to the
//! canonical path, then write the checkpoint. A consumer globbing the output
//! directory therefore never observes a half-written artifact, and a crash
//! between steps leaves at most a stray `.tmp` file and no checkpoint.

use crate::error::Result;
use crate::partition::{Checkpoint, Partition, PartitionState};
use crate::schema::NormalizedRecord;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Accumulates one partition's records and commits them atomically
pub struct PartitionWriter {
    output_dir: PathBuf,
    partition: Partition,
    records: Vec<NormalizedRecord>,
}

impl PartitionWriter {
    pub fn new(output_dir: impl Into<PathBuf>, partition: Partition) -> Self {
        Self {
            output_dir: output_dir.into(),
            partition,
            records: Vec::new(),
        }
    }

    /// Buffer one normalized record.
    pub fn push(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }

    /// Number of records buffered so far.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Commit the partition and return its terminal state.
    ///
    /// Zero records: write the `NO_SAMPLES` checkpoint and no data artifact.
    /// Otherwise: gzip-NDJSON the buffer to the tmp path, rename to the
    /// canonical path, then write the checkpoint.
    pub fn commit(self) -> Result<PartitionState> {
        let key = self.partition.key();

        if self.records.is_empty() {
            let checkpoint = Checkpoint::done_empty(&self.partition);
            checkpoint.write(&self.partition.checkpoint_path(&self.output_dir))?;
            info!(partition = %key, "Partition committed with no records");
            return Ok(PartitionState::DoneEmpty);
        }

        let tmp_path = self.partition.tmp_path(&self.output_dir);
        let data_path = self.partition.data_path(&self.output_dir);

        let file = std::fs::File::create(&tmp_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        for record in &self.records {
            serde_json::to_writer(&mut encoder, record)?;
            encoder.write_all(b"\n")?;
        }
        let file = encoder.finish()?;
        file.sync_all()?;
        debug!(partition = %key, path = %tmp_path.display(), "Serialized partition buffer");

        std::fs::rename(&tmp_path, &data_path)?;

        let checkpoint = Checkpoint::done(&self.partition);
        checkpoint.write(&self.partition.checkpoint_path(&self.output_dir))?;

        info!(
            partition = %key,
            records = self.records.len(),
            path = %data_path.display(),
            "Partition committed"
        );
        Ok(PartitionState::Done)
    }
}
