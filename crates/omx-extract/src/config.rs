//! Engine configuration
//!
//! All knobs the engine consumes are carried explicitly in [`ExtractConfig`]
//! and handed to the orchestrator at construction. There is no process-wide
//! mutable state.

use crate::error::{ExtractError, Result};
use crate::retry::RetryPolicy;
use chrono::{Duration, Local, NaiveDate};
use std::path::PathBuf;

/// Default number of partitions processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default page size requested from the source API.
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Configuration for one extraction run
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Directory receiving partition files and checkpoints.
    pub output_dir: PathBuf,

    /// Maximum number of partitions with in-flight work.
    pub concurrency: usize,

    /// Records requested per page.
    pub page_size: u32,

    /// Override for the source's first available date.
    pub start_date: Option<NaiveDate>,

    /// Last date (inclusive) to extract. Defaults to yesterday so a day whose
    /// updates are still landing is never ingested.
    pub as_of: Option<NaiveDate>,

    /// Per-request retry policy.
    pub retry: RetryPolicy,
}

impl ExtractConfig {
    /// Create a configuration with defaults for everything but the output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            start_date: None,
            as_of: None,
            retry: RetryPolicy::default(),
        }
    }

    /// The inclusive upper date bound for this run.
    pub fn effective_as_of(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| Local::now().date_naive() - Duration::days(1))
    }

    /// Validate the configuration before a run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ExtractError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ExtractError::Config(
                "page size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
