//! OMX Extract Library
//!
//! Incremental, concurrent extraction of paginated biomedical metadata
//! collections into partitioned, schema-consistent files.
//!
//! The engine turns a cursor-paginated remote collection into a set of
//! independently-resumable, atomically-written daily partitions:
//!
//! - [`planner`] enumerates the daily date ranges to process
//! - [`fetch`] walks one partition's pages with per-request retry
//! - [`schema`] conforms raw payloads to a fixed per-entity field list
//! - [`writer`] buffers records and commits them atomically
//! - [`orchestrator`] schedules partitions under a concurrency budget and
//!   skips partitions that already have a checkpoint
//!
//! # Example
//!
//! ```no_run
//! use omx_extract::config::ExtractConfig;
//! use omx_extract::orchestrator::Orchestrator;
//! use omx_extract::source::SourceSpec;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExtractConfig::new("./data/biosamples");
//!     let source = SourceSpec::ebi_biosamples();
//!     let summary = Orchestrator::new(config, source)?.run().await?;
//!     println!("{} partitions extracted", summary.succeeded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod partition;
pub mod planner;
pub mod retry;
pub mod schema;
pub mod source;
pub mod writer;

pub use error::{ExtractError, Result};
