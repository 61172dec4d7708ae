//! OMX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared logging setup for the OMX workspace members.
//!
//! # Example
//!
//! ```no_run
//! use omx_common::logging::{LogConfig, init_logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod logging;
