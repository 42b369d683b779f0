//! Code shared by the `dwh` tools: provisioning the Redshift cluster, resetting
//! the warehouse schema, and running the staging and star-schema loads.

#![warn(missing_docs)]

pub use anyhow;
pub use diesel;
pub use tracing;

pub mod aws;
pub mod config;
pub mod db;
pub mod decommission;
pub mod errors;
pub mod loader;
pub mod order;
pub mod poll;
pub mod provision;
pub mod runner;
pub mod s3;
pub mod schema_manager;
pub mod sql;
#[cfg(test)]
mod testing;
pub mod tracing_support;

/// Common imports used by many modules.
pub mod prelude {
    pub use anyhow::{format_err, Context};
    pub use serde::{Deserialize, Serialize};
    pub use std::{
        fmt,
        path::{Path, PathBuf},
        time::Duration,
    };
    pub use tracing::{debug, error, info, trace, warn};

    pub use super::config::Config;
    pub use super::errors::ReportExt;
    pub use super::{Error, Result};
}

/// Error type for this crate's functions.
pub type Error = anyhow::Error;

/// Result type for this crate's functions.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;
