//! Subcommands.

pub mod create_tables;
pub mod db;
pub mod decommission;
pub mod etl;
pub mod provision;
pub mod status;
