//! `db` subcommand for interaction with the database.

use dwh_common::{db::database_url, prelude::*};
use std::process;
use structopt::StructOpt;

/// Commands for interacting with the database.
#[derive(Debug, StructOpt)]
pub enum Opt {
    /// Access the database console.
    #[structopt(name = "console")]
    Console,
    /// Print out a URL for connecting to the database.
    #[structopt(name = "url")]
    Url,
}

/// Run the `db` subcommand.
pub fn run(config: &Config, opt: &Opt) -> Result<()> {
    match opt {
        Opt::Console => run_console(config),
        Opt::Url => run_url(config),
    }
}

/// Connect to the database console.
fn run_console(config: &Config) -> Result<()> {
    let url = database_url(&config.cluster)?;
    let status = process::Command::new("psql")
        .arg(&url)
        .status()
        .context("error starting psql")?;
    if !status.success() {
        return Err(format_err!("psql exited with {}", status));
    }
    Ok(())
}

/// Print out the database URL.
fn run_url(config: &Config) -> Result<()> {
    let url = database_url(&config.cluster)?;
    println!("{}", url);
    Ok(())
}
