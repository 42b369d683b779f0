//! The `etl` subcommand.

use dwh_common::{
    db::{connect, database_url},
    loader::{run_etl, LoadPlan},
    prelude::*,
};

/// Run the ETL.
pub fn run(config: &Config) -> Result<()> {
    let plan = LoadPlan::new(config)?;
    let conn = connect(&database_url(&config.cluster)?)?;
    run_etl(&conn, &plan)
}
