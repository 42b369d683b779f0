//! The `create-tables` subcommand.

use dwh_common::{
    db::{connect, database_url},
    prelude::*,
    schema_manager::reset_schema,
    sql::Dialect,
};

/// Drop and recreate every table.
pub fn run(config: &Config) -> Result<()> {
    let conn = connect(&database_url(&config.cluster)?)?;
    reset_schema(&conn, Dialect::Redshift)
}
