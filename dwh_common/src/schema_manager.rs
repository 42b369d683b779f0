//! Resetting the warehouse schema.

use crate::db::SqlSession;
use crate::order::{create_order, drop_order};
use crate::prelude::*;
use crate::runner::{run_statements, Stage, Statement};
use crate::sql::{catalogue, Dialect};

/// The statements needed to drop every table and create it again.
pub fn reset_statements(dialect: Dialect) -> Result<Vec<Statement>> {
    let tables = catalogue();
    let drops = drop_order(tables)?
        .into_iter()
        .map(|t| Statement::new(Stage::Drop, t.name, t.drop_sql()));
    let creates = create_order(tables)?
        .into_iter()
        .map(|t| Statement::new(Stage::Create, t.name, t.create_sql(dialect)));
    Ok(drops.chain(creates).collect())
}

/// Drop all our tables and recreate them empty.
///
/// Each statement is committed as soon as it succeeds, and we stop at the
/// first failure.
#[tracing::instrument(skip(session))]
pub fn reset_schema<S: SqlSession>(session: &S, dialect: Dialect) -> Result<()> {
    let statements = reset_statements(dialect)?;
    info!("dropping and creating {} tables", catalogue().len());
    run_statements(session, &statements)?;
    info!("all tables created");
    Ok(())
}
