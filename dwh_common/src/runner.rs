//! Running named SQL statements in order.

use crate::db::SqlSession;
use crate::prelude::*;

/// Which part of a run a statement belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Dropping old tables.
    Drop,
    /// Creating tables.
    Create,
    /// Bulk-loading staging tables from S3.
    Copy,
    /// Filling the star schema from staging.
    Insert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Drop => "drop",
            Stage::Create => "create",
            Stage::Copy => "copy",
            Stage::Insert => "insert",
        };
        write!(f, "{}", name)
    }
}

/// A SQL statement, and the table it acts on.
#[derive(Clone, Debug)]
pub struct Statement {
    /// The stage this statement runs in.
    pub stage: Stage,
    /// The table this statement acts on.
    pub name: String,
    /// The SQL to run.
    pub sql: String,
}

impl Statement {
    /// Create a new statement.
    pub fn new(stage: Stage, name: impl Into<String>, sql: impl Into<String>) -> Statement {
        Statement {
            stage,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// A statement failed. The underlying database error is the cause of this
/// error.
#[derive(Debug, thiserror::Error)]
#[error("{stage} statement {position} ({name}) failed")]
pub struct StatementFailed {
    /// The stage we were running.
    pub stage: Stage,
    /// The position of the failed statement in its list, counting from 1.
    pub position: usize,
    /// The table the statement acts on.
    pub name: String,
}

/// Run `statements` in order, stopping at the first one which fails.
pub fn run_statements<S: SqlSession>(session: &S, statements: &[Statement]) -> Result<()> {
    let total = statements.len();
    for (idx, statement) in statements.iter().enumerate() {
        let position = idx + 1;
        info!(
            "{} {}/{}: {}",
            statement.stage, position, total, statement.name
        );
        trace!("SQL: {}", statement.sql);
        session.run_statement(&statement.sql).map_err(|err| {
            err.context(StatementFailed {
                stage: statement.stage,
                position,
                name: statement.name.clone(),
            })
        })?;
    }
    Ok(())
}
