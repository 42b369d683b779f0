//! The ETL: load the staging tables from S3, then fill the star schema.

use crate::db::SqlSession;
use crate::order::create_order;
use crate::prelude::*;
use crate::runner::{run_statements, Stage, Statement};
use crate::sql::{catalogue, copy_sources, insert_sql, render_copy, TableKind};

/// Everything the ETL will run, rendered up front so that bad configuration
/// is reported before we touch the database.
#[derive(Clone, Debug)]
pub struct LoadPlan {
    /// `COPY` statements for the staging tables.
    pub copies: Vec<Statement>,
    /// `INSERT` statements for the warehouse tables, in dependency order.
    pub inserts: Vec<Statement>,
}

impl LoadPlan {
    /// Build a plan using the S3 locations and role ARN in `config`.
    pub fn new(config: &Config) -> Result<LoadPlan> {
        let role_arn = config.iam_role.arn()?;
        let copies = copy_sources(&config.s3)
            .iter()
            .map(|source| -> Result<Statement> {
                Ok(Statement::new(
                    Stage::Copy,
                    source.table,
                    render_copy(source, role_arn)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LoadPlan {
            copies,
            inserts: insert_statements()?,
        })
    }
}

/// The statements which fill the star schema from staging, dimensions first.
pub fn insert_statements() -> Result<Vec<Statement>> {
    create_order(catalogue())?
        .into_iter()
        .filter(|t| t.kind != TableKind::Staging)
        .map(|t| -> Result<Statement> {
            Ok(Statement::new(Stage::Insert, t.name, insert_sql(t)?))
        })
        .collect()
}

/// Run `statements` in a single transaction.
pub fn run_stage<S: SqlSession>(session: &S, statements: &[Statement]) -> Result<()> {
    session.in_transaction(|| run_statements(session, statements))
}

/// Bulk-load the staging tables from S3.
#[tracing::instrument(skip_all)]
pub fn load_staging<S: SqlSession>(session: &S, plan: &LoadPlan) -> Result<()> {
    info!("loading staging tables from S3");
    run_stage(session, &plan.copies)?;
    info!("staging tables loaded");
    Ok(())
}

/// Fill the star schema from the staging tables.
#[tracing::instrument(skip_all)]
pub fn insert_warehouse<S: SqlSession>(session: &S, plan: &LoadPlan) -> Result<()> {
    info!("inserting staged data into warehouse tables");
    run_stage(session, &plan.inserts)?;
    info!("warehouse tables populated");
    Ok(())
}

/// Run the whole ETL. If the insert stage fails, the staging tables stay
/// loaded.
#[tracing::instrument(skip_all)]
pub fn run_etl<S: SqlSession>(session: &S, plan: &LoadPlan) -> Result<()> {
    load_staging(session, plan)?;
    insert_warehouse(session, plan)
}
