//! Database utilities.

use backoff::ExponentialBackoff;
use diesel::{connection::SimpleConnection, Connection, PgConnection};
use std::env;
use url::Url;

use crate::config::ClusterSection;
use crate::prelude::*;

/// How long we keep retrying a failed connection. A freshly provisioned
/// cluster's DNS name can take a little while to resolve.
const MAX_CONNECT_TIME: Duration = Duration::from_secs(60);

/// Something we can run SQL statements against.
///
/// Statements run outside of `in_transaction` are committed as soon as they
/// succeed.
pub trait SqlSession {
    /// Run a single SQL statement, ignoring any rows it returns.
    fn run_statement(&self, sql: &str) -> Result<()>;

    /// Run `f` inside a transaction, which is committed if `f` succeeds and
    /// rolled back if it fails.
    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;
}

impl SqlSession for PgConnection {
    fn run_statement(&self, sql: &str) -> Result<()> {
        self.batch_execute(sql)?;
        Ok(())
    }

    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.transaction::<T, Error, F>(f)
    }
}

/// Get an appropriate database URL.
pub fn database_url(cluster: &ClusterSection) -> Result<String> {
    // Check the environment first, so it can be overridden for testing
    // against a local database.
    if let Ok(database_url) = env::var("DATABASE_URL") {
        return Ok(database_url);
    }

    let host = cluster.host()?;
    let mut url = Url::parse(&format!("postgres://{}", host))
        .with_context(|| format!("invalid cluster host {:?}", host))?;
    url.set_username(&cluster.db_user)
        .map_err(|()| format_err!("cannot use user name {:?}", cluster.db_user))?;
    url.set_password(Some(&cluster.db_password))
        .map_err(|()| format_err!("cannot use database password"))?;
    url.set_port(Some(cluster.db_port))
        .map_err(|()| format_err!("cannot use port {}", cluster.db_port))?;
    url.set_path(&cluster.db_name);
    Ok(url.to_string())
}

/// Hide the password in `database_url`, so we can print it.
pub fn redact_password(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() => {
            // This can only fail for URLs which can't have a password.
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "(invalid database URL)".to_owned(),
    }
}

/// Connect to the warehouse, retrying for a while if we can't.
pub fn connect(database_url: &str) -> Result<PgConnection> {
    let operation = || {
        PgConnection::establish(database_url)
            .map_err(|err| backoff::Error::transient(Error::from(err)))
    };
    let notify = |err: Error, wait: Duration| {
        debug!("could not connect (retrying in {:?}): {}", wait, err);
    };

    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(MAX_CONNECT_TIME),
        ..ExponentialBackoff::default()
    };
    let conn = backoff::retry_notify(backoff, operation, notify)
        // Unwrap the backoff error into something we can handle. This should
        // have been built in.
        .map_err(|e| match e {
            backoff::Error::Transient { err, .. } => err,
            backoff::Error::Permanent(err) => err,
        })
        .with_context(|| format!("error connecting to {}", redact_password(database_url)))?;
    Ok(conn)
}
