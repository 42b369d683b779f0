//! `COPY` statements which bulk-load our staging tables from S3.

use handlebars::Handlebars;

use super::{STAGING_EVENTS, STAGING_SONGS};
use crate::config::S3Section;
use crate::prelude::*;
use crate::s3::{parse_s3_url, validate_role_arn};

/// Template for loading a staging table.
const COPY_TEMPLATE: &str = include_str!("copy_staging.sql.hbs");

/// How Redshift should map JSON fields onto columns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JsonPaths {
    /// Match JSON keys to column names.
    Auto,
    /// Use the JSONPaths file at this S3 URL.
    File(String),
}

impl JsonPaths {
    /// Interpret a `LOG_JSONPATH` value: `auto` in any case, or an S3 URL.
    pub fn from_config(value: &str) -> JsonPaths {
        if value.eq_ignore_ascii_case("auto") {
            JsonPaths::Auto
        } else {
            JsonPaths::File(value.to_owned())
        }
    }

    fn as_literal(&self) -> &str {
        match self {
            JsonPaths::Auto => "auto",
            JsonPaths::File(url) => url,
        }
    }
}

/// Where to load a staging table from.
#[derive(Clone, Debug)]
pub struct CopySource {
    /// The staging table to load.
    pub table: &'static str,
    /// An S3 prefix containing JSON records.
    pub location: String,
    /// How to map the records onto columns.
    pub json_paths: JsonPaths,
}

/// Our staging tables and where their data lives, in load order.
pub fn copy_sources(s3: &S3Section) -> Vec<CopySource> {
    vec![
        CopySource {
            table: STAGING_EVENTS,
            location: s3.log_data.clone(),
            json_paths: JsonPaths::from_config(&s3.log_jsonpath),
        },
        CopySource {
            table: STAGING_SONGS,
            location: s3.song_data.clone(),
            json_paths: JsonPaths::Auto,
        },
    ]
}

/// Parameters used to render `COPY_TEMPLATE`.
#[derive(Serialize)]
struct CopyParams<'a> {
    table: &'a str,
    location: &'a str,
    role_arn: &'a str,
    json_paths: &'a str,
}

/// Render a `COPY` statement for `source`, which will be run using the
/// permissions of `role_arn`.
///
/// Everything we interpolate is validated first, and then quoted as a SQL
/// string literal.
pub fn render_copy(source: &CopySource, role_arn: &str) -> Result<String> {
    parse_s3_url(&source.location)
        .with_context(|| format!("bad S3 location for {}", source.table))?;
    if let JsonPaths::File(url) = &source.json_paths {
        parse_s3_url(url)
            .with_context(|| format!("bad JSONPaths location for {}", source.table))?;
    }
    validate_role_arn(role_arn)?;

    let params = CopyParams {
        table: source.table,
        location: &source.location,
        role_arn,
        json_paths: source.json_paths.as_literal(),
    };

    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(escape_sql_literal);
    Ok(handlebars
        .render_template(COPY_TEMPLATE, &params)
        .context("error rendering COPY template")?)
}

/// Escape the contents of a single-quoted SQL string.
fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}
