//! The `dwh.toml` configuration file.
//!
//! Every subcommand reads this file when it starts. The file is also the only
//! way state passes between subcommands: once the cluster is available,
//! `provision` writes `[CLUSTER] HOST` and `[IAM_ROLE] ARN` back into it, and
//! `create-tables` and `etl` read them from there.

use std::fs;
use thiserror::Error;
use toml_edit::DocumentMut;

use crate::prelude::*;

/// The AWS region used when `[AWS] REGION` is not set.
pub const DEFAULT_REGION: &str = "us-west-2";

/// A configuration value which is missing or unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value which is optional in the file is needed by this command.
    #[error("[{section}] {key} is not set (has `dwh provision` been run?)")]
    MissingValue {
        /// The TOML table containing the value.
        section: &'static str,
        /// The key within `section`.
        key: &'static str,
    },

    /// A value is present, but we can't use it.
    #[error("[{section}] {key} is invalid: {reason}")]
    InvalidValue {
        /// The TOML table containing the value.
        section: &'static str,
        /// The key within `section`.
        key: &'static str,
        /// Why we rejected the value.
        reason: String,
    },
}

/// Our complete configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// AWS credentials.
    pub aws: AwsSection,
    /// Parameters used to create the cluster.
    pub dwh: DwhSection,
    /// Database connection parameters.
    pub cluster: ClusterSection,
    /// The role the cluster uses to read from S3. Filled in by `provision`.
    #[serde(default)]
    pub iam_role: IamRoleSection,
    /// Where our raw data lives.
    pub s3: S3Section,
    /// How we wait for the cluster to change state.
    #[serde(default)]
    pub polling: PollingSection,
}

impl Config {
    /// Load our configuration from `path`.
    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("could not parse {}", path.display()))
    }
}

/// The `[AWS]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AwsSection {
    /// Our `AWS_ACCESS_KEY_ID`.
    pub key: String,
    /// Our `AWS_SECRET_ACCESS_KEY`.
    pub secret: String,
    /// The region containing our cluster.
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

/// The `[DWH]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DwhSection {
    /// Either `single-node` or `multi-node`.
    pub cluster_type: String,
    /// The Redshift node type, e.g. `dc2.large`.
    pub node_type: String,
    /// The number of nodes. Redshift requires this for `multi-node` clusters.
    #[serde(default)]
    pub num_nodes: Option<u32>,
    /// The name of the IAM role the cluster assumes to read from S3.
    pub iam_role_name: String,
    /// The identifier of our cluster.
    pub cluster_identifier: String,
}

/// The `[CLUSTER]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClusterSection {
    /// The cluster endpoint. Written by `provision`.
    #[serde(default)]
    pub host: Option<String>,
    /// The name of our database.
    pub db_name: String,
    /// The master user name.
    pub db_user: String,
    /// The master user password.
    pub db_password: String,
    /// The port the database listens on.
    pub db_port: u16,
}

impl ClusterSection {
    /// The cluster endpoint, which only exists once `provision` has run.
    pub fn host(&self) -> Result<&str, ConfigError> {
        self.host.as_deref().ok_or(ConfigError::MissingValue {
            section: "CLUSTER",
            key: "HOST",
        })
    }
}

/// The `[IAM_ROLE]` section.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IamRoleSection {
    /// The ARN of our role. Written by `provision`.
    #[serde(default)]
    pub arn: Option<String>,
}

impl IamRoleSection {
    /// The role ARN, which only exists once `provision` has run.
    pub fn arn(&self) -> Result<&str, ConfigError> {
        self.arn.as_deref().ok_or(ConfigError::MissingValue {
            section: "IAM_ROLE",
            key: "ARN",
        })
    }
}

/// The `[S3]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct S3Section {
    /// The prefix containing our event logs.
    pub log_data: String,
    /// A JSONPaths file describing how to map event logs onto columns.
    pub log_jsonpath: String,
    /// The prefix containing our song metadata.
    pub song_data: String,
}

/// The `[POLLING]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PollingSection {
    /// How long to sleep between status checks.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// How many times to check before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingSection {
    fn default() -> Self {
        PollingSection {
            interval: default_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    90
}

/// The values `provision` hands to later subcommands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterHandoff {
    /// The cluster's endpoint address.
    pub host: String,
    /// The ARN of the role attached to the cluster.
    pub role_arn: String,
}

impl ClusterHandoff {
    /// Write `[CLUSTER] HOST` and `[IAM_ROLE] ARN` into the configuration file
    /// at `path`. Every other key keeps its current value.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        debug!("recording cluster endpoint and role ARN in {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut doc: DocumentMut = text
            .parse()
            .with_context(|| format!("could not parse {}", path.display()))?;

        set_string(&mut doc, "CLUSTER", "HOST", &self.host)?;
        set_string(&mut doc, "IAM_ROLE", "ARN", &self.role_arn)?;

        fs::write(path, doc.to_string())
            .with_context(|| format!("could not write {}", path.display()))?;
        Ok(())
    }
}

/// Set `[section] key = value`, creating the section if needed. Comments and
/// formatting elsewhere in `doc` are left alone.
fn set_string(
    doc: &mut DocumentMut,
    section: &'static str,
    key: &'static str,
    value: &str,
) -> Result<()> {
    let table = doc
        .entry(section)
        .or_insert(toml_edit::table())
        .as_table_mut()
        .ok_or(ConfigError::InvalidValue {
            section,
            key,
            reason: format!("[{}] is not a table", section),
        })?;
    table.insert(key, toml_edit::value(value));
    Ok(())
}

#[cfg(test)]
pub(crate) const EXAMPLE_CONFIG: &str = r#"
[AWS]
KEY = "AKIAEXAMPLE"
SECRET = "example-secret"

[DWH]
CLUSTER_TYPE = "multi-node"
NUM_NODES = 4
NODE_TYPE = "dc2.large"
IAM_ROLE_NAME = "dwhRole"
CLUSTER_IDENTIFIER = "dwhCluster"

[CLUSTER]
DB_NAME = "dwh"
DB_USER = "dwhuser"
DB_PASSWORD = "Passw0rd"
DB_PORT = 5439

[S3]
LOG_DATA = "s3://udacity-dend/log_data"
LOG_JSONPATH = "s3://udacity-dend/log_json_path.json"
SONG_DATA = "s3://udacity-dend/song_data"
"#;

#[cfg(test)]
mod tests {
    use std::io::Write;
    use tempfile::NamedTempFile;
    use toml::{Table, Value};

    use super::*;

    fn example_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("could not create temp file");
        file.write_all(EXAMPLE_CONFIG.as_bytes())
            .expect("could not write temp file");
        file
    }

    #[test]
    fn parses_example_with_defaults() {
        let config: Config = toml::from_str(EXAMPLE_CONFIG).expect("parse error");
        assert_eq!(config.aws.region, DEFAULT_REGION);
        assert_eq!(config.dwh.num_nodes, Some(4));
        assert_eq!(config.cluster.db_port, 5439);
        assert_eq!(config.polling.interval, Duration::from_secs(10));
        assert_eq!(config.polling.max_attempts, 90);
        assert!(config.cluster.host.is_none());
        assert!(config.iam_role.arn().is_err());
    }

    #[test]
    fn parses_polling_durations() {
        let text = format!("{}\n[POLLING]\nINTERVAL = \"30s\"\n", EXAMPLE_CONFIG);
        let config: Config = toml::from_str(&text).expect("parse error");
        assert_eq!(config.polling.interval, Duration::from_secs(30));
        assert_eq!(config.polling.max_attempts, 90);
    }

    #[test]
    fn missing_host_names_the_key() {
        let config: Config = toml::from_str(EXAMPLE_CONFIG).expect("parse error");
        let err = config.cluster.host().unwrap_err();
        assert!(err.to_string().starts_with("[CLUSTER] HOST is not set"));
    }

    #[test]
    fn handoff_round_trips_and_preserves_other_keys() {
        let file = example_file();
        let before: Table = EXAMPLE_CONFIG.parse().expect("parse error");

        let handoff = ClusterHandoff {
            host: "dwhcluster.abc123.us-west-2.redshift.amazonaws.com".to_owned(),
            role_arn: "arn:aws:iam::123456789012:role/dwhRole".to_owned(),
        };
        handoff.write_to(file.path()).expect("could not write handoff");

        let config = Config::from_file(file.path()).expect("could not reload");
        assert_eq!(config.cluster.host().unwrap(), handoff.host);
        assert_eq!(config.iam_role.arn().unwrap(), handoff.role_arn);

        // Remove the two values we wrote, and everything else should be
        // exactly what we started with.
        let text = fs::read_to_string(file.path()).unwrap();
        let mut after: Table = text.parse().expect("parse error");
        after
            .get_mut("CLUSTER")
            .and_then(Value::as_table_mut)
            .expect("missing [CLUSTER]")
            .remove("HOST");
        after.remove("IAM_ROLE");
        assert_eq!(after, before);
    }

    #[test]
    fn handoff_keeps_comments() {
        let mut file = NamedTempFile::new().expect("could not create temp file");
        let text = format!(
            "# Credentials for the warehouse.\n{}\n[IAM_ROLE]\n# Filled in by provision.\n",
            EXAMPLE_CONFIG,
        );
        file.write_all(text.as_bytes())
            .expect("could not write temp file");

        let handoff = ClusterHandoff {
            host: "dwhcluster.abc123.us-west-2.redshift.amazonaws.com".to_owned(),
            role_arn: "arn:aws:iam::123456789012:role/dwhRole".to_owned(),
        };
        handoff.write_to(file.path()).expect("could not write handoff");

        let written = fs::read_to_string(file.path()).unwrap();
        assert!(written.starts_with("# Credentials for the warehouse.\n"));
        assert!(written.contains("# Filled in by provision.\n"));
        assert!(written.contains("DB_PORT = 5439\n"));
        let config = Config::from_file(file.path()).expect("could not reload");
        assert_eq!(config.iam_role.arn().unwrap(), handoff.role_arn);
    }

    #[test]
    fn handoff_overwrites_previous_values() {
        let file = example_file();
        let first = ClusterHandoff {
            host: "old.example.com".to_owned(),
            role_arn: "arn:aws:iam::123456789012:role/old".to_owned(),
        };
        let second = ClusterHandoff {
            host: "new.example.com".to_owned(),
            role_arn: "arn:aws:iam::123456789012:role/new".to_owned(),
        };
        first.write_to(file.path()).unwrap();
        second.write_to(file.path()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.cluster.host.as_deref(), Some("new.example.com"));
        assert_eq!(
            config.iam_role.arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/new"),
        );
    }
}
