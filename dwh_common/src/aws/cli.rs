//! A `ControlPlane` backed by the `aws` command-line tool.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::{io, process::Command};
use thiserror::Error;

use super::{
    Cluster, ControlPlane, CreateClusterRequest, Creation, Role, SecurityGroup,
};
use crate::config::AwsSection;
use crate::prelude::*;

/// Arguments whose values must never show up in logs or error messages.
const SECRET_ARGS: &[&str] = &["--master-user-password"];

/// An error running `aws`.
#[derive(Debug, Error)]
pub enum AwsCliError {
    /// We couldn't run `aws` at all.
    #[error("error starting `aws {args}`")]
    Spawn {
        /// The arguments we passed, with secrets redacted.
        args: String,
        /// What went wrong.
        #[source]
        source: io::Error,
    },

    /// `aws` ran, but reported an error.
    #[error("error running `aws {args}`: {message}")]
    Failed {
        /// The arguments we passed, with secrets redacted.
        args: String,
        /// The AWS error code, such as `ClusterNotFound`, if we found one.
        code: Option<String>,
        /// Whatever `aws` printed to standard error.
        message: String,
    },

    /// `aws` succeeded, but we couldn't understand its output.
    #[error("error parsing output of `aws {args}`")]
    Parse {
        /// The arguments we passed, with secrets redacted.
        args: String,
        /// What went wrong.
        #[source]
        source: serde_json::Error,
    },
}

impl AwsCliError {
    /// The AWS error code reported by the service, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsCliError::Failed { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Talks to AWS by running `aws` with `--output json` and parsing what it
/// prints.
pub struct AwsCli {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl AwsCli {
    /// Create a new `AwsCli` using the credentials and region in `aws`.
    pub fn new(aws: &AwsSection) -> Self {
        AwsCli {
            access_key_id: aws.key.clone(),
            secret_access_key: aws.secret.clone(),
            region: aws.region.clone(),
        }
    }

    /// Build a `Command` object which calls the `aws` CLI tool, including our
    /// credentials and region.
    fn aws_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("aws");
        command
            .env("AWS_ACCESS_KEY_ID", &self.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &self.secret_access_key)
            .args(args)
            .args(&["--region", self.region.as_str(), "--output", "json"]);
        command
    }

    /// Run `aws` and return its standard output.
    fn run(&self, args: &[&str]) -> Result<Vec<u8>, AwsCliError> {
        let shown = display_args(args);
        trace!("running aws {}", shown);
        let output = self
            .aws_command(args)
            .output()
            .map_err(|source| AwsCliError::Spawn {
                args: shown.clone(),
                source,
            })?;
        if !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(AwsCliError::Failed {
                args: shown,
                code: error_code(&message),
                message,
            });
        }
        Ok(output.stdout)
    }

    /// Run `aws`, capture output as JSON, and parse it using the specified
    /// type.
    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, AwsCliError> {
        let stdout = self.run(args)?;
        serde_json::from_slice(&stdout).map_err(|source| AwsCliError::Parse {
            args: display_args(args),
            source,
        })
    }
}

impl ControlPlane for AwsCli {
    fn create_role(
        &self,
        role_name: &str,
        description: &str,
        assume_role_policy_document: &str,
    ) -> Result<Option<Role>> {
        let result = self.run_json::<RoleOutput>(&[
            "iam",
            "create-role",
            "--path",
            "/",
            "--role-name",
            role_name,
            "--description",
            description,
            "--assume-role-policy-document",
            assume_role_policy_document,
        ]);
        match result {
            Ok(output) => Ok(Some(output.role)),
            Err(err) if err.code() == Some("EntityAlreadyExists") => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn get_role(&self, role_name: &str) -> Result<Role> {
        let output: RoleOutput =
            self.run_json(&["iam", "get-role", "--role-name", role_name])?;
        Ok(output.role)
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.run(&[
            "iam",
            "attach-role-policy",
            "--role-name",
            role_name,
            "--policy-arn",
            policy_arn,
        ])?;
        Ok(())
    }

    fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> Result<Creation> {
        let num_nodes = request.num_nodes.map(|n| n.to_string());
        let mut args = vec![
            "redshift",
            "create-cluster",
            "--cluster-type",
            request.cluster_type,
            "--node-type",
            request.node_type,
            "--db-name",
            request.db_name,
            "--cluster-identifier",
            request.cluster_identifier,
            "--master-username",
            request.master_username,
            "--master-user-password",
            request.master_user_password,
            "--iam-roles",
            request.iam_role_arn,
        ];
        if let Some(num_nodes) = &num_nodes {
            args.extend_from_slice(&["--number-of-nodes", num_nodes.as_str()]);
        }
        match self.run(&args) {
            Ok(_) => Ok(Creation::Created),
            Err(err) if err.code() == Some("ClusterAlreadyExists") => {
                Ok(Creation::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn describe_cluster(&self, cluster_identifier: &str) -> Result<Option<Cluster>> {
        let result = self.run_json::<DescribeClustersOutput>(&[
            "redshift",
            "describe-clusters",
            "--cluster-identifier",
            cluster_identifier,
        ]);
        match result {
            Ok(output) => Ok(output.clusters.into_iter().next()),
            Err(err) if err.code() == Some("ClusterNotFound") => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>> {
        let filter = format!("Name=vpc-id,Values={}", vpc_id);
        let output: DescribeSecurityGroupsOutput = self.run_json(&[
            "ec2",
            "describe-security-groups",
            "--filters",
            filter.as_str(),
        ])?;
        Ok(output.security_groups)
    }

    fn authorize_ingress(&self, group_id: &str, port: u16) -> Result<()> {
        let port = port.to_string();
        let result = self.run(&[
            "ec2",
            "authorize-security-group-ingress",
            "--group-id",
            group_id,
            "--protocol",
            "tcp",
            "--port",
            port.as_str(),
            "--cidr",
            "0.0.0.0/0",
        ]);
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("InvalidPermission.Duplicate") => {
                debug!("{} already allows port {}", group_id, port);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_cluster(&self, cluster_identifier: &str) -> Result<bool> {
        let result = self.run(&[
            "redshift",
            "delete-cluster",
            "--cluster-identifier",
            cluster_identifier,
            "--skip-final-cluster-snapshot",
        ]);
        match result {
            Ok(_) => Ok(true),
            Err(err) if err.code() == Some("ClusterNotFound") => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Join `args` for display, replacing secret values with `***`.
fn display_args(args: &[&str]) -> String {
    let mut shown = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for &arg in args {
        shown.push(if hide_next { "***" } else { arg });
        hide_next = SECRET_ARGS.contains(&arg);
    }
    shown.join(" ")
}

/// Extract the error code from a message like `An error occurred
/// (ClusterNotFound) when calling the DescribeClusters operation: ...`.
fn error_code(stderr: &str) -> Option<String> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"An error occurred \((?P<code>[A-Za-z0-9.]+)\)")
            .expect("couldn't parse built-in regex");
    }
    RE.captures(stderr)
        .and_then(|caps| caps.name("code"))
        .map(|m| m.as_str().to_owned())
}

/// Output of `iam create-role` and `iam get-role`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleOutput {
    role: Role,
}

/// Output of `redshift describe-clusters`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeClustersOutput {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

/// Output of `ec2 describe-security-groups`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroupsOutput {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}
