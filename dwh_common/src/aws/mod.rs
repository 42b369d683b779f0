//! The AWS control plane: IAM roles, Redshift clusters and EC2 security groups.

use crate::prelude::*;

mod cli;

pub use self::cli::{AwsCli, AwsCliError};

/// The operations we need from AWS.
///
/// "Already exists" and "not found" are ordinary answers here, not errors,
/// because the provisioner and decommissioner make decisions based on them.
/// Anything else that goes wrong is an error.
pub trait ControlPlane {
    /// Create an IAM role. Returns `None` if a role with this name already
    /// exists.
    fn create_role(
        &self,
        role_name: &str,
        description: &str,
        assume_role_policy_document: &str,
    ) -> Result<Option<Role>>;

    /// Look up an existing IAM role.
    fn get_role(&self, role_name: &str) -> Result<Role>;

    /// Attach a managed policy to a role. Attaching the same policy twice is
    /// harmless.
    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Ask Redshift to start creating a cluster.
    fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> Result<Creation>;

    /// Describe a cluster. Returns `None` if the cluster does not exist.
    fn describe_cluster(&self, cluster_identifier: &str) -> Result<Option<Cluster>>;

    /// List the security groups belonging to a VPC.
    fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>>;

    /// Allow inbound TCP connections to `port` from anywhere.
    fn authorize_ingress(&self, group_id: &str, port: u16) -> Result<()>;

    /// Delete a cluster without taking a final snapshot. Returns `false` if
    /// there was no such cluster.
    fn delete_cluster(&self, cluster_identifier: &str) -> Result<bool>;
}

/// Did a create request make something new?
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Creation {
    /// The resource is being created.
    Created,
    /// A resource with this name already existed.
    AlreadyExists,
}

/// An IAM role.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    /// The name of the role.
    pub role_name: String,
    /// The role's ARN.
    pub arn: String,
}

/// Parameters for creating a cluster.
#[derive(Clone, Debug)]
pub struct CreateClusterRequest<'a> {
    /// `single-node` or `multi-node`.
    pub cluster_type: &'a str,
    /// The Redshift node type.
    pub node_type: &'a str,
    /// The number of nodes, for `multi-node` clusters.
    pub num_nodes: Option<u32>,
    /// The database to create.
    pub db_name: &'a str,
    /// The identifier of the new cluster.
    pub cluster_identifier: &'a str,
    /// The master user name.
    pub master_username: &'a str,
    /// The master user password.
    pub master_user_password: &'a str,
    /// The ARN of the role the cluster should assume.
    pub iam_role_arn: &'a str,
}

/// A Redshift cluster, as returned by `describe-clusters`. Missing lots of
/// fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cluster {
    /// Our cluster identifier.
    pub cluster_identifier: String,
    /// Where the cluster is in its lifecycle.
    pub cluster_status: ClusterStatus,
    /// How to connect. Only present once the cluster has been created.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    /// The roles attached to this cluster.
    #[serde(default)]
    pub iam_roles: Vec<ClusterIamRole>,
    /// The VPC containing the cluster.
    #[serde(default)]
    pub vpc_id: Option<String>,
}

/// The network address of a cluster.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    /// The DNS name of the cluster.
    pub address: String,
    /// The port the cluster listens on.
    #[serde(default)]
    pub port: Option<u16>,
}

/// A role attached to a cluster.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterIamRole {
    /// The role's ARN.
    pub iam_role_arn: String,
}

/// An EC2 security group.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    /// The ID of the group, e.g. `sg-0123456789abcdef0`.
    pub group_id: String,
    /// The group's name.
    pub group_name: String,
}

/// The lifecycle state of a cluster.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(from = "String")]
pub enum ClusterStatus {
    /// The cluster can accept connections.
    Available,
    /// The cluster is still being built.
    Creating,
    /// The cluster is being torn down.
    Deleting,
    /// The cluster will never become available without someone stepping in.
    Failed(String),
    /// Any other state, such as `modifying` or `rebooting`.
    Other(String),
}

impl ClusterStatus {
    /// Is this a state the cluster can't recover from on its own?
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ClusterStatus::Failed(_))
    }
}

impl From<String> for ClusterStatus {
    fn from(status: String) -> Self {
        match status.to_lowercase().as_str() {
            "available" => ClusterStatus::Available,
            "creating" => ClusterStatus::Creating,
            "deleting" | "final-snapshot" => ClusterStatus::Deleting,
            "failed"
            | "deleted"
            | "hardware-failure"
            | "incompatible-hsm"
            | "incompatible-network"
            | "incompatible-parameters"
            | "incompatible-restore" => ClusterStatus::Failed(status.to_lowercase()),
            _ => ClusterStatus::Other(status.to_lowercase()),
        }
    }
}

impl From<&str> for ClusterStatus {
    fn from(status: &str) -> Self {
        ClusterStatus::from(status.to_owned())
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            ClusterStatus::Available => "available",
            ClusterStatus::Creating => "creating",
            ClusterStatus::Deleting => "deleting",
            ClusterStatus::Failed(s) | ClusterStatus::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

#[test]
fn classifies_cluster_statuses() {
    assert_eq!(ClusterStatus::from("Available"), ClusterStatus::Available);
    assert_eq!(ClusterStatus::from("final-snapshot"), ClusterStatus::Deleting);
    assert!(ClusterStatus::from("incompatible-network").is_terminal_failure());
    assert!(!ClusterStatus::from("modifying").is_terminal_failure());
    assert_eq!(ClusterStatus::from("Rebooting").to_string(), "rebooting");
}
