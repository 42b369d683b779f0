//! The `status` subcommand.

use dwh_common::{
    aws::{AwsCli, ControlPlane},
    prelude::*,
};
use prettytable::{format::consts::FORMAT_CLEAN, row, Table};

/// Print what Redshift knows about our cluster.
pub fn run(config: &Config) -> Result<()> {
    let aws = AwsCli::new(&config.aws);
    let cluster_identifier = &config.dwh.cluster_identifier;

    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.add_row(row!["CLUSTER", cluster_identifier]);
    match aws.describe_cluster(cluster_identifier)? {
        None => {
            table.add_row(row!["STATUS", "not found"]);
        }
        Some(cluster) => {
            table.add_row(row!["STATUS", cluster.cluster_status]);
            if let Some(endpoint) = &cluster.endpoint {
                table.add_row(row!["HOST", &endpoint.address]);
                if let Some(port) = endpoint.port {
                    table.add_row(row!["PORT", port]);
                }
            }
            for role in &cluster.iam_roles {
                table.add_row(row!["IAM_ROLE", &role.iam_role_arn]);
            }
        }
    }
    table.printstd();
    Ok(())
}
