//! The `decommission` subcommand.

use dwh_common::{
    aws::AwsCli, decommission::decommission, poll::FixedInterval, prelude::*,
};

/// Delete the cluster and wait until it's gone.
pub fn run(config: &Config) -> Result<()> {
    let aws = AwsCli::new(&config.aws);
    let policy = FixedInterval::from_config(&config.polling);
    decommission(&aws, &config.dwh.cluster_identifier, policy)
}
