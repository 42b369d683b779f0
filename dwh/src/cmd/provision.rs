//! The `provision` subcommand.

use dwh_common::{aws::AwsCli, poll::FixedInterval, prelude::*, provision::provision};

/// Provision the cluster, recording its endpoint and role ARN in the
/// configuration file at `config_path`.
pub fn run(config: &Config, config_path: &Path) -> Result<()> {
    let aws = AwsCli::new(&config.aws);
    let policy = FixedInterval::from_config(&config.polling);
    let handoff = provision(&aws, config, policy, |handoff| {
        handoff.write_to(config_path)
    })?;
    info!("HOST = {}", handoff.host);
    info!("ARN = {}", handoff.role_arn);
    info!("saved cluster details to {}", config_path.display());
    Ok(())
}
