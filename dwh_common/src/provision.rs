//! Creating the IAM role and the Redshift cluster, and waiting for the cluster
//! to become available.

use serde_json::json;

use crate::aws::{Cluster, ClusterStatus, ControlPlane, CreateClusterRequest, Creation};
use crate::config::ClusterHandoff;
use crate::poll::{poll_until, FixedInterval, Poll};
use crate::prelude::*;

/// The managed policy which lets the cluster read our raw data.
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// The description we give our IAM role.
const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// A policy allowing Redshift to assume our role.
fn assume_role_policy_document() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": "redshift.amazonaws.com" },
        }],
    })
    .to_string()
}

/// Create everything we need and wait until the cluster is available.
///
/// `record_handoff` is called exactly once, after the cluster is available,
/// with the endpoint and role ARN that later subcommands need. Opening the
/// database port happens afterwards, and failing to open it is logged but
/// does not fail provisioning.
#[tracing::instrument(skip_all, fields(cluster = %config.dwh.cluster_identifier))]
pub fn provision<C, F>(
    control_plane: &C,
    config: &Config,
    policy: FixedInterval,
    mut record_handoff: F,
) -> Result<ClusterHandoff>
where
    C: ControlPlane,
    F: FnMut(&ClusterHandoff) -> Result<()>,
{
    let role_arn = ensure_role(control_plane, &config.dwh.iam_role_name)?;
    request_cluster(control_plane, config, &role_arn)?;

    let cluster_identifier = &config.dwh.cluster_identifier;
    info!("waiting for cluster {} to become available", cluster_identifier);
    let cluster = wait_until_available(control_plane, cluster_identifier, policy)?;
    info!("cluster {} is available", cluster_identifier);

    let handoff = handoff_for(&cluster, &role_arn)?;
    record_handoff(&handoff)?;

    open_database_port(control_plane, &cluster, config.cluster.db_port);
    Ok(handoff)
}

/// Make sure our IAM role exists and can read from S3, and return its ARN.
#[tracing::instrument(skip(control_plane), level = "debug")]
pub fn ensure_role<C: ControlPlane>(control_plane: &C, role_name: &str) -> Result<String> {
    info!("creating IAM role {}", role_name);
    let created = control_plane
        .create_role(role_name, ROLE_DESCRIPTION, &assume_role_policy_document())
        .with_context(|| format!("could not create IAM role {}", role_name))?;
    let role = match created {
        Some(role) => role,
        None => {
            info!("IAM role {} already exists, reusing it", role_name);
            control_plane
                .get_role(role_name)
                .with_context(|| format!("could not look up IAM role {}", role_name))?
        }
    };

    info!("attaching S3 read-only policy to {}", role_name);
    control_plane
        .attach_role_policy(role_name, S3_READ_ONLY_POLICY_ARN)
        .with_context(|| format!("could not attach policy to {}", role_name))?;
    Ok(role.arn)
}

/// Ask Redshift to create our cluster. An existing cluster with the same
/// identifier is accepted, so that `provision` can be re-run.
fn request_cluster<C: ControlPlane>(
    control_plane: &C,
    config: &Config,
    role_arn: &str,
) -> Result<()> {
    let request = CreateClusterRequest {
        cluster_type: &config.dwh.cluster_type,
        node_type: &config.dwh.node_type,
        num_nodes: config.dwh.num_nodes,
        db_name: &config.cluster.db_name,
        cluster_identifier: &config.dwh.cluster_identifier,
        master_username: &config.cluster.db_user,
        master_user_password: &config.cluster.db_password,
        iam_role_arn: role_arn,
    };
    info!("creating Redshift cluster {}", request.cluster_identifier);
    let creation = control_plane.create_cluster(&request).with_context(|| {
        format!("could not create cluster {}", request.cluster_identifier)
    })?;
    if creation == Creation::AlreadyExists {
        info!("cluster {} already exists", request.cluster_identifier);
    }
    Ok(())
}

/// Poll until the cluster is available.
#[tracing::instrument(skip(control_plane, policy))]
pub fn wait_until_available<C: ControlPlane>(
    control_plane: &C,
    cluster_identifier: &str,
    policy: FixedInterval,
) -> Result<Cluster> {
    let what = format!("cluster {} to become available", cluster_identifier);
    poll_until(&what, policy, || {
        let cluster = match control_plane.describe_cluster(cluster_identifier)? {
            Some(cluster) => cluster,
            // Somebody deleted it out from under us.
            None => return Ok(Poll::Failed("deleted".to_owned())),
        };
        let status = cluster.cluster_status.clone();
        Ok(match status {
            ClusterStatus::Available => Poll::Ready(cluster),
            status if status.is_terminal_failure() => Poll::Failed(status.to_string()),
            status => Poll::Pending(status.to_string()),
        })
    })
}

/// Work out what later subcommands need to know about an available cluster.
fn handoff_for(cluster: &Cluster, role_arn: &str) -> Result<ClusterHandoff> {
    let endpoint = cluster.endpoint.as_ref().ok_or_else(|| {
        format_err!(
            "cluster {} is available but has no endpoint",
            cluster.cluster_identifier
        )
    })?;
    let role_arn = cluster
        .iam_roles
        .first()
        .map(|role| role.iam_role_arn.clone())
        .unwrap_or_else(|| role_arn.to_owned());
    Ok(ClusterHandoff {
        host: endpoint.address.clone(),
        role_arn,
    })
}

/// Try to open `port` on the cluster's security group, logging any failure.
fn open_database_port<C: ControlPlane>(control_plane: &C, cluster: &Cluster, port: u16) {
    if let Err(err) = try_open_database_port(control_plane, cluster, port) {
        warn!("could not open port {} to the cluster (continuing anyway): {:#}", port, err);
    }
}

/// Allow TCP connections to `port` on the first security group of the
/// cluster's VPC.
fn try_open_database_port<C: ControlPlane>(
    control_plane: &C,
    cluster: &Cluster,
    port: u16,
) -> Result<()> {
    let vpc_id = cluster.vpc_id.as_deref().ok_or_else(|| {
        format_err!("cluster {} has no VPC", cluster.cluster_identifier)
    })?;
    let groups = control_plane.security_groups(vpc_id)?;
    let group = groups
        .first()
        .ok_or_else(|| format_err!("VPC {} has no security groups", vpc_id))?;
    info!(
        "opening TCP port {} on security group {} ({})",
        port, group.group_name, group.group_id
    );
    control_plane.authorize_ingress(&group.group_id, port)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::EXAMPLE_CONFIG;
    use crate::poll::WaitError;
    use crate::testing::{Describe, FakeControlPlane, SpanNames, HOST, ROLE_ARN};

    fn config() -> Config {
        toml::from_str(EXAMPLE_CONFIG).expect("parse error")
    }

    fn no_wait(max_attempts: u32) -> FixedInterval {
        FixedInterval::new(Duration::from_secs(0), max_attempts)
    }

    /// Run `provision`, returning its result and every handoff it recorded
    /// along with the number of describe calls made before each one.
    fn run(
        fake: &FakeControlPlane,
        max_attempts: u32,
    ) -> (Result<ClusterHandoff>, Vec<(usize, ClusterHandoff)>) {
        let recorded = RefCell::new(vec![]);
        let result = provision(fake, &config(), no_wait(max_attempts), |handoff| {
            recorded
                .borrow_mut()
                .push((fake.describe_count.get(), handoff.clone()));
            Ok(())
        });
        (result, recorded.into_inner())
    }

    #[test]
    fn waits_for_available_then_records_handoff_once() {
        let fake = FakeControlPlane::new(&[
            Describe::Status("creating"),
            Describe::Status("creating"),
            Describe::Status("available"),
        ]);
        let (result, recorded) = run(&fake, 10);
        let handoff = result.expect("provision failed");

        assert_eq!(fake.describe_count.get(), 3);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, 3, "handoff must be recorded after the last poll");
        assert_eq!(recorded[0].1, handoff);
        assert_eq!(handoff.host, HOST);
        assert_eq!(handoff.role_arn, ROLE_ARN);

        assert_eq!(
            fake.calls(),
            vec![
                "create_role dwhRole".to_owned(),
                format!("attach_role_policy dwhRole {}", S3_READ_ONLY_POLICY_ARN),
                format!("create_cluster dwhCluster {}", ROLE_ARN),
                "describe_cluster dwhCluster".to_owned(),
                "describe_cluster dwhCluster".to_owned(),
                "describe_cluster dwhCluster".to_owned(),
                "security_groups vpc-0abc".to_owned(),
                "authorize_ingress sg-0123 5439".to_owned(),
            ],
        );
    }

    #[test]
    fn reuses_an_existing_role() {
        let mut fake = FakeControlPlane::new(&[Describe::Status("available")]);
        fake.role_exists = true;
        let (result, _) = run(&fake, 10);
        result.expect("provision failed");
        let calls = fake.calls();
        assert_eq!(calls[0], "create_role dwhRole");
        assert_eq!(calls[1], "get_role dwhRole");
    }

    #[test]
    fn rejected_cluster_creation_does_not_poll() {
        let mut fake = FakeControlPlane::new(&[Describe::Status("available")]);
        fake.create_cluster = Err("InvalidParameterValue");
        let (result, recorded) = run(&fake, 10);
        assert!(result.is_err());
        assert_eq!(fake.describe_count.get(), 0);
        assert!(recorded.is_empty());
    }

    #[test]
    fn existing_cluster_is_accepted() {
        let mut fake = FakeControlPlane::new(&[Describe::Status("available")]);
        fake.create_cluster = Ok(Creation::AlreadyExists);
        let (result, recorded) = run(&fake, 10);
        result.expect("provision failed");
        assert_eq!(fake.describe_count.get(), 1);
        assert_eq!(recorded.len(), 1);
    }

    #[test]
    fn terminal_state_is_fatal_and_records_nothing() {
        let fake = FakeControlPlane::new(&[
            Describe::Status("creating"),
            Describe::Status("incompatible-parameters"),
        ]);
        let (result, recorded) = run(&fake, 10);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::TerminalState { .. })
        ));
        assert_eq!(fake.describe_count.get(), 2);
        assert!(recorded.is_empty());
    }

    #[test]
    fn vanished_cluster_is_a_terminal_state() {
        let fake = FakeControlPlane::new(&[Describe::Status("creating"), Describe::NotFound]);
        let (result, _) = run(&fake, 10);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::TerminalState { state, .. }) if state == "deleted"
        ));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let fake = FakeControlPlane::new(&[Describe::Status("creating")]);
        let (result, recorded) = run(&fake, 5);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::TimedOut { attempts: 5, .. })
        ));
        assert_eq!(fake.describe_count.get(), 5);
        assert!(recorded.is_empty());
    }

    #[test]
    fn firewall_failures_are_not_fatal() {
        let mut fake = FakeControlPlane::new(&[Describe::Status("available")]);
        fake.fail_ingress = true;
        let (result, recorded) = run(&fake, 10);
        result.expect("provision should succeed without the firewall rule");
        assert_eq!(recorded.len(), 1);

        let mut fake = FakeControlPlane::new(&[Describe::Status("available")]);
        fake.security_groups.clear();
        let (result, _) = run(&fake, 10);
        result.expect("provision should succeed without a security group");
    }

    #[test]
    fn handoff_failure_is_fatal() {
        let fake = FakeControlPlane::new(&[Describe::Status("available")]);
        let result = provision(&fake, &config(), no_wait(10), |_| {
            Err(format_err!("disk full"))
        });
        assert!(result.is_err());
        assert!(!fake.calls().iter().any(|c| c.starts_with("authorize_ingress")));
    }

    #[test]
    fn polling_runs_in_its_own_span() {
        let fake = FakeControlPlane::new(&[Describe::Status("available")]);
        let (result, spans) = SpanNames::during(|| run(&fake, 3).0);
        result.expect("provision failed");
        assert!(spans.iter().any(|s| s == "provision"), "{:?}", spans);
        assert!(spans.iter().any(|s| s == "wait_until_available"), "{:?}", spans);
    }
}
