//! Deleting the cluster.

use crate::aws::{ClusterStatus, ControlPlane};
use crate::poll::{poll_until, FixedInterval, Poll};
use crate::prelude::*;

/// Delete our cluster and wait until Redshift no longer knows about it.
///
/// A cluster which is already being deleted is just waited for, so this can
/// be re-run after an interrupted run. Only a "cluster not found" answer
/// counts as deleted. Any other error while checking on the cluster is
/// returned to the caller.
#[tracing::instrument(skip(control_plane, policy))]
pub fn decommission<C: ControlPlane>(
    control_plane: &C,
    cluster_identifier: &str,
    policy: FixedInterval,
) -> Result<()> {
    let cluster = control_plane
        .describe_cluster(cluster_identifier)
        .with_context(|| format!("could not look up cluster {}", cluster_identifier))?;
    match cluster {
        None => {
            info!("cluster {} does not exist, nothing to delete", cluster_identifier);
            return Ok(());
        }
        Some(ref cluster) if cluster.cluster_status == ClusterStatus::Deleting => {
            info!("cluster {} is already being deleted", cluster_identifier);
        }
        Some(_) => {
            info!("deleting cluster {}", cluster_identifier);
            let existed = control_plane
                .delete_cluster(cluster_identifier)
                .with_context(|| format!("could not delete cluster {}", cluster_identifier))?;
            if !existed {
                info!("cluster {} disappeared before we could delete it", cluster_identifier);
                return Ok(());
            }
        }
    }

    let what = format!("cluster {} to be deleted", cluster_identifier);
    poll_until(&what, policy, || {
        Ok(match control_plane.describe_cluster(cluster_identifier)? {
            None => Poll::Ready(()),
            Some(cluster) => Poll::Pending(cluster.cluster_status.to_string()),
        })
    })?;
    info!("cluster {} has been deleted", cluster_identifier);
    Ok(())
}
