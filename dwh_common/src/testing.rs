//! In-memory stand-ins for AWS and the database, used by unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tracing::{
    span::{Attributes, Id},
    Subscriber,
};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

use crate::aws::{
    Cluster, ClusterIamRole, ClusterStatus, ControlPlane, CreateClusterRequest,
    Creation, Endpoint, Role, SecurityGroup,
};
use crate::db::SqlSession;
use crate::prelude::*;

pub const HOST: &str = "dwhcluster.abc123.us-west-2.redshift.amazonaws.com";
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/dwhRole";

/// One scripted answer to `describe_cluster`.
#[derive(Clone, Debug)]
pub enum Describe {
    Status(&'static str),
    NotFound,
    Error,
}

/// A scripted `ControlPlane` which records every call it receives.
pub struct FakeControlPlane {
    pub role_exists: bool,
    pub create_cluster: Result<Creation, &'static str>,
    pub security_groups: Vec<SecurityGroup>,
    pub fail_ingress: bool,
    pub cluster_exists: bool,
    pub fail_delete: bool,
    /// Answers for `describe_cluster`, in order. The last one repeats.
    describes: RefCell<VecDeque<Describe>>,
    pub describe_count: Cell<usize>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeControlPlane {
    pub fn new(describes: &[Describe]) -> Self {
        FakeControlPlane {
            role_exists: false,
            create_cluster: Ok(Creation::Created),
            security_groups: vec![SecurityGroup {
                group_id: "sg-0123".to_owned(),
                group_name: "default".to_owned(),
            }],
            fail_ingress: false,
            cluster_exists: true,
            fail_delete: false,
            describes: RefCell::new(describes.iter().cloned().collect()),
            describe_count: Cell::new(0),
            calls: RefCell::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn cluster(status: &str) -> Cluster {
        Cluster {
            cluster_identifier: "dwhcluster".to_owned(),
            cluster_status: ClusterStatus::from(status),
            endpoint: Some(Endpoint {
                address: HOST.to_owned(),
                port: Some(5439),
            }),
            iam_roles: vec![ClusterIamRole {
                iam_role_arn: ROLE_ARN.to_owned(),
            }],
            vpc_id: Some("vpc-0abc".to_owned()),
        }
    }
}

impl ControlPlane for FakeControlPlane {
    fn create_role(&self, role_name: &str, _: &str, _: &str) -> Result<Option<Role>> {
        self.record(format!("create_role {}", role_name));
        if self.role_exists {
            Ok(None)
        } else {
            Ok(Some(Role {
                role_name: role_name.to_owned(),
                arn: ROLE_ARN.to_owned(),
            }))
        }
    }

    fn get_role(&self, role_name: &str) -> Result<Role> {
        self.record(format!("get_role {}", role_name));
        Ok(Role {
            role_name: role_name.to_owned(),
            arn: ROLE_ARN.to_owned(),
        })
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.record(format!("attach_role_policy {} {}", role_name, policy_arn));
        Ok(())
    }

    fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> Result<Creation> {
        self.record(format!(
            "create_cluster {} {}",
            request.cluster_identifier, request.iam_role_arn
        ));
        self.create_cluster.map_err(|msg| format_err!("{}", msg))
    }

    fn describe_cluster(&self, cluster_identifier: &str) -> Result<Option<Cluster>> {
        self.record(format!("describe_cluster {}", cluster_identifier));
        self.describe_count.set(self.describe_count.get() + 1);
        let mut describes = self.describes.borrow_mut();
        let next = if describes.len() > 1 {
            describes.pop_front()
        } else {
            describes.front().cloned()
        };
        match next.unwrap_or(Describe::NotFound) {
            Describe::Status(status) => Ok(Some(Self::cluster(status))),
            Describe::NotFound => Ok(None),
            Describe::Error => Err(format_err!("simulated network failure")),
        }
    }

    fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>> {
        self.record(format!("security_groups {}", vpc_id));
        Ok(self.security_groups.clone())
    }

    fn authorize_ingress(&self, group_id: &str, port: u16) -> Result<()> {
        self.record(format!("authorize_ingress {} {}", group_id, port));
        if self.fail_ingress {
            Err(format_err!("simulated permission failure"))
        } else {
            Ok(())
        }
    }

    fn delete_cluster(&self, cluster_identifier: &str) -> Result<bool> {
        self.record(format!("delete_cluster {}", cluster_identifier));
        if self.fail_delete {
            return Err(format_err!(
                "An error occurred (InvalidClusterState) when calling the DeleteCluster operation"
            ));
        }
        Ok(self.cluster_exists)
    }
}

/// A `SqlSession` which records statements and models commit and rollback.
#[derive(Default)]
pub struct RecordingSession {
    /// Fail any statement containing this text.
    pub fail_on: Option<String>,
    /// Every statement we were asked to run, including failed ones.
    pub executed: RefCell<Vec<String>>,
    /// Statements whose effects were committed.
    pub committed: RefCell<Vec<String>>,
    /// Statements run inside the current transaction, if any.
    pending: RefCell<Option<Vec<String>>>,
    /// `"commit"` or `"rollback"` for each finished transaction.
    pub transactions: RefCell<Vec<&'static str>>,
}

impl RecordingSession {
    pub fn failing_on(needle: &str) -> Self {
        RecordingSession {
            fail_on: Some(needle.to_owned()),
            ..RecordingSession::default()
        }
    }
}

impl SqlSession for RecordingSession {
    fn run_statement(&self, sql: &str) -> Result<()> {
        self.executed.borrow_mut().push(sql.to_owned());
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(format_err!("simulated SQL failure"));
            }
        }
        match self.pending.borrow_mut().as_mut() {
            Some(pending) => pending.push(sql.to_owned()),
            None => self.committed.borrow_mut().push(sql.to_owned()),
        }
        Ok(())
    }

    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        *self.pending.borrow_mut() = Some(vec![]);
        let result = f();
        let pending = self.pending.borrow_mut().take().unwrap_or_default();
        if result.is_ok() {
            self.committed.borrow_mut().extend(pending);
            self.transactions.borrow_mut().push("commit");
        } else {
            self.transactions.borrow_mut().push("rollback");
        }
        result
    }
}

/// A tracing layer which records the name of every span opened.
#[derive(Clone, Default)]
pub struct SpanNames(Arc<Mutex<Vec<String>>>);

impl SpanNames {
    /// Run `f` with a subscriber that records span names, and return them.
    pub fn during<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let names = SpanNames::default();
        let subscriber = tracing_subscriber::registry().with(names.clone());
        let result = tracing::subscriber::with_default(subscriber, f);
        let recorded = names.0.lock().expect("poisoned").clone();
        (result, recorded)
    }
}

impl<S: Subscriber> Layer<S> for SpanNames {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: LayerContext<'_, S>) {
        self.0
            .lock()
            .expect("poisoned")
            .push(attrs.metadata().name().to_owned());
    }
}
