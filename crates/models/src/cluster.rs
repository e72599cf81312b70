use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// Lifecycle status of a [`Cluster`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Init,
    Creating,
    Active,
    Updating,
    Deleting,
    Error,
    Deleted,
}

impl ClusterStatus {
    /// Status is one of the transient `*-ING` states the state machine requires between
    /// a stable status and the next one.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            ClusterStatus::Creating | ClusterStatus::Updating | ClusterStatus::Deleting
        )
    }
}

/// A named, sized group of nodes backed by a provisioning profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,

    /// Human name, unique within `project`.
    pub name: String,

    /// Owning tenant.
    pub project: String,

    pub profile_id: String,
    pub size: u32,
    pub timeout: u64,
    pub status: ClusterStatus,
    #[serde(default)]
    pub status_reason: String,

    /// Optional parent cluster, for nested cluster topologies.
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted: Option<OffsetDateTime>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Cluster {
    /// Start a brand new cluster in `INIT` status.
    pub fn new<S1, S2, S3>(name: S1, project: S2, profile_id: S3, size: u32, timeout: u64) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        let now = OffsetDateTime::now_utc();
        Cluster {
            id: super::new_id(),
            name: name.into(),
            project: project.into(),
            profile_id: profile_id.into(),
            size,
            timeout,
            status: ClusterStatus::Init,
            status_reason: String::new(),
            parent: None,
            created: now,
            updated: now,
            deleted: None,
            tags: BTreeMap::new(),
        }
    }

    /// Transition to a new status, stamping `updated` and recording the reason.
    pub fn set_status<S: Into<String>>(&mut self, status: ClusterStatus, reason: S) {
        self.status = status;
        self.status_reason = reason.into();
        self.updated = OffsetDateTime::now_utc();
    }
}

/// Binding of a [`Policy`](super::Policy) to a [`Cluster`], with per-cluster overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterPolicy {
    pub cluster_id: String,
    pub policy_id: String,

    /// Higher priority bindings run first within a phase.
    pub priority: i32,
    pub level: i32,
    pub cooldown: u32,
    pub enabled: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl ClusterPolicy {
    pub fn new<S1, S2>(cluster_id: S1, policy_id: S2, priority: i32, level: i32, cooldown: u32) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        ClusterPolicy {
            cluster_id: cluster_id.into(),
            policy_id: policy_id.into(),
            priority,
            level,
            cooldown,
            enabled: true,
            created: OffsetDateTime::now_utc(),
        }
    }
}
