use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use time::OffsetDateTime;

/// Lifecycle status of a [`Node`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Init,
    Creating,
    Active,
    Updating,
    Deleting,
    Error,
    Leaving,
    Joining,
    Deleted,
}

/// A single unit of provisioned capacity, belonging to at most one cluster at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    /// Monotone index within the owning cluster's history; never reused, even after deletion.
    pub index: u32,

    #[serde(default)]
    pub cluster_id: Option<String>,
    pub profile_id: String,
    pub role: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub status_reason: String,

    /// Opaque handle into the provisioning system (e.g. a cloud-stack ID).
    #[serde(default)]
    pub physical_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted: Option<OffsetDateTime>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Arbitrary hints carried for the benefit of profile drivers and policies
    /// (e.g. placement chosen by a scheduling policy).
    #[serde(default)]
    pub data: Json,
}

impl Node {
    /// Create a free-standing node (not yet attached to a cluster), in `INIT` status.
    pub fn new<S1, S2>(index: u32, profile_id: S1, role: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let now = OffsetDateTime::now_utc();
        Node {
            id: super::new_id(),
            index,
            cluster_id: None,
            profile_id: profile_id.into(),
            role: role.into(),
            status: NodeStatus::Init,
            status_reason: String::new(),
            physical_id: None,
            created: now,
            updated: now,
            deleted: None,
            tags: BTreeMap::new(),
            data: Json::Object(Default::default()),
        }
    }

    pub fn set_status<S: Into<String>>(&mut self, status: NodeStatus, reason: S) {
        self.status = status;
        self.status_reason = reason.into();
        self.updated = OffsetDateTime::now_utc();
    }
}
