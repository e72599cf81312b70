use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

/// Outcome of a single BEFORE/AFTER policy check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CheckStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "CHECK_FAILED")]
    Failed,
}

/// Hints a deletion policy leaves behind for `CLUSTER_SCALE_IN`/`CLUSTER_DEL_NODES` to consume.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeletionData {
    /// Number of nodes to delete; falls back to 1 when unset.
    #[serde(default)]
    pub count: u32,

    /// Node IDs chosen as deletion candidates.
    #[serde(default)]
    pub candidates: Vec<String>,

    #[serde(default = "default_true")]
    pub destroy_after_delete: bool,

    #[serde(default)]
    pub grace_period: u32,
}

fn default_true() -> bool {
    true
}

/// Hints a creation/scaling policy leaves behind for `CLUSTER_CREATE`/`CLUSTER_SCALE_OUT`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreationData {
    /// Number of nodes to create; falls back to 1 when unset.
    #[serde(default)]
    pub count: u32,

    /// Per-node placement hints, indexed the same way nodes are created.
    #[serde(default)]
    pub placement: Vec<Json>,
}

/// The mutable envelope threaded through a phase's policy chain and into the verb handler.
///
/// Each policy in the chain may mutate this in place; a policy that sets `status` to
/// [`CheckStatus::Failed`] stops the chain -- later policies in the same phase are skipped.
#[derive(Clone, Debug)]
pub struct PolicyEnvelope {
    pub status: CheckStatus,
    pub reason: String,
    pub deletion: Option<DeletionData>,
    pub creation: Option<CreationData>,
}

impl Default for PolicyEnvelope {
    fn default() -> Self {
        PolicyEnvelope {
            status: CheckStatus::Ok,
            reason: String::new(),
            deletion: None,
            creation: None,
        }
    }
}

impl PolicyEnvelope {
    pub fn fail<S: Into<String>>(&mut self, reason: S) {
        self.status = CheckStatus::Failed;
        self.reason = reason.into();
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}
