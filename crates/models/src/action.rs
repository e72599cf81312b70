use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use time::OffsetDateTime;

/// How an [`Action`] was originated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cause {
    /// An external request made directly by a user.
    User,
    /// Spawned by a parent action.
    Derived,
    /// An internal call made by another engine component.
    Rpc,
}

/// Status of an [`Action`] as it moves through the dependency-aware execution engine.
///
/// ```text
/// INIT ─► READY ─► RUNNING ─► {SUCCEEDED, FAILED, CANCELLED, TIMEOUT}
///  │        ▲         │
///  └─► WAITING ◄──────┘   (a running parent blocked on dependents)
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Init,
    Waiting,
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Timeout,
}

impl ActionStatus {
    /// A terminal status is one the action store's transition guard never moves away from.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded
                | ActionStatus::Failed
                | ActionStatus::Cancelled
                | ActionStatus::Timeout
        )
    }

    /// Whether `to` is a legal transition from `self`, per the state machine above.
    pub fn can_transition_to(self, to: ActionStatus) -> bool {
        use ActionStatus::*;
        match (self, to) {
            (Init, Ready) => true,
            (Ready, Running) => true,
            (Running, Waiting) => true,
            (Waiting, Ready) => true,
            (Running, Succeeded | Failed | Cancelled | Timeout) => true,
            // A waiting parent can also resolve straight to a terminal status without
            // re-entering READY (e.g. observing a dependent's failure mid-wait).
            (Waiting, Succeeded | Failed | Cancelled | Timeout) => true,
            // Forced lock preemption cancels an action regardless of its current phase,
            // as long as it has not already reached a terminal status.
            (Init | Ready | Running | Waiting, Cancelled) => true,
            _ => false,
        }
    }
}

/// The unit of scheduled work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,

    /// ID of the cluster or node this action operates on.
    pub target: String,

    /// Verb name, e.g. `CLUSTER_SCALE_IN`.
    pub action: String,
    pub cause: Cause,

    #[serde(default)]
    pub inputs: Json,
    #[serde(default)]
    pub outputs: Json,

    pub status: ActionStatus,
    #[serde(default)]
    pub status_reason: String,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub timeout: u64,

    /// IDs of actions this action must wait on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// IDs of actions that wait on this one.
    #[serde(default)]
    pub depended_by: Vec<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

impl Action {
    /// Build a new action in `INIT` status with the given target and verb.
    pub fn new<S1, S2, S3>(name: S1, target: S2, action: S3, cause: Cause, timeout: u64) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        let now = OffsetDateTime::now_utc();
        Action {
            id: super::new_id(),
            name: name.into(),
            target: target.into(),
            action: action.into(),
            cause,
            inputs: Json::Object(Default::default()),
            outputs: Json::Object(Default::default()),
            status: ActionStatus::Init,
            status_reason: String::new(),
            start_time: None,
            end_time: None,
            timeout,
            depends_on: Vec::new(),
            depended_by: Vec::new(),
            created: now,
            updated: now,
        }
    }

    pub fn with_inputs(mut self, inputs: Json) -> Self {
        self.inputs = inputs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::ActionStatus::*;

    #[test]
    fn legal_transitions() {
        assert!(Init.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Running));
        assert!(Running.can_transition_to(Waiting));
        assert!(Waiting.can_transition_to(Ready));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Waiting.can_transition_to(Timeout));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Init.can_transition_to(Running));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Ready.can_transition_to(Waiting));
    }

    #[test]
    fn forced_cancel_from_any_nonterminal_phase() {
        for from in [Init, Ready, Running, Waiting] {
            assert!(from.can_transition_to(Cancelled));
        }
        assert!(!Succeeded.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_statuses() {
        assert!(Succeeded.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(Timeout.is_terminal());
        assert!(!Running.is_terminal());
        assert!(!Waiting.is_terminal());
    }
}
