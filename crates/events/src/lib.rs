//! Append-only event log.
//!
//! An [`Event`] is keyed by timestamp, records the subject (cluster, node, or action) that
//! transitioned, the verb that caused it, and its new status. Events are never mutated once
//! emitted -- the entity store (`fleetcore-store`) persists them alongside the row transition
//! that produced them.
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

pub mod emit;

/// The kind of thing an [`Event`] is about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subject {
    Cluster,
    Node,
    Action,
}

/// A single append-only record of a status transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What the event is about.
    pub subject: Subject,

    /// ID of the cluster, node, or action the event is about.
    pub subject_id: String,

    /// Verb of the action that drove this transition (e.g. `CLUSTER_SCALE_IN`).
    pub action: String,

    /// The status reached.
    pub status: String,

    /// Human readable explanation, empty when the transition needs none.
    #[serde(default)]
    pub reason: String,

    /// Additional unstructured metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Time the event was generated.
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl Event {
    /// Build a new event stamped with the current time.
    pub fn new<S1, S2, S3, S4>(
        subject: Subject,
        subject_id: S1,
        action: S2,
        status: S3,
        reason: S4,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Event {
            subject,
            subject_id: subject_id.into(),
            action: action.into(),
            status: status.into(),
            reason: reason.into(),
            metadata: BTreeMap::new(),
            time: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Event;
    use super::Subject;

    #[test]
    fn builds_with_current_time() {
        let event = Event::new(Subject::Cluster, "c1", "CLUSTER_CREATE", "ACTIVE", "");
        assert_eq!(event.subject, Subject::Cluster);
        assert_eq!(event.subject_id, "c1");
        assert_eq!(event.action, "CLUSTER_CREATE");
        assert_eq!(event.status, "ACTIVE");
    }
}
