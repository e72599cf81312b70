use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use time::OffsetDateTime;

/// A named, typed policy definition, owned by a project (tenant).
///
/// A policy's `TARGET` (the `(phase, action-kind)` pairs it must run for) is a property of the
/// plugin implementation, not a persisted column -- see `fleetcore_policy::PolicyPlugin::target`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub project: String,

    #[serde(rename = "type")]
    pub policy_type: String,

    pub spec: Json,
    pub level: i32,
    pub cooldown: u32,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl Policy {
    pub fn new<S1, S2, S3>(name: S1, project: S2, policy_type: S3, spec: Json) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Policy {
            id: super::new_id(),
            name: name.into(),
            project: project.into(),
            policy_type: policy_type.into(),
            spec,
            level: 0,
            cooldown: 0,
            created: OffsetDateTime::now_utc(),
        }
    }
}
