use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use time::OffsetDateTime;

/// A template describing how to realise one node.
///
/// Profiles are immutable once referenced by a live cluster or node: updates produce a new
/// profile row rather than mutating the existing one in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub project: String,

    /// Plugin type tag, resolved against the profile driver registry.
    #[serde(rename = "type")]
    pub profile_type: String,

    /// Opaque template body interpreted by the matching profile driver.
    pub spec: Json,

    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl Profile {
    pub fn new<S1, S2, S3>(name: S1, project: S2, profile_type: S3, spec: Json) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Profile {
            id: super::new_id(),
            name: name.into(),
            project: project.into(),
            profile_type: profile_type.into(),
            spec,
            created: OffsetDateTime::now_utc(),
        }
    }
}
