//! Data model shared by the entity store, action store, executors, and policy pipeline.
mod action;
mod cluster;
mod node;
mod policy;
mod profile;

pub use self::action::Action;
pub use self::action::ActionStatus;
pub use self::action::Cause;
pub use self::cluster::Cluster;
pub use self::cluster::ClusterPolicy;
pub use self::cluster::ClusterStatus;
pub use self::node::Node;
pub use self::node::NodeStatus;
pub use self::policy::Policy;
pub use self::profile::Profile;

/// Generate a new random entity ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Shorten an ID to its first 8 characters, matching the original engine's naming scheme for
/// derived action and node names (`node-<cluster prefix>-<index>`, `node_create_<id prefix>`).
pub fn id_prefix(id: &str) -> &str {
    let end = id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}
