//! Backend interface the [`Store`](crate::Store) facade delegates to.
use anyhow::Result;

use fleetcore_models::Action;
use fleetcore_models::ActionStatus;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::Node;
use fleetcore_models::Policy;
use fleetcore_models::Profile;

/// Operations a persistence backend must implement.
///
/// The reference implementation (`memory::MemoryBackend`) keeps everything in process memory;
/// the database schema a production backend would use is out of scope for this crate (see
/// `SPEC_FULL.md` §6) -- only this trait boundary is.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    // --- Clusters --- //
    async fn cluster_create(&self, cluster: Cluster) -> Result<()>;
    async fn cluster_get(&self, id: &str, show_deleted: bool) -> Result<Option<Cluster>>;
    async fn cluster_get_by_name(
        &self,
        project: &str,
        name: &str,
        show_deleted: bool,
    ) -> Result<Option<Cluster>>;
    async fn cluster_update(&self, cluster: Cluster) -> Result<()>;
    async fn cluster_soft_delete(&self, id: &str) -> Result<()>;
    async fn cluster_list(&self, project: &str, show_deleted: bool) -> Result<Vec<Cluster>>;

    // --- Nodes --- //
    async fn node_create(&self, node: Node) -> Result<()>;
    async fn node_get(&self, id: &str, show_deleted: bool) -> Result<Option<Node>>;
    async fn node_update(&self, node: Node) -> Result<()>;
    async fn node_soft_delete(&self, id: &str) -> Result<()>;
    async fn node_list_by_cluster(&self, cluster_id: &str) -> Result<Vec<Node>>;
    /// Highest `index` ever assigned to a node of this cluster, including deleted nodes.
    async fn node_max_index(&self, cluster_id: &str) -> Result<u32>;

    // --- Profiles --- //
    async fn profile_create(&self, profile: Profile) -> Result<()>;
    async fn profile_get(&self, id: &str) -> Result<Option<Profile>>;

    // --- Policies --- //
    async fn policy_create(&self, policy: Policy) -> Result<()>;
    async fn policy_get(&self, id: &str) -> Result<Option<Policy>>;

    // --- Cluster <-> Policy bindings --- //
    async fn cluster_policy_attach(&self, binding: ClusterPolicy) -> Result<()>;
    async fn cluster_policy_detach(&self, cluster_id: &str, policy_id: &str) -> Result<()>;
    async fn cluster_policy_update(&self, binding: ClusterPolicy) -> Result<()>;
    async fn cluster_policy_list(
        &self,
        cluster_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<ClusterPolicy>>;

    // --- Actions --- //
    async fn action_create(&self, action: Action) -> Result<()>;
    async fn action_get(&self, id: &str) -> Result<Option<Action>>;
    async fn action_get_status(&self, id: &str) -> Result<Option<ActionStatus>>;
    async fn action_set_status(&self, id: &str, status: ActionStatus, reason: &str) -> Result<()>;
    async fn action_add_dependency(&self, child_id: &str, parent_id: &str) -> Result<()>;
}
