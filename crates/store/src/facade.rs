//! Ergonomic facade wrapping a [`StoreBackend`](crate::backend::StoreBackend) trait object.
use std::sync::Arc;

use anyhow::Result;

use fleetcore_models::Action;
use fleetcore_models::ActionStatus;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::Node;
use fleetcore_models::Policy;
use fleetcore_models::Profile;

use crate::backend::StoreBackend;

/// Aggregate result of waiting on a set of dependent actions, per the rules in the component
/// design for `ClusterAction`/`NodeAction` parents:
///
/// - any dependent `FAILED` -> [`WaitResult::Error`]
/// - else any dependent `CANCELLED` -> [`WaitResult::Cancel`]
/// - else any dependent `TIMEOUT` -> [`WaitResult::Timeout`]
/// - else all dependents `SUCCEEDED` -> [`WaitResult::Ok`]
/// - else -> [`WaitResult::Pending`] (keep waiting)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitResult {
    Ok,
    Error,
    Cancel,
    Timeout,
    Pending,
}

/// Handle to the persistence layer, shared freely across workers.
#[derive(Clone)]
pub struct Store(Arc<dyn StoreBackend>);

impl Store {
    pub fn new<B: StoreBackend + 'static>(backend: B) -> Self {
        Store(Arc::new(backend))
    }

    // --- Clusters --- //
    pub async fn cluster_create(&self, cluster: Cluster) -> Result<()> {
        self.0.cluster_create(cluster).await
    }

    pub async fn cluster_get(&self, id: &str, show_deleted: bool) -> Result<Option<Cluster>> {
        self.0.cluster_get(id, show_deleted).await
    }

    pub async fn cluster_get_by_name(
        &self,
        project: &str,
        name: &str,
        show_deleted: bool,
    ) -> Result<Option<Cluster>> {
        self.0.cluster_get_by_name(project, name, show_deleted).await
    }

    pub async fn cluster_update(&self, cluster: Cluster) -> Result<()> {
        self.0.cluster_update(cluster).await
    }

    pub async fn cluster_soft_delete(&self, id: &str) -> Result<()> {
        self.0.cluster_soft_delete(id).await
    }

    pub async fn cluster_list(&self, project: &str, show_deleted: bool) -> Result<Vec<Cluster>> {
        self.0.cluster_list(project, show_deleted).await
    }

    // --- Nodes --- //
    pub async fn node_create(&self, node: Node) -> Result<()> {
        self.0.node_create(node).await
    }

    pub async fn node_get(&self, id: &str, show_deleted: bool) -> Result<Option<Node>> {
        self.0.node_get(id, show_deleted).await
    }

    pub async fn node_update(&self, node: Node) -> Result<()> {
        self.0.node_update(node).await
    }

    pub async fn node_soft_delete(&self, id: &str) -> Result<()> {
        self.0.node_soft_delete(id).await
    }

    pub async fn node_list_by_cluster(&self, cluster_id: &str) -> Result<Vec<Node>> {
        self.0.node_list_by_cluster(cluster_id).await
    }

    pub async fn node_max_index(&self, cluster_id: &str) -> Result<u32> {
        self.0.node_max_index(cluster_id).await
    }

    // --- Profiles --- //
    pub async fn profile_create(&self, profile: Profile) -> Result<()> {
        self.0.profile_create(profile).await
    }

    pub async fn profile_get(&self, id: &str) -> Result<Option<Profile>> {
        self.0.profile_get(id).await
    }

    // --- Policies --- //
    pub async fn policy_create(&self, policy: Policy) -> Result<()> {
        self.0.policy_create(policy).await
    }

    pub async fn policy_get(&self, id: &str) -> Result<Option<Policy>> {
        self.0.policy_get(id).await
    }

    // --- Cluster <-> Policy bindings --- //
    pub async fn cluster_policy_attach(&self, binding: ClusterPolicy) -> Result<()> {
        self.0.cluster_policy_attach(binding).await
    }

    pub async fn cluster_policy_detach(&self, cluster_id: &str, policy_id: &str) -> Result<()> {
        self.0.cluster_policy_detach(cluster_id, policy_id).await
    }

    pub async fn cluster_policy_update(&self, binding: ClusterPolicy) -> Result<()> {
        self.0.cluster_policy_update(binding).await
    }

    pub async fn cluster_policy_list(
        &self,
        cluster_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<ClusterPolicy>> {
        self.0.cluster_policy_list(cluster_id, enabled_only).await
    }

    // --- Actions --- //
    pub async fn action_create(&self, action: Action) -> Result<()> {
        self.0.action_create(action).await
    }

    pub async fn action_get(&self, id: &str) -> Result<Option<Action>> {
        self.0.action_get(id).await
    }

    pub async fn action_get_status(&self, id: &str) -> Result<Option<ActionStatus>> {
        self.0.action_get_status(id).await
    }

    pub async fn action_set_status(
        &self,
        id: &str,
        status: ActionStatus,
        reason: &str,
    ) -> Result<()> {
        self.0.action_set_status(id, status, reason).await
    }

    /// Record that `parent_id` must await `child_id`.
    pub async fn action_add_dependency(&self, child_id: &str, parent_id: &str) -> Result<()> {
        self.0.action_add_dependency(child_id, parent_id).await
    }

    /// Compute the aggregate [`WaitResult`] of `parent_id`'s dependents.
    ///
    /// Does not consider the parent's own timeout: callers compare `wallclock() - start_time`
    /// against the parent's `timeout` separately, since that requires the scheduler's clock.
    pub async fn action_wait_result(&self, parent_id: &str) -> Result<WaitResult> {
        let parent = match self.0.action_get(parent_id).await? {
            Some(parent) => parent,
            None => anyhow::bail!(fleetcore_errors::NotFound::new("action", parent_id)),
        };
        if parent.depends_on.is_empty() {
            return Ok(WaitResult::Ok);
        }

        let mut any_failed = false;
        let mut any_cancelled = false;
        let mut any_timeout = false;
        let mut all_succeeded = true;
        for child_id in &parent.depends_on {
            let status = self
                .0
                .action_get_status(child_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!(fleetcore_errors::NotFound::new("action", child_id)))?;
            match status {
                ActionStatus::Failed => any_failed = true,
                ActionStatus::Cancelled => any_cancelled = true,
                ActionStatus::Timeout => any_timeout = true,
                ActionStatus::Succeeded => {}
                _ => all_succeeded = false,
            }
        }

        if any_failed {
            Ok(WaitResult::Error)
        } else if any_cancelled {
            Ok(WaitResult::Cancel)
        } else if any_timeout {
            Ok(WaitResult::Timeout)
        } else if all_succeeded {
            Ok(WaitResult::Ok)
        } else {
            Ok(WaitResult::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetcore_models::Action;
    use fleetcore_models::ActionStatus;
    use fleetcore_models::Cause;

    use super::Store;
    use super::WaitResult;
    use crate::memory::MemoryBackend;

    async fn make_parent_child(store: &Store) -> (String, String) {
        let parent = Action::new("p", "c1", "CLUSTER_CREATE", Cause::User, 60);
        let child = Action::new("c", "n1", "NODE_CREATE", Cause::Derived, 60);
        let parent_id = parent.id.clone();
        let child_id = child.id.clone();
        store.action_create(parent).await.unwrap();
        store.action_create(child).await.unwrap();
        store.action_add_dependency(&child_id, &parent_id).await.unwrap();
        (parent_id, child_id)
    }

    #[tokio::test]
    async fn pending_until_child_resolves() {
        let store = Store::new(MemoryBackend::new());
        let (parent_id, child_id) = make_parent_child(&store).await;

        assert_eq!(
            store.action_wait_result(&parent_id).await.unwrap(),
            WaitResult::Pending
        );

        store.action_set_status(&child_id, ActionStatus::Ready, "").await.unwrap();
        store.action_set_status(&child_id, ActionStatus::Running, "").await.unwrap();
        store
            .action_set_status(&child_id, ActionStatus::Succeeded, "done")
            .await
            .unwrap();
        assert_eq!(
            store.action_wait_result(&parent_id).await.unwrap(),
            WaitResult::Ok
        );
    }

    #[tokio::test]
    async fn failure_propagates_as_error() {
        let store = Store::new(MemoryBackend::new());
        let (parent_id, child_id) = make_parent_child(&store).await;

        store.action_set_status(&child_id, ActionStatus::Ready, "").await.unwrap();
        store.action_set_status(&child_id, ActionStatus::Running, "").await.unwrap();
        store
            .action_set_status(&child_id, ActionStatus::Failed, "boom")
            .await
            .unwrap();
        assert_eq!(
            store.action_wait_result(&parent_id).await.unwrap(),
            WaitResult::Error
        );
    }
}
