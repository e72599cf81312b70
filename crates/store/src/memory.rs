//! In-memory reference [`StoreBackend`](crate::backend::StoreBackend) implementation.
//!
//! Used both as the default backend for small deployments and as the fixture backend for
//! tests, the way `core/store/src/fixture.rs` does in the teacher repository.
use std::collections::HashMap;
use std::collections::HashSet;

use anyhow::Result;
use tokio::sync::RwLock;

use fleetcore_errors::DependencyCycle;
use fleetcore_errors::InvalidTransition;
use fleetcore_models::Action;
use fleetcore_models::ActionStatus;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::Node;
use fleetcore_models::Policy;
use fleetcore_models::Profile;

use crate::backend::StoreBackend;

#[derive(Default)]
struct State {
    clusters: HashMap<String, Cluster>,
    nodes: HashMap<String, Node>,
    profiles: HashMap<String, Profile>,
    policies: HashMap<String, Policy>,
    cluster_policies: HashMap<(String, String), ClusterPolicy>,
    actions: HashMap<String, Action>,
}

/// In-memory backend, suitable for a single process deployment or tests.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }
}

#[async_trait::async_trait]
impl StoreBackend for MemoryBackend {
    async fn cluster_create(&self, cluster: Cluster) -> Result<()> {
        let mut state = self.state.write().await;
        state.clusters.insert(cluster.id.clone(), cluster);
        Ok(())
    }

    async fn cluster_get(&self, id: &str, show_deleted: bool) -> Result<Option<Cluster>> {
        let state = self.state.read().await;
        Ok(state
            .clusters
            .get(id)
            .filter(|c| show_deleted || c.deleted.is_none())
            .cloned())
    }

    async fn cluster_get_by_name(
        &self,
        project: &str,
        name: &str,
        show_deleted: bool,
    ) -> Result<Option<Cluster>> {
        let state = self.state.read().await;
        Ok(state
            .clusters
            .values()
            .find(|c| {
                c.project == project && c.name == name && (show_deleted || c.deleted.is_none())
            })
            .cloned())
    }

    async fn cluster_update(&self, cluster: Cluster) -> Result<()> {
        let mut state = self.state.write().await;
        state.clusters.insert(cluster.id.clone(), cluster);
        Ok(())
    }

    async fn cluster_soft_delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(cluster) = state.clusters.get_mut(id) {
            cluster.deleted = Some(time::OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn cluster_list(&self, project: &str, show_deleted: bool) -> Result<Vec<Cluster>> {
        let state = self.state.read().await;
        let mut list: Vec<Cluster> = state
            .clusters
            .values()
            .filter(|c| c.project == project && (show_deleted || c.deleted.is_none()))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn node_create(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn node_get(&self, id: &str, show_deleted: bool) -> Result<Option<Node>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .get(id)
            .filter(|n| show_deleted || n.deleted.is_none())
            .cloned())
    }

    async fn node_update(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn node_soft_delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(node) = state.nodes.get_mut(id) {
            node.deleted = Some(time::OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn node_list_by_cluster(&self, cluster_id: &str) -> Result<Vec<Node>> {
        let state = self.state.read().await;
        let mut list: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| {
                n.deleted.is_none() && n.cluster_id.as_deref() == Some(cluster_id)
            })
            .cloned()
            .collect();
        list.sort_by_key(|n| n.index);
        Ok(list)
    }

    async fn node_max_index(&self, cluster_id: &str) -> Result<u32> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            // Deleted nodes count too: `index` must never be reused across a cluster's
            // full history.
            .filter(|n| n.cluster_id.as_deref() == Some(cluster_id) || {
                n.cluster_id.is_none() && n.deleted.is_some()
            })
            .map(|n| n.index)
            .max()
            .unwrap_or(0))
    }

    async fn profile_create(&self, profile: Profile) -> Result<()> {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn profile_get(&self, id: &str) -> Result<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state.profiles.get(id).cloned())
    }

    async fn policy_create(&self, policy: Policy) -> Result<()> {
        let mut state = self.state.write().await;
        state.policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    async fn policy_get(&self, id: &str) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state.policies.get(id).cloned())
    }

    async fn cluster_policy_attach(&self, binding: ClusterPolicy) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (binding.cluster_id.clone(), binding.policy_id.clone());
        state.cluster_policies.insert(key, binding);
        Ok(())
    }

    async fn cluster_policy_detach(&self, cluster_id: &str, policy_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .cluster_policies
            .remove(&(cluster_id.to_string(), policy_id.to_string()));
        Ok(())
    }

    async fn cluster_policy_update(&self, binding: ClusterPolicy) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (binding.cluster_id.clone(), binding.policy_id.clone());
        state.cluster_policies.insert(key, binding);
        Ok(())
    }

    async fn cluster_policy_list(
        &self,
        cluster_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<ClusterPolicy>> {
        let state = self.state.read().await;
        let mut list: Vec<ClusterPolicy> = state
            .cluster_policies
            .values()
            .filter(|b| b.cluster_id == cluster_id && (!enabled_only || b.enabled))
            .cloned()
            .collect();
        // Priority descending, ties broken by binding creation order.
        list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created.cmp(&b.created)));
        Ok(list)
    }

    async fn action_create(&self, action: Action) -> Result<()> {
        let mut state = self.state.write().await;
        state.actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn action_get(&self, id: &str) -> Result<Option<Action>> {
        let state = self.state.read().await;
        Ok(state.actions.get(id).cloned())
    }

    async fn action_get_status(&self, id: &str) -> Result<Option<ActionStatus>> {
        let state = self.state.read().await;
        Ok(state.actions.get(id).map(|a| a.status))
    }

    async fn action_set_status(&self, id: &str, status: ActionStatus, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let action = state
            .actions
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!(fleetcore_errors::NotFound::new("action", id)))?;
        if !action.status.can_transition_to(status) {
            anyhow::bail!(InvalidTransition {
                action_id: id.to_string(),
                from: format!("{:?}", action.status),
                to: format!("{:?}", status),
            });
        }
        action.status = status;
        action.status_reason = reason.to_string();
        action.updated = time::OffsetDateTime::now_utc();
        if status == ActionStatus::Running && action.start_time.is_none() {
            action.start_time = Some(action.updated);
        }
        if status.is_terminal() {
            action.end_time = Some(action.updated);
        }
        Ok(())
    }

    async fn action_add_dependency(&self, child_id: &str, parent_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if child_id == parent_id || reachable(&state.actions, child_id, parent_id) {
            anyhow::bail!(DependencyCycle {
                child_id: child_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        {
            let parent = state
                .actions
                .get_mut(parent_id)
                .ok_or_else(|| anyhow::anyhow!(fleetcore_errors::NotFound::new("action", parent_id)))?;
            if !parent.depends_on.iter().any(|id| id == child_id) {
                parent.depends_on.push(child_id.to_string());
            }
        }
        let child = state
            .actions
            .get_mut(child_id)
            .ok_or_else(|| anyhow::anyhow!(fleetcore_errors::NotFound::new("action", child_id)))?;
        if !child.depended_by.iter().any(|id| id == parent_id) {
            child.depended_by.push(parent_id.to_string());
        }
        Ok(())
    }
}

/// True if `target` is reachable from `start` by following existing `depends_on` edges,
/// i.e. `start` already (transitively) depends on `target`.
fn reachable(actions: &HashMap<String, Action>, start: &str, target: &str) -> bool {
    let mut stack = vec![start.to_string()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(action) = actions.get(&id) {
            stack.extend(action.depends_on.iter().cloned());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use fleetcore_models::Action;
    use fleetcore_models::ActionStatus;
    use fleetcore_models::Cause;

    use super::MemoryBackend;
    use super::StoreBackend;

    #[tokio::test]
    async fn rejects_dependency_cycles() {
        let backend = MemoryBackend::new();
        let parent = Action::new("p", "c1", "CLUSTER_CREATE", Cause::User, 60);
        let child = Action::new("c", "n1", "NODE_CREATE", Cause::Derived, 60);
        let parent_id = parent.id.clone();
        let child_id = child.id.clone();
        backend.action_create(parent).await.unwrap();
        backend.action_create(child).await.unwrap();

        backend.action_add_dependency(&child_id, &parent_id).await.unwrap();
        let err = backend
            .action_add_dependency(&parent_id, &child_id)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn status_transition_guard() {
        let backend = MemoryBackend::new();
        let action = Action::new("a", "c1", "CLUSTER_CREATE", Cause::User, 60);
        let id = action.id.clone();
        backend.action_create(action).await.unwrap();

        // INIT -> RUNNING is not a legal transition.
        let err = backend
            .action_set_status(&id, ActionStatus::Running, "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot transition"));

        backend.action_set_status(&id, ActionStatus::Ready, "").await.unwrap();
        backend.action_set_status(&id, ActionStatus::Running, "").await.unwrap();
        backend
            .action_set_status(&id, ActionStatus::Succeeded, "done")
            .await
            .unwrap();
        let status = backend.action_get_status(&id).await.unwrap();
        assert_eq!(status, Some(ActionStatus::Succeeded));
    }
}
