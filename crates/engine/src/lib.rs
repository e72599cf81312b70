//! Wires the store, lock manager, scheduler, policy and driver registries, events sink and
//! dispatcher into a runnable [`Engine`].
//!
//! Deliberately an explicit, constructed struct rather than a `Lazy` process-global: callers
//! (the `fleetcored` binary, or a test) build one `Engine` and pass it around, the way
//! `bin/replicore/src/init` assembles an `Injector` -- but without publishing it through a
//! global singleton.
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use serde_json::Value;

use fleetcore_actions::Executor;
use fleetcore_actions::ProfileDriverRegistry;
use fleetcore_context::Context;
use fleetcore_dispatcher::Dispatcher;
use fleetcore_dispatcher::DispatcherConf;
use fleetcore_errors::NotFound;
use fleetcore_events::Events;
use fleetcore_lock::LockManager;
use fleetcore_models::Cause;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::Node;
use fleetcore_policy::PolicyRegistry;
use fleetcore_scheduler::Scheduler;
use fleetcore_store::Store;

/// Collaborators an [`Engine`] needs; gathered here so callers assemble them once, explicitly,
/// rather than reaching for ambient globals.
pub struct EngineConf {
    pub store: Store,
    pub locks: Arc<LockManager>,
    pub scheduler: Scheduler,
    pub policies: PolicyRegistry,
    pub drivers: ProfileDriverRegistry,
    pub events: Events,
    pub dispatcher: DispatcherConf,
}

/// Entry point into the cluster lifecycle orchestrator: request submission plus the background
/// worker pool that drains them.
///
/// Cheap to clone; every field is itself a handle to shared state.
#[derive(Clone)]
pub struct Engine {
    context: Context,
    store: Store,
    events: Events,
    executor: Arc<Executor>,
}

impl Engine {
    /// Assemble an [`Engine`] and spawn its dispatcher worker pool.
    ///
    /// The executor and the dispatcher each need a handle to the other (the dispatcher drives
    /// the executor's `execute`, the executor's verb handlers notify the dispatcher about
    /// children they spawn); `Executor::attach_dispatcher` resolves that cycle once both exist.
    pub fn build(context: Context, conf: EngineConf) -> Engine {
        let executor = Executor::new(
            conf.store.clone(),
            conf.locks,
            conf.scheduler,
            conf.policies,
            conf.drivers,
            conf.events.clone(),
        );
        let dispatcher = Dispatcher::spawn(&context, conf.dispatcher, executor.clone());
        executor.attach_dispatcher(dispatcher);

        Engine {
            context,
            store: conf.store,
            events: conf.events,
            executor,
        }
    }

    /// The persistence handle backing this engine, for read paths that don't need an action.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The event sink this engine emits to.
    pub fn events(&self) -> &Events {
        &self.events
    }

    async fn submit(&self, target: &str, verb: &str, timeout: u64, inputs: Value) -> Result<String> {
        let name = format!("{}-{}", verb.to_lowercase(), fleetcore_models::id_prefix(target));
        let action = fleetcore_models::Action::new(name, target, verb, Cause::User, timeout).with_inputs(inputs);
        let action_id = action.id.clone();

        self.store.action_create(action).await?;
        self.store
            .action_set_status(&action_id, fleetcore_models::ActionStatus::Ready, "")
            .await?;
        self.executor.notify(&action_id).await?;
        Ok(action_id)
    }

    /// Declare a new cluster and submit the `CLUSTER_CREATE` action that provisions its nodes.
    pub async fn cluster_create(
        &self,
        name: impl Into<String>,
        project: impl Into<String>,
        profile_id: impl Into<String>,
        size: u32,
        timeout: u64,
    ) -> Result<(Cluster, String)> {
        let cluster = Cluster::new(name, project, profile_id, size, timeout);
        self.store.cluster_create(cluster.clone()).await?;
        let action_id = self.submit(&cluster.id, "CLUSTER_CREATE", timeout, Value::Null).await?;
        Ok((cluster, action_id))
    }

    /// Submit a `CLUSTER_DELETE` action, tearing down every member node and soft-deleting the
    /// cluster once they're gone.
    pub async fn cluster_delete(&self, cluster_id: &str, timeout: u64) -> Result<String> {
        self.submit(cluster_id, "CLUSTER_DELETE", timeout, Value::Null).await
    }

    /// Submit a `CLUSTER_UPDATE` action, rolling every member node onto `new_profile_id`.
    pub async fn cluster_update(
        &self,
        cluster_id: &str,
        new_profile_id: impl Into<String>,
        timeout: u64,
    ) -> Result<String> {
        let inputs = json!({ "new_profile_id": new_profile_id.into() });
        self.submit(cluster_id, "CLUSTER_UPDATE", timeout, inputs).await
    }

    /// Submit a `CLUSTER_ADD_NODES` action, joining the given existing, unattached nodes.
    pub async fn cluster_add_nodes(&self, cluster_id: &str, node_ids: Vec<String>, timeout: u64) -> Result<String> {
        let inputs = json!({ "nodes": node_ids });
        self.submit(cluster_id, "CLUSTER_ADD_NODES", timeout, inputs).await
    }

    /// Submit a `CLUSTER_DEL_NODES` action, detaching the given member nodes without destroying
    /// them.
    pub async fn cluster_del_nodes(&self, cluster_id: &str, node_ids: Vec<String>, timeout: u64) -> Result<String> {
        let inputs = json!({ "nodes": node_ids });
        self.submit(cluster_id, "CLUSTER_DEL_NODES", timeout, inputs).await
    }

    /// Submit a `CLUSTER_SCALE_OUT` action, creating `count` new nodes (or the count a scaling
    /// policy's `pre_op` hook computes, when `count` is `0`).
    pub async fn cluster_scale_out(&self, cluster_id: &str, count: u32, timeout: u64) -> Result<String> {
        let inputs = json!({ "count": count });
        self.submit(cluster_id, "CLUSTER_SCALE_OUT", timeout, inputs).await
    }

    /// Submit a `CLUSTER_SCALE_IN` action, destroying `count` nodes (or the count/candidates a
    /// deletion policy's `pre_op` hook selects, when `count` is `0`).
    pub async fn cluster_scale_in(&self, cluster_id: &str, count: u32, timeout: u64) -> Result<String> {
        let inputs = json!({ "count": count });
        self.submit(cluster_id, "CLUSTER_SCALE_IN", timeout, inputs).await
    }

    /// Submit a `CLUSTER_ATTACH_POLICY` action. `priority`/`level`/`cooldown`/`enabled` default
    /// from the policy's own configuration when left `None`.
    #[allow(clippy::too_many_arguments)]
    pub async fn cluster_attach_policy(
        &self,
        cluster_id: &str,
        policy_id: impl Into<String>,
        priority: Option<i32>,
        level: Option<i32>,
        cooldown: Option<u32>,
        enabled: Option<bool>,
        timeout: u64,
    ) -> Result<String> {
        let inputs = json!({
            "policy_id": policy_id.into(),
            "priority": priority,
            "level": level,
            "cooldown": cooldown,
            "enabled": enabled,
        });
        self.submit(cluster_id, "CLUSTER_ATTACH_POLICY", timeout, inputs).await
    }

    /// Submit a `CLUSTER_DETACH_POLICY` action.
    pub async fn cluster_detach_policy(
        &self,
        cluster_id: &str,
        policy_id: impl Into<String>,
        timeout: u64,
    ) -> Result<String> {
        let inputs = json!({ "policy_id": policy_id.into() });
        self.submit(cluster_id, "CLUSTER_DETACH_POLICY", timeout, inputs).await
    }

    /// Submit a `CLUSTER_UPDATE_POLICY` action, changing only the fields left `Some`.
    #[allow(clippy::too_many_arguments)]
    pub async fn cluster_update_policy(
        &self,
        cluster_id: &str,
        policy_id: impl Into<String>,
        priority: Option<i32>,
        level: Option<i32>,
        cooldown: Option<u32>,
        enabled: Option<bool>,
        timeout: u64,
    ) -> Result<String> {
        let inputs = json!({
            "policy_id": policy_id.into(),
            "priority": priority,
            "level": level,
            "cooldown": cooldown,
            "enabled": enabled,
        });
        self.submit(cluster_id, "CLUSTER_UPDATE_POLICY", timeout, inputs).await
    }

    /// Look up a cluster's current policy bindings (including disabled ones), for callers
    /// building an update request.
    pub async fn cluster_policy_list(&self, cluster_id: &str) -> Result<Vec<ClusterPolicy>> {
        self.store.cluster_policy_list(cluster_id, false).await
    }

    /// Look up a node directly, for callers assembling `cluster_add_nodes`/`cluster_del_nodes`
    /// requests.
    pub async fn node_get(&self, node_id: &str) -> Result<Node> {
        self.store
            .node_get(node_id, false)
            .await?
            .ok_or_else(|| NotFound::new("node", node_id).into())
    }

    /// A context derived from this engine's root, for callers that need one to pass to
    /// `store`/`events` calls outside of action execution (e.g. an HTTP handler logging a
    /// request before submitting an action).
    pub fn context(&self) -> Context {
        self.context.clone()
    }
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use std::sync::Arc;

    use fleetcore_context::Context;
    use fleetcore_events::emit::EventsFixture;
    use fleetcore_lock::LockManager;
    use fleetcore_scheduler::FakeClock;
    use fleetcore_scheduler::Scheduler;
    use fleetcore_store::memory::MemoryBackend;
    use fleetcore_store::Store;
    use time::OffsetDateTime;

    use super::Engine;
    use super::EngineConf;

    /// Build an [`Engine`] over in-memory backends: a [`MemoryBackend`] store, a [`FakeClock`]
    /// scheduler, no policy plugins beyond the built-ins, and whatever driver registry the
    /// caller supplies (driver implementations are deployment specific, so there is no fixture
    /// default for them).
    pub fn engine(drivers: fleetcore_actions::ProfileDriverRegistry) -> (Engine, EventsFixture) {
        let events = EventsFixture::new();
        let conf = EngineConf {
            store: Store::new(MemoryBackend::new()),
            locks: Arc::new(LockManager::new()),
            scheduler: Scheduler::fixture(FakeClock::new(OffsetDateTime::now_utc())),
            policies: fleetcore_policy::builtin_registry(),
            drivers,
            events: events.events(),
            dispatcher: Default::default(),
        };
        let engine = Engine::build(Context::fixture(), conf);
        (engine, events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use fleetcore_actions::ProfileDriverRegistry;
    use fleetcore_models::ActionStatus;
    use fleetcore_models::ClusterStatus;
    use fleetcore_models::Profile;

    use super::fixture;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn cluster_create_submits_and_runs_to_active() {
        let mut drivers = ProfileDriverRegistry::build();
        drivers.register(fleetcore_actions::fixture::FakeDriver::new());
        let (engine, _events) = fixture::engine(drivers.finish());

        let profile = Profile::new("web", "proj", "fixture", json!({}));
        engine.store().profile_create(profile.clone()).await.unwrap();

        let (cluster, action_id) = engine.cluster_create("demo", "proj", &profile.id, 2, 30).await.unwrap();
        settle().await;

        let action = engine.store().action_get(&action_id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Succeeded);

        let final_cluster = engine.store().cluster_get(&cluster.id, false).await.unwrap().unwrap();
        assert_eq!(final_cluster.status, ClusterStatus::Active);

        let nodes = engine.store().node_list_by_cluster(&cluster.id).await.unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn cluster_scale_out_grows_cluster_size() {
        let mut drivers = ProfileDriverRegistry::build();
        drivers.register(fleetcore_actions::fixture::FakeDriver::new());
        let (engine, _events) = fixture::engine(drivers.finish());

        let profile = Profile::new("web", "proj", "fixture", json!({}));
        engine.store().profile_create(profile.clone()).await.unwrap();
        let (cluster, create_id) = engine.cluster_create("demo", "proj", &profile.id, 1, 30).await.unwrap();
        settle().await;
        assert_eq!(
            engine.store().action_get(&create_id).await.unwrap().unwrap().status,
            ActionStatus::Succeeded
        );

        let scale_id = engine.cluster_scale_out(&cluster.id, 2, 30).await.unwrap();
        settle().await;

        let action = engine.store().action_get(&scale_id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Succeeded);
        let final_cluster = engine.store().cluster_get(&cluster.id, false).await.unwrap().unwrap();
        assert_eq!(final_cluster.size, 3);
    }
}
