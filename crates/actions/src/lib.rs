//! Verb-dispatch logic for `ClusterAction`/`NodeAction` and the profile driver plugin boundary.
mod cluster;
mod driver;
mod executor;
mod node;

use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_errors::NotFound;

pub use self::cluster::ClusterVerb;
pub use self::driver::DriverStage;
pub use self::driver::DriverStatus;
pub use self::driver::ProfileDriver;
pub use self::driver::ProfileDriverRegistry;
pub use self::driver::ProfileDriverRegistryBuilder;
pub use self::executor::Executor;
pub use self::node::NodeVerb;

#[cfg(any(test, feature = "test-fixture"))]
pub use self::executor::fixture;

/// Entry point called by [`fleetcore_dispatcher::ActionExecutor::execute`] for every action the
/// dispatcher's worker pool picks up. Routes to the cluster or node verb handler by verb prefix.
pub(crate) async fn run_action(executor: &Executor, context: &Context, action_id: &str) -> Result<()> {
    let action = executor
        .store
        .action_get(action_id)
        .await?
        .ok_or_else(|| NotFound::new("action", action_id))?;

    if action.action.starts_with("CLUSTER_") {
        cluster::run(executor, context, &action).await
    } else if action.action.starts_with("NODE_") {
        node::run(executor, context, &action).await
    } else {
        anyhow::bail!("action '{}' has an unrecognised verb '{}'", action.id, action.action);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::OffsetDateTime;

    use fleetcore_context::Context;
    use fleetcore_events::emit::EventsFixture;
    use fleetcore_lock::LockManager;
    use fleetcore_models::Cause;
    use fleetcore_models::Cluster;
    use fleetcore_models::ClusterStatus;
    use fleetcore_models::Profile;
    use fleetcore_policy::builtin_registry;
    use fleetcore_scheduler::FakeClock;
    use fleetcore_scheduler::Scheduler;
    use fleetcore_store::memory::MemoryBackend;
    use fleetcore_store::Store;

    use super::executor::fixture::FakeDriver;
    use super::*;

    async fn build_executor() -> (Arc<Executor>, Store) {
        let store = Store::new(MemoryBackend::new());
        let locks = Arc::new(LockManager::new());
        let scheduler = Scheduler::fixture(FakeClock::new(OffsetDateTime::now_utc()));
        let policies = builtin_registry();
        let mut drivers = ProfileDriverRegistry::build();
        drivers.register(FakeDriver::new());
        let events = EventsFixture::new().events();

        let context = Context::fixture();
        let executor = Executor::new(store.clone(), locks, scheduler, policies, drivers.finish(), events);
        let dispatcher = fleetcore_dispatcher::Dispatcher::spawn(
            &context,
            fleetcore_dispatcher::DispatcherConf::default(),
            executor.clone(),
        );
        executor.attach_dispatcher(dispatcher);
        (executor, store)
    }

    #[tokio::test]
    async fn cluster_create_provisions_every_node() {
        let (executor, store) = build_executor().await;
        let context = Context::fixture();

        let profile = Profile::new("web", "proj", "fixture", json!({}));
        store.profile_create(profile.clone()).await.unwrap();

        let mut cluster = Cluster::new("demo", "proj", &profile.id, 3, 60);
        cluster.status = ClusterStatus::Init;
        store.cluster_create(cluster.clone()).await.unwrap();

        let action = fleetcore_models::Action::new("cluster_create_demo", &cluster.id, "CLUSTER_CREATE", Cause::User, 60);
        let action_id = action.id.clone();
        store.action_create(action).await.unwrap();
        store.action_set_status(&action_id, fleetcore_models::ActionStatus::Ready, "").await.unwrap();

        run_action(&executor, &context, &action_id).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let nodes = store.node_list_by_cluster(&cluster.id).await.unwrap();
        assert_eq!(nodes.len(), 3);

        let final_action = store.action_get(&action_id).await.unwrap().unwrap();
        assert_eq!(final_action.status, fleetcore_models::ActionStatus::Succeeded);
        let final_cluster = store.cluster_get(&cluster.id, false).await.unwrap().unwrap();
        assert_eq!(final_cluster.status, ClusterStatus::Active);
    }

    #[tokio::test]
    async fn unknown_verb_is_an_error() {
        let (executor, store) = build_executor().await;
        let context = Context::fixture();

        let action = fleetcore_models::Action::new("bogus", "c1", "CLUSTER_TELEPORT", Cause::User, 60);
        let action_id = action.id.clone();
        store.action_create(action).await.unwrap();

        let result = run_action(&executor, &context, &action_id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn node_create_polls_driver_to_completion() {
        let (executor, store) = build_executor().await;
        let context = Context::fixture();

        let profile = Profile::new("web", "proj", "fixture", json!({}));
        store.profile_create(profile.clone()).await.unwrap();
        let mut node = fleetcore_models::Node::new(1, &profile.id, "default");
        node.status = fleetcore_models::NodeStatus::Init;
        store.node_create(node.clone()).await.unwrap();

        let action = fleetcore_models::Action::new("node_create_1", &node.id, "NODE_CREATE", Cause::User, 5);
        let action_id = action.id.clone();
        store.action_create(action).await.unwrap();

        run_action(&executor, &context, &action_id).await.unwrap();

        let final_node = store.node_get(&node.id, false).await.unwrap().unwrap();
        assert_eq!(final_node.status, fleetcore_models::NodeStatus::Active);
        assert!(final_node.physical_id.is_some());

        let final_action = store.action_get(&action_id).await.unwrap().unwrap();
        assert_eq!(final_action.status, fleetcore_models::ActionStatus::Succeeded);
    }
}
