mod deletion;
mod envelope;
mod pipeline;
mod plugin;
mod registry;

pub use self::deletion::Criteria;
pub use self::deletion::DeletionPolicy;
pub use self::envelope::CheckStatus;
pub use self::envelope::CreationData;
pub use self::envelope::DeletionData;
pub use self::envelope::PolicyEnvelope;
pub use self::pipeline::run;
pub use self::plugin::Phase;
pub use self::plugin::PolicyPlugin;
pub use self::plugin::ResolvedBinding;
pub use self::registry::PolicyRegistry;
pub use self::registry::PolicyRegistryBuilder;

/// Registry pre-loaded with every built-in policy type the engine ships.
pub fn builtin_registry() -> PolicyRegistry {
    PolicyRegistry::build().register(DeletionPolicy).finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcore_context::Context;
    use fleetcore_models::Cluster;
    use fleetcore_models::Node;
    use fleetcore_models::Policy;
    use fleetcore_store::memory::MemoryBackend;
    use fleetcore_store::Store;
    use serde_json::json;

    fn store() -> Store {
        Store::new(MemoryBackend::new())
    }

    #[tokio::test]
    async fn deletion_policy_picks_oldest_first() {
        let store = store();
        let cluster = Cluster::new("demo", "proj", "profile-a", 3, 3600);
        store.cluster_create(cluster.clone()).await.unwrap();

        for i in 0..3 {
            let mut node = Node::new(i, "profile-a", "default");
            node.cluster_id = Some(cluster.id.clone());
            store.node_create(node).await.unwrap();
        }

        let policy = Policy::new(
            "delete-oldest",
            "proj",
            "DeletionPolicy",
            json!({"criteria": "OLDEST_FIRST"}),
        );
        store.policy_create(policy.clone()).await.unwrap();
        store
            .cluster_policy_attach(fleetcore_models::ClusterPolicy::new(
                &cluster.id,
                &policy.id,
                0,
                0,
                0,
            ))
            .await
            .unwrap();

        let registry = builtin_registry();
        let context = Context::fixture();
        let mut envelope = PolicyEnvelope::default();
        envelope.deletion = Some(DeletionData {
            count: 2,
            candidates: Vec::new(),
            destroy_after_delete: true,
            grace_period: 0,
        });

        let plugin = registry.lookup("DeletionPolicy").unwrap();
        plugin
            .pre_op(&context, &store, &cluster.id, "CLUSTER_SCALE_IN", &policy, &mut envelope)
            .await
            .unwrap();

        let deletion = envelope.deletion.unwrap();
        assert_eq!(deletion.candidates.len(), 2);
    }

    #[tokio::test]
    async fn pipeline_stops_chain_on_failure() {
        let store = store();
        let cluster = Cluster::new("empty", "proj", "profile-a", 0, 3600);
        store.cluster_create(cluster.clone()).await.unwrap();

        let policy = Policy::new(
            "delete-oldest",
            "proj",
            "DeletionPolicy",
            json!({"criteria": "OLDEST_FIRST"}),
        );
        store.policy_create(policy.clone()).await.unwrap();
        store
            .cluster_policy_attach(fleetcore_models::ClusterPolicy::new(
                &cluster.id,
                &policy.id,
                0,
                0,
                0,
            ))
            .await
            .unwrap();

        let registry = builtin_registry();
        let context = Context::fixture();
        let envelope = run(
            &context,
            &store,
            &registry,
            &cluster.id,
            Phase::Before,
            "CLUSTER_SCALE_IN",
        )
        .await
        .unwrap();

        assert!(!envelope.is_ok());
        assert_eq!(envelope.reason, "no eligible nodes found for deletion");
    }
}
