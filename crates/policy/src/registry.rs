use std::collections::HashMap;
use std::sync::Arc;

use fleetcore_errors::NotFound;

use crate::plugin::PolicyPlugin;

/// Map of policy type name to the [`PolicyPlugin`] implementing it.
///
/// Built once, explicitly, at engine construction time -- never via runtime string reflection
/// or on-disk plugin discovery (see `SPEC_FULL.md` §9).
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    entries: Arc<HashMap<&'static str, Arc<dyn PolicyPlugin>>>,
}

impl PolicyRegistry {
    pub fn build() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    pub fn lookup(&self, policy_type: &str) -> anyhow::Result<Arc<dyn PolicyPlugin>> {
        self.entries
            .get(policy_type)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(NotFound::new("policy type", policy_type)))
    }
}

#[derive(Default)]
pub struct PolicyRegistryBuilder {
    entries: HashMap<&'static str, Arc<dyn PolicyPlugin>>,
}

impl PolicyRegistryBuilder {
    /// Register a policy plugin implementation.
    ///
    /// # Panics
    ///
    /// Panics if `policy_type` is already registered.
    pub fn register<P: PolicyPlugin + 'static>(&mut self, plugin: P) -> &mut Self {
        let policy_type = plugin.policy_type();
        if self.entries.contains_key(policy_type) {
            panic!("policy type {policy_type} cannot be registered more than once");
        }
        self.entries.insert(policy_type, Arc::new(plugin));
        self
    }

    pub fn finish(self) -> PolicyRegistry {
        PolicyRegistry {
            entries: Arc::new(self.entries),
        }
    }
}
