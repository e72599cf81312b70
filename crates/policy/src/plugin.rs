use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::Policy;
use fleetcore_store::Store;

use crate::envelope::PolicyEnvelope;

/// The two hook points a policy can run at, around a verb handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Phase {
    Before,
    After,
}

/// Implemented by every policy type known to the engine.
///
/// Attach/detach default to a no-op success so policies that need no setup (like the built-in
/// deletion policy) don't have to implement them.
#[async_trait::async_trait]
pub trait PolicyPlugin: Send + Sync + std::fmt::Debug {
    /// Identifier resolved via the policy type registry.
    fn policy_type(&self) -> &'static str;

    /// `(phase, verb)` pairs this policy must run for.
    fn target(&self) -> &'static [(Phase, &'static str)];

    /// Called once when a policy is attached to a cluster.
    async fn attach(
        &self,
        _context: &Context,
        _cluster: &Cluster,
        _policy: &Policy,
        _envelope: &mut PolicyEnvelope,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Called once when a policy is detached from a cluster.
    async fn detach(
        &self,
        _context: &Context,
        _cluster: &Cluster,
        _policy: &Policy,
        _envelope: &mut PolicyEnvelope,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Run before the verb handler executes.
    async fn pre_op(
        &self,
        _context: &Context,
        _store: &Store,
        _cluster_id: &str,
        _verb: &str,
        _policy: &Policy,
        _envelope: &mut PolicyEnvelope,
    ) -> Result<()> {
        Ok(())
    }

    /// Run after the verb handler executes successfully.
    async fn post_op(
        &self,
        _context: &Context,
        _store: &Store,
        _cluster_id: &str,
        _verb: &str,
        _policy: &Policy,
        _envelope: &mut PolicyEnvelope,
    ) -> Result<()> {
        Ok(())
    }
}

impl Phase {
    /// Whether `(self, verb)` is present in `target`.
    pub fn matches(self, verb: &str, target: &[(Phase, &'static str)]) -> bool {
        target.iter().any(|(phase, v)| *phase == self && *v == verb)
    }
}

/// A binding paired with the policy row and plugin it resolves to, for pipeline execution.
pub struct ResolvedBinding {
    pub binding: ClusterPolicy,
    pub policy: Policy,
}
