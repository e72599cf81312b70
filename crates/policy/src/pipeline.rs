use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_errors::NotFound;
use fleetcore_store::Store;

use crate::envelope::PolicyEnvelope;
use crate::plugin::Phase;
use crate::registry::PolicyRegistry;

/// Run every enabled policy attached to `cluster_id` whose `TARGET` matches `(phase, verb)`,
/// in priority order, threading a single mutable [`PolicyEnvelope`] through the chain.
///
/// A policy that sets the envelope's status to `CHECK_FAILED` stops the chain immediately;
/// later policies (even ones that would otherwise match) are skipped.
pub async fn run(
    context: &Context,
    store: &Store,
    registry: &PolicyRegistry,
    cluster_id: &str,
    phase: Phase,
    verb: &str,
) -> Result<PolicyEnvelope> {
    let mut envelope = PolicyEnvelope::default();
    let bindings = store.cluster_policy_list(cluster_id, true).await?;

    for binding in bindings {
        let policy = store
            .policy_get(&binding.policy_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!(NotFound::new("policy", &binding.policy_id)))?;
        let plugin = registry.lookup(&policy.policy_type)?;
        if !phase.matches(verb, plugin.target()) {
            continue;
        }

        slog::debug!(
            context.logger, "Running policy hook";
            "cluster_id" => cluster_id,
            "policy_id" => &policy.id,
            "policy_type" => &policy.policy_type,
            "verb" => verb,
        );
        match phase {
            Phase::Before => {
                plugin
                    .pre_op(context, store, cluster_id, verb, &policy, &mut envelope)
                    .await?
            }
            Phase::After => {
                plugin
                    .post_op(context, store, cluster_id, verb, &policy, &mut envelope)
                    .await?
            }
        }

        if !envelope.is_ok() {
            break;
        }
    }

    Ok(envelope)
}
