use anyhow::Result;
use rand::seq::SliceRandom;
use serde::Deserialize;

use fleetcore_context::Context;
use fleetcore_models::Node;
use fleetcore_models::Policy;
use fleetcore_store::Store;

use crate::envelope::DeletionData;
use crate::envelope::PolicyEnvelope;
use crate::plugin::Phase;
use crate::plugin::PolicyPlugin;

const TARGET: &[(Phase, &str)] = &[
    (Phase::Before, "CLUSTER_SCALE_IN"),
    (Phase::Before, "CLUSTER_DEL_NODES"),
];

/// How candidates are chosen when a scale-in/delete-nodes action doesn't name them explicitly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criteria {
    Random,
    OldestFirst,
    YoungestFirst,
    OldestProfileFirst,
}

#[derive(Deserialize)]
struct DeletionSpec {
    criteria: Criteria,
    #[serde(default = "default_true")]
    destroy_after_delete: bool,
    #[serde(default)]
    grace_period: u32,
}

fn default_true() -> bool {
    true
}

/// Picks which nodes a scale-in or explicit delete targets when the caller left the choice to
/// policy, grounded on `senlin.policies.deletion_policy.DeletionPolicy`.
///
/// Two defects present in the original are fixed here rather than reproduced (see
/// `SPEC_FULL.md` §9): `YoungestFirst` indexes from the end of the sorted slice instead of with
/// a negative Python index, and `OldestProfileFirst` appends node references rather than
/// `{id, created_at}` pairs, so its output shape matches every other criteria branch.
#[derive(Debug)]
pub struct DeletionPolicy;

impl DeletionPolicy {
    fn select_candidates(spec: &DeletionSpec, mut nodes: Vec<Node>, count: u32) -> Vec<String> {
        let count = (count as usize).min(nodes.len());
        if count == 0 {
            return Vec::new();
        }

        match spec.criteria {
            Criteria::Random => {
                nodes.shuffle(&mut rand::thread_rng());
                nodes.into_iter().take(count).map(|n| n.id).collect()
            }
            Criteria::OldestFirst => {
                nodes.sort_by_key(|n| n.created);
                nodes.into_iter().take(count).map(|n| n.id).collect()
            }
            Criteria::YoungestFirst => {
                nodes.sort_by_key(|n| n.created);
                let len = nodes.len();
                let mut picked = Vec::with_capacity(count);
                for i in 0..count {
                    picked.push(nodes[len - 1 - i].id.clone());
                }
                picked
            }
            Criteria::OldestProfileFirst => {
                nodes.sort_by_key(|n| n.profile_id.clone());
                nodes.into_iter().take(count).map(|n| n.id).collect()
            }
        }
    }
}

#[async_trait::async_trait]
impl PolicyPlugin for DeletionPolicy {
    fn policy_type(&self) -> &'static str {
        "DeletionPolicy"
    }

    fn target(&self) -> &'static [(Phase, &'static str)] {
        TARGET
    }

    async fn pre_op(
        &self,
        _context: &Context,
        store: &Store,
        cluster_id: &str,
        _verb: &str,
        policy: &Policy,
        envelope: &mut PolicyEnvelope,
    ) -> Result<()> {
        let spec: DeletionSpec = serde_json::from_value(policy.spec.clone())?;
        let count = envelope
            .deletion
            .as_ref()
            .map(|d| d.count)
            .filter(|c| *c > 0)
            .unwrap_or(1);

        let nodes = store.node_list_by_cluster(cluster_id).await?;
        let candidates = Self::select_candidates(&spec, nodes, count);
        if candidates.is_empty() {
            envelope.fail("no eligible nodes found for deletion");
            return Ok(());
        }

        envelope.deletion = Some(DeletionData {
            count: candidates.len() as u32,
            candidates,
            destroy_after_delete: spec.destroy_after_delete,
            grace_period: spec.grace_period,
        });
        Ok(())
    }
}
