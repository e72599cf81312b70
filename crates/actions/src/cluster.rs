//! `ClusterAction` verb handlers (`spec.md` §4.E.1), grounded on
//! `senlin.engine.actions.cluster_action.ClusterAction`.
use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use rand::seq::SliceRandom;
use serde::Deserialize;

use fleetcore_context::Context;
use fleetcore_errors::NotFound;
use fleetcore_errors::PolicyTypeConflict;
use fleetcore_errors::ProfileTypeMismatch;
use fleetcore_errors::ValidationFailed;
use fleetcore_events::Event;
use fleetcore_events::Subject;
use fleetcore_lock::AcquireOutcome;
use fleetcore_lock::Scope;
use fleetcore_models::id_prefix;
use fleetcore_models::Action;
use fleetcore_models::ActionStatus;
use fleetcore_models::Cause;
use fleetcore_models::Cluster;
use fleetcore_models::ClusterPolicy;
use fleetcore_models::ClusterStatus;
use fleetcore_models::Node;
use fleetcore_models::NodeStatus;
use fleetcore_policy::Phase;
use fleetcore_store::WaitResult;

use crate::executor::Executor;
use crate::node::NodeVerb;

/// The closed set of verbs a `ClusterAction` may carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClusterVerb {
    Create,
    Delete,
    Update,
    AddNodes,
    DelNodes,
    ScaleOut,
    ScaleIn,
    AttachPolicy,
    DetachPolicy,
    UpdatePolicy,
}

impl ClusterVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterVerb::Create => "CLUSTER_CREATE",
            ClusterVerb::Delete => "CLUSTER_DELETE",
            ClusterVerb::Update => "CLUSTER_UPDATE",
            ClusterVerb::AddNodes => "CLUSTER_ADD_NODES",
            ClusterVerb::DelNodes => "CLUSTER_DEL_NODES",
            ClusterVerb::ScaleOut => "CLUSTER_SCALE_OUT",
            ClusterVerb::ScaleIn => "CLUSTER_SCALE_IN",
            ClusterVerb::AttachPolicy => "CLUSTER_ATTACH_POLICY",
            ClusterVerb::DetachPolicy => "CLUSTER_DETACH_POLICY",
            ClusterVerb::UpdatePolicy => "CLUSTER_UPDATE_POLICY",
        }
    }

    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "CLUSTER_CREATE" => Some(ClusterVerb::Create),
            "CLUSTER_DELETE" => Some(ClusterVerb::Delete),
            "CLUSTER_UPDATE" => Some(ClusterVerb::Update),
            "CLUSTER_ADD_NODES" => Some(ClusterVerb::AddNodes),
            "CLUSTER_DEL_NODES" => Some(ClusterVerb::DelNodes),
            "CLUSTER_SCALE_OUT" => Some(ClusterVerb::ScaleOut),
            "CLUSTER_SCALE_IN" => Some(ClusterVerb::ScaleIn),
            "CLUSTER_ATTACH_POLICY" => Some(ClusterVerb::AttachPolicy),
            "CLUSTER_DETACH_POLICY" => Some(ClusterVerb::DetachPolicy),
            "CLUSTER_UPDATE_POLICY" => Some(ClusterVerb::UpdatePolicy),
            _ => None,
        }
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Outcome of a verb handler, distinguishing "ran to completion" from "a child wait already
/// drove the action to a terminal status" so `dispatch` doesn't try to transition it twice.
enum VerbOutcome {
    Done,
    AlreadyTerminal,
}

/// Run a single `ClusterAction` to completion. `action` targets a cluster id.
pub async fn run(executor: &Executor, context: &Context, action: &Action) -> Result<()> {
    let verb = ClusterVerb::parse(&action.action)
        .ok_or_else(|| anyhow::anyhow!("unknown cluster verb '{}'", action.action))?;
    let forced = matches!(verb, ClusterVerb::Delete);

    let outcome = executor
        .locks
        .acquire(&action.target, &action.id, Scope::Cluster, forced);
    let holder_to_cancel = match outcome {
        AcquireOutcome::Acquired => None,
        AcquireOutcome::Evicted { previous_holder } => Some(previous_holder),
        AcquireOutcome::Busy { .. } => {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Running, "")
                .await?;
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Failed, "Failed locking cluster")
                .await?;
            emit_final(executor, context, action).await;
            return Ok(());
        }
    };
    if let Some(holder) = holder_to_cancel {
        executor
            .store
            .action_set_status(&holder, ActionStatus::Cancelled, "preempted by CLUSTER_DELETE")
            .await
            .ok();
    }

    let result = dispatch(executor, context, action, verb).await;
    executor.locks.release(&action.target, &action.id, Scope::Cluster);

    if let Err(error) = &result {
        // `dispatch` already records Failed for errors raised after the BEFORE policy check;
        // this only covers errors raised earlier (e.g. the target cluster went missing).
        let status = executor.store.action_get_status(&action.id).await?;
        if !status.map(ActionStatus::is_terminal).unwrap_or(true) {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Failed, &error.to_string())
                .await?;
        }
    }
    result
}

async fn dispatch(
    executor: &Executor,
    context: &Context,
    action: &Action,
    verb: ClusterVerb,
) -> Result<()> {
    executor
        .store
        .action_set_status(&action.id, ActionStatus::Running, "")
        .await?;

    let cluster = executor
        .store
        .cluster_get(&action.target, true)
        .await?
        .ok_or_else(|| NotFound::new("cluster", action.target.clone()))?;

    let before = fleetcore_policy::run(
        context,
        &executor.store,
        &executor.policies,
        &cluster.id,
        Phase::Before,
        verb.as_str(),
    )
    .await?;
    if !before.is_ok() {
        executor
            .store
            .action_set_status(&action.id, ActionStatus::Failed, &before.reason)
            .await
            .ok();
        emit_final(executor, context, action).await;
        anyhow::bail!(before.reason);
    }

    let handler_result = match verb {
        ClusterVerb::Create => do_create(executor, context, action, cluster, &before).await,
        ClusterVerb::Delete => do_delete(executor, context, action, cluster).await,
        ClusterVerb::Update => do_update(executor, context, action, cluster).await,
        ClusterVerb::AddNodes => do_add_nodes(executor, context, action, cluster).await,
        ClusterVerb::DelNodes => do_del_nodes(executor, context, action, cluster).await,
        ClusterVerb::ScaleOut => do_scale_out(executor, context, action, cluster, &before).await,
        ClusterVerb::ScaleIn => do_scale_in(executor, context, action, cluster, &before).await,
        ClusterVerb::AttachPolicy => do_attach_policy(executor, context, action, cluster).await,
        ClusterVerb::DetachPolicy => do_detach_policy(executor, action, cluster).await,
        ClusterVerb::UpdatePolicy => do_update_policy(executor, action, cluster).await,
    };

    match &handler_result {
        Ok(VerbOutcome::Done) => {
            let after = fleetcore_policy::run(
                context,
                &executor.store,
                &executor.policies,
                &action.target,
                Phase::After,
                verb.as_str(),
            )
            .await?;
            let status = if after.is_ok() {
                ActionStatus::Succeeded
            } else {
                ActionStatus::Failed
            };
            executor
                .store
                .action_set_status(&action.id, status, &after.reason)
                .await
                .ok();
        }
        Ok(VerbOutcome::AlreadyTerminal) => {}
        Err(error) => {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Failed, &error.to_string())
                .await
                .ok();
        }
    }
    emit_final(executor, context, action).await;
    handler_result.map(|_| ())
}

async fn emit_final(executor: &Executor, context: &Context, action: &Action) {
    if let Ok(Some(current)) = executor.store.action_get(&action.id).await {
        let event = Event::new(
            Subject::Cluster,
            current.target.clone(),
            current.action.clone(),
            format!("{:?}", current.status).to_uppercase(),
            current.status_reason.clone(),
        );
        executor.events.emit(context, event).await.ok();
    }
}

/// Outcome of waiting for a parent's children to all reach a terminal status.
enum WaitOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Block (cooperatively) until every action in `action.depends_on` is terminal, aggregating
/// their result per §4.B/§5. Sets `action`'s own status as a side effect: `Waiting` while
/// blocked, back to `Running` on success, or straight to the matching terminal status.
async fn wait_for_dependents(executor: &Executor, action: &Action) -> Result<WaitOutcome> {
    executor
        .store
        .action_set_status(&action.id, ActionStatus::Waiting, "")
        .await?;
    let start = executor.scheduler.wallclock();

    loop {
        let status = executor.store.action_get_status(&action.id).await?;
        if status.map(|s| s.is_terminal()).unwrap_or(true) {
            // A lock preemption (CLUSTER_DELETE) cancelled us while we were waiting.
            return Ok(WaitOutcome::Cancelled);
        }

        match executor.store.action_wait_result(&action.id).await? {
            WaitResult::Pending => {}
            WaitResult::Ok => {
                executor
                    .store
                    .action_set_status(&action.id, ActionStatus::Ready, "")
                    .await?;
                executor
                    .store
                    .action_set_status(&action.id, ActionStatus::Running, "")
                    .await?;
                return Ok(WaitOutcome::Succeeded);
            }
            WaitResult::Error => {
                executor
                    .store
                    .action_set_status(&action.id, ActionStatus::Failed, "a dependent action failed")
                    .await
                    .ok();
                return Ok(WaitOutcome::Failed("one or more child actions failed".into()));
            }
            WaitResult::Cancel => {
                executor
                    .store
                    .action_set_status(&action.id, ActionStatus::Cancelled, "a dependent action was cancelled")
                    .await
                    .ok();
                return Ok(WaitOutcome::Cancelled);
            }
            WaitResult::Timeout => {
                executor
                    .store
                    .action_set_status(&action.id, ActionStatus::Timeout, "a dependent action timed out")
                    .await
                    .ok();
                return Ok(WaitOutcome::Failed("a dependent action timed out".into()));
            }
        }

        let elapsed = executor.scheduler.wallclock() - start;
        if elapsed.whole_seconds() as u64 > action.timeout {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Timeout, "timed out waiting for dependents")
                .await
                .ok();
            return Ok(WaitOutcome::Failed("timed out waiting for dependents".into()));
        }
        executor.scheduler.reschedule(WAIT_POLL_INTERVAL).await;
    }
}

async fn spawn_child(
    executor: &Executor,
    parent: &Action,
    name: String,
    target: &str,
    verb: &str,
    inputs: serde_json::Value,
) -> Result<()> {
    let child = Action::new(name, target, verb, Cause::Derived, parent.timeout).with_inputs(inputs);
    let child_id = child.id.clone();
    executor.store.action_create(child).await?;
    executor.store.action_add_dependency(&child_id, &parent.id).await?;
    executor
        .store
        .action_set_status(&child_id, ActionStatus::Ready, "")
        .await?;
    executor.notify(&child_id).await
}

async fn do_create(
    executor: &Executor,
    context: &Context,
    action: &Action,
    mut cluster: Cluster,
    before: &fleetcore_policy::PolicyEnvelope,
) -> Result<VerbOutcome> {
    let profile = executor
        .store
        .profile_get(&cluster.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", cluster.profile_id.clone()))?;
    let driver = executor.drivers.lookup(&profile.profile_type)?;
    if let Err(error) = driver.do_create_cluster(context, &cluster, &profile).await {
        cluster.set_status(ClusterStatus::Error, &error.to_string());
        executor.store.cluster_update(cluster).await?;
        return Err(error);
    }

    cluster.set_status(ClusterStatus::Creating, "");
    executor.store.cluster_update(cluster.clone()).await?;

    let placements = before.creation.as_ref().map(|c| c.placement.clone()).unwrap_or_default();
    for i in 1..=cluster.size {
        let mut node = Node::new(i, &cluster.profile_id, "default");
        node.cluster_id = Some(cluster.id.clone());
        if let Some(placement) = placements.get((i - 1) as usize) {
            node.data = placement.clone();
        }
        let node_id = node.id.clone();
        executor.store.node_create(node).await?;

        let name = format!("node-{}-{}", id_prefix(&cluster.id), i);
        spawn_child(executor, action, name, &node_id, "NODE_CREATE", serde_json::json!({})).await?;
    }

    finish_after_wait(executor, action, cluster, ClusterStatus::Active).await
}

async fn do_delete(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    mut cluster: Cluster,
) -> Result<VerbOutcome> {
    cluster.set_status(ClusterStatus::Deleting, "");
    executor.store.cluster_update(cluster.clone()).await?;

    let nodes = executor.store.node_list_by_cluster(&cluster.id).await?;
    for node in &nodes {
        let name = format!("node_delete_{}", id_prefix(&node.id));
        spawn_child(executor, action, name, &node.id, "NODE_DELETE", serde_json::json!({})).await?;
    }

    match wait_for_dependents(executor, action).await? {
        WaitOutcome::Succeeded => {
            executor.store.cluster_soft_delete(&cluster.id).await?;
            cluster.set_status(ClusterStatus::Deleted, "");
            Ok(VerbOutcome::Done)
        }
        WaitOutcome::Failed(reason) => {
            cluster.set_status(ClusterStatus::Active, &reason);
            executor.store.cluster_update(cluster).await?;
            anyhow::bail!(reason)
        }
        WaitOutcome::Cancelled => Ok(VerbOutcome::AlreadyTerminal),
    }
}

#[derive(Deserialize)]
struct UpdateInputs {
    new_profile_id: String,
}

async fn do_update(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    mut cluster: Cluster,
) -> Result<VerbOutcome> {
    let inputs: UpdateInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_UPDATE requires inputs.new_profile_id: {error}")))?;

    cluster.set_status(ClusterStatus::Updating, "");
    cluster.profile_id = inputs.new_profile_id.clone();
    executor.store.cluster_update(cluster.clone()).await?;

    let nodes = executor.store.node_list_by_cluster(&cluster.id).await?;
    for node in &nodes {
        let name = format!("node_update_{}", id_prefix(&node.id));
        let inputs = serde_json::json!({ "new_profile_id": inputs.new_profile_id });
        spawn_child(executor, action, name, &node.id, "NODE_UPDATE", inputs).await?;
    }

    finish_after_wait(executor, action, cluster, ClusterStatus::Active).await
}

#[derive(Deserialize)]
struct NodeIdsInputs {
    nodes: Vec<String>,
}

/// Validate candidate node ids for `CLUSTER_ADD_NODES`.
///
/// The original engine's `do_add_nodes` mutates the candidate list while iterating over it to
/// drop already-member nodes, a remove-during-iteration bug (§9 defect (a)); here validation is
/// a clean two-pass filter: classify every id first, then decide whether to proceed.
async fn do_add_nodes(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    cluster: Cluster,
) -> Result<VerbOutcome> {
    let inputs: NodeIdsInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_ADD_NODES requires inputs.nodes: {error}")))?;
    let cluster_profile = executor
        .store
        .profile_get(&cluster.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", cluster.profile_id.clone()))?;

    let mut failures = BTreeMap::new();
    let mut to_join = Vec::new();
    for node_id in &inputs.nodes {
        let node = match executor.store.node_get(node_id, false).await? {
            Some(node) => node,
            None => {
                failures.insert(node_id.clone(), "node not found".to_string());
                continue;
            }
        };
        if node.cluster_id.as_deref() == Some(cluster.id.as_str()) {
            // Already a member: idempotent no-op, not a failure.
            continue;
        }
        if node.cluster_id.is_some() {
            failures.insert(node_id.clone(), format!("node already owned by cluster {}", node.cluster_id.unwrap()));
            continue;
        }
        if node.status != NodeStatus::Active {
            failures.insert(node_id.clone(), format!("node status {:?} is not ACTIVE", node.status));
            continue;
        }
        let node_profile = executor
            .store
            .profile_get(&node.profile_id)
            .await?
            .ok_or_else(|| NotFound::new("profile", node.profile_id.clone()))?;
        if node_profile.profile_type != cluster_profile.profile_type {
            failures.insert(
                node_id.clone(),
                ProfileTypeMismatch {
                    cluster_type: cluster_profile.profile_type.clone(),
                    node_type: node_profile.profile_type.clone(),
                }
                .to_string(),
            );
            continue;
        }
        to_join.push(node_id.clone());
    }

    if !failures.is_empty() {
        anyhow::bail!(ValidationFailed(serde_json::to_string(&failures).unwrap_or_default()));
    }

    for node_id in &to_join {
        let name = format!("node_join_{}", id_prefix(node_id));
        let inputs = serde_json::json!({ "cluster_id": cluster.id });
        spawn_child(executor, action, name, node_id, "NODE_JOIN", inputs).await?;
    }

    let mut cluster = cluster;
    finish_growth_after_wait(executor, action, &mut cluster, to_join.len() as i64).await
}

/// `CLUSTER_DEL_NODES` drops already-unowned ids silently (not a hard rejection, unlike
/// `CLUSTER_ADD_NODES`) and detaches the rest via `NODE_LEAVE`, never destroying them.
async fn do_del_nodes(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    cluster: Cluster,
) -> Result<VerbOutcome> {
    let inputs: NodeIdsInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_DEL_NODES requires inputs.nodes: {error}")))?;

    let mut failures = BTreeMap::new();
    let mut to_remove = Vec::new();
    for node_id in &inputs.nodes {
        let node = match executor.store.node_get(node_id, false).await? {
            Some(node) => node,
            None => {
                failures.insert(node_id.clone(), "node not found".to_string());
                continue;
            }
        };
        if node.cluster_id.as_deref() != Some(cluster.id.as_str()) {
            // Already outside this cluster: dropped silently, per spec.
            continue;
        }
        to_remove.push(node_id.clone());
    }
    if !failures.is_empty() {
        anyhow::bail!(ValidationFailed(serde_json::to_string(&failures).unwrap_or_default()));
    }

    for node_id in &to_remove {
        let name = format!("node_leave_{}", id_prefix(node_id));
        spawn_child(executor, action, name, node_id, "NODE_LEAVE", serde_json::json!({})).await?;
    }

    let mut cluster = cluster;
    finish_growth_after_wait(executor, action, &mut cluster, -(to_remove.len() as i64)).await
}

#[derive(Deserialize, Default)]
struct CountInputs {
    #[serde(default)]
    count: u32,
}

async fn do_scale_out(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    cluster: Cluster,
    before: &fleetcore_policy::PolicyEnvelope,
) -> Result<VerbOutcome> {
    let inputs: CountInputs = serde_json::from_value(action.inputs.clone()).unwrap_or_default();
    let count = if inputs.count > 0 {
        inputs.count
    } else {
        before.creation.as_ref().map(|c| c.count).filter(|c| *c > 0).unwrap_or(1)
    };

    let start_index = executor.store.node_max_index(&cluster.id).await? + 1;
    for offset in 0..count {
        let index = start_index + offset;
        let mut node = Node::new(index, &cluster.profile_id, "default");
        node.cluster_id = Some(cluster.id.clone());
        let node_id = node.id.clone();
        executor.store.node_create(node).await?;

        let name = format!("node-{}-{}", id_prefix(&cluster.id), index);
        spawn_child(executor, action, name, &node_id, "NODE_CREATE", serde_json::json!({})).await?;
    }

    let mut cluster = cluster;
    finish_growth_after_wait(executor, action, &mut cluster, count as i64).await
}

async fn do_scale_in(
    executor: &Executor,
    _context: &Context,
    action: &Action,
    cluster: Cluster,
    before: &fleetcore_policy::PolicyEnvelope,
) -> Result<VerbOutcome> {
    let inputs: CountInputs = serde_json::from_value(action.inputs.clone()).unwrap_or_default();
    let deletion = before.deletion.clone();
    let count = if inputs.count > 0 {
        inputs.count
    } else {
        deletion.as_ref().map(|d| d.count).filter(|c| *c > 0).unwrap_or(1)
    };
    let destroy_after_delete = deletion.as_ref().map(|d| d.destroy_after_delete).unwrap_or(true);

    let candidates: Vec<String> = match deletion.as_ref().map(|d| &d.candidates) {
        Some(candidates) if !candidates.is_empty() => candidates.clone(),
        _ => {
            let mut nodes = executor.store.node_list_by_cluster(&cluster.id).await?;
            nodes.shuffle(&mut rand::thread_rng());
            let take = (count as usize).min(nodes.len());
            nodes.into_iter().take(take).map(|n| n.id).collect()
        }
    };

    let (verb, name_prefix) = if destroy_after_delete {
        (NodeVerb::Delete.as_str(), "node_delete_")
    } else {
        (NodeVerb::Leave.as_str(), "node_leave_")
    };
    for node_id in &candidates {
        let name = format!("{name_prefix}{}", id_prefix(node_id));
        spawn_child(executor, action, name, node_id, verb, serde_json::json!({})).await?;
    }

    let mut cluster = cluster;
    finish_growth_after_wait(executor, action, &mut cluster, -(candidates.len() as i64)).await
}

#[derive(Deserialize)]
struct AttachPolicyInputs {
    policy_id: String,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    level: Option<i32>,
    #[serde(default)]
    cooldown: Option<u32>,
    #[serde(default)]
    enabled: Option<bool>,
}

async fn do_attach_policy(
    executor: &Executor,
    context: &Context,
    action: &Action,
    cluster: Cluster,
) -> Result<VerbOutcome> {
    let inputs: AttachPolicyInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_ATTACH_POLICY requires inputs.policy_id: {error}")))?;
    let policy = executor
        .store
        .policy_get(&inputs.policy_id)
        .await?
        .ok_or_else(|| NotFound::new("policy", inputs.policy_id.clone()))?;

    let existing = executor.store.cluster_policy_list(&cluster.id, false).await?;
    if existing.iter().any(|b| b.policy_id == policy.id) {
        return Ok(VerbOutcome::Done);
    }
    // §8 invariant 3 scopes "at most one policy of a given type" to enabled bindings: a
    // disabled binding of the same type must not block attaching a replacement.
    for binding in existing.iter().filter(|b| b.enabled) {
        let other = executor
            .store
            .policy_get(&binding.policy_id)
            .await?
            .ok_or_else(|| NotFound::new("policy", binding.policy_id.clone()))?;
        if other.policy_type == policy.policy_type {
            anyhow::bail!(PolicyTypeConflict {
                cluster_id: cluster.id.clone(),
                policy_type: policy.policy_type.clone(),
            });
        }
    }

    let plugin = executor.policies.lookup(&policy.policy_type)?;
    let mut envelope = fleetcore_policy::PolicyEnvelope::default();
    let attached = plugin.attach(context, &cluster, &policy, &mut envelope).await?;
    if !attached {
        anyhow::bail!(ValidationFailed(format!("policy {} refused to attach", policy.id)));
    }

    let binding = ClusterPolicy {
        cluster_id: cluster.id.clone(),
        policy_id: policy.id.clone(),
        priority: inputs.priority.unwrap_or(50),
        level: inputs.level.unwrap_or(policy.level),
        cooldown: inputs.cooldown.unwrap_or(policy.cooldown),
        enabled: inputs.enabled.unwrap_or(true),
        created: time::OffsetDateTime::now_utc(),
    };
    executor.store.cluster_policy_attach(binding).await?;
    Ok(VerbOutcome::Done)
}

#[derive(Deserialize)]
struct PolicyIdInputs {
    policy_id: String,
}

async fn do_detach_policy(executor: &Executor, action: &Action, cluster: Cluster) -> Result<VerbOutcome> {
    let inputs: PolicyIdInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_DETACH_POLICY requires inputs.policy_id: {error}")))?;
    executor.store.cluster_policy_detach(&cluster.id, &inputs.policy_id).await?;
    Ok(VerbOutcome::Done)
}

#[derive(Deserialize)]
struct UpdatePolicyInputs {
    policy_id: String,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    level: Option<i32>,
    #[serde(default)]
    cooldown: Option<u32>,
    #[serde(default)]
    enabled: Option<bool>,
}

async fn do_update_policy(executor: &Executor, action: &Action, cluster: Cluster) -> Result<VerbOutcome> {
    let inputs: UpdatePolicyInputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| ValidationFailed(format!("CLUSTER_UPDATE_POLICY requires inputs.policy_id: {error}")))?;
    let mut bindings = executor.store.cluster_policy_list(&cluster.id, false).await?;
    let binding = bindings
        .iter_mut()
        .find(|b| b.policy_id == inputs.policy_id)
        .ok_or_else(|| NotFound::new("cluster policy binding", inputs.policy_id.clone()))?;

    if let Some(priority) = inputs.priority {
        binding.priority = priority;
    }
    if let Some(level) = inputs.level {
        binding.level = level;
    }
    if let Some(cooldown) = inputs.cooldown {
        binding.cooldown = cooldown;
    }
    if let Some(enabled) = inputs.enabled {
        binding.enabled = enabled;
    }
    executor.store.cluster_policy_update(binding.clone()).await?;
    Ok(VerbOutcome::Done)
}

/// Wait for children then transition the cluster to `on_success`, or back to `ACTIVE` with the
/// failure reason recorded if anything went wrong.
async fn finish_after_wait(
    executor: &Executor,
    action: &Action,
    mut cluster: Cluster,
    on_success: ClusterStatus,
) -> Result<VerbOutcome> {
    match wait_for_dependents(executor, action).await? {
        WaitOutcome::Succeeded => {
            cluster.set_status(on_success, "");
            executor.store.cluster_update(cluster).await?;
            Ok(VerbOutcome::Done)
        }
        WaitOutcome::Failed(reason) => {
            cluster.set_status(ClusterStatus::Error, &reason);
            executor.store.cluster_update(cluster).await?;
            anyhow::bail!(reason)
        }
        WaitOutcome::Cancelled => Ok(VerbOutcome::AlreadyTerminal),
    }
}

/// Like [`finish_after_wait`] but also adjusts `cluster.size` by `delta` on success, for verbs
/// that change cluster membership rather than doing a full create/delete.
async fn finish_growth_after_wait(
    executor: &Executor,
    action: &Action,
    cluster: &mut Cluster,
    delta: i64,
) -> Result<VerbOutcome> {
    match wait_for_dependents(executor, action).await? {
        WaitOutcome::Succeeded => {
            cluster.size = (cluster.size as i64 + delta).max(0) as u32;
            cluster.set_status(ClusterStatus::Active, "");
            executor.store.cluster_update(cluster.clone()).await?;
            Ok(VerbOutcome::Done)
        }
        WaitOutcome::Failed(reason) => {
            cluster.set_status(ClusterStatus::Error, &reason);
            executor.store.cluster_update(cluster.clone()).await?;
            anyhow::bail!(reason)
        }
        WaitOutcome::Cancelled => Ok(VerbOutcome::AlreadyTerminal),
    }
}
