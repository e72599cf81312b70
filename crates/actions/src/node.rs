//! `NodeAction` verb handlers (`spec.md` §4.E.2).
use std::time::Duration;

use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_errors::NotFound;
use fleetcore_events::Event;
use fleetcore_events::Subject;
use fleetcore_lock::AcquireOutcome;
use fleetcore_lock::Scope;
use fleetcore_models::Action;
use fleetcore_models::ActionStatus;
use fleetcore_models::Node;
use fleetcore_models::NodeStatus;

use crate::driver::DriverStage;
use crate::executor::Executor;

/// The closed set of verbs a [`NodeAction`](fleetcore_models::Action) may carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeVerb {
    Create,
    Delete,
    Update,
    Join,
    Leave,
}

impl NodeVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeVerb::Create => "NODE_CREATE",
            NodeVerb::Delete => "NODE_DELETE",
            NodeVerb::Update => "NODE_UPDATE",
            NodeVerb::Join => "NODE_JOIN",
            NodeVerb::Leave => "NODE_LEAVE",
        }
    }

    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "NODE_CREATE" => Some(NodeVerb::Create),
            "NODE_DELETE" => Some(NodeVerb::Delete),
            "NODE_UPDATE" => Some(NodeVerb::Update),
            "NODE_JOIN" => Some(NodeVerb::Join),
            "NODE_LEAVE" => Some(NodeVerb::Leave),
            _ => None,
        }
    }
}

/// Poll interval for provisioning loops; the original engine uses a short fixed cadence rather
/// than exponential backoff since `timeout` is the real bound on total wait time.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run a single `NodeAction` to completion. `action` targets a node id.
pub async fn run(executor: &Executor, context: &Context, action: &Action) -> Result<()> {
    let verb = NodeVerb::parse(&action.action)
        .ok_or_else(|| anyhow::anyhow!("unknown node verb '{}'", action.action))?;

    let outcome = executor.locks.acquire(&action.target, &action.id, Scope::Node, false);
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
                .action_set_status(&action.id, ActionStatus::Failed, "Failed locking node")
                .await?;
            let event = Event::new(Subject::Node, action.target.clone(), action.action.clone(), "FAILED", "Failed locking node");
            executor.events.emit(context, event).await.ok();
            return Ok(());
        }
    };
    if let Some(holder) = holder_to_cancel {
        executor
            .store
            .action_set_status(&holder, ActionStatus::Cancelled, "lock preempted")
            .await
            .ok();
    }

    let result = dispatch(executor, context, action, verb).await;
    executor.locks.release(&action.target, &action.id, Scope::Node);

    if let Err(error) = &result {
        // `dispatch` already records Failed for errors raised inside a verb handler; this
        // only covers errors raised before that point (e.g. the target node went missing).
        let status = executor.store.action_get_status(&action.id).await?;
        if !status.map(ActionStatus::is_terminal).unwrap_or(true) {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Failed, &error.to_string())
                .await?;
        }
    }
    Ok(())
}

async fn dispatch(
    executor: &Executor,
    context: &Context,
    action: &Action,
    verb: NodeVerb,
) -> Result<()> {
    executor
        .store
        .action_set_status(&action.id, ActionStatus::Running, "")
        .await?;

    let mut node = executor
        .store
        .node_get(&action.target, true)
        .await?
        .ok_or_else(|| NotFound::new("node", action.target.clone()))?;

    let outcome = match verb {
        NodeVerb::Create => do_create(executor, context, action, &mut node).await,
        NodeVerb::Delete => do_delete(executor, context, action, &mut node).await,
        NodeVerb::Update => do_update(executor, context, action, &mut node).await,
        NodeVerb::Join => do_join(executor, context, action, &mut node).await,
        NodeVerb::Leave => do_leave(executor, context, action, &mut node).await,
    };

    match outcome {
        Ok(()) => {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Succeeded, "")
                .await?;
            emit(executor, context, &action.action, &node, "SUCCEEDED", "").await;
        }
        Err(error) => {
            executor
                .store
                .action_set_status(&action.id, ActionStatus::Failed, &error.to_string())
                .await?;
            emit(executor, context, &action.action, &node, "FAILED", &error.to_string()).await;
            return Err(error);
        }
    }
    Ok(())
}

async fn emit(executor: &Executor, context: &Context, verb: &str, node: &Node, status: &str, reason: &str) {
    let event = Event::new(Subject::Node, node.id.clone(), verb, status, reason);
    executor.events.emit(context, event).await.ok();
}

async fn do_create(executor: &Executor, context: &Context, action: &Action, node: &mut Node) -> Result<()> {
    let profile = executor
        .store
        .profile_get(&node.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", node.profile_id.clone()))?;
    let driver = executor.drivers.lookup(&profile.profile_type)?;

    let physical_id = driver.do_create(context, node, &profile).await?;
    node.physical_id = Some(physical_id);
    node.set_status(NodeStatus::Creating, "");
    executor.store.node_update(node.clone()).await?;

    poll_until_terminal(executor, context, action, node, &driver, "NODE_CREATE").await?;
    node.set_status(NodeStatus::Active, "");
    executor.store.node_update(node.clone()).await?;
    Ok(())
}

async fn do_delete(executor: &Executor, context: &Context, action: &Action, node: &mut Node) -> Result<()> {
    let driver = executor.drivers.lookup(&driver_type_of(executor, node).await?)?;

    node.set_status(NodeStatus::Deleting, "");
    executor.store.node_update(node.clone()).await?;
    driver.do_delete(context, node).await?;
    poll_until_terminal(executor, context, action, node, &driver, "NODE_DELETE").await?;

    node.cluster_id = None;
    node.set_status(NodeStatus::Deleted, "");
    executor.store.node_update(node.clone()).await?;
    executor.store.node_soft_delete(&node.id).await?;
    Ok(())
}

async fn do_update(executor: &Executor, context: &Context, action: &Action, node: &mut Node) -> Result<()> {
    #[derive(serde::Deserialize)]
    struct Inputs {
        new_profile_id: String,
    }
    let inputs: Inputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| anyhow::anyhow!("NODE_UPDATE requires inputs.new_profile_id: {error}"))?;
    let new_profile = executor
        .store
        .profile_get(&inputs.new_profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", inputs.new_profile_id.clone()))?;
    let old_profile = executor
        .store
        .profile_get(&node.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", node.profile_id.clone()))?;
    let driver = executor.drivers.lookup(&old_profile.profile_type)?;

    node.set_status(NodeStatus::Updating, "");
    executor.store.node_update(node.clone()).await?;
    driver.do_update(context, node, &new_profile).await?;
    poll_until_terminal(executor, context, action, node, &driver, "NODE_UPDATE").await?;

    node.profile_id = new_profile.id.clone();
    node.set_status(NodeStatus::Active, "");
    executor.store.node_update(node.clone()).await?;
    Ok(())
}

/// `NODE_JOIN` confirms `node` can join `action.target`'s owning cluster and sets `cluster_id`.
async fn do_join(executor: &Executor, context: &Context, action: &Action, node: &mut Node) -> Result<()> {
    #[derive(serde::Deserialize)]
    struct Inputs {
        cluster_id: String,
    }
    let inputs: Inputs = serde_json::from_value(action.inputs.clone())
        .map_err(|error| anyhow::anyhow!("NODE_JOIN requires inputs.cluster_id: {error}"))?;
    let profile = executor
        .store
        .profile_get(&node.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", node.profile_id.clone()))?;
    let driver = executor.drivers.lookup(&profile.profile_type)?;

    node.set_status(NodeStatus::Joining, "");
    executor.store.node_update(node.clone()).await?;
    if !driver.do_validate(context, node).await? {
        anyhow::bail!("node {} failed profile validation for join", node.id);
    }

    node.cluster_id = Some(inputs.cluster_id);
    node.set_status(NodeStatus::Active, "");
    executor.store.node_update(node.clone()).await?;
    Ok(())
}

/// `NODE_LEAVE` detaches `node` from its cluster without destroying the backing artifact.
async fn do_leave(executor: &Executor, context: &Context, _action: &Action, node: &mut Node) -> Result<()> {
    node.set_status(NodeStatus::Leaving, "");
    executor.store.node_update(node.clone()).await?;

    node.cluster_id = None;
    node.set_status(NodeStatus::Active, "");
    executor.store.node_update(node.clone()).await?;
    let _ = context;
    Ok(())
}

async fn driver_type_of(executor: &Executor, node: &Node) -> Result<String> {
    let profile = executor
        .store
        .profile_get(&node.profile_id)
        .await?
        .ok_or_else(|| NotFound::new("profile", node.profile_id.clone()))?;
    Ok(profile.profile_type)
}

/// Poll `driver.do_check` until it reports a terminal stage for `expected_verb`, honouring
/// `action.timeout` and cooperative yielding between polls.
async fn poll_until_terminal(
    executor: &Executor,
    context: &Context,
    action: &Action,
    node: &Node,
    driver: &std::sync::Arc<dyn crate::driver::ProfileDriver>,
    expected_verb: &str,
) -> Result<()> {
    let start = executor.scheduler.wallclock();
    loop {
        let status = driver.do_check(context, node).await?;
        status.expect_verb(expected_verb)?;
        match status.stage {
            DriverStage::Complete => return Ok(()),
            DriverStage::Failed => {
                anyhow::bail!(fleetcore_errors::DriverFailure {
                    subject: node.id.clone(),
                    reason: format!("{expected_verb} failed"),
                })
            }
            DriverStage::InProgress => {}
        }

        let elapsed = executor.scheduler.wallclock() - start;
        if elapsed.whole_seconds() as u64 > action.timeout {
            anyhow::bail!(fleetcore_errors::Timeout {
                action_id: action.id.clone(),
                timeout_secs: action.timeout,
            });
        }
        executor.scheduler.sleep(POLL_INTERVAL).await;
    }
}
