//! Worker pool that drains action-ready notifications (`spec.md`'s `NEW_ACTION`).
//!
//! Grounded on `core-logic/task/orchestrate/src/callback.rs`'s `TaskCallback` trait and
//! `service/tasks`'s queue abstractions, reworked per `SPEC_FULL.md` §4.C around a
//! `tokio::sync::mpsc` channel drained by a single dispatch loop that spawns one task per action,
//! since actions here run as async tasks in process rather than as jobs on a distributed task
//! queue.
//!
//! A fixed pool of worker loops that call `executor.execute(action).await` inline, then loop
//! back to `rx.recv()`, looks simpler but deadlocks: a `CLUSTER_CREATE`/`CLUSTER_DELETE` parent
//! action blocks for its entire run inside `wait_for_dependents`, so the task running it never
//! returns to `rx.recv()` to pick up the very child actions it is waiting on. With `workers`
//! parent actions in flight at once, the whole pool starves until each parent's own timeout
//! fires. Spawning a task per action instead means the dispatch loop always returns to
//! `rx.recv()` immediately, regardless of how long any single action's task takes to resolve.
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use fleetcore_context::Context;

/// Implemented by whatever knows how to run a single action to completion.
///
/// The dispatcher has no notion of clusters, nodes, or verbs, only of "an action id became
/// runnable"; `fleetcore-engine` wires this trait to `fleetcore_actions`'s verb dispatch tables.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, context: &Context, action_id: &str) -> Result<()>;
}

/// Tunables for the worker pool.
#[derive(Clone, Copy, Debug)]
pub struct DispatcherConf {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatcherConf {
    fn default() -> Self {
        DispatcherConf {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Sink side of the `NEW_ACTION` notification channel.
///
/// Cloning a `Dispatcher` shares the same underlying queue: any clone's `notify` call reaches
/// whichever worker picks it up next.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<String>,
}

impl Dispatcher {
    /// Spawn the dispatch loop and return the handle used to notify it.
    ///
    /// A single task owns the receiver and spawns a fresh task per action it pulls off the
    /// queue, so the loop always returns to `rx.recv()` right away regardless of how long any
    /// individual action takes to run -- concurrency between actions is effectively unbounded,
    /// which is what actually breaks the starvation cycle: a parent blocked in
    /// `wait_for_dependents` no longer occupies anything the dispatch loop needs in order to
    /// keep picking up its children. `conf.workers` is not used to gate concurrency here (a
    /// permit held for a parent's entire run would reproduce the same deadlock one level down);
    /// it only sizes the notification channel alongside `queue_capacity`.
    pub fn spawn(
        context: &Context,
        conf: DispatcherConf,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel(conf.queue_capacity.max(1));
        let context = context.clone();

        tokio::spawn(async move {
            while let Some(action_id) = rx.recv().await {
                let executor = Arc::clone(&executor);
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(error) = executor.execute(&context, &action_id).await {
                        slog::error!(
                            context.logger, "Action execution failed";
                            "action_id" => &action_id,
                            "error" => %error,
                        );
                    }
                });
            }
        });

        Dispatcher { tx }
    }

    /// Enqueue an action for execution (`spec.md`'s `NEW_ACTION`).
    ///
    /// Returns an error only once the dispatch loop has shut down and the channel is closed; a
    /// full queue backpressures the caller instead of dropping the notification.
    pub async fn notify(&self, action_id: impl Into<String>) -> Result<()> {
        self.tx
            .send(action_id.into())
            .await
            .map_err(|_| anyhow::anyhow!("dispatcher worker pool has shut down"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct RecordingExecutor {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, _context: &Context, action_id: &str) -> Result<()> {
            self.seen.lock().await.push(action_id.to_string());
            Ok(())
        }
    }

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl ActionExecutor for FailingExecutor {
        async fn execute(&self, _context: &Context, _action_id: &str) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn notify_runs_action_through_executor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(RecordingExecutor {
            seen: Arc::clone(&seen),
        });
        let context = Context::fixture();
        let dispatcher = Dispatcher::spawn(&context, DispatcherConf::default(), executor);

        dispatcher.notify("action-1").await.unwrap();
        dispatcher.notify("action-2").await.unwrap();

        // Give the worker a chance to drain the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"action-1".to_string()));
        assert!(seen.contains(&"action-2".to_string()));
    }

    #[tokio::test]
    async fn a_failing_action_does_not_stop_the_worker() {
        let context = Context::fixture();
        let dispatcher =
            Dispatcher::spawn(&context, DispatcherConf::default(), Arc::new(FailingExecutor));

        dispatcher.notify("bad-action").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The worker loop survived the failure and still accepts new notifications.
        dispatcher.notify("another").await.unwrap();
    }

    /// An action blocked waiting on something else must not stop other actions from running:
    /// this is what used to deadlock when a fixed pool of worker loops called `execute` inline.
    #[tokio::test]
    async fn a_blocked_action_does_not_starve_others() {
        struct BlockingThenRecording {
            seen: Arc<Mutex<Vec<String>>>,
        }

        #[async_trait::async_trait]
        impl ActionExecutor for BlockingThenRecording {
            async fn execute(&self, _context: &Context, action_id: &str) -> Result<()> {
                if action_id == "parent" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                self.seen.lock().await.push(action_id.to_string());
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(BlockingThenRecording {
            seen: Arc::clone(&seen),
        });
        let context = Context::fixture();
        let conf = DispatcherConf {
            workers: 1,
            queue_capacity: 1024,
        };
        let dispatcher = Dispatcher::spawn(&context, conf, executor);

        dispatcher.notify("parent").await.unwrap();
        dispatcher.notify("child").await.unwrap();

        // "child" runs on its own spawned task and finishes well before "parent"'s sleep does,
        // even though "parent" was notified first and is still blocked.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().await.contains(&"child".to_string()));
        assert!(!seen.lock().await.contains(&"parent".to_string()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let seen = seen.lock().await;
        assert!(seen.contains(&"parent".to_string()));
        assert!(seen.contains(&"child".to_string()));
    }
}
