//! Wiring shared by every verb handler: store, locks, scheduler, policy, drivers, events.
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_dispatcher::ActionExecutor;
use fleetcore_dispatcher::Dispatcher;
use fleetcore_events::Events;
use fleetcore_lock::LockManager;
use fleetcore_policy::PolicyRegistry;
use fleetcore_scheduler::Scheduler;
use fleetcore_store::Store;

use crate::driver::ProfileDriverRegistry;

/// Collaborators every `ClusterAction`/`NodeAction` verb handler needs.
///
/// `dispatcher` is set once, after construction, via [`Executor::attach_dispatcher`]: the
/// dispatcher's worker pool needs an [`ActionExecutor`] to run (this struct, wrapped in an
/// `Arc`), and this struct needs a `Dispatcher` handle to notify children it spawns, so neither
/// can be fully built before the other exists. `fleetcore-engine` ties the two together at
/// startup.
pub struct Executor {
    pub store: Store,
    pub locks: Arc<LockManager>,
    pub scheduler: Scheduler,
    pub policies: PolicyRegistry,
    pub drivers: ProfileDriverRegistry,
    pub events: Events,
    dispatcher: OnceLock<Dispatcher>,
}

impl Executor {
    pub fn new(
        store: Store,
        locks: Arc<LockManager>,
        scheduler: Scheduler,
        policies: PolicyRegistry,
        drivers: ProfileDriverRegistry,
        events: Events,
    ) -> Arc<Self> {
        Arc::new(Executor {
            store,
            locks,
            scheduler,
            policies,
            drivers,
            events,
            dispatcher: OnceLock::new(),
        })
    }

    /// Bind the dispatcher handle this executor's verb handlers notify for child actions.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn attach_dispatcher(&self, dispatcher: Dispatcher) {
        self.dispatcher
            .set(dispatcher)
            .unwrap_or_else(|_| panic!("dispatcher already attached"));
    }

    /// Notify the dispatcher that a newly created child action is ready to run.
    pub async fn notify(&self, action_id: &str) -> Result<()> {
        let dispatcher = self
            .dispatcher
            .get()
            .expect("dispatcher not attached before executor was used");
        dispatcher.notify(action_id).await
    }
}

#[async_trait::async_trait]
impl ActionExecutor for Executor {
    async fn execute(&self, context: &Context, action_id: &str) -> Result<()> {
        crate::run_action(self, context, action_id).await
    }
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use std::sync::Arc;
    use std::sync::Mutex;

    use anyhow::Result;

    use fleetcore_context::Context;
    use fleetcore_models::Cluster;
    use fleetcore_models::Node;
    use fleetcore_models::Profile;

    use crate::driver::DriverStage;
    use crate::driver::DriverStatus;
    use crate::driver::ProfileDriver;

    /// Profile driver fixture: completes every operation on the first `do_check` poll.
    ///
    /// Records every call it receives so tests can assert on driver interaction without a real
    /// provisioning backend, the way `core/store/src/fixture.rs` records store calls. `do_check`
    /// reports on whatever operation ran most recently, so a single fixture instance can be
    /// reused across a create-then-poll sequence within one test.
    #[derive(Debug, Default)]
    pub struct FakeDriver {
        pub calls: Mutex<Vec<String>>,
        last_verb: Mutex<Option<String>>,
        pub fails: bool,
    }

    impl FakeDriver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            FakeDriver {
                calls: Mutex::new(Vec::new()),
                last_verb: Mutex::new(None),
                fails: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl ProfileDriver for FakeDriver {
        fn profile_type(&self) -> &'static str {
            "fixture"
        }

        async fn do_create_cluster(
            &self,
            _context: &Context,
            cluster: &Cluster,
            _profile: &Profile,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(format!("create_cluster:{}", cluster.id));
            Ok(())
        }

        async fn do_create(
            &self,
            _context: &Context,
            node: &Node,
            _profile: &Profile,
        ) -> Result<String> {
            self.calls.lock().unwrap().push(format!("create:{}", node.id));
            *self.last_verb.lock().unwrap() = Some("NODE_CREATE".to_string());
            Ok(format!("physical-{}", node.id))
        }

        async fn do_delete(&self, _context: &Context, node: &Node) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("delete:{}", node.id));
            *self.last_verb.lock().unwrap() = Some("NODE_DELETE".to_string());
            Ok(true)
        }

        async fn do_update(
            &self,
            _context: &Context,
            node: &Node,
            _new_profile: &Profile,
        ) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("update:{}", node.id));
            *self.last_verb.lock().unwrap() = Some("NODE_UPDATE".to_string());
            Ok(true)
        }

        async fn do_check(&self, _context: &Context, node: &Node) -> Result<DriverStatus> {
            self.calls.lock().unwrap().push(format!("check:{}", node.id));
            let verb = self
                .last_verb
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "NODE_CREATE".to_string());
            let stage = if self.fails {
                DriverStage::Failed
            } else {
                DriverStage::Complete
            };
            Ok(DriverStatus { verb, stage })
        }

        async fn do_validate(&self, _context: &Context, node: &Node) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("validate:{}", node.id));
            Ok(true)
        }
    }

    pub fn shared() -> Arc<FakeDriver> {
        Arc::new(FakeDriver::new())
    }
}
