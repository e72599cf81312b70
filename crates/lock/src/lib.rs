//! Process-wide registry granting exclusive access to clusters and nodes.
//!
//! Two scopes exist, cluster and node. A lock is held by an action ID; `acquire` either
//! succeeds outright (no current holder), succeeds by forcibly evicting the current holder
//! (`forced = true`, used only by `CLUSTER_DELETE` so deletion always makes progress), or
//! fails leaving the existing holder untouched.
//!
//! Failure to acquire is an ordinary return value, not an error: callers surface it as
//! `RES_ERROR` with the reason "Failed locking cluster" (or node), same as the original engine.
use std::collections::HashMap;
use std::sync::Mutex;

/// Lock granularity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Scope {
    Cluster,
    Node,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Cluster => "cluster",
            Scope::Node => "node",
        }
    }
}

/// Outcome of a [`LockManager::acquire`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AcquireOutcome {
    /// The lock was free and is now held by the requesting action.
    Acquired,

    /// The lock was held by another action that was forcibly evicted.
    ///
    /// Callers must mark `previous_holder` as `CANCELLED` with a reason mentioning
    /// preemption, and release whatever resources it held.
    Evicted { previous_holder: String },

    /// The lock is held by another action and `forced` was not set.
    Busy { holder: String },
}

/// Registry of `(scope, resource_id) -> holder action id`.
#[derive(Default)]
pub struct LockManager {
    holders: Mutex<HashMap<(Scope, String), String>>,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            holders: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to acquire a lock on `resource_id` for `action_id`.
    pub fn acquire(
        &self,
        resource_id: &str,
        action_id: &str,
        scope: Scope,
        forced: bool,
    ) -> AcquireOutcome {
        let mut holders = self.holders.lock().expect("lock registry poisoned");
        let key = (scope, resource_id.to_string());
        match holders.get(&key).cloned() {
            None => {
                holders.insert(key, action_id.to_string());
                AcquireOutcome::Acquired
            }
            Some(holder) if holder == action_id => AcquireOutcome::Acquired,
            Some(holder) if forced => {
                holders.insert(key, action_id.to_string());
                AcquireOutcome::Evicted {
                    previous_holder: holder,
                }
            }
            Some(holder) => AcquireOutcome::Busy { holder },
        }
    }

    /// Release the lock on `resource_id`, only if `action_id` is the current holder.
    ///
    /// Idempotent: releasing a lock you don't hold (already released, or taken over by
    /// another action) is a no-op.
    pub fn release(&self, resource_id: &str, action_id: &str, scope: Scope) {
        let mut holders = self.holders.lock().expect("lock registry poisoned");
        let key = (scope, resource_id.to_string());
        if holders.get(&key).map(String::as_str) == Some(action_id) {
            holders.remove(&key);
        }
    }

    /// Inspect the current holder of a lock, without acquiring it.
    pub fn holder(&self, resource_id: &str, scope: Scope) -> Option<String> {
        let holders = self.holders.lock().expect("lock registry poisoned");
        holders.get(&(scope, resource_id.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::AcquireOutcome;
    use super::LockManager;
    use super::Scope;

    #[test]
    fn acquire_when_free() {
        let locks = LockManager::new();
        let outcome = locks.acquire("c1", "a1", Scope::Cluster, false);
        assert_eq!(outcome, AcquireOutcome::Acquired);
        assert_eq!(locks.holder("c1", Scope::Cluster), Some("a1".to_string()));
    }

    #[test]
    fn busy_without_force() {
        let locks = LockManager::new();
        locks.acquire("c1", "a1", Scope::Cluster, false);
        let outcome = locks.acquire("c1", "a2", Scope::Cluster, false);
        assert_eq!(
            outcome,
            AcquireOutcome::Busy {
                holder: "a1".to_string()
            }
        );
    }

    #[test]
    fn forced_eviction() {
        let locks = LockManager::new();
        locks.acquire("c1", "a1", Scope::Cluster, false);
        let outcome = locks.acquire("c1", "a2", Scope::Cluster, true);
        assert_eq!(
            outcome,
            AcquireOutcome::Evicted {
                previous_holder: "a1".to_string()
            }
        );
        assert_eq!(locks.holder("c1", Scope::Cluster), Some("a2".to_string()));
    }

    #[test]
    fn release_is_idempotent_and_owner_checked() {
        let locks = LockManager::new();
        locks.acquire("c1", "a1", Scope::Cluster, false);
        // Non-holder release is a no-op.
        locks.release("c1", "a2", Scope::Cluster);
        assert_eq!(locks.holder("c1", Scope::Cluster), Some("a1".to_string()));

        locks.release("c1", "a1", Scope::Cluster);
        assert_eq!(locks.holder("c1", Scope::Cluster), None);
        // Releasing again does nothing and does not panic.
        locks.release("c1", "a1", Scope::Cluster);
    }

    #[test]
    fn scopes_are_independent() {
        let locks = LockManager::new();
        locks.acquire("x1", "a1", Scope::Cluster, false);
        let outcome = locks.acquire("x1", "a2", Scope::Node, false);
        assert_eq!(outcome, AcquireOutcome::Acquired);
    }
}
