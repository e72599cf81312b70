//! Profile driver plugin boundary (`spec.md` §6).
//!
//! A driver realizes the physical side effects of a node's profile type (spinning up a VM,
//! registering an agent, whatever the profile type calls for). The core only ever sees the
//! five operations below and a `<VERB>_<STAGE>` status word it polls until terminal.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_errors::DriverVerbMismatch;
use fleetcore_errors::NotFound;
use fleetcore_models::Cluster;
use fleetcore_models::Node;
use fleetcore_models::Profile;

/// Progress stage reported by a driver's `do_check`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverStage {
    InProgress,
    Complete,
    Failed,
}

/// A driver status word, parsed from `<VERB>_<STAGE>` (e.g. `NODE_CREATE_IN_PROGRESS`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverStatus {
    pub verb: String,
    pub stage: DriverStage,
}

impl DriverStatus {
    /// Parse a raw driver status word.
    ///
    /// `STAGE` is matched longest suffix first since `IN_PROGRESS` itself contains an
    /// underscore and must not be confused with the verb/stage separator.
    pub fn parse(raw: &str) -> Result<Self> {
        const STAGES: &[(&str, DriverStage)] = &[
            ("_IN_PROGRESS", DriverStage::InProgress),
            ("_COMPLETE", DriverStage::Complete),
            ("_FAILED", DriverStage::Failed),
        ];
        for (suffix, stage) in STAGES {
            if let Some(verb) = raw.strip_suffix(suffix) {
                return Ok(DriverStatus {
                    verb: verb.to_string(),
                    stage: *stage,
                });
            }
        }
        anyhow::bail!("driver status '{raw}' does not end in a recognised stage");
    }

    /// Check that this status reports on the verb the caller expected, per §4.E.2: a mismatch
    /// between expected and observed verb is a hard error, never silently ignored.
    pub fn expect_verb(&self, expected: &str) -> Result<()> {
        if self.verb != expected {
            anyhow::bail!(DriverVerbMismatch {
                expected: expected.to_string(),
                observed: self.verb.clone(),
            });
        }
        Ok(())
    }
}

/// Implemented by every profile type known to the engine.
#[async_trait::async_trait]
pub trait ProfileDriver: Send + Sync + std::fmt::Debug {
    fn profile_type(&self) -> &'static str;

    /// Realize the cluster-level artifact `CLUSTER_CREATE` stands up before any node is
    /// created (`spec.md` §4.E.1); the counterpart to `do_create` at cluster rather than node
    /// granularity. An error here stops node provisioning entirely.
    async fn do_create_cluster(&self, context: &Context, cluster: &Cluster, profile: &Profile) -> Result<()>;

    /// Start realizing `node`; returns the opaque physical handle once provisioning begins.
    async fn do_create(&self, context: &Context, node: &Node, profile: &Profile)
        -> Result<String>;

    /// Start tearing down `node`'s backing artifact.
    async fn do_delete(&self, context: &Context, node: &Node) -> Result<bool>;

    /// Start migrating `node` onto `new_profile`.
    async fn do_update(
        &self,
        context: &Context,
        node: &Node,
        new_profile: &Profile,
    ) -> Result<bool>;

    /// Poll the current status of whatever operation is in flight for `node`.
    async fn do_check(&self, context: &Context, node: &Node) -> Result<DriverStatus>;

    /// Confirm `node` is a valid member of its claimed profile type (used by `NODE_JOIN`).
    async fn do_validate(&self, context: &Context, node: &Node) -> Result<bool>;
}

/// Map of profile type name to the [`ProfileDriver`] implementing it.
///
/// Built once, explicitly, at engine construction time, mirroring
/// [`fleetcore_policy::PolicyRegistry`] (see `SPEC_FULL.md` §9).
#[derive(Clone, Default)]
pub struct ProfileDriverRegistry {
    entries: Arc<HashMap<&'static str, Arc<dyn ProfileDriver>>>,
}

impl ProfileDriverRegistry {
    pub fn build() -> ProfileDriverRegistryBuilder {
        ProfileDriverRegistryBuilder::default()
    }

    pub fn lookup(&self, profile_type: &str) -> Result<Arc<dyn ProfileDriver>> {
        self.entries
            .get(profile_type)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(NotFound::new("profile type", profile_type)))
    }
}

#[derive(Default)]
pub struct ProfileDriverRegistryBuilder {
    entries: HashMap<&'static str, Arc<dyn ProfileDriver>>,
}

impl ProfileDriverRegistryBuilder {
    /// # Panics
    ///
    /// Panics if `profile_type` is already registered.
    pub fn register<D: ProfileDriver + 'static>(&mut self, driver: D) -> &mut Self {
        let profile_type = driver.profile_type();
        if self.entries.contains_key(profile_type) {
            panic!("profile type {profile_type} cannot be registered more than once");
        }
        self.entries.insert(profile_type, Arc::new(driver));
        self
    }

    pub fn finish(self) -> ProfileDriverRegistry {
        ProfileDriverRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_with_underscore() {
        let status = DriverStatus::parse("NODE_CREATE_IN_PROGRESS").unwrap();
        assert_eq!(status.verb, "NODE_CREATE");
        assert_eq!(status.stage, DriverStage::InProgress);
    }

    #[test]
    fn parses_complete_and_failed() {
        assert_eq!(
            DriverStatus::parse("NODE_DELETE_COMPLETE").unwrap().stage,
            DriverStage::Complete
        );
        assert_eq!(
            DriverStatus::parse("NODE_UPDATE_FAILED").unwrap().stage,
            DriverStage::Failed
        );
    }

    #[test]
    fn rejects_unrecognised_stage() {
        assert!(DriverStatus::parse("NODE_CREATE_WAT").is_err());
    }

    #[test]
    fn verb_mismatch_is_an_error() {
        let status = DriverStatus::parse("NODE_DELETE_COMPLETE").unwrap();
        assert!(status.expect_verb("NODE_CREATE").is_err());
        assert!(status.expect_verb("NODE_DELETE").is_ok());
    }
}
