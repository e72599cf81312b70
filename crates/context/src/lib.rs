//! The [`Context`] is a general purpose container carrying values scoped to a unit of work.
//!
//! Every engine entry point (dispatcher worker, verb handler, policy hook) takes a `&Context`
//! instead of reaching for a process wide singleton: this keeps tests able to build a fresh,
//! isolated context rather than sharing mutable global state.
//!
//! Contexts form a tree:
//!
//! - The root context represents the process wide scope, built once in `main`.
//! - Derived contexts narrow that scope for a single request or action, attaching extra
//!   logger key/value pairs (action id, cluster id, ...).
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

/// General purpose container for values scoped to the current unit of work.
///
/// See the [crate level docs](crate) for the rationale behind threading this explicitly.
#[derive(Clone, Debug)]
pub struct Context {
    /// Logger decorated with whatever attributes apply to this scope.
    pub logger: Logger,
}

impl Context {
    /// Derive a new [`Context`] from this one, via a builder.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            logger: self.logger.clone(),
        }
    }

    /// Derive a new [`Context`], applying changes through the given callback.
    pub fn derive_with<F>(&self, callback: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        callback(self.derive()).build()
    }

    /// Start a new root [`Context`] with no additional attributes.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder { logger }
    }
}

/// Incrementally build root and derived [`Context`]s.
pub struct ContextBuilder {
    logger: Logger,
}

impl ContextBuilder {
    /// Finish building and return the [`Context`].
    pub fn build(self) -> Context {
        Context {
            logger: self.logger,
        }
    }

    /// Attach additional key/value pairs to the context's logger.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Build an empty context, discarding all log output. Useful for tests.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context { logger }
    }
}

#[cfg(test)]
mod tests {
    use super::Context;

    #[test]
    fn derive_log_attributes() {
        let root = Context::fixture();
        let parent = root
            .derive()
            .log_values(slog::o!("root" => "value", "test" => "root"))
            .build();
        let context = parent
            .derive()
            .log_values(slog::o!("test" => "override"))
            .build();
        assert_eq!(format!("{:?}", context.logger.list()), "(test, test, root)");
    }

    #[test]
    fn derive_noop() {
        let parent = Context::fixture();
        let context = parent.derive().build();
        assert_eq!(
            format!("{:?}", parent.logger.list()),
            format!("{:?}", context.logger.list()),
        );
    }
}
