//! Interfaces to emit events to a backing sink.
use std::sync::Arc;

use anyhow::Result;

use fleetcore_context::Context;

use super::Event;

/// Emit [`Event`]s to whatever backend the process was configured with.
#[derive(Clone)]
pub struct Events(Arc<dyn EventsBackend>);

impl Events {
    /// Record a new event.
    pub async fn emit(&self, context: &Context, event: Event) -> Result<()> {
        self.0.emit(context, event).await
    }
}

impl<T> From<T> for Events
where
    T: EventsBackend + 'static,
{
    fn from(value: T) -> Self {
        Events(Arc::new(value))
    }
}

/// Operations a backing event sink must implement.
#[async_trait::async_trait]
pub trait EventsBackend: Send + Sync {
    /// Record a new event.
    async fn emit(&self, context: &Context, event: Event) -> Result<()>;
}

/// Structured-logging backend: every event is logged, never persisted.
///
/// Useful as the default when no richer event store is configured.
#[derive(Clone, Debug, Default)]
pub struct LoggingBackend;

#[async_trait::async_trait]
impl EventsBackend for LoggingBackend {
    async fn emit(&self, context: &Context, event: Event) -> Result<()> {
        slog::info!(
            context.logger, "Event emitted";
            "subject" => ?event.subject,
            "subject_id" => &event.subject_id,
            "action" => &event.action,
            "status" => &event.status,
            "reason" => &event.reason,
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::EventsFixture;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture {
    use std::sync::Arc;
    use std::sync::Mutex;

    use anyhow::Result;

    use fleetcore_context::Context;

    use super::super::Event;
    use super::EventsBackend;
    use super::Events;

    /// In-memory event sink for tests: records every emitted [`Event`] for later inspection.
    #[derive(Clone, Default)]
    pub struct EventsFixture {
        recorded: Arc<Mutex<Vec<Event>>>,
    }

    impl EventsFixture {
        /// Build a new, empty fixture.
        pub fn new() -> Self {
            Self::default()
        }

        /// Wrap this fixture as an [`Events`] handle.
        pub fn events(&self) -> Events {
            Events::from(self.clone())
        }

        /// Return a snapshot of all events recorded so far.
        pub fn recorded(&self) -> Vec<Event> {
            self.recorded.lock().expect("fixture lock poisoned").clone()
        }
    }

    #[async_trait::async_trait]
    impl EventsBackend for EventsFixture {
        async fn emit(&self, _context: &Context, event: Event) -> Result<()> {
            self.recorded.lock().expect("fixture lock poisoned").push(event);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetcore_context::Context;

    use super::super::Event;
    use super::super::Subject;
    use super::EventsFixture;

    #[tokio::test]
    async fn fixture_records_events() {
        let fixture = EventsFixture::new();
        let events = fixture.events();
        let context = Context::fixture();

        let event = Event::new(Subject::Node, "n1", "NODE_CREATE", "ACTIVE", "");
        events.emit(&context, event).await.unwrap();

        let recorded = fixture.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].subject_id, "n1");
    }
}
