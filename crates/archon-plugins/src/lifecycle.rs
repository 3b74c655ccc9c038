//! Lifecycle events plugins may subscribe to. `beforeCommit`/`beforeSnapshot`
//! are vetoable: a subscriber that returns [`LifecycleDecision::Veto`] aborts
//! the operation with `E_PLUGIN_VETO`. The others are notification-only.

use archon_core::{codes, ArchonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    BeforeCommit,
    AfterCommit,
    BeforeSnapshot,
    AfterSnapshot,
    OnPull,
    MergeStart,
    MergeEnd,
}

impl LifecycleEvent {
    pub fn is_vetoable(self) -> bool {
        matches!(self, LifecycleEvent::BeforeCommit | LifecycleEvent::BeforeSnapshot)
    }
}

#[derive(Debug, Clone)]
pub enum LifecycleDecision {
    Proceed,
    Veto { reason: String },
}

/// Context passed to a subscriber; deliberately small (a message and the
/// plugin id that's about to act), since subscribers reach the rest of
/// their state through their own `HostApi` handle, not through this event.
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    pub message: Option<String>,
}

pub trait LifecycleSubscriber: Send + Sync {
    fn plugin_id(&self) -> &str;
    fn on_event(&self, event: LifecycleEvent, ctx: &LifecycleContext) -> LifecycleDecision;
}

/// Dispatches lifecycle events to every subscribed plugin in registration
/// order. For a vetoable event, the first veto short-circuits the remaining
/// subscribers and the caller gets `E_PLUGIN_VETO` back.
#[derive(Default)]
pub struct LifecycleBus {
    subscribers: Vec<std::sync::Arc<dyn LifecycleSubscriber>>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: std::sync::Arc<dyn LifecycleSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn emit(&self, event: LifecycleEvent, ctx: &LifecycleContext) -> Result<(), ArchonError> {
        for subscriber in &self.subscribers {
            match subscriber.on_event(event, ctx) {
                LifecycleDecision::Proceed => {}
                LifecycleDecision::Veto { reason } => {
                    if event.is_vetoable() {
                        return Err(ArchonError::new(
                            codes::PLUGIN_VETO,
                            format!("plugin {} vetoed {:?}: {reason}", subscriber.plugin_id(), event),
                        ));
                    }
                    tracing::warn!(
                        plugin_id = subscriber.plugin_id(),
                        event = ?event,
                        reason = %reason,
                        "plugin returned a veto from a non-vetoable lifecycle event; ignoring"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    struct Always(&'static str, LifecycleDecision);
    impl LifecycleSubscriber for Always {
        fn plugin_id(&self) -> &str {
            self.0
        }
        fn on_event(&self, _event: LifecycleEvent, _ctx: &LifecycleContext) -> LifecycleDecision {
            self.1.clone()
        }
    }

    #[test]
    fn veto_on_before_commit_aborts() {
        let mut bus = LifecycleBus::new();
        bus.subscribe(Arc::new(Always("com.example.guard", LifecycleDecision::Veto { reason: "locked".into() })));
        let err = bus.emit(LifecycleEvent::BeforeCommit, &LifecycleContext::default()).unwrap_err();
        assert_eq!(err.code(), codes::PLUGIN_VETO);
    }

    #[test]
    fn veto_on_a_non_vetoable_event_is_ignored() {
        let mut bus = LifecycleBus::new();
        bus.subscribe(Arc::new(Always("com.example.guard", LifecycleDecision::Veto { reason: "whatever".into() })));
        bus.emit(LifecycleEvent::AfterCommit, &LifecycleContext::default()).unwrap();
    }

    #[test]
    fn no_subscribers_always_proceeds() {
        let bus = LifecycleBus::new();
        bus.emit(LifecycleEvent::BeforeSnapshot, &LifecycleContext::default()).unwrap();
    }
}
