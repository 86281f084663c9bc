//! Observability sink injected into the connection manager and synchronizer

use std::sync::Arc;

/// Receives log-level-tagged events from stationsync components
pub trait EventSink: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards events to `tracing` under the `stationsync` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "stationsync", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "stationsync", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "stationsync", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "stationsync", "{}", message);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Default sink used when the caller does not supply one
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}
