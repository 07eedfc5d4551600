//! The event bus (spec.md §4.J "Event Publisher").
//!
//! The store fires these on every mutation; the blocking manager and the
//! transaction manager are the two subscribers spec.md names. Grounded on
//! the teacher's `redis/signal.rs`, which plays an analogous role
//! (one-directional notifications fanned out to interested subsystems), but
//! expressed as a trait object instead of process signals since there is no
//! external process to signal here.

use std::sync::Arc;

/// Implemented by anything that wants to hear about store mutations.
/// `Db` holds a `Arc<dyn EventSink>` and calls these synchronously from
/// inside the shard lock that performed the mutation, so subscribers must
/// not call back into the same `Db` instance from within these methods.
pub trait EventSink: Send + Sync {
    /// A key gained a value it did not have a moment ago, or a container
    /// key had new elements appended (list push, zset add, stream append).
    fn data_added(&self, key: &[u8]);

    /// A key was deleted, expired, or had elements removed down to empty.
    fn data_removed(&self, key: &[u8]);
}

/// Fans one store's events out to every registered subscriber.
#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { sinks: Vec::new() }
    }

    pub fn register(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for EventBus {
    fn data_added(&self, key: &[u8]) {
        for sink in &self.sinks {
            sink.data_added(key);
        }
    }

    fn data_removed(&self, key: &[u8]) {
        for sink in &self.sinks {
            sink.data_removed(key);
        }
    }
}

/// A sink that does nothing, for tests that exercise the store without a
/// blocking manager or transaction manager wired in.
pub struct NullSink;

impl EventSink for NullSink {
    fn data_added(&self, _key: &[u8]) {}
    fn data_removed(&self, _key: &[u8]) {}
}
