//! Subscription registry: (signal type, join id) -> ordered observer list.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use cip_protocol::{SignalType, SignalValue};
use tracing::error;

use crate::config::{DebugLevel, SignalCallback};

type SharedCallback = Arc<dyn Fn(SignalType, u16, &SignalValue) + Send + Sync>;

/// Append-only callback registry. Multiple subscribers per key are invoked
/// in insertion order; keys nobody subscribed to dispatch to no one (the
/// processor broadcasts every join on registration regardless of interest).
pub(crate) struct SubscriptionRegistry {
    debug: DebugLevel,
    subs: Mutex<HashMap<(SignalType, u16), Vec<SharedCallback>>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(debug: DebugLevel) -> Self {
        Self {
            debug,
            subs: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, signal: SignalType, join: u16, cb: SignalCallback) {
        let mut subs = self.subs.lock().unwrap();
        subs.entry((signal, join)).or_default().push(Arc::from(cb));
    }

    /// Invoke every subscriber for the key, in insertion order. Callbacks
    /// run outside the lock; a panicking subscriber is trapped and logged
    /// and the remaining subscribers still run.
    pub(crate) fn dispatch(&self, signal: SignalType, join: u16, value: &SignalValue) {
        let callbacks: Vec<SharedCallback> = {
            let subs = self.subs.lock().unwrap();
            match subs.get(&(signal, join)) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for cb in callbacks {
            if catch_unwind(AssertUnwindSafe(|| cb(signal, join, value))).is_err()
                && self.debug >= DebugLevel::Low
            {
                error!(%signal, join, "subscriber panicked; continuing dispatch");
            }
        }
    }
}
