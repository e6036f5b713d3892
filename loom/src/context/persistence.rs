//! Persistence-hook registry (§4.A `register_persistence_hook`).
//!
//! A hook fires once per unique [`Message`] hash key per context — dedup is
//! a `dashmap::DashSet` keyed by `hash_key` rather than a `Mutex<HashSet>`,
//! matching the teacher's reach for `dashmap` wherever a concurrent set is
//! touched from multiple task-spawned producers at once.

use std::sync::{Arc, Mutex};

use dashmap::DashSet;

use crate::message::Message;

/// A callback invoked once per message as it becomes visible to any agent.
pub type PersistenceHook = Arc<dyn Fn(&Message) + Send + Sync>;

pub(crate) struct PersistenceRegistry {
    hooks: Mutex<Vec<PersistenceHook>>,
    seen: DashSet<String>,
}

impl PersistenceRegistry {
    pub(crate) fn new() -> Self {
        PersistenceRegistry {
            hooks: Mutex::new(Vec::new()),
            seen: DashSet::new(),
        }
    }

    pub(crate) fn register(&self, hook: PersistenceHook) {
        self.hooks.lock().expect("persistence hooks poisoned").push(hook);
    }

    /// Runs every registered hook against `message`, unless its `hash_key`
    /// has already been seen in this context.
    pub(crate) fn notify(&self, message: &Message) {
        if !self.seen.insert(message.hash_key().to_string()) {
            return;
        }
        let hooks = self.hooks.lock().expect("persistence hooks poisoned").clone();
        for hook in hooks {
            hook(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hook_fires_once_per_unique_message() {
        let registry = PersistenceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        registry.register(Arc::new(move |_m: &Message| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let m = Message::text("hello");
        registry.notify(&m);
        registry.notify(&m);
        let same_content = Message::text("hello");
        registry.notify(&same_content);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_messages_each_trigger_hooks() {
        let registry = PersistenceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        registry.register(Arc::new(move |_m: &Message| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        registry.notify(&Message::text("a"));
        registry.notify(&Message::text("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
