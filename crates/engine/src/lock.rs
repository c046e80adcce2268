//! Named mutual-exclusion leases.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Per-key lock slot. `count` supports re-entry by the holding thread, so a
/// command body re-acquiring its own key cannot deadlock against itself.
#[derive(Debug, Default)]
struct Slot {
    holder: Option<ThreadId>,
    count: u32,
}

#[derive(Debug, Default)]
struct SlotState {
    slot: Mutex<Slot>,
    available: Condvar,
}

/// Named lock provider: distinct keys never contend; the same key is held by
/// at most one thread at a time.
#[derive(Debug, Default)]
pub struct LockProvider {
    slots: Mutex<HashMap<String, Arc<SlotState>>>,
}

impl LockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free (or already held by this thread), then
    /// return a lease over it.
    pub fn lock(&self, key: &str) -> LockGuard {
        let state = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key.to_string()).or_default().clone()
        };

        let me = thread::current().id();
        {
            let mut slot = state.slot.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                match slot.holder {
                    None => {
                        slot.holder = Some(me);
                        slot.count = 1;
                        break;
                    }
                    Some(holder) if holder == me => {
                        slot.count += 1;
                        break;
                    }
                    Some(_) => {
                        slot = state.available.wait(slot).unwrap_or_else(|e| e.into_inner());
                    }
                }
            }
        }

        LockGuard {
            key: key.to_string(),
            state,
            released: false,
        }
    }

    /// Whether `key` is currently held (diagnostics/tests).
    pub fn is_locked(&self, key: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(key)
            .map(|state| {
                state
                    .slot
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .holder
                    .is_some()
            })
            .unwrap_or(false)
    }
}

/// A released-on-drop lease over a named resource.
///
/// Dropping the guard releases the lease, so failure paths never leak a
/// held key.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    state: Arc<SlotState>,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lease explicitly.
    pub fn unlock(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut slot = self.state.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.count = slot.count.saturating_sub(1);
        if slot.count == 0 {
            slot.holder = None;
            self.state.available.notify_one();
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn distinct_keys_never_contend() {
        let provider = LockProvider::new();
        let a = provider.lock("aggregate-a");
        let b = provider.lock("aggregate-b");
        assert!(provider.is_locked("aggregate-a"));
        assert!(provider.is_locked("aggregate-b"));
        drop(a);
        drop(b);
    }

    #[test]
    fn reentrant_acquisition_does_not_self_deadlock() {
        let provider = LockProvider::new();
        let outer = provider.lock("aggregate-a");
        let inner = provider.lock("aggregate-a");
        drop(inner);
        assert!(provider.is_locked("aggregate-a"));
        drop(outer);
        assert!(!provider.is_locked("aggregate-a"));
    }

    #[test]
    fn same_key_serializes_critical_sections() {
        let provider = Arc::new(LockProvider::new());
        let concurrent = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    let _guard = provider.lock("shared");
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_guard_wakes_a_waiter() {
        let provider = Arc::new(LockProvider::new());
        let guard = provider.lock("shared");

        let waiter = {
            let provider = provider.clone();
            thread::spawn(move || {
                let _guard = provider.lock("shared");
            })
        };

        thread::sleep(Duration::from_millis(5));
        drop(guard);
        waiter.join().unwrap();
    }
}
