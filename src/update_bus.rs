//! Debounced emission of per-directory and global change notifications
//! (spec §4.6). Grounded on design note §9's guidance to model the
//! debounce as "a background task that sleeps on a condition variable or
//! timer channel" — here, a single long-lived `tokio` task woken by
//! `tokio::sync::Notify` and re-armed on every `mark_dirty`.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::ignore_poison::{IgnorePoison, RwLockIgnorePoison};
use crate::index::IndexStore;
use std::sync::RwLock;

use crate::contracts::UpdateSubscriber;

/// Default debounce window for the update bus's drain (spec §4.6).
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

pub struct UpdateBus {
    store: Arc<IndexStore>,
    subscribers: RwLock<Vec<Arc<dyn UpdateSubscriber>>>,
    deadline: StdMutex<Option<Instant>>,
    notify: Notify,
    debounce: Duration,
}

impl UpdateBus {
    /// Spawns the background debounce task and returns the shared handle.
    /// Requires a running `tokio` runtime (the embedder's, per spec's
    /// "external collaborators" boundary — the core doesn't build one).
    pub fn new(store: Arc<IndexStore>, debounce_ms: u64) -> Arc<Self> {
        let bus = Arc::new(Self {
            store,
            subscribers: RwLock::new(Vec::new()),
            deadline: StdMutex::new(None),
            notify: Notify::new(),
            debounce: Duration::from_millis(debounce_ms),
        });
        let worker = bus.clone();
        tokio::spawn(async move { worker.debounce_loop().await });
        bus
    }

    pub fn subscribe(&self, subscriber: Arc<dyn UpdateSubscriber>) {
        self.subscribers.write_ignore_poison().push(subscriber);
    }

    /// `update(p)`: recomputes sizes (cheap, all in-memory) and adds `p`
    /// to the pending set, re-arming the trailing debounce timer.
    pub fn mark_dirty(&self, path: &str) {
        self.store.recompute_sizes();
        self.store.mark_dirty(path);
        *self.deadline.lock_ignore_poison() = Some(Instant::now() + self.debounce);
        self.notify.notify_one();
    }

    async fn debounce_loop(self: Arc<Self>) {
        loop {
            self.notify.notified().await;
            loop {
                let target = *self.deadline.lock_ignore_poison();
                let Some(target) = target else { break };
                let now = Instant::now();
                if target <= now {
                    *self.deadline.lock_ignore_poison() = None;
                    self.drain_and_emit();
                    break;
                }
                tokio::time::sleep(target - now).await;
            }
        }
    }

    /// Drains the pending set into its minimal cover and emits one
    /// `update(path)` per remaining member.
    fn drain_and_emit(&self) {
        let cover = self.store.drain_pending();
        if cover.is_empty() {
            return;
        }
        log::debug!("update bus draining {} path(s): {:?}", cover.len(), cover);
        let subs = self.subscribers.read_ignore_poison();
        for path in &cover {
            for sub in subs.iter() {
                sub.on_update(path);
            }
        }
    }

    /// Forces an immediate drain bypassing the timer, then emits
    /// `updateall`. Used by the watcher after a full rescan, whose own
    /// debounce already collapsed the triggering burst of filesystem
    /// events (spec §4.6: "the watcher-driven full rescan emits an
    /// `updateall` notification after its own drain").
    pub fn flush_and_emit_update_all(&self) {
        *self.deadline.lock_ignore_poison() = None;
        self.drain_and_emit();
        let subs = self.subscribers.read_ignore_poison();
        for sub in subs.iter() {
            sub.on_update_all();
        }
    }
}
