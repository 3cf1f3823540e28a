//! External contracts the core consumes from or exposes to its
//! collaborators (spec §4.8): the update-subscriber interface handed to
//! session views by the transport layer, and the notification channel's
//! two event names.
//!
//! The core has no transport dependency of its own — unlike the teacher,
//! which wires its watcher and write-operation progress events directly
//! to a concrete `tauri::AppHandle`, this crate's equivalent seam is a
//! plain trait so any transport (websocket session, test harness) can
//! implement it without pulling in a GUI runtime.

/// `{ onUpdate(dirPath), onUpdateAll() }` from spec §4.6/§4.8. Implementors
/// are expected to request a fresh listing for directories they currently
/// display and forward results to their own connected clients; that
/// filtering is the subscriber's concern, not the core's.
pub trait UpdateSubscriber: Send + Sync {
    /// A directory's contents changed. `dir_path` is a minimal-cover
    /// member: an ancestor standing in for everything dirty beneath it.
    fn on_update(&self, dir_path: &str);

    /// The index was rebuilt wholesale (after a watcher-driven full
    /// rescan). Subscribers showing any directory should treat their view
    /// as possibly stale.
    fn on_update_all(&self);
}
