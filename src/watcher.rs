//! OS-level filesystem watcher: debounced change detection, the lookAway()
//! suppression window, and the watcher-driven full rescan (spec §4.4).
//!
//! Grounded on the teacher's `file_system/watcher.rs`, which wires
//! `notify-debouncer-full` to a per-directory diff computed against a
//! cache. This crate's watcher instead rescans the whole tree into the
//! `IndexStore` on every debounced burst — there's no per-listing cache to
//! diff against, since the index itself is the cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify_debouncer_full::{
    DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
    notify::{RecommendedWatcher, RecursiveMode},
};
use unicode_normalization::UnicodeNormalization;

use crate::config::Config;
use crate::error::CoreError;
use crate::fs_adapter;
use crate::ignore_poison::IgnorePoison;
use crate::index::{DirEntry, FileEntry, IndexStore};
use crate::update_bus::UpdateBus;

/// How long `look_away` suppresses watcher-driven rescans after a
/// mutation engine write, per spec §4.4/§4.5. Comfortably longer than the
/// debounce window below so the watcher's own debounce has already
/// collapsed and would otherwise have drained the triggering burst by the
/// time suppression lifts.
const SUPPRESS_MS: u64 = 3000;

const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Watches the whole real root and keeps the `IndexStore` in sync via
/// full rescans, per spec §4.4. Holds the debouncer (or poll task) alive;
/// dropping the `TreeWatcher` stops watching.
pub struct TreeWatcher {
    root: PathBuf,
    store: Arc<IndexStore>,
    bus: Arc<UpdateBus>,
    suppress_until: Mutex<Option<Instant>>,
    ignore: globset::GlobSet,
    #[allow(dead_code, reason = "debouncer must be held to keep watching")]
    debouncer: Mutex<Option<Debouncer<RecommendedWatcher, RecommendedCache>>>,
    poll_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TreeWatcher {
    /// Builds the watcher and performs the initial synchronous rescan
    /// that seeds the index before any caller could observe it empty.
    /// Does not yet watch the filesystem; call `start` for that.
    pub fn new(root: PathBuf, store: Arc<IndexStore>, bus: Arc<UpdateBus>, config: &Config) -> Arc<Self> {
        let watcher = Arc::new(Self {
            root,
            store,
            bus,
            suppress_until: Mutex::new(None),
            ignore: config.build_ignore_set(),
            debouncer: Mutex::new(None),
            poll_task: Mutex::new(None),
        });
        watcher.rescan(false);
        watcher
    }

    /// Starts watching. Kept separate from `new` so the unconditional
    /// initial rescan above always wins the race against the first
    /// filesystem event.
    ///
    /// `polling_interval_ms` is `Config::polling_interval` (spec §6): when
    /// set, the watcher polls the whole tree on that interval instead of
    /// subscribing to kernel events at all.
    pub fn start(self: &Arc<Self>, polling_interval_ms: Option<u64>) -> Result<(), CoreError> {
        match polling_interval_ms {
            Some(interval_ms) => {
                self.start_polling(interval_ms);
                Ok(())
            }
            None => self.start_kernel_watch(),
        }
    }

    fn start_kernel_watch(self: &Arc<Self>) -> Result<(), CoreError> {
        let debounce = Duration::from_millis(DEFAULT_DEBOUNCE_MS);
        let worker = self.clone();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            if worker.is_suppressed() {
                log::debug!("debounce fired but suppressed by look_away window, skipping rescan");
                return;
            }
            match result {
                Ok(events) if events.is_empty() => {}
                Ok(events) => {
                    log::debug!("debounce fired with {} event(s), triggering rescan", events.len());
                    worker.rescan(true);
                }
                Err(errors) => {
                    log::warn!("watcher reported {} error(s), triggering rescan anyway", errors.len());
                    worker.rescan(true);
                }
            }
        })
        .map_err(|e| CoreError::IOError { path: path_str(&self.root), message: e.to_string() })?;

        debouncer
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| CoreError::IOError { path: path_str(&self.root), message: e.to_string() })?;

        *self.debouncer.lock_ignore_poison() = Some(debouncer);
        Ok(())
    }

    fn start_polling(self: &Arc<Self>, interval_ms: u64) {
        log::debug!("watching {} by polling every {interval_ms}ms (pollingInterval configured)", self.root.display());
        let worker = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.tick().await; // first tick fires immediately; `new` already seeded the index
            loop {
                ticker.tick().await;
                if worker.is_suppressed() {
                    log::debug!("poll tick suppressed by look_away window, skipping rescan");
                    continue;
                }
                log::debug!("poll tick, triggering rescan");
                worker.rescan(true);
            }
        });
        *self.poll_task.lock_ignore_poison() = Some(handle);
    }

    /// Arms the suppression window so the next burst of watcher events —
    /// the ones the mutation engine's own writes are about to generate —
    /// is ignored instead of triggering a redundant rescan.
    pub fn look_away(&self) {
        log::debug!("look_away armed for {SUPPRESS_MS}ms");
        *self.suppress_until.lock_ignore_poison() = Some(Instant::now() + Duration::from_millis(SUPPRESS_MS));
    }

    fn is_suppressed(&self) -> bool {
        match *self.suppress_until.lock_ignore_poison() {
            Some(deadline) => Instant::now() < deadline,
            None => false,
        }
    }

    /// Walks the real tree, replaces the index wholesale, and — unless
    /// this is the pre-watch seeding rescan — marks every changed
    /// top-level path dirty and emits `updateall` once the bus has
    /// drained them.
    fn rescan(&self, notify: bool) {
        log::debug!("rescan starting (notify={notify})");
        let new_dirs = scan_root(&self.root, &self.ignore);
        let dir_count = new_dirs.len();
        let changed = self.store.replace_all(new_dirs);
        if !notify {
            log::debug!("rescan finished, {dir_count} directories seeded");
            return;
        }
        log::debug!("rescan finished, {dir_count} directories, {} path(s) changed", changed.len());
        for path in &changed {
            self.store.mark_dirty(path);
        }
        self.bus.flush_and_emit_update_all();
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_task.lock_ignore_poison().take() {
            handle.abort();
        }
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// NFC-normalizes one filesystem entry's name for use as an index key,
/// per spec §3 invariant 4. The real on-disk path keeps the raw bytes —
/// only the virtual/index side is normalized.
fn normalize_component(name: &str) -> String {
    name.nfc().collect()
}

fn scan_root(root: &Path, ignore: &globset::GlobSet) -> HashMap<String, DirEntry> {
    let mut dirs = HashMap::new();
    let root_mtime = fs_adapter::stat(root).map(|s| s.mtime_ms).unwrap_or(0);
    dirs.insert(
        "/".to_string(),
        DirEntry {
            files: HashMap::new(),
            size: 0,
            mtime_ms: root_mtime,
        },
    );
    walk_dir(root, "/", ignore, &mut dirs);
    dirs
}

fn walk_dir(dir_real: &Path, dir_virtual: &str, ignore: &globset::GlobSet, dirs: &mut HashMap<String, DirEntry>) {
    let entries = match fs_adapter::list(dir_real) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("failed to list {}: {err}", dir_real.display());
            return;
        }
    };
    for entry in entries {
        let name = normalize_component(&entry.name);
        let child_virtual = if dir_virtual == "/" { format!("/{name}") } else { format!("{dir_virtual}/{name}") };
        if ignore.is_match(child_virtual.trim_start_matches('/')) {
            continue;
        }
        if entry.is_dir {
            dirs.insert(
                child_virtual.clone(),
                DirEntry {
                    files: HashMap::new(),
                    size: 0,
                    mtime_ms: entry.mtime_ms,
                },
            );
            // The real child path uses the raw, un-normalized entry name —
            // only the index key above is NFC-folded.
            walk_dir(&dir_real.join(&entry.name), &child_virtual, ignore, dirs);
        } else {
            let parent = dirs.entry(dir_virtual.to_string()).or_insert_with(|| DirEntry {
                files: HashMap::new(),
                size: 0,
                mtime_ms: 0,
            });
            parent.files.insert(name, FileEntry { size: entry.size, mtime_ms: entry.mtime_ms });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn empty_ignore() -> globset::GlobSet {
        globset::GlobSetBuilder::new().build().unwrap()
    }

    #[test]
    fn scan_root_walks_nested_tree() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"12345").unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"12").unwrap();

        let dirs = scan_root(dir.path(), &empty_ignore());

        assert!(dirs.contains_key("/"));
        assert!(dirs.contains_key("/sub"));
        assert_eq!(dirs["/"].files["a.txt"].size, 5);
        assert_eq!(dirs["/sub"].files["b.txt"].size, 2);
    }

    #[test]
    fn scan_root_skips_ignored_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/pkg.js"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"y").unwrap();

        let mut builder = globset::GlobSetBuilder::new();
        builder.add(globset::Glob::new("node_modules").unwrap());
        let ignore = builder.build().unwrap();

        let dirs = scan_root(dir.path(), &ignore);

        assert!(!dirs.contains_key("/node_modules"));
        assert!(dirs["/"].files.contains_key("keep.txt"));
    }

    #[test]
    fn scan_root_normalizes_decomposed_unicode_names() {
        let dir = tempdir().unwrap();
        // "e" + combining acute accent, as some filesystems/editors write it.
        let raw_name = "e\u{0301}cole.txt";
        fs::write(dir.path().join(raw_name), b"x").unwrap();

        let dirs = scan_root(dir.path(), &empty_ignore());

        assert!(dirs["/"].files.contains_key("\u{e9}cole.txt"));
        assert!(!dirs["/"].files.contains_key(raw_name));
    }

    #[test]
    fn look_away_suppresses_until_deadline() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::new());
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let bus = rt.block_on(async { UpdateBus::new(store.clone(), 50) });
        let watcher = TreeWatcher::new(dir.path().to_path_buf(), store, bus, &Config::default());

        assert!(!watcher.is_suppressed());
        watcher.look_away();
        assert!(watcher.is_suppressed());
    }

    #[tokio::test]
    async fn rescan_marks_changed_paths_and_emits_update_all() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::new());
        let bus = UpdateBus::new(store.clone(), 10);
        let watcher = TreeWatcher::new(dir.path().to_path_buf(), store.clone(), bus, &Config::default());

        fs::write(dir.path().join("new.txt"), b"hello").unwrap();
        watcher.rescan(true);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("/").unwrap().files.contains_key("new.txt"));
    }

    #[tokio::test]
    async fn polling_backend_picks_up_external_changes() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::new());
        let bus = UpdateBus::new(store.clone(), 10);
        let watcher = TreeWatcher::new(dir.path().to_path_buf(), store.clone(), bus, &Config::default());
        watcher.start(Some(20)).unwrap();

        fs::write(dir.path().join("polled.txt"), b"hi").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.get("/").unwrap().files.contains_key("polled.txt"));
    }
}
