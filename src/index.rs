//! The in-memory mirror of the root directory: `DirEntry`, `FileEntry`,
//! `Index`, `PendingUpdateSet`, and the `IndexStore` that guards them
//! under the readers-writer discipline of spec §5 (spec §3, §4.3).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::ignore_poison::RwLockIgnorePoison;
use crate::path_utils::count_occurrences;

/// One regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub size: u64,
    pub mtime_ms: i64,
}

/// One directory: its direct files, its aggregate (recursive) size, and
/// its own mtime.
#[derive(Debug, Clone, Default)]
pub struct DirEntry {
    pub files: HashMap<String, FileEntry>,
    pub size: u64,
    pub mtime_ms: i64,
}

impl DirEntry {
    fn new(mtime_ms: i64) -> Self {
        Self {
            files: HashMap::new(),
            size: 0,
            mtime_ms,
        }
    }
}

/// The process-wide mapping from virtual directory path to `DirEntry`.
/// Root `/` always exists once `Index::new` has run.
#[derive(Debug, Default)]
pub struct Index {
    dirs: HashMap<String, DirEntry>,
}

impl Index {
    fn new() -> Self {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), DirEntry::new(0));
        Self { dirs }
    }

    pub fn get(&self, p: &str) -> Option<&DirEntry> {
        self.dirs.get(p)
    }

    fn put_dir(&mut self, p: &str, mtime_ms: i64) {
        self.dirs.insert(p.to_string(), DirEntry::new(mtime_ms));
    }

    fn put_file(&mut self, dir: &str, name: &str, size: u64, mtime_ms: i64) {
        let entry = self.dirs.entry(dir.to_string()).or_insert_with(|| DirEntry::new(0));
        if let Some(old) = entry.files.insert(name.to_string(), FileEntry { size, mtime_ms }) {
            entry.size = entry.size.saturating_sub(old.size);
        }
        entry.size += size;
    }

    fn remove_dir(&mut self, p: &str) {
        let prefix = format!("{p}/");
        self.dirs.retain(|path, _| path != p && !path.starts_with(&prefix));
    }

    fn remove_file(&mut self, dir: &str, name: &str) {
        if let Some(entry) = self.dirs.get_mut(dir)
            && let Some(removed) = entry.files.remove(name)
        {
            entry.size = entry.size.saturating_sub(removed.size);
        }
    }

    /// Relocates `dirs[from]` and every descendant by string substitution
    /// of the path prefix.
    fn rekey_dir_subtree(&mut self, from: &str, to: &str) {
        let prefix = format!("{from}/");
        let mut relocated = Vec::new();
        let keys: Vec<String> = self.dirs.keys().filter(|k| *k == from || k.starts_with(&prefix)).cloned().collect();
        for key in keys {
            if let Some(entry) = self.dirs.remove(&key) {
                let new_key = if key == from {
                    to.to_string()
                } else {
                    format!("{to}{}", &key[from.len()..])
                };
                relocated.push((new_key, entry));
            }
        }
        for (key, entry) in relocated {
            self.dirs.insert(key, entry);
        }
    }

    /// `recomputeSizes`: the only authoritative size computation. Two
    /// depth-descending passes — own files first, then rollup into
    /// parents — so it tolerates arbitrary prior drift and is idempotent.
    fn recompute_sizes(&mut self) {
        let mut paths: Vec<String> = self.dirs.keys().cloned().collect();
        paths.sort_by_key(|p| std::cmp::Reverse(count_occurrences(p, "/")));

        for path in &paths {
            if let Some(entry) = self.dirs.get_mut(path) {
                entry.size = entry.files.values().map(|f| f.size).sum();
            }
        }
        for path in &paths {
            if path == "/" {
                continue;
            }
            let own_size = self.dirs.get(path).map(|e| e.size).unwrap_or(0);
            if let Some(parent) = parent_of(path)
                && let Some(parent_entry) = self.dirs.get_mut(&parent)
            {
                parent_entry.size += own_size;
            }
        }
    }

    /// Serializes entries in `dir_path` (its direct files plus immediate
    /// child directories) into the wire format of spec §6: display name →
    /// `"<kind>|<mtime-seconds>|<size>"`.
    ///
    /// When `relative_base` is given, display names are the path relative
    /// to that base instead of a bare basename (used by `search`).
    pub fn entries_of(&self, dir_path: &str, relative_base: Option<&str>) -> HashMap<String, String> {
        let mut out = HashMap::new();
        let Some(dir) = self.dirs.get(dir_path) else {
            return out;
        };
        for (name, file) in &dir.files {
            let display = display_name(dir_path, name, relative_base);
            out.insert(display, entry_line('f', file.mtime_ms, file.size));
        }
        let prefix = if dir_path == "/" { "/".to_string() } else { format!("{dir_path}/") };
        for (path, child) in &self.dirs {
            if path == dir_path {
                continue;
            }
            if let Some(rest) = path.strip_prefix(&prefix)
                && !rest.is_empty()
                && !rest.contains('/')
            {
                let display = display_name(dir_path, rest, relative_base);
                out.insert(display, entry_line('d', child.mtime_ms, child.size));
            }
        }
        out
    }

    /// All (path, is_dir, FileEntry-or-DirEntry) pairs under `scope`
    /// (exclusive of scope itself), used by `search`.
    fn all_under(&self, scope: &str) -> Vec<(String, bool, i64, u64)> {
        let prefix = if scope == "/" { "/".to_string() } else { format!("{scope}/") };
        let mut out = Vec::new();
        for (path, dir) in &self.dirs {
            if path != scope && !path.starts_with(&prefix) {
                continue;
            }
            if path != scope {
                out.push((path.clone(), true, dir.mtime_ms, dir.size));
            }
            for (name, file) in &dir.files {
                let file_path = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
                out.push((file_path, false, file.mtime_ms, file.size));
            }
        }
        out
    }
}

fn parent_of(p: &str) -> Option<String> {
    let trimmed = p.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

fn display_name(dir_path: &str, name: &str, relative_base: Option<&str>) -> String {
    match relative_base {
        None => name.to_string(),
        Some(base) => {
            let full = if dir_path == "/" { format!("/{name}") } else { format!("{dir_path}/{name}") };
            let prefix = if base == "/" { "/".to_string() } else { format!("{base}/") };
            full.strip_prefix(&prefix).unwrap_or(&full).to_string()
        }
    }
}

fn entry_line(kind: char, mtime_ms: i64, size: u64) -> String {
    format!("{kind}|{}|{size}", mtime_ms / 1000)
}

/// Virtual directory paths awaiting a debounced `update` notification.
#[derive(Debug, Default)]
pub struct PendingUpdateSet {
    pending: HashSet<String>,
}

impl PendingUpdateSet {
    fn mark(&mut self, path: String) {
        self.pending.insert(path);
    }

    /// Drains the set, returning the minimal cover (spec §4.6, §8):
    /// sort by depth ascending, drop any entry that is a strict
    /// descendant of another entry still in the set, deduplicate.
    pub fn drain_minimal_cover(&mut self) -> Vec<String> {
        let mut paths: Vec<String> = self.pending.drain().collect();
        paths.sort_by_key(|p| count_occurrences(p, "/"));

        let mut cover: Vec<String> = Vec::new();
        'outer: for path in paths {
            for kept in &cover {
                if is_strict_descendant(&path, kept) {
                    continue 'outer;
                }
            }
            cover.push(path);
        }
        cover
    }
}

fn is_strict_descendant(path: &str, ancestor: &str) -> bool {
    if path == ancestor {
        return false;
    }
    let prefix = if ancestor == "/" { "/".to_string() } else { format!("{ancestor}/") };
    path.starts_with(&prefix)
}

/// Owns the `Index` and `PendingUpdateSet` behind a readers-writer lock,
/// per spec §5: mutation patches and rescan batches take the write lock
/// only for the in-memory step; queries take the read lock.
pub struct IndexStore {
    index: RwLock<Index>,
    pending: RwLock<PendingUpdateSet>,
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::new()),
            pending: RwLock::new(PendingUpdateSet::default()),
        }
    }

    pub fn get(&self, p: &str) -> Option<DirEntry> {
        self.index.read_ignore_poison().get(p).cloned()
    }

    pub fn put_dir(&self, p: &str, mtime_ms: i64) {
        self.index.write_ignore_poison().put_dir(p, mtime_ms);
    }

    pub fn put_file(&self, dir: &str, name: &str, size: u64, mtime_ms: i64) {
        self.index.write_ignore_poison().put_file(dir, name, size, mtime_ms);
    }

    pub fn remove_dir(&self, p: &str) {
        self.index.write_ignore_poison().remove_dir(p);
    }

    pub fn remove_file(&self, dir: &str, name: &str) {
        self.index.write_ignore_poison().remove_file(dir, name);
    }

    pub fn rekey_dir_subtree(&self, from: &str, to: &str) {
        self.index.write_ignore_poison().rekey_dir_subtree(from, to);
    }

    pub fn recompute_sizes(&self) {
        self.index.write_ignore_poison().recompute_sizes();
    }

    pub fn entries_of(&self, dir_path: &str, relative_base: Option<&str>) -> HashMap<String, String> {
        self.index.read_ignore_poison().entries_of(dir_path, relative_base)
    }

    pub fn all_under(&self, scope: &str) -> Vec<(String, bool, i64, u64)> {
        self.index.read_ignore_poison().all_under(scope)
    }

    pub fn contains_dir(&self, p: &str) -> bool {
        self.index.read_ignore_poison().get(p).is_some()
    }

    /// Replaces the entire index wholesale (used by the watcher's full
    /// rescan) and returns the set of top-level paths that changed, for
    /// the caller to mark dirty.
    pub fn replace_all(&self, new_dirs: HashMap<String, DirEntry>) -> Vec<String> {
        let mut index = self.index.write_ignore_poison();
        let old_keys: HashSet<String> = index.dirs.keys().cloned().collect();
        let new_keys: HashSet<String> = new_dirs.keys().cloned().collect();
        let changed: Vec<String> = old_keys.symmetric_difference(&new_keys).cloned().collect();
        index.dirs = new_dirs;
        index.recompute_sizes();
        changed
    }

    pub fn mark_dirty(&self, p: &str) {
        self.pending.write_ignore_poison().mark(p.to_string());
    }

    pub fn drain_pending(&self) -> Vec<String> {
        self.pending.write_ignore_poison().drain_minimal_cover()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_exists_after_init() {
        let store = IndexStore::new();
        assert!(store.get("/").is_some());
    }

    #[test]
    fn put_file_rolls_up_local_size() {
        let store = IndexStore::new();
        store.put_file("/", "a.txt", 10, 1000);
        assert_eq!(store.get("/").unwrap().size, 10);
    }

    #[test]
    fn recompute_sizes_aggregates_subdirectories() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_dir("/a/b", 2);
        store.put_file("/a", "f1", 10, 100);
        store.put_file("/a/b", "f2", 20, 200);
        store.put_file("/c", "f3", 5, 300);
        store.put_dir("/c", 3);
        store.recompute_sizes();

        assert_eq!(store.get("/a/b").unwrap().size, 20);
        assert_eq!(store.get("/a").unwrap().size, 30);
        assert_eq!(store.get("/c").unwrap().size, 5);
        assert_eq!(store.get("/").unwrap().size, 35);
    }

    #[test]
    fn recompute_sizes_is_idempotent() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_file("/a", "f1", 10, 100);
        store.recompute_sizes();
        let first = store.get("/a").unwrap().size;
        store.recompute_sizes();
        let second = store.get("/a").unwrap().size;
        assert_eq!(first, second);
    }

    #[test]
    fn remove_dir_removes_descendants() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_dir("/a/b", 2);
        store.put_file("/a/b", "f", 1, 1);
        store.remove_dir("/a");
        assert!(store.get("/a").is_none());
        assert!(store.get("/a/b").is_none());
    }

    #[test]
    fn rekey_subtree_relocates_descendants() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_dir("/a/b", 2);
        store.put_file("/a/b", "f", 1, 1);
        store.rekey_dir_subtree("/a", "/c");
        assert!(store.get("/a").is_none());
        assert!(store.get("/c").is_some());
        assert!(store.get("/c/b").is_some());
        assert_eq!(store.get("/c/b").unwrap().files.get("f").unwrap().size, 1);
    }

    #[test]
    fn entries_of_lists_files_and_child_dirs() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_dir("/a/b", 2);
        store.put_file("/a", "f1", 10, 5000);
        store.recompute_sizes();

        let entries = store.entries_of("/a", None);
        assert_eq!(entries.get("f1").unwrap(), "f|5|10");
        assert_eq!(entries.get("b").unwrap(), "d|0|0");
    }

    #[test]
    fn entries_of_with_relative_base_strips_prefix() {
        let store = IndexStore::new();
        store.put_dir("/a", 1);
        store.put_file("/a", "f1", 10, 5000);
        let entries = store.entries_of("/a", Some("/"));
        assert_eq!(entries.get("a/f1").unwrap(), "f|5|10");
    }

    #[test]
    fn minimal_cover_drops_descendants_of_kept_ancestor() {
        let store = IndexStore::new();
        store.mark_dirty("/a");
        store.mark_dirty("/a/b");
        store.mark_dirty("/a/b/c");
        let cover = store.drain_pending();
        assert_eq!(cover, vec!["/a".to_string()]);
    }

    #[test]
    fn minimal_cover_keeps_unrelated_paths() {
        let store = IndexStore::new();
        store.mark_dirty("/a/b");
        store.mark_dirty("/c");
        let mut cover = store.drain_pending();
        cover.sort();
        assert_eq!(cover, vec!["/a/b".to_string(), "/c".to_string()]);
    }

    #[test]
    fn drain_is_empty_after_drain() {
        let store = IndexStore::new();
        store.mark_dirty("/a");
        let _ = store.drain_pending();
        assert!(store.drain_pending().is_empty());
    }
}
