//! The query surface (spec §4.7): `ls`, `lsFilter`, `search`. All three
//! read the `IndexStore` under its shared-read discipline and return
//! wire-format entry maps (spec §6); no query ever touches disk.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::index::IndexStore;

pub struct QueryEngine {
    store: Arc<IndexStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// `ls(p)`: files directly in `p` plus its immediate child
    /// directories, in wire format. Empty (not an error) if `p` isn't in
    /// the index, matching the spec's "undefined result" for that case.
    pub fn ls(&self, p: &str) -> HashMap<String, String> {
        self.store.entries_of(p, None)
    }

    /// `lsFilter(p, regex)`: file names in `p` whose name matches `regex`.
    pub fn ls_filter(&self, p: &str, pattern: &str) -> Result<Vec<String>, regex::Error> {
        let re = Regex::new(pattern)?;
        let entries = self.store.entries_of(p, None);
        Ok(entries
            .into_iter()
            .filter(|(name, line)| line.starts_with("f|") && re.is_match(name))
            .map(|(name, _)| name)
            .collect())
    }

    /// `search(query, scope)`: case-insensitive substring match of
    /// `query` against every path under `scope` (scope itself excluded).
    /// Returns `None` when nothing matches, matching the spec's "nothing"
    /// result for an empty hit set.
    pub fn search(&self, query: &str, scope: &str) -> Option<HashMap<String, String>> {
        let needle = query.to_lowercase();
        let mut out = HashMap::new();
        for (path, is_dir, mtime_ms, size) in self.store.all_under(scope) {
            if !path.to_lowercase().contains(&needle) {
                continue;
            }
            let display = display_relative(&path, scope);
            let kind = if is_dir { 'd' } else { 'f' };
            out.insert(display, format!("{kind}|{}|{size}", mtime_ms / 1000));
        }
        if out.is_empty() { None } else { Some(out) }
    }
}

fn display_relative(path: &str, scope: &str) -> String {
    let prefix = if scope == "/" { "/".to_string() } else { format!("{scope}/") };
    path.strip_prefix(&prefix).unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> Arc<IndexStore> {
        let store = Arc::new(IndexStore::new());
        store.put_dir("/a", 1);
        store.put_dir("/a/b", 2);
        store.put_file("/a", "report.txt", 10, 5000);
        store.put_file("/a", "photo.png", 20, 6000);
        store.put_file("/a/b", "notes.txt", 5, 7000);
        store.recompute_sizes();
        store
    }

    #[test]
    fn ls_lists_files_and_child_dirs() {
        let engine = QueryEngine::new(seeded_store());
        let entries = engine.ls("/a");
        assert_eq!(entries.get("report.txt").unwrap(), "f|5|10");
        assert_eq!(entries.get("photo.png").unwrap(), "f|6|20");
        assert_eq!(entries.get("b").unwrap(), "d|0|5");
    }

    #[test]
    fn ls_on_missing_path_is_empty() {
        let engine = QueryEngine::new(seeded_store());
        assert!(engine.ls("/nope").is_empty());
    }

    #[test]
    fn ls_filter_matches_regex_against_file_names_only() {
        let engine = QueryEngine::new(seeded_store());
        let matches = engine.ls_filter("/a", r"\.txt$").unwrap();
        assert_eq!(matches, vec!["report.txt".to_string()]);
    }

    #[test]
    fn search_is_case_insensitive_and_excludes_scope_itself() {
        let engine = QueryEngine::new(seeded_store());
        let results = engine.search("NOTES", "/").unwrap();
        assert_eq!(results.get("a/b/notes.txt").unwrap(), "f|7|5");
        assert!(!results.contains_key("a"));
    }

    #[test]
    fn search_returns_none_when_nothing_matches() {
        let engine = QueryEngine::new(seeded_store());
        assert!(engine.search("doesnotexist", "/").is_none());
    }
}
