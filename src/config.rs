//! Configuration recognized by the core (spec §6).

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Options the core reads at startup. Everything else (auth, transport
/// framing, bundling) lives outside the core and isn't represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// If set, the watcher polls at this interval (ms) instead of using
    /// kernel events; the same interval applies to binary and regular
    /// files alike.
    #[serde(default)]
    pub polling_interval: Option<u64>,
    /// Glob patterns; any path that matches is skipped by the traversal
    /// and therefore never appears in the index.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Rejects mutations before they touch disk (§7 `ReadOnly`).
    #[serde(default)]
    pub read_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polling_interval: None,
            ignore_patterns: Vec::new(),
            read_only: false,
        }
    }
}

impl Config {
    /// Compiles `ignore_patterns` into a matcher usable against virtual
    /// paths. Invalid glob syntax is dropped with a warning rather than
    /// failing startup — one bad pattern shouldn't take the index down.
    pub fn build_ignore_set(&self) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => log::warn!("ignoring malformed ignore pattern {pattern:?}: {err}"),
            }
        }
        builder.build().unwrap_or_else(|err| {
            log::warn!("failed to compile ignore patterns, ignoring all of them: {err}");
            GlobSetBuilder::new().build().expect("empty glob set always builds")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_ignore_patterns() {
        let cfg = Config::default();
        let set = cfg.build_ignore_set();
        assert!(!set.is_match("anything"));
    }

    #[test]
    fn matches_configured_glob() {
        let cfg = Config {
            ignore_patterns: vec!["**/.git".to_string(), "**/node_modules/**".to_string()],
            ..Config::default()
        };
        let set = cfg.build_ignore_set();
        assert!(set.is_match("a/b/.git"));
        assert!(set.is_match("a/node_modules/x/y.js"));
        assert!(!set.is_match("a/b/c.txt"));
    }

    #[test]
    fn malformed_pattern_is_dropped_not_fatal() {
        let cfg = Config {
            ignore_patterns: vec!["[".to_string()],
            ..Config::default()
        };
        let set = cfg.build_ignore_set();
        assert!(!set.is_match("["));
    }

    #[test]
    fn deserializes_camel_case() {
        let json = r#"{"pollingInterval": 500, "ignorePatterns": ["*.tmp"]}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.polling_interval, Some(500));
        assert_eq!(cfg.ignore_patterns, vec!["*.tmp".to_string()]);
        assert!(!cfg.read_only);
    }
}
