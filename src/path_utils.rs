//! Virtual↔real path mapping, containment, filename sanity, natural sort,
//! occurrence counting (spec §4.1).

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Characters disallowed in any single path segment by `isPathSane`.
const DISALLOWED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_WINDOWS_NAMES: &[&str] = &["con", "prn", "aux", "nul"];

fn is_reserved_windows_device_name(segment_lower: &str) -> bool {
    if RESERVED_WINDOWS_NAMES.contains(&segment_lower) {
        return true;
    }
    for prefix in ["com", "lpt"] {
        if let Some(rest) = segment_lower.strip_prefix(prefix)
            && rest.len() == 1
            && rest.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            return true;
        }
    }
    false
}

/// Maps the virtual filesystem rooted at `/` onto a real directory on disk.
///
/// Containment is enforced on every `to_real` call: a resolved path that
/// would escape `root` (via `..` or a symlink pointing outside the tree)
/// is clamped back to `root` itself rather than erroring, per spec §4.1.
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
}

impl PathMapper {
    /// `root` should already be an absolute, canonical directory; the
    /// embedder is responsible for creating it before use.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `addFilesPath`: virtual → real.
    pub fn to_real(&self, virtual_path: &str) -> PathBuf {
        let normalized = normalize_virtual(virtual_path);
        if normalized == "/" {
            return self.root.clone();
        }

        let mut joined = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            match segment {
                ".." => {
                    joined.pop();
                }
                "." => {}
                other => joined.push(other),
            }
        }

        match resolve_existing_prefix(&joined) {
            Some(resolved) if resolved.starts_with(&self.root) => resolved,
            _ => self.root.clone(),
        }
    }

    /// `removeFilesPath`: real → virtual.
    pub fn to_virtual(&self, real: &Path) -> String {
        if real == self.root {
            return "/".to_string();
        }
        match real.strip_prefix(&self.root) {
            Ok(rel) if !rel.as_os_str().is_empty() => {
                let mut out = String::from("/");
                out.push_str(&rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
                out
            }
            _ => "/".to_string(),
        }
    }
}

/// NFC-normalizes a virtual path and ensures it starts with `/`. Exposed so
/// callers that build index keys directly (the mutation engine, the
/// watcher's rescan) can normalize once and reuse the same string for both
/// the real-path join and the index key, per spec §3 invariant 4.
pub fn normalize_virtual(p: &str) -> String {
    let nfc: String = p.nfc().collect();
    if nfc.starts_with('/') { nfc } else { format!("/{nfc}") }
}

/// Walks up from `path` until an ancestor exists on disk, canonicalizes
/// that ancestor (resolving symlinks along the way), then re-appends the
/// not-yet-existing tail. Returns `None` only if canonicalizing the
/// deepest existing ancestor itself fails (e.g. permission denied).
fn resolve_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut tail: Vec<Component> = Vec::new();
    let mut ancestor = path;
    loop {
        if ancestor.exists() {
            let canon = ancestor.canonicalize().ok()?;
            let mut result = canon;
            for component in tail.into_iter().rev() {
                result.push(component.as_os_str());
            }
            return Some(result);
        }
        match (ancestor.parent(), ancestor.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(Component::Normal(name));
                ancestor = parent;
            }
            _ => return ancestor.canonicalize().ok().or_else(|| Some(ancestor.to_path_buf())),
        }
    }
}

/// `isPathSane`: validates a path segment-by-segment.
pub fn is_path_sane(p: &str, is_url: bool) -> bool {
    if is_url && p.contains("..") {
        return false;
    }

    let segments: Vec<&str> = p.split('/').filter(|s| !s.is_empty()).collect();
    for segment in &segments {
        if !is_segment_sane(segment) {
            return false;
        }
    }

    if is_url {
        return p.chars().all(is_url_safe_char);
    }

    true
}

fn is_segment_sane(segment: &str) -> bool {
    if segment.is_empty() || segment.len() > 255 {
        return false;
    }
    if segment == "." || segment == ".." {
        return false;
    }
    for ch in segment.chars() {
        if DISALLOWED_CHARS.contains(&ch) || ('\u{0000}'..='\u{001F}').contains(&ch) {
            return false;
        }
    }
    if is_reserved_windows_device_name(&segment.to_ascii_lowercase()) {
        return false;
    }
    true
}

/// RFC 3986 unreserved + a path-sensible subset of reserved characters.
fn is_url_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '-' | '.'
                | '_'
                | '~'
                | '/'
                | ':'
                | '@'
                | '!'
                | '$'
                | '&'
                | '\''
                | '('
                | ')'
                | '*'
                | '+'
                | ','
                | ';'
                | '='
                | '%'
        )
}

/// `naturalSort`: splits runs of digits from runs of non-digits and
/// compares digit runs numerically ("img_2" before "img_10"). Delegates to
/// `alphanumeric-sort`, the same crate the teacher uses for directory
/// listing order.
pub fn natural_sort(a: &str, b: &str) -> std::cmp::Ordering {
    alphanumeric_sort::compare_str(a, b)
}

/// `countOccurences`: non-overlapping substring count, used for depth
/// calculations.
pub fn count_occurrences(s: &str, sub: &str) -> usize {
    if sub.is_empty() {
        return 0;
    }
    s.matches(sub).count()
}
