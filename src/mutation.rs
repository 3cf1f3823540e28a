//! The mutation engine (spec §4.5): thin compositions of `lookAway` →
//! disk operation → index patch → mark dirty. Grounded on the teacher's
//! `write_operations/mod.rs`, whose public functions are `async fn`s that
//! wrap a `tokio::task::spawn_blocking` call around the synchronous disk
//! step; this crate keeps that shape but drops the progress-event
//! machinery the teacher needs for large streamed transfers, since the
//! spec's operations are whole-file, not chunked.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::fs_adapter::{self, now_ms};
use crate::index::IndexStore;
use crate::path_utils::{PathMapper, is_path_sane, normalize_virtual};
use crate::update_bus::UpdateBus;
use crate::watcher::TreeWatcher;

/// `cut` or `copy`, the two clipboard dispatch kinds of spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    Cut,
    Copy,
}

/// Composes the path mapper, index store, update bus, watcher, and
/// read-only flag into the mutation engine's entry points. One instance
/// is shared process-wide, per spec §5's "process-wide singletons".
pub struct MutationEngine {
    mapper: PathMapper,
    store: Arc<IndexStore>,
    bus: Arc<UpdateBus>,
    watcher: Arc<TreeWatcher>,
    read_only: bool,
}

impl MutationEngine {
    pub fn new(mapper: PathMapper, store: Arc<IndexStore>, bus: Arc<UpdateBus>, watcher: Arc<TreeWatcher>, config: &Config) -> Self {
        Self {
            mapper,
            store,
            bus,
            watcher,
            read_only: config.read_only,
        }
    }

    fn guard_writable(&self) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::ReadOnly);
        }
        Ok(())
    }

    fn guard_sane(&self, virtual_path: &str) -> CoreResult<()> {
        if !is_path_sane(virtual_path, false) {
            return Err(CoreError::Invalid { reason: format!("unsafe path: {virtual_path}") });
        }
        Ok(())
    }

    fn dir_and_name(virtual_path: &str) -> (String, String) {
        let trimmed = virtual_path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => ("/".to_string(), trimmed[1..].to_string()),
            Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
            None => ("/".to_string(), trimmed.to_string()),
        }
    }

    fn mark(&self, path: &str) {
        self.bus.mark_dirty(path);
    }

    /// `mk(path)`: creates an empty file if it doesn't already exist.
    pub async fn mk(&self, virtual_path: &str) -> CoreResult<()> {
        let result = self.mk_inner(virtual_path).await;
        match &result {
            Ok(()) => log::info!("mk {virtual_path} ok"),
            Err(e) => log::warn!("mk {virtual_path} failed: {e}"),
        }
        result
    }

    async fn mk_inner(&self, virtual_path: &str) -> CoreResult<()> {
        self.guard_writable()?;
        self.guard_sane(virtual_path)?;
        let virtual_path = normalize_virtual(virtual_path);
        let real = self.mapper.to_real(&virtual_path);
        self.watcher.look_away();

        let created_now = now_ms();
        let existed = tokio::task::spawn_blocking(move || -> CoreResult<bool> {
            match fs_adapter::stat(&real) {
                Ok(_) => Ok(true),
                Err(CoreError::NotFound { .. }) => {
                    fs_adapter::write_file(&real, &[])?;
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;

        if !existed {
            let (dir, name) = Self::dir_and_name(&virtual_path);
            self.store.put_file(&dir, &name, 0, created_now);
            self.store.recompute_sizes();
            self.mark(&dir);
        }
        Ok(())
    }

    /// `mkdir(path)`: recursive directory create.
    pub async fn mkdir(&self, virtual_path: &str) -> CoreResult<()> {
        let result = self.mkdir_inner(virtual_path).await;
        match &result {
            Ok(()) => log::info!("mkdir {virtual_path} ok"),
            Err(e) => log::warn!("mkdir {virtual_path} failed: {e}"),
        }
        result
    }

    async fn mkdir_inner(&self, virtual_path: &str) -> CoreResult<()> {
        self.guard_writable()?;
        self.guard_sane(virtual_path)?;
        let virtual_path = normalize_virtual(virtual_path);
        let real = self.mapper.to_real(&virtual_path);
        self.watcher.look_away();

        let stamp = now_ms();
        tokio::task::spawn_blocking(move || fs_adapter::mkdir(&real, true))
            .await
            .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;

        self.store.put_dir(&virtual_path, stamp);
        self.store.recompute_sizes();
        let (parent, _) = Self::dir_and_name(&virtual_path);
        self.mark(&parent);
        Ok(())
    }

    /// `del(path)`: stat, then unlink or recursive rmdir depending on kind.
    pub async fn del(&self, virtual_path: &str) -> CoreResult<()> {
        let result = self.del_inner(virtual_path).await;
        match &result {
            Ok(()) => log::info!("del {virtual_path} ok"),
            Err(e) => log::warn!("del {virtual_path} failed: {e}"),
        }
        result
    }

    async fn del_inner(&self, virtual_path: &str) -> CoreResult<()> {
        self.guard_writable()?;
        self.guard_sane(virtual_path)?;
        let virtual_path = normalize_virtual(virtual_path);
        let real = self.mapper.to_real(&virtual_path);
        self.watcher.look_away();

        let real_for_stat = real.clone();
        let is_dir = tokio::task::spawn_blocking(move || fs_adapter::stat(&real_for_stat).map(|s| s.is_dir))
            .await
            .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;

        if is_dir {
            let real_for_del = real.clone();
            tokio::task::spawn_blocking(move || fs_adapter::rmdir(&real_for_del, true))
                .await
                .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;
            self.store.remove_dir(&virtual_path);
        } else {
            tokio::task::spawn_blocking(move || fs_adapter::rm(&real))
                .await
                .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;
            let (dir, name) = Self::dir_and_name(&virtual_path);
            self.store.remove_file(&dir, &name);
        }
        self.store.recompute_sizes();
        let (parent, _) = Self::dir_and_name(&virtual_path);
        self.mark(&parent);
        Ok(())
    }

    /// `save(path, bytes)`: overwrite-write.
    pub async fn save(&self, virtual_path: &str, bytes: Vec<u8>) -> CoreResult<()> {
        let result = self.save_inner(virtual_path, bytes).await;
        match &result {
            Ok(()) => log::info!("save {virtual_path} ok"),
            Err(e) => log::warn!("save {virtual_path} failed: {e}"),
        }
        result
    }

    async fn save_inner(&self, virtual_path: &str, bytes: Vec<u8>) -> CoreResult<()> {
        self.guard_writable()?;
        self.guard_sane(virtual_path)?;
        let virtual_path = normalize_virtual(virtual_path);
        let real = self.mapper.to_real(&virtual_path);
        self.watcher.look_away();

        let len = bytes.len() as u64;
        let stamp = now_ms();
        tokio::task::spawn_blocking(move || fs_adapter::write_file(&real, &bytes))
            .await
            .map_err(|e| CoreError::IOError { path: virtual_path.clone(), message: e.to_string() })??;

        let (dir, name) = Self::dir_and_name(&virtual_path);
        self.store.put_file(&dir, &name, len, stamp);
        self.store.recompute_sizes();
        self.mark(&dir);
        Ok(())
    }

    /// `move(src, dst)`: rename (file or directory), relocating the
    /// matching index entry.
    pub async fn r#move(&self, src: &str, dst: &str) -> CoreResult<()> {
        let result = self.move_inner(src, dst).await;
        match &result {
            Ok(()) => log::info!("move {src} -> {dst} ok"),
            Err(e) => log::warn!("move {src} -> {dst} failed: {e}"),
        }
        result
    }

    async fn move_inner(&self, src: &str, dst: &str) -> CoreResult<()> {
        self.guard_writable()?;
        let src = normalize_virtual(src);
        let dst = normalize_virtual(dst);
        validate_rename(&src, &dst)?;
        let real_src = self.mapper.to_real(&src);
        let real_dst = self.mapper.to_real(&dst);
        self.watcher.look_away();

        let is_dir = self.store.contains_dir(&src);
        tokio::task::spawn_blocking(move || fs_adapter::rename(&real_src, &real_dst))
            .await
            .map_err(|e| CoreError::IOError { path: src.clone(), message: e.to_string() })??;

        if is_dir {
            self.store.rekey_dir_subtree(&src, &dst);
        } else {
            let (src_dir, src_name) = Self::dir_and_name(&src);
            let (dst_dir, dst_name) = Self::dir_and_name(&dst);
            if let Some(entry) = self.store.get(&src_dir).and_then(|d| d.files.get(&src_name).cloned()) {
                self.store.remove_file(&src_dir, &src_name);
                self.store.put_file(&dst_dir, &dst_name, entry.size, entry.mtime_ms);
            }
        }
        self.store.recompute_sizes();
        let (src_parent, _) = Self::dir_and_name(&src);
        let (dst_parent, _) = Self::dir_and_name(&dst);
        self.mark(&src_parent);
        self.mark(&dst_parent);
        Ok(())
    }

    /// `cp(src, dst)`: copy a single file, stamping a fresh mtime.
    pub async fn cp(&self, src: &str, dst: &str) -> CoreResult<()> {
        let result = self.cp_inner(src, dst).await;
        match &result {
            Ok(()) => log::info!("cp {src} -> {dst} ok"),
            Err(e) => log::warn!("cp {src} -> {dst} failed: {e}"),
        }
        result
    }

    async fn cp_inner(&self, src: &str, dst: &str) -> CoreResult<()> {
        self.guard_writable()?;
        let src = normalize_virtual(src);
        let dst = normalize_virtual(dst);
        validate_rename(&src, &dst)?;
        let real_src = self.mapper.to_real(&src);
        let real_dst = self.mapper.to_real(&dst);
        self.watcher.look_away();

        let stamp = now_ms();
        tokio::task::spawn_blocking(move || fs_adapter::copy_file(&real_src, &real_dst))
            .await
            .map_err(|e| CoreError::IOError { path: src.clone(), message: e.to_string() })??;

        let (src_dir, src_name) = Self::dir_and_name(&src);
        let size = self.store.get(&src_dir).and_then(|d| d.files.get(&src_name).map(|f| f.size)).unwrap_or(0);
        let (dst_dir, dst_name) = Self::dir_and_name(&dst);
        self.store.put_file(&dst_dir, &dst_name, size, stamp);
        self.store.recompute_sizes();
        self.mark(&dst_dir);
        Ok(())
    }

    /// `cpdir(src, dst)`: recursive copy, cloning the whole subtree and
    /// stamping every entry with the same "now".
    pub async fn cpdir(&self, src: &str, dst: &str) -> CoreResult<()> {
        let result = self.cpdir_inner(src, dst).await;
        match &result {
            Ok(()) => log::info!("cpdir {src} -> {dst} ok"),
            Err(e) => log::warn!("cpdir {src} -> {dst} failed: {e}"),
        }
        result
    }

    async fn cpdir_inner(&self, src: &str, dst: &str) -> CoreResult<()> {
        self.guard_writable()?;
        let src = normalize_virtual(src);
        let dst = normalize_virtual(dst);
        validate_rename(&src, &dst)?;
        let real_src = self.mapper.to_real(&src);
        let real_dst = self.mapper.to_real(&dst);
        self.watcher.look_away();

        tokio::task::spawn_blocking(move || fs_adapter::copy_dir(&real_src, &real_dst))
            .await
            .map_err(|e| CoreError::IOError { path: src.clone(), message: e.to_string() })??;

        self.clone_subtree_into_index(&src, &dst);
        self.store.recompute_sizes();
        let (dst_parent, _) = Self::dir_and_name(&dst);
        self.mark(&dst_parent);
        Ok(())
    }

    fn clone_subtree_into_index(&self, src: &str, dst: &str) {
        let stamp = now_ms();
        self.store.put_dir(dst, stamp);
        for (path, is_dir, _mtime, size) in self.store.all_under(src) {
            let rel = path.strip_prefix(src).unwrap_or(&path).trim_start_matches('/');
            let new_path = if rel.is_empty() { dst.to_string() } else { format!("{dst}/{rel}") };
            if is_dir {
                self.store.put_dir(&new_path, stamp);
            } else {
                let (dir, name) = Self::dir_and_name(&new_path);
                self.store.put_file(&dir, &name, size, stamp);
            }
        }
    }

    /// `clipboard(src, dst, kind)`: dispatches to move/cp/cpdir based on
    /// stat and `kind`, resolving collisions first.
    pub async fn clipboard(&self, src: &str, dst: &str, kind: ClipboardKind) -> CoreResult<String> {
        let src = normalize_virtual(src);
        let dst = normalize_virtual(dst);
        let is_dir = self.store.contains_dir(&src);
        let resolved = self.resolve_collision(&src, &dst, is_dir);
        log::debug!("clipboard {kind:?} {src} -> {dst} resolved to {resolved}");
        match (kind, is_dir) {
            (ClipboardKind::Cut, _) => self.r#move(&src, &resolved).await?,
            (ClipboardKind::Copy, true) => self.cpdir(&src, &resolved).await?,
            (ClipboardKind::Copy, false) => self.cp(&src, &resolved).await?,
        }
        Ok(resolved)
    }

    /// Derives a non-colliding destination (spec §4.5 collision policy):
    /// if `dst` doesn't exist and isn't `src`, it's used unchanged;
    /// otherwise a `name-<n>` suffix is appended to the basename and `n`
    /// incremented until free.
    fn resolve_collision(&self, src: &str, dst: &str, dst_is_dir: bool) -> String {
        if dst != src && !self.exists(dst, dst_is_dir) {
            return dst.to_string();
        }
        let (dir, name) = Self::dir_and_name(dst);
        let (stem, ext) = split_stem_and_ext(&name);
        let (base_stem, mut n) = match trailing_numeric_suffix(&stem) {
            Some((base, num)) => (base.to_string(), num + 1),
            None => (stem.to_string(), 1),
        };
        loop {
            let candidate_name = if ext.is_empty() {
                format!("{base_stem}-{n}")
            } else {
                format!("{base_stem}-{n}.{ext}")
            };
            let candidate = if dir == "/" { format!("/{candidate_name}") } else { format!("{dir}/{candidate_name}") };
            if !self.exists(&candidate, dst_is_dir) {
                return candidate;
            }
            n += 1;
        }
    }

    fn exists(&self, virtual_path: &str, expect_dir: bool) -> bool {
        if expect_dir {
            self.store.contains_dir(virtual_path)
        } else {
            let (dir, name) = Self::dir_and_name(virtual_path);
            self.store.get(&dir).is_some_and(|d| d.files.contains_key(&name))
        }
    }
}

/// `^\s*$` in spec terms: empty or whitespace-only.
fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Rename validation (spec §4.5): path sanity on both sides, destination
/// not blank, destination not equal to source, destination not inside
/// source. Expects `src`/`dst` already NFC-normalized by the caller.
fn validate_rename(src: &str, dst: &str) -> CoreResult<()> {
    if !is_path_sane(src, false) || !is_path_sane(dst, false) {
        return Err(CoreError::Invalid { reason: format!("unsafe path: {src} or {dst}") });
    }
    if is_blank(dst) {
        return Err(CoreError::Invalid { reason: "destination is blank".to_string() });
    }
    if dst == src {
        return Err(CoreError::Invalid { reason: "destination equals source".to_string() });
    }
    let src_prefix = if src == "/" { "/".to_string() } else { format!("{src}/") };
    if dst.starts_with(&src_prefix) {
        return Err(CoreError::Invalid { reason: format!("{dst} is inside {src}") });
    }
    Ok(())
}

fn split_stem_and_ext(name: &str) -> (String, String) {
    match name.rfind('.') {
        Some(0) | None => (name.to_string(), String::new()),
        Some(idx) => (name[..idx].to_string(), name[idx + 1..].to_string()),
    }
}

/// If `stem` ends in `-<digits>`, returns the stem without the suffix and
/// the parsed number.
fn trailing_numeric_suffix(stem: &str) -> Option<(&str, u64)> {
    let dash = stem.rfind('-')?;
    let (base, digits) = (&stem[..dash], &stem[dash + 1..]);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().map(|n| (base, n))
}
