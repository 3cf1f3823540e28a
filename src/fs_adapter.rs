//! Low-level stat/mkdir/unlink/copy/move primitives, abstracted from the
//! index (spec §4.2). The adapter never touches the index; every method
//! here is a thin, synchronous wrapper over `std::fs` that classifies
//! failures into `CoreError` categories.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CoreError, CoreResult};

#[cfg(unix)]
const DEFAULT_DIR_MODE: u32 = 0o755;

/// One directory entry as read straight off disk, before it's folded into
/// the index.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime_ms: i64,
}

/// Result of a `stat` call.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub is_dir: bool,
    pub size: u64,
    pub mtime_ms: i64,
}

/// Milliseconds since epoch for "now", the timestamp every mutation stamps
/// onto its patched index entry and (where relevant) the file on disk.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn mtime_ms_from_metadata(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `stat(path)`.
pub fn stat(path: &Path) -> CoreResult<Stat> {
    let meta = fs::metadata(path).map_err(|e| CoreError::from_io(e, path_str(path)))?;
    Ok(Stat {
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime_ms: mtime_ms_from_metadata(&meta),
    })
}

/// `mkdir(recursive, mode=0755)`.
pub fn mkdir(path: &Path, recursive: bool) -> CoreResult<()> {
    let result = if recursive { fs::create_dir_all(path) } else { fs::create_dir(path) };
    result.map_err(|e| CoreError::from_io(e, path_str(path)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(DEFAULT_DIR_MODE));
    }
    Ok(())
}

/// `rm(path)` — unlinks a regular file.
pub fn rm(path: &Path) -> CoreResult<()> {
    fs::remove_file(path).map_err(|e| CoreError::from_io(e, path_str(path)))
}

/// `rmdir(path, recursive)`.
pub fn rmdir(path: &Path, recursive: bool) -> CoreResult<()> {
    let result = if recursive { fs::remove_dir_all(path) } else { fs::remove_dir(path) };
    result.map_err(|e| CoreError::from_io(e, path_str(path)))
}

/// `rename(src, dst)`, falling back to copy+unlink across devices.
///
/// The copy fallback stamps the destination with `src`'s original mtimes
/// before removing `src`, so the on-disk result agrees with the index,
/// which keeps the pre-move `mtime_ms` for a plain rename (the mutation
/// engine's `move` never restamps an entry's mtime — only `save` does).
pub fn rename(src: &Path, dst: &Path) -> CoreResult<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(18) => {
            // EXDEV: cross-device. Fall back to a recursive copy then
            // remove the source, same as the teacher's move_op.rs does
            // for cross-filesystem moves.
            let src_meta = fs::symlink_metadata(src).map_err(|e| CoreError::from_io(e, path_str(src)))?;
            if src_meta.is_dir() {
                copy_dir(src, dst)?;
                restore_mtimes(src, dst)?;
                rmdir(src, true)
            } else {
                copy_file(src, dst)?;
                set_mtime_ms(dst, mtime_ms_from_metadata(&src_meta))?;
                rm(src)
            }
        }
        Err(e) => Err(CoreError::from_io(e, path_str(src))),
    }
}

/// Recursively restamps every entry under `dst` to match the corresponding
/// entry under `src`, mirroring `copy_dir`'s own traversal.
fn restore_mtimes(src: &Path, dst: &Path) -> CoreResult<()> {
    for entry in fs::read_dir(src).map_err(|e| CoreError::from_io(e, path_str(src)))? {
        let entry = entry.map_err(|e| CoreError::from_io(e, path_str(src)))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| CoreError::from_io(e, path_str(&from)))?;
        if file_type.is_dir() {
            restore_mtimes(&from, &to)?;
        }
        let meta = entry.metadata().map_err(|e| CoreError::from_io(e, path_str(&from)))?;
        set_mtime_ms(&to, mtime_ms_from_metadata(&meta))?;
    }
    let src_meta = fs::symlink_metadata(src).map_err(|e| CoreError::from_io(e, path_str(src)))?;
    set_mtime_ms(dst, mtime_ms_from_metadata(&src_meta))
}

/// `copyFile(src, dst)`.
pub fn copy_file(src: &Path, dst: &Path) -> CoreResult<()> {
    fs::copy(src, dst).map_err(|e| CoreError::from_io(e, path_str(src)))?;
    Ok(())
}

/// `copyDir(src, dst)` — recursive.
pub fn copy_dir(src: &Path, dst: &Path) -> CoreResult<()> {
    fs::create_dir_all(dst).map_err(|e| CoreError::from_io(e, path_str(dst)))?;
    for entry in fs::read_dir(src).map_err(|e| CoreError::from_io(e, path_str(src)))? {
        let entry = entry.map_err(|e| CoreError::from_io(e, path_str(src)))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| CoreError::from_io(e, path_str(&from)))?;
        if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// Stamps a file's mtime on disk so it agrees with the timestamp the
/// mutation engine is about to record in the index. Uses `filetime`
/// because `std::fs` has no portable "set mtime" call.
pub fn set_mtime_ms(path: &Path, mtime_ms: i64) -> CoreResult<()> {
    let ft = filetime::FileTime::from_unix_time(mtime_ms / 1000, ((mtime_ms % 1000) * 1_000_000) as u32);
    filetime::set_file_mtime(path, ft).map_err(|e| CoreError::from_io(e, path_str(path)))
}

/// `openWrite` / `save` — overwrites (or creates) a file with `bytes`.
pub fn write_file(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    fs::write(path, bytes).map_err(|e| CoreError::from_io(e, path_str(path)))
}

/// `list(path)` — one shallow listing, used by the rescan and by `ls`
/// fallbacks that need a fresh read.
pub fn list(path: &Path) -> CoreResult<Vec<RawEntry>> {
    let mut out = Vec::new();
    let read_dir = fs::read_dir(path).map_err(|e| CoreError::from_io(e, path_str(path)))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| CoreError::from_io(e, path_str(path)))?;
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue, // vanished between readdir and stat; skip
        };
        out.push(RawEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mtime_ms: mtime_ms_from_metadata(&meta),
        });
    }
    Ok(out)
}
