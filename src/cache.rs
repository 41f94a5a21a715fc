//! Surface cache and cross-process locking
//!
//! Cached surfaces are keyed by branch and project directory so a branch
//! switch misses cleanly. Surface writes are serialized by a PID lock
//! file with stale-lock recovery; cache reads are lock-free and tolerate
//! concurrent invalidation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::SURFACE_STALE_HOURS;
use crate::error::{CortexError, Result};

/// Lock file name under the lock directory
pub const SURFACE_LOCK_FILE: &str = "surface.lock";

/// A cached surface entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub surface: String,
    pub branch: String,
    pub cwd: String,
    pub generated_at: DateTime<Utc>,
}

/// A loaded cache entry together with its staleness flag
#[derive(Debug, Clone)]
pub struct CachedSurface {
    pub entry: CacheEntry,
    pub stale: bool,
}

/// Cache file name: first 16 hex chars of sha256(branch + ":" + cwd)
pub fn cache_key(branch: &str, cwd: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(branch.as_bytes());
    hasher.update(b":");
    hasher.update(cwd.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn cache_file(cache_dir: &Path, branch: &str, cwd: &str) -> PathBuf {
    cache_dir.join(format!("{}.json", cache_key(branch, cwd)))
}

/// Load the cached surface for the current branch and directory. Returns
/// `None` when the file is absent, disagrees with the current context, or
/// fails to parse. A stale entry is still returned, flagged.
pub fn load_cached_surface(
    cache_dir: &Path,
    branch: &str,
    cwd: &str,
    now: DateTime<Utc>,
) -> Option<CachedSurface> {
    let path = cache_file(cache_dir, branch, cwd);
    let raw = std::fs::read_to_string(&path).ok()?;
    let entry: CacheEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("cache entry unparsable at {}: {}", path.display(), e);
            return None;
        }
    };

    if entry.branch != branch || entry.cwd != cwd {
        return None;
    }

    let stale = now - entry.generated_at > Duration::hours(SURFACE_STALE_HOURS);
    Some(CachedSurface { entry, stale })
}

/// Write a cache entry for its branch and directory
pub fn store_cached_surface(cache_dir: &Path, entry: &CacheEntry) -> Result<()> {
    std::fs::create_dir_all(cache_dir)?;
    let path = cache_file(cache_dir, &entry.branch, &entry.cwd);
    std::fs::write(path, serde_json::to_string_pretty(entry)?)?;
    Ok(())
}

/// Delete every file in the cache directory; a missing directory is a
/// no-op.
pub fn invalidate_cache(cache_dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.flatten() {
        if entry.path().is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Exclusive-create PID lock guarding surface writes. Released on drop.
#[derive(Debug)]
pub struct SurfaceLock {
    path: PathBuf,
}

impl SurfaceLock {
    /// Acquire the lock, taking over from a dead holder. Fails with
    /// `LockHeld` while the holding process is alive.
    pub fn acquire(lock_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(SURFACE_LOCK_FILE);

        match Self::try_create(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let holder = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok());

        if let Some(pid) = holder {
            if process_alive(pid) {
                return Err(CortexError::LockHeld(pid));
            }
            warn!("overriding stale surface lock held by dead process {}", pid);
        } else {
            warn!("overriding surface lock with unreadable PID");
        }

        // Stale: remove and retry the exclusive create once
        std::fs::remove_file(&path).ok();
        Self::try_create(&path)?;
        Ok(Self { path })
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(())
    }
}

impl Drop for SurfaceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to release surface lock: {}", e);
            }
        }
    }
}

/// Whether a PID maps to a live process. Signal 0 probes without
/// delivering; EPERM still means the process exists.
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Write the surface under the PID lock. The critical section is the
/// single file write.
pub fn write_surface_locked(surface_path: &Path, lock_dir: &Path, content: &str) -> Result<()> {
    let lock = SurfaceLock::acquire(lock_dir)?;
    if let Some(parent) = surface_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(surface_path, content)?;
    drop(lock);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(branch: &str, cwd: &str, generated_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            surface: "surface content".to_string(),
            branch: branch.to_string(),
            cwd: cwd.to_string(),
            generated_at,
        }
    }

    #[test]
    fn test_cache_key_is_16_hex() {
        let key = cache_key("main", "/tmp/project");
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, cache_key("other", "/tmp/project"));
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        store_cached_surface(dir.path(), &entry("main", "/p", now)).unwrap();

        let loaded = load_cached_surface(dir.path(), "main", "/p", now).unwrap();
        assert_eq!(loaded.entry.surface, "surface content");
        assert!(!loaded.stale);
    }

    #[test]
    fn test_cache_miss_on_branch_change() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        store_cached_surface(dir.path(), &entry("main", "/p", now)).unwrap();
        assert!(load_cached_surface(dir.path(), "feature", "/p", now).is_none());
    }

    #[test]
    fn test_cache_stale_flag() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let old = now - Duration::hours(SURFACE_STALE_HOURS + 1);
        store_cached_surface(dir.path(), &entry("main", "/p", old)).unwrap();

        let loaded = load_cached_surface(dir.path(), "main", "/p", now).unwrap();
        assert!(loaded.stale);
    }

    #[test]
    fn test_cache_unparsable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let path = dir.path().join(format!("{}.json", cache_key("main", "/p")));
        std::fs::write(&path, "{broken").unwrap();
        assert!(load_cached_surface(dir.path(), "main", "/p", now).is_none());
    }

    #[test]
    fn test_invalidate_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        invalidate_cache(&dir.path().join("absent")).unwrap();
    }

    #[test]
    fn test_invalidate_clears_entries() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        store_cached_surface(dir.path(), &entry("main", "/p", now)).unwrap();
        invalidate_cache(dir.path()).unwrap();
        assert!(load_cached_surface(dir.path(), "main", "/p", now).is_none());
    }

    #[test]
    fn test_lock_excludes_second_acquirer() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SurfaceLock::acquire(dir.path()).unwrap();

        // Same process holds the lock, so its PID probes alive
        let err = SurfaceLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, CortexError::LockHeld(_)));

        drop(lock);
        let relock = SurfaceLock::acquire(dir.path());
        assert!(relock.is_ok());
    }

    #[test]
    fn test_stale_lock_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SURFACE_LOCK_FILE);
        // A PID from the far end of the range will not be a live process
        std::fs::write(&path, "4194000").unwrap();

        let lock = SurfaceLock::acquire(dir.path()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_unreadable_pid_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SURFACE_LOCK_FILE);
        std::fs::write(&path, "not-a-pid").unwrap();
        assert!(SurfaceLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_write_surface_locked() {
        let dir = tempfile::tempdir().unwrap();
        let surface = dir.path().join("out").join("surface.md");
        let locks = dir.path().join("locks");

        write_surface_locked(&surface, &locks, "document body").unwrap();
        assert_eq!(std::fs::read_to_string(&surface).unwrap(), "document body");
        // Lock released after the write
        assert!(!locks.join(SURFACE_LOCK_FILE).exists());
    }
}
