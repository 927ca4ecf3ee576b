use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Overrides the per-user state root.
pub const ENV_HOME: &str = "CACHESWEEP_HOME";

/// Compute a deterministic project ID from a repository root.
/// project_id = blake3(normalize_path(input)) → hex string (first 32 chars).
pub fn project_id(repo_root: &Path) -> String {
    let normalized = normalize_path(repo_root);
    let hash = blake3::hash(normalized.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Normalize a path: canonicalize, lowercase on Windows, forward slashes.
fn normalize_path(p: &Path) -> String {
    let abs = p
        .canonicalize()
        .unwrap_or_else(|_| p.to_path_buf())
        .to_string_lossy()
        .to_string();
    #[cfg(windows)]
    let abs = abs.to_lowercase();
    abs.replace('\\', "/")
}

/// Return the per-user state root: `$CACHESWEEP_HOME`, else `<data_dir>/cachesweep/`.
pub fn store_root() -> PathBuf {
    if let Ok(home) = std::env::var(ENV_HOME) {
        return PathBuf::from(home);
    }
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("cachesweep")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".cachesweep")
    } else {
        PathBuf::from(".cachesweep-store")
    }
}

/// Expand a leading `~/` to the home directory. Other paths are returned as-is.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Directory holding per-repository scan locks.
pub fn locks_dir() -> PathBuf {
    store_root().join("locks")
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Exclusive per-repository lock held for the duration of a scan.
/// Automatically released when dropped.
#[derive(Debug)]
pub struct ScanLock {
    path: PathBuf,
    _file: fs::File,
}

impl ScanLock {
    /// Try to acquire the scan lock for `repo_root` under `lock_dir` (non-blocking).
    /// Returns an error if another process holds it.
    pub fn acquire(lock_dir: &Path, repo_root: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{}.lock", project_id(repo_root)));
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("cannot open lock file {}: {}", path.display(), e))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "a scan of {} is already running (lock {})",
                repo_root.display(),
                path.display()
            )
        })?;

        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
