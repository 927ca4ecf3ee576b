use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Mutex;
use tokio::process::Command;

/// Version-control operations the scan commit step needs. Every operation is
/// scoped to a single pathspec under the working directory.
#[async_trait::async_trait]
pub trait Vcs: Send + Sync {
    async fn is_repository(&self, cwd: &Path) -> bool;
    async fn stage(&self, cwd: &Path, path: &Path) -> anyhow::Result<()>;
    async fn has_staged_changes(&self, cwd: &Path, path: &Path) -> anyhow::Result<bool>;
    async fn commit(&self, cwd: &Path, message: &str, path: &Path) -> anyhow::Result<()>;
}

/// Shells out to `git`.
pub struct GitCli;

async fn git(cwd: &Path, args: &[&str], path: Option<&Path>) -> anyhow::Result<std::process::Output> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(cwd);
    if let Some(path) = path {
        cmd.arg("--").arg(path);
    }
    cmd.output()
        .await
        .with_context(|| format!("git {} could not be started", args.join(" ")))
}

fn stderr_line(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait::async_trait]
impl Vcs for GitCli {
    async fn is_repository(&self, cwd: &Path) -> bool {
        match git(cwd, &["rev-parse", "--git-dir"], None).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!("{e:#}");
                false
            }
        }
    }

    async fn stage(&self, cwd: &Path, path: &Path) -> anyhow::Result<()> {
        let output = git(cwd, &["add"], Some(path)).await?;
        if !output.status.success() {
            bail!("git add failed: {}", stderr_line(&output));
        }
        Ok(())
    }

    async fn has_staged_changes(&self, cwd: &Path, path: &Path) -> anyhow::Result<bool> {
        let output = git(cwd, &["diff", "--staged", "--quiet"], Some(path)).await?;
        // --quiet: 0 = no differences, 1 = differences, anything else = error
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => bail!("git diff --staged failed: {}", stderr_line(&output)),
        }
    }

    async fn commit(&self, cwd: &Path, message: &str, path: &Path) -> anyhow::Result<()> {
        let output = git(cwd, &["commit", "--quiet", "-m", message], Some(path)).await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = stderr_line(&output);
            let detail = if stderr.is_empty() { stdout.trim() } else { stderr.as_str() };
            bail!("git commit failed: {detail}");
        }
        Ok(())
    }
}

/// Scripted VCS (for testing). Records every call as a short string.
pub struct MockVcs {
    repository: bool,
    staged: bool,
    fail_commit: bool,
    calls: Mutex<Vec<String>>,
}

impl MockVcs {
    pub fn new(repository: bool, staged: bool) -> Self {
        Self {
            repository,
            staged,
            fail_commit: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl Vcs for MockVcs {
    async fn is_repository(&self, _cwd: &Path) -> bool {
        self.record("is_repository".into());
        self.repository
    }

    async fn stage(&self, _cwd: &Path, path: &Path) -> anyhow::Result<()> {
        self.record(format!("stage {}", path.display()));
        Ok(())
    }

    async fn has_staged_changes(&self, _cwd: &Path, path: &Path) -> anyhow::Result<bool> {
        self.record(format!("has_staged_changes {}", path.display()));
        Ok(self.staged)
    }

    async fn commit(&self, _cwd: &Path, message: &str, path: &Path) -> anyhow::Result<()> {
        self.record(format!("commit {}", path.display()));
        if self.fail_commit {
            bail!("commit rejected by hook");
        }
        tracing::debug!("mock commit: {message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(cwd: &Path, args: &[&str]) {
        let _ = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await;
    }

    async fn init_repo(cwd: &Path) {
        run(cwd, &["init"]).await;
        run(cwd, &["config", "user.email", "test@test.com"]).await;
        run(cwd, &["config", "user.name", "Test"]).await;
        std::fs::write(cwd.join("README"), "hi").unwrap();
        run(cwd, &["add", "."]).await;
        run(cwd, &["commit", "-m", "init"]).await;
    }

    async fn log_count(cwd: &Path) -> usize {
        let out = Command::new("git")
            .args(["rev-list", "--count", "HEAD"])
            .current_dir(cwd)
            .output()
            .await
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().parse().unwrap()
    }

    #[tokio::test]
    async fn not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!GitCli.is_repository(dir.path()).await);
    }

    #[tokio::test]
    async fn stage_and_commit_only_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        assert!(GitCli.is_repository(dir.path()).await);

        let cache = Path::new(".cache-ns");
        std::fs::create_dir_all(dir.path().join(cache)).unwrap();
        std::fs::write(dir.path().join(cache).join("entry.json"), "{}").unwrap();

        // Unrelated staged work must stay staged, not committed.
        std::fs::write(dir.path().join("other.txt"), "wip").unwrap();
        run(dir.path(), &["add", "other.txt"]).await;

        GitCli.stage(dir.path(), cache).await.unwrap();
        assert!(GitCli.has_staged_changes(dir.path(), cache).await.unwrap());
        GitCli
            .commit(dir.path(), "chore: update analysis cache", cache)
            .await
            .unwrap();
        assert_eq!(log_count(dir.path()).await, 2);
        assert!(!GitCli.has_staged_changes(dir.path(), cache).await.unwrap());
        assert!(GitCli
            .has_staged_changes(dir.path(), Path::new("other.txt"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unchanged_cache_has_no_staged_changes() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let cache = Path::new(".cache-ns");
        std::fs::create_dir_all(dir.path().join(cache)).unwrap();
        std::fs::write(dir.path().join(cache).join("entry.json"), "{}").unwrap();
        GitCli.stage(dir.path(), cache).await.unwrap();
        GitCli.commit(dir.path(), "first", cache).await.unwrap();

        // Rewrite with identical bytes.
        std::fs::write(dir.path().join(cache).join("entry.json"), "{}").unwrap();
        GitCli.stage(dir.path(), cache).await.unwrap();
        assert!(!GitCli.has_staged_changes(dir.path(), cache).await.unwrap());
    }
}
