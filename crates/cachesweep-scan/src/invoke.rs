use crate::mask::mask_secrets;
use cachesweep_core::{
    InvocationOutcome, SweepError, SweepResult, CACHE_HIT_MARKER, CACHE_WRITE_MARKER,
    UNKNOWN_ERROR,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Longest failure reason kept, in bytes.
const MAX_REASON_LEN: usize = 500;

/// The external analysis engine. Implemented by `ProcessAnalyzer` (real) and
/// `MockAnalyzer` (tests).
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one file. Never fails: every problem is folded into the outcome.
    async fn analyze(&self, repo_root: &Path, relative: &Path) -> InvocationOutcome;

    /// Bootstrap the cache namespace for `repo_root`. Idempotent.
    async fn cache_init(&self, repo_root: &Path) -> SweepResult<()>;

    /// Human-readable cache status, if the analyzer can provide one.
    async fn cache_status(&self, repo_root: &Path) -> Option<String>;
}

/// Runs the analyzer binary as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    pub bin: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl ProcessAnalyzer {
    pub fn new(bin: PathBuf, env: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self { bin, env, timeout }
    }

    fn command(&self, cwd: &Path) -> Command {
        base_command(&self.bin, cwd, &self.env)
    }
}

#[async_trait::async_trait]
impl Analyzer for ProcessAnalyzer {
    async fn analyze(&self, repo_root: &Path, relative: &Path) -> InvocationOutcome {
        invoke(&self.bin, repo_root, relative, &self.env, self.timeout).await
    }

    async fn cache_init(&self, repo_root: &Path) -> SweepResult<()> {
        let mut cmd = self.command(repo_root);
        cmd.args(["cache", "init", "--path"]).arg(repo_root);
        match run_bounded(cmd, self.timeout).await {
            Ok(Bounded::Exited { success: true, .. }) => Ok(()),
            Ok(Bounded::Exited { output, .. }) => Err(SweepError::precondition(format!(
                "cache init failed: {}",
                failure_reason(&output)
            ))),
            Ok(Bounded::TimedOut) => Err(SweepError::precondition(format!(
                "cache init timed out after {}s",
                self.timeout.as_secs()
            ))),
            Err(e) => Err(SweepError::precondition(format!(
                "cannot run {}: {e}",
                self.bin.display()
            ))),
        }
    }

    async fn cache_status(&self, repo_root: &Path) -> Option<String> {
        let mut cmd = self.command(repo_root);
        cmd.args(["cache", "status", "--path"]).arg(repo_root);
        match run_bounded(cmd, self.timeout).await {
            Ok(Bounded::Exited {
                success: true,
                output,
            }) => Some(output.trim_end().to_string()),
            Ok(Bounded::Exited { output, .. }) => {
                tracing::warn!("cache status failed: {}", failure_reason(&output));
                None
            }
            Ok(Bounded::TimedOut) => {
                tracing::warn!("cache status timed out");
                None
            }
            Err(e) => {
                tracing::warn!("cannot run cache status: {e}");
                None
            }
        }
    }
}

/// Run `<analyzer> analyze <relative>` in `repo_root` and classify the result.
pub async fn invoke(
    analyzer: &Path,
    repo_root: &Path,
    relative: &Path,
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> InvocationOutcome {
    let mut cmd = base_command(analyzer, repo_root, env);
    cmd.arg("analyze").arg(relative);

    match run_bounded(cmd, timeout).await {
        Ok(Bounded::Exited { success, output }) => classify(success, &output),
        Ok(Bounded::TimedOut) => {
            tracing::debug!(
                "analyzer timed out after {}s on {}",
                timeout.as_secs(),
                relative.display()
            );
            InvocationOutcome::Timeout
        }
        Err(e) => InvocationOutcome::failure(format!("spawn error: {e}")),
    }
}

/// Classify a completed invocation from its exit status and merged output.
pub fn classify(success: bool, output: &str) -> InvocationOutcome {
    if !success {
        return InvocationOutcome::failure(failure_reason(output));
    }
    if output.contains(CACHE_HIT_MARKER) {
        InvocationOutcome::Success { cached: true }
    } else if output.contains(CACHE_WRITE_MARKER) {
        InvocationOutcome::Success { cached: false }
    } else {
        // Output without a cache marker still means the file was analyzed.
        InvocationOutcome::Success { cached: false }
    }
}

/// First non-blank output line, masked and truncated; a sentinel when there is none.
fn failure_reason(output: &str) -> String {
    match output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => mask_secrets(truncate_str(line, MAX_REASON_LEN)),
        None => UNKNOWN_ERROR.to_string(),
    }
}

/// Truncate a string to at most `max` bytes on a valid UTF-8 char boundary.
fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn base_command(bin: &Path, cwd: &Path, env: &BTreeMap<String, String>) -> Command {
    let mut cmd = Command::new(bin);
    cmd.current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

enum Bounded {
    Exited { success: bool, output: String },
    TimedOut,
}

/// Spawn and collect exit status plus both pipes within `limit`; kill + reap
/// the child on expiry. Output is stdout followed by stderr.
///
/// A child that exits while a descendant still holds its pipes open counts
/// as timed out once `limit` passes.
async fn run_bounded(mut cmd: Command, limit: Duration) -> std::io::Result<Bounded> {
    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::time::timeout(limit, async {
        let (status, out, err) =
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
        status.map(|status| (status, out, err))
    })
    .await;

    match finished {
        Ok(result) => {
            let (status, mut output, err) = result?;
            output.push_str(&err);
            Ok(Bounded::Exited {
                success: status.success(),
                output,
            })
        }
        Err(_) => {
            // Already reaped when only the pipes outlived the deadline.
            if !matches!(child.try_wait(), Ok(Some(_))) {
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to kill timed-out analyzer: {e}");
                }
            }
            Ok(Bounded::TimedOut)
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("analyzer pipe read error: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Scripted analyzer for testing. Returns the configured outcome per relative
/// path, `Success { cached: false }` otherwise.
#[derive(Default)]
pub struct MockAnalyzer {
    outcomes: Mutex<HashMap<PathBuf, InvocationOutcome>>,
    calls: Mutex<Vec<PathBuf>>,
    init_calls: Mutex<usize>,
    fail_init: bool,
    cache_dir_name: Option<String>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `<root>/<name>` on `cache_init`, like the real analyzer does.
    pub fn with_cache_dir(mut self, name: &str) -> Self {
        self.cache_dir_name = Some(name.to_string());
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn set_outcome(&self, relative: impl Into<PathBuf>, outcome: InvocationOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(relative.into(), outcome);
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn init_calls(&self) -> usize {
        *self.init_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _repo_root: &Path, relative: &Path) -> InvocationOutcome {
        self.calls.lock().unwrap().push(relative.to_path_buf());
        self.outcomes
            .lock()
            .unwrap()
            .get(relative)
            .cloned()
            .unwrap_or(InvocationOutcome::Success { cached: false })
    }

    async fn cache_init(&self, repo_root: &Path) -> SweepResult<()> {
        *self.init_calls.lock().unwrap() += 1;
        if self.fail_init {
            return Err(SweepError::precondition("cache init failed: (mock)"));
        }
        if let Some(name) = &self.cache_dir_name {
            std::fs::create_dir_all(repo_root.join(name))?;
        }
        Ok(())
    }

    async fn cache_status(&self, _repo_root: &Path) -> Option<String> {
        Some("(mock) cache ok".into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable `sh` script standing in for the analyzer.
    fn fake_analyzer(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("analyzer.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn env() -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    async fn run(body: &str, timeout_secs: u64) -> InvocationOutcome {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_analyzer(dir.path(), body);
        invoke(
            &bin,
            dir.path(),
            Path::new("src/lib.rs"),
            &env(),
            Duration::from_secs(timeout_secs),
        )
        .await
    }

    #[tokio::test]
    async fn cache_hit_marker() {
        let out = run("echo 'Using cached analysis for $2'", 10).await;
        assert_eq!(out, InvocationOutcome::Success { cached: true });
    }

    #[tokio::test]
    async fn cache_write_marker() {
        let out = run("echo 'Analysis cached to .cache'", 10).await;
        assert_eq!(out, InvocationOutcome::Success { cached: false });
    }

    #[tokio::test]
    async fn marker_on_stderr_counts() {
        let out = run("echo 'Using cached result' >&2", 10).await;
        assert_eq!(out, InvocationOutcome::Success { cached: true });
    }

    #[tokio::test]
    async fn no_marker_is_fresh() {
        let out = run("echo 'score: 87'", 10).await;
        assert_eq!(out, InvocationOutcome::Success { cached: false });
    }

    #[tokio::test]
    async fn nonzero_exit_takes_first_line() {
        let out = run("echo 'error: parse failed'; echo 'detail'; exit 2", 10).await;
        assert_eq!(out, InvocationOutcome::failure("error: parse failed"));
    }

    #[tokio::test]
    async fn nonzero_exit_wins_over_markers() {
        let out = run("echo 'Using cached'; exit 1", 10).await;
        assert_eq!(out, InvocationOutcome::failure("Using cached"));
    }

    #[tokio::test]
    async fn nonzero_exit_without_output_is_unknown() {
        let out = run("exit 3", 10).await;
        assert_eq!(out, InvocationOutcome::failure(UNKNOWN_ERROR));
    }

    #[tokio::test]
    async fn failure_reason_is_masked() {
        let out = run("echo 'auth failed: key=sk-ant1234567890abcdefghij'; exit 1", 10).await;
        let reason = out.failure_reason().unwrap().to_string();
        assert!(!reason.contains("sk-ant"), "secret should be masked: {reason}");
    }

    #[tokio::test]
    async fn timeout_kills() {
        let start = std::time::Instant::now();
        let out = run("exec sleep 60", 1).await;
        assert_eq!(out, InvocationOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn lingering_child_holding_output_times_out() {
        let start = std::time::Instant::now();
        let out = run("sleep 8 &\necho 'Analysis cached'", 1).await;
        assert_eq!(out, InvocationOutcome::Timeout);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn receives_arguments_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_analyzer(
            dir.path(),
            "[ \"$1\" = analyze ] && [ \"$2\" = src/lib.rs ] && [ \"$DATABASE_URL\" = sqlite:x.db ] && [ -f marker ] || exit 9\necho 'Using cached'",
        );
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let mut env = env();
        env.insert("DATABASE_URL".into(), "sqlite:x.db".into());
        let out = invoke(
            &bin,
            dir.path(),
            Path::new("src/lib.rs"),
            &env,
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(out, InvocationOutcome::Success { cached: true });
    }

    #[tokio::test]
    async fn missing_binary_is_failure_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let out = invoke(
            &dir.path().join("nope"),
            dir.path(),
            Path::new("a.rs"),
            &env(),
            Duration::from_secs(5),
        )
        .await;
        match out {
            InvocationOutcome::Failure { reason } => assert!(reason.contains("spawn error")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_init_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_analyzer(
            dir.path(),
            "case \"$1 $2\" in\n  'cache init') mkdir -p \"$4/.cache-ns\" ;;\n  'cache status') echo 'entries: 3' ;;\n  *) exit 1 ;;\nesac",
        );
        let analyzer = ProcessAnalyzer::new(bin, env(), Duration::from_secs(10));
        analyzer.cache_init(dir.path()).await.unwrap();
        // Idempotent
        analyzer.cache_init(dir.path()).await.unwrap();
        assert!(dir.path().join(".cache-ns").is_dir());
        assert_eq!(
            analyzer.cache_status(dir.path()).await.as_deref(),
            Some("entries: 3")
        );
    }

    #[tokio::test]
    async fn cache_init_failure_is_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_analyzer(dir.path(), "echo 'no database' >&2; exit 1");
        let analyzer = ProcessAnalyzer::new(bin, env(), Duration::from_secs(10));
        let err = analyzer.cache_init(dir.path()).await.unwrap_err();
        assert!(matches!(err, SweepError::Precondition(ref m) if m.contains("no database")));
    }

    #[test]
    fn truncate_str_multibyte() {
        let s = "café";
        assert_eq!(truncate_str(s, 4), "caf");
        assert_eq!(truncate_str(s, 5), "café");
    }

    #[tokio::test]
    async fn mock_returns_configured_and_records_calls() {
        let mock = MockAnalyzer::new();
        mock.set_outcome("b.rs", InvocationOutcome::Timeout);
        let root = Path::new(".");
        assert_eq!(
            mock.analyze(root, Path::new("a.rs")).await,
            InvocationOutcome::Success { cached: false }
        );
        assert_eq!(
            mock.analyze(root, Path::new("b.rs")).await,
            InvocationOutcome::Timeout
        );
        assert_eq!(
            mock.calls(),
            vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]
        );
    }
}
