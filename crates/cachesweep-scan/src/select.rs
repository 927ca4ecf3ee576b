//! Source file discovery.
//!
//! Exclusion is plain substring containment against the path relative to the
//! repository root, written with a leading `/` and forward slashes, so a rule
//! like `/target/` reads the same way it would in a `.gitignore` review.

use cachesweep_core::FileTask;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Build output and version-control metadata.
pub const DEFAULT_EXCLUDES: [&str; 2] = ["/target/", "/.git/"];

/// Test, benchmark, and example subtrees.
pub const TEST_EXCLUDES: [&str; 3] = ["/tests/", "/benches/", "/examples/"];

/// Set of path substrings that exclude a file from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionProfile {
    patterns: Vec<String>,
}

impl Default for ExclusionProfile {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDES)
    }
}

impl ExclusionProfile {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Also exclude test, benchmark, and example subtrees.
    pub fn with_tests(self) -> Self {
        self.with_patterns(TEST_EXCLUDES)
    }

    pub fn with_patterns<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for p in extra {
            let p = p.into();
            if !p.is_empty() && !self.patterns.contains(&p) {
                self.patterns.push(p);
            }
        }
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True iff any pattern is a substring of `anchored`.
    pub fn is_excluded(&self, anchored: &str) -> bool {
        self.patterns.iter().any(|p| anchored.contains(p.as_str()))
    }
}

/// A restartable, deterministically ordered view of the files under a root.
///
/// Directory entries are visited sorted by file name, so the sequence is a
/// component-wise lexicographic order independent of filesystem iteration.
#[derive(Debug, Clone)]
pub struct Selection {
    root: PathBuf,
    extension: String,
    excludes: ExclusionProfile,
}

/// Select files under `root` ending in `.{extension}` that no pattern excludes.
pub fn select(root: &Path, extension: &str, excludes: ExclusionProfile) -> Selection {
    Selection {
        root: root.to_path_buf(),
        extension: extension.trim_start_matches('.').to_string(),
        excludes,
    }
}

impl Selection {
    /// Walk the tree lazily. Each call starts a fresh walk.
    pub fn iter(&self) -> impl Iterator<Item = FileTask> + '_ {
        let root = self.root.as_path();
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let mut dir = anchored(root, entry.path());
                dir.push('/');
                !self.excludes.is_excluded(&dir)
            })
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(move |entry| self.matches(root, entry))
            .map(move |entry| FileTask::new(root, entry.into_path()))
    }

    /// The first `limit` files (all files when `None`), in selection order.
    pub fn collect_limited(&self, limit: Option<usize>) -> Vec<FileTask> {
        match limit {
            Some(n) => self.iter().take(n).collect(),
            None => self.iter().collect(),
        }
    }

    fn matches(&self, root: &Path, entry: &DirEntry) -> bool {
        entry.file_type().is_file()
            && entry.path().extension() == Some(OsStr::new(&self.extension))
            && !self.excludes.is_excluded(&anchored(root, entry.path()))
    }
}

/// `/`-prefixed, `/`-separated path relative to `root`.
fn anchored(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in rel.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "fn main() {}").unwrap();
    }

    fn rels(tasks: &[FileTask]) -> Vec<String> {
        tasks
            .iter()
            .map(|t| t.relative.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn default_excludes_target_and_git() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "target/debug/build.rs");
        touch(dir.path(), ".git/hooks/x.rs");
        touch(dir.path(), "README.md");

        let sel = select(dir.path(), "rs", ExclusionProfile::default());
        assert_eq!(rels(&sel.collect_limited(None)), vec!["src/lib.rs"]);
    }

    #[test]
    fn test_profile_excludes_test_trees() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "tests/it.rs");
        touch(dir.path(), "benches/b.rs");
        touch(dir.path(), "examples/demo.rs");
        touch(dir.path(), "src/tests_util.rs");

        let sel = select(dir.path(), "rs", ExclusionProfile::default().with_tests());
        assert_eq!(
            rels(&sel.collect_limited(None)),
            vec!["src/lib.rs", "src/tests_util.rs"]
        );
    }

    #[test]
    fn no_returned_path_contains_a_pattern() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "a/gen/x.rs",
            "a/keep.rs",
            "b/generated_code.rs",
            "c/d/gen/e.rs",
            "z.rs",
        ] {
            touch(dir.path(), rel);
        }
        let profile = ExclusionProfile::new(["/gen/", "generated"]);
        let sel = select(dir.path(), "rs", profile.clone());
        let out = sel.collect_limited(None);
        assert_eq!(rels(&out), vec!["a/keep.rs", "z.rs"]);
        for t in &out {
            assert!(!profile.is_excluded(&anchored(dir.path(), &t.absolute)));
        }
    }

    #[test]
    fn order_is_deterministic_regardless_of_creation_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let files = ["src/z.rs", "src/a.rs", "lib.rs", "src/m/inner.rs", "a-b.rs"];
        for f in files {
            touch(a.path(), f);
        }
        for f in files.iter().rev() {
            touch(b.path(), f);
        }
        let ra = rels(&select(a.path(), "rs", ExclusionProfile::default()).collect_limited(None));
        let rb = rels(&select(b.path(), "rs", ExclusionProfile::default()).collect_limited(None));
        assert_eq!(ra, rb);
        assert_eq!(
            ra,
            vec!["a-b.rs", "lib.rs", "src/a.rs", "src/m/inner.rs", "src/z.rs"]
        );
    }

    #[test]
    fn limit_yields_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..7 {
            touch(dir.path(), &format!("src/f{i}.rs"));
        }
        let sel = select(dir.path(), "rs", ExclusionProfile::default());
        let all = sel.collect_limited(None);
        for n in [0, 1, 3, 7, 20] {
            let limited = sel.collect_limited(Some(n));
            assert_eq!(limited.len(), n.min(all.len()));
            assert_eq!(limited.as_slice(), &all[..limited.len()]);
        }
    }

    #[test]
    fn empty_root_yields_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let sel = select(dir.path(), "rs", ExclusionProfile::default());
        assert_eq!(sel.iter().count(), 0);
    }

    #[test]
    fn selection_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.rs");
        touch(dir.path(), "b.rs");
        let sel = select(dir.path(), ".rs", ExclusionProfile::default());
        let first: Vec<_> = sel.iter().collect();
        let second: Vec<_> = sel.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn root_location_does_not_exclude_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tests").join("project");
        touch(&root, "src/lib.rs");
        let sel = select(&root, "rs", ExclusionProfile::default().with_tests());
        assert_eq!(rels(&sel.collect_limited(None)), vec!["src/lib.rs"]);
    }

    #[test]
    fn profile_dedups_patterns() {
        let p = ExclusionProfile::default().with_patterns(["/target/", "/vendor/", ""]);
        assert_eq!(p.patterns(), &["/target/", "/.git/", "/vendor/"]);
    }
}
