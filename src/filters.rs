//! Ignore-pattern matching (§6): a gitignore-style matcher built from the
//! engine's configured `ignored_patterns` plus a `.syncignore` file at the
//! root of the synced tree.

use std::{
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

const DEFAULT_IGNORE_LINES: &[&str] = &[
    ".data/", // engine's own control directory (§4.3): never synced
    "**/*.conflict.*",
    "**/*.conflict",
    "**/*.rejected.*",
    "**/*.rejected",
    "*.sync.tmp.*", // atomic-write temp files
    "**/.*.tmp-*",  // download temp files, dot-prefixed
    "**/*.tmp-*",   // download temp files, no leading dot
    ".ipynb_checkpoints/",
    "__pycache__/",
    "*.py[cod]",
    ".vscode",
    ".idea",
    ".git",
    "*.tmp",
    "*.log",
    "logs/",
    ".DS_Store",
    "Thumbs.db",
];

#[derive(Clone)]
pub struct SyncIgnoreList {
    base_dir: PathBuf,
    ignore: Gitignore,
}

impl SyncIgnoreList {
    pub fn load(base_dir: &Path, extra_patterns: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(base_dir);
        for line in DEFAULT_IGNORE_LINES {
            builder
                .add_line(None, line)
                .with_context(|| format!("add default ignore line: {line}"))?;
        }
        for line in extra_patterns {
            builder
                .add_line(None, line)
                .with_context(|| format!("add configured ignore line: {line}"))?;
        }

        let ignore_path = base_dir.join(".syncignore");
        if ignore_path.exists() {
            let custom = read_ignore_file(&ignore_path)?;
            for line in custom {
                builder
                    .add_line(None, &line)
                    .with_context(|| format!("add .syncignore line: {line}"))?;
            }
        }

        let ignore = builder.build().context("build ignore matcher")?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            ignore,
        })
    }

    pub fn should_ignore_abs(&self, abs_path: &Path, is_dir: bool) -> bool {
        let rel = abs_path.strip_prefix(&self.base_dir).unwrap_or(abs_path);
        self.should_ignore_rel(rel, is_dir)
    }

    pub fn should_ignore_rel(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.ignore
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }
}

#[derive(Clone)]
pub struct SyncFilters {
    pub ignore: SyncIgnoreList,
}

impl SyncFilters {
    pub fn load(sync_path: &Path, ignored_patterns: &[String]) -> Result<Self> {
        fs::create_dir_all(sync_path)
            .with_context(|| format!("create sync dir {}", sync_path.display()))?;
        Ok(Self {
            ignore: SyncIgnoreList::load(sync_path, ignored_patterns)?,
        })
    }

    /// Equivalent to checking a relative path against conflict/reject
    /// markers so the watcher and merge layer don't chase their own tail
    /// re-syncing files they just wrote.
    pub fn is_marked_rel_path(rel: &str) -> bool {
        rel.contains(".conflict") || rel.contains(".rejected")
    }
}

fn read_ignore_file(path: &Path) -> Result<Vec<String>> {
    let file =
        fs::File::open(path).with_context(|| format!("open ignore file {}", path.display()))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.contains('\0') {
            continue;
        }
        out.push(trimmed.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, time::SystemTime};

    fn make_temp_dir(prefix: &str) -> PathBuf {
        let mut root = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        root.push(format!("{prefix}-{nanos}"));
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn default_ignore_hides_the_control_directory() {
        let root = make_temp_dir("twinsync-ignore-test");
        let ignore = SyncIgnoreList::load(&root, &[]).unwrap();
        assert!(ignore.should_ignore_rel(Path::new(".data/metadata.sqlite"), false));
        assert!(ignore.should_ignore_rel(Path::new(".data"), true));
    }

    #[test]
    fn configured_patterns_extend_the_default_set() {
        let root = make_temp_dir("twinsync-ignore-configured-test");
        let ignore =
            SyncIgnoreList::load(&root, &["*.secret".to_string()]).unwrap();
        assert!(ignore.should_ignore_rel(Path::new("notes/key.secret"), false));
        assert!(!ignore.should_ignore_rel(Path::new("notes/key.secretx"), false));
    }

    #[test]
    fn dot_syncignore_file_is_respected() {
        let root = make_temp_dir("twinsync-ignore-dotfile-test");
        fs::write(root.join(".syncignore"), "build/\n# comment\n*.bak\n").unwrap();
        let ignore = SyncIgnoreList::load(&root, &[]).unwrap();
        assert!(ignore.should_ignore_rel(Path::new("build/output.o"), false));
        assert!(ignore.should_ignore_rel(Path::new("notes.bak"), false));
    }

    #[test]
    fn regular_files_are_not_ignored() {
        let root = make_temp_dir("twinsync-regular-test");
        let ignore = SyncIgnoreList::load(&root, &[]).unwrap();
        assert!(!ignore.should_ignore_rel(Path::new("alice/notes.txt"), false));
    }

    #[test]
    fn temp_and_conflict_markers_are_caught() {
        let root = make_temp_dir("twinsync-temp-marker-test");
        let ignore = SyncIgnoreList::load(&root, &[]).unwrap();
        assert!(ignore.should_ignore_rel(Path::new("doc.conflict.txt"), false));
        assert!(ignore.should_ignore_rel(Path::new(".report.txt.tmp-8cd89f7b"), false));

        assert!(SyncFilters::is_marked_rel_path("doc.conflict.txt"));
        assert!(!SyncFilters::is_marked_rel_path("doc.txt"));
    }
}
