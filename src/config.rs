//! Engine configuration (§6): a JSON file on disk, overridable by
//! environment variables, overridable again by CLI flags — a three-layer
//! precedence covering this crate's sync-path and watcher-cadence knobs.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwaitWriteFinish {
    pub poll_interval_ms: u64,
    pub stability_threshold_ms: u64,
}

impl Default for AwaitWriteFinish {
    fn default() -> Self {
        // Mirrors chokidar's awaitWriteFinish defaults (§6): wait for a
        // write to go quiet for a full second, polling every 200ms.
        AwaitWriteFinish {
            poll_interval_ms: 200,
            stability_threshold_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
struct PartialAwaitWriteFinish {
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    stability_threshold_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
struct PartialConfig {
    #[serde(default)]
    sync_path: Option<PathBuf>,
    #[serde(default)]
    ignored_patterns: Option<Vec<String>>,
    #[serde(default)]
    await_write_finish: Option<PartialAwaitWriteFinish>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    binary_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sync_path: PathBuf,
    pub ignored_patterns: Vec<String>,
    pub await_write_finish: AwaitWriteFinish,
    /// Fallback whole-tree polling cadence for filesystems where native
    /// events are unavailable (§6).
    pub poll_interval_ms: u64,
    /// Fallback polling cadence for large/binary files specifically.
    pub binary_poll_interval_ms: u64,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub sync_path: Option<PathBuf>,
    pub ignored_patterns: Option<Vec<String>>,
    pub poll_interval_ms: Option<u64>,
    pub binary_poll_interval_ms: Option<u64>,
}

pub fn default_log_file_path() -> PathBuf {
    home_dir().join(".twinsync").join("logs").join("twinsync.log")
}

impl EngineConfig {
    pub fn default_sync_path() -> PathBuf {
        home_dir().join("TwinSync")
    }

    pub fn default_poll_interval_ms() -> u64 {
        100
    }

    pub fn default_binary_poll_interval_ms() -> u64 {
        300
    }

    pub fn default_config_path() -> PathBuf {
        home_dir().join(".twinsync").join("config.json")
    }

    pub fn resolve_config_path(flag_path: Option<&Path>) -> PathBuf {
        if let Some(p) = flag_path {
            return absolutize_path(p);
        }

        if let Ok(env_path) = std::env::var("TWINSYNC_CONFIG_PATH") {
            let env_path = env_path.trim();
            if !env_path.is_empty() {
                return absolutize_path(Path::new(env_path));
            }
        }

        let candidates = [
            Self::default_config_path(),
            home_dir().join(".config").join("twinsync").join("config.json"),
        ];
        for p in candidates {
            if p.exists() {
                return absolutize_path(&p);
            }
        }

        absolutize_path(&Self::default_config_path())
    }

    pub fn load_with_overrides(path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let file_cfg = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str::<PartialConfig>(&data).context("parse config json")?
        } else {
            PartialConfig::default()
        };

        let env_cfg = read_env_config();

        let sync_path = overrides
            .sync_path
            .or(env_cfg.sync_path)
            .or(file_cfg.sync_path)
            .unwrap_or_else(Self::default_sync_path);
        let ignored_patterns = overrides
            .ignored_patterns
            .or(env_cfg.ignored_patterns)
            .or(file_cfg.ignored_patterns)
            .unwrap_or_default();
        let poll_interval_ms = overrides
            .poll_interval_ms
            .or(env_cfg.poll_interval_ms)
            .or(file_cfg.poll_interval_ms)
            .unwrap_or_else(Self::default_poll_interval_ms);
        let binary_poll_interval_ms = overrides
            .binary_poll_interval_ms
            .or(env_cfg.binary_poll_interval_ms)
            .or(file_cfg.binary_poll_interval_ms)
            .unwrap_or_else(Self::default_binary_poll_interval_ms);
        let await_write_finish = merge_await_write_finish(
            env_cfg.await_write_finish.or(file_cfg.await_write_finish),
        );

        let mut cfg = EngineConfig {
            sync_path,
            ignored_patterns,
            await_write_finish,
            poll_interval_ms,
            binary_poll_interval_ms,
            config_path: Some(path.to_path_buf()),
        };
        cfg.normalize();
        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            anyhow::bail!("config_path missing");
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let persisted = PersistedConfig {
            sync_path: &self.sync_path,
            ignored_patterns: &self.ignored_patterns,
            await_write_finish: &self.await_write_finish,
            poll_interval_ms: self.poll_interval_ms,
            binary_poll_interval_ms: self.binary_poll_interval_ms,
        };
        let data = serde_json::to_vec_pretty(&persisted).context("serialize config")?;
        std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    fn normalize(&mut self) {
        self.sync_path = absolutize_path(&self.sync_path);
        if let Some(p) = self.config_path.take() {
            self.config_path = Some(absolutize_path(&p));
        }
    }
}

fn merge_await_write_finish(partial: Option<PartialAwaitWriteFinish>) -> AwaitWriteFinish {
    let defaults = AwaitWriteFinish::default();
    match partial {
        Some(p) => AwaitWriteFinish {
            poll_interval_ms: p.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            stability_threshold_ms: p
                .stability_threshold_ms
                .unwrap_or(defaults.stability_threshold_ms),
        },
        None => defaults,
    }
}

#[derive(Debug, Serialize)]
struct PersistedConfig<'a> {
    sync_path: &'a PathBuf,
    ignored_patterns: &'a Vec<String>,
    await_write_finish: &'a AwaitWriteFinish,
    poll_interval_ms: u64,
    binary_poll_interval_ms: u64,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn absolutize_path(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let abs = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    };
    let cleaned = clean_lexical(&abs);
    // On macOS, /tmp is a symlink to /private/tmp. Canonicalize to resolve symlinks
    // so all path comparisons use consistent forms. Fall back to cleaned path if
    // canonicalization fails (e.g., path doesn't exist yet).
    std::fs::canonicalize(&cleaned).unwrap_or(cleaned)
}

fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(c)) if c == OsStr::new("~") => {
            let mut out = home_dir();
            for c in components {
                out.push(c.as_os_str());
            }
            out
        }
        _ => path.to_path_buf(),
    }
}

fn clean_lexical(path: &Path) -> PathBuf {
    // Similar to Go's filepath.Clean + Abs, but without requiring the path to exist.
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(&std::path::MAIN_SEPARATOR.to_string())),
            Component::CurDir => {}
            Component::ParentDir => {
                if !pop_normal_component(&mut out) && !out.as_os_str().is_empty() {
                    out.push("..");
                }
            }
            Component::Normal(p) => out.push(p),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

fn pop_normal_component(path: &mut PathBuf) -> bool {
    let mut comps = path.components().collect::<Vec<_>>();
    match comps.pop() {
        Some(Component::Normal(_)) => {
            *path = rebuild_components(&comps);
            true
        }
        Some(Component::Prefix(_)) | Some(Component::RootDir) | None => false,
        Some(Component::CurDir) => {
            *path = rebuild_components(&comps);
            false
        }
        Some(Component::ParentDir) => {
            *path = rebuild_components(&comps);
            false
        }
    }
}

fn rebuild_components(components: &[Component<'_>]) -> PathBuf {
    let mut out = PathBuf::new();
    for c in components {
        match c {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(&std::path::MAIN_SEPARATOR.to_string())),
            Component::CurDir => {}
            Component::ParentDir => out.push(".."),
            Component::Normal(p) => out.push(p),
        }
    }
    out
}

fn read_env_config() -> PartialConfig {
    let mut out = PartialConfig::default();
    if let Ok(v) = std::env::var("TWINSYNC_SYNC_PATH") {
        let v = v.trim();
        if !v.is_empty() {
            out.sync_path = Some(PathBuf::from(v));
        }
    }
    if let Ok(v) = std::env::var("TWINSYNC_IGNORED_PATTERNS") {
        let patterns: Vec<String> = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !patterns.is_empty() {
            out.ignored_patterns = Some(patterns);
        }
    }
    if let Ok(v) = std::env::var("TWINSYNC_POLL_INTERVAL_MS") {
        if let Ok(n) = v.trim().parse() {
            out.poll_interval_ms = Some(n);
        }
    }
    if let Ok(v) = std::env::var("TWINSYNC_BINARY_POLL_INTERVAL_MS") {
        if let Ok(n) = v.trim().parse() {
            out.binary_poll_interval_ms = Some(n);
        }
    }
    out
}
