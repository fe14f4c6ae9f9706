//! Configuration loading and management
//!
//! Handles parsing of `.backlog.toml` configuration files and the
//! `BACKLOG_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::resolve::ResolutionStrategy;

/// Name of the configuration file looked up in a project root
pub const CONFIG_FILE_NAME: &str = ".backlog.toml";

pub const ENV_FOLDER: &str = "BACKLOG_FOLDER";
pub const ENV_LOG_LEVEL: &str = "BACKLOG_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "BACKLOG_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "BACKLOG_LOG_FILE";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Task storage configuration
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Allocator lock configuration
    #[serde(default)]
    pub lock: LockConfig,

    /// Conflict repair configuration
    #[serde(default)]
    pub conflicts: ConflictsConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Task storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Tasks directory, relative to the project root
    #[serde(default = "default_tasks_dir")]
    pub dir: String,

    /// Subdirectory of the tasks directory that receives archived tasks
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

fn default_tasks_dir() -> String {
    ".backlog".to_string()
}

fn default_archive_dir() -> String {
    "archived".to_string()
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            dir: default_tasks_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Advisory lock file shared across processes
    File,
    /// In-process mutex only
    Process,
}

/// Allocator lock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_mode")]
    pub mode: LockMode,

    /// Lock file name inside the tasks directory
    #[serde(default = "default_lock_file")]
    pub file: String,

    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_lock_mode() -> LockMode {
    LockMode::File
}

fn default_lock_file() -> String {
    ".backlog.lock".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            mode: default_lock_mode(),
            file: default_lock_file(),
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Conflict repair configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// Strategy callers use when none is given explicitly
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_strategy() -> String {
    ResolutionStrategy::Chronological.as_str().to_string()
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
        }
    }
}

impl ConflictsConfig {
    pub fn strategy(&self) -> Result<ResolutionStrategy> {
        self.strategy.parse()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// debug|info|warn|error|off (short forms accepted)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// text|json
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path; empty logs to stderr
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: String::new(),
        }
    }
}

impl LogConfig {
    fn validate(&self) -> Result<()> {
        crate::logging::parse_level(&self.level)?;
        crate::logging::LogFormat::parse(&self.format)?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from a `.backlog.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project root, or return defaults
    pub fn load_from_dir(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `BACKLOG_*` overrides read through `lookup`.
    ///
    /// Blank values are ignored. The result is validated again.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = get(ENV_FOLDER) {
            self.tasks.dir = dir;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            self.log.format = format;
        }
        if let Some(file) = get(ENV_LOG_FILE) {
            self.log.file = file;
        }
        self.validate()
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Absolute tasks directory for a project root
    pub fn tasks_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.tasks.dir)
    }

    pub fn lock_path(&self, root: &Path) -> PathBuf {
        self.tasks_dir(root).join(&self.lock.file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasks.dir.trim().is_empty() {
            return Err(Error::InvalidConfig("tasks.dir cannot be empty".to_string()));
        }
        let archive = self.tasks.archive_dir.trim();
        if archive.is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.archive_dir cannot be empty".to_string(),
            ));
        }
        if archive.contains('/') || archive.contains('\\') || archive == ".." {
            return Err(Error::InvalidConfig(
                "tasks.archive_dir must be a single directory name".to_string(),
            ));
        }
        if self.lock.file.trim().is_empty() {
            return Err(Error::InvalidConfig("lock.file cannot be empty".to_string()));
        }
        if self.lock.timeout_ms == 0 {
            return Err(Error::InvalidConfig("lock.timeout_ms must be > 0".to_string()));
        }
        self.conflicts
            .strategy()
            .map_err(|err| Error::InvalidConfig(format!("conflicts.strategy: {err}")))?;
        self.log
            .validate()
            .map_err(|err| Error::InvalidConfig(format!("log: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.tasks.dir, ".backlog");
        assert_eq!(cfg.tasks.archive_dir, "archived");
        assert_eq!(cfg.lock.mode, LockMode::File);
        assert_eq!(cfg.lock.file, ".backlog.lock");
        assert_eq!(cfg.lock.timeout_ms, 5000);
        assert_eq!(cfg.conflicts.strategy, "chronological");
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, "text");
        assert!(cfg.log.file.is_empty());
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        let content = r#"
[tasks]
dir = "work/tasks"
archive_dir = "old"

[lock]
mode = "process"
timeout_ms = 250

[conflicts]
strategy = "auto"

[log]
level = "debug"
format = "json"
file = "backlog.log"
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.tasks.dir, "work/tasks");
        assert_eq!(cfg.tasks.archive_dir, "old");
        assert_eq!(cfg.lock.mode, LockMode::Process);
        assert_eq!(cfg.lock.file, ".backlog.lock");
        assert_eq!(cfg.lock.timeout_ms, 250);
        assert_eq!(
            cfg.conflicts.strategy().expect("strategy"),
            ResolutionStrategy::AutoRenumber
        );
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.format, "json");
        assert_eq!(cfg.log.file, "backlog.log");
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        for content in [
            "[conflicts]\nstrategy = \"random\"",
            "[lock]\ntimeout_ms = 0",
            "[log]\nformat = \"xml\"",
            "[tasks]\narchive_dir = \"a/b\"",
        ] {
            fs::write(&path, content).expect("write config");
            let err = Config::load(&path).expect_err(content);
            match err {
                Error::InvalidConfig(_) => {}
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            (ENV_FOLDER, "tasks"),
            (ENV_LOG_LEVEL, "w"),
            (ENV_LOG_FORMAT, "j"),
            (ENV_LOG_FILE, "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply env");
        assert_eq!(cfg.tasks.dir, "tasks");
        assert_eq!(cfg.log.level, "w");
        assert_eq!(cfg.log.format, "j");
        assert!(cfg.log.file.is_empty());
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = Config::default();
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("dir = \".backlog\""));
        assert_eq!(Config::load(&path).expect("reload"), cfg);
    }
}
