#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use backlog::config::{Config, LockMode};
use backlog::store::FileTaskStore;
use tempfile::TempDir;

/// A project root on disk with a `.backlog` tasks directory.
pub struct TestBacklog {
    dir: TempDir,
    config: Config,
}

impl TestBacklog {
    pub fn new() -> Self {
        Self::with_lock_mode(LockMode::Process)
    }

    pub fn with_lock_mode(mode: LockMode) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut config = Config::default();
        config.lock.mode = mode;
        fs::create_dir_all(config.tasks_dir(dir.path())).expect("create tasks dir");
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.config.tasks_dir(self.dir.path())
    }

    pub fn store(&self) -> FileTaskStore {
        FileTaskStore::open(self.dir.path(), &self.config)
    }

    /// Write a raw task file. `front` is inserted between the `---` lines.
    pub fn write_task_file(&self, name: &str, front: &str) -> PathBuf {
        let path = self.tasks_dir().join(name);
        let content = format!("---\n{front}---\n\n## Description\n\nseeded\n");
        fs::write(&path, content).expect("write task file");
        path
    }

    /// Seed `T<id>-<slug>.md` with the slug as title.
    pub fn write_task(&self, id: &str, slug: &str, parent: &str, created_at: &str) -> PathBuf {
        self.write_task_file(
            &format!("T{id}-{slug}.md"),
            &format!(
                "id: \"{id}\"\ntitle: {slug}\nstatus: todo\nparent: \"{parent}\"\ncreated_at: {created_at}\n"
            ),
        )
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.tasks_dir())
            .expect("read tasks dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".md"))
            .collect();
        names.sort();
        names
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.tasks_dir().join(name)).expect("read task file")
    }
}
