//! File-backed task store
//!
//! Every task lives in `<tasks_dir>/T<id>-<slug>.md`. The directory is
//! re-scanned for every lookup and allocation; there is no index.
//!
//! # Directory Structure
//!
//! ```text
//! .backlog/
//!   T01-set_up_ci.md
//!   T01.01-add_lint_job.md
//!   T02-write_docs.md
//!   .backlog.lock          # allocator lock (file lock mode)
//!   archived/
//!     T03-old_idea.md
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, LockMode};
use crate::document;
use crate::error::{Error, Result};
use crate::fs::{OsFs, TaskFs};
use crate::id::TaskId;
use crate::lock::{FileLocker, LockGuard, Locker, ProcessLocker};
use crate::status::{Priority, Status};
use crate::task::{id_from_file_name, reindex_criteria, AcceptanceCriterion, StringList, Task};

/// Default name of the archive subdirectory
pub const ARCHIVE_DIR: &str = "archived";

/// Parameters for [`FileTaskStore::create`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: String,
    /// Parsed leniently; empty means unknown
    pub priority: String,
    /// Parent task id; `None` or blank creates a top-level task
    pub parent: Option<String>,
    pub assigned: Vec<String>,
    pub labels: Vec<String>,
    /// Ids of existing tasks this one depends on
    pub dependencies: Vec<String>,
    #[serde(rename = "ac")]
    pub acceptance_criteria: Vec<String>,
    pub plan: String,
    pub notes: String,
}

/// Parameters for [`FileTaskStore::update`]. `None`/empty fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditTaskParams {
    pub new_title: Option<String>,
    pub new_description: Option<String>,
    pub new_status: Option<String>,
    pub new_priority: Option<String>,
    /// Blank detaches the task to the top level
    pub new_parent: Option<String>,
    pub add_assigned: Vec<String>,
    pub remove_assigned: Vec<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    /// Replaces the whole dependency list
    pub new_dependencies: Option<Vec<String>>,
    pub new_notes: Option<String>,
    pub new_plan: Option<String>,
    pub add_ac: Vec<String>,
    /// 1-based indexes
    pub check_ac: Vec<usize>,
    pub uncheck_ac: Vec<usize>,
    pub remove_ac: Vec<usize>,
}

/// A parsed task together with the file it was read from.
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub path: PathBuf,
    pub task: Task,
}

/// Task repository over a [`TaskFs`], with a [`Locker`] guarding allocation.
#[derive(Clone)]
pub struct FileTaskStore {
    fs: Arc<dyn TaskFs>,
    tasks_dir: PathBuf,
    archive_dir: String,
    locker: Arc<dyn Locker>,
}

impl std::fmt::Debug for FileTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTaskStore")
            .field("tasks_dir", &self.tasks_dir)
            .field("archive_dir", &self.archive_dir)
            .finish_non_exhaustive()
    }
}

impl FileTaskStore {
    pub fn new(
        fs: Arc<dyn TaskFs>,
        tasks_dir: impl Into<PathBuf>,
        locker: Arc<dyn Locker>,
    ) -> Self {
        Self {
            fs,
            tasks_dir: tasks_dir.into(),
            archive_dir: ARCHIVE_DIR.to_string(),
            locker,
        }
    }

    /// OS-backed store for a project root, configured from `config`.
    pub fn open(root: &Path, config: &Config) -> Self {
        let locker: Arc<dyn Locker> = match config.lock.mode {
            LockMode::File => Arc::new(FileLocker::new(
                config.lock_path(root),
                config.lock.timeout_ms,
            )),
            LockMode::Process => Arc::new(ProcessLocker::with_timeout(config.lock.timeout_ms)),
        };
        Self::new(Arc::new(OsFs), config.tasks_dir(root), locker)
            .with_archive_dir(config.tasks.archive_dir.clone())
    }

    pub fn with_archive_dir(mut self, name: impl Into<String>) -> Self {
        self.archive_dir = name.into();
        self
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.tasks_dir.join(&self.archive_dir)
    }

    pub fn fs(&self) -> &Arc<dyn TaskFs> {
        &self.fs
    }

    /// Path the task is written to under its current id and title.
    pub fn path(&self, task: &Task) -> PathBuf {
        self.tasks_dir.join(task.file_name())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Next free id directly below `tree_path` (`&[]` for top level).
    ///
    /// Takes the max last segment among ids of length `tree_path.len() + 1`
    /// that start with `tree_path`; gaps are never reused.
    pub fn next_task_id(&self, tree_path: &[u32]) -> Result<TaskId> {
        let _guard = LockGuard::acquire(self.locker.as_ref())?;

        let entries = self.fs.read_dir(&self.tasks_dir)?;
        let max = entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| id_from_file_name(&entry.name))
            .filter(|id| id.segments().len() == tree_path.len() + 1 && id.starts_with(tree_path))
            .filter_map(|id| id.segments().last().copied())
            .max()
            .unwrap_or(0);

        let last = max.checked_add(1).ok_or_else(|| {
            let mut seg = tree_path.to_vec();
            seg.push(max);
            Error::invalid_id(
                TaskId::from_segments(seg).to_string(),
                "no free id after the highest segment",
            )
        })?;
        let mut seg = tree_path.to_vec();
        seg.push(last);
        let next = TaskId::from_segments(seg);
        debug!(next = %next, scanned = entries.len(), "allocated task id");
        Ok(next)
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Task files in the tasks directory with the id from their file name.
    pub fn task_files(&self) -> Result<Vec<(PathBuf, TaskId)>> {
        let entries = self.fs.read_dir(&self.tasks_dir)?;
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| {
                id_from_file_name(&entry.name).map(|id| (self.tasks_dir.join(&entry.name), id))
            })
            .collect())
    }

    /// Parse every task file; unparsable files are skipped with a warning.
    pub fn scan(&self) -> Result<Vec<StoredTask>> {
        let mut tasks = Vec::new();
        for (path, _) in self.task_files()? {
            match self.read_task(&path) {
                Ok(task) => tasks.push(StoredTask { path, task }),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable task file"),
            }
        }
        Ok(tasks)
    }

    pub fn read_task(&self, path: &Path) -> Result<Task> {
        let content = self.fs.read_to_string(path)?;
        document::parse(&content, path)
    }

    /// Render and write the task under its current file name.
    pub fn write_task(&self, task: &Task) -> Result<PathBuf> {
        self.fs.create_dir_all(&self.tasks_dir)?;
        let path = self.path(task);
        let content = document::render(task)?;
        self.fs.write(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Render and write the task to an existing path, keeping its file name.
    pub fn write_task_at(&self, task: &Task, path: &Path) -> Result<()> {
        let content = document::render(task)?;
        self.fs.write(path, content.as_bytes())?;
        Ok(())
    }

    /// Remove the file a task was stored under before a rename.
    ///
    /// Left alone when it is gone or declares a different id, so a duplicate
    /// sharing the name prefix is never deleted.
    fn remove_stale_file(&self, path: &Path, id: &TaskId) -> Result<()> {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        match document::parse(&content, path) {
            Ok(stored) if &stored.id == id => {}
            Ok(stored) => {
                warn!(path = %path.display(), id = %stored.id, "not removing file owned by another task");
                return Ok(());
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "not removing unreadable task file");
                return Ok(());
            }
        }
        match self.fs.remove(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn find_task_file(&self, id: &TaskId) -> Result<Option<PathBuf>> {
        let mut matches = self
            .task_files()?
            .into_iter()
            .filter(|(_, file_id)| file_id == id)
            .map(|(path, _)| path);
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            warn!(id = %id, "several files share this id, using the first");
        }
        Ok(first)
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<Task> {
        let task_id = TaskId::parse(id)?;
        let path = self
            .find_task_file(&task_id)?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        self.read_task(&path)
    }

    pub fn create(&self, params: CreateTaskParams) -> Result<Task> {
        if !self.fs.is_dir(&self.tasks_dir) {
            self.fs.create_dir_all(&self.tasks_dir)?;
        }

        let parent = match params.parent.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => self.existing_parent(raw)?,
            _ => TaskId::zero(),
        };
        let dependencies = self.existing_dependencies(&params.dependencies)?;
        let priority = Priority::parse(&params.priority)?;

        let id = self.next_task_id(parent.segments())?;
        let mut task = Task::new(id, params.title);
        task.description = params.description;
        task.parent = parent;
        task.assigned = StringList::from(params.assigned);
        task.labels = StringList::from(params.labels);
        task.dependencies = dependencies;
        task.priority = priority;
        task.status = Status::Todo;
        task.implementation_plan = params.plan;
        task.implementation_notes = params.notes;
        task.acceptance_criteria = params
            .acceptance_criteria
            .into_iter()
            .enumerate()
            .map(|(idx, text)| AcceptanceCriterion {
                text,
                checked: false,
                index: idx + 1,
            })
            .collect();

        let path = self.write_task(&task)?;
        info!(id = %task.id, path = %path.display(), "created task");
        Ok(task)
    }

    /// Apply `params` to `task`, write it, and drop the old file if the path changed.
    ///
    /// `task` is left untouched when an error is returned.
    pub fn update(&self, task: &mut Task, params: EditTaskParams) -> Result<()> {
        let old_path = self.path(task);
        let mut next = task.clone();

        if let Some(title) = params.new_title {
            if next.title != title {
                next.record_change(format!(
                    "Title changed from {:?} to {:?}",
                    next.title, title
                ));
                next.title = title;
            }
        }

        if let Some(description) = params.new_description {
            if next.description != description {
                next.record_change("Description changed");
                next.description = description;
            }
        }

        if let Some(raw) = params.new_status {
            let status = Status::parse(&raw)?;
            if next.status != status {
                next.record_change(format!(
                    "Status changed from {:?} to {:?}",
                    next.status.as_str(),
                    status.as_str()
                ));
                next.status = status;
            }
        }

        let before = next.assigned.0.clone();
        if next
            .assigned
            .apply_edits(&params.add_assigned, &params.remove_assigned)
        {
            next.record_change(format!(
                "Assigned changed from {:?} to {:?}",
                before, next.assigned.0
            ));
        }

        let before = next.labels.0.clone();
        if next
            .labels
            .apply_edits(&params.add_labels, &params.remove_labels)
        {
            next.record_change(format!(
                "Labels changed from {:?} to {:?}",
                before, next.labels.0
            ));
        }

        if let Some(raw) = params.new_priority {
            let priority = Priority::parse(&raw)?;
            if next.priority != priority {
                next.record_change(format!(
                    "Priority changed from {:?} to {:?}",
                    next.priority.as_str(),
                    priority.as_str()
                ));
                next.priority = priority;
            }
        }

        if let Some(raw) = params.new_parent {
            let parent = if raw.trim().is_empty() {
                TaskId::zero()
            } else {
                self.existing_parent(&raw)?
            };
            if parent != next.parent {
                if parent.starts_with(next.id.segments()) {
                    return Err(Error::InvalidArgument(format!(
                        "task {} cannot be moved under itself ({})",
                        next.id, parent
                    )));
                }
                next.record_change(format!(
                    "Parent changed from {:?} to {:?}",
                    next.parent.to_string(),
                    parent.to_string()
                ));
                next.id = self.next_task_id(parent.segments())?;
                next.parent = parent;
            }
        }

        if let Some(notes) = params.new_notes {
            if next.implementation_notes != notes {
                next.record_change("Implementation notes changed");
                next.implementation_notes = notes;
            }
        }

        if let Some(plan) = params.new_plan {
            if next.implementation_plan != plan {
                next.record_change("Implementation plan changed");
                next.implementation_plan = plan;
            }
        }

        if let Some(raw) = params.new_dependencies {
            let dependencies = self.existing_dependencies(&raw)?;
            let mut old_sorted = next.dependencies.0.clone();
            let mut new_sorted = dependencies.0.clone();
            old_sorted.sort();
            new_sorted.sort();
            if old_sorted != new_sorted {
                next.record_change(format!(
                    "Dependencies changed from {:?} to {:?}",
                    next.dependencies.0, dependencies.0
                ));
                next.dependencies = dependencies;
            }
        }

        apply_criteria_changes(
            &mut next,
            &params.remove_ac,
            &params.check_ac,
            &params.uncheck_ac,
            &params.add_ac,
        );

        next.touch();
        let new_path = self.write_task(&next)?;
        if new_path != old_path {
            self.remove_stale_file(&old_path, &task.id)?;
        }
        info!(id = %next.id, path = %new_path.display(), "updated task");
        *task = next;
        Ok(())
    }

    /// Mark the task archived and move its file under the archive directory.
    pub fn archive(&self, id: &str) -> Result<PathBuf> {
        let mut task = self.get(id)?;
        self.update(
            &mut task,
            EditTaskParams {
                new_status: Some(Status::Archived.as_str().to_string()),
                ..EditTaskParams::default()
            },
        )?;

        let archive_dir = self.archive_dir();
        self.fs.create_dir_all(&archive_dir)?;
        let from = self.path(&task);
        let to = archive_dir.join(task.file_name());
        self.fs.rename(&from, &to)?;
        info!(id = %task.id, path = %to.display(), "archived task");
        Ok(to)
    }

    fn existing_parent(&self, raw: &str) -> Result<TaskId> {
        let id = TaskId::parse(raw)?;
        match self.get(&id.to_string()) {
            Ok(_) => Ok(id),
            Err(err) if err.is_not_found() => Err(Error::ParentNotFound(raw.trim().to_string())),
            Err(err) => Err(err),
        }
    }

    /// Validate dependency ids and normalize them to the `T`-prefixed form.
    fn existing_dependencies(&self, raw: &[String]) -> Result<StringList> {
        let mut names = Vec::with_capacity(raw.len());
        for dep in raw {
            let id = TaskId::parse(dep)?;
            match self.get(&id.to_string()) {
                Ok(_) => names.push(id.name()),
                Err(err) if err.is_not_found() => {
                    return Err(Error::DependencyNotFound(dep.trim().to_string()))
                }
                Err(err) => return Err(err),
            }
        }
        Ok(StringList::from(names))
    }
}

/// Remove, check, uncheck, then add criteria, and renumber 1..n.
fn apply_criteria_changes(
    task: &mut Task,
    remove: &[usize],
    check: &[usize],
    uncheck: &[usize],
    add: &[String],
) {
    let mut remove = remove.to_vec();
    remove.sort_unstable_by(|a, b| b.cmp(a));
    remove.dedup();
    for index in remove {
        if let Some(pos) = task
            .acceptance_criteria
            .iter()
            .position(|ac| ac.index == index)
        {
            let removed = task.acceptance_criteria.remove(pos);
            task.record_change(format!(
                "Removed acceptance criterion #{}: {:?}",
                removed.index, removed.text
            ));
        }
    }

    for (indexes, checked, verb) in [(check, true, "Checked"), (uncheck, false, "Unchecked")] {
        for index in indexes {
            let mut changes = Vec::new();
            for ac in task
                .acceptance_criteria
                .iter_mut()
                .filter(|ac| ac.index == *index && ac.checked != checked)
            {
                ac.checked = checked;
                changes.push(format!(
                    "{verb} acceptance criterion #{}: {:?}",
                    ac.index, ac.text
                ));
            }
            for change in changes {
                task.record_change(change);
            }
        }
    }

    for text in add {
        let index = task
            .acceptance_criteria
            .iter()
            .map(|ac| ac.index)
            .max()
            .unwrap_or(0)
            + 1;
        task.record_change(format!("Added acceptance criterion #{index}: {text:?}"));
        task.acceptance_criteria.push(AcceptanceCriterion {
            text: text.clone(),
            checked: false,
            index,
        });
    }

    task.acceptance_criteria.sort_by_key(|ac| ac.index);
    reindex_criteria(&mut task.acceptance_criteria);
}
