//! Cascading id changes into referencing tasks

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::id::{TaskId, ID_PREFIX};
use crate::store::{FileTaskStore, StoredTask};
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct ReferenceUpdater {
    store: FileTaskStore,
}

impl ReferenceUpdater {
    pub fn new(store: &FileTaskStore) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Rewrite parent and dependency references according to `changes`
    /// (old id to new id).
    ///
    /// Every affected task is computed before anything is written, and only
    /// tasks that actually changed are written back to the file they were
    /// read from. Returns the number of tasks written.
    pub fn update_references(&self, changes: &BTreeMap<TaskId, TaskId>) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut pending: Vec<StoredTask> = Vec::new();
        for mut stored in self.store.scan()? {
            if apply_changes(&mut stored.task, changes) {
                pending.push(stored);
            }
        }

        for stored in &pending {
            debug!(id = %stored.task.id, path = %stored.path.display(), "rewriting references");
            self.store.write_task_at(&stored.task, &stored.path)?;
        }
        info!(
            changed_ids = changes.len(),
            updated_tasks = pending.len(),
            "updated task references"
        );
        Ok(pending.len())
    }

    /// Tasks whose parent or dependencies name `id`.
    pub fn find_task_references(&self, id: &TaskId) -> Result<Vec<Task>> {
        Ok(self
            .store
            .scan()?
            .into_iter()
            .map(|stored| stored.task)
            .filter(|task| task.references(id))
            .collect())
    }
}

/// Returns true when the task was modified. One history entry covers the
/// parent and dependency rewrites together.
fn apply_changes(task: &mut Task, changes: &BTreeMap<TaskId, TaskId>) -> bool {
    let mut notes = Vec::new();

    if !task.parent.is_zero() {
        if let Some(new_parent) = changes.get(&task.parent) {
            notes.push(format!("parent {} -> {}", task.parent, new_parent));
            task.parent = new_parent.clone();
        }
    }

    for dep in task.dependencies.iter_mut() {
        let Ok(dep_id) = TaskId::parse(dep) else {
            continue;
        };
        let Some(new_id) = changes.get(&dep_id) else {
            continue;
        };
        let rewritten = rewrite_dependency(dep, new_id);
        notes.push(format!("dependency {} -> {}", dep, rewritten));
        *dep = rewritten;
    }

    if notes.is_empty() {
        return false;
    }
    task.record_change(format!(
        "References updated after renumbering: {}",
        notes.join(", ")
    ));
    task.touch();
    true
}

/// Keep the `T` prefix only when the original reference used one.
fn rewrite_dependency(original: &str, new_id: &TaskId) -> String {
    let trimmed = original.trim_start();
    if trimmed.starts_with(ID_PREFIX) || trimmed.starts_with(ID_PREFIX.to_ascii_lowercase()) {
        new_id.name()
    } else {
        new_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MemFs, TaskFs};
    use crate::lock::ProcessLocker;
    use std::path::Path;
    use std::sync::Arc;

    const DIR: &str = "/repo/.backlog";

    fn store_with(files: &[(&str, &str)]) -> FileTaskStore {
        let fs = MemFs::new();
        for (name, front) in files {
            let content = format!("---\n{front}created_at: 2024-01-01T10:00:00Z\n---\n");
            fs.write(&Path::new(DIR).join(name), content.as_bytes())
                .unwrap();
        }
        FileTaskStore::new(Arc::new(fs), DIR, Arc::new(ProcessLocker::new()))
    }

    fn id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    #[test]
    fn rewrites_parent_and_dependencies_once() {
        let store = store_with(&[
            ("T02-a.md", "id: \"02\"\ntitle: a\n"),
            (
                "T02.01-b.md",
                "id: \"02.01\"\ntitle: b\nparent: \"02\"\ndependencies: [T02, \"02\", T05, docs]\n",
            ),
            ("T05-c.md", "id: \"05\"\ntitle: c\n"),
        ]);
        let changes = BTreeMap::from([(id("02"), id("07"))]);
        let updated = ReferenceUpdater::new(&store)
            .update_references(&changes)
            .unwrap();
        assert_eq!(updated, 1);

        let task = store
            .read_task(&Path::new(DIR).join("T02.01-b.md"))
            .unwrap();
        assert_eq!(task.parent, id("07"));
        assert_eq!(task.dependencies.0, vec!["T07", "07", "T05", "docs"]);
        assert_eq!(task.history.len(), 1);
        assert!(task.updated_at.is_some());

        let untouched = store.read_task(&Path::new(DIR).join("T05-c.md")).unwrap();
        assert!(untouched.history.is_empty());
        assert!(untouched.updated_at.is_none());
    }

    #[test]
    fn finds_by_parsed_id() {
        let store = store_with(&[
            ("T01-a.md", "id: \"01\"\ntitle: a\n"),
            ("T01.01-b.md", "id: \"01.01\"\ntitle: b\nparent: \"1\"\n"),
            ("T03-c.md", "id: \"03\"\ntitle: c\ndependencies: T1\n"),
            ("T04-d.md", "id: \"04\"\ntitle: d\ndependencies: T10\n"),
        ]);
        let found = ReferenceUpdater::new(&store)
            .find_task_references(&id("01"))
            .unwrap();
        let ids: Vec<String> = found.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["01.01", "03"]);
    }

    #[test]
    fn empty_changes_touch_nothing() {
        let store = store_with(&[("T01-a.md", "id: \"01\"\ntitle: a\n")]);
        let updated = ReferenceUpdater::new(&store)
            .update_references(&BTreeMap::new())
            .unwrap();
        assert_eq!(updated, 0);
    }
}
