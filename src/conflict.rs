//! Identifier conflict detection
//!
//! A single non-recursive scan of the tasks directory reports:
//! - duplicate ids: one id declared by several files
//! - orphaned children: a parent that no scanned task declares
//! - invalid hierarchy: a parent that differs from the one implied by the id
//!
//! The passes are independent, so one task can appear in several conflicts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::id::TaskId;
use crate::store::{FileTaskStore, StoredTask};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DuplicateId,
    OrphanedChild,
    InvalidHierarchy,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateId => "duplicate_id",
            ConflictKind::OrphanedChild => "orphaned_child",
            ConflictKind::InvalidHierarchy => "invalid_hierarchy",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected conflict. Produced fresh by every detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct IdConflict {
    pub kind: ConflictKind,
    pub conflict_id: TaskId,
    pub files: Vec<PathBuf>,
    /// Parallel to `files`
    pub tasks: Vec<Task>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

impl IdConflict {
    fn new(
        kind: ConflictKind,
        conflict_id: TaskId,
        entries: Vec<StoredTask>,
        description: String,
    ) -> Self {
        let (files, tasks): (Vec<PathBuf>, Vec<Task>) =
            entries.into_iter().map(|e| (e.path, e.task)).unzip();
        Self {
            kind,
            conflict_id,
            files,
            tasks,
            description,
            detected_at: Utc::now(),
        }
    }
}

fn display_files(files: &[PathBuf]) -> String {
    let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    format!("[{}]", names.join(", "))
}

/// Scans a store's tasks directory for id conflicts.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    store: FileTaskStore,
}

impl ConflictDetector {
    pub fn new(store: &FileTaskStore) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Duplicates first, then orphans, then invalid hierarchies.
    ///
    /// Duplicates follow the order in which their id first appears in the
    /// sorted directory listing. Unparsable files are ignored.
    pub fn detect_conflicts(&self) -> Result<Vec<IdConflict>> {
        let scanned = self.store.scan()?;

        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, Vec<StoredTask>> = HashMap::new();
        for entry in &scanned {
            let key = entry.task.id.to_string();
            let group = by_id.entry(key.clone()).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(entry.clone());
        }

        let mut conflicts = Vec::new();

        for key in &order {
            let Some(group) = by_id.get(key) else {
                continue;
            };
            if group.len() < 2 {
                continue;
            }
            let files: Vec<PathBuf> = group.iter().map(|e| e.path.clone()).collect();
            let description = format!(
                "Task ID {} appears in multiple files: {}",
                key,
                display_files(&files)
            );
            conflicts.push(IdConflict::new(
                ConflictKind::DuplicateId,
                group[0].task.id.clone(),
                group.clone(),
                description,
            ));
        }

        for entry in &scanned {
            let task = &entry.task;
            if task.parent.is_zero() || by_id.contains_key(&task.parent.to_string()) {
                continue;
            }
            let description = format!(
                "Task {} references non-existent parent {}",
                task.id, task.parent
            );
            conflicts.push(IdConflict::new(
                ConflictKind::OrphanedChild,
                task.id.clone(),
                vec![entry.clone()],
                description,
            ));
        }

        for entry in &scanned {
            let task = &entry.task;
            if task.parent.is_zero() {
                continue;
            }
            let Some(expected) = task.id.parent() else {
                continue;
            };
            if expected == task.parent {
                continue;
            }
            let description = format!(
                "Task {} has incorrect parent {}, expected {} based on ID structure",
                task.id, task.parent, expected
            );
            conflicts.push(IdConflict::new(
                ConflictKind::InvalidHierarchy,
                task.id.clone(),
                vec![entry.clone()],
                description,
            ));
        }

        debug!(
            scanned = scanned.len(),
            conflicts = conflicts.len(),
            "conflict detection finished"
        );
        Ok(conflicts)
    }
}

/// Per-kind totals of a detection pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictSummary {
    pub total_conflicts: usize,
    pub duplicate_ids: usize,
    pub orphaned_children: usize,
    pub invalid_hierarchy: usize,
    pub by_kind: BTreeMap<ConflictKind, Vec<IdConflict>>,
}

pub fn summarize_conflicts(conflicts: &[IdConflict]) -> ConflictSummary {
    let mut summary = ConflictSummary {
        total_conflicts: conflicts.len(),
        ..ConflictSummary::default()
    };
    for conflict in conflicts {
        match conflict.kind {
            ConflictKind::DuplicateId => summary.duplicate_ids += 1,
            ConflictKind::OrphanedChild => summary.orphaned_children += 1,
            ConflictKind::InvalidHierarchy => summary.invalid_hierarchy += 1,
        }
        summary
            .by_kind
            .entry(conflict.kind)
            .or_default()
            .push(conflict.clone());
    }
    summary
}

/// Canonical order: by kind, then by conflicting id.
pub fn sort_conflicts(conflicts: &mut [IdConflict]) {
    conflicts.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.conflict_id.cmp(&b.conflict_id))
    });
}
