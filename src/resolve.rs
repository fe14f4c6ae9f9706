//! Conflict resolution plans
//!
//! A [`ResolutionPlan`] is a pure description of repair work built from a
//! list of conflicts. Building a plan never touches task files; executing it
//! is a separate step that can run as a dry run first. Plans serialize to
//! JSON so they can be reviewed and replayed later.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::conflict::{ConflictKind, IdConflict};
use crate::error::{Error, Result};
use crate::id::TaskId;
use crate::references::ReferenceUpdater;
use crate::store::FileTaskStore;
use crate::task::Task;

pub const DRY_RUN_NOTICE: &str = "DRY RUN MODE - No changes will be made";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Keep the oldest task of a duplicate group, renumber the rest
    Chronological,
    /// Renumber duplicates and repair parent references
    #[serde(alias = "auto")]
    AutoRenumber,
    /// Only report what needs a human
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Chronological => "chronological",
            ResolutionStrategy::AutoRenumber => "auto-renumber",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chronological" | "chrono" => Ok(ResolutionStrategy::Chronological),
            "auto" | "auto-renumber" | "auto_renumber" | "autorenumber" => {
                Ok(ResolutionStrategy::AutoRenumber)
            }
            "manual" => Ok(ResolutionStrategy::Manual),
            _ => Err(Error::UnsupportedStrategy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenumberReason {
    DuplicateIdChronological,
    DuplicateIdAuto,
}

impl RenumberReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenumberReason::DuplicateIdChronological => "duplicate_id_chronological",
            RenumberReason::DuplicateIdAuto => "duplicate_id_auto",
        }
    }
}

/// Action-specific data. The variant is the action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionMetadata {
    Renumber {
        reason: RenumberReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at: Option<DateTime<Utc>>,
        /// Task kept under the contested id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        older_task: Option<TaskId>,
    },
    UpdateParent {
        reason: ConflictKind,
        original_parent: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_parent: Option<TaskId>,
    },
    Manual {
        conflict_kind: ConflictKind,
        files: Vec<PathBuf>,
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Renumber,
    UpdateParent,
    Manual,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Renumber => "renumber",
            ActionKind::UpdateParent => "update_parent",
            ActionKind::Manual => "manual",
        }
    }
}

/// One step of a plan.
///
/// For `renumber`, `new_id` is the id the task moves to. For
/// `update_parent`, it is the new parent (zero removes the parent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub original_id: TaskId,
    #[serde(default, skip_serializing_if = "TaskId::is_zero")]
    pub new_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub description: String,
    pub metadata: ActionMetadata,
}

impl ResolutionAction {
    pub fn kind(&self) -> ActionKind {
        match self.metadata {
            ActionMetadata::Renumber { .. } => ActionKind::Renumber,
            ActionMetadata::UpdateParent { .. } => ActionKind::UpdateParent,
            ActionMetadata::Manual { .. } => ActionKind::Manual,
        }
    }

    fn required_path(&self) -> Result<&Path> {
        self.file_path.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} action for {} has no file path",
                self.kind().as_str(),
                self.original_id
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub strategy: ResolutionStrategy,
    pub actions: Vec<ResolutionAction>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl ResolutionPlan {
    fn new(strategy: ResolutionStrategy) -> Self {
        Self {
            strategy,
            actions: Vec::new(),
            summary: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

/// Builds and executes resolution plans against a store.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    store: FileTaskStore,
}

impl ConflictResolver {
    pub fn new(store: &FileTaskStore) -> Self {
        Self {
            store: store.clone(),
        }
    }

    pub fn create_resolution_plan(
        &self,
        conflicts: &[IdConflict],
        strategy: ResolutionStrategy,
    ) -> Result<ResolutionPlan> {
        let mut plan = ResolutionPlan::new(strategy);
        match strategy {
            ResolutionStrategy::Chronological => self.chronological(conflicts, &mut plan)?,
            ResolutionStrategy::AutoRenumber => self.auto_renumber(conflicts, &mut plan)?,
            ResolutionStrategy::Manual => manual(conflicts, &mut plan),
        }
        info!(strategy = %strategy, actions = plan.actions.len(), "built resolution plan");
        Ok(plan)
    }

    fn chronological(&self, conflicts: &[IdConflict], plan: &mut ResolutionPlan) -> Result<()> {
        let mut reserved = BTreeSet::new();
        for conflict in conflicts {
            if conflict.kind != ConflictKind::DuplicateId {
                continue;
            }
            let mut entries: Vec<(&Task, &PathBuf)> =
                conflict.tasks.iter().zip(conflict.files.iter()).collect();
            // stable: equal timestamps keep detection order
            entries.sort_by_key(|(task, _)| task.created_at);

            let Some(((oldest, _), rest)) = entries.split_first() else {
                continue;
            };
            for (task, path) in rest {
                let new_id = self.next_available_id(&task.id, &mut reserved)?;
                plan.actions.push(ResolutionAction {
                    original_id: task.id.clone(),
                    description: format!(
                        "Renumber task {} to {} (chronological resolution)",
                        task.id, new_id
                    ),
                    new_id,
                    file_path: Some((*path).clone()),
                    metadata: ActionMetadata::Renumber {
                        reason: RenumberReason::DuplicateIdChronological,
                        created_at: Some(task.created_at),
                        older_task: Some(oldest.id.clone()),
                    },
                });
            }
        }
        plan.summary = format!(
            "Chronological resolution: {} renumbering actions",
            plan.actions.len()
        );
        Ok(())
    }

    fn auto_renumber(&self, conflicts: &[IdConflict], plan: &mut ResolutionPlan) -> Result<()> {
        let mut reserved = BTreeSet::new();
        for conflict in conflicts {
            match conflict.kind {
                ConflictKind::DuplicateId => {
                    for (task, path) in conflict.tasks.iter().zip(conflict.files.iter()).skip(1) {
                        let new_id = self.next_available_id(&task.id, &mut reserved)?;
                        plan.actions.push(ResolutionAction {
                            original_id: task.id.clone(),
                            description: format!("Auto-renumber task {} to {}", task.id, new_id),
                            new_id,
                            file_path: Some(path.clone()),
                            metadata: ActionMetadata::Renumber {
                                reason: RenumberReason::DuplicateIdAuto,
                                created_at: None,
                                older_task: None,
                            },
                        });
                    }
                }
                ConflictKind::OrphanedChild => {
                    let original_parent = conflict
                        .tasks
                        .first()
                        .map(|task| task.parent.clone())
                        .unwrap_or_default();
                    plan.actions.push(ResolutionAction {
                        original_id: conflict.conflict_id.clone(),
                        new_id: TaskId::zero(),
                        file_path: conflict.files.first().cloned(),
                        description: format!(
                            "Remove invalid parent reference from task {}",
                            conflict.conflict_id
                        ),
                        metadata: ActionMetadata::UpdateParent {
                            reason: ConflictKind::OrphanedChild,
                            original_parent,
                            expected_parent: None,
                        },
                    });
                }
                ConflictKind::InvalidHierarchy => {
                    let Some(expected) = conflict.conflict_id.parent() else {
                        continue;
                    };
                    let original_parent = conflict
                        .tasks
                        .first()
                        .map(|task| task.parent.clone())
                        .unwrap_or_default();
                    plan.actions.push(ResolutionAction {
                        original_id: conflict.conflict_id.clone(),
                        new_id: expected.clone(),
                        file_path: conflict.files.first().cloned(),
                        description: format!(
                            "Fix parent reference for task {} to {}",
                            conflict.conflict_id, expected
                        ),
                        metadata: ActionMetadata::UpdateParent {
                            reason: ConflictKind::InvalidHierarchy,
                            original_parent,
                            expected_parent: Some(expected),
                        },
                    });
                }
            }
        }
        plan.summary = format!("Auto-resolution: {} actions", plan.actions.len());
        Ok(())
    }

    /// Free id next to `id`: under its parent for subtasks, else top level.
    ///
    /// Ids handed out earlier in the same plan are skipped.
    fn next_available_id(&self, id: &TaskId, reserved: &mut BTreeSet<TaskId>) -> Result<TaskId> {
        let tree_path = id.parent().map(|p| p.segments().to_vec()).unwrap_or_default();
        let mut candidate = self.store.next_task_id(&tree_path)?;
        while reserved.contains(&candidate) {
            candidate = candidate.next_sibling_id()?;
        }
        reserved.insert(candidate.clone());
        Ok(candidate)
    }

    /// Run every action in order. The first failure aborts the rest.
    ///
    /// Completed actions are not rolled back; their messages are carried in
    /// [`Error::ActionFailed`].
    pub fn execute_resolution_plan(&self, plan: &ResolutionPlan, dry_run: bool) -> Result<Vec<String>> {
        self.run(plan, dry_run).map(|(results, _)| results)
    }

    /// Like [`Self::execute_resolution_plan`], then cascade renumbered ids into
    /// every task that references them.
    pub fn execute_resolution_plan_with_references(
        &self,
        plan: &ResolutionPlan,
        dry_run: bool,
    ) -> Result<Vec<String>> {
        let (mut results, changes) = self.run(plan, dry_run)?;
        if dry_run || changes.is_empty() {
            return Ok(results);
        }

        let updater = ReferenceUpdater::new(&self.store);
        if let Err(err) = updater.update_references(&changes) {
            return Err(Error::ActionFailed {
                action: "update references".to_string(),
                completed: results,
                source: Box::new(err),
            });
        }
        results.push(format!("Updated references for {} changed IDs", changes.len()));
        Ok(results)
    }

    fn run(
        &self,
        plan: &ResolutionPlan,
        dry_run: bool,
    ) -> Result<(Vec<String>, BTreeMap<TaskId, TaskId>)> {
        let mut results = Vec::with_capacity(plan.actions.len() + 1);
        let mut changes = BTreeMap::new();
        if dry_run {
            results.push(DRY_RUN_NOTICE.to_string());
        }

        for action in &plan.actions {
            match self.execute_action(action, dry_run) {
                Ok(message) => {
                    info!(action = action.kind().as_str(), dry_run, "{message}");
                    results.push(message);
                }
                Err(err) => {
                    return Err(Error::ActionFailed {
                        action: action.description.clone(),
                        completed: results,
                        source: Box::new(err),
                    });
                }
            }
            if !dry_run && action.kind() == ActionKind::Renumber {
                changes.insert(action.original_id.clone(), action.new_id.clone());
            }
        }
        Ok((results, changes))
    }

    fn execute_action(&self, action: &ResolutionAction, dry_run: bool) -> Result<String> {
        match action.kind() {
            ActionKind::Renumber => self.renumber(action, dry_run),
            ActionKind::UpdateParent => self.update_parent(action, dry_run),
            ActionKind::Manual => Ok(format!("MANUAL: {}", action.description)),
        }
    }

    fn renumber(&self, action: &ResolutionAction, dry_run: bool) -> Result<String> {
        if dry_run {
            return Ok(format!(
                "WOULD RENUMBER: {} -> {}",
                action.original_id, action.new_id
            ));
        }
        if action.new_id.is_zero() {
            return Err(Error::InvalidArgument(format!(
                "renumber action for {} has no target id",
                action.original_id
            )));
        }

        let old_path = action.required_path()?;
        let mut task = self.store.read_task(old_path)?;
        let old_id = std::mem::replace(&mut task.id, action.new_id.clone());
        task.record_change(format!(
            "ID changed from {old_id} to {} during conflict resolution ({})",
            action.new_id,
            renumber_details(&action.metadata)
        ));
        task.touch();

        let new_path = self.store.write_task(&task)?;
        if new_path != old_path {
            self.store.fs().remove(old_path)?;
        }
        Ok(format!(
            "RENUMBERED: {} -> {} (file: {} -> {})",
            old_id,
            action.new_id,
            old_path.display(),
            new_path.display()
        ))
    }

    fn update_parent(&self, action: &ResolutionAction, dry_run: bool) -> Result<String> {
        if dry_run {
            if action.new_id.is_zero() {
                return Ok(format!("WOULD REMOVE PARENT: {}", action.original_id));
            }
            return Ok(format!(
                "WOULD UPDATE PARENT: {} -> {}",
                action.original_id, action.new_id
            ));
        }

        let path = action.required_path()?;
        let mut task = self.store.read_task(path)?;
        let old_parent = std::mem::replace(&mut task.parent, action.new_id.clone());
        task.record_change(format!(
            "Parent changed from {:?} to {:?} during conflict resolution",
            old_parent.to_string(),
            action.new_id.to_string()
        ));
        task.touch();
        self.store.write_task_at(&task, path)?;

        if action.new_id.is_zero() {
            return Ok(format!(
                "REMOVED PARENT: {} (was {})",
                action.original_id, old_parent
            ));
        }
        Ok(format!(
            "UPDATED PARENT: {} -> {}",
            old_parent, action.new_id
        ))
    }
}

/// `reason: ..., older_task: ..., created_at: ...` for a renumber history entry.
fn renumber_details(metadata: &ActionMetadata) -> String {
    let ActionMetadata::Renumber {
        reason,
        created_at,
        older_task,
    } = metadata
    else {
        return "reason: conflict resolution".to_string();
    };
    let mut parts = vec![format!("reason: {}", reason.as_str())];
    if let Some(older) = older_task {
        parts.push(format!("older_task: {older}"));
    }
    if let Some(created) = created_at {
        parts.push(format!("created_at: {}", created.to_rfc3339()));
    }
    parts.join(", ")
}

fn manual(conflicts: &[IdConflict], plan: &mut ResolutionPlan) {
    for conflict in conflicts {
        plan.actions.push(ResolutionAction {
            original_id: conflict.conflict_id.clone(),
            new_id: TaskId::zero(),
            file_path: None,
            description: format!(
                "Manual resolution required for {}: {}",
                conflict.kind, conflict.description
            ),
            metadata: ActionMetadata::Manual {
                conflict_kind: conflict.kind,
                files: conflict.files.clone(),
                description: conflict.description.clone(),
            },
        });
    }
    plan.summary = format!(
        "Manual resolution required for {} conflicts",
        plan.actions.len()
    );
}
