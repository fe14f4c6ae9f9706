//! Human and JSON renderings of detection passes and resolution plans.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conflict::{summarize_conflicts, ConflictKind, IdConflict};
use crate::error::Result;
use crate::id::TaskId;
use crate::resolve::ResolutionPlan;

pub const SCHEMA_VERSION: &str = "backlog.conflicts.v1";

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    lines.push(output.header.clone());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictEntry {
    pub kind: ConflictKind,
    pub conflict_id: TaskId,
    pub files: Vec<PathBuf>,
    pub description: String,
}

impl From<&IdConflict> for ConflictEntry {
    fn from(conflict: &IdConflict) -> Self {
        Self {
            kind: conflict.kind,
            conflict_id: conflict.conflict_id.clone(),
            files: conflict.files.clone(),
            description: conflict.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictCounts {
    pub total: usize,
    pub duplicate_id: usize,
    pub orphaned_child: usize,
    pub invalid_hierarchy: usize,
}

/// Result of one detection pass, ready to print.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub generated_at: DateTime<Utc>,
    pub counts: ConflictCounts,
    pub conflicts: Vec<ConflictEntry>,
}

impl ConflictReport {
    pub fn new(conflicts: &[IdConflict]) -> Self {
        let summary = summarize_conflicts(conflicts);
        Self {
            generated_at: Utc::now(),
            counts: ConflictCounts {
                total: summary.total_conflicts,
                duplicate_id: summary.duplicate_ids,
                orphaned_child: summary.orphaned_children,
                invalid_hierarchy: summary.invalid_hierarchy,
            },
            conflicts: conflicts.iter().map(ConflictEntry::from).collect(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn human(&self) -> HumanOutput {
        if self.is_clean() {
            return HumanOutput::new("No task id conflicts found");
        }

        let mut out = HumanOutput::new(format!("Found {} task id conflicts", self.counts.total));
        out.push_summary("duplicate ids", self.counts.duplicate_id.to_string());
        out.push_summary("orphaned children", self.counts.orphaned_child.to_string());
        out.push_summary("invalid hierarchy", self.counts.invalid_hierarchy.to_string());
        for entry in &self.conflicts {
            out.push_detail(format!("[{}] {}", entry.kind, entry.description));
        }
        if self.counts.duplicate_id > 0 {
            out.push_next_step("resolve duplicates with the chronological strategy");
        }
        if self.counts.orphaned_child > 0 || self.counts.invalid_hierarchy > 0 {
            out.push_next_step("repair parent references with the auto-renumber strategy");
        }
        out
    }

    pub fn to_human(&self) -> String {
        format_human(&self.human())
    }

    pub fn to_json(&self) -> Result<String> {
        let human = self.human();

        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            status: &'static str,
            data: &'a ConflictReport,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            status: if self.is_clean() { "clean" } else { "conflicts" },
            data: self,
            next_steps: human.next_steps,
        };
        Ok(serde_json::to_string_pretty(&payload)?)
    }
}

/// Human rendering of a plan, optionally with execution messages.
pub fn plan_human(plan: &ResolutionPlan, results: &[String]) -> HumanOutput {
    let mut out = HumanOutput::new(plan.summary.clone());
    out.push_summary("strategy", plan.strategy.as_str());
    out.push_summary("actions", plan.actions.len().to_string());
    for action in &plan.actions {
        out.push_detail(action.description.clone());
    }
    for line in results {
        if let Some(manual) = line.strip_prefix("MANUAL: ") {
            out.push_warning(manual.to_string());
        }
    }
    out
}
