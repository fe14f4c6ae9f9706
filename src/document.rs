//! Task file codec
//!
//! A task file is YAML front matter between `---` lines followed by four
//! fixed markdown sections:
//!
//! ```text
//! ---
//! id: "01.02"
//! title: Fix login
//! status: todo
//! ...
//! ---
//! ## Description
//!
//! ## Acceptance Criteria
//! <!-- AC:BEGIN -->
//! - [ ] #1 first criterion
//! <!-- AC:END -->
//!
//! ## Implementation Plan
//!
//! ## Implementation Notes
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::id::TaskId;
use crate::status::{Priority, Status};
use crate::task::{AcceptanceCriterion, HistoryEntry, StringList, Task};

const FRONT_MATTER_DELIMITER: &str = "---";

pub const DESCRIPTION_HEADER: &str = "## Description";
pub const ACCEPTANCE_HEADER: &str = "## Acceptance Criteria";
pub const PLAN_HEADER: &str = "## Implementation Plan";
pub const NOTES_HEADER: &str = "## Implementation Notes";
pub const AC_BEGIN: &str = "<!-- AC:BEGIN -->";
pub const AC_END: &str = "<!-- AC:END -->";

const SECTION_HEADERS: [&str; 4] = [
    DESCRIPTION_HEADER,
    ACCEPTANCE_HEADER,
    PLAN_HEADER,
    NOTES_HEADER,
];

#[derive(Debug, Default, Serialize, Deserialize)]
struct FrontMatter {
    #[serde(default, deserialize_with = "id_scalar")]
    id: TaskId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: Status,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    assignee: StringList,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    labels: StringList,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    dependencies: StringList,
    #[serde(
        default,
        skip_serializing_if = "TaskId::is_zero",
        deserialize_with = "id_scalar"
    )]
    parent: TaskId,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<HistoryEntry>,
}

/// Read an id from its scalar text. Unquoted `3.10` would otherwise arrive
/// as the float 3.1.
fn id_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<TaskId, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => TaskId::parse_optional(&raw).map_err(de::Error::custom),
        None => Ok(TaskId::zero()),
    }
}

/// Render a task into its on-disk form.
pub fn render(task: &Task) -> Result<String> {
    let matter = FrontMatter {
        id: task.id.clone(),
        title: task.title.clone(),
        status: task.status,
        assignee: task.assigned.clone(),
        labels: task.labels.clone(),
        dependencies: task.dependencies.clone(),
        parent: task.parent.clone(),
        priority: task.priority,
        created_at: Some(task.created_at),
        updated_at: task.updated_at,
        history: task.history.clone(),
    };
    let yaml = serde_yaml::to_string(&matter)?;

    let mut out = String::new();
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');

    out.push_str(&format!("{DESCRIPTION_HEADER}\n\n{}\n\n", task.description));
    out.push_str(&format!("{ACCEPTANCE_HEADER}\n{AC_BEGIN}\n"));
    for ac in &task.acceptance_criteria {
        let mark = if ac.checked { 'x' } else { ' ' };
        out.push_str(&format!("- [{mark}] #{} {}\n", ac.index, ac.text));
    }
    out.push_str(&format!("{AC_END}\n\n"));
    out.push_str(&format!("{PLAN_HEADER}\n\n{}\n\n", task.implementation_plan));
    out.push_str(&format!("{NOTES_HEADER}\n\n{}\n", task.implementation_notes));
    Ok(out)
}

/// Parse a task file. `path` is only used in error messages.
pub fn parse(content: &str, path: &Path) -> Result<Task> {
    let (yaml, body) = split_front_matter(content).ok_or_else(|| Error::InvalidFrontMatter {
        path: path.to_path_buf(),
        reason: "missing --- delimited front matter".to_string(),
    })?;

    let matter: FrontMatter =
        serde_yaml::from_str(yaml).map_err(|err| Error::InvalidFrontMatter {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    if matter.id.is_zero() {
        return Err(Error::InvalidFrontMatter {
            path: path.to_path_buf(),
            reason: "missing id".to_string(),
        });
    }

    let mut task = Task {
        id: matter.id,
        title: matter.title,
        status: matter.status,
        parent: matter.parent,
        assigned: matter.assignee,
        labels: matter.labels,
        dependencies: matter.dependencies,
        priority: matter.priority,
        created_at: matter.created_at.unwrap_or_default(),
        updated_at: matter.updated_at,
        history: matter.history,
        ..Task::default()
    };

    task.description = section(body, DESCRIPTION_HEADER);
    task.implementation_plan = section(body, PLAN_HEADER);
    task.implementation_notes = section(body, NOTES_HEADER);
    task.acceptance_criteria = parse_criteria(&section(body, ACCEPTANCE_HEADER));
    Ok(task)
}

fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn section(body: &str, header: &str) -> String {
    let Some(pos) = SECTION_HEADERS.iter().position(|h| *h == header) else {
        return String::new();
    };
    let Some(start) = body.find(header) else {
        return String::new();
    };
    let from = start + header.len();
    let end = SECTION_HEADERS[pos + 1..]
        .iter()
        .filter_map(|next| body[from..].find(next).map(|at| from + at))
        .next()
        .unwrap_or(body.len());
    body[from..end].trim().to_string()
}

fn parse_criteria(content: &str) -> Vec<AcceptanceCriterion> {
    let mut criteria: Vec<AcceptanceCriterion> =
        content.lines().filter_map(parse_criterion).collect();
    criteria.sort_by_key(|ac| ac.index);
    criteria
}

/// `- [x] #3 text`
fn parse_criterion(line: &str) -> Option<AcceptanceCriterion> {
    let rest = line.trim_start().strip_prefix("- [")?;
    let checked = match rest.chars().next()? {
        'x' | 'X' => true,
        ' ' => false,
        _ => return None,
    };
    let rest = rest[1..].strip_prefix("] #")?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let index = rest[..digits].parse().ok()?;
    let text = rest[digits..].strip_prefix(' ').unwrap_or(&rest[digits..]);
    Some(AcceptanceCriterion {
        text: text.trim_end().to_string(),
        checked,
        index,
    })
}
