//! Task entity
//!
//! A task is keyed by a [`TaskId`] and persisted as one markdown file named
//! `T<id>-<slug>.md`. History is append-only; every semantic change made
//! through the store adds one [`HistoryEntry`].

use std::fmt;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::id::TaskId;
use crate::status::{Priority, Status};

/// Maximum slug length in file names
pub const MAX_SLUG_LEN: usize = 50;

/// Slug used when the title has no usable characters
pub const UNTITLED_SLUG: &str = "untitled_task";

/// Separator between the identifier and the slug in file names
pub const FILE_ID_SEPARATOR: char = '-';

pub const FILE_EXTENSION: &str = ".md";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "TaskId::is_zero")]
    pub parent: TaskId,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    pub assigned: StringList,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    pub labels: StringList,
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    pub dependencies: StringList,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,

    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub implementation_plan: String,
    #[serde(default)]
    pub implementation_notes: String,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            created_at: Utc::now(),
            ..Self::default()
        }
    }

    /// `T<id>-<slug>.md`
    pub fn file_name(&self) -> String {
        format!(
            "{}{}{}{}",
            self.id.name(),
            FILE_ID_SEPARATOR,
            slugify(&self.title),
            FILE_EXTENSION
        )
    }

    /// Append a history entry stamped with the current UTC time.
    pub fn record_change(&mut self, change: impl Into<String>) {
        self.history.push(HistoryEntry::now(change));
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Dependencies that parse as task identifiers.
    pub fn dependency_ids(&self) -> Vec<TaskId> {
        self.dependencies
            .iter()
            .filter_map(|dep| TaskId::parse(dep).ok())
            .collect()
    }

    /// True when the parent or any dependency names `target`.
    pub fn references(&self, target: &TaskId) -> bool {
        (!self.parent.is_zero() && &self.parent == target)
            || self.dependency_ids().iter().any(|dep| dep == target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub change: String,
}

impl HistoryEntry {
    pub fn now(change: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            change: change.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    pub checked: bool,
    /// 1-based position
    pub index: usize,
}

/// Renumber criteria 1..n in their current order.
pub fn reindex_criteria(criteria: &mut [AcceptanceCriterion]) {
    for (idx, ac) in criteria.iter_mut().enumerate() {
        ac.index = idx + 1;
    }
}

/// List of strings that accepts either a scalar or a sequence.
///
/// One element serializes back as a scalar, more as a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Remove every entry in `remove`, then append entries of `add` not yet present.
    /// Returns true when the list changed.
    pub fn apply_edits(&mut self, add: &[String], remove: &[String]) -> bool {
        let before = self.0.clone();
        self.0.retain(|item| !remove.iter().any(|r| r == item));
        for item in add {
            let item = item.trim();
            if item.is_empty() || self.0.iter().any(|existing| existing == item) {
                continue;
            }
            self.0.push(item.to_string());
        }
        before != self.0
    }
}

impl Deref for StringList {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StringList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<String>> for StringList {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

impl FromIterator<String> for StringList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for StringList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            items => items.serialize(serializer),
        }
    }
}

/// A list item read from its scalar text, so `[1, 2]` and `[03.10]` keep
/// their spelling instead of becoming numbers.
struct ScalarText(String);

struct ScalarTextVisitor;

impl<'de> Visitor<'de> for ScalarTextVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }
}

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_str(ScalarTextVisitor).map(ScalarText)
    }
}

struct StringListVisitor;

impl StringListVisitor {
    fn one(value: String) -> StringList {
        if value.is_empty() {
            StringList::default()
        } else {
            StringList(vec![value])
        }
    }
}

impl<'de> Visitor<'de> for StringListVisitor {
    type Value = StringList;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or a list of strings")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<StringList, E> {
        Ok(Self::one(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<StringList, E> {
        Ok(Self::one(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<StringList, E> {
        Ok(Self::one(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<StringList, E> {
        Ok(Self::one(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<StringList, E> {
        Ok(Self::one(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<StringList, E> {
        Ok(StringList::default())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<StringList, E> {
        Ok(StringList::default())
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<StringList, D::Error> {
        StringList::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<StringList, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(ScalarText(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(StringList(items))
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(StringListVisitor)
    }
}

/// Lowercase the title and collapse runs of characters outside
/// `[a-z0-9_.()[]]` into `_`.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let mut slug = String::with_capacity(lower.len());
    let mut in_run = false;
    for ch in lower.chars() {
        let keep = ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '(' | ')' | '[' | ']');
        if keep {
            slug.push(ch);
            in_run = false;
        } else if !in_run {
            slug.push('_');
            in_run = true;
        }
    }

    let mut slug = slug.trim_matches('_').to_string();
    // only ASCII remains, so byte truncation is safe
    slug.truncate(MAX_SLUG_LEN);
    if slug.is_empty() {
        return UNTITLED_SLUG.to_string();
    }
    slug
}

/// Identifier encoded in a task file name (`T01.02-some_title.md`).
///
/// Returns `None` for names that are not task files.
pub fn id_from_file_name(name: &str) -> Option<TaskId> {
    if !name.starts_with(crate::id::ID_PREFIX) || !name.ends_with(FILE_EXTENSION) {
        return None;
    }
    let (head, _) = name.split_once(FILE_ID_SEPARATOR)?;
    TaskId::parse(head).ok()
}
