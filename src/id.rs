//! Hierarchical task identifiers
//!
//! A [`TaskId`] is a dotted sequence of non-negative integers such as `1`,
//! `1.2` or `1.2.3`. The canonical string form zero-pads every segment to
//! two digits (`01.02.03`); file names add a `T` prefix (`T01.02.03`).
//! The empty identifier is the "no parent" sentinel.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Prefix used in file names and dependency references
pub const ID_PREFIX: char = 'T';

/// Ordered sequence of identifier segments.
///
/// Ordering compares segment by segment; a prefix sorts before its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    seg: Vec<u32>,
}

impl TaskId {
    /// Parse `"1"`, `"01.02"`, `"T1.2"` and friends.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix(ID_PREFIX)
            .or_else(|| trimmed.strip_prefix('t'))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(Error::invalid_id(input, "empty identifier"));
        }

        let mut seg = Vec::new();
        for part in body.split('.') {
            if part.is_empty() {
                return Err(Error::invalid_id(input, "empty segment"));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::invalid_id(
                    input,
                    format!("segment {part:?} is not a non-negative integer"),
                ));
            }
            let value = part.parse::<u32>().map_err(|err| {
                Error::invalid_id(input, format!("segment {part:?} out of range: {err}"))
            })?;
            seg.push(value);
        }
        Ok(Self { seg })
    }

    /// Parse a parent reference; blank input means "no parent".
    pub fn parse_optional(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::zero());
        }
        Self::parse(input)
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_segments(seg: impl Into<Vec<u32>>) -> Self {
        Self { seg: seg.into() }
    }

    pub fn segments(&self) -> &[u32] {
        &self.seg
    }

    pub fn is_zero(&self) -> bool {
        self.seg.is_empty()
    }

    /// True when the identifier names a subtask (two or more segments).
    pub fn has_sub_tasks(&self) -> bool {
        self.seg.len() > 1
    }

    /// File-name form with the `T` prefix.
    pub fn name(&self) -> String {
        format!("{ID_PREFIX}{self}")
    }

    /// Identifier with the last segment dropped, `None` for top-level ids.
    pub fn parent(&self) -> Option<TaskId> {
        if self.seg.len() < 2 {
            return None;
        }
        Some(Self {
            seg: self.seg[..self.seg.len() - 1].to_vec(),
        })
    }

    /// Parent implied by the identifier, or the zero id for top-level tasks.
    pub fn implied_parent(&self) -> TaskId {
        self.parent().unwrap_or_default()
    }

    pub fn next_sub_task_id(&self) -> TaskId {
        let mut seg = self.seg.clone();
        seg.push(1);
        Self { seg }
    }

    /// Same parent, last segment plus one. Fails when the segment is `u32::MAX`.
    pub fn next_sibling_id(&self) -> Result<TaskId> {
        let mut seg = self.seg.clone();
        match seg.last_mut() {
            Some(last) => {
                *last = last
                    .checked_add(1)
                    .ok_or_else(|| Error::invalid_id(self.to_string(), "last segment overflows"))?;
            }
            None => seg.push(1),
        }
        Ok(Self { seg })
    }

    /// True when `self` has `prefix` as its leading segments.
    pub fn starts_with(&self, prefix: &[u32]) -> bool {
        self.seg.starts_with(prefix)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.seg.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{value:02}")?;
        }
        Ok(())
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TaskIdVisitor;

        impl<'de> Visitor<'de> for TaskIdVisitor {
            type Value = TaskId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a dotted task id or a non-negative integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<TaskId, E> {
                TaskId::parse_optional(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<TaskId, E> {
                let value = u32::try_from(v).map_err(E::custom)?;
                Ok(TaskId::from_segments(vec![value]))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<TaskId, E> {
                let value = u32::try_from(v).map_err(E::custom)?;
                Ok(TaskId::from_segments(vec![value]))
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<TaskId, E> {
                Ok(TaskId::zero())
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<TaskId, E> {
                Ok(TaskId::zero())
            }
        }

        deserializer.deserialize_any(TaskIdVisitor)
    }
}
