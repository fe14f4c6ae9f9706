//! Task status and priority vocabularies
//!
//! Both parse leniently: input is lowercased, spaces are removed, and the
//! closest vocabulary entry wins when its edit distance is below
//! [`MAX_FUZZY_DISTANCE`]. Ties go to the entry listed first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Strict upper bound on the edit distance accepted by lenient parsing
pub const MAX_FUZZY_DISTANCE: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
    Cancelled,
    Archived,
    Rejected,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Todo,
        Status::InProgress,
        Status::Done,
        Status::Cancelled,
        Status::Archived,
        Status::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Done => "done",
            Status::Cancelled => "cancelled",
            Status::Archived => "archived",
            Status::Rejected => "rejected",
        }
    }

    /// Lenient parse; empty input yields [`Status::Todo`].
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Status::Todo);
        }
        nearest(input, &Status::ALL, Status::as_str).ok_or_else(|| Error::InvalidEnum {
            field: "status",
            value: input.to_string(),
        })
    }
}

/// Ordered from least to most urgent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Unknown,
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Unknown => "unknown",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Lenient parse; empty input yields [`Priority::Unknown`].
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Priority::Unknown);
        }
        nearest(input, &Priority::ALL, Priority::as_str).ok_or_else(|| Error::InvalidEnum {
            field: "priority",
            value: input.to_string(),
        })
    }
}

fn nearest<T: Copy>(input: &str, vocab: &[T], label: fn(&T) -> &'static str) -> Option<T> {
    let normalized: String = input.to_lowercase().chars().filter(|c| *c != ' ').collect();
    if let Some(exact) = vocab.iter().find(|v| label(v) == normalized) {
        return Some(*exact);
    }

    let mut best: Option<(usize, T)> = None;
    for candidate in vocab {
        let distance = strsim::levenshtein(&normalized, label(candidate));
        if distance >= MAX_FUZZY_DISTANCE {
            continue;
        }
        match best {
            Some((current, _)) if current <= distance => {}
            _ => best = Some((distance, *candidate)),
        }
    }
    best.map(|(_, value)| value)
}

macro_rules! string_enum_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_enum_impls!(Status);
string_enum_impls!(Priority);
