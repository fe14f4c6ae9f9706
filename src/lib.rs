//! backlog - file-backed task store with hierarchical ids
//!
//! Every task is one markdown file with YAML front matter, named
//! `T<id>-<slug>.md`. Ids are dotted segment lists (`03.01.02`); a task's
//! parent is the id with the last segment dropped.
//!
//! # Core Concepts
//!
//! - **Allocation**: new ids come from a locked directory scan, so concurrent
//!   creators never receive the same id
//! - **Conflicts**: merged branches can leave duplicate ids, missing parents
//!   or parents that disagree with the id structure
//! - **Resolution**: conflicts turn into a reviewable plan that can be dry-run,
//!   executed, and cascaded into referencing tasks
//!
//! # Module Organization
//!
//! - `id`: task identifiers
//! - `task`, `status`, `document`: the task model and its file format
//! - `store`: create, read, update and archive tasks on a [`fs::TaskFs`]
//! - `lock`: in-process and cross-process allocation locks
//! - `conflict`: conflict detection
//! - `resolve`: resolution plans and their execution
//! - `references`: rewriting parent and dependency references
//! - `report`: human and JSON output for detection passes
//! - `config`, `logging`, `error`: ambient plumbing

pub mod config;
pub mod conflict;
pub mod document;
pub mod error;
pub mod fs;
pub mod id;
pub mod lock;
pub mod logging;
pub mod references;
pub mod report;
pub mod resolve;
pub mod status;
pub mod store;
pub mod task;

pub use error::{Error, Result};
