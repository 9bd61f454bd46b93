//! Shelf Importer
//!
//! This crate imports music into a Shelf catalog.
//!
//! # Features
//!
//! - Album grouping while walking directories, including multi-disc sets
//! - Candidate lookup with weighted distances and recommendations
//! - Choices per task: apply, as-is, split into tracks or albums, skip
//! - Duplicate resolution (skip, keep both, remove, merge)
//! - File placement by path template (copy, move, links, reflinks)
//! - Resume after interruption and incremental re-runs
//! - Zip and tar archives, unpacked into temporary directories
//! - Concurrent pipeline with ordered commits
//!
//! # Architecture
//!
//! - `scanner`: Directory walking and album grouping
//! - `task`: Import tasks and field alignment
//! - `distance`, `ranker`: Candidate scoring
//! - `choice`: Choice sources
//! - `duplicates`: Duplicate detection and resolution
//! - `copy`, `path_template`: File placement
//! - `progress`: Resume and incremental state
//! - `pipeline`, `session`: Orchestration

mod error;
mod types;

// Core modules
pub mod choice;
pub mod copy;
pub mod distance;
pub mod duplicates;
pub mod events;
pub mod import_log;
pub mod metadata;
pub mod path_template;
pub mod pipeline;
pub mod progress;
pub mod ranker;
pub mod scanner;
pub mod session;
pub mod task;

pub use choice::{AutoChoices, Choice, ChoiceSource, ScriptedChoices};
pub use duplicates::{DuplicateKeys, Duplicates, Resolution};
pub use error::ImportError;
pub use events::{ImportEvent, ImportObserver};
pub use metadata::LoftyTagCodec;
pub use session::ImportSession;
pub use task::{Action, ImportTask, TaskState};
pub use types::*;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, ImportError>;
