//! skysweep-core
//!
//! Shared data model for the skysweep orchestration engine: credential
//! handles, tasks, resource references, ledger entry shapes, session ids,
//! selection-expression parsing, and AWS error classification.
//!
//! This crate holds no AWS clients and performs no I/O; it is the vocabulary
//! the engine, advisor, and reporter all speak.

pub mod classify;
pub mod error;
pub mod handle;
pub mod ledger;
pub mod resource;
pub mod selection;
pub mod session;
pub mod task;

pub use crate::classify::{classify_aws_error, ErrorDisposition};
pub use crate::error::CoreError;
pub use crate::handle::{CredentialHandle, CredentialKind};
pub use crate::ledger::{LedgerEntry, LedgerEvent, LedgerHeader};
pub use crate::resource::{ResourceRef, ResourceType};
pub use crate::selection::parse_selection;
pub use crate::session::SessionId;
pub use crate::task::{Task, TaskId, TaskKind, TaskOutcome, TaskPriority, TaskStatus};
