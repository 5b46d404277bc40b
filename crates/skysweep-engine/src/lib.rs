//! skysweep-engine
//!
//! The cross-account orchestration core: credential resolution and
//! validation, task planning with dependency ordering, a bounded worker
//! pool with retries and cancellation, the durable session ledger, per-
//! service AWS workers, EKS kubectl drivers, the cloud-nuke prompt driver,
//! and ledger-replay rollback.
//!
//! Public API:
//! - [`credentials`]; build handles from config files, validate via STS
//! - [`planner::plan`] / [`planner::Intent`]; expand user intent into tasks
//! - [`orchestrator::run_session`]; drive a whole session
//! - [`rollback::rollback_session`]; replay a ledger in reverse
//! - [`ledger::SessionLedger`]; the append-only session record

pub mod authmap;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod graph;
pub mod kube;
pub mod ledger;
pub mod nuke;
pub mod orchestrator;
pub mod planner;
pub mod retry;
pub mod rollback;
pub mod sdk;
pub mod services;

pub use crate::error::{format_err_chain, EngineError};
pub use crate::graph::{DependencyGraph, StatusCounts};
pub use crate::ledger::SessionLedger;
pub use crate::orchestrator::{run_session, SessionOptions, SessionSummary};
pub use crate::planner::Intent;
pub use crate::rollback::{rollback_session, RollbackSummary};
