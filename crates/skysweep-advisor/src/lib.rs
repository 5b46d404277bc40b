//! skysweep-advisor
//!
//! Ranks EC2 instance types for spot usage by combining three data sources:
//!
//! - the Spot Instance Advisor dataset (historical interruption bands),
//! - spot placement scores (forward-looking capacity signal),
//! - spot price history (per-AZ volatility and average price).
//!
//! Each source is cached on disk with its own TTL. Types missing advisor or
//! placement data are gated out when `fail_fast` is set, otherwise returned
//! flagged as degraded. The confidence score weights interruption 45%,
//! placement 40%, and price volatility 15%.

pub mod analyze;
pub mod cache;
pub mod dataset;
pub mod error;
pub mod families;
pub mod placement;
pub mod pricing;
pub mod scoring;
pub mod types;

pub use crate::analyze::{AdvisorOptions, SpotAdvisor};
pub use crate::cache::DiskCache;
pub use crate::dataset::{SpotAdvisorData, UNKNOWN_BAND};
pub use crate::error::AdvisorError;
pub use crate::families::WorkloadClass;
pub use crate::pricing::{AzPriceSummary, PriceSummary};
pub use crate::scoring::confidence_score;
pub use crate::types::{AnalyzeFilters, DataQuality, QualityFlag, SpotAnalysis};
