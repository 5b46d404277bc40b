use serde::{Deserialize, Serialize};

use crate::families::WorkloadClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Ok,
    Missing,
}

/// Which of the three data sources produced usable data for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    pub advisor: QualityFlag,
    pub placement: QualityFlag,
    pub price: QualityFlag,
}

impl DataQuality {
    /// Ranking is reliable only with both advisor and placement data.
    pub fn reliable(&self) -> bool {
        self.advisor == QualityFlag::Ok && self.placement == QualityFlag::Ok
    }
}

/// One ranked candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotAnalysis {
    pub instance_type: String,
    pub current_price: f64,
    pub avg_price: f64,
    pub volatility_pct: f64,
    /// 0..4 from the advisor dataset; 5 = unknown.
    pub interruption_band: u8,
    /// AWS native placement score, 0..10.
    pub placement_score: f64,
    /// Weighted score in [0, 100]; the ranking key.
    pub confidence: f64,
    pub vcpus: i32,
    pub memory_gb: f64,
    pub data_quality: DataQuality,
    /// Set when the candidate survived gating despite missing data.
    pub degraded: bool,
}

/// Candidate filters for [`crate::SpotAdvisor::analyze`].
#[derive(Debug, Clone)]
pub struct AnalyzeFilters {
    pub workload: WorkloadClass,
    pub vcpu_min: i32,
    pub vcpu_max: i32,
    pub memory_min_gb: f64,
    pub memory_max_gb: f64,
    /// Target capacity in vCPUs for placement scoring.
    pub target_capacity_vcpu: i32,
}

impl Default for AnalyzeFilters {
    fn default() -> Self {
        Self {
            workload: WorkloadClass::General,
            vcpu_min: 2,
            vcpu_max: 16,
            memory_min_gb: 4.0,
            memory_max_gb: 64.0,
            target_capacity_vcpu: 16,
        }
    }
}
