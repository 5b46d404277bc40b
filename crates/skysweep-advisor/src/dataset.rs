use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DiskCache;
use crate::error::AdvisorError;

/// Band value reported when a type/region pair is absent from the dataset.
pub const UNKNOWN_BAND: u8 = 5;

pub const DEFAULT_ADVISOR_URL: &str =
    "https://spot-bid-advisor.s3.amazonaws.com/spot-advisor-data.json";

const CACHE_NAME: &str = "spot_advisor_dataset";
const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// The Spot Instance Advisor dataset: historical interruption bands per
/// (instance type, OS, region). Only the Linux bands are consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotAdvisorData {
    #[serde(default)]
    pub instance_types: BTreeMap<String, InstanceTypeRates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceTypeRates {
    #[serde(rename = "Linux", default)]
    pub linux: BTreeMap<String, RegionRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRate {
    /// Interruption band index: 0 (<5%) through 4 (>20%).
    #[serde(default = "unknown_rate")]
    pub r: u8,
}

fn unknown_rate() -> u8 {
    UNKNOWN_BAND
}

impl SpotAdvisorData {
    /// Band for a (type, region) pair; `UNKNOWN_BAND` when absent.
    pub fn interruption_band(&self, instance_type: &str, region: &str) -> u8 {
        self.instance_types
            .get(instance_type)
            .and_then(|it| it.linux.get(region))
            .map(|rate| rate.r.min(UNKNOWN_BAND))
            .unwrap_or(UNKNOWN_BAND)
    }

    /// Load the dataset, downloading at most once per 24 hours.
    ///
    /// The download runs on the blocking pool; a failure with a valid cache
    /// entry present is invisible to the caller, a failure without one is a
    /// `Download` error.
    pub async fn load(cache: &DiskCache, url: &str) -> Result<Self, AdvisorError> {
        if let Some(data) = cache.get::<SpotAdvisorData>(CACHE_NAME, CACHE_TTL) {
            tracing::debug!("spot advisor dataset served from cache");
            return Ok(data);
        }

        tracing::info!(url, "downloading spot advisor dataset");
        let url = url.to_string();
        let body = tokio::task::spawn_blocking(move || -> Result<String, AdvisorError> {
            let mut response = ureq::get(&url)
                .call()
                .map_err(|e| AdvisorError::Download(e.to_string()))?;
            // The advisor dataset is tens of megabytes; lift the default
            // body size limit.
            response
                .body_mut()
                .with_config()
                .limit(512 * 1024 * 1024)
                .read_to_string()
                .map_err(|e| AdvisorError::Download(e.to_string()))
        })
        .await
        .map_err(|e| AdvisorError::Download(e.to_string()))??;

        let data: SpotAdvisorData = serde_json::from_str(&body)?;
        cache.put(CACHE_NAME, &data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpotAdvisorData {
        serde_json::from_str(
            r#"{
                "instance_types": {
                    "m5.xlarge": {"Linux": {"ap-south-1": {"r": 0}, "us-east-1": {"r": 2}}},
                    "c5.xlarge": {"Linux": {"ap-south-1": {"r": 4}}}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn band_lookup_by_type_and_region() {
        let data = sample();
        assert_eq!(data.interruption_band("m5.xlarge", "ap-south-1"), 0);
        assert_eq!(data.interruption_band("m5.xlarge", "us-east-1"), 2);
        assert_eq!(data.interruption_band("c5.xlarge", "ap-south-1"), 4);
    }

    #[test]
    fn missing_type_or_region_is_unknown() {
        let data = sample();
        assert_eq!(data.interruption_band("r5.xlarge", "ap-south-1"), UNKNOWN_BAND);
        assert_eq!(data.interruption_band("m5.xlarge", "eu-west-1"), UNKNOWN_BAND);
    }
}
