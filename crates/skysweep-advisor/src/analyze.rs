use std::collections::BTreeMap;

use aws_sdk_ec2::types::{InstanceType, LocationType};

use crate::cache::DiskCache;
use crate::dataset::{SpotAdvisorData, DEFAULT_ADVISOR_URL, UNKNOWN_BAND};
use crate::error::AdvisorError;
use crate::placement;
use crate::pricing;
use crate::scoring::confidence_score;
use crate::types::{AnalyzeFilters, DataQuality, QualityFlag, SpotAnalysis};

/// DescribeInstanceTypes caps at 100 types per call.
const SPEC_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct AdvisorOptions {
    /// Gate out candidates missing advisor or placement data.
    pub fail_fast: bool,
    pub price_history_days: u32,
    pub top_n: usize,
    pub advisor_url: String,
}

impl Default for AdvisorOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            price_history_days: 7,
            top_n: 20,
            advisor_url: DEFAULT_ADVISOR_URL.to_string(),
        }
    }
}

pub struct SpotAdvisor {
    client: aws_sdk_ec2::Client,
    cache: DiskCache,
    options: AdvisorOptions,
}

impl SpotAdvisor {
    pub fn new(client: aws_sdk_ec2::Client, cache: DiskCache, options: AdvisorOptions) -> Self {
        Self {
            client,
            cache,
            options,
        }
    }

    /// Rank spot candidates for a region.
    ///
    /// With `fail_fast` set, a region where every candidate lacks advisor or
    /// placement data yields an empty list; otherwise candidates come back
    /// flagged `degraded` and scored with what data there is.
    pub async fn analyze(
        &self,
        region: &str,
        filters: &AnalyzeFilters,
    ) -> Result<Vec<SpotAnalysis>, AdvisorError> {
        let offered = self.offered_types(filters).await?;
        if offered.is_empty() {
            return Err(AdvisorError::NoCandidates {
                region: region.to_string(),
            });
        }

        let specs = self.instance_specs(&offered).await?;
        let candidates: Vec<String> = specs
            .iter()
            .filter(|(_, (vcpus, memory_gb))| {
                *vcpus >= filters.vcpu_min
                    && *vcpus <= filters.vcpu_max
                    && *memory_gb >= filters.memory_min_gb
                    && *memory_gb <= filters.memory_max_gb
            })
            .map(|(name, _)| name.clone())
            .collect();
        if candidates.is_empty() {
            return Err(AdvisorError::NoCandidates {
                region: region.to_string(),
            });
        }
        tracing::info!(
            region,
            offered = offered.len(),
            candidates = candidates.len(),
            "spot candidates selected"
        );

        let advisor = SpotAdvisorData::load(&self.cache, &self.options.advisor_url)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "advisor dataset unavailable, bands unknown");
                SpotAdvisorData::default()
            });
        let placement = placement::placement_scores(
            &self.client,
            &self.cache,
            region,
            &candidates,
            filters.target_capacity_vcpu,
        )
        .await?;
        let prices = pricing::price_history(
            &self.client,
            &self.cache,
            region,
            &candidates,
            self.options.price_history_days,
        )
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "price history unavailable");
            BTreeMap::new()
        });

        let mut analyses = Vec::new();
        for instance_type in &candidates {
            let (vcpus, memory_gb) = specs[instance_type];
            let band = advisor.interruption_band(instance_type, region);
            let placement_score = placement.get(instance_type).copied();
            let price = prices.get(instance_type);

            let quality = DataQuality {
                advisor: if band == UNKNOWN_BAND {
                    QualityFlag::Missing
                } else {
                    QualityFlag::Ok
                },
                placement: if placement_score.is_some() {
                    QualityFlag::Ok
                } else {
                    QualityFlag::Missing
                },
                price: if price.is_some() {
                    QualityFlag::Ok
                } else {
                    QualityFlag::Missing
                },
            };

            if self.options.fail_fast && !quality.reliable() {
                tracing::debug!(instance_type, "gated out: missing advisor or placement data");
                continue;
            }

            let volatility = price.map(|p| p.best_az_vol_pct).unwrap_or(100.0);
            analyses.push(SpotAnalysis {
                instance_type: instance_type.clone(),
                current_price: price.map(|p| p.current_price).unwrap_or(0.0),
                avg_price: price.map(|p| p.avg_price).unwrap_or(0.0),
                volatility_pct: volatility,
                interruption_band: band,
                placement_score: placement_score.unwrap_or(0.0),
                confidence: confidence_score(band, placement_score.unwrap_or(0.0), volatility),
                vcpus,
                memory_gb,
                data_quality: quality,
                degraded: !quality.reliable(),
            });
        }

        rank(&mut analyses);
        analyses.truncate(self.options.top_n);
        Ok(analyses)
    }

    /// Instance types offered in the client's region, restricted to the
    /// workload's families.
    async fn offered_types(&self, filters: &AnalyzeFilters) -> Result<Vec<String>, AdvisorError> {
        let mut offered = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .describe_instance_type_offerings()
                .location_type(LocationType::Region);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| AdvisorError::Api(e.to_string()))?;

            for offering in response.instance_type_offerings() {
                if let Some(instance_type) = offering.instance_type() {
                    let name = instance_type.as_str().to_string();
                    if filters.workload.matches(&name) {
                        offered.push(name);
                    }
                }
            }

            next_token = response.next_token().map(String::from);
            if next_token.as_deref().is_none_or(str::is_empty) {
                break;
            }
        }
        offered.sort();
        offered.dedup();
        Ok(offered)
    }

    /// (vcpus, memory GiB) per type.
    async fn instance_specs(
        &self,
        instance_types: &[String],
    ) -> Result<BTreeMap<String, (i32, f64)>, AdvisorError> {
        let mut specs = BTreeMap::new();
        for batch in instance_types.chunks(SPEC_BATCH) {
            let response = self
                .client
                .describe_instance_types()
                .set_instance_types(Some(
                    batch.iter().map(|t| InstanceType::from(t.as_str())).collect(),
                ))
                .send()
                .await
                .map_err(|e| AdvisorError::Api(e.to_string()))?;

            for info in response.instance_types() {
                let Some(name) = info.instance_type().map(|t| t.as_str().to_string()) else {
                    continue;
                };
                let vcpus = info
                    .v_cpu_info()
                    .and_then(|v| v.default_v_cpus())
                    .unwrap_or(0);
                let memory_gb = info
                    .memory_info()
                    .and_then(|m| m.size_in_mib())
                    .map(|mib| mib as f64 / 1024.0)
                    .unwrap_or(0.0);
                specs.insert(name, (vcpus, memory_gb));
            }
        }
        Ok(specs)
    }
}

/// Sort by confidence descending; ties broken by price ascending, then by
/// name so the ordering is total.
pub fn rank(analyses: &mut [SpotAnalysis]) {
    analyses.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.avg_price.total_cmp(&b.avg_price))
            .then_with(|| a.instance_type.cmp(&b.instance_type))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(name: &str, confidence: f64, avg_price: f64) -> SpotAnalysis {
        SpotAnalysis {
            instance_type: name.to_string(),
            current_price: avg_price,
            avg_price,
            volatility_pct: 5.0,
            interruption_band: 0,
            placement_score: 8.0,
            confidence,
            vcpus: 4,
            memory_gb: 16.0,
            data_quality: DataQuality {
                advisor: QualityFlag::Ok,
                placement: QualityFlag::Ok,
                price: QualityFlag::Ok,
            },
            degraded: false,
        }
    }

    #[test]
    fn ranking_is_confidence_then_price() {
        let mut list = vec![
            analysis("c5.xlarge", 60.0, 0.07),
            analysis("m6i.xlarge", 78.0, 0.09),
            analysis("m5.xlarge", 92.0, 0.10),
        ];
        rank(&mut list);
        let names: Vec<&str> = list.iter().map(|a| a.instance_type.as_str()).collect();
        assert_eq!(names, ["m5.xlarge", "m6i.xlarge", "c5.xlarge"]);
    }

    #[test]
    fn equal_confidence_prefers_cheaper() {
        let mut list = vec![
            analysis("m6i.xlarge", 80.0, 0.12),
            analysis("m5.xlarge", 80.0, 0.09),
        ];
        rank(&mut list);
        assert_eq!(list[0].instance_type, "m5.xlarge");
    }
}
