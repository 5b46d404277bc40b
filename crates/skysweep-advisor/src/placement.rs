use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_ec2::types::TargetCapacityUnitType;

use crate::cache::{stable_key, DiskCache};
use crate::error::AdvisorError;

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// The placement-score API rejects larger configurations.
const BATCH_SIZE: usize = 10;

/// Fetch spot placement scores for a set of instance types.
///
/// Calls are batched at most [`BATCH_SIZE`] types per request and always use
/// `TargetCapacityUnitType::Vcpu`. A type absent from the result map had no
/// score available; callers treat that as missing data, not zero.
///
/// Results are cached for 24 hours keyed on (region, type set, capacity).
pub async fn placement_scores(
    client: &aws_sdk_ec2::Client,
    cache: &DiskCache,
    region: &str,
    instance_types: &[String],
    target_capacity_vcpu: i32,
) -> Result<BTreeMap<String, f64>, AdvisorError> {
    let mut sorted_types = instance_types.to_vec();
    sorted_types.sort();
    let capacity = target_capacity_vcpu.to_string();
    let key_parts: Vec<&str> = std::iter::once(region)
        .chain(std::iter::once(capacity.as_str()))
        .chain(sorted_types.iter().map(String::as_str))
        .collect();
    let cache_name = format!("placement_scores_{}", stable_key(&key_parts));

    if let Some(cached) = cache.get::<BTreeMap<String, f64>>(&cache_name, CACHE_TTL) {
        tracing::debug!(region, "placement scores served from cache");
        return Ok(cached);
    }

    let mut scores = BTreeMap::new();
    for batch in instance_types.chunks(BATCH_SIZE) {
        let response = client
            .get_spot_placement_scores()
            .set_instance_types(Some(batch.to_vec()))
            .target_capacity(target_capacity_vcpu)
            .target_capacity_unit_type(TargetCapacityUnitType::Vcpu)
            .single_availability_zone(false)
            .region_names(region)
            .max_results(10)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(region, error = %e, "placement score batch failed");
                continue;
            }
        };

        // The API scores the batch as a whole per region; attribute the best
        // score to every type in the batch.
        let best = response
            .spot_placement_scores()
            .iter()
            .filter_map(|s| s.score())
            .max();
        if let Some(best) = best {
            for instance_type in batch {
                scores.insert(instance_type.clone(), best as f64);
            }
        }
    }

    if !scores.is_empty() {
        cache.put(&cache_name, &scores)?;
    }
    Ok(scores)
}
