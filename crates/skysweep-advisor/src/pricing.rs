use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_ec2::primitives::DateTime;
use aws_sdk_ec2::types::InstanceType;
use serde::{Deserialize, Serialize};

use crate::cache::{stable_key, DiskCache};
use crate::error::AdvisorError;

const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Price statistics for one availability zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzPriceSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub volatility_pct: f64,
    pub sample_count: usize,
}

/// Region roll-up across AZs for one instance type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSummary {
    pub per_az: BTreeMap<String, AzPriceSummary>,
    pub best_az_vol_pct: f64,
    pub median_az_vol_pct: f64,
    pub avg_price: f64,
    /// Most recent sample across all AZs.
    pub current_price: f64,
}

/// Summarize one AZ's price series. An empty series reports 100% volatility
/// so it never looks attractive; a single sample reports 0%.
pub fn summarize(series: &[f64]) -> AzPriceSummary {
    match series {
        [] => AzPriceSummary {
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            volatility_pct: 100.0,
            sample_count: 0,
        },
        [p] => AzPriceSummary {
            avg: *p,
            min: *p,
            max: *p,
            volatility_pct: 0.0,
            sample_count: 1,
        },
        _ => {
            let avg = series.iter().sum::<f64>() / series.len() as f64;
            let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let volatility_pct = if avg > 0.0 {
                (max - min) / avg * 100.0
            } else {
                100.0
            };
            AzPriceSummary {
                avg,
                min,
                max,
                volatility_pct,
                sample_count: series.len(),
            }
        }
    }
}

/// Roll AZ summaries up to a region view.
pub fn roll_up(per_az: BTreeMap<String, AzPriceSummary>, current_price: f64) -> PriceSummary {
    let mut vols: Vec<f64> = per_az
        .values()
        .filter(|s| s.sample_count > 0)
        .map(|s| s.volatility_pct)
        .collect();
    vols.sort_by(|a, b| a.total_cmp(b));

    let best_az_vol_pct = vols.first().copied().unwrap_or(100.0);
    let median_az_vol_pct = if vols.is_empty() {
        100.0
    } else {
        vols[vols.len() / 2]
    };

    let az_avgs: Vec<f64> = per_az
        .values()
        .filter(|s| s.sample_count > 0)
        .map(|s| s.avg)
        .collect();
    let avg_price = if az_avgs.is_empty() {
        0.0
    } else {
        az_avgs.iter().sum::<f64>() / az_avgs.len() as f64
    };

    PriceSummary {
        per_az,
        best_az_vol_pct,
        median_az_vol_pct,
        avg_price,
        current_price,
    }
}

/// Paginated, AZ-aware spot price history for a set of types.
///
/// Results are cached for one hour keyed on (region, type set, window).
pub async fn price_history(
    client: &aws_sdk_ec2::Client,
    cache: &DiskCache,
    region: &str,
    instance_types: &[String],
    days: u32,
) -> Result<BTreeMap<String, PriceSummary>, AdvisorError> {
    let mut sorted_types = instance_types.to_vec();
    sorted_types.sort();
    let key_parts: Vec<&str> = std::iter::once(region)
        .chain(sorted_types.iter().map(String::as_str))
        .collect();
    let cache_name = format!(
        "price_history_{}_{}d",
        stable_key(&key_parts),
        days
    );

    if let Some(cached) = cache.get::<BTreeMap<String, PriceSummary>>(&cache_name, CACHE_TTL) {
        tracing::debug!(region, "price history served from cache");
        return Ok(cached);
    }

    let now = jiff::Timestamp::now();
    let start = now - jiff::SignedDuration::from_secs(days as i64 * 86_400);

    // it -> az -> price series, plus the latest (timestamp, price) per type
    let mut prices: BTreeMap<String, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
    let mut latest: BTreeMap<String, (i64, f64)> = BTreeMap::new();

    let mut next_token: Option<String> = None;
    loop {
        let mut request = client
            .describe_spot_price_history()
            .set_instance_types(Some(
                instance_types
                    .iter()
                    .map(|t| InstanceType::from(t.as_str()))
                    .collect(),
            ))
            .product_descriptions("Linux/UNIX")
            .start_time(DateTime::from_secs(start.as_second()))
            .end_time(DateTime::from_secs(now.as_second()));
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdvisorError::Api(e.to_string()))?;

        for record in response.spot_price_history() {
            let Some(instance_type) = record.instance_type().map(|t| t.as_str().to_string())
            else {
                continue;
            };
            let Some(price) = record.spot_price().and_then(|p| p.parse::<f64>().ok()) else {
                continue;
            };
            let az = record
                .availability_zone()
                .unwrap_or("unknown")
                .to_string();

            prices
                .entry(instance_type.clone())
                .or_default()
                .entry(az)
                .or_default()
                .push(price);

            let ts = record.timestamp().map(|t| t.secs()).unwrap_or(0);
            let entry = latest.entry(instance_type).or_insert((ts, price));
            if ts >= entry.0 {
                *entry = (ts, price);
            }
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }

    let mut summaries = BTreeMap::new();
    for (instance_type, az_map) in prices {
        let per_az: BTreeMap<String, AzPriceSummary> = az_map
            .into_iter()
            .map(|(az, series)| (az, summarize(&series)))
            .collect();
        let current = latest
            .get(&instance_type)
            .map(|(_, price)| *price)
            .unwrap_or(0.0);
        summaries.insert(instance_type, roll_up(per_az, current));
    }

    if !summaries.is_empty() {
        cache.put(&cache_name, &summaries)?;
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_is_maximally_volatile() {
        let s = summarize(&[]);
        assert_eq!(s.volatility_pct, 100.0);
        assert_eq!(s.sample_count, 0);
    }

    #[test]
    fn single_sample_is_stable() {
        let s = summarize(&[0.123]);
        assert_eq!(s.volatility_pct, 0.0);
        assert_eq!(s.avg, 0.123);
    }

    #[test]
    fn volatility_is_range_over_average() {
        let s = summarize(&[0.10, 0.20]);
        assert!((s.avg - 0.15).abs() < 1e-12);
        // (0.20 - 0.10) / 0.15 * 100
        assert!((s.volatility_pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn roll_up_picks_best_and_median_volatility() {
        let mut per_az = BTreeMap::new();
        per_az.insert("ap-south-1a".to_string(), summarize(&[0.10, 0.11]));
        per_az.insert("ap-south-1b".to_string(), summarize(&[0.10, 0.15]));
        per_az.insert("ap-south-1c".to_string(), summarize(&[0.10, 0.30]));

        let summary = roll_up(per_az, 0.11);
        assert!(summary.best_az_vol_pct < 10.0);
        assert!(summary.median_az_vol_pct > summary.best_az_vol_pct);
        assert_eq!(summary.current_price, 0.11);
        assert!(summary.avg_price > 0.0);
    }

    #[test]
    fn roll_up_of_nothing_is_pessimistic() {
        let summary = roll_up(BTreeMap::new(), 0.0);
        assert_eq!(summary.best_az_vol_pct, 100.0);
        assert_eq!(summary.median_az_vol_pct, 100.0);
        assert_eq!(summary.avg_price, 0.0);
    }
}
