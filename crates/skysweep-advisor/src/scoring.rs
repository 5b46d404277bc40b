//! Confidence scoring. Weights sum to 100: interruption 45, placement 40,
//! volatility 15. Volatility is bucketed rather than linear; spot prices
//! that never move and prices that wobble 3% are equally fine.

const WEIGHT_INTERRUPTION: f64 = 45.0;
const WEIGHT_PLACEMENT: f64 = 40.0;
const WEIGHT_VOLATILITY: f64 = 15.0;

/// Volatility bucket edges (percent) and the points each bucket earns.
const VOLATILITY_THRESHOLDS: [f64; 4] = [5.0, 10.0, 20.0, 30.0];
const VOLATILITY_POINTS: [f64; 5] = [15.0, 12.0, 9.0, 6.0, 3.0];

/// Interruption band → normalized score. Band 5 (unknown) earns nothing.
fn interruption_norm(band: u8) -> f64 {
    match band {
        0 => 1.0,
        1 => 0.8,
        2 => 0.6,
        3 => 0.4,
        4 => 0.2,
        _ => 0.0,
    }
}

fn volatility_points(volatility_pct: f64) -> f64 {
    let raw = if volatility_pct < VOLATILITY_THRESHOLDS[0] {
        VOLATILITY_POINTS[0]
    } else if volatility_pct < VOLATILITY_THRESHOLDS[1] {
        VOLATILITY_POINTS[1]
    } else if volatility_pct < VOLATILITY_THRESHOLDS[2] {
        VOLATILITY_POINTS[2]
    } else if volatility_pct < VOLATILITY_THRESHOLDS[3] {
        VOLATILITY_POINTS[3]
    } else {
        VOLATILITY_POINTS[4]
    };
    // Bucket points are on a 0..max scale; rescale to the volatility weight.
    raw / VOLATILITY_POINTS[0] * WEIGHT_VOLATILITY
}

/// Confidence in [0, 100] for one candidate.
///
/// `placement_score` is AWS's native 0..10 value; it is normalized here.
pub fn confidence_score(interruption_band: u8, placement_score: f64, volatility_pct: f64) -> f64 {
    let interruption = interruption_norm(interruption_band) * WEIGHT_INTERRUPTION;
    let placement = (placement_score / 10.0).clamp(0.0, 1.0) * WEIGHT_PLACEMENT;
    let volatility = volatility_points(volatility_pct);
    (interruption + placement + volatility).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_ranking_holds() {
        // Bands {0,1,2}, placement {8.0,7.5,6.0}, volatility {4%,8%,15%}.
        let m5 = confidence_score(0, 8.0, 4.0);
        let m6i = confidence_score(1, 7.5, 8.0);
        let c5 = confidence_score(2, 6.0, 15.0);
        assert!(m5 > m6i && m6i > c5, "expected m5 {m5} > m6i {m6i} > c5 {c5}");
        assert!((m5 - 92.0).abs() < 1e-9);
        assert!((m6i - 78.0).abs() < 1e-9);
        assert!((c5 - 60.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_band_earns_no_interruption_points() {
        let score = confidence_score(5, 0.0, 100.0);
        assert!((score - 3.0).abs() < 1e-9); // only the floor volatility bucket
    }

    #[test]
    fn perfect_candidate_caps_at_100() {
        assert!((confidence_score(0, 10.0, 0.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_bucket_edges_are_half_open() {
        // Exactly 5% falls into the second bucket.
        let below = confidence_score(0, 10.0, 4.999);
        let at = confidence_score(0, 10.0, 5.0);
        assert!(below > at);
    }

    #[test]
    fn placement_is_clamped() {
        assert_eq!(
            confidence_score(0, 12.0, 0.0),
            confidence_score(0, 10.0, 0.0)
        );
    }
}
