use crate::models::{Factor, PriorityMetrics, Tier};
use crate::weights::WeightSet;

/// Weighted sum over the six factors. Both sides are small integers, so the
/// result is exact and bounded by 150.
pub fn score(metrics: &PriorityMetrics, weights: &WeightSet) -> u32 {
    Factor::ALL
        .iter()
        .map(|factor| u32::from(metrics.get(*factor)) * u32::from(weights.get(*factor)))
        .sum()
}

pub fn score_and_tier(metrics: &PriorityMetrics, weights: &WeightSet) -> (u32, Tier) {
    let total = score(metrics, weights);
    (total, Tier::from_score(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(values: [u8; 6]) -> PriorityMetrics {
        let [severity, people_impact, urgency, location_criticality, wait_time, recurrence] =
            values;
        PriorityMetrics {
            severity,
            people_impact,
            urgency,
            location_criticality,
            wait_time,
            recurrence,
        }
    }

    #[test]
    fn worked_example_scores_71() {
        let weights = WeightSet::new(5, 3, 4, 2, 3, 1).unwrap();
        let (total, tier) = score_and_tier(&metrics([5, 3, 5, 1, 5, 0]), &weights);
        assert_eq!(total, 71);
        assert_eq!(tier, Tier::Critical);
    }

    #[test]
    fn bounds() {
        let max = WeightSet::new(5, 5, 5, 5, 5, 5).unwrap();
        assert_eq!(score(&metrics([5; 6]), &max), 150);
        assert_eq!(score(&metrics([0; 6]), &max), 0);
        let zero = WeightSet::new(0, 0, 0, 0, 0, 0).unwrap();
        assert_eq!(score(&metrics([5; 6]), &zero), 0);
    }

    #[test]
    fn raising_one_weight_never_lowers_score() {
        let sample = metrics([2, 4, 1, 3, 0, 5]);
        for (index, factor) in Factor::ALL.iter().enumerate() {
            let mut coefficients = [1i64; 6];
            let before = WeightSet::new(1, 1, 1, 1, 1, 1).unwrap();
            for bump in 2..=5 {
                coefficients[index] = bump;
                let [a, b, c, d, e, f] = coefficients;
                let after = WeightSet::new(a, b, c, d, e, f).unwrap();
                assert!(
                    score(&sample, &after) >= score(&sample, &before),
                    "raising {} lowered the score",
                    factor.as_str()
                );
            }
        }
    }
}
