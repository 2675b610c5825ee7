//! Threshold ladders that turn a continuous metric into a discrete label.

use serde::{Deserialize, Serialize};

use crate::error::{CovidStatsError, CovidStatsResult};

pub const UNCLASSIFIED: &str = "Unclassified";

/// An ascending ladder of half-open buckets `[previous upper, upper)`. A value equal to a
/// threshold falls into the higher bucket; values at or above the last threshold get `top`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    rungs: Vec<(f64, String)>,
    top: String,
}

impl Ladder {
    /// `rungs` are `(upper bound, label)` pairs and must have strictly ascending, finite bounds.
    pub fn try_new(rungs: Vec<(f64, String)>, top: impl Into<String>) -> CovidStatsResult<Self> {
        if let Some((bound, _)) = rungs.iter().find(|(bound, _)| !bound.is_finite()) {
            return Err(CovidStatsError::InvalidLadder(format!(
                "threshold {bound} is not finite"
            )));
        }
        if let Some(pair) = rungs.windows(2).find(|pair| pair[0].0 >= pair[1].0) {
            return Err(CovidStatsError::InvalidLadder(format!(
                "thresholds must be strictly ascending, found {} before {}",
                pair[0].0, pair[1].0
            )));
        }
        Ok(Self {
            rungs,
            top: top.into(),
        })
    }

    fn from_static(rungs: &[(f64, &str)], top: &str) -> Self {
        Self {
            rungs: rungs
                .iter()
                .map(|(bound, label)| (*bound, label.to_string()))
                .collect(),
            top: top.to_string(),
        }
    }

    /// Phase of the epidemic by cumulative case count.
    pub fn growth_phase() -> Self {
        Self::from_static(
            &[
                (100.0, "Initial"),
                (1_000.0, "Early"),
                (10_000.0, "Growing"),
                (100_000.0, "Accelerating"),
                (1_000_000.0, "Major"),
            ],
            "Severe",
        )
    }

    /// Phase of the vaccination campaign by percent of the population vaccinated.
    pub fn vaccination_phase() -> Self {
        Self::from_static(
            &[
                (10.0, "Initial Rollout"),
                (30.0, "Early Adoption"),
                (50.0, "Expanding Coverage"),
                (70.0, "Majority Coverage"),
            ],
            "High Coverage",
        )
    }

    /// Human development tier by human development index.
    pub fn development_level() -> Self {
        Self::from_static(
            &[(0.55, "Low"), (0.7, "Medium"), (0.8, "High")],
            "Very High",
        )
    }

    pub fn classify(&self, value: Option<f64>) -> &str {
        match value {
            Some(value) if !value.is_nan() => self
                .rungs
                .iter()
                .find(|(upper, _)| value < *upper)
                .map_or(self.top.as_str(), |(_, label)| label.as_str()),
            _ => UNCLASSIFIED,
        }
    }

    /// Labels from the lowest bucket to the highest, excluding [`UNCLASSIFIED`].
    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.rungs
            .iter()
            .map(|(_, label)| label.as_str())
            .chain(std::iter::once(self.top.as_str()))
    }

    /// Position of `label` in ladder order; unknown labels (including [`UNCLASSIFIED`]) sort last.
    pub fn position(&self, label: &str) -> usize {
        self.labels()
            .position(|l| l == label)
            .unwrap_or(self.rungs.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_values_belong_to_the_higher_bucket() {
        let ladder = Ladder::growth_phase();
        assert_eq!(ladder.classify(Some(99.0)), "Initial");
        assert_eq!(ladder.classify(Some(100.0)), "Early");
        assert_eq!(ladder.classify(Some(999.999)), "Early");
        assert_eq!(ladder.classify(Some(1_000_000.0)), "Severe");
        assert_eq!(ladder.classify(Some(-3.0)), "Initial");
    }

    #[test]
    fn null_is_unclassified_not_the_first_bucket() {
        let ladder = Ladder::vaccination_phase();
        assert_eq!(ladder.classify(None), UNCLASSIFIED);
        assert_eq!(ladder.classify(Some(f64::NAN)), UNCLASSIFIED);
        assert_eq!(ladder.classify(Some(0.0)), "Initial Rollout");
        assert_eq!(ladder.classify(Some(70.0)), "High Coverage");
    }

    #[test]
    fn development_levels() {
        let ladder = Ladder::development_level();
        assert_eq!(ladder.classify(Some(0.5)), "Low");
        assert_eq!(ladder.classify(Some(0.55)), "Medium");
        assert_eq!(ladder.classify(Some(0.79)), "High");
        assert_eq!(ladder.classify(Some(0.95)), "Very High");
        assert_eq!(ladder.position("Very High"), 3);
        assert_eq!(ladder.position(UNCLASSIFIED), 4);
    }

    #[test]
    fn built_in_ladders_are_valid() {
        for ladder in [
            Ladder::growth_phase(),
            Ladder::vaccination_phase(),
            Ladder::development_level(),
        ] {
            let rebuilt = Ladder::try_new(ladder.rungs.clone(), ladder.top.clone());
            assert_eq!(rebuilt.unwrap(), ladder);
        }
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let result = Ladder::try_new(vec![(10.0, "a".into()), (10.0, "b".into())], "c");
        assert!(matches!(result, Err(CovidStatsError::InvalidLadder(_))));
        let result = Ladder::try_new(vec![(f64::INFINITY, "a".into())], "b");
        assert!(matches!(result, Err(CovidStatsError::InvalidLadder(_))));
    }
}
