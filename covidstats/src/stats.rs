//! Null-aware aggregate states.
//!
//! Inputs are `Option<f64>`; `None` is skipped and never counted, so it changes the denominator
//! of `Mean` and the result of `Count`. An aggregate over no non-NULL input is `None`, except for
//! `Count`, which is zero.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    /// Sample standard deviation (`n - 1` denominator), NULL for fewer than two inputs.
    StddevSamp,
    /// Population standard deviation (`n` denominator).
    StddevPop,
}

impl Aggregate {
    /// Evaluates the aggregate over `values`, skipping NULLs.
    pub fn evaluate<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let values = values.into_iter().flatten();
        match self {
            Aggregate::Sum => values.fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v)),
            Aggregate::Mean => {
                let mut state = VarianceState::default();
                values.for_each(|v| state.update(v));
                state.mean()
            }
            Aggregate::Min => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |acc| acc.min(v)))
            }),
            Aggregate::Max => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |acc| acc.max(v)))
            }),
            Aggregate::Count => Some(values.count() as f64),
            Aggregate::StddevSamp => {
                let mut state = VarianceState::default();
                values.for_each(|v| state.update(v));
                state.stddev_samp()
            }
            Aggregate::StddevPop => {
                let mut state = VarianceState::default();
                values.for_each(|v| state.update(v));
                state.stddev_pop()
            }
        }
    }
}

/// Welford's online mean and variance.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarianceState {
    pub count: i64,
    pub mean: f64,
    pub m2: f64,
}

impl VarianceState {
    pub fn update(&mut self, input: f64) {
        self.count += 1;
        let delta = input - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = input - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn variance_pop(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            count => Some(self.m2 / count as f64),
        }
    }

    pub fn stddev_pop(&self) -> Option<f64> {
        self.variance_pop().map(f64::sqrt)
    }

    pub fn stddev_samp(&self) -> Option<f64> {
        match self.count {
            0 | 1 => None,
            count => Some(f64::sqrt(self.m2 / (count - 1) as f64)),
        }
    }
}

/// Online population covariance.
#[derive(Debug, Default, Clone, Copy)]
pub struct CovarState {
    pub count: i64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub co_moment: f64,
}

impl CovarState {
    pub fn update(&mut self, x: f64, y: f64) {
        self.count += 1;
        let n = self.count as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        self.mean_y += (y - self.mean_y) / n;
        self.co_moment += dx * (y - self.mean_y);
    }

    pub fn covar_pop(&self) -> Option<f64> {
        (self.count > 0).then(|| self.co_moment / self.count as f64)
    }
}

/// Pearson correlation over pairs where both sides are non-NULL.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationState {
    covar: CovarState,
    stddev_x: VarianceState,
    stddev_y: VarianceState,
}

impl CorrelationState {
    /// Pairs with a NULL on either side are skipped.
    pub fn update(&mut self, x: Option<f64>, y: Option<f64>) {
        if let (Some(x), Some(y)) = (x, y) {
            self.covar.update(x, y);
            self.stddev_x.update(x);
            self.stddev_y.update(y);
        }
    }

    /// Number of complete pairs seen.
    pub fn count(&self) -> i64 {
        self.covar.count
    }

    /// `None` for fewer than two pairs or when either side has zero variance.
    pub fn finalize(&self) -> Option<f64> {
        if self.count() < 2 {
            return None;
        }
        let cov = self.covar.covar_pop()?;
        let div = self.stddev_x.stddev_pop()? * self.stddev_y.stddev_pop()?;
        if div == 0.0 {
            return None;
        }
        Some(cov / div)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn nulls_are_excluded_from_mean_and_count() {
        let values = [Some(2.0), None, Some(4.0), None];
        assert!(approx(Aggregate::Mean.evaluate(values), 3.0));
        assert_eq!(Aggregate::Count.evaluate(values), Some(2.0));
        assert_eq!(Aggregate::Sum.evaluate(values), Some(6.0));
        assert_eq!(Aggregate::Min.evaluate(values), Some(2.0));
        assert_eq!(Aggregate::Max.evaluate(values), Some(4.0));
    }

    #[test]
    fn all_null_input_is_null_except_count() {
        let values = [None, None];
        assert_eq!(Aggregate::Sum.evaluate(values), None);
        assert_eq!(Aggregate::Mean.evaluate(values), None);
        assert_eq!(Aggregate::Max.evaluate(values), None);
        assert_eq!(Aggregate::StddevSamp.evaluate(values), None);
        assert_eq!(Aggregate::Count.evaluate(values), Some(0.0));
    }

    #[test]
    fn sample_and_population_stddev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].map(Some);
        assert!(approx(Aggregate::StddevPop.evaluate(values), 2.0));
        assert!(approx(
            Aggregate::StddevSamp.evaluate(values),
            (32.0f64 / 7.0).sqrt()
        ));
        assert_eq!(Aggregate::StddevSamp.evaluate([Some(1.0)]), None);
        assert_eq!(Aggregate::StddevPop.evaluate([Some(1.0)]), Some(0.0));
    }

    #[test]
    fn correlation_of_linear_series() {
        let mut state = CorrelationState::default();
        for (x, y) in [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0), (4.0, 8.0)] {
            state.update(Some(x), Some(y));
        }
        state.update(Some(5.0), None);
        assert_eq!(state.count(), 4);
        assert!(approx(state.finalize(), 1.0));

        let mut inverse = CorrelationState::default();
        for (x, y) in [(1.0, 3.0), (2.0, 2.0), (3.0, 1.0)] {
            inverse.update(Some(x), Some(y));
        }
        assert!(approx(inverse.finalize(), -1.0));
    }

    #[test]
    fn correlation_state_single_input() {
        let mut state = CorrelationState::default();
        state.update(Some(1.0), Some(1.0));
        assert_eq!(state.finalize(), None);
    }

    #[test]
    fn correlation_with_constant_side_is_null() {
        let mut state = CorrelationState::default();
        for x in [1.0, 2.0, 3.0] {
            state.update(Some(x), Some(5.0));
        }
        assert_eq!(state.finalize(), None);
    }
}
