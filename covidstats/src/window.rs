//! Window computations over a partition ordered by date.
//!
//! All functions take the values of one partition in order and return one output per input row,
//! leaving the input untouched. Frames are counted in rows, not days: a gap in the dates of a
//! partition does not widen or shrink a frame.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::stats::Aggregate;

/// What to do when fewer rows precede the current row than the frame asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowPolicy {
    /// Produce NULL until the whole frame is available.
    #[default]
    ExactFrame,
    /// Aggregate over whatever part of the frame exists.
    AvailableData,
}

/// A row frame relative to the current row, `start` rows preceding up to `end` rows preceding.
/// `start = None` means unbounded preceding; `end = 0` is the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    start: Option<usize>,
    end: usize,
}

impl Frame {
    /// `n - 1` preceding rows plus the current row.
    pub fn trailing(n: usize) -> Self {
        Self {
            start: Some(n.saturating_sub(1)),
            end: 0,
        }
    }

    /// The `n` rows before the current row, excluding it.
    pub fn preceding(n: usize) -> Self {
        Self {
            start: Some(n),
            end: 1,
        }
    }

    /// Everything from the start of the partition up to and including the current row.
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: 0,
        }
    }

    /// `start` rows preceding to `end` rows preceding; `None` if the frame would be empty.
    pub fn rows(start: usize, end: usize) -> Option<Self> {
        (start >= end).then_some(Self {
            start: Some(start),
            end,
        })
    }

    /// Row range of the frame for row `idx`, or `None` when the policy rejects a short frame.
    fn bounds(&self, idx: usize, policy: WindowPolicy) -> Option<(usize, usize)> {
        let start = match self.start {
            None => 0,
            Some(start) if start <= idx => idx - start,
            Some(_) => match policy {
                WindowPolicy::ExactFrame => return None,
                WindowPolicy::AvailableData => 0,
            },
        };
        // The frame ends before the partition starts.
        if self.end > idx {
            return None;
        }
        Some((start, idx - self.end))
    }
}

/// Applies `aggregate` over `frame` for every row.
pub fn rolling(
    values: &[Option<f64>],
    frame: Frame,
    aggregate: Aggregate,
    policy: WindowPolicy,
) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| {
            frame
                .bounds(idx, policy)
                .and_then(|(start, end)| aggregate.evaluate(values[start..=end].iter().copied()))
        })
        .collect()
}

/// The value `offset` rows earlier, NULL before the start of the partition.
pub fn lag<T: Clone>(values: &[Option<T>], offset: usize) -> Vec<Option<T>> {
    (0..values.len())
        .map(|idx| {
            idx.checked_sub(offset)
                .and_then(|prev| values[prev].clone())
        })
        .collect()
}

/// The value `offset` rows later, NULL past the end of the partition.
pub fn lead<T: Clone>(values: &[Option<T>], offset: usize) -> Vec<Option<T>> {
    (0..values.len())
        .map(|idx| values.get(idx + offset).cloned().flatten())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn compare(&self, a: f64, b: f64) -> Ordering {
        match self {
            SortOrder::Ascending => a.total_cmp(&b),
            SortOrder::Descending => b.total_cmp(&a),
        }
    }
}

/// Positions of the non-NULL keys sorted by `order`, ties broken by `tie_break`.
fn ranked_positions<K: Ord>(keys: &[Option<f64>], order: SortOrder, tie_break: &[K]) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..keys.len()).filter(|&i| keys[i].is_some()).collect();
    positions.sort_by(|&a, &b| {
        let (ka, kb) = (keys[a].unwrap_or_default(), keys[b].unwrap_or_default());
        order
            .compare(ka, kb)
            .then_with(|| tie_break[a].cmp(&tie_break[b]))
    });
    positions
}

/// Distinct 1..N numbering of the non-NULL keys. Equal keys are ordered by `tie_break`, which
/// must have the same length as `keys`. NULL keys get `None`.
pub fn row_number<K: Ord>(
    keys: &[Option<f64>],
    order: SortOrder,
    tie_break: &[K],
) -> Vec<Option<usize>> {
    assert_eq!(keys.len(), tie_break.len(), "one tie-break key per row");
    let mut numbers = vec![None; keys.len()];
    for (number, pos) in ranked_positions(keys, order, tie_break)
        .into_iter()
        .enumerate()
    {
        numbers[pos] = Some(number + 1);
    }
    numbers
}

/// SQL `RANK()`: equal keys share a rank and the following rank skips the size of the tie group.
/// NULL keys get `None`.
pub fn rank(keys: &[Option<f64>], order: SortOrder) -> Vec<Option<usize>> {
    let positions = ranked_positions(keys, order, &vec![(); keys.len()]);
    let mut ranks = vec![None; keys.len()];
    let mut current_rank = 0;
    let mut previous: Option<f64> = None;
    for (idx, &pos) in positions.iter().enumerate() {
        let key = keys[pos].unwrap_or_default();
        if previous.map_or(true, |prev| order.compare(prev, key) != Ordering::Equal) {
            current_rank = idx + 1;
            previous = Some(key);
        }
        ranks[pos] = Some(current_rank);
    }
    ranks
}

/// SQL `PERCENT_RANK()`: `(rank - 1) / (n - 1)` over the `n` non-NULL keys, NULL when `n == 1`.
pub fn percent_rank(keys: &[Option<f64>], order: SortOrder) -> Vec<Option<f64>> {
    let ranks = rank(keys, order);
    let n = ranks.iter().flatten().count();
    ranks
        .into_iter()
        .map(|rank| {
            rank.and_then(|rank| (n > 1).then(|| (rank - 1) as f64 / (n - 1) as f64))
        })
        .collect()
}

/// The first row at which the series reaches `threshold` coming from below.
///
/// NULL rows are skipped and a row is compared against the most recent non-NULL value before it.
/// A series whose first non-NULL value is already at or above the threshold never crosses.
pub fn first_crossing(values: &[Option<f64>], threshold: f64) -> Option<usize> {
    let mut previous: Option<f64> = None;
    for (idx, value) in values.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        if let Some(prev) = previous {
            if prev < threshold && value >= threshold {
                return Some(idx);
            }
        }
        previous = Some(value);
    }
    None
}

/// Runs `compute` over every partition of `rows` and writes the results back in input order.
///
/// Rows are grouped by `partition_key`, each group is stably sorted by `order_key`, and `compute`
/// receives the group's row indices in that order. It must return one value per index.
pub fn over_partitions<T, P, O, R, F>(
    rows: &[T],
    partition_key: impl Fn(&T) -> P,
    order_key: impl Fn(&T) -> O,
    compute: F,
) -> Vec<R>
where
    P: Eq + Hash,
    O: Ord,
    R: Clone + Default,
    F: Fn(&[usize]) -> Vec<R>,
{
    let mut groups: HashMap<P, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(partition_key(row)).or_default().push(idx);
    }
    let mut output = vec![R::default(); rows.len()];
    for (_, mut indices) in groups {
        indices.sort_by_key(|&idx| order_key(&rows[idx]));
        let results = compute(&indices);
        assert_eq!(results.len(), indices.len(), "one result per partition row");
        for (idx, result) in indices.into_iter().zip(results) {
            output[idx] = result;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn trailing_average_includes_current_row() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let result = rolling(
            &values,
            Frame::trailing(7),
            Aggregate::Mean,
            WindowPolicy::ExactFrame,
        );
        assert_eq!(&result[..6], &[None; 6]);
        assert_eq!(result[6], Some(4.0));
        assert_eq!(result[7], Some(5.0));
    }

    #[test]
    fn preceding_average_excludes_current_row() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0]);
        let result = rolling(
            &values,
            Frame::preceding(7),
            Aggregate::Mean,
            WindowPolicy::ExactFrame,
        );
        assert_eq!(&result[..7], &[None; 7]);
        assert_eq!(result[7], Some(4.0));
    }

    #[test]
    fn available_data_uses_short_prefix() {
        let values = some(&[2.0, 4.0, 6.0]);
        let result = rolling(
            &values,
            Frame::trailing(7),
            Aggregate::Mean,
            WindowPolicy::AvailableData,
        );
        assert_eq!(result, vec![Some(2.0), Some(3.0), Some(4.0)]);
        // The first row has nothing before it to aggregate.
        let preceding = rolling(
            &values,
            Frame::preceding(7),
            Aggregate::Mean,
            WindowPolicy::AvailableData,
        );
        assert_eq!(preceding, vec![None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn nulls_do_not_widen_the_frame() {
        let values = vec![Some(10.0), None, Some(2.0), None];
        let result = rolling(
            &values,
            Frame::trailing(2),
            Aggregate::Mean,
            WindowPolicy::ExactFrame,
        );
        assert_eq!(result, vec![None, Some(10.0), Some(2.0), Some(2.0)]);
    }

    #[test]
    fn all_null_frame_is_null() {
        let values = vec![None; 8];
        let result = rolling(
            &values,
            Frame::trailing(7),
            Aggregate::Mean,
            WindowPolicy::ExactFrame,
        );
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn unbounded_frame_is_a_running_total() {
        let values = vec![None, Some(1.0), None, Some(2.0)];
        let result = rolling(
            &values,
            Frame::unbounded(),
            Aggregate::Sum,
            WindowPolicy::ExactFrame,
        );
        assert_eq!(result, vec![None, Some(1.0), Some(1.0), Some(3.0)]);
    }

    #[test]
    fn explicit_row_frames() {
        assert!(Frame::rows(1, 3).is_none());
        let frame = Frame::rows(2, 1).unwrap();
        let values = some(&[1.0, 2.0, 3.0, 4.0]);
        let result = rolling(&values, frame, Aggregate::Sum, WindowPolicy::ExactFrame);
        assert_eq!(result, vec![None, None, Some(3.0), Some(5.0)]);
    }

    #[test]
    fn lag_and_lead_are_row_offsets() {
        let values = vec![Some(1), None, Some(3)];
        assert_eq!(lag(&values, 1), vec![None, Some(1), None]);
        assert_eq!(lag(&values, 2), vec![None, None, Some(1)]);
        assert_eq!(lead(&values, 1), vec![None, Some(3), None]);
        assert_eq!(lead(&values, 5), vec![None, None, None]);
    }

    #[test]
    fn row_number_is_a_permutation() {
        let keys = vec![Some(5.0), Some(3.0), Some(5.0), Some(1.0)];
        let tie_break = ["d", "c", "a", "b"];
        let numbers = row_number(&keys, SortOrder::Descending, &tie_break);
        assert_eq!(numbers, vec![Some(2), Some(3), Some(1), Some(4)]);
        let mut sorted: Vec<usize> = numbers.into_iter().flatten().collect();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rank_shares_ties_and_skips() {
        let keys = vec![Some(10.0), Some(20.0), Some(20.0), Some(5.0), None];
        assert_eq!(
            rank(&keys, SortOrder::Descending),
            vec![Some(3), Some(1), Some(1), Some(4), None]
        );
        assert_eq!(
            rank(&keys, SortOrder::Ascending),
            vec![Some(2), Some(3), Some(3), Some(1), None]
        );
    }

    #[test]
    fn percent_rank_spans_zero_to_one() {
        let keys = vec![Some(3.0), Some(1.0), Some(2.0), None];
        let result = percent_rank(&keys, SortOrder::Ascending);
        assert_eq!(result, vec![Some(1.0), Some(0.0), Some(0.5), None]);
        assert_eq!(percent_rank(&[Some(7.0)], SortOrder::Ascending), vec![None]);
    }

    #[test]
    fn crossing_detects_first_transition_only() {
        let values = some(&[10.0, 50.0, 120.0, 90.0, 150.0]);
        assert_eq!(first_crossing(&values, 100.0), Some(2));
        assert_eq!(first_crossing(&values, 1000.0), None);
    }

    #[test]
    fn crossing_not_emitted_when_series_starts_above() {
        let values = vec![None, Some(500.0), Some(800.0)];
        assert_eq!(first_crossing(&values, 100.0), None);
    }

    #[test]
    fn crossing_over_a_gap_counts_once() {
        let values = vec![Some(10.0), None, None, Some(5000.0), Some(6000.0)];
        assert_eq!(first_crossing(&values, 100.0), Some(3));
        assert_eq!(first_crossing(&values, 1000.0), Some(3));
    }

    #[test]
    fn partitioned_results_keep_input_order() {
        let rows = vec![("b", 2, 1.0), ("a", 2, 2.0), ("b", 1, 3.0), ("a", 1, 4.0)];
        let previous = over_partitions(
            &rows,
            |row| row.0,
            |row| row.1,
            |indices| {
                let values: Vec<Option<f64>> = indices.iter().map(|&i| Some(rows[i].2)).collect();
                lag(&values, 1)
            },
        );
        assert_eq!(previous, vec![Some(3.0), Some(4.0), None, None]);
    }
}
