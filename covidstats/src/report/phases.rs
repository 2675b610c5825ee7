//! Phase classification and milestone detection.

use chrono::NaiveDate;
use itertools::Itertools;

use super::{ColumnKind, ReportKind, ReportTable, Value};
use crate::metrics::{daily_growth_rate, percent};
use crate::segment::{Ladder, UNCLASSIFIED};
use crate::stats::Aggregate;
use crate::store::{DeathMeasures, JoinedMeasures, Measures, Observation, Partition, Table};
use crate::window::first_crossing;
use crate::COL;

use ColumnKind::{Date, Float, Integer, Text};

/// All rows of one location that share a phase label, whether or not they are contiguous.
struct PhaseGroup<'a> {
    label: &'a str,
    first_date: NaiveDate,
    last_date: NaiveDate,
    days: usize,
    /// Row positions within the partition.
    rows: Vec<usize>,
}

/// Groups a partition's rows by the label `ladder` gives `metric`, dropping unclassified rows and
/// phases that last `min_days` rows or fewer. Groups come out by first date, then ladder order.
fn phase_groups<'a, M>(
    partition: &Partition<'_, M>,
    metric: &[Option<f64>],
    ladder: &'a Ladder,
    min_days: usize,
) -> Vec<PhaseGroup<'a>> {
    let dates = partition.dates();
    metric
        .iter()
        .enumerate()
        .map(|(idx, value)| (ladder.classify(*value), idx))
        .filter(|(label, _)| *label != UNCLASSIFIED)
        .into_group_map()
        .into_iter()
        .filter(|(_, rows)| rows.len() > min_days)
        .filter_map(|(label, rows)| {
            let first_date = rows.iter().map(|&i| dates[i]).min()?;
            let last_date = rows.iter().map(|&i| dates[i]).max()?;
            Some(PhaseGroup {
                label,
                first_date,
                last_date,
                days: rows.len(),
                rows,
            })
        })
        .sorted_by_key(|group| (group.first_date, ladder.position(group.label)))
        .collect()
}

/// Time each location spent in each growth phase of its cumulative case count.
pub fn growth_phases(
    deaths: &Table<DeathMeasures>,
    ladder: &Ladder,
    min_days: usize,
) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::GrowthPhases.to_string(),
        &[
            (COL::LOCATION, Text),
            ("growth_phase", Text),
            ("phase_start", Date),
            ("phase_end", Date),
            ("days_in_phase", Integer),
            ("avg_daily_growth_rate", Float),
        ],
    );
    for partition in deaths.partitions() {
        let totals = partition.column(|o| o.measures.total_cases);
        let rates = daily_growth_rate(&totals);
        for group in phase_groups(&partition, &totals, ladder, min_days) {
            let avg = Aggregate::Mean.evaluate(group.rows.iter().map(|&i| rates[i]));
            table.push(vec![
                partition.location().into(),
                group.label.into(),
                group.first_date.into(),
                group.last_date.into(),
                group.days.into(),
                avg.into(),
            ]);
        }
    }
    table
}

/// Percent of the population with at least one dose, using the joined (death table) population.
fn percent_vaccinated(observation: &Observation<JoinedMeasures>) -> Option<f64> {
    percent(
        observation.measures.vaccinations.people_vaccinated,
        observation.population,
    )
}

pub fn vaccination_phases(
    joined: &Table<JoinedMeasures>,
    ladder: &Ladder,
    min_days: usize,
) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::VaccinationPhases.to_string(),
        &[
            (COL::LOCATION, Text),
            ("vaccination_phase", Text),
            ("first_date", Date),
            ("last_date", Date),
            ("days_in_phase", Integer),
            ("max_percent_vaccinated", Float),
        ],
    );
    for partition in joined.partitions() {
        let rates = partition.column(percent_vaccinated);
        for group in phase_groups(&partition, &rates, ladder, min_days) {
            let max = Aggregate::Max.evaluate(group.rows.iter().map(|&i| rates[i]));
            table.push(vec![
                partition.location().into(),
                group.label.into(),
                group.first_date.into(),
                group.last_date.into(),
                group.days.into(),
                max.into(),
            ]);
        }
    }
    table
}

/// For each threshold, the date `metric` first crossed it and the days elapsed since the first
/// row with a positive value. Thresholds the series never crosses from below are left out.
fn milestones<M: Measures>(
    partition: &Partition<'_, M>,
    metric: &[Option<f64>],
    thresholds: &[f64],
) -> Vec<(f64, NaiveDate, Option<i64>)> {
    let rows = partition.rows();
    let start = metric
        .iter()
        .position(|value| value.is_some_and(|v| v > 0.0))
        .map(|idx| rows[idx].date);
    thresholds
        .iter()
        .filter_map(|&threshold| {
            let idx = first_crossing(metric, threshold)?;
            let date = rows[idx].date;
            Some((threshold, date, start.map(|start| (date - start).num_days())))
        })
        .collect()
}

pub fn case_milestones(deaths: &Table<DeathMeasures>, thresholds: &[f64]) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::CaseMilestones.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::THRESHOLD, Float),
            (COL::MILESTONE_DATE, Date),
            ("days_since_first_case", Integer),
        ],
    );
    for partition in deaths.partitions() {
        let totals = partition.column(|o| o.measures.total_cases);
        for (threshold, date, days) in milestones(&partition, &totals, thresholds) {
            table.push(vec![
                partition.location().into(),
                threshold.into(),
                date.into(),
                days.map_or(Value::Null, Value::Integer),
            ]);
        }
    }
    table
}

pub fn vaccination_milestones(joined: &Table<JoinedMeasures>, thresholds: &[f64]) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::VaccinationMilestones.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::THRESHOLD_PERCENT, Float),
            (COL::MILESTONE_DATE, Date),
            ("days_since_rollout", Integer),
        ],
    );
    for partition in joined.partitions() {
        let rates = partition.column(percent_vaccinated);
        for (threshold, date, days) in milestones(&partition, &rates, thresholds) {
            table.push(vec![
                partition.location().into(),
                threshold.into(),
                date.into(),
                days.map_or(Value::Null, Value::Integer),
            ]);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{approx, float, text};
    use crate::store::tests::{date, death_row};
    use crate::store::VaccinationMeasures;

    fn cumulative(location: &str, totals: &[Option<f64>]) -> Vec<Observation<DeathMeasures>> {
        totals
            .iter()
            .enumerate()
            .map(|(idx, &total)| death_row(location, Some("Asia"), idx as u32 + 1, total, None))
            .collect()
    }

    fn vaccinated(location: &str, people: &[Option<f64>]) -> Vec<Observation<JoinedMeasures>> {
        people
            .iter()
            .enumerate()
            .map(|(idx, &people_vaccinated)| Observation {
                location: location.to_string(),
                date: date(idx as u32 + 1),
                continent: Some("Europe".to_string()),
                population: Some(1000.0),
                measures: JoinedMeasures {
                    deaths: DeathMeasures::default(),
                    vaccinations: VaccinationMeasures {
                        people_vaccinated,
                        ..Default::default()
                    },
                },
            })
            .collect()
    }

    #[test]
    fn growth_phases_group_rows_by_label() {
        let mut totals = vec![Some(50.0); 9];
        totals.extend(vec![Some(500.0); 3]);
        totals.push(None);
        totals.extend(vec![Some(5000.0); 8]);
        let deaths = Table::from_observations(cumulative("A", &totals)).unwrap();
        let table = growth_phases(&deaths, &Ladder::growth_phase(), 7);
        // "Early" lasts three days and the NULL row is unclassified.
        assert_eq!(table.len(), 2);
        assert_eq!(text(&table, 0, "growth_phase"), Some("Initial"));
        assert!(approx(float(&table, 0, "days_in_phase"), 9.0));
        assert_eq!(
            table.value(0, "phase_end").and_then(|v| v.as_date()),
            Some(date(9))
        );
        assert!(approx(float(&table, 0, "avg_daily_growth_rate"), 0.0));
        assert_eq!(text(&table, 1, "growth_phase"), Some("Growing"));
        assert_eq!(
            table.value(1, "phase_start").and_then(|v| v.as_date()),
            Some(date(14))
        );
        assert!(approx(float(&table, 1, "days_in_phase"), 8.0));
        // The first day of the phase follows a NULL and has no growth rate.
        assert!(approx(float(&table, 1, "avg_daily_growth_rate"), 0.0));
    }

    #[test]
    fn downward_revision_keeps_phases_in_date_order() {
        let mut totals = vec![Some(500.0); 8];
        totals.extend(vec![Some(50.0); 8]);
        let deaths = Table::from_observations(cumulative("A", &totals)).unwrap();
        let table = growth_phases(&deaths, &Ladder::growth_phase(), 7);
        assert_eq!(table.len(), 2);
        assert_eq!(text(&table, 0, "growth_phase"), Some("Early"));
        assert_eq!(
            table.value(0, "phase_start").and_then(|v| v.as_date()),
            Some(date(1))
        );
        assert_eq!(text(&table, 1, "growth_phase"), Some("Initial"));
        assert_eq!(
            table.value(1, "phase_start").and_then(|v| v.as_date()),
            Some(date(9))
        );
    }

    #[test]
    fn min_days_is_exclusive() {
        let deaths = Table::from_observations(cumulative("A", &[Some(1.0); 7])).unwrap();
        assert!(growth_phases(&deaths, &Ladder::growth_phase(), 7).is_empty());
        assert_eq!(growth_phases(&deaths, &Ladder::growth_phase(), 6).len(), 1);
    }

    #[test]
    fn case_milestones_report_first_crossings() {
        let deaths = Table::from_observations(cumulative(
            "A",
            &[
                Some(0.0),
                Some(10.0),
                Some(900.0),
                None,
                Some(1500.0),
                Some(800.0),
                Some(20000.0),
            ],
        ))
        .unwrap();
        let table = case_milestones(&deaths, &[1_000.0, 10_000.0, 1_000_000.0]);
        assert_eq!(table.len(), 2);
        assert!(approx(float(&table, 0, COL::THRESHOLD), 1_000.0));
        assert_eq!(
            table.value(0, COL::MILESTONE_DATE).and_then(|v| v.as_date()),
            Some(date(5))
        );
        assert!(approx(float(&table, 0, "days_since_first_case"), 3.0));
        assert_eq!(
            table.value(1, COL::MILESTONE_DATE).and_then(|v| v.as_date()),
            Some(date(7))
        );
    }

    #[test]
    fn series_starting_above_a_milestone_never_crosses_it() {
        let deaths =
            Table::from_observations(cumulative("A", &[Some(5000.0), Some(6000.0)])).unwrap();
        assert!(case_milestones(&deaths, &[1_000.0]).is_empty());
    }

    #[test]
    fn vaccination_phases_and_milestones() {
        let people = [
            None,
            Some(0.0),
            Some(50.0),
            Some(200.0),
            Some(400.0),
            Some(600.0),
            Some(800.0),
            Some(900.0),
        ];
        let joined = Table::from_observations(vaccinated("A", &people)).unwrap();

        let phases = vaccination_phases(&joined, &Ladder::vaccination_phase(), 0);
        let labels: Vec<&str> = (0..phases.len())
            .map(|i| text(&phases, i, "vaccination_phase").unwrap())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Initial Rollout",
                "Early Adoption",
                "Expanding Coverage",
                "Majority Coverage",
                "High Coverage"
            ]
        );
        assert!(approx(float(&phases, 0, "days_in_phase"), 2.0));
        assert!(approx(float(&phases, 4, "max_percent_vaccinated"), 90.0));

        let milestones = vaccination_milestones(&joined, &[10.0, 25.0, 95.0]);
        assert_eq!(milestones.len(), 2);
        assert_eq!(
            milestones.value(0, COL::MILESTONE_DATE).and_then(|v| v.as_date()),
            Some(date(4))
        );
        assert!(approx(float(&milestones, 0, "days_since_rollout"), 1.0));
        assert!(approx(float(&milestones, 1, COL::THRESHOLD_PERCENT), 25.0));
        assert!(approx(float(&milestones, 1, "days_since_rollout"), 2.0));
    }
}
