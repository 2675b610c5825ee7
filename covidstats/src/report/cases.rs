//! Reports over the death table: fatality and infection rates, rankings, global totals, rolling
//! averages and outliers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::izip;

use super::{rank_order, ColumnKind, ReportKind, ReportTable};
use crate::metrics::{
    self, case_fatality_rate, daily_growth_rate, death_rate, growth, percent, ratio,
};
use crate::stats::Aggregate;
use crate::store::{DeathMeasures, Observation, Table};
use crate::window::{
    lag, over_partitions, percent_rank, rank, rolling, Frame, SortOrder, WindowPolicy,
};
use crate::COL;

use ColumnKind::{Date, Float, Integer, Text};

pub const HIGH_OUTLIER: &str = "High Outlier";
pub const LOW_OUTLIER: &str = "Low Outlier";
/// Width of the outlier band in standard deviations.
const OUTLIER_BAND: f64 = 2.0;

pub fn case_fatality(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::CaseFatality.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::TOTAL_CASES, Float),
            (COL::TOTAL_DEATHS, Float),
            (COL::CASE_FATALITY_RATE, Float),
        ],
    );
    for row in deaths.rows() {
        let m = &row.measures;
        table.push(vec![
            row.location.as_str().into(),
            row.date.into(),
            m.total_cases.into(),
            m.total_deaths.into(),
            case_fatality_rate(m.total_deaths, m.total_cases).into(),
        ]);
    }
    table
}

pub fn infection_rate(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::InfectionRate.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::POPULATION, Float),
            (COL::TOTAL_CASES, Float),
            (COL::INFECTION_RATE, Float),
        ],
    );
    for row in deaths.rows() {
        table.push(vec![
            row.location.as_str().into(),
            row.date.into(),
            row.population.into(),
            row.measures.total_cases.into(),
            metrics::infection_rate(row.measures.total_cases, row.population).into(),
        ]);
    }
    table
}

/// Per country: the highest case count and the highest share of the population infected, ranked by
/// the latter.
pub fn highest_infection_rate(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::HighestInfectionRate.to_string(),
        &[
            (COL::RANK, Integer),
            (COL::LOCATION, Text),
            (COL::POPULATION, Float),
            ("highest_infection_count", Float),
            ("percent_population_infected", Float),
        ],
    );
    let mut locations = vec![];
    let mut populations = vec![];
    let mut counts = vec![];
    let mut rates = vec![];
    for partition in deaths.partitions() {
        let rows = partition.rows();
        locations.push(partition.location());
        populations.push(partition.population());
        counts.push(Aggregate::Max.evaluate(rows.iter().map(|o| o.measures.total_cases)));
        rates.push(Aggregate::Max.evaluate(
            rows.iter()
                .map(|o| metrics::infection_rate(o.measures.total_cases, o.population)),
        ));
    }
    let ranks = rank(&rates, SortOrder::Descending);
    for idx in rank_order(&rates, SortOrder::Descending, &locations) {
        table.push(vec![
            ranks[idx].into(),
            locations[idx].into(),
            populations[idx].into(),
            counts[idx].into(),
            rates[idx].into(),
        ]);
    }
    table
}

/// Highest total death count of every location, which for a well-formed cumulative series is its
/// latest value.
fn max_total_deaths(deaths: &Table<DeathMeasures>) -> Vec<(&str, Option<&str>, Option<f64>)> {
    deaths
        .partitions()
        .map(|p| {
            (
                p.location(),
                p.continent(),
                Aggregate::Max.evaluate(p.rows().iter().map(|o| o.measures.total_deaths)),
            )
        })
        .collect()
}

pub fn highest_death_count(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::HighestDeathCount.to_string(),
        &[
            (COL::RANK, Integer),
            (COL::LOCATION, Text),
            ("total_death_count", Float),
        ],
    );
    let entries = max_total_deaths(deaths);
    let locations: Vec<&str> = entries.iter().map(|e| e.0).collect();
    let counts: Vec<Option<f64>> = entries.iter().map(|e| e.2).collect();
    let ranks = rank(&counts, SortOrder::Descending);
    for idx in rank_order(&counts, SortOrder::Descending, &locations) {
        table.push(vec![
            ranks[idx].into(),
            locations[idx].into(),
            counts[idx].into(),
        ]);
    }
    table
}

/// Sum over the countries of each continent of their highest total death count.
pub fn continent_death_count(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::ContinentDeathCount.to_string(),
        &[
            (COL::CONTINENT, Text),
            (COL::COUNTRIES, Integer),
            ("total_death_count", Float),
        ],
    );
    let mut by_continent: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for (_, continent, count) in max_total_deaths(deaths) {
        if let Some(continent) = continent {
            by_continent.entry(continent).or_default().push(count);
        }
    }
    let continents: Vec<&str> = by_continent.keys().copied().collect();
    let countries: Vec<usize> = by_continent.values().map(Vec::len).collect();
    let totals: Vec<Option<f64>> = by_continent
        .values()
        .map(|counts| Aggregate::Sum.evaluate(counts.iter().copied()))
        .collect();
    for idx in rank_order(&totals, SortOrder::Descending, &continents) {
        table.push(vec![
            continents[idx].into(),
            countries[idx].into(),
            totals[idx].into(),
        ]);
    }
    table
}

pub fn global_daily(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::GlobalDaily.to_string(),
        &[
            (COL::DATE, Date),
            ("total_new_cases", Float),
            ("total_new_deaths", Float),
            ("death_percentage", Float),
        ],
    );
    let mut by_date: BTreeMap<NaiveDate, Vec<&Observation<DeathMeasures>>> = BTreeMap::new();
    for row in deaths.rows() {
        by_date.entry(row.date).or_default().push(row);
    }
    for (date, rows) in by_date {
        let cases = Aggregate::Sum.evaluate(rows.iter().map(|o| o.measures.new_cases));
        let new_deaths = Aggregate::Sum.evaluate(rows.iter().map(|o| o.measures.new_deaths));
        table.push(vec![
            date.into(),
            cases.into(),
            new_deaths.into(),
            percent(new_deaths, cases).into(),
        ]);
    }
    table
}

pub fn global_totals(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::GlobalTotals.to_string(),
        &[
            (COL::TOTAL_CASES, Float),
            (COL::TOTAL_DEATHS, Float),
            ("death_percentage", Float),
        ],
    );
    let cases = Aggregate::Sum.evaluate(deaths.rows().iter().map(|o| o.measures.new_cases));
    let new_deaths = Aggregate::Sum.evaluate(deaths.rows().iter().map(|o| o.measures.new_deaths));
    table.push(vec![
        cases.into(),
        new_deaths.into(),
        percent(new_deaths, cases).into(),
    ]);
    table
}

pub fn daily_growth(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::DailyGrowth.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::TOTAL_CASES, Float),
            ("previous_total_cases", Float),
            (COL::DAILY_GROWTH_RATE, Float),
        ],
    );
    for partition in deaths.partitions() {
        let totals = partition.column(|o| o.measures.total_cases);
        let previous = lag(&totals, 1);
        let rates = daily_growth_rate(&totals);
        for (row, total, prev, rate) in izip!(partition.rows(), &totals, previous, rates) {
            table.push(vec![
                row.location.as_str().into(),
                row.date.into(),
                (*total).into(),
                prev.into(),
                rate.into(),
            ]);
        }
    }
    table
}

/// Seven day trailing averages ("6 preceding + current") and the change against the average a
/// week (seven rows) earlier.
pub fn seven_day_average(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::SevenDayAverage.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::NEW_CASES, Float),
            ("new_cases_7day_avg", Float),
            ("new_deaths_7day_avg", Float),
            ("previous_week_avg", Float),
            ("week_over_week_change", Float),
        ],
    );
    let frame = Frame::trailing(7);
    for partition in deaths.partitions() {
        let cases = partition.column(|o| o.measures.new_cases);
        let case_avg = rolling(&cases, frame, Aggregate::Mean, WindowPolicy::ExactFrame);
        let death_avg = rolling(
            &partition.column(|o| o.measures.new_deaths),
            frame,
            Aggregate::Mean,
            WindowPolicy::ExactFrame,
        );
        let previous = lag(&case_avg, 7);
        for (row, new_cases, avg, deaths_avg, prev) in
            izip!(partition.rows(), &cases, &case_avg, death_avg, previous)
        {
            table.push(vec![
                row.location.as_str().into(),
                row.date.into(),
                (*new_cases).into(),
                (*avg).into(),
                deaths_avg.into(),
                prev.into(),
                growth(*avg, prev).into(),
            ]);
        }
    }
    table
}

/// Where a daily value lies relative to the band `mean ± 2·stddev` of the seven rows before it.
/// `None` when there is no value or no baseline, or the value is inside the band.
pub fn outlier_status(
    value: Option<f64>,
    mean: Option<f64>,
    stddev: Option<f64>,
) -> Option<&'static str> {
    let (value, mean, stddev) = (value?, mean?, stddev?);
    if value > mean + OUTLIER_BAND * stddev {
        Some(HIGH_OUTLIER)
    } else if value < mean - OUTLIER_BAND * stddev {
        Some(LOW_OUTLIER)
    } else {
        None
    }
}

/// Days whose new case count is outside the band of the previous seven rows ("7 preceding .. 1
/// preceding"). Rows without a full week of history are never flagged.
pub fn outliers(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::Outliers.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::NEW_CASES, Float),
            ("baseline_mean", Float),
            ("baseline_stddev", Float),
            ("z_score", Float),
            ("outlier_status", Text),
        ],
    );
    let frame = Frame::preceding(7);
    for partition in deaths.partitions() {
        let cases = partition.column(|o| o.measures.new_cases);
        let means = rolling(&cases, frame, Aggregate::Mean, WindowPolicy::ExactFrame);
        let stddevs = rolling(&cases, frame, Aggregate::StddevSamp, WindowPolicy::ExactFrame);
        for (row, value, mean, stddev) in izip!(partition.rows(), cases, means, stddevs) {
            if let Some(status) = outlier_status(value, mean, stddev) {
                let z_score = ratio(value.zip(mean).map(|(v, m)| v - m), stddev);
                table.push(vec![
                    row.location.as_str().into(),
                    row.date.into(),
                    value.into(),
                    mean.into(),
                    stddev.into(),
                    z_score.into(),
                    status.into(),
                ]);
            }
        }
    }
    table
}

struct Snapshot<'a> {
    location: &'a str,
    continent: Option<&'a str>,
    date: NaiveDate,
    population: Option<f64>,
    total_deaths: f64,
    death_rate: Option<f64>,
}

/// Death rate at each country's latest date with a total death count, ranked globally (rank 1 is
/// the highest rate) and within its continent. `percent_rank` is 0 for the lowest rate and 1 for
/// the highest.
pub fn death_rate_snapshot(deaths: &Table<DeathMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::DeathRateSnapshot.to_string(),
        &[
            (COL::GLOBAL_RANK, Integer),
            (COL::CONTINENT_RANK, Integer),
            (COL::PERCENT_RANK, Float),
            (COL::LOCATION, Text),
            (COL::CONTINENT, Text),
            (COL::SNAPSHOT_DATE, Date),
            (COL::POPULATION, Float),
            (COL::TOTAL_DEATHS, Float),
            (COL::DEATH_RATE_PERCENT, Float),
        ],
    );
    let snapshots: Vec<Snapshot> = deaths
        .partitions()
        .filter_map(|p| {
            let (row, total_deaths) = p.latest_with(|o| o.measures.total_deaths)?;
            let population = row.population;
            Some(Snapshot {
                location: p.location(),
                continent: p.continent(),
                date: row.date,
                population,
                total_deaths,
                death_rate: death_rate(Some(total_deaths), population),
            })
        })
        .collect();
    let rates: Vec<Option<f64>> = snapshots.iter().map(|s| s.death_rate).collect();
    let locations: Vec<&str> = snapshots.iter().map(|s| s.location).collect();
    let global_ranks = rank(&rates, SortOrder::Descending);
    let percent_ranks = percent_rank(&rates, SortOrder::Ascending);
    let continent_ranks = over_partitions(
        &snapshots,
        |s| s.continent,
        |s| s.location,
        |indices| {
            let keys: Vec<Option<f64>> = indices.iter().map(|&i| rates[i]).collect();
            rank(&keys, SortOrder::Descending)
        },
    );
    for idx in rank_order(&rates, SortOrder::Descending, &locations) {
        let s = &snapshots[idx];
        table.push(vec![
            global_ranks[idx].into(),
            continent_ranks[idx].into(),
            percent_ranks[idx].into(),
            s.location.into(),
            s.continent.into(),
            s.date.into(),
            s.population.into(),
            s.total_deaths.into(),
            s.death_rate.into(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{approx, float, text};
    use crate::store::tests::{date, death_row};

    fn daily(
        location: &str,
        continent: &str,
        new_cases: &[f64],
    ) -> Vec<Observation<DeathMeasures>> {
        new_cases
            .iter()
            .enumerate()
            .map(|(idx, &cases)| Observation {
                location: location.to_string(),
                date: date(idx as u32 + 1),
                continent: Some(continent.to_string()),
                population: Some(1000.0),
                measures: DeathMeasures {
                    new_cases: Some(cases),
                    new_deaths: Some(cases / 10.0),
                    ..Default::default()
                },
            })
            .collect()
    }

    #[test]
    fn daily_growth_end_to_end() {
        let rows = [10.0, 10.0, 25.0, 25.0, 25.0, 60.0]
            .iter()
            .enumerate()
            .map(|(idx, &total)| death_row("X", Some("Asia"), idx as u32 + 1, Some(total), None))
            .collect();
        let deaths = Table::from_observations(rows).unwrap();
        let table = daily_growth(&deaths);
        assert_eq!(table.len(), 6);
        assert_eq!(float(&table, 0, COL::DAILY_GROWTH_RATE), None);
        assert!(approx(float(&table, 2, COL::DAILY_GROWTH_RATE), 150.0));
        assert!(approx(float(&table, 3, COL::DAILY_GROWTH_RATE), 0.0));
        assert!(approx(float(&table, 2, "previous_total_cases"), 10.0));
    }

    #[test]
    fn death_rate_snapshot_end_to_end() {
        let deaths = Table::from_observations(vec![
            death_row("X", Some("Europe"), 1, Some(900.0), Some(400.0)),
            death_row("X", Some("Europe"), 2, Some(1000.0), Some(500.0)),
            death_row("X", Some("Europe"), 3, Some(1100.0), None),
            death_row("Y", Some("Europe"), 1, Some(10.0), Some(1000.0)),
            death_row("Z", Some("Asia"), 1, Some(10.0), Some(100.0)),
            death_row("W", Some("Asia"), 1, Some(10.0), None),
        ])
        .unwrap();
        let table = death_rate_snapshot(&deaths);
        // W never reports deaths and has no snapshot.
        assert_eq!(table.len(), 3);
        assert_eq!(text(&table, 0, COL::LOCATION), Some("Y"));
        assert_eq!(text(&table, 1, COL::LOCATION), Some("X"));
        assert!(approx(float(&table, 1, COL::DEATH_RATE_PERCENT), 0.05));
        assert_eq!(
            table.value(1, COL::SNAPSHOT_DATE).and_then(|v| v.as_date()),
            Some(date(2))
        );
        assert!(approx(float(&table, 1, COL::GLOBAL_RANK), 2.0));
        assert!(approx(float(&table, 1, COL::CONTINENT_RANK), 2.0));
        assert!(approx(float(&table, 2, COL::CONTINENT_RANK), 1.0));
        assert!(approx(float(&table, 0, COL::PERCENT_RANK), 1.0));
        assert!(approx(float(&table, 2, COL::PERCENT_RANK), 0.0));
    }

    #[test]
    fn snapshot_uses_population_of_the_snapshot_row() {
        let mut revised = death_row("X", Some("Europe"), 2, Some(1000.0), None);
        revised.population = Some(2_000_000.0);
        let deaths = Table::from_observations(vec![
            death_row("X", Some("Europe"), 1, Some(900.0), Some(500.0)),
            revised,
        ])
        .unwrap();
        let table = death_rate_snapshot(&deaths);
        assert_eq!(table.len(), 1);
        assert!(approx(float(&table, 0, COL::POPULATION), 1_000_000.0));
        assert!(approx(float(&table, 0, COL::DEATH_RATE_PERCENT), 0.05));
    }

    #[test]
    fn highest_infection_rate_orders_with_nulls_last() {
        let mut no_population = death_row("A", Some("Asia"), 1, Some(10.0), None);
        no_population.population = None;
        let deaths = Table::from_observations(vec![
            no_population,
            death_row("B", Some("Asia"), 1, Some(100.0), None),
            death_row("B", Some("Asia"), 2, Some(200.0), None),
            death_row("C", Some("Asia"), 1, Some(200.0), None),
            death_row("D", Some("Asia"), 1, Some(50.0), None),
        ])
        .unwrap();
        let table = highest_infection_rate(&deaths);
        let locations: Vec<&str> = (0..table.len())
            .map(|i| text(&table, i, COL::LOCATION).unwrap())
            .collect();
        assert_eq!(locations, vec!["B", "C", "D", "A"]);
        assert!(approx(float(&table, 0, COL::RANK), 1.0));
        assert!(approx(float(&table, 1, COL::RANK), 1.0));
        assert!(approx(float(&table, 2, COL::RANK), 3.0));
        assert_eq!(float(&table, 3, COL::RANK), None);
        assert!(approx(float(&table, 0, "percent_population_infected"), 0.02));
    }

    #[test]
    fn global_daily_sums_skip_nulls() {
        let mut rows = daily("A", "Asia", &[10.0, 20.0]);
        rows.extend(daily("B", "Asia", &[30.0]));
        rows[1].measures.new_deaths = None;
        let deaths = Table::from_observations(rows).unwrap();
        let table = global_daily(&deaths);
        assert_eq!(table.len(), 2);
        assert!(approx(float(&table, 0, "total_new_cases"), 40.0));
        assert!(approx(float(&table, 0, "total_new_deaths"), 4.0));
        assert!(approx(float(&table, 0, "death_percentage"), 10.0));
        assert!(approx(float(&table, 1, "total_new_cases"), 20.0));
        assert_eq!(float(&table, 1, "total_new_deaths"), None);
        assert_eq!(float(&table, 1, "death_percentage"), None);

        let totals = global_totals(&deaths);
        assert!(approx(float(&totals, 0, COL::TOTAL_CASES), 60.0));
        assert!(approx(float(&totals, 0, COL::TOTAL_DEATHS), 4.0));
    }

    #[test]
    fn seven_day_average_needs_a_full_week() {
        let deaths = Table::from_observations(daily("A", "Asia", &[7.0; 15])).unwrap();
        let table = seven_day_average(&deaths);
        assert_eq!(float(&table, 5, "new_cases_7day_avg"), None);
        assert!(approx(float(&table, 6, "new_cases_7day_avg"), 7.0));
        assert!(approx(float(&table, 6, "new_deaths_7day_avg"), 0.7));
        assert_eq!(float(&table, 12, "previous_week_avg"), None);
        assert!(approx(float(&table, 13, "previous_week_avg"), 7.0));
        assert!(approx(float(&table, 13, "week_over_week_change"), 0.0));
    }

    #[test]
    fn outliers_flag_spikes_against_the_previous_week() {
        let deaths = Table::from_observations(daily(
            "A",
            "Asia",
            &[10.0, 12.0, 11.0, 9.0, 10.0, 11.0, 12.0, 0.0, 100.0, 11.0],
        ))
        .unwrap();
        let table = outliers(&deaths);
        let statuses: Vec<(NaiveDate, &str)> = (0..table.len())
            .map(|i| {
                (
                    table.value(i, COL::DATE).unwrap().as_date().unwrap(),
                    text(&table, i, "outlier_status").unwrap(),
                )
            })
            .collect();
        // The spike on day 9 is measured against a baseline that includes the dip on day 8; the
        // return to normal on day 10 is not flagged because the baseline now includes the spike.
        assert_eq!(statuses, vec![(date(8), LOW_OUTLIER), (date(9), HIGH_OUTLIER)]);
        assert!(float(&table, 0, "z_score").unwrap() < -2.0);
        assert!(float(&table, 1, "z_score").unwrap() > 2.0);
    }

    #[test]
    fn outlier_status_band_edges() {
        assert_eq!(outlier_status(Some(14.0), Some(10.0), Some(2.0)), None);
        assert_eq!(outlier_status(Some(14.1), Some(10.0), Some(2.0)), Some(HIGH_OUTLIER));
        assert_eq!(outlier_status(Some(5.9), Some(10.0), Some(2.0)), Some(LOW_OUTLIER));
        assert_eq!(outlier_status(None, Some(10.0), Some(2.0)), None);
        assert_eq!(outlier_status(Some(50.0), Some(10.0), None), None);
    }

    #[test]
    fn continent_counts_sum_country_maxima() {
        let deaths = Table::from_observations(vec![
            death_row("A", Some("Asia"), 1, None, Some(5.0)),
            death_row("A", Some("Asia"), 2, None, Some(7.0)),
            death_row("B", Some("Asia"), 1, None, Some(3.0)),
            death_row("C", Some("Africa"), 1, None, Some(20.0)),
            death_row("D", Some("Oceania"), 1, None, None),
        ])
        .unwrap();
        let table = continent_death_count(&deaths);
        assert_eq!(text(&table, 0, COL::CONTINENT), Some("Africa"));
        assert_eq!(text(&table, 1, COL::CONTINENT), Some("Asia"));
        assert!(approx(float(&table, 1, "total_death_count"), 10.0));
        assert!(approx(float(&table, 1, COL::COUNTRIES), 2.0));
        assert_eq!(text(&table, 2, COL::CONTINENT), Some("Oceania"));
        assert_eq!(float(&table, 2, "total_death_count"), None);
    }
}
