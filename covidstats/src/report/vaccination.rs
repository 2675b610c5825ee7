//! Vaccination reports, including those that relate vaccination to development and mortality.

use std::collections::HashMap;

use super::{rank_order, ColumnKind, ReportKind, ReportTable};
use crate::metrics::{
    booster_uptake_rate, case_fatality_rate, death_rate, percent, vaccination_rate,
    VaccinationKind,
};
use crate::segment::Ladder;
use crate::stats::{Aggregate, CorrelationState};
use crate::store::{JoinedMeasures, Observation, Partition, Table, VaccinationMeasures};
use crate::window::{rank, rolling, Frame, SortOrder, WindowPolicy};
use crate::COL;

use ColumnKind::{Date, Float, Integer, Text};

/// Running total of new vaccinations per location and its share of the population.
pub fn rolling_vaccinations(joined: &Table<JoinedMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::RollingVaccinations.to_string(),
        &[
            (COL::LOCATION, Text),
            (COL::DATE, Date),
            (COL::POPULATION, Float),
            (COL::NEW_VACCINATIONS, Float),
            ("rolling_people_vaccinated", Float),
            ("percent_population_vaccinated", Float),
        ],
    );
    for partition in joined.partitions() {
        let new = partition.column(|o| o.measures.vaccinations.new_vaccinations);
        let running = rolling(
            &new,
            Frame::unbounded(),
            Aggregate::Sum,
            WindowPolicy::ExactFrame,
        );
        for ((row, new), running) in partition.rows().iter().zip(new).zip(running) {
            table.push(vec![
                row.location.as_str().into(),
                row.date.into(),
                row.population.into(),
                new.into(),
                running.into(),
                percent(running, row.population).into(),
            ]);
        }
    }
    table
}

/// Locations ranked by boosters per fully vaccinated person on the latest date that reports
/// boosters.
pub fn booster_uptake(vaccinations: &Table<VaccinationMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::BoosterUptake.to_string(),
        &[
            (COL::RANK, Integer),
            (COL::LOCATION, Text),
            (COL::SNAPSHOT_DATE, Date),
            (COL::TOTAL_BOOSTERS, Float),
            (COL::PEOPLE_FULLY_VACCINATED, Float),
            (COL::BOOSTER_UPTAKE_RATE, Float),
        ],
    );
    let snapshots: Vec<_> = vaccinations
        .partitions()
        .filter_map(|p| {
            let (row, boosters) = p.latest_with(|o| o.measures.total_boosters)?;
            let fully = row.measures.people_fully_vaccinated;
            let rate = booster_uptake_rate(Some(boosters), fully);
            Some((p.location(), row.date, boosters, fully, rate))
        })
        .collect();
    let rates: Vec<Option<f64>> = snapshots.iter().map(|s| s.4).collect();
    let locations: Vec<&str> = snapshots.iter().map(|s| s.0).collect();
    let ranks = rank(&rates, SortOrder::Descending);
    for idx in rank_order(&rates, SortOrder::Descending, &locations) {
        let (location, date, boosters, fully, rate) = snapshots[idx];
        table.push(vec![
            ranks[idx].into(),
            location.into(),
            date.into(),
            boosters.into(),
            fully.into(),
            rate.into(),
        ]);
    }
    table
}

fn latest<F>(partition: &Partition<'_, JoinedMeasures>, metric: F) -> Option<f64>
where
    F: Fn(&Observation<JoinedMeasures>) -> Option<f64>,
{
    partition.latest_with(metric).map(|(_, value)| value)
}

/// Latest non-NULL value of each metric a country-level comparison needs.
#[derive(Debug, Clone, Copy)]
struct CountrySnapshot {
    gdp_per_capita: Option<f64>,
    human_development_index: Option<f64>,
    fully_vaccinated_percent: Option<f64>,
    death_rate_percent: Option<f64>,
    case_fatality_rate: Option<f64>,
}

impl CountrySnapshot {
    fn of(partition: &Partition<'_, JoinedMeasures>) -> Self {
        Self {
            gdp_per_capita: latest(partition, |o| o.measures.vaccinations.gdp_per_capita),
            human_development_index: latest(partition, |o| {
                o.measures.vaccinations.human_development_index
            }),
            fully_vaccinated_percent: latest(partition, |o| {
                vaccination_rate(
                    VaccinationKind::FullyVaccinated,
                    &o.measures.vaccinations,
                    o.population,
                )
            }),
            death_rate_percent: latest(partition, |o| {
                death_rate(o.measures.deaths.total_deaths, o.population)
            }),
            case_fatality_rate: latest(partition, |o| {
                case_fatality_rate(o.measures.deaths.total_deaths, o.measures.deaths.total_cases)
            }),
        }
    }

    fn metric(&self, name: &str) -> Option<f64> {
        match name {
            COL::GDP_PER_CAPITA => self.gdp_per_capita,
            COL::HUMAN_DEVELOPMENT_INDEX => self.human_development_index,
            COL::FULLY_VACCINATED_PERCENT => self.fully_vaccinated_percent,
            COL::DEATH_RATE_PERCENT => self.death_rate_percent,
            COL::CASE_FATALITY_RATE => self.case_fatality_rate,
            _ => None,
        }
    }
}

/// Country averages of vaccination, wealth and mortality grouped by human development level.
pub fn development_vaccination(joined: &Table<JoinedMeasures>, ladder: &Ladder) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::DevelopmentVaccination.to_string(),
        &[
            ("development_level", Text),
            (COL::COUNTRIES, Integer),
            ("avg_fully_vaccinated_percent", Float),
            ("avg_gdp_per_capita", Float),
            ("avg_death_rate_percent", Float),
        ],
    );
    let mut levels: HashMap<&str, Vec<CountrySnapshot>> = HashMap::new();
    for partition in joined.partitions() {
        let snapshot = CountrySnapshot::of(&partition);
        levels
            .entry(ladder.classify(snapshot.human_development_index))
            .or_default()
            .push(snapshot);
    }
    let mut levels: Vec<_> = levels.into_iter().collect();
    levels.sort_by_key(|(level, _)| ladder.position(level));
    for (level, snapshots) in levels {
        let mean = |f: fn(&CountrySnapshot) -> Option<f64>| {
            Aggregate::Mean.evaluate(snapshots.iter().map(f))
        };
        table.push(vec![
            level.into(),
            snapshots.len().into(),
            mean(|s| s.fully_vaccinated_percent).into(),
            mean(|s| s.gdp_per_capita).into(),
            mean(|s| s.death_rate_percent).into(),
        ]);
    }
    table
}

/// Metric pairs correlated across countries.
pub const CORRELATION_PAIRS: [(&str, &str); 5] = [
    (COL::GDP_PER_CAPITA, COL::FULLY_VACCINATED_PERCENT),
    (COL::HUMAN_DEVELOPMENT_INDEX, COL::FULLY_VACCINATED_PERCENT),
    (COL::GDP_PER_CAPITA, COL::DEATH_RATE_PERCENT),
    (COL::HUMAN_DEVELOPMENT_INDEX, COL::DEATH_RATE_PERCENT),
    (COL::FULLY_VACCINATED_PERCENT, COL::CASE_FATALITY_RATE),
];

/// Pearson correlation of each metric pair over the latest snapshot of every country.
pub fn correlations(joined: &Table<JoinedMeasures>) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::Correlations.to_string(),
        &[
            ("metric_x", Text),
            ("metric_y", Text),
            (COL::COUNTRIES, Integer),
            ("pearson_r", Float),
        ],
    );
    let snapshots: Vec<CountrySnapshot> = joined
        .partitions()
        .map(|p| CountrySnapshot::of(&p))
        .collect();
    for (x, y) in CORRELATION_PAIRS {
        let mut state = CorrelationState::default();
        for snapshot in &snapshots {
            state.update(snapshot.metric(x), snapshot.metric(y));
        }
        table.push(vec![
            x.into(),
            y.into(),
            state.count().into(),
            state.finalize().into(),
        ]);
    }
    table
}
