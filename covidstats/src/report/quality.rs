//! Per-location consistency checks over both source tables.

use std::collections::HashSet;

use super::{ColumnKind, ReportKind, ReportTable};
use crate::store::{DeathMeasures, Measures, Observation, Partition, Table, VaccinationMeasures};
use crate::COL;

use ColumnKind::{Integer, Text};

pub const CONSISTENT: &str = "Consistent";
pub const INCONSISTENT: &str = "Inconsistent";

/// Number of distinct values in `values`, counting NULL as a value of its own.
fn distinct<T: Eq + std::hash::Hash>(values: impl Iterator<Item = Option<T>>) -> usize {
    values.collect::<HashSet<_>>().len()
}

/// Number of times a cumulative series goes down between consecutive non-NULL values.
pub fn cumulative_decreases(values: &[Option<f64>]) -> usize {
    values
        .iter()
        .flatten()
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|pair| pair[1] < pair[0])
        .count()
}

fn consistency(distinct: usize) -> &'static str {
    if distinct <= 1 {
        CONSISTENT
    } else {
        INCONSISTENT
    }
}

fn check_partition<M: Measures>(
    table: &mut ReportTable,
    partition: Partition<'_, M>,
    cumulative: &[fn(&Observation<M>) -> Option<f64>],
) {
    let rows = partition.rows();
    // f64 is not hashable, so populations are compared by bit pattern.
    let populations = distinct(rows.iter().map(|o| o.population.map(f64::to_bits)));
    let continents = distinct(rows.iter().map(|o| o.continent.as_deref()));
    let decreases: usize = cumulative
        .iter()
        .map(|f| cumulative_decreases(&partition.column(f)))
        .sum();
    table.push(vec![
        M::TABLE.into(),
        partition.location().into(),
        populations.into(),
        consistency(populations).into(),
        continents.into(),
        consistency(continents).into(),
        decreases.into(),
    ]);
}

/// One row per location of each table. Aggregate rows are included since they are part of the
/// data being checked.
pub fn data_quality(
    deaths: &Table<DeathMeasures>,
    vaccinations: &Table<VaccinationMeasures>,
) -> ReportTable {
    let mut table = ReportTable::new(
        ReportKind::DataQuality.to_string(),
        &[
            (COL::TABLE, Text),
            (COL::LOCATION, Text),
            ("distinct_populations", Integer),
            ("population_consistency", Text),
            ("distinct_continents", Integer),
            ("continent_consistency", Text),
            ("cumulative_decreases", Integer),
        ],
    );
    let death_totals: [fn(&Observation<DeathMeasures>) -> Option<f64>; 2] = [
        |o| o.measures.total_cases,
        |o| o.measures.total_deaths,
    ];
    for partition in deaths.partitions() {
        check_partition(&mut table, partition, &death_totals);
    }
    let vaccination_totals: [fn(&Observation<VaccinationMeasures>) -> Option<f64>; 4] = [
        |o| o.measures.total_vaccinations,
        |o| o.measures.people_vaccinated,
        |o| o.measures.people_fully_vaccinated,
        |o| o.measures.total_boosters,
    ];
    for partition in vaccinations.partitions() {
        check_partition(&mut table, partition, &vaccination_totals);
    }
    table
}
