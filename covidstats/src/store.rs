//! In-memory record store for the death and vaccination tables.
//!
//! A [`Table`] holds its observations sorted by `(location, date)` together with a hash index on
//! that key and the row range of every location. Tables are never mutated after construction:
//! filtering and joining produce new tables.

use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::Range;

use chrono::NaiveDate;
use log::debug;

use crate::error::{CovidStatsError, CovidStatsResult};

/// The set of nullable measures carried by one kind of table.
pub trait Measures: Clone + Debug + Send + Sync + 'static {
    /// Name of the table used in errors and logs.
    const TABLE: &'static str;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeathMeasures {
    pub new_cases: Option<f64>,
    pub total_cases: Option<f64>,
    pub new_deaths: Option<f64>,
    pub total_deaths: Option<f64>,
}

impl Measures for DeathMeasures {
    const TABLE: &'static str = "deaths";
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaccinationMeasures {
    pub new_vaccinations: Option<f64>,
    pub total_vaccinations: Option<f64>,
    pub people_vaccinated: Option<f64>,
    pub people_fully_vaccinated: Option<f64>,
    pub total_boosters: Option<f64>,
    pub gdp_per_capita: Option<f64>,
    pub human_development_index: Option<f64>,
}

impl Measures for VaccinationMeasures {
    const TABLE: &'static str = "vaccinations";
}

/// Measures of a death row and the vaccination row sharing its `(location, date)` key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedMeasures {
    pub deaths: DeathMeasures,
    pub vaccinations: VaccinationMeasures,
}

impl Measures for JoinedMeasures {
    const TABLE: &'static str = "joined";
}

/// One row of a table, identified by `(location, date)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<M> {
    pub location: String,
    pub date: NaiveDate,
    /// `None` marks an aggregate row (e.g. "World" or an income group) rather than a country.
    pub continent: Option<String>,
    pub population: Option<f64>,
    pub measures: M,
}

impl<M> Observation<M> {
    pub fn is_country(&self) -> bool {
        self.continent.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Table<M> {
    rows: Vec<Observation<M>>,
    index: HashMap<(String, NaiveDate), usize>,
    partitions: Vec<Range<usize>>,
}

impl<M: Measures> Table<M> {
    /// Builds a table from observations in any order. Fails if a `(location, date)` key occurs
    /// more than once.
    pub fn from_observations(mut rows: Vec<Observation<M>>) -> CovidStatsResult<Self> {
        rows.sort_by(|a, b| a.location.cmp(&b.location).then(a.date.cmp(&b.date)));
        if let Some(pair) = rows
            .windows(2)
            .find(|pair| pair[0].location == pair[1].location && pair[0].date == pair[1].date)
        {
            return Err(CovidStatsError::DuplicateObservation {
                table: M::TABLE.to_string(),
                location: pair[1].location.clone(),
                date: pair[1].date,
            });
        }
        Ok(Self::from_sorted(rows))
    }

    /// Rows must already be sorted by `(location, date)` without duplicate keys.
    fn from_sorted(rows: Vec<Observation<M>>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        let mut partitions: Vec<Range<usize>> = vec![];
        for (idx, row) in rows.iter().enumerate() {
            index.insert((row.location.clone(), row.date), idx);
            match partitions.last_mut() {
                Some(range) if rows[range.start].location == row.location => range.end = idx + 1,
                _ => partitions.push(idx..idx + 1),
            }
        }
        debug!(
            "Built {} table with {} rows over {} locations",
            M::TABLE,
            rows.len(),
            partitions.len()
        );
        Self {
            rows,
            index,
            partitions,
        }
    }

    pub fn empty() -> Self {
        Self::from_sorted(vec![])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows ordered by `(location, date)`.
    pub fn rows(&self) -> &[Observation<M>] {
        &self.rows
    }

    pub fn get(&self, location: &str, date: NaiveDate) -> Option<&Observation<M>> {
        self.index
            .get(&(location.to_string(), date))
            .map(|&idx| &self.rows[idx])
    }

    /// Iterates over locations in ascending order, each with its rows ordered by date.
    pub fn partitions(&self) -> impl Iterator<Item = Partition<'_, M>> + '_ {
        self.partitions.iter().map(|range| Partition {
            location: &self.rows[range.start].location,
            rows: &self.rows[range.clone()],
        })
    }

    pub fn partition(&self, location: &str) -> Option<Partition<'_, M>> {
        self.partitions
            .binary_search_by(|range| self.rows[range.start].location.as_str().cmp(location))
            .ok()
            .map(|pos| {
                let range = self.partitions[pos].clone();
                Partition {
                    location: &self.rows[range.start].location,
                    rows: &self.rows[range],
                }
            })
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> + '_ {
        self.partitions().map(|p| p.location())
    }

    /// Returns a new table with the rows satisfying `predicate`, keeping their order.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Observation<M>) -> bool,
    {
        Self::from_sorted(
            self.rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        )
    }

    /// Drops aggregate rows (those without a continent).
    pub fn countries(&self) -> Self {
        self.filter(Observation::is_country)
    }
}

/// All observations of one location ordered by date ascending.
#[derive(Debug)]
pub struct Partition<'a, M> {
    location: &'a str,
    rows: &'a [Observation<M>],
}

impl<M> Clone for Partition<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Partition<'_, M> {}

impl<'a, M> Partition<'a, M> {
    pub fn location(&self) -> &'a str {
        self.location
    }

    pub fn rows(&self) -> &'a [Observation<M>] {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Extracts a nullable column in date order.
    pub fn column<F>(&self, f: F) -> Vec<Option<f64>>
    where
        F: Fn(&Observation<M>) -> Option<f64>,
    {
        self.rows.iter().map(f).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|row| row.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|row| row.date)
    }

    /// Continent of the latest row that has one.
    pub fn continent(&self) -> Option<&'a str> {
        self.rows
            .iter()
            .rev()
            .find_map(|row| row.continent.as_deref())
    }

    /// Population of the latest row that has one.
    pub fn population(&self) -> Option<f64> {
        self.rows.iter().rev().find_map(|row| row.population)
    }

    /// The row with the greatest date for which `metric` is non-NULL, along with the value.
    pub fn latest_with<F>(&self, metric: F) -> Option<(&'a Observation<M>, f64)>
    where
        F: Fn(&Observation<M>) -> Option<f64>,
    {
        self.rows
            .iter()
            .rev()
            .find_map(|row| metric(row).map(|value| (row, value)))
    }
}

/// Inner join of the two tables on `(location, date)`. Keys present in only one table are dropped;
/// continent and population come from the death row. An empty result is an error because callers
/// always expect the tables to overlap.
pub fn join(
    deaths: &Table<DeathMeasures>,
    vaccinations: &Table<VaccinationMeasures>,
) -> CovidStatsResult<Table<JoinedMeasures>> {
    let rows: Vec<Observation<JoinedMeasures>> = deaths
        .rows()
        .iter()
        .filter_map(|death| {
            vaccinations
                .get(&death.location, death.date)
                .map(|vaccination| Observation {
                    location: death.location.clone(),
                    date: death.date,
                    continent: death.continent.clone(),
                    population: death.population,
                    measures: JoinedMeasures {
                        deaths: death.measures.clone(),
                        vaccinations: vaccination.measures.clone(),
                    },
                })
        })
        .collect();
    if rows.is_empty() {
        return Err(CovidStatsError::EmptyJoin {
            deaths: deaths.len(),
            vaccinations: vaccinations.len(),
        });
    }
    debug!(
        "Joined {} death rows with {} vaccination rows into {} rows",
        deaths.len(),
        vaccinations.len(),
        rows.len()
    );
    // Death rows are already in key order, so the joined rows are too.
    Ok(Table::from_sorted(rows))
}
