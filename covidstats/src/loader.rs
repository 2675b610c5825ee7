//! Reading the death and vaccination CSV exports into [`Table`]s.

use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};
use polars::prelude::*;

use crate::error::{CovidStatsError, CovidStatsResult};
use crate::store::{DeathMeasures, Measures, Observation, Table, VaccinationMeasures};
use crate::COL;

/// Accepted date formats, tried in order.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Reads a CSV file with a header row. Every row is scanned when inferring column types so that
/// sparse numeric columns are not mistaken for strings.
pub fn read_csv(path: &Path) -> CovidStatsResult<DataFrame> {
    debug!("Reading {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    info!("Read {} rows from {}", df.height(), path.display());
    Ok(df)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value.trim(), format).ok())
}

fn required<'a, M: Measures>(df: &'a DataFrame, column: &str) -> CovidStatsResult<&'a Series> {
    df.column(column).map_err(|_| CovidStatsError::MissingColumn {
        table: M::TABLE.to_string(),
        column: column.to_string(),
    })
}

fn floats(series: &Series) -> CovidStatsResult<Vec<Option<f64>>> {
    Ok(series
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect())
}

fn strings(series: &Series) -> CovidStatsResult<Vec<Option<String>>> {
    Ok(series
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn float_column<M: Measures>(df: &DataFrame, column: &str) -> CovidStatsResult<Vec<Option<f64>>> {
    floats(required::<M>(df, column)?)
}

/// A column that may be absent from the file, read as all NULL when it is.
fn optional_float_column(df: &DataFrame, column: &str) -> CovidStatsResult<Vec<Option<f64>>> {
    match df.column(column) {
        Ok(series) => floats(series),
        Err(_) => {
            debug!("Column '{column}' not present, treating as NULL");
            Ok(vec![None; df.height()])
        }
    }
}

/// Identity columns shared by both tables.
struct Keys {
    locations: Vec<String>,
    dates: Vec<NaiveDate>,
    continents: Vec<Option<String>>,
}

impl Keys {
    fn read<M: Measures>(df: &DataFrame) -> CovidStatsResult<Self> {
        let missing = |column: &str, row: usize| CovidStatsError::MissingKey {
            table: M::TABLE.to_string(),
            column: column.to_string(),
            row,
        };
        // Row numbers in errors are 1-based and count data rows only.
        let locations = strings(required::<M>(df, COL::LOCATION)?)?
            .into_iter()
            .enumerate()
            .map(|(idx, location)| {
                location
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| missing(COL::LOCATION, idx + 1))
            })
            .collect::<CovidStatsResult<Vec<_>>>()?;
        let dates = strings(required::<M>(df, COL::DATE)?)?
            .into_iter()
            .enumerate()
            .map(|(idx, date)| {
                let date = date.ok_or_else(|| missing(COL::DATE, idx + 1))?;
                parse_date(&date).ok_or_else(|| CovidStatsError::UnparseableDate {
                    table: M::TABLE.to_string(),
                    value: date,
                    row: idx + 1,
                })
            })
            .collect::<CovidStatsResult<Vec<_>>>()?;
        let continents = strings(required::<M>(df, COL::CONTINENT)?)?
            .into_iter()
            .map(|continent| continent.filter(|c| !c.trim().is_empty()))
            .collect();
        Ok(Self {
            locations,
            dates,
            continents,
        })
    }

    fn observations<M>(
        self,
        populations: Vec<Option<f64>>,
        measures: Vec<M>,
    ) -> Vec<Observation<M>> {
        self.locations
            .into_iter()
            .zip(self.dates)
            .zip(self.continents)
            .zip(populations)
            .zip(measures)
            .map(
                |((((location, date), continent), population), measures)| Observation {
                    location,
                    date,
                    continent,
                    population,
                    measures,
                },
            )
            .collect()
    }
}

/// Builds the death table. All columns are required.
pub fn deaths_from_dataframe(df: &DataFrame) -> CovidStatsResult<Table<DeathMeasures>> {
    type M = DeathMeasures;
    let keys = Keys::read::<M>(df)?;
    let population = float_column::<M>(df, COL::POPULATION)?;
    let new_cases = float_column::<M>(df, COL::NEW_CASES)?;
    let total_cases = float_column::<M>(df, COL::TOTAL_CASES)?;
    let new_deaths = float_column::<M>(df, COL::NEW_DEATHS)?;
    let total_deaths = float_column::<M>(df, COL::TOTAL_DEATHS)?;
    let measures = (0..df.height())
        .map(|idx| DeathMeasures {
            new_cases: new_cases[idx],
            total_cases: total_cases[idx],
            new_deaths: new_deaths[idx],
            total_deaths: total_deaths[idx],
        })
        .collect();
    Table::from_observations(keys.observations(population, measures))
}

/// Builds the vaccination table. `population` is optional since analyses take it from the death
/// table.
pub fn vaccinations_from_dataframe(
    df: &DataFrame,
) -> CovidStatsResult<Table<VaccinationMeasures>> {
    type M = VaccinationMeasures;
    let keys = Keys::read::<M>(df)?;
    let population = optional_float_column(df, COL::POPULATION)?;
    let new_vaccinations = float_column::<M>(df, COL::NEW_VACCINATIONS)?;
    let total_vaccinations = float_column::<M>(df, COL::TOTAL_VACCINATIONS)?;
    let people_vaccinated = float_column::<M>(df, COL::PEOPLE_VACCINATED)?;
    let people_fully_vaccinated = float_column::<M>(df, COL::PEOPLE_FULLY_VACCINATED)?;
    let total_boosters = float_column::<M>(df, COL::TOTAL_BOOSTERS)?;
    let gdp_per_capita = float_column::<M>(df, COL::GDP_PER_CAPITA)?;
    let human_development_index = float_column::<M>(df, COL::HUMAN_DEVELOPMENT_INDEX)?;
    let measures = (0..df.height())
        .map(|idx| VaccinationMeasures {
            new_vaccinations: new_vaccinations[idx],
            total_vaccinations: total_vaccinations[idx],
            people_vaccinated: people_vaccinated[idx],
            people_fully_vaccinated: people_fully_vaccinated[idx],
            total_boosters: total_boosters[idx],
            gdp_per_capita: gdp_per_capita[idx],
            human_development_index: human_development_index[idx],
        })
        .collect();
    Table::from_observations(keys.observations(population, measures))
}

pub fn load_deaths(path: &Path) -> CovidStatsResult<Table<DeathMeasures>> {
    deaths_from_dataframe(&read_csv(path)?)
}

pub fn load_vaccinations(path: &Path) -> CovidStatsResult<Table<VaccinationMeasures>> {
    vaccinations_from_dataframe(&read_csv(path)?)
}
