//! Error types.

use chrono::NaiveDate;

#[derive(thiserror::Error, Debug)]
pub enum CovidStatsError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Missing required column '{column}' in {table} table")]
    MissingColumn { table: String, column: String },
    #[error("Missing value for '{column}' in {table} table at row {row}")]
    MissingKey {
        table: String,
        column: String,
        row: usize,
    },
    #[error("Unparseable date '{value}' in {table} table at row {row}")]
    UnparseableDate {
        table: String,
        value: String,
        row: usize,
    },
    #[error("Duplicate observation for ({location}, {date}) in {table} table")]
    DuplicateObservation {
        table: String,
        location: String,
        date: NaiveDate,
    },
    #[error("Join of {deaths} death rows and {vaccinations} vaccination rows matched no (location, date) keys")]
    EmptyJoin { deaths: usize, vaccinations: usize },
    #[error("Invalid ladder: {0}")]
    InvalidLadder(String),
    #[error("Invalid report parameter: {0}")]
    InvalidParameter(String),
    #[error("Value of column '{0}' does not match its declared type")]
    ColumnType(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

pub type CovidStatsResult<T> = Result<T, CovidStatsError>;
