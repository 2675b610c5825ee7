use covidstats::error::CovidStatsError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum CovidStatsCliError {
    #[error("Anyhow error: {0:#}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("covidstats error: {0}")]
    CovidStatsError(#[from] CovidStatsError),
    #[error("task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type CovidStatsCliResult<T> = Result<T, CovidStatsCliError>;
