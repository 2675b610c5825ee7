use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// CSV export of cases and deaths.
    pub deaths_path: PathBuf,
    /// CSV export of vaccinations and development indicators.
    pub vaccinations_path: PathBuf,
    /// Decimal places shown for floating point values.
    pub decimal_places: usize,
    /// Row cap applied to every report that does not request its own.
    pub top: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            deaths_path: "covid_deaths.csv".into(),
            vaccinations_path: "covid_vaccinations.csv".into(),
            decimal_places: 4,
            top: None,
        }
    }
}
