//! Derived metric formulas.
//!
//! Every formula takes nullable inputs and returns `None` instead of failing when an input is NULL
//! or a denominator is zero. Values keep full precision; [`round_to`] is only applied when a report
//! is formatted for output.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::store::{Observation, VaccinationMeasures};
use crate::window::lag;

/// `numerator / denominator`, NULL when either side is NULL or the denominator is zero.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// `numerator / denominator * 100` with the same NULL rules as [`ratio`].
pub fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    ratio(numerator, denominator).map(|r| r * 100.0)
}

pub fn infection_rate(total_cases: Option<f64>, population: Option<f64>) -> Option<f64> {
    percent(total_cases, population)
}

/// NULL unless there is at least one case and a non-negative death count.
pub fn case_fatality_rate(total_deaths: Option<f64>, total_cases: Option<f64>) -> Option<f64> {
    match (total_deaths, total_cases) {
        (Some(deaths), Some(cases)) if cases > 0.0 && deaths >= 0.0 => {
            percent(Some(deaths), Some(cases))
        }
        _ => None,
    }
}

pub fn death_rate(total_deaths: Option<f64>, population: Option<f64>) -> Option<f64> {
    percent(total_deaths, population)
}

/// Which vaccination count a vaccination rate is based on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum VaccinationKind {
    /// All administered doses.
    TotalDoses,
    /// People with at least one dose.
    AtLeastOneDose,
    FullyVaccinated,
    Boosters,
}

impl VaccinationKind {
    pub fn measure(&self, measures: &VaccinationMeasures) -> Option<f64> {
        match self {
            VaccinationKind::TotalDoses => measures.total_vaccinations,
            VaccinationKind::AtLeastOneDose => measures.people_vaccinated,
            VaccinationKind::FullyVaccinated => measures.people_fully_vaccinated,
            VaccinationKind::Boosters => measures.total_boosters,
        }
    }
}

pub fn vaccination_rate(
    kind: VaccinationKind,
    measures: &VaccinationMeasures,
    population: Option<f64>,
) -> Option<f64> {
    percent(kind.measure(measures), population)
}

/// Vaccination rate of a vaccination-table row using its own population column.
pub fn observation_vaccination_rate(
    kind: VaccinationKind,
    observation: &Observation<VaccinationMeasures>,
) -> Option<f64> {
    vaccination_rate(kind, &observation.measures, observation.population)
}

pub fn booster_uptake_rate(
    total_boosters: Option<f64>,
    people_fully_vaccinated: Option<f64>,
) -> Option<f64> {
    percent(total_boosters, people_fully_vaccinated)
}

/// Day-over-day percentage change of a cumulative series, one value per row. The first row and
/// any row whose previous value is NULL or zero get NULL.
pub fn daily_growth_rate(totals: &[Option<f64>]) -> Vec<Option<f64>> {
    lag(totals, 1)
        .into_iter()
        .zip(totals)
        .map(|(yesterday, &today)| growth(today, yesterday))
        .collect()
}

/// Percentage change from `previous` to `current`.
pub fn growth(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(current), Some(previous)) => percent(Some(current - previous), Some(previous)),
        _ => None,
    }
}

/// Precision beyond which an `f64` has no more decimal digits to round.
pub const MAX_DECIMAL_PLACES: usize = 15;

/// Rounds half away from zero to `places` decimal places, capped at [`MAX_DECIMAL_PLACES`].
pub fn round_to(value: f64, places: usize) -> f64 {
    let factor = 10f64.powi(places.min(MAX_DECIMAL_PLACES) as i32);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}
