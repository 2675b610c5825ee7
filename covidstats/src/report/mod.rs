//! Report assembly: each report filters the source tables, runs the window and metric functions,
//! groups and orders the result and returns it as a [`ReportTable`].

use chrono::NaiveDate;
use log::{debug, info};
use nonempty::NonEmpty;
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{CovidStatsError, CovidStatsResult};
use crate::filter::{CompiledLocationFilter, LocationFilter};
use crate::metrics::{round_to, MAX_DECIMAL_PLACES};
use crate::segment::Ladder;
use crate::store::{join, DeathMeasures, JoinedMeasures, Measures, Table, VaccinationMeasures};
use crate::window::{row_number, SortOrder};

pub mod cases;
pub mod phases;
pub mod quality;
pub mod vaccination;

/// Minimum number of days a location must spend in a phase to be reported.
pub const DEFAULT_MIN_DAYS: usize = 7;
pub const DEFAULT_CASE_MILESTONES: [f64; 4] = [1_000.0, 10_000.0, 100_000.0, 1_000_000.0];
pub const DEFAULT_VACCINATION_MILESTONES: [f64; 4] = [10.0, 25.0, 50.0, 75.0];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    CaseFatality,
    InfectionRate,
    HighestInfectionRate,
    HighestDeathCount,
    ContinentDeathCount,
    GlobalDaily,
    GlobalTotals,
    DailyGrowth,
    SevenDayAverage,
    Outliers,
    DeathRateSnapshot,
    GrowthPhases,
    CaseMilestones,
    RollingVaccinations,
    VaccinationPhases,
    VaccinationMilestones,
    BoosterUptake,
    DevelopmentVaccination,
    Correlations,
    DataQuality,
}

impl ReportKind {
    pub fn description(&self) -> &'static str {
        match self {
            ReportKind::CaseFatality => "Total deaths as a share of total cases, per day",
            ReportKind::InfectionRate => "Total cases as a share of population, per day",
            ReportKind::HighestInfectionRate => {
                "Countries ranked by the highest share of their population infected"
            }
            ReportKind::HighestDeathCount => "Countries ranked by total death count",
            ReportKind::ContinentDeathCount => "Total death count summed by continent",
            ReportKind::GlobalDaily => "New cases and deaths across all countries, per day",
            ReportKind::GlobalTotals => "New cases and deaths across all countries and days",
            ReportKind::DailyGrowth => "Day-over-day growth of total cases",
            ReportKind::SevenDayAverage => {
                "Seven day trailing averages of new cases and deaths with week-over-week change"
            }
            ReportKind::Outliers => {
                "Days whose new cases fall outside the previous week's mean +/- 2 stddev"
            }
            ReportKind::DeathRateSnapshot => {
                "Latest death rate per country with global and continental ranks"
            }
            ReportKind::GrowthPhases => "Time spent in each epidemic growth phase",
            ReportKind::CaseMilestones => "Dates on which total cases first reached milestones",
            ReportKind::RollingVaccinations => {
                "Running total of vaccinations as a share of population"
            }
            ReportKind::VaccinationPhases => "Time spent in each vaccination campaign phase",
            ReportKind::VaccinationMilestones => {
                "Dates on which the share of people vaccinated first reached milestones"
            }
            ReportKind::BoosterUptake => "Countries ranked by latest booster uptake",
            ReportKind::DevelopmentVaccination => {
                "Vaccination, wealth and death rate averaged by human development level"
            }
            ReportKind::Correlations => {
                "Pearson correlations between development, vaccination and mortality"
            }
            ReportKind::DataQuality => {
                "Per-location consistency of population, continent and cumulative totals"
            }
        }
    }

    /// Row cap applied when the request does not set one.
    pub fn default_top(&self) -> Option<usize> {
        match self {
            ReportKind::HighestInfectionRate | ReportKind::HighestDeathCount => Some(30),
            ReportKind::BoosterUptake => Some(20),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportParams {
    pub location: LocationFilter,
    /// Maximum number of rows to return.
    pub top: Option<usize>,
    /// Phases must last strictly more than this many days.
    pub min_days: Option<usize>,
    /// Milestone thresholds.
    pub thresholds: Option<NonEmpty<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report: ReportKind,
    #[serde(default)]
    pub params: ReportParams,
}

impl ReportRequest {
    pub fn new(report: ReportKind) -> Self {
        Self {
            report,
            params: ReportParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
    Integer,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text for display, with floats rounded to `decimal_places`. NULL is empty.
    pub fn display(&self, decimal_places: usize) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(v) => v.clone(),
            Value::Date(v) => v.format("%Y-%m-%d").to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => {
                let places = decimal_places.min(MAX_DECIMAL_PLACES);
                format!("{:.*}", places, round_to(*v, places))
            }
        }
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Value::Null, Value::Float)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Value::Null, Value::from)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Option<NaiveDate>> for Value {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map_or(Value::Null, Value::Date)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<Option<usize>> for Value {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Value::Null, Value::from)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// The output of a report: named, typed columns and full-precision rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ReportTable {
    pub fn new(name: impl Into<String>, columns: &[(&str, ColumnKind)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(name, kind)| Column {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
            rows: vec![],
        }
    }

    pub fn push(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width of {}", self.name);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Converts to a polars `DataFrame`, rounding floats to `decimal_places`. Dates become ISO
    /// strings.
    pub fn to_dataframe(&self, decimal_places: usize) -> CovidStatsResult<DataFrame> {
        let series = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| -> CovidStatsResult<Series> {
                let values = self.rows.iter().map(|row| &row[idx]);
                let mismatch = || CovidStatsError::ColumnType(column.name.clone());
                let name = column.name.as_str();
                Ok(match column.kind {
                    ColumnKind::Text => Series::new(
                        name,
                        values
                            .map(|v| match v {
                                Value::Null => Ok(None),
                                Value::Text(s) => Ok(Some(s.clone())),
                                _ => Err(mismatch()),
                            })
                            .collect::<CovidStatsResult<Vec<Option<String>>>>()?,
                    ),
                    ColumnKind::Date => Series::new(
                        name,
                        values
                            .map(|v| match v {
                                Value::Null => Ok(None),
                                Value::Date(_) => Ok(Some(v.display(decimal_places))),
                                _ => Err(mismatch()),
                            })
                            .collect::<CovidStatsResult<Vec<Option<String>>>>()?,
                    ),
                    ColumnKind::Integer => Series::new(
                        name,
                        values
                            .map(|v| match v {
                                Value::Null => Ok(None),
                                Value::Integer(i) => Ok(Some(*i)),
                                _ => Err(mismatch()),
                            })
                            .collect::<CovidStatsResult<Vec<Option<i64>>>>()?,
                    ),
                    ColumnKind::Float => Series::new(
                        name,
                        values
                            .map(|v| match v {
                                Value::Null => Ok(None),
                                Value::Float(f) => Ok(Some(round_to(*f, decimal_places))),
                                _ => Err(mismatch()),
                            })
                            .collect::<CovidStatsResult<Vec<Option<f64>>>>()?,
                    ),
                })
            })
            .collect::<CovidStatsResult<Vec<Series>>>()?;
        Ok(DataFrame::new(series)?)
    }
}

/// Indices of `keys` in rank order: non-NULL keys by `order` then `tie_break`, followed by NULL
/// keys ordered by `tie_break`.
pub(crate) fn rank_order(
    keys: &[Option<f64>],
    order: SortOrder,
    tie_break: &[&str],
) -> Vec<usize> {
    let numbers = row_number(keys, order, tie_break);
    let mut indices: Vec<usize> = (0..keys.len()).collect();
    indices.sort_by(|&a, &b| {
        numbers[a]
            .is_none()
            .cmp(&numbers[b].is_none())
            .then(numbers[a].cmp(&numbers[b]))
            .then(tie_break[a].cmp(tie_break[b]))
    });
    indices
}

/// The two source tables, loaded once and shared read-only by every report.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub deaths: Table<DeathMeasures>,
    pub vaccinations: Table<VaccinationMeasures>,
}

impl Dataset {
    pub fn new(deaths: Table<DeathMeasures>, vaccinations: Table<VaccinationMeasures>) -> Self {
        Self {
            deaths,
            vaccinations,
        }
    }

    /// Runs one report.
    pub fn run(&self, request: &ReportRequest) -> CovidStatsResult<ReportTable> {
        info!("Running report `{}`", request.report);
        debug!("params: {:?}", request.params);
        let params = &request.params;
        let filter = params.location.compile()?;
        let min_days = params.min_days.unwrap_or(DEFAULT_MIN_DAYS);

        let mut table = match request.report {
            ReportKind::CaseFatality => cases::case_fatality(&self.countries(&filter)),
            ReportKind::InfectionRate => cases::infection_rate(&self.countries(&filter)),
            ReportKind::HighestInfectionRate => {
                cases::highest_infection_rate(&self.countries(&filter))
            }
            ReportKind::HighestDeathCount => cases::highest_death_count(&self.countries(&filter)),
            ReportKind::ContinentDeathCount => {
                cases::continent_death_count(&self.countries(&filter))
            }
            ReportKind::GlobalDaily => cases::global_daily(&self.countries(&filter)),
            ReportKind::GlobalTotals => cases::global_totals(&self.countries(&filter)),
            ReportKind::DailyGrowth => cases::daily_growth(&self.countries(&filter)),
            ReportKind::SevenDayAverage => cases::seven_day_average(&self.countries(&filter)),
            ReportKind::Outliers => cases::outliers(&self.countries(&filter)),
            ReportKind::DeathRateSnapshot => {
                cases::death_rate_snapshot(&self.countries(&filter))
            }
            ReportKind::GrowthPhases => phases::growth_phases(
                &self.countries(&filter),
                &Ladder::growth_phase(),
                min_days,
            ),
            ReportKind::CaseMilestones => phases::case_milestones(
                &self.countries(&filter),
                &thresholds(params, &DEFAULT_CASE_MILESTONES)?,
            ),
            ReportKind::RollingVaccinations => {
                vaccination::rolling_vaccinations(&self.joined(&filter)?)
            }
            ReportKind::VaccinationPhases => phases::vaccination_phases(
                &self.joined(&filter)?,
                &Ladder::vaccination_phase(),
                min_days,
            ),
            ReportKind::VaccinationMilestones => phases::vaccination_milestones(
                &self.joined(&filter)?,
                &thresholds(params, &DEFAULT_VACCINATION_MILESTONES)?,
            ),
            ReportKind::BoosterUptake => {
                vaccination::booster_uptake(&countries(&self.vaccinations, &filter))
            }
            ReportKind::DevelopmentVaccination => vaccination::development_vaccination(
                &self.joined(&filter)?,
                &Ladder::development_level(),
            ),
            ReportKind::Correlations => vaccination::correlations(&self.joined(&filter)?),
            ReportKind::DataQuality => quality::data_quality(
                &self.deaths.filter(|o| filter.matches(&o.location)),
                &self.vaccinations.filter(|o| filter.matches(&o.location)),
            ),
        };

        if let Some(top) = params.top.or(request.report.default_top()) {
            table.truncate(top);
        }
        debug!("Report `{}` produced {} rows", request.report, table.len());
        Ok(table)
    }

    fn countries(&self, filter: &CompiledLocationFilter) -> Table<DeathMeasures> {
        countries(&self.deaths, filter)
    }

    fn joined(&self, filter: &CompiledLocationFilter) -> CovidStatsResult<Table<JoinedMeasures>> {
        join(
            &self.countries(filter),
            &countries(&self.vaccinations, filter),
        )
    }
}

/// Country rows of `table` whose location passes `filter`.
fn countries<M: Measures>(table: &Table<M>, filter: &CompiledLocationFilter) -> Table<M> {
    table.filter(|o| o.is_country() && filter.matches(&o.location))
}

/// Requested thresholds in ascending order, or `defaults`.
fn thresholds(params: &ReportParams, defaults: &[f64]) -> CovidStatsResult<Vec<f64>> {
    let mut thresholds: Vec<f64> = match &params.thresholds {
        Some(thresholds) => thresholds.iter().copied().collect(),
        None => defaults.to_vec(),
    };
    if let Some(bad) = thresholds.iter().find(|t| !t.is_finite()) {
        return Err(CovidStatsError::InvalidParameter(format!(
            "threshold {bad} is not finite"
        )));
    }
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    Ok(thresholds)
}

#[cfg(test)]
pub(crate) mod tests {
    use nonempty::nonempty;

    use super::*;
    use crate::filter::{CaseSensitivity, MatchType};
    use crate::store::tests::{date, death_row, vaccination_row};

    pub fn float(table: &ReportTable, row: usize, column: &str) -> Option<f64> {
        table.value(row, column).and_then(Value::as_f64)
    }

    pub fn text<'a>(table: &'a ReportTable, row: usize, column: &str) -> Option<&'a str> {
        table.value(row, column).and_then(Value::as_str)
    }

    pub fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    fn dataset() -> Dataset {
        let deaths = Table::from_observations(vec![
            death_row("World", None, 1, Some(5000.0), Some(50.0)),
            death_row("Chile", Some("South America"), 1, Some(100.0), Some(1.0)),
            death_row("Chile", Some("South America"), 2, Some(200.0), Some(4.0)),
            death_row("Peru", Some("South America"), 1, Some(300.0), Some(9.0)),
        ])
        .unwrap();
        let vaccinations = Table::from_observations(vec![
            vaccination_row("World", None, 1, Some(10.0)),
            vaccination_row("Chile", Some("South America"), 2, Some(10.0)),
        ])
        .unwrap();
        Dataset::new(deaths, vaccinations)
    }

    #[test]
    fn region_rows_never_reach_country_reports() -> CovidStatsResult<()> {
        let dataset = dataset();
        let table = dataset.run(&ReportRequest::new(ReportKind::HighestDeathCount))?;
        let locations = table.column_values("location").unwrap();
        assert_eq!(locations.len(), 2);
        assert!(locations.iter().all(|v| v.as_str() != Some("World")));

        assert_eq!(text(&table, 0, "location"), Some("Peru"));

        let continents = dataset.run(&ReportRequest::new(ReportKind::ContinentDeathCount))?;
        assert_eq!(continents.len(), 1);
        assert!(approx(float(&continents, 0, "total_death_count"), 13.0));
        Ok(())
    }

    #[test]
    fn location_filter_and_top_cap() -> CovidStatsResult<()> {
        let dataset = dataset();
        let request = ReportRequest {
            report: ReportKind::CaseFatality,
            params: ReportParams {
                location: LocationFilter::new(
                    vec!["chi".into()],
                    MatchType::Startswith,
                    CaseSensitivity::Insensitive,
                ),
                top: Some(1),
                ..Default::default()
            },
        };
        let table = dataset.run(&request)?;
        assert_eq!(table.len(), 1);
        assert_eq!(text(&table, 0, "location"), Some("Chile"));
        assert!(approx(float(&table, 0, "case_fatality_rate"), 1.0));
        Ok(())
    }

    #[test]
    fn joined_reports_fail_without_overlap() {
        let dataset = dataset();
        let request = ReportRequest {
            report: ReportKind::RollingVaccinations,
            params: ReportParams {
                location: LocationFilter::exact("Peru"),
                ..Default::default()
            },
        };
        assert!(matches!(
            dataset.run(&request),
            Err(CovidStatsError::EmptyJoin { .. })
        ));
    }

    #[test]
    fn thresholds_are_sorted_and_validated() -> CovidStatsResult<()> {
        let params = ReportParams {
            thresholds: Some(nonempty![50.0, 10.0, 50.0]),
            ..Default::default()
        };
        assert_eq!(thresholds(&params, &[1.0])?, vec![10.0, 50.0]);
        assert_eq!(
            thresholds(&ReportParams::default(), &DEFAULT_CASE_MILESTONES)?,
            DEFAULT_CASE_MILESTONES.to_vec()
        );
        let params = ReportParams {
            thresholds: Some(nonempty![f64::NAN]),
            ..Default::default()
        };
        assert!(thresholds(&params, &[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn request_deserializes_from_json() -> anyhow::Result<()> {
        let request: ReportRequest = serde_json::from_str(
            r#"{"report": "vaccination-milestones", "params": {"top": 5, "thresholds": [20, 40], "location": {"values": ["Chile"], "matchType": "exact"}}}"#,
        )?;
        assert_eq!(request.report, ReportKind::VaccinationMilestones);
        assert_eq!(request.params.top, Some(5));
        assert_eq!(request.params.thresholds, Some(nonempty![20.0, 40.0]));
        assert_eq!(request.params.location, LocationFilter::exact("Chile"));
        Ok(())
    }

    #[test]
    fn report_kind_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(
            ReportKind::from_str("Death-Rate-Snapshot").unwrap(),
            ReportKind::DeathRateSnapshot
        );
        assert_eq!(ReportKind::GlobalDaily.to_string(), "global-daily");
        assert!(ReportKind::from_str("awesome-report").is_err());
    }

    #[test]
    fn report_table_to_dataframe_rounds_floats() -> CovidStatsResult<()> {
        let mut table = ReportTable::new(
            "test",
            &[
                ("location", ColumnKind::Text),
                ("date", ColumnKind::Date),
                ("rank", ColumnKind::Integer),
                ("rate", ColumnKind::Float),
            ],
        );
        table.push(vec![
            "Chile".into(),
            date(1).into(),
            Value::from(1usize),
            Some(0.123456).into(),
        ]);
        table.push(vec![Value::Null, Value::Null, Value::Null, Value::Null]);
        let df = table.to_dataframe(2)?;
        assert_eq!(df.shape(), (2, 4));
        let rates: Vec<Option<f64>> = df.column("rate")?.f64()?.into_iter().collect();
        assert_eq!(rates, vec![Some(0.12), None]);
        let dates: Vec<Option<&str>> = df.column("date")?.str()?.into_iter().collect();
        assert_eq!(dates, vec![Some("2021-01-01"), None]);
        Ok(())
    }

    #[test]
    fn mismatched_value_is_a_column_type_error() {
        let mut table = ReportTable::new("test", &[("rate", ColumnKind::Float)]);
        table.push(vec!["oops".into()]);
        assert!(matches!(
            table.to_dataframe(2),
            Err(CovidStatsError::ColumnType(_))
        ));
    }

    #[test]
    fn value_display_rounds_only_for_presentation() {
        let value = Value::from(Some(0.05000000001));
        assert_eq!(value.display(4), "0.0500");
        assert_eq!(Value::Null.display(4), "");
        assert_eq!(Value::from(date(9)).display(4), "2021-01-09");
        assert_eq!(Value::from(0.5).display(400), "0.500000000000000");
    }
}
