use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use tokio::try_join;

use crate::config::Config;
use crate::error::CovidStatsResult;
use crate::report::{Dataset, ReportRequest, ReportTable};
use crate::store::{DeathMeasures, Measures, Partition, Table, VaccinationMeasures};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod config;
pub mod error;
pub mod filter;
#[cfg(feature = "formatters")]
pub mod formatters;
pub mod loader;
pub mod metrics;
pub mod report;
pub mod segment;
pub mod stats;
pub mod store;
pub mod window;

/// Loaded death and vaccination tables along with the configuration used to load them
pub struct CovidStats {
    pub dataset: Dataset,
    pub config: Config,
}

/// What the loaded tables hold for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSummary {
    pub location: String,
    pub continent: Option<String>,
    pub population: Option<f64>,
    pub death_rows: usize,
    pub vaccination_rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl LocationSummary {
    fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            continent: None,
            population: None,
            death_rows: 0,
            vaccination_rows: 0,
            first_date: None,
            last_date: None,
        }
    }

    /// Widens the summary with one partition. Continent and population are only filled in when
    /// still unknown, so death rows take precedence.
    fn extend<M: Measures>(&mut self, partition: &Partition<'_, M>) {
        if self.continent.is_none() {
            self.continent = partition.continent().map(str::to_string);
        }
        if self.population.is_none() {
            self.population = partition.population();
        }
        self.first_date = self.first_date.into_iter().chain(partition.first_date()).min();
        self.last_date = self.last_date.into_iter().chain(partition.last_date()).max();
    }
}

/// Runs a blocking table load on the blocking thread pool
async fn load_table<M, F>(path: PathBuf, load: F) -> Result<Table<M>>
where
    M: store::Measures,
    F: FnOnce(&Path) -> CovidStatsResult<Table<M>> + Send + 'static,
{
    let table = tokio::task::spawn_blocking(move || {
        load(&path).with_context(|| format!("Failed to load '{}'", path.display()))
    })
    .await??;
    Ok(table)
}

impl CovidStats {
    /// Setup the CovidStats object with default configuration
    pub async fn new() -> Result<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Setup the CovidStats object with custom configuration, loading both tables concurrently
    pub async fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let (deaths, vaccinations) = try_join!(
            load_table(config.deaths_path.clone(), loader::load_deaths),
            load_table(config.vaccinations_path.clone(), loader::load_vaccinations),
        )?;
        info!(
            "Loaded {} death rows and {} vaccination rows",
            deaths.len(),
            vaccinations.len()
        );
        Ok(Self::from_tables(deaths, vaccinations, config))
    }

    pub fn from_tables(
        deaths: Table<DeathMeasures>,
        vaccinations: Table<VaccinationMeasures>,
        config: Config,
    ) -> Self {
        Self {
            dataset: Dataset::new(deaths, vaccinations),
            config,
        }
    }

    /// Runs a report, applying the configured row cap when the request has none
    pub fn run(&self, request: &ReportRequest) -> CovidStatsResult<ReportTable> {
        match (request.params.top, self.config.top) {
            (None, Some(top)) => {
                let mut request = request.clone();
                request.params.top = Some(top);
                self.dataset.run(&request)
            }
            _ => self.dataset.run(request),
        }
    }

    /// Locations present in either table, in ascending order
    pub fn locations(&self) -> Vec<&str> {
        let mut locations: Vec<&str> = self
            .dataset
            .deaths
            .locations()
            .chain(self.dataset.vaccinations.locations())
            .collect();
        locations.sort_unstable();
        locations.dedup();
        locations
    }

    /// One summary per location in either table, in ascending order of location
    pub fn location_summaries(&self) -> Vec<LocationSummary> {
        let mut summaries: BTreeMap<&str, LocationSummary> = BTreeMap::new();
        for partition in self.dataset.deaths.partitions() {
            let summary = summaries
                .entry(partition.location())
                .or_insert_with(|| LocationSummary::new(partition.location()));
            summary.death_rows += partition.len();
            summary.extend(&partition);
        }
        for partition in self.dataset.vaccinations.partitions() {
            let summary = summaries
                .entry(partition.location())
                .or_insert_with(|| LocationSummary::new(partition.location()));
            summary.vaccination_rows += partition.len();
            summary.extend(&partition);
        }
        summaries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportKind;

    fn test_config() -> Config {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../test_data");
        Config {
            deaths_path: root.join("covid_deaths.csv"),
            vaccinations_path: root.join("covid_vaccinations.csv"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn loads_both_tables() -> Result<()> {
        let covid_stats = CovidStats::new_with_config(test_config()).await?;
        let locations = covid_stats.locations();
        assert!(locations.contains(&"World"));
        assert!(locations.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[tokio::test]
    async fn summarises_locations() -> Result<()> {
        let covid_stats = CovidStats::new_with_config(test_config()).await?;
        let summaries = covid_stats.location_summaries();
        assert_eq!(summaries.len(), covid_stats.locations().len());

        let Some(world) = summaries.iter().find(|s| s.location == "World") else {
            panic!("World should be summarised");
        };
        assert_eq!(world.continent, None);
        assert!(world.death_rows > 0);
        assert!(world.first_date <= world.last_date);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let config = Config {
            deaths_path: "does/not/exist.csv".into(),
            ..test_config()
        };
        let Err(error) = CovidStats::new_with_config(config).await else {
            panic!("loading should fail");
        };
        let message = format!("{error:#}");
        assert!(message.contains("does/not/exist.csv"), "{message}");
    }

    #[tokio::test]
    async fn configured_top_caps_reports() -> Result<()> {
        let mut covid_stats = CovidStats::new_with_config(test_config()).await?;
        covid_stats.config.top = Some(1);
        let table = covid_stats.run(&ReportRequest::new(ReportKind::CaseFatality))?;
        assert_eq!(table.len(), 1);
        Ok(())
    }
}
