//! Column names of the two source tables and of the report outputs. The source names must stay in
//! sync with the headers of the published death and vaccination CSV exports.

pub const LOCATION: &str = "location";
pub const DATE: &str = "date";
pub const CONTINENT: &str = "continent";
pub const POPULATION: &str = "population";

pub const NEW_CASES: &str = "new_cases";
pub const TOTAL_CASES: &str = "total_cases";
pub const NEW_DEATHS: &str = "new_deaths";
pub const TOTAL_DEATHS: &str = "total_deaths";

pub const NEW_VACCINATIONS: &str = "new_vaccinations";
pub const TOTAL_VACCINATIONS: &str = "total_vaccinations";
pub const PEOPLE_VACCINATED: &str = "people_vaccinated";
pub const PEOPLE_FULLY_VACCINATED: &str = "people_fully_vaccinated";
pub const TOTAL_BOOSTERS: &str = "total_boosters";
pub const GDP_PER_CAPITA: &str = "gdp_per_capita";
pub const HUMAN_DEVELOPMENT_INDEX: &str = "human_development_index";

// Report output columns
pub const RANK: &str = "rank";
pub const GLOBAL_RANK: &str = "global_rank";
pub const CONTINENT_RANK: &str = "continent_rank";
pub const PERCENT_RANK: &str = "percent_rank";
pub const COUNTRIES: &str = "countries";
pub const THRESHOLD: &str = "threshold";
pub const THRESHOLD_PERCENT: &str = "threshold_percent";
pub const MILESTONE_DATE: &str = "milestone_date";
pub const SNAPSHOT_DATE: &str = "snapshot_date";
pub const TABLE: &str = "table";

pub const CASE_FATALITY_RATE: &str = "case_fatality_rate";
pub const INFECTION_RATE: &str = "infection_rate";
pub const DEATH_RATE_PERCENT: &str = "death_rate_percent";
pub const DAILY_GROWTH_RATE: &str = "daily_growth_rate";
pub const BOOSTER_UPTAKE_RATE: &str = "booster_uptake_rate";
pub const FULLY_VACCINATED_PERCENT: &str = "fully_vaccinated_percent";
