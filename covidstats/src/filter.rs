//! Location filters applied before a report is computed.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CovidStatsError, CovidStatsResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Regex,
    #[default]
    Exact,
    Contains,
    Startswith,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaseSensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

/// Matches location names. Multiple values are combined with OR.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationFilter {
    pub values: Vec<String>,
    pub match_type: MatchType,
    pub case_sensitivity: CaseSensitivity,
}

impl LocationFilter {
    pub fn new(
        values: Vec<String>,
        match_type: MatchType,
        case_sensitivity: CaseSensitivity,
    ) -> Self {
        Self {
            values,
            match_type,
            case_sensitivity,
        }
    }

    pub fn exact(value: &str) -> Self {
        Self::new(vec![value.to_string()], MatchType::Exact, CaseSensitivity::Insensitive)
    }

    fn pattern(&self, value: &str) -> String {
        let body = match self.match_type {
            MatchType::Regex => value.to_string(),
            MatchType::Exact => format!("^{}$", regex::escape(value)),
            MatchType::Contains => regex::escape(value),
            MatchType::Startswith => format!("^{}", regex::escape(value)),
        };
        match self.case_sensitivity {
            CaseSensitivity::Insensitive => format!("(?i){body}"),
            CaseSensitivity::Sensitive => body,
        }
    }

    /// Compiles the filter. An empty filter matches every location.
    pub fn compile(&self) -> CovidStatsResult<CompiledLocationFilter> {
        let regexes = self
            .values
            .iter()
            .map(|value| {
                Regex::new(&self.pattern(value)).map_err(|e| {
                    CovidStatsError::InvalidParameter(format!("location filter '{value}': {e}"))
                })
            })
            .collect::<CovidStatsResult<Vec<_>>>()?;
        Ok(CompiledLocationFilter { regexes })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledLocationFilter {
    regexes: Vec<Regex>,
}

impl CompiledLocationFilter {
    pub fn matches(&self, location: &str) -> bool {
        self.regexes.is_empty() || self.regexes.iter().any(|re| re.is_match(location))
    }
}
