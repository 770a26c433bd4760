use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

static AREA_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,15}$").unwrap());

/// Pseudo-area under which the worldwide summary is staged.
pub const GLOBAL_AREA: &str = "Global";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AreaCode(String);

impl AreaCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn global() -> Self {
        Self(GLOBAL_AREA.to_string())
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AreaCode {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !AREA_CODE_RE.is_match(trimmed) {
            return Err(StatsError::InvalidAreaCode(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for AreaCode {
    type Error = StatsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AreaCode> for String {
    fn from(value: AreaCode) -> Self {
        value.0
    }
}

/// A single area scope. Each scope has its own catalog subset and staging
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Country,
    Region,
    Global,
}

impl Scope {
    pub fn staging_dir_name(self) -> &'static str {
        match self {
            Scope::Country => "CountryStats",
            Scope::Region => "StateStats",
            Scope::Global => "GlobalStats",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Country => write!(f, "country"),
            Scope::Region => write!(f, "region"),
            Scope::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum RunMode {
    #[value(name = "country")]
    #[serde(rename = "country")]
    Country,
    #[value(name = "region", alias = "state")]
    #[serde(rename = "region")]
    Region,
    #[value(name = "country+region", alias = "country_state")]
    #[serde(rename = "country+region")]
    CountryRegion,
    #[value(name = "global")]
    #[serde(rename = "global")]
    Global,
}

impl RunMode {
    /// Expands the mode into the single scopes it is composed of, in
    /// processing order.
    pub fn scopes(self) -> Vec<Scope> {
        match self {
            RunMode::Country => vec![Scope::Country],
            RunMode::Region => vec![Scope::Region],
            RunMode::CountryRegion => vec![Scope::Country, Scope::Region],
            RunMode::Global => vec![Scope::Global],
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Country => write!(f, "country"),
            RunMode::Region => write!(f, "region"),
            RunMode::CountryRegion => write!(f, "country+region"),
            RunMode::Global => write!(f, "global"),
        }
    }
}

impl FromStr for RunMode {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "country" => Ok(RunMode::Country),
            "region" | "state" => Ok(RunMode::Region),
            "country+region" | "country_state" => Ok(RunMode::CountryRegion),
            "global" => Ok(RunMode::Global),
            _ => Err(StatsError::InvalidRunMode(value.to_string())),
        }
    }
}

/// Governs the fetch phase only.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacePolicy {
    SkipFetch,
    SkipIfPresent,
    #[default]
    AlwaysFetch,
}

impl fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacePolicy::SkipFetch => write!(f, "skip-fetch"),
            ReplacePolicy::SkipIfPresent => write!(f, "skip-if-present"),
            ReplacePolicy::AlwaysFetch => write!(f, "always-fetch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub scope: Scope,
    pub area: AreaCode,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStatRecord {
    pub date: NaiveDate,
    pub area: AreaCode,
    pub confirmed: u64,
    pub deaths: u64,
    pub recovered: u64,
}
