//! Typed parsing of staged API payloads into daily stat records.
//!
//! Area payloads look like
//! `{ location: { isoCode }, stats: { history: [ { date, confirmed, deaths, recovered } ] } }`.
//! The worldwide payload carries the same `stats.history` plus a
//! `stats.breakdowns` array with one running total per country.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{AreaCode, DailyStatRecord, Scope, StagedPayload};
use crate::error::StatsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub area: AreaCode,
    /// Payload order, oldest first for area payloads.
    pub records: Vec<DailyStatRecord>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    location: Option<Location>,
    stats: Option<Stats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    iso_code: Option<String>,
    country_or_region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Stats {
    history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    breakdowns: Vec<Breakdown>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    date: Option<String>,
    confirmed: Option<u64>,
    deaths: Option<u64>,
    recovered: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Breakdown {
    location: Option<Location>,
    total_confirmed_cases: Option<u64>,
    total_deaths: Option<u64>,
    total_recovered_cases: Option<u64>,
}

pub struct StatParser;

impl StatParser {
    pub fn parse(payload: &StagedPayload) -> Result<ParsedPayload, StatsError> {
        let malformed = |reason: String| StatsError::MalformedPayload {
            area: payload.area.to_string(),
            reason,
        };
        let parsed: Payload =
            serde_json::from_slice(&payload.bytes).map_err(|err| malformed(err.to_string()))?;

        match payload.scope {
            Scope::Country | Scope::Region => parse_area(&payload.area, parsed).map_err(malformed),
            Scope::Global => parse_global(&payload.area, parsed).map_err(malformed),
        }
    }
}

fn parse_area(expected: &AreaCode, payload: Payload) -> Result<ParsedPayload, String> {
    let iso_code = payload
        .location
        .and_then(|location| location.iso_code)
        .ok_or_else(|| "location.isoCode missing".to_string())?;
    let area: AreaCode = iso_code
        .parse()
        .map_err(|_| format!("location.isoCode invalid: {iso_code:?}"))?;
    if !area.as_str().eq_ignore_ascii_case(expected.as_str()) {
        return Err(format!(
            "location.isoCode {area} does not match staged area {expected}"
        ));
    }

    let history = payload
        .stats
        .and_then(|stats| stats.history)
        .ok_or_else(|| "stats.history missing".to_string())?;

    let records = history
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let field = |name: &str| format!("stats.history[{index}].{name} missing");
            let date = entry.date.ok_or_else(|| field("date"))?;
            Ok(DailyStatRecord {
                date: parse_date(&date)
                    .ok_or_else(|| format!("stats.history[{index}].date invalid: {date:?}"))?,
                area: area.clone(),
                confirmed: entry.confirmed.ok_or_else(|| field("confirmed"))?,
                deaths: entry.deaths.ok_or_else(|| field("deaths"))?,
                recovered: entry.recovered.ok_or_else(|| field("recovered"))?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(ParsedPayload { area, records })
}

/// One record per country breakdown, all dated with the last history entry.
fn parse_global(area: &AreaCode, payload: Payload) -> Result<ParsedPayload, String> {
    let stats = payload
        .stats
        .ok_or_else(|| "stats missing".to_string())?;
    let history = stats
        .history
        .ok_or_else(|| "stats.history missing".to_string())?;
    let Some(last) = history.last() else {
        return Ok(ParsedPayload {
            area: area.clone(),
            records: Vec::new(),
        });
    };
    let date = last
        .date
        .as_deref()
        .ok_or_else(|| "stats.history[last].date missing".to_string())?;
    let date = parse_date(date).ok_or_else(|| format!("stats.history[last].date invalid: {date:?}"))?;

    let mut records = Vec::with_capacity(stats.breakdowns.len());
    for (index, breakdown) in stats.breakdowns.into_iter().enumerate() {
        let Some(location) = breakdown.location else {
            continue;
        };
        let (Some(iso_code), Some(_)) = (location.iso_code, location.country_or_region) else {
            continue;
        };
        let Ok(code) = iso_code.parse::<AreaCode>() else {
            debug!(index, iso_code = %iso_code, "skipping breakdown with unusable isoCode");
            continue;
        };
        let field = |name: &str| format!("stats.breakdowns[{index}].{name} missing");
        records.push(DailyStatRecord {
            date,
            area: code,
            confirmed: breakdown
                .total_confirmed_cases
                .ok_or_else(|| field("totalConfirmedCases"))?,
            deaths: breakdown.total_deaths.ok_or_else(|| field("totalDeaths"))?,
            recovered: breakdown
                .total_recovered_cases
                .ok_or_else(|| field("totalRecoveredCases"))?,
        });
    }

    Ok(ParsedPayload {
        area: area.clone(),
        records,
    })
}

/// Accepts `YYYY-MM-DD` and timestamps starting with it.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let day = value.get(..10)?;
    if value.len() > 10 && !value[10..].starts_with(['T', ' ']) {
        return None;
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
