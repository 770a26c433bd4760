#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camino::Utf8PathBuf;
use chrono::NaiveDate;

use epistats_logger::catalog::AreaCatalog;
use epistats_logger::client::{StatsClient, StatsResponse};
use epistats_logger::config::DestinationHandle;
use epistats_logger::destination::{Destination, DestinationConnector};
use epistats_logger::domain::{AreaCode, DailyStatRecord, Scope};
use epistats_logger::error::StatsError;
use epistats_logger::output::{ProgressEvent, ProgressSink};
use epistats_logger::store::StagingStore;

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn area(code: &str) -> AreaCode {
    code.parse().unwrap()
}

pub fn temp_store() -> (tempfile::TempDir, StagingStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = StagingStore::new(&root);
    (temp, store)
}

pub fn area_payload(code: &str, history: &[(&str, u64, u64, u64)]) -> String {
    let entries = history
        .iter()
        .map(|(date, confirmed, deaths, recovered)| {
            format!(
                r#"{{"date":"{date}T00:00:00","confirmed":{confirmed},"deaths":{deaths},"recovered":{recovered}}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"location":{{"isoCode":"{code}","countryOrRegion":"{code}"}},"stats":{{"history":[{entries}]}}}}"#
    )
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body(u16, String),
    Transport,
}

#[derive(Default)]
pub struct MockClient {
    replies: HashMap<String, Reply>,
    pub calls: Mutex<Vec<String>>,
    pub call_times: Mutex<Vec<Instant>>,
}

impl MockClient {
    pub fn with(mut self, location: &str, reply: Reply) -> Self {
        self.replies.insert(location.to_string(), reply);
        self
    }

    pub fn ok(self, location: &str, body: String) -> Self {
        self.with(location, Reply::Body(200, body))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

impl StatsClient for MockClient {
    fn fetch_stats(&self, location: &str) -> Result<StatsResponse, StatsError> {
        self.call_times.lock().unwrap().push(Instant::now());
        self.calls.lock().unwrap().push(location.to_string());
        match self.replies.get(location) {
            Some(Reply::Body(status, body)) => Ok(StatsResponse {
                status: *status,
                body: body.as_bytes().to_vec(),
            }),
            Some(Reply::Transport) | None => Err(StatsError::FetchFailed {
                location: location.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Same codes for every scope unless regions are given separately.
pub struct FixedCatalog {
    countries: Vec<AreaCode>,
    regions: Option<Vec<AreaCode>>,
}

impl FixedCatalog {
    pub fn of(codes: &[&str]) -> Self {
        Self {
            countries: codes.iter().map(|code| area(code)).collect(),
            regions: None,
        }
    }

    pub fn with_regions(mut self, codes: &[&str]) -> Self {
        self.regions = Some(codes.iter().map(|code| area(code)).collect());
        self
    }
}

impl AreaCatalog for FixedCatalog {
    fn list_areas(&self, scope: Scope) -> Result<Vec<AreaCode>, StatsError> {
        match scope {
            Scope::Global => Ok(vec![AreaCode::global()]),
            Scope::Country => Ok(self.countries.clone()),
            Scope::Region => Ok(self
                .regions
                .clone()
                .unwrap_or_else(|| self.countries.clone())),
        }
    }
}

pub struct BrokenCatalog;

impl AreaCatalog for BrokenCatalog {
    fn list_areas(&self, _scope: Scope) -> Result<Vec<AreaCode>, StatsError> {
        Err(StatsError::CatalogUnavailable("reference db offline".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RegisterDate(String, NaiveDate),
    UpsertDayStat(String, DailyStatRecord),
}

/// Records every write per destination name; destinations listed in
/// `failing` reject every write.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub failing: Vec<String>,
    pub unavailable: Vec<String>,
}

impl RecordingConnector {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn register_calls(&self, destination: &str) -> Vec<NaiveDate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::RegisterDate(name, date) if name == destination => Some(date),
                _ => None,
            })
            .collect()
    }

    pub fn upsert_calls(&self, destination: &str) -> Vec<DailyStatRecord> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UpsertDayStat(name, record) if name == destination => Some(record),
                _ => None,
            })
            .collect()
    }
}

struct RecordingDestination {
    name: String,
    fail: bool,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Destination for RecordingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_date(&mut self, date: NaiveDate) -> Result<(), StatsError> {
        if self.fail {
            return Err(StatsError::DestinationWriteFailed {
                destination: self.name.clone(),
                message: "disk full".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::RegisterDate(self.name.clone(), date));
        Ok(())
    }

    fn upsert_day_stat(&mut self, record: &DailyStatRecord) -> Result<(), StatsError> {
        if self.fail {
            return Err(StatsError::DestinationWriteFailed {
                destination: self.name.clone(),
                message: "disk full".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::UpsertDayStat(self.name.clone(), record.clone()));
        Ok(())
    }
}

impl DestinationConnector for RecordingConnector {
    fn open(&self, handle: &DestinationHandle) -> Result<Box<dyn Destination>, StatsError> {
        if self.unavailable.contains(&handle.name) {
            return Err(StatsError::DestinationUnavailable {
                destination: handle.name.clone(),
                message: "login failed".to_string(),
            });
        }
        Ok(Box::new(RecordingDestination {
            name: handle.name.clone(),
            fail: self.failing.contains(&handle.name),
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub fn handles(names: &[&str]) -> Vec<DestinationHandle> {
    names
        .iter()
        .map(|name| DestinationHandle {
            name: name.to_string(),
            path: Utf8PathBuf::from(format!("{name}.sqlite")),
        })
        .collect()
}
