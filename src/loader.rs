use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::DestinationHandle;
use crate::destination::{Destination, DestinationConnector};
use crate::domain::{AreaCode, Scope};
use crate::error::StatsError;
use crate::output::{ProgressEvent, ProgressSink};
use crate::parser::StatParser;
use crate::store::StagingStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub files_loaded: usize,
    pub files_malformed: Vec<AreaCode>,
    pub records: usize,
    pub dates_registered: usize,
    pub write_failures: usize,
}

/// Replicates every parsed record to every configured destination, in
/// configured order.
pub struct MultiDestinationLoader<K: DestinationConnector> {
    connector: K,
    store: StagingStore,
    destinations: Vec<DestinationHandle>,
}

impl<K: DestinationConnector> MultiDestinationLoader<K> {
    pub fn new(connector: K, store: StagingStore, destinations: Vec<DestinationHandle>) -> Self {
        Self {
            connector,
            store,
            destinations,
        }
    }

    /// Loads every staged file of `scope`. Malformed files and failed writes
    /// are logged and counted; a destination that cannot be opened fails the
    /// whole call before anything is written.
    pub fn load_all(
        &self,
        scope: Scope,
        sink: &dyn ProgressSink,
    ) -> Result<LoadSummary, StatsError> {
        let entries = self.store.list_entries(scope)?;
        let mut summary = LoadSummary::default();
        if entries.is_empty() {
            sink.event(ProgressEvent::new(format!(
                "phase=Load; {scope}: nothing staged"
            )));
            return Ok(summary);
        }

        let mut open = self
            .destinations
            .iter()
            .map(|handle| self.connector.open(handle))
            .collect::<Result<Vec<_>, _>>()?;

        for entry in entries {
            let started = Instant::now();
            let parsed = match StatParser::parse(&entry) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(%scope, area = %entry.area, error = %err, "skipping staged file");
                    summary.files_malformed.push(entry.area);
                    continue;
                }
            };

            let mut registered = HashSet::new();
            for record in &parsed.records {
                if registered.insert(record.date) {
                    summary.dates_registered += 1;
                    for destination in open.iter_mut() {
                        let result = destination.register_date(record.date);
                        record_failure(&mut summary, &**destination, result);
                    }
                }
                for destination in open.iter_mut() {
                    let result = destination.upsert_day_stat(record);
                    record_failure(&mut summary, &**destination, result);
                }
                summary.records += 1;
            }

            info!(
                %scope,
                area = %parsed.area,
                records = parsed.records.len(),
                "loaded staged file"
            );
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Load; {scope}: {} ({} records)",
                    parsed.area,
                    parsed.records.len()
                ),
                elapsed: Some(started.elapsed()),
            });
            summary.files_loaded += 1;
        }

        Ok(summary)
    }
}

fn record_failure(
    summary: &mut LoadSummary,
    destination: &dyn Destination,
    result: Result<(), StatsError>,
) {
    if let Err(err) = result {
        warn!(destination = destination.name(), error = %err, "destination write failed");
        summary.write_failures += 1;
    }
}
