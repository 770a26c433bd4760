use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::AreaCatalog;
use crate::client::StatsClient;
use crate::domain::{AreaCode, ReplacePolicy, Scope};
use crate::error::StatsError;
use crate::output::{ProgressEvent, ProgressSink};
use crate::store::StagingStore;

/// Substring the API puts in the body once the account allowance is used up.
pub const QUOTA_MARKER: &[u8] = b"exceeded";

const GLOBAL_LOCATION: &str = "global";

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub fetched: Vec<AreaCode>,
    pub skipped: Vec<AreaCode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Completed(FetchSummary),
    /// The remote quota is account-wide, so the whole fetch stopped at
    /// `area`; nothing was staged for it or anything after it.
    QuotaExceeded {
        area: AreaCode,
        summary: FetchSummary,
    },
}

impl FetchOutcome {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, FetchOutcome::QuotaExceeded { .. })
    }

    pub fn summary(&self) -> &FetchSummary {
        match self {
            FetchOutcome::Completed(summary) => summary,
            FetchOutcome::QuotaExceeded { summary, .. } => summary,
        }
    }
}

pub fn is_quota_exceeded(body: &[u8]) -> bool {
    body.windows(QUOTA_MARKER.len())
        .any(|window| window == QUOTA_MARKER)
}

/// Fetches areas one request at a time. `delay` separates any two requests
/// issued through the same fetcher, across scopes and calls.
pub struct QuotaAwareFetcher<C: StatsClient, A: AreaCatalog> {
    client: C,
    catalog: A,
    store: StagingStore,
    delay: Duration,
    last_request: Cell<Option<Instant>>,
}

impl<C: StatsClient, A: AreaCatalog> QuotaAwareFetcher<C, A> {
    pub fn new(client: C, catalog: A, store: StagingStore, delay: Duration) -> Self {
        Self {
            client,
            catalog,
            store,
            delay,
            last_request: Cell::new(None),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn fetch_all(
        &self,
        scope: Scope,
        policy: ReplacePolicy,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, StatsError> {
        let mut summary = FetchSummary::default();
        if policy == ReplacePolicy::SkipFetch {
            sink.event(ProgressEvent::new(format!(
                "phase=Fetch; {scope}: fetch skipped by policy"
            )));
            return Ok(FetchOutcome::Completed(summary));
        }

        let areas = self.catalog.list_areas(scope)?;
        sink.event(ProgressEvent::new(format!(
            "phase=Fetch; {scope}: {} areas in catalog",
            areas.len()
        )));

        for area in areas {
            if policy == ReplacePolicy::SkipIfPresent && self.store.exists(scope, &area) {
                debug!(%scope, %area, "already staged, skipping");
                summary.skipped.push(area);
                continue;
            }

            self.wait_for_slot();
            let location = match scope {
                Scope::Global => GLOBAL_LOCATION.to_string(),
                Scope::Country | Scope::Region => area.to_string(),
            };
            let started = Instant::now();
            let response = self.client.fetch_stats(&location)?;

            if is_quota_exceeded(&response.body) {
                warn!(%scope, %area, "API quota exceeded, aborting fetch");
                sink.event(ProgressEvent::new(format!(
                    "phase=Fetch; {scope}: quota exceeded at {area}"
                )));
                return Ok(FetchOutcome::QuotaExceeded { area, summary });
            }
            if !response.is_success() {
                warn!(%scope, %area, status = response.status, "staging body of failed request");
            }

            self.store.write(scope, &area, &response.body)?;
            info!(
                %scope,
                %area,
                path = %self.store.path_for(scope, &area),
                "staged"
            );
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; {scope}: staged {area}"),
                elapsed: Some(started.elapsed()),
            });
            summary.fetched.push(area);
        }

        Ok(FetchOutcome::Completed(summary))
    }

    fn wait_for_slot(&self) {
        if let Some(last) = self.last_request.get() {
            let remaining = self.delay.saturating_sub(last.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}
