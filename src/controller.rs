use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{AreaCatalog, SqliteAreaCatalog};
use crate::client::{StatsClient, StatsHttpClient};
use crate::config::ResolvedConfig;
use crate::destination::{DestinationConnector, SqliteConnector};
use crate::domain::{AreaCode, ReplacePolicy, RunMode, Scope};
use crate::error::StatsError;
use crate::fetcher::{FetchOutcome, QuotaAwareFetcher};
use crate::loader::{LoadSummary, MultiDestinationLoader};
use crate::output::{ProgressEvent, ProgressSink};
use crate::store::StagingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching,
    /// Fetch-only invocation finished; staging is left for a later load.
    Staged,
    Loaded,
    Aborted,
    CleanedUp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub fetch_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub scope: Scope,
    pub fetch: Option<FetchOutcome>,
    pub load: Option<LoadSummary>,
    pub cleared: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub policy: ReplacePolicy,
    pub state: RunState,
    pub scopes: Vec<ScopeReport>,
}

impl RunReport {
    pub fn scope(&self, scope: Scope) -> Option<&ScopeReport> {
        self.scopes.iter().find(|report| report.scope == scope)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mode: RunMode,
    pub scopes: Vec<ScopeStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeStatus {
    pub scope: Scope,
    pub directory: String,
    pub staged: Vec<AreaCode>,
}

pub struct BatchController<C: StatsClient, A: AreaCatalog, K: DestinationConnector> {
    fetcher: QuotaAwareFetcher<C, A>,
    loader: MultiDestinationLoader<K>,
    store: StagingStore,
    state: RunState,
}

impl BatchController<StatsHttpClient, SqliteAreaCatalog, SqliteConnector> {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, StatsError> {
        let store = StagingStore::new(&config.data_folder);
        let client = StatsHttpClient::new(config)?;
        let primary = config.primary_destination().ok_or_else(|| {
            StatsError::InvalidConfig("at least one destination is required".to_string())
        })?;
        let catalog = SqliteAreaCatalog::new(primary.clone());
        Ok(Self::new(
            QuotaAwareFetcher::new(client, catalog, store.clone(), config.request_delay),
            MultiDestinationLoader::new(SqliteConnector, store.clone(), config.destinations.clone()),
            store,
        ))
    }
}

impl<C: StatsClient, A: AreaCatalog, K: DestinationConnector> BatchController<C, A, K> {
    pub fn new(
        fetcher: QuotaAwareFetcher<C, A>,
        loader: MultiDestinationLoader<K>,
        store: StagingStore,
    ) -> Self {
        Self {
            fetcher,
            loader,
            store,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn fetcher(&self) -> &QuotaAwareFetcher<C, A> {
        &self.fetcher
    }

    /// Runs fetch, load and cleanup for every scope of `mode`.
    ///
    /// A quota abort in any scope ends the invocation in `Aborted`: no scope
    /// is loaded and nothing is cleared, so whatever was staged stays
    /// available to the next invocation.
    pub fn run(
        &mut self,
        mode: RunMode,
        policy: ReplacePolicy,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, StatsError> {
        self.state = RunState::Idle;
        let scopes = mode.scopes();
        let mut reports: Vec<ScopeReport> = scopes
            .iter()
            .map(|&scope| ScopeReport {
                scope,
                fetch: None,
                load: None,
                cleared: None,
            })
            .collect();

        self.transition(RunState::Fetching);
        let mut aborted_at = None;
        for report in reports.iter_mut() {
            let outcome = self.fetcher.fetch_all(report.scope, policy, sink)?;
            let aborted = outcome.is_quota_exceeded();
            report.fetch = Some(outcome);
            if aborted {
                aborted_at = Some(report.scope);
                break;
            }
        }
        if let Some(scope) = aborted_at {
            self.transition(RunState::Aborted);
            warn!(%mode, %scope, "fetch aborted on quota; load and cleanup skipped");
            return Ok(self.report(mode, policy, reports));
        }

        if options.fetch_only {
            self.transition(RunState::Staged);
            return Ok(self.report(mode, policy, reports));
        }

        for report in reports.iter_mut() {
            report.load = Some(self.loader.load_all(report.scope, sink)?);
        }
        self.transition(RunState::Loaded);

        for report in reports.iter_mut() {
            let Some(load) = &report.load else {
                continue;
            };
            if load.files_loaded == 0 && !load.files_malformed.is_empty() {
                warn!(
                    scope = %report.scope,
                    malformed = load.files_malformed.len(),
                    "no staged file could be loaded; keeping staging"
                );
                continue;
            }
            let cleared = self.store.clear(report.scope)?;
            sink.event(ProgressEvent::new(format!(
                "phase=Cleanup; {}: removed {cleared} staged files",
                report.scope
            )));
            report.cleared = Some(cleared);
        }
        self.transition(RunState::CleanedUp);

        Ok(self.report(mode, policy, reports))
    }

    /// Lists staged entries per scope without touching anything.
    pub fn status(&self, mode: RunMode) -> Result<StatusReport, StatsError> {
        let scopes = mode
            .scopes()
            .into_iter()
            .map(|scope| {
                Ok(ScopeStatus {
                    scope,
                    directory: self.store.scope_dir(scope).to_string(),
                    staged: self.store.list_areas(scope)?,
                })
            })
            .collect::<Result<Vec<_>, StatsError>>()?;
        Ok(StatusReport { mode, scopes })
    }

    /// Deletes staging for every scope of `mode`.
    pub fn clear(&self, mode: RunMode) -> Result<usize, StatsError> {
        let mut removed = 0;
        for scope in mode.scopes() {
            removed += self.store.clear(scope)?;
        }
        info!(%mode, removed, "cleared staging");
        Ok(removed)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    fn report(&self, mode: RunMode, policy: ReplacePolicy, scopes: Vec<ScopeReport>) -> RunReport {
        RunReport {
            mode,
            policy,
            state: self.state,
            scopes,
        }
    }
}
