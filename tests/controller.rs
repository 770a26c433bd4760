mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use common::{
    FixedCatalog, MockClient, NoopSink, RecordingConnector, Reply, area, area_payload, handles,
    temp_store,
};
use epistats_logger::controller::{BatchController, RunOptions, RunState};
use epistats_logger::domain::{ReplacePolicy, RunMode, Scope};
use epistats_logger::error::StatsError;
use epistats_logger::fetcher::{FetchOutcome, QuotaAwareFetcher};
use epistats_logger::loader::MultiDestinationLoader;
use epistats_logger::store::StagingStore;

fn controller(
    client: MockClient,
    catalog: FixedCatalog,
    store: &StagingStore,
    connector: &RecordingConnector,
) -> BatchController<MockClient, FixedCatalog, RecordingConnector> {
    BatchController::new(
        QuotaAwareFetcher::new(client, catalog, store.clone(), Duration::ZERO),
        MultiDestinationLoader::new(connector.clone(), store.clone(), handles(&["D1", "D2"])),
        store.clone(),
    )
}

#[test]
fn load_only_run_writes_both_destinations_and_clears_staging() {
    let (_temp, store) = temp_store();
    store
        .write(
            Scope::Country,
            &area("US"),
            area_payload("US", &[("2020-01-01", 10, 1, 0), ("2020-01-02", 15, 2, 3)]).as_bytes(),
        )
        .unwrap();
    let connector = RecordingConnector::default();
    let mut controller = controller(
        MockClient::default(),
        FixedCatalog::of(&["US"]),
        &store,
        &connector,
    );

    let report = controller
        .run(
            RunMode::Country,
            ReplacePolicy::SkipFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::CleanedUp);
    assert!(controller.fetcher().client().calls().is_empty());
    for destination in ["D1", "D2"] {
        let dates: Vec<String> = connector
            .register_calls(destination)
            .iter()
            .map(|date| date.to_string())
            .collect();
        assert_eq!(dates, vec!["2020-01-01", "2020-01-02"]);
    }
    assert_eq!(connector.upsert_calls("D1").len() + connector.upsert_calls("D2").len(), 4);
    assert_eq!(connector.upsert_calls("D1"), connector.upsert_calls("D2"));
    assert!(!store.exists(Scope::Country, &area("US")));
    assert_eq!(report.scope(Scope::Country).unwrap().cleared, Some(1));
}

#[test]
fn quota_abort_skips_load_and_cleanup() {
    let (_temp, store) = temp_store();
    let client = MockClient::default()
        .ok("A", area_payload("A", &[("2020-03-01", 1, 0, 0)]))
        .with("B", Reply::Body(200, "quota exceeded".to_string()))
        .ok("C", area_payload("C", &[("2020-03-01", 3, 0, 0)]));
    let connector = RecordingConnector::default();
    let mut controller = controller(client, FixedCatalog::of(&["A", "B", "C"]), &store, &connector);

    let report = controller
        .run(
            RunMode::Country,
            ReplacePolicy::AlwaysFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(controller.state(), RunState::Aborted);
    assert!(store.exists(Scope::Country, &area("A")));
    assert!(!store.exists(Scope::Country, &area("C")));
    assert!(connector.calls().is_empty());
    let scope = report.scope(Scope::Country).unwrap();
    assert!(scope.load.is_none());
    assert!(scope.cleared.is_none());
}

#[test]
fn quota_abort_in_second_scope_keeps_first_scope_staged() {
    let (_temp, store) = temp_store();
    let client = MockClient::default()
        .ok("DE", area_payload("DE", &[("2020-03-01", 1, 0, 0)]))
        .with("US-CA", Reply::Body(429, "Rate limit is exceeded".to_string()));
    let connector = RecordingConnector::default();
    let mut controller = controller(
        client,
        FixedCatalog::of(&["DE"]).with_regions(&["US-CA"]),
        &store,
        &connector,
    );

    let report = controller
        .run(
            RunMode::CountryRegion,
            ReplacePolicy::AlwaysFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert!(store.exists(Scope::Country, &area("DE")));
    assert!(!store.exists(Scope::Region, &area("US-CA")));
    assert!(connector.calls().is_empty());
    assert_matches!(
        report.scope(Scope::Region).unwrap().fetch,
        Some(FetchOutcome::QuotaExceeded { .. })
    );
}

#[test]
fn dual_mode_loads_and_clears_both_scopes() {
    let (_temp, store) = temp_store();
    let client = MockClient::default().ok("FR", area_payload("FR", &[("2020-03-01", 4, 0, 0)]));
    let connector = RecordingConnector::default();
    let mut controller = controller(client, FixedCatalog::of(&["FR"]), &store, &connector);

    let report = controller
        .run(
            RunMode::CountryRegion,
            ReplacePolicy::AlwaysFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::CleanedUp);
    assert_eq!(controller.fetcher().client().calls(), vec!["FR", "FR"]);
    assert_eq!(connector.upsert_calls("D1").len(), 2);
    assert!(store.list_entries(Scope::Country).unwrap().is_empty());
    assert!(store.list_entries(Scope::Region).unwrap().is_empty());
}

#[test]
fn fetch_only_leaves_staging_in_place() {
    let (_temp, store) = temp_store();
    let client = MockClient::default().ok("IT", area_payload("IT", &[("2020-03-01", 4, 0, 0)]));
    let connector = RecordingConnector::default();
    let mut controller = controller(client, FixedCatalog::of(&["IT"]), &store, &connector);

    let report = controller
        .run(
            RunMode::Country,
            ReplacePolicy::AlwaysFetch,
            RunOptions { fetch_only: true },
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::Staged);
    assert!(store.exists(Scope::Country, &area("IT")));
    assert!(connector.calls().is_empty());
}

#[test]
fn all_malformed_files_keep_staging() {
    let (_temp, store) = temp_store();
    store
        .write(Scope::Country, &area("XX"), b"not json")
        .unwrap();
    let connector = RecordingConnector::default();
    let mut controller = controller(
        MockClient::default(),
        FixedCatalog::of(&[]),
        &store,
        &connector,
    );

    let report = controller
        .run(
            RunMode::Country,
            ReplacePolicy::SkipFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::CleanedUp);
    assert!(store.exists(Scope::Country, &area("XX")));
    assert!(report.scope(Scope::Country).unwrap().cleared.is_none());
}

#[test]
fn some_malformed_files_do_not_block_cleanup() {
    let (_temp, store) = temp_store();
    store.write(Scope::Country, &area("XX"), b"not json").unwrap();
    store
        .write(
            Scope::Country,
            &area("YY"),
            area_payload("YY", &[("2020-03-01", 1, 0, 0)]).as_bytes(),
        )
        .unwrap();
    let connector = RecordingConnector::default();
    let mut controller = controller(
        MockClient::default(),
        FixedCatalog::of(&[]),
        &store,
        &connector,
    );

    controller
        .run(
            RunMode::Country,
            ReplacePolicy::SkipFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert!(store.list_entries(Scope::Country).unwrap().is_empty());
}

#[test]
fn fetch_failure_propagates_without_cleanup() {
    let (_temp, store) = temp_store();
    store
        .write(
            Scope::Country,
            &area("AA"),
            area_payload("AA", &[("2020-03-01", 1, 0, 0)]).as_bytes(),
        )
        .unwrap();
    let client = MockClient::default().with("BB", Reply::Transport);
    let connector = RecordingConnector::default();
    let mut controller = controller(client, FixedCatalog::of(&["AA", "BB"]), &store, &connector);

    let err = controller
        .run(
            RunMode::Country,
            ReplacePolicy::SkipIfPresent,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap_err();

    assert_matches!(err, StatsError::FetchFailed { .. });
    assert!(store.exists(Scope::Country, &area("AA")));
    assert!(connector.calls().is_empty());
}

#[test]
fn status_and_clear_report_staged_entries() {
    let (_temp, store) = temp_store();
    store.write(Scope::Region, &area("US-TX"), b"{}").unwrap();
    store.write(Scope::Region, &area("US-AK"), b"{}").unwrap();
    let connector = RecordingConnector::default();
    let controller = controller(
        MockClient::default(),
        FixedCatalog::of(&[]),
        &store,
        &connector,
    );

    let status = controller.status(RunMode::Region).unwrap();
    assert_eq!(status.scopes[0].staged, vec![area("US-AK"), area("US-TX")]);

    assert_eq!(controller.clear(RunMode::Region).unwrap(), 2);
    assert_eq!(controller.clear(RunMode::Region).unwrap(), 0);
}

#[test]
fn not_found_area_is_contained_to_its_file() {
    let (_temp, store) = temp_store();
    let client = MockClient::default()
        .with("AA", Reply::Body(404, r#"{"error":"not found"}"#.to_string()))
        .ok("BB", area_payload("BB", &[("2020-03-01", 2, 0, 0)]));
    let connector = RecordingConnector::default();
    let mut controller = controller(client, FixedCatalog::of(&["AA", "BB"]), &store, &connector);

    let report = controller
        .run(
            RunMode::Country,
            ReplacePolicy::AlwaysFetch,
            RunOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.state, RunState::CleanedUp);
    let load = report.scope(Scope::Country).unwrap().load.clone().unwrap();
    assert_eq!(load.files_malformed, vec![area("AA")]);
    assert_eq!(load.files_loaded, 1);
    assert_eq!(connector.upsert_calls("D1").len(), 1);
    assert!(store.list_entries(Scope::Country).unwrap().is_empty());
}

#[test]
fn production_wiring_requires_a_destination() {
    let temp = tempfile::tempdir().unwrap();
    let config = epistats_logger::config::ResolvedConfig {
        data_folder: camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap(),
        api_key: "key".to_string(),
        base_url: "https://api.example.org/stats".to_string(),
        request_delay: Duration::ZERO,
        destinations: Vec::new(),
    };

    assert_matches!(
        BatchController::from_config(&config).err(),
        Some(StatsError::InvalidConfig(_))
    );
}
