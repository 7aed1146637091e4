//! Probe runs against the in-memory store's consistency models.

use std::time::Duration;

use cp_common::{ReadStrategy, RunPrefix};
use cp_config::{StoreConfig, VisibilityConfig, VisibilityMode};
use cp_core::inspect;
use cp_core::logging::LogContext;
use cp_core::probe::{ProbeOptions, ProbeRunner, RecordingProbeLog};
use cp_core::store::{MemoryStore, Visibility};

fn options(strategy: ReadStrategy, trials: u32) -> ProbeOptions {
    ProbeOptions {
        strategy,
        kind: "testkind".to_string(),
        trial_count: trials,
        attempt_delay: Duration::ZERO,
        max_attempts: 50,
    }
}

fn run(store: &MemoryStore, strategy: ReadStrategy, trials: u32) -> cp_core::ProbeResult {
    let log = RecordingProbeLog::new();
    ProbeRunner::new(store, &log, options(strategy, trials))
        .run(RunPrefix::now())
        .unwrap()
}

#[test]
fn read_lag_shows_up_in_retry_counts() {
    for strategy in [
        ReadStrategy::LookupByKey,
        ReadStrategy::IndexedQuery,
        ReadStrategy::ProjectionQuery,
    ] {
        let store = MemoryStore::new(Visibility::AfterReads(3));
        let result = run(&store, strategy, 4);
        assert_eq!(result.retry.mean(), Some(3.0), "{}", strategy);
        assert_eq!(result.exhausted, 0);
    }
}

#[test]
fn ancestor_queries_are_strongly_consistent_by_default() {
    let store = MemoryStore::new(Visibility::AfterReads(3));
    let result = run(&store, ReadStrategy::AncestorQuery, 4);
    assert_eq!(result.retry.mean(), Some(1.0));
}

#[test]
fn ancestor_queries_lag_when_configured() {
    let store = MemoryStore::new(Visibility::AfterReads(3)).with_ancestor_consistency(false);
    let result = run(&store, ReadStrategy::AncestorQuery, 4);
    assert_eq!(result.retry.mean(), Some(3.0));
}

#[test]
fn wall_clock_lag_bounds_latency() {
    let store = MemoryStore::new(Visibility::AfterMillis(Duration::from_millis(10)));
    let log = RecordingProbeLog::new();
    let mut opts = options(ReadStrategy::LookupByKey, 2);
    opts.attempt_delay = Duration::from_millis(2);
    opts.max_attempts = 400;
    let result = ProbeRunner::new(&store, &log, opts)
        .run(RunPrefix::now())
        .unwrap();

    assert_eq!(result.exhausted, 0);
    assert!(result.latency_ms.min().unwrap() >= 9.0);
    assert!(result.retry.min().unwrap() > 1.0);
}

#[test]
fn never_visible_exhausts_every_trial() {
    let config = StoreConfig {
        visibility: VisibilityConfig {
            mode: VisibilityMode::Never,
            reads: None,
            millis: None,
        },
        ancestor_consistent: true,
    };
    let store = MemoryStore::from_config(&config);
    let log = RecordingProbeLog::new();
    let mut opts = options(ReadStrategy::IndexedQuery, 2);
    opts.max_attempts = 3;
    let result = ProbeRunner::new(&store, &log, opts)
        .run(RunPrefix::now())
        .unwrap();

    assert_eq!(result.exhausted, 2);
    assert_eq!(result.retry.max(), Some(4.0));
}

#[test]
fn runs_accumulate_in_a_shared_store() {
    let store = MemoryStore::default();
    run(&store, ReadStrategy::IndexedQuery, 5);
    run(&store, ReadStrategy::AncestorQuery, 5);

    let ctx = LogContext::new("run-test", "host-test");
    let direct = inspect::count_entities(&store, "testkind", &ctx).unwrap();
    let paged = inspect::count_entities_paged(&store, "testkind", 3, &ctx).unwrap();
    assert_eq!(direct.count, 11);
    assert_eq!(paged.count, 11);
    assert_eq!(paged.pages, Some(4));

    let stat = inspect::kind_stat(&store, "testkind", &ctx).unwrap();
    assert_eq!(stat.count, 11);
    assert!(stat.bytes > 0);
}
