//! End-to-end assignment and completion scenarios over the in-memory store

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};

use split_engine::domain::experiment::{DeclaredAlternative, RandomSource, SeededRandom};
use split_engine::domain::store::{SplitStore, UnavailableStore};
use split_engine::domain::visitor::{RequestContext, VisitorStore};
use split_engine::domain::DomainError;
use split_engine::infrastructure::exclusion::{ExclusionRules, RequestExclusion};
use split_engine::infrastructure::store::InMemoryStore;
use split_engine::infrastructure::visitor::{RedisVisitorStore, SessionVisitorStore};
use split_engine::{CompleteOptions, Registry, RegistrySettings, SplitService};

fn button_color() -> Value {
    json!({
        "button_color": {
            "alternatives": [{"red": 0.5}, {"blue": 0.5}],
            "resettable": false
        }
    })
}

fn service_over(store: Arc<dyn SplitStore>, experiments: &Value) -> SplitService {
    let registry = Registry::new(store)
        .with_experiments(experiments)
        .unwrap();
    SplitService::new(Arc::new(registry)).with_random(Arc::new(SeededRandom::new(7)))
}

fn service(experiments: &Value) -> SplitService {
    service_over(Arc::new(InMemoryStore::new()), experiments)
}

async fn participants(service: &SplitService, name: &str) -> i64 {
    service
        .experiments()
        .find(name)
        .await
        .unwrap()
        .map(|e| e.participant_count())
        .unwrap_or_default()
}

#[tokio::test]
async fn declared_experiment_assigns_and_finishes() {
    let service = service(&button_color());
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    let first = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
    assert!(first == "red" || first == "blue");

    let again = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
    assert_eq!(again, first);

    service
        .complete("button_color", CompleteOptions::default(), &ctx)
        .await
        .unwrap();

    assert_eq!(
        visitor.get("button_color:finished").await.unwrap(),
        Some("true".to_string())
    );
}

#[tokio::test]
async fn non_resettable_completion_counts_once() {
    let service = service(&button_color());
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

    for _ in 0..3 {
        service
            .complete("button_color", CompleteOptions::without_reset(), &ctx)
            .await
            .unwrap();
    }

    let experiment = service.experiments().find("button_color").await.unwrap().unwrap();
    assert_eq!(experiment.alternative(&chosen).unwrap().completed_count(None), 1);
}

#[tokio::test]
async fn resettable_completion_allows_a_fresh_draw() {
    let service = service(&json!({
        "landing": {"alternatives": ["a", "b"]}
    }));
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    service.assign("landing", None, Vec::new(), &ctx).await.unwrap();
    service
        .complete("landing", CompleteOptions::default(), &ctx)
        .await
        .unwrap();

    assert!(visitor.get("landing").await.unwrap().is_none());

    service.assign("landing", None, Vec::new(), &ctx).await.unwrap();
    assert_eq!(participants(&service, "landing").await, 2);
}

#[tokio::test]
async fn winner_is_served_without_writes() {
    let service = service(&button_color());
    service.set_winner("button_color", "blue").await.unwrap();
    let before = participants(&service, "button_color").await;

    for id in 0..10 {
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

        assert_eq!(chosen, "blue", "visitor {}", id);
        assert!(visitor.keys().await.unwrap().is_empty());
    }

    assert_eq!(participants(&service, "button_color").await, before);
}

#[tokio::test]
async fn winner_stops_completion_counting() {
    let service = service(&button_color());
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
    service.set_winner("button_color", &chosen).await.unwrap();

    service
        .complete("button_color", CompleteOptions::default(), &ctx)
        .await
        .unwrap();

    let experiment = service.experiments().find("button_color").await.unwrap().unwrap();
    assert_eq!(experiment.alternative(&chosen).unwrap().completed_count(None), 0);
}

#[tokio::test]
async fn reset_bumps_version_and_zeroes_counters() {
    let service = service(&button_color());
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);
    service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

    let repository = service.registry().repository();
    let config_before = repository.config_version().await.unwrap();
    let version_before = repository.version("button_color").await.unwrap();

    let experiment = service.reset("button_color").await.unwrap();

    assert!(repository.config_version().await.unwrap() > config_before);
    assert!(experiment.version() > version_before);
    assert_eq!(participants(&service, "button_color").await, 0);
    for alternative in service
        .experiments()
        .find("button_color")
        .await
        .unwrap()
        .unwrap()
        .alternatives()
    {
        assert_eq!(alternative.completed_count(None), 0);
    }
}

#[tokio::test]
async fn shape_change_moves_visitor_to_new_key() {
    let service = service(&json!({}));
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    service
        .assign(
            "pricing",
            Some(DeclaredAlternative::named("low")),
            vec![DeclaredAlternative::named("high")],
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(visitor.keys().await.unwrap(), vec!["pricing"]);

    service
        .assign(
            "pricing",
            Some(DeclaredAlternative::named("low")),
            vec![
                DeclaredAlternative::named("high"),
                DeclaredAlternative::named("free"),
            ],
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(visitor.keys().await.unwrap(), vec!["pricing:1"]);
    assert_eq!(participants(&service, "pricing").await, 1);
}

#[derive(Debug, Default)]
struct CountingRandom {
    draws: AtomicUsize,
}

impl RandomSource for CountingRandom {
    fn next_f64(&self) -> f64 {
        self.draws.fetch_add(1, Ordering::SeqCst);
        0.5
    }

    fn next_beta(&self, _alpha: f64, _beta: f64) -> f64 {
        self.draws.fetch_add(1, Ordering::SeqCst);
        0.5
    }
}

#[tokio::test]
async fn single_alternative_never_draws() {
    let random = Arc::new(CountingRandom::default());
    let registry = Registry::new(Arc::new(InMemoryStore::new()));
    let service = SplitService::new(Arc::new(registry)).with_random(random.clone());

    for _ in 0..5 {
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let chosen = service
            .assign("solo", Some(DeclaredAlternative::named("only")), Vec::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(chosen, "only");
    }

    assert_eq!(random.draws.load(Ordering::SeqCst), 0);
    assert_eq!(participants(&service, "solo").await, 5);
}

#[tokio::test]
async fn bots_and_ignored_addresses_get_control() {
    let rules = Arc::new(
        ExclusionRules::default()
            .with_ignored_addresses(["127.0.0.1"])
            .unwrap(),
    );
    let service = service(&button_color());

    for exclusion in [
        RequestExclusion::new(Arc::clone(&rules))
            .with_user_agent("Mozilla/5.0 (compatible; Googlebot/2.1)"),
        RequestExclusion::new(Arc::clone(&rules)).with_ip("127.0.0.1"),
    ] {
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor).with_exclusion(&exclusion);

        let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

        assert_eq!(chosen, "red");
        assert!(visitor.keys().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn workers_sharing_a_store_see_each_others_winners() {
    let store: Arc<dyn SplitStore> = Arc::new(InMemoryStore::new());
    let admin = service_over(Arc::clone(&store), &button_color());
    let worker = service_over(Arc::clone(&store), &button_color());

    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);
    worker.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

    admin.set_winner("button_color", "blue").await.unwrap();

    let fresh = SessionVisitorStore::new();
    let chosen = worker
        .assign("button_color", None, Vec::new(), &RequestContext::new(&fresh))
        .await
        .unwrap();
    assert_eq!(chosen, "blue");

    admin.clear_winner("button_color").await.unwrap();
    worker
        .assign("button_color", None, Vec::new(), &RequestContext::new(&fresh))
        .await
        .unwrap();
    assert!(!fresh.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn visitor_assignments_can_live_in_the_shared_store() {
    let store: Arc<dyn SplitStore> = Arc::new(InMemoryStore::new());
    let service = service_over(Arc::clone(&store), &button_color());

    let on_phone = RedisVisitorStore::new(Arc::clone(&store), "user-1");
    let on_laptop = RedisVisitorStore::new(Arc::clone(&store), "user-1");

    let first = service
        .assign("button_color", None, Vec::new(), &RequestContext::new(&on_phone))
        .await
        .unwrap();
    let second = service
        .assign("button_color", None, Vec::new(), &RequestContext::new(&on_laptop))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(participants(&service, "button_color").await, 1);
}

#[tokio::test]
async fn deleted_experiment_is_forgotten() {
    let service = service(&json!({}));
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    service
        .assign(
            "pricing",
            Some(DeclaredAlternative::named("low")),
            vec![DeclaredAlternative::named("high")],
            &ctx,
        )
        .await
        .unwrap();

    service.delete("pricing").await.unwrap();

    assert!(service.experiments().find("pricing").await.unwrap().is_none());
    assert!(service.experiments().names().await.unwrap().is_empty());
}

#[tokio::test]
async fn metric_completion_reaches_stored_experiments_after_remote_bump() {
    let store: Arc<dyn SplitStore> = Arc::new(InMemoryStore::new());
    let admin = service_over(
        Arc::clone(&store),
        &json!({
            "signup_flow": {"alternatives": ["short", "long"], "metric": "signup"}
        }),
    );
    let worker = service_over(Arc::clone(&store), &json!({}));

    admin.declare().await.unwrap();

    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);
    let chosen = worker.assign("signup_flow", None, Vec::new(), &ctx).await.unwrap();

    // Unrelated admin change moves config_version and clears worker caches
    admin.registry().set_winner("other_exp", "x").await.unwrap();

    worker
        .complete("signup", CompleteOptions::default(), &ctx)
        .await
        .unwrap();

    let experiment = worker.experiments().find("signup_flow").await.unwrap().unwrap();
    assert_eq!(experiment.alternative(&chosen).unwrap().completed_count(None), 1);
}

// ============================================================================
// Fail-over
// ============================================================================

#[tokio::test]
async fn outage_degrades_to_control_with_failover() {
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);

    let registry = Registry::new(Arc::new(UnavailableStore::new()))
        .with_settings(RegistrySettings {
            db_failover: true,
            ..Default::default()
        })
        .with_failover_handler(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .with_experiments(&button_color())
        .unwrap();
    let service = SplitService::new(Arc::new(registry));
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
    assert_eq!(chosen, "red");

    service
        .complete("button_color", CompleteOptions::default(), &ctx)
        .await
        .unwrap();

    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn outage_propagates_without_failover() {
    let registry = Registry::new(Arc::new(UnavailableStore::new()))
        .with_experiments(&button_color())
        .unwrap();
    let service = SplitService::new(Arc::new(registry));
    let visitor = SessionVisitorStore::new();
    let ctx = RequestContext::new(&visitor);

    let err = service
        .assign("button_color", None, Vec::new(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Store { .. }));

    let err = service
        .complete("button_color", CompleteOptions::default(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Store { .. }));
}
