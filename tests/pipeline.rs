//! End-to-end tests over the public pipeline API.
//!
//! Remote tests use an unroutable endpoint so nothing here ever needs the
//! network; paths that would reach it are exactly the paths that must not.

use std::{sync::Arc, time::Duration};

use tempfile::tempdir;

use kosei::{
    cache::CorrectionCache,
    config::{RemoteConfig, Tunables},
    pipeline::{Corrector, RawText},
    quota::QuotaManager,
    remote::{RemoteCorrector, RetryPolicy},
    suggestion::Stage,
    tokenizer::LexiconTokenizer,
    validator::CorrectionValidator,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A remote config pointing nowhere, for tests that must not hit the wire.
fn offline_remote_config() -> RemoteConfig {
    RemoteConfig {
        endpoint: "http://127.0.0.1:9/generate".to_owned(),
        api_key: "test-key".to_owned(),
        connect_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(500),
    }
}

fn remote_with(
    cache: Arc<CorrectionCache>,
    quota: Arc<QuotaManager>,
) -> RemoteCorrector {
    RemoteCorrector::new(
        offline_remote_config(),
        cache,
        quota,
        Tunables::default(),
        "economics textbook",
    )
    .unwrap()
}

#[tokio::test]
async fn corrects_the_economics_sentence_end_to_end() {
    init_logging();
    let corrector = Corrector::offline();
    let raw = RawText::plain("講要の洪則は雑済学における万有引力の洪則のようなものだ。");
    let result = corrector.correct(&raw).await;
    assert_eq!(
        result.text,
        "需要の法則は経済学における万有引力の法則のようなものだ。"
    );
    assert!(result.confidence >= 0.7);
    assert!(!result.diagnostics.remote_consulted);
}

#[tokio::test]
async fn correction_is_idempotent() {
    init_logging();
    let corrector = Corrector::offline();
    let once = corrector
        .correct(&RawText::plain("講要の洪則と供給の洪則"))
        .await;
    let twice = corrector.correct(&RawText::plain(once.text.clone())).await;
    assert_eq!(once.text, twice.text);
}

#[test]
fn validator_rejects_protected_term_removal_regardless_of_source() {
    init_logging();
    // Even a high-confidence detector proposal must not survive this check.
    let validator = CorrectionValidator::new();
    let result = validator.validate("需要の法則", "雫要の法則");
    assert!(!result.valid);
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn exhausted_quota_skips_the_remote_stage() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    for _ in 0..20 {
        quota.record_call().unwrap();
    }
    let remote = remote_with(cache, quota.clone());

    // A connection attempt to the unroutable endpoint would error and
    // degrade anyway, but quota exhaustion must short-circuit before that:
    // the count stays at the limit.
    let outcome = remote.correct("がこう", 0.3, &[]).await;
    assert_eq!(outcome.text, "がこう");
    assert_eq!(outcome.confidence, 0.3);
    assert_eq!(quota.status().count, 20);
}

#[tokio::test]
async fn cache_hit_short_circuits_the_remote_call() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    cache.put("がこう", "がっこう", 0.9).unwrap();
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota.clone());

    let outcome = remote.correct("がこう", 0.3, &[]).await;
    assert_eq!(outcome.text, "がっこう");
    assert_eq!(outcome.confidence, 0.9);
    assert!(outcome.from_cache);
    // No network call, so no quota was spent.
    assert_eq!(quota.status().count, 0);
}

#[tokio::test]
async fn network_failure_degrades_to_the_input() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota);

    let outcome = remote.correct("講要の洪則", 0.3, &[]).await;
    assert_eq!(outcome.text, "講要の洪則");
    assert_eq!(outcome.confidence, 0.3);
}

#[tokio::test]
async fn confident_text_never_goes_remote() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota.clone());

    let outcome = remote.correct("需要の法則", 0.9, &[]).await;
    assert_eq!(outcome.text, "需要の法則");
    assert_eq!(quota.status().count, 0);
}

#[tokio::test]
async fn overlong_text_never_goes_remote() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota.clone());

    let long = "あ".repeat(600);
    let outcome = remote.correct(&long, 0.3, &[]).await;
    assert_eq!(outcome.text, long);
    assert_eq!(quota.status().count, 0);
}

#[test]
fn rate_limit_retry_honors_the_server_suggested_delay() {
    // The backoff schedule itself; the live retry loop just sleeps on it.
    let policy = RetryPolicy::default();
    assert_eq!(
        policy.backoff_delay(0, Some(Duration::from_secs(5))),
        Duration::from_secs(5)
    );
    assert_eq!(policy.backoff_delay(0, None), Duration::from_secs(1));
    assert_eq!(policy.backoff_delay(1, None), Duration::from_secs(2));
    assert_eq!(policy.backoff_delay(6, None), Duration::from_secs(60));
}

#[tokio::test]
async fn quota_counts_remote_attempts() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota.clone());

    // The call fails on the wire, but budget was committed before the
    // attempt; an unreliable network must not grant free retries forever.
    remote.correct("講要の洪則", 0.3, &[]).await;
    assert_eq!(quota.status().count, 1);
}

#[tokio::test]
async fn pipeline_with_remote_still_fixes_locally() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota);
    let corrector = Corrector::new(
        Arc::new(LexiconTokenizer::new()),
        Tunables::default(),
        Some(remote),
    );

    // Local stages fix everything; the remote stage is consulted for the
    // low-ish aggregate confidence, fails to connect, and changes nothing.
    let result = corrector.correct(&RawText::plain("がつこうへ行く")).await;
    assert_eq!(result.text, "がっこうへ行く");
}

#[tokio::test]
async fn accepted_remote_corrections_appear_in_diagnostics() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    // The local stages leave this text alone, so the remote stage sees it
    // verbatim and the seeded cache answers without touching the network.
    cache
        .put("これはどうですか", "これはどうでしょうか", 0.9)
        .unwrap();
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota);
    let corrector = Corrector::new(
        Arc::new(LexiconTokenizer::new()),
        Tunables::default(),
        Some(remote),
    );

    let result = corrector
        .correct(&RawText::plain("これはどうですか"))
        .await;
    assert_eq!(result.text, "これはどうでしょうか");
    assert!(result.diagnostics.remote_accepted);
    assert!(result.diagnostics.remote_from_cache);
    assert!(result
        .diagnostics
        .applied_edits
        .iter()
        .any(|s| s.stage == Stage::Llm));
}

#[tokio::test]
#[ignore = "talks to the live correction endpoint; needs KOSEI_API_KEY"]
async fn live_remote_corrects_damaged_text() {
    init_logging();
    dotenv::dotenv().ok();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = RemoteCorrector::new(
        kosei::config::RemoteConfig::from_env().expect("KOSEI_API_KEY must be set"),
        cache,
        quota,
        Tunables::default(),
        "economics textbook",
    )
    .unwrap();

    let outcome = remote.correct("講要の洪則について", 0.3, &[]).await;
    assert!(!outcome.text.is_empty());
}

#[tokio::test]
async fn batch_short_circuits_cached_and_confident_texts() {
    init_logging();
    let dir = tempdir().unwrap();
    let cache = Arc::new(CorrectionCache::open(
        &dir.path().join("cache.json"),
        100,
        30,
    ));
    cache.put("がこう", "がっこう", 0.9).unwrap();
    let quota = Arc::new(QuotaManager::open(&dir.path().join("quota.json"), 20));
    let remote = remote_with(cache, quota.clone());

    let texts = vec!["がこう".to_owned(), "需要の法則".to_owned()];
    let outcomes = remote.correct_batch(&texts, &[0.3, 0.9]).await;
    assert_eq!(outcomes[0].text, "がっこう");
    assert!(outcomes[0].from_cache);
    assert_eq!(outcomes[1].text, "需要の法則");
    // Both items were satisfied without the network.
    assert_eq!(quota.status().count, 0);
}
