//! End-to-end request scenarios against in-process fakes

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{pipeline, scored, test_config, FakeEmbedder, Reply, ScriptedGenerator, ScriptedStore};
use potterbuddy::rag::reranking::{deduplicate, ReRankConfig};
use potterbuddy::rag::{
    fallback_message, CategoryPolicy, ContextAssembler, QueryCategory, RequestOptions, RequestState, RetrievalEngine,
    SearchParams, NO_CONTEXT_MARKER,
};
use potterbuddy::{ErrorKind, PipelineError};

fn dumbledore_candidates() -> Vec<potterbuddy::store::ScoredChunk> {
    vec![
        scored("c1", "Half-Blood Prince, ch. 27", "Snape raised his wand and cast the killing curse at Dumbledore.", 0.91),
        scored("c2", "Deathly Hallows, ch. 33", "Dumbledore had asked Snape to end his life when the time came.", 0.77),
        scored("c3", "Philosopher's Stone, ch. 1", "Mr and Mrs Dursley, of number four, Privet Drive, were proud to say they were perfectly normal.", 0.40),
    ]
}

#[tokio::test]
async fn test_threshold_and_k_limit_retrieval() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let params = SearchParams {
        threshold: 0.5,
        ..SearchParams::default()
    };
    let engine = RetrievalEngine::with_params(
        Arc::new(FakeEmbedder::new()),
        store,
        params,
        ReRankConfig::default(),
        Duration::from_secs(1),
    );

    let result = engine.retrieve("Who killed Dumbledore?", 2, None).await.unwrap();
    assert_eq!(result.chunk_ids(), vec!["c1".to_string(), "c2".to_string()]);
    assert!(result.entries()[0].score >= result.entries()[1].score);
}

#[tokio::test]
async fn test_threshold_and_k_limit_end_to_end() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("Severus Snape killed Dumbledore."));
    let mut config = test_config();
    config.search.threshold = 0.5;
    config.search.top_k = 2;

    let rag = pipeline(store, generator.clone(), config);
    let answer = rag.handle("Who killed Dumbledore?", None).await.unwrap();

    assert_eq!(answer.chunk_ids, vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(answer.passages_used, 2);
    assert_eq!(answer.body, "Severus Snape killed Dumbledore.");
    assert!(answer.text.contains("**Sources:** Half-Blood Prince, ch. 27 (c1), Deathly Hallows, ch. 33 (c2)"));

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.user.contains("killing curse"));
    assert!(!prompt.user.contains("Privet Drive"));
}

#[tokio::test]
async fn test_empty_store_answers_without_context() {
    let engine = RetrievalEngine::new(
        Arc::new(FakeEmbedder::new()),
        Arc::new(ScriptedStore::new(Vec::new())),
    );
    let err = engine.retrieve("Who is Luna Lovegood?", 5, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoResults));

    let generator = Arc::new(ScriptedGenerator::answering("I could not find that in the books."));
    let rag = pipeline(Arc::new(ScriptedStore::new(Vec::new())), generator.clone(), test_config());

    let response = rag.respond("Who is Luna Lovegood?", None).await;
    assert_eq!(response.state(), RequestState::Delivered);
    assert_eq!(generator.calls(), 1);
    assert!(generator.last_prompt().unwrap().user.contains(NO_CONTEXT_MARKER));

    let answer = response.answer().unwrap();
    assert_eq!(answer.passages_used, 0);
    assert!(answer.sources.is_empty());
    assert_eq!(rag.stats().no_context_answers, 1);
}

fn engine_over(store: ScriptedStore, params: SearchParams, timeout: Duration) -> RetrievalEngine {
    RetrievalEngine::with_params(
        Arc::new(FakeEmbedder::new()),
        Arc::new(store),
        params,
        ReRankConfig::default(),
        timeout,
    )
}

#[tokio::test]
async fn test_slow_store_hits_retrieval_deadline() {
    let store = ScriptedStore::new(dumbledore_candidates()).slow(Duration::from_millis(500));
    let engine = engine_over(store, SearchParams::default(), Duration::from_millis(20));

    let err = engine.retrieve("Who killed Dumbledore?", 2, None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Timeout { stage: RequestState::Retrieving, duration_ms: 20 }
    ));
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_category_filter_keeps_only_matching_passages() {
    let mut candidates = dumbledore_candidates();
    candidates[1].chunk = candidates[1].chunk.clone().with_category("character");
    let params = SearchParams {
        category_policy: CategoryPolicy::Filter,
        ..SearchParams::default()
    };
    let engine = engine_over(ScriptedStore::new(candidates), params.clone(), Duration::from_secs(1));

    let result = engine.retrieve("Who killed Dumbledore?", 5, Some("Character")).await.unwrap();
    assert_eq!(result.chunk_ids(), vec!["c2".to_string()]);

    let engine = engine_over(ScriptedStore::new(dumbledore_candidates()), params, Duration::from_secs(1));
    let err = engine.retrieve("Who killed Dumbledore?", 5, Some("location")).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoResults));
}

#[tokio::test]
async fn test_tiny_passages_are_dropped() {
    let mut candidates = dumbledore_candidates();
    candidates.insert(0, scored("tiny", "Half-Blood Prince, ch. 27", "Avada Kedavra!", 0.95));
    let engine = engine_over(ScriptedStore::new(candidates), SearchParams::default(), Duration::from_secs(1));

    let result = engine.retrieve("Who killed Dumbledore?", 5, None).await.unwrap();
    assert!(!result.chunk_ids().contains(&"tiny".to_string()));
    assert_eq!(result.entries()[0].chunk.id, "c1");

    let keep_all = SearchParams {
        min_passage_chars: 0,
        ..SearchParams::default()
    };
    let engine = engine_over(
        ScriptedStore::new(vec![scored("tiny", "Half-Blood Prince, ch. 27", "Avada Kedavra!", 0.95)]),
        keep_all,
        Duration::from_secs(1),
    );
    let result = engine.retrieve("Who killed Dumbledore?", 5, None).await.unwrap();
    assert_eq!(result.chunk_ids(), vec!["tiny".to_string()]);
}

#[test]
fn test_oversized_passage_is_truncated_to_budget() {
    let text = "A".repeat(5000);
    let result = deduplicate(vec![scored("long", "Goblet of Fire", &text, 0.9)], 0.85);

    let context = ContextAssembler::new().assemble(&result, 1000);
    assert_eq!(context.text.chars().count(), 1000);
    assert!(context.truncated);
    assert_eq!(context.passages.len(), 1);
    assert!(context.passages[0].truncated);
    assert_eq!(context.chunk_ids, vec!["long".to_string()]);
}

#[tokio::test]
async fn test_generator_timeout_fails_with_fallback() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![Reply::Slow(
        Duration::from_millis(500),
        "too late".to_string(),
    )]));
    let mut config = test_config();
    config.max_retries = 0;
    config.generation_timeout_ms = 20;

    let rag = pipeline(store, generator, config);
    let response = rag.respond("Who killed Dumbledore?", None).await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::Timeout));
    assert!(response.is_fallback());
    assert_eq!(response.text(), fallback_message(ErrorKind::Timeout));
    assert_eq!(rag.stats().fallbacks.get(&ErrorKind::Timeout), Some(&1));
}

#[tokio::test]
async fn test_whitespace_generation_fails_with_fallback() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("  \n\t  \n"));

    let rag = pipeline(store, generator.clone(), test_config());
    let response = rag.respond("Who killed Dumbledore?", None).await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::EmptyGeneration));
    assert_eq!(response.text(), fallback_message(ErrorKind::EmptyGeneration));
    // Not retryable
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_blank_question_never_reaches_collaborators() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("unused"));

    let rag = pipeline(store.clone(), generator.clone(), test_config());
    let response = rag.respond("   ", None).await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::InvalidQuery));
    assert_eq!(generator.calls(), 0);
    assert_eq!(store.searches.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_store_failure_is_retried() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()).failing_first(1));
    let generator = Arc::new(ScriptedGenerator::answering("Snape did."));

    let rag = pipeline(store.clone(), generator, test_config());
    let answer = rag.handle("Who killed Dumbledore?", None).await.unwrap();

    assert_eq!(answer.body, "Snape did.");
    assert_eq!(store.searches.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(rag.stats().retry_attempts, 1);
}

#[tokio::test]
async fn test_persistent_store_failure_reports_retrieval_unavailable() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()).failing_first(10));
    let generator = Arc::new(ScriptedGenerator::answering("unused"));

    let rag = pipeline(store, generator.clone(), test_config());
    let response = rag.respond("Who killed Dumbledore?", None).await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::RetrievalUnavailable));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generator_failure_then_success() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Reply::Fail("503 service unavailable".to_string()),
        Reply::Text("Snape, on Dumbledore's orders.".to_string()),
    ]));

    let rag = pipeline(store, generator.clone(), test_config());
    let answer = rag.handle("Who killed Dumbledore?", None).await.unwrap();

    assert_eq!(answer.body, "Snape, on Dumbledore's orders.");
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_cancellation_stops_generation() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![Reply::Slow(
        Duration::from_secs(5),
        "never delivered".to_string(),
    )]));
    let rag = pipeline(store, generator, test_config());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let response = rag
        .respond_with("Who killed Dumbledore?", None, &RequestOptions::default(), &cancel)
        .await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_streaming_forwards_fragments_in_order() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![Reply::Fragments(vec![
        "Severus ".to_string(),
        "Snape ".to_string(),
        "cast the curse.".to_string(),
    ])]));
    let rag = pipeline(store, generator, test_config());

    let mut seen = Vec::new();
    let response = rag
        .respond_streaming(
            "Who killed Dumbledore?",
            None,
            &RequestOptions::default(),
            &CancellationToken::new(),
            |fragment| seen.push(fragment.to_string()),
        )
        .await;

    assert_eq!(seen, vec!["Severus ", "Snape ", "cast the curse."]);
    let answer = response.answer().unwrap();
    assert_eq!(answer.body, "Severus Snape cast the curse.");
    // Reported by the stream, not the generator's primary model
    assert_eq!(answer.model.as_deref(), Some("scripted-stream"));
}

#[tokio::test]
async fn test_streaming_deadline_covers_open_and_drain() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![Reply::SlowStream(
        Duration::from_millis(150),
        Duration::from_millis(150),
        vec!["Snape.".to_string()],
    )]));
    let mut config = test_config();
    config.max_retries = 0;
    config.generation_timeout_ms = 200;
    let rag = pipeline(store, generator, config);

    let mut seen = Vec::new();
    let response = rag
        .respond_streaming(
            "Who killed Dumbledore?",
            None,
            &RequestOptions::default(),
            &CancellationToken::new(),
            |fragment| seen.push(fragment.to_string()),
        )
        .await;

    assert_eq!(response.state(), RequestState::Failed(ErrorKind::Timeout));
    assert!(seen.is_empty());
}

#[tokio::test]
async fn test_streaming_open_retries_are_counted() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Reply::Fail("502 bad gateway".to_string()),
        Reply::Fragments(vec!["Snape.".to_string()]),
    ]));
    let rag = pipeline(store, generator.clone(), test_config());

    let response = rag
        .respond_streaming(
            "Who killed Dumbledore?",
            None,
            &RequestOptions::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await;

    assert_eq!(response.answer().unwrap().body, "Snape.");
    assert_eq!(generator.calls(), 2);
    assert_eq!(rag.stats().retry_attempts, 1);
}

#[tokio::test]
async fn test_category_hint_shapes_prompt() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("Both were brave."));
    let rag = pipeline(store, generator.clone(), test_config());

    let answer = rag
        .handle("Tell me about Snape and Dumbledore", Some("comparison"))
        .await
        .unwrap();

    assert_eq!(answer.category, Some(QueryCategory::Comparison));
    assert_eq!(generator.last_prompt().unwrap().category, QueryCategory::Comparison);
    assert!(answer.text.contains("*Query type: Comparison*"));
}

#[tokio::test]
async fn test_request_k_override() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("Snape."));
    let rag = pipeline(store, generator, test_config());

    let options = RequestOptions {
        k: Some(1),
        ..RequestOptions::default()
    };
    let response = rag
        .respond_with("Who killed Dumbledore?", None, &options, &CancellationToken::new())
        .await;

    assert_eq!(response.answer().unwrap().chunk_ids, vec!["c1".to_string()]);
}

#[tokio::test]
async fn test_lifecycle_records_every_stage() {
    let store = Arc::new(ScriptedStore::new(dumbledore_candidates()));
    let generator = Arc::new(ScriptedGenerator::answering("Snape."));
    let rag = pipeline(store, generator, test_config());

    let response = rag.respond("Who killed Dumbledore?", None).await;
    let states: Vec<RequestState> = response.lifecycle.history().iter().map(|(s, _)| *s).collect();

    for stage in [
        RequestState::Retrieving,
        RequestState::Assembling,
        RequestState::Prompting,
        RequestState::Generating,
        RequestState::PostProcessing,
    ] {
        assert!(states.contains(&stage), "missing {:?} in {:?}", stage, states);
    }
    assert_eq!(response.state(), RequestState::Delivered);

    let stats = rag.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.requests_succeeded, 1);
}
