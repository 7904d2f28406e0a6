//! Property tests for retrieval ordering, context budget, and prompt framing

mod common;

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{scored, FakeEmbedder, ScriptedStore};
use potterbuddy::rag::reranking::{deduplicate, sort_by_score, ReRankConfig};
use potterbuddy::rag::{ContextAssembler, PromptBuilder, RetrievalEngine, RetrievalResult, SearchParams};
use potterbuddy::store::ScoredChunk;

fn candidates(raw: &[(u8, u8, String)]) -> Vec<ScoredChunk> {
    raw.iter()
        .map(|(id, score, text)| {
            scored(
                &format!("c{}", id % 16),
                &format!("Book {}", id % 7),
                text,
                *score as f32 / 255.0,
            )
        })
        .collect()
}

fn ranked(raw: &[(u8, u8, String)]) -> RetrievalResult {
    let mut list = candidates(raw);
    sort_by_score(&mut list);
    deduplicate(list, 0.85)
}

#[quickcheck]
fn prop_context_never_exceeds_budget(raw: Vec<(u8, u8, String)>, budget: u16) -> bool {
    let budget = budget as usize;
    let context = ContextAssembler::new().assemble(&ranked(&raw), budget);
    context.char_len() <= budget
}

#[quickcheck]
fn prop_assembly_is_idempotent(raw: Vec<(u8, u8, String)>, budget: u16) -> bool {
    let results = ranked(&raw);
    let assembler = ContextAssembler::new();
    assembler.assemble(&results, budget as usize) == assembler.assemble(&results, budget as usize)
}

#[quickcheck]
fn prop_context_keeps_rank_order(raw: Vec<(u8, u8, String)>) -> bool {
    let context = ContextAssembler::new().assemble(&ranked(&raw), 100_000);
    context.passages.windows(2).all(|w| w[0].score >= w[1].score && w[0].index < w[1].index)
}

#[quickcheck]
fn prop_retrieval_sorted_unique_and_bounded(raw: Vec<(u8, u8, String)>, k: u8) -> TestResult {
    let k = k as usize % 10;
    if k == 0 {
        return TestResult::discard();
    }

    let engine = RetrievalEngine::with_params(
        Arc::new(FakeEmbedder::new()),
        Arc::new(ScriptedStore::new(candidates(&raw))),
        SearchParams {
            threshold: 0.0,
            candidate_multiplier: 100,
            min_passage_chars: 0,
            ..SearchParams::default()
        },
        ReRankConfig::default(),
        Duration::from_secs(5),
    );

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let result = match runtime.block_on(engine.retrieve("Who is the Half-Blood Prince?", k, None)) {
        Ok(result) => result,
        Err(_) => return TestResult::from_bool(raw.is_empty()),
    };

    let entries = result.entries();
    let sorted = entries.windows(2).all(|w| w[0].score >= w[1].score);
    let ids: HashSet<&str> = entries.iter().map(|e| e.chunk.id.as_str()).collect();
    let in_range = entries.iter().all(|e| (0.0..=1.0).contains(&e.score));

    TestResult::from_bool(sorted && ids.len() == entries.len() && entries.len() <= k && in_range)
}

#[quickcheck]
fn prop_passages_cannot_close_the_context_block(raw: Vec<(u8, u8, String)>, question: String) -> TestResult {
    if question.trim().is_empty() {
        return TestResult::discard();
    }

    let context = ContextAssembler::new().assemble(&ranked(&raw), 4000);
    let prompt = PromptBuilder::new().build(&question, &context, None);

    TestResult::from_bool(
        prompt.user.matches("</context>").count() == 1 && prompt.user.matches("<question>").count() == 1,
    )
}
