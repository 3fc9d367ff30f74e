//! Validator Pipeline: pre-filter → goal extraction → enhance → search → judge → optional
//! refinement → outcome mapping → proof construction → source selection, per SPEC_FULL.md §4.8.
//!
//! Grounded in the reference client's `worker.rs::run_job`: a linear stage sequence that
//! returns a typed outcome struct on every early-return path, generalized from "compute or
//! fail" to the validation state machine's six terminal outcomes.

use chrono::Utc;
use uuid::Uuid;

use crate::chat::ChatClient;
use crate::db::sources_from_results;
use crate::enhancer::{self, PastAttempt};
use crate::goal_text::{self, PostTextFetcher};
use crate::judge;
use crate::keywords::DEFAULT_REJECTION_KEYWORDS;
use crate::model::{CostLogEntry, LeasedPrediction, Outcome, SearchResult, Source, ValidationResult};
use crate::outcome;
use crate::prefilter::{self, PrefilterOutcome};
use crate::search::{self, SearchClient};
use crate::settings::PipelineConfig;

/// Static system prompts for the two LLM adapters. Exact wording is an external artifact
/// (§4.4); these are the in-repo defaults used when no override is configured.
pub struct Prompts {
    /// System prompt for the Query Enhancer.
    pub enhancer: String,
    /// System prompt for the Result Judge.
    pub judge: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            enhancer: "You generate concise web search queries that help verify whether a \
                       public prediction came true. Respond with only the query text."
                .to_string(),
            judge: "You are a careful fact-checker. Given a claim and search results, decide \
                    whether the evidence shows the claim is true, false, or inconclusive."
                .to_string(),
        }
    }
}

/// Which chat models back the two adapters. They may be the same underlying model (§6).
pub struct Models {
    /// Model used by the Query Enhancer.
    pub enhancer: String,
    /// Model used by the Result Judge.
    pub judge: String,
}

/// Outcome of running the pipeline to completion: the row to persist plus its cost entry.
pub struct PipelineOutput {
    /// The `ValidationResult` to persist.
    pub result: ValidationResult,
    /// The cost log entry to append after commit.
    pub cost_entry: CostLogEntry,
}

struct Totals {
    search_api_calls: u32,
    enhancer_in: u32,
    enhancer_out: u32,
    judge_in: u32,
    judge_out: u32,
}

impl Totals {
    fn new() -> Self {
        Self {
            search_api_calls: 0,
            enhancer_in: 0,
            enhancer_out: 0,
            judge_in: 0,
            judge_out: 0,
        }
    }

    fn cost_entry(&self, prediction_id: i64, prediction_text: String, outcome: Outcome) -> CostLogEntry {
        CostLogEntry {
            prediction_id,
            prediction_text,
            search_api_calls: self.search_api_calls,
            query_enhancer_in_tokens: self.enhancer_in,
            query_enhancer_out_tokens: self.enhancer_out,
            result_judge_in_tokens: self.judge_in,
            result_judge_out_tokens: self.judge_out,
            total_input_tokens: self.enhancer_in + self.judge_in,
            total_output_tokens: self.enhancer_out + self.judge_out,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

fn truncate_proof(proof: &str, max_len: usize) -> String {
    if proof.chars().count() <= max_len {
        return proof.to_string();
    }
    let ellipsis = "...";
    let keep = max_len.saturating_sub(ellipsis.len());
    let mut out: String = proof.chars().take(keep).collect();
    out.push_str(ellipsis);
    out
}

fn build_proof(judgment: &crate::model::Judgment, max_len: usize) -> String {
    let mut proof = judgment.summary.clone();
    if let Some(evidence) = &judgment.evidence {
        proof.push_str("\n\n");
        proof.push_str(evidence);
    }
    if let Some(reasoning) = &judgment.reasoning {
        proof.push_str("\n\nReasoning: ");
        proof.push_str(reasoning);
    }
    truncate_proof(&proof, max_len)
}

fn invalid(
    prediction_id: i64,
    prediction_text: String,
    proof: &str,
    config: &PipelineConfig,
    totals: &Totals,
) -> PipelineOutput {
    let proof = truncate_proof(proof, config.max_proof_len);
    let result = ValidationResult {
        id: Uuid::new_v4(),
        prediction_id,
        outcome: Outcome::Invalid,
        proof,
        sources: vec![],
        created_at: Utc::now(),
    };
    let cost_entry = totals.cost_entry(prediction_id, prediction_text, Outcome::Invalid);
    PipelineOutput { result, cost_entry }
}

fn missing_context(
    prediction_id: i64,
    prediction_text: String,
    proof: &str,
    config: &PipelineConfig,
    totals: &Totals,
) -> PipelineOutput {
    let proof = truncate_proof(proof, config.max_proof_len);
    let result = ValidationResult {
        id: Uuid::new_v4(),
        prediction_id,
        outcome: Outcome::MissingContext,
        proof,
        sources: vec![],
        created_at: Utc::now(),
    };
    let cost_entry = totals.cost_entry(prediction_id, prediction_text, Outcome::MissingContext);
    PipelineOutput { result, cost_entry }
}

/// Run the full pipeline over one leased tuple. Never returns an `Err` for adapter/business
/// failures — those become an `Invalid` row per §7 ("the validation is never left in a
/// half-persisted state"); only the goal-text fetcher's own DB errors propagate, since those
/// indicate the surrounding transaction itself is unhealthy.
pub async fn run(
    leased: &LeasedPrediction,
    fetcher: &dyn PostTextFetcher,
    chat: &dyn ChatClient,
    search_client: &dyn SearchClient,
    prompts: &Prompts,
    models: &Models,
    config: &PipelineConfig,
) -> PipelineOutput {
    let mut totals = Totals::new();
    let prediction_id = leased.prediction.id;

    // Stage: Leased -> pre-filter.
    match prefilter::run(leased, &config.thresholds, DEFAULT_REJECTION_KEYWORDS) {
        PrefilterOutcome::Rejected { reason } => {
            let proof = truncate_proof(&reason, 200.min(config.max_proof_len));
            return invalid(prediction_id, String::new(), &proof, config, &totals);
        }
        PrefilterOutcome::Accepted => {}
    }

    // Stage: goal-text extraction.
    let prediction_text = match goal_text::extract(leased, fetcher).await {
        Ok(text) => text,
        Err(err) => {
            return invalid(
                prediction_id,
                String::new(),
                &format!("Validation error: {err}"),
                config,
                &totals,
            );
        }
    };
    if prediction_text.trim().is_empty() {
        return invalid(
            prediction_id,
            prediction_text,
            "Unable to extract prediction text",
            config,
            &totals,
        );
    }

    // Stage: Initial-Queries.
    let enhanced = match enhancer::enhance_multiple(
        chat,
        &prompts.enhancer,
        &models.enhancer,
        &prediction_text,
        config.initial_queries,
    )
    .await
    {
        Ok(v) => v,
        Err(err) => {
            return invalid(
                prediction_id,
                prediction_text,
                &format!("Validation error: {err}"),
                config,
                &totals,
            );
        }
    };
    totals.enhancer_in += enhanced.tokens.input_tokens;
    totals.enhancer_out += enhanced.tokens.output_tokens;

    // Stage: Searching.
    let mut combined: Vec<SearchResult> =
        match search::fan_out(search_client, &enhanced.queries, config.results_per_query).await {
            Ok(results) => results,
            Err(err) => {
                return invalid(
                    prediction_id,
                    prediction_text,
                    &format!("Validation error: {err}"),
                    config,
                    &totals,
                );
            }
        };
    totals.search_api_calls += enhanced.queries.len() as u32;

    if combined.is_empty() {
        return missing_context(
            prediction_id,
            prediction_text,
            "No search results found",
            config,
            &totals,
        );
    }

    // Stage: Judging-1.
    let mut judgment = match judge::judge(
        chat,
        &prompts.judge,
        &models.judge,
        &prediction_text,
        &combined,
        config.max_total_results,
    )
    .await
    {
        Ok(j) => j,
        Err(err) => {
            return invalid(
                prediction_id,
                prediction_text,
                &format!("Validation error: {err}"),
                config,
                &totals,
            );
        }
    };
    totals.judge_in += judgment.input_tokens;
    totals.judge_out += judgment.output_tokens;

    let needs_refinement = !judgment.sufficient && combined.len() < config.max_total_results;

    if needs_refinement {
        // Stage: Refining. At most one pass (design hook, not live — SPEC_FULL.md §9).
        let past_attempts: Vec<PastAttempt> = enhanced
            .queries
            .iter()
            .map(|q| PastAttempt {
                query: q.clone(),
                successful: false,
                reasoning: judgment.next_query_suggestion.clone(),
            })
            .collect();

        match enhancer::enhance_refine(
            chat,
            &prompts.enhancer,
            &models.enhancer,
            &prediction_text,
            &past_attempts,
        )
        .await
        {
            Ok(refined) => {
                totals.enhancer_in += refined.tokens.input_tokens;
                totals.enhancer_out += refined.tokens.output_tokens;

                let new_results = match search::fan_out(
                    search_client,
                    std::slice::from_ref(&refined.query),
                    config.results_per_query,
                )
                .await
                {
                    Ok(results) => results,
                    Err(err) => {
                        return invalid(
                            prediction_id,
                            prediction_text,
                            &format!("Validation error: {err}"),
                            config,
                            &totals,
                        );
                    }
                };
                totals.search_api_calls += 1;
                combined.extend(new_results);

                // Stage: Judging-2.
                match judge::judge(
                    chat,
                    &prompts.judge,
                    &models.judge,
                    &prediction_text,
                    &combined,
                    config.max_total_results,
                )
                .await
                {
                    Ok(j2) => {
                        totals.judge_in += j2.input_tokens;
                        totals.judge_out += j2.output_tokens;
                        judgment = j2;
                    }
                    Err(err) => {
                        return invalid(
                            prediction_id,
                            prediction_text,
                            &format!("Validation error: {err}"),
                            config,
                            &totals,
                        );
                    }
                }
            }
            Err(err) => {
                return invalid(
                    prediction_id,
                    prediction_text,
                    &format!("Validation error: {err}"),
                    config,
                    &totals,
                );
            }
        }
    }

    // Stage: Mapping.
    let final_outcome = outcome::map(judgment.decision, judgment.score, &config.outcome_cuts);

    // Stage: Formatting.
    let proof = build_proof(&judgment, config.max_proof_len);

    // Stage: Persisting (sources).
    let sources: Vec<Source> = if final_outcome == Outcome::MissingContext {
        vec![]
    } else {
        sources_from_results(&combined, config.max_sources)
    };

    let result = ValidationResult {
        id: Uuid::new_v4(),
        prediction_id,
        outcome: final_outcome,
        proof,
        sources,
        created_at: Utc::now(),
    };
    let cost_entry = totals.cost_entry(prediction_id, prediction_text, final_outcome);

    PipelineOutput { result, cost_entry }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatReply, ChatRequestParams};
    use crate::error::Result;
    use crate::model::{GoalSlice, Post, Prediction, PredictionDetails};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoopFetcher;
    #[async_trait::async_trait]
    impl PostTextFetcher for NoopFetcher {
        async fn fetch_text(&self, _post_id: i64) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, _params: ChatRequestParams) -> Result<ChatReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() {
                String::new()
            } else {
                replies.remove(0)
            };
            Ok(ChatReply {
                content,
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    struct ScriptedSearch {
        results: Vec<SearchResult>,
    }

    #[async_trait::async_trait]
    impl SearchClient for ScriptedSearch {
        async fn search(&self, _query: &str, _num: u32) -> Result<Vec<SearchResult>> {
            Ok(self.results.clone())
        }
    }

    /// Returns one queued batch per call, in FIFO order, regardless of which query asked for it —
    /// used to give the initial fan-out and the refinement fan-out distinct result sets.
    struct BatchedSearch {
        batches: Mutex<std::collections::VecDeque<Vec<SearchResult>>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SearchClient for BatchedSearch {
        async fn search(&self, _query: &str, _num: u32) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut batches = self.batches.lock().unwrap();
            Ok(batches.pop_front().unwrap_or_default())
        }
    }

    /// Returns the queued replies in order for every call except the one right after they run
    /// out, which errors — used to simulate the judge adapter failing on its first invocation.
    struct ChatFailsAfter {
        good_replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatClient for ChatFailsAfter {
        async fn complete(&self, _params: ChatRequestParams) -> Result<ChatReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.good_replies.lock().unwrap();
            if replies.is_empty() {
                return Err(crate::error::Error::Chat("judge unavailable".to_string()));
            }
            Ok(ChatReply {
                content: replies.remove(0),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn result_batch(n: usize, offset: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult {
                url: format!("https://example.com/{}", offset + i),
                title: Some(format!("Result {}", offset + i)),
                excerpt: None,
                pub_date: None,
            })
            .collect()
    }

    fn leased_for(vagueness: Option<f64>) -> LeasedPrediction {
        LeasedPrediction {
            prediction: Prediction {
                id: 42,
                source_post_id: 1,
                goal_slices: vec![GoalSlice {
                    start: 0,
                    end: 10,
                    source_post_id: None,
                }],
                llm_confidence: Some(0.9),
                prediction_quality: Some(80.0),
                vagueness,
            },
            details: PredictionDetails {
                prediction_id: 42,
                prediction_context: Some("Bitcoin closes above 100000 in 2025".to_string()),
                timeframe_start: None,
                timeframe_end: Some(Utc::now() - chrono::Duration::days(1)),
                timeframe_status: Some("resolved".to_string()),
                filter_validation_confidence: Some(0.95),
                filter_validation_reasoning: None,
            },
            post: Post {
                id: 1,
                text: "Bitcoin closes above 100000 in 2025".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn prefilter_rejection_short_circuits_with_no_adapter_calls() {
        let leased = leased_for(Some(0.90));
        let chat = ScriptedChat {
            replies: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        };
        let search_client = ScriptedSearch { results: vec![] };
        let out = run(
            &leased,
            &NoopFetcher,
            &chat,
            &search_client,
            &Prompts::default(),
            &Models {
                enhancer: "m".to_string(),
                judge: "m".to_string(),
            },
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(out.result.outcome, Outcome::Invalid);
        assert!(out.result.proof.starts_with("Prediction too vague: 0.90"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        assert!(out.result.sources.is_empty());
    }

    #[tokio::test]
    async fn clear_true_with_single_pass() {
        let leased = leased_for(Some(0.1));
        let chat = ScriptedChat {
            replies: Mutex::new(vec![
                "bitcoin price 2025 100000 close".to_string(),
                "bitcoin hits 100k news 2025".to_string(),
                "<decision>TRUE</decision><score>10</score><summary>BTC closed above $100k on 2025-08-03</summary><sufficient>true</sufficient>".to_string(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let results: Vec<SearchResult> = (0..12)
            .map(|i| SearchResult {
                url: format!("https://example.com/{i}"),
                title: Some(format!("Result {i}")),
                excerpt: None,
                pub_date: None,
            })
            .collect();
        let search_client = ScriptedSearch { results };

        let out = run(
            &leased,
            &NoopFetcher,
            &chat,
            &search_client,
            &Prompts::default(),
            &Models {
                enhancer: "m".to_string(),
                judge: "m".to_string(),
            },
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(out.result.outcome, Outcome::MaturedTrue);
        assert!(out.result.proof.starts_with("BTC closed above $100k"));
        assert_eq!(out.result.sources.len(), 2);
    }

    #[tokio::test]
    async fn no_search_results_short_circuits_to_missing_context() {
        let leased = leased_for(Some(0.1));
        let chat = ScriptedChat {
            replies: Mutex::new(vec!["q1".to_string(), "q2".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let search_client = ScriptedSearch { results: vec![] };

        let out = run(
            &leased,
            &NoopFetcher,
            &chat,
            &search_client,
            &Prompts::default(),
            &Models {
                enhancer: "m".to_string(),
                judge: "m".to_string(),
            },
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(out.result.outcome, Outcome::MissingContext);
        assert_eq!(out.result.proof, "No search results found");
        assert!(out.result.sources.is_empty());
        // Only the two enhancer calls — the judge is never invoked.
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refinement_pass_matures_mostly_true() {
        let leased = leased_for(Some(0.1));
        let chat = ScriptedChat {
            replies: Mutex::new(vec![
                "bitcoin price 2025".to_string(),
                "bitcoin 100k close".to_string(),
                "<decision>TRUE</decision><score>8</score>\
                 <summary>Partial evidence BTC crossed 100k</summary>\
                 <sufficient>false</sufficient>\
                 <next_query_suggestion>add official exchange site</next_query_suggestion>"
                    .to_string(),
                "bitcoin 100k coinbase official".to_string(),
                "<decision>TRUE</decision><score>8</score>\
                 <summary>Confirmed BTC crossed 100k on official exchange</summary>\
                 <sufficient>true</sufficient>"
                    .to_string(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let search_client = BatchedSearch {
            batches: Mutex::new(
                vec![result_batch(3, 0), result_batch(3, 3), result_batch(5, 6)].into(),
            ),
            calls: AtomicUsize::new(0),
        };

        let out = run(
            &leased,
            &NoopFetcher,
            &chat,
            &search_client,
            &Prompts::default(),
            &Models {
                enhancer: "m".to_string(),
                judge: "m".to_string(),
            },
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(out.result.outcome, Outcome::MaturedMostlyTrue);
        assert!(out.result.proof.starts_with("Confirmed BTC crossed 100k"));
        // Two search fan-outs: the initial 2-query batch, then the single refined query.
        assert_eq!(search_client.calls.load(Ordering::SeqCst), 3);
        // Three enhancer calls (2 initial + 1 refine) plus two judge calls.
        assert_eq!(chat.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn judge_adapter_failure_yields_invalid() {
        let leased = leased_for(Some(0.1));
        let chat = ChatFailsAfter {
            good_replies: Mutex::new(vec!["q1".to_string(), "q2".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let search_client = ScriptedSearch {
            results: result_batch(4, 0),
        };

        let out = run(
            &leased,
            &NoopFetcher,
            &chat,
            &search_client,
            &Prompts::default(),
            &Models {
                enhancer: "m".to_string(),
                judge: "m".to_string(),
            },
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(out.result.outcome, Outcome::Invalid);
        assert!(out.result.proof.starts_with("Validation error: "));
        assert!(out.result.sources.is_empty());
        // Row is still persisted (a `ValidationResult` is always produced, never dropped).
        assert_eq!(out.result.prediction_id, 42);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn proof_truncation_is_idempotent() {
        let short = "a".repeat(700);
        assert_eq!(truncate_proof(&short, 700), short);
        let long = "a".repeat(800);
        let truncated = truncate_proof(&long, 700);
        assert_eq!(truncated.chars().count(), 700);
        assert_eq!(truncate_proof(&truncated, 700), truncated);
    }
}
