//! Query Enhancer: turns a prediction text into search queries, per SPEC_FULL.md §4.4.
//!
//! Fan-out shape grounded in the reference client's `worker.rs::compute_witness_batch`
//! (parallel per-item dispatch with per-item parameter variation — there it was per-job
//! squaring budget, here it is per-angle temperature).

use crate::chat::{ChatClient, ChatMessage, ChatRequestParams};
use crate::error::Result;

/// One of the three fixed "angles" used to diversify initial queries.
const ANGLES: &[&str] = &[
    "Produce a direct factual search query that would find sources confirming or refuting the main claim.",
    "Produce a search query aimed at news articles or reports covering this topic.",
    "Produce a search query using synonyms or alternative keywords for the same claim.",
];

const MAX_OUTPUT_TOKENS: u32 = 200;
const BASE_TEMPERATURE: f32 = 0.7;
const TEMPERATURE_STEP: f32 = 0.1;

/// A previously attempted, unsuccessful query, fed back into a refinement call.
#[derive(Debug, Clone)]
pub struct PastAttempt {
    /// The query text that was tried.
    pub query: String,
    /// Always `false` by construction (§4.8: "each marked unsuccessful").
    pub successful: bool,
    /// The judge's follow-up suggestion after this attempt, if any.
    pub reasoning: Option<String>,
}

/// Token totals aggregated across one `enhance_multiple`/`enhance_refine` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTotals {
    /// Total input tokens.
    pub input_tokens: u32,
    /// Total output tokens.
    pub output_tokens: u32,
}

/// Output of `enhance_multiple`.
#[derive(Debug, Clone)]
pub struct EnhancedQueries {
    /// The generated queries, one per requested angle.
    pub queries: Vec<String>,
    /// Aggregated token usage across all parallel calls.
    pub tokens: TokenTotals,
}

/// Output of `enhance_refine`.
#[derive(Debug, Clone)]
pub struct RefinedQuery {
    /// The generated follow-up query.
    pub query: String,
    /// Token usage for this single call.
    pub tokens: TokenTotals,
}

fn normalize(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or("").trim();
    strip_quotes(first_line).to_string()
}

fn strip_quotes(s: &str) -> &str {
    const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}'), ('\u{2018}', '\u{2019}')];
    let mut chars = s.chars();
    let first = chars.next();
    let last = s.chars().last();
    if let (Some(f), Some(l)) = (first, last) {
        if QUOTE_PAIRS.iter().any(|(open, close)| f == *open && l == *close) && s.chars().count() > 1 {
            let start = f.len_utf8();
            let end = s.len() - l.len_utf8();
            return &s[start..end];
        }
    }
    s
}

/// Issue `n` chat calls in parallel (`n <= ANGLES.len()`), one per fixed angle, each at a
/// progressively higher temperature, and return the normalized queries plus aggregated tokens.
pub async fn enhance_multiple(
    client: &dyn ChatClient,
    system_prompt: &str,
    model: &str,
    prediction_text: &str,
    n: usize,
) -> Result<EnhancedQueries> {
    let n = n.min(ANGLES.len());

    let futures = ANGLES[..n].iter().enumerate().map(|(i, angle)| async move {
        client
            .complete(ChatRequestParams {
                messages: vec![
                    ChatMessage::system(system_prompt),
                    ChatMessage::user(format!("{angle}\n\nClaim: {prediction_text}")),
                ],
                model: model.to_string(),
                temperature: BASE_TEMPERATURE + TEMPERATURE_STEP * i as f32,
                max_tokens: MAX_OUTPUT_TOKENS,
            })
            .await
    });

    let replies = futures::future::join_all(futures).await;

    let mut queries = Vec::with_capacity(n);
    let mut tokens = TokenTotals::default();
    for reply in replies {
        let reply = reply?;
        tokens.input_tokens += reply.input_tokens;
        tokens.output_tokens += reply.output_tokens;
        queries.push(normalize(&reply.content));
    }

    Ok(EnhancedQueries { queries, tokens })
}

/// Issue a single refinement call, reminding the model of failed attempts and (if present) the
/// judge's suggested follow-up.
pub async fn enhance_refine(
    client: &dyn ChatClient,
    system_prompt: &str,
    model: &str,
    prediction_text: &str,
    past_attempts: &[PastAttempt],
) -> Result<RefinedQuery> {
    let mut prompt = format!(
        "The following searches did not find enough evidence for this claim:\n\nClaim: {prediction_text}\n\n"
    );
    for attempt in past_attempts {
        prompt.push_str(&format!("- \"{}\" (unsuccessful)", attempt.query));
        if let Some(reasoning) = &attempt.reasoning {
            prompt.push_str(&format!(" — {reasoning}"));
        }
        prompt.push('\n');
    }
    prompt.push_str("\nProduce one new, more targeted search query.");

    let reply = client
        .complete(ChatRequestParams {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(prompt),
            ],
            model: model.to_string(),
            temperature: BASE_TEMPERATURE + TEMPERATURE_STEP * past_attempts.len() as f32,
            max_tokens: MAX_OUTPUT_TOKENS,
        })
        .await?;

    Ok(RefinedQuery {
        query: normalize(&reply.content),
        tokens: TokenTotals {
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_quotes_and_first_line_only() {
        assert_eq!(normalize("\"bitcoin price 2025\"\nextra line"), "bitcoin price 2025");
        assert_eq!(normalize("  plain query  "), "plain query");
        assert_eq!(normalize("\u{201c}curly quoted\u{201d}"), "curly quoted");
    }
}
