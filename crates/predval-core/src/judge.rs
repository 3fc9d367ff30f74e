//! Result Judge adapter: prompts the model with the prediction text and combined search
//! results, parses its XML-like reply, and reconciles decision against score, per
//! SPEC_FULL.md §4.6 and the Design Note "Decision/score reconciliation in the Judge."

use crate::chat::{ChatClient, ChatMessage, ChatRequestParams};
use crate::error::Result;
use crate::model::{Decision, Judgment, SearchResult};

const MAX_OUTPUT_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.2;
const DEFAULT_SCORE_ON_PARSE_FAILURE: u8 = 5;

fn extract_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim().to_string())
}

fn parse_score(body: &str) -> u8 {
    extract_tag(body, "score")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|v| v.clamp(0, 10) as u8)
        .unwrap_or(DEFAULT_SCORE_ON_PARSE_FAILURE)
}

fn parse_decision(body: &str) -> Option<Decision> {
    let raw = extract_tag(body, "decision")?;
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRUE" => Some(Decision::True),
        "FALSE" => Some(Decision::False),
        "INCONCLUSIVE" => Some(Decision::Inconclusive),
        _ => None,
    }
}

fn parse_bool_tag(body: &str, tag: &str) -> bool {
    extract_tag(body, tag)
        .map(|s| s.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Force `decision` to agree with `score`'s range, per §4.6. The numeric score is the source of
/// truth; the model's textual decision is advisory (Design Note).
pub fn reconcile(decision: Decision, score: u8) -> Decision {
    if score >= 7 {
        Decision::True
    } else if score <= 3 {
        Decision::False
    } else {
        let _ = decision;
        Decision::Inconclusive
    }
}

fn build_results_block(results: &[SearchResult], max: usize) -> String {
    let mut block = String::new();
    for (i, r) in results.iter().take(max).enumerate() {
        block.push_str(&format!(
            "{}. {} — {}\n{}\n\n",
            i + 1,
            r.title.as_deref().unwrap_or("(untitled)"),
            r.url,
            r.excerpt.as_deref().unwrap_or("")
        ));
    }
    block
}

/// Post a judgment prompt containing `prediction_text` and up to `max_results` of `results`,
/// parse the reply, and reconcile decision against score.
pub async fn judge(
    client: &dyn ChatClient,
    system_prompt: &str,
    model: &str,
    prediction_text: &str,
    results: &[SearchResult],
    max_results: usize,
) -> Result<Judgment> {
    let results_block = build_results_block(results, max_results);
    let prompt = format!(
        "Claim: {prediction_text}\n\nSearch results:\n{results_block}\n\
         Reply with XML tags: <decision>TRUE|FALSE|INCONCLUSIVE</decision> \
         <score>0-10</score> <summary>...</summary> <evidence>...</evidence> \
         <reasoning>...</reasoning> <sufficient>true|false</sufficient> \
         <next_query_suggestion>...</next_query_suggestion> (omit the last tag if not applicable)."
    );

    let reply = client
        .complete(ChatRequestParams {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(prompt),
            ],
            model: model.to_string(),
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
        })
        .await?;

    let body = &reply.content;
    let score = parse_score(body);
    let raw_decision = parse_decision(body).unwrap_or(Decision::Inconclusive);
    let decision = reconcile(raw_decision, score);

    Ok(Judgment {
        decision,
        score,
        summary: extract_tag(body, "summary").unwrap_or_default(),
        evidence: extract_tag(body, "evidence").filter(|s| !s.is_empty()),
        reasoning: extract_tag(body, "reasoning").filter(|s| !s.is_empty()),
        sufficient: parse_bool_tag(body, "sufficient"),
        next_query_suggestion: extract_tag(body, "next_query_suggestion").filter(|s| !s.is_empty()),
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_high_score_forces_true() {
        assert_eq!(reconcile(Decision::False, 9), Decision::True);
        assert_eq!(reconcile(Decision::False, 7), Decision::True);
    }

    #[test]
    fn reconcile_low_score_forces_false() {
        assert_eq!(reconcile(Decision::True, 2), Decision::False);
        assert_eq!(reconcile(Decision::True, 3), Decision::False);
    }

    #[test]
    fn reconcile_middle_score_forces_inconclusive() {
        assert_eq!(reconcile(Decision::True, 5), Decision::Inconclusive);
        assert_eq!(reconcile(Decision::False, 4), Decision::Inconclusive);
        assert_eq!(reconcile(Decision::False, 6), Decision::Inconclusive);
    }

    #[test]
    fn parse_score_defaults_to_five_on_failure() {
        assert_eq!(parse_score("no tags here"), 5);
    }

    #[test]
    fn parse_score_clamps_and_reads_tag() {
        assert_eq!(parse_score("<score>9</score>"), 9);
        assert_eq!(parse_score("<score>42</score>"), 10);
    }

    #[test]
    fn extract_tag_reads_summary() {
        let body = "<summary>BTC closed above $100k</summary><score>10</score>";
        assert_eq!(
            extract_tag(body, "summary").as_deref(),
            Some("BTC closed above $100k")
        );
    }
}
