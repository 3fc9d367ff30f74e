//! Builds the single prediction-text string fed to the LLM adapters, per SPEC_FULL.md §4.3.
//!
//! Preference order: a non-empty `prediction_context` verbatim, else the concatenation of each
//! goal slice's substring. Slice bounds are interpreted as half-open ranges over Unicode scalar
//! values (chars), per the "Slice indexing unit" open question decision recorded in DESIGN.md.

use std::collections::HashMap;

use crate::model::LeasedPrediction;

/// Anything capable of fetching a post's text by id, used to resolve goal slices that quote a
/// different post than the one leased. Implemented by the database layer in production and by
/// an in-memory map in tests.
#[async_trait::async_trait]
pub trait PostTextFetcher: Send + Sync {
    /// Fetch the text of the post with the given id, if it exists.
    async fn fetch_text(&self, post_id: i64) -> crate::error::Result<Option<String>>;
}

/// Slice `text` at `[start, end)` char offsets, clamping to the string's bounds.
fn slice_chars(text: &str, start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}

/// Extract the prediction text for `leased`, fetching cross-referenced post text on demand and
/// caching it within this call.
pub async fn extract(
    leased: &LeasedPrediction,
    fetcher: &dyn PostTextFetcher,
) -> crate::error::Result<String> {
    if let Some(context) = leased.details.prediction_context.as_deref() {
        if !context.trim().is_empty() {
            return Ok(context.to_string());
        }
    }

    let mut cache: HashMap<i64, String> = HashMap::new();
    let mut out = String::new();

    for slice in &leased.prediction.goal_slices {
        let text: &str = match slice.source_post_id {
            Some(post_id) if post_id == leased.post.id => &leased.post.text,
            Some(post_id) => {
                if !cache.contains_key(&post_id) {
                    let fetched = fetcher.fetch_text(post_id).await?.unwrap_or_default();
                    cache.insert(post_id, fetched);
                }
                cache.get(&post_id).map(String::as_str).unwrap_or("")
            }
            None => &leased.post.text,
        };
        out.push_str(&slice_chars(text, slice.start, slice.end));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GoalSlice, Post, Prediction, PredictionDetails};

    struct NoopFetcher;

    #[async_trait::async_trait]
    impl PostTextFetcher for NoopFetcher {
        async fn fetch_text(&self, _post_id: i64) -> crate::error::Result<Option<String>> {
            Ok(None)
        }
    }

    fn base(goal_slices: Vec<GoalSlice>, context: Option<&str>) -> LeasedPrediction {
        LeasedPrediction {
            prediction: Prediction {
                id: 1,
                source_post_id: 1,
                goal_slices,
                llm_confidence: None,
                prediction_quality: None,
                vagueness: None,
            },
            details: PredictionDetails {
                prediction_id: 1,
                prediction_context: context.map(str::to_string),
                timeframe_start: None,
                timeframe_end: None,
                timeframe_status: None,
                filter_validation_confidence: None,
                filter_validation_reasoning: None,
            },
            post: Post {
                id: 1,
                text: "Bitcoin will close above 100000 by year end".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn prefers_prediction_context_verbatim() {
        let leased = base(vec![], Some("  BTC > 100k  "));
        let text = extract(&leased, &NoopFetcher).await.unwrap();
        assert_eq!(text, "  BTC > 100k  ");
    }

    #[tokio::test]
    async fn whitespace_only_context_falls_back_to_goal_slices() {
        let leased = base(
            vec![GoalSlice {
                start: 0,
                end: 7,
                source_post_id: None,
            }],
            Some("   "),
        );
        let text = extract(&leased, &NoopFetcher).await.unwrap();
        assert_eq!(text, "Bitcoin");
    }

    #[tokio::test]
    async fn falls_back_to_goal_slices_by_char_offset() {
        let leased = base(
            vec![GoalSlice {
                start: 0,
                end: 7,
                source_post_id: None,
            }],
            None,
        );
        let text = extract(&leased, &NoopFetcher).await.unwrap();
        assert_eq!(text, "Bitcoin");
    }

    #[tokio::test]
    async fn empty_concatenation_yields_empty_string() {
        let leased = base(vec![], None);
        let text = extract(&leased, &NoopFetcher).await.unwrap();
        assert_eq!(text, "");
    }
}
