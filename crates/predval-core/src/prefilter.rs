//! Defensive, in-memory re-check of the quality gate the Leaser's SQL predicate already
//! applied, plus the one rule SQL cannot express: the filter-reasoning keyword scan.
//!
//! Per SPEC_FULL.md §4.2 / Testable Property 5: anything the Leaser hands out must also pass
//! this check, and a prediction that fails it is never written as anything but `Invalid`.

use crate::keywords::find_rejection_keyword;
use crate::model::{LeasedPrediction, timeframe_status};
use crate::settings::QualityThresholds;

/// Outcome of running the pre-filter over a leased tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterOutcome {
    /// All checks passed.
    Accepted,
    /// A check failed; `reason` is a human-readable string usable verbatim as a proof.
    Rejected {
        /// Why the prediction was rejected.
        reason: String,
    },
}

/// Re-apply the quality gate and the keyword scan to a leased tuple.
pub fn run(
    leased: &LeasedPrediction,
    thresholds: &QualityThresholds,
    keywords: &[&str],
) -> PrefilterOutcome {
    let details = &leased.details;
    let prediction = &leased.prediction;

    if let (Some(start), Some(end)) = (details.timeframe_start, details.timeframe_end) {
        if start > end {
            return PrefilterOutcome::Rejected {
                reason: format!(
                    "Invalid timeframe: start ({start}) is after end ({end})"
                ),
            };
        }
    }

    if details.timeframe_status.as_deref() == Some(timeframe_status::MISSING) {
        return PrefilterOutcome::Rejected {
            reason: "Timeframe status is missing".to_string(),
        };
    }

    if let Some(conf) = details.filter_validation_confidence {
        if conf < thresholds.min_filter_validation_confidence {
            return PrefilterOutcome::Rejected {
                reason: format!(
                    "Filter validation confidence too low: {:.2} (threshold: {:.2})",
                    conf, thresholds.min_filter_validation_confidence
                ),
            };
        }
    }

    if let Some(quality) = prediction.prediction_quality {
        if quality < thresholds.min_prediction_quality {
            return PrefilterOutcome::Rejected {
                reason: format!(
                    "Prediction quality too low: {:.0} (threshold: {:.0})",
                    quality, thresholds.min_prediction_quality
                ),
            };
        }
    }

    if let Some(conf) = prediction.llm_confidence {
        if conf < thresholds.min_llm_confidence {
            return PrefilterOutcome::Rejected {
                reason: format!(
                    "LLM confidence too low: {:.2} (threshold: {:.2})",
                    conf, thresholds.min_llm_confidence
                ),
            };
        }
    }

    if let Some(vagueness) = prediction.vagueness {
        if vagueness > thresholds.max_vagueness {
            return PrefilterOutcome::Rejected {
                reason: format!(
                    "Prediction too vague: {:.2} (threshold: {:.2})",
                    vagueness, thresholds.max_vagueness
                ),
            };
        }
    }

    if let Some(reasoning) = details.filter_validation_reasoning.as_deref() {
        if let Some(keyword) = find_rejection_keyword(reasoning, keywords) {
            return PrefilterOutcome::Rejected {
                reason: format!("Filter reasoning flagged '{keyword}': {reasoning}"),
            };
        }
    }

    PrefilterOutcome::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::DEFAULT_REJECTION_KEYWORDS;
    use crate::model::{Post, Prediction, PredictionDetails};
    use chrono::{Duration, Utc};

    fn leased(vagueness: Option<f64>, quality: Option<f64>) -> LeasedPrediction {
        LeasedPrediction {
            prediction: Prediction {
                id: 1,
                source_post_id: 1,
                goal_slices: vec![],
                llm_confidence: Some(0.9),
                prediction_quality: quality,
                vagueness,
            },
            details: PredictionDetails {
                prediction_id: 1,
                prediction_context: None,
                timeframe_start: None,
                timeframe_end: Some(Utc::now() - Duration::days(1)),
                timeframe_status: Some("resolved".to_string()),
                filter_validation_confidence: Some(0.95),
                filter_validation_reasoning: None,
            },
            post: Post {
                id: 1,
                text: "things will change".to_string(),
            },
        }
    }

    #[test]
    fn vagueness_boundary_passes_at_080() {
        let tuple = leased(Some(0.80), Some(30.0));
        assert_eq!(
            run(&tuple, &QualityThresholds::DEFAULT, DEFAULT_REJECTION_KEYWORDS),
            PrefilterOutcome::Accepted
        );
    }

    #[test]
    fn vagueness_boundary_rejects_at_081() {
        let tuple = leased(Some(0.81), Some(30.0));
        let outcome = run(&tuple, &QualityThresholds::DEFAULT, DEFAULT_REJECTION_KEYWORDS);
        assert!(matches!(outcome, PrefilterOutcome::Rejected { .. }));
    }

    #[test]
    fn quality_boundary_passes_at_30_rejects_at_29() {
        let passing = leased(Some(0.1), Some(30.0));
        assert_eq!(
            run(&passing, &QualityThresholds::DEFAULT, DEFAULT_REJECTION_KEYWORDS),
            PrefilterOutcome::Accepted
        );
        let failing = leased(Some(0.1), Some(29.0));
        assert!(matches!(
            run(&failing, &QualityThresholds::DEFAULT, DEFAULT_REJECTION_KEYWORDS),
            PrefilterOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn keyword_scan_rejects_flagged_reasoning() {
        let mut tuple = leased(Some(0.1), Some(30.0));
        tuple.details.filter_validation_reasoning =
            Some("This is too vague to resolve.".to_string());
        let outcome = run(&tuple, &QualityThresholds::DEFAULT, DEFAULT_REJECTION_KEYWORDS);
        match outcome {
            PrefilterOutcome::Rejected { reason } => assert!(reason.contains("too vague")),
            PrefilterOutcome::Accepted => panic!("expected rejection"),
        }
    }
}
