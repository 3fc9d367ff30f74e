//! The pre-filter's "not a prediction" keyword list.
//!
//! Kept as plain data, not control flow, per the Design Note "Keyword scan policy": the list is
//! loadable/overridable rather than hard-coded into a match arm.

/// Case-insensitive substrings that, when found in `filter_validation_reasoning`, indicate the
/// upstream pipeline itself flagged the text as not predictive.
pub const DEFAULT_REJECTION_KEYWORDS: &[&str] = &[
    "not a prediction",
    "not a valid prediction",
    "no prediction",
    "invalid prediction",
    "not making a prediction",
    "does not contain a prediction",
    "doesn't contain a prediction",
    "no clear prediction",
    "lacks a prediction",
    "missing prediction",
    "not predictive",
    "too vague",
    "overly vague",
    "impossible to validate",
    "cannot be validated",
    "not verifiable",
    "unverifiable",
    "heavy hedging",
    "quoting someone else",
    "is an announcement",
    "factual announcement",
];

/// Scan `reasoning` (case-folded) for any configured rejection keyword.
///
/// Returns the matched keyword, if any.
pub fn find_rejection_keyword<'a>(reasoning: &str, keywords: &'a [&str]) -> Option<&'a str> {
    let lower = reasoning.to_lowercase();
    keywords.iter().copied().find(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        let reasoning = "This is TOO VAGUE to be a real claim.";
        assert_eq!(
            find_rejection_keyword(reasoning, DEFAULT_REJECTION_KEYWORDS),
            Some("too vague")
        );
    }

    #[test]
    fn no_match_returns_none() {
        let reasoning = "Clear, specific, falsifiable claim about BTC price.";
        assert_eq!(
            find_rejection_keyword(reasoning, DEFAULT_REJECTION_KEYWORDS),
            None
        );
    }
}
