//! Deterministic signal parser.
//!
//! Extracts gate signals from text using:
//! - a fixed marker vocabulary per [`RejectionCategory`]
//! - ordered score patterns, most specific label first:
//!   `Overall Score: 88/100` > `Score: 62/100` > `Score: 62` > `62/100`

use super::types::{RejectionCategory, ScoreReading, Signal};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// Compile regexes once using LazyLock. Order matters: first match wins.
static SCORE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "labeled",
            r"(?i)\b(?:overall|final|total|quality|weighted|critique)\s+score\s*[:=][\s*]*(\d{1,3})(?:\.\d+)?\b",
        ),
        (
            "score_of_100",
            r"(?i)\bscore\s*[:=][\s*]*(\d{1,3})(?:\.\d+)?[\s*]*/\s*100\b",
        ),
        ("score", r"(?i)\bscore\s*[:=][\s*]*(\d{1,3})\b"),
        ("fraction", r"\b(\d{1,3})\s*/\s*100\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static SCORE_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bscore\s*[:=]").unwrap());

/// Parser for extracting gate signals from stage output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalExtractor {
    /// Whether to log each match at debug level.
    log_matches: bool,
}

impl SignalExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub fn new(log_matches: bool) -> Self {
        Self { log_matches }
    }

    /// Extracts the dominant signal. Rejections take precedence over scores.
    #[must_use]
    pub fn parse(&self, text: &str) -> Signal {
        if let Some(category) = self.rejection(text) {
            return Signal::Rejection(category);
        }
        match self.score(text) {
            ScoreReading::Found(score) => Signal::Score(score),
            ScoreReading::Ambiguous | ScoreReading::Absent => Signal::None,
        }
    }

    /// Like [`Self::parse`], treating absent text as empty.
    #[must_use]
    pub fn parse_optional(&self, text: Option<&str>) -> Signal {
        self.parse(text.unwrap_or_default())
    }

    /// Finds the highest-priority rejection category present in `text`.
    #[must_use]
    pub fn rejection(&self, text: &str) -> Option<RejectionCategory> {
        if text.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();

        for category in RejectionCategory::PRIORITY {
            if let Some(marker) = category
                .markers()
                .iter()
                .find(|marker| lowered.contains(*marker))
            {
                if self.log_matches {
                    debug!(category = %category, marker = %marker, "Rejection marker matched");
                }
                return Some(category);
            }
        }
        None
    }

    /// Reads a score using the first pattern that matches.
    #[must_use]
    pub fn score(&self, text: &str) -> ScoreReading {
        for (name, pattern) in SCORE_PATTERNS.iter() {
            let Some(raw) = pattern
                .captures(text)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str())
            else {
                continue;
            };

            if let Ok(value) = raw.parse::<u16>() {
                // Clamp to 100
                let clamped = u8::try_from(value.min(100)).unwrap_or(100);
                if self.log_matches {
                    debug!(pattern = *name, raw = raw, score = clamped, "Score matched");
                }
                return ScoreReading::Found(clamped);
            }
        }

        if SCORE_LABEL_REGEX.is_match(text) {
            if self.log_matches {
                debug!("Score label present but value unparseable");
            }
            ScoreReading::Ambiguous
        } else {
            ScoreReading::Absent
        }
    }
}

/// Convenience function to extract the dominant signal.
#[must_use]
pub fn extract_signal(text: &str) -> Signal {
    SignalExtractor::default().parse(text)
}

/// Convenience function to read only the score.
#[must_use]
pub fn extract_score(text: &str) -> ScoreReading {
    SignalExtractor::default().score(text)
}

/// Convenience function to read only the rejection category.
#[must_use]
pub fn extract_rejection(text: &str) -> Option<RejectionCategory> {
    SignalExtractor::default().rejection(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_score() {
        assert_eq!(extract_score("Score: 62/100"), ScoreReading::Found(62));
        assert_eq!(extract_signal("Score: 62/100"), Signal::Score(62));
    }

    #[test]
    fn test_labeled_score_beats_bare_fraction() {
        let text = "Pacing earns 40/100 on its own.\nOverall Score: 88/100";
        assert_eq!(extract_score(text), ScoreReading::Found(88));
    }

    #[test]
    fn test_score_label_beats_fraction_regardless_of_position() {
        let text = "Hook: 30/100\nScore: 71";
        assert_eq!(extract_score(text), ScoreReading::Found(71));
    }

    #[test]
    fn test_bare_fraction() {
        assert_eq!(extract_score("I'd give it 77 / 100."), ScoreReading::Found(77));
    }

    #[test]
    fn test_markdown_bold_score() {
        assert_eq!(extract_score("**Final Score:** **93**/100"), ScoreReading::Found(93));
    }

    #[test]
    fn test_score_case_insensitive() {
        assert_eq!(extract_score("SCORE = 55"), ScoreReading::Found(55));
    }

    #[test]
    fn test_score_clamps_to_100() {
        assert_eq!(extract_score("Score: 150/100"), ScoreReading::Found(100));
    }

    #[test]
    fn test_overlong_labeled_score_is_not_truncated() {
        assert_eq!(extract_score("Overall Score: 1234"), ScoreReading::Ambiguous);
        assert_eq!(extract_score("Overall Score: 1234/100"), ScoreReading::Ambiguous);
    }

    #[test]
    fn test_decimal_score_truncates() {
        assert_eq!(extract_score("Overall score: 86.5/100"), ScoreReading::Found(86));
    }

    #[test]
    fn test_ambiguous_score() {
        assert_eq!(extract_score("Score: N/A, needs work"), ScoreReading::Ambiguous);
        assert_eq!(extract_signal("Score: N/A"), Signal::None);
    }

    #[test]
    fn test_absent_score() {
        assert_eq!(extract_score("Looks great, ship it."), ScoreReading::Absent);
        assert_eq!(extract_score(""), ScoreReading::Absent);
    }

    #[test]
    fn test_rejection_markers() {
        assert_eq!(
            extract_rejection("[INVALID_PREMISE] The product does not exist."),
            Some(RejectionCategory::Validity)
        );
        assert_eq!(
            extract_rejection("This would be a Policy Violation."),
            Some(RejectionCategory::Policy)
        );
        assert_eq!(
            extract_rejection("I cannot proceed with this brief."),
            Some(RejectionCategory::Generic)
        );
        assert_eq!(extract_rejection("A bold concept for spring."), None);
    }

    #[test]
    fn test_rejection_priority() {
        let text = "[HALT] policy violation, and frankly an invalid premise";
        assert_eq!(extract_rejection(text), Some(RejectionCategory::Validity));

        let text = "[rejected] this is a policy violation";
        assert_eq!(extract_rejection(text), Some(RejectionCategory::Policy));
    }

    #[test]
    fn test_rejection_takes_precedence_over_score() {
        let signal = extract_signal("Score: 90/100 but [POLICY_VIOLATION]");
        assert_eq!(signal, Signal::Rejection(RejectionCategory::Policy));
        assert_eq!(signal.rejection(), Some(RejectionCategory::Policy));
        assert_eq!(signal.score(), None);
    }

    #[test]
    fn test_absent_input() {
        let extractor = SignalExtractor::new(true);
        assert!(extractor.parse_optional(None).is_none());
        assert!(extractor.parse("   \n\t").is_none());
    }

    #[test]
    fn test_malformed_input_does_not_panic() {
        let text = "Score: 9999999999999/100 ]]]] \u{0000} [[[[ /100 Score:::";
        let _ = extract_signal(text);
        let _ = extract_score("/100");
    }

    #[test]
    fn test_deterministic() {
        let text = "Critique\nOverall Score: 64/100\nSecond pass 91/100";
        assert_eq!(extract_signal(text), extract_signal(text));
        assert_eq!(extract_signal(text), Signal::Score(64));
    }
}
