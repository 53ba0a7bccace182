//! Turning prose policy documents into structured frequency and rule data.
//!
//! Extraction sits behind a narrow, swappable trait with two shapes of
//! implementation: a best-effort (possibly AI-backed, possibly blocking)
//! primary, and the deterministic [`MarkerParser`] fallback that guarantees
//! a result and never fails. The rest of the engine only ever consumes the
//! shared output contract.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ruleset::{TierKey, ValidationFrequencies};

/// Coarse change signal for one rule mentioned by a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerChange {
    Added,
    Removed,
    Updated,
}

/// One rule mention extracted from the document. Markers are coarse
/// signals, not full rule definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMarker {
    /// Rule name or identifier as it appears in the document.
    pub label: String,
    /// The sentence the marker was lifted from.
    pub summary: String,
    pub change: MarkerChange,
}

/// Structured output shared by every extractor implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyExtraction {
    pub validation_frequencies: ValidationFrequencies,
    pub rule_markers: Vec<RuleMarker>,
    /// 0.0..=1.0; lowered when the fallback path was taken.
    pub confidence: f32,
    pub notes: Vec<String>,
}

/// Failure of a best-effort extractor. Always recovered locally by the
/// fallback parser, never surfaced as a hard error to callers.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("extractor timed out")]
    Timeout,
    #[error("extractor returned malformed output: {0}")]
    Malformed(String),
}

/// Narrow seam for the extraction collaborator.
pub trait PolicyExtractor: Send + Sync {
    fn extract(&self, document: &str) -> Result<PolicyExtraction, ExtractionError>;
    fn name(&self) -> &'static str;
}

/// Deterministic line-oriented parser. Guarantees a (possibly empty)
/// result; recognizes cadence sentences such as
/// `Tier 3 models must be revalidated every 6 months` or `T2: 24 months`,
/// and rule markers such as `New rule: vendor models require review`.
#[derive(Debug, Clone, Default)]
pub struct MarkerParser;

impl MarkerParser {
    pub fn parse(&self, document: &str) -> PolicyExtraction {
        let mut frequencies = ValidationFrequencies::default();
        let mut markers = Vec::new();

        for line in document.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some((tier, months)) = parse_frequency_line(trimmed) {
                frequencies.insert(tier, months);
            }

            if let Some(marker) = parse_rule_marker(trimmed) {
                markers.push(marker);
            }
        }

        let mut notes = Vec::new();
        let confidence = if frequencies.is_empty() && markers.is_empty() {
            notes.push("no recognizable frequency or rule statements found".to_string());
            0.0
        } else {
            1.0
        };

        PolicyExtraction {
            validation_frequencies: frequencies,
            rule_markers: markers,
            confidence,
            notes,
        }
    }
}

impl PolicyExtractor for MarkerParser {
    fn extract(&self, document: &str) -> Result<PolicyExtraction, ExtractionError> {
        Ok(self.parse(document))
    }

    fn name(&self) -> &'static str {
        "marker-parser"
    }
}

/// Primary-with-fallback composition. The pipeline itself never fails: a
/// primary error is logged, recovered through the marker parser, and
/// surfaced only as lowered confidence plus a note.
pub struct ExtractionPipeline {
    primary: Option<Arc<dyn PolicyExtractor>>,
    fallback: MarkerParser,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl ExtractionPipeline {
    /// Pipeline using only the deterministic parser.
    pub fn deterministic() -> Self {
        Self {
            primary: None,
            fallback: MarkerParser,
        }
    }

    pub fn with_primary(primary: Arc<dyn PolicyExtractor>) -> Self {
        Self {
            primary: Some(primary),
            fallback: MarkerParser,
        }
    }

    pub fn extract(&self, document: &str) -> PolicyExtraction {
        if let Some(primary) = &self.primary {
            match primary.extract(document) {
                Ok(extraction) => return extraction,
                Err(error) => {
                    warn!(
                        extractor = primary.name(),
                        %error,
                        "primary extractor failed; falling back to marker parser"
                    );
                    let mut extraction = self.fallback.parse(document);
                    extraction.confidence = extraction.confidence.min(0.5);
                    extraction.notes.push(format!(
                        "{} failed ({error}); deterministic fallback used",
                        primary.name()
                    ));
                    return extraction;
                }
            }
        }

        self.fallback.parse(document)
    }
}

/// Recognize `tier <k> ... <n> month(s)` and `T<k>: <n> months` shapes.
fn parse_frequency_line(line: &str) -> Option<(TierKey, u32)> {
    let lower = line.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')'))
        .filter(|word| !word.is_empty())
        .collect();

    let tier = find_tier(&words)?;
    let months = find_months(&words)?;
    Some((tier, months))
}

fn find_tier(words: &[&str]) -> Option<TierKey> {
    for (index, word) in words.iter().enumerate() {
        let token = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        // "tier 3" form: the number follows the keyword.
        if token == "tier" {
            if let Some(next) = words.get(index + 1) {
                let next = next.trim_matches(|c: char| !c.is_ascii_alphanumeric());
                if next.chars().all(|c| c.is_ascii_digit()) && !next.is_empty() {
                    return Some(TierKey(format!("T{next}")));
                }
            }
        }
        // "t3" shorthand.
        if let Some(digits) = token.strip_prefix('t') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return Some(TierKey(format!("T{digits}")));
            }
        }
    }
    None
}

fn find_months(words: &[&str]) -> Option<u32> {
    for (index, word) in words.iter().enumerate() {
        let token = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if token == "month" || token == "months" {
            if index == 0 {
                continue;
            }
            let previous = words[index - 1].trim_matches(|c: char| !c.is_ascii_alphanumeric());
            if let Ok(months) = previous.parse::<u32>() {
                if months > 0 {
                    return Some(months);
                }
            }
        }
    }
    None
}

fn parse_rule_marker(line: &str) -> Option<RuleMarker> {
    let lower = line.to_ascii_lowercase();
    if !lower.contains("rule") {
        return None;
    }

    let change = if lower.contains("remov") || lower.contains("delet") || lower.contains("retir") {
        MarkerChange::Removed
    } else if lower.contains("new") || lower.contains("add") || lower.contains("introduc") {
        MarkerChange::Added
    } else if lower.contains("updat")
        || lower.contains("modif")
        || lower.contains("chang")
        || lower.contains("revis")
    {
        MarkerChange::Updated
    } else {
        return None;
    };

    // The label is whatever follows the first colon, else the whole line.
    let label = line
        .split_once(':')
        .map(|(_, rest)| rest.trim())
        .unwrap_or(line)
        .trim_end_matches('.')
        .to_string();

    Some(RuleMarker {
        label,
        summary: line.to_string(),
        change,
    })
}
