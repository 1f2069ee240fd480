// vpt-core/src/ai_cache/normalize.rs
// ============================================================================
// Module: Prompt Normalization
// Description: Lowercase, politeness-strip, and intent-classify a raw prompt.
// Purpose: Produce the stable `normalized_prompt` the fingerprint and
//          compatible-plan lookup are keyed on (§4.3).
// Dependencies: none
// ============================================================================

//! ## Overview
//! Normalization is intentionally simple and deterministic: no ML, no
//! locale-awareness beyond ASCII lowercasing. The goal is that two prompts a
//! human would consider "the same request" collapse to the same string.

/// Politeness tokens stripped before intent classification (§4.3).
const POLITENESS_TOKENS: &[&str] = &["please", "can you", "could you", "would you", "kindly"];

/// Intent keywords, checked in order; the first match wins.
const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("navigation", &["go to", "navigate", "open", "switch to"]),
    ("search", &["search", "find", "look for"]),
    ("media", &["play", "pause", "record", "rewind", "fast forward"]),
    ("system", &["reboot", "restart", "shutdown", "power off", "settings"]),
    ("action", &["press", "click", "tap", "select"]),
];

/// Result of normalizing a raw prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPrompt {
    /// `"{intent}_{target}"`, or the stripped prompt if extraction failed.
    pub text: String,
    pub intent: String,
    pub target: String,
}

/// Lowercases, strips politeness tokens, classifies intent, and extracts a
/// target phrase (§4.3 Prompt normalization).
#[must_use]
pub fn normalize_prompt(raw: &str) -> NormalizedPrompt {
    let lowered = raw.to_lowercase();
    let stripped = strip_politeness(&lowered);
    let trimmed = stripped.trim();

    let intent = classify_intent(trimmed);
    let target = extract_target(trimmed, intent);

    let text = if target.is_empty() {
        trimmed.to_string()
    } else {
        format!("{intent}_{target}")
    };

    NormalizedPrompt {
        text,
        intent: intent.to_string(),
        target,
    }
}

fn strip_politeness(text: &str) -> String {
    let mut out = text.to_string();
    for token in POLITENESS_TOKENS {
        out = out.replace(token, "");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn classify_intent(text: &str) -> &'static str {
    for (intent, keywords) in INTENT_KEYWORDS {
        if keywords.iter().any(|keyword| text.contains(keyword)) {
            return intent;
        }
    }
    "action"
}

/// Extracts the phrase following the first matched keyword for `intent`, as
/// "the last navigation-node-compatible phrase" (§4.3): the remainder of the
/// prompt after the keyword, trimmed and space-joined. Empty when no keyword
/// for this intent is present (falls back to the stripped prompt).
fn extract_target(text: &str, intent: &str) -> String {
    let keywords = INTENT_KEYWORDS
        .iter()
        .find(|(name, _)| *name == intent)
        .map(|(_, keywords)| *keywords)
        .unwrap_or(&[]);

    for keyword in keywords {
        if let Some(index) = text.find(keyword) {
            let after = &text[index + keyword.len()..];
            let target = after.trim().replace(' ', "_");
            if !target.is_empty() {
                return target;
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_politeness_and_lowercases() {
        let normalized = normalize_prompt("Can you please go to Live TV");
        assert_eq!(normalized.intent, "navigation");
        assert_eq!(normalized.target, "live_tv");
        assert_eq!(normalized.text, "navigation_live_tv");
    }

    #[test]
    fn falls_back_to_stripped_prompt_when_extraction_fails() {
        let normalized = normalize_prompt("hello");
        assert_eq!(normalized.text, "hello");
    }

    #[test]
    fn classifies_media_intent() {
        let normalized = normalize_prompt("play the recording");
        assert_eq!(normalized.intent, "media");
    }

    #[test]
    fn is_idempotent_on_already_normalized_input() {
        let first = normalize_prompt("go to live tv");
        let second = normalize_prompt(&first.text);
        assert_eq!(second.intent, "action");
    }
}
