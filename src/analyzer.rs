//! Prompt analyser: turns raw prompt text (plus optional caller overrides)
//! into [`EnhancedMetadata`] (spec §4.4 — C4).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::keywords::{self, TABLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Statement,
    Question,
    BugReport,
    Brainstorm,
    Diagnosis,
    Review,
    CodeGeneration,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Urgent,
    Formal,
    Casual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

/// Raw extraction from the prompt text alone, before overrides (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedMetadata {
    pub prompt: String,
    pub intent: Intent,
    pub domain: Option<String>,
    pub topics: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub safety_score: i64,
    pub tone: Tone,
    pub complexity: Complexity,
    pub word_count: usize,
}

/// Caller-supplied overrides recognised by the analyser (spec §3). Any
/// JSON key outside this set is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overrides {
    pub domain: Option<String>,
    pub intent: Option<String>,
    pub sensitivity: Option<String>,
    pub priority: Option<String>,
    pub audience: Option<String>,
    pub language: Option<String>,
    pub complexity: Option<String>,
    #[serde(default)]
    pub context_tags: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

/// [`ParsedMetadata`] with overrides folded in (spec §3). Drives routing.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedMetadata {
    pub prompt: String,
    pub intent: String,
    pub domain: Option<String>,
    pub topics: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub context_tags: BTreeSet<String>,
    pub sensitivity: String,
    pub safety_score: i64,
    pub tone: String,
    pub priority: Option<String>,
    pub audience: Option<String>,
    pub language: Option<String>,
    pub complexity: String,
    pub word_count: usize,
}

/// Run the full §4.4 pipeline: normalise, classify, then merge overrides.
pub fn analyze(prompt: &str, overrides: &Overrides, config: &Config) -> EnhancedMetadata {
    let parsed = parse(prompt, config);
    merge_overrides(parsed, overrides)
}

fn parse(prompt: &str, config: &Config) -> ParsedMetadata {
    let normalized = normalize(prompt);
    let word_count = count_words(prompt);

    let intent = classify_intent(&normalized);
    let domain = keywords::first_match(&TABLES.domain, &normalized).map(|s| s.to_string());
    let topics: BTreeSet<String> = keywords::all_matches(&TABLES.topic, &normalized)
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let capabilities = infer_capabilities(&normalized, &topics);

    let (sensitivity, safety_score) = classify_sensitivity(&normalized, &topics);
    let tone = classify_tone(&normalized);
    let complexity = classify_complexity(word_count, &normalized, config);

    ParsedMetadata {
        prompt: prompt.to_string(),
        intent,
        domain,
        topics,
        capabilities,
        sensitivity,
        safety_score,
        tone,
        complexity,
        word_count,
    }
}

/// Lowercase, collapse internal whitespace runs to single spaces, and trim
/// leading/trailing punctuation and whitespace (spec §4.4 step 1).
fn normalize(prompt: &str) -> String {
    let lower = prompt.to_lowercase();
    let collapsed = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
        .to_string()
}

/// Count whitespace-delimited tokens containing at least one letter or
/// digit (spec §4.4 step 2). Deliberately not the stopword-filtered
/// tokenisation used elsewhere; this measures prompt length, not topicality.
fn count_words(prompt: &str) -> usize {
    prompt
        .split_whitespace()
        .filter(|tok| tok.chars().any(|c| c.is_alphanumeric()))
        .count()
}

fn classify_intent(normalized: &str) -> Intent {
    match keywords::first_match(&TABLES.intent, normalized) {
        Some("bug_report") => Intent::BugReport,
        Some("diagnosis") => Intent::Diagnosis,
        Some("review") => Intent::Review,
        Some("code_generation") => Intent::CodeGeneration,
        Some("brainstorm") => Intent::Brainstorm,
        Some("question") => Intent::Question,
        Some("other") => Intent::Other,
        _ => Intent::Statement,
    }
}

fn infer_capabilities(normalized: &str, topics: &BTreeSet<String>) -> BTreeSet<String> {
    let mut capabilities: BTreeSet<String> = keywords::all_matches(&TABLES.capability, normalized)
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let capability_names: BTreeSet<&str> = TABLES.capability.iter().map(|c| c.name.as_str()).collect();
    for topic in topics {
        if capability_names.contains(topic.as_str()) {
            capabilities.insert(topic.clone());
        }
    }
    capabilities
}

fn classify_sensitivity(normalized: &str, topics: &BTreeSet<String>) -> (Sensitivity, i64) {
    let sensitive_hit = topics
        .iter()
        .any(|t| TABLES.sensitive_topics.iter().any(|s| s == t));

    if sensitive_hit {
        (Sensitivity::High, 40)
    } else {
        let risk_tokens = ["risk", "danger", "attack", "breach", "leak"];
        let deductions: i64 = risk_tokens
            .iter()
            .filter(|tok| normalized.contains(*tok))
            .count() as i64
            * 5;
        (Sensitivity::Low, (100 - deductions).max(0))
    }
}

fn classify_tone(normalized: &str) -> Tone {
    if keywords::any_keyword(&TABLES.tone_urgent, normalized) {
        Tone::Urgent
    } else if keywords::any_keyword(&TABLES.tone_formal, normalized) {
        Tone::Formal
    } else {
        Tone::Neutral
    }
}

fn classify_complexity(word_count: usize, normalized: &str, config: &Config) -> Complexity {
    let signalled = keywords::any_keyword(&TABLES.complexity_signal, normalized);
    if word_count >= config.complexity_word_high || signalled {
        Complexity::Complex
    } else if word_count >= config.complexity_word_medium {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

fn merge_overrides(parsed: ParsedMetadata, overrides: &Overrides) -> EnhancedMetadata {
    let domain = overrides.domain.clone().or(parsed.domain);
    let intent = overrides
        .intent
        .clone()
        .unwrap_or_else(|| intent_to_str(parsed.intent).to_string());
    let sensitivity = overrides
        .sensitivity
        .clone()
        .unwrap_or_else(|| sensitivity_to_str(parsed.sensitivity).to_string());
    let complexity = overrides
        .complexity
        .clone()
        .unwrap_or_else(|| parsed.complexity.as_str().to_string());
    let tone = tone_to_str(parsed.tone).to_string();

    let mut topics = parsed.topics;
    topics.extend(overrides.context_tags.iter().cloned());

    let mut capabilities = parsed.capabilities;
    capabilities.extend(overrides.capabilities.iter().cloned());

    EnhancedMetadata {
        prompt: parsed.prompt,
        intent,
        domain,
        topics,
        capabilities,
        context_tags: overrides.context_tags.clone(),
        sensitivity,
        safety_score: parsed.safety_score,
        tone,
        priority: overrides.priority.clone(),
        audience: overrides.audience.clone(),
        language: overrides.language.clone(),
        complexity,
        word_count: parsed.word_count,
    }
}

fn intent_to_str(intent: Intent) -> &'static str {
    match intent {
        Intent::Statement => "statement",
        Intent::Question => "question",
        Intent::BugReport => "bug_report",
        Intent::Brainstorm => "brainstorm",
        Intent::Diagnosis => "diagnosis",
        Intent::Review => "review",
        Intent::CodeGeneration => "code_generation",
        Intent::Other => "other",
    }
}

fn sensitivity_to_str(sensitivity: Sensitivity) -> &'static str {
    match sensitivity {
        Sensitivity::Low => "low",
        Sensitivity::Medium => "medium",
        Sensitivity::High => "high",
    }
}

fn tone_to_str(tone: Tone) -> &'static str {
    match tone {
        Tone::Neutral => "neutral",
        Tone::Urgent => "urgent",
        Tone::Formal => "formal",
        Tone::Casual => "casual",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            profiles_dir: "profiles".into(),
            log_level: "info".into(),
            watch_enabled: false,
            complexity_routing_enabled: true,
            complexity_word_high: 80,
            complexity_word_medium: 40,
            complexity_prefer_threshold: 60,
        }
    }

    #[test]
    fn empty_prompt_is_simple_statement_fully_safe() {
        let meta = analyze("", &Overrides::default(), &config());
        assert_eq!(meta.intent, "statement");
        assert_eq!(meta.domain, None);
        assert!(meta.topics.is_empty());
        assert_eq!(meta.complexity, "simple");
        assert_eq!(meta.safety_score, 100);
    }

    #[test]
    fn czech_brainstorm_prompt_detects_brainstorm_intent_and_topic() {
        let meta = analyze(
            "Potřebuji vymyslet nápady pro logo fitness aplikace",
            &Overrides::default(),
            &config(),
        );
        assert_eq!(meta.intent, "brainstorm");
        assert!(meta.topics.contains("creative"));
    }

    #[test]
    fn technical_debug_prompt_detects_engineering_domain_and_pii_absent() {
        let meta = analyze(
            "Debug my Python script that throws KeyError on line 42",
            &Overrides::default(),
            &config(),
        );
        assert_eq!(meta.intent, "bug_report");
        assert_eq!(meta.domain.as_deref(), Some("engineering"));
        assert_eq!(meta.sensitivity, "low");
    }

    #[test]
    fn patient_ssn_prompt_is_high_sensitivity_via_pii_topic() {
        let meta = analyze(
            "Process this patient SSN record",
            &Overrides::default(),
            &config(),
        );
        assert_eq!(meta.sensitivity, "high");
        assert!(meta.topics.contains("pii"));
    }

    #[test]
    fn word_count_boundaries_match_configured_thresholds() {
        let cfg = config();
        let exactly_medium = "word ".repeat(cfg.complexity_word_medium);
        let meta = analyze(exactly_medium.trim(), &Overrides::default(), &cfg);
        assert_eq!(meta.complexity, "medium");

        let one_fewer = "word ".repeat(cfg.complexity_word_medium - 1);
        let meta = analyze(one_fewer.trim(), &Overrides::default(), &cfg);
        assert_eq!(meta.complexity, "simple");
    }

    #[test]
    fn complexity_signal_keyword_forces_complex_regardless_of_length() {
        let meta = analyze(
            "Plan the enterprise architecture migration",
            &Overrides::default(),
            &config(),
        );
        assert_eq!(meta.complexity, "complex");
    }

    #[test]
    fn override_domain_replaces_detected_domain() {
        let overrides = Overrides {
            domain: Some("healthcare".to_string()),
            ..Default::default()
        };
        let meta = analyze("Debug my script", &overrides, &config());
        assert_eq!(meta.domain.as_deref(), Some("healthcare"));
    }

    #[test]
    fn override_context_tags_union_into_topics_not_replace() {
        let overrides = Overrides {
            context_tags: BTreeSet::from(["manual_tag".to_string()]),
            ..Default::default()
        };
        let meta = analyze("Debug my Python script that throws KeyError", &overrides, &config());
        assert!(meta.topics.contains("manual_tag"));
        assert!(meta.topics.contains("programming"));
    }

    #[test]
    fn unknown_override_keys_have_no_deserialize_target_and_are_ignored() {
        let json = serde_json::json!({"domain": "legal", "bogus_key": "ignored"});
        let overrides: Overrides = serde_json::from_value(json).unwrap();
        assert_eq!(overrides.domain.as_deref(), Some("legal"));
    }
}
