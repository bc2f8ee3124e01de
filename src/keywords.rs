//! Embedded keyword tables for the prompt analyser (spec §4.4, §9).
//!
//! The tables themselves live in `keywords.toml`, compiled into the binary
//! via `include_str!` and parsed once into this structure. Keeping the
//! vocabulary in data rather than match arms is the Open Question guidance
//! in spec §9: "implementers should externalise it... rather than hardcode."

use serde::Deserialize;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
pub struct NamedKeywords {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeywordTables {
    #[serde(default)]
    pub intent: Vec<NamedKeywords>,
    #[serde(default)]
    pub domain: Vec<NamedKeywords>,
    #[serde(default)]
    pub topic: Vec<NamedKeywords>,
    #[serde(default)]
    pub capability: Vec<NamedKeywords>,
    #[serde(default)]
    pub sensitive_topics: Vec<String>,
    #[serde(default)]
    pub tone_urgent: Vec<String>,
    #[serde(default)]
    pub tone_formal: Vec<String>,
    #[serde(default)]
    pub complexity_signal: Vec<String>,
}

const RAW: &str = include_str!("keywords.toml");

pub static TABLES: LazyLock<KeywordTables> =
    LazyLock::new(|| toml::from_str(RAW).expect("src/keywords.toml must parse"));

/// Return the first matching name whose keyword set has any member
/// contained in `text` (already lowercased), in table order.
pub fn first_match<'a>(table: &'a [NamedKeywords], text: &str) -> Option<&'a str> {
    table
        .iter()
        .find(|entry| entry.keywords.iter().any(|kw| text.contains(kw.as_str())))
        .map(|entry| entry.name.as_str())
}

/// Return every name whose keyword set has any member contained in `text`.
pub fn all_matches<'a>(table: &'a [NamedKeywords], text: &str) -> Vec<&'a str> {
    table
        .iter()
        .filter(|entry| entry.keywords.iter().any(|kw| text.contains(kw.as_str())))
        .map(|entry| entry.name.as_str())
        .collect()
}

pub fn any_keyword(keywords: &[String], text: &str) -> bool {
    keywords.iter().any(|kw| text.contains(kw.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_parse_at_startup() {
        assert!(!TABLES.intent.is_empty());
        assert!(!TABLES.domain.is_empty());
        assert!(!TABLES.topic.is_empty());
        assert!(!TABLES.capability.is_empty());
    }

    #[test]
    fn bug_report_intent_wins_before_question() {
        let text = "why does my script throw a keyerror?";
        let m = first_match(&TABLES.intent, text);
        assert_eq!(m, Some("bug_report"));
    }

    #[test]
    fn sensitive_topics_include_pii_and_compliance() {
        assert!(TABLES.sensitive_topics.contains(&"pii".to_string()));
        assert!(TABLES.sensitive_topics.contains(&"compliance".to_string()));
    }
}
