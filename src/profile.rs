//! Profile data model and parser (spec §3, §4.1 — C1).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::error::{BrokerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    #[default]
    Simple,
    Complex,
}

/// A catalogued instruction profile (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub complexity_tier: ComplexityTier,
    #[serde(default)]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub keyword_weights: BTreeMap<String, i64>,
    #[serde(default)]
    pub priority_weights: BTreeMap<String, i64>,
    #[serde(default)]
    pub domain_weights: BTreeMap<String, i64>,
    #[serde(default)]
    pub complexity_weights: BTreeMap<String, i64>,
    #[serde(default)]
    pub required_context_tags: BTreeSet<String>,
    #[serde(default = "default_score")]
    pub default_score: i64,
    #[serde(default)]
    pub fallback: bool,

    #[serde(skip_deserializing, default)]
    pub instructions: String,
    #[serde(skip_deserializing, default)]
    pub checklist: Vec<String>,

    #[serde(skip, default)]
    pub source_path: PathBuf,
    #[serde(skip, default)]
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip, default)]
    pub content_hash: String,

    /// Unknown front-matter keys, preserved but never consulted by routing.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_score() -> i64 {
    1
}

impl Profile {
    /// Name of this profile's `_complex` sibling (spec §3, §4.5), or
    /// `None` if this profile already is the complex variant.
    pub fn complex_sibling_name(&self) -> Option<String> {
        if self.name.ends_with("_complex") {
            None
        } else {
            Some(format!("{}_complex", self.name))
        }
    }
}

/// Result of parsing one profile file: the profile plus any non-fatal
/// warnings recorded during parsing (spec §4.1).
pub struct ParsedProfile {
    pub profile: Profile,
    pub warnings: Vec<String>,
}

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 50;
const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 200;

/// Parse a single profile file's bytes into a [`ParsedProfile`].
///
/// `path` is used only for error messages and provenance (`source_path`).
pub fn parse_profile_bytes(path: &Path, bytes: &[u8]) -> Result<ParsedProfile> {
    let text = String::from_utf8_lossy(bytes);
    let mut warnings = Vec::new();

    let (front_matter_raw, body) = split_front_matter(&text);

    let mut profile: Profile = match front_matter_raw {
        Some(raw) => serde_yaml::from_str(raw).map_err(|e| BrokerError::ProfileParse {
            path: path.display().to_string(),
            reason: format!("invalid front matter: {e}"),
        })?,
        None => {
            return Err(BrokerError::ProfileParse {
                path: path.display().to_string(),
                reason: "missing front matter block".to_string(),
            });
        }
    };

    validate_name(&profile.name).map_err(|reason| BrokerError::ProfileParse {
        path: path.display().to_string(),
        reason,
    })?;
    validate_description(&profile.description).map_err(|reason| BrokerError::ProfileParse {
        path: path.display().to_string(),
        reason,
    })?;

    profile.name = profile.name.to_lowercase();
    profile.keyword_weights = profile
        .keyword_weights
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let sections = split_sections(body);

    profile.instructions = match sections.get("instructions") {
        Some(text) => text.clone(),
        None => match sections.get("primary role") {
            Some(text) => {
                warnings.push(format!(
                    "{}: no '## Instructions' section; using 'Primary Role' instead",
                    path.display()
                ));
                text.clone()
            }
            None => match profile.extra.get("short_instructions").and_then(|v| v.as_str()) {
                Some(text) => {
                    warnings.push(format!(
                        "{}: no '## Instructions' section; using front-matter 'short_instructions'",
                        path.display()
                    ));
                    text.to_string()
                }
                None => {
                    warnings.push(format!(
                        "{}: no '## Instructions' section; using entire body",
                        path.display()
                    ));
                    body.trim().to_string()
                }
            },
        },
    };

    profile.checklist = sections
        .get("checklist")
        .map(|text| parse_checklist(text))
        .unwrap_or_default();

    profile.source_path = path.to_path_buf();
    profile.content_hash = content_hash(bytes);

    Ok(ParsedProfile { profile, warnings })
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.len() < NAME_MIN || name.len() > NAME_MAX {
        return Err(format!(
            "'name' must be {NAME_MIN}-{NAME_MAX} chars, got {}",
            name.len()
        ));
    }
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| "'name' is empty".to_string())?;
    if !first.is_ascii_alphabetic() {
        return Err("'name' must start with a letter".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("'name' must be lowercase ASCII letters, digits, or underscore".to_string());
    }
    Ok(())
}

fn validate_description(description: &str) -> std::result::Result<(), String> {
    if description.is_empty() {
        return Err("'description' is required".to_string());
    }
    if description.len() < DESCRIPTION_MIN || description.len() > DESCRIPTION_MAX {
        return Err(format!(
            "'description' must be {DESCRIPTION_MIN}-{DESCRIPTION_MAX} chars, got {}",
            description.len()
        ));
    }
    Ok(())
}

/// Split a leading `---`-delimited front-matter block from the body that
/// follows it. Returns `(front_matter, body)`; `front_matter` is `None`
/// when the document does not start with a `---` line.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start_matches('\u{feff}');
    let mut lines = trimmed.lines();
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (None, trimmed),
    }

    let rest = &trimmed[trimmed.find('\n').map(|i| i + 1).unwrap_or(trimmed.len())..];
    if let Some(end) = find_closing_delimiter(rest) {
        let front_matter = &rest[..end.start];
        let body = &rest[end.end..];
        (Some(front_matter), body)
    } else {
        (None, trimmed)
    }
}

struct DelimiterSpan {
    start: usize,
    end: usize,
}

fn find_closing_delimiter(rest: &str) -> Option<DelimiterSpan> {
    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        let trimmed_line = line.trim_end_matches('\n').trim_end_matches('\r');
        if trimmed_line.trim_end() == "---" {
            return Some(DelimiterSpan {
                start: offset,
                end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

/// Split the body into `## `-delimited sections, keyed by lowercased title.
fn split_sections(body: &str) -> BTreeMap<String, String> {
    let mut sections: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut buf = String::new();

    for line in body.lines() {
        if let Some(title) = line.trim_start().strip_prefix("## ") {
            if let Some(name) = current.take() {
                sections.insert(name, buf.trim().to_string());
                buf.clear();
            }
            current = Some(title.trim().to_lowercase());
        } else if current.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if let Some(name) = current {
        sections.insert(name, buf.trim().to_string());
    }
    sections
}

/// Extract checklist items from task-list-style markdown lines:
/// `- [ ] item` or `- [x] item`, space-tolerant around the brackets.
fn parse_checklist(text: &str) -> Vec<String> {
    let re = checklist_regex();
    text.lines()
        .filter_map(|line| {
            re.captures(line.trim_start())
                .map(|caps| caps[1].trim().to_string())
        })
        .collect()
}

fn checklist_regex() -> &'static regex::Regex {
    static RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"(?i)^-\s*\[\s*[ xX]?\s*\]\s*(.+)$").unwrap()
    });
    &RE
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = SipHasher13::new();
    hasher.write(bytes);
    format!("{:016x}", hasher.finish())
}
