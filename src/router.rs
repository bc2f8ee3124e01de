//! Routing engine: scores every catalogued profile against prompt
//! metadata, selects a winner, and computes a softmax confidence measure
//! (spec §4.5 — C5).

use std::sync::Arc;

use serde::Serialize;

use crate::analyzer::EnhancedMetadata;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{BrokerError, Result};
use crate::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Matched,
    Fallback,
    ForcedByOverride,
    UpgradedToComplex,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingResult {
    pub profile: Arc<Profile>,
    pub score: i64,
    pub consistency: f64,
    pub reason: Reason,
}

/// Temperature constant for the softmax consistency score (spec §4.5,
/// §9 Open Question: T = max(1, s1/5), chosen to match the worked
/// examples in spec §8 — documented in DESIGN.md).
fn temperature(top_score: i64) -> f64 {
    (top_score as f64 / 5.0).max(1.0)
}

struct Candidate {
    profile: Arc<Profile>,
    score: i64,
    feature_score: i64,
    tag_intersections: usize,
}

/// Score one profile per the spec §4.5 formula. Disqualified profiles
/// (non-empty `required_context_tags` disjoint from the prompt's derived
/// tags) score 0 regardless of keyword/domain/complexity/priority hits.
///
/// Returns `(total_score, feature_score, tag_intersections)`.
/// `total_score` is the full spec §4.5 formula (`default_score` plus every
/// feature contribution) and is what gets reported and ranked within the
/// candidate set. `feature_score` excludes `default_score` and is what
/// decides *membership* in that set: spec §8's fallback scenario requires
/// the fallback profile to win "only when all other profiles are
/// disqualified or score 0" on their own merits, not merely because every
/// profile carries a positive `default_score` baseline.
fn score_profile(profile: &Profile, meta: &EnhancedMetadata) -> (i64, i64, usize) {
    let derived_tags: std::collections::BTreeSet<&str> = meta
        .topics
        .iter()
        .chain(meta.capabilities.iter())
        .chain(meta.context_tags.iter())
        .map(|s| s.as_str())
        .collect();

    let intersections = profile
        .required_context_tags
        .iter()
        .filter(|tag| derived_tags.contains(tag.as_str()))
        .count();

    if !profile.required_context_tags.is_empty() && intersections == 0 {
        return (0, 0, 0);
    }

    let lower_prompt = meta.prompt.to_lowercase();
    let mut feature_score: i64 = 0;

    for (kw, weight) in &profile.keyword_weights {
        if lower_prompt.contains(kw.as_str()) {
            feature_score += weight;
        }
    }
    if let Some(domain) = &meta.domain {
        if let Some(w) = profile.domain_weights.get(domain) {
            feature_score += w;
        }
    }
    if let Some(w) = profile.complexity_weights.get(&meta.complexity) {
        feature_score += w;
    }
    if let Some(priority) = &meta.priority {
        if let Some(w) = profile.priority_weights.get(priority) {
            feature_score += w;
        }
    }

    (profile.default_score + feature_score, feature_score, intersections)
}

pub struct Router<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
}

impl<'a> Router<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a Config) -> Self {
        Self { catalog, config }
    }

    /// Select a profile, possibly forced by `override_profile_name`
    /// (recognised only on `get_profile`/`resolve_prompt`; spec §4.5).
    pub fn route(
        &self,
        meta: &EnhancedMetadata,
        override_profile_name: Option<&str>,
    ) -> Result<RoutingResult> {
        if let Some(name) = override_profile_name {
            let profile = self
                .catalog
                .get(name)
                .ok_or_else(|| BrokerError::NoMatchingProfile)?;
            return Ok(RoutingResult {
                profile,
                score: 0,
                consistency: 100.0,
                reason: Reason::ForcedByOverride,
            });
        }

        let profiles = self.catalog.all();
        let candidates: Vec<Candidate> = profiles
            .iter()
            .map(|profile| {
                let (score, feature_score, intersections) = score_profile(profile, meta);
                Candidate {
                    profile: profile.clone(),
                    score,
                    feature_score,
                    tag_intersections: intersections,
                }
            })
            .collect();

        // Selection set S (spec §4.5) is keyed off actual feature
        // contribution, not the `default_score` baseline every
        // non-disqualified profile carries: otherwise the fallback branch
        // below would be dead for any catalog where every profile has a
        // positive `default_score` (spec §8's fallback scenario).
        let mut scored: Vec<&Candidate> = candidates.iter().filter(|c| c.feature_score > 0).collect();

        if scored.is_empty() {
            return match self.catalog.fallback() {
                Some(profile) => Ok(RoutingResult {
                    profile,
                    score: 0,
                    consistency: 100.0,
                    reason: Reason::Fallback,
                }),
                None => Err(BrokerError::NoMatchingProfile),
            };
        }

        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.tag_intersections.cmp(&a.tag_intersections))
                .then_with(|| b.profile.default_score.cmp(&a.profile.default_score))
                .then_with(|| a.profile.name.cmp(&b.profile.name))
        });

        let winner = scored[0];
        let mut winning_profile = winner.profile.clone();
        let mut winning_score = winner.score;
        let mut reason = Reason::Matched;

        if self.config.complexity_routing_enabled {
            if let Some(sibling_name) = winning_profile.complex_sibling_name() {
                let complexity_signals_upgrade =
                    meta.complexity == "complex" || meta.word_count >= self.config.complexity_prefer_threshold;

                if complexity_signals_upgrade {
                    if let Some(sibling) = self.catalog.get(&sibling_name) {
                        let (sibling_score, _sibling_feature_score, sibling_intersections) =
                            score_profile(&sibling, meta);
                        let sibling_disqualified =
                            !sibling.required_context_tags.is_empty() && sibling_intersections == 0;
                        if !sibling_disqualified {
                            winning_profile = sibling;
                            winning_score = sibling_score.max(1);
                            reason = Reason::UpgradedToComplex;
                        }
                    }
                }
            }
        }

        let consistency = compute_consistency(&scored, winning_profile.name.as_str(), winning_score);

        Ok(RoutingResult {
            profile: winning_profile,
            score: winning_score,
            consistency,
            reason,
        })
    }
}

/// Softmax-normalised confidence over the positively-scored candidates
/// (spec §4.5). `winner_score` may be the post-upgrade score of a
/// `_complex` sibling that did not itself appear in `scored`; in that case
/// it is folded in as an extra term rather than looked up by name.
fn compute_consistency(scored: &[&Candidate], winner_name: &str, winner_score: i64) -> f64 {
    if scored.len() == 1 && scored[0].profile.name == winner_name {
        return 100.0;
    }

    let top_score = scored.first().map(|c| c.score).unwrap_or(winner_score).max(winner_score);
    let t = temperature(top_score);

    let already_present = scored.iter().any(|c| c.profile.name == winner_name);
    let mut denom: f64 = scored.iter().map(|c| (c.score as f64 / t).exp()).sum();
    if !already_present {
        denom += (winner_score as f64 / t).exp();
    }

    if scored.len() == 1 && already_present {
        return 100.0;
    }

    let numerator = (winner_score as f64 / t).exp();
    let pct = 100.0 * numerator / denom;
    (pct * 10.0).round() / 10.0
}
