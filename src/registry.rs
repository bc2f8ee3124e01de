//! Metadata registry: capability/domain lookup over the catalog without
//! running the full routing pipeline (spec §4.6.6, §4.6.7, §4.6.8 — C3).

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::profile::{ComplexityTier, Profile};

/// One hit from `find_profiles_by_capability` / `find_profiles_by_domain`.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedProfile {
    pub name: String,
    pub description: String,
    pub match_score: f64,
}

/// Count of profiles per `complexity_tier` (spec §4.3 `Summary()`: "count
/// of profiles per complexity tier").
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ComplexityTierCounts {
    pub simple: usize,
    pub complex: usize,
}

/// Response body for `get_registry_summary` (spec §4.3): total profile
/// count, the union of domains and capabilities, per-tier counts, and the
/// catalog-generation timestamp. `fallback_profile` and `complexity_pairs`
/// are additive beyond the spec's minimum contract.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_profiles: usize,
    pub domains: Vec<String>,
    pub capabilities: Vec<String>,
    pub complexity_tier_counts: ComplexityTierCounts,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub fallback_profile: Option<String>,
    pub complexity_pairs: Vec<ComplexityPair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplexityPair {
    pub base: String,
    pub complex: String,
}

const EXACT_SCORE: f64 = 1.0;
const SUBSTRING_SCORE: f64 = 0.7;
const KEYWORD_KEY_SCORE: f64 = 0.5;

/// Thin read-only view over a [`Catalog`] for the three registry tools.
pub struct MetadataRegistry<'a> {
    catalog: &'a Catalog,
}

impl<'a> MetadataRegistry<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Rank every profile against `capability` using the tiered scheme
    /// from spec §4.6.6: exact tag match (1.0) beats a substring match in
    /// any declared capability (0.7) beats the capability appearing as a
    /// `keyword_weights` key (0.5). Profiles scoring 0.0 are omitted.
    pub fn find_by_capability(&self, capability: &str) -> Vec<MatchedProfile> {
        let needle = capability.to_lowercase();
        self.rank(&needle, |p| &p.capabilities)
    }

    /// Same scheme as [`Self::find_by_capability`], over `domains`.
    pub fn find_by_domain(&self, domain: &str) -> Vec<MatchedProfile> {
        let needle = domain.to_lowercase();
        self.rank(&needle, |p| &p.domains)
    }

    fn rank(
        &self,
        needle: &str,
        tags_of: impl Fn(&Profile) -> &std::collections::BTreeSet<String>,
    ) -> Vec<MatchedProfile> {
        let mut hits: Vec<MatchedProfile> = self
            .catalog
            .all()
            .into_iter()
            .filter_map(|profile| {
                let score = score_one(&profile, needle, &tags_of);
                (score > 0.0).then(|| MatchedProfile {
                    name: profile.name.clone(),
                    description: profile.description.clone(),
                    match_score: score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        hits
    }

    pub fn summary(&self) -> Summary {
        let profiles = self.catalog.all();

        let mut domains: std::collections::BTreeSet<String> = Default::default();
        let mut capabilities: std::collections::BTreeSet<String> = Default::default();
        let mut names: std::collections::HashSet<String> = Default::default();
        let mut complexity_pairs = Vec::new();
        let mut tier_counts = ComplexityTierCounts::default();

        for profile in &profiles {
            domains.extend(profile.domains.iter().cloned());
            capabilities.extend(profile.capabilities.iter().cloned());
            names.insert(profile.name.clone());
            match profile.complexity_tier {
                ComplexityTier::Simple => tier_counts.simple += 1,
                ComplexityTier::Complex => tier_counts.complex += 1,
            }
        }

        for profile in &profiles {
            if let Some(sibling) = profile.complex_sibling_name() {
                if names.contains(&sibling) {
                    complexity_pairs.push(ComplexityPair {
                        base: profile.name.clone(),
                        complex: sibling,
                    });
                }
            }
        }
        complexity_pairs.sort_by(|a, b| a.base.cmp(&b.base));

        Summary {
            total_profiles: profiles.len(),
            domains: domains.into_iter().collect(),
            capabilities: capabilities.into_iter().collect(),
            complexity_tier_counts: tier_counts,
            generated_at: chrono::Utc::now(),
            fallback_profile: self.catalog.fallback().map(|p| p.name.clone()),
            complexity_pairs,
        }
    }
}

fn score_one(
    profile: &Arc<Profile>,
    needle: &str,
    tags_of: &impl Fn(&Profile) -> &std::collections::BTreeSet<String>,
) -> f64 {
    let tags = tags_of(profile);

    if tags.iter().any(|t| t.to_lowercase() == needle) {
        return EXACT_SCORE;
    }
    if tags.iter().any(|t| t.to_lowercase().contains(needle)) {
        return SUBSTRING_SCORE;
    }
    if profile.keyword_weights.keys().any(|k| k == needle) {
        return KEYWORD_KEY_SCORE;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use std::fs;

    fn write_profile(dir: &std::path::Path, filename: &str, front_matter: &str) {
        let body = format!("---\n{front_matter}\n---\n## Instructions\nDo the thing.\n");
        fs::write(dir.join(filename), body).unwrap();
    }

    #[test]
    fn exact_domain_match_outranks_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "exact.md",
            "name: exact_engineering\ndescription: Matches the engineering domain exactly here.\ndomains:\n  - engineering\n",
        );
        write_profile(
            dir.path(),
            "substring.md",
            "name: software_engineering_plus\ndescription: Has a domain containing engineering as substring.\ndomains:\n  - software_engineering\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let registry = MetadataRegistry::new(&catalog);

        let hits = registry.find_by_domain("engineering");
        assert_eq!(hits[0].name, "exact_engineering");
        assert_eq!(hits[0].match_score, 1.0);
        assert_eq!(hits[1].match_score, 0.7);
    }

    #[test]
    fn keyword_weight_key_match_is_lowest_tier() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "kw.md",
            "name: keyword_only_profile\ndescription: Only matches via a keyword weight key here.\nkeyword_weights:\n  deploy: 3\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let registry = MetadataRegistry::new(&catalog);

        let hits = registry.find_by_capability("deploy");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_score, 0.5);
    }

    #[test]
    fn no_match_is_omitted_not_zero_scored() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "a.md",
            "name: unrelated_profile\ndescription: Shares nothing with the search term at all.\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let registry = MetadataRegistry::new(&catalog);

        assert!(registry.find_by_capability("quantum_computing").is_empty());
    }

    #[test]
    fn summary_pairs_base_and_complex_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "base.md",
            "name: python_code_generation\ndescription: Base tier python code generation profile.\n",
        );
        write_profile(
            dir.path(),
            "complex.md",
            "name: python_code_generation_complex\ndescription: Complex tier sibling of the base profile.\ncomplexity_tier: complex\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let registry = MetadataRegistry::new(&catalog);

        let summary = registry.summary();
        assert_eq!(summary.total_profiles, 2);
        assert_eq!(summary.complexity_pairs.len(), 1);
        assert_eq!(summary.complexity_pairs[0].base, "python_code_generation");
        assert_eq!(summary.complexity_tier_counts.simple, 1);
        assert_eq!(summary.complexity_tier_counts.complex, 1);
    }
}
