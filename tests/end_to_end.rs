//! Cross-module scenarios exercising catalog + analyser + router together,
//! mirroring the worked examples used to validate the routing design.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mcp_prompt_broker::analyzer::{analyze, Overrides};
use mcp_prompt_broker::catalog::Catalog;
use mcp_prompt_broker::config::Config;
use mcp_prompt_broker::registry::MetadataRegistry;
use mcp_prompt_broker::router::{Reason, Router};

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

fn write(dir: &Path, filename: &str, front_matter: &str, body: &str) {
    fs::write(dir.join(filename), format!("---\n{front_matter}\n---\n{body}")).unwrap();
}

fn full_catalog_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "general_default.md",
        "name: general_default\ndescription: Generic fallback guidance for unmatched prompts.\nfallback: true\n",
        "## Instructions\nBe generally helpful.\n",
    );
    write(
        dir.path(),
        "creative_brainstorm.md",
        "name: creative_brainstorm\ndescription: Generates creative names and brainstorm ideas for branding.\nkeyword_weights:\n  brainstorm: 5\n  nápady: 4\n  ideas: 4\n",
        "## Instructions\nOffer several distinct creative directions.\n",
    );
    write(
        dir.path(),
        "technical_support.md",
        "name: technical_support\ndescription: Diagnoses and helps fix bugs and runtime errors in code.\nkeyword_weights:\n  debug: 5\n  error: 4\n  keyerror: 4\ndomain_weights:\n  engineering: 4\n",
        "## Instructions\nFind the root cause before proposing a fix.\n",
    );
    write(
        dir.path(),
        "privacy_sensitive.md",
        "name: privacy_sensitive\ndescription: Handles prompts referencing personal or regulated data.\nrequired_context_tags:\n  - pii\n  - compliance\ndefault_score: 5\n",
        "## Instructions\nTreat personal data as sensitive by default.\n",
    );
    write(
        dir.path(),
        "python_code_generation.md",
        "name: python_code_generation\ndescription: Writes small self-contained python functions and scripts.\nkeyword_weights:\n  python: 5\n",
        "## Instructions\nWrite a minimal runnable snippet.\n",
    );
    write(
        dir.path(),
        "python_code_generation_complex.md",
        "name: python_code_generation_complex\ndescription: Designs multi-module python systems and migration plans.\ncomplexity_tier: complex\nkeyword_weights:\n  python: 3\n",
        "## Instructions\nSketch module boundaries before writing code.\n",
    );
    dir
}

#[test]
fn scenario_creative_routing_czech_input() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let cfg = config();

    let meta = analyze(
        "Potřebuji vymyslet nápady pro logo fitness aplikace",
        &Overrides::default(),
        &cfg,
    );
    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();

    assert_eq!(result.profile.name, "creative_brainstorm");
    assert!(result.score >= result.profile.default_score + 4);
    assert_eq!(result.reason, Reason::Matched);
    assert!(result.consistency > 50.0);
}

#[test]
fn scenario_technical_debug_english() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let cfg = config();

    let meta = analyze(
        "Debug my Python script that throws KeyError on line 42",
        &Overrides::default(),
        &cfg,
    );
    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();

    assert_eq!(result.profile.name, "technical_support");
    assert_eq!(result.score, 1 + 5 + 4 + 4 + 4);
}

#[test]
fn scenario_fallback_path() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let cfg = config();

    let meta = analyze("Hello", &Overrides::default(), &cfg);
    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();

    assert_eq!(result.profile.name, "general_default");
    assert_eq!(result.reason, Reason::Fallback);
    assert_eq!(result.consistency, 100.0);
}

#[test]
fn scenario_required_tag_gate_opens_on_matching_topic() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let cfg = config();

    let meta = analyze("Write a haiku", &Overrides::default(), &cfg);
    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();
    assert_ne!(result.profile.name, "privacy_sensitive");

    let meta = analyze("Process this patient SSN record", &Overrides::default(), &cfg);
    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();
    assert_eq!(result.profile.name, "privacy_sensitive");
}

#[test]
fn scenario_complexity_upgrade_on_long_prompt_with_signal_words() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let cfg = config();

    let long_prompt = format!(
        "{} please plan the enterprise architecture migration carefully",
        "python code generation request ".repeat(20)
    );
    let meta = analyze(&long_prompt, &Overrides::default(), &cfg);
    assert!(meta.word_count >= 80);

    let result = Router::new(&catalog, &cfg).route(&meta, None).unwrap();
    assert_eq!(result.profile.name, "python_code_generation_complex");
    assert_eq!(result.reason, Reason::UpgradedToComplex);
}

#[test]
fn scenario_hot_reload_is_atomic_across_a_concurrent_in_flight_request() {
    let dir = full_catalog_dir();
    let catalog = Arc::new(Catalog::load(dir.path()).unwrap());
    assert_eq!(catalog.len(), 6);

    // Simulate "in flight": take a snapshot handle before mutating the
    // directory, the same way a request holds `Arc<Profile>` across the
    // reload boundary.
    let in_flight_profile = catalog.get("technical_support").unwrap();

    write(
        dir.path(),
        "technical_support.md",
        "name: technical_support\ndescription: Diagnoses and helps fix bugs and runtime errors in code.\nkeyword_weights:\n  debug: 9\n",
        "## Instructions\nRewritten after the in-flight request started.\n",
    );

    let report = catalog.reload().unwrap();
    assert_eq!(report.loaded, 6);
    assert!(report.errors.is_empty());

    assert_eq!(in_flight_profile.keyword_weights.get("debug"), Some(&5));

    let refreshed = catalog.get("technical_support").unwrap();
    assert_eq!(refreshed.keyword_weights.get("debug"), Some(&9));
}

#[test]
fn reload_then_list_reflects_exactly_the_reported_count() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let report = catalog.reload().unwrap();
    assert_eq!(catalog.all().len(), report.loaded);
}

#[test]
fn registry_find_by_capability_returns_exact_match_first() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let registry = MetadataRegistry::new(&catalog);

    // None of the fixture profiles declare explicit `capabilities`, so a
    // keyword-weight-key search should surface technical_support via its
    // `debug` weight rather than an exact/substring capability tag.
    let hits = registry.find_by_capability("debug");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].match_score, 0.5);
}

#[test]
fn reload_is_idempotent_for_unchanged_file_contents() {
    let dir = full_catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();

    let before: Vec<(String, String)> = catalog
        .all()
        .into_iter()
        .map(|p| (p.name.clone(), p.description.clone()))
        .collect();

    catalog.reload().unwrap();

    let mut after: Vec<(String, String)> = catalog
        .all()
        .into_iter()
        .map(|p| (p.name.clone(), p.description.clone()))
        .collect();
    let mut before_sorted = before;
    before_sorted.sort();
    after.sort();

    assert_eq!(before_sorted, after);
}
