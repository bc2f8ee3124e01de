//! Tool dispatcher: request/response shapes for every exposed tool, and
//! timeout budgets (spec §4.6, §5 — C6). The actual JSON-RPC/MCP framing
//! lives in [`crate::server`]; this module defines the typed contract
//! each tool handler fulfils and stays transport-agnostic.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyzer::EnhancedMetadata;
use crate::error::BrokerError;
use crate::profile::ComplexityTier;
use crate::registry::MatchedProfile;
use crate::router::Reason;

/// Per-tool timeout budgets (spec §5): 5s for the hot path, 30s for
/// reload (it does file I/O), 1s for everything else.
pub fn timeout_for(tool: &str) -> Duration {
    match tool {
        "resolve_prompt" | "get_profile" => Duration::from_secs(5),
        "reload_profiles" => Duration::from_secs(30),
        _ => Duration::from_secs(1),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolvePromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub description: String,
    pub domains: Vec<String>,
    pub capabilities: Vec<String>,
    pub complexity: ComplexityTier,
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct RoutingTrace {
    pub score: i64,
    pub consistency: f64,
    pub reason: Reason,
}

#[derive(Debug, Serialize)]
pub struct ProfilePayload {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub checklist: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolvePromptResponse {
    pub profile: ProfilePayload,
    pub metadata: EnhancedMetadata,
    pub routing: RoutingTrace,
}

#[derive(Debug, Serialize)]
pub struct ReloadProfilesResponse {
    pub success: bool,
    pub profiles_loaded: usize,
    pub profile_names: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProfileNameRequest {
    pub profile_name: String,
}

#[derive(Debug, Serialize)]
pub struct ChecklistResponse {
    pub profile_name: String,
    pub items: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ProfileMetadataResponse {
    pub name: String,
    pub description: String,
    pub version: String,
    pub complexity_tier: ComplexityTier,
    pub domains: Vec<String>,
    pub capabilities: Vec<String>,
    pub keyword_weights: std::collections::BTreeMap<String, i64>,
    pub priority_weights: std::collections::BTreeMap<String, i64>,
    pub domain_weights: std::collections::BTreeMap<String, i64>,
    pub complexity_weights: std::collections::BTreeMap<String, i64>,
    pub required_context_tags: Vec<String>,
    pub default_score: i64,
    pub fallback: bool,
    pub source_path: String,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    pub content_hash: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CapabilityRequest {
    pub capability: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DomainRequest {
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct MatchedProfilesResponse {
    pub profiles: Vec<MatchedProfile>,
    pub count: usize,
}

/// Maps a [`BrokerError`] to the JSON-RPC `(code, kind)` pair (spec §6.1,
/// §7). `code` is the outer JSON-RPC error code; `kind` is the
/// application-level discriminant nested under `error.data.kind`.
pub fn to_jsonrpc_error(err: &BrokerError) -> (i64, &'static str, String) {
    let kind = err.kind();
    let code = match kind {
        crate::error::ErrorKind::InvalidArgument => -32602,
        crate::error::ErrorKind::Internal => -32603,
        _ => -32603,
    };
    (code, kind.as_str(), err.to_string())
}
