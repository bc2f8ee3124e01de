//! Stdio MCP server: binds the JSON-RPC tool surface to the catalog,
//! analyser, and router (spec §4.6, §4.7, §6.1 — C6/C7).

use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRouter},
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::analyzer::{self, Overrides};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::dispatcher::{
    timeout_for, to_jsonrpc_error, CapabilityRequest, ChecklistResponse, DomainRequest,
    MatchedProfilesResponse, ProfileMetadataResponse, ProfileNameRequest, ProfilePayload,
    ProfileSummary, ReloadProfilesResponse, ResolvePromptRequest, ResolvePromptResponse,
    RoutingTrace,
};
use crate::error::BrokerError;
use crate::registry::MetadataRegistry;

fn json_text(v: &impl serde::Serialize) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "{}".to_string())
}

fn broker_err_to_mcp(err: BrokerError) -> McpError {
    let (_, kind, message) = to_jsonrpc_error(&err);
    match err {
        BrokerError::InvalidArgument(_) => {
            McpError::invalid_params(message, Some(serde_json::json!({"kind": kind})))
        }
        _ => McpError::internal_error(message, Some(serde_json::json!({"kind": kind}))),
    }
}

async fn with_timeout<T>(
    tool: &str,
    fut: impl std::future::Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    match tokio::time::timeout(timeout_for(tool), fut).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::Timeout(timeout_for(tool))),
    }
}

/// Split a caller-supplied `metadata` object into the recognised
/// [`Overrides`] plus the `profile_name` escape hatch (spec §4.5, §4.6 —
/// `profile_name` is accepted only here, not part of `EnhancedMetadata`).
fn parse_overrides(metadata: Option<Value>) -> (Overrides, Option<String>) {
    let Some(value) = metadata else {
        return (Overrides::default(), None);
    };
    let profile_name = value
        .get("profile_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let overrides: Overrides = serde_json::from_value(value).unwrap_or_default();
    (overrides, profile_name)
}

/// The MCP server struct. Holds the shared catalog, config, and the
/// auto-generated tool router.
#[derive(Clone)]
pub struct BrokerMcp {
    catalog: Arc<Catalog>,
    config: Arc<Config>,
    #[allow(dead_code)]
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BrokerMcp {
    pub fn new(catalog: Arc<Catalog>, config: Arc<Config>) -> Self {
        Self {
            catalog,
            config,
            tool_router: Self::tool_router(),
        }
    }

    async fn resolve(&self, request: ResolvePromptRequest) -> Result<ResolvePromptResponse, BrokerError> {
        let (overrides, profile_name) = parse_overrides(request.metadata);
        let metadata = analyzer::analyze(&request.prompt, &overrides, &self.config);
        let routing = crate::router::Router::new(&self.catalog, &self.config)
            .route(&metadata, profile_name.as_deref())?;

        Ok(ResolvePromptResponse {
            profile: ProfilePayload {
                name: routing.profile.name.clone(),
                description: routing.profile.description.clone(),
                instructions: routing.profile.instructions.clone(),
                checklist: routing.profile.checklist.clone(),
            },
            metadata,
            routing: RoutingTrace {
                score: routing.score,
                consistency: routing.consistency,
                reason: routing.reason,
            },
        })
    }

    #[tool(
        name = "list_profiles",
        description = "List every profile currently in the catalog with its name, description, domains, capabilities, complexity tier, and whether it is the fallback profile."
    )]
    async fn list_profiles(&self) -> Result<CallToolResult, McpError> {
        let result: Result<Vec<ProfileSummary>, BrokerError> = with_timeout("list_profiles", async {
            let mut profiles = self.catalog.all();
            profiles.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(profiles
                .into_iter()
                .map(|p| ProfileSummary {
                    name: p.name.clone(),
                    description: p.description.clone(),
                    domains: p.domains.iter().cloned().collect(),
                    capabilities: p.capabilities.iter().cloned().collect(),
                    complexity: p.complexity_tier,
                    fallback: p.fallback,
                })
                .collect())
        })
        .await;

        let profiles = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&profiles))]))
    }

    #[tool(
        name = "resolve_prompt",
        description = "Analyse a natural-language prompt and select the single best-matching instruction profile, with its score, confidence, and the reason it was chosen. Accepts an optional `metadata` object of overrides (domain, intent, sensitivity, priority, audience, language, complexity, context_tags, capabilities, profile_name)."
    )]
    async fn resolve_prompt(
        &self,
        params: Parameters<ResolvePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let response = with_timeout("resolve_prompt", self.resolve(request))
            .await
            .map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "get_profile",
        description = "Alias of resolve_prompt: analyse a natural-language prompt and select the single best-matching instruction profile."
    )]
    async fn get_profile(
        &self,
        params: Parameters<ResolvePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.resolve_prompt(params).await
    }

    #[tool(
        name = "reload_profiles",
        description = "Re-scan the profiles directory from disk and atomically replace the in-memory catalog. Returns the number of profiles loaded plus any per-file errors or warnings."
    )]
    async fn reload_profiles(&self) -> Result<CallToolResult, McpError> {
        let result: Result<ReloadProfilesResponse, BrokerError> =
            with_timeout("reload_profiles", async {
                let report = self.catalog.reload()?;
                let mut names: Vec<String> = self.catalog.all().into_iter().map(|p| p.name.clone()).collect();
                names.sort();
                Ok(ReloadProfilesResponse {
                    success: true,
                    profiles_loaded: report.loaded,
                    profile_names: names,
                    errors: report.errors,
                    warnings: report.warnings,
                })
            })
            .await;

        // reload_profiles never fails at the dispatcher layer (spec §4.6):
        // a timeout or catalog I/O failure is reported inside the payload.
        let response = result.unwrap_or_else(|e| ReloadProfilesResponse {
            success: false,
            profiles_loaded: 0,
            profile_names: vec![],
            errors: vec![e.to_string()],
            warnings: vec![],
        });
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "get_checklist",
        description = "Return the ordered checklist items for a named profile."
    )]
    async fn get_checklist(
        &self,
        params: Parameters<ProfileNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let result: Result<ChecklistResponse, BrokerError> = with_timeout("get_checklist", async {
            let profile = self
                .catalog
                .get(&p.profile_name)
                .ok_or_else(|| BrokerError::NotFound(p.profile_name.clone()))?;
            Ok(ChecklistResponse {
                profile_name: profile.name.clone(),
                items: profile.checklist.clone(),
                count: profile.checklist.len(),
            })
        })
        .await;

        let response = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "get_profile_metadata",
        description = "Return a profile's full record (weights, tags, provenance) excluding its instructions and checklist bodies."
    )]
    async fn get_profile_metadata(
        &self,
        params: Parameters<ProfileNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let result: Result<ProfileMetadataResponse, BrokerError> =
            with_timeout("get_profile_metadata", async {
                let profile = self
                    .catalog
                    .get(&p.profile_name)
                    .ok_or_else(|| BrokerError::NotFound(p.profile_name.clone()))?;
                Ok(ProfileMetadataResponse {
                    name: profile.name.clone(),
                    description: profile.description.clone(),
                    version: profile.version.clone(),
                    complexity_tier: profile.complexity_tier,
                    domains: profile.domains.iter().cloned().collect(),
                    capabilities: profile.capabilities.iter().cloned().collect(),
                    keyword_weights: profile.keyword_weights.clone(),
                    priority_weights: profile.priority_weights.clone(),
                    domain_weights: profile.domain_weights.clone(),
                    complexity_weights: profile.complexity_weights.clone(),
                    required_context_tags: profile.required_context_tags.iter().cloned().collect(),
                    default_score: profile.default_score,
                    fallback: profile.fallback,
                    source_path: profile.source_path.display().to_string(),
                    last_modified: profile.last_modified,
                    content_hash: profile.content_hash.clone(),
                })
            })
            .await;

        let response = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "find_profiles_by_capability",
        description = "Find profiles whose declared capabilities match the given capability tag, ranked by match strength (exact > substring > keyword-weight key)."
    )]
    async fn find_profiles_by_capability(
        &self,
        params: Parameters<CapabilityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let result: Result<MatchedProfilesResponse, BrokerError> =
            with_timeout("find_profiles_by_capability", async {
                if p.capability.trim().is_empty() {
                    return Err(BrokerError::InvalidArgument("capability must not be empty".into()));
                }
                let profiles = MetadataRegistry::new(&self.catalog).find_by_capability(&p.capability);
                Ok(MatchedProfilesResponse {
                    count: profiles.len(),
                    profiles,
                })
            })
            .await;

        let response = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "find_profiles_by_domain",
        description = "Find profiles whose declared domains match the given domain tag, ranked by match strength (exact > substring > keyword-weight key)."
    )]
    async fn find_profiles_by_domain(
        &self,
        params: Parameters<DomainRequest>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let result: Result<MatchedProfilesResponse, BrokerError> =
            with_timeout("find_profiles_by_domain", async {
                if p.domain.trim().is_empty() {
                    return Err(BrokerError::InvalidArgument("domain must not be empty".into()));
                }
                let profiles = MetadataRegistry::new(&self.catalog).find_by_domain(&p.domain);
                Ok(MatchedProfilesResponse {
                    count: profiles.len(),
                    profiles,
                })
            })
            .await;

        let response = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&response))]))
    }

    #[tool(
        name = "get_registry_summary",
        description = "Return aggregate catalog statistics: total profile count, fallback profile name, the union of domains and capabilities, and base/complex profile pairs."
    )]
    async fn get_registry_summary(&self) -> Result<CallToolResult, McpError> {
        let result: Result<_, BrokerError> = with_timeout("get_registry_summary", async {
            Ok(MetadataRegistry::new(&self.catalog).summary())
        })
        .await;

        let summary = result.map_err(broker_err_to_mcp)?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&summary))]))
    }
}

impl ServerHandler for BrokerMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Routes a natural-language prompt to the single best-matching instruction \
                 profile from a hot-reloadable catalog. Call resolve_prompt (or its alias \
                 get_profile) with {\"prompt\": \"...\"}. Use list_profiles, get_checklist, \
                 get_profile_metadata, find_profiles_by_capability, find_profiles_by_domain, \
                 get_registry_summary, and reload_profiles to inspect and refresh the catalog."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "mcp-prompt-broker".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Prompt Broker".into()),
                description: Some(
                    "Deterministic keyword-weighted router from prompts to instruction profiles".into(),
                ),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: Default::default(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_context = ToolCallContext::new(self, request, context);
        async move { self.tool_router.call(tool_context).await }
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

/// Run the server until stdin reaches EOF or the process is asked to
/// shut down (spec §4.7). Grace period bounds how long in-flight
/// requests get to finish once a stop signal has been observed.
pub async fn serve_stdio(
    catalog: Arc<Catalog>,
    config: Arc<Config>,
    shutdown_grace: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = BrokerMcp::new(catalog, config);
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        error!(error = %e, "failed to start stdio transport");
    })?;

    tokio::select! {
        result = service.waiting() => {
            result?;
            info!("stdio transport closed (EOF), shutting down");
        }
        _ = shutdown_signal() => {
            warn!(grace_ms = shutdown_grace.as_millis() as u64, "shutdown signal received, waiting grace period");
            let _ = tokio::time::timeout(shutdown_grace, service.waiting()).await;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}
