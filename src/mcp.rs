//! MCP (Model Context Protocol) server for topic-state files.
//!
//! Exposes the operations in `ops` as MCP tools so that AI assistants
//! (Claude Desktop, Cursor, etc.) can invoke them over stdio JSON-RPC.
//!
//! Start with: `topicstate --mcp`

use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRouter},
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::algo::clustering::{Linkage, Metric};
use crate::algo::scaling::ScaleOptions;
use crate::ops;

// ── Parameter structs ───────────────────────────────────────────────────────
// Each struct maps 1:1 with a CLI subcommand. `JsonSchema` is required by
// rmcp so that the tool's input schema is auto-generated for the AI client.

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StateParams {
    /// Path to a gzip-compressed MALLET topic-state file.
    pub state: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScaleParams {
    /// Path to a gzip-compressed MALLET topic-state file.
    pub state: String,
    #[serde(flatten)]
    pub options: ScaleOptions,
    /// Also write headerless topic_scaled CSV rows to this path.
    pub csv: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClusterParams {
    /// Path to a gzip-compressed MALLET topic-state file.
    pub state: String,
    #[serde(flatten)]
    pub request: ops::ClusterRequest,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScaleModelsParams {
    /// Directory containing topics{N}/topic-state{N}.gz subdirectories.
    pub model_dir: String,
    #[serde(flatten)]
    pub options: ScaleOptions,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClusterModelsParams {
    /// Directory containing topics{N}/topic-state{N}.gz subdirectories.
    pub model_dir: String,
    /// Metrics to run (default: the single `metric`).
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// Linkages to run (default: the single `linkage`).
    #[serde(default)]
    pub linkages: Vec<Linkage>,
    #[serde(flatten)]
    pub request: ops::ClusterRequest,
}

/// Run a blocking operation off the async runtime and wrap its JSON output.
async fn run_op<F>(op: F) -> Result<CallToolResult, McpError>
where
    F: FnOnce() -> crate::error::Result<serde_json::Value> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| McpError::internal_error(format!("task join error: {e}"), None))?
        .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

// ── MCP Server ──────────────────────────────────────────────────────────────

/// The MCP server struct. Holds only the auto-generated tool router.
#[derive(Clone)]
pub struct TopicStateMcp {
    #[allow(dead_code)] // accessed at runtime by the #[tool_router] macro
    tool_router: ToolRouter<Self>,
}

impl Default for TopicStateMcp {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl TopicStateMcp {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    // ── state_info ──────────────────────────────────────────────────────

    #[tool(
        name = "state_info",
        description = "Read a MALLET topic-state file (gzip) and report its hyperparameters (alpha per topic, beta), number of topics, tokens, documents, vocabulary size, and tokens assigned to each topic."
    )]
    async fn state_info(
        &self,
        params: Parameters<StateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_state_info(&p.state)).await
    }

    // ── distributions ───────────────────────────────────────────────────

    #[tool(
        name = "distributions",
        description = "Build smoothed topic-term (beta added per cell) and document-topic (alpha added per topic) distributions from a MALLET topic-state file. Returns topic_term_dists, doc_topic_dists, doc_lengths, vocab, term_frequency, and doc_ids."
    )]
    async fn distributions(
        &self,
        params: Parameters<StateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_distributions(&p.state)).await
    }

    // ── scale_topics ────────────────────────────────────────────────────

    #[tool(
        name = "scale_topics",
        description = "Project topics to 2D from the Jensen-Shannon divergence between their term distributions. Reducers: pcoa (classical MDS), mmds (metric MDS), tsne. Returns x, y, topic (1-based output order), model_topic, cluster, and freq (percent of corpus tokens)."
    )]
    async fn scale_topics(
        &self,
        params: Parameters<ScaleParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_scale(&p.state, p.options, p.csv.as_deref())).await
    }

    // ── cluster_topics ──────────────────────────────────────────────────

    #[tool(
        name = "cluster_topics",
        description = "Hierarchically cluster topics by their term distributions. Returns the dendrogram as scipy-style merges, a nested tree, leaf order, and Topic1..TopicN labels. Optional flat groups by height (color_threshold) or count (groups), and keywords from a MALLET keys file."
    )]
    async fn cluster_topics(
        &self,
        params: Parameters<ClusterParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_cluster(&p.state, &p.request)).await
    }

    // ── scale_models ────────────────────────────────────────────────────

    #[tool(
        name = "scale_models",
        description = "Write topic_scaled.csv into every topics{N} model directory under model_dir. Models are processed in parallel; a model that fails is reported with its error and the others still complete."
    )]
    async fn scale_models(
        &self,
        params: Parameters<ScaleModelsParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_scale_models(&p.model_dir, p.options)).await
    }

    // ── cluster_models ──────────────────────────────────────────────────

    #[tool(
        name = "cluster_models",
        description = "Cluster every topics{N} model under model_dir once per metric × linkage pair (metrics, linkages). Returns one result per model and pair, with keywords from each model's keys{N}.txt when present. A model that fails is reported with its error and the others still complete."
    )]
    async fn cluster_models(
        &self,
        params: Parameters<ClusterModelsParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        run_op(move || ops::op_cluster_models(&p.model_dir, &p.metrics, &p.linkages, &p.request))
            .await
    }
}

// ── ServerHandler glue ──────────────────────────────────────────────────────

impl ServerHandler for TopicStateMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "MALLET topic-state tools. Tools: state_info, distributions, scale_topics, \
                 cluster_topics, scale_models, cluster_models. Pass paths to gzip-compressed state files \
                 or to a directory of topics{N} models."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "topicstate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Topic State Tools".into()),
                description: Some(
                    "Topic distributions, coordinates and dendrograms from MALLET state files"
                        .into(),
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

// ── Entry point ─────────────────────────────────────────────────────────────

/// Start the MCP server on stdio. Called from `cli.rs` when `--mcp` is passed.
pub async fn serve_stdio() -> Result<(), Box<dyn std::error::Error>> {
    let server = TopicStateMcp::new();
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        log::error!("MCP serve error: {e}");
    })?;
    service.waiting().await?;
    Ok(())
}
