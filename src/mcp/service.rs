//! MCP service implementation using rmcp.
//!
//! `GatewayService` exposes the six gateway operations as MCP tools. Each
//! tool returns one text block; failures become MCP errors carrying the
//! gateway's suggestion and retry hints.

use crate::error::GatewayError;
use crate::models::CallerId;
use crate::tools::facade::GatewayTools;
use crate::tools::query::{SampleDataInput, SelectQueryInput};
use crate::tools::schema::{DescribeTableInput, ListTablesInput};
use crate::tools::write::WriteQueryInput;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

/// Header carrying the MCP session id on the streamable HTTP transport.
const SESSION_HEADER: &str = "mcp-session-id";

/// Rate-limit identity of the peer behind `ctx`.
///
/// HTTP requests are keyed by their MCP session; anything without HTTP
/// request parts is the single stdio peer.
fn caller_id(ctx: &RequestContext<RoleServer>) -> CallerId {
    ctx.extensions
        .get::<axum::http::request::Parts>()
        .and_then(|parts| parts.headers.get(SESSION_HEADER))
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
        .map(CallerId::new)
        .unwrap_or_else(CallerId::stdio)
}

fn text_result(result: Result<String, GatewayError>) -> Result<CallToolResult, McpError> {
    result
        .map(|text| CallToolResult::success(vec![Content::text(text)]))
        .map_err(McpError::from)
}

#[derive(Clone)]
pub struct GatewayService {
    /// Shared tool surface (pool, policy, handlers)
    tools: Arc<GatewayTools>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    pub fn new(tools: Arc<GatewayTools>) -> Self {
        Self {
            tools,
            tool_router: Self::tool_router(),
        }
    }

    pub fn tools(&self) -> &Arc<GatewayTools> {
        &self.tools
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "List the user schemas of the database.\nSystem schemas (pg_catalog, information_schema, pg_toast, temp) are excluded."
    )]
    async fn list_schemas(&self) -> Result<CallToolResult, McpError> {
        text_result(self.tools.list_schemas().await)
    }

    #[tool(description = "List the tables of one schema.\nschema defaults to \"public\" (\"main\" on SQLite).")]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.tools.list_tables(input).await)
    }

    #[tool(
        description = "Describe the structure of a table: columns, types, nullability, defaults, primary key and foreign keys."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.tools.describe_table(input).await)
    }

    #[tool(
        description = "Execute one SELECT query (DQL) and return the rows as a table.\nRead-only: runs without confirmation. Any other statement kind is refused; use execute_write_query for modifications.\nResults are capped at the server row limit."
    )]
    async fn execute_select_query(
        &self,
        Parameters(input): Parameters<SelectQueryInput>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let caller = caller_id(&ctx);
        text_result(self.tools.execute_select_query(&caller, input).await)
    }

    #[tool(
        description = "Execute one statement that modifies the database (DML, DDL or other).\nThe first call returns CONFIRMATION_REQUIRED with the classified statement and changes nothing. Ask the user, then call again with confirmed=true to execute it in a single transaction."
    )]
    async fn execute_write_query(
        &self,
        Parameters(input): Parameters<WriteQueryInput>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let caller = caller_id(&ctx);
        text_result(self.tools.execute_write_query(&caller, input).await)
    }

    #[tool(
        description = "Return sample rows from a table to understand its content.\nlimit defaults to 5 and is capped at the server row limit."
    )]
    async fn get_sample_data(
        &self,
        Parameters(input): Parameters<SampleDataInput>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.tools.get_sample_data(input).await)
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-gateway-mcp".to_owned(),
                title: Some("SQL Gateway MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Safety-gated access to one SQL database.\n\
                \n\
                ## Workflow\n\
                1. `list_schemas`, then `list_tables` to find tables\n\
                2. `describe_table` and `get_sample_data` to understand them\n\
                3. `execute_select_query` for reads\n\
                \n\
                ## Writes\n\
                `execute_write_query` never executes on the first call. It returns\n\
                CONFIRMATION_REQUIRED with the statement; show it to the user and only\n\
                resubmit with `confirmed: true` after they agree.\n\
                \n\
                ## Limits\n\
                - One statement per call; multiple statements are rejected\n\
                - Some keywords (e.g. DROP DATABASE) are always blocked\n\
                - Free-text SQL calls are rate limited per session"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, QueryLimits};
    use crate::db::ConnectionPool;
    use crate::tools::facade::TOOL_CATALOG;
    use crate::tools::guard::{KeywordFilter, SafetyPolicy};
    use crate::tools::rate_limit::RateLimiter;

    async fn create_test_service() -> (GatewayService, tempfile::TempPath) {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let config = PoolConfig::sqlite(path.to_path_buf()).validated().unwrap();
        let pool = Arc::new(ConnectionPool::connect(config).await.unwrap());
        let policy = Arc::new(SafetyPolicy::new(
            KeywordFilter::default(),
            RateLimiter::disabled(),
        ));
        let tools = Arc::new(GatewayTools::new(pool, policy, QueryLimits::default()));
        (GatewayService::new(tools), path)
    }

    #[tokio::test]
    async fn test_router_matches_catalog() {
        let (service, _path) = create_test_service().await;
        let mut routed: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        routed.sort();
        let mut cataloged: Vec<String> = TOOL_CATALOG.iter().map(|t| t.name.to_string()).collect();
        cataloged.sort();
        assert_eq!(routed, cataloged);
    }

    #[tokio::test]
    async fn test_server_info() {
        let (service, _path) = create_test_service().await;
        let info = service.get_info();
        assert_eq!(info.server_info.name, "sql-gateway-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("CONFIRMATION_REQUIRED"));
    }
}
