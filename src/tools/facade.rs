//! The six gateway operations behind one entry point.
//!
//! `GatewayTools` owns the per-tool handlers and the shared pool and policy.
//! `TOOL_CATALOG` describes each operation for callers that dispatch by name
//! instead of going through the MCP router.

use crate::config::QueryLimits;
use crate::db::ConnectionPool;
use crate::error::{GatewayError, GatewayResult};
use crate::models::CallerId;
use crate::tools::guard::SafetyPolicy;
use crate::tools::query::{QueryToolHandler, SampleDataInput, SelectQueryInput};
use crate::tools::schema::{
    DescribeTableInput, ListSchemasInput, ListTablesInput, SchemaToolHandler,
};
use crate::tools::write::{WriteQueryInput, WriteToolHandler};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamDescriptor {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    /// Default applied when the argument is omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamDescriptor],
}

const SCHEMA_PARAM: ParamDescriptor = ParamDescriptor {
    name: "schema",
    param_type: ParamType::String,
    required: false,
    default: Some("public"),
    description: "Schema name (\"main\" on SQLite)",
};

const TABLE_PARAM: ParamDescriptor = ParamDescriptor {
    name: "table",
    param_type: ParamType::String,
    required: true,
    default: None,
    description: "Table name",
};

pub const TOOL_CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "list_schemas",
        description: "List the user schemas of the database. System schemas are excluded.",
        parameters: &[],
    },
    ToolDescriptor {
        name: "list_tables",
        description: "List the tables of one schema.",
        parameters: &[SCHEMA_PARAM],
    },
    ToolDescriptor {
        name: "describe_table",
        description: "Describe a table: columns, types, nullability, defaults, primary key and foreign keys.",
        parameters: &[TABLE_PARAM, SCHEMA_PARAM],
    },
    ToolDescriptor {
        name: "execute_select_query",
        description: "Execute one read-only SELECT (or WITH ... SELECT) query. No confirmation needed.",
        parameters: &[ParamDescriptor {
            name: "sql",
            param_type: ParamType::String,
            required: true,
            default: None,
            description: "The SELECT statement",
        }],
    },
    ToolDescriptor {
        name: "execute_write_query",
        description: "Execute one data-modifying statement (DML, DDL or other). Returns CONFIRMATION_REQUIRED until called again with confirmed=true.",
        parameters: &[
            ParamDescriptor {
                name: "sql",
                param_type: ParamType::String,
                required: true,
                default: None,
                description: "The statement to execute",
            },
            ParamDescriptor {
                name: "confirmed",
                param_type: ParamType::Boolean,
                required: false,
                default: Some("false"),
                description: "Set to true once the user approved the statement",
            },
        ],
    },
    ToolDescriptor {
        name: "get_sample_data",
        description: "Return the first rows of a table to show what its data looks like.",
        parameters: &[
            TABLE_PARAM,
            SCHEMA_PARAM,
            ParamDescriptor {
                name: "limit",
                param_type: ParamType::Integer,
                required: false,
                default: Some("5"),
                description: "Rows to return, capped at the server row limit",
            },
        ],
    },
];

/// Look up a catalog entry by tool name.
pub fn find_tool(name: &str) -> Option<&'static ToolDescriptor> {
    TOOL_CATALOG.iter().find(|t| t.name == name)
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: JsonValue) -> GatewayResult<T> {
    let args = match args {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args)
        .map_err(|e| GatewayError::invalid_input(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Process-wide tool surface.
pub struct GatewayTools {
    pool: Arc<ConnectionPool>,
    policy: Arc<SafetyPolicy>,
    limits: QueryLimits,
    query: QueryToolHandler,
    schema: SchemaToolHandler,
    write: WriteToolHandler,
}

impl GatewayTools {
    pub fn new(pool: Arc<ConnectionPool>, policy: Arc<SafetyPolicy>, limits: QueryLimits) -> Self {
        Self {
            query: QueryToolHandler::new(pool.clone(), policy.clone(), limits),
            schema: SchemaToolHandler::new(pool.clone(), limits),
            write: WriteToolHandler::new(pool.clone(), policy.clone(), limits),
            pool,
            policy,
            limits,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn policy(&self) -> &Arc<SafetyPolicy> {
        &self.policy
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    pub async fn list_schemas(&self) -> GatewayResult<String> {
        self.schema.list_schemas(ListSchemasInput::default()).await
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> GatewayResult<String> {
        self.schema.list_tables(input).await
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> GatewayResult<String> {
        self.schema.describe_table(input).await
    }

    pub async fn execute_select_query(
        &self,
        caller: &CallerId,
        input: SelectQueryInput,
    ) -> GatewayResult<String> {
        self.query.execute_select_query(caller, input).await
    }

    pub async fn execute_write_query(
        &self,
        caller: &CallerId,
        input: WriteQueryInput,
    ) -> GatewayResult<String> {
        self.write.execute_write_query(caller, input).await
    }

    pub async fn get_sample_data(&self, input: SampleDataInput) -> GatewayResult<String> {
        self.query.get_sample_data(input).await
    }

    /// Route a structured call (tool name + JSON arguments) to its operation.
    pub async fn dispatch(
        &self,
        caller: &CallerId,
        name: &str,
        args: JsonValue,
    ) -> GatewayResult<String> {
        debug!(caller = %caller, tool = name, "Dispatching tool call");
        match name {
            "list_schemas" => {
                let _: ListSchemasInput = parse_args(name, args)?;
                self.list_schemas().await
            }
            "list_tables" => self.list_tables(parse_args(name, args)?).await,
            "describe_table" => self.describe_table(parse_args(name, args)?).await,
            "execute_select_query" => {
                self.execute_select_query(caller, parse_args(name, args)?)
                    .await
            }
            "execute_write_query" => {
                self.execute_write_query(caller, parse_args(name, args)?)
                    .await
            }
            "get_sample_data" => self.get_sample_data(parse_args(name, args)?).await,
            other => Err(GatewayError::invalid_input(format!(
                "Unknown tool '{}'. Available tools: {}",
                other,
                TOOL_CATALOG
                    .iter()
                    .map(|t| t.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lists_six_tools() {
        let names: Vec<&str> = TOOL_CATALOG.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "list_schemas",
                "list_tables",
                "describe_table",
                "execute_select_query",
                "execute_write_query",
                "get_sample_data",
            ]
        );
    }

    #[test]
    fn test_catalog_defaults() {
        let write = find_tool("execute_write_query").unwrap();
        let confirmed = write.parameters.iter().find(|p| p.name == "confirmed").unwrap();
        assert!(!confirmed.required);
        assert_eq!(confirmed.default, Some("false"));

        let sample = find_tool("get_sample_data").unwrap();
        let limit = sample.parameters.iter().find(|p| p.name == "limit").unwrap();
        assert_eq!(limit.param_type, ParamType::Integer);
        assert_eq!(limit.default, Some("5"));

        assert!(find_tool("drop_everything").is_none());
    }

    #[test]
    fn test_catalog_serializes() {
        let json = serde_json::to_value(find_tool("describe_table").unwrap()).unwrap();
        assert_eq!(json["parameters"][0]["name"], "table");
        assert_eq!(json["parameters"][0]["type"], "string");
        assert_eq!(json["parameters"][1]["default"], "public");
    }

    #[test]
    fn test_parse_args_treats_null_as_empty() {
        let input: ListTablesInput = parse_args("list_tables", JsonValue::Null).unwrap();
        assert!(input.schema.is_none());

        let err = parse_args::<DescribeTableInput>("describe_table", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput { .. }));
    }
}
