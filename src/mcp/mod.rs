//! MCP server integration module.
//!
//! Bridges the MCP protocol to the gateway tools through the rmcp framework.

pub mod service;

pub use service::GatewayService;
