//! SQL Gateway MCP Server Library
//!
//! A safety-gated gateway between an automated caller (typically an LLM
//! agent speaking MCP) and one relational database (PostgreSQL or SQLite).
//! Free-text SQL is classified, screened against a keyword blocklist and a
//! per-caller rate limit, and mutating statements need a second, confirmed
//! call before they run.

pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use mcp::GatewayService;
pub use tools::GatewayTools;
