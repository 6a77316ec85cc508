// src/lib.rs
// Sentinel - MCP tool server for HTTP-based security research: request
// tooling through a proxy, a Target/Mission/Action/Context data model,
// cookie session resources, and technique-library vector search.

pub mod config;
pub mod context_versioning;
pub mod cookies;
pub mod db;
pub mod error;
pub mod http_tool;
pub mod mcp;
pub mod missions;
pub mod models;
pub mod repositories;
pub mod validation;
pub mod vector;

pub use error::ServerError;
