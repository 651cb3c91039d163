//! instagram-mcp: MCP server for the Instagram Graph API
//!
//! This library exposes an Instagram business account to AI assistants over
//! the Model Context Protocol.
//!
//! # Architecture
//!
//! - **Graph client**: typed operations over the Graph API with a TTL
//!   response cache and rolling-window rate limits
//! - **MCP server**: tools, resources and prompts served over stdio
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Configuration error types
//! - [`graph`]: Graph API client
//! - [`mcp`]: MCP protocol implementation

pub mod config;
pub mod error;
pub mod graph;
pub mod mcp;
