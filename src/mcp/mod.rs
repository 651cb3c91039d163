//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes an Instagram business account to AI assistants as MCP
//! tools, resources and prompts. The server communicates over stdio transport
//! using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MCP Server                           │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌────────────────┐   │
//! │   │  Transport  │───▶│   Server    │───▶│ Tools          │   │
//! │   │   (stdio)   │    │ (lifecycle) │    │ Resources      │   │
//! │   └─────────────┘    └─────────────┘    │ Prompts        │   │
//! │                                         └───────┬────────┘   │
//! │                                                 ▼            │
//! │                                   ┌──────────────────────┐   │
//! │                                   │ GraphClient          │   │
//! │                                   │ (cache, rate limits) │   │
//! │                                   └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineTransport, StdioTransport};
