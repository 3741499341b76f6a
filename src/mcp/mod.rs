//! MCP (Model Context Protocol) server module.
//!
//! This module exposes the bridge facade as MCP tools. The server uses stdio
//! transport to communicate with clients.
//!
//! # Architecture
//!
//! The MCP module is organized into:
//! - `server`: the tool router and `ServerHandler`
//! - `tools`: tool parameter schemas
//! - `format`: plain-text rendering of results
//!
//! # Usage
//!
//! ```ignore
//! use polyglot_runes::mcp::PolyglotRunes;
//!
//! let server = PolyglotRunes::new(bridge, shutdown.clone());
//! server.serve(stdio()).await?.waiting().await?;
//! ```

mod format;
pub mod server;
pub mod tools;

pub use server::PolyglotRunes;
