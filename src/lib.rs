//! Polyglot Runes MCP Server
//!
//! An MCP (Model Context Protocol) server that bridges LLM applications with
//! a family of language servers, one per language in the workspace.
//!
//! # Overview
//!
//! This library provides:
//! - A pool of supervised language server connections, created lazily and
//!   restarted on transport faults
//! - A fan-out executor that runs one query over several languages and keeps
//!   per-language failures isolated
//! - A bridge facade with single-file and cross-language operations
//! - MCP tools on top of the facade, served over stdio
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     stdio      ┌─────────────────┐
//! │   LLM Client    │◄──────────────►│   MCP Server    │
//! │                 │    (MCP)       │ (polyglot-runes)│
//! └─────────────────┘                └────────┬────────┘
//!                                             │
//!                                      ┌──────▼──────┐
//!                                      │   Bridge    │
//!                                      └──────┬──────┘
//!                                             │ fan-out
//!                                      ┌──────▼──────┐
//!                                      │ Client Pool │
//!                                      └──┬───┬───┬──┘
//!                                JSON-RPC │   │   │
//!                                 gopls  rust-analyzer  ...
//! ```
//!
//! # Modules
//!
//! - [`error`] - Error types for the entire application
//! - [`config`] - JSON configuration
//! - [`language`] - Language ids and detection
//! - [`lsp`] - LSP client implementation
//! - [`pool`] - Connections, restart policy and the client pool
//! - [`fanout`] - Concurrent multi-language execution
//! - [`bridge`] - The facade used by the MCP layer
//! - [`mcp`] - MCP server implementation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use polyglot_runes::{bridge::Bridge, config::BridgeConfig, pool::ClientPool};
//!
//! let config = Arc::new(BridgeConfig::default());
//! let factory = Arc::new(ProcessClientFactory::new(root.clone(), init, request));
//! let pool = Arc::new(ClientPool::new(config.clone(), factory));
//! let detector = Arc::new(ConfigLanguageDetector::new(config.extension_map()));
//! let bridge = Bridge::new(pool, detector, root);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod fanout;
pub mod language;
pub mod lsp;
pub mod mcp;
pub mod pool;

pub use error::{BridgeError, BridgeResult, Error, Result};
