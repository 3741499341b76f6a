//! LSP (Language Server Protocol) client module.
//!
//! This module talks to the downstream language servers (gopls,
//! rust-analyzer, typescript-language-server, ...) on behalf of the pool.
//!
//! # Architecture
//!
//! The LSP module is organized into:
//! - `client`: The concrete stdio client for one server process
//! - `downstream`: The [`LanguageClient`] seam the pool drives, and the
//!   factory that creates clients
//! - `types`: Result normalization and conversion helpers
//!
//! Positions are 0-based LSP positions everywhere in this module.

pub mod client;
pub mod downstream;
pub mod types;

use crate::error::LspError;

/// Result type for LSP operations.
pub type LspResult<T> = std::result::Result<T, LspError>;

pub use client::{LspClient, LspClientBuilder};
pub use downstream::{ClientFactory, LanguageClient, ProcessClientFactory};
pub use types::{QueryResult, SymbolMatch, TokenSpan};
