//! MCP server implementation for polyglot-runes.
//!
//! This module contains the `PolyglotRunes` struct that exposes the bridge
//! facade as MCP tools. Every tool call can be cancelled by the client's
//! `notifications/cancelled` or by server shutdown.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, ErrorCode, Implementation, ProtocolVersion, ServerCapabilities,
        ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::language::LanguageId;
use crate::lsp::types::document_path;

use super::format;
use super::tools::{
    CallHierarchyParams, CodeActionsParams, ConnectParams, DetectLanguagesParams, DocumentParams,
    FormatDocumentParams, ImplementationParams, InferLanguageParams, PositionParams, RangeParams,
    ReferencesParams, RenameParams, SemanticTokensParams, WorkspaceDiagnosticsParams,
    WorkspaceSymbolsParams,
};

/// Lines of source shown around each location.
const CONTEXT_LINES: usize = 2;

/// MCP server for multi-language code intelligence.
#[derive(Clone)]
pub struct PolyglotRunes {
    bridge: Arc<Bridge>,
    /// Cancelled on shutdown; tool calls run under child tokens.
    shutdown: CancellationToken,
    #[allow(dead_code)]
    tool_router: ToolRouter<PolyglotRunes>,
}

impl PolyglotRunes {
    /// Creates a server over `bridge`. Cancelling `shutdown` aborts every
    /// in-flight tool call.
    pub fn new(bridge: Arc<Bridge>, shutdown: CancellationToken) -> Self {
        Self {
            bridge,
            shutdown,
            tool_router: Self::tool_router(),
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Cancellation for one tool call, fired by the client cancelling
    /// `request` or by server shutdown.
    fn call_token(&self, request: &CancellationToken) -> CallToken {
        let token = request.child_token();
        let shutdown = self.shutdown.clone();
        let linked = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => linked.cancel(),
                () = linked.cancelled() => {}
            }
        });
        CallToken {
            _finished: token.clone().drop_guard(),
            token,
        }
    }
}

/// Cancellation token of an in-flight tool call. Dropping it releases the
/// shutdown watcher.
struct CallToken {
    token: CancellationToken,
    _finished: DropGuard,
}

impl CallToken {
    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Maps a bridge failure onto an MCP error for `tool`.
fn to_mcp_error(tool: &str, error: &BridgeError) -> McpError {
    let code = match error {
        BridgeError::InvalidParameters(_) | BridgeError::LanguageInferenceFailed(_) => {
            ErrorCode::INVALID_PARAMS
        }
        _ => ErrorCode::INTERNAL_ERROR,
    };
    warn!(tool, language = ?error.language(), error = %error, "tool call failed");
    McpError::new(code, format!("{tool} failed: {error}"), None)
}

fn parse_uri(uri: &str) -> Result<PathBuf, McpError> {
    document_path(uri).ok_or_else(|| {
        McpError::new(
            ErrorCode::INVALID_PARAMS,
            format!("invalid uri or path: '{uri}'"),
            None,
        )
    })
}

fn text(formatted: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(formatted)])
}

/// Tool implementations for `PolyglotRunes`.
#[tool_router]
impl PolyglotRunes {
    /// Get type information and documentation for a symbol.
    #[tool(
        description = "Get type signature and docs. Quick way to understand what something is without navigating away."
    )]
    pub async fn hover(
        &self,
        Parameters(params): Parameters<PositionParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let hover = self
            .bridge
            .hover(&path, params.position(), call.token())
            .await
            .map_err(|e| to_mcp_error("hover", &e))?;
        Ok(text(format::format_hover(&hover)))
    }

    /// Get signature help for the call at a position.
    #[tool(
        description = "Show the signature of the function being called at a position, with the active parameter."
    )]
    pub async fn signature_help(
        &self,
        Parameters(params): Parameters<PositionParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let help = self
            .bridge
            .signature_help(&path, params.position(), call.token())
            .await
            .map_err(|e| to_mcp_error("signature_help", &e))?;
        Ok(text(format::format_signature_help(&help)))
    }

    /// Jump to the definition of a symbol.
    #[tool(
        description = "Jump to where a symbol is defined. Essential for tracing imports and understanding implementations."
    )]
    pub async fn definition(
        &self,
        Parameters(params): Parameters<PositionParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let locations = self
            .bridge
            .definition(&path, params.position(), call.token())
            .await
            .map_err(|e| to_mcp_error("definition", &e))?;
        Ok(text(format::format_locations(&locations, CONTEXT_LINES)))
    }

    /// Jump to the type definition of a symbol.
    #[tool(
        description = "Jump to a symbol's type definition. Understand what type a variable or expression has."
    )]
    pub async fn type_definition(
        &self,
        Parameters(params): Parameters<PositionParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let locations = self
            .bridge
            .type_definition(&path, params.position(), call.token())
            .await
            .map_err(|e| to_mcp_error("type_definition", &e))?;
        Ok(text(format::format_locations(&locations, CONTEXT_LINES)))
    }

    /// Find all references to a symbol.
    #[tool(
        description = "Find all usages of a symbol. Reveals dependencies, call sites, and impact of changes."
    )]
    pub async fn references(
        &self,
        Parameters(params): Parameters<ReferencesParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.position.uri)?;
        let locations = self
            .bridge
            .references(
                &path,
                params.position.position(),
                params.include_declaration,
                call.token(),
            )
            .await
            .map_err(|e| to_mcp_error("references", &e))?;
        Ok(text(format::format_locations(&locations, CONTEXT_LINES)))
    }

    /// List all symbols defined in a file.
    #[tool(
        description = "List all symbols in a file. Get a structural overview: functions, types, constants, etc."
    )]
    pub async fn document_symbols(
        &self,
        Parameters(params): Parameters<DocumentParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let response = self
            .bridge
            .document_symbols(&path, call.token())
            .await
            .map_err(|e| to_mcp_error("document_symbols", &e))?;
        Ok(text(format::format_document_symbol_response(&response)))
    }

    /// Find implementations across every project language.
    #[tool(
        description = "Find interface/trait implementations across all languages in the project. Reports per-language errors alongside the results."
    )]
    pub async fn implementation(
        &self,
        Parameters(params): Parameters<ImplementationParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let position = &params.position;
        let path = parse_uri(&position.uri)?;
        let flat = self
            .bridge
            .implementation(&path, position.position(), params.mode, call.token())
            .await
            .map_err(|e| to_mcp_error("implementation", &e))?;
        Ok(text(format::format_implementations(
            &position.uri,
            position.line,
            position.character,
            &flat,
        )))
    }

    /// Search for symbols across every project language.
    #[tool(
        description = "Search symbols by name across the workspace in every project language. Find types, functions, or modules without knowing their location."
    )]
    pub async fn workspace_symbols(
        &self,
        Parameters(params): Parameters<WorkspaceSymbolsParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let flat = self
            .bridge
            .workspace_symbols(&params.query, params.mode, call.token())
            .await
            .map_err(|e| to_mcp_error("workspace_symbols", &e))?;
        Ok(text(format::format_symbol_matches(
            &params.query,
            &flat,
            params.max_results as usize,
        )))
    }

    /// Prepare the call hierarchy at a position and fetch callers and callees.
    #[tool(
        description = "Build the call graph around a function: callers (incoming), callees (outgoing) or both."
    )]
    pub async fn call_hierarchy(
        &self,
        Parameters(params): Parameters<CallHierarchyParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let position = &params.position;
        let path = parse_uri(&position.uri)?;
        let outcome = self
            .bridge
            .call_hierarchy(&path, position.position(), params.direction, call.token())
            .await
            .map_err(|e| to_mcp_error("call_hierarchy", &e))?;
        Ok(text(format::format_call_hierarchy(
            &position.uri,
            position.line,
            position.character,
            &outcome,
        )))
    }

    /// Rename a symbol, previewing or applying the edit.
    #[tool(
        description = "Rename a symbol across the workspace. Previews the edit unless apply is true."
    )]
    pub async fn rename(
        &self,
        Parameters(params): Parameters<RenameParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.position.uri)?;
        let outcome = self
            .bridge
            .rename(
                &path,
                params.position.position(),
                &params.new_name,
                params.apply,
                call.token(),
            )
            .await
            .map_err(|e| to_mcp_error("rename", &e))?;
        Ok(text(format::format_rename(&params.new_name, &outcome)))
    }

    /// Format a whole document.
    #[tool(
        description = "Format a document with its language server. Previews the edits unless apply is true."
    )]
    pub async fn format_document(
        &self,
        Parameters(params): Parameters<FormatDocumentParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let outcome = self
            .bridge
            .format_document(
                &path,
                params.tab_size,
                params.insert_spaces,
                params.apply,
                call.token(),
            )
            .await
            .map_err(|e| to_mcp_error("format_document", &e))?;
        Ok(text(format::format_formatting(&params.uri, &outcome)))
    }

    /// List quick fixes and refactorings for a range.
    #[tool(
        description = "List quick fixes and refactorings available at a position or range."
    )]
    pub async fn code_actions(
        &self,
        Parameters(params): Parameters<CodeActionsParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.position.uri)?;
        let actions = self
            .bridge
            .code_actions(&path, params.range(), call.token())
            .await
            .map_err(|e| to_mcp_error("code_actions", &e))?;
        Ok(text(format::format_code_actions(&actions)))
    }

    /// Classify the tokens in a range.
    #[tool(
        description = "Classify identifiers in a range by semantic token type (function, parameter, variable, ...)."
    )]
    pub async fn semantic_tokens(
        &self,
        Parameters(params): Parameters<SemanticTokensParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.range.uri)?;
        let tokens = self
            .bridge
            .semantic_tokens(&path, params.range.range(), &params.token_types, call.token())
            .await
            .map_err(|e| to_mcp_error("semantic_tokens", &e))?;
        let content = tokio::fs::read_to_string(self.bridge.resolve(&path)).await.ok();
        Ok(text(format::format_semantic_tokens(&tokens, content.as_deref())))
    }

    /// Report diagnostics for a file.
    #[tool(description = "Report errors and warnings the language server found in a file.")]
    pub async fn document_diagnostics(
        &self,
        Parameters(params): Parameters<DocumentParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let diagnostics = self
            .bridge
            .diagnostics(&path, call.token())
            .await
            .map_err(|e| to_mcp_error("document_diagnostics", &e))?;
        Ok(text(format::format_diagnostics(&params.uri, &diagnostics)))
    }

    /// Report diagnostics across every project language.
    #[tool(
        description = "Report errors and warnings across the whole workspace in every project language, summarized by severity and language."
    )]
    pub async fn workspace_diagnostics(
        &self,
        Parameters(params): Parameters<WorkspaceDiagnosticsParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let flat = self
            .bridge
            .workspace_diagnostics(params.mode, call.token())
            .await
            .map_err(|e| to_mcp_error("workspace_diagnostics", &e))?;
        Ok(text(format::format_workspace_diagnostics(&flat)))
    }

    /// Hover, completion, signature help, diagnostics and code actions at once.
    #[tool(
        description = "Analyze a position in one call: hover, completions, signature help, diagnostics and code actions."
    )]
    pub async fn analyze_code(
        &self,
        Parameters(params): Parameters<PositionParams>,
        request: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let call = self.call_token(&request);
        let path = parse_uri(&params.uri)?;
        let analysis = self
            .bridge
            .analyze_code(&path, params.position(), call.token())
            .await
            .map_err(|e| to_mcp_error("analyze_code", &e))?;
        Ok(text(format::format_analysis(&analysis)))
    }

    /// Read the text of a range.
    #[tool(description = "Return the exact text of a file range (0-based lines and characters).")]
    pub async fn get_range_content(
        &self,
        Parameters(params): Parameters<RangeParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = parse_uri(&params.uri)?;
        let content = self
            .bridge
            .range_content(&path, params.range())
            .await
            .map_err(|e| to_mcp_error("get_range_content", &e))?;
        Ok(text(content))
    }

    /// Infer the language of a file.
    #[tool(description = "Infer the language of a file from its extension.")]
    pub async fn infer_language(
        &self,
        Parameters(params): Parameters<InferLanguageParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = parse_uri(&params.file_path)?;
        let language = self
            .bridge
            .infer_language(&self.bridge.resolve(&path))
            .map_err(|e| to_mcp_error("infer_language", &e))?;
        Ok(text(format!("Language: {language}")))
    }

    /// Detect the languages used in the workspace.
    #[tool(
        description = "Detect the languages used in the workspace, primary first. Use mode 'primary' for just the main one."
    )]
    pub async fn detect_project_languages(
        &self,
        Parameters(params): Parameters<DetectLanguagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let languages = self
            .bridge
            .detect_project_languages(params.mode)
            .await
            .map_err(|e| to_mcp_error("detect_project_languages", &e))?;

        let mut formatted = String::new();
        let _ = writeln!(
            formatted,
            "Project languages in {}:",
            self.bridge.workspace_root().display()
        );
        for (idx, language) in languages.iter().enumerate() {
            let role = if idx == 0 { "primary" } else { "secondary" };
            let _ = writeln!(formatted, "{}. {language} ({role})", idx + 1);
        }
        Ok(text(formatted))
    }

    /// Start a language server ahead of use.
    #[tool(description = "Start the language server for a language ahead of the first request.")]
    pub async fn lsp_connect(
        &self,
        Parameters(params): Parameters<ConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        let language = LanguageId::new(&params.language);
        if language.as_str().is_empty() {
            return Err(McpError::new(
                ErrorCode::INVALID_PARAMS,
                "language is empty",
                None,
            ));
        }
        let snapshot = self
            .bridge
            .connect(&language)
            .await
            .map_err(|e| to_mcp_error("lsp_connect", &e))?;
        Ok(text(format!(
            "Connected to {} language server ({}), state: {}",
            snapshot.language, snapshot.command, snapshot.state
        )))
    }

    /// Stop every language server.
    #[tool(description = "Shut down every language server. Later requests start fresh servers.")]
    pub async fn lsp_disconnect(&self) -> Result<CallToolResult, McpError> {
        let count = self.bridge.pool().snapshots().len();
        self.bridge.disconnect_all().await;
        Ok(text(format!("Disconnected {count} language server(s).")))
    }

    /// Report configuration and connection health.
    #[tool(description = "Show configured and detected languages and the health of every connection.")]
    pub async fn bridge_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.bridge.status().await;
        let list = |languages: &[LanguageId]| {
            languages
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut formatted = String::new();
        let _ = writeln!(formatted, "Workspace: {}", status.workspace_root.display());
        let _ = writeln!(
            formatted,
            "Configured languages: [{}]",
            list(&status.configured_languages)
        );
        let _ = writeln!(
            formatted,
            "Detected languages: [{}]",
            list(&status.detected_languages)
        );
        let _ = writeln!(
            formatted,
            "Restart policy: {} attempts, {}ms delay",
            status.max_restart_attempts, status.restart_delay_ms
        );
        let _ = writeln!(formatted, "Connections: {}", status.connections.len());
        for snapshot in &status.connections {
            format::format_snapshot(&mut formatted, snapshot);
        }
        Ok(text(formatted))
    }
}

#[tool_handler]
impl ServerHandler for PolyglotRunes {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "polyglot-runes".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Semantic code intelligence across every language in the workspace via LSP. \
                 Positions are 0-based. Cross-language tools (implementation, workspace_symbols, \
                 workspace_diagnostics) search all detected project languages and report \
                 per-language errors. \
                 rename and format_document only preview unless apply is true."
                    .into(),
            ),
        }
    }
}
