//! LSP client implementation.
//!
//! This module provides the core LSP client that spawns and communicates
//! with one language server using the Language Server Protocol. The pool
//! drives it through the [`LanguageClient`](super::downstream::LanguageClient)
//! trait.
//!
//! # Example
//!
//! ```ignore
//! use polyglot_runes::lsp::client::LspClient;
//!
//! let client = LspClient::builder()
//!     .server_command("gopls")
//!     .workspace_root("/path/to/project")
//!     .build()
//!     .await?;
//!
//! client.did_open(Path::new("main.go"), "go").await?;
//! let hover = client.hover(&uri, Position::new(10, 4)).await?;
//! client.shutdown().await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams, CallHierarchyItem,
    CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
    ClientCapabilities, ClientInfo, CodeActionClientCapabilities, CodeActionContext,
    CodeActionOrCommand, CodeActionParams, CompletionClientCapabilities, CompletionItem,
    CompletionItemCapability, CompletionParams, CompletionResponse, Diagnostic,
    DiagnosticClientCapabilities, DiagnosticServerCapabilities, DidChangeTextDocumentParams,
    DidChangeWatchedFilesClientCapabilities, DidOpenTextDocumentParams,
    DocumentDiagnosticParams, DocumentDiagnosticReport, DocumentDiagnosticReportResult,
    DocumentFormattingParams, DocumentSymbolClientCapabilities, DocumentSymbolParams,
    DocumentSymbolResponse, DynamicRegistrationClientCapabilities, FormattingOptions,
    GotoCapability, GotoDefinitionParams, Hover, HoverClientCapabilities, HoverParams,
    InitializeParams, InitializedParams, Location, MarkupKind, PartialResultParams, Position,
    PublishDiagnosticsClientCapabilities, PublishDiagnosticsParams, Range, ReferenceContext,
    ReferenceParams, RenameClientCapabilities, RenameParams, SemanticTokens,
    SemanticTokensClientCapabilities, SemanticTokensClientCapabilitiesRequests,
    SemanticTokensFullOptions, SemanticTokensLegend, SemanticTokensRangeParams,
    SemanticTokensRangeResult, SemanticTokensServerCapabilities, ServerCapabilities,
    SignatureHelp, SignatureHelpClientCapabilities, SignatureHelpParams,
    TextDocumentClientCapabilities, TextDocumentContentChangeEvent, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, TextDocumentSyncClientCapabilities, TextEdit,
    TokenFormat, TraceValue, Url, VersionedTextDocumentIdentifier, WindowClientCapabilities,
    WorkDoneProgressParams, WorkspaceClientCapabilities, WorkspaceDiagnosticParams, WorkspaceEdit,
    WorkspaceEditClientCapabilities, WorkspaceFolder, WorkspaceSymbolClientCapabilities,
    WorkspaceSymbolParams, notification, request,
};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tracing::{debug, warn};

use crate::error::LspError;

use super::LspResult;
use super::types::{
    FileDiagnostics, QueryResult, SymbolMatch, default_semantic_legend,
    diagnostics_from_workspace, locations_from_goto, path_to_url, symbols_from_workspace,
};

type DiagnosticStore = Arc<std::sync::Mutex<HashMap<Url, Vec<Diagnostic>>>>;

/// State for handling LSP client notifications.
///
/// Published diagnostics are kept per document so servers without pull
/// diagnostics can still answer `diagnostics`.
#[derive(Debug, Clone)]
struct ClientState {
    diagnostics: DiagnosticStore,
}

impl ClientState {
    fn record_diagnostics(&self, params: PublishDiagnosticsParams) {
        debug!(uri = %params.uri, count = params.diagnostics.len(), "published diagnostics");
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(params.uri, params.diagnostics);
    }
}

/// Configuration for building an LSP client.
#[derive(Debug, Clone)]
pub struct LspClientConfig {
    /// Command to start the language server.
    pub server_command: String,
    /// Arguments to pass to the language server.
    pub server_args: Vec<String>,
    /// Root directory of the workspace.
    pub workspace_root: PathBuf,
    /// Server specific `initializationOptions`.
    pub initialization_options: Option<serde_json::Value>,
    /// Timeout for initialization.
    pub init_timeout: Duration,
    /// Timeout for requests.
    pub request_timeout: Duration,
}

impl Default for LspClientConfig {
    fn default() -> Self {
        Self {
            server_command: "rust-analyzer".to_string(),
            server_args: Vec::new(),
            workspace_root: PathBuf::from("."),
            initialization_options: None,
            init_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Builder for constructing an LSP client.
#[derive(Debug, Default)]
pub struct LspClientBuilder {
    config: LspClientConfig,
}

impl LspClientBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server command.
    #[must_use]
    pub fn server_command(mut self, command: impl Into<String>) -> Self {
        self.config.server_command = command.into();
        self
    }

    /// Sets the server arguments.
    #[must_use]
    pub fn server_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = path.into();
        self
    }

    /// Sets the `initializationOptions` sent with `initialize`.
    #[must_use]
    pub fn initialization_options(mut self, options: Option<serde_json::Value>) -> Self {
        self.config.initialization_options = options;
        self
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Builds the LSP client.
    ///
    /// This will spawn the language server process and perform initialization.
    /// ## Errors
    /// Fails when the process cannot be spawned or `initialize` fails or times out.
    pub async fn build(self) -> LspResult<LspClient> {
        let workspace_root = self.config.workspace_root.canonicalize().map_err(|e| {
            LspError::InitializationFailed(format!("failed to canonicalize workspace root: {e}"))
        })?;

        let mut cmd = async_process::Command::new(&self.config.server_command);
        cmd.args(&self.config.server_args)
            .current_dir(&workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            LspError::ServerStartFailed(format!(
                "failed to spawn '{}': {}",
                self.config.server_command, e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdout".to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdin".to_string()))?;

        let diagnostics: DiagnosticStore = Arc::default();
        let state = ClientState {
            diagnostics: Arc::clone(&diagnostics),
        };

        let (mainloop, server) = async_lsp::MainLoop::new_client(|_client| {
            let mut router = Router::new(state);

            router
                .notification::<notification::Progress>(|_this, _prog| ControlFlow::Continue(()))
                .notification::<notification::PublishDiagnostics>(|this, params| {
                    this.record_diagnostics(params);
                    ControlFlow::Continue(())
                })
                .notification::<notification::LogMessage>(|_this, params| {
                    debug!(message = %params.message, "server log message");
                    ControlFlow::Continue(())
                })
                .notification::<notification::ShowMessage>(|_this, params| {
                    debug!(message = %params.message, "server show message");
                    ControlFlow::Continue(())
                })
                .request::<request::WorkDoneProgressCreate, _>(|_this, _params| {
                    std::future::ready(Ok(()))
                })
                .request::<request::RegisterCapability, _>(|_this, _params| {
                    std::future::ready(Ok(()))
                })
                .request::<request::WorkspaceConfiguration, _>(|_this, params| {
                    std::future::ready(Ok(vec![serde_json::Value::Null; params.items.len()]))
                });

            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        let command = self.config.server_command.clone();
        let mainloop_handle = tokio::spawn(async move {
            if let Err(e) = mainloop.run_buffered(stdout, stdin).await {
                warn!(server = %command, error = %e, "language server main loop ended");
            }
        });

        let workspace_uri = Url::from_file_path(&workspace_root).map_err(|()| {
            LspError::InitializationFailed(format!(
                "invalid workspace root path: {}",
                workspace_root.display()
            ))
        })?;

        #[allow(deprecated)]
        let init_params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(workspace_uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: workspace_uri,
                name: workspace_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(".runes")
                    .to_string(),
            }]),
            initialization_options: self.config.initialization_options.clone(),
            capabilities: client_capabilities(),
            trace: Some(TraceValue::Off),
            client_info: Some(ClientInfo {
                name: "polyglot-runes".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            locale: None,
            work_done_progress_params: WorkDoneProgressParams::default(),
            ..Default::default()
        };

        let server = Arc::new(Mutex::new(server));

        let init_result = tokio::time::timeout(
            self.config.init_timeout,
            server.lock().await.initialize(init_params),
        )
        .await
        .map_err(|_| {
            LspError::InitializationFailed(format!(
                "initialize timed out after {:?}",
                self.config.init_timeout
            ))
        })?
        .map_err(|e| LspError::InitializationFailed(format!("initialize request failed: {e:?}")))?;

        let capabilities = Arc::new(init_result.capabilities);

        server
            .lock()
            .await
            .initialized(InitializedParams {})
            .map_err(|e| {
                LspError::InitializationFailed(format!("initialized notification failed: {e:?}"))
            })?;

        Ok(LspClient {
            config: self.config,
            server,
            mainloop_handle,
            capabilities,
            open_documents: Mutex::new(HashMap::new()),
            diagnostics,
            child: Mutex::new(child),
        })
    }
}

fn client_capabilities() -> ClientCapabilities {
    let legend = default_semantic_legend();
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                ..Default::default()
            }),
            did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                dynamic_registration: Some(false),
                relative_pattern_support: None,
            }),
            symbol: Some(WorkspaceSymbolClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            }),
            execute_command: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            configuration: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                will_save: Some(false),
                will_save_wait_until: Some(false),
                did_save: Some(false),
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(false),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            signature_help: Some(SignatureHelpClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            type_definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            implementation: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            call_hierarchy: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            code_action: Some(CodeActionClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            }),
            formatting: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities::default()),
            diagnostic: Some(DiagnosticClientCapabilities {
                dynamic_registration: Some(false),
                related_document_support: Some(false),
            }),
            semantic_tokens: Some(SemanticTokensClientCapabilities {
                dynamic_registration: Some(false),
                requests: SemanticTokensClientCapabilitiesRequests {
                    range: Some(true),
                    full: Some(SemanticTokensFullOptions::Bool(true)),
                },
                token_types: legend.token_types,
                token_modifiers: legend.token_modifiers,
                formats: vec![TokenFormat::RELATIVE],
                ..Default::default()
            }),
            ..Default::default()
        }),
        window: Some(WindowClientCapabilities {
            work_done_progress: Some(true),
            ..Default::default()
        }),
        experimental: Some(true.into()),
        ..Default::default()
    }
}

fn text_position(uri: &Url, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position,
    }
}

/// LSP client for communicating with one language server.
///
/// Requests hold the socket lock for the whole round trip, so requests on one
/// client never interleave.
#[derive(Debug)]
pub struct LspClient {
    /// Configuration used to create this client.
    config: LspClientConfig,
    /// The language server handle for making requests.
    server: Arc<Mutex<ServerSocket>>,
    /// Handle to the mainloop task.
    mainloop_handle: tokio::task::JoinHandle<()>,
    /// Server capabilities from initialization.
    capabilities: Arc<ServerCapabilities>,
    /// Open documents and their current version.
    open_documents: Mutex<HashMap<Url, i32>>,
    /// Last published diagnostics per document.
    diagnostics: DiagnosticStore,
    /// The language server process (killed on drop).
    child: Mutex<async_process::Child>,
}

impl LspClient {
    /// Creates a new builder for constructing an LSP client.
    pub fn builder() -> LspClientBuilder {
        LspClientBuilder::new()
    }

    /// Server capabilities reported by `initialize`.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    async fn send<T>(
        &self,
        method: &str,
        request: impl Future<Output = Result<T, async_lsp::Error>>,
    ) -> LspResult<T> {
        tokio::time::timeout(self.config.request_timeout, request)
            .await
            .map_err(|_| LspError::Timeout(self.config.request_timeout))?
            .map_err(|e| LspError::from_transport(method, e))
    }

    /// Shuts down the language server and terminates its process.
    /// ## Errors
    /// Returns the first protocol failure; the process is killed regardless.
    pub async fn shutdown(&self) -> LspResult<()> {
        let result = async {
            let mut server = self.server.lock().await;
            self.send("shutdown", server.shutdown(())).await?;
            server
                .exit(())
                .map_err(|e| LspError::from_transport("exit", e))
        }
        .await;

        if let Err(e) = self.child.lock().await.kill() {
            debug!(error = %e, "language server process already gone");
        }
        self.mainloop_handle.abort();
        result
    }

    /// Opens a document, or re-syncs its full text when it is already open.
    /// ## Errors
    /// Fails when the file cannot be read or the notification cannot be sent.
    pub async fn did_open(&self, path: &Path, language_id: &str) -> LspResult<()> {
        let uri = path_to_url(path)?;
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            LspError::DocumentNotFound(format!("failed to read '{}': {}", path.display(), e))
        })?;

        let mut open_documents = self.open_documents.lock().await;
        let mut server = self.server.lock().await;

        if let Some(version) = open_documents.get_mut(&uri) {
            *version += 1;
            let params = DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri,
                    version: *version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text,
                }],
            };
            return server
                .did_change(params)
                .map_err(|e| LspError::from_transport("didChange", e));
        }

        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version: 0,
                text,
            },
        };
        server
            .did_open(params)
            .map_err(|e| LspError::from_transport("didOpen", e))?;
        open_documents.insert(uri, 0);
        Ok(())
    }

    /// Gets hover information at a position.
    /// ## Errors
    pub async fn hover(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Hover>> {
        let params = HoverParams {
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self.send("hover", server.hover(params)).await?;
        Ok(QueryResult::from_option(result))
    }

    /// Gets the definition location(s) of the symbol at a position.
    /// ## Errors
    pub async fn definition(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Location>> {
        let params = GotoDefinitionParams {
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self.send("definition", server.definition(params)).await?;
        Ok(locations_from_goto(result))
    }

    /// Gets the type definition of the symbol at a position.
    /// ## Errors
    pub async fn type_definition(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>> {
        let params = request::GotoTypeDefinitionParams {
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("typeDefinition", server.type_definition(params))
            .await?;
        Ok(locations_from_goto(result))
    }

    /// Gets implementations of the trait/interface at a position.
    /// ## Errors
    pub async fn implementation(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>> {
        let params = request::GotoImplementationParams {
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("implementation", server.implementation(params))
            .await?;
        Ok(locations_from_goto(result))
    }

    /// Finds all references to the symbol at a position.
    /// ## Errors
    pub async fn references(
        &self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<QueryResult<Location>> {
        let params = ReferenceParams {
            text_document_position: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        let mut server = self.server.lock().await;
        let result = self.send("references", server.references(params)).await?;
        Ok(QueryResult::from_vec(result.unwrap_or_default()))
    }

    /// Gets all symbols in a document.
    /// ## Errors
    pub async fn document_symbols(&self, uri: &Url) -> LspResult<DocumentSymbolResponse> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("documentSymbol", server.document_symbol(params))
            .await?;
        Ok(result.unwrap_or(DocumentSymbolResponse::Nested(vec![])))
    }

    /// Searches for symbols across the workspace.
    /// ## Errors
    pub async fn workspace_symbols(&self, query: &str) -> LspResult<QueryResult<SymbolMatch>> {
        let params = WorkspaceSymbolParams {
            query: query.to_string(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self.send("workspace/symbol", server.symbol(params)).await?;
        Ok(symbols_from_workspace(result))
    }

    /// Computes the edits renaming the symbol at a position.
    /// ## Errors
    pub async fn rename(
        &self,
        uri: &Url,
        position: Position,
        new_name: &str,
    ) -> LspResult<Option<WorkspaceEdit>> {
        let params = RenameParams {
            text_document_position: text_position(uri, position),
            new_name: new_name.to_string(),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let mut server = self.server.lock().await;
        self.send("rename", server.rename(params)).await
    }

    /// Resolves call hierarchy items at a position.
    /// ## Errors
    pub async fn prepare_call_hierarchy(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<Vec<CallHierarchyItem>> {
        let params = CallHierarchyPrepareParams {
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("prepareCallHierarchy", server.prepare_call_hierarchy(params))
            .await?;
        Ok(result.unwrap_or_default())
    }

    /// Gets the callers of a call hierarchy item.
    /// ## Errors
    pub async fn incoming_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyIncomingCall>> {
        let params = CallHierarchyIncomingCallsParams {
            item: item.clone(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("callHierarchy/incomingCalls", server.incoming_calls(params))
            .await?;
        Ok(result.unwrap_or_default())
    }

    /// Gets the callees of a call hierarchy item.
    /// ## Errors
    pub async fn outgoing_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyOutgoingCall>> {
        let params = CallHierarchyOutgoingCallsParams {
            item: item.clone(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("callHierarchy/outgoingCalls", server.outgoing_calls(params))
            .await?;
        Ok(result.unwrap_or_default())
    }

    /// Gets semantic tokens for a range.
    /// ## Errors
    pub async fn semantic_tokens(&self, uri: &Url, range: Range) -> LspResult<Option<SemanticTokens>> {
        let params = SemanticTokensRangeParams {
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            range,
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("semanticTokens/range", server.semantic_tokens_range(params))
            .await?;
        Ok(result.map(|tokens| match tokens {
            SemanticTokensRangeResult::Tokens(tokens) => tokens,
            SemanticTokensRangeResult::Partial(partial) => SemanticTokens {
                result_id: None,
                data: partial.data,
            },
        }))
    }

    /// Legend needed to decode semantic tokens, if the server advertised one.
    pub fn semantic_tokens_legend(&self) -> Option<SemanticTokensLegend> {
        match self.capabilities.semantic_tokens_provider.as_ref()? {
            SemanticTokensServerCapabilities::SemanticTokensOptions(options) => {
                Some(options.legend.clone())
            }
            SemanticTokensServerCapabilities::SemanticTokensRegistrationOptions(options) => {
                Some(options.semantic_tokens_options.legend.clone())
            }
        }
    }

    /// Gets code actions for a range.
    /// ## Errors
    pub async fn code_actions(
        &self,
        uri: &Url,
        range: Range,
        diagnostics: Vec<Diagnostic>,
    ) -> LspResult<QueryResult<CodeActionOrCommand>> {
        let params = CodeActionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            range,
            context: CodeActionContext {
                diagnostics,
                only: None,
                trigger_kind: None,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self.send("codeAction", server.code_action(params)).await?;
        Ok(QueryResult::from_vec(result.unwrap_or_default()))
    }

    /// Computes formatting edits for a whole document.
    /// ## Errors
    pub async fn format(&self, uri: &Url, options: FormattingOptions) -> LspResult<Vec<TextEdit>> {
        let params = DocumentFormattingParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            options,
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self.send("formatting", server.formatting(params)).await?;
        Ok(result.unwrap_or_default())
    }

    /// Gets completion items at a position.
    /// ## Errors
    pub async fn completion(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<CompletionItem>> {
        let params = CompletionParams {
            text_document_position: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: None,
        };
        let mut server = self.server.lock().await;
        let result = self.send("completion", server.completion(params)).await?;
        let items = match result {
            None => Vec::new(),
            Some(CompletionResponse::Array(items)) => items,
            Some(CompletionResponse::List(list)) => list.items,
        };
        Ok(QueryResult::from_vec(items))
    }

    /// Gets signature help at a position.
    /// ## Errors
    pub async fn signature_help(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<SignatureHelp>> {
        let params = SignatureHelpParams {
            context: None,
            text_document_position_params: text_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let mut server = self.server.lock().await;
        let result = self
            .send("signatureHelp", server.signature_help(params))
            .await?;
        Ok(QueryResult::from_option(result))
    }

    /// Gets diagnostics for a document.
    ///
    /// Uses pull diagnostics when the server supports them, otherwise the
    /// last published set.
    /// ## Errors
    pub async fn diagnostics(&self, uri: &Url) -> LspResult<Vec<Diagnostic>> {
        if self.capabilities.diagnostic_provider.is_some() {
            let params = DocumentDiagnosticParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                identifier: None,
                previous_result_id: None,
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            let mut server = self.server.lock().await;
            let report = self
                .send("textDocument/diagnostic", server.document_diagnostic(params))
                .await?;
            if let DocumentDiagnosticReportResult::Report(DocumentDiagnosticReport::Full(full)) =
                report
            {
                return Ok(full.full_document_diagnostic_report.items);
            }
        }

        Ok(self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .unwrap_or_default())
    }

    /// Gets diagnostics for every document the server knows about.
    ///
    /// Uses `workspace/diagnostic` when the server advertises it, otherwise
    /// every non-empty published set.
    /// ## Errors
    pub async fn workspace_diagnostics(&self) -> LspResult<Vec<FileDiagnostics>> {
        if supports_workspace_diagnostics(&self.capabilities) {
            let params = WorkspaceDiagnosticParams {
                identifier: None,
                previous_result_ids: Vec::new(),
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            let mut server = self.server.lock().await;
            let report = self
                .send("workspace/diagnostic", server.workspace_diagnostic(params))
                .await?;
            return Ok(diagnostics_from_workspace(report));
        }

        let store = self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut files: Vec<FileDiagnostics> = store
            .iter()
            .filter(|(_, diagnostics)| !diagnostics.is_empty())
            .map(|(uri, diagnostics)| FileDiagnostics {
                uri: uri.clone(),
                diagnostics: diagnostics.clone(),
            })
            .collect();
        files.sort_by(|a, b| a.uri.as_str().cmp(b.uri.as_str()));
        Ok(files)
    }
}

fn supports_workspace_diagnostics(capabilities: &ServerCapabilities) -> bool {
    match &capabilities.diagnostic_provider {
        Some(DiagnosticServerCapabilities::Options(options)) => options.workspace_diagnostics,
        Some(DiagnosticServerCapabilities::RegistrationOptions(options)) => {
            options.diagnostic_options.workspace_diagnostics
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_workspace_diagnostics() {
        use lsp_types::DiagnosticOptions;

        let mut capabilities = ServerCapabilities::default();
        assert!(!supports_workspace_diagnostics(&capabilities));

        capabilities.diagnostic_provider =
            Some(DiagnosticServerCapabilities::Options(DiagnosticOptions::default()));
        assert!(!supports_workspace_diagnostics(&capabilities));

        capabilities.diagnostic_provider = Some(DiagnosticServerCapabilities::Options(
            DiagnosticOptions {
                workspace_diagnostics: true,
                ..Default::default()
            },
        ));
        assert!(supports_workspace_diagnostics(&capabilities));
    }

    #[test]
    fn test_builder_default() {
        let builder = LspClientBuilder::new();
        assert_eq!(builder.config.server_command, "rust-analyzer");
        assert!(builder.config.initialization_options.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = LspClientBuilder::new()
            .server_command("gopls")
            .server_args(["serve", "-rpc.trace"])
            .workspace_root("/home/user/project")
            .initialization_options(Some(serde_json::json!({ "staticcheck": true })))
            .init_timeout(Duration::from_secs(60))
            .request_timeout(Duration::from_secs(5));

        assert_eq!(builder.config.server_command, "gopls");
        assert_eq!(builder.config.server_args, vec!["serve", "-rpc.trace"]);
        assert_eq!(
            builder.config.workspace_root,
            PathBuf::from("/home/user/project")
        );
        assert_eq!(builder.config.init_timeout, Duration::from_secs(60));
        assert_eq!(builder.config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            builder.config.initialization_options,
            Some(serde_json::json!({ "staticcheck": true }))
        );
    }

    #[test]
    fn test_client_capabilities_advertise_bridge_features() {
        let caps = client_capabilities();
        let text = caps.text_document.unwrap();
        assert!(text.rename.is_some());
        assert!(text.formatting.is_some());
        assert!(text.call_hierarchy.is_some());
        assert_eq!(
            text.semantic_tokens.unwrap().requests.range,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_build_fails_for_missing_server() {
        let dir = tempfile::tempdir().unwrap();
        let err = LspClient::builder()
            .server_command("polyglot-runes-no-such-server")
            .workspace_root(dir.path())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, LspError::ServerStartFailed(_)));
        assert!(err.is_connection_fault());
    }
}
