//! The seam between the pool and a downstream language server.
//!
//! The pool only ever sees `Arc<dyn LanguageClient>`; [`ClientFactory`]
//! creates them. [`ProcessClientFactory`] spawns real servers through
//! [`LspClient`], tests plug in their own factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, CodeActionOrCommand,
    CompletionItem, Diagnostic, DocumentSymbolResponse, FormattingOptions, Hover, Location,
    Position, Range, SemanticTokens, SemanticTokensLegend, SignatureHelp, TextEdit, Url,
    WorkspaceEdit,
};
use tracing::info;

use crate::config::ServerConfig;
use crate::language::LanguageId;

use super::LspResult;
use super::client::LspClient;
use super::types::{FileDiagnostics, QueryResult, SymbolMatch};

/// Operations the bridge issues against one initialized language server.
///
/// Implementations must be safe to call concurrently; ordering of requests on
/// one client is the implementation's concern.
#[async_trait]
pub trait LanguageClient: Send + Sync {
    /// Opens (or re-syncs) a document before a file-scoped request.
    async fn did_open(&self, path: &Path, language: &LanguageId) -> LspResult<()>;

    async fn hover(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Hover>>;

    async fn definition(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Location>>;

    async fn type_definition(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>>;

    async fn implementation(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>>;

    async fn references(
        &self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<QueryResult<Location>>;

    async fn document_symbols(&self, uri: &Url) -> LspResult<DocumentSymbolResponse>;

    async fn workspace_symbols(&self, query: &str) -> LspResult<QueryResult<SymbolMatch>>;

    async fn rename(
        &self,
        uri: &Url,
        position: Position,
        new_name: &str,
    ) -> LspResult<Option<WorkspaceEdit>>;

    async fn prepare_call_hierarchy(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<Vec<CallHierarchyItem>>;

    async fn incoming_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyIncomingCall>>;

    async fn outgoing_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyOutgoingCall>>;

    async fn semantic_tokens(&self, uri: &Url, range: Range) -> LspResult<Option<SemanticTokens>>;

    /// Legend advertised by the server, `None` when it has no semantic tokens.
    fn semantic_tokens_legend(&self) -> Option<SemanticTokensLegend>;

    async fn code_actions(
        &self,
        uri: &Url,
        range: Range,
        diagnostics: Vec<Diagnostic>,
    ) -> LspResult<QueryResult<CodeActionOrCommand>>;

    async fn format(&self, uri: &Url, options: FormattingOptions) -> LspResult<Vec<TextEdit>>;

    async fn completion(&self, uri: &Url, position: Position)
    -> LspResult<QueryResult<CompletionItem>>;

    async fn signature_help(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<SignatureHelp>>;

    async fn diagnostics(&self, uri: &Url) -> LspResult<Vec<Diagnostic>>;

    /// Diagnostics for every document with any, ordered by URI.
    async fn workspace_diagnostics(&self) -> LspResult<Vec<FileDiagnostics>>;

    /// Shuts the server down. Errors are informational; the client is unusable afterwards.
    async fn shutdown(&self) -> LspResult<()>;
}

/// Creates initialized clients for the pool.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Spawns and initializes a server for `language`.
    /// ## Errors
    /// Any [`LspError`](crate::error::LspError) from spawning or initialization.
    async fn connect(
        &self,
        language: &LanguageId,
        server: &ServerConfig,
    ) -> LspResult<Arc<dyn LanguageClient>>;
}

/// Factory spawning language server processes over stdio.
#[derive(Debug, Clone)]
pub struct ProcessClientFactory {
    workspace_root: PathBuf,
    init_timeout: Duration,
    request_timeout: Duration,
}

impl ProcessClientFactory {
    pub fn new(workspace_root: impl Into<PathBuf>, init_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            init_timeout,
            request_timeout,
        }
    }
}

#[async_trait]
impl ClientFactory for ProcessClientFactory {
    async fn connect(
        &self,
        language: &LanguageId,
        server: &ServerConfig,
    ) -> LspResult<Arc<dyn LanguageClient>> {
        info!(
            language = %language,
            command = %server.command,
            workspace = %self.workspace_root.display(),
            "starting language server"
        );
        let client = LspClient::builder()
            .server_command(&server.command)
            .server_args(&server.args)
            .workspace_root(&self.workspace_root)
            .initialization_options(server.initialization_options.clone())
            .init_timeout(self.init_timeout)
            .request_timeout(self.request_timeout)
            .build()
            .await?;
        info!(language = %language, "language server initialized");
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl LanguageClient for LspClient {
    async fn did_open(&self, path: &Path, language: &LanguageId) -> LspResult<()> {
        Self::did_open(self, path, language.as_str()).await
    }

    async fn hover(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Hover>> {
        Self::hover(self, uri, position).await
    }

    async fn definition(&self, uri: &Url, position: Position) -> LspResult<QueryResult<Location>> {
        Self::definition(self, uri, position).await
    }

    async fn type_definition(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>> {
        Self::type_definition(self, uri, position).await
    }

    async fn implementation(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<Location>> {
        Self::implementation(self, uri, position).await
    }

    async fn references(
        &self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<QueryResult<Location>> {
        Self::references(self, uri, position, include_declaration).await
    }

    async fn document_symbols(&self, uri: &Url) -> LspResult<DocumentSymbolResponse> {
        Self::document_symbols(self, uri).await
    }

    async fn workspace_symbols(&self, query: &str) -> LspResult<QueryResult<SymbolMatch>> {
        Self::workspace_symbols(self, query).await
    }

    async fn rename(
        &self,
        uri: &Url,
        position: Position,
        new_name: &str,
    ) -> LspResult<Option<WorkspaceEdit>> {
        Self::rename(self, uri, position, new_name).await
    }

    async fn prepare_call_hierarchy(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<Vec<CallHierarchyItem>> {
        Self::prepare_call_hierarchy(self, uri, position).await
    }

    async fn incoming_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyIncomingCall>> {
        Self::incoming_calls(self, item).await
    }

    async fn outgoing_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyOutgoingCall>> {
        Self::outgoing_calls(self, item).await
    }

    async fn semantic_tokens(&self, uri: &Url, range: Range) -> LspResult<Option<SemanticTokens>> {
        Self::semantic_tokens(self, uri, range).await
    }

    fn semantic_tokens_legend(&self) -> Option<SemanticTokensLegend> {
        Self::semantic_tokens_legend(self)
    }

    async fn code_actions(
        &self,
        uri: &Url,
        range: Range,
        diagnostics: Vec<Diagnostic>,
    ) -> LspResult<QueryResult<CodeActionOrCommand>> {
        Self::code_actions(self, uri, range, diagnostics).await
    }

    async fn format(&self, uri: &Url, options: FormattingOptions) -> LspResult<Vec<TextEdit>> {
        Self::format(self, uri, options).await
    }

    async fn completion(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<CompletionItem>> {
        Self::completion(self, uri, position).await
    }

    async fn signature_help(
        &self,
        uri: &Url,
        position: Position,
    ) -> LspResult<QueryResult<SignatureHelp>> {
        Self::signature_help(self, uri, position).await
    }

    async fn diagnostics(&self, uri: &Url) -> LspResult<Vec<Diagnostic>> {
        Self::diagnostics(self, uri).await
    }

    async fn workspace_diagnostics(&self) -> LspResult<Vec<FileDiagnostics>> {
        Self::workspace_diagnostics(self).await
    }

    async fn shutdown(&self) -> LspResult<()> {
        Self::shutdown(self).await
    }
}
