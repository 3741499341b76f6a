//! Scriptable in-memory language servers.
//!
//! [`MockFactory`] hands out [`MockClient`]s driven by a per-language
//! [`Script`]. Scripts can delay requests, inject transport faults and fail
//! initialization, which is enough to exercise the pool and the fan-out
//! without spawning real servers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, CodeActionOrCommand,
    CompletionItem, Diagnostic, DocumentSymbolResponse, FormattingOptions, Hover, Location,
    Position, Range, SemanticTokens, SemanticTokensLegend, SignatureHelp, TextEdit, Url,
    WorkspaceEdit,
};
use polyglot_runes::config::ServerConfig;
use polyglot_runes::error::LspError;
use polyglot_runes::language::LanguageId;
use polyglot_runes::lsp::types::{FileDiagnostics, QueryResult, SymbolMatch};
use polyglot_runes::lsp::{ClientFactory, LanguageClient, LspResult};

/// Canned responses and failure injection for one language.
#[derive(Default)]
pub struct Script {
    pub hover: Option<Hover>,
    pub definitions: Vec<Location>,
    pub implementations: Vec<Location>,
    pub symbols: Vec<SymbolMatch>,
    pub call_items: Vec<CallHierarchyItem>,
    pub incoming: Vec<CallHierarchyIncomingCall>,
    pub outgoing: Vec<CallHierarchyOutgoingCall>,
    pub completion: Vec<CompletionItem>,
    pub diagnostics: Vec<Diagnostic>,
    pub workspace_diagnostics: Vec<FileDiagnostics>,
    pub rename: Option<WorkspaceEdit>,
    pub formatting: Vec<TextEdit>,
    /// Applied to every query before answering.
    pub request_delay: Duration,
    /// Applied to `connect` before answering.
    pub connect_delay: Duration,
    /// Every `connect` fails.
    pub fail_init: bool,
    /// `connect` calls after the first N fail.
    pub fail_init_after: Option<usize>,
    /// The next N queries fail with a transport fault.
    pub transport_faults: AtomicU32,
    /// Every query fails with an error response.
    pub server_error: bool,
    /// Every query panics.
    pub panic: bool,
    /// `didOpen` is rejected.
    pub fail_open: bool,
}

/// Counters observed by the tests.
#[derive(Default)]
pub struct Calls {
    pub connects: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub opened: Mutex<Vec<PathBuf>>,
    pub requests: Mutex<Vec<&'static str>>,
}

impl Calls {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == method)
            .count()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

/// One scripted language, shared by every client the factory creates for it.
#[derive(Clone, Default)]
pub struct MockLanguage {
    pub script: Arc<Script>,
    pub calls: Arc<Calls>,
}

/// Factory over a fixed set of scripted languages.
#[derive(Default)]
pub struct MockFactory {
    languages: HashMap<LanguageId, MockLanguage>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `language` and returns its call counters.
    pub fn language(&mut self, language: &str, script: Script) -> Arc<Calls> {
        let mock = MockLanguage {
            script: Arc::new(script),
            calls: Arc::new(Calls::default()),
        };
        let calls = Arc::clone(&mock.calls);
        self.languages.insert(LanguageId::from(language), mock);
        calls
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn connect(
        &self,
        language: &LanguageId,
        _server: &ServerConfig,
    ) -> LspResult<Arc<dyn LanguageClient>> {
        let mock = self
            .languages
            .get(language)
            .ok_or_else(|| LspError::ServerStartFailed(format!("no mock for {language}")))?;
        let attempt = mock.calls.connects.fetch_add(1, Ordering::SeqCst) + 1;

        if !mock.script.connect_delay.is_zero() {
            tokio::time::sleep(mock.script.connect_delay).await;
        }
        let failing = mock.script.fail_init
            || mock.script.fail_init_after.is_some_and(|after| attempt > after);
        if failing {
            return Err(LspError::ServerStartFailed(format!(
                "{language} server refused to start"
            )));
        }

        Ok(Arc::new(MockClient {
            mock: mock.clone(),
            alive: AtomicBool::new(true),
        }))
    }
}

/// An initialized scripted server.
pub struct MockClient {
    mock: MockLanguage,
    alive: AtomicBool,
}

impl MockClient {
    async fn query<T>(&self, method: &'static str, answer: impl FnOnce(&Script) -> T) -> LspResult<T> {
        let script = &self.mock.script;
        self.mock.calls.requests.lock().unwrap().push(method);
        if !script.request_delay.is_zero() {
            tokio::time::sleep(script.request_delay).await;
        }
        if script.panic {
            panic!("{method} handler crashed");
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(LspError::ConnectionLost(format!("{method}: server shut down")));
        }
        let faulted = script
            .transport_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if faulted {
            return Err(LspError::ConnectionLost(format!("{method}: broken pipe")));
        }
        if script.server_error {
            return Err(LspError::ServerError {
                code: -32603,
                message: format!("{method}: internal error"),
            });
        }
        Ok(answer(script))
    }
}

#[async_trait]
impl LanguageClient for MockClient {
    async fn did_open(&self, path: &Path, _language: &LanguageId) -> LspResult<()> {
        if self.mock.script.fail_open {
            return Err(LspError::ServerError {
                code: -32602,
                message: format!("didOpen: cannot read {}", path.display()),
            });
        }
        self.mock.calls.opened.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn hover(&self, _uri: &Url, _position: Position) -> LspResult<QueryResult<Hover>> {
        self.query("hover", |s| QueryResult::from_option(s.hover.clone()))
            .await
    }

    async fn definition(&self, _uri: &Url, _position: Position) -> LspResult<QueryResult<Location>> {
        self.query("definition", |s| QueryResult::from_vec(s.definitions.clone()))
            .await
    }

    async fn type_definition(
        &self,
        _uri: &Url,
        _position: Position,
    ) -> LspResult<QueryResult<Location>> {
        self.query("typeDefinition", |s| QueryResult::from_vec(s.definitions.clone()))
            .await
    }

    async fn implementation(
        &self,
        _uri: &Url,
        _position: Position,
    ) -> LspResult<QueryResult<Location>> {
        self.query("implementation", |s| {
            QueryResult::from_vec(s.implementations.clone())
        })
        .await
    }

    async fn references(
        &self,
        _uri: &Url,
        _position: Position,
        _include_declaration: bool,
    ) -> LspResult<QueryResult<Location>> {
        self.query("references", |s| QueryResult::from_vec(s.definitions.clone()))
            .await
    }

    async fn document_symbols(&self, _uri: &Url) -> LspResult<DocumentSymbolResponse> {
        self.query("documentSymbol", |_| DocumentSymbolResponse::Nested(Vec::new()))
            .await
    }

    async fn workspace_symbols(&self, query: &str) -> LspResult<QueryResult<SymbolMatch>> {
        let query = query.to_lowercase();
        self.query("workspaceSymbol", |s| {
            QueryResult::from_vec(
                s.symbols
                    .iter()
                    .filter(|sym| sym.name.to_lowercase().contains(&query))
                    .cloned()
                    .collect(),
            )
        })
        .await
    }

    async fn rename(
        &self,
        _uri: &Url,
        _position: Position,
        _new_name: &str,
    ) -> LspResult<Option<WorkspaceEdit>> {
        self.query("rename", |s| s.rename.clone()).await
    }

    async fn prepare_call_hierarchy(
        &self,
        _uri: &Url,
        _position: Position,
    ) -> LspResult<Vec<CallHierarchyItem>> {
        self.query("prepareCallHierarchy", |s| s.call_items.clone())
            .await
    }

    async fn incoming_calls(
        &self,
        _item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyIncomingCall>> {
        self.query("incomingCalls", |s| s.incoming.clone()).await
    }

    async fn outgoing_calls(
        &self,
        _item: &CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyOutgoingCall>> {
        self.query("outgoingCalls", |s| s.outgoing.clone()).await
    }

    async fn semantic_tokens(&self, _uri: &Url, _range: Range) -> LspResult<Option<SemanticTokens>> {
        self.query("semanticTokens", |_| None).await
    }

    fn semantic_tokens_legend(&self) -> Option<SemanticTokensLegend> {
        None
    }

    async fn code_actions(
        &self,
        _uri: &Url,
        _range: Range,
        _diagnostics: Vec<Diagnostic>,
    ) -> LspResult<QueryResult<CodeActionOrCommand>> {
        self.query("codeAction", |_| QueryResult::NoResult).await
    }

    async fn format(&self, _uri: &Url, _options: FormattingOptions) -> LspResult<Vec<TextEdit>> {
        self.query("formatting", |s| s.formatting.clone()).await
    }

    async fn completion(
        &self,
        _uri: &Url,
        _position: Position,
    ) -> LspResult<QueryResult<CompletionItem>> {
        self.query("completion", |s| QueryResult::from_vec(s.completion.clone()))
            .await
    }

    async fn signature_help(
        &self,
        _uri: &Url,
        _position: Position,
    ) -> LspResult<QueryResult<SignatureHelp>> {
        self.query("signatureHelp", |_| QueryResult::NoResult).await
    }

    async fn diagnostics(&self, _uri: &Url) -> LspResult<Vec<Diagnostic>> {
        self.query("diagnostics", |s| s.diagnostics.clone()).await
    }

    async fn workspace_diagnostics(&self) -> LspResult<Vec<FileDiagnostics>> {
        self.query("workspaceDiagnostic", |s| s.workspace_diagnostics.clone())
            .await
    }

    async fn shutdown(&self) -> LspResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.mock.calls.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
