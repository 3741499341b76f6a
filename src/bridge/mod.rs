//! The bridge facade.
//!
//! [`Bridge`] is what the MCP layer talks to. Single-file operations resolve
//! one language and run against its connection; cross-language operations
//! fan out over every detected project language and merge the results.

pub mod analysis;
pub mod call_hierarchy;
pub mod edits;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{
    CodeActionOrCommand, CompletionItem, Diagnostic, DocumentSymbolResponse, FormattingOptions,
    Hover, Location, Position, Range, SignatureHelp, TextEdit, Url, WorkspaceEdit,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult, LspError};
use crate::fanout::{Flattened, flatten, run_all};
use crate::language::{LanguageDetector, LanguageId, ProjectLanguageMode};
use crate::lsp::downstream::LanguageClient;
use crate::lsp::types::{
    FileDiagnostics, QueryResult, SymbolMatch, TokenSpan, decode_semantic_tokens, path_to_url,
};
use crate::lsp::LspResult;
use crate::pool::{Acquired, ClientPool, Connection, ConnectionSnapshot};

pub use analysis::CodeAnalysis;
pub use call_hierarchy::{CallHierarchyEntry, CallHierarchyHandle, CallHierarchyOutcome, Direction};
pub use edits::EditSummary;

/// Result of a rename request.
#[derive(Debug, Clone)]
pub struct RenameOutcome {
    /// The edit proposed by the server, `None` when nothing can be renamed.
    pub edit: Option<WorkspaceEdit>,
    /// Set when the edit was written to disk.
    pub applied: Option<EditSummary>,
}

/// Result of a formatting request.
#[derive(Debug, Clone)]
pub struct FormatOutcome {
    pub edits: Vec<TextEdit>,
    /// The edits were written to disk.
    pub applied: bool,
}

/// Workspace diagnostics reported by one language server.
#[derive(Debug, Clone)]
pub struct LanguageDiagnostics {
    pub language: LanguageId,
    pub files: Vec<FileDiagnostics>,
}

impl LanguageDiagnostics {
    /// Diagnostics across every file.
    pub fn count(&self) -> usize {
        self.files.iter().map(|f| f.diagnostics.len()).sum()
    }
}

/// Overview of the bridge for the status tool.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub workspace_root: PathBuf,
    pub configured_languages: Vec<LanguageId>,
    pub detected_languages: Vec<LanguageId>,
    pub connections: Vec<ConnectionSnapshot>,
    pub max_restart_attempts: u32,
    pub restart_delay_ms: u64,
}

/// Facade composing the pool, the fan-out executor and language detection.
pub struct Bridge {
    pool: Arc<ClientPool>,
    detector: Arc<dyn LanguageDetector>,
    workspace_root: PathBuf,
    /// Held while edits are computed and written in apply mode.
    edit_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("workspace_root", &self.workspace_root)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn new(
        pool: Arc<ClientPool>,
        detector: Arc<dyn LanguageDetector>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            detector,
            workspace_root: workspace_root.into(),
            edit_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Makes a relative path absolute against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    /// Resolves `path` against the root, or `None` when it lies outside it.
    fn workspace_file(&self, path: &Path) -> Option<PathBuf> {
        let resolved = self.resolve(path);
        edits::is_within(&self.workspace_root, &resolved).then_some(resolved)
    }

    /// Language of a single file.
    /// ## Errors
    /// `LanguageInferenceFailed` for unmapped extensions.
    pub fn infer_language(&self, path: &Path) -> BridgeResult<LanguageId> {
        self.detector.infer_language(path)
    }

    /// Languages present in the workspace, primary first, narrowed by `mode`.
    ///
    /// The directory walk runs on the blocking pool.
    /// ## Errors
    /// `LanguageInferenceFailed` when nothing is recognized.
    pub async fn detect_project_languages(
        &self,
        mode: ProjectLanguageMode,
    ) -> BridgeResult<Vec<LanguageId>> {
        let detector = Arc::clone(&self.detector);
        let root = self.workspace_root.clone();
        let languages = tokio::task::spawn_blocking(move || detector.detect_project_languages(&root))
            .await
            .map_err(|e| {
                BridgeError::LanguageInferenceFailed(format!("language detection task failed: {e}"))
            })??;
        Ok(mode.select(languages))
    }

    /// Starts the server for `language` eagerly.
    /// ## Errors
    /// `ConnectionInitializationFailed` when the server cannot start.
    pub async fn connect(&self, language: &LanguageId) -> BridgeResult<ConnectionSnapshot> {
        self.pool.connect(language).await
    }

    /// Closes every connection. Later requests start fresh servers.
    pub async fn disconnect_all(&self) {
        self.pool.close_all().await;
    }

    pub async fn status(&self) -> BridgeStatus {
        let detected_languages = self
            .detect_project_languages(ProjectLanguageMode::All)
            .await
            .unwrap_or_default();
        let config = self.pool.config();
        BridgeStatus {
            workspace_root: self.workspace_root.clone(),
            configured_languages: config.language_servers.keys().cloned().collect(),
            detected_languages,
            connections: self.pool.snapshots(),
            max_restart_attempts: config.global.max_restart_attempts,
            restart_delay_ms: config.global.restart_delay_ms,
        }
    }

    /// Text covered by `range` in a file under the workspace root.
    /// ## Errors
    /// `InvalidParameters` when the file is outside the workspace or cannot be
    /// read, or the range is inverted.
    pub async fn range_content(&self, path: &Path, range: Range) -> BridgeResult<String> {
        if (range.end.line, range.end.character) < (range.start.line, range.start.character) {
            return Err(BridgeError::InvalidParameters(
                "range end is before range start".to_string(),
            ));
        }
        let path = self.workspace_file(path).ok_or_else(|| {
            BridgeError::InvalidParameters(format!(
                "'{}' is outside the workspace",
                path.display()
            ))
        })?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BridgeError::InvalidParameters(format!("failed to read '{}': {e}", path.display()))
        })?;
        let start = edits::offset_at(&content, range.start);
        let end = edits::offset_at(&content, range.end);
        Ok(content[start..end].to_string())
    }

    pub async fn hover(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<Hover>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.hover(&uri, position).await
        })
        .await
    }

    pub async fn signature_help(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<SignatureHelp>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.signature_help(&uri, position).await
        })
        .await
    }

    pub async fn completion(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<CompletionItem>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.completion(&uri, position).await
        })
        .await
    }

    pub async fn definition(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<Location>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.definition(&uri, position).await
        })
        .await
    }

    pub async fn type_definition(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<Location>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.type_definition(&uri, position).await
        })
        .await
    }

    pub async fn references(
        &self,
        path: &Path,
        position: Position,
        include_declaration: bool,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<Location>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.references(&uri, position, include_declaration).await
        })
        .await
    }

    pub async fn document_symbols(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> BridgeResult<DocumentSymbolResponse> {
        self.on_document(path, cancel, |client, uri| async move {
            client.document_symbols(&uri).await
        })
        .await
    }

    pub async fn diagnostics(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<Diagnostic>> {
        self.on_document(path, cancel, |client, uri| async move {
            client.diagnostics(&uri).await
        })
        .await
    }

    /// Code actions for a range, with the diagnostics overlapping it as context.
    pub async fn code_actions(
        &self,
        path: &Path,
        range: Range,
        cancel: &CancellationToken,
    ) -> BridgeResult<QueryResult<CodeActionOrCommand>> {
        self.on_document(path, cancel, |client, uri| async move {
            let diagnostics = client
                .diagnostics(&uri)
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|d| ranges_overlap(&d.range, &range))
                .collect();
            client.code_actions(&uri, range, diagnostics).await
        })
        .await
    }

    /// Semantic tokens in a range, optionally filtered to some token types.
    pub async fn semantic_tokens(
        &self,
        path: &Path,
        range: Range,
        token_types: &[String],
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<TokenSpan>> {
        self.on_document(path, cancel, |client, uri| async move {
            let legend = client.semantic_tokens_legend().ok_or_else(|| {
                LspError::CapabilityNotSupported("semanticTokens/range".to_string())
            })?;
            let tokens = client.semantic_tokens(&uri, range).await?;
            Ok(tokens
                .map(|tokens| decode_semantic_tokens(&tokens, &legend, token_types))
                .unwrap_or_default())
        })
        .await
    }

    /// Renames the symbol at a position, writing the edit when `apply` is set.
    /// ## Errors
    /// `InvalidParameters` for an empty name, `EditFailed` when writing fails.
    pub async fn rename(
        &self,
        path: &Path,
        position: Position,
        new_name: &str,
        apply: bool,
        cancel: &CancellationToken,
    ) -> BridgeResult<RenameOutcome> {
        if new_name.trim().is_empty() {
            return Err(BridgeError::InvalidParameters("new name is empty".to_string()));
        }

        let _guard = if apply {
            Some(self.edit_lock.lock().await)
        } else {
            None
        };
        let edit = self
            .on_document(path, cancel, |client, uri| async move {
                client.rename(&uri, position, new_name).await
            })
            .await?;

        let applied = match (&edit, apply) {
            (Some(edit), true) => {
                let summary = edits::apply_workspace_edit(&self.workspace_root, edit)?;
                info!(files = summary.changed_files.len(), edits = summary.text_edits, "applied rename");
                Some(summary)
            }
            _ => None,
        };
        Ok(RenameOutcome { edit, applied })
    }

    /// Formats a whole document, writing the result when `apply` is set.
    /// ## Errors
    /// `EditFailed` when applying to a file outside the workspace or when
    /// writing fails.
    pub async fn format_document(
        &self,
        path: &Path,
        tab_size: u32,
        insert_spaces: bool,
        apply: bool,
        cancel: &CancellationToken,
    ) -> BridgeResult<FormatOutcome> {
        let target = self.workspace_file(path);
        if apply && target.is_none() {
            return Err(BridgeError::EditFailed(format!(
                "refusing to edit outside the workspace: {}",
                path.display()
            )));
        }
        let options = FormattingOptions {
            tab_size,
            insert_spaces,
            ..Default::default()
        };

        let _guard = if apply {
            Some(self.edit_lock.lock().await)
        } else {
            None
        };
        let edits = self
            .on_document(path, cancel, |client, uri| {
                let options = options.clone();
                async move { client.format(&uri, options).await }
            })
            .await?;

        let applied = apply && !edits.is_empty();
        if let Some(path) = target.filter(|_| applied) {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                BridgeError::EditFailed(format!("failed to read '{}': {e}", path.display()))
            })?;
            let formatted = edits::apply_text_edits(&content, &edits)?;
            tokio::fs::write(&path, formatted).await.map_err(|e| {
                BridgeError::EditFailed(format!("failed to write '{}': {e}", path.display()))
            })?;
            info!(path = %path.display(), edits = edits.len(), "applied formatting");
        }
        Ok(FormatOutcome { edits, applied })
    }

    /// Finds implementations across every project language in `mode`.
    ///
    /// Only the connection matching the file's language opens the document.
    /// ## Errors
    /// `BatchFailed`/`NoLanguages` when nothing succeeded, `Cancelled` when
    /// cancelled before any result.
    pub async fn implementation(
        &self,
        path: &Path,
        position: Position,
        mode: ProjectLanguageMode,
        cancel: &CancellationToken,
    ) -> BridgeResult<Flattened<Location>> {
        let path = self.resolve(path);
        let uri = document_url(&path)?;
        let file_language = self.detector.infer_language(&path).ok();
        let languages = self.detect_project_languages(mode).await?;
        debug!(?languages, uri = %uri, "fanning out implementation search");

        self.fan_out(languages, cancel, move |connection, token| {
            let open_as = file_language
                .clone()
                .filter(|language| language == connection.language());
            let path = path.clone();
            let uri = uri.clone();
            async move {
                connection
                    .invoke(&token, |client| {
                        let open_as = open_as.clone();
                        let path = path.clone();
                        let uri = uri.clone();
                        async move {
                            if let Some(language) = &open_as {
                                client.did_open(&path, language).await?;
                            }
                            Ok(client.implementation(&uri, position).await?.into_vec())
                        }
                    })
                    .await
            }
        })
        .await
    }

    /// Searches workspace symbols across every project language in `mode`.
    /// ## Errors
    /// `InvalidParameters` for an empty query, otherwise as [`implementation`](Self::implementation).
    pub async fn workspace_symbols(
        &self,
        query: &str,
        mode: ProjectLanguageMode,
        cancel: &CancellationToken,
    ) -> BridgeResult<Flattened<SymbolMatch>> {
        if query.trim().is_empty() {
            return Err(BridgeError::InvalidParameters("query is empty".to_string()));
        }
        let languages = self.detect_project_languages(mode).await?;
        let query = query.to_string();

        self.fan_out(languages, cancel, move |connection, token| {
            let query = query.clone();
            async move {
                connection
                    .invoke(&token, |client| {
                        let query = query.clone();
                        async move { Ok(client.workspace_symbols(&query).await?.into_vec()) }
                    })
                    .await
            }
        })
        .await
    }

    /// Collects workspace diagnostics from every project language in `mode`.
    /// ## Errors
    /// As [`implementation`](Self::implementation).
    pub async fn workspace_diagnostics(
        &self,
        mode: ProjectLanguageMode,
        cancel: &CancellationToken,
    ) -> BridgeResult<Flattened<LanguageDiagnostics>> {
        let languages = self.detect_project_languages(mode).await?;
        debug!(?languages, "collecting workspace diagnostics");

        self.fan_out(languages, cancel, |connection, token| async move {
            let files = connection
                .invoke(&token, |client| async move { client.workspace_diagnostics().await })
                .await?;
            Ok(vec![LanguageDiagnostics {
                language: connection.language().clone(),
                files,
            }])
        })
        .await
    }

    /// Runs `op` on the connection for the file's language, after syncing the
    /// document with the server.
    async fn on_document<T, F, Fut>(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        op: F,
    ) -> BridgeResult<T>
    where
        F: Fn(Arc<dyn LanguageClient>, Url) -> Fut,
        Fut: Future<Output = LspResult<T>>,
    {
        let (connection, path, language) = self.document_connection(path).await?;
        let uri = document_url(&path)?;
        let op = &op;
        connection
            .invoke(cancel, |client| {
                let uri = uri.clone();
                let path = path.clone();
                let language = language.clone();
                async move {
                    client.did_open(&path, &language).await?;
                    op(client, uri).await
                }
            })
            .await
    }

    async fn document_connection(
        &self,
        path: &Path,
    ) -> BridgeResult<(Arc<Connection>, PathBuf, LanguageId)> {
        let path = self.resolve(path);
        let language = self.infer_language(&path)?;
        let connection = self.pool.get_or_create(&language).await?;
        Ok((connection, path, language))
    }

    async fn fan_out<T, F, Fut>(
        &self,
        languages: Vec<LanguageId>,
        cancel: &CancellationToken,
        op: F,
    ) -> BridgeResult<Flattened<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<Connection>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Vec<T>>> + Send + 'static,
    {
        let Acquired {
            connections,
            failures,
        } = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
            acquired = self.pool.get_many(&languages) => acquired?,
        };

        let mut batch = run_all(connections, cancel, op).await;
        batch.merge_failures(failures);
        if let Some(partial) = batch.partial_failure() {
            warn!(error = %partial, "fan-out finished with failures");
        }

        let flat = flatten(batch);
        if flat.searched.is_empty() {
            if flat.cancelled {
                return Err(BridgeError::Cancelled);
            }
            return Err(BridgeError::BatchFailed {
                failures: flat.failures,
            });
        }
        Ok(flat)
    }
}

fn document_url(path: &Path) -> BridgeResult<Url> {
    path_to_url(path).map_err(|e| BridgeError::InvalidParameters(e.to_string()))
}

fn ranges_overlap(a: &Range, b: &Range) -> bool {
    let key = |p: &Position| (p.line, p.character);
    key(&a.start) <= key(&b.end) && key(&b.start) <= key(&a.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_overlap() {
        let r = |sl, sc, el, ec| Range::new(Position::new(sl, sc), Position::new(el, ec));
        assert!(ranges_overlap(&r(1, 0, 1, 5), &r(1, 3, 1, 3)));
        assert!(ranges_overlap(&r(0, 0, 2, 0), &r(1, 0, 1, 1)));
        assert!(!ranges_overlap(&r(0, 0, 0, 4), &r(1, 0, 1, 1)));
    }
}
