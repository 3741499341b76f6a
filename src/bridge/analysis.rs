//! Combined code analysis at one position.

use std::fmt::Write;
use std::path::Path;

use lsp_types::{CodeActionOrCommand, CompletionItem, Diagnostic, Hover, Position, Range, SignatureHelp};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BridgeError, BridgeResult};
use crate::language::LanguageId;
use crate::lsp::types::QueryResult;

use super::Bridge;

/// Hover, completion, signature help, diagnostics and code actions for one
/// position. Each part succeeds or fails on its own.
#[derive(Debug)]
pub struct CodeAnalysis {
    pub language: LanguageId,
    /// Syncing the document with the server. The parts still run when it fails.
    pub open: BridgeResult<()>,
    pub hover: BridgeResult<QueryResult<Hover>>,
    pub completion: BridgeResult<QueryResult<CompletionItem>>,
    pub signature_help: BridgeResult<QueryResult<SignatureHelp>>,
    pub diagnostics: BridgeResult<Vec<Diagnostic>>,
    pub code_actions: BridgeResult<QueryResult<CodeActionOrCommand>>,
}

impl CodeAnalysis {
    pub fn has_hover(&self) -> bool {
        self.hover.as_ref().is_ok_and(|h| !h.is_empty())
    }

    pub fn completion_count(&self) -> usize {
        self.completion.as_ref().map_or(0, QueryResult::len)
    }

    pub fn has_signature_help(&self) -> bool {
        self.signature_help.as_ref().is_ok_and(|s| !s.is_empty())
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.as_ref().map_or(0, Vec::len)
    }

    pub fn code_action_count(&self) -> usize {
        self.code_actions.as_ref().map_or(0, QueryResult::len)
    }

    /// Parts that failed, by name.
    pub fn errors(&self) -> Vec<(&'static str, &BridgeError)> {
        [
            ("open", self.open.as_ref().err()),
            ("hover", self.hover.as_ref().err()),
            ("completion", self.completion.as_ref().err()),
            ("signature help", self.signature_help.as_ref().err()),
            ("diagnostics", self.diagnostics.as_ref().err()),
            ("code actions", self.code_actions.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(part, err)| err.map(|e| (part, e)))
        .collect()
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Analysis Results:\n");
        let _ = writeln!(out, "Hover: {}", self.has_hover());
        let _ = writeln!(out, "Completion Suggestions: {}", self.completion_count());
        let _ = writeln!(out, "Signature Help: {}", self.has_signature_help());
        let _ = writeln!(out, "Diagnostics: {}", self.diagnostic_count());
        let _ = write!(out, "Code Actions: {}", self.code_action_count());
        out
    }
}

impl Bridge {
    /// Runs every analysis part against the file's connection.
    /// ## Errors
    /// Only language inference and connection acquisition abort the analysis.
    pub async fn analyze_code(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<CodeAnalysis> {
        let (connection, path, language) = self.document_connection(path).await?;
        let uri = super::document_url(&path)?;
        let at = Range::new(position, position);

        // Open the document once; the parts below only query it.
        let open = connection
            .invoke(cancel, |client| {
                let path = path.clone();
                let language = language.clone();
                async move { client.did_open(&path, &language).await }
            })
            .await;
        if let Err(e) = &open {
            warn!(
                language = %language,
                path = %path.display(),
                error = %e,
                "could not open document for analysis"
            );
        }

        let uri = &uri;
        let (hover, completion, signature_help, diagnostics) = tokio::join!(
            connection.invoke(cancel, |client| async move { client.hover(uri, position).await }),
            connection.invoke(cancel, |client| async move {
                client.completion(uri, position).await
            }),
            connection.invoke(cancel, |client| async move {
                client.signature_help(uri, position).await
            }),
            connection.invoke(cancel, |client| async move { client.diagnostics(uri).await }),
        );

        let context: Vec<Diagnostic> = diagnostics
            .as_ref()
            .map(|all| {
                all.iter()
                    .filter(|d| super::ranges_overlap(&d.range, &at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let code_actions = connection
            .invoke(cancel, |client| {
                let context = context.clone();
                async move { client.code_actions(uri, at, context).await }
            })
            .await;

        Ok(CodeAnalysis {
            language,
            open,
            hover,
            completion,
            signature_help,
            diagnostics,
            code_actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::{HoverContents, MarkedString};

    use super::*;

    fn empty(language: &str) -> CodeAnalysis {
        CodeAnalysis {
            language: LanguageId::from(language),
            open: Ok(()),
            hover: Ok(QueryResult::NoResult),
            completion: Ok(QueryResult::NoResult),
            signature_help: Ok(QueryResult::NoResult),
            diagnostics: Ok(Vec::new()),
            code_actions: Ok(QueryResult::NoResult),
        }
    }

    #[test]
    fn test_summary_with_nothing_found() {
        let analysis = empty("go");
        assert_eq!(
            analysis.summary(),
            "Analysis Results:\nHover: false\nCompletion Suggestions: 0\nSignature Help: false\nDiagnostics: 0\nCode Actions: 0"
        );
        assert!(analysis.errors().is_empty());
    }

    #[test]
    fn test_failed_parts_are_independent() {
        let mut analysis = empty("rust");
        analysis.hover = Ok(QueryResult::Single(Hover {
            contents: HoverContents::Scalar(MarkedString::String("fn main()".into())),
            range: None,
        }));
        analysis.completion = Err(BridgeError::RequestFailed {
            language: LanguageId::from("rust"),
            reason: "timed out".into(),
        });

        assert!(analysis.has_hover());
        assert_eq!(analysis.completion_count(), 0);
        let errors = analysis.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "completion");
    }
}
