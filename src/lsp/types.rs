//! Additional type definitions for LSP operations.
//!
//! Downstream responses arrive in several wire shapes (a scalar, an array,
//! links, flat or nested symbols). They are normalized here, once, into
//! [`QueryResult`] and the small structs below so the pool and the bridge
//! never inspect raw response variants.

use std::path::{Path, PathBuf};

use lsp_types::{
    Diagnostic, GotoDefinitionResponse, Location, OneOf, Position, Range, SemanticTokenModifier,
    SemanticTokenType, SemanticTokens, SemanticTokensLegend, SymbolKind, Url,
    WorkspaceDiagnosticReportResult, WorkspaceDocumentDiagnosticReport, WorkspaceSymbolResponse,
};
use serde::Serialize;

use crate::error::LspError;

use super::LspResult;

/// Converts a path to an LSP file:// URI.
///
/// Relative paths are resolved against the current directory and the result
/// is canonicalized, so the file must exist.
/// ## Errors
/// `LspError::DocumentNotFound` when the path cannot be resolved.
pub fn path_to_url(path: &Path) -> LspResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| {
                LspError::DocumentNotFound(format!("failed to get current directory: {e}"))
            })?
            .join(path)
    };

    let canonical = absolute.canonicalize().map_err(|e| {
        LspError::DocumentNotFound(format!(
            "failed to canonicalize path '{}': {}",
            path.display(),
            e
        ))
    })?;

    Url::from_file_path(&canonical)
        .map_err(|()| LspError::DocumentNotFound(format!("invalid path: {}", canonical.display())))
}

/// Extension trait for converting paths to LSP Url.
pub trait PathToUri {
    /// Converts a path to an LSP Url.
    /// ## Errors
    /// `LspError`
    fn to_lsp_uri(&self) -> LspResult<Url>;
}

impl PathToUri for Path {
    fn to_lsp_uri(&self) -> LspResult<Url> {
        path_to_url(self)
    }
}

/// Parses a tool argument that is either a `file://` URI or a plain path.
///
/// Returns `None` for empty input and URIs with a non-file scheme.
pub fn document_path(uri_or_path: &str) -> Option<PathBuf> {
    let uri_or_path = uri_or_path.trim();
    if uri_or_path.is_empty() {
        None
    } else if uri_or_path.starts_with("file://") {
        Url::parse(uri_or_path).ok()?.to_file_path().ok()
    } else if uri_or_path.contains("://") {
        None
    } else {
        Some(PathBuf::from(uri_or_path))
    }
}

/// Normalized downstream result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryResult<T> {
    /// The server had nothing to report.
    #[default]
    NoResult,
    /// Exactly one value.
    Single(T),
    /// Zero or more values, in server order.
    List(Vec<T>),
}

impl<T> QueryResult<T> {
    /// `None` becomes [`QueryResult::NoResult`].
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::NoResult, Self::Single)
    }

    /// An empty list becomes [`QueryResult::NoResult`].
    pub fn from_vec(values: Vec<T>) -> Self {
        if values.is_empty() {
            Self::NoResult
        } else {
            Self::List(values)
        }
    }

    /// Number of values carried.
    pub fn len(&self) -> usize {
        match self {
            Self::NoResult => 0,
            Self::Single(_) => 1,
            Self::List(values) => values.len(),
        }
    }

    /// Returns `true` when no value is carried.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the first value, if any.
    pub fn first(&self) -> Option<&T> {
        match self {
            Self::NoResult => None,
            Self::Single(value) => Some(value),
            Self::List(values) => values.first(),
        }
    }

    /// Borrows the carried values in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::NoResult => [].iter(),
            Self::Single(value) => std::slice::from_ref(value).iter(),
            Self::List(values) => values.iter(),
        }
    }

    /// Flattens into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::NoResult => Vec::new(),
            Self::Single(value) => vec![value],
            Self::List(values) => values,
        }
    }

    /// Applies `f` to every carried value, keeping the shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> QueryResult<U> {
        match self {
            Self::NoResult => QueryResult::NoResult,
            Self::Single(value) => QueryResult::Single(f(value)),
            Self::List(values) => QueryResult::List(values.into_iter().map(f).collect()),
        }
    }
}

impl<T> From<Option<T>> for QueryResult<T> {
    fn from(value: Option<T>) -> Self {
        Self::from_option(value)
    }
}

impl<T> From<Vec<T>> for QueryResult<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}

impl<T> IntoIterator for QueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

/// Normalizes a definition-like response into locations.
pub fn locations_from_goto(response: Option<GotoDefinitionResponse>) -> QueryResult<Location> {
    match response {
        None => QueryResult::NoResult,
        Some(GotoDefinitionResponse::Scalar(loc)) => QueryResult::Single(loc),
        Some(GotoDefinitionResponse::Array(locs)) => QueryResult::from_vec(locs),
        Some(GotoDefinitionResponse::Link(links)) => QueryResult::from_vec(
            links
                .into_iter()
                .map(|link| Location {
                    uri: link.target_uri,
                    range: link.target_selection_range,
                })
                .collect(),
        ),
    }
}

/// A workspace symbol, independent of the flat/nested response shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolMatch {
    /// Symbol name.
    pub name: String,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Enclosing symbol, if reported.
    pub container_name: Option<String>,
    /// Document containing the symbol.
    pub uri: Url,
    /// Location in the document; absent when the server only reported the file.
    pub range: Option<Range>,
}

/// Normalizes a `workspace/symbol` response.
pub fn symbols_from_workspace(response: Option<WorkspaceSymbolResponse>) -> QueryResult<SymbolMatch> {
    let matches = match response {
        None => return QueryResult::NoResult,
        Some(WorkspaceSymbolResponse::Flat(symbols)) => symbols
            .into_iter()
            .map(|s| SymbolMatch {
                name: s.name,
                kind: s.kind,
                container_name: s.container_name,
                uri: s.location.uri,
                range: Some(s.location.range),
            })
            .collect(),
        Some(WorkspaceSymbolResponse::Nested(symbols)) => symbols
            .into_iter()
            .map(|s| {
                let (uri, range) = match s.location {
                    OneOf::Left(location) => (location.uri, Some(location.range)),
                    OneOf::Right(workspace_location) => (workspace_location.uri, None),
                };
                SymbolMatch {
                    name: s.name,
                    kind: s.kind,
                    container_name: s.container_name,
                    uri,
                    range,
                }
            })
            .collect(),
    };
    QueryResult::from_vec(matches)
}

/// Diagnostics of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDiagnostics {
    pub uri: Url,
    pub diagnostics: Vec<Diagnostic>,
}

/// Normalizes a `workspace/diagnostic` response, ordered by URI.
///
/// Unchanged reports and documents without diagnostics are dropped.
pub fn diagnostics_from_workspace(result: WorkspaceDiagnosticReportResult) -> Vec<FileDiagnostics> {
    let items = match result {
        WorkspaceDiagnosticReportResult::Report(report) => report.items,
        WorkspaceDiagnosticReportResult::Partial(partial) => partial.items,
    };
    let mut files: Vec<FileDiagnostics> = items
        .into_iter()
        .filter_map(|item| match item {
            WorkspaceDocumentDiagnosticReport::Full(full) => Some(FileDiagnostics {
                uri: full.uri,
                diagnostics: full.full_document_diagnostic_report.items,
            }),
            WorkspaceDocumentDiagnosticReport::Unchanged(_) => None,
        })
        .filter(|file| !file.diagnostics.is_empty())
        .collect();
    files.sort_by(|a, b| a.uri.as_str().cmp(b.uri.as_str()));
    files
}

/// One decoded semantic token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSpan {
    /// Token type name from the legend.
    pub token_type: String,
    /// Modifier names from the legend.
    pub modifiers: Vec<String>,
    /// Absolute range of the token (single line).
    pub range: Range,
}

/// Legend used when a server returns tokens without advertising one.
pub fn default_semantic_legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: vec![
            SemanticTokenType::NAMESPACE,
            SemanticTokenType::TYPE,
            SemanticTokenType::CLASS,
            SemanticTokenType::ENUM,
            SemanticTokenType::INTERFACE,
            SemanticTokenType::STRUCT,
            SemanticTokenType::TYPE_PARAMETER,
            SemanticTokenType::PARAMETER,
            SemanticTokenType::VARIABLE,
            SemanticTokenType::PROPERTY,
            SemanticTokenType::ENUM_MEMBER,
            SemanticTokenType::EVENT,
            SemanticTokenType::FUNCTION,
            SemanticTokenType::METHOD,
            SemanticTokenType::MACRO,
            SemanticTokenType::KEYWORD,
            SemanticTokenType::MODIFIER,
            SemanticTokenType::COMMENT,
            SemanticTokenType::STRING,
            SemanticTokenType::NUMBER,
            SemanticTokenType::REGEXP,
            SemanticTokenType::OPERATOR,
        ],
        token_modifiers: vec![
            SemanticTokenModifier::DECLARATION,
            SemanticTokenModifier::DEFINITION,
            SemanticTokenModifier::READONLY,
            SemanticTokenModifier::STATIC,
            SemanticTokenModifier::DEPRECATED,
            SemanticTokenModifier::ABSTRACT,
            SemanticTokenModifier::ASYNC,
            SemanticTokenModifier::MODIFICATION,
            SemanticTokenModifier::DOCUMENTATION,
            SemanticTokenModifier::DEFAULT_LIBRARY,
        ],
    }
}

/// Decodes relative semantic token data into absolute spans.
///
/// `filter` keeps only the listed token types; an empty filter keeps all.
/// Token type indices outside the legend are reported as `unknown`.
pub fn decode_semantic_tokens(
    tokens: &SemanticTokens,
    legend: &SemanticTokensLegend,
    filter: &[String],
) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut line = 0u32;
    let mut start = 0u32;

    for token in &tokens.data {
        if token.delta_line == 0 {
            start += token.delta_start;
        } else {
            line += token.delta_line;
            start = token.delta_start;
        }

        let token_type = legend
            .token_types
            .get(token.token_type as usize)
            .map_or("unknown", SemanticTokenType::as_str);
        if !filter.is_empty() && !filter.iter().any(|f| f == token_type) {
            continue;
        }

        let modifiers = legend
            .token_modifiers
            .iter()
            .enumerate()
            .filter(|(bit, _)| *bit < 32 && token.token_modifiers_bitset & (1 << bit) != 0)
            .map(|(_, m)| m.as_str().to_string())
            .collect();

        spans.push(TokenSpan {
            token_type: token_type.to_string(),
            modifiers,
            range: Range::new(
                Position::new(line, start),
                Position::new(line, start + token.length),
            ),
        });
    }
    spans
}

/// Converts an LSP symbol kind to a human-readable string.
pub fn symbol_kind_to_string(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum_member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type_parameter",
        _ => "unknown",
    }
}
