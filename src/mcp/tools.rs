//! MCP tool parameter definitions.
//!
//! Every position is 0-based (`line`, `character`), as in LSP. `uri` accepts
//! either a `file://` URI or a plain path; relative paths resolve against the
//! workspace root.
//!
//! # Available Tools
//!
//! ## Single file
//! - `hover`, `signature_help`, `definition`, `type_definition`, `references`
//! - `document_symbols`, `document_diagnostics`, `code_actions`, `semantic_tokens`
//! - `call_hierarchy`, `analyze_code`, `rename`, `format_document`
//! - `get_range_content`
//!
//! ## Cross-language
//! - `implementation`, `workspace_symbols`
//!
//! ## Bridge
//! - `infer_language`, `detect_project_languages`, `lsp_connect`,
//!   `lsp_disconnect`, `bridge_status`

use lsp_types::{Position, Range};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bridge::Direction;
use crate::language::ProjectLanguageMode;

/// Common input for position-based tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PositionParams {
    #[schemars(description = "File URI (file:///path/to/file.go) or path")]
    pub uri: String,
    #[schemars(description = "Line number (0-based)")]
    pub line: u32,
    #[schemars(description = "Character position (0-based)")]
    pub character: u32,
}

impl PositionParams {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.character)
    }
}

/// Input for tools that only need a file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentParams {
    #[schemars(description = "File URI (file:///path/to/file.go) or path")]
    pub uri: String,
}

/// Input for range-based tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RangeParams {
    #[schemars(description = "File URI (file:///path/to/file.go) or path")]
    pub uri: String,
    #[schemars(description = "Start line number (0-based)")]
    pub start_line: u32,
    #[schemars(description = "Start character position (0-based)")]
    pub start_character: u32,
    #[schemars(description = "End line number (0-based)")]
    pub end_line: u32,
    #[schemars(description = "End character position (0-based)")]
    pub end_character: u32,
}

impl RangeParams {
    pub fn range(&self) -> Range {
        Range::new(
            Position::new(self.start_line, self.start_character),
            Position::new(self.end_line, self.end_character),
        )
    }
}

/// Parameters for the `references` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferencesParams {
    #[serde(flatten)]
    pub position: PositionParams,
    #[serde(default)]
    #[schemars(description = "Whether to include the declaration in the results (default: false)")]
    pub include_declaration: bool,
}

/// Parameters for the `implementation` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImplementationParams {
    #[serde(flatten)]
    pub position: PositionParams,
    #[serde(default)]
    #[schemars(
        description = "Languages to search: 'all' detected project languages or only the 'primary' one (default: 'all')"
    )]
    pub mode: ProjectLanguageMode,
}

/// Parameters for the `workspace_symbols` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceSymbolsParams {
    #[schemars(description = "Symbol name to search for")]
    pub query: String,
    #[serde(default)]
    #[schemars(description = "Languages to search: 'all' or 'primary' (default: 'all')")]
    pub mode: ProjectLanguageMode,
    #[serde(default = "default_max_results")]
    #[schemars(description = "Maximum number of results to return (default: 50)")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    50
}

/// Parameters for the `call_hierarchy` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallHierarchyParams {
    #[serde(flatten)]
    pub position: PositionParams,
    #[serde(default)]
    #[schemars(description = "Direction: 'incoming', 'outgoing', or 'both' (default: 'both')")]
    pub direction: Direction,
}

/// Parameters for the `rename` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenameParams {
    #[serde(flatten)]
    pub position: PositionParams,
    #[schemars(description = "New name for the symbol")]
    pub new_name: String,
    #[serde(default)]
    #[schemars(
        description = "Write the edits to disk. false (default) only previews the rename; preview first"
    )]
    pub apply: bool,
}

/// Parameters for the `format_document` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormatDocumentParams {
    #[schemars(description = "File URI (file:///path/to/file.go) or path")]
    pub uri: String,
    #[serde(default = "default_tab_size")]
    #[schemars(description = "Tab size for formatting (default: 4)")]
    pub tab_size: u32,
    #[serde(default = "default_insert_spaces")]
    #[schemars(description = "Indent with spaces instead of tabs (default: true)")]
    pub insert_spaces: bool,
    #[serde(default)]
    #[schemars(description = "Write the formatted file to disk. false (default) only previews")]
    pub apply: bool,
}

fn default_tab_size() -> u32 {
    4
}

fn default_insert_spaces() -> bool {
    true
}

/// Parameters for the `code_actions` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeActionsParams {
    #[serde(flatten)]
    pub position: PositionParams,
    #[schemars(description = "End line number (0-based, optional, defaults to the start line)")]
    pub end_line: Option<u32>,
    #[schemars(
        description = "End character position (0-based, optional, defaults to the start character)"
    )]
    pub end_character: Option<u32>,
}

impl CodeActionsParams {
    pub fn range(&self) -> Range {
        let start = self.position.position();
        let end = Position::new(
            self.end_line.unwrap_or(start.line),
            self.end_character.unwrap_or(start.character),
        );
        Range::new(start, end)
    }
}

/// Parameters for the `semantic_tokens` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SemanticTokensParams {
    #[serde(flatten)]
    pub range: RangeParams,
    #[serde(default)]
    #[schemars(
        description = "Token types to keep, e.g. [\"function\", \"parameter\", \"variable\"] (default: all)"
    )]
    pub token_types: Vec<String>,
}

/// Parameters for the `infer_language` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InferLanguageParams {
    #[schemars(description = "Path to the file to infer the language of")]
    pub file_path: String,
}

/// Parameters for the `detect_project_languages` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectLanguagesParams {
    #[serde(default)]
    #[schemars(
        description = "Detection mode: 'all' for all languages, 'primary' for primary language only (default: 'all')"
    )]
    pub mode: ProjectLanguageMode,
}

/// Parameters for the `workspace_diagnostics` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceDiagnosticsParams {
    #[serde(default)]
    #[schemars(description = "Languages to collect from: 'all' or 'primary' (default: 'all')")]
    pub mode: ProjectLanguageMode,
}

/// Parameters for the `lsp_connect` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectParams {
    #[schemars(description = "Language to connect, e.g. 'go' or 'rust'")]
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_params_flattened() {
        let params: CallHierarchyParams = serde_json::from_str(
            r#"{"uri": "file:///w/main.go", "line": 3, "character": 7, "direction": "incoming"}"#,
        )
        .unwrap();
        assert_eq!(params.position.position(), Position::new(3, 7));
        assert_eq!(params.direction, Direction::Incoming);

        let params: CallHierarchyParams =
            serde_json::from_str(r#"{"uri": "main.go", "line": 0, "character": 0}"#).unwrap();
        assert_eq!(params.direction, Direction::Both);
    }

    #[test]
    fn test_unknown_direction_rejected() {
        let result: Result<CallHierarchyParams, _> = serde_json::from_str(
            r#"{"uri": "main.go", "line": 0, "character": 0, "direction": "sideways"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let params: FormatDocumentParams = serde_json::from_str(r#"{"uri": "a.ts"}"#).unwrap();
        assert_eq!(params.tab_size, 4);
        assert!(params.insert_spaces);
        assert!(!params.apply);

        let params: WorkspaceSymbolsParams = serde_json::from_str(r#"{"query": "Handler"}"#).unwrap();
        assert_eq!(params.max_results, 50);
        assert_eq!(params.mode, ProjectLanguageMode::All);
    }

    #[test]
    fn test_code_action_range_defaults_to_position() {
        let params: CodeActionsParams =
            serde_json::from_str(r#"{"uri": "a.rs", "line": 4, "character": 2, "end_line": 6}"#)
                .unwrap();
        assert_eq!(
            params.range(),
            Range::new(Position::new(4, 2), Position::new(6, 2))
        );
    }
}
