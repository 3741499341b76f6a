//! End-to-end tests for MCP server tools.
//!
//! These tests invoke tools on the MCP server directly and verify the text
//! they return, with scripted language servers behind the bridge.
//!
//! To run these tests:
//! ```bash
//! # Run all MCP tool tests
//! cargo test --test mcp_tool_test
//!
//! # Run with debug output
//! RUST_LOG=debug cargo test --test mcp_tool_test -- --nocapture
//! ```
mod common;

use common::{MockFactory, POLYGLOT_FIXTURE, Script, TestWorkspace, location, text_of};
use lsp_types::{Diagnostic, DiagnosticSeverity, Hover, HoverContents, MarkupContent, MarkupKind};
use lsp_types::{Position, Range, Url};
use polyglot_runes::language::ProjectLanguageMode;
use polyglot_runes::lsp::types::FileDiagnostics;
use polyglot_runes::mcp::PolyglotRunes;
use polyglot_runes::mcp::tools::{
    CallHierarchyParams, ConnectParams, DetectLanguagesParams, DocumentParams,
    ImplementationParams, InferLanguageParams, PositionParams, RangeParams, RenameParams,
    WorkspaceDiagnosticsParams,
};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::ErrorCode;
use tokio_util::sync::CancellationToken;

fn server(ws: &TestWorkspace, factory: MockFactory) -> PolyglotRunes {
    PolyglotRunes::new(ws.bridge(factory), CancellationToken::new())
}

fn cursor_params(ws: &TestWorkspace) -> PositionParams {
    let (path, position) = ws.cursor();
    PositionParams {
        uri: format!("file://{}", path.display()),
        line: position.line,
        character: position.character,
    }
}

#[tokio::test]
async fn test_mcp_implementation_reports_errors_and_results() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language(
        "go",
        Script {
            implementations: vec![location(&ws.apath("greeter.go"), 8, 6, 13)],
            ..Default::default()
        },
    );
    factory.language(
        "typescript",
        Script {
            fail_init: true,
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    let result = server
        .implementation(
            Parameters(ImplementationParams {
                position: cursor_params(&ws),
                mode: ProjectLanguageMode::All,
            }),
            CancellationToken::new(),
        )
        .await
        .expect("implementation tool should succeed");
    let text = text_of(&result);

    assert!(text.starts_with("IMPLEMENTATIONS:"), "got: {text}");
    assert!(text.contains("Languages searched: [go]"), "got: {text}");
    assert!(text.contains("Implementations found: 1"), "got: {text}");
    assert!(text.contains("Errors: 1"), "got: {text}");
    assert!(text.contains("typescript"), "got: {text}");
    assert!(text.contains("1. greeter.go"), "got: {text}");
    assert!(text.contains("Range: 8:6-8:13"), "got: {text}");
}

#[tokio::test]
async fn test_mcp_call_hierarchy_without_items() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language("go", Script::default());
    let server = server(&ws, factory);

    let result = server
        .call_hierarchy(
            Parameters(CallHierarchyParams {
                position: cursor_params(&ws),
                direction: polyglot_runes::bridge::Direction::Both,
            }),
            CancellationToken::new(),
        )
        .await
        .expect("empty call hierarchy is not an error");

    assert_eq!(
        text_of(&result),
        "No call hierarchy items found on line 2, character 5 for language go"
    );
}

#[tokio::test]
async fn test_mcp_analyze_code_summary() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language("go", Script::default());
    let server = server(&ws, factory);

    let result = server
        .analyze_code(Parameters(cursor_params(&ws)), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        text_of(&result),
        "Analysis Results:\nHover: false\nCompletion Suggestions: 0\nSignature Help: false\nDiagnostics: 0\nCode Actions: 0"
    );
}

#[tokio::test]
async fn test_mcp_hover_and_definition() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let go_file = ws.apath("greeter.go");
    let mut factory = MockFactory::new();
    factory.language(
        "go",
        Script {
            hover: Some(Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: "```go\ntype Greeter interface\n```".to_string(),
                }),
                range: None,
            }),
            definitions: vec![location(&go_file, 2, 5, 12)],
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    let hover = server
        .hover(Parameters(cursor_params(&ws)), CancellationToken::new())
        .await
        .unwrap();
    assert!(text_of(&hover).contains("type Greeter interface"));

    let definition = server
        .definition(Parameters(cursor_params(&ws)), CancellationToken::new())
        .await
        .unwrap();
    let text = text_of(&definition);
    assert!(text.contains("greeter.go:2:5"), "got: {text}");
    assert!(text.contains(">    2 | type Greeter interface {"), "got: {text}");
}

#[tokio::test]
async fn test_mcp_diagnostics() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language(
        "go",
        Script {
            diagnostics: vec![Diagnostic {
                range: Range::new(Position::new(8, 0), Position::new(8, 4)),
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some("compiler".to_string()),
                message: "undefined: Englsh".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    let result = server
        .document_diagnostics(
            Parameters(DocumentParams {
                uri: "greeter.go".to_string(),
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let text = text_of(&result);
    assert!(text.contains("Diagnostics: 1"), "got: {text}");
    assert!(text.contains("1. [error] undefined: Englsh"), "got: {text}");
    assert!(text.contains("Location: 8:0-8:4"), "got: {text}");
}

#[tokio::test]
async fn test_mcp_language_tools() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language("go", Script::default());
    let server = server(&ws, factory);

    let detected = server
        .detect_project_languages(Parameters(DetectLanguagesParams {
            mode: ProjectLanguageMode::All,
        }))
        .await
        .unwrap();
    let text = text_of(&detected);
    assert!(text.contains("1. go (primary)"), "got: {text}");
    assert!(text.contains("2. typescript (secondary)"), "got: {text}");

    let inferred = server
        .infer_language(Parameters(InferLanguageParams {
            file_path: "web/greeter.ts".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(text_of(&inferred), "Language: typescript");

    let unknown = server
        .infer_language(Parameters(InferLanguageParams {
            file_path: "notes.txt".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(unknown.code, ErrorCode::INVALID_PARAMS);
}

#[tokio::test]
async fn test_mcp_connection_lifecycle() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    let calls = factory.language("go", Script::default());
    let server = server(&ws, factory);

    let connected = server
        .lsp_connect(Parameters(ConnectParams {
            language: "Go".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(
        text_of(&connected),
        "Connected to go language server (gopls), state: ready"
    );

    let status = server.bridge_status().await.unwrap();
    let text = text_of(&status);
    assert!(text.contains("Detected languages: [go, typescript]"), "got: {text}");
    assert!(text.contains("Connections: 1"), "got: {text}");
    assert!(text.contains("- go (gopls)"), "got: {text}");
    assert!(text.contains("state: ready"), "got: {text}");

    let disconnected = server.lsp_disconnect().await.unwrap();
    assert_eq!(text_of(&disconnected), "Disconnected 1 language server(s).");
    assert_eq!(calls.shutdowns(), 1);
    assert!(server.bridge().pool().snapshots().is_empty());
}

#[tokio::test]
async fn test_mcp_error_mapping() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language(
        "go",
        Script {
            fail_init: true,
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    let failed = server
        .hover(Parameters(cursor_params(&ws)), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(failed.code, ErrorCode::INTERNAL_ERROR);
    assert!(failed.message.contains("go"), "got: {}", failed.message);

    let bad_uri = server
        .hover(
            Parameters(PositionParams {
                uri: "https://example.com/main.go".to_string(),
                line: 0,
                character: 0,
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(bad_uri.code, ErrorCode::INVALID_PARAMS);

    let empty_name = server
        .rename(
            Parameters(RenameParams {
                position: cursor_params(&ws),
                new_name: String::new(),
                apply: false,
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(empty_name.code, ErrorCode::INVALID_PARAMS);
}

#[tokio::test]
async fn test_mcp_get_range_content() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let server = server(&ws, MockFactory::new());

    let result = server
        .get_range_content(Parameters(RangeParams {
            uri: "greeter.go".to_string(),
            start_line: 2,
            start_character: 0,
            end_line: 2,
            end_character: 12,
        }))
        .await
        .unwrap();
    assert_eq!(text_of(&result), "type Greeter");
}

#[tokio::test]
async fn test_mcp_workspace_diagnostics_with_failing_language() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    factory.language(
        "go",
        Script {
            workspace_diagnostics: vec![FileDiagnostics {
                uri: Url::from_file_path(ws.apath("greeter.go")).unwrap(),
                diagnostics: vec![Diagnostic {
                    range: Range::new(Position::new(8, 0), Position::new(8, 4)),
                    severity: Some(DiagnosticSeverity::ERROR),
                    message: "undefined: Englsh".to_string(),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        },
    );
    factory.language(
        "typescript",
        Script {
            fail_init: true,
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    let result = server
        .workspace_diagnostics(
            Parameters(WorkspaceDiagnosticsParams {
                mode: ProjectLanguageMode::All,
            }),
            CancellationToken::new(),
        )
        .await
        .expect("one healthy language is enough");
    let text = text_of(&result);

    assert!(text.starts_with("WORKSPACE DIAGNOSTICS:"), "got: {text}");
    assert!(text.contains("Languages searched: [go]"), "got: {text}");
    assert!(text.contains("Total diagnostics: 1"), "got: {text}");
    assert!(text.contains("ERRORS:\n1. typescript"), "got: {text}");
    assert!(text.contains("1. go: 1 diagnostics"), "got: {text}");
    assert!(text.contains("greeter.go:8 undefined: Englsh"), "got: {text}");
}

#[tokio::test]
async fn test_mcp_cancelled_request() {
    let ws = TestWorkspace::new(POLYGLOT_FIXTURE);
    let mut factory = MockFactory::new();
    let calls = factory.language(
        "go",
        Script {
            request_delay: std::time::Duration::from_secs(30),
            ..Default::default()
        },
    );
    let server = server(&ws, factory);

    // The client cancels the request while the server is still answering.
    let request = CancellationToken::new();
    let trigger = request.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let cancelled = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        server.hover(Parameters(cursor_params(&ws)), request),
    )
    .await
    .expect("cancellation should end the call")
    .unwrap_err();

    assert!(cancelled.message.contains("cancelled"), "got: {}", cancelled.message);
    assert_eq!(calls.count("hover"), 1);
}
