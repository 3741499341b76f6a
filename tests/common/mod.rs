//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod lsp_harness;
pub mod mock;
pub mod temp_workspace;

use std::path::{Path, PathBuf};

use lsp_types::{Location, Position, Range, SymbolKind, Url};
use polyglot_runes::lsp::types::SymbolMatch;
use rmcp::model::{CallToolResult, RawContent};

pub use mock::{Calls, MockFactory, Script};
pub use temp_workspace::{TestWorkspace, test_config};

/// Helper to get the fixture project path
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_project")
}

/// A location on one line of `path`.
pub fn location(path: &Path, line: u32, start: u32, end: u32) -> Location {
    Location {
        uri: Url::from_file_path(path).unwrap(),
        range: Range::new(Position::new(line, start), Position::new(line, end)),
    }
}

/// A workspace symbol match in `path`.
pub fn symbol(name: &str, kind: SymbolKind, path: &Path, line: u32) -> SymbolMatch {
    SymbolMatch {
        name: name.to_string(),
        kind,
        container_name: None,
        uri: Url::from_file_path(path).unwrap(),
        range: Some(Range::new(Position::new(line, 0), Position::new(line, 1))),
    }
}

/// Extracts the text of the first content block of a tool result.
/// ## Panics
/// if the result has no text content
pub fn text_of(result: &CallToolResult) -> &str {
    assert_eq!(result.is_error, Some(false), "Should not be an error");
    match &result.content[0].raw {
        RawContent::Text(text_content) => &text_content.text,
        other => panic!("Expected Text content, got: {other:?}"),
    }
}

/// A Go and TypeScript project sharing a `Greeter` interface.
pub const POLYGLOT_FIXTURE: &str = r#"
//- /go.mod
module example.com/greeter

go 1.22
//- /greeter.go
package greeter

type $0Greeter interface {
	Greet(name string) string
}

type English struct{}

func (English) Greet(name string) string { return "Hello, " + name }
//- /web/package.json
{ "name": "web" }
//- /web/greeter.ts
export interface Greeter {
  greet(name: string): string;
}

export class Polite implements Greeter {
  greet(name: string): string {
    return `Good day, ${name}`;
  }
}
"#;
