//! Text rendering of bridge results for LLM consumption.
//!
//! All line and character numbers are printed 0-based, matching the tool
//! inputs, so a location can be fed straight back into another tool.

use std::fmt::Write as _;
use std::path::Path;

use lsp_types::{
    CallHierarchyItem, CodeActionOrCommand, CompletionItem, Diagnostic, DiagnosticSeverity,
    DocumentSymbol, DocumentSymbolResponse, Hover, HoverContents, Location, MarkedString, Range,
    SignatureHelp, SymbolInformation, TextEdit, Url, WorkspaceEdit,
};

use crate::bridge::{
    CallHierarchyEntry, CallHierarchyOutcome, CodeAnalysis, EditSummary, FormatOutcome,
    LanguageDiagnostics, RenameOutcome,
};
use crate::error::LanguageFailure;
use crate::fanout::Flattened;
use crate::lsp::types::{QueryResult, SymbolMatch, TokenSpan, symbol_kind_to_string};
use crate::pool::ConnectionSnapshot;

pub(crate) const NO_RESULTS: &str = "No results found.";

/// Reads context lines around a specific line in a file.
///
/// Returns a formatted string with line numbers and a marker for the target line.
fn read_context_lines(path: &Path, line: u32, context: usize) -> Result<String, std::io::Error> {
    let file_content = std::fs::read_to_string(path)?;
    let lines: Vec<_> = file_content.lines().collect();
    let line_idx = line as usize;

    let start = line_idx.saturating_sub(context).min(lines.len());
    let end = (line_idx + context + 1).min(lines.len());

    let mut result = String::new();
    for (idx, line_text) in lines[start..end].iter().enumerate() {
        let line_num = start + idx;
        let marker = if line_num == line_idx { ">" } else { " " };
        let _ = writeln!(result, "{marker} {line_num:4} | {line_text}");
    }
    Ok(result)
}

pub(crate) fn display_uri(uri: &Url) -> String {
    uri.to_file_path()
        .map_or_else(|()| uri.to_string(), |p| p.display().to_string())
}

pub(crate) fn display_range(range: &Range) -> String {
    format!(
        "{}:{}-{}:{}",
        range.start.line, range.start.character, range.end.line, range.end.character
    )
}

/// Formats a single location with source context when the file is readable.
fn format_location(loc: &Location, context_lines: usize) -> String {
    let header = format!(
        "{}:{}:{}",
        display_uri(&loc.uri),
        loc.range.start.line,
        loc.range.start.character
    );
    let context = loc
        .uri
        .to_file_path()
        .ok()
        .and_then(|path| read_context_lines(&path, loc.range.start.line, context_lines).ok());
    match context {
        Some(context) => format!("{header}\n{context}"),
        None => header,
    }
}

/// Formats locations with context.
pub(crate) fn format_locations(locations: &QueryResult<Location>, context_lines: usize) -> String {
    if locations.is_empty() {
        return NO_RESULTS.to_string();
    }
    locations
        .iter()
        .map(|loc| format_location(loc, context_lines))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Extracts markdown text from `MarkupContent` or string.
pub(crate) fn extract_hover_text(content: &HoverContents) -> String {
    let marked = |ms: &MarkedString| match ms {
        MarkedString::String(s) => s.clone(),
        MarkedString::LanguageString(ls) => format!("```{}\n{}\n```", ls.language, ls.value),
    };
    match content {
        HoverContents::Scalar(ms) => marked(ms),
        HoverContents::Array(list) => list.iter().map(marked).collect::<Vec<_>>().join("\n\n"),
        HoverContents::Markup(markup) => markup.value.clone(),
    }
}

pub(crate) fn format_hover(hover: &QueryResult<Hover>) -> String {
    let text = hover
        .iter()
        .map(|h| extract_hover_text(&h.contents))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        "No hover information available.".to_string()
    } else {
        text
    }
}

pub(crate) fn format_signature_help(help: &QueryResult<SignatureHelp>) -> String {
    let Some(help) = help.first() else {
        return "No signature help available.".to_string();
    };
    if help.signatures.is_empty() {
        return "No signature help available.".to_string();
    }

    let active = help.active_signature.unwrap_or(0) as usize;
    let mut result = String::new();
    for (idx, signature) in help.signatures.iter().enumerate() {
        let marker = if idx == active { ">" } else { " " };
        let _ = writeln!(result, "{marker} {}", signature.label);
        if let Some(doc) = &signature.documentation {
            let text = match doc {
                lsp_types::Documentation::String(s) => s.clone(),
                lsp_types::Documentation::MarkupContent(m) => m.value.clone(),
            };
            if !text.is_empty() {
                let _ = writeln!(result, "    {}", text.replace('\n', "\n    "));
            }
        }
    }
    if let Some(parameter) = help.active_parameter {
        let _ = writeln!(result, "Active parameter: {parameter}");
    }
    result
}

/// Formats document symbols recursively.
fn format_document_symbols(symbols: &[DocumentSymbol], indent: usize) -> String {
    let mut result = String::new();
    let indent_str = "  ".repeat(indent);

    for symbol in symbols {
        let kind = symbol_kind_to_string(symbol.kind);
        let _ = writeln!(
            result,
            "{}[{}] {} (line {})",
            indent_str, kind, symbol.name, symbol.selection_range.start.line
        );

        if let Some(children) = &symbol.children {
            result.push_str(&format_document_symbols(children, indent + 1));
        }
    }

    result
}

/// Formats flat symbol information.
fn format_symbol_information(symbols: &[SymbolInformation]) -> String {
    let mut result = String::new();
    for symbol in symbols {
        let container = symbol
            .container_name
            .as_ref()
            .map_or_else(String::new, |c| format!(" (in {c})"));
        let _ = writeln!(
            result,
            "[{}] {}{} - {}:{}",
            symbol_kind_to_string(symbol.kind),
            symbol.name,
            container,
            display_uri(&symbol.location.uri),
            symbol.location.range.start.line
        );
    }
    result
}

pub(crate) fn format_document_symbol_response(response: &DocumentSymbolResponse) -> String {
    match response {
        DocumentSymbolResponse::Flat(symbols) if !symbols.is_empty() => {
            format_symbol_information(symbols)
        }
        DocumentSymbolResponse::Nested(symbols) if !symbols.is_empty() => {
            format_document_symbols(symbols, 0)
        }
        _ => "No symbols found in document.".to_string(),
    }
}

fn format_failures(result: &mut String, failures: &[LanguageFailure]) {
    if failures.is_empty() {
        return;
    }
    let _ = writeln!(result, "ERRORS:");
    for (idx, failure) in failures.iter().enumerate() {
        let _ = writeln!(result, "{}. {failure}", idx + 1);
    }
    let _ = writeln!(result);
}

fn language_list(flat_searched: &[crate::language::LanguageId]) -> String {
    flat_searched
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_implementations(
    uri: &str,
    line: u32,
    character: u32,
    flat: &Flattened<Location>,
) -> String {
    let mut result = String::new();
    let _ = writeln!(result, "IMPLEMENTATIONS:");
    let _ = writeln!(result, "Position: {uri}:{line}:{character}");
    let _ = writeln!(result, "Languages searched: [{}]", language_list(&flat.searched));
    let _ = writeln!(result, "Implementations found: {}", flat.values.len());
    if !flat.failures.is_empty() {
        let _ = writeln!(result, "Errors: {}", flat.failures.len());
    }
    if flat.cancelled {
        let _ = writeln!(result, "Search was cancelled before every language answered.");
    }
    let _ = writeln!(result);
    format_failures(&mut result, &flat.failures);

    if flat.values.is_empty() {
        let _ = writeln!(result, "No implementations found.");
        return result;
    }
    for (idx, location) in flat.values.iter().enumerate() {
        let path = display_uri(&location.uri);
        let name = Path::new(&path)
            .file_name()
            .map_or_else(|| path.clone(), |n| n.to_string_lossy().into_owned());
        let _ = writeln!(result, "{}. {name}", idx + 1);
        let _ = writeln!(result, "   URI: {}", location.uri);
        let _ = writeln!(result, "   Range: {}", display_range(&location.range));
        let _ = writeln!(result);
    }
    result
}

pub(crate) fn format_symbol_matches(
    query: &str,
    flat: &Flattened<SymbolMatch>,
    max_results: usize,
) -> String {
    let mut result = String::new();
    if flat.values.is_empty() {
        let _ = writeln!(result, "No symbols found matching '{query}'.");
    } else {
        for symbol in flat.values.iter().take(max_results) {
            let container = symbol
                .container_name
                .as_ref()
                .map_or_else(String::new, |c| format!(" (in {c})"));
            let line = symbol
                .range
                .map_or_else(String::new, |r| format!(":{}", r.start.line));
            let _ = writeln!(
                result,
                "[{}] {}{} - {}{}",
                symbol_kind_to_string(symbol.kind),
                symbol.name,
                container,
                display_uri(&symbol.uri),
                line
            );
        }
        if flat.values.len() > max_results {
            let _ = writeln!(
                result,
                "... {} more (showing {max_results})",
                flat.values.len() - max_results
            );
        }
    }
    let _ = writeln!(result, "\nLanguages searched: [{}]", language_list(&flat.searched));
    if flat.cancelled {
        let _ = writeln!(result, "Search was cancelled before every language answered.");
    }
    if !flat.failures.is_empty() {
        let _ = writeln!(result);
        format_failures(&mut result, &flat.failures);
    }
    result
}

fn format_item(
    result: &mut String,
    index: usize,
    item_name: &str,
    kind: lsp_types::SymbolKind,
    uri: &Url,
    range: &Range,
) {
    let _ = writeln!(result, "{index}. {item_name}");
    let _ = writeln!(result, "   Kind: {}", symbol_kind_to_string(kind));
    let _ = writeln!(result, "   URI: {uri}");
    let _ = writeln!(result, "   Selection Range: {}", display_range(range));
}

fn format_call_item(
    result: &mut String,
    prefix: &str,
    item: &CallHierarchyItem,
    sites: &[Range],
) {
    let _ = writeln!(
        result,
        "   {prefix} [{}] {} - {}:{}",
        symbol_kind_to_string(item.kind),
        item.name,
        display_uri(&item.uri),
        item.selection_range.start.line
    );
    for site in sites {
        let _ = writeln!(
            result,
            "      call site: line {}, character {}",
            site.start.line, site.start.character
        );
    }
}

fn format_entry(result: &mut String, index: usize, entry: &CallHierarchyEntry) {
    let handle = &entry.handle;
    format_item(
        result,
        index,
        handle.name(),
        handle.kind(),
        handle.uri(),
        &handle.selection_range(),
    );
    if let Some(detail) = handle.detail() {
        let _ = writeln!(result, "   Detail: {detail}");
    }

    match &entry.incoming {
        None => {}
        Some(Ok(calls)) if calls.is_empty() => {
            let _ = writeln!(result, "   Incoming calls: none");
        }
        Some(Ok(calls)) => {
            let _ = writeln!(result, "   Incoming calls ({}):", calls.len());
            for call in calls {
                format_call_item(result, "<-", &call.from, &call.from_ranges);
            }
        }
        Some(Err(e)) => {
            let _ = writeln!(result, "   Incoming calls failed: {e}");
        }
    }
    match &entry.outgoing {
        None => {}
        Some(Ok(calls)) if calls.is_empty() => {
            let _ = writeln!(result, "   Outgoing calls: none");
        }
        Some(Ok(calls)) => {
            let _ = writeln!(result, "   Outgoing calls ({}):", calls.len());
            for call in calls {
                format_call_item(result, "->", &call.to, &call.from_ranges);
            }
        }
        Some(Err(e)) => {
            let _ = writeln!(result, "   Outgoing calls failed: {e}");
        }
    }
    let _ = writeln!(result);
}

pub(crate) fn format_call_hierarchy(
    uri: &str,
    line: u32,
    character: u32,
    outcome: &CallHierarchyOutcome,
) -> String {
    match outcome {
        CallHierarchyOutcome::NoItems { language } => format!(
            "No call hierarchy items found on line {line}, character {character} for language {language}"
        ),
        CallHierarchyOutcome::Items { language, entries } => {
            let mut result = String::new();
            let _ = writeln!(result, "=== CALL HIERARCHY ===");
            let _ = writeln!(result, "Position: {uri}:{line}:{character}");
            let _ = writeln!(result, "Language: {language}");
            let _ = writeln!(result, "Items found: {}", entries.len());
            let _ = writeln!(result);
            let _ = writeln!(result, "=== CALL HIERARCHY ITEMS ===");
            for (idx, entry) in entries.iter().enumerate() {
                format_entry(&mut result, idx + 1, entry);
            }
            result
        }
    }
}

fn severity_label(severity: Option<DiagnosticSeverity>) -> &'static str {
    match severity {
        Some(DiagnosticSeverity::ERROR) => "error",
        Some(DiagnosticSeverity::WARNING) => "warning",
        Some(DiagnosticSeverity::INFORMATION) => "information",
        Some(DiagnosticSeverity::HINT) => "hint",
        _ => "unknown",
    }
}

/// Errors first, unknown severities last.
fn severity_rank(severity: Option<DiagnosticSeverity>) -> u8 {
    match severity {
        Some(DiagnosticSeverity::ERROR) => 1,
        Some(DiagnosticSeverity::WARNING) => 2,
        Some(DiagnosticSeverity::INFORMATION) => 3,
        Some(DiagnosticSeverity::HINT) => 4,
        _ => 5,
    }
}

pub(crate) fn format_diagnostics(uri: &str, diagnostics: &[Diagnostic]) -> String {
    let mut result = String::new();
    let _ = writeln!(result, "File: {uri}");
    let _ = writeln!(result, "Diagnostics: {}", diagnostics.len());
    if diagnostics.is_empty() {
        let _ = writeln!(result, "\nNo diagnostics reported.");
        return result;
    }
    let _ = writeln!(result);

    let mut sorted: Vec<&Diagnostic> = diagnostics.iter().collect();
    sorted.sort_by_key(|d| {
        (
            severity_rank(d.severity),
            d.range.start.line,
            d.range.start.character,
        )
    });

    for (idx, diagnostic) in sorted.iter().enumerate() {
        let _ = writeln!(
            result,
            "{}. [{}] {}",
            idx + 1,
            severity_label(diagnostic.severity),
            diagnostic.message
        );
        let _ = writeln!(result, "   Location: {}", display_range(&diagnostic.range));
        if let Some(source) = &diagnostic.source {
            let _ = writeln!(result, "   Source: {source}");
        }
        if let Some(code) = &diagnostic.code {
            let code = match code {
                lsp_types::NumberOrString::Number(n) => n.to_string(),
                lsp_types::NumberOrString::String(s) => s.clone(),
            };
            let _ = writeln!(result, "   Code: {code}");
        }
    }
    result
}

/// Sample diagnostics shown per language.
const DIAGNOSTIC_SAMPLES: usize = 3;

pub(crate) fn format_workspace_diagnostics(flat: &Flattened<LanguageDiagnostics>) -> String {
    let total: usize = flat.values.iter().map(LanguageDiagnostics::count).sum();
    let mut result = String::new();
    let _ = writeln!(result, "WORKSPACE DIAGNOSTICS:");
    let _ = writeln!(result, "Languages searched: [{}]", language_list(&flat.searched));
    let _ = writeln!(result, "Total diagnostics: {total}");
    if !flat.failures.is_empty() {
        let _ = writeln!(result, "Errors: {}", flat.failures.len());
    }
    if flat.cancelled {
        let _ = writeln!(result, "Search was cancelled before every language answered.");
    }
    let _ = writeln!(result);
    format_failures(&mut result, &flat.failures);

    if total == 0 {
        let _ = writeln!(result, "No diagnostics found across all languages.");
        return result;
    }

    let mut by_severity = [0usize; 5];
    for diagnostic in flat
        .values
        .iter()
        .flat_map(|language| &language.files)
        .flat_map(|file| &file.diagnostics)
    {
        by_severity[usize::from(severity_rank(diagnostic.severity)) - 1] += 1;
    }
    let _ = writeln!(result, "SUMMARY BY SEVERITY:");
    let _ = writeln!(result, "  Errors: {}", by_severity[0]);
    let _ = writeln!(result, "  Warnings: {}", by_severity[1]);
    let _ = writeln!(result, "  Information: {}", by_severity[2]);
    let _ = writeln!(result, "  Hints: {}", by_severity[3]);
    if by_severity[4] > 0 {
        let _ = writeln!(result, "  Unknown: {}", by_severity[4]);
    }
    let _ = writeln!(result);

    let _ = writeln!(result, "RESULTS BY LANGUAGE:");
    for (idx, language) in flat.values.iter().enumerate() {
        let count = language.count();
        let _ = writeln!(result, "{}. {}: {count} diagnostics", idx + 1, language.language);
        let samples = language
            .files
            .iter()
            .flat_map(|file| file.diagnostics.iter().map(move |d| (&file.uri, d)));
        for (uri, diagnostic) in samples.take(DIAGNOSTIC_SAMPLES) {
            let _ = writeln!(
                result,
                "   [{}] {}:{} {}",
                severity_label(diagnostic.severity),
                display_uri(uri),
                diagnostic.range.start.line,
                diagnostic.message
            );
        }
        if count > DIAGNOSTIC_SAMPLES {
            let _ = writeln!(result, "   ... and {} more", count - DIAGNOSTIC_SAMPLES);
        }
    }
    result
}

pub(crate) fn format_code_actions(actions: &QueryResult<CodeActionOrCommand>) -> String {
    if actions.is_empty() {
        return "No code actions available.".to_string();
    }
    let mut result = String::new();
    for (idx, action) in actions.iter().enumerate() {
        match action {
            CodeActionOrCommand::Command(command) => {
                let _ = writeln!(result, "{}. {} (command: {})", idx + 1, command.title, command.command);
            }
            CodeActionOrCommand::CodeAction(action) => {
                let kind = action
                    .kind
                    .as_ref()
                    .map_or_else(String::new, |k| format!(" [{}]", k.as_str()));
                let preferred = if action.is_preferred == Some(true) { " (preferred)" } else { "" };
                let _ = writeln!(result, "{}. {}{kind}{preferred}", idx + 1, action.title);
                if let Some(edit) = &action.edit {
                    let _ = writeln!(result, "   Edits: {}", count_edits(edit));
                }
            }
        }
    }
    result
}

fn count_edits(edit: &WorkspaceEdit) -> usize {
    let changes = edit
        .changes
        .as_ref()
        .map_or(0, |c| c.values().map(Vec::len).sum());
    let document_changes = match &edit.document_changes {
        None => 0,
        Some(lsp_types::DocumentChanges::Edits(edits)) => edits.iter().map(|e| e.edits.len()).sum(),
        Some(lsp_types::DocumentChanges::Operations(ops)) => ops
            .iter()
            .map(|op| match op {
                lsp_types::DocumentChangeOperation::Edit(e) => e.edits.len(),
                lsp_types::DocumentChangeOperation::Op(_) => 1,
            })
            .sum(),
    };
    changes + document_changes
}

fn format_edit_summary(result: &mut String, summary: &EditSummary) {
    let _ = writeln!(
        result,
        "Applied {} text edits and {} file operations.",
        summary.text_edits, summary.resource_operations
    );
    for path in &summary.changed_files {
        let _ = writeln!(result, "  modified: {}", path.display());
    }
}

fn format_text_edits(result: &mut String, edits: &[TextEdit]) {
    for edit in edits {
        let _ = writeln!(
            result,
            "  {} -> {:?}",
            display_range(&edit.range),
            edit.new_text
        );
    }
}

pub(crate) fn format_rename(new_name: &str, outcome: &RenameOutcome) -> String {
    let Some(edit) = &outcome.edit else {
        return "No rename possible at this position.".to_string();
    };

    let mut result = String::new();
    if let Some(summary) = &outcome.applied {
        let _ = writeln!(result, "Renamed to '{new_name}'.");
        format_edit_summary(&mut result, summary);
        return result;
    }

    let _ = writeln!(result, "Rename preview to '{new_name}' ({} edits):", count_edits(edit));
    if let Some(changes) = &edit.changes {
        let mut uris: Vec<_> = changes.keys().collect();
        uris.sort();
        for uri in uris {
            let _ = writeln!(result, "{}:", display_uri(uri));
            format_text_edits(&mut result, &changes[uri]);
        }
    }
    if let Some(lsp_types::DocumentChanges::Edits(edits)) = &edit.document_changes {
        for doc in edits {
            let _ = writeln!(result, "{}:", display_uri(&doc.text_document.uri));
            let plain: Vec<TextEdit> = doc
                .edits
                .iter()
                .map(|e| match e {
                    lsp_types::OneOf::Left(e) => e.clone(),
                    lsp_types::OneOf::Right(a) => a.text_edit.clone(),
                })
                .collect();
            format_text_edits(&mut result, &plain);
        }
    }
    let _ = writeln!(result, "\nCall again with apply=true to write these changes.");
    result
}

pub(crate) fn format_formatting(uri: &str, outcome: &FormatOutcome) -> String {
    if outcome.edits.is_empty() {
        return format!("{uri} is already formatted.");
    }
    let mut result = String::new();
    if outcome.applied {
        let _ = writeln!(result, "Formatted {uri} ({} edits applied).", outcome.edits.len());
    } else {
        let _ = writeln!(result, "Formatting preview for {uri} ({} edits):", outcome.edits.len());
        format_text_edits(&mut result, &outcome.edits);
        let _ = writeln!(result, "\nCall again with apply=true to write these changes.");
    }
    result
}

pub(crate) fn format_semantic_tokens(tokens: &[TokenSpan], content: Option<&str>) -> String {
    if tokens.is_empty() {
        return "No semantic tokens found.".to_string();
    }
    let lines: Vec<&str> = content.map(|c| c.lines().collect()).unwrap_or_default();
    let text_of = |token: &TokenSpan| -> Option<String> {
        let line = lines.get(token.range.start.line as usize)?;
        let units: Vec<u16> = line.encode_utf16().collect();
        let start = token.range.start.character as usize;
        let end = (token.range.end.character as usize).min(units.len());
        units.get(start..end).map(String::from_utf16_lossy)
    };

    let mut types: Vec<&str> = tokens.iter().map(|t| t.token_type.as_str()).collect();
    types.sort_unstable();
    types.dedup();

    let mut result = String::new();
    for token_type in types {
        let _ = writeln!(result, "{token_type} tokens:");
        for token in tokens.iter().filter(|t| t.token_type == token_type) {
            let text = text_of(token).unwrap_or_default();
            let modifiers = if token.modifiers.is_empty() {
                String::new()
            } else {
                format!(" [{}]", token.modifiers.join(", "))
            };
            let _ = writeln!(
                result,
                "  - '{text}' at {}:{}{modifiers}",
                token.range.start.line, token.range.start.character
            );
        }
    }
    result
}

pub(crate) fn format_analysis(analysis: &CodeAnalysis) -> String {
    let mut result = analysis.summary();
    if let Some(items) = analysis.completion.as_ref().ok().filter(|i| !i.is_empty()) {
        let _ = write!(result, "\n\nTop completions: {}", format_completion_preview(items));
    }
    if let Some(hover) = analysis.hover.as_ref().ok().filter(|h| !h.is_empty()) {
        let _ = write!(result, "\n\nHover:\n{}", format_hover(hover));
    }
    let errors = analysis.errors();
    if !errors.is_empty() {
        result.push_str("\n\nErrors:");
        for (part, error) in errors {
            let _ = write!(result, "\n- {part}: {error}");
        }
    }
    result
}

fn format_completion_preview(items: &QueryResult<CompletionItem>) -> String {
    items
        .iter()
        .take(10)
        .map(|i| i.label.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_snapshot(result: &mut String, snapshot: &ConnectionSnapshot) {
    let _ = writeln!(result, "- {} ({})", snapshot.language, snapshot.command);
    let _ = writeln!(result, "    state: {}", snapshot.state);
    let _ = writeln!(result, "    requests: {}", snapshot.requests);
    if snapshot.restart_failures > 0 {
        let _ = writeln!(result, "    restart failures: {}", snapshot.restart_failures);
    }
    if let Some(at) = snapshot
        .last_initialized
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
    {
        let _ = writeln!(result, "    initialized at: {} (unix seconds)", at.as_secs());
    }
    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(result, "    last error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::{CallHierarchyIncomingCall, MarkupContent, MarkupKind, Position, SymbolKind};

    use super::*;
    use crate::error::BridgeError;
    use crate::language::LanguageId;

    fn location(path: &str, line: u32) -> Location {
        Location {
            uri: Url::parse(&format!("file://{path}")).unwrap(),
            range: Range::new(Position::new(line, 2), Position::new(line, 8)),
        }
    }

    #[test]
    fn test_read_context_lines_marks_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "package main\n\nfunc main() {\n}\n").unwrap();
        let context = read_context_lines(&file, 2, 1).unwrap();
        assert_eq!(context, "     1 | \n>    2 | func main() {\n     3 | }\n");
    }

    #[test]
    fn test_hover_text() {
        let hover = QueryResult::Single(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: "```go\nfunc Serve()\n```".to_string(),
            }),
            range: None,
        });
        assert!(format_hover(&hover).contains("func Serve()"));
        assert_eq!(
            format_hover(&QueryResult::NoResult),
            "No hover information available."
        );
    }

    #[test]
    fn test_format_locations_empty() {
        assert_eq!(format_locations(&QueryResult::NoResult, 2), NO_RESULTS);
    }

    #[test]
    fn test_format_implementations_lists_errors_and_results() {
        let flat = Flattened {
            values: vec![location("/w/server.go", 10), location("/w/client.go", 3)],
            searched: vec![LanguageId::from("go")],
            failures: vec![LanguageFailure::new(
                LanguageId::from("typescript"),
                BridgeError::ConnectionInitializationFailed {
                    language: LanguageId::from("typescript"),
                    reason: "spawn failed".into(),
                },
            )],
            cancelled: false,
        };
        let text = format_implementations("file:///w/api.go", 4, 5, &flat);
        assert!(text.starts_with("IMPLEMENTATIONS:\n"));
        assert!(text.contains("Languages searched: [go]"));
        assert!(text.contains("Implementations found: 2"));
        assert!(text.contains("Errors: 1"));
        assert!(text.contains("typescript"));
        assert!(text.contains("1. server.go"));
        assert!(text.contains("Range: 10:2-10:8"));
    }

    #[test]
    fn test_format_symbol_matches_reports_cancellation() {
        let flat = Flattened {
            values: vec![SymbolMatch {
                name: "Server".into(),
                kind: SymbolKind::STRUCT,
                container_name: None,
                uri: Url::parse("file:///w/server.go").unwrap(),
                range: Some(Range::new(Position::new(7, 5), Position::new(7, 11))),
            }],
            searched: vec![LanguageId::from("go")],
            failures: vec![LanguageFailure::new(
                LanguageId::from("typescript"),
                BridgeError::Cancelled,
            )],
            cancelled: true,
        };
        let text = format_symbol_matches("Server", &flat, 10);
        assert!(text.contains("[struct] Server - /w/server.go:7"), "got: {text}");
        assert!(text.contains("Search was cancelled"), "got: {text}");
        assert!(text.contains("ERRORS:"), "got: {text}");

        let complete = Flattened {
            cancelled: false,
            failures: Vec::new(),
            ..flat
        };
        assert!(!format_symbol_matches("Server", &complete, 10).contains("cancelled"));
    }

    #[test]
    fn test_format_workspace_diagnostics() {
        use crate::lsp::types::FileDiagnostics;

        let diagnostic = |line, severity, message: &str| Diagnostic {
            severity: Some(severity),
            ..Diagnostic::new_simple(
                Range::new(Position::new(line, 0), Position::new(line, 4)),
                message.to_string(),
            )
        };
        let go = LanguageDiagnostics {
            language: LanguageId::from("go"),
            files: vec![FileDiagnostics {
                uri: Url::parse("file:///w/main.go").unwrap(),
                diagnostics: vec![
                    diagnostic(3, DiagnosticSeverity::ERROR, "undefined: x"),
                    diagnostic(5, DiagnosticSeverity::WARNING, "unused variable"),
                    diagnostic(6, DiagnosticSeverity::WARNING, "unused import"),
                    diagnostic(9, DiagnosticSeverity::HINT, "simplify"),
                ],
            }],
        };
        let flat = Flattened {
            values: vec![go],
            searched: vec![LanguageId::from("go")],
            failures: vec![LanguageFailure::new(
                LanguageId::from("typescript"),
                BridgeError::ConnectionInitializationFailed {
                    language: LanguageId::from("typescript"),
                    reason: "spawn failed".into(),
                },
            )],
            cancelled: false,
        };

        let text = format_workspace_diagnostics(&flat);
        assert!(text.starts_with("WORKSPACE DIAGNOSTICS:"), "got: {text}");
        assert!(text.contains("Total diagnostics: 4"), "got: {text}");
        assert!(text.contains("Errors: 1\n"), "got: {text}");
        assert!(text.contains("  Warnings: 2"), "got: {text}");
        assert!(text.contains("  Hints: 1"), "got: {text}");
        assert!(text.contains("1. go: 4 diagnostics"), "got: {text}");
        assert!(text.contains("   [error] /w/main.go:3 undefined: x"), "got: {text}");
        assert!(text.contains("   ... and 1 more"), "got: {text}");
        assert!(!text.contains("simplify"), "only three samples: {text}");

        let empty = Flattened {
            values: Vec::new(),
            searched: vec![LanguageId::from("go")],
            failures: Vec::new(),
            cancelled: false,
        };
        assert!(
            format_workspace_diagnostics(&empty)
                .contains("No diagnostics found across all languages.")
        );
    }

    #[test]
    fn test_format_call_hierarchy_no_items() {
        let text = format_call_hierarchy(
            "main.rs",
            3,
            4,
            &CallHierarchyOutcome::NoItems {
                language: LanguageId::from("rust"),
            },
        );
        assert_eq!(
            text,
            "No call hierarchy items found on line 3, character 4 for language rust"
        );
    }

    #[test]
    fn test_format_call_item() {
        let call = CallHierarchyIncomingCall {
            from: CallHierarchyItem {
                name: "handle".into(),
                kind: SymbolKind::FUNCTION,
                tags: None,
                detail: None,
                uri: Url::parse("file:///w/main.go").unwrap(),
                range: Range::default(),
                selection_range: Range::new(Position::new(7, 5), Position::new(7, 11)),
                data: None,
            },
            from_ranges: vec![Range::new(Position::new(9, 1), Position::new(9, 4))],
        };
        let mut out = String::new();
        format_call_item(&mut out, "<-", &call.from, &call.from_ranges);
        assert!(out.contains("<- [Function] handle - /w/main.go:7"));
        assert!(out.contains("call site: line 9, character 1"));
    }

    #[test]
    fn test_format_diagnostics_sorted_by_severity() {
        let diag = |severity, line, message: &str| Diagnostic {
            range: Range::new(Position::new(line, 0), Position::new(line, 1)),
            severity: Some(severity),
            message: message.to_string(),
            ..Default::default()
        };
        let text = format_diagnostics(
            "a.py",
            &[
                diag(DiagnosticSeverity::WARNING, 1, "unused"),
                diag(DiagnosticSeverity::ERROR, 5, "undefined name"),
            ],
        );
        let error_at = text.find("undefined name").unwrap();
        let warning_at = text.find("unused").unwrap();
        assert!(error_at < warning_at);
        assert!(text.contains("Diagnostics: 2"));
    }

    #[test]
    fn test_format_semantic_tokens_groups_by_type() {
        let span = |token_type: &str, line, start, end| TokenSpan {
            token_type: token_type.to_string(),
            modifiers: Vec::new(),
            range: Range::new(Position::new(line, start), Position::new(line, end)),
        };
        let text = format_semantic_tokens(
            &[span("variable", 0, 4, 5), span("function", 0, 8, 11)],
            Some("let x = foo();"),
        );
        assert_eq!(
            text,
            "function tokens:\n  - 'foo' at 0:8\nvariable tokens:\n  - 'x' at 0:4\n"
        );
    }
}
