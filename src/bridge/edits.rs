//! Applying LSP edits to files on disk.
//!
//! Positions are LSP positions: 0-based lines and UTF-16 code unit columns.
//! Every touched path must live under the workspace root.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, Position, ResourceOp, TextDocumentEdit,
    TextEdit, Url, WorkspaceEdit,
};
use serde::Serialize;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};

/// What applying a [`WorkspaceEdit`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditSummary {
    /// Files whose content was rewritten, sorted.
    pub changed_files: Vec<PathBuf>,
    pub text_edits: usize,
    /// Create, rename and delete operations executed.
    pub resource_operations: usize,
}

/// Byte offset of an LSP position in `content`.
///
/// Columns past the end of a line clamp to the line end; lines past the end
/// of the document clamp to the document end.
pub fn offset_at(content: &str, position: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..position.line {
        match content[line_start..].find('\n') {
            Some(i) => line_start += i + 1,
            None => return content.len(),
        }
    }

    let line_end = content[line_start..]
        .find('\n')
        .map_or(content.len(), |i| line_start + i);
    let line = &content[line_start..line_end];
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut column = 0;
    for (idx, ch) in line.char_indices() {
        if column >= position.character {
            return line_start + idx;
        }
        column += u32::try_from(ch.len_utf16()).unwrap_or(2);
    }
    line_start + line.len()
}

/// Applies text edits to a document.
///
/// Edits are applied from the last start position to the first, so earlier
/// offsets stay valid. Inserts at the same position keep their array order.
/// ## Errors
/// `EditFailed` when two edits overlap.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> BridgeResult<String> {
    let mut spans: Vec<(usize, usize, usize)> = edits
        .iter()
        .enumerate()
        .map(|(idx, edit)| {
            let start = offset_at(content, edit.range.start);
            let end = offset_at(content, edit.range.end).max(start);
            (start, end, idx)
        })
        .collect();
    spans.sort_by(|a, b| b.0.cmp(&a.0).then(b.2.cmp(&a.2)));

    let mut result = content.to_string();
    let mut limit = content.len();
    for (start, end, idx) in spans {
        if end > limit {
            return Err(BridgeError::EditFailed(format!(
                "edit {idx} overlaps a later edit"
            )));
        }
        result.replace_range(start..end, &edits[idx].new_text);
        limit = start;
    }
    Ok(result)
}

/// Applies a workspace edit under `root`.
///
/// `document_changes` wins over `changes` when both are present.
/// ## Errors
/// `EditFailed` on paths outside `root`, I/O failures and overlapping edits.
/// Operations before the failing one stay applied.
pub fn apply_workspace_edit(root: &Path, edit: &WorkspaceEdit) -> BridgeResult<EditSummary> {
    let mut changed = BTreeSet::new();
    let mut summary = EditSummary::default();

    if let Some(document_changes) = &edit.document_changes {
        match document_changes {
            DocumentChanges::Edits(edits) => {
                for edit in edits {
                    apply_document_edit(root, edit, &mut changed, &mut summary)?;
                }
            }
            DocumentChanges::Operations(operations) => {
                for operation in operations {
                    match operation {
                        DocumentChangeOperation::Edit(edit) => {
                            apply_document_edit(root, edit, &mut changed, &mut summary)?;
                        }
                        DocumentChangeOperation::Op(op) => {
                            apply_resource_op(root, op)?;
                            summary.resource_operations += 1;
                        }
                    }
                }
            }
        }
    } else if let Some(changes) = &edit.changes {
        let mut uris: Vec<&Url> = changes.keys().collect();
        uris.sort();
        for uri in uris {
            let path = workspace_path(root, uri)?;
            let edits = &changes[uri];
            apply_file_edits(&path, edits)?;
            summary.text_edits += edits.len();
            changed.insert(path);
        }
    }

    summary.changed_files = changed.into_iter().collect();
    Ok(summary)
}

fn apply_document_edit(
    root: &Path,
    edit: &TextDocumentEdit,
    changed: &mut BTreeSet<PathBuf>,
    summary: &mut EditSummary,
) -> BridgeResult<()> {
    let path = workspace_path(root, &edit.text_document.uri)?;
    let edits: Vec<TextEdit> = edit
        .edits
        .iter()
        .map(|e| match e {
            OneOf::Left(edit) => edit.clone(),
            OneOf::Right(annotated) => annotated.text_edit.clone(),
        })
        .collect();
    apply_file_edits(&path, &edits)?;
    summary.text_edits += edits.len();
    changed.insert(path);
    Ok(())
}

fn apply_file_edits(path: &Path, edits: &[TextEdit]) -> BridgeResult<()> {
    let content = fs::read_to_string(path).map_err(|e| io_failure("read", path, &e))?;
    let updated = apply_text_edits(&content, edits)?;
    if updated != content {
        fs::write(path, updated).map_err(|e| io_failure("write", path, &e))?;
    }
    debug!(path = %path.display(), edits = edits.len(), "applied text edits");
    Ok(())
}

fn apply_resource_op(root: &Path, op: &ResourceOp) -> BridgeResult<()> {
    match op {
        ResourceOp::Create(create) => {
            let path = workspace_path(root, &create.uri)?;
            let options = create.options.as_ref();
            if path.exists() {
                let overwrite = options.and_then(|o| o.overwrite).unwrap_or(false);
                let ignore = options.and_then(|o| o.ignore_if_exists).unwrap_or(false);
                if ignore || !overwrite {
                    return if ignore {
                        Ok(())
                    } else {
                        Err(BridgeError::EditFailed(format!(
                            "file already exists: {}",
                            path.display()
                        )))
                    };
                }
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_failure("create", parent, &e))?;
            }
            fs::write(&path, "").map_err(|e| io_failure("create", &path, &e))
        }
        ResourceOp::Rename(rename) => {
            let from = workspace_path(root, &rename.old_uri)?;
            let to = workspace_path(root, &rename.new_uri)?;
            let options = rename.options.as_ref();
            if to.exists() {
                if options.and_then(|o| o.ignore_if_exists).unwrap_or(false) {
                    return Ok(());
                }
                if !options.and_then(|o| o.overwrite).unwrap_or(false) {
                    return Err(BridgeError::EditFailed(format!(
                        "rename target already exists: {}",
                        to.display()
                    )));
                }
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| io_failure("create", parent, &e))?;
            }
            fs::rename(&from, &to).map_err(|e| io_failure("rename", &from, &e))
        }
        ResourceOp::Delete(delete) => {
            let path = workspace_path(root, &delete.uri)?;
            let options = delete.options.as_ref();
            if !path.exists() {
                return if options.and_then(|o| o.ignore_if_not_exists).unwrap_or(false) {
                    Ok(())
                } else {
                    Err(BridgeError::EditFailed(format!(
                        "file to delete does not exist: {}",
                        path.display()
                    )))
                };
            }
            if path.is_dir() {
                if options.and_then(|o| o.recursive).unwrap_or(false) {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_dir(&path)
                }
            } else {
                fs::remove_file(&path)
            }
            .map_err(|e| io_failure("delete", &path, &e))
        }
    }
}

/// Resolves a `file://` URI to a path that must stay under `root`.
fn workspace_path(root: &Path, uri: &Url) -> BridgeResult<PathBuf> {
    let path = uri
        .to_file_path()
        .map_err(|()| BridgeError::EditFailed(format!("not a file URI: {uri}")))?;
    if !is_within(root, &path) {
        return Err(BridgeError::EditFailed(format!(
            "refusing to edit outside the workspace: {}",
            path.display()
        )));
    }
    Ok(path)
}

/// Whether `path` lies under `root`.
///
/// `..` components are rejected outright. Symlinks are resolved when both
/// paths exist, so a link pointing out of the workspace does not count.
pub(crate) fn is_within(root: &Path, path: &Path) -> bool {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    resolve_existing(path).starts_with(root)
}

/// Canonical form of `path`, or of its parent when the file does not exist yet.
fn resolve_existing(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent().map(Path::canonicalize), path.file_name()) {
        (Some(Ok(parent)), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

fn io_failure(action: &str, path: &Path, err: &std::io::Error) -> BridgeError {
    BridgeError::EditFailed(format!("failed to {action} {}: {err}", path.display()))
}
