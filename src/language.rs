//! Language identification for files and projects.
//!
//! The bridge routes every request by [`LanguageId`]. Single-file operations
//! ask a [`LanguageDetector`] for the language of one path; cross-language
//! operations ask for every language present in the workspace, primary first.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use ignore::WalkBuilder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};

/// Identifier of a language, e.g. `rust` or `typescript`.
///
/// Ordering is lexicographic, which gives fan-out results a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageId(String);

impl LanguageId {
    /// Creates a language id, normalized to lowercase.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<LanguageId> for String {
    fn from(id: LanguageId) -> Self {
        id.0
    }
}

impl From<&str> for LanguageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for LanguageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Which detected project languages an operation should target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectLanguageMode {
    /// Every detected language.
    #[default]
    All,
    /// Only the highest scoring language.
    Primary,
}

impl ProjectLanguageMode {
    /// Narrows a detected language list (primary first) according to the mode.
    pub fn select(self, mut languages: Vec<LanguageId>) -> Vec<LanguageId> {
        if self == Self::Primary {
            languages.truncate(1);
        }
        languages
    }
}

/// Resolves languages for files and projects.
pub trait LanguageDetector: Send + Sync {
    /// Returns the language of a single file.
    /// ## Errors
    /// `BridgeError::LanguageInferenceFailed` when the file is not recognized.
    fn infer_language(&self, path: &Path) -> BridgeResult<LanguageId>;

    /// Returns every language present under `root`, primary first.
    /// ## Errors
    /// `BridgeError::LanguageInferenceFailed` when no language is recognized.
    fn detect_project_languages(&self, root: &Path) -> BridgeResult<Vec<LanguageId>>;
}

/// Files whose presence at the project root strongly suggests a language.
const ROOT_MARKERS: &[(&str, &str)] = &[
    ("go.mod", "go"),
    ("go.sum", "go"),
    ("package.json", "typescript"),
    ("yarn.lock", "typescript"),
    ("package-lock.json", "typescript"),
    ("tsconfig.json", "typescript"),
    ("Cargo.toml", "rust"),
    ("Cargo.lock", "rust"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("requirements.txt", "python"),
    ("Pipfile", "python"),
    ("poetry.lock", "python"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("Gemfile", "ruby"),
    ("composer.json", "php"),
    ("CMakeLists.txt", "cpp"),
    ("Makefile", "c"),
];

const ROOT_MARKER_SCORE: usize = 100;

/// Build output and dependency directories, skipped even when not gitignored.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "build", "dist"];

/// Directory levels below the root scanned for source files.
const MAX_SCAN_DEPTH: usize = 8;

/// Files inspected before scoring stops.
const MAX_SCANNED_FILES: usize = 20_000;

/// Detector driven by the configured extension map and well-known project
/// root markers.
#[derive(Debug, Clone, Default)]
pub struct ConfigLanguageDetector {
    /// Extension (lowercase, without the leading dot) to language.
    extensions: HashMap<String, LanguageId>,
}

impl ConfigLanguageDetector {
    /// Creates a detector from an extension map. Keys may carry a leading dot.
    pub fn new(extensions: impl IntoIterator<Item = (String, LanguageId)>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|(ext, lang)| (normalize_extension(&ext), lang))
            .collect();
        Self { extensions }
    }

    fn language_for(&self, path: &Path) -> Option<&LanguageId> {
        let ext = path.extension()?.to_str()?;
        self.extensions.get(&normalize_extension(ext))
    }

    /// Counts files per language, honoring `.gitignore` and skipping hidden
    /// entries and [`SKIPPED_DIRS`].
    fn score_files(&self, root: &Path, scores: &mut HashMap<LanguageId, usize>) {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .parents(false)
            .follow_links(false)
            .max_depth(Some(MAX_SCAN_DEPTH))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                entry.depth() == 0
                    || !is_dir
                    || !SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
            })
            .build();

        let mut scanned = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            scanned += 1;
            if scanned > MAX_SCANNED_FILES {
                debug!(root = %root.display(), "file limit reached, scoring what was scanned");
                break;
            }
            if let Some(language) = self.language_for(entry.path()) {
                *scores.entry(language.clone()).or_default() += 1;
            }
        }
    }
}

impl LanguageDetector for ConfigLanguageDetector {
    fn infer_language(&self, path: &Path) -> BridgeResult<LanguageId> {
        self.language_for(path).cloned().ok_or_else(|| {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or_else(|| "<none>".to_string(), |e| format!(".{e}"));
            BridgeError::LanguageInferenceFailed(format!(
                "no language configured for extension {ext} ({})",
                path.display()
            ))
        })
    }

    fn detect_project_languages(&self, root: &Path) -> BridgeResult<Vec<LanguageId>> {
        if !root.is_dir() {
            return Err(BridgeError::LanguageInferenceFailed(format!(
                "project directory does not exist: {}",
                root.display()
            )));
        }

        let mut scores: HashMap<LanguageId, usize> = HashMap::new();
        for (marker, language) in ROOT_MARKERS {
            if root.join(marker).exists() {
                *scores.entry(LanguageId::from(*language)).or_default() += ROOT_MARKER_SCORE;
            }
        }
        self.score_files(root, &mut scores);

        let mut ranked: Vec<(LanguageId, usize)> = scores.into_iter().collect();
        ranked.sort_by(|(a_lang, a_score), (b_lang, b_score)| {
            b_score.cmp(a_score).then_with(|| a_lang.cmp(b_lang))
        });
        debug!(root = %root.display(), ?ranked, "scored project languages");

        if ranked.is_empty() {
            return Err(BridgeError::LanguageInferenceFailed(format!(
                "no recognizable project languages found in {}",
                root.display()
            )));
        }
        Ok(ranked.into_iter().map(|(lang, _)| lang).collect())
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}
