use std::path::PathBuf;
use std::sync::Arc;

use lsp_types::Position;
use polyglot_runes::bridge::Bridge;
use polyglot_runes::config::BridgeConfig;
use polyglot_runes::language::ConfigLanguageDetector;
use polyglot_runes::pool::ClientPool;
use tempfile::TempDir;

use super::mock::MockFactory;

/// Represents a test fixture with files and a cursor position.
#[derive(Debug)]
pub struct Fixture {
    /// files in fixture
    pub files: Vec<(PathBuf, String)>,
    /// Position of cursor in fixture, 0-based, if the fixture has one
    pub cursor: Option<(PathBuf, Position)>,
}

/// Parses a fixture into file contents and relative paths.
///
/// Files start with a `//- /path` line; `$0` marks the cursor.
/// ## Panics
/// if a cursor appears before the first file header
pub fn parse_fixture(input: &str) -> Fixture {
    let mut files = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_content = String::new();
    let mut cursor = None;

    for line in input.lines() {
        if let Some(path) = line.strip_prefix("//- ") {
            let previous = std::mem::take(&mut current_content);
            if let Some(p) = current_path.take() {
                files.push((p, previous));
            }
            current_path = Some(PathBuf::from(path.trim().trim_start_matches('/')));
        } else {
            let mut l = line.to_string();
            if let Some(idx) = l.find("$0") {
                let line_no =
                    u32::try_from(current_content.lines().count()).expect("line count out of range");
                let character = u32::try_from(l[..idx].encode_utf16().count())
                    .expect("line index out of range");
                let path = current_path.clone().expect("cursor outside of a file");
                cursor = Some((path, Position::new(line_no, character)));
                l = l.replace("$0", "");
            }
            current_content.push_str(&l);
            current_content.push('\n');
        }
    }

    if let Some(p) = current_path {
        files.push((p, current_content));
    }

    Fixture { files, cursor }
}

/// Bridge configuration with restarts fast enough for tests.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.global.restart_delay_ms = 10;
    config.global.max_restart_attempts = 3;
    config
}

/// Files on disk plus helpers to build a bridge over them.
pub struct TestWorkspace {
    /// Temporary folder for the workspace
    pub root: TempDir,
    /// fixture for the workspace
    pub fixture: Fixture,
    /// Canonicalized root path (resolves symlinks like /var -> /private/var on macOS)
    canonical_root: PathBuf,
}

impl TestWorkspace {
    /// Writes the fixture into a fresh temporary directory.
    /// ## Panics
    pub fn new(fixture: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let fixture = parse_fixture(fixture);

        for (path, content) in &fixture.files {
            let abs = root.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }

        let canonical_root = root
            .path()
            .canonicalize()
            .expect("Failed to canonicalize root");

        Self {
            root,
            fixture,
            canonical_root,
        }
    }

    /// Returns the canonicalized root path
    pub fn canonical_root(&self) -> &PathBuf {
        &self.canonical_root
    }

    /// Converts a relative path to an absolute path
    pub fn apath(&self, path: &str) -> PathBuf {
        self.canonical_root.join(path)
    }

    /// Absolute path and position of the `$0` marker.
    /// ## Panics
    /// if the fixture has no cursor
    pub fn cursor(&self) -> (PathBuf, Position) {
        let (path, position) = self.fixture.cursor.clone().expect("missing $0 cursor");
        (self.canonical_root.join(path), position)
    }

    /// Builds a bridge over this workspace with the default test config.
    pub fn bridge(&self, factory: MockFactory) -> Arc<Bridge> {
        self.bridge_with(factory, test_config())
    }

    /// Builds a bridge over this workspace.
    pub fn bridge_with(&self, factory: MockFactory, config: BridgeConfig) -> Arc<Bridge> {
        let config = Arc::new(config);
        let detector = Arc::new(ConfigLanguageDetector::new(config.extension_map()));
        let pool = Arc::new(ClientPool::new(config, Arc::new(factory)));
        Arc::new(Bridge::new(pool, detector, self.canonical_root.clone()))
    }
}
