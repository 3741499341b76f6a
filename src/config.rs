//! Bridge configuration.
//!
//! The configuration is a JSON document describing one language server per
//! language, an optional explicit extension map, and process-wide restart and
//! timeout settings. Every section is optional; missing values fall back to
//! the built-in defaults.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::language::LanguageId;
use crate::pool::restart::RestartPolicy;

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Consecutive failures a connection tolerates before it is closed.
    pub max_restart_attempts: u32,
    /// Wait between a failure and the next initialization attempt.
    pub restart_delay_ms: u64,
    /// Timeout for spawn plus `initialize`.
    pub init_timeout_ms: u64,
    /// Timeout for a single request.
    pub request_timeout_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_restart_attempts: 3,
            restart_delay_ms: 2000,
            init_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Launch configuration for one language server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions handled by this server, with or without a leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Server specific `initializationOptions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<serde_json::Value>,
}

impl ServerConfig {
    fn new(command: &str, args: &[&str], extensions: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            extensions: extensions.iter().map(ToString::to_string).collect(),
            initialization_options: None,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Process-wide settings.
    pub global: GlobalConfig,
    /// Language id to server launch configuration.
    pub language_servers: BTreeMap<LanguageId, ServerConfig>,
    /// Extra extension to language mappings, applied after the servers' own
    /// extension lists.
    pub extension_language_map: BTreeMap<String, LanguageId>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let language_servers = [
            ("rust", ServerConfig::new("rust-analyzer", &[], &[".rs"])),
            ("go", ServerConfig::new("gopls", &[], &[".go"])),
            (
                "typescript",
                ServerConfig::new(
                    "typescript-language-server",
                    &["--stdio"],
                    &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"],
                ),
            ),
            (
                "python",
                ServerConfig::new("pyright-langserver", &["--stdio"], &[".py", ".pyi"]),
            ),
        ]
        .into_iter()
        .map(|(lang, server)| (LanguageId::from(lang), server))
        .collect();

        Self {
            global: GlobalConfig::default(),
            language_servers,
            extension_language_map: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Loads a configuration file.
    ///
    /// ## Errors
    /// Returns `Error::Config` when the file cannot be read or parsed, or when
    /// the parsed configuration is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parses a configuration from JSON text.
    ///
    /// ## Errors
    /// Returns `Error::Config` on invalid JSON or an invalid configuration.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// ## Errors
    /// Returns `Error::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        for (language, server) in &self.language_servers {
            if server.command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "language server for '{language}' has an empty command"
                )));
            }
        }
        for (ext, language) in &self.extension_language_map {
            if !self.language_servers.contains_key(language) {
                return Err(Error::Config(format!(
                    "extension '{ext}' maps to '{language}', which has no language server"
                )));
            }
        }
        Ok(())
    }

    /// Writes the configuration as pretty JSON, replacing `path` atomically.
    ///
    /// ## Errors
    /// Returns an error if serialization or file I/O fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize configuration: {e}")))?;
        let temp_file = path.with_extension("tmp");
        fs::write(&temp_file, json)?;
        fs::rename(&temp_file, path)?;
        Ok(())
    }

    /// Returns the launch configuration for a language.
    pub fn server(&self, language: &LanguageId) -> Option<&ServerConfig> {
        self.language_servers.get(language)
    }

    /// Extension to language map: every server's extensions, overridden by
    /// `extension_language_map`.
    pub fn extension_map(&self) -> HashMap<String, LanguageId> {
        let mut map = HashMap::new();
        for (language, server) in &self.language_servers {
            for ext in &server.extensions {
                map.insert(ext.clone(), language.clone());
            }
        }
        for (ext, language) in &self.extension_language_map {
            map.insert(ext.clone(), language.clone());
        }
        map
    }

    /// Restart policy built from the global settings.
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::new(
            self.global.max_restart_attempts,
            Duration::from_millis(self.global.restart_delay_ms),
        )
    }

    /// Timeout for spawning and initializing a server.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.global.init_timeout_ms)
    }

    /// Timeout for a single request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.global.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.global.max_restart_attempts, 3);
        assert_eq!(config.restart_policy().delay(), Duration::from_secs(2));
        assert_eq!(
            config.server(&LanguageId::from("go")).map(|s| s.command.as_str()),
            Some("gopls")
        );
        assert_eq!(
            config.extension_map().get(".tsx"),
            Some(&LanguageId::from("typescript"))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BridgeConfig::from_json(
            r#"{
                "global": { "max_restart_attempts": 5 },
                "language_servers": {
                    "Go": { "command": "gopls", "args": ["serve"], "extensions": [".go"] }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.global.max_restart_attempts, 5);
        assert_eq!(config.global.restart_delay_ms, 2000);
        assert_eq!(config.language_servers.len(), 1);
        let go = config.server(&LanguageId::from("go")).unwrap();
        assert_eq!(go.args, vec!["serve"]);
        assert!(go.initialization_options.is_none());
    }

    #[test]
    fn test_extension_override() {
        let config = BridgeConfig::from_json(
            r#"{
                "language_servers": {
                    "c": { "command": "clangd", "extensions": [".c", ".h"] },
                    "cpp": { "command": "clangd", "extensions": [".cpp"] }
                },
                "extension_language_map": { ".h": "cpp" }
            }"#,
        )
        .unwrap();
        let map = config.extension_map();
        assert_eq!(map.get(".h"), Some(&LanguageId::from("cpp")));
        assert_eq!(map.get(".c"), Some(&LanguageId::from("c")));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BridgeConfig::from_json(r#"{"language_servers": {"go": {"command": " "}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));

        let err =
            BridgeConfig::from_json(r#"{"extension_language_map": {".zig": "zig"}}"#).unwrap_err();
        assert!(err.to_string().contains("no language server"));

        assert!(BridgeConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        let config = BridgeConfig::default();
        config.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    }
}
