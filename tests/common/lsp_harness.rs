use std::path::Path;
use std::time::Duration;

use polyglot_runes::lsp::LspClient;

/// Helper to find rust-analyzer executable
pub fn find_rust_analyzer() -> Option<String> {
    if let Ok(path) = std::env::var("RUST_ANALYZER_PATH") {
        return Some(path);
    }

    let candidates = ["rust-analyzer", "~/.cargo/bin/rust-analyzer"];
    candidates.into_iter().find_map(|candidate| {
        let output = std::process::Command::new(candidate)
            .arg("--version")
            .output()
            .ok()?;
        output.status.success().then(|| candidate.to_string())
    })
}

/// Spawns rust-analyzer over `workspace`, or `None` when it is not installed.
/// ## Panics
/// if rust-analyzer is installed but fails to start
pub async fn spawn_lsp(workspace: &Path) -> Option<LspClient> {
    let Some(command) = find_rust_analyzer() else {
        eprintln!("rust-analyzer not found, skipping");
        return None;
    };

    // CI environments need longer timeouts due to slower hardware
    let (init_timeout, request_timeout, index_wait) = if std::env::var("CI").is_ok() {
        (
            Duration::from_secs(120),
            Duration::from_secs(60),
            Duration::from_secs(8),
        )
    } else {
        (
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
    };
    let client = LspClient::builder()
        .server_command(command)
        .workspace_root(workspace.to_path_buf())
        .init_timeout(init_timeout)
        .request_timeout(request_timeout)
        .build()
        .await
        .expect("Failed to start LSP client");
    // Give rust-analyzer time to index the workspace
    tokio::time::sleep(index_wait).await;
    Some(client)
}
