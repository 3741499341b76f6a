//! Per-language connection registry.
//!
//! The pool maps each [`LanguageId`] to at most one [`Connection`]. It creates
//! connections lazily, evicts failed creations and closed connections, and
//! tears everything down on [`ClientPool::close_all`].

pub mod connection;
pub mod restart;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult, LanguageFailure};
use crate::language::LanguageId;
use crate::lsp::downstream::ClientFactory;

pub use connection::{Connection, ConnectionSnapshot, ConnectionState};
pub use restart::{RestartDecision, RestartPolicy};

/// Outcome of acquiring connections for several languages.
#[derive(Debug, Default)]
pub struct Acquired {
    /// Ready connections, in request order.
    pub connections: Vec<Arc<Connection>>,
    /// Languages whose connection could not be created.
    pub failures: Vec<LanguageFailure>,
}

/// Registry of language server connections.
pub struct ClientPool {
    config: Arc<BridgeConfig>,
    factory: Arc<dyn ClientFactory>,
    connections: Mutex<HashMap<LanguageId, Arc<Connection>>>,
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("languages", &self.languages())
            .finish_non_exhaustive()
    }
}

impl ClientPool {
    pub fn new(config: Arc<BridgeConfig>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            factory,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Languages that currently have a connection entry, sorted.
    pub fn languages(&self) -> Vec<LanguageId> {
        let mut languages: Vec<_> = self.lock().keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Returns the ready connection for `language`, creating it if needed.
    ///
    /// Concurrent callers for one language share a single [`Connection`] and
    /// observe the same creation outcome. A failed creation is evicted, so the
    /// next call starts from scratch.
    /// ## Errors
    /// `ConnectionInitializationFailed` when no server is configured or the
    /// server cannot be initialized; `ConnectionClosed` if `close_all` races
    /// the creation.
    pub async fn get_or_create(&self, language: &LanguageId) -> BridgeResult<Arc<Connection>> {
        let connection = self.entry(language)?;
        if let Err(err) = connection.ensure_ready().await {
            self.evict(&connection);
            connection.close().await;
            return Err(err);
        }
        Ok(connection)
    }

    /// Acquires connections for several languages concurrently.
    /// ## Errors
    /// `NoLanguages` for an empty input, `BatchFailed` when every language failed.
    pub async fn get_many(&self, languages: &[LanguageId]) -> BridgeResult<Acquired> {
        if languages.is_empty() {
            return Err(BridgeError::NoLanguages);
        }

        let results = join_all(languages.iter().map(|language| async move {
            (language.clone(), self.get_or_create(language).await)
        }))
        .await;

        let mut acquired = Acquired::default();
        for (language, result) in results {
            match result {
                Ok(connection) => acquired.connections.push(connection),
                Err(error) => {
                    warn!(language = %language, error = %error, "failed to acquire connection");
                    acquired.failures.push(LanguageFailure::new(language, error));
                }
            }
        }

        if acquired.connections.is_empty() {
            return Err(BridgeError::BatchFailed {
                failures: acquired.failures,
            });
        }
        Ok(acquired)
    }

    /// Starts the server for `language` ahead of the first request.
    /// ## Errors
    /// Same as [`get_or_create`](Self::get_or_create).
    pub async fn connect(&self, language: &LanguageId) -> BridgeResult<ConnectionSnapshot> {
        Ok(self.get_or_create(language).await?.snapshot())
    }

    /// Closes every connection and empties the pool.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, c)| c).collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "closing all language server connections");
        join_all(drained.iter().map(|connection| connection.close())).await;
    }

    /// Snapshots of all live connections, sorted by language.
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshots: Vec<_> = self.lock().values().map(|c| c.snapshot()).collect();
        snapshots.sort_by(|a, b| a.language.cmp(&b.language));
        snapshots
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LanguageId, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, language: &LanguageId) -> BridgeResult<Arc<Connection>> {
        let server = self.config.server(language).ok_or_else(|| {
            BridgeError::ConnectionInitializationFailed {
                language: language.clone(),
                reason: "no language server configured".to_string(),
            }
        })?;

        let mut connections = self.lock();
        if let Some(existing) = connections.get(language) {
            if !existing.is_closed() {
                return Ok(Arc::clone(existing));
            }
            debug!(language = %language, "replacing closed connection");
        }

        let connection = Arc::new(Connection::new(
            language.clone(),
            server.clone(),
            Arc::clone(&self.factory),
            self.config.restart_policy(),
        ));
        connections.insert(language.clone(), Arc::clone(&connection));
        Ok(connection)
    }

    fn evict(&self, connection: &Arc<Connection>) {
        let mut connections = self.lock();
        if connections
            .get(connection.language())
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            connections.remove(connection.language());
        }
    }
}
