//! One supervised connection to a language server.
//!
//! A [`Connection`] owns at most one live [`LanguageClient`] at a time and
//! moves through `Uninitialized → Initializing → Ready → Degraded → Closed`.
//! Transport faults trigger the restart policy; error responses do not.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{BridgeError, BridgeResult, LspError};
use crate::language::LanguageId;
use crate::lsp::LspResult;
use crate::lsp::downstream::{ClientFactory, LanguageClient};

use super::restart::{RestartDecision, RestartPolicy};

/// Session ids are unique across connections, so a handle from a closed
/// connection never matches its replacement.
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

fn next_session() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Degraded,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of a connection, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub language: LanguageId,
    pub state: ConnectionState,
    pub command: String,
    /// Downstream calls attempted so far.
    pub requests: u64,
    pub last_error: Option<String>,
    pub last_initialized: Option<SystemTime>,
    /// Consecutive failures since the last successful initialization.
    pub restart_failures: u32,
}

/// A supervised handle to a single language server.
pub struct Connection {
    language: LanguageId,
    server: ServerConfig,
    factory: Arc<dyn ClientFactory>,
    policy: RestartPolicy,
    state: RwLock<ConnectionState>,
    client: Mutex<Option<Arc<dyn LanguageClient>>>,
    /// Serializes initialization and recovery.
    init_lock: tokio::sync::Mutex<()>,
    /// Replaced with a fresh session id on every completed initialization attempt.
    generation: AtomicU64,
    failures: AtomicU32,
    requests: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_initialized: Mutex<Option<SystemTime>>,
    closed: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("language", &self.language)
            .field("state", &self.state())
            .field("generation", &self.session())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates an uninitialized connection. Nothing is spawned until
    /// [`ensure_ready`](Self::ensure_ready).
    pub fn new(
        language: LanguageId,
        server: ServerConfig,
        factory: Arc<dyn ClientFactory>,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            language,
            server,
            factory,
            policy,
            state: RwLock::new(ConnectionState::Uninitialized),
            client: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            failures: AtomicU32::new(0),
            requests: AtomicU64::new(0),
            last_error: Mutex::new(None),
            last_initialized: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifies the current downstream session. Changes whenever the
    /// server is (re)initialized.
    pub fn session(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            language: self.language.clone(),
            state: self.state(),
            command: self.server.command.clone(),
            requests: self.requests.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_initialized: *self
                .last_initialized
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            restart_failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Makes sure a live, initialized client exists.
    ///
    /// A connection that was live before and has since degraded restarts
    /// under the restart policy, waiting its delay between attempts.
    /// ## Errors
    /// `ConnectionClosed` after [`close`](Self::close), `UpstreamUnavailable`
    /// once restarts are exhausted, otherwise `ConnectionInitializationFailed`
    /// when spawning or initialization fails. Callers that waited on somebody
    /// else's failed first attempt get that failure.
    pub async fn ensure_ready(&self) -> BridgeResult<()> {
        self.ready(&CancellationToken::new()).await
    }

    async fn ready(&self, cancel: &CancellationToken) -> BridgeResult<()> {
        match self.state() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Closed => return Err(self.closed_error()),
            _ => {}
        }

        let observed = self.session();
        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
            guard = self.init_lock.lock() => guard,
        };
        match self.state() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Closed => return Err(self.closed_error()),
            _ => {}
        }
        if self.was_initialized() {
            return self.restart(cancel).await;
        }
        if self.session() != observed {
            return Err(self.init_failed_error());
        }
        self.initialize().await
    }

    /// Runs a downstream request against the live client.
    ///
    /// The op may run more than once: after a transport fault the connection
    /// restarts and replays it, at most `max_restart_attempts` times.
    /// ## Errors
    /// `Cancelled`, `ConnectionClosed`, `RequestFailed` for error responses
    /// and timeouts, `UpstreamUnavailable` once restarts or replays are
    /// exhausted. Exhaustion closes the connection.
    pub async fn invoke<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> BridgeResult<T>
    where
        F: Fn(Arc<dyn LanguageClient>) -> Fut,
        Fut: Future<Output = LspResult<T>>,
    {
        self.invoke_in_session(cancel, op)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`invoke`](Self::invoke), also returning the session of the
    /// client that produced the value.
    /// ## Errors
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_in_session<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> BridgeResult<(T, u64)>
    where
        F: Fn(Arc<dyn LanguageClient>) -> Fut,
        Fut: Future<Output = LspResult<T>>,
    {
        let mut replays = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }
            self.ready(cancel).await?;
            let (client, session) = self.current_client()?;
            self.requests.fetch_add(1, Ordering::Relaxed);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                () = self.closed.cancelled() => return Err(self.closed_error()),
                result = op(client) => result,
            };

            let err = match result {
                Ok(value) => {
                    self.set_last_error(None);
                    return Ok((value, session));
                }
                Err(err) => err,
            };
            self.set_last_error(Some(err.to_string()));

            if !err.is_connection_fault() {
                debug!(language = %self.language, error = %err, "request failed");
                return Err(BridgeError::request(&self.language, &err));
            }

            if replays >= self.policy.max_attempts() {
                warn!(
                    language = %self.language,
                    attempt = replays,
                    error = %err,
                    "replays exhausted, closing connection"
                );
                self.close().await;
                return Err(BridgeError::UpstreamUnavailable {
                    language: self.language.clone(),
                    attempts: replays,
                });
            }
            warn!(language = %self.language, error = %err, "connection fault, restarting");
            self.recover(cancel, session).await?;
            replays += 1;
        }
    }

    /// Closes the connection and terminates the server. Safe from any state.
    pub async fn close(&self) {
        self.transition(ConnectionState::Closed);
        self.closed.cancel();
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(client) = client {
            info!(language = %self.language, "shutting down language server");
            if let Err(e) = client.shutdown().await {
                debug!(language = %self.language, error = %e, "shutdown reported an error");
            }
        }
    }

    fn current_client(&self) -> BridgeResult<(Arc<dyn LanguageClient>, u64)> {
        let slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(client) => Ok((Arc::clone(client), self.session())),
            None => Err(self.closed_error()),
        }
    }

    /// Spawns and initializes a client. Must run under `init_lock`.
    async fn initialize(&self) -> BridgeResult<()> {
        self.transition(ConnectionState::Initializing);
        debug!(language = %self.language, command = %self.server.command, "initializing");

        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(self.closed_error()),
            result = self.factory.connect(&self.language, &self.server) => result,
        };

        match result {
            Ok(client) => {
                // close() fires the token before emptying the slot, so a
                // client installed here is either seen by close() or dropped.
                let installed = {
                    let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
                    if self.closed.is_cancelled() {
                        None
                    } else {
                        let previous = slot.replace(Arc::clone(&client));
                        self.generation.store(next_session(), Ordering::Release);
                        Some(previous)
                    }
                };

                let Some(previous) = installed else {
                    let _ = client.shutdown().await;
                    return Err(self.closed_error());
                };
                if let Some(previous) = previous {
                    let _ = previous.shutdown().await;
                }
                *self
                    .last_initialized
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(SystemTime::now());
                self.failures.store(0, Ordering::Relaxed);
                self.set_last_error(None);
                self.transition(ConnectionState::Ready);
                info!(language = %self.language, session = self.session(), "connection ready");
                Ok(())
            }
            Err(err) => {
                self.generation.store(next_session(), Ordering::Release);
                self.set_last_error(Some(err.to_string()));
                self.transition(ConnectionState::Degraded);
                warn!(language = %self.language, error = %err, "initialization failed");
                Err(self.init_error(&err))
            }
        }
    }

    /// Restarts after a transport fault observed on session `observed`.
    async fn recover(&self, cancel: &CancellationToken, observed: u64) -> BridgeResult<()> {
        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
            guard = self.init_lock.lock() => guard,
        };

        match self.state() {
            ConnectionState::Closed => return Err(self.closed_error()),
            ConnectionState::Ready if self.session() != observed => return Ok(()),
            _ => {}
        }
        self.restart(cancel).await
    }

    /// Reinitializes under the restart policy until it succeeds or gives up.
    /// Must run under `init_lock`.
    async fn restart(&self, cancel: &CancellationToken) -> BridgeResult<()> {
        self.transition(ConnectionState::Degraded);
        loop {
            let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
            match self.policy.decide(failures) {
                RestartDecision::GiveUp => {
                    warn!(
                        language = %self.language,
                        attempt = failures,
                        "restart attempts exhausted, closing connection"
                    );
                    self.close().await;
                    return Err(BridgeError::UpstreamUnavailable {
                        language: self.language.clone(),
                        attempts: failures,
                    });
                }
                RestartDecision::Retry { wait } => {
                    info!(
                        language = %self.language,
                        attempt = failures,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        "restarting language server"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                        () = self.closed.cancelled() => return Err(self.closed_error()),
                        () = tokio::time::sleep(wait) => {}
                    }
                    match self.initialize().await {
                        Ok(()) => return Ok(()),
                        Err(BridgeError::ConnectionClosed { language }) => {
                            return Err(BridgeError::ConnectionClosed { language });
                        }
                        Err(_) => {}
                    }
                }
            }
        }
    }

    fn was_initialized(&self) -> bool {
        self.last_initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Applies a lifecycle transition. `Closed` is terminal.
    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Closed || *state == next {
            return;
        }
        debug!(language = %self.language, from = %*state, to = %next, "state transition");
        *state = next;
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn closed_error(&self) -> BridgeError {
        BridgeError::ConnectionClosed {
            language: self.language.clone(),
        }
    }

    fn init_error(&self, err: &LspError) -> BridgeError {
        BridgeError::ConnectionInitializationFailed {
            language: self.language.clone(),
            reason: err.to_string(),
        }
    }

    /// The failure of the attempt another caller just made.
    fn init_failed_error(&self) -> BridgeError {
        let last_error = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match last_error {
            Some(reason) => BridgeError::ConnectionInitializationFailed {
                language: self.language.clone(),
                reason,
            },
            None => self.closed_error(),
        }
    }
}
