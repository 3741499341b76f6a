//! Two-phase call hierarchy.
//!
//! `prepare` resolves the symbol at a position into handles; the follow-up
//! calls take a handle back and must reach the same server session that
//! produced it.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, Position, Range,
    SymbolKind, Url,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::language::LanguageId;
use crate::pool::Connection;

use super::Bridge;

/// Which side of the call graph to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl Direction {
    pub fn incoming(self) -> bool {
        matches!(self, Self::Incoming | Self::Both)
    }

    pub fn outgoing(self) -> bool {
        matches!(self, Self::Outgoing | Self::Both)
    }
}

impl FromStr for Direction {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            "both" | "" => Ok(Self::Both),
            other => Err(BridgeError::InvalidParameters(format!(
                "unknown direction '{other}', expected incoming, outgoing or both"
            ))),
        }
    }
}

/// An item returned by `prepare`, bound to the session that produced it.
#[derive(Debug, Clone)]
pub struct CallHierarchyHandle {
    language: LanguageId,
    session: u64,
    item: CallHierarchyItem,
}

impl CallHierarchyHandle {
    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    pub fn name(&self) -> &str {
        &self.item.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.item.kind
    }

    pub fn uri(&self) -> &Url {
        &self.item.uri
    }

    pub fn selection_range(&self) -> Range {
        self.item.selection_range
    }

    pub fn detail(&self) -> Option<&str> {
        self.item.detail.as_deref()
    }
}

/// Follow-up results for one prepared item. Each side fails independently.
#[derive(Debug)]
pub struct CallHierarchyEntry {
    pub handle: CallHierarchyHandle,
    /// `None` when the direction excluded incoming calls.
    pub incoming: Option<BridgeResult<Vec<CallHierarchyIncomingCall>>>,
    /// `None` when the direction excluded outgoing calls.
    pub outgoing: Option<BridgeResult<Vec<CallHierarchyOutgoingCall>>>,
}

/// Result of a full call hierarchy request.
#[derive(Debug)]
pub enum CallHierarchyOutcome {
    /// Nothing callable at the position. Not an error.
    NoItems { language: LanguageId },
    Items {
        language: LanguageId,
        entries: Vec<CallHierarchyEntry>,
    },
}

impl Bridge {
    /// First phase: resolves the symbol at a position into handles.
    /// ## Errors
    /// Inference, connection and request failures of the file's language.
    pub async fn prepare_call_hierarchy(
        &self,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<CallHierarchyHandle>> {
        let (connection, path, language) = self.document_connection(path).await?;
        let uri = super::document_url(&path)?;
        let (items, session) = connection
            .invoke_in_session(cancel, |client| {
                let path = path.clone();
                let uri = uri.clone();
                let language = language.clone();
                async move {
                    client.did_open(&path, &language).await?;
                    client.prepare_call_hierarchy(&uri, position).await
                }
            })
            .await?;
        Ok(items
            .into_iter()
            .map(|item| CallHierarchyHandle {
                language: language.clone(),
                session,
                item,
            })
            .collect())
    }

    /// Callers of a prepared item.
    /// ## Errors
    /// `InvalidParameters` when the handle's session has ended.
    pub async fn incoming_calls(
        &self,
        handle: &CallHierarchyHandle,
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<CallHierarchyIncomingCall>> {
        let connection = self.handle_connection(handle).await?;
        connection
            .invoke(cancel, |client| async move {
                client.incoming_calls(&handle.item).await
            })
            .await
    }

    /// Callees of a prepared item.
    /// ## Errors
    /// `InvalidParameters` when the handle's session has ended.
    pub async fn outgoing_calls(
        &self,
        handle: &CallHierarchyHandle,
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<CallHierarchyOutgoingCall>> {
        let connection = self.handle_connection(handle).await?;
        connection
            .invoke(cancel, |client| async move {
                client.outgoing_calls(&handle.item).await
            })
            .await
    }

    /// Prepares the position and fetches calls for every item in `direction`.
    ///
    /// An empty prepare skips the second phase entirely.
    /// ## Errors
    /// Only failures of the prepare phase; follow-up failures are recorded
    /// on their entry.
    pub async fn call_hierarchy(
        &self,
        path: &Path,
        position: Position,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> BridgeResult<CallHierarchyOutcome> {
        let language = self.infer_language(&self.resolve(path))?;
        let handles = self.prepare_call_hierarchy(path, position, cancel).await?;
        if handles.is_empty() {
            debug!(language = %language, "no call hierarchy items");
            return Ok(CallHierarchyOutcome::NoItems { language });
        }

        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            let incoming = if direction.incoming() {
                Some(self.incoming_calls(&handle, cancel).await)
            } else {
                None
            };
            let outgoing = if direction.outgoing() {
                Some(self.outgoing_calls(&handle, cancel).await)
            } else {
                None
            };
            entries.push(CallHierarchyEntry {
                handle,
                incoming,
                outgoing,
            });
        }
        Ok(CallHierarchyOutcome::Items { language, entries })
    }

    async fn handle_connection(
        &self,
        handle: &CallHierarchyHandle,
    ) -> BridgeResult<Arc<Connection>> {
        let connection = self.pool.get_or_create(&handle.language).await?;
        if connection.session() != handle.session {
            return Err(BridgeError::InvalidParameters(format!(
                "call hierarchy item '{}' belongs to an ended {} session",
                handle.item.name, handle.language
            )));
        }
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing() {
        assert_eq!("incoming".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("OUTGOING".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!("".parse::<Direction>().unwrap(), Direction::Both);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(BridgeError::InvalidParameters(_))
        ));
        assert!(Direction::Both.incoming() && Direction::Both.outgoing());
        assert!(!Direction::Incoming.outgoing());
    }
}
