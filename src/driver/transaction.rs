//! Transaction settings and the extra map sent with BEGIN and auto-commit RUN.

use std::collections::HashMap;
use std::time::Duration;

use super::config::Bookmark;
use super::types::Value;
use crate::bolt::error::BoltResult;
use crate::bolt::handshake::BoltVersion;
use crate::bolt::message::AccessMode;
use crate::bolt::packstream::PackStreamValue;

// ============================================================================
// TransactionConfig
// ============================================================================

/// Per-transaction settings. Both are ignored by v1/v2 servers, which have
/// no place to carry them.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// Server-side limit on the transaction's run time
    pub timeout: Option<Duration>,
    /// Attached to the transaction for server-side monitoring
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Request extras
// ============================================================================

/// Everything that may go into a BEGIN or auto-commit RUN extra map.
pub(crate) struct TransactionExtra<'a> {
    pub bookmarks: &'a [Bookmark],
    pub database: Option<&'a str>,
    pub access_mode: AccessMode,
    pub config: &'a TransactionConfig,
}

impl TransactionExtra<'_> {
    /// Build the extra map for `version`; empty on v1/v2.
    pub fn to_map(&self, version: BoltVersion) -> BoltResult<HashMap<String, PackStreamValue>> {
        let mut extra = HashMap::new();
        if !version.has_explicit_transactions() {
            return Ok(extra);
        }
        if !self.bookmarks.is_empty() {
            let list = self
                .bookmarks
                .iter()
                .map(|b| PackStreamValue::from(b.value()))
                .collect::<Vec<_>>();
            extra.insert("bookmarks".to_string(), PackStreamValue::List(list));
        }
        if let Some(timeout) = self.config.timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            extra.insert("tx_timeout".to_string(), PackStreamValue::Integer(millis));
        }
        if !self.config.metadata.is_empty() {
            let metadata = self
                .config
                .metadata
                .iter()
                .map(|(k, v)| Ok((k.clone(), v.to_packstream()?)))
                .collect::<BoltResult<HashMap<_, _>>>()?;
            extra.insert("tx_metadata".to_string(), PackStreamValue::Map(metadata));
        }
        if self.access_mode == AccessMode::Read {
            extra.insert("mode".to_string(), PackStreamValue::from("r"));
        }
        if let Some(db) = self.database.filter(|_| version.supports_database()) {
            extra.insert("db".to_string(), PackStreamValue::from(db));
        }
        Ok(extra)
    }
}
