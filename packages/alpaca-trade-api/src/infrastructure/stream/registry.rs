//! Handler Registry
//!
//! Ordered `(pattern, handler, symbols)` entries. A message on channel `c`
//! with symbol `s` reaches a handler when the pattern matches at the start
//! of `c` and the handler either has no symbol allow-set or `s` is in it.
//!
//! Re-registering a pattern replaces its entry in place, keeping the
//! original dispatch position.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::connection::StreamHandle;
use crate::domain::entity::Entity;
use crate::error::{Error, Result};

// =============================================================================
// Handler
// =============================================================================

/// Asynchronous message handler.
///
/// Any `Fn(StreamHandle, String, Entity) -> impl Future<Output = anyhow::Result<()>>`
/// is a handler:
///
/// ```rust,no_run
/// # use alpaca_trade_api::infrastructure::stream::{StreamConn, StreamHandle};
/// # use alpaca_trade_api::domain::Entity;
/// # fn demo(conn: &mut StreamConn) -> alpaca_trade_api::error::Result<()> {
/// conn.register(r"^T\.", |_conn: StreamHandle, channel: String, trade: Entity| async move {
///     tracing::info!(%channel, price = ?trade.get_f64("price"), "trade");
///     anyhow::Ok(())
/// })?;
/// # Ok(())
/// # }
/// ```
///
/// An error returned from a handler ends the current consume cycle and
/// triggers a reconnect.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one message.
    async fn handle(&self, conn: StreamHandle, channel: String, entity: Entity)
    -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(StreamHandle, String, Entity) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        conn: StreamHandle,
        channel: String,
        entity: Entity,
    ) -> anyhow::Result<()> {
        (self)(conn, channel, entity).await
    }
}

// =============================================================================
// Patterns
// =============================================================================

/// Anything that can be turned into a channel pattern.
pub trait IntoPattern {
    /// Compile the pattern.
    fn into_pattern(self) -> Result<Regex>;
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Regex> {
        Regex::new(self)
            .map_err(|e| Error::Validation(format!("invalid channel pattern {self:?}: {e}")))
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Regex> {
        self.as_str().into_pattern()
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<Regex> {
        Ok(self)
    }
}

impl IntoPattern for &Regex {
    fn into_pattern(self) -> Result<Regex> {
        Ok(self.clone())
    }
}

/// Whether `pattern` matches `channel` starting at offset 0.
#[must_use]
pub fn matches_at_start(pattern: &Regex, channel: &str) -> bool {
    pattern.find(channel).is_some_and(|m| m.start() == 0)
}

/// Symbol a message refers to, for allow-set filtering.
///
/// Taken from the payload (`sym`, `symbol`, `S`, `order.symbol`), else from
/// the channel suffix after the first `.`.
#[must_use]
pub fn message_symbol<'a>(channel: &'a str, entity: &'a Entity) -> Option<&'a str> {
    let raw = entity.raw();
    ["sym", "symbol", "S"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))
        .or_else(|| {
            raw.get("order")
                .and_then(|order| order.get("symbol"))
                .and_then(Value::as_str)
        })
        .or_else(|| channel.split_once('.').map(|(_, suffix)| suffix))
}

// =============================================================================
// Registry
// =============================================================================

struct Entry {
    pattern: Regex,
    handler: Arc<dyn Handler>,
    symbols: Option<HashSet<String>>,
}

impl Entry {
    fn accepts(&self, channel: &str, symbol: Option<&str>) -> bool {
        if !matches_at_start(&self.pattern, channel) {
            return false;
        }
        match &self.symbols {
            None => true,
            Some(allowed) => symbol.is_some_and(|s| allowed.contains(s)),
        }
    }
}

/// Ordered handler table.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`, optionally restricted to `symbols`.
    pub fn register(
        &mut self,
        pattern: Regex,
        handler: Arc<dyn Handler>,
        symbols: Option<HashSet<String>>,
    ) {
        let entry = Entry {
            pattern,
            handler,
            symbols,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.pattern.as_str() == entry.pattern.as_str())
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove the entry for `pattern`. Returns whether one existed.
    pub fn deregister(&mut self, pattern: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.pattern.as_str() != pattern);
        self.entries.len() != before
    }

    /// Handlers that should receive `entity` on `channel`, in registration order.
    #[must_use]
    pub fn matching(&self, channel: &str, entity: &Entity) -> Vec<Arc<dyn Handler>> {
        let symbol = message_symbol(channel, entity);
        self.entries
            .iter()
            .filter(|e| e.accepts(channel, symbol))
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    /// Registered patterns, in order.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.pattern.as_str()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("patterns", &self.patterns())
            .finish()
    }
}
