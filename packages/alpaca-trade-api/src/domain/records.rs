//! Market Data Records
//!
//! Trades, quotes, and bars travel with single-letter keys. Each
//! [`RecordKind`] carries one canonical short-key to long-name table covering
//! both wire dialects (REST v2 data API and the Polygon-style stream).
//!
//! A [`RecordSet`] owns a list of records for one symbol and memoizes a
//! column-oriented projection the first time it is asked for.
//!
//! # Wire Format (REST v2 trade)
//! ```json
//! {"t": "2021-02-06T13:04:56.334320128Z", "x": "C", "p": 387.62, "s": 100, "c": [" ", "T"], "i": 52983525029461, "z": "B"}
//! ```
//!
//! # Wire Format (stream trade)
//! ```json
//! {"ev": "T", "sym": "AAPL", "x": 4, "p": 134.7, "s": 20, "c": [14], "t": 1611159870000}
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::Value;

use super::entity::{Entity, EntityKind};

/// Column-oriented projection: long field name to one value per record.
pub type Columns = BTreeMap<String, Vec<Value>>;

const TRADE_KEYS: &[(&str, &str)] = &[
    ("t", "timestamp"),
    ("x", "exchange"),
    ("p", "price"),
    ("s", "size"),
    ("c", "conditions"),
    ("i", "id"),
    ("z", "tape"),
    ("sym", "symbol"),
    ("S", "symbol"),
];

const QUOTE_KEYS: &[(&str, &str)] = &[
    ("t", "timestamp"),
    ("ax", "ask_exchange"),
    ("ap", "ask_price"),
    ("as", "ask_size"),
    ("bx", "bid_exchange"),
    ("bp", "bid_price"),
    ("bs", "bid_size"),
    ("c", "conditions"),
    ("z", "tape"),
    ("sym", "symbol"),
    ("S", "symbol"),
];

const BAR_KEYS: &[(&str, &str)] = &[
    ("t", "timestamp"),
    ("o", "open"),
    ("h", "high"),
    ("l", "low"),
    ("c", "close"),
    ("v", "volume"),
    ("n", "trade_count"),
    ("vw", "vwap"),
    ("av", "accumulated_volume"),
    ("op", "official_open"),
    ("a", "average"),
    ("s", "start"),
    ("e", "end"),
    ("sym", "symbol"),
    ("S", "symbol"),
];

/// Kind of short-key market data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Trade print.
    Trade,
    /// NBBO quote.
    Quote,
    /// OHLCV bar or aggregate.
    Bar,
}

impl RecordKind {
    /// Short-key to long-name table.
    #[must_use]
    pub const fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Trade => TRADE_KEYS,
            Self::Quote => QUOTE_KEYS,
            Self::Bar => BAR_KEYS,
        }
    }

    /// Long name for a short key.
    #[must_use]
    pub fn long_name(self, short: &str) -> Option<&'static str> {
        self.table()
            .iter()
            .find(|(key, _)| *key == short)
            .map(|(_, long)| *long)
    }

    /// Short keys that map to `long`.
    pub fn short_keys(self, long: &str) -> impl Iterator<Item = &'static str> + '_ {
        self.table()
            .iter()
            .filter(move |(_, name)| *name == long)
            .map(|(key, _)| *key)
    }

    /// Entity kind records of this type are wrapped in.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::Trade => EntityKind::Trade,
            Self::Quote => EntityKind::Quote,
            Self::Bar => EntityKind::Bar,
        }
    }

    /// Key the data API nests this record list under (`bars`, `trades`, `quotes`).
    #[must_use]
    pub const fn page_key(self) -> &'static str {
        match self {
            Self::Trade => "trades",
            Self::Quote => "quotes",
            Self::Bar => "bars",
        }
    }

    /// Map a stream channel prefix to a record kind.
    ///
    /// `T`/`T.*` are trades, `Q`/`Q.*` quotes, `AM`/`A`/`AM.*`/`A.*` bars.
    #[must_use]
    pub fn from_channel(channel: &str) -> Option<Self> {
        let prefix = channel.split('.').next().unwrap_or(channel);
        match prefix {
            "T" => Some(Self::Trade),
            "Q" => Some(Self::Quote),
            "AM" | "A" => Some(Self::Bar),
            _ => None,
        }
    }
}

// =============================================================================
// Record Set
// =============================================================================

/// Records of one kind, with a lazily built column projection.
#[derive(Debug, Clone)]
pub struct RecordSet {
    kind: RecordKind,
    symbol: Option<String>,
    records: Vec<Entity>,
    columns: OnceLock<Columns>,
}

impl RecordSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new(kind: RecordKind, symbol: Option<String>) -> Self {
        Self {
            kind,
            symbol,
            records: Vec::new(),
            columns: OnceLock::new(),
        }
    }

    /// Build a set from raw short-key maps. Non-object values are skipped.
    #[must_use]
    pub fn from_values(
        kind: RecordKind,
        symbol: Option<String>,
        values: impl IntoIterator<Item = Value>,
    ) -> Self {
        let mut set = Self::new(kind, symbol);
        set.extend(values);
        set
    }

    /// Record kind.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Symbol these records belong to, when known.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Records in arrival order.
    #[must_use]
    pub fn records(&self) -> &[Entity] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.records.iter()
    }

    /// Append raw records, invalidating the projection.
    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) {
        let kind = self.kind.entity_kind();
        self.records
            .extend(values.into_iter().filter_map(|v| Entity::from_value(kind, v)));
        self.columns = OnceLock::new();
    }

    /// Keep at most `limit` records, invalidating the projection.
    pub fn truncate(&mut self, limit: usize) {
        if self.records.len() > limit {
            self.records.truncate(limit);
            self.columns = OnceLock::new();
        }
    }

    /// Column-oriented projection keyed by long field name.
    ///
    /// Built on first access and cached until the set is modified. Records
    /// missing a column contribute `null`.
    pub fn columns(&self) -> &Columns {
        self.columns.get_or_init(|| self.project())
    }

    fn project(&self) -> Columns {
        let mut columns = Columns::new();
        for record in &self.records {
            for key in record.raw().keys() {
                let name = self.kind.long_name(key).unwrap_or(key);
                columns.entry(name.to_string()).or_default();
            }
        }
        for (name, values) in &mut columns {
            values.extend(
                self.records
                    .iter()
                    .map(|record| record.get(name).cloned().unwrap_or(Value::Null)),
            );
        }
        columns
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
