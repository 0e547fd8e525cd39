//! Response Wrapping
//!
//! The request engines hand back a [`Response`]. In raw mode it is the decoded
//! JSON untouched; otherwise the value is wrapped into entities according to
//! the [`Shape`] the endpoint declares. [`Response::into_raw`] undoes the
//! wrapping exactly, so both modes are inter-convertible.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::entity::{Entity, EntityKind};
use crate::error::{Error, Result};

/// Shape an endpoint's successful body is expected to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A single object.
    Single,
    /// An array of objects.
    List,
    /// An object keyed by symbol, each value an object.
    Keyed,
}

/// Result of a request, raw or wrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Decoded JSON returned unchanged (raw mode, or a body that does not
    /// fit the declared shape).
    Raw(Value),
    /// Single object.
    Entity(Entity),
    /// Array of objects.
    List(Vec<Entity>),
    /// Symbol-keyed objects.
    Keyed(BTreeMap<String, Entity>),
    /// 2xx with an empty body.
    Empty,
}

impl Response {
    /// Wrap a decoded body.
    ///
    /// The declared shape is a hint: arrays always become `List`, objects
    /// become `Keyed` only when declared so and every value is an object.
    /// Anything that cannot be wrapped without loss stays `Raw`.
    #[must_use]
    pub fn wrap(value: Value, kind: EntityKind, shape: Shape) -> Self {
        match value {
            Value::Array(items) if items.iter().all(Value::is_object) => Self::List(
                items
                    .into_iter()
                    .filter_map(|item| Entity::from_value(kind, item))
                    .collect(),
            ),
            Value::Object(map) if shape == Shape::Keyed && map.values().all(Value::is_object) => {
                Self::Keyed(
                    map.into_iter()
                        .filter_map(|(key, item)| Entity::from_value(kind, item).map(|e| (key, e)))
                        .collect(),
                )
            }
            Value::Object(map) => Self::Entity(Entity::new(kind, map)),
            Value::Null => Self::Empty,
            other => Self::Raw(other),
        }
    }

    /// Undo wrapping, yielding the decoded JSON.
    #[must_use]
    pub fn into_raw(self) -> Value {
        match self {
            Self::Raw(value) => value,
            Self::Entity(entity) => entity.into_value(),
            Self::List(items) => Value::Array(items.into_iter().map(Entity::into_value).collect()),
            Self::Keyed(items) => Value::Object(
                items
                    .into_iter()
                    .map(|(key, entity)| (key, entity.into_value()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Empty => Value::Null,
        }
    }

    /// Whether the body was empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Expect a single entity.
    pub fn entity(self) -> Result<Entity> {
        match self {
            Self::Entity(entity) => Ok(entity),
            other => Err(shape_mismatch("an object", &other)),
        }
    }

    /// Expect a list of entities.
    pub fn list(self) -> Result<Vec<Entity>> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(shape_mismatch("an array", &other)),
        }
    }

    /// Expect symbol-keyed entities.
    pub fn keyed(self) -> Result<BTreeMap<String, Entity>> {
        match self {
            Self::Keyed(items) => Ok(items),
            other => Err(shape_mismatch("a symbol-keyed object", &other)),
        }
    }

    const fn variant_name(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw value",
            Self::Entity(_) => "object",
            Self::List(_) => "array",
            Self::Keyed(_) => "keyed object",
            Self::Empty => "empty body",
        }
    }
}

fn shape_mismatch(expected: &str, got: &Response) -> Error {
    Error::transport(format!(
        "expected {expected} in response, got {}",
        got.variant_name()
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn object_wraps_to_entity_and_back() {
        let body = json!({"id": "904837e3", "status": "ACTIVE", "cash": "4000.32"});
        let wrapped = Response::wrap(body.clone(), EntityKind::Account, Shape::Single);
        let entity = wrapped.clone().entity().unwrap();
        assert_eq!(entity.get_str("status"), Some("ACTIVE"));
        assert_eq!(wrapped.into_raw(), body);
    }

    #[test]
    fn array_wraps_to_list() {
        let body = json!([{"symbol": "AAPL"}, {"symbol": "MSFT"}]);
        let wrapped = Response::wrap(body.clone(), EntityKind::Position, Shape::List);
        assert_eq!(wrapped.clone().list().unwrap().len(), 2);
        assert_eq!(wrapped.into_raw(), body);
    }

    #[test]
    fn keyed_shape_wraps_each_symbol() {
        let body = json!({"AAPL": {"latestTrade": {"p": 1}}, "SPY": {"latestTrade": {"p": 2}}});
        let wrapped = Response::wrap(body.clone(), EntityKind::Snapshot, Shape::Keyed);
        let keyed = wrapped.clone().keyed().unwrap();
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["SPY"].kind(), EntityKind::Snapshot);
        assert_eq!(wrapped.into_raw(), body);
    }

    #[test]
    fn keyed_shape_with_scalar_values_stays_an_entity() {
        let body = json!({"AAPL": 1, "SPY": {"p": 2}});
        let wrapped = Response::wrap(body.clone(), EntityKind::Snapshot, Shape::Keyed);
        assert!(matches!(wrapped, Response::Entity(_)));
        assert_eq!(wrapped.into_raw(), body);
    }

    #[test]
    fn mixed_array_and_scalars_stay_raw() {
        for body in [json!([1, {"a": 1}]), json!("ok"), json!(42)] {
            let wrapped = Response::wrap(body.clone(), EntityKind::Generic, Shape::List);
            assert!(matches!(wrapped, Response::Raw(_)));
            assert_eq!(wrapped.into_raw(), body);
        }
    }

    #[test]
    fn shape_mismatch_is_a_transport_error() {
        let err = Response::Empty.entity().unwrap_err();
        assert!(matches!(err, Error::Transport { status: None, .. }));
    }
}
