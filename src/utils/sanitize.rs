//! Numeric sanitizer for job results.
//!
//! Engines assemble their results as a [`Payload`] tree, the loosely typed
//! equivalent of a JSON object that may still carry non-finite floats and
//! single-precision values. [`sanitize`] turns that tree into a plain
//! `serde_json::Value`: NaN and ±Infinity become `null`, `f32` values are
//! widened through their shortest decimal form so `0.1f32` reads back as `0.1`
//! rather than `0.10000000149011612`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::utils::time_utils::to_iso;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Single(f32),
    Text(String),
    List(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
    /// Already-serialized JSON (e.g. echoed job parameters)
    Json(Value),
}

impl Payload {
    pub fn object() -> Self {
        Payload::Object(BTreeMap::new())
    }

    /// Builder form of [`Payload::insert`]
    pub fn with(mut self, key: &str, value: impl Into<Payload>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts `key` when `self` is an object; other variants are left untouched.
    pub fn insert(&mut self, key: &str, value: impl Into<Payload>) {
        if let Payload::Object(map) = self {
            map.insert(key.to_string(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Payload::Object(map) => map.get(key),
            _ => None,
        }
    }
}

/// `None` for NaN and ±Infinity
#[inline]
pub fn clean_f64(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// Native `f64` for a single-precision value, `None` when non-finite
pub fn clean_f32(x: f32) -> Option<f64> {
    if !x.is_finite() {
        return None;
    }
    // Display for f32 prints the shortest representation that round-trips
    x.to_string().parse::<f64>().ok()
}

fn float_value(x: Option<f64>) -> Value {
    x.and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Recursively converts a payload into JSON with every non-finite number nulled.
pub fn sanitize(payload: &Payload) -> Value {
    match payload {
        Payload::Null => Value::Null,
        Payload::Bool(b) => Value::Bool(*b),
        Payload::Int(i) => Value::Number(Number::from(*i)),
        Payload::Float(x) => float_value(clean_f64(*x)),
        Payload::Single(x) => float_value(clean_f32(*x)),
        Payload::Text(s) => Value::String(s.clone()),
        Payload::List(items) => Value::Array(items.iter().map(sanitize).collect()),
        Payload::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), sanitize(value));
            }
            Value::Object(out)
        }
        // serde_json cannot hold non-finite numbers, nothing to clean
        Payload::Json(value) => value.clone(),
    }
}

impl From<f64> for Payload {
    fn from(x: f64) -> Self {
        Payload::Float(x)
    }
}

impl From<f32> for Payload {
    fn from(x: f32) -> Self {
        Payload::Single(x)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Int(i)
    }
}

impl From<i32> for Payload {
    fn from(i: i32) -> Self {
        Payload::Int(i64::from(i))
    }
}

impl From<u64> for Payload {
    fn from(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => Payload::Int(i),
            Err(_) => Payload::Float(u as f64),
        }
    }
}

impl From<usize> for Payload {
    fn from(u: usize) -> Self {
        Payload::from(u as u64)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<DateTime<Utc>> for Payload {
    fn from(dt: DateTime<Utc>) -> Self {
        Payload::Text(to_iso(&dt))
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Payload::Null)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(items: Vec<T>) -> Self {
        Payload::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_finite_leaves_become_null_at_any_depth() {
        let raw = Payload::object()
            .with("a", f64::NAN)
            .with("b", vec![f64::INFINITY, 1.0])
            .with("c", Payload::object().with("d", f64::NEG_INFINITY));

        assert_eq!(
            sanitize(&raw),
            json!({"a": null, "b": [null, 1.0], "c": {"d": null}})
        );
    }

    #[test]
    fn single_precision_values_are_nativized() {
        let raw = Payload::from(vec![0.1f32, f32::NAN, 2.5f32]);
        assert_eq!(sanitize(&raw), json!([0.1, null, 2.5]));
    }

    #[test]
    fn optional_and_integer_leaves_keep_their_shape() {
        let missing: Option<f64> = None;
        let raw = Payload::object()
            .with("sharpe", missing)
            .with("assets", 3usize)
            .with("ok", true)
            .with("message", "done")
            .with("params", json!({"strike": 100}));

        assert_eq!(
            sanitize(&raw),
            json!({
                "sharpe": null,
                "assets": 3,
                "ok": true,
                "message": "done",
                "params": {"strike": 100}
            })
        );
    }

    #[test]
    fn insert_ignores_non_objects() {
        let mut scalar = Payload::from(1.0);
        scalar.insert("x", 2.0);
        assert_eq!(scalar, Payload::Float(1.0));
        assert!(Payload::object().with("x", 2.0).get("x").is_some());
    }
}
