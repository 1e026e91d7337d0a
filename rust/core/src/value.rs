// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value coercion - primitive type inference and conversion for raw field
//! values.
//!
//! Every function here is total: a value that cannot be represented in the
//! requested type becomes [`ParamValue::Null`], never an error and never NaN.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelopes may nest (`{ "value": { "value": 3 } }`); give up after this many.
const MAX_UNWRAP_DEPTH: usize = 8;

/// Primitive column type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
}

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParamValue {
    /// The primitive type of this value, `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(_) => Some(ValueType::Boolean),
            ParamValue::Number(_) => Some(ValueType::Number),
            ParamValue::String(_) => Some(ValueType::String),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<ParamValue> for Value {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(b),
            ParamValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::String(s) => Value::String(s),
        }
    }
}

/// Value history of one parameter on one element.
///
/// `fetched_value`, `current_value` and `previous_value` start out identical;
/// `user_value` is only ever filled in by collaborators that apply user
/// overrides on top of an extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValueState {
    pub fetched_value: ParamValue,
    pub current_value: ParamValue,
    pub previous_value: ParamValue,
    pub user_value: ParamValue,
}

impl ParameterValueState {
    /// State for a value freshly read from the source tree.
    pub fn fetched(value: ParamValue) -> Self {
        Self {
            fetched_value: value.clone(),
            current_value: value.clone(),
            previous_value: value,
            user_value: ParamValue::Null,
        }
    }
}

/// Strip single-value envelopes, returning the innermost wrapped value.
pub fn unwrap_envelope<'v>(value: &'v Value, unwrap_field: &str) -> &'v Value {
    let mut current = value;
    for _ in 0..MAX_UNWRAP_DEPTH {
        match current.as_object().and_then(|obj| obj.get(unwrap_field)) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Whether `value` is a single-value envelope.
#[inline]
pub fn is_envelope(value: &Value, unwrap_field: &str) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(unwrap_field))
}

/// Infer the primitive type of a raw value. `None` for null.
pub fn infer_type(value: &Value, unwrap_field: &str) -> Option<ValueType> {
    match unwrap_envelope(value, unwrap_field) {
        Value::Null => None,
        Value::Bool(_) => Some(ValueType::Boolean),
        Value::Number(_) => Some(ValueType::Number),
        Value::String(s) if parse_full_float(s).is_some() => Some(ValueType::Number),
        _ => Some(ValueType::String),
    }
}

/// Coerce a raw value, inferring the target type when `expected` is `None`.
pub fn coerce(value: &Value, expected: Option<ValueType>, unwrap_field: &str) -> ParamValue {
    let value = unwrap_envelope(value, unwrap_field);
    if value.is_null() {
        return ParamValue::Null;
    }

    match expected {
        Some(ValueType::Number) => coerce_number(value),
        Some(ValueType::Boolean) => coerce_bool(value),
        Some(ValueType::String) | Some(ValueType::Date) => coerce_string(value),
        None => match value {
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(ParamValue::Number)
                .unwrap_or(ParamValue::Null),
            Value::String(s) => match parse_full_float(s) {
                Some(n) => ParamValue::Number(n),
                None => ParamValue::String(s.clone()),
            },
            _ => coerce_string(value),
        },
    }
}

/// Parse a display string as a number: `"42%"` is `0.42`, `"$17.50"` is
/// `17.5`, otherwise the leading float is taken (`"12 mm"` is `12`).
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(percent) = text.strip_suffix('%') {
        return parse_leading_float(percent.trim()).map(|n| n / 100.0);
    }
    if let Some(amount) = text.strip_prefix('$') {
        return parse_leading_float(amount.trim());
    }
    parse_leading_float(text)
}

/// Whether a string reads as an ISO-8601 date or date-time.
pub fn looks_like_date(text: &str) -> bool {
    let text = text.trim();
    // Cheap shape check before handing it to chrono
    if text.len() < 10 || !text.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return false;
    }
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::DateTime::parse_from_rfc3339(text).is_ok()
}

fn coerce_number(value: &Value) -> ParamValue {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .map(ParamValue::Number)
        .unwrap_or(ParamValue::Null)
}

fn coerce_bool(value: &Value) -> ParamValue {
    match value {
        Value::Bool(b) => ParamValue::Bool(*b),
        Value::Number(n) => n
            .as_f64()
            .map(|f| ParamValue::Bool(f != 0.0))
            .unwrap_or(ParamValue::Null),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes") {
                ParamValue::Bool(true)
            } else if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("no") {
                ParamValue::Bool(false)
            } else {
                ParamValue::Null
            }
        }
        _ => ParamValue::Null,
    }
}

fn coerce_string(value: &Value) -> ParamValue {
    match value {
        Value::Null => ParamValue::Null,
        Value::String(s) => ParamValue::String(s.clone()),
        Value::Bool(b) => ParamValue::String(b.to_string()),
        Value::Number(n) => ParamValue::String(n.to_string()),
        Value::Array(_) | Value::Object(_) => match serde_json::to_string(value) {
            Ok(json) if json != "{}" => ParamValue::String(json),
            _ => ParamValue::Null,
        },
    }
}

/// Whole-string float parse; surrounding whitespace is tolerated.
fn parse_full_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(text).ok().filter(|n| n.is_finite())
}

fn parse_leading_float(text: &str) -> Option<f64> {
    match fast_float::parse_partial::<f64, _>(text) {
        Ok((n, consumed)) if consumed > 0 && n.is_finite() => Some(n),
        _ => None,
    }
}
