//! Structural comparison of desired and actual records.
//!
//! The desired (minimal) record drives the comparison: every field it names
//! must be present and equal in the actual record, and anything else the
//! actual record carries is ignored.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::config::ApiMappings;
use crate::error::StateResult;
use crate::normalize::normalize;
use crate::record::{case_folded_equal, json_kind, Record};
use crate::transport::HttpMethod;

/// Outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub matches: bool,
    /// Why the records did or did not match.
    pub reason: String,
}

impl Comparison {
    fn matched(reason: impl Into<String>) -> Self {
        Self {
            matches: true,
            reason: reason.into(),
        }
    }

    fn mismatched(reason: impl Into<String>) -> Self {
        Self {
            matches: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Compares records using the quirks recorded in [`ApiMappings`].
#[derive(Debug, Clone, Copy)]
pub struct RecordComparator<'a> {
    mappings: &'a ApiMappings,
}

impl<'a> RecordComparator<'a> {
    pub fn new(mappings: &'a ApiMappings) -> Self {
        Self { mappings }
    }

    /// Check whether `actual` contains everything `minimal` asks for.
    ///
    /// Both sides are normalized with the GET rules first, so a desired
    /// record written in read shape compares like its write-shape form.
    /// Dependencies on either side are not compared.
    pub fn compare(&self, minimal: &Record, actual: &Record) -> StateResult<Comparison> {
        if minimal.record_type() != actual.record_type() {
            return Ok(Comparison::mismatched(format!(
                "The record types differ: '{}' vs '{}'.",
                minimal.record_type(),
                actual.record_type()
            )));
        }

        let rules = self
            .mappings
            .rules_for(HttpMethod::Get, actual.record_type());
        let minimal = normalize(minimal, rules)?;
        let actual = normalize(actual, rules)?;

        Ok(self.compare_maps(minimal.record_type(), minimal.body(), actual.body()))
    }

    fn compare_values(
        &self,
        record_type: &str,
        minimal: &Value,
        actual: &Value,
        key: Option<&str>,
    ) -> Comparison {
        match (minimal, actual) {
            (Value::Object(minimal), Value::Object(actual)) => {
                self.compare_maps(record_type, minimal, actual)
            }
            (Value::Array(minimal), Value::Array(actual)) => {
                self.compare_lists(record_type, minimal, actual)
            }
            (Value::Object(_) | Value::Array(_), other) => Comparison::mismatched(format!(
                "Expected {} but the actual value was {}.",
                json_kind(minimal),
                json_kind(other)
            )),
            (minimal, actual) => self.compare_primitives(record_type, minimal, actual, key),
        }
    }

    fn compare_maps(
        &self,
        record_type: &str,
        minimal: &Map<String, Value>,
        actual: &Map<String, Value>,
    ) -> Comparison {
        let exceptions = self.mappings.comparison_exceptions();

        for (key, minimal_value) in minimal {
            let Some(actual_value) = actual.get(key) else {
                if exceptions.is_write_only(record_type, key) {
                    continue;
                }
                return Comparison::mismatched(format!(
                    "The key '{key}' was not found on the actual record."
                ));
            };

            let result = self.compare_values(record_type, minimal_value, actual_value, Some(key));
            if !result.matches {
                return Comparison::mismatched(format!(
                    "The key '{key}' did not match. {}",
                    result.reason
                ));
            }
        }

        Comparison::matched("All the keys and values match.")
    }

    fn compare_lists(&self, record_type: &str, minimal: &[Value], actual: &[Value]) -> Comparison {
        if minimal.len() > actual.len() {
            return Comparison::mismatched(format!(
                "The desired list has {} elements but the actual list has {}.",
                minimal.len(),
                actual.len()
            ));
        }

        for (index, wanted) in minimal.iter().enumerate() {
            let found = actual
                .iter()
                .any(|candidate| self.compare_values(record_type, wanted, candidate, None).matches);
            if !found {
                return Comparison::mismatched(format!(
                    "No match for the list element at index {index}."
                ));
            }
        }

        Comparison::matched("All the list elements match.")
    }

    fn compare_primitives(
        &self,
        record_type: &str,
        minimal: &Value,
        actual: &Value,
        key: Option<&str>,
    ) -> Comparison {
        let exceptions = self.mappings.comparison_exceptions();
        let stripped;
        let actual = match (key, minimal.as_str(), actual) {
            (Some(key), Some(wanted), Value::String(name))
                if exceptions.strips_domain_suffix(record_type, key) && !wanted.contains('.') =>
            {
                match name.split_once('.') {
                    Some((short, _domain)) => {
                        stripped = Value::String(short.to_string());
                        &stripped
                    }
                    None => actual,
                }
            }
            _ => actual,
        };

        let equal = match (key, minimal, actual) {
            (Some(key), Value::String(_), Value::String(_))
                if self.mappings.is_case_insensitive(key) =>
            {
                case_folded_equal(minimal, actual)
            }
            _ => values_equivalent(minimal, actual),
        };

        if equal {
            return Comparison::matched("The values match.");
        }

        let (wanted_kind, found_kind) = (json_kind(minimal), json_kind(actual));
        if wanted_kind == found_kind {
            return Comparison::mismatched(format!("Expected {minimal} but found {actual}."));
        }

        let attempt = match coerce_into(minimal, actual) {
            Some(coerced) => format!("converted to {wanted_kind} it is {coerced}"),
            None => format!("it could not be converted to {wanted_kind}"),
        };
        Comparison::mismatched(format!(
            "Expected {minimal} but found {actual}. The actual value is {found_kind}, not {wanted_kind}, and {attempt}."
        ))
    }
}

/// Loose equality between a desired primitive and an actual one.
///
/// When the types differ the actual value is coerced into the desired
/// value's type first, so `"5"` matches `5` and `"true"` matches `true`.
/// Values that cannot be coerced are unequal.
pub fn values_equivalent(minimal: &Value, actual: &Value) -> bool {
    match (minimal, actual) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Object(_) | Value::Array(_), _) => minimal == actual,
        _ => coerce_into(minimal, actual).is_some_and(|coerced| match (minimal, &coerced) {
            (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
            _ => *minimal == coerced,
        }),
    }
}

/// Convert `actual` into the JSON type of `target`.
fn coerce_into(target: &Value, actual: &Value) -> Option<Value> {
    match (target, actual) {
        (Value::Null, Value::Null) => Some(Value::Null),
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_)) => Some(actual.clone()),
        (Value::String(_), Value::Number(n)) => Some(Value::String(n.to_string())),
        (Value::String(_), Value::Bool(b)) => Some(Value::String(b.to_string())),
        (Value::Number(_), Value::String(s)) => parse_number(s.trim()).map(Value::Number),
        (Value::Number(_), Value::Bool(b)) => Some(Value::Number(Number::from(u8::from(*b)))),
        (Value::Bool(_), Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (Value::Bool(_), Value::Number(n)) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
