//! Record model
//!
//! A record is a JSON object with exactly one key, its type, mapping to the
//! record body. An optional sibling `dependencies` array lists the records
//! whose ids appear in this record's URL:
//!
//! ```json
//! {
//!     "os_default_template": {"provisioning_template_id": 128},
//!     "dependencies": [{"operatingsystem": {"id": 1}}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compare::values_equivalent;
use crate::config::ApiMappings;
use crate::error::{StateError, StateResult};

/// Key holding the dependency records.
pub const DEPENDENCIES_KEY: &str = "dependencies";

/// A typed Foreman record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    record_type: String,
    body: Map<String, Value>,
    dependencies: Vec<Record>,
}

impl Record {
    /// Create a record without dependencies.
    pub fn new(record_type: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            record_type: record_type.into(),
            body,
            dependencies: Vec::new(),
        }
    }

    /// Wrap an API response body as a record of `record_type`.
    pub fn from_body(record_type: impl Into<String>, body: Value) -> StateResult<Self> {
        let record_type = record_type.into();
        match body {
            Value::Object(map) => Ok(Self::new(record_type, map)),
            other => Err(StateError::malformed(format!(
                "body of '{record_type}' record must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Attach dependency records.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Record>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Copy of this record with `id` set in the body.
    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.body.insert("id".to_string(), id);
        self
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.body
    }

    pub fn dependencies(&self) -> &[Record] {
        &self.dependencies
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    pub fn id(&self) -> Option<&Value> {
        self.body.get("id").filter(|id| !id.is_null())
    }

    /// Wire shape without dependencies: `{"type": {...}}`.
    pub fn to_wire(&self) -> Value {
        let mut map = Map::with_capacity(1);
        map.insert(self.record_type.clone(), Value::Object(self.body.clone()));
        Value::Object(map)
    }

    /// First identification property present in the body, with its value.
    pub fn identifier(&self, mappings: &ApiMappings) -> StateResult<(String, Value)> {
        let properties = mappings.identification_properties_for(&self.record_type);
        properties
            .iter()
            .find_map(|property| {
                self.body
                    .get(property)
                    .filter(|value| !value.is_null())
                    .map(|value| (property.clone(), value.clone()))
            })
            .ok_or_else(|| StateError::NoIdentifier {
                record_type: self.record_type.clone(),
                tried: properties.into_owned(),
            })
    }

    /// Check that `candidate` is the `expected_type` record identified by `expected_value`.
    ///
    /// Passes when any of the candidate's identification properties holds a
    /// value equivalent to `expected_value`.
    pub fn confirm_identity(
        expected_type: &str,
        expected_value: &Value,
        candidate: &Record,
        mappings: &ApiMappings,
    ) -> StateResult<()> {
        let expected = format!("{expected_type} identified by {expected_value}");

        if candidate.record_type != expected_type {
            return Err(StateError::identity_mismatch(
                expected,
                format!("record type was '{}'", candidate.record_type),
            ));
        }

        let properties = mappings.identification_properties_for(expected_type);
        let matched = properties.iter().any(|property| {
            candidate.body.get(property).is_some_and(|actual| {
                if mappings.is_case_insensitive(property) {
                    case_folded_equal(expected_value, actual)
                } else {
                    values_equivalent(expected_value, actual)
                }
            })
        });

        if matched {
            Ok(())
        } else {
            Err(StateError::identity_mismatch(
                expected,
                format!("none of {:?} matched on the returned record", properties.as_ref()),
            ))
        }
    }
}

/// Compare two values as strings with case folded, falling back to equivalence.
pub(crate) fn case_folded_equal(expected: &Value, actual: &Value) -> bool {
    match (expected.as_str(), actual.as_str()) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => values_equivalent(expected, actual),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl TryFrom<Value> for Record {
    type Error = StateError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(StateError::malformed(format!(
                    "a record must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let dependencies = match map.remove(DEPENDENCIES_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(Record::try_from)
                .collect::<StateResult<Vec<_>>>()?,
            Some(other) => {
                return Err(StateError::malformed(format!(
                    "'{DEPENDENCIES_KEY}' must be an array, got {}",
                    json_kind(&other)
                )))
            }
        };

        if map.len() != 1 {
            let keys: Vec<&String> = map.keys().collect();
            return Err(StateError::malformed(format!(
                "expected exactly one record type key, found {}: {keys:?}",
                map.len()
            )));
        }

        let Some((record_type, body)) = map.into_iter().next() else {
            return Err(StateError::malformed("record has no type key"));
        };

        Ok(Self::from_body(record_type, body)?.with_dependencies(dependencies))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        let mut map = Map::new();
        map.insert(record.record_type, Value::Object(record.body));
        if !record.dependencies.is_empty() {
            map.insert(
                DEPENDENCIES_KEY.to_string(),
                Value::Array(record.dependencies.into_iter().map(Value::from).collect()),
            );
        }
        Value::Object(map)
    }
}
