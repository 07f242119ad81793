//! Endpoint resolution
//!
//! Builds Foreman API paths for records. A record's path is its URL suffix,
//! nested under `{suffix}/{id}` for each of its dependencies:
//!
//! ```text
//! {"operatingsystem": {"name": "CentOS"}}          -> /api/operatingsystems
//! {"os_default_template": {...},
//!  "dependencies": [{"operatingsystem": {"id": 1}}]} -> /api/operatingsystems/1/os_default_templates
//! ```

use serde_json::Value;

use crate::config::ApiMappings;
use crate::error::{StateError, StateResult};
use crate::record::Record;

/// Prefix of every Foreman API path.
pub const API_PREFIX: &str = "/api";

/// Field and value used to look a record up.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub key: String,
    pub value: Value,
}

impl RecordQuery {
    /// The value as it appears in URLs and search expressions.
    pub fn value_text(&self) -> String {
        value_text(&self.value)
    }
}

/// Resolves records to API paths using the suffix and identification tables.
#[derive(Debug, Clone, Copy)]
pub struct EndpointResolver<'a> {
    mappings: &'a ApiMappings,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(mappings: &'a ApiMappings) -> Self {
        Self { mappings }
    }

    /// URL suffix for `record_type`.
    pub fn url_suffix(&self, record_type: &str) -> String {
        self.mappings.url_suffix(record_type)
    }

    /// Path of the record's collection, dependencies first, without the `/api` prefix.
    pub fn resolve_path(&self, record: &Record) -> StateResult<String> {
        let mut path = String::new();

        for dependency in record.dependencies() {
            let id = dependency
                .id()
                .ok_or_else(|| StateError::MissingDependencyId {
                    record_type: record.record_type().to_string(),
                    dependency_type: dependency.record_type().to_string(),
                })?;
            path.push_str(&self.resolve_path(dependency)?);
            path.push('/');
            path.push_str(&id_segment(id));
        }

        path.push('/');
        path.push_str(&self.url_suffix(record.record_type()));
        Ok(path)
    }

    /// Field and value to look the record up by.
    ///
    /// `id` wins when present, then the type's identification properties in
    /// order, then the first string field, then the first number or boolean.
    /// Values of case-insensitive fields are folded to lower case.
    pub fn query_key_value(&self, record: &Record) -> StateResult<RecordQuery> {
        let body = record.body();

        let by_id = record.id().map(|id| ("id".to_string(), id.clone()));
        let by_identification = || {
            self.mappings
                .identification_properties_for(record.record_type())
                .iter()
                .filter(|property| property.as_str() != "id")
                .find_map(|property| {
                    body.get(property)
                        .filter(|value| is_queryable(value))
                        .map(|value| (property.clone(), value.clone()))
                })
        };
        let by_first_string = || {
            body.iter()
                .find(|(_, value)| value.is_string())
                .map(|(key, value)| (key.clone(), value.clone()))
        };
        let by_first_primitive = || {
            body.iter()
                .find(|(_, value)| is_queryable(value))
                .map(|(key, value)| (key.clone(), value.clone()))
        };

        let (key, value) = by_id
            .or_else(by_identification)
            .or_else(by_first_string)
            .or_else(by_first_primitive)
            .ok_or_else(|| StateError::NoQueryableField {
                record_type: record.record_type().to_string(),
            })?;

        let value = match value {
            Value::String(text) if self.mappings.is_case_insensitive(&key) => {
                Value::String(text.to_lowercase())
            }
            other => other,
        };

        Ok(RecordQuery { key, value })
    }

    /// `/value` for ids, a `?search=key="value"` expression otherwise.
    pub fn query_string(&self, query: &RecordQuery) -> String {
        if query.key == "id" {
            format!("/{}", id_segment(&query.value))
        } else {
            let expression = format!("{}=\"{}\"", query.key, query.value_text());
            format!("?search={}", urlencoding::encode(&expression))
        }
    }

    /// Endpoint to read the record, with the lookup query when `include_query` is set.
    pub fn endpoint_for_read(&self, record: &Record, include_query: bool) -> StateResult<String> {
        let mut endpoint = format!("{API_PREFIX}{}", self.resolve_path(record)?);
        if include_query {
            let query = self.query_key_value(record)?;
            endpoint.push_str(&self.query_string(&query));
        }
        Ok(endpoint)
    }

    /// Endpoint to POST a new record to.
    pub fn endpoint_for_create(&self, record: &Record) -> StateResult<String> {
        self.endpoint_for_read(record, false)
    }

    /// Endpoint to PUT or DELETE the record identified by `id`.
    pub fn endpoint_for_modify(&self, record: &Record, id: &Value) -> StateResult<String> {
        Ok(format!(
            "{API_PREFIX}{}/{}",
            self.resolve_path(record)?,
            id_segment(id)
        ))
    }
}

fn is_queryable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Percent-encoded path segment for a record id.
fn id_segment(id: &Value) -> String {
    urlencoding::encode(&value_text(id)).into_owned()
}

/// Render a value for a URL: strings without quotes, everything else as JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
