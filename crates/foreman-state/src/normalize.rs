//! Property normalization
//!
//! Foreman does not use the same field names on read and write. A GET of a
//! subnet returns `domains: [{"id": 15, "name": "lab"}]` while a PUT expects
//! `domain_ids: [15]`. The rules in [`ApiMappings`](crate::config::ApiMappings)
//! describe how to rewrite one shape into the other.

use serde_json::{Map, Value};
use tracing::trace;

use crate::config::PropertyMapping;
use crate::error::{StateError, StateResult};
use crate::record::Record;

/// Rewrite `record` according to `rules`.
///
/// Each rule whose source field is present in the body is evaluated against
/// the whole record. The renamed field takes the place of the old one in the
/// body; fields without a rule pass through unchanged. A list rule that
/// selects nothing yields an empty list. A single-value rule that selects
/// nothing fails with [`StateError::MappingResolution`].
pub fn normalize(record: &Record, rules: &[PropertyMapping]) -> StateResult<Record> {
    if rules.is_empty() {
        return Ok(record.clone());
    }

    let whole = record.to_wire();
    let mut body = Map::with_capacity(record.body().len());

    for (field, value) in record.body() {
        let Some(rule) = rules.iter().find(|rule| &rule.source_property == field) else {
            body.insert(field.clone(), value.clone());
            continue;
        };

        let selected = rule.path.select(&whole);
        let converted = if rule.multiple_results {
            Value::Array(selected.into_iter().cloned().collect())
        } else {
            selected
                .first()
                .map(|value| (*value).clone())
                .ok_or_else(|| StateError::MappingResolution {
                    record_type: record.record_type().to_string(),
                    property: rule.source_property.clone(),
                    path: rule.path.to_string(),
                })?
        };

        trace!(
            record_type = %record.record_type(),
            from = %rule.source_property,
            to = %rule.target_property,
            "Normalized property"
        );
        body.insert(rule.target_property.clone(), converted);
    }

    Ok(Record::new(record.record_type(), body).with_dependencies(record.dependencies().to_vec()))
}
