//! Static mapping tables
//!
//! Read-only configuration describing how Foreman names its endpoints, which
//! fields identify a record, and how read-side fields map onto write-side
//! fields. Loaded once and shared by every reconciliation.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::path::PropertyPath;
use crate::transport::HttpMethod;

/// Identification properties used when a record type has no entry of its own.
pub const DEFAULT_IDENTIFICATION_PROPERTIES: [&str; 2] = ["id", "name"];

/// How a per-type identification list combines with the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationMode {
    /// The per-type list is used on its own.
    #[default]
    Replace,
    /// The per-type list is followed by any default not already in it.
    Append,
}

/// Rename rule turning a read-side field into its write-side counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Field name as it appears on the record being normalized.
    #[serde(alias = "actual_record_property")]
    pub source_property: String,

    /// Field name the extracted value is written under.
    #[serde(alias = "minimal_record_property")]
    pub target_property: String,

    /// Expression evaluated against the whole record (`$.type.field...`).
    #[serde(alias = "jsonpath")]
    pub path: PropertyPath,

    /// Keep every selected value as a list instead of the first one.
    #[serde(default)]
    pub multiple_results: bool,
}

impl PropertyMapping {
    /// Create a list-valued mapping.
    pub fn many(source: &str, target: &str, path: &str) -> StateResult<Self> {
        Ok(Self {
            source_property: source.to_string(),
            target_property: target.to_string(),
            path: PropertyPath::parse(path)?,
            multiple_results: true,
        })
    }

    /// Create a single-valued mapping.
    pub fn single(source: &str, target: &str, path: &str) -> StateResult<Self> {
        Ok(Self {
            multiple_results: false,
            ..Self::many(source, target, path)?
        })
    }
}

/// Per-type quirks of the Foreman API honoured by the comparator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonExceptions {
    /// Fields accepted on write but never echoed on read; skipped when the
    /// actual record lacks them.
    #[serde(default)]
    pub write_only: HashMap<String, Vec<String>>,

    /// Fields whose read value carries a domain suffix the write value lacks.
    #[serde(default)]
    pub hostname_suffix: HashMap<String, Vec<String>>,
}

impl ComparisonExceptions {
    pub fn is_write_only(&self, record_type: &str, field: &str) -> bool {
        Self::listed(&self.write_only, record_type, field)
    }

    pub fn strips_domain_suffix(&self, record_type: &str, field: &str) -> bool {
        Self::listed(&self.hostname_suffix, record_type, field)
    }

    fn listed(table: &HashMap<String, Vec<String>>, record_type: &str, field: &str) -> bool {
        table
            .get(record_type)
            .is_some_and(|fields| fields.iter().any(|f| f == field))
    }
}

/// All static tables the engine consults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMappings {
    /// Record type to URL suffix, for types that do not pluralize with `s`.
    #[serde(default)]
    pub url_suffixes: HashMap<String, String>,

    /// Record type to identification properties, most specific first.
    #[serde(default)]
    pub identification_properties: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub identification_mode: IdentificationMode,

    /// HTTP method to record type to rename rules.
    #[serde(default)]
    pub property_mappings: HashMap<HttpMethod, HashMap<String, Vec<PropertyMapping>>>,

    /// Fields whose values the API folds to lower case.
    #[serde(default = "default_case_insensitive_properties")]
    pub case_insensitive_properties: Vec<String>,

    #[serde(default)]
    pub comparison_exceptions: ComparisonExceptions,
}

fn default_case_insensitive_properties() -> Vec<String> {
    vec!["mac".to_string()]
}

impl ApiMappings {
    /// Create empty tables.
    pub fn new() -> Self {
        Self {
            case_insensitive_properties: default_case_insensitive_properties(),
            ..Self::default()
        }
    }

    /// Parse tables from a JSON document.
    pub fn from_json(json: &str) -> StateResult<Self> {
        let mappings: Self = serde_json::from_str(json).map_err(|e| {
            StateError::invalid_configuration(format!("could not parse mapping tables: {e}"))
        })?;
        mappings.validate()?;
        Ok(mappings)
    }

    /// The tables Foreman needs out of the box.
    pub fn foreman_defaults() -> Self {
        let mut mappings = Self::new()
            .with_url_suffix("medium", "media")
            .with_url_suffix("smart_proxy", "smart_proxies")
            .with_identification_properties("operatingsystem", &["id", "name", "description"])
            .with_identification_properties("os_default_template", &["id", "provisioning_template_id"])
            .with_identification_properties("host", &["id", "mac"])
            .with_write_only_property("subnet", "domain_ids")
            .with_write_only_property("operatingsystem", "config_template_ids")
            .with_write_only_property("provisioning_template", "audit_comment")
            .with_write_only_property("host", "root_pass")
            .with_hostname_suffix_property("host", "name");

        let rules: [(&str, &str, &str); 6] = [
            ("subnet", "domains", "domain_ids"),
            ("provisioning_template", "operatingsystems", "operatingsystem_ids"),
            ("operatingsystem", "architectures", "architecture_ids"),
            ("operatingsystem", "ptables", "ptable_ids"),
            ("operatingsystem", "media", "medium_ids"),
            ("operatingsystem", "provisioning_templates", "provisioning_template_ids"),
        ];
        for (record_type, source, target) in rules {
            // The paths are built from literal names above and always parse.
            if let Ok(rule) =
                PropertyMapping::many(source, target, &format!("$.{record_type}.{source}.[*].id"))
            {
                mappings = mappings.with_property_mapping(HttpMethod::Get, record_type, rule);
            }
        }

        mappings
    }

    /// Set the URL suffix for a record type.
    #[must_use]
    pub fn with_url_suffix(mut self, record_type: &str, suffix: &str) -> Self {
        self.url_suffixes
            .insert(record_type.to_string(), suffix.to_string());
        self
    }

    /// Set the identification properties for a record type.
    #[must_use]
    pub fn with_identification_properties(mut self, record_type: &str, properties: &[&str]) -> Self {
        self.identification_properties.insert(
            record_type.to_string(),
            properties.iter().map(|p| (*p).to_string()).collect(),
        );
        self
    }

    /// Set how per-type identification lists combine with the defaults.
    #[must_use]
    pub fn with_identification_mode(mut self, mode: IdentificationMode) -> Self {
        self.identification_mode = mode;
        self
    }

    /// Add a rename rule for a method and record type.
    #[must_use]
    pub fn with_property_mapping(
        mut self,
        method: HttpMethod,
        record_type: &str,
        rule: PropertyMapping,
    ) -> Self {
        self.property_mappings
            .entry(method)
            .or_default()
            .entry(record_type.to_string())
            .or_default()
            .push(rule);
        self
    }

    /// Mark a field as accepted on write but absent on read.
    #[must_use]
    pub fn with_write_only_property(mut self, record_type: &str, field: &str) -> Self {
        self.comparison_exceptions
            .write_only
            .entry(record_type.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Mark a field as carrying a domain suffix on read.
    #[must_use]
    pub fn with_hostname_suffix_property(mut self, record_type: &str, field: &str) -> Self {
        self.comparison_exceptions
            .hostname_suffix
            .entry(record_type.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// URL suffix for `record_type`: the override if one exists, else the type plus `s`.
    pub fn url_suffix(&self, record_type: &str) -> String {
        match self.url_suffixes.get(record_type) {
            Some(suffix) => suffix.clone(),
            None => format!("{record_type}s"),
        }
    }

    /// Ordered identification properties for `record_type`.
    pub fn identification_properties_for(&self, record_type: &str) -> Cow<'_, [String]> {
        let Some(overrides) = self.identification_properties.get(record_type) else {
            return Cow::Owned(
                DEFAULT_IDENTIFICATION_PROPERTIES
                    .iter()
                    .map(|p| (*p).to_string())
                    .collect(),
            );
        };

        match self.identification_mode {
            IdentificationMode::Replace => Cow::Borrowed(overrides.as_slice()),
            IdentificationMode::Append => {
                let mut properties = overrides.clone();
                for default in DEFAULT_IDENTIFICATION_PROPERTIES {
                    if !properties.iter().any(|p| p == default) {
                        properties.push(default.to_string());
                    }
                }
                Cow::Owned(properties)
            }
        }
    }

    /// Rename rules for a method and record type; empty when none are configured.
    pub fn rules_for(&self, method: HttpMethod, record_type: &str) -> &[PropertyMapping] {
        self.property_mappings
            .get(&method)
            .and_then(|by_type| by_type.get(record_type))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the API folds values of `field` to lower case.
    pub fn is_case_insensitive(&self, field: &str) -> bool {
        self.case_insensitive_properties.iter().any(|p| p == field)
    }

    pub fn comparison_exceptions(&self) -> &ComparisonExceptions {
        &self.comparison_exceptions
    }

    /// Reject tables the engine cannot work with.
    pub fn validate(&self) -> StateResult<()> {
        for (record_type, suffix) in &self.url_suffixes {
            if suffix.trim().is_empty() || suffix.contains('/') {
                return Err(StateError::invalid_configuration(format!(
                    "url suffix for '{record_type}' must be a single non-empty path segment"
                )));
            }
        }

        for (record_type, properties) in &self.identification_properties {
            if properties.is_empty() {
                return Err(StateError::invalid_configuration(format!(
                    "identification properties for '{record_type}' cannot be empty"
                )));
            }
        }

        for (method, by_type) in &self.property_mappings {
            for (record_type, rules) in by_type {
                for rule in rules {
                    if rule.source_property.is_empty() || rule.target_property.is_empty() {
                        return Err(StateError::invalid_configuration(format!(
                            "{method} mapping for '{record_type}' needs both property names"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
