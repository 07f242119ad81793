//! State enforcement
//!
//! [`StateEnforcer`] drives one record at a time through read, compare and
//! act:
//!
//! | Desired | Found | Comparison | Action | Reason |
//! |---------|-------|------------|--------|--------|
//! | present | no    |            | create | `MissingRecord` |
//! | present | yes   | match      | none   | `StatesMatch` |
//! | present | yes   | mismatch   | update | `RecordMismatch` |
//! | absent  | no    |            | none   | `AlreadyAbsent` |
//! | absent  | yes   |            | delete | `ExtraRecord` |
//!
//! Every call performs one read and at most one mutation, in that order.
//! Records that depend on each other must be reconciled by the caller in
//! dependency order.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, trace};

use crate::compare::{values_equivalent, RecordComparator};
use crate::config::ApiMappings;
use crate::endpoint::{EndpointResolver, RecordQuery};
use crate::error::{StateError, StateResult};
use crate::normalize::normalize;
use crate::receipt::{ChangeDecision, ChangeReason, DesiredState, ModificationReceipt};
use crate::record::{case_folded_equal, Record};
use crate::transport::{ApiTransport, HttpMethod};

/// Reconciles records against a Foreman server.
pub struct StateEnforcer<T> {
    transport: T,
    mappings: Arc<ApiMappings>,
}

impl<T> std::fmt::Debug for StateEnforcer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEnforcer")
            .field("mappings", &self.mappings)
            .finish_non_exhaustive()
    }
}

impl<T: ApiTransport> StateEnforcer<T> {
    /// Create an enforcer over `transport` with shared mapping tables.
    pub fn new(transport: T, mappings: Arc<ApiMappings>) -> Self {
        Self {
            transport,
            mappings,
        }
    }

    /// Create an enforcer with [`ApiMappings::foreman_defaults`].
    pub fn with_foreman_defaults(transport: T) -> Self {
        Self::new(transport, Arc::new(ApiMappings::foreman_defaults()))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mappings(&self) -> &ApiMappings {
        &self.mappings
    }

    fn resolver(&self) -> EndpointResolver<'_> {
        EndpointResolver::new(&self.mappings)
    }

    /// Bring the remote record in line with `desired_state` (`present` or `absent`).
    ///
    /// Any failure is returned wrapped in [`StateError::Reconciliation`].
    pub async fn ensure_state(
        &self,
        desired_state: &str,
        minimal: Record,
    ) -> StateResult<ModificationReceipt> {
        let context = |source: StateError, record: Value| StateError::Reconciliation {
            desired_state: desired_state.to_string(),
            record,
            source: Box::new(source),
        };

        let desired = match desired_state.parse::<DesiredState>() {
            Ok(desired) => desired,
            Err(e) => return Err(context(e, Value::from(minimal))),
        };

        let record = Value::from(minimal.clone());
        self.ensure(desired, minimal)
            .await
            .map_err(|e| context(e, record))
    }

    /// Typed form of [`ensure_state`](Self::ensure_state) without the outer wrapper.
    #[instrument(skip(self, minimal), fields(record_type = %minimal.record_type()))]
    pub async fn ensure(
        &self,
        desired: DesiredState,
        minimal: Record,
    ) -> StateResult<ModificationReceipt> {
        debug!(desired = %desired, "Ensuring record state");

        let original = self.read_record(&minimal).await?;
        let decision = self.determine_change(desired, &minimal, original.as_ref())?;

        debug!(
            reason = %decision.reason,
            change_required = decision.change_required(),
            detail = %decision.detail,
            "Determined required change"
        );
        let desired_record = minimal.to_wire();
        let actual_record = original.as_ref().map(Record::to_wire);
        trace!(
            desired_record = %desired_record,
            actual_record = ?actual_record,
            "Compared records"
        );

        match (decision.reason, original) {
            (ChangeReason::MissingRecord, _) => {
                let created = self.create_record(&minimal).await?;
                Ok(ModificationReceipt::modified(
                    decision, desired, minimal, created, None,
                ))
            }
            (ChangeReason::RecordMismatch, Some(original)) => {
                let minimal = minimal.with_id(original_id(&original)?);
                let updated = self.update_record(&minimal).await?;
                Ok(ModificationReceipt::modified(
                    decision,
                    desired,
                    minimal,
                    updated,
                    Some(original),
                ))
            }
            (ChangeReason::ExtraRecord, Some(original)) => {
                let minimal = minimal.with_id(original_id(&original)?);
                let deleted = self.delete_record(&minimal).await?;
                Ok(ModificationReceipt::modified(
                    decision,
                    desired,
                    minimal,
                    deleted,
                    Some(original),
                ))
            }
            (_, original) => Ok(ModificationReceipt::unchanged(
                decision, desired, minimal, original,
            )),
        }
    }

    /// Decide what, if anything, must change for `actual` to satisfy `minimal`.
    pub fn determine_change(
        &self,
        desired: DesiredState,
        minimal: &Record,
        actual: Option<&Record>,
    ) -> StateResult<ChangeDecision> {
        let decision = match (desired, actual) {
            (DesiredState::Present, None) => ChangeDecision::new(ChangeReason::MissingRecord, None),
            (DesiredState::Present, Some(actual)) => {
                let comparison = RecordComparator::new(&self.mappings)
                    .compare(minimal, actual)
                    .map_err(|e| e.context("compare records"))?;
                let reason = if comparison.matches {
                    ChangeReason::StatesMatch
                } else {
                    ChangeReason::RecordMismatch
                };
                ChangeDecision::new(reason, Some(&comparison.reason))
            }
            (DesiredState::Absent, None) => ChangeDecision::new(ChangeReason::AlreadyAbsent, None),
            (DesiredState::Absent, Some(_)) => ChangeDecision::new(ChangeReason::ExtraRecord, None),
        };
        Ok(decision)
    }

    /// Look up the record `minimal` describes.
    ///
    /// Returns `None` when the server answers 404 or the search yields no
    /// matching record. Other transport failures surface as
    /// [`StateError::UnexpectedRead`].
    #[instrument(skip(self, minimal), fields(record_type = %minimal.record_type()))]
    pub async fn read_record(&self, minimal: &Record) -> StateResult<Option<Record>> {
        let resolver = self.resolver();
        let query = resolver
            .query_key_value(minimal)
            .map_err(|e| e.context("resolve read query"))?;
        let endpoint = resolver
            .endpoint_for_read(minimal, true)
            .map_err(|e| e.context("resolve read endpoint"))?;

        debug!(endpoint = %endpoint, query_key = %query.key, "Reading record");

        let response = match self
            .transport
            .make_api_call(&endpoint, HttpMethod::Get, None, None)
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(endpoint = %endpoint, "Record not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(StateError::UnexpectedRead {
                    record_type: minimal.record_type().to_string(),
                    source: Box::new(e.into()),
                })
            }
        };

        self.record_from_read(minimal.record_type(), &query, response)
    }

    /// Turn a GET response into at most one record.
    fn record_from_read(
        &self,
        record_type: &str,
        query: &RecordQuery,
        response: Value,
    ) -> StateResult<Option<Record>> {
        let results = match response {
            Value::Object(mut map) if map.contains_key("results") => map.remove("results"),
            single => {
                return Record::from_body(record_type, single)
                    .map(Some)
                    .map_err(|e| StateError::UnexpectedRead {
                        record_type: record_type.to_string(),
                        source: Box::new(e),
                    })
            }
        };

        let mut candidates = match results {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(StateError::UnexpectedRead {
                    record_type: record_type.to_string(),
                    source: Box::new(StateError::malformed("'results' is not an array")),
                })
            }
        };

        debug!(count = candidates.len(), "Search returned a result set");

        // Foreman's search does not always honour its filter, even for a
        // single hit.
        candidates.retain(|candidate| self.matches_query(candidate, query));
        debug!(count = candidates.len(), "Filtered result set on query value");

        match candidates.len() {
            0 => Ok(None),
            1 => {
                let body = candidates.swap_remove(0);
                Record::from_body(record_type, body)
                    .map(Some)
                    .map_err(|e| StateError::UnexpectedRead {
                        record_type: record_type.to_string(),
                        source: Box::new(e),
                    })
            }
            count => Err(StateError::AmbiguousResult {
                record_type: record_type.to_string(),
                query_key: query.key.clone(),
                query_value: query.value_text(),
                count,
            }),
        }
    }

    fn matches_query(&self, candidate: &Value, query: &RecordQuery) -> bool {
        candidate.get(&query.key).is_some_and(|actual| {
            if self.mappings.is_case_insensitive(&query.key) {
                case_folded_equal(&query.value, actual)
            } else {
                values_equivalent(&query.value, actual)
            }
        })
    }

    /// POST `minimal` and return the created record.
    #[instrument(skip(self, minimal), fields(record_type = %minimal.record_type()))]
    pub async fn create_record(&self, minimal: &Record) -> StateResult<Record> {
        let write_error = |source: StateError| StateError::UnexpectedWrite {
            operation: "create",
            record_type: minimal.record_type().to_string(),
            source: Box::new(source),
        };

        let endpoint = self
            .resolver()
            .endpoint_for_create(minimal)
            .map_err(|e| write_error(e.context("resolve create endpoint")))?;
        let (_, expected) = minimal.identifier(&self.mappings).map_err(write_error)?;

        let created = self
            .mutate(HttpMethod::Post, &endpoint, minimal, &expected, "create")
            .await?;
        info!(endpoint = %endpoint, id = ?created.id(), "Record created");
        Ok(created)
    }

    /// PUT `minimal`, which must carry an id, and return the updated record.
    #[instrument(skip(self, minimal), fields(record_type = %minimal.record_type()))]
    pub async fn update_record(&self, minimal: &Record) -> StateResult<Record> {
        let (endpoint, id) = self.modify_target(minimal, "update")?;
        let updated = self
            .mutate(HttpMethod::Put, &endpoint, minimal, &id, "update")
            .await?;
        info!(endpoint = %endpoint, "Record updated");
        Ok(updated)
    }

    /// DELETE the record identified by `minimal`'s id and return the server's copy.
    #[instrument(skip(self, minimal), fields(record_type = %minimal.record_type()))]
    pub async fn delete_record(&self, minimal: &Record) -> StateResult<Record> {
        let (endpoint, id) = self.modify_target(minimal, "delete")?;
        let deleted = self
            .mutate(HttpMethod::Delete, &endpoint, minimal, &id, "delete")
            .await?;
        info!(endpoint = %endpoint, "Record deleted");
        Ok(deleted)
    }

    fn modify_target(
        &self,
        minimal: &Record,
        operation: &'static str,
    ) -> StateResult<(String, Value)> {
        let write_error = |source: StateError| StateError::UnexpectedWrite {
            operation,
            record_type: minimal.record_type().to_string(),
            source: Box::new(source),
        };

        let id = minimal.id().cloned().ok_or_else(|| {
            write_error(StateError::NoIdentifier {
                record_type: minimal.record_type().to_string(),
                tried: vec!["id".to_string()],
            })
        })?;
        let endpoint = self
            .resolver()
            .endpoint_for_modify(minimal, &id)
            .map_err(|e| write_error(e.context("resolve modify endpoint")))?;

        Ok((endpoint, id))
    }

    /// Send one mutation and confirm the server answered with the same record.
    async fn mutate(
        &self,
        method: HttpMethod,
        endpoint: &str,
        record: &Record,
        expected: &Value,
        operation: &'static str,
    ) -> StateResult<Record> {
        let record_type = record.record_type();
        let write_error = |source: StateError| StateError::UnexpectedWrite {
            operation,
            record_type: record_type.to_string(),
            source: Box::new(source),
        };

        let body = if method.sends_body() {
            let rules = self.mappings.rules_for(method, record_type);
            let outgoing = normalize(record, rules)
                .map_err(|e| write_error(e.context("normalize outgoing record")))?;
            Some(outgoing.to_wire())
        } else {
            None
        };
        let headers = method.required_headers();

        debug!(method = %method, endpoint = %endpoint, "Sending mutation");

        let response = self
            .transport
            .make_api_call(endpoint, method, body.as_ref(), headers.as_ref())
            .await
            .map_err(|e| write_error(e.into()))?;

        let mismatch = |source: StateError, response: Value| StateError::ModifiedRecordMismatch {
            endpoint: endpoint.to_string(),
            method,
            request: body.clone(),
            response,
            source: Box::new(source),
        };

        let returned = match Record::from_body(record_type, response.clone()) {
            Ok(returned) => returned,
            Err(e) => return Err(mismatch(e, response)),
        };
        if let Err(e) = Record::confirm_identity(record_type, expected, &returned, &self.mappings) {
            return Err(mismatch(e, response));
        }

        Ok(returned)
    }
}

fn original_id(original: &Record) -> StateResult<Value> {
    original
        .id()
        .cloned()
        .ok_or_else(|| StateError::NoIdentifier {
            record_type: original.record_type().to_string(),
            tried: vec!["id".to_string()],
        })
}
