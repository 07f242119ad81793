//! In-memory Foreman used by the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use foreman_state::{ApiCallError, ApiTransport, HttpMethod, Record};

/// One call seen by the fake server.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: HttpMethod,
    pub endpoint: String,
    pub body: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Default)]
struct State {
    /// Collection path to records keyed by id.
    collections: BTreeMap<String, BTreeMap<u64, Map<String, Value>>>,
    next_id: u64,
    calls: Vec<Call>,
}

/// A tiny Foreman: collections of records addressed by path, searchable with
/// `?search=key="value"`.
#[derive(Default)]
pub struct FakeForeman {
    state: Mutex<State>,
    /// Return every record of a collection regardless of the search expression.
    ignore_search: bool,
    /// Rewrite `id` and `name` in mutation responses.
    tamper_responses: bool,
}

impl FakeForeman {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer searches with the whole collection, like a server whose
    /// `search` filter is broken.
    pub fn with_ignore_search(mut self) -> Self {
        self.ignore_search = true;
        self
    }

    /// Answer mutations with a different record than the one written.
    pub fn with_tampered_responses(mut self) -> Self {
        self.tamper_responses = true;
        self
    }

    /// Store `body` under `collection` and return its id.
    pub fn seed(&self, collection: &str, mut body: Value) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), json!(id));
        }
        let Value::Object(map) = body else {
            panic!("seeded records must be objects");
        };
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, map);
        id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method != HttpMethod::Get)
            .collect()
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .map(|records| records.values().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn not_found(endpoint: &str, method: HttpMethod) -> ApiCallError {
        ApiCallError::new(
            Some(404),
            format!("Resource not found at '{endpoint}'"),
            endpoint,
            method,
        )
    }
}

/// Split `/api/things/7` into (`/api/things`, Some(7)).
fn split_endpoint(path: &str) -> (String, Option<u64>) {
    match path.rsplit_once('/') {
        Some((collection, last)) => match last.parse::<u64>() {
            Ok(id) => (collection.to_string(), Some(id)),
            Err(_) => (path.to_string(), None),
        },
        None => (path.to_string(), None),
    }
}

/// Parse `key="value"` out of a `search=` query.
fn parse_search(query: &str) -> Option<(String, String)> {
    let encoded = query.strip_prefix("search=")?;
    let decoded = urlencoding::decode(encoded).ok()?;
    let (key, value) = decoded.split_once('=')?;
    Some((key.to_string(), value.trim_matches('"').to_string()))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unwrap_body(body: Option<&Value>) -> Map<String, Value> {
    body.and_then(Value::as_object)
        .and_then(|wrapper| wrapper.values().next())
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl ApiTransport for FakeForeman {
    async fn make_api_call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value, ApiCallError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            method,
            endpoint: endpoint.to_string(),
            body: body.cloned(),
            headers: headers.cloned(),
        });

        let (path, query) = match endpoint.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (endpoint, None),
        };
        let (collection, id) = split_endpoint(path);

        let mut response = match (method, id) {
            (HttpMethod::Get, Some(id)) => state
                .collections
                .get(&collection)
                .and_then(|records| records.get(&id))
                .cloned()
                .map(Value::Object)
                .ok_or_else(|| Self::not_found(endpoint, method))?,
            (HttpMethod::Get, None) => {
                let search = query.and_then(parse_search);
                let results: Vec<Value> = state
                    .collections
                    .get(&collection)
                    .map(|records| {
                        records
                            .values()
                            .filter(|record| match (&search, self.ignore_search) {
                                (Some((key, wanted)), false) => record
                                    .get(key)
                                    .is_some_and(|v| value_text(v).eq_ignore_ascii_case(wanted)),
                                _ => true,
                            })
                            .cloned()
                            .map(Value::Object)
                            .collect()
                    })
                    .unwrap_or_default();
                json!({"total": results.len(), "subtotal": results.len(), "results": results})
            }
            (HttpMethod::Post, None) => {
                state.next_id += 1;
                let new_id = state.next_id;
                let mut record = unwrap_body(body);
                record.insert("id".to_string(), json!(new_id));
                state
                    .collections
                    .entry(collection)
                    .or_default()
                    .insert(new_id, record.clone());
                Value::Object(record)
            }
            (HttpMethod::Put, Some(id)) => {
                let record = state
                    .collections
                    .get_mut(&collection)
                    .and_then(|records| records.get_mut(&id))
                    .ok_or_else(|| Self::not_found(endpoint, method))?;
                for (key, value) in unwrap_body(body) {
                    if key != "id" {
                        record.insert(key, value);
                    }
                }
                Value::Object(record.clone())
            }
            (HttpMethod::Delete, Some(id)) => state
                .collections
                .get_mut(&collection)
                .and_then(|records| records.remove(&id))
                .map(Value::Object)
                .ok_or_else(|| Self::not_found(endpoint, method))?,
            _ => {
                return Err(ApiCallError::new(
                    Some(405),
                    "Method not allowed",
                    endpoint,
                    method,
                ))
            }
        };

        if self.tamper_responses && method != HttpMethod::Get {
            if let Some(map) = response.as_object_mut() {
                map.insert("id".to_string(), json!(9999));
                map.insert("name".to_string(), json!("someone_else"));
            }
        }

        Ok(response)
    }
}

pub fn record(value: Value) -> Record {
    Record::try_from(value).expect("test record should be well formed")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("foreman_state=debug")),
        )
        .with_test_writer()
        .try_init();
}
