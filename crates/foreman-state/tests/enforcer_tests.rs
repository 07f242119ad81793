//! Integration tests for the state enforcer against an in-memory Foreman.
//!
//! These cover the reconciliation scenarios end to end: create, no-op,
//! update, delete, dependency paths, search disambiguation and post-mutation
//! identity checks.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{init_tracing, record, FakeForeman};
use foreman_state::prelude::*;

// =============================================================================
// Test Helpers
// =============================================================================

fn enforcer(foreman: FakeForeman) -> StateEnforcer<FakeForeman> {
    init_tracing();
    StateEnforcer::with_foreman_defaults(foreman)
}

fn environment() -> Record {
    record(json!({"environment": {"name": "some_environment"}}))
}

fn subnet() -> Record {
    record(json!({"subnet": {
        "name": "test_subnet",
        "network_type": "IPv4",
        "network": "10.0.0.0",
        "mask": "255.255.255.0",
        "gateway": "10.0.0.1",
        "dns_primary": "10.0.0.2",
        "ipam": "DHCP",
        "boot_mode": "DHCP"
    }}))
}

// =============================================================================
// Create / No-op / Delete Scenarios
// =============================================================================

#[tokio::test]
async fn test_create_missing_record() {
    let enforcer = enforcer(FakeForeman::new());

    let receipt = enforcer
        .ensure_state("present", environment())
        .await
        .expect("create should succeed");

    assert!(receipt.changed());
    assert_eq!(receipt.reason(), ChangeReason::MissingRecord);
    assert!(receipt.original_record().is_none());

    let actual = receipt.actual_record().expect("actual record");
    assert_eq!(actual.record_type(), "environment");
    assert_eq!(actual.get("name"), Some(&json!("some_environment")));
    assert!(actual.id().is_some_and(|id| id.is_u64()));

    let mutations = enforcer.transport().mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, HttpMethod::Post);
    assert_eq!(mutations[0].endpoint, "/api/environments");
    assert_eq!(
        mutations[0].body,
        Some(json!({"environment": {"name": "some_environment"}}))
    );
    assert_eq!(
        mutations[0]
            .headers
            .as_ref()
            .and_then(|h| h.get("Content-Type"))
            .map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_ensure_present_is_idempotent() {
    let enforcer = enforcer(FakeForeman::new());
    let comparator_mappings = ApiMappings::foreman_defaults();

    for minimal in [environment(), subnet()] {
        let first = enforcer
            .ensure_state("present", minimal.clone())
            .await
            .unwrap();
        assert!(first.changed());

        let second = enforcer
            .ensure_state("present", minimal.clone())
            .await
            .unwrap();
        assert!(!second.changed());
        assert_eq!(second.reason(), ChangeReason::StatesMatch);
        assert_eq!(second.actual_record(), second.original_record());

        let actual = second.actual_record().expect("record exists");
        let comparison = RecordComparator::new(&comparator_mappings)
            .compare(first.minimal_record(), actual)
            .unwrap();
        assert!(comparison.matches, "{}", comparison.reason);
    }
}

#[tokio::test]
async fn test_ensure_absent_removes_record() {
    let enforcer = enforcer(FakeForeman::new());
    enforcer.ensure_state("present", environment()).await.unwrap();

    let receipt = enforcer.ensure_state("absent", environment()).await.unwrap();
    assert!(receipt.changed());
    assert_eq!(receipt.reason(), ChangeReason::ExtraRecord);
    assert!(receipt.original_record().is_some());

    let delete = enforcer.transport().mutations().pop().unwrap();
    assert_eq!(delete.method, HttpMethod::Delete);
    assert!(delete.body.is_none());

    let reread = enforcer.read_record(&environment()).await.unwrap();
    assert!(reread.is_none());
}

#[tokio::test]
async fn test_ensure_absent_on_missing_record() {
    let enforcer = enforcer(FakeForeman::new());

    let receipt = enforcer.ensure_state("Absent", environment()).await.unwrap();

    assert!(!receipt.changed());
    assert_eq!(receipt.reason(), ChangeReason::AlreadyAbsent);
    assert_eq!(receipt.reason_detail(), "The record is already absent.");
    assert!(receipt.actual_record().is_none());
    assert!(enforcer.transport().mutations().is_empty());
}

#[tokio::test]
async fn test_mismatch_triggers_update_with_original_id() {
    let foreman = FakeForeman::new();
    let id = foreman.seed(
        "/api/subnets",
        json!({"name": "test_subnet", "network": "10.0.0.0", "mask": "255.255.0.0"}),
    );
    let enforcer = enforcer(foreman);

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"subnet": {"name": "test_subnet", "mask": "255.255.255.0"}})),
        )
        .await
        .unwrap();

    assert!(receipt.changed());
    assert_eq!(receipt.reason(), ChangeReason::RecordMismatch);
    assert!(receipt.reason_detail().contains("mask"));
    assert_eq!(receipt.minimal_record().id(), Some(&json!(id)));
    assert_eq!(
        receipt.original_record().and_then(|r| r.get("mask")),
        Some(&json!("255.255.0.0"))
    );
    assert_eq!(
        receipt.actual_record().and_then(|r| r.get("mask")),
        Some(&json!("255.255.255.0"))
    );

    let update = enforcer.transport().mutations().pop().unwrap();
    assert_eq!(update.method, HttpMethod::Put);
    assert_eq!(update.endpoint, format!("/api/subnets/{id}"));
}

// =============================================================================
// Read-shape vs Write-shape
// =============================================================================

#[tokio::test]
async fn test_nested_read_shape_matches_id_list() {
    let foreman = FakeForeman::new();
    foreman.seed(
        "/api/subnets",
        json!({
            "name": "test_subnet",
            "domains": [{"id": 3, "name": "lab.local"}, {"id": 5, "name": "dmz.local"}]
        }),
    );
    let enforcer = enforcer(foreman);

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"subnet": {"name": "test_subnet", "domain_ids": [5, 3]}})),
        )
        .await
        .unwrap();

    assert!(!receipt.changed(), "{}", receipt.reason_detail());
    assert_eq!(receipt.reason(), ChangeReason::StatesMatch);
}

#[tokio::test]
async fn test_host_write_only_and_domain_suffix() {
    let foreman = FakeForeman::new();
    foreman.seed(
        "/api/hosts",
        json!({"name": "web01.lab.local", "mac": "26:7b:c7:42:c4:cf", "build": true}),
    );
    let enforcer = enforcer(foreman);

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"host": {
                "name": "web01",
                "mac": "26:7B:C7:42:C4:CF",
                "build": "true",
                "root_pass": "changeme123"
            }})),
        )
        .await
        .unwrap();

    assert!(!receipt.changed(), "{}", receipt.reason_detail());

    let read = &enforcer.transport().calls()[0];
    assert_eq!(
        read.endpoint,
        "/api/hosts?search=mac%3D%2226%3A7b%3Ac7%3A42%3Ac4%3Acf%22"
    );
}

// =============================================================================
// Dependencies
// =============================================================================

#[tokio::test]
async fn test_dependency_record_lifecycle() {
    let foreman = FakeForeman::new();
    let os_id = foreman.seed("/api/operatingsystems", json!({"name": "CentOS", "major": "7"}));
    let enforcer = enforcer(foreman);

    let template = record(json!({
        "os_default_template": {
            "operatingsystem_id": os_id.to_string(),
            "provisioning_template_id": "128",
            "template_kind_id": 1
        },
        "dependencies": [{"operatingsystem": {"id": os_id}}]
    }));
    let collection = format!("/api/operatingsystems/{os_id}/os_default_templates");

    let created = enforcer
        .ensure_state("present", template.clone())
        .await
        .unwrap();
    assert_eq!(created.reason(), ChangeReason::MissingRecord);
    assert_eq!(enforcer.transport().mutations()[0].endpoint, collection);
    assert_eq!(
        enforcer.transport().mutations()[0].body,
        Some(json!({"os_default_template": {
            "operatingsystem_id": os_id.to_string(),
            "provisioning_template_id": "128",
            "template_kind_id": 1
        }}))
    );

    let again = enforcer
        .ensure_state("present", template.clone())
        .await
        .unwrap();
    assert_eq!(again.reason(), ChangeReason::StatesMatch);

    let removed = enforcer.ensure_state("absent", template).await.unwrap();
    assert_eq!(removed.reason(), ChangeReason::ExtraRecord);
    assert!(enforcer.transport().records(&collection).is_empty());
}

#[tokio::test]
async fn test_dependency_without_id_fails() {
    let enforcer = enforcer(FakeForeman::new());
    let template = record(json!({
        "os_default_template": {"provisioning_template_id": "128"},
        "dependencies": [{"operatingsystem": {"name": "CentOS"}}]
    }));

    let err = enforcer.ensure_state("present", template).await.unwrap_err();

    assert_eq!(err.root_cause().error_code(), "MISSING_DEPENDENCY_ID");
    assert!(enforcer.transport().calls().is_empty());
}

// =============================================================================
// Search Disambiguation
// =============================================================================

#[tokio::test]
async fn test_buggy_search_is_refiltered() {
    let foreman = FakeForeman::new().with_ignore_search();
    foreman.seed("/api/domains", json!({"name": "lab.local"}));
    let wanted = foreman.seed("/api/domains", json!({"name": "dmz.local"}));
    foreman.seed("/api/domains", json!({"name": "corp.local"}));
    let enforcer = enforcer(foreman);

    let found = enforcer
        .read_record(&record(json!({"domain": {"name": "dmz.local"}})))
        .await
        .unwrap()
        .expect("record should be found");

    assert_eq!(found.id(), Some(&json!(wanted)));
}

#[tokio::test]
async fn test_buggy_search_with_no_real_match_is_absent() {
    let foreman = FakeForeman::new().with_ignore_search();
    foreman.seed("/api/domains", json!({"name": "lab.local"}));
    foreman.seed("/api/domains", json!({"name": "corp.local"}));
    let enforcer = enforcer(foreman);

    let found = enforcer
        .read_record(&record(json!({"domain": {"name": "dmz.local"}})))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_single_unrelated_search_hit_is_never_deleted() {
    let foreman = FakeForeman::new().with_ignore_search();
    foreman.seed("/api/domains", json!({"name": "lab.local"}));
    let enforcer = enforcer(foreman);

    let receipt = enforcer
        .ensure_state("absent", record(json!({"domain": {"name": "dmz.local"}})))
        .await
        .unwrap();

    assert!(!receipt.changed());
    assert_eq!(receipt.reason(), ChangeReason::AlreadyAbsent);
    assert!(enforcer.transport().mutations().is_empty());
    assert_eq!(enforcer.transport().records("/api/domains").len(), 1);
}

#[tokio::test]
async fn test_single_unrelated_search_hit_is_never_overwritten() {
    let foreman = FakeForeman::new().with_ignore_search();
    foreman.seed("/api/domains", json!({"name": "lab.local", "fullname": "Lab"}));
    let enforcer = enforcer(foreman);

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"domain": {"name": "dmz.local", "fullname": "DMZ"}})),
        )
        .await
        .unwrap();

    assert_eq!(receipt.reason(), ChangeReason::MissingRecord);
    let mutations = enforcer.transport().mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, HttpMethod::Post);
    assert_eq!(mutations[0].endpoint, "/api/domains");

    let lab = enforcer
        .transport()
        .records("/api/domains")
        .into_iter()
        .find(|domain| domain["name"] == "lab.local")
        .expect("unrelated record is kept");
    assert_eq!(lab["fullname"], json!("Lab"));
}

#[tokio::test]
async fn test_duplicate_matches_are_ambiguous() {
    let foreman = FakeForeman::new();
    foreman.seed("/api/hosts", json!({"name": "a", "mac": "aa:bb:cc:dd:ee:ff"}));
    foreman.seed("/api/hosts", json!({"name": "b", "mac": "aa:bb:cc:dd:ee:ff"}));
    let enforcer = enforcer(foreman);

    let err = enforcer
        .ensure_state("present", record(json!({"host": {"mac": "aa:bb:cc:dd:ee:ff"}})))
        .await
        .unwrap_err();

    match err.root_cause() {
        StateError::AmbiguousResult {
            record_type, count, ..
        } => {
            assert_eq!(record_type, "host");
            assert_eq!(*count, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(enforcer.transport().mutations().is_empty());
}

// =============================================================================
// Identity Confirmation
// =============================================================================

#[tokio::test]
async fn test_identity_mismatch_after_create() {
    let foreman = FakeForeman::new().with_tampered_responses();
    let enforcer = enforcer(foreman);

    let err = enforcer
        .ensure_state("present", environment())
        .await
        .unwrap_err();

    let inner = err.inner().expect("reconciliation wraps the cause");
    match inner {
        StateError::ModifiedRecordMismatch {
            endpoint,
            method,
            response,
            ..
        } => {
            assert_eq!(endpoint, "/api/environments");
            assert_eq!(*method, HttpMethod::Post);
            assert_eq!(response["name"], json!("someone_else"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.root_cause().error_code(), "IDENTITY_MISMATCH");
}

#[tokio::test]
async fn test_identity_mismatch_after_update() {
    let foreman = FakeForeman::new().with_tampered_responses();
    foreman.seed("/api/environments", json!({"name": "some_environment", "puppet": false}));
    let enforcer = enforcer(foreman);

    let err = enforcer
        .ensure_state(
            "present",
            record(json!({"environment": {"name": "some_environment", "puppet": true}})),
        )
        .await
        .unwrap_err();

    assert_eq!(err.inner().map(StateError::error_code), Some("MODIFIED_RECORD_MISMATCH"));
}

// =============================================================================
// Write Normalization
// =============================================================================

fn subnet_domain_rule() -> PropertyMapping {
    PropertyMapping::many("domains", "domain_ids", "$.subnet.domains.[*].id").unwrap()
}

fn write_normalizing_enforcer(foreman: FakeForeman) -> StateEnforcer<FakeForeman> {
    init_tracing();
    let mappings = ApiMappings::foreman_defaults()
        .with_property_mapping(HttpMethod::Post, "subnet", subnet_domain_rule())
        .with_property_mapping(HttpMethod::Put, "subnet", subnet_domain_rule());
    StateEnforcer::new(foreman, Arc::new(mappings))
}

#[tokio::test]
async fn test_create_sends_write_shape() {
    let enforcer = write_normalizing_enforcer(FakeForeman::new());

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"subnet": {"name": "lab", "domains": [{"id": 3, "name": "lab.local"}]}})),
        )
        .await
        .unwrap();

    assert_eq!(receipt.reason(), ChangeReason::MissingRecord);
    let mutations = enforcer.transport().mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, HttpMethod::Post);
    assert_eq!(
        mutations[0].body,
        Some(json!({"subnet": {"name": "lab", "domain_ids": [3]}}))
    );
}

#[tokio::test]
async fn test_update_sends_write_shape() {
    let foreman = FakeForeman::new();
    let id = foreman.seed("/api/subnets", json!({"name": "lab", "domain_ids": [1]}));
    let enforcer = write_normalizing_enforcer(foreman);

    let receipt = enforcer
        .ensure_state(
            "present",
            record(json!({"subnet": {"name": "lab", "domains": [{"id": 3, "name": "dmz.local"}]}})),
        )
        .await
        .unwrap();

    assert_eq!(receipt.reason(), ChangeReason::RecordMismatch);
    let mutations = enforcer.transport().mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, HttpMethod::Put);
    assert_eq!(mutations[0].endpoint, format!("/api/subnets/{id}"));
    assert_eq!(
        mutations[0].body,
        Some(json!({"subnet": {"name": "lab", "domain_ids": [3], "id": id}}))
    );
    assert_eq!(
        enforcer.transport().records("/api/subnets")[0]["domain_ids"],
        json!([3])
    );
}

// =============================================================================
// Identification Policy
// =============================================================================

#[tokio::test]
async fn test_identification_replace_policy_rejects_name_only_host() {
    let enforcer = enforcer(FakeForeman::new());

    let err = enforcer
        .create_record(&record(json!({"host": {"name": "web01"}})))
        .await
        .unwrap_err();

    assert_eq!(err.root_cause().error_code(), "NO_IDENTIFIER");
    assert!(enforcer.transport().calls().is_empty());
}

#[tokio::test]
async fn test_identification_append_policy_accepts_name_only_host() {
    init_tracing();
    let mappings = ApiMappings::foreman_defaults().with_identification_mode(IdentificationMode::Append);
    let enforcer = StateEnforcer::new(FakeForeman::new(), Arc::new(mappings));

    let created = enforcer
        .create_record(&record(json!({"host": {"name": "web01"}})))
        .await
        .unwrap();

    assert_eq!(created.get("name"), Some(&json!("web01")));
}

// =============================================================================
// Shared Tables
// =============================================================================

#[tokio::test]
async fn test_enforcers_share_mapping_tables() {
    init_tracing();
    let mappings = Arc::new(ApiMappings::foreman_defaults());
    let first = StateEnforcer::new(FakeForeman::new(), Arc::clone(&mappings));
    let second = StateEnforcer::new(FakeForeman::new(), Arc::clone(&mappings));

    let (a, b) = tokio::join!(
        first.ensure_state("present", environment()),
        second.ensure_state("present", subnet()),
    );

    assert!(a.unwrap().changed());
    assert!(b.unwrap().changed());
    assert_eq!(Arc::strong_count(&mappings), 3);
}
