//! Create, update, read, delete and history of a single resource,
//! driven through the dispatcher the way a transport would.

use chronofhir_api::ErrorKind;
use chronofhir_core::{FhirDateTime, RequestContext};
use chronofhir_server::{Dispatcher, ProtocolRequest, ServerBuilder};
use serde_json::json;

const BASE: &str = "http://example.org/fhir";

async fn dispatcher() -> Dispatcher {
    let server = ServerBuilder::new().build().await.expect("server");
    server.dispatcher().clone()
}

fn ctx() -> RequestContext {
    RequestContext::builder().base_uri(BASE).build()
}

#[tokio::test]
async fn create_update_delete_then_history() {
    let d = dispatcher().await;
    let ctx = ctx();

    // Create
    let created = d
        .handle(
            ProtocolRequest::create(
                "Patient",
                json!({"resourceType": "Patient", "name": [{"family": "Doe"}]}),
            ),
            &ctx,
        )
        .await;
    assert_eq!(created.status.code(), 201);
    let body = created.resource().expect("created body").clone();
    let id = body["id"].as_str().expect("assigned id").to_string();
    assert_eq!(body["meta"]["versionId"], "1");
    assert_eq!(created.etag.as_deref(), Some("W/\"1\""));
    assert_eq!(
        created.location.as_deref(),
        Some(format!("{BASE}/Patient/{id}/_history/1").as_str())
    );

    // Update
    let updated = d
        .handle(
            ProtocolRequest::update(
                "Patient",
                &id,
                json!({"resourceType": "Patient", "name": [{"family": "Roe"}]}),
            ),
            &ctx,
        )
        .await;
    assert_eq!(updated.status.code(), 200);
    let body = updated.resource().expect("updated body");
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["meta"]["versionId"], "2");
    assert_eq!(body["name"][0]["family"], "Roe");

    // Delete
    let deleted = d.handle(ProtocolRequest::delete("Patient", &id), &ctx).await;
    assert_eq!(deleted.status.code(), 204);
    assert!(deleted.to_json().is_none());
    assert_eq!(deleted.etag.as_deref(), Some("W/\"3\""));

    // Read after delete
    let gone = d.handle(ProtocolRequest::read("Patient", &id), &ctx).await;
    assert_eq!(gone.status.code(), 410);
    assert_eq!(gone.error_kind, Some(ErrorKind::Gone));
    assert_eq!(gone.to_json().unwrap()["resourceType"], "OperationOutcome");

    // History keeps every version, including the tombstone
    let history = d
        .handle(ProtocolRequest::instance_history("Patient", &id, vec![]), &ctx)
        .await;
    assert!(history.is_success());
    let bundle = history.bundle().expect("history bundle");
    assert_eq!(bundle.total, Some(3));
    let methods: Vec<&str> = bundle
        .entry
        .iter()
        .map(|e| e.request.as_ref().unwrap().method.as_str())
        .collect();
    assert_eq!(methods, vec!["POST", "PUT", "DELETE"]);
    assert!(bundle.entry[2].resource.is_none());
    assert_eq!(
        bundle.entry[0].full_url.as_deref(),
        Some(format!("{BASE}/Patient/{id}").as_str())
    );
}

#[tokio::test]
async fn historical_versions_are_immutable() {
    let d = dispatcher().await;
    let ctx = ctx();

    let created = d
        .handle(
            ProtocolRequest::update("Patient", "p1", json!({"resourceType": "Patient", "active": true})),
            &ctx,
        )
        .await;
    assert_eq!(created.status.code(), 201);

    for active in [false, true, false] {
        let resp = d
            .handle(
                ProtocolRequest::update(
                    "Patient",
                    "p1",
                    json!({"resourceType": "Patient", "active": active}),
                ),
                &ctx,
            )
            .await;
        assert_eq!(resp.status.code(), 200);
    }

    let v1 = d.handle(ProtocolRequest::vread("Patient", "p1", "1"), &ctx).await;
    assert_eq!(v1.resource().unwrap()["active"], true);
    assert_eq!(v1.resource().unwrap()["meta"]["versionId"], "1");

    let v3 = d.handle(ProtocolRequest::vread("Patient", "p1", "3"), &ctx).await;
    assert_eq!(v3.resource().unwrap()["active"], true);

    let current = d.handle(ProtocolRequest::read("Patient", "p1"), &ctx).await;
    assert_eq!(current.resource().unwrap()["meta"]["versionId"], "4");
    assert_eq!(current.resource().unwrap()["active"], false);

    let missing = d.handle(ProtocolRequest::vread("Patient", "p1", "9"), &ctx).await;
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));

    let bad = d.handle(ProtocolRequest::vread("Patient", "p1", "zero"), &ctx).await;
    assert_eq!(bad.error_kind, Some(ErrorKind::BadRequest));
}

#[tokio::test]
async fn last_updated_never_goes_backwards() {
    let d = dispatcher().await;
    let ctx = ctx();

    let mut previous: Option<FhirDateTime> = None;
    for n in 0..5 {
        let resp = d
            .handle(
                ProtocolRequest::update("Observation", "o1", json!({"resourceType": "Observation", "n": n})),
                &ctx,
            )
            .await;
        let stamp: FhirDateTime = resp.resource().unwrap()["meta"]["lastUpdated"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        if let Some(previous) = previous {
            assert!(stamp >= previous, "{stamp} < {previous}");
        }
        previous = Some(stamp);
    }
}

#[tokio::test]
async fn delete_is_idempotent_and_recreate_continues_the_chain() {
    let d = dispatcher().await;
    let ctx = ctx();

    d.handle(
        ProtocolRequest::update("Patient", "p2", json!({"resourceType": "Patient"})),
        &ctx,
    )
    .await;

    let first = d.handle(ProtocolRequest::delete("Patient", "p2"), &ctx).await;
    assert_eq!(first.status.code(), 204);
    let second = d.handle(ProtocolRequest::delete("Patient", "p2"), &ctx).await;
    assert_eq!(second.status.code(), 204);
    assert!(second.etag.is_none());

    let never = d.handle(ProtocolRequest::delete("Patient", "nobody"), &ctx).await;
    assert_eq!(never.status.code(), 204);

    let again = d
        .handle(
            ProtocolRequest::update("Patient", "p2", json!({"resourceType": "Patient"})),
            &ctx,
        )
        .await;
    assert_eq!(again.status.code(), 200);
    assert_eq!(again.resource().unwrap()["meta"]["versionId"], "3");
}

#[tokio::test]
async fn body_problems_are_bad_requests() {
    let d = dispatcher().await;
    let ctx = ctx();

    let wrong_type = d
        .handle(
            ProtocolRequest::create("Patient", json!({"resourceType": "Observation"})),
            &ctx,
        )
        .await;
    assert_eq!(wrong_type.error_kind, Some(ErrorKind::BadRequest));

    let with_id = d
        .handle(
            ProtocolRequest::create("Patient", json!({"resourceType": "Patient", "id": "x"})),
            &ctx,
        )
        .await;
    assert_eq!(with_id.error_kind, Some(ErrorKind::BadRequest));

    let mismatch = d
        .handle(
            ProtocolRequest::update("Patient", "a", json!({"resourceType": "Patient", "id": "b"})),
            &ctx,
        )
        .await;
    assert_eq!(mismatch.error_kind, Some(ErrorKind::BadRequest));

    let not_object = d
        .handle(ProtocolRequest::create("Patient", json!([1, 2])), &ctx)
        .await;
    assert_eq!(not_object.error_kind, Some(ErrorKind::BadRequest));
}
