use chronofhir_api::ErrorKind;
use chronofhir_core::{RequestContext, SummaryMode};
use chronofhir_server::{Dispatcher, ProtocolRequest, ServerBuilder};
use serde_json::{Value, json};

const BASE: &str = "http://example.org/fhir";

fn params(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn seeded() -> (Dispatcher, RequestContext) {
    let server = ServerBuilder::new().build().await.expect("server");
    let d = server.dispatcher().clone();
    let ctx = RequestContext::builder().base_uri(BASE).build();

    for id in ["a", "b", "c", "d"] {
        let resp = d
            .handle(
                ProtocolRequest::update(
                    "Patient",
                    id,
                    json!({
                        "resourceType": "Patient",
                        "text": {"status": "generated", "div": "<div>x</div>"},
                        "contained": [{"resourceType": "Organization", "id": "org"}],
                        "active": true
                    }),
                ),
                &ctx,
            )
            .await;
        assert!(resp.is_success());
    }
    d.handle(
        ProtocolRequest::update("Observation", "o1", json!({"resourceType": "Observation"})),
        &ctx,
    )
    .await;
    d.handle(ProtocolRequest::delete("Patient", "d"), &ctx).await;
    (d, ctx)
}

fn ids(bundle: &chronofhir_api::Bundle) -> Vec<String> {
    bundle
        .matches()
        .map(|e| e.resource.as_ref().unwrap()["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn search_by_id_and_everything() {
    let (d, ctx) = seeded().await;

    let all = d.handle(ProtocolRequest::search("Patient", vec![]), &ctx).await;
    let bundle = all.bundle().unwrap();
    assert_eq!(bundle.total, Some(3));
    assert_eq!(ids(bundle), vec!["a", "b", "c"]);
    assert_eq!(bundle.link[0].url, format!("{BASE}/Patient"));
    assert_eq!(
        bundle.entry[0].full_url.as_deref(),
        Some(format!("{BASE}/Patient/a").as_str())
    );

    let one = d
        .handle(ProtocolRequest::search("Patient", params(&[("_id", "b")])), &ctx)
        .await;
    assert_eq!(ids(one.bundle().unwrap()), vec!["b"]);

    // OR within a value, AND across repeats
    let both = d
        .handle(
            ProtocolRequest::search("Patient", params(&[("_id", "a,b,c"), ("_id", "c,a")])),
            &ctx,
        )
        .await;
    assert_eq!(ids(both.bundle().unwrap()), vec!["a", "c"]);

    // Deleted resources and other types never match
    let deleted = d
        .handle(ProtocolRequest::search("Patient", params(&[("_id", "d,o1")])), &ctx)
        .await;
    assert_eq!(deleted.bundle().unwrap().total, Some(0));
}

#[tokio::test]
async fn total_is_counted_before_the_page_limit() {
    let (d, ctx) = seeded().await;

    let limited = d
        .handle(ProtocolRequest::search("Patient", params(&[("_count", "2")])), &ctx)
        .await;
    let bundle = limited.bundle().unwrap();
    assert_eq!(bundle.total, Some(3));
    assert_eq!(bundle.matches().count(), 2);

    let paged_ctx = RequestContext::builder().base_uri(BASE).page_size(1).build();
    let paged = d.handle(ProtocolRequest::search("Patient", vec![]), &paged_ctx).await;
    assert_eq!(paged.bundle().unwrap().matches().count(), 1);

    let bad = d
        .handle(ProtocolRequest::search("Patient", params(&[("_count", "lots")])), &ctx)
        .await;
    assert_eq!(bad.error_kind, Some(ErrorKind::BadRequest));
}

#[tokio::test]
async fn unsupported_parameters_produce_one_warning_entry() {
    let (d, ctx) = seeded().await;

    let resp = d
        .handle(
            ProtocolRequest::search(
                "Patient",
                params(&[("name", "Doe"), ("_count", "1"), ("gender", "female")]),
            ),
            &ctx,
        )
        .await;
    let bundle = resp.bundle().unwrap();
    assert_eq!(bundle.total, Some(3));
    assert_eq!(bundle.matches().count(), 1);

    let outcomes: Vec<_> = bundle.outcomes().collect();
    assert_eq!(outcomes.len(), 1);
    // The warning comes after the truncated matches
    assert_eq!(bundle.entry.len(), 2);
    let outcome = outcomes[0].resource.as_ref().unwrap();
    assert_eq!(outcome["issue"][0]["severity"], "warning");
    assert_eq!(
        outcome["issue"][0]["diagnostics"],
        "Unsupported search parameters used: name=Doe&gender=female"
    );

    // Result-shaping parameters are accepted silently
    let quiet = d
        .handle(
            ProtocolRequest::search("Patient", params(&[("_format", "json"), ("_sort", "_id")])),
            &ctx,
        )
        .await;
    assert_eq!(quiet.bundle().unwrap().outcomes().count(), 0);
}

#[tokio::test]
async fn summary_modes() {
    let (d, ctx) = seeded().await;

    let count = d
        .handle(ProtocolRequest::search("Patient", params(&[("_summary", "count")])), &ctx)
        .await;
    let bundle = count.bundle().unwrap();
    assert_eq!(bundle.total, Some(3));
    assert!(bundle.entry.is_empty());
    assert_eq!(count.summary, SummaryMode::Count);

    let data = d
        .handle(ProtocolRequest::search("Patient", params(&[("_summary", "data")])), &ctx)
        .await;
    let first = data.bundle().unwrap().entry[0].resource.clone().unwrap();
    assert!(first.get("text").is_none());
    assert!(first.get("contained").is_some());
    assert_subsetted(&first);

    let summary_ctx = RequestContext::builder()
        .base_uri(BASE)
        .summary(SummaryMode::True)
        .build();
    let read = d.handle(ProtocolRequest::read("Patient", "a"), &summary_ctx).await;
    let body = read.resource().unwrap();
    assert!(body.get("text").is_none());
    assert!(body.get("contained").is_none());
    assert_eq!(body["active"], true);
    assert_subsetted(body);

    let full = d.handle(ProtocolRequest::read("Patient", "a"), &ctx).await;
    assert!(full.resource().unwrap().get("text").is_some());

    let bad = d
        .handle(ProtocolRequest::search("Patient", params(&[("_summary", "most")])), &ctx)
        .await;
    assert_eq!(bad.error_kind, Some(ErrorKind::BadRequest));
}

fn assert_subsetted(resource: &Value) {
    let tags = resource["meta"]["tag"].as_array().expect("meta.tag");
    assert!(tags.iter().any(|t| t["code"] == "SUBSETTED"));
}

#[tokio::test]
async fn type_and_system_history() {
    let (d, ctx) = seeded().await;

    let type_history = d
        .handle(ProtocolRequest::type_history("Patient", vec![]), &ctx)
        .await;
    let bundle = type_history.bundle().unwrap();
    // four creates and one delete
    assert_eq!(bundle.total, Some(5));
    assert!(bundle.entry.iter().all(|e| {
        e.full_url
            .as_deref()
            .is_some_and(|u| u.starts_with(&format!("{BASE}/Patient/")))
    }));

    let system = d.handle(ProtocolRequest::system_history(vec![]), &ctx).await;
    let bundle = system.bundle().unwrap();
    assert_eq!(bundle.total, Some(6));
    assert_eq!(bundle.link[0].url, format!("{BASE}/_history"));

    let limited = d
        .handle(ProtocolRequest::system_history(params(&[("_count", "2")])), &ctx)
        .await;
    let bundle = limited.bundle().unwrap();
    assert_eq!(bundle.total, Some(6));
    assert_eq!(bundle.entry.len(), 2);

    let counted = d
        .handle(
            ProtocolRequest::system_history(params(&[("_summary", "count")])),
            &ctx,
        )
        .await;
    assert!(counted.bundle().unwrap().entry.is_empty());
}

#[tokio::test]
async fn history_time_window() {
    let (d, ctx) = seeded().await;

    let future = d
        .handle(
            ProtocolRequest::system_history(params(&[("_since", "2999-01-01T00:00:00Z")])),
            &ctx,
        )
        .await;
    assert_eq!(future.bundle().unwrap().total, Some(0));

    let past = d
        .handle(
            ProtocolRequest::system_history(params(&[("_till", "2000-01-01")])),
            &ctx,
        )
        .await;
    assert_eq!(past.bundle().unwrap().total, Some(0));

    let open = d
        .handle(
            ProtocolRequest::system_history(params(&[
                ("_since", "2000-01-01"),
                ("_till", "2999-01-01T00:00:00Z"),
            ])),
            &ctx,
        )
        .await;
    assert_eq!(open.bundle().unwrap().total, Some(6));

    let bad = d
        .handle(
            ProtocolRequest::system_history(params(&[("_since", "yesterday")])),
            &ctx,
        )
        .await;
    assert_eq!(bad.error_kind, Some(ErrorKind::BadRequest));
}

#[tokio::test]
async fn instance_history_of_unknown_resource() {
    let (d, ctx) = seeded().await;
    let resp = d
        .handle(ProtocolRequest::instance_history("Patient", "zzz", vec![]), &ctx)
        .await;
    assert_eq!(resp.error_kind, Some(ErrorKind::NotFound));

    let deleted = d
        .handle(ProtocolRequest::instance_history("Patient", "d", vec![]), &ctx)
        .await;
    assert_eq!(deleted.bundle().unwrap().total, Some(2));
}
