//! Concurrent writers against one version chain.
//!
//! Exactly one writer may take each version number; losers surface as
//! `Conflict` and never leave a gap or a duplicate in the chain.

use std::collections::HashSet;
use std::sync::Arc;

use chronofhir_api::ErrorKind;
use chronofhir_core::{RequestContext, VersionId};
use chronofhir_db_fs::DirectoryVersionStore;
use chronofhir_db_memory::InMemoryVersionStore;
use chronofhir_server::{Dispatcher, ProtocolRequest, ServerBuilder};
use chronofhir_storage::{DynVersionStore, ExpectedVersion, NewVersion};
use futures_util::future::join_all;
use serde_json::json;

const WRITERS: usize = 16;

async fn dispatcher_over(store: DynVersionStore) -> Dispatcher {
    ServerBuilder::new()
        .with_store(store)
        .build()
        .await
        .expect("server")
        .dispatcher()
        .clone()
}

async fn race_updates(d: Dispatcher) {
    let ctx = RequestContext::builder().base_uri("http://example.org/fhir").build();
    let seed = d
        .handle(
            ProtocolRequest::update("Patient", "p1", json!({"resourceType": "Patient"})),
            &ctx,
        )
        .await;
    assert_eq!(seed.status.code(), 201);

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let d = d.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                d.handle(
                    ProtocolRequest::update(
                        "Patient",
                        "p1",
                        json!({"resourceType": "Patient", "writer": n}),
                    ),
                    &ctx,
                )
                .await
            })
        })
        .collect();

    let mut versions = HashSet::new();
    let mut conflicts = 0;
    for handle in join_all(handles).await {
        let resp = handle.expect("task");
        match resp.error_kind {
            None => {
                let version = resp.resource().unwrap()["meta"]["versionId"]
                    .as_str()
                    .unwrap()
                    .to_string();
                assert!(versions.insert(version), "version handed out twice");
            }
            Some(ErrorKind::Conflict) => conflicts += 1,
            Some(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(versions.len() + conflicts, WRITERS);
    assert!(!versions.is_empty());

    // The chain is gapless: seed plus one version per winner
    let history = d
        .handle(ProtocolRequest::instance_history("Patient", "p1", vec![]), &ctx)
        .await;
    let total = history.bundle().unwrap().total.unwrap() as usize;
    assert_eq!(total, versions.len() + 1);

    let current = d.handle(ProtocolRequest::read("Patient", "p1"), &ctx).await;
    assert_eq!(
        current.resource().unwrap()["meta"]["versionId"],
        total.to_string()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_in_memory() {
    let d = dispatcher_over(Arc::new(InMemoryVersionStore::new())).await;
    race_updates(d).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_on_disk() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let store = DirectoryVersionStore::open(dir.path()).await.expect("open");
    let d = dispatcher_over(Arc::new(store)).await;
    race_updates(d).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compare_and_swap_has_one_winner() {
    let store: DynVersionStore = Arc::new(InMemoryVersionStore::new());
    store
        .write_next(
            NewVersion::content("Patient", "p1", json!({})),
            ExpectedVersion::NoChain,
        )
        .await
        .unwrap();

    let attempts = (0..WRITERS).map(|n| {
        let store = store.clone();
        async move {
            store
                .write_next(
                    NewVersion::content("Patient", "p1", json!({"n": n})),
                    ExpectedVersion::Exactly(VersionId::FIRST),
                )
                .await
        }
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_version_conflict())
    );

    let current = store.read_current("Patient", "p1").await.unwrap().unwrap();
    assert_eq!(current.version_id().get(), 2);
}

#[tokio::test]
async fn directory_store_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let ctx = RequestContext::builder().base_uri("http://example.org/fhir").build();

    {
        let store = DirectoryVersionStore::open(dir.path()).await.expect("open");
        let d = dispatcher_over(Arc::new(store)).await;
        for active in [true, false] {
            d.handle(
                ProtocolRequest::update(
                    "Patient",
                    "p1",
                    json!({"resourceType": "Patient", "active": active}),
                ),
                &ctx,
            )
            .await;
        }
        d.handle(ProtocolRequest::delete("Patient", "p1"), &ctx).await;
    }

    let store = DirectoryVersionStore::open(dir.path()).await.expect("reopen");
    let d = dispatcher_over(Arc::new(store)).await;

    let gone = d.handle(ProtocolRequest::read("Patient", "p1"), &ctx).await;
    assert_eq!(gone.error_kind, Some(ErrorKind::Gone));

    let v2 = d.handle(ProtocolRequest::vread("Patient", "p1", "2"), &ctx).await;
    assert_eq!(v2.resource().unwrap()["active"], false);

    let next = d
        .handle(
            ProtocolRequest::update("Patient", "p1", json!({"resourceType": "Patient"})),
            &ctx,
        )
        .await;
    assert_eq!(next.resource().unwrap()["meta"]["versionId"], "4");
}
