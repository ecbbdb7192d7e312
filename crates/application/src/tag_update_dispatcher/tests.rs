use std::sync::Arc;

use tagsync_core::SubscriptionId;
use tagsync_domain::{AuditConfig, TagUpdateRequest};

use crate::api_version_resolver::ApiVersionResolver;
use crate::audit_stats_recorder::AuditStatsRecorder;
use crate::invalid_type_registry::InvalidTypeRegistry;
use crate::tag_audit_service::TagAuditService;
use crate::tag_sync_ports::TagUpdateQueue;
use crate::test_support::{
    FakeAuditConfigRepository, FakeAuditStatsRepository, FakeInvalidTypeRepository,
    FakeResourceGraph, FakeTagUpdateQueue, tags,
};

use super::{DispatchBatchReport, TagUpdateDispatcher, TagUpdateOutcome};

const SUBSCRIPTION: &str = "sub-1";

struct Harness {
    graph: Arc<FakeResourceGraph>,
    invalid_types: Arc<FakeInvalidTypeRepository>,
    queue: Arc<FakeTagUpdateQueue>,
    dispatcher: TagUpdateDispatcher,
}

fn harness() -> Harness {
    let graph = Arc::new(FakeResourceGraph::default());
    let invalid_types = Arc::new(FakeInvalidTypeRepository::default());
    let queue = Arc::new(FakeTagUpdateQueue::default());
    let dispatcher = TagUpdateDispatcher::new(
        graph.clone(),
        InvalidTypeRegistry::new(invalid_types.clone()),
        queue.clone(),
    );

    Harness {
        graph,
        invalid_types,
        queue,
        dispatcher,
    }
}

fn request_for(resource_id: &str, resource_type: &str) -> TagUpdateRequest {
    TagUpdateRequest {
        resource_id: resource_id.to_owned(),
        api_version: "2023-01-01".to_owned(),
        location: "westeurope".to_owned(),
        tags: tags(&[("costCenter", "CC1"), ("env", "prod")]),
        resource_type: resource_type.to_owned(),
        subscription_id: SubscriptionId::new(SUBSCRIPTION).unwrap_or_else(|_| unreachable!()),
    }
}

#[tokio::test]
async fn apply_overlays_requested_tags_on_current_tags() {
    let harness = harness();
    let resource_id = harness
        .graph
        .add_resource(
            SUBSCRIPTION,
            "rg-app",
            "store1",
            "Microsoft.Storage/storageAccounts",
            // `owner` was added after the request was emitted.
            Some(tags(&[("env", "prod"), ("owner", "ops")])),
        )
        .await;

    let request = request_for(resource_id.as_str(), "Microsoft.Storage/storageAccounts");
    let outcome = harness.dispatcher.apply(&request).await;

    assert_eq!(outcome.ok(), Some(TagUpdateOutcome::Applied));
    let updates = harness.graph.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, resource_id);
    assert_eq!(updates[0].1, "2023-01-01");
    assert_eq!(updates[0].2.location, "westeurope");
    assert_eq!(
        updates[0].2.tags,
        tags(&[("costCenter", "CC1"), ("env", "prod"), ("owner", "ops")])
    );
}

#[tokio::test]
async fn repeated_apply_writes_the_same_tags() {
    let harness = harness();
    let resource_id = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "site1", "Microsoft.Web/sites", None)
        .await;
    let request = request_for(resource_id.as_str(), "Microsoft.Web/sites");

    assert_eq!(
        harness.dispatcher.apply(&request).await.ok(),
        Some(TagUpdateOutcome::Applied)
    );
    assert_eq!(
        harness.dispatcher.apply(&request).await.ok(),
        Some(TagUpdateOutcome::Applied)
    );

    let updates = harness.graph.updates().await;
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].2, updates[1].2);
}

#[tokio::test]
async fn rejected_write_registers_type_and_later_requests_are_skipped() {
    let harness = harness();
    harness.graph.reject_writes_for("Microsoft.Foo/bar").await;
    let first = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "one", "Microsoft.Foo/bar", None)
        .await;
    let second = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "two", "Microsoft.Foo/bar", None)
        .await;

    let outcome = harness
        .dispatcher
        .apply(&request_for(first.as_str(), "Microsoft.Foo/bar"))
        .await;
    assert!(matches!(outcome, Ok(TagUpdateOutcome::Failed { .. })));
    assert_eq!(harness.invalid_types.record_count().await, 1);

    let outcome = harness
        .dispatcher
        .apply(&request_for(second.as_str(), "Microsoft.Foo/bar"))
        .await;
    assert_eq!(outcome.ok(), Some(TagUpdateOutcome::SkippedInvalidType));
    assert!(harness.graph.updates().await.is_empty());
}

#[tokio::test]
async fn missing_resource_is_a_terminal_failure() {
    let harness = harness();

    let outcome = harness
        .dispatcher
        .apply(&request_for("/subscriptions/sub-1/gone", "Microsoft.Web/sites"))
        .await;

    assert!(matches!(outcome, Ok(TagUpdateOutcome::Failed { .. })));
    assert_eq!(harness.invalid_types.record_count().await, 1);
}

#[tokio::test]
async fn concurrent_failures_converge_and_later_audits_skip_the_type() {
    let harness = harness();
    harness.graph.reject_writes_for("Microsoft.Foo/bar").await;
    harness
        .graph
        .add_group(SUBSCRIPTION, "rg-app", tags(&[("costCenter", "CC1")]))
        .await;
    harness.graph.add_type("Microsoft.Foo", "bar", "2023-01-01").await;

    let mut requests = Vec::new();
    for index in 0..6 {
        let resource_id = harness
            .graph
            .add_resource(
                SUBSCRIPTION,
                "rg-app",
                format!("item{index}").as_str(),
                "Microsoft.Foo/bar",
                None,
            )
            .await;
        requests.push(request_for(resource_id.as_str(), "Microsoft.Foo/bar"));
    }

    let mut handles = Vec::new();
    for request in requests {
        let dispatcher = harness.dispatcher.clone();
        handles.push(tokio::spawn(async move { dispatcher.apply(&request).await }));
    }
    for handle in handles {
        assert!(matches!(
            handle.await,
            Ok(Ok(
                TagUpdateOutcome::Failed { .. } | TagUpdateOutcome::SkippedInvalidType
            ))
        ));
    }
    assert_eq!(harness.invalid_types.record_count().await, 1);

    let configs = Arc::new(
        FakeAuditConfigRepository::with_configs(vec![
            AuditConfig::from_csv(SUBSCRIPTION, "costCenter").unwrap_or_else(|_| unreachable!()),
        ])
        .await,
    );
    let audit_queue = Arc::new(FakeTagUpdateQueue::default());
    let audit = TagAuditService::new(
        configs,
        harness.graph.clone(),
        Arc::new(ApiVersionResolver::new(harness.graph.clone())),
        InvalidTypeRegistry::new(harness.invalid_types.clone()),
        audit_queue.clone(),
        AuditStatsRecorder::new(Arc::new(FakeAuditStatsRepository::default())),
    );

    let summary = audit.run_audit().await.unwrap_or_default();

    assert!(audit_queue.pending_requests().await.is_empty());
    assert_eq!(summary.runs[0].resource_items_skipped, 6);
}

#[tokio::test]
async fn batch_acknowledges_settled_messages() {
    let harness = harness();
    harness.graph.reject_writes_for("Microsoft.Foo/bar").await;
    let good = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "site1", "Microsoft.Web/sites", None)
        .await;
    let bad = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "thing", "Microsoft.Foo/bar", None)
        .await;
    for request in [
        request_for(good.as_str(), "Microsoft.Web/sites"),
        request_for(bad.as_str(), "Microsoft.Foo/bar"),
    ] {
        assert!(harness.queue.enqueue(&request).await.is_ok());
    }

    let report = harness.dispatcher.process_batch("worker-1", 10, 30).await;

    assert_eq!(
        report.ok(),
        Some(DispatchBatchReport {
            received: 2,
            applied: 1,
            skipped: 0,
            failed: 1,
            deferred: 0,
        })
    );
    assert_eq!(harness.queue.acknowledged().await.len(), 2);
    assert!(harness.queue.pending_requests().await.is_empty());
}

#[tokio::test]
async fn batch_defers_message_when_registry_write_fails() {
    let harness = harness();
    harness.graph.reject_writes_for("Microsoft.Foo/bar").await;
    harness.invalid_types.fail_writes().await;
    let bad = harness
        .graph
        .add_resource(SUBSCRIPTION, "rg-app", "thing", "Microsoft.Foo/bar", None)
        .await;
    assert!(
        harness
            .queue
            .enqueue(&request_for(bad.as_str(), "Microsoft.Foo/bar"))
            .await
            .is_ok()
    );

    let report = harness
        .dispatcher
        .process_batch("worker-1", 10, 30)
        .await
        .unwrap_or_default();

    assert_eq!(report.received, 1);
    assert_eq!(report.deferred, 1);
    assert!(harness.queue.acknowledged().await.is_empty());
    assert_eq!(harness.queue.pending_requests().await.len(), 1);
}

#[tokio::test]
async fn batch_rejects_invalid_arguments() {
    let harness = harness();

    assert!(harness.dispatcher.process_batch(" ", 10, 30).await.is_err());
    assert!(harness.dispatcher.process_batch("worker-1", 0, 30).await.is_err());
    assert!(harness.dispatcher.process_batch("worker-1", 10, 0).await.is_err());
}
