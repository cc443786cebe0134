//! End-to-end delivery handling over the in-memory broker: acknowledgement
//! decisions, dead-lettering, and consumption across reconnects.
use std::sync::Arc;

use blockchain_queue_worker::{
    jobs::JobType,
    models::{JobResult, QueueError},
    queue::{AckDecision, QueueConsumer},
    services::OffchainClientError,
};
use serde_json::json;

use super::support::{consumer, eventually, ready, BrokerLog, InMemoryBroker, ScriptedExecutor};

async fn settled_count(log: &Arc<BrokerLog>, count: usize) -> bool {
    let log = Arc::clone(log);
    eventually(|| {
        let log = Arc::clone(&log);
        async move { log.settled().len() >= count }
    })
    .await
}

async fn stop(consumer: &Arc<QueueConsumer>) {
    consumer.stop_accepting();
    assert!(consumer.drain(std::time::Duration::from_secs(5)).await);
    consumer.close().await;
}

#[tokio::test]
async fn test_successful_job_is_acked_exactly_once() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok").with_tx_hash("0xabc")));
    let (consumer, stats) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let tag = broker.publish_json(json!({
        "id": "job-1",
        "type": "REGISTER_PROPERTY",
        "payload": {"matriculaId": "555666", "folha": "300"},
        "attempts": 0
    }));

    assert!(settled_count(&broker.log, 1).await);
    stop(&consumer).await;

    assert_eq!(broker.log.settled(), vec![(tag, AckDecision::Ack)]);
    assert!(broker.log.published().is_empty());
    assert_eq!(executor.calls(), vec![JobType::RegisterProperty]);
    assert_eq!(stats.snapshot().successful, 1);
    assert_eq!(
        broker.log.declared.lock().unwrap().clone(),
        vec!["blockchain-jobs".to_string(), "blockchain-jobs-dlq".to_string()]
    );
    assert_eq!(*broker.log.prefetch.lock().unwrap(), Some(1));
}

#[tokio::test]
async fn test_transient_failure_then_success_is_acked() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, call| match call {
        1 => Err(OffchainClientError::Timeout("120000ms".to_string())),
        _ => Ok(JobResult::success("ok")),
    });
    let (consumer, stats) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let tag = broker.publish_json(json!({
        "id": "job-2",
        "type": "ACCEPT_TRANSFER",
        "payload": {"transferId": 9, "matriculaId": "1", "buyerAddress": "0xb"}
    }));

    assert!(settled_count(&broker.log, 1).await);
    stop(&consumer).await;

    assert_eq!(broker.log.settled(), vec![(tag, AckDecision::Ack)]);
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(stats.snapshot().retried, 1);
}

#[tokio::test]
async fn test_exhausted_job_is_rejected_and_dead_lettered_with_original_fields() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::failure("execution reverted")));
    let (consumer, stats) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let tag = broker.publish_json(json!({
        "id": "job-3",
        "type": "CONFIGURE_TRANSFER",
        "payload": {"matriculaId": "1", "from": "0xs", "to": "0xb", "approvers": ["0xa"], "note": "kept"},
        "createdAt": "2024-05-01T10:00:00Z",
        "attempts": 0,
        "maxAttempts": 2
    }));

    assert!(settled_count(&broker.log, 1).await);
    stop(&consumer).await;

    assert_eq!(
        broker.log.settled(),
        vec![(tag, AckDecision::Reject { requeue: false })]
    );
    assert_eq!(executor.calls().len(), 2);

    let published = broker.log.published();
    assert_eq!(published.len(), 1);
    let (queue, body) = &published[0];
    assert_eq!(queue, "blockchain-jobs-dlq");
    assert_eq!(body["id"], "job-3");
    assert_eq!(body["type"], "CONFIGURE_TRANSFER");
    assert_eq!(body["maxAttempts"], 2);
    assert_eq!(body["createdAt"], "2024-05-01T10:00:00Z");
    assert_eq!(body["payload"]["note"], "kept");
    assert_eq!(body["error"], "execution reverted");
    assert!(body["failedAt"].is_string());

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.retried, 1);
}

#[tokio::test]
async fn test_malformed_message_is_requeued_and_never_executed() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok")));
    let (consumer, stats) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let tag = broker.publish(b"{not json".to_vec());

    assert!(settled_count(&broker.log, 1).await);
    stop(&consumer).await;

    assert_eq!(
        broker.log.settled(),
        vec![(tag, AckDecision::Reject { requeue: true })]
    );
    assert!(executor.calls().is_empty());
    assert!(broker.log.published().is_empty());
    assert_eq!(stats.snapshot().total_processed, 0);
}

#[tokio::test]
async fn test_unknown_job_type_is_dead_lettered_without_execution() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok")));
    let (consumer, _) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let tag = broker.publish_json(json!({"id": "job-4", "type": "MINT_TOKENS", "payload": {}}));

    assert!(settled_count(&broker.log, 1).await);
    stop(&consumer).await;

    assert_eq!(
        broker.log.settled(),
        vec![(tag, AckDecision::Reject { requeue: false })]
    );
    assert!(executor.calls().is_empty());
    let published = broker.log.published();
    assert_eq!(published[0].1["error"], "Unknown job type: MINT_TOKENS");
}

#[tokio::test]
async fn test_consumption_resumes_after_connection_loss() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok")));
    let (consumer, _) = consumer(&broker, executor.clone(), None);
    ready(&consumer).await;
    consumer.start_consuming().await.unwrap();

    let first = broker.publish_json(json!({
        "id": "before",
        "type": "FREEZE_PROPERTY",
        "payload": {"matriculaId": "1", "wallet": "0x1"}
    }));
    assert!(settled_count(&broker.log, 1).await);

    broker.drop_connection();
    let second = broker.publish_json(json!({
        "id": "after",
        "type": "UNFREEZE_PROPERTY",
        "payload": {"matriculaId": "1", "wallet": "0x1"}
    }));

    assert!(settled_count(&broker.log, 2).await);
    assert!(consumer.is_ready());
    stop(&consumer).await;

    assert_eq!(
        broker.log.settled(),
        vec![(first, AckDecision::Ack), (second, AckDecision::Ack)]
    );
    assert_eq!(
        executor.calls(),
        vec![JobType::FreezeProperty, JobType::UnfreezeProperty]
    );
    assert!(broker.connections.load(std::sync::atomic::Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_start_consuming_before_connect_fails() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok")));
    let (consumer, _) = consumer(&broker, executor, None);

    let error = consumer.start_consuming().await.unwrap_err();

    assert!(matches!(error, QueueError::ChannelNotInitialized));
    assert_eq!(
        error.to_string(),
        "Channel not initialized. Call connect() first."
    );
}

#[tokio::test]
async fn test_close_releases_the_broker_session() {
    let broker = InMemoryBroker::new();
    let executor = ScriptedExecutor::new(|_, _| Ok(JobResult::success("ok")));
    let (consumer, _) = consumer(&broker, executor, None);
    ready(&consumer).await;
    assert!(broker.current_session_open());

    consumer.close().await;
    consumer.close().await;

    assert!(!broker.current_session_open());
    assert!(!consumer.is_ready());
}
