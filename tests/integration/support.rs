//! In-memory broker and scripted executor shared by the integration tests.
use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use blockchain_queue_worker::{
    jobs::{BackoffRetryPolicy, JobProcessor, JobTask, JobType, WorkerStats},
    models::{JobResult, QueueError},
    queue::{
        AckDecision, BrokerConnector, BrokerSession, Delivery, DeliveryAcknowledger,
        DeliveryHandler, DeliveryStream, QueueConsumer, QueueSettings,
    },
    services::{JobExecutor, NotificationSender, OffchainClientError},
};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, QueueError>>;
type DeliveryReceiver = mpsc::UnboundedReceiver<Result<Delivery, QueueError>>;

/// Everything the broker observed, in order.
#[derive(Default)]
pub struct BrokerLog {
    pub settled: Mutex<Vec<(u64, AckDecision)>>,
    pub published: Mutex<Vec<(String, Value)>>,
    pub declared: Mutex<Vec<String>>,
    pub prefetch: Mutex<Option<u16>>,
}

impl BrokerLog {
    pub fn settled(&self) -> Vec<(u64, AckDecision)> {
        self.settled.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }
}

pub struct InMemoryBroker {
    pub log: Arc<BrokerLog>,
    pub connections: AtomicU32,
    pub refuse: AtomicBool,
    next_tag: AtomicU64,
    pending: Mutex<VecDeque<(u64, Vec<u8>)>>,
    current: Mutex<Option<(Arc<InMemorySession>, DeliverySender)>>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(BrokerLog::default()),
            connections: AtomicU32::new(0),
            refuse: AtomicBool::new(false),
            next_tag: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
        })
    }

    /// Enqueues a message and returns its delivery tag.
    pub fn publish(&self, body: impl Into<Vec<u8>>) -> u64 {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let body = body.into();
        let current = self.current.lock().unwrap();
        match current.as_ref() {
            Some((_, sender)) => {
                let _ = sender.send(Ok(self.delivery(tag, body)));
            }
            None => self.pending.lock().unwrap().push_back((tag, body)),
        }
        tag
    }

    pub fn publish_json(&self, body: Value) -> u64 {
        self.publish(serde_json::to_vec(&body).unwrap())
    }

    /// Severs the current connection: the session reports closed and its
    /// delivery stream ends.
    pub fn drop_connection(&self) {
        if let Some((session, sender)) = self.current.lock().unwrap().take() {
            drop(sender);
            session.closed_tx.send_replace(true);
        }
    }

    pub fn current_session_open(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(session, _)| session.is_open())
    }

    fn delivery(&self, tag: u64, body: Vec<u8>) -> Delivery {
        Delivery::new(
            tag,
            false,
            body,
            Box::new(RecordingAcker {
                tag,
                log: Arc::clone(&self.log),
            }),
        )
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>, QueueError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("connection refused".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        let session = Arc::new(InMemorySession {
            log: Arc::clone(&self.log),
            receiver: Mutex::new(Some(receiver)),
            closed_tx,
        });

        let mut current = self.current.lock().unwrap();
        let mut pending = self.pending.lock().unwrap();
        while let Some((tag, body)) = pending.pop_front() {
            let _ = sender.send(Ok(self.delivery(tag, body)));
        }
        *current = Some((Arc::clone(&session), sender));
        Ok(session)
    }
}

pub struct InMemorySession {
    log: Arc<BrokerLog>,
    receiver: Mutex<Option<DeliveryReceiver>>,
    closed_tx: watch::Sender<bool>,
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), QueueError> {
        *self.log.prefetch.lock().unwrap() = Some(prefetch_count);
        Ok(())
    }

    async fn declare_durable_queue(&self, name: &str) -> Result<(), QueueError> {
        self.log.declared.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn consume(&self, _queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, QueueError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| QueueError::Connection("consumer already registered".to_string()))?;
        Ok(futures::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let body: Value = serde_json::from_slice(payload)?;
        self.log
            .published
            .lock()
            .unwrap()
            .push((queue.to_string(), body));
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn is_open(&self) -> bool {
        !*self.closed_tx.borrow()
    }

    async fn close(&self) {
        self.closed_tx.send_replace(true);
    }
}

struct RecordingAcker {
    tag: u64,
    log: Arc<BrokerLog>,
}

#[async_trait]
impl DeliveryAcknowledger for RecordingAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.log
            .settled
            .lock()
            .unwrap()
            .push((self.tag, AckDecision::Ack));
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.log
            .settled
            .lock()
            .unwrap()
            .push((self.tag, AckDecision::Reject { requeue }));
        Ok(())
    }
}

type Script = Box<dyn Fn(&JobTask, u32) -> Result<JobResult, OffchainClientError> + Send + Sync>;

/// Executor whose answer depends on the task and on how many times it has
/// been called so far (starting at 1).
pub struct ScriptedExecutor {
    calls: Mutex<Vec<JobType>>,
    script: Script,
}

impl ScriptedExecutor {
    pub fn new(
        script: impl Fn(&JobTask, u32) -> Result<JobResult, OffchainClientError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    pub fn calls(&self) -> Vec<JobType> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn execute(&self, task: &JobTask) -> Result<JobResult, OffchainClientError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(task.job_type());
            calls.len() as u32
        };
        (self.script)(task, call)
    }
}

pub fn settings() -> QueueSettings {
    QueueSettings {
        queue_name: "blockchain-jobs".to_string(),
        dead_letter_queue: "blockchain-jobs-dlq".to_string(),
        prefetch_count: 1,
        consumer_tag: "integration-worker".to_string(),
        reconnect_delay: Duration::from_millis(50),
    }
}

/// A consumer wired to `broker` with a 10ms backoff base and 3 default attempts.
pub fn consumer(
    broker: &Arc<InMemoryBroker>,
    executor: Arc<dyn JobExecutor>,
    notifier: Option<Arc<dyn NotificationSender>>,
) -> (Arc<QueueConsumer>, Arc<WorkerStats>) {
    let stats = Arc::new(WorkerStats::new());
    let processor = JobProcessor::new(executor, Arc::clone(&stats), BackoffRetryPolicy::new(3, 10));
    let handler = DeliveryHandler::new(Arc::new(processor), notifier, "blockchain-jobs-dlq");
    let consumer = QueueConsumer::new(
        Arc::clone(broker) as Arc<dyn BrokerConnector>,
        Arc::new(handler),
        settings(),
    );
    (consumer, stats)
}

/// Polls `condition` every 10ms for up to five seconds.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub async fn ready(consumer: &Arc<QueueConsumer>) {
    consumer.connect();
    let consumer = Arc::clone(consumer);
    assert!(eventually(|| {
        let consumer = Arc::clone(&consumer);
        async move { consumer.is_ready() }
    })
    .await);
}
