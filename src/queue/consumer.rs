//! Queue connection state machine.
//!
//! `Disconnected -> Connecting -> Ready`, and back to `Disconnected` whenever
//! the session errors or closes. A supervisor task owns the transitions and
//! retries every `reconnect_delay` with no attempt cap. Once consumption has
//! been requested it is resumed on every new session.
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use futures::StreamExt;
use log::{error, info, warn};
use strum::Display;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, Instant},
};

use super::{BrokerConnector, BrokerSession, DeliveryHandler, DeliveryStream};
use crate::models::QueueError;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub queue_name: String,
    pub dead_letter_queue: String,
    pub prefetch_count: u16,
    pub consumer_tag: String,
    pub reconnect_delay: Duration,
}

#[derive(Default)]
struct SessionSlot {
    session: Option<Arc<dyn BrokerSession>>,
    consuming: bool,
}

pub struct QueueConsumer {
    connector: Arc<dyn BrokerConnector>,
    handler: Arc<DeliveryHandler>,
    settings: QueueSettings,
    slot: Mutex<SessionSlot>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    stop_dispatch: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
}

impl QueueConsumer {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        handler: Arc<DeliveryHandler>,
        settings: QueueSettings,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        let (stop_dispatch, _) = watch::channel(false);
        Arc::new(Self {
            connector,
            handler,
            settings,
            slot: Mutex::new(SessionSlot::default()),
            state,
            shutdown,
            stop_dispatch,
            supervisor: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Starts the connection supervisor. Returns immediately; readiness is
    /// observed through [`Self::is_ready`] or [`Self::subscribe_state`].
    /// Calling it again while the supervisor runs is a no-op.
    pub fn connect(self: &Arc<Self>) {
        let mut supervisor = lock(&self.supervisor);
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.shutdown.send_replace(false);
        self.stop_dispatch.send_replace(false);
        *supervisor = Some(tokio::spawn(Arc::clone(self).supervise()));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True only while a session exists and its connection and channel are open.
    pub fn is_ready(&self) -> bool {
        if self.state() != ConnectionState::Ready {
            return false;
        }
        lock(&self.slot)
            .session
            .as_ref()
            .is_some_and(|session| session.is_open())
    }

    /// Begins dispatching deliveries to the handler. Fails when no session is
    /// open. A second call while already consuming does nothing.
    pub async fn start_consuming(self: &Arc<Self>) -> Result<(), QueueError> {
        let session = {
            let mut slot = lock(&self.slot);
            let session = slot
                .session
                .clone()
                .ok_or(QueueError::ChannelNotInitialized)?;
            if slot.consuming {
                return Ok(());
            }
            slot.consuming = true;
            session
        };

        info!("Starting to consume from queue: {}", self.settings.queue_name);
        if let Err(e) = self.spawn_dispatch(session).await {
            lock(&self.slot).consuming = false;
            return Err(e);
        }
        info!("Consumer started successfully");
        Ok(())
    }

    /// Stops taking new deliveries. Handlers already running keep going and
    /// can still settle, the session stays open until [`Self::close`].
    pub fn stop_accepting(&self) {
        self.stop_dispatch.send_replace(true);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every running handler has settled its delivery, or
    /// `timeout` elapses. Returns whether the drain completed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.in_flight();
            if remaining == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("{} job(s) still in flight at shutdown", remaining);
                return false;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Stops the supervisor and closes the session. Idempotent.
    pub async fn close(&self) {
        self.stop_accepting();
        self.shutdown.send_replace(true);
        let supervisor = lock(&self.supervisor).take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                error!("Connection supervisor ended abnormally: {}", e);
            }
        }

        let session = {
            let mut slot = lock(&self.slot);
            slot.consuming = false;
            slot.session.take()
        };
        if let Some(session) = session {
            session.close().await;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!("RabbitMQ connection closed");
    }

    async fn supervise(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            self.state.send_replace(ConnectionState::Connecting);
            info!("Connecting to RabbitMQ...");
            match self.establish().await {
                Ok(session) => {
                    info!("Connected to RabbitMQ successfully");
                    let resume = {
                        let mut slot = lock(&self.slot);
                        slot.session = Some(Arc::clone(&session));
                        slot.consuming
                    };
                    self.state.send_replace(ConnectionState::Ready);

                    if resume {
                        info!("Resuming consumption on queue: {}", self.settings.queue_name);
                        if let Err(e) = self.spawn_dispatch(Arc::clone(&session)).await {
                            error!("Failed to resume consuming: {}", e);
                            session.close().await;
                        }
                    }

                    tokio::select! {
                        _ = session.closed() => warn!("RabbitMQ connection lost"),
                        _ = shutdown_rx.changed() => {}
                    }
                    self.release(&session);
                    if *shutdown_rx.borrow() {
                        session.close().await;
                    }
                }
                Err(e) => {
                    error!("Failed to connect to RabbitMQ: {}", e);
                    self.state.send_replace(ConnectionState::Disconnected);
                }
            }

            if *shutdown_rx.borrow_and_update() {
                break;
            }
            info!(
                "Reconnecting in {}s...",
                self.settings.reconnect_delay.as_secs()
            );
            tokio::select! {
                _ = sleep(self.settings.reconnect_delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }
    }

    async fn establish(&self) -> Result<Arc<dyn BrokerSession>, QueueError> {
        let session = self.connector.connect().await?;
        if let Err(e) = self.prepare(session.as_ref()).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn prepare(&self, session: &dyn BrokerSession) -> Result<(), QueueError> {
        session.set_prefetch(self.settings.prefetch_count).await?;
        session
            .declare_durable_queue(&self.settings.queue_name)
            .await?;
        session
            .declare_durable_queue(&self.settings.dead_letter_queue)
            .await?;
        Ok(())
    }

    /// Forgets `session` if it is still the current one.
    fn release(&self, session: &Arc<dyn BrokerSession>) {
        let mut slot = lock(&self.slot);
        let current = slot
            .session
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, session));
        if current {
            slot.session = None;
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    async fn spawn_dispatch(self: &Arc<Self>, session: Arc<dyn BrokerSession>) -> Result<(), QueueError> {
        let stream = session
            .consume(&self.settings.queue_name, &self.settings.consumer_tag)
            .await?;
        tokio::spawn(Arc::clone(self).dispatch(session, stream));
        Ok(())
    }

    /// One task per delivery; the broker's prefetch bounds how many exist.
    async fn dispatch(self: Arc<Self>, session: Arc<dyn BrokerSession>, mut stream: DeliveryStream) {
        let mut stop_rx = self.stop_dispatch.subscribe();
        if *stop_rx.borrow_and_update() {
            return;
        }
        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    info!("No longer accepting deliveries");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => {
                        let handler = Arc::clone(&self.handler);
                        let session = Arc::clone(&session);
                        let guard = InFlightGuard::enter(&self.in_flight);
                        tokio::spawn(async move {
                            handler.handle(delivery, session.as_ref()).await;
                            drop(guard);
                        });
                    }
                    Some(Err(e)) => {
                        error!("Consumer error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Consumer cancelled by broker");
                        break;
                    }
                }
            }
        }
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The guarded sections never panic, so a poisoned lock still holds valid data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
