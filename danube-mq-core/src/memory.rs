//! In-memory broker.
//!
//! SHOULD BE USED ONLY FOR TESTING AND LOCAL DEMOS. It implements the full broker
//! contract inside the process: queues with competing consumers and redelivery of
//! unacknowledged messages, non-durable topics with fan-out to live subscribers,
//! optional credentials, and a few switches to inject failures.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::{
    broker::{
        AcknowledgeMode, Connection, ConnectionFactory, Credentials, MessageConsumer,
        MessageProducer, QueueStats, Session,
    },
    destination::BrokerDestination,
    errors::{BrokerError, Result},
    message::{BrokerMessage, MessageId},
};

/// Broker resources whose release is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Connection,
    Session,
    Consumer,
    Producer,
}

impl ResourceKind {
    fn label(&self) -> &'static str {
        match self {
            ResourceKind::Connection => "connection",
            ResourceKind::Session => "session",
            ResourceKind::Consumer => "consumer",
            ResourceKind::Producer => "producer",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

#[derive(Debug, Default)]
struct BrokerState {
    // queue name -> waiting messages
    queues: DashMap<String, VecDeque<BrokerMessage>>,
    // topic consumer id -> (topic name, messages waiting for that subscriber)
    subscribers: DashMap<u64, (String, VecDeque<BrokerMessage>)>,
    // destination -> every message accepted by the broker, in send order
    history: DashMap<BrokerDestination, Vec<BrokerMessage>>,
    acknowledgments: DashMap<MessageId, u32>,
    released: DashMap<ResourceKind, u64>,
    rejected: DashMap<BrokerDestination, ()>,
    credentials: Option<Credentials>,
    unavailable: AtomicBool,
    failing_session_close: AtomicBool,
    failing_receive: AtomicBool,
    next_message_id: AtomicU64,
    next_resource_id: AtomicU64,
}

impl BrokerState {
    fn next_resource_id(&self) -> u64 {
        self.next_resource_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_release(&self, kind: ResourceKind) {
        *self.released.entry(kind).or_insert(0) += 1;
    }

    fn deliver(&self, destination: &BrokerDestination, message: BrokerMessage) {
        self.history
            .entry(destination.clone())
            .or_default()
            .push(message.clone());

        match destination {
            BrokerDestination::Queue(name) => {
                self.queues.entry(name.clone()).or_default().push_back(message);
            }
            BrokerDestination::Topic(name) => {
                for mut subscriber in self.subscribers.iter_mut() {
                    let (topic, buffer) = subscriber.value_mut();
                    if topic == name {
                        buffer.push_back(message.clone());
                    }
                }
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl InMemoryBroker {
    /// A broker that accepts anonymous connections and any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that only accepts connections presenting these credentials.
    pub fn with_credentials(username: impl Into<String>, password: Option<String>) -> Self {
        InMemoryBroker {
            state: Arc::new(BrokerState {
                credentials: Some(Credentials::new(username, password)),
                ..Default::default()
            }),
        }
    }

    /// Makes every new connection attempt fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes every session close fail while set. The session stays open and keeps its
    /// unacknowledged deliveries.
    pub fn set_failing_session_close(&self, failing: bool) {
        self.state
            .failing_session_close
            .store(failing, Ordering::SeqCst);
    }

    /// Makes every receive fail while set.
    pub fn set_failing_receive(&self, failing: bool) {
        self.state.failing_receive.store(failing, Ordering::SeqCst);
    }

    /// Makes every send to `destination` fail.
    pub fn reject_destination(&self, destination: &BrokerDestination) {
        self.state.rejected.insert(destination.clone(), ());
    }

    /// Places a message on a destination as if a remote producer had sent it.
    ///
    /// Headers already set on the message are preserved; a missing id and a zero
    /// timestamp are stamped like on a regular send.
    pub fn publish(&self, destination: &BrokerDestination, mut message: BrokerMessage) -> MessageId {
        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| self.next_message_id());
        message.message_id = Some(message_id.clone());
        if message.timestamp == 0 {
            message.timestamp = now_millis();
        }
        message.destination = Some(destination.clone());
        self.state.deliver(destination, message);
        message_id
    }

    /// Number of messages currently waiting on a queue.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    /// Every message accepted for `destination`, in send order.
    pub fn published(&self, destination: &BrokerDestination) -> Vec<BrokerMessage> {
        self.state
            .history
            .get(destination)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// How many times a delivery of `message_id` has been acknowledged.
    pub fn acknowledgment_count(&self, message_id: &MessageId) -> u32 {
        self.state
            .acknowledgments
            .get(message_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// How many resources of `kind` have been released.
    pub fn released(&self, kind: ResourceKind) -> u64 {
        self.state.released.get(&kind).map(|count| *count).unwrap_or(0)
    }

    fn next_message_id(&self) -> MessageId {
        let id = self.state.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        MessageId::new(format!("ID:danube-mq-{}", id))
    }

    fn open_connection(&self) -> Result<Box<dyn Connection>> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(
                "in-memory broker refuses connections".to_string(),
            ));
        }
        let connection = InMemoryConnection {
            id: self.state.next_resource_id(),
            broker: self.clone(),
            started: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
        };
        debug!(connection_id = connection.id, "in-memory connection opened");
        Ok(Box::new(connection))
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        if self.state.credentials.is_some() {
            return Err(BrokerError::Authentication("<anonymous>".to_string()));
        }
        self.open_connection()
    }

    async fn create_connection_with_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>> {
        if let Some(expected) = &self.state.credentials {
            if expected != credentials {
                return Err(BrokerError::Authentication(credentials.username.clone()));
            }
        }
        self.open_connection()
    }
}

#[async_trait]
impl QueueStats for InMemoryBroker {
    async fn queue_depth_bytes(&self, queue: &str) -> Result<u64> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(
                "in-memory broker refuses statistics requests".to_string(),
            ));
        }
        Ok(self
            .state
            .queues
            .get(queue)
            .map(|q| q.iter().map(|m| m.size() as u64).sum())
            .unwrap_or(0))
    }
}

#[derive(Debug)]
struct InMemoryConnection {
    id: u64,
    broker: InMemoryBroker,
    started: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Connection.label()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn start(&self) -> Result<()> {
        self.ensure_open()?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_session(&self, mode: AcknowledgeMode) -> Result<Arc<dyn Session>> {
        self.ensure_open()?;
        let shared = Arc::new(SessionShared {
            id: format!("session-{}-{}", self.id, self.broker.state.next_resource_id()),
            mode,
            started: Arc::clone(&self.started),
            closed: AtomicBool::new(false),
            unacked: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        });
        Ok(Arc::new(InMemorySession {
            shared,
            broker: self.broker.clone(),
        }))
    }

    async fn stop(&self) -> Result<()> {
        self.ensure_open()?;
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Connection.label()));
        }
        self.started.store(false, Ordering::SeqCst);
        self.broker.state.record_release(ResourceKind::Connection);
        debug!(connection_id = self.id, "in-memory connection closed");
        Ok(())
    }
}

#[derive(Debug)]
struct UnackedDelivery {
    sequence: u64,
    destination: BrokerDestination,
    message: BrokerMessage,
}

#[derive(Debug)]
struct SessionShared {
    id: String,
    mode: AcknowledgeMode,
    started: Arc<AtomicBool>,
    closed: AtomicBool,
    unacked: DashMap<MessageId, UnackedDelivery>,
    next_sequence: AtomicU64,
}

impl SessionShared {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Session.label()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct InMemorySession {
    shared: Arc<SessionShared>,
    broker: InMemoryBroker,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(BrokerError::InvalidDestination(
            "destination name can not be empty".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Session for InMemorySession {
    fn session_id(&self) -> &str {
        &self.shared.id
    }

    fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.shared.mode
    }

    fn create_queue(&self, name: &str) -> Result<BrokerDestination> {
        validate_name(name)?;
        Ok(BrokerDestination::Queue(name.to_string()))
    }

    fn create_topic(&self, name: &str) -> Result<BrokerDestination> {
        validate_name(name)?;
        Ok(BrokerDestination::Topic(name.to_string()))
    }

    async fn create_consumer(
        &self,
        destination: &BrokerDestination,
    ) -> Result<Box<dyn MessageConsumer>> {
        self.shared.ensure_open()?;
        let id = self.broker.state.next_resource_id();
        if let BrokerDestination::Topic(topic) = destination {
            self.broker
                .state
                .subscribers
                .insert(id, (topic.clone(), VecDeque::new()));
        }
        Ok(Box::new(InMemoryConsumer {
            id,
            destination: destination.clone(),
            session: Arc::clone(&self.shared),
            broker: self.broker.clone(),
            closed: false,
        }))
    }

    async fn create_producer(
        &self,
        destination: Option<&BrokerDestination>,
    ) -> Result<Box<dyn MessageProducer>> {
        self.shared.ensure_open()?;
        Ok(Box::new(InMemoryProducer {
            destination: destination.cloned(),
            session: Arc::clone(&self.shared),
            broker: self.broker.clone(),
            closed: false,
        }))
    }

    async fn acknowledge(&self, message_id: &MessageId) -> Result<()> {
        self.shared.ensure_open()?;
        if self.shared.mode == AcknowledgeMode::Auto {
            return Ok(());
        }
        match self.shared.unacked.remove(message_id) {
            Some(_) => {
                *self
                    .broker
                    .state
                    .acknowledgments
                    .entry(message_id.clone())
                    .or_insert(0) += 1;
                trace!(session = %self.shared.id, %message_id, "message acknowledged");
                Ok(())
            }
            None => Err(BrokerError::NotPending(message_id.to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.broker.state.failing_session_close.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(format!(
                "in-memory broker refuses to close {}",
                self.shared.id
            )));
        }
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Session.label()));
        }

        // unacknowledged queue deliveries go back to the head of their queue
        let mut pending: Vec<UnackedDelivery> = Vec::new();
        let ids: Vec<MessageId> = self.shared.unacked.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, delivery)) = self.shared.unacked.remove(&id) {
                pending.push(delivery);
            }
        }
        pending.sort_by_key(|delivery| delivery.sequence);
        let requeued = pending.len();
        for delivery in pending.into_iter().rev() {
            if let BrokerDestination::Queue(name) = &delivery.destination {
                let mut message = delivery.message;
                message.redelivered = true;
                self.broker
                    .state
                    .queues
                    .entry(name.clone())
                    .or_default()
                    .push_front(message);
            }
        }

        self.broker.state.record_release(ResourceKind::Session);
        debug!(session = %self.shared.id, requeued, "in-memory session closed");
        Ok(())
    }
}

#[derive(Debug)]
struct InMemoryConsumer {
    id: u64,
    destination: BrokerDestination,
    session: Arc<SessionShared>,
    broker: InMemoryBroker,
    closed: bool,
}

impl InMemoryConsumer {
    fn pop(&self) -> Option<BrokerMessage> {
        match &self.destination {
            BrokerDestination::Queue(name) => self
                .broker
                .state
                .queues
                .get_mut(name)
                .and_then(|mut queue| queue.pop_front()),
            BrokerDestination::Topic(_) => self
                .broker
                .state
                .subscribers
                .get_mut(&self.id)
                .and_then(|mut subscriber| subscriber.1.pop_front()),
        }
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn receive_no_wait(&mut self) -> Result<Option<BrokerMessage>> {
        if self.closed {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Consumer.label()));
        }
        self.session.ensure_open()?;
        if self.broker.state.failing_receive.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(
                "in-memory broker refuses to deliver".to_string(),
            ));
        }
        if !self.session.started.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let now = now_millis();
        while let Some(message) = self.pop() {
            if message.is_expired(now) {
                continue;
            }
            if self.session.mode == AcknowledgeMode::Client {
                if let Some(message_id) = &message.message_id {
                    let sequence = self.session.next_sequence.fetch_add(1, Ordering::SeqCst);
                    self.session.unacked.insert(
                        message_id.clone(),
                        UnackedDelivery {
                            sequence,
                            destination: self.destination.clone(),
                            message: message.clone(),
                        },
                    );
                }
            }
            return Ok(Some(message));
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Consumer.label()));
        }
        self.closed = true;
        if self.destination.is_topic() {
            self.broker.state.subscribers.remove(&self.id);
        }
        self.broker.state.record_release(ResourceKind::Consumer);
        Ok(())
    }
}

#[derive(Debug)]
struct InMemoryProducer {
    destination: Option<BrokerDestination>,
    session: Arc<SessionShared>,
    broker: InMemoryBroker,
    closed: bool,
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn send(
        &mut self,
        destination: &BrokerDestination,
        mut message: BrokerMessage,
    ) -> Result<MessageId> {
        if self.closed {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Producer.label()));
        }
        self.session.ensure_open()?;
        if let Some(bound) = &self.destination {
            if bound != destination {
                return Err(BrokerError::Unsupported(format!(
                    "producer bound to {} can not send to {}",
                    bound, destination
                )));
            }
        }
        if self.broker.state.rejected.contains_key(destination) {
            return Err(BrokerError::Send {
                destination: destination.to_string(),
                reason: "destination rejected by broker".to_string(),
            });
        }

        let message_id = self.broker.next_message_id();
        message.message_id = Some(message_id.clone());
        if message.timestamp == 0 {
            message.timestamp = now_millis();
        }
        message.destination = Some(destination.clone());
        message.redelivered = false;
        self.broker.state.deliver(destination, message);
        Ok(message_id)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(BrokerError::AlreadyClosed(ResourceKind::Producer.label()));
        }
        self.closed = true;
        self.broker.state.record_release(ResourceKind::Producer);
        Ok(())
    }
}
