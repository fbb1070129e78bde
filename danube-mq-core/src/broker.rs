use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{
    destination::BrokerDestination,
    errors::Result,
    message::{BrokerMessage, MessageId},
};

/// How deliveries on a session are confirmed to the broker.
///
/// Sessions are never transactional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeMode {
    /// The broker considers a message consumed as soon as it is delivered.
    Auto,
    /// The client confirms each delivery through [`Session::acknowledge`].
    Client,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Credentials {
            username: username.into(),
            password,
        }
    }
}

// keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Entry point to a broker.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    /// Opens an anonymous connection.
    async fn create_connection(&self) -> Result<Box<dyn Connection>>;

    /// Opens an authenticated connection.
    async fn create_connection_with_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>>;
}

/// A live connection. Messages are only delivered to consumers while the connection is started.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    async fn start(&self) -> Result<()>;

    async fn create_session(&self, mode: AcknowledgeMode) -> Result<Arc<dyn Session>>;

    async fn stop(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    /// Identifier of this session, unique for the broker.
    fn session_id(&self) -> &str;

    fn acknowledge_mode(&self) -> AcknowledgeMode;

    /// Resolves a queue name into a destination object.
    fn create_queue(&self, name: &str) -> Result<BrokerDestination>;

    /// Resolves a topic name into a destination object.
    fn create_topic(&self, name: &str) -> Result<BrokerDestination>;

    async fn create_consumer(
        &self,
        destination: &BrokerDestination,
    ) -> Result<Box<dyn MessageConsumer>>;

    /// Creates a producer; `None` yields a producer that names the destination on every send.
    async fn create_producer(
        &self,
        destination: Option<&BrokerDestination>,
    ) -> Result<Box<dyn MessageProducer>>;

    /// Confirms a single delivery received on this session.
    async fn acknowledge(&self, message_id: &MessageId) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MessageConsumer: Send + fmt::Debug {
    /// Returns the next message if one is immediately available, never waiting for one.
    async fn receive_no_wait(&mut self) -> Result<Option<BrokerMessage>>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait MessageProducer: Send + fmt::Debug {
    /// Sends a message and returns the identifier the broker assigned to it.
    async fn send(
        &mut self,
        destination: &BrokerDestination,
        message: BrokerMessage,
    ) -> Result<MessageId>;

    async fn close(&mut self) -> Result<()>;
}

/// Broker-reported statistics, used for backlog estimation.
#[async_trait]
pub trait QueueStats: Send + Sync + fmt::Debug {
    /// Total body size, in bytes, of the messages waiting on a queue.
    async fn queue_depth_bytes(&self, queue: &str) -> Result<u64>;
}
