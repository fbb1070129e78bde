//! Danube-MQ-Core
//!
//! The broker collaborator contract used by the Danube message-queue connector.
//!
//! A broker is reached through a [`ConnectionFactory`]; connections hand out
//! sessions, and sessions hand out consumers and producers bound to queue or
//! topic destinations. Nothing in this contract knows about checkpoints; the
//! connector builds that on top of per-message acknowledgment.

pub mod errors;
pub use errors::{BrokerError, Result};

mod broker;
pub use broker::{
    AcknowledgeMode, Connection, ConnectionFactory, Credentials, MessageConsumer,
    MessageProducer, QueueStats, Session,
};

mod destination;
pub use destination::BrokerDestination;

pub mod message;
pub use message::{BrokerMessage, DeliveryMode, MessageBody, MessageId, PropertyValue};

pub mod memory;
pub use memory::{InMemoryBroker, ResourceKind};
