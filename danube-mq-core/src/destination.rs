use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A broker-side destination object, as handed out by a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrokerDestination {
    /// Point-to-point: every message is delivered to exactly one consumer.
    Queue(String),
    /// Publish-subscribe: every message is delivered to every live subscriber.
    Topic(String),
}

impl BrokerDestination {
    pub fn name(&self) -> &str {
        match self {
            BrokerDestination::Queue(name) | BrokerDestination::Topic(name) => name,
        }
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, BrokerDestination::Topic(_))
    }
}

impl Display for BrokerDestination {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BrokerDestination::Queue(name) => write!(f, "queue://{}", name),
            BrokerDestination::Topic(name) => write!(f, "topic://{}", name),
        }
    }
}
