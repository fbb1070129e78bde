use danube_mq_core::{BrokerDestination, Session};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use crate::{
    config::TopicNameMapper,
    errors::{ConnectorError, Result},
};

/// Where a reader consumes from.
///
/// A topic is read by a single subscriber: several independent subscribers would each
/// receive every message. Queue consumers compete for messages, so a queue can be read by
/// any number of concurrent splits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadDestination {
    Queue(String),
    Topic(String),
}

impl ReadDestination {
    /// Validates that exactly one of `queue` / `topic` is set.
    pub fn resolve(queue: Option<String>, topic: Option<String>) -> Result<Self> {
        match (queue, topic) {
            (Some(queue), None) => Ok(ReadDestination::Queue(queue)),
            (None, Some(topic)) => Ok(ReadDestination::Topic(topic)),
            (None, None) => Err(ConnectorError::Configuration(
                "either a queue or a topic is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(ConnectorError::Configuration(
                "queue and topic are exclusive".to_string(),
            )),
        }
    }

    /// Number of splits to create for the requested parallelism.
    pub fn split_count(&self, desired_num_splits: usize) -> usize {
        match self {
            ReadDestination::Topic(_) => 1,
            ReadDestination::Queue(_) => desired_num_splits.max(1),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ReadDestination::Queue(name) | ReadDestination::Topic(name) => name,
        }
    }

    /// Obtains the broker destination object from a session.
    pub fn create(&self, session: &dyn Session) -> danube_mq_core::Result<BrokerDestination> {
        match self {
            ReadDestination::Queue(name) => session.create_queue(name),
            ReadDestination::Topic(name) => session.create_topic(name),
        }
    }
}

impl Display for ReadDestination {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReadDestination::Queue(name) => write!(f, "queue://{}", name),
            ReadDestination::Topic(name) => write!(f, "topic://{}", name),
        }
    }
}

/// Where a writer publishes to: a fixed queue, a fixed topic, or a topic computed per record.
pub enum WriteDestination<T> {
    Queue(String),
    Topic(String),
    DynamicTopic(TopicNameMapper<T>),
}

impl<T> WriteDestination<T> {
    /// Validates that exactly one of `queue` / `topic` / `topic_name_mapper` is set.
    pub fn resolve(
        queue: Option<String>,
        topic: Option<String>,
        topic_name_mapper: Option<TopicNameMapper<T>>,
    ) -> Result<Self> {
        match (queue, topic, topic_name_mapper) {
            (Some(queue), None, None) => Ok(WriteDestination::Queue(queue)),
            (None, Some(topic), None) => Ok(WriteDestination::Topic(topic)),
            (None, None, Some(mapper)) => Ok(WriteDestination::DynamicTopic(mapper)),
            (None, None, None) => Err(ConnectorError::Configuration(
                "either a topic name mapper, a queue, or a topic is required".to_string(),
            )),
            _ => Err(ConnectorError::Configuration(
                "only one of queue, topic, or topic name mapper must be set".to_string(),
            )),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, WriteDestination::DynamicTopic(_))
    }

    /// Resolves the fixed destination once per session; `None` for a dynamic topic.
    pub fn resolve_static(
        &self,
        session: &dyn Session,
    ) -> danube_mq_core::Result<Option<BrokerDestination>> {
        match self {
            WriteDestination::Queue(name) => session.create_queue(name).map(Some),
            WriteDestination::Topic(name) => session.create_topic(name).map(Some),
            WriteDestination::DynamicTopic(_) => Ok(None),
        }
    }

    /// Computes the topic for one record; `None` unless the destination is dynamic.
    pub fn resolve_for_record(
        &self,
        record: &T,
        session: &dyn Session,
    ) -> Option<danube_mq_core::Result<BrokerDestination>> {
        match self {
            WriteDestination::DynamicTopic(mapper) => Some(session.create_topic(&mapper(record))),
            _ => None,
        }
    }
}

impl<T> Clone for WriteDestination<T> {
    fn clone(&self) -> Self {
        match self {
            WriteDestination::Queue(name) => WriteDestination::Queue(name.clone()),
            WriteDestination::Topic(name) => WriteDestination::Topic(name.clone()),
            WriteDestination::DynamicTopic(mapper) => {
                WriteDestination::DynamicTopic(Arc::clone(mapper))
            }
        }
    }
}

impl<T> Debug for WriteDestination<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WriteDestination::Queue(name) => f.debug_tuple("Queue").field(name).finish(),
            WriteDestination::Topic(name) => f.debug_tuple("Topic").field(name).finish(),
            WriteDestination::DynamicTopic(_) => f.write_str("DynamicTopic"),
        }
    }
}

impl<T> Display for WriteDestination<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WriteDestination::Queue(name) => write!(f, "queue://{}", name),
            WriteDestination::Topic(name) => write!(f, "topic://{}", name),
            WriteDestination::DynamicTopic(_) => f.write_str("topic://<per record>"),
        }
    }
}
