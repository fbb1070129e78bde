use danube_mq_core::{BrokerMessage, ConnectionFactory, Credentials, Session};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    backlog::{BacklogEstimator, BacklogEstimatorFactory},
    destination::{ReadDestination, WriteDestination},
    errors::{BoxError, ConnectorError, Result},
    record::Record,
    settings::{ReadSettings, WriteSettings},
    source::UnboundedSource,
};

/// Maps a consumed broker message to the record emitted by the reader.
pub type MessageMapper<T> = Arc<dyn Fn(&BrokerMessage) -> std::result::Result<T, BoxError> + Send + Sync>;

/// Maps a record to the broker message sent by the writer, using the writer's open session.
pub type ValueMapper<T> =
    Arc<dyn Fn(&T, &dyn Session) -> std::result::Result<BrokerMessage, BoxError> + Send + Sync>;

/// Computes the destination topic name for a record.
pub type TopicNameMapper<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<Credentials>> {
    match (username, password) {
        (Some(username), password) => Ok(Some(Credentials::new(username, password))),
        (None, None) => Ok(None),
        (None, Some(_)) => Err(ConnectorError::Configuration(
            "password is set but username is missing".to_string(),
        )),
    }
}

/// Validated configuration of the read side.
///
/// Cheap to clone; every split shares the same mapper and connection factory.
pub struct ReadConfig<T> {
    pub(crate) connection_factory: Arc<dyn ConnectionFactory>,
    pub(crate) destination: ReadDestination,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) max_num_records: Option<u64>,
    pub(crate) max_read_time: Option<Duration>,
    pub(crate) message_mapper: MessageMapper<T>,
    pub(crate) backlog_estimator: Option<BacklogEstimatorFactory>,
}

impl<T> ReadConfig<T> {
    /// A builder for a reader emitting whatever the configured message mapper produces.
    pub fn builder() -> ReadConfigBuilder<T> {
        ReadConfigBuilder::new()
    }

    pub fn destination(&self) -> &ReadDestination {
        &self.destination
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn max_num_records(&self) -> Option<u64> {
        self.max_num_records
    }

    pub fn max_read_time(&self) -> Option<Duration> {
        self.max_read_time
    }

    /// True when a record count or a read duration limits the read.
    pub fn is_bounded(&self) -> bool {
        self.max_num_records.is_some() || self.max_read_time.is_some()
    }

    pub fn into_source(self) -> UnboundedSource<T> {
        UnboundedSource::new(self)
    }
}

impl<T> Clone for ReadConfig<T> {
    fn clone(&self) -> Self {
        ReadConfig {
            connection_factory: Arc::clone(&self.connection_factory),
            destination: self.destination.clone(),
            credentials: self.credentials.clone(),
            max_num_records: self.max_num_records,
            max_read_time: self.max_read_time,
            message_mapper: Arc::clone(&self.message_mapper),
            backlog_estimator: self.backlog_estimator.clone(),
        }
    }
}

impl<T> Debug for ReadConfig<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadConfig")
            .field("connection_factory", &self.connection_factory)
            .field("destination", &self.destination)
            .field("credentials", &self.credentials)
            .field("max_num_records", &self.max_num_records)
            .field("max_read_time", &self.max_read_time)
            .field("backlog_estimator", &self.backlog_estimator.is_some())
            .finish()
    }
}

/// Returns a read builder emitting [`Record`]s built from text messages.
pub fn read_records() -> ReadConfigBuilder<Record> {
    ReadConfigBuilder::new().with_message_mapper(Record::from_message)
}

/// ReadConfigBuilder is a builder for a validated [`ReadConfig`].
///
/// Exactly one of `with_queue` / `with_topic` must be called, and a connection factory and a
/// message mapper are required; everything else is optional.
pub struct ReadConfigBuilder<T> {
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    queue: Option<String>,
    topic: Option<String>,
    username: Option<String>,
    password: Option<String>,
    max_num_records: Option<u64>,
    max_read_time: Option<Duration>,
    message_mapper: Option<MessageMapper<T>>,
    backlog_estimator: Option<BacklogEstimatorFactory>,
}

impl<T> Default for ReadConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadConfigBuilder<T> {
    pub fn new() -> Self {
        ReadConfigBuilder {
            connection_factory: None,
            queue: None,
            topic: None,
            username: None,
            password: None,
            max_num_records: None,
            max_read_time: None,
            message_mapper: None,
            backlog_estimator: None,
        }
    }

    /// Seeds the builder with the serializable part of the configuration.
    pub fn from_settings(settings: ReadSettings) -> Self {
        let mut builder = Self::new();
        builder.queue = settings.queue;
        builder.topic = settings.topic;
        builder.username = settings.username;
        builder.password = settings.password;
        builder.max_num_records = settings.max_num_records;
        builder.max_read_time = settings.max_read_time_ms.map(Duration::from_millis);
        builder
    }

    /// Sets the factory used to open broker connections. This is a required field.
    pub fn with_connection_factory(mut self, factory: impl ConnectionFactory + 'static) -> Self {
        self.connection_factory = Some(Arc::new(factory));
        self
    }

    /// Same as `with_connection_factory`, for a factory that is already shared.
    pub fn with_shared_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    /// Reads from a queue. Queue reads can be split across concurrent readers.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Reads from a topic, through a single subscriber.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Stops a bounded read after this many records.
    pub fn with_max_num_records(mut self, max_num_records: u64) -> Self {
        self.max_num_records = Some(max_num_records);
        self
    }

    /// Stops a bounded read after this much time.
    pub fn with_max_read_time(mut self, max_read_time: Duration) -> Self {
        self.max_read_time = Some(max_read_time);
        self
    }

    /// Sets the function turning a broker message into a record. This is a required field.
    pub fn with_message_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&BrokerMessage) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.message_mapper = Some(Arc::new(mapper));
        self
    }

    /// Sets how each reader builds its own backlog estimator.
    pub fn with_backlog_estimator<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn BacklogEstimator> + Send + Sync + 'static,
    {
        self.backlog_estimator = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<ReadConfig<T>> {
        let connection_factory = self.connection_factory.ok_or_else(|| {
            ConnectorError::Configuration("a connection factory is required".to_string())
        })?;
        let destination = ReadDestination::resolve(self.queue, self.topic)?;
        let message_mapper = self.message_mapper.ok_or_else(|| {
            ConnectorError::Configuration("a message mapper is required".to_string())
        })?;
        let credentials = resolve_credentials(self.username, self.password)?;

        Ok(ReadConfig {
            connection_factory,
            destination,
            credentials,
            max_num_records: self.max_num_records,
            max_read_time: self.max_read_time,
            message_mapper,
            backlog_estimator: self.backlog_estimator,
        })
    }
}

/// Validated configuration of the write side.
pub struct WriteConfig<T> {
    pub(crate) connection_factory: Arc<dyn ConnectionFactory>,
    pub(crate) destination: WriteDestination<T>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) value_mapper: ValueMapper<T>,
}

impl<T> WriteConfig<T> {
    pub fn builder() -> WriteConfigBuilder<T> {
        WriteConfigBuilder::new()
    }

    pub fn destination(&self) -> &WriteDestination<T> {
        &self.destination
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl<T> Clone for WriteConfig<T> {
    fn clone(&self) -> Self {
        WriteConfig {
            connection_factory: Arc::clone(&self.connection_factory),
            destination: self.destination.clone(),
            credentials: self.credentials.clone(),
            value_mapper: Arc::clone(&self.value_mapper),
        }
    }
}

impl<T> Debug for WriteConfig<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteConfig")
            .field("connection_factory", &self.connection_factory)
            .field("destination", &self.destination)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// WriteConfigBuilder is a builder for a validated [`WriteConfig`].
///
/// Exactly one of `with_queue` / `with_topic` / `with_topic_name_mapper` must be called.
pub struct WriteConfigBuilder<T> {
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    queue: Option<String>,
    topic: Option<String>,
    topic_name_mapper: Option<TopicNameMapper<T>>,
    username: Option<String>,
    password: Option<String>,
    value_mapper: Option<ValueMapper<T>>,
}

impl<T> Default for WriteConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WriteConfigBuilder<T> {
    pub fn new() -> Self {
        WriteConfigBuilder {
            connection_factory: None,
            queue: None,
            topic: None,
            topic_name_mapper: None,
            username: None,
            password: None,
            value_mapper: None,
        }
    }

    pub fn from_settings(settings: WriteSettings) -> Self {
        let mut builder = Self::new();
        builder.queue = settings.queue;
        builder.topic = settings.topic;
        builder.username = settings.username;
        builder.password = settings.password;
        builder
    }

    pub fn with_connection_factory(mut self, factory: impl ConnectionFactory + 'static) -> Self {
        self.connection_factory = Some(Arc::new(factory));
        self
    }

    pub fn with_shared_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Publishes every record to the topic named by `mapper(record)`.
    pub fn with_topic_name_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.topic_name_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the function turning a record into a broker message. This is a required field.
    pub fn with_value_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&T, &dyn Session) -> std::result::Result<BrokerMessage, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.value_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn build(self) -> Result<WriteConfig<T>> {
        let connection_factory = self.connection_factory.ok_or_else(|| {
            ConnectorError::Configuration("a connection factory is required".to_string())
        })?;
        let destination =
            WriteDestination::resolve(self.queue, self.topic, self.topic_name_mapper)?;
        let value_mapper = self.value_mapper.ok_or_else(|| {
            ConnectorError::Configuration("a value mapper is required".to_string())
        })?;
        let credentials = resolve_credentials(self.username, self.password)?;

        Ok(WriteConfig {
            connection_factory,
            destination,
            credentials,
            value_mapper,
        })
    }
}
