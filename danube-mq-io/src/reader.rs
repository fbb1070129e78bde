use danube_mq_core::{AcknowledgeMode, Connection, MessageConsumer, MessageId, Session};
use metrics::counter;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Span};

use crate::{
    backlog::{BacklogEstimator, NoBacklogInformation},
    checkpoint::CheckpointMark,
    config::ReadConfig,
    connector_metrics::{READER_MESSAGES_TOTAL, READER_REDELIVERIES_SKIPPED_TOTAL},
    errors::{ConnectorError, Result, SetupStep},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Uninitialized,
    Connecting,
    Consuming,
    Closed,
}

impl Display for ReaderState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match self {
            ReaderState::Uninitialized => "uninitialized",
            ReaderState::Connecting => "connecting",
            ReaderState::Consuming => "consuming",
            ReaderState::Closed => "closed",
        };
        f.write_str(state)
    }
}

/// Consumes one split of a source and tracks what it emitted in a [`CheckpointMark`].
///
/// The reader owns its connection, session and consumer. Messages are consumed in
/// client-acknowledge mode and only acknowledged when the checkpoint is finalized, so
/// anything emitted but not yet finalized is redelivered by the broker if the reader
/// goes away.
pub struct CheckpointedReader<T> {
    config: Arc<ReadConfig<T>>,
    span: Span,
    state: ReaderState,
    connection: Option<Box<dyn Connection>>,
    session: Option<Arc<dyn Session>>,
    consumer: Option<Box<dyn MessageConsumer>>,
    estimator: Option<Box<dyn BacklogEstimator>>,
    mark: CheckpointMark,
    // identifiers covered by a restored checkpoint of an earlier session
    redelivery_filter: HashSet<MessageId>,
    current: Option<T>,
    current_timestamp: Option<i64>,
}

impl<T> CheckpointedReader<T> {
    pub(crate) fn new(config: Arc<ReadConfig<T>>, mark: Option<CheckpointMark>, span: Span) -> Self {
        CheckpointedReader {
            config,
            span,
            state: ReaderState::Uninitialized,
            connection: None,
            session: None,
            consumer: None,
            estimator: None,
            mark: mark.unwrap_or_default(),
            redelivery_filter: HashSet::new(),
            current: None,
            current_timestamp: None,
        }
    }

    /// Acquires the broker resources, then reads the first message if one is available.
    ///
    /// A failing step is not retried: the resources acquired so far are released and the
    /// error names the step.
    pub async fn start(&mut self) -> Result<bool> {
        if self.state != ReaderState::Uninitialized {
            return Err(ConnectorError::InvalidState(format!(
                "a reader can only be started once, it is {}",
                self.state
            )));
        }
        self.state = ReaderState::Connecting;

        if let Err(e) = self.acquire().await {
            error!(parent: &self.span, error = %e, "unable to start the reader");
            if let Err(release) = self.close().await {
                warn!(parent: &self.span, error = %release, "unable to release a partially started reader");
            }
            return Err(e);
        }

        self.state = ReaderState::Consuming;
        info!(
            parent: &self.span,
            session = self.mark.session_id().unwrap_or_default(),
            "reader started"
        );
        self.advance().await
    }

    async fn acquire(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);

        let connection = match &config.credentials {
            Some(credentials) => {
                config
                    .connection_factory
                    .create_connection_with_credentials(credentials)
                    .await
            }
            None => config.connection_factory.create_connection().await,
        }
        .map_err(ConnectorError::setup(SetupStep::Connect))?;
        let connection = self.connection.insert(connection);

        connection
            .start()
            .await
            .map_err(ConnectorError::setup(SetupStep::StartConnection))?;

        let session = connection
            .create_session(AcknowledgeMode::Client)
            .await
            .map_err(ConnectorError::setup(SetupStep::CreateSession))?;
        self.session = Some(Arc::clone(&session));

        let destination = config
            .destination
            .create(session.as_ref())
            .map_err(ConnectorError::setup(SetupStep::ResolveDestination))?;

        let consumer = session
            .create_consumer(&destination)
            .await
            .map_err(ConnectorError::setup(SetupStep::CreateConsumer))?;
        self.consumer = Some(consumer);

        let stale = self.mark.attach(session);
        if !stale.is_empty() {
            info!(
                parent: &self.span,
                stale = stale.len(),
                "restored checkpoint belongs to an earlier session, its redeliveries will be skipped"
            );
            self.redelivery_filter
                .extend(stale.into_iter().map(|delivery| delivery.message_id));
        }

        let mut estimator: Box<dyn BacklogEstimator> = match &config.backlog_estimator {
            Some(factory) => factory(),
            None => Box::new(NoBacklogInformation),
        };
        estimator
            .start()
            .await
            .map_err(ConnectorError::setup(SetupStep::StartBacklogEstimator))?;
        self.estimator = Some(estimator);

        Ok(())
    }

    /// Moves to the next message without waiting for one.
    ///
    /// Returns `false` and clears the current record when nothing is available right now.
    pub async fn advance(&mut self) -> Result<bool> {
        if self.state != ReaderState::Consuming {
            return Err(ConnectorError::InvalidState(format!(
                "can not advance a reader that is {}",
                self.state
            )));
        }
        self.current = None;
        self.current_timestamp = None;

        let span = self.span.clone();
        let config = Arc::clone(&self.config);
        let consumer = self.consumer.as_mut().ok_or_else(|| {
            ConnectorError::InvalidState("the reader has no consumer".to_string())
        })?;

        loop {
            let message = match consumer.receive_no_wait().await? {
                Some(message) => message,
                None => return Ok(false),
            };
            let message_id = message.message_id.clone().ok_or_else(|| {
                ConnectorError::Checkpoint("received a message without identifier".to_string())
            })?;

            self.mark.add(message_id.clone(), message.timestamp);

            if self.redelivery_filter.remove(&message_id) {
                counter!(READER_REDELIVERIES_SKIPPED_TOTAL.name).increment(1);
                debug!(parent: &span, %message_id, "skipping a redelivery already emitted before the restore");
                continue;
            }

            let record = (config.message_mapper)(&message).map_err(|source| {
                ConnectorError::Mapping {
                    message_id: message_id.to_string(),
                    source,
                }
            })?;

            counter!(READER_MESSAGES_TOTAL.name, "destination" => config.destination.to_string())
                .increment(1);
            self.current = Some(record);
            self.current_timestamp = Some(message.timestamp);
            return Ok(true);
        }
    }

    pub fn current(&self) -> Result<&T> {
        self.current.as_ref().ok_or(ConnectorError::NoCurrentRecord)
    }

    /// Broker timestamp of the current record, in milliseconds since the unix epoch.
    pub fn current_timestamp(&self) -> Result<i64> {
        self.current_timestamp.ok_or(ConnectorError::NoCurrentRecord)
    }

    pub fn watermark(&self) -> i64 {
        self.mark.watermark()
    }

    pub fn checkpoint_mark(&self) -> &CheckpointMark {
        &self.mark
    }

    /// The live mark, for the runtime to finalize once the emitted records are durable.
    ///
    /// Holding the mutable borrow keeps `advance` from adding to the mark meanwhile.
    pub fn checkpoint_mark_mut(&mut self) -> &mut CheckpointMark {
        &mut self.mark
    }

    /// Acknowledges everything emitted so far.
    pub async fn finalize_checkpoint(&mut self) -> Result<usize> {
        let acknowledged = self.mark.finalize().await?;
        debug!(parent: &self.span, acknowledged, "checkpoint finalized");
        Ok(acknowledged)
    }

    /// Estimated bytes left to read, `None` when unknown.
    pub fn backlog_bytes(&self) -> Option<u64> {
        self.estimator
            .as_ref()
            .and_then(|estimator| estimator.estimate_backlog_bytes())
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Releases consumer, session and connection, then stops the backlog estimator.
    ///
    /// Every step is attempted even if an earlier one fails, and resources released by a
    /// previous call are skipped, so closing twice is harmless. The mark keeps its entries
    /// but is detached from the session.
    pub async fn close(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(mut consumer) = self.consumer.take() {
            if let Err(e) = consumer.close().await {
                warn!(parent: &self.span, error = %e, "unable to close the consumer");
                errors.push(e);
            }
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(parent: &self.span, error = %e, "unable to close the session");
                errors.push(e);
            }
        }
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.stop().await {
                warn!(parent: &self.span, error = %e, "unable to stop the connection");
                errors.push(e);
            }
            if let Err(e) = connection.close().await {
                warn!(parent: &self.span, error = %e, "unable to close the connection");
                errors.push(e);
            }
        }
        if let Some(mut estimator) = self.estimator.take() {
            estimator.stop().await;
        }

        // the broker takes back whatever was not acknowledged
        self.mark.release_session();
        self.current = None;
        self.current_timestamp = None;
        if self.state != ReaderState::Closed {
            info!(parent: &self.span, pending = self.mark.len(), "reader closed");
            self.state = ReaderState::Closed;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::Release(errors))
        }
    }
}
