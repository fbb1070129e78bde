use danube_mq_core::{
    AcknowledgeMode, BrokerDestination, Connection, MessageId, MessageProducer, Session,
};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, trace, warn, Span};

use crate::{
    config::WriteConfig,
    connector_metrics::{WRITER_FAILED_TOTAL, WRITER_SENT_TOTAL},
    errors::{ConnectorError, Result, SetupStep},
};

/// Receiving end of the failure output: every record that could not be mapped or sent.
pub type FailedRecords<T> = mpsc::UnboundedReceiver<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Uninitialized,
    Ready,
    TornDown,
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent {
        destination: BrokerDestination,
        message_id: MessageId,
    },
    /// The record went to the failure output.
    Failed,
}

impl WriteOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, WriteOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Publishes records on one session and one producer per execution unit.
///
/// A record that fails to map, to resolve its destination, or to send is logged and
/// handed to the failure output; the writer moves on to the next one.
pub struct Writer<T> {
    config: Arc<WriteConfig<T>>,
    span: Span,
    failures: mpsc::UnboundedSender<T>,
    state: WriterState,
    connection: Option<Box<dyn Connection>>,
    session: Option<Arc<dyn Session>>,
    producer: Option<Box<dyn MessageProducer>>,
    static_destination: Option<BrokerDestination>,
}

impl<T> Writer<T> {
    /// Creates a writer logging under a span naming its destination.
    pub fn new(config: WriteConfig<T>) -> (Self, FailedRecords<T>) {
        let span = info_span!("mq_writer", destination = %config.destination);
        Self::with_span(config, span)
    }

    pub fn with_span(config: WriteConfig<T>, span: Span) -> (Self, FailedRecords<T>) {
        let (failures, failed_records) = mpsc::unbounded_channel();
        let writer = Writer {
            config: Arc::new(config),
            span,
            failures,
            state: WriterState::Uninitialized,
            connection: None,
            session: None,
            producer: None,
            static_destination: None,
        };
        (writer, failed_records)
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Opens the connection, an auto-acknowledge session and an unbound producer.
    ///
    /// Does nothing if the writer is already set up. Resources left over by an earlier
    /// failed setup are released first.
    pub async fn setup(&mut self) -> Result<()> {
        if self.state == WriterState::Ready {
            return Ok(());
        }
        if self.connection.is_some() || self.session.is_some() {
            if let Err(e) = self.release().await {
                warn!(parent: &self.span, error = %e, "unable to release leftovers of an earlier setup");
            }
        }

        if let Err(e) = self.acquire().await {
            error!(parent: &self.span, error = %e, "unable to set up the writer");
            if let Err(release) = self.release().await {
                warn!(parent: &self.span, error = %release, "unable to release a partially set up writer");
            }
            return Err(e);
        }

        self.state = WriterState::Ready;
        info!(parent: &self.span, "writer ready");
        Ok(())
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
            .create_session(AcknowledgeMode::Auto)
            .await
            .map_err(ConnectorError::setup(SetupStep::CreateSession))?;
        self.session = Some(Arc::clone(&session));

        self.static_destination = config
            .destination
            .resolve_static(session.as_ref())
            .map_err(ConnectorError::setup(SetupStep::ResolveDestination))?;

        let producer = session
            .create_producer(None)
            .await
            .map_err(ConnectorError::setup(SetupStep::CreateProducer))?;
        self.producer = Some(producer);

        Ok(())
    }

    /// Maps and sends one record. Never fails: a failed record goes to the failure output.
    pub async fn process(&mut self, record: T) -> WriteOutcome {
        let (Some(session), Some(producer)) = (self.session.as_ref(), self.producer.as_mut())
        else {
            error!(
                parent: &self.span,
                destination = %self.config.destination,
                state = ?self.state,
                "writer is not set up"
            );
            return route_failure(&self.failures, &self.span, record, "not_ready");
        };

        let message = match (self.config.value_mapper)(&record, session.as_ref()) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    parent: &self.span,
                    destination = %self.config.destination,
                    error = %e,
                    "unable to map the record"
                );
                return route_failure(&self.failures, &self.span, record, "mapping");
            }
        };

        let destination = match self
            .config
            .destination
            .resolve_for_record(&record, session.as_ref())
        {
            Some(Ok(destination)) => destination,
            Some(Err(e)) => {
                error!(
                    parent: &self.span,
                    destination = %self.config.destination,
                    error = %e,
                    "unable to resolve the destination of the record"
                );
                return route_failure(&self.failures, &self.span, record, "destination");
            }
            None => match &self.static_destination {
                Some(destination) => destination.clone(),
                None => {
                    error!(
                        parent: &self.span,
                        destination = %self.config.destination,
                        "no destination resolved for the record"
                    );
                    return route_failure(&self.failures, &self.span, record, "destination");
                }
            },
        };

        match producer.send(&destination, message).await {
            Ok(message_id) => {
                counter!(WRITER_SENT_TOTAL.name).increment(1);
                trace!(parent: &self.span, %destination, %message_id, "record sent");
                WriteOutcome::Sent {
                    destination,
                    message_id,
                }
            }
            Err(e) => {
                error!(
                    parent: &self.span,
                    %destination,
                    error = %e,
                    "unable to send the record"
                );
                route_failure(&self.failures, &self.span, record, "send")
            }
        }
    }

    /// Sets up, processes every record in order, then tears down.
    ///
    /// Only a setup failure is returned; per-record failures are counted in the summary
    /// and teardown failures are logged.
    pub async fn write_all<I>(&mut self, records: I) -> Result<WriteSummary>
    where
        I: IntoIterator<Item = T>,
    {
        self.setup().await?;

        let mut summary = WriteSummary::default();
        for record in records {
            if self.process(record).await.is_sent() {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
        }

        if let Err(e) = self.teardown().await {
            warn!(parent: &self.span, error = %e, "unable to tear down the writer");
        }
        info!(parent: &self.span, sent = summary.sent, failed = summary.failed, "records written");
        Ok(summary)
    }

    /// Releases producer, session and connection, in that order.
    ///
    /// Every step is attempted even if an earlier one fails; calling it again is a no-op.
    pub async fn teardown(&mut self) -> Result<()> {
        let result = self.release().await;
        if self.state != WriterState::TornDown {
            debug!(parent: &self.span, "writer torn down");
            self.state = WriterState::TornDown;
        }
        result
    }

    async fn release(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(mut producer) = self.producer.take() {
            if let Err(e) = producer.close().await {
                warn!(parent: &self.span, error = %e, "unable to close the producer");
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
        self.static_destination = None;

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::Release(errors))
        }
    }
}

fn route_failure<T>(
    failures: &mpsc::UnboundedSender<T>,
    span: &Span,
    record: T,
    reason: &'static str,
) -> WriteOutcome {
    counter!(WRITER_FAILED_TOTAL.name, "reason" => reason).increment(1);
    if failures.send(record).is_err() {
        debug!(parent: span, "failure output is closed, dropping the failed record");
    }
    WriteOutcome::Failed
}
