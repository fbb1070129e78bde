use danube_mq_core::BrokerError;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Error type returned by user supplied mapping functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The resource acquisition step that failed while setting up a reader or a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Connect,
    StartConnection,
    CreateSession,
    ResolveDestination,
    CreateConsumer,
    CreateProducer,
    StartBacklogEstimator,
}

impl Display for SetupStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let step = match self {
            SetupStep::Connect => "connecting to the broker",
            SetupStep::StartConnection => "starting the connection",
            SetupStep::CreateSession => "creating the session",
            SetupStep::ResolveDestination => "resolving the destination",
            SetupStep::CreateConsumer => "creating the consumer",
            SetupStep::CreateProducer => "creating the producer",
            SetupStep::StartBacklogEstimator => "starting the backlog estimator",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("error {step}: {source}")]
    Setup {
        step: SetupStep,
        #[source]
        source: BrokerError,
    },

    #[error("unable to map message {message_id}: {source}")]
    Mapping {
        message_id: String,
        #[source]
        source: BoxError,
    },

    #[error("no current record")]
    NoCurrentRecord,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("unable to encode the checkpoint: {0}")]
    CheckpointEncoding(#[from] bincode::Error),

    #[error("unable to parse the settings: {0}")]
    Settings(#[from] serde_yaml::Error),

    #[error("unable to release resources: {}", join_errors(.0))]
    Release(Vec<BrokerError>),
}

fn join_errors(errors: &[BrokerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConnectorError {
    /// The failing step, for setup errors.
    pub fn setup_step(&self) -> Option<SetupStep> {
        match self {
            ConnectorError::Setup { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub(crate) fn setup(step: SetupStep) -> impl FnOnce(BrokerError) -> ConnectorError {
        move |source| ConnectorError::Setup { step, source }
    }
}
