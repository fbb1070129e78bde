//! Danube-MQ-IO
//!
//! Connects stream pipelines to message-queue brokers.
//!
//! The read side splits a queue or topic source across [`CheckpointedReader`]s. Each reader
//! consumes in client-acknowledge mode and records what it emitted in a [`CheckpointMark`];
//! messages are only acknowledged when the runtime finalizes the mark, so progress survives
//! a reader restart through broker redelivery. The write side is a [`Writer`] that maps and
//! sends records one by one, routing the records it could not deliver to a failure output.

pub mod errors;
pub use errors::{BoxError, ConnectorError, Result, SetupStep};

mod connector_metrics;

mod destination;
pub use destination::{ReadDestination, WriteDestination};

mod config;
pub use config::{
    read_records, MessageMapper, ReadConfig, ReadConfigBuilder, TopicNameMapper, ValueMapper,
    WriteConfig, WriteConfigBuilder,
};

mod settings;
pub use settings::{ReadSettings, WriteSettings};

mod record;
pub use record::Record;

mod checkpoint;
pub use checkpoint::{CheckpointMark, PendingDelivery, TIMESTAMP_MAX_VALUE};

mod backlog;
pub use backlog::{
    BacklogEstimator, BacklogEstimatorFactory, NoBacklogInformation, QueueDepthEstimator,
};

mod source;
pub use source::UnboundedSource;

mod reader;
pub use reader::{CheckpointedReader, ReaderState};

mod bounded;
pub use bounded::{BoundedReader, Timestamped};

mod writer;
pub use writer::{FailedRecords, WriteOutcome, WriteSummary, Writer, WriterState};

#[cfg(test)]
mod checkpoint_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod record_test;
