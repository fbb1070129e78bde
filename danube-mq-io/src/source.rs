use std::sync::Arc;
use tracing::{debug, info_span, Span};

use crate::{checkpoint::CheckpointMark, config::ReadConfig, reader::CheckpointedReader};

/// A read split: one reader's worth of a read configuration.
///
/// Splits of the same source are identical apart from their index; each one creates
/// readers owning their own broker connection.
pub struct UnboundedSource<T> {
    config: Arc<ReadConfig<T>>,
    split_index: usize,
}

impl<T> UnboundedSource<T> {
    pub fn new(config: ReadConfig<T>) -> Self {
        UnboundedSource {
            config: Arc::new(config),
            split_index: 0,
        }
    }

    /// Splits the source for `desired_num_splits` parallel readers.
    ///
    /// A topic always yields a single split, since every subscriber would receive every
    /// message. A queue yields `desired_num_splits` splits, at least one.
    pub fn split(&self, desired_num_splits: usize) -> Vec<UnboundedSource<T>> {
        let count = self.config.destination.split_count(desired_num_splits);
        debug!(
            destination = %self.config.destination,
            desired_num_splits,
            count,
            "splitting source"
        );
        (0..count)
            .map(|split_index| UnboundedSource {
                config: Arc::clone(&self.config),
                split_index,
            })
            .collect()
    }

    pub fn split_index(&self) -> usize {
        self.split_index
    }

    pub fn config(&self) -> &ReadConfig<T> {
        &self.config
    }

    /// Creates a reader logging under a span naming the destination and the split.
    ///
    /// `mark` is a checkpoint restored from a previous run, if any.
    pub fn create_reader(&self, mark: Option<CheckpointMark>) -> CheckpointedReader<T> {
        let span = info_span!(
            "mq_reader",
            destination = %self.config.destination,
            split = self.split_index
        );
        self.create_reader_with_span(mark, span)
    }

    pub fn create_reader_with_span(
        &self,
        mark: Option<CheckpointMark>,
        span: Span,
    ) -> CheckpointedReader<T> {
        CheckpointedReader::new(Arc::clone(&self.config), mark, span)
    }
}

impl<T> Clone for UnboundedSource<T> {
    fn clone(&self) -> Self {
        UnboundedSource {
            config: Arc::clone(&self.config),
            split_index: self.split_index,
        }
    }
}

impl<T> std::fmt::Debug for UnboundedSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnboundedSource")
            .field("destination", &self.config.destination)
            .field("split_index", &self.split_index)
            .finish()
    }
}
