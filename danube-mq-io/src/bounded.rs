use rand::{rng, Rng};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn, Span};

use crate::{
    errors::{ConnectorError, Result},
    source::UnboundedSource,
};

const BASE_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 500;

/// A record with the broker timestamp it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    pub value: T,
    pub timestamp: i64,
}

/// Turns one split of an unbounded source into a finite read.
///
/// The read stops after `max_num_records` records or after `max_read_time`, whichever
/// comes first. Limits apply to this reader alone; run one `BoundedReader` per split to
/// read a queue in parallel.
#[derive(Debug)]
pub struct BoundedReader<T> {
    source: UnboundedSource<T>,
    span: Option<Span>,
}

impl<T: Clone> BoundedReader<T> {
    pub fn new(source: UnboundedSource<T>) -> Result<Self> {
        if !source.config().is_bounded() {
            return Err(ConnectorError::Configuration(
                "a bounded read requires max_num_records or max_read_time".to_string(),
            ));
        }
        Ok(BoundedReader { source, span: None })
    }

    /// Logs under `span` instead of the reader's default span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Reads until a limit is reached, acknowledges what was read and closes the reader.
    pub async fn read(&self) -> Result<Vec<Timestamped<T>>> {
        let config = self.source.config();
        let max_num_records = config.max_num_records();
        if max_num_records == Some(0) {
            return Ok(Vec::new());
        }
        let deadline = config.max_read_time().map(|limit| Instant::now() + limit);

        let mut reader = match &self.span {
            Some(span) => self.source.create_reader_with_span(None, span.clone()),
            None => self.source.create_reader(None),
        };
        let span = reader.span().clone();

        let mut records = Vec::new();
        let mut idle_polls = 0u64;
        let result = async {
            let mut available = reader.start().await?;
            loop {
                if available {
                    idle_polls = 0;
                    records.push(Timestamped {
                        value: reader.current()?.clone(),
                        timestamp: reader.current_timestamp()?,
                    });
                }
                if max_num_records.is_some_and(|max| records.len() as u64 >= max) {
                    break;
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break;
                }
                if !available {
                    let mut backoff = calculate_backoff(idle_polls);
                    if let Some(deadline) = deadline {
                        backoff = backoff.min(deadline.saturating_duration_since(Instant::now()));
                    }
                    idle_polls += 1;
                    sleep(backoff).await;
                }
                available = reader.advance().await?;
            }
            let acknowledged = reader.finalize_checkpoint().await?;
            debug!(parent: &span, acknowledged, "bounded read acknowledged");
            Ok::<(), ConnectorError>(())
        }
        .await;

        if let Err(e) = reader.close().await {
            warn!(parent: &span, error = %e, "unable to close the reader after a bounded read");
        }
        result?;

        info!(parent: &span, records = records.len(), "bounded read completed");
        Ok(records)
    }
}

/// Linear backoff with 50-100% jitter, capped at MAX_BACKOFF_MS.
fn calculate_backoff(attempt: u64) -> Duration {
    let linear = BASE_BACKOFF_MS.saturating_mul(attempt + 1);
    let backoff = linear.min(MAX_BACKOFF_MS);
    let jitter = rng().random_range(backoff / 2..=backoff);
    Duration::from_millis(jitter)
}
