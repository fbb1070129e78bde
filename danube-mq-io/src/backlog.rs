use async_trait::async_trait;
use danube_mq_core::QueueStats;
use std::fmt::Debug;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::warn;

/// Reports how many bytes are still waiting to be read.
///
/// Each reader owns its estimator; `start` runs while the reader starts and `stop` while it
/// closes.
#[async_trait]
pub trait BacklogEstimator: Send + Sync + Debug {
    async fn start(&mut self) -> danube_mq_core::Result<()>;

    async fn stop(&mut self);

    /// Estimated outstanding bytes, `None` when unknown.
    fn estimate_backlog_bytes(&self) -> Option<u64>;
}

/// Builds a fresh estimator for every reader.
pub type BacklogEstimatorFactory = Arc<dyn Fn() -> Box<dyn BacklogEstimator> + Send + Sync>;

/// The default estimator: the backlog is always unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBacklogInformation;

#[async_trait]
impl BacklogEstimator for NoBacklogInformation {
    async fn start(&mut self) -> danube_mq_core::Result<()> {
        Ok(())
    }

    async fn stop(&mut self) {}

    fn estimate_backlog_bytes(&self) -> Option<u64> {
        None
    }
}

// the last polled depth, u64::MAX until the first successful poll
const UNKNOWN_DEPTH: u64 = u64::MAX;

/// Estimates the backlog of a queue from the depth the broker reports for it.
///
/// The depth is refreshed once during `start` and then on a background task every
/// `interval` until `stop`. Between polls the last known value is reported; a failed poll
/// keeps the previous value.
#[derive(Debug)]
pub struct QueueDepthEstimator {
    stats: Arc<dyn QueueStats>,
    queue: String,
    interval: Duration,
    last_depth: Arc<AtomicU64>,
    poller: Option<JoinHandle<()>>,
}

impl QueueDepthEstimator {
    pub fn new(stats: Arc<dyn QueueStats>, queue: impl Into<String>, interval: Duration) -> Self {
        QueueDepthEstimator {
            stats,
            queue: queue.into(),
            interval,
            last_depth: Arc::new(AtomicU64::new(UNKNOWN_DEPTH)),
            poller: None,
        }
    }

    /// A factory suitable for `ReadConfigBuilder::with_backlog_estimator`.
    pub fn factory(
        stats: Arc<dyn QueueStats>,
        queue: impl Into<String>,
        interval: Duration,
    ) -> impl Fn() -> Box<dyn BacklogEstimator> + Send + Sync + 'static {
        let queue = queue.into();
        move || {
            Box::new(QueueDepthEstimator::new(
                Arc::clone(&stats),
                queue.clone(),
                interval,
            )) as Box<dyn BacklogEstimator>
        }
    }

    async fn refresh(stats: &dyn QueueStats, queue: &str, last_depth: &AtomicU64) {
        match stats.queue_depth_bytes(queue).await {
            Ok(depth) => last_depth.store(depth, Ordering::Relaxed),
            Err(e) => warn!(queue, error = %e, "unable to poll the queue depth"),
        }
    }
}

#[async_trait]
impl BacklogEstimator for QueueDepthEstimator {
    async fn start(&mut self) -> danube_mq_core::Result<()> {
        if self.poller.is_some() {
            return Ok(());
        }

        // the first poll must succeed, later ones are best effort
        let depth = self.stats.queue_depth_bytes(&self.queue).await?;
        self.last_depth.store(depth, Ordering::Relaxed);

        let stats = Arc::clone(&self.stats);
        let queue = self.queue.clone();
        let last_depth = Arc::clone(&self.last_depth);
        let period = self.interval.max(Duration::from_millis(1));
        self.poller = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately and the depth is already fresh
            ticker.tick().await;
            loop {
                ticker.tick().await;
                QueueDepthEstimator::refresh(stats.as_ref(), &queue, &last_depth).await;
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
            if let Err(e) = poller.await {
                if !e.is_cancelled() {
                    warn!(queue = %self.queue, error = %e, "queue depth poller failed");
                }
            }
        }
    }

    fn estimate_backlog_bytes(&self) -> Option<u64> {
        match self.last_depth.load(Ordering::Relaxed) {
            UNKNOWN_DEPTH => None,
            depth => Some(depth),
        }
    }
}

impl Drop for QueueDepthEstimator {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}
