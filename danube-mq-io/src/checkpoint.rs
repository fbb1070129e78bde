use danube_mq_core::{MessageId, Session};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tracing::warn;

use crate::{
    connector_metrics::{CHECKPOINT_ACKNOWLEDGED_TOTAL, CHECKPOINT_PENDING_ACKS},
    errors::{ConnectorError, Result},
};

/// Watermark reported while nothing is waiting for acknowledgment.
pub const TIMESTAMP_MAX_VALUE: i64 = i64::MAX;

/// A consumed message waiting for its acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub message_id: MessageId,
    // broker timestamp, milliseconds since the unix epoch
    pub timestamp: i64,
}

/// Tracks the messages a reader emitted since the last finalization.
///
/// Entries are kept in the order they were added, and finalization acknowledges them in
/// that same order. The mark is tied to the session that delivered its messages: only that
/// session can acknowledge them, so the live handle is never serialized. A decoded mark is
/// detached until a reader attaches it to its own session.
#[derive(Default, Serialize, Deserialize)]
pub struct CheckpointMark {
    session_id: Option<String>,
    pending: Vec<PendingDelivery>,
    #[serde(skip)]
    session: Option<Arc<dyn Session>>,
    // entries added in this process and counted by the pending gauge
    #[serde(skip)]
    tracked: usize,
}

impl CheckpointMark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the mark to a freshly opened `session`.
    ///
    /// Entries already in the mark were delivered to an earlier session, even when the
    /// broker reuses its id, and can no longer be acknowledged. They are removed and
    /// returned so the caller can recognize their redelivery.
    pub(crate) fn attach(&mut self, session: Arc<dyn Session>) -> Vec<PendingDelivery> {
        let stale = std::mem::take(&mut self.pending);
        self.untrack(stale.len());
        self.session_id = Some(session.session_id().to_string());
        self.session = Some(session);
        stale
    }

    /// Records a consumed message. Call order, not timestamp order, is preserved.
    pub fn add(&mut self, message_id: MessageId, timestamp: i64) {
        self.pending.push(PendingDelivery {
            message_id,
            timestamp,
        });
        self.tracked += 1;
        gauge!(CHECKPOINT_PENDING_ACKS.name).increment(1.0);
    }

    /// Stops counting the entries of a mark whose session is gone. The entries are kept
    /// so the mark can still be persisted.
    pub(crate) fn release_session(&mut self) {
        self.untrack(self.tracked);
        self.session = None;
    }

    // removed entries are released from the gauge, at most as many as were counted
    fn untrack(&mut self, removed: usize) {
        let released = removed.min(self.tracked);
        if released > 0 {
            self.tracked -= released;
            gauge!(CHECKPOINT_PENDING_ACKS.name).decrement(released as f64);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.tracked
    }

    /// The oldest pending timestamp, or [`TIMESTAMP_MAX_VALUE`] when nothing is pending.
    pub fn watermark(&self) -> i64 {
        self.pending
            .iter()
            .map(|delivery| delivery.timestamp)
            .min()
            .unwrap_or(TIMESTAMP_MAX_VALUE)
    }

    pub fn pending(&self) -> &[PendingDelivery] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Acknowledges every pending message, in the order added, then clears the mark.
    ///
    /// Returns how many messages were acknowledged. An entry the session does not hold
    /// any more is dropped with a warning. If another acknowledgment fails, the entries
    /// before it are removed and the rest stay pending, so a later finalization resumes
    /// where this one stopped.
    pub async fn finalize(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let session = match &self.session {
            Some(session) => Arc::clone(session),
            None => {
                return Err(ConnectorError::Checkpoint(format!(
                    "{} pending messages but the mark is not attached to a session",
                    self.pending.len()
                )))
            }
        };

        let mut acknowledged = 0;
        let mut processed = 0;
        let mut failure = None;
        for delivery in &self.pending {
            match session.acknowledge(&delivery.message_id).await {
                Ok(()) => acknowledged += 1,
                Err(e) if e.is_not_pending() => {
                    warn!(
                        message_id = %delivery.message_id,
                        session = session.session_id(),
                        "dropping a checkpoint entry the session does not hold"
                    );
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            processed += 1;
        }
        self.pending.drain(..processed);
        self.untrack(processed);

        counter!(CHECKPOINT_ACKNOWLEDGED_TOTAL.name).increment(acknowledged as u64);

        match failure {
            Some(e) => Err(ConnectorError::Broker(e)),
            None => Ok(acknowledged),
        }
    }

    /// Serializes the session id and the pending entries.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Restores a detached mark from [`CheckpointMark::encode`] output.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl Debug for CheckpointMark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointMark")
            .field("session_id", &self.session_id)
            .field("pending", &self.pending.len())
            .field("watermark", &self.watermark())
            .field("attached", &self.session.is_some())
            .finish()
    }
}

impl Drop for CheckpointMark {
    fn drop(&mut self) {
        self.untrack(self.tracked);
    }
}
