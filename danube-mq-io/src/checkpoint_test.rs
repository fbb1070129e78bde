#[cfg(test)]
mod tests {
    use crate::checkpoint::{CheckpointMark, TIMESTAMP_MAX_VALUE};
    use crate::config::read_records;
    use crate::errors::ConnectorError;
    use danube_mq_core::{
        AcknowledgeMode, BrokerDestination, BrokerMessage, ConnectionFactory, InMemoryBroker,
        MessageId, Session,
    };
    use std::sync::Arc;

    /// Opens a client-acknowledge session and receives `count` messages published on "q".
    async fn session_with_deliveries(
        broker: &InMemoryBroker,
        count: usize,
    ) -> (Arc<dyn Session>, Vec<BrokerMessage>) {
        let queue = BrokerDestination::Queue("q".to_string());
        for i in 0..count {
            broker.publish(
                &queue,
                BrokerMessage::text(format!("m{}", i)).with_timestamp(100 + i as i64),
            );
        }
        let connection = broker.create_connection().await.expect("connect");
        connection.start().await.expect("start");
        let session = connection
            .create_session(AcknowledgeMode::Client)
            .await
            .expect("session");
        let mut consumer = session.create_consumer(&queue).await.expect("consumer");
        let mut messages = Vec::new();
        while let Some(message) = consumer.receive_no_wait().await.expect("receive") {
            messages.push(message);
        }
        (session, messages)
    }

    /// Test: watermark is the minimum pending timestamp
    ///
    /// Purpose
    /// - Validate that the watermark follows the oldest entry, not the insertion order
    ///
    /// Expected
    /// - Empty mark reports TIMESTAMP_MAX_VALUE
    /// - Timestamps [100, 50, 75] give a watermark of 50
    #[test]
    fn test_watermark_is_min_pending_timestamp() {
        let mut mark = CheckpointMark::new();
        assert_eq!(mark.watermark(), TIMESTAMP_MAX_VALUE);

        mark.add(MessageId::new("a"), 100);
        assert_eq!(mark.watermark(), 100);
        mark.add(MessageId::new("b"), 50);
        mark.add(MessageId::new("c"), 75);
        assert_eq!(mark.watermark(), 50);

        let order: Vec<&str> = mark.pending().iter().map(|p| p.message_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    /// Test: finalize acknowledges and clears
    ///
    /// Flow
    /// - Attach the mark to a client-ack session and add three delivered messages
    /// - Finalize twice
    ///
    /// Expected
    /// - First finalize acknowledges each message exactly once and empties the mark
    /// - Second finalize is a no-op on the empty mark
    #[tokio::test]
    async fn test_finalize_acknowledges_each_pending_message_once() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 3).await;

        let mut mark = CheckpointMark::new();
        assert!(mark.attach(Arc::clone(&session)).is_empty());
        for message in &messages {
            mark.add(message.message_id.clone().expect("id"), message.timestamp);
        }

        assert_eq!(mark.finalize().await.expect("finalize"), 3);
        assert!(mark.is_empty());
        assert_eq!(mark.watermark(), TIMESTAMP_MAX_VALUE);
        for message in &messages {
            let id = message.message_id.as_ref().expect("id");
            assert_eq!(broker.acknowledgment_count(id), 1);
        }

        assert_eq!(mark.finalize().await.expect("empty finalize"), 0);
    }

    /// Test: entries the session does not hold
    ///
    /// Purpose
    /// - Validate that an entry the session reports as not pending does not block the
    ///   entries after it
    ///
    /// Flow
    /// - Add a delivered message, an identifier the session never delivered, and another
    ///   delivered message, then finalize
    ///
    /// Expected
    /// - Both delivered messages are acknowledged, the unknown one is dropped
    /// - The mark is empty and a later finalize has nothing left to do
    #[tokio::test]
    async fn test_finalize_drops_entries_the_session_does_not_hold() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 2).await;

        let mut mark = CheckpointMark::new();
        mark.attach(session);
        mark.add(messages[0].message_id.clone().expect("id"), 1);
        mark.add(MessageId::new("ID:never-delivered"), 2);
        mark.add(messages[1].message_id.clone().expect("id"), 3);

        assert_eq!(mark.finalize().await.expect("finalize"), 2);
        assert!(mark.is_empty());
        assert_eq!(mark.tracked(), 0);
        for message in &messages {
            let id = message.message_id.as_ref().expect("id");
            assert_eq!(broker.acknowledgment_count(id), 1);
        }
        assert_eq!(mark.finalize().await.expect("empty finalize"), 0);
    }

    /// Test: broker failure during finalize
    ///
    /// Purpose
    /// - Validate that a failing acknowledgment leaves the unacknowledged entries pending
    ///
    /// Expected
    /// - The broker error is returned and every entry is still in the mark
    #[tokio::test]
    async fn test_finalize_keeps_entries_after_broker_failure() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 2).await;

        let mut mark = CheckpointMark::new();
        mark.attach(Arc::clone(&session));
        for message in &messages {
            mark.add(message.message_id.clone().expect("id"), message.timestamp);
        }
        session.close().await.expect("close session");

        let err = mark.finalize().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Broker(ref e) if e.is_already_closed()));
        assert_eq!(mark.len(), 2);
        assert_eq!(mark.watermark(), 100);
    }

    #[tokio::test]
    async fn test_detached_mark_cannot_finalize_pending_entries() {
        let mut mark = CheckpointMark::new();
        mark.add(MessageId::new("a"), 1);

        let err = mark.finalize().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Checkpoint(_)));
        assert_eq!(mark.len(), 1);
    }

    /// Test: encode / decode keeps the serializable state
    ///
    /// Expected
    /// - Session id and pending entries survive, the live session does not
    /// - Attaching the decoded mark to another session hands back the stale entries
    #[tokio::test]
    async fn test_decoded_mark_is_detached_and_yields_stale_entries() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 2).await;

        let mut mark = CheckpointMark::new();
        mark.attach(Arc::clone(&session));
        for message in &messages {
            mark.add(message.message_id.clone().expect("id"), message.timestamp);
        }

        let bytes = mark.encode().expect("encode");
        let mut restored = CheckpointMark::decode(&bytes).expect("decode");
        assert!(!restored.is_attached());
        assert_eq!(restored.session_id(), Some(session.session_id()));
        assert_eq!(restored.pending(), mark.pending());
        assert_eq!(restored.watermark(), 100);

        let (other_session, _) = session_with_deliveries(&broker, 0).await;
        let stale = restored.attach(Arc::clone(&other_session));
        assert_eq!(stale.len(), 2);
        assert!(restored.is_empty());
        assert_eq!(restored.session_id(), Some(other_session.session_id()));
    }

    /// Test: restored entries are stale even when the session id is reused
    ///
    /// Purpose
    /// - A broker may hand out a session id again after a restart; entries of a restored
    ///   mark must still be treated as belonging to the earlier session
    ///
    /// Expected
    /// - Attaching the decoded mark to a session with the same id hands back every entry
    #[tokio::test]
    async fn test_attach_yields_restored_entries_for_a_reused_session_id() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 2).await;

        let mut mark = CheckpointMark::new();
        mark.attach(Arc::clone(&session));
        for message in &messages {
            mark.add(message.message_id.clone().expect("id"), message.timestamp);
        }

        let mut restored = CheckpointMark::decode(&mark.encode().expect("encode")).expect("decode");
        let stale = restored.attach(Arc::clone(&session));
        assert_eq!(stale, mark.pending().to_vec());
        assert!(restored.is_empty());
        assert_eq!(restored.session_id(), Some(session.session_id()));
    }

    /// Test: pending gauge bookkeeping
    ///
    /// Purpose
    /// - Validate that entries counted on add are released on every path that drops them
    ///
    /// Flow
    /// - Add entries, attach (stale), add again, finalize
    /// - Decode a mark: nothing is counted for entries of another process
    ///
    /// Expected
    /// - The tracked count returns to zero after attach and after finalize
    #[tokio::test]
    async fn test_tracked_entries_are_released_when_dropped() {
        let broker = InMemoryBroker::new();
        let (session, messages) = session_with_deliveries(&broker, 1).await;

        let mut mark = CheckpointMark::new();
        mark.add(MessageId::new("a"), 1);
        mark.add(MessageId::new("b"), 2);
        assert_eq!(mark.tracked(), 2);

        let bytes = mark.encode().expect("encode");
        assert_eq!(CheckpointMark::decode(&bytes).expect("decode").tracked(), 0);

        assert_eq!(mark.attach(session).len(), 2);
        assert_eq!(mark.tracked(), 0);

        mark.add(messages[0].message_id.clone().expect("id"), 3);
        assert_eq!(mark.tracked(), 1);
        assert_eq!(mark.finalize().await.expect("finalize"), 1);
        assert_eq!(mark.tracked(), 0);
    }

    /// Test: closing a reader releases its pending entries from the gauge
    ///
    /// Expected
    /// - The mark keeps its entry for persistence but no longer counts it
    #[tokio::test]
    async fn test_reader_close_releases_tracked_entries() {
        let broker = InMemoryBroker::new();
        broker.publish(
            &BrokerDestination::Queue("q".to_string()),
            BrokerMessage::text("a"),
        );
        let mut reader = read_records()
            .with_connection_factory(broker.clone())
            .with_queue("q")
            .build()
            .expect("configuration")
            .into_source()
            .create_reader(None);

        assert!(reader.start().await.expect("start"));
        assert_eq!(reader.checkpoint_mark().tracked(), 1);

        reader.close().await.expect("close");
        assert_eq!(reader.checkpoint_mark().len(), 1);
        assert_eq!(reader.checkpoint_mark().tracked(), 0);
        assert!(!reader.checkpoint_mark().is_attached());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = CheckpointMark::decode(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, ConnectorError::CheckpointEncoding(_)));
    }
}
