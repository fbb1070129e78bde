use danube_mq_core::{BrokerDestination, BrokerMessage, InMemoryBroker, ResourceKind};
use danube_mq_io::{read_records, BoundedReader, ConnectorError};
use std::time::{Duration, Instant};

fn publish_numbered(broker: &InMemoryBroker, queue: &str, count: usize) {
    let destination = BrokerDestination::Queue(queue.to_string());
    for i in 0..count {
        broker.publish(
            &destination,
            BrokerMessage::text(format!("n-{}", i)).with_timestamp(1_000 + i as i64),
        );
    }
}

/// What this test validates
///
/// - Scenario: a bounded read limited to 3 records on a queue holding 5.
/// - Expectation: exactly 3 records come back with their timestamps, they are acknowledged,
///   and the 2 others stay on the queue.
#[tokio::test]
async fn stops_after_max_num_records() {
    let broker = InMemoryBroker::new();
    publish_numbered(&broker, "numbers", 5);

    let source = read_records()
        .with_connection_factory(broker.clone())
        .with_queue("numbers")
        .with_max_num_records(3)
        .build()
        .unwrap()
        .into_source();
    let records = BoundedReader::new(source).unwrap().read().await.unwrap();

    let payloads: Vec<&str> = records.iter().map(|r| r.value.payload()).collect();
    assert_eq!(payloads, vec!["n-0", "n-1", "n-2"]);
    let timestamps: Vec<i64> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![1_000, 1_001, 1_002]);

    for record in &records {
        let id = danube_mq_core::MessageId::new(record.value.message_id());
        assert_eq!(broker.acknowledgment_count(&id), 1);
    }
    assert_eq!(broker.queue_len("numbers"), 2);
    assert_eq!(broker.released(ResourceKind::Connection), 1);
}

/// What this test validates
///
/// - Scenario: a bounded read limited by time on a queue that receives nothing.
/// - Expectation: the read returns an empty result once the time is up, without hanging.
#[tokio::test]
async fn stops_after_max_read_time() {
    let broker = InMemoryBroker::new();
    let source = read_records()
        .with_connection_factory(broker.clone())
        .with_queue("idle")
        .with_max_read_time(Duration::from_millis(150))
        .build()
        .unwrap()
        .into_source();

    let started = Instant::now();
    let records = BoundedReader::new(source).unwrap().read().await.unwrap();
    let elapsed = started.elapsed();

    assert!(records.is_empty());
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn picks_up_messages_published_while_reading() {
    let broker = InMemoryBroker::new();
    let source = read_records()
        .with_connection_factory(broker.clone())
        .with_queue("late")
        .with_max_num_records(2)
        .with_max_read_time(Duration::from_secs(5))
        .build()
        .unwrap()
        .into_source();

    let publisher = broker.clone();
    let publish = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        publish_numbered(&publisher, "late", 2);
    });

    let records = BoundedReader::new(source).unwrap().read().await.unwrap();
    publish.await.unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn requires_a_limit() {
    let source = read_records()
        .with_connection_factory(InMemoryBroker::new())
        .with_queue("q")
        .build()
        .unwrap()
        .into_source();
    assert!(matches!(
        BoundedReader::new(source),
        Err(ConnectorError::Configuration(_))
    ));
}

#[tokio::test]
async fn setup_failure_is_returned() {
    let broker = InMemoryBroker::new();
    broker.set_unavailable(true);
    let source = read_records()
        .with_connection_factory(broker)
        .with_queue("q")
        .with_max_num_records(1)
        .build()
        .unwrap()
        .into_source();

    let err = BoundedReader::new(source).unwrap().read().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Setup { .. }));
}
