use danube_mq_core::{BrokerDestination, BrokerMessage, InMemoryBroker, ResourceKind};
use danube_mq_io::read_records;
use std::collections::HashSet;

/// What this test validates
///
/// - Scenario: a topic source and a queue source are split for several desired counts.
/// - Expectation: the topic always yields one split; the queue yields the desired count,
///   each split with its own index.
#[test]
fn split_count_depends_on_destination_kind() {
    let broker = InMemoryBroker::new();
    let topic = read_records()
        .with_connection_factory(broker.clone())
        .with_topic("news")
        .build()
        .unwrap()
        .into_source();
    let queue = read_records()
        .with_connection_factory(broker)
        .with_queue("jobs")
        .build()
        .unwrap()
        .into_source();

    for desired in [1, 2, 5] {
        assert_eq!(topic.split(desired).len(), 1);
        let splits = queue.split(desired);
        assert_eq!(splits.len(), desired);
        let indexes: Vec<usize> = splits.iter().map(|s| s.split_index()).collect();
        assert_eq!(indexes, (0..desired).collect::<Vec<_>>());
    }
    assert_eq!(queue.split(0).len(), 1);
}

/// What this test validates
///
/// - Scenario: three splits of a queue read ten messages in round robin.
/// - Expectation: every message is emitted by exactly one split, and each split owns and
///   releases its own connection.
#[tokio::test]
async fn queue_splits_share_the_messages() {
    let broker = InMemoryBroker::new();
    let queue = BrokerDestination::Queue("jobs".to_string());
    for i in 0..10 {
        broker.publish(&queue, BrokerMessage::text(format!("job-{}", i)));
    }

    let source = read_records()
        .with_connection_factory(broker.clone())
        .with_queue("jobs")
        .build()
        .unwrap()
        .into_source();
    let mut readers: Vec<_> = source
        .split(3)
        .iter()
        .map(|split| split.create_reader(None))
        .collect();

    let mut payloads = Vec::new();
    let mut available = Vec::new();
    for reader in readers.iter_mut() {
        let has_record = reader.start().await.unwrap();
        if has_record {
            payloads.push(reader.current().unwrap().payload().to_string());
        }
        available.push(has_record);
    }
    while available.iter().any(|a| *a) {
        for (reader, has_record) in readers.iter_mut().zip(available.iter_mut()) {
            if !*has_record {
                continue;
            }
            *has_record = reader.advance().await.unwrap();
            if *has_record {
                payloads.push(reader.current().unwrap().payload().to_string());
            }
        }
    }

    assert_eq!(payloads.len(), 10);
    let distinct: HashSet<_> = payloads.iter().collect();
    assert_eq!(distinct.len(), 10);

    let mut acknowledged = 0;
    for reader in readers.iter_mut() {
        acknowledged += reader.finalize_checkpoint().await.unwrap();
        reader.close().await.unwrap();
    }
    assert_eq!(acknowledged, 10);
    assert_eq!(broker.released(ResourceKind::Connection), 3);
    assert_eq!(broker.queue_len("jobs"), 0);
}
