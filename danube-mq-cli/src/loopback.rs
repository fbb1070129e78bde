use anyhow::{Context, Result};
use clap::Parser;
use danube_mq_core::{BrokerMessage, InMemoryBroker, Session};
use danube_mq_io::{
    BoundedReader, BoxError, ReadConfigBuilder, Record, Timestamped, WriteConfigBuilder,
    WriteSummary, Writer,
};
use futures::future::try_join_all;
use std::path::PathBuf;
use tracing::{info, info_span, warn};

use crate::config_file::{self, LoopbackConfiguration};

#[derive(Debug, Parser)]
#[command(after_help = EXAMPLES_TEXT)]
pub struct Loopback {
    #[arg(long, short = 'c', help = "Path to the YAML configuration file")]
    pub config: PathBuf,

    #[arg(
        long,
        short = 'n',
        help = "Number of records to write, overrides the configuration file"
    )]
    pub count: Option<usize>,
}

const EXAMPLES_TEXT: &str = r#"
EXAMPLES:
    # Write 10 records to a queue and read them back with 2 splits
    danube-mq-cli loopback --config loopback.yml

    # Same, with 3 records
    danube-mq-cli loopback -c loopback.yml -n 3

CONFIGURATION:
    write:
      queue: orders
    read:
      queue: orders
      desired_splits: 2
      max_read_time_ms: 500
    count: 10

NOTE:
    - The broker is an in-memory broker living for the duration of the command
    - Records whose write failed are reported on stderr
"#;

// records sent through the connector carry this property
const ORIGIN_PROPERTY: &str = "origin";

fn to_message(payload: &String, _: &dyn Session) -> std::result::Result<BrokerMessage, BoxError> {
    if payload.is_empty() {
        return Err("empty payload".into());
    }
    Ok(BrokerMessage::text(payload.clone()).with_property(ORIGIN_PROPERTY, "danube-mq-cli"))
}

pub async fn handle_loopback(loopback: Loopback) -> Result<()> {
    let mut config = config_file::load(&loopback.config)?;
    if let Some(count) = loopback.count {
        config.count = count;
    }

    let broker = match &config.broker {
        Some(credentials) => {
            InMemoryBroker::with_credentials(&credentials.username, credentials.password.clone())
        }
        None => InMemoryBroker::new(),
    };

    // readers subscribe before anything is written, topics don't keep messages for
    // late subscribers
    let (read, written) = tokio::join!(read_back(&broker, &config), write(&broker, &config));
    let (summary, failed) = written?;
    let splits = read?;

    for (split, records) in splits.iter().enumerate() {
        for record in records {
            println!(
                "split={} id={} timestamp={} payload={}",
                split,
                record.value.message_id(),
                record.timestamp,
                record.value.payload()
            );
        }
        match records.iter().map(|record| record.timestamp).min() {
            Some(watermark) => println!(
                "split {}: {} records, low watermark {}",
                split,
                records.len(),
                watermark
            ),
            None => println!("split {}: no records", split),
        }
    }
    for record in &failed {
        eprintln!("failed to write: {:?}", record);
    }

    let read_count: usize = splits.iter().map(|records| records.len()).sum();
    println!(
        "sent {} records, {} failed, read {} records",
        summary.sent, summary.failed, read_count
    );
    if read_count < summary.sent {
        warn!(
            sent = summary.sent,
            read = read_count,
            "some records were not read back before the read limit"
        );
    }

    Ok(())
}

async fn write(
    broker: &InMemoryBroker,
    config: &LoopbackConfiguration,
) -> Result<(WriteSummary, Vec<String>)> {
    // let the readers subscribe first
    tokio::task::yield_now().await;

    let write_config = WriteConfigBuilder::from_settings(config.write.clone())
        .with_connection_factory(broker.clone())
        .with_value_mapper(to_message)
        .build()
        .context("Invalid write configuration")?;
    let (mut writer, mut failed_records) = Writer::with_span(
        write_config,
        info_span!("loopback_writer", count = config.count),
    );

    let records = (0..config.count).map(|i| format!("record-{}", i));
    let summary = writer
        .write_all(records)
        .await
        .context("Failed to set up the writer")?;

    let mut failed = Vec::new();
    while let Ok(record) = failed_records.try_recv() {
        failed.push(record);
    }
    info!(sent = summary.sent, failed = summary.failed, "write completed");
    Ok((summary, failed))
}

async fn read_back(
    broker: &InMemoryBroker,
    config: &LoopbackConfiguration,
) -> Result<Vec<Vec<Timestamped<Record>>>> {
    let source = ReadConfigBuilder::from_settings(config.read.clone())
        .with_connection_factory(broker.clone())
        .with_message_mapper(Record::from_message)
        .build()
        .context("Invalid read configuration")?
        .into_source();

    let readers = source
        .split(config.read.desired_splits)
        .into_iter()
        .map(BoundedReader::new)
        .collect::<danube_mq_io::Result<Vec<_>>>()
        .context("Invalid read limits")?;
    info!(splits = readers.len(), "reading back");

    let splits = try_join_all(readers.iter().map(|reader| reader.read()))
        .await
        .context("Failed to read back the records")?;
    Ok(splits)
}
