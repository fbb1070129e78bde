// Centralized metric name constants for the connector.
// No exporter is installed here; the embedding application chooses one.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    #[allow(dead_code)]
    pub description: &'static str,
}

// Read side
pub const READER_MESSAGES_TOTAL: Metric = Metric {
    name: "danube_mq_reader_messages_total",
    description: "Total number of messages emitted by checkpointed readers (per destination)",
};

pub const READER_REDELIVERIES_SKIPPED_TOTAL: Metric = Metric {
    name: "danube_mq_reader_redeliveries_skipped_total",
    description: "Total number of redelivered messages dropped because a restored checkpoint already covered them",
};

pub const CHECKPOINT_ACKNOWLEDGED_TOTAL: Metric = Metric {
    name: "danube_mq_checkpoint_acknowledged_total",
    description: "Total number of messages acknowledged by checkpoint finalization",
};

pub const CHECKPOINT_PENDING_ACKS: Metric = Metric {
    name: "danube_mq_checkpoint_pending_acks",
    description: "Number of consumed messages waiting for checkpoint finalization",
};

// Write side
pub const WRITER_SENT_TOTAL: Metric = Metric {
    name: "danube_mq_writer_sent_total",
    description: "Total number of records sent by writers",
};

pub const WRITER_FAILED_TOTAL: Metric = Metric {
    name: "danube_mq_writer_failed_total",
    description: "Total number of records routed to the failure output (reason={mapping,destination,send})",
};
