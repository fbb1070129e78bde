#[cfg(test)]
mod tests {
    use crate::record::Record;
    use danube_mq_core::{
        BrokerDestination, BrokerMessage, DeliveryMode, MessageId, PropertyValue,
    };

    fn delivered(message: BrokerMessage) -> BrokerMessage {
        let mut message = message;
        message.message_id = Some(MessageId::new("ID:danube-mq-7"));
        message.destination = Some(BrokerDestination::Queue("orders".to_string()));
        message
    }

    /// Test: default mapper copies every header
    ///
    /// Purpose
    /// - Validate that a text message keeps all of its headers and properties as a Record
    ///
    /// Expected
    /// - Every Record field matches the corresponding message header
    #[test]
    fn test_from_message_copies_headers_and_properties() {
        let message = delivered(
            BrokerMessage::text("hello")
                .with_timestamp(1_700_000_000_000)
                .with_correlation_id("corr-1")
                .with_reply_to(BrokerDestination::Topic("replies".to_string()))
                .with_message_type("greeting")
                .with_priority(9)
                .with_delivery_mode(DeliveryMode::NonPersistent)
                .with_expiration(42)
                .with_property("retries", 3)
                .with_property("source", "test"),
        );

        let record = Record::from_message(&message).expect("text message maps");

        assert_eq!(record.message_id(), "ID:danube-mq-7");
        assert_eq!(record.timestamp(), 1_700_000_000_000);
        assert_eq!(record.correlation_id(), Some("corr-1"));
        assert_eq!(
            record.reply_to(),
            Some(&BrokerDestination::Topic("replies".to_string()))
        );
        assert_eq!(
            record.destination(),
            &BrokerDestination::Queue("orders".to_string())
        );
        assert_eq!(record.delivery_mode(), 1);
        assert!(!record.redelivered());
        assert_eq!(record.message_type(), Some("greeting"));
        assert_eq!(record.expiration(), 42);
        assert_eq!(record.priority(), 9);
        assert_eq!(record.property("retries"), Some(&PropertyValue::Int(3)));
        assert_eq!(
            record.property("source"),
            Some(&PropertyValue::String("test".to_string()))
        );
        assert_eq!(record.payload(), "hello");
    }

    /// Test: default mapper rejects non-text bodies
    ///
    /// Expected
    /// - A bytes message is a mapping error naming the message
    #[test]
    fn test_from_message_rejects_bytes_body() {
        let message = delivered(BrokerMessage::bytes(vec![1, 2, 3]));

        let err = Record::from_message(&message).unwrap_err();
        assert!(err.to_string().contains("ID:danube-mq-7"));
    }

    #[test]
    fn test_from_message_requires_broker_headers() {
        let err = Record::from_message(&BrokerMessage::text("x")).unwrap_err();
        assert!(err.to_string().contains("identifier"));
    }
}
