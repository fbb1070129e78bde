#[cfg(test)]
mod tests {
    use crate::config::{read_records, ReadConfig, WriteConfig};
    use crate::destination::{ReadDestination, WriteDestination};
    use crate::errors::{BoxError, ConnectorError};
    use crate::settings::{ReadSettings, WriteSettings};
    use crate::ReadConfigBuilder;
    use danube_mq_core::{BrokerMessage, InMemoryBroker, Session};
    use std::time::Duration;

    fn text_message(value: &String, _: &dyn Session) -> Result<BrokerMessage, BoxError> {
        Ok(BrokerMessage::text(value.clone()))
    }

    fn configuration_error<T>(result: crate::Result<T>) -> String {
        match result {
            Err(ConnectorError::Configuration(reason)) => reason,
            Err(other) => panic!("expected a configuration error, got {other}"),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    /// Test: read builder validation
    ///
    /// Purpose
    /// - Validate that every required read setting is checked before anything connects
    ///
    /// Expected
    /// - Missing factory, missing destination, both destinations, missing mapper and a
    ///   password without username are all configuration errors
    #[test]
    fn test_read_builder_rejects_incomplete_configuration() {
        let reason = configuration_error(read_records().with_queue("q").build());
        assert!(reason.contains("connection factory"));

        let reason = configuration_error(
            read_records()
                .with_connection_factory(InMemoryBroker::new())
                .build(),
        );
        assert!(reason.contains("either a queue or a topic"));

        let reason = configuration_error(
            read_records()
                .with_connection_factory(InMemoryBroker::new())
                .with_queue("q")
                .with_topic("t")
                .build(),
        );
        assert!(reason.contains("exclusive"));

        let reason = configuration_error(
            ReadConfig::<String>::builder()
                .with_connection_factory(InMemoryBroker::new())
                .with_topic("t")
                .build(),
        );
        assert!(reason.contains("message mapper"));

        let reason = configuration_error(
            read_records()
                .with_connection_factory(InMemoryBroker::new())
                .with_queue("q")
                .with_password("secret")
                .build(),
        );
        assert!(reason.contains("username"));
    }

    #[test]
    fn test_read_builder_keeps_limits_and_credentials() {
        let config = read_records()
            .with_connection_factory(InMemoryBroker::new())
            .with_topic("events")
            .with_username("app")
            .with_max_num_records(10)
            .with_max_read_time(Duration::from_secs(2))
            .build()
            .expect("valid configuration");

        assert_eq!(
            config.destination(),
            &ReadDestination::Topic("events".to_string())
        );
        let credentials = config.credentials().expect("credentials");
        assert_eq!(credentials.username, "app");
        assert_eq!(credentials.password, None);
        assert_eq!(config.max_num_records(), Some(10));
        assert_eq!(config.max_read_time(), Some(Duration::from_secs(2)));
        assert!(config.is_bounded());
    }

    /// Test: write builder validation
    ///
    /// Expected
    /// - Exactly one of queue, topic and topic name mapper is accepted
    /// - A value mapper is required
    #[test]
    fn test_write_builder_requires_exactly_one_destination() {
        let reason = configuration_error(
            WriteConfig::<String>::builder()
                .with_connection_factory(InMemoryBroker::new())
                .with_value_mapper(text_message)
                .build(),
        );
        assert!(reason.contains("required"));

        let reason = configuration_error(
            WriteConfig::<String>::builder()
                .with_connection_factory(InMemoryBroker::new())
                .with_queue("q")
                .with_topic_name_mapper(|value: &String| value.clone())
                .with_value_mapper(text_message)
                .build(),
        );
        assert!(reason.contains("only one"));

        let reason = configuration_error(
            WriteConfig::<String>::builder()
                .with_connection_factory(InMemoryBroker::new())
                .with_topic("t")
                .build(),
        );
        assert!(reason.contains("value mapper"));

        let config = WriteConfig::<String>::builder()
            .with_connection_factory(InMemoryBroker::new())
            .with_topic_name_mapper(|value: &String| format!("topic-{}", value))
            .with_value_mapper(text_message)
            .build()
            .expect("valid configuration");
        assert!(config.destination().is_dynamic());
    }

    /// Test: settings seed the builders
    ///
    /// Flow
    /// - Parse read and write settings from YAML
    /// - Build configurations from them, adding the code-only parts
    ///
    /// Expected
    /// - Destinations, credentials and limits come from the file
    /// - desired_splits defaults to 1
    #[test]
    fn test_settings_from_yaml_seed_builders() {
        let read = ReadSettings::from_yaml_str(
            "queue: orders\nusername: app\npassword: secret\nmax_read_time_ms: 250\n",
        )
        .expect("read settings");
        assert_eq!(read.desired_splits, 1);

        let config = ReadConfigBuilder::from_settings(read)
            .with_connection_factory(InMemoryBroker::new())
            .with_message_mapper(|message: &BrokerMessage| {
                Ok(message.text_body().unwrap_or_default().to_string())
            })
            .build()
            .expect("read configuration");
        assert_eq!(
            config.destination(),
            &ReadDestination::Queue("orders".to_string())
        );
        assert_eq!(config.max_read_time(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_num_records(), None);
        assert_eq!(
            config.credentials().and_then(|c| c.password.as_deref()),
            Some("secret")
        );

        let write = WriteSettings::from_yaml_str("topic: audit\n").expect("write settings");
        let config = crate::WriteConfigBuilder::<String>::from_settings(write)
            .with_connection_factory(InMemoryBroker::new())
            .with_value_mapper(text_message)
            .build()
            .expect("write configuration");
        assert!(matches!(config.destination(), WriteDestination::Topic(name) if name == "audit"));
    }

    #[test]
    fn test_settings_reject_malformed_yaml() {
        let err = ReadSettings::from_yaml_str("max_num_records: [not, a, number]").unwrap_err();
        assert!(matches!(err, ConnectorError::Settings(_)));
    }
}
