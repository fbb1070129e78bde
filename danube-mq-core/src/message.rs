use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::destination::BrokerDestination;

/// Priority assigned to messages that don't set one explicitly.
pub const DEFAULT_PRIORITY: i32 = 4;

/// Broker-assigned message identifier.
///
/// Identifiers are stable for the lifetime of a message on the broker, including
/// across redeliveries, which is what makes them usable in a persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        MessageId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    NonPersistent,
    #[default]
    Persistent,
}

impl DeliveryMode {
    /// Numeric wire value (1 = non persistent, 2 = persistent).
    pub fn as_i32(&self) -> i32 {
        match self {
            DeliveryMode::NonPersistent => 1,
            DeliveryMode::Persistent => 2,
        }
    }
}

/// Scalar value of a user-defined message property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    Text(String),
    Bytes(Vec<u8>),
}

/// A message as it travels on the broker.
///
/// Headers that the broker owns (`message_id`, `destination`, `redelivered`) are
/// stamped on send and on delivery; a zero `timestamp` is stamped with the send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub message_id: Option<MessageId>,
    // milliseconds since the unix epoch
    pub timestamp: i64,
    pub correlation_id: Option<String>,
    pub reply_to: Option<BrokerDestination>,
    pub destination: Option<BrokerDestination>,
    pub delivery_mode: DeliveryMode,
    pub redelivered: bool,
    pub message_type: Option<String>,
    // 0 means the message never expires
    pub expiration: i64,
    pub priority: i32,
    pub properties: HashMap<String, PropertyValue>,
    pub body: MessageBody,
}

impl BrokerMessage {
    fn with_body(body: MessageBody) -> Self {
        BrokerMessage {
            message_id: None,
            timestamp: 0,
            correlation_id: None,
            reply_to: None,
            destination: None,
            delivery_mode: DeliveryMode::default(),
            redelivered: false,
            message_type: None,
            expiration: 0,
            priority: DEFAULT_PRIORITY,
            properties: HashMap::new(),
            body,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_body(MessageBody::Text(text.into()))
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Self::with_body(MessageBody::Bytes(data))
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: BrokerDestination) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    pub fn with_expiration(mut self, expiration: i64) -> Self {
        self.expiration = expiration;
        self
    }

    /// Returns the text body, or `None` for a bytes message.
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Bytes(_) => None,
        }
    }

    /// Size of the body in bytes.
    pub fn size(&self) -> usize {
        match &self.body {
            MessageBody::Text(text) => text.len(),
            MessageBody::Bytes(data) => data.len(),
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiration > 0 && self.expiration <= now_millis
    }
}
