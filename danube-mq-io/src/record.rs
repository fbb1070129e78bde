use danube_mq_core::{BrokerDestination, BrokerMessage, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::BoxError;

/// A consumed text message, with every header and property copied out of the broker message.
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    message_id: String,
    timestamp: i64,
    correlation_id: Option<String>,
    reply_to: Option<BrokerDestination>,
    destination: BrokerDestination,
    delivery_mode: i32,
    redelivered: bool,
    message_type: Option<String>,
    expiration: i64,
    priority: i32,
    properties: HashMap<String, PropertyValue>,
    payload: String,
}

impl Record {
    /// The default message mapper. Fails for a message without a text body, and for a
    /// message the broker did not stamp with an identifier and a destination.
    pub fn from_message(message: &BrokerMessage) -> Result<Record, BoxError> {
        let message_id = message
            .message_id
            .as_ref()
            .ok_or("message has no identifier")?;
        let destination = message
            .destination
            .clone()
            .ok_or_else(|| format!("message {} has no destination", message_id))?;
        let payload = message
            .text_body()
            .ok_or_else(|| format!("message {} is not a text message", message_id))?;

        Ok(Record {
            message_id: message_id.to_string(),
            timestamp: message.timestamp,
            correlation_id: message.correlation_id.clone(),
            reply_to: message.reply_to.clone(),
            destination,
            delivery_mode: message.delivery_mode.as_i32(),
            redelivered: message.redelivered,
            message_type: message.message_type.clone(),
            expiration: message.expiration,
            priority: message.priority,
            properties: message.properties.clone(),
            payload: payload.to_string(),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn reply_to(&self) -> Option<&BrokerDestination> {
        self.reply_to.as_ref()
    }

    pub fn destination(&self) -> &BrokerDestination {
        &self.destination
    }

    pub fn delivery_mode(&self) -> i32 {
        self.delivery_mode
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}
