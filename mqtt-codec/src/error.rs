use std::error::Error as StdError;

use derive_more::Display;

/// A sequence of bytes that could not be interpreted as an MQTT packet.
#[derive(Debug, Clone, PartialEq, Display)]
#[display(fmt = "{}", message)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        DecodeError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl StdError for DecodeError {}
