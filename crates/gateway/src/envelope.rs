use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DecodeStage, Error};

const UNSPECIFIED_FAILURE: &str = "request failed";

/// Wire wrapper for every reply: `{"data": ..., "success": ..., "message": ...}`.
///
/// A failed envelope never carries data and always carries a message.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope {
    /// Serialized result on success.
    #[serde(default)]
    pub data: Option<Value>,

    /// Whether the handler succeeded.
    pub success: bool,

    /// Human-readable error on failure, empty on success.
    #[serde(default)]
    pub message: String,
}

impl Envelope {
    /// Wraps a successful result.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn success<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: Some(serde_json::to_value(value)?),
            success: true,
            message: String::new(),
        })
    }

    /// Wraps a failure message.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = UNSPECIFIED_FAILURE.to_string();
        }

        Self {
            data: None,
            success: false,
            message,
        }
    }

    /// Serializes the envelope for the wire.
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parses an envelope off the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not an envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|source| Error::Decode {
            stage: DecodeStage::Envelope,
            source,
        })
    }

    /// Converts the envelope into the caller's typed result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Application`] with the handler's message for a failed
    /// envelope, or [`Error::Decode`] if `data` does not fit `T`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, Error> {
        if !self.success {
            return Err(Error::Application(self.message));
        }

        serde_json::from_value(self.data.unwrap_or(Value::Null)).map_err(|source| Error::Decode {
            stage: DecodeStage::ResponseData,
            source,
        })
    }
}
