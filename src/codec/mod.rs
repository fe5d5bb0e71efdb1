//! Conversion between requests/responses and the plain payloads exchanged
//! with the background agent.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::sync::{FetchRequest, SyncResponse};

#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("Invalid payload: {0}")]
    Invalid(String),

    #[error("Base64 decode error: {0}")]
    Base64(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Invalid(e.to_string())
    }
}

impl From<base64::DecodeError> for CodecError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e.to_string())
    }
}

/// Serialization seam between the client and the agent.
pub trait Codec: Send + Sync {
    fn serialize_request(&self, request: &FetchRequest) -> Result<Value, CodecError>;

    fn deserialize_response(&self, payload: Value) -> Result<SyncResponse, CodecError>;
}

/// Request as sent to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Response as reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedResponse {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 encoded
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

/// JSON codec with base64 bodies. Lenient on decode: absent fields take
/// defaults, so `{"status": 200}` is a valid response.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Agent-side inverse of [`Codec::deserialize_response`].
    pub fn serialize_response(&self, response: &SyncResponse) -> Result<Value, CodecError> {
        let serialized = SerializedResponse {
            url: response.url.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
        };
        Ok(serde_json::to_value(serialized)?)
    }

    /// Agent-side inverse of [`Codec::serialize_request`].
    pub fn deserialize_request(&self, payload: Value) -> Result<FetchRequest, CodecError> {
        let serialized: SerializedRequest = serde_json::from_value(payload)?;
        let body = serialized
            .body
            .map(|body| BASE64.decode(body))
            .transpose()?;

        Ok(FetchRequest {
            url: serialized.url,
            method: serialized.method,
            headers: serialized.headers,
            body,
        })
    }
}

impl Codec for JsonCodec {
    fn serialize_request(&self, request: &FetchRequest) -> Result<Value, CodecError> {
        let serialized = SerializedRequest {
            url: request.url.clone(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(|body| BASE64.encode(body)),
        };
        Ok(serde_json::to_value(serialized)?)
    }

    fn deserialize_response(&self, payload: Value) -> Result<SyncResponse, CodecError> {
        if !payload.is_object() {
            return Err(CodecError::Invalid(format!(
                "expected response object, got {}",
                payload
            )));
        }

        let serialized: SerializedResponse = serde_json::from_value(payload)?;
        Ok(SyncResponse {
            url: serialized.url,
            status: serialized.status,
            status_text: serialized.status_text,
            headers: serialized.headers,
            body: BASE64.decode(serialized.body)?,
        })
    }
}
