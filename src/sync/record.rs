//! The data model for one sync operation.

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use serde_json::Value;

use super::types::{FetchRequest, NewSync, RequestInput, RequestOptions, SyncResponse};
use crate::agent::WireSync;
use crate::codec::{Codec, CodecError};
use crate::deferred::{AlreadySettled, Deferred, Promise};
use crate::error::SyncError;

const GENERATED_ID_LENGTH: usize = 10;

/// What awaiting a sync eventually yields.
pub type Outcome = Result<SyncResponse, SyncError>;

/// The request carried by a record: the caller's description until the
/// record is dispatched, the codec's payload afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Raw {
        input: RequestInput,
        options: Option<RequestOptions>,
    },
    Serialized(Value),
}

impl Default for RequestPayload {
    fn default() -> Self {
        Self::Serialized(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Registered, waiting for the agent
    Pending,
    Resolved,
    Cancelled,
    /// Dispatch or decoding failed
    Failed,
}

#[derive(Debug, Default)]
pub struct SyncRecord {
    pub(crate) serial: u64,
    pub id: String,
    pub name: Option<String>,
    pub created_on: i64,
    pub synced_on: Option<i64>,
    pub request: RequestPayload,
    pub response: Option<SyncResponse>,
    pub cancelled: bool,
    deferred: Deferred<Outcome>,
}

impl SyncRecord {
    /// A new record for a sync the caller is creating now.
    pub fn from_user_options(sync: NewSync) -> Self {
        let NewSync {
            name,
            request,
            options,
        } = sync;

        Self {
            id: name.clone().unwrap_or_else(generate_id),
            name,
            created_on: Utc::now().timestamp_millis(),
            request: RequestPayload::Raw {
                input: request,
                options,
            },
            ..Default::default()
        }
    }

    /// Rebuild a record reported by the agent. Records that already carry a
    /// response come back settled.
    pub fn hydrate(wire: WireSync, codec: &dyn Codec) -> Self {
        let WireSync {
            id,
            name,
            created_on,
            synced_on,
            request,
            response,
            cancelled,
        } = wire;

        let mut record = Self {
            id,
            name: name.filter(|n| !n.is_empty()),
            created_on,
            synced_on,
            request: RequestPayload::Serialized(request),
            cancelled,
            ..Default::default()
        };

        if let Some(payload) = response {
            match codec.deserialize_response(payload) {
                Ok(response) => {
                    record.response = Some(response.clone());
                    let _ = record.deferred.settle(Ok(response));
                }
                Err(e) => {
                    tracing::warn!(id = %record.id, "Could not decode stored response: {}", e);
                    let _ = record.deferred.settle(Err(SyncError::Codec(e)));
                }
            }
        }

        record
    }

    /// Settle with the agent's response. Only named records keep the
    /// response and sync time for later lookups.
    pub fn resolve(&mut self, response: SyncResponse, synced_on: i64) -> Result<(), AlreadySettled> {
        self.deferred.settle(Ok(response.clone()))?;
        if self.name.is_some() {
            self.response = Some(response);
            self.synced_on = Some(synced_on);
        }
        Ok(())
    }

    pub fn reject(&self, error: SyncError) -> Result<(), AlreadySettled> {
        self.deferred.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.deferred.is_settled()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.deferred.peek()
    }

    pub fn promise(&self) -> Promise<Outcome> {
        self.deferred.promise()
    }

    /// A settled outcome wins over the cancel flag: the agent may still
    /// report a result for a cancelled sync.
    pub fn state(&self) -> SyncState {
        match self.deferred.peek() {
            None if self.cancelled => SyncState::Cancelled,
            None => SyncState::Pending,
            Some(Ok(_)) => SyncState::Resolved,
            Some(Err(SyncError::Cancelled)) => SyncState::Cancelled,
            Some(Err(_)) => SyncState::Failed,
        }
    }

    /// Replace the raw request with its serialized form. No-op once
    /// serialized.
    pub fn serialize_request(&mut self, codec: &dyn Codec) -> Result<(), CodecError> {
        if let RequestPayload::Raw { input, options } = &self.request {
            let request = FetchRequest::from_parts(input, options.as_ref());
            let payload = codec.serialize_request(&request)?;
            self.request = RequestPayload::Serialized(payload);
        }
        Ok(())
    }

    /// The `REGISTER_SYNC` payload. Call after `serialize_request`.
    pub fn to_wire(&self) -> WireSync {
        let request = match &self.request {
            RequestPayload::Serialized(payload) => payload.clone(),
            RequestPayload::Raw { .. } => Value::Null,
        };

        WireSync {
            id: self.id.clone(),
            name: self.name.clone(),
            created_on: self.created_on,
            synced_on: self.synced_on,
            request,
            response: None,
            cancelled: self.cancelled,
        }
    }
}

pub(crate) fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LENGTH)
        .map(char::from)
        .collect()
}
