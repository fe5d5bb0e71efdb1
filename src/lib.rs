//! Background request sync client.
//!
//! Requests handed to [`SyncClient::create`] are registered with a
//! long-lived background agent, which performs them once connectivity
//! allows and pushes the response back to whichever client is attached.
//! Syncs survive client restarts: on [`SyncClient::init`] the client pulls
//! the agent's snapshot and rebuilds its local view from it.

pub mod agent;
mod client;
pub mod codec;
pub mod config;
pub mod deferred;
pub mod error;
pub mod fetch;
pub mod sync;

pub use client::{Initializing, SyncClient, SyncClientBuilder};
pub use config::{AgentConfig, ClientConfig};
pub use error::SyncError;
pub use sync::{
    CallArg, FetchRequest, NewSync, RequestInput, RequestOptions, SyncHandle, SyncResponse,
    SyncState,
};
