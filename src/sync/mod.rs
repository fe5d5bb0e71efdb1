//! Sync records, their registry, and the caller-facing handles

pub mod gate;
pub mod handle;
pub mod record;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use gate::ReadinessGate;
pub use handle::SyncHandle;
pub use record::{Outcome, RequestPayload, SyncRecord, SyncState};
pub use registry::SyncRegistry;
pub use types::{CallArg, FetchRequest, NewSync, RequestInput, RequestOptions, SyncResponse};
