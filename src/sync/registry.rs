//! Ordered collection of the syncs known to this client.
//!
//! Names are unique among live (non-cancelled) records; ids are unique among
//! all records.

use super::record::{generate_id, SyncRecord};
use super::types::NewSync;
use crate::error::SyncError;

#[derive(Debug, Default)]
pub struct SyncRegistry {
    records: Vec<SyncRecord>,
    next_serial: u64,
}

impl SyncRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and append a record for `sync`, refusing a name that is
    /// already live. A cancelled record holding the name is replaced.
    pub fn register(&mut self, sync: NewSync) -> Result<&SyncRecord, SyncError> {
        if let Some(name) = sync.name.as_deref() {
            if let Some(existing) = self.records.iter().find(|r| r.id == name || r.name.as_deref() == Some(name)) {
                if !existing.cancelled {
                    return Err(SyncError::DuplicateName(name.to_string()));
                }
            }
            self.records
                .retain(|r| !(r.cancelled && (r.id == name || r.name.as_deref() == Some(name))));
        }

        let mut record = SyncRecord::from_user_options(sync);
        while record.name.is_none() && self.find_by_id(&record.id).is_some() {
            record.id = generate_id();
        }

        Ok(self.push(record))
    }

    fn push(&mut self, mut record: SyncRecord) -> &SyncRecord {
        self.next_serial += 1;
        record.serial = self.next_serial;
        self.records.push(record);
        tracing::debug!("Sync registered, total known: {}", self.records.len());
        &self.records[self.records.len() - 1]
    }

    /// Get the record registered under `name`
    pub fn find_by_name(&self, name: &str) -> Option<&SyncRecord> {
        self.records.iter().find(|r| r.name.as_deref() == Some(name))
    }

    /// Get the record with the given id
    pub fn find_by_id(&self, id: &str) -> Option<&SyncRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Get the record with the given id for update
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut SyncRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Get the record a handle points at
    pub(crate) fn find_by_serial_mut(&mut self, serial: u64) -> Option<&mut SyncRecord> {
        self.records.iter_mut().find(|r| r.serial == serial)
    }

    /// Merge the agent's snapshot into the local view.
    ///
    /// Snapshot records go first, followed by records created locally while
    /// the snapshot was being fetched. Local records whose id is already in
    /// the snapshot are displaced and returned.
    pub fn replace_all(&mut self, snapshot: Vec<SyncRecord>) -> Vec<SyncRecord> {
        let local = std::mem::take(&mut self.records);
        let (displaced, kept): (Vec<_>, Vec<_>) = local
            .into_iter()
            .partition(|r| snapshot.iter().any(|s| s.id == r.id));

        for record in snapshot {
            self.push(record);
        }
        self.records.extend(kept);

        if !displaced.is_empty() {
            tracing::warn!(
                "{} local syncs collided with the agent snapshot and were dropped",
                displaced.len()
            );
        }

        displaced
    }

    /// Take a single record out of the registry
    pub(crate) fn remove(&mut self, serial: u64) -> Option<SyncRecord> {
        let idx = self.records.iter().position(|r| r.serial == serial)?;
        Some(self.records.remove(idx))
    }

    /// Drop every record from the local view. Does not notify the agent.
    pub fn clear(&mut self) -> Vec<SyncRecord> {
        std::mem::take(&mut self.records)
    }

    /// Get the number of known records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are known
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in registration order
    pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
        self.records.iter()
    }
}
