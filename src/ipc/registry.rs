//! Pending request registry
//!
//! Tracks background commands from dispatch until their single correlated reply.

use crate::models::CommandKind;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("request id '{0}' is already outstanding")]
    DuplicateRid(String),
}

/// One outstanding background command
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub rid: String,

    /// Channel the correlated reply goes back to
    pub channel: String,

    pub kind: String,

    pub started_at: DateTime<Utc>,
}

/// Outstanding background commands keyed by request id
#[derive(Debug, Default)]
pub struct PendingRegistry {
    pending: DashMap<String, PendingRequest>,
    next_id: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a background command.
    ///
    /// Uses the caller's id when given, otherwise generates `req-<n>`. Returns the id
    /// the correlated reply will carry.
    pub fn register(
        &self,
        rid: Option<String>,
        channel: &str,
        kind: &CommandKind,
    ) -> Result<String, RegistryError> {
        let make = |rid: String| PendingRequest {
            rid,
            channel: channel.to_string(),
            kind: kind.word().to_string(),
            started_at: Utc::now(),
        };

        if let Some(rid) = rid {
            return match self.pending.entry(rid.clone()) {
                Entry::Occupied(_) => Err(RegistryError::DuplicateRid(rid)),
                Entry::Vacant(slot) => {
                    slot.insert(make(rid.clone()));
                    Ok(rid)
                }
            };
        }

        // A caller may have picked an id that looks generated; skip past it.
        loop {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let rid = format!("req-{}", n);
            if let Entry::Vacant(slot) = self.pending.entry(rid.clone()) {
                slot.insert(make(rid.clone()));
                return Ok(rid);
            }
        }
    }

    /// Remove a request once its reply has been sent
    pub fn complete(&self, rid: &str) -> Option<PendingRequest> {
        self.pending.remove(rid).map(|(_, v)| v)
    }

    pub fn contains(&self, rid: &str) -> bool {
        self.pending.contains_key(rid)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outstanding requests originating from one channel
    pub fn list_for_channel(&self, channel: &str) -> Vec<PendingRequest> {
        self.pending
            .iter()
            .filter(|r| r.value().channel == channel)
            .map(|r| r.value().clone())
            .collect()
    }
}
