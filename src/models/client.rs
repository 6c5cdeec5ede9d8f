use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry mapping, keyed by client identity (source IP).
pub type ClientMap = HashMap<String, ClientRecord>;

/// Per-client registry entry. Created the first time an identity connects,
/// mutated on completed requests, never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    /// When this identity first connected
    pub first_seen: DateTime<Utc>,
    /// Blocked clients are rejected at admission, before any command is read
    pub blocked: bool,
    /// Maximum total bytes this client's files may occupy
    pub quota: i64,
    /// Bytes currently accounted to this client. Signed: `release` applies
    /// no floor, so out-of-band file changes can drive it below zero.
    pub occupied_space: i64,
    /// Commands served for this identity (success or declared error)
    pub request_count: u64,
}

impl ClientRecord {
    pub fn new(quota: i64) -> Self {
        Self {
            first_seen: Utc::now(),
            blocked: false,
            quota,
            occupied_space: 0,
            request_count: 0,
        }
    }

    pub fn free_space(&self) -> i64 {
        self.quota - self.occupied_space
    }
}

/// One LIST entry: a regular file in the client's namespace directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}
