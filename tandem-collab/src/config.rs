//! Session configuration.
//!
//! Every field has a default, so a host can deserialize a partial JSON
//! object (or nothing at all) and get a working responder/initiator pair.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Which side of the connection holds the source-of-truth scene at start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Answers `init` with its snapshot.
    #[default]
    Initiator,
    /// Sends `init` and adopts the initiator's scene.
    Responder,
}

/// What happens to undone records when a new change is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchPolicy {
    /// Keep them; the cursor jumps to the newest record and they stay
    /// reachable by undo.
    #[default]
    Retain,
    /// Drop everything above the cursor before appending.
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of records; the oldest is dropped on overflow.
    pub capacity: usize,
    pub branch_policy: BranchPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            branch_policy: BranchPolicy::Retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub role: Role,
    /// Identifies this peer in logs.
    pub peer_id: Uuid,
    /// Hex characters per generated object id.
    pub id_length: usize,
    pub history: HistoryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: Role::Initiator,
            peer_id: Uuid::new_v4(),
            id_length: tandem_core::DEFAULT_ID_LEN,
            history: HistoryConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn initiator() -> Self {
        Self::default()
    }

    pub fn responder() -> Self {
        Self {
            role: Role::Responder,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Rejects settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.id_length < 2 || self.id_length % 2 != 0 {
            return Err(SyncError::Config(format!(
                "id_length must be an even number >= 2, got {}",
                self.id_length
            )));
        }
        if self.history.capacity == 0 {
            return Err(SyncError::Config("history capacity must be at least 1".into()));
        }
        Ok(())
    }
}
