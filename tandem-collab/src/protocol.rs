//! JSON wire protocol between the two peers.
//!
//! Every message is one JSON object carrying exactly one of two keys:
//! ```text
//! { "data": <application payload> }             opaque passthrough
//! { "fabricSync": {                              replication
//!     "init":     true,                          responder handshake
//!     "snapshot": [object, ...],                 full scene
//!     "op":       { "kind": "create" | "update" | "remove", "data": [...] },
//!     "modified": { "ids": [...], "previous": { id: geometry } },
//!     "undo":     true | false                   undo / redo signal
//! } }
//! ```
//!
//! Unknown keys are ignored at every level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::{Geometry, GeometryPatch, SceneObject, Snapshot};

use crate::error::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "fabricSync", default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// For the host. A message without either key delivers `null`.
    Application(Value),
    Sync(SyncPayload),
}

impl Envelope {
    pub fn decode(raw: &str) -> Result<Inbound, SyncError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(SyncError::Decode)?;
        Ok(match envelope.sync {
            Some(payload) => Inbound::Sync(payload),
            None => Inbound::Application(envelope.data.unwrap_or(Value::Null)),
        })
    }

    pub fn encode_sync(payload: SyncPayload) -> Result<String, SyncError> {
        let envelope = Envelope {
            sync: Some(payload),
            data: None,
        };
        serde_json::to_string(&envelope).map_err(SyncError::Encode)
    }

    pub fn encode_data(data: Value) -> Result<String, SyncError> {
        let envelope = Envelope {
            sync: None,
            data: Some(data),
        };
        serde_json::to_string(&envelope).map_err(SyncError::Encode)
    }
}

/// Replication fields. Several may arrive together; receivers handle them
/// in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<RawOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<ModifiedNotice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<bool>,
}

impl SyncPayload {
    pub fn init() -> Self {
        Self {
            init: Some(true),
            ..Self::default()
        }
    }

    pub fn snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    pub fn op(op: &Op) -> Result<Self, SyncError> {
        Ok(Self {
            op: Some(RawOp::encode(op)?),
            ..Self::default()
        })
    }

    pub fn modified(notice: ModifiedNotice) -> Self {
        Self {
            modified: Some(notice),
            ..Self::default()
        }
    }

    pub fn history(direction: HistoryDirection) -> Self {
        Self {
            undo: Some(direction == HistoryDirection::Undo),
            ..Self::default()
        }
    }

    pub fn direction(&self) -> Option<HistoryDirection> {
        self.undo.map(|undo| {
            if undo {
                HistoryDirection::Undo
            } else {
                HistoryDirection::Redo
            }
        })
    }
}

/// An op as it travels: `kind` is kept as a string so that kinds this peer
/// does not know can be skipped instead of failing the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOp {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl RawOp {
    pub fn encode(op: &Op) -> Result<Self, SyncError> {
        let data = match op {
            Op::Create(objects) => serde_json::to_value(objects),
            Op::Update(patches) => serde_json::to_value(patches),
            Op::Remove(ids) => serde_json::to_value(ids),
        }
        .map_err(SyncError::Encode)?;
        Ok(Self {
            kind: op.kind().to_string(),
            data,
        })
    }

    /// `Ok(None)` for an unknown kind. Malformed data for a known kind is
    /// a decode error.
    pub fn decode(&self) -> Result<Option<Op>, SyncError> {
        let data = self.data.clone();
        let op = match self.kind.as_str() {
            "create" => Op::Create(serde_json::from_value(data).map_err(SyncError::Decode)?),
            "update" => Op::Update(serde_json::from_value(data).map_err(SyncError::Decode)?),
            "remove" => Op::Remove(serde_json::from_value(data).map_err(SyncError::Decode)?),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

/// A structural or geometric batch change.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Create(Vec<SceneObject>),
    Update(Vec<GeometryPatch>),
    Remove(Vec<String>),
}

impl Op {
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Create(_) => "create",
            Op::Update(_) => "update",
            Op::Remove(_) => "remove",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Op::Create(items) => items.is_empty(),
            Op::Update(items) => items.is_empty(),
            Op::Remove(items) => items.is_empty(),
        }
    }
}

/// Sent when a local gesture ends so the peer can record the same change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedNotice {
    pub ids: Vec<String>,
    #[serde(default)]
    pub previous: BTreeMap<String, Geometry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Undo,
    Redo,
}
