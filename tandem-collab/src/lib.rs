//! # tandem-collab: two-peer scene replication with mirrored undo
//!
//! Keeps a [`tandem_core::SceneStore`] consistent between two peers over an
//! ordered, reliable string channel, and keeps both peers' undo stacks
//! equivalent so an undo on one side can be replayed on the other.
//!
//! ## Architecture
//!
//! ```text
//!   local edit                                   inbound message
//!       │                                              │
//!       ▼                                              ▼
//! ┌─────────────┐  SceneEvent queue  ┌──────────────────────────┐
//! │ SceneStore  │ ─────────────────► │ Session::process_events  │
//! └─────────────┘                    └──────┬───────────┬───────┘
//!       ▲                                   │           │
//!       │ expect, then mutate               ▼           ▼
//!       │                           ┌────────────┐ ┌────────────────┐
//!       └────────────────────────── │ SyncEngine │ │ HistoryManager │
//!                                   │ echo ledger│ │ own ledger     │
//!                                   └─────┬──────┘ └───────┬────────┘
//!                                         │   JSON envelopes│
//!                                         ▼                 ▼
//!                                      ┌──────────────────────┐
//!                                      │ Link<impl Channel>   │
//!                                      └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON envelope, ops and notices
//! - [`ledger`]: per-id suppression counts
//! - [`sync`]: outbound ops and remote application
//! - [`history`]: undo/redo stack and replay
//! - [`session`]: per-peer facade and event dispatch
//! - [`channel`]: transport seam, tokio mpsc implementations
//! - [`config`]: roles, history limits and branch policy

pub mod channel;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod protocol;
pub mod session;
pub mod sync;

pub use channel::{Channel, Link};
pub use config::{BranchPolicy, HistoryConfig, Role, SessionConfig};
pub use error::SyncError;
pub use history::{ChangeKind, ChangeRecord, HistoryManager};
pub use ledger::SuppressionLedger;
pub use protocol::{
    Envelope, HistoryDirection, Inbound, ModifiedNotice, Op, RawOp, SyncPayload,
};
pub use session::Session;
pub use sync::SyncEngine;
