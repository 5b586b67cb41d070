//! One peer's end of a collaboration session.
//!
//! `Session` owns the scene store, the outbound link, the sync engine and
//! the history manager, and dispatches scene events to the latter two.
//! Every entry point that can change the scene finishes with
//! [`Session::process_events`], so callers always observe a settled state.

use serde_json::Value;
use tandem_core::SceneStore;
use uuid::Uuid;

use crate::channel::{Channel, Link};
use crate::config::{Role, SessionConfig};
use crate::error::SyncError;
use crate::history::HistoryManager;
use crate::sync::SyncEngine;

type MessageHandler = Box<dyn FnMut(Value) + Send + 'static>;

pub struct Session<S, C> {
    scene: S,
    link: Link<C>,
    sync: SyncEngine,
    history: HistoryManager,
    peer_id: Uuid,
    on_message: Option<MessageHandler>,
}

impl<S: SceneStore, C: Channel> Session<S, C> {
    pub fn new(scene: S, channel: C, config: SessionConfig) -> Self {
        log::info!("session {} created as {:?}", config.peer_id, config.role);
        Self {
            scene,
            link: Link::new(channel),
            sync: SyncEngine::new(&config),
            history: HistoryManager::new(config.history.clone()),
            peer_id: config.peer_id,
            on_message: None,
        }
    }

    /// Like [`Session::new`] but rejects an invalid config.
    pub fn try_new(scene: S, channel: C, config: SessionConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self::new(scene, channel, config))
    }

    /// Receives application payloads (`{"data": ...}` messages).
    pub fn on_message(mut self, handler: impl FnMut(Value) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    /// Performs the handshake step for this peer's role and starts recording
    /// history.
    pub fn init(&mut self) -> Result<(), SyncError> {
        self.sync.init(&mut self.history, &mut self.link)?;
        self.process_events()
    }

    /// Sends an application payload to the peer.
    pub fn send(&mut self, data: Value) -> Result<(), SyncError> {
        self.link.send_data(data)
    }

    /// Handles one inbound message.
    pub fn receive(&mut self, raw: &str) -> Result<(), SyncError> {
        let received = self
            .sync
            .receive(raw, &mut self.scene, &mut self.history, &mut self.link);
        let settled = self.process_events();
        if let Some(data) = received? {
            match self.on_message.as_mut() {
                Some(handler) => handler(data),
                None => log::debug!("application message dropped, no handler"),
            }
        }
        settled
    }

    pub fn undo(&mut self) -> Result<bool, SyncError> {
        let done = self.history.undo(
            &mut self.scene,
            self.sync.ledger_mut(),
            &mut self.link,
            true,
        )?;
        self.process_events()?;
        Ok(done)
    }

    pub fn redo(&mut self) -> Result<bool, SyncError> {
        let done = self.history.redo(
            &mut self.scene,
            self.sync.ledger_mut(),
            &mut self.link,
            true,
        )?;
        self.process_events()?;
        Ok(done)
    }

    /// Runs a local edit against the scene and propagates what it changed.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> Result<R, SyncError> {
        let result = f(&mut self.scene);
        self.process_events()?;
        Ok(result)
    }

    /// Drains the scene's event queue, then runs deferred history work,
    /// until neither produces anything new.
    pub fn process_events(&mut self) -> Result<(), SyncError> {
        loop {
            let events = self.scene.drain_events();
            if events.is_empty() {
                if self.history.run_deferred(&mut self.scene) {
                    continue;
                }
                return Ok(());
            }
            for event in &events {
                self.sync.handle_event(event, &mut self.scene, &mut self.link)?;
                self.history
                    .handle_event(event, &mut self.scene, &mut self.link)?;
            }
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Direct access. Changes made here are propagated on the next call
    /// that processes events.
    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn link(&self) -> &Link<C> {
        &self.link
    }

    pub fn role(&self) -> Role {
        self.sync.role()
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }
}
