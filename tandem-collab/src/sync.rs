//! Synchronization engine: turns local scene events into ops and applies the
//! peer's ops to the local scene.
//!
//! Remote structural changes are applied through the same store calls a
//! local user would trigger, so they come back around as scene events. The
//! engine `expect`s each id in its echo ledger before mutating and swallows
//! the matching event when it is observed; nothing is re-sent to the origin.
//! Remote geometry updates go through silent access and produce no event.

use serde_json::Value;
use tandem_core::{
    absolute, new_id_with_len, GeometryPatch, GestureKind, Modification, ObjectKey, SceneEvent,
    SceneObject, SceneStore, Snapshot,
};

use crate::channel::{Channel, Link};
use crate::config::{Role, SessionConfig};
use crate::error::SyncError;
use crate::history::HistoryManager;
use crate::ledger::SuppressionLedger;
use crate::protocol::{Envelope, HistoryDirection, Inbound, ModifiedNotice, Op, RawOp, SyncPayload};

pub struct SyncEngine {
    role: Role,
    id_length: usize,
    echo: SuppressionLedger,
}

impl SyncEngine {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            role: config.role,
            id_length: config.id_length,
            echo: SuppressionLedger::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn ledger(&self) -> &SuppressionLedger {
        &self.echo
    }

    pub fn ledger_mut(&mut self) -> &mut SuppressionLedger {
        &mut self.echo
    }

    /// Starts the handshake. Only the responder speaks first.
    pub fn init<C: Channel>(
        &mut self,
        history: &mut HistoryManager,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        if self.role == Role::Responder {
            log::info!("requesting initial snapshot");
            link.send_sync(SyncPayload::init())?;
        }
        history.attach();
        Ok(())
    }

    pub fn handle_event<S: SceneStore, C: Channel>(
        &mut self,
        event: &SceneEvent,
        scene: &mut S,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        match event {
            SceneEvent::Added { keys } => self.on_local_add(keys, scene, link),
            SceneEvent::Removed { objects } => {
                let ids = objects.iter().filter_map(|o| o.id.clone()).collect();
                self.on_local_remove(ids, link)
            }
            SceneEvent::Transforming { keys, gesture } => {
                self.on_local_update(keys, *gesture, scene, link)
            }
            // Gesture ends are announced by the history manager.
            SceneEvent::Modified(_) => Ok(()),
        }
    }

    /// Assigns ids to new objects and sends the ones that are not echoes.
    pub fn on_local_add<S: SceneStore, C: Channel>(
        &mut self,
        keys: &[ObjectKey],
        scene: &mut S,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(object) = scene.get_mut(*key) else {
                continue;
            };
            if object.id.is_none() {
                object.id = Some(new_id_with_len(self.id_length));
            }
            objects.push(absolute(object));
        }

        let objects = self.echo.filter_and_consume(objects);
        Self::send_op(Op::Create(objects), link)
    }

    pub fn on_local_remove<C: Channel>(
        &mut self,
        ids: Vec<String>,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        Self::send_op(Op::Remove(self.echo.filter_ids(ids)), link)
    }

    /// Sends one gesture frame. Every frame goes out.
    pub fn on_local_update<S: SceneStore, C: Channel>(
        &mut self,
        keys: &[ObjectKey],
        gesture: GestureKind,
        scene: &S,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        let patches: Vec<GeometryPatch> = keys
            .iter()
            .filter_map(|key| scene.get(*key))
            .filter_map(|object| {
                let id = object.id()?;
                Some(GeometryPatch::from_gesture(id, &absolute(object).geometry, gesture))
            })
            .collect();
        Self::send_op(Op::Update(patches), link)
    }

    fn send_op<C: Channel>(op: Op, link: &mut Link<C>) -> Result<(), SyncError> {
        if op.is_empty() {
            return Ok(());
        }
        if !matches!(op, Op::Update(_)) {
            log::debug!("broadcasting {}", op.kind());
        }
        link.send_sync(SyncPayload::op(&op)?)
    }

    /// Decodes one inbound message. Application payloads are returned for the
    /// host; replication payloads are applied.
    pub fn receive<S: SceneStore, C: Channel>(
        &mut self,
        raw: &str,
        scene: &mut S,
        history: &mut HistoryManager,
        link: &mut Link<C>,
    ) -> Result<Option<Value>, SyncError> {
        match Envelope::decode(raw)? {
            Inbound::Application(data) => Ok(Some(data)),
            Inbound::Sync(payload) => {
                self.apply_remote(payload, scene, history, link)?;
                Ok(None)
            }
        }
    }

    /// Applies `init`, `snapshot`, `op`, `modified` and `undo`, in that order.
    pub fn apply_remote<S: SceneStore, C: Channel>(
        &mut self,
        payload: SyncPayload,
        scene: &mut S,
        history: &mut HistoryManager,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        // Decoded up front so a malformed op rejects the whole message.
        let op = match payload.op.as_ref().map(RawOp::decode).transpose()? {
            Some(Some(op)) => Some(op),
            Some(None) => {
                if let Some(raw) = &payload.op {
                    log::debug!("ignoring op of unknown kind {:?}", raw.kind);
                }
                None
            }
            None => None,
        };

        if payload.init == Some(true) {
            let snapshot = scene.snapshot();
            log::info!("answering init with {} objects", snapshot.len());
            link.send_sync(SyncPayload::snapshot(snapshot))?;
        }

        let direction = payload.direction();

        if let Some(snapshot) = payload.snapshot {
            self.load_snapshot(snapshot, scene, history);
        }

        if let Some(op) = op {
            self.apply_op(op, scene);
        }

        if let Some(ModifiedNotice { ids, previous }) = payload.modified {
            scene.notify(SceneEvent::Modified(Modification::Remote { ids, previous }));
        }

        match direction {
            Some(HistoryDirection::Undo) => {
                history.undo(scene, &mut self.echo, link, false)?;
            }
            Some(HistoryDirection::Redo) => {
                history.redo(scene, &mut self.echo, link, false)?;
            }
            None => {}
        }
        Ok(())
    }

    fn load_snapshot<S: SceneStore>(
        &mut self,
        snapshot: Snapshot,
        scene: &mut S,
        history: &mut HistoryManager,
    ) {
        let ids: Vec<String> = snapshot.ids().map(str::to_string).collect();
        log::info!("loading snapshot of {} objects", snapshot.len());
        self.echo.expect_all(ids.iter().cloned());
        history.reset_baseline(ids);
        scene.load(snapshot);
        scene.refresh();
    }

    fn apply_op<S: SceneStore>(&mut self, op: Op, scene: &mut S) {
        match op {
            Op::Create(objects) => {
                for object in objects {
                    self.create_remote(object, scene);
                }
            }
            Op::Remove(ids) => {
                let mut keys = Vec::with_capacity(ids.len());
                for id in ids {
                    // Expected even when absent; see `SuppressionLedger`.
                    if let Some(key) = scene.find(&id) {
                        keys.push(key);
                    }
                    self.echo.expect(id);
                }
                scene.remove(&keys);
            }
            Op::Update(patches) => {
                for patch in &patches {
                    let Some(key) = scene.find(&patch.id) else {
                        continue;
                    };
                    if let Some(object) = scene.get_mut(key) {
                        object.apply_patch(patch);
                    }
                }
            }
        }
        scene.refresh();
    }

    fn create_remote<S: SceneStore>(&mut self, object: SceneObject, scene: &mut S) {
        let Some(id) = object.id.clone() else {
            log::warn!("dropping remote create without an id");
            return;
        };
        if scene.find(&id).is_some() {
            log::debug!("object {id} already present, create ignored");
            return;
        }
        self.echo.expect(id);
        scene.insert(object);
    }
}
