//! Undo/redo history mirrored across both peers.
//!
//! The manager listens to the same scene events as the sync engine. Local
//! and remote changes both land here, so each peer builds an equivalent
//! stack and a bare undo/redo signal resolves to the same record on either
//! side.
//!
//! Structural replays go through the scene store like any other change.
//! The replayed objects are tagged as programmatic and registered in this
//! manager's ledger (so they are not recorded again) and in the sync
//! engine's ledger (so they are not sent as ops).

use std::collections::{BTreeMap, VecDeque};

use tandem_core::{
    absolute, Geometry, Modification, ObjectKey, SceneEvent, SceneObject, SceneStore,
};

use crate::channel::{Channel, Link};
use crate::config::{BranchPolicy, HistoryConfig};
use crate::error::SyncError;
use crate::ledger::SuppressionLedger;
use crate::protocol::{HistoryDirection, ModifiedNotice, SyncPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Remove,
    Update,
}

/// One undoable change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    /// Absolute snapshots: what was created or removed, or the state after
    /// an update.
    pub items: Vec<SceneObject>,
    /// Geometry before an update, by id. Empty for structural records.
    pub previous: BTreeMap<String, Geometry>,
}

impl ChangeRecord {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|o| o.id())
    }
}

/// Work that waits until the scene's event queue has drained. Records are
/// appended in the order their events were observed.
#[derive(Debug)]
enum Deferred {
    Record {
        kind: ChangeKind,
        objects: Vec<SceneObject>,
        skip: bool,
    },
    /// Already filtered; appended as is.
    Update(ChangeRecord),
    Remove(Vec<ObjectKey>),
}

pub struct HistoryManager {
    stack: VecDeque<ChangeRecord>,
    /// Index of the record the next undo reverts; -1 when there is none.
    position: isize,
    ledger: SuppressionLedger,
    deferred: VecDeque<Deferred>,
    attached: bool,
    config: HistoryConfig,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            stack: VecDeque::new(),
            position: -1,
            ledger: SuppressionLedger::new(),
            deferred: VecDeque::new(),
            attached: false,
            config,
        }
    }

    /// Starts listening to scene events.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn position(&self) -> isize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.position >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.position < self.top()
    }

    pub fn records(&self) -> &VecDeque<ChangeRecord> {
        &self.stack
    }

    pub fn ledger(&self) -> &SuppressionLedger {
        &self.ledger
    }

    /// True while deferred work is waiting for the next turn.
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.position = -1;
    }

    /// Clears the stack ahead of a snapshot load. The loaded objects will
    /// surface as adds; they form the baseline and are not recorded.
    pub fn reset_baseline<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear();
        if self.attached {
            self.ledger.expect_all(ids);
        }
    }

    /// Appends a record and moves the cursor onto it.
    pub fn push(&mut self, record: ChangeRecord) {
        if self.config.branch_policy == BranchPolicy::Truncate {
            self.stack.truncate((self.position + 1) as usize);
        }
        log::debug!("recording {:?} of {} objects", record.kind, record.items.len());
        self.stack.push_back(record);
        while self.stack.len() > self.config.capacity.max(1) {
            self.stack.pop_front();
        }
        self.position = self.top();
    }

    pub fn handle_event<S: SceneStore, C: Channel>(
        &mut self,
        event: &SceneEvent,
        scene: &mut S,
        link: &mut Link<C>,
    ) -> Result<(), SyncError> {
        if !self.attached {
            return Ok(());
        }
        match event {
            SceneEvent::Added { keys } => {
                let mut skip = false;
                let mut objects = Vec::with_capacity(keys.len());
                for key in keys {
                    if let Some(object) = scene.get_mut(*key) {
                        if object.programmatic {
                            object.programmatic = false;
                            skip = true;
                        }
                        objects.push(absolute(object));
                    }
                }
                self.defer_record(ChangeKind::Create, objects, skip);
            }
            SceneEvent::Removed { objects } => {
                let skip = objects.iter().any(|o| o.programmatic);
                let objects = objects
                    .iter()
                    .map(|o| {
                        let mut snapshot = absolute(o);
                        snapshot.programmatic = false;
                        snapshot
                    })
                    .collect();
                self.defer_record(ChangeKind::Remove, objects, skip);
            }
            SceneEvent::Transforming { .. } => {}
            SceneEvent::Modified(Modification::Gesture { keys, previous }) => {
                let before: BTreeMap<ObjectKey, Geometry> = previous.iter().copied().collect();
                let mut items = Vec::with_capacity(keys.len());
                let mut by_id = BTreeMap::new();
                for key in keys {
                    let Some(object) = scene.get(*key) else {
                        continue;
                    };
                    let Some(id) = object.id() else {
                        continue;
                    };
                    if let Some(geometry) = before.get(key) {
                        by_id.insert(id.to_string(), *geometry);
                    }
                    items.push(absolute(object));
                }

                let Some(record) = self.record_update(items, by_id) else {
                    return Ok(());
                };
                let notice = ModifiedNotice {
                    ids: record.ids().map(str::to_string).collect(),
                    previous: record.previous.clone(),
                };
                self.deferred.push_back(Deferred::Update(record));
                link.send_sync(SyncPayload::modified(notice))?;
            }
            SceneEvent::Modified(Modification::Remote { ids, previous }) => {
                let items = ids
                    .iter()
                    .filter_map(|id| scene.lookup(id))
                    .map(absolute)
                    .collect();
                if let Some(record) = self.record_update(items, previous.clone()) {
                    self.deferred.push_back(Deferred::Update(record));
                }
            }
        }
        Ok(())
    }

    /// Runs everything deferred so far. Returns false if there was nothing
    /// to run.
    pub fn run_deferred<S: SceneStore>(&mut self, scene: &mut S) -> bool {
        if self.deferred.is_empty() {
            return false;
        }
        let tasks: Vec<Deferred> = self.deferred.drain(..).collect();
        for task in tasks {
            match task {
                Deferred::Record { kind, objects, skip } => {
                    let objects = self.ledger.filter_and_consume(objects);
                    if !skip && !objects.is_empty() {
                        self.push(ChangeRecord {
                            kind,
                            items: objects,
                            previous: BTreeMap::new(),
                        });
                    }
                }
                Deferred::Update(record) => self.push(record),
                Deferred::Remove(keys) => {
                    scene.remove(&keys);
                }
            }
        }
        true
    }

    /// Reverts the record under the cursor. False, with nothing changed,
    /// when there is none.
    pub fn undo<S: SceneStore, C: Channel>(
        &mut self,
        scene: &mut S,
        echo: &mut SuppressionLedger,
        link: &mut Link<C>,
        broadcast: bool,
    ) -> Result<bool, SyncError> {
        if self.position < 0 {
            return Ok(false);
        }
        let record = self.stack[self.position as usize].clone();
        self.position -= 1;
        log::info!("undo {:?} ({} objects)", record.kind, record.items.len());
        self.replay(&record, HistoryDirection::Undo, scene, echo);
        scene.refresh();
        if broadcast {
            link.send_sync(SyncPayload::history(HistoryDirection::Undo))?;
        }
        Ok(true)
    }

    /// Re-applies the record above the cursor. False, with nothing changed,
    /// when the cursor is at the top.
    pub fn redo<S: SceneStore, C: Channel>(
        &mut self,
        scene: &mut S,
        echo: &mut SuppressionLedger,
        link: &mut Link<C>,
        broadcast: bool,
    ) -> Result<bool, SyncError> {
        if self.position >= self.top() {
            return Ok(false);
        }
        self.position += 1;
        let record = self.stack[self.position as usize].clone();
        log::info!("redo {:?} ({} objects)", record.kind, record.items.len());
        self.replay(&record, HistoryDirection::Redo, scene, echo);
        scene.refresh();
        if broadcast {
            link.send_sync(SyncPayload::history(HistoryDirection::Redo))?;
        }
        Ok(true)
    }

    fn top(&self) -> isize {
        self.stack.len() as isize - 1
    }

    fn defer_record(&mut self, kind: ChangeKind, objects: Vec<SceneObject>, skip: bool) {
        if objects.is_empty() {
            return;
        }
        self.deferred.push_back(Deferred::Record { kind, objects, skip });
    }

    fn record_update(
        &mut self,
        items: Vec<SceneObject>,
        mut previous: BTreeMap<String, Geometry>,
    ) -> Option<ChangeRecord> {
        let items = self.ledger.filter_and_consume(items);
        if items.is_empty() {
            return None;
        }
        previous.retain(|id, _| items.iter().any(|o| o.id() == Some(id.as_str())));
        Some(ChangeRecord {
            kind: ChangeKind::Update,
            items,
            previous,
        })
    }

    fn replay<S: SceneStore>(
        &mut self,
        record: &ChangeRecord,
        direction: HistoryDirection,
        scene: &mut S,
        echo: &mut SuppressionLedger,
    ) {
        match (record.kind, direction) {
            (ChangeKind::Update, HistoryDirection::Undo) => {
                for (id, geometry) in &record.previous {
                    restore(scene, id, geometry);
                }
            }
            (ChangeKind::Update, HistoryDirection::Redo) => {
                for item in &record.items {
                    if let Some(id) = item.id() {
                        restore(scene, id, &item.geometry);
                    }
                }
            }
            (ChangeKind::Create, HistoryDirection::Undo)
            | (ChangeKind::Remove, HistoryDirection::Redo) => {
                self.remove_replayed(record, scene, echo);
            }
            (ChangeKind::Create, HistoryDirection::Redo)
            | (ChangeKind::Remove, HistoryDirection::Undo) => {
                self.recreate(record, scene, echo);
            }
        }
    }

    fn remove_replayed<S: SceneStore>(
        &mut self,
        record: &ChangeRecord,
        scene: &mut S,
        echo: &mut SuppressionLedger,
    ) {
        let mut keys = Vec::new();
        for id in record.ids() {
            let Some(key) = scene.find(id) else {
                continue;
            };
            if let Some(object) = scene.get_mut(key) {
                object.programmatic = true;
            }
            self.ledger.expect(id);
            echo.expect(id);
            keys.push(key);
        }
        if !keys.is_empty() {
            self.deferred.push_back(Deferred::Remove(keys));
        }
    }

    fn recreate<S: SceneStore>(
        &mut self,
        record: &ChangeRecord,
        scene: &mut S,
        echo: &mut SuppressionLedger,
    ) {
        for item in &record.items {
            let Some(id) = item.id() else {
                continue;
            };
            if scene.find(id).is_some() {
                log::debug!("object {id} already present, not recreated");
                continue;
            }
            let mut object = item.clone();
            object.programmatic = true;
            object.group = None;
            self.ledger.expect(id);
            echo.expect(id);
            scene.insert(object);
        }
    }
}

fn restore<S: SceneStore>(scene: &mut S, id: &str, geometry: &Geometry) {
    let Some(key) = scene.find(id) else {
        return;
    };
    if let Some(object) = scene.get_mut(key) {
        object.group = None;
        object.set_geometry(*geometry);
    }
}
