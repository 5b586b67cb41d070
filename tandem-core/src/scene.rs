//! Scene store seam and the in-memory scene.
//!
//! Mutations that change membership queue [`SceneEvent`]s; nothing is
//! dispatched synchronously. Whoever drives the store (the collaboration
//! session) drains the queue and hands each event to its listeners, which
//! may mutate the store again and queue more events.

use std::collections::{BTreeMap, VecDeque};

use crate::geometry::{Affine, Geometry, GestureKind};
use crate::transform::absolute;
use crate::{SceneObject, Snapshot};

/// Store-local handle of a live object. Stable for the object's lifetime,
/// never sent over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(u64);

/// Where a finished geometry change came from.
#[derive(Clone, Debug, PartialEq)]
pub enum Modification {
    /// A local gesture ended. `previous` holds each object's absolute
    /// geometry from before the gesture started.
    Gesture {
        keys: Vec<ObjectKey>,
        previous: Vec<(ObjectKey, Geometry)>,
    },
    /// The peer finished a gesture; the matching geometry already arrived
    /// through update ops.
    Remote {
        ids: Vec<String>,
        previous: BTreeMap<String, Geometry>,
    },
}

/// Structural and gesture notifications emitted by a scene store.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneEvent {
    Added { keys: Vec<ObjectKey> },
    /// Carries the removed objects themselves; their keys are dead.
    Removed { objects: Vec<SceneObject> },
    /// One frame of an in-progress gesture.
    Transforming { keys: Vec<ObjectKey>, gesture: GestureKind },
    Modified(Modification),
}

/// What the collaboration layer needs from the object collection.
pub trait SceneStore {
    /// Adds an object on top and queues `Added`.
    fn insert(&mut self, object: SceneObject) -> ObjectKey;

    /// Removes the live objects among `keys` and queues one `Removed` for
    /// them. Unknown keys are skipped.
    fn remove(&mut self, keys: &[ObjectKey]) -> Vec<SceneObject>;

    fn find(&self, id: &str) -> Option<ObjectKey>;

    fn get(&self, key: ObjectKey) -> Option<&SceneObject>;

    /// Silent access: changes made through this reference queue nothing.
    fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneObject>;

    /// Keys in stacking order, bottom first.
    fn keys(&self) -> Vec<ObjectKey>;

    fn snapshot(&self) -> Snapshot;

    /// Replaces the whole content without removal events, then queues one
    /// `Added` per loaded object.
    fn load(&mut self, snapshot: Snapshot) -> Vec<ObjectKey>;

    /// Recomputes render state after programmatic changes.
    fn refresh(&mut self);

    fn notify(&mut self, event: SceneEvent);

    fn drain_events(&mut self) -> Vec<SceneEvent>;

    fn lookup(&self, id: &str) -> Option<&SceneObject> {
        self.find(id).and_then(|key| self.get(key))
    }

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ActiveGesture {
    kind: GestureKind,
    keys: Vec<ObjectKey>,
    previous: Vec<(ObjectKey, Geometry)>,
}

/// In-memory scene with a FIFO event queue and gesture tracking.
#[derive(Default)]
pub struct Scene {
    objects: Vec<(ObjectKey, SceneObject)>,
    next_key: u64,
    events: VecDeque<SceneEvent>,
    gesture: Option<ActiveGesture>,
    renders: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds several objects as one selection: a single `Added` carries all
    /// of them.
    pub fn add_all(&mut self, objects: Vec<SceneObject>) -> Vec<ObjectKey> {
        let keys: Vec<ObjectKey> = objects.into_iter().map(|o| self.store(o)).collect();
        if !keys.is_empty() {
            self.events.push_back(SceneEvent::Added { keys: keys.clone() });
        }
        keys
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().map(|(_, o)| o)
    }

    /// How many times render state was recomputed.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Puts `keys` into (or, with `None`, out of) a transient selection
    /// whose transform is `group`.
    pub fn set_group(&mut self, keys: &[ObjectKey], group: Option<Affine>) {
        for key in keys {
            if let Some(object) = self.get_mut(*key) {
                object.group = group;
                object.refresh_coords();
            }
        }
    }

    /// Starts a gesture and remembers each object's absolute geometry.
    /// An unfinished gesture is dropped without a `Modified` event.
    pub fn begin_gesture(&mut self, keys: &[ObjectKey], kind: GestureKind) {
        let previous: Vec<(ObjectKey, Geometry)> = keys
            .iter()
            .filter_map(|key| self.get(*key).map(|o| (*key, absolute(o).geometry)))
            .collect();
        let keys = previous.iter().map(|(key, _)| *key).collect();
        self.gesture = Some(ActiveGesture { kind, keys, previous });
    }

    /// One gesture frame: `step` edits each object's own geometry.
    pub fn update_gesture(&mut self, mut step: impl FnMut(&mut Geometry)) {
        let Some(gesture) = self.gesture.take() else {
            log::warn!("gesture frame without an active gesture");
            return;
        };
        for key in &gesture.keys {
            if let Some(object) = self.get_mut(*key) {
                step(&mut object.geometry);
                object.refresh_coords();
            }
        }
        self.events.push_back(SceneEvent::Transforming {
            keys: gesture.keys.clone(),
            gesture: gesture.kind,
        });
        self.gesture = Some(gesture);
    }

    /// One gesture frame on a multi-selection: the selection transform
    /// changes, member geometry stays relative to it.
    pub fn transform_group(&mut self, group: Affine) {
        let Some(gesture) = self.gesture.take() else {
            log::warn!("group transform without an active gesture");
            return;
        };
        self.set_group(&gesture.keys, Some(group));
        self.events.push_back(SceneEvent::Transforming {
            keys: gesture.keys.clone(),
            gesture: gesture.kind,
        });
        self.gesture = Some(gesture);
    }

    /// Ends the gesture and queues `Modified` with the pre-gesture geometry.
    pub fn end_gesture(&mut self) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        self.events.push_back(SceneEvent::Modified(Modification::Gesture {
            keys: gesture.keys,
            previous: gesture.previous,
        }));
    }

    /// Complete drag of one object to `(left, top)`.
    pub fn move_to(&mut self, key: ObjectKey, left: f64, top: f64) {
        self.begin_gesture(&[key], GestureKind::Move);
        self.update_gesture(|g| {
            g.left = left;
            g.top = top;
        });
        self.end_gesture();
    }

    /// Removes objects by id, queueing one `Removed` for the found ones.
    pub fn remove_ids(&mut self, ids: &[&str]) -> Vec<SceneObject> {
        let keys: Vec<ObjectKey> = ids.iter().filter_map(|id| self.find(id)).collect();
        self.remove(&keys)
    }

    fn store(&mut self, mut object: SceneObject) -> ObjectKey {
        let key = ObjectKey(self.next_key);
        self.next_key += 1;
        object.refresh_coords();
        self.objects.push((key, object));
        key
    }

    fn position(&self, key: ObjectKey) -> Option<usize> {
        self.objects.iter().position(|(k, _)| *k == key)
    }
}

impl SceneStore for Scene {
    fn insert(&mut self, object: SceneObject) -> ObjectKey {
        let key = self.store(object);
        self.events.push_back(SceneEvent::Added { keys: vec![key] });
        key
    }

    fn remove(&mut self, keys: &[ObjectKey]) -> Vec<SceneObject> {
        let mut removed = Vec::new();
        for key in keys {
            if let Some(index) = self.position(*key) {
                removed.push(self.objects.remove(index).1);
            }
        }
        if let Some(gesture) = self.gesture.as_mut() {
            gesture.keys.retain(|k| !keys.contains(k));
        }
        if !removed.is_empty() {
            self.events.push_back(SceneEvent::Removed {
                objects: removed.clone(),
            });
        }
        removed
    }

    fn find(&self, id: &str) -> Option<ObjectKey> {
        self.objects
            .iter()
            .find(|(_, o)| o.id() == Some(id))
            .map(|(k, _)| *k)
    }

    fn get(&self, key: ObjectKey) -> Option<&SceneObject> {
        self.position(key).map(|i| &self.objects[i].1)
    }

    fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneObject> {
        let index = self.position(key)?;
        Some(&mut self.objects[index].1)
    }

    fn keys(&self) -> Vec<ObjectKey> {
        self.objects.iter().map(|(k, _)| *k).collect()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.objects().map(absolute).collect())
    }

    fn load(&mut self, snapshot: Snapshot) -> Vec<ObjectKey> {
        self.objects.clear();
        self.gesture = None;
        let keys: Vec<ObjectKey> = snapshot
            .objects
            .into_iter()
            .map(|object| {
                let key = self.store(object);
                self.events.push_back(SceneEvent::Added { keys: vec![key] });
                key
            })
            .collect();
        log::debug!("loaded {} objects", keys.len());
        keys
    }

    fn refresh(&mut self) {
        for (_, object) in self.objects.iter_mut() {
            object.refresh_coords();
        }
        self.renders += 1;
    }

    fn notify(&mut self, event: SceneEvent) {
        self.events.push_back(event);
    }

    fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}
