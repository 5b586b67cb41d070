//! End-to-end tests: two sessions wired back to back over tokio channels.

use serde_json::json;
use tandem_collab::{
    BranchPolicy, ChangeKind, HistoryConfig, Role, Session, SessionConfig,
};
use tandem_core::{Affine, Geometry, Scene, SceneObject, SceneStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{timeout, Duration};

type Peer = Session<Scene, UnboundedSender<String>>;

struct Pair {
    initiator: Peer,
    responder: Peer,
    to_initiator: UnboundedReceiver<String>,
    to_responder: UnboundedReceiver<String>,
}

impl Pair {
    fn new() -> Self {
        Self::with_scene(Scene::new(), HistoryConfig::default())
    }

    fn with_history(history: HistoryConfig) -> Self {
        Self::with_scene(Scene::new(), history)
    }

    fn with_scene(scene: Scene, history: HistoryConfig) -> Self {
        let (to_responder_tx, to_responder) = unbounded_channel();
        let (to_initiator_tx, to_initiator) = unbounded_channel();
        let initiator = Session::new(
            scene,
            to_responder_tx,
            SessionConfig::initiator().with_history(history.clone()),
        );
        let responder = Session::new(
            Scene::new(),
            to_initiator_tx,
            SessionConfig::responder().with_history(history),
        );
        Self {
            initiator,
            responder,
            to_initiator,
            to_responder,
        }
    }

    /// Runs both handshake halves and delivers everything.
    fn connect(mut self) -> Self {
        self.responder.init().unwrap();
        self.initiator.init().unwrap();
        self.settle();
        self
    }

    /// Delivers queued messages in both directions until both are quiet.
    /// Returns how many were delivered.
    fn settle(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let mut progressed = false;
            while let Ok(raw) = self.to_responder.try_recv() {
                self.responder.receive(&raw).unwrap();
                delivered += 1;
                progressed = true;
            }
            while let Ok(raw) = self.to_initiator.try_recv() {
                self.initiator.receive(&raw).unwrap();
                delivered += 1;
                progressed = true;
            }
            if !progressed {
                return delivered;
            }
        }
    }

    fn create(&mut self, id: &str, left: f64, top: f64) {
        let object = SceneObject::new("rect", Geometry::rect(left, top, 40.0, 20.0)).with_id(id);
        self.initiator.edit(|scene| scene.insert(object)).unwrap();
    }
}

fn position(peer: &Peer, id: &str) -> Option<(f64, f64)> {
    peer.scene()
        .lookup(id)
        .map(|o| (o.geometry.left, o.geometry.top))
}

fn ids(peer: &Peer) -> Vec<String> {
    peer.scene().objects().filter_map(|o| o.id.clone()).collect()
}

fn record_kinds(peer: &Peer) -> Vec<ChangeKind> {
    peer.history().records().iter().map(|r| r.kind).collect()
}

#[test]
fn test_handshake() {
    let mut pair = Pair::new();
    pair.responder.init().unwrap();
    pair.initiator.init().unwrap();

    let init = pair.to_initiator.try_recv().unwrap();
    assert_eq!(init, r#"{"fabricSync":{"init":true}}"#);
    pair.initiator.receive(&init).unwrap();

    let snapshot = pair.to_responder.try_recv().unwrap();
    assert_eq!(snapshot, r#"{"fabricSync":{"snapshot":[]}}"#);
    pair.responder.receive(&snapshot).unwrap();

    assert_eq!(pair.settle(), 0);
    assert!(pair.initiator.scene().is_empty());
    assert!(pair.responder.scene().is_empty());
    assert!(pair.initiator.history().is_empty());
    assert!(pair.responder.history().is_empty());
    assert_eq!(pair.responder.role(), Role::Responder);
}

#[test]
fn test_create_propagation_sends_nothing_back() {
    let mut pair = Pair::new().connect();
    let initiator_sent = pair.initiator.link().sent();
    let responder_sent = pair.responder.link().sent();

    pair.create("obj-1", 100.0, 100.0);
    assert_eq!(pair.initiator.link().sent(), initiator_sent + 1);
    pair.settle();

    assert_eq!(pair.responder.link().sent(), responder_sent);
    assert_eq!(ids(&pair.initiator), vec!["obj-1"]);
    assert_eq!(ids(&pair.responder), vec!["obj-1"]);
    assert_eq!(position(&pair.responder, "obj-1"), Some((100.0, 100.0)));
    assert!(pair.responder.sync().ledger().is_empty());

    assert_eq!(record_kinds(&pair.initiator), vec![ChangeKind::Create]);
    assert_eq!(record_kinds(&pair.responder), vec![ChangeKind::Create]);
}

#[test]
fn test_update_and_mirrored_undo() {
    let mut pair = Pair::new().connect();
    pair.create("obj-1", 100.0, 100.0);
    pair.settle();

    pair.initiator
        .edit(|scene| {
            let key = scene.find("obj-1").unwrap();
            scene.move_to(key, 150.0, 120.0);
        })
        .unwrap();
    pair.settle();

    assert_eq!(position(&pair.responder, "obj-1"), Some((150.0, 120.0)));
    let record = pair.initiator.history().records().back().unwrap().clone();
    assert_eq!(record.kind, ChangeKind::Update);
    assert_eq!(record.previous["obj-1"].left, 100.0);
    assert_eq!(record.previous["obj-1"].top, 100.0);
    assert_eq!(
        record_kinds(&pair.responder),
        vec![ChangeKind::Create, ChangeKind::Update]
    );

    let responder_sent = pair.responder.link().sent();
    assert!(pair.initiator.undo().unwrap());
    assert_eq!(position(&pair.initiator, "obj-1"), Some((100.0, 100.0)));
    pair.settle();

    assert_eq!(position(&pair.responder, "obj-1"), Some((100.0, 100.0)));
    assert_eq!(pair.responder.link().sent(), responder_sent);
    assert_eq!(pair.initiator.history().position(), 0);
    assert_eq!(pair.responder.history().position(), 0);

    assert!(pair.initiator.redo().unwrap());
    pair.settle();
    assert_eq!(position(&pair.initiator, "obj-1"), Some((150.0, 120.0)));
    assert_eq!(position(&pair.responder, "obj-1"), Some((150.0, 120.0)));
}

#[test]
fn test_insert_and_drag_in_one_edit_stay_mirrored() {
    let mut pair = Pair::new().connect();
    pair.initiator
        .edit(|scene| {
            let key = scene.insert(
                SceneObject::new("rect", Geometry::rect(0.0, 0.0, 40.0, 20.0)).with_id("a"),
            );
            scene.move_to(key, 50.0, 60.0);
        })
        .unwrap();
    pair.settle();

    let expected = vec![ChangeKind::Create, ChangeKind::Update];
    assert_eq!(record_kinds(&pair.initiator), expected);
    assert_eq!(record_kinds(&pair.responder), expected);
    assert_eq!(position(&pair.responder, "a"), Some((50.0, 60.0)));

    assert!(pair.initiator.undo().unwrap());
    pair.settle();
    assert_eq!(position(&pair.initiator, "a"), Some((0.0, 0.0)));
    assert_eq!(position(&pair.responder, "a"), Some((0.0, 0.0)));

    assert!(pair.initiator.undo().unwrap());
    pair.settle();
    assert!(pair.initiator.scene().is_empty());
    assert!(pair.responder.scene().is_empty());
}

#[test]
fn test_remove_and_recreate() {
    let mut pair = Pair::new().connect();
    pair.create("obj-1", 100.0, 100.0);
    pair.settle();

    let responder_sent = pair.responder.link().sent();
    pair.initiator
        .edit(|scene| scene.remove_ids(&["obj-1"]))
        .unwrap();
    pair.settle();

    assert!(pair.initiator.scene().is_empty());
    assert!(pair.responder.scene().is_empty());
    assert_eq!(pair.responder.link().sent(), responder_sent);
    assert_eq!(
        record_kinds(&pair.initiator),
        vec![ChangeKind::Create, ChangeKind::Remove]
    );
    assert_eq!(
        record_kinds(&pair.responder),
        vec![ChangeKind::Create, ChangeKind::Remove]
    );

    let initiator_sent = pair.initiator.link().sent();
    assert!(pair.initiator.undo().unwrap());
    // Only the undo signal goes out; the recreation itself is not an op.
    assert_eq!(pair.initiator.link().sent(), initiator_sent + 1);
    assert_eq!(position(&pair.initiator, "obj-1"), Some((100.0, 100.0)));
    assert_eq!(pair.initiator.history().len(), 2);
    pair.settle();

    assert_eq!(position(&pair.responder, "obj-1"), Some((100.0, 100.0)));
    assert_eq!(pair.responder.history().len(), 2);
    assert_eq!(pair.responder.link().sent(), responder_sent);

    for peer in [&pair.initiator, &pair.responder] {
        assert!(peer.sync().ledger().is_empty());
        assert!(peer.history().ledger().is_empty());
        assert!(peer.scene().objects().all(|o| !o.programmatic));
    }
}

#[test]
fn test_create_undo_redo_across_peers() {
    let mut pair = Pair::new().connect();
    pair.create("a", 5.0, 5.0);
    pair.settle();

    assert!(pair.initiator.undo().unwrap());
    pair.settle();
    assert!(pair.initiator.scene().is_empty());
    assert!(pair.responder.scene().is_empty());

    assert!(pair.initiator.redo().unwrap());
    pair.settle();
    assert_eq!(ids(&pair.initiator), vec!["a"]);
    assert_eq!(ids(&pair.responder), vec!["a"]);
    assert_eq!(pair.initiator.history().len(), 1);
    assert_eq!(pair.responder.history().len(), 1);
}

#[test]
fn test_responder_undo_mirrors_to_initiator() {
    let mut pair = Pair::new().connect();
    pair.create("a", 0.0, 0.0);
    pair.settle();

    assert!(pair.responder.undo().unwrap());
    pair.settle();
    assert!(pair.initiator.scene().is_empty());
    assert!(!pair.initiator.history().can_undo());
    assert!(pair.initiator.history().can_redo());
}

#[test]
fn test_undo_boundaries_send_nothing() {
    let mut pair = Pair::new().connect();
    let sent = pair.initiator.link().sent();
    assert!(!pair.initiator.undo().unwrap());
    assert!(!pair.initiator.redo().unwrap());
    assert_eq!(pair.initiator.link().sent(), sent);

    pair.create("a", 0.0, 0.0);
    pair.settle();
    assert!(!pair.initiator.redo().unwrap());
    assert!(pair.initiator.undo().unwrap());
    assert!(!pair.initiator.undo().unwrap());
    pair.settle();
    assert_eq!(pair.responder.history().position(), -1);
}

#[test]
fn test_snapshot_round_trip() {
    let mut scene = Scene::new();
    let plain = SceneObject::new("rect", Geometry::rect(10.0, 20.0, 30.0, 40.0))
        .with_id("plain")
        .with_extra(json!({"owner": "alice", "layer": 2}))
        .with_attr("fill", json!("#336699"));
    let grouped = SceneObject::new(
        "circle",
        Geometry {
            angle: 30.0,
            ..Geometry::rect(0.0, 0.0, 10.0, 10.0)
        },
    )
    .with_id("grouped");
    scene.insert(plain);
    let key = scene.insert(grouped);
    scene.set_group(&[key], Some(Affine::translate(50.0, 60.0)));
    scene.drain_events();

    let expected = scene.snapshot();
    let mut pair = Pair::with_scene(scene, HistoryConfig::default()).connect();

    assert_eq!(ids(&pair.responder), vec!["plain", "grouped"]);
    for object in &expected.objects {
        let id = object.id().unwrap();
        let copy = pair.responder.scene().lookup(id).unwrap();
        assert_eq!(copy.kind, object.kind);
        assert_eq!(copy.extra, object.extra);
        assert_eq!(copy.attrs, object.attrs);
        for (a, b) in [
            (copy.geometry.left, object.geometry.left),
            (copy.geometry.top, object.geometry.top),
            (copy.geometry.angle, object.geometry.angle),
            (copy.geometry.scale_x, object.geometry.scale_x),
        ] {
            assert!((a - b).abs() < 1e-9, "{id}: {a} != {b}");
        }
    }
    assert!(pair.responder.history().is_empty());
    assert!(pair.responder.history().ledger().is_empty());
    assert!(pair.responder.sync().ledger().is_empty());
    assert_eq!(pair.settle(), 0);
}

#[test]
fn test_resync_clears_history() {
    let mut pair = Pair::new().connect();
    pair.create("a", 0.0, 0.0);
    pair.settle();
    assert_eq!(pair.responder.history().len(), 1);

    pair.responder.init().unwrap();
    pair.settle();
    assert!(pair.responder.history().is_empty());
    assert_eq!(ids(&pair.responder), vec!["a"]);
}

#[test]
fn test_bad_message_is_isolated() {
    let mut pair = Pair::new().connect();
    assert!(pair.responder.receive("}{").is_err());
    assert!(pair
        .responder
        .receive(r#"{"fabricSync":{"op":{"kind":"remove","data":{"ids":"a"}}}}"#)
        .is_err());

    pair.create("a", 1.0, 2.0);
    pair.settle();
    assert_eq!(position(&pair.responder, "a"), Some((1.0, 2.0)));
}

#[test]
fn test_unknown_op_kind_is_ignored() {
    let mut pair = Pair::new().connect();
    pair.responder
        .receive(r#"{"fabricSync":{"op":{"kind":"recolor","data":[{"id":"a"}]}}}"#)
        .unwrap();
    assert!(pair.responder.scene().is_empty());
}

#[test]
fn test_overcounted_remove_swallows_later_create() {
    let mut pair = Pair::new().connect();
    pair.responder
        .receive(r#"{"fabricSync":{"op":{"kind":"remove","data":["ghost"]}}}"#)
        .unwrap();
    assert_eq!(pair.responder.sync().ledger().pending("ghost"), 1);

    let sent = pair.responder.link().sent();
    pair.responder
        .edit(|scene| {
            scene.insert(SceneObject::new("rect", Geometry::default()).with_id("ghost"))
        })
        .unwrap();
    assert_eq!(pair.responder.link().sent(), sent);
    pair.settle();
    assert!(pair.initiator.scene().find("ghost").is_none());
}

#[test]
fn test_branch_retain_keeps_abandoned_redo() {
    let mut pair = Pair::new().connect();
    pair.create("a", 0.0, 0.0);
    pair.create("b", 0.0, 0.0);
    pair.settle();
    pair.initiator.undo().unwrap();
    pair.settle();
    pair.create("c", 0.0, 0.0);
    pair.settle();

    for peer in [&pair.initiator, &pair.responder] {
        assert_eq!(peer.history().len(), 3);
        assert_eq!(peer.history().position(), 2);
        assert!(!peer.history().can_redo());
    }
}

#[test]
fn test_branch_truncate_discards_abandoned_redo() {
    let mut pair = Pair::with_history(HistoryConfig {
        branch_policy: BranchPolicy::Truncate,
        ..HistoryConfig::default()
    })
    .connect();
    pair.create("a", 0.0, 0.0);
    pair.create("b", 0.0, 0.0);
    pair.settle();
    pair.initiator.undo().unwrap();
    pair.settle();
    pair.create("c", 0.0, 0.0);
    pair.settle();

    for peer in [&pair.initiator, &pair.responder] {
        let recorded: Vec<&str> = peer
            .history()
            .records()
            .iter()
            .flat_map(|r| r.ids())
            .collect();
        assert_eq!(recorded, vec!["a", "c"]);
        assert_eq!(peer.history().position(), 1);
    }
}

#[test]
fn test_capacity_bound_is_mirrored() {
    let mut pair = Pair::with_history(HistoryConfig {
        capacity: 3,
        ..HistoryConfig::default()
    })
    .connect();
    for i in 0..5 {
        pair.create(&format!("obj-{i}"), i as f64, 0.0);
    }
    pair.settle();

    for peer in [&pair.initiator, &pair.responder] {
        assert_eq!(peer.history().len(), 3);
        assert_eq!(peer.history().position(), 2);
    }
    for _ in 0..3 {
        assert!(pair.initiator.undo().unwrap());
    }
    assert!(!pair.initiator.undo().unwrap());
    pair.settle();
    assert_eq!(ids(&pair.initiator), vec!["obj-0", "obj-1"]);
    assert_eq!(ids(&pair.responder), vec!["obj-0", "obj-1"]);
}

#[test]
fn test_generated_ids_reach_the_peer() {
    let mut pair = Pair::new().connect();
    pair.initiator
        .edit(|scene| scene.insert(SceneObject::new("rect", Geometry::default())))
        .unwrap();
    pair.settle();

    let local = ids(&pair.initiator);
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].len(), 40);
    assert!(local[0].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(ids(&pair.responder), local);
}

#[tokio::test]
async fn test_peers_on_separate_tasks() {
    let (to_responder_tx, mut to_responder) = unbounded_channel::<String>();
    let (to_initiator_tx, mut to_initiator) = unbounded_channel::<String>();

    let responder = tokio::spawn(async move {
        let mut session: Peer =
            Session::new(Scene::new(), to_initiator_tx, SessionConfig::responder());
        session.init().unwrap();
        while let Some(raw) = to_responder.recv().await {
            session.receive(&raw).unwrap();
            if session.scene().len() == 1 {
                break;
            }
        }
        session
    });

    let mut initiator: Peer =
        Session::new(Scene::new(), to_responder_tx, SessionConfig::initiator());
    initiator.init().unwrap();
    let init = timeout(Duration::from_secs(1), to_initiator.recv())
        .await
        .unwrap()
        .unwrap();
    initiator.receive(&init).unwrap();
    initiator
        .edit(|scene| {
            scene.insert(SceneObject::new("rect", Geometry::rect(7.0, 8.0, 1.0, 1.0)).with_id("x"))
        })
        .unwrap();

    let responder = timeout(Duration::from_secs(1), responder)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position(&responder, "x"), Some((7.0, 8.0)));
    assert_eq!(responder.history().len(), 1);
}
