//! Tandem demo: two peers on separate tokio tasks, connected back to back.
//!
//! Walks through the handshake, a create, a drag with mirrored undo, and a
//! remove that is undone again. Run with `RUST_LOG=info` (or `debug` to see
//! every envelope).

mod peer;

use log::info;
use serde_json::json;
use tandem_collab::{Session, SessionConfig};
use tandem_core::Scene;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};

use peer::{Command, Report};

/// Time given to both peers to exchange whatever a step produced.
const SETTLE: Duration = Duration::from_millis(25);

struct Remote {
    name: &'static str,
    commands: mpsc::UnboundedSender<Command>,
}

impl Remote {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::error!("[{}] peer task is gone", self.name);
        }
    }

    async fn report(&self) -> Option<Report> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Report(tx));
        rx.await.ok()
    }
}

async fn show(step: &str, peers: &[&Remote]) {
    sleep(SETTLE).await;
    info!("--- {step}");
    for peer in peers {
        match peer.report().await {
            Some(report) => info!("  {:<9} {report}", peer.name),
            None => info!("  {:<9} unavailable", peer.name),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let (to_responder_tx, to_responder_rx) = mpsc::unbounded_channel();
    let (to_initiator_tx, to_initiator_rx) = mpsc::unbounded_channel();
    let (initiator_cmd_tx, initiator_cmd_rx) = mpsc::unbounded_channel();
    let (responder_cmd_tx, responder_cmd_rx) = mpsc::unbounded_channel();

    let initiator_config = SessionConfig::initiator();
    let responder_config = SessionConfig::responder();
    info!(
        "initiator {} / responder {}",
        initiator_config.peer_id, responder_config.peer_id
    );

    let initiator_session = Session::new(Scene::new(), to_responder_tx, initiator_config);
    let responder_session = Session::new(Scene::new(), to_initiator_tx, responder_config)
        .on_message(|data| info!("[responder] application message: {data}"));

    let initiator_task = tokio::spawn(peer::run(
        "initiator",
        initiator_session,
        to_initiator_rx,
        initiator_cmd_rx,
    ));
    let responder_task = tokio::spawn(peer::run(
        "responder",
        responder_session,
        to_responder_rx,
        responder_cmd_rx,
    ));

    let initiator = Remote {
        name: "initiator",
        commands: initiator_cmd_tx,
    };
    let responder = Remote {
        name: "responder",
        commands: responder_cmd_tx,
    };
    let both = [&initiator, &responder];

    show("handshake", &both).await;

    initiator.send(Command::Create {
        id: "obj-1".into(),
        left: 100.0,
        top: 100.0,
    });
    show("create obj-1", &both).await;

    initiator.send(Command::Drag {
        id: "obj-1".into(),
        left: 150.0,
        top: 120.0,
    });
    show("drag obj-1", &both).await;

    initiator.send(Command::Undo);
    show("undo drag", &both).await;

    initiator.send(Command::Remove { id: "obj-1".into() });
    show("remove obj-1", &both).await;

    initiator.send(Command::Undo);
    show("undo remove", &both).await;

    // Redo from the other side; the initiator replays it too.
    responder.send(Command::Redo);
    show("redo remove", &both).await;

    initiator.send(Command::Undo);
    show("undo remove again", &both).await;

    initiator.send(Command::Say(json!({"chat": "all done"})));
    sleep(SETTLE).await;

    // Closing the command channels stops both tasks.
    drop(initiator);
    drop(responder);
    for (name, task) in [("initiator", initiator_task), ("responder", responder_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("[{name}] stopped with error: {e}"),
            Err(e) => log::error!("[{name}] task panicked: {e}"),
        }
    }
}
