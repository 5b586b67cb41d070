//! A peer task: one session, driven by wire messages and demo commands.

use serde_json::Value;
use tandem_collab::{Session, SyncError};
use tandem_core::{Geometry, Scene, SceneObject, SceneStore};
use tokio::sync::{mpsc, oneshot};

pub type Wire = mpsc::UnboundedSender<String>;

pub enum Command {
    Create { id: String, left: f64, top: f64 },
    Drag { id: String, left: f64, top: f64 },
    Remove { id: String },
    Undo,
    Redo,
    Say(Value),
    Report(oneshot::Sender<Report>),
}

#[derive(Debug)]
pub struct Report {
    pub objects: Vec<(String, f64, f64)>,
    pub records: usize,
    pub position: isize,
    pub sent: u64,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "objects=[")?;
        for (i, (id, left, top)) in self.objects.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}@({left}, {top})")?;
        }
        write!(
            f,
            "] history={} cursor={} sent={}",
            self.records, self.position, self.sent
        )
    }
}

pub async fn run(
    name: &'static str,
    mut session: Session<Scene, Wire>,
    mut inbound: mpsc::UnboundedReceiver<String>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<(), SyncError> {
    session.init()?;
    loop {
        tokio::select! {
            Some(raw) = inbound.recv() => {
                if let Err(e) = session.receive(&raw) {
                    log::warn!("[{name}] rejected message: {e}");
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    log::info!("[{name}] shutting down");
                    return Ok(());
                };
                execute(name, &mut session, command)?;
            }
        }
    }
}

fn execute(
    name: &str,
    session: &mut Session<Scene, Wire>,
    command: Command,
) -> Result<(), SyncError> {
    match command {
        Command::Create { id, left, top } => {
            log::info!("[{name}] create {id} at ({left}, {top})");
            let object = SceneObject::new("rect", Geometry::rect(left, top, 40.0, 20.0)).with_id(id);
            session.edit(|scene| scene.insert(object))?;
        }
        Command::Drag { id, left, top } => {
            log::info!("[{name}] drag {id} to ({left}, {top})");
            session.edit(|scene| match scene.find(&id) {
                Some(key) => scene.move_to(key, left, top),
                None => log::warn!("[{name}] nothing to drag, {id} is gone"),
            })?;
        }
        Command::Remove { id } => {
            log::info!("[{name}] remove {id}");
            session.edit(|scene| scene.remove_ids(&[id.as_str()]))?;
        }
        Command::Undo => {
            let done = session.undo()?;
            log::info!("[{name}] undo -> {done}");
        }
        Command::Redo => {
            let done = session.redo()?;
            log::info!("[{name}] redo -> {done}");
        }
        Command::Say(data) => session.send(data)?,
        Command::Report(reply) => {
            let report = Report {
                objects: session
                    .scene()
                    .objects()
                    .map(|o| {
                        let id = o.id().unwrap_or("?").to_string();
                        (id, o.geometry.left, o.geometry.top)
                    })
                    .collect(),
                records: session.history().len(),
                position: session.history().position(),
                sent: session.link().sent(),
            };
            let _ = reply.send(report);
        }
    }
    Ok(())
}
