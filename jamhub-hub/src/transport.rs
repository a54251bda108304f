use std::{
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::{info, warn};
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use thiserror::Error;
use tokio::{
    process::{Child, Command},
    sync::{mpsc, oneshot},
    time::timeout,
};

/// A child that exits within this window after spawn is a failed spawn
const STARTUP_WINDOW: Duration = Duration::from_millis(500);
/// How long a stopped transport gets to exit on SIGTERM before SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(5);

/// What a room needs from its transport process
#[derive(Debug, Clone)]
pub struct TransportSpec {
    /// Used as the JACK client name, so the room's ports are unambiguous
    pub room_id: String,
    /// The UDP port the transport binds for remote participants
    pub port: u16,
    /// Audio channel count
    pub channels: u16,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport process could not be started: {0}")]
    SpawnFailed(String),
    #[error("Transport process exited immediately with {0}")]
    DiedOnStartup(String),
}

/// Turns a [TransportSpec] into a running child process.
///
/// The jacktrip launcher is the real one; tests substitute a stub command so
/// room and supervisor behavior can be exercised without jacktrip installed.
#[async_trait]
pub trait TransportLauncher: Send + Sync + 'static {
    async fn launch(&self, spec: &TransportSpec) -> std::io::Result<Child>;
}

/// Launches `jacktrip` in hub server mode.
pub struct JacktripLauncher {
    bin: String,
}

impl JacktripLauncher {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// The argument vector for a room's transport server.
    ///
    /// `--nojackportsconnect` is non-negotiable: new clients must appear in
    /// the graph with no edges, so routing stays an explicit patchbay action
    /// and feedback loops cannot form on join.
    fn args(spec: &TransportSpec) -> Vec<String> {
        vec![
            "-S".to_string(),
            "-B".to_string(),
            spec.port.to_string(),
            "-n".to_string(),
            spec.channels.to_string(),
            "-J".to_string(),
            spec.room_id.clone(),
            "-q".to_string(),
            "4".to_string(),
            "--nojackportsconnect".to_string(),
        ]
    }
}

#[async_trait]
impl TransportLauncher for JacktripLauncher {
    async fn launch(&self, spec: &TransportSpec) -> std::io::Result<Child> {
        Command::new(&self.bin)
            .args(Self::args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Launches a fixed command regardless of the spec. Useful for deployments
/// with a wrapper script, and for tests (`sleep` stands in for jacktrip).
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TransportLauncher for CommandLauncher {
    async fn launch(&self, _spec: &TransportSpec) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// A live transport process owned by a room.
///
/// The process itself lives inside a watcher task; the handle only carries
/// the channel to reach it.
#[derive(Debug)]
pub struct TransportHandle {
    pub room_id: String,
    pub port: u16,
    alive: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<StopRequest>,
}

struct StopRequest {
    done: oneshot::Sender<()>,
}

/// Spawns, tracks and reaps the external transport processes.
///
/// Every spawned child is paired with a watcher task that is guaranteed to
/// `wait()` on it, so no transport ever becomes a zombie. Unexpected deaths
/// are reported on the channel returned from [TransportSupervisor::new]; the
/// room registry consumes it and tears the affected room down.
pub struct TransportSupervisor {
    launcher: Arc<dyn TransportLauncher>,
    death_tx: mpsc::UnboundedSender<String>,
}

impl TransportSupervisor {
    pub fn new(launcher: Arc<dyn TransportLauncher>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (death_tx, death_rx) = mpsc::unbounded_channel();

        (
            Self {
                launcher,
                death_tx,
            },
            death_rx,
        )
    }

    /// Starts a transport for a room and begins watching it.
    pub async fn spawn(&self, spec: TransportSpec) -> Result<TransportHandle, TransportError> {
        let mut child = self
            .launcher
            .launch(&spec)
            .await
            .map_err(|e| TransportError::SpawnFailed(e.to_string()))?;

        // A transport that dies right away (bad binary, port clash) is a
        // spawn failure, not a room teardown
        if let Ok(status) = timeout(STARTUP_WINDOW, child.wait()).await {
            let status = status.map_err(|e| TransportError::SpawnFailed(e.to_string()))?;
            return Err(TransportError::DiedOnStartup(status.to_string()));
        }

        info!(
            "Transport for room {} listening on UDP port {}",
            spec.room_id, spec.port
        );

        let alive = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = mpsc::channel(1);

        tokio::spawn(watch(
            child,
            spec.room_id.clone(),
            alive.clone(),
            stop_rx,
            self.death_tx.clone(),
        ));

        Ok(TransportHandle {
            room_id: spec.room_id,
            port: spec.port,
            alive,
            stop_tx,
        })
    }

    /// Stops a transport and waits for its exit status to be collected.
    /// Stopping an already-dead transport is a no-op.
    pub async fn stop(&self, handle: &TransportHandle) {
        let (done, done_rx) = oneshot::channel();

        if handle.stop_tx.send(StopRequest { done }).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn alive(&self, handle: &TransportHandle) -> bool {
        handle.alive.load(Ordering::SeqCst)
    }
}

impl TransportHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Owns a transport child for its whole life: services stop requests, and
/// reports deaths the hub didn't ask for.
async fn watch(
    mut child: Child,
    room_id: String,
    alive: Arc<AtomicBool>,
    mut stop_rx: mpsc::Receiver<StopRequest>,
    death_tx: mpsc::UnboundedSender<String>,
) {
    tokio::select! {
        status = child.wait() => {
            alive.store(false, Ordering::SeqCst);

            match status {
                Ok(status) => warn!("Transport for room {room_id} died unexpectedly: {status}"),
                Err(e) => warn!("Transport for room {room_id} could not be awaited: {e}"),
            }

            let _ = death_tx.send(room_id);
        }
        request = stop_rx.recv() => {
            shut_down(&mut child, &room_id).await;
            alive.store(false, Ordering::SeqCst);

            if let Some(request) = request {
                let _ = request.done.send(());
            }
        }
    }
}

/// SIGTERM, a grace window, then SIGKILL. Always collects the exit status.
async fn shut_down(child: &mut Child, room_id: &str) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    match timeout(STOP_GRACE, child.wait()).await {
        Ok(_) => info!("Transport for room {room_id} stopped"),
        Err(_) => {
            warn!("Transport for room {room_id} ignored SIGTERM, killing it");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TransportSpec {
        TransportSpec {
            room_id: "jam-1".to_string(),
            port: 4464,
            channels: 2,
        }
    }

    fn sleep_supervisor() -> (TransportSupervisor, mpsc::UnboundedReceiver<String>) {
        TransportSupervisor::new(Arc::new(CommandLauncher::new("sleep", &["600"])))
    }

    #[test]
    fn jacktrip_args_cover_the_contract() {
        let args = JacktripLauncher::args(&spec());

        assert!(args.contains(&"-S".to_string()));
        assert!(args.contains(&"--nojackportsconnect".to_string()));

        let port_flag = args.iter().position(|a| a == "-B").unwrap();
        assert_eq!(args[port_flag + 1], "4464");

        let name_flag = args.iter().position(|a| a == "-J").unwrap();
        assert_eq!(args[name_flag + 1], "jam-1");

        let channels_flag = args.iter().position(|a| a == "-n").unwrap();
        assert_eq!(args[channels_flag + 1], "2");
    }

    #[tokio::test]
    async fn spawn_and_stop_reap_the_child() {
        let (supervisor, mut deaths) = sleep_supervisor();

        let handle = supervisor.spawn(spec()).await.unwrap();
        assert!(supervisor.alive(&handle));

        supervisor.stop(&handle).await;
        assert!(!supervisor.alive(&handle));

        // A requested stop is not an unexpected death
        assert!(deaths.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_twice_is_a_noop() {
        let (supervisor, _deaths) = sleep_supervisor();

        let handle = supervisor.spawn(spec()).await.unwrap();
        supervisor.stop(&handle).await;
        supervisor.stop(&handle).await;

        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn a_command_that_exits_immediately_is_a_spawn_failure() {
        let (supervisor, _deaths) =
            TransportSupervisor::new(Arc::new(CommandLauncher::new("true", &[])));

        let result = supervisor.spawn(spec()).await;
        assert!(matches!(result, Err(TransportError::DiedOnStartup(_))));
    }

    #[tokio::test]
    async fn a_missing_binary_is_a_spawn_failure() {
        let (supervisor, _deaths) = TransportSupervisor::new(Arc::new(CommandLauncher::new(
            "/nonexistent/transport-bin",
            &[],
        )));

        let result = supervisor.spawn(spec()).await;
        assert!(matches!(result, Err(TransportError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn unexpected_death_is_reported() {
        let (supervisor, mut deaths) =
            TransportSupervisor::new(Arc::new(CommandLauncher::new("sleep", &["1"])));

        let handle = supervisor.spawn(spec()).await.unwrap();

        let died = deaths.recv().await;
        assert_eq!(died.as_deref(), Some("jam-1"));
        assert!(!handle.is_alive());
    }
}
