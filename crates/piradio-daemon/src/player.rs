/// Playback supervisor: owns the single player subprocess.
///
/// Architecture:
///
/// ```text
///   Supervisor::play(url)
///         │  spawn player, publish (Playing, pid)
///         └── supervise task  ← awaits process exit and status transitions
///                                 ├── Stopping published → kill the process
///                                 └── process exited     → publish (Idle, None)
/// ```
///
/// The status cell is a `watch` channel.  The control loop writes
/// Idle→Playing and Playing→Stopping; the supervise task is the only writer of
/// →Idle, and only after the process is really gone.
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use piradio_proto::protocol::{PlaybackState, PlaybackStatus};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often a blocked `stop_and_wait` reports that it is still waiting.
pub const STOP_NOTICE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("a player is already running")]
    AlreadyPlaying,
    #[error("no player command configured")]
    NoPlayerCommand,
    #[error("failed to start player {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct Supervisor {
    argv: Vec<String>,
    status: Arc<watch::Sender<PlaybackStatus>>,
    task: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// `argv` is the player command template; the locator to play is
    /// appended as the last argument.
    pub fn new(argv: Vec<String>) -> Self {
        let (status, _) = watch::channel(PlaybackStatus::default());
        Self {
            argv,
            status: Arc::new(status),
            task: None,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    /// Start the player on `url`.  Only one player may exist at a time.
    pub fn play(&mut self, url: &str) -> Result<u32, PlayError> {
        if !self.status().is_idle() {
            return Err(PlayError::AlreadyPlaying);
        }
        // An Idle status means the previous supervise task is done or about to
        // return; its handle is no longer needed.
        self.task = None;

        let child = self.spawn(url)?;
        let pid = child.id().unwrap_or_default();

        // Subscribe before the task starts so a stop requested right away is
        // not missed.
        let stop_rx = self.status.subscribe();
        self.status.send_replace(PlaybackStatus {
            state: PlaybackState::Playing,
            pid: Some(pid),
        });
        info!("player: pid {} playing {}", pid, url);

        self.task = Some(tokio::spawn(supervise(
            child,
            Arc::clone(&self.status),
            stop_rx,
        )));
        Ok(pid)
    }

    /// Playing → Stopping.  Returns false if there was nothing to stop.
    pub fn request_stop(&self) -> bool {
        self.status.send_if_modified(|s| {
            if s.state == PlaybackState::Playing {
                s.state = PlaybackState::Stopping;
                true
            } else {
                false
            }
        })
    }

    /// Request a stop and block until the player has actually exited.
    pub async fn stop_and_wait(&mut self) {
        self.request_stop();
        let mut rx = self.subscribe();
        loop {
            let idle = tokio::time::timeout(STOP_NOTICE_INTERVAL, rx.wait_for(|s| s.is_idle()))
                .await
                .is_ok();
            if idle {
                break;
            }
            info!("player: waiting for playback to stop");
        }
    }

    /// Play a local clip to completion, outside the single stream slot.
    /// The clip is killed if `cancel` fires first.
    pub async fn play_clip(&self, path: &Path, cancel: &CancellationToken) -> Result<(), PlayError> {
        let mut child = self.spawn(&path.to_string_lossy())?;
        debug!("player: clip {:?} pid {:?}", path, child.id());
        tokio::select! {
            res = child.wait() => {
                if let Err(e) = res {
                    warn!("player: clip wait failed: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
            }
        }
        Ok(())
    }

    /// Wait for the last supervise task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("player: supervise task failed: {}", e);
            }
        }
    }

    fn spawn(&self, target: &str) -> Result<Child, PlayError> {
        let (program, args) = self.argv.split_first().ok_or(PlayError::NoPlayerCommand)?;
        Command::new(program)
            .args(args)
            .arg(target)
            // The keyboard task owns the terminal.
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlayError::Spawn {
                program: program.clone(),
                source,
            })
    }
}

async fn supervise(
    mut child: Child,
    status: Arc<watch::Sender<PlaybackStatus>>,
    mut stop_rx: watch::Receiver<PlaybackStatus>,
) {
    let pid = child.id();
    let mut killed = false;

    let exit = loop {
        tokio::select! {
            res = child.wait() => break res,
            changed = stop_rx.changed(), if !killed => {
                let stopping = changed.is_err()
                    || stop_rx.borrow_and_update().state == PlaybackState::Stopping;
                if stopping {
                    debug!("player: stop requested, killing pid {:?}", pid);
                    if let Err(e) = child.start_kill() {
                        warn!("player: kill pid {:?} failed: {}", pid, e);
                    }
                    killed = true;
                }
            }
        }
    };

    match exit {
        Ok(code) => info!("player: pid {:?} exited ({})", pid, code),
        Err(e) => warn!("player: waiting on pid {:?} failed: {}", pid, e),
    }
    status.send_replace(PlaybackStatus::default());
}
