/// RadioCore: single-owner control loop for all mutable appliance state.
///
/// Keyboard and HTTP post single-character tokens into the mailbox; this loop
/// is the only consumer.  RadioCore owns `Channels`, the now-playing name and
/// the quit flag exclusively.  The playback supervisor's background task only
/// ever writes the playback status cell, which this loop watches.
///
/// After every command (and every playback transition) a fresh `RadioStatus`
/// snapshot is published to the `StatusBoard`, *then* the sender is
/// acknowledged, so an HTTP handler that waited for its ack renders the
/// post-command state.
use std::path::PathBuf;
use std::sync::Arc;

use piradio_proto::channels::{Channels, ListFile, Toggle};
use piradio_proto::protocol::{Command, RadioStatus, HELP_TEXT};
use piradio_proto::state::StatusBoard;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::TvhClient;
use crate::console::say;
use crate::mailbox::Envelope;
use crate::player::Supervisor;
use crate::speech::{time_announcement, SpeechSynth};

// ── RadioCore ─────────────────────────────────────────────────────────────────

pub struct RadioCore {
    channels: Channels,
    player: Supervisor,
    favourites_file: ListFile,
    /// Shown by `e`; the streams list is only ever edited by hand.
    streams_path: Option<PathBuf>,
    speech: Option<Box<dyn SpeechSynth>>,
    catalog: Option<TvhClient>,
    board: Arc<StatusBoard>,
    cancel: CancellationToken,
    now_playing: Option<String>,
    quit: bool,
}

impl RadioCore {
    pub fn new(
        channels: Channels,
        player: Supervisor,
        favourites_file: ListFile,
        board: Arc<StatusBoard>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channels,
            player,
            favourites_file,
            streams_path: None,
            speech: None,
            catalog: None,
            board,
            cancel,
            now_playing: None,
            quit: false,
        }
    }

    pub fn with_streams_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.streams_path = Some(path.into());
        self
    }

    pub fn with_speech(mut self, speech: Box<dyn SpeechSynth>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_catalog(mut self, catalog: TvhClient) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Run until `q`, cancellation, or every mailbox sender is gone.  Playback
    /// is stopped and reaped before this returns, and the shutdown token is
    /// cancelled so the other tasks follow.
    pub async fn run(mut self, mut mailbox_rx: mpsc::Receiver<Envelope>) -> anyhow::Result<()> {
        info!("RadioCore: starting control loop in {} mode", self.channels.mode());
        let cancel = self.cancel.clone();
        let mut playback_rx = self.player.subscribe();

        self.announce_future();
        self.publish().await;

        while !self.quit {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("RadioCore: shutdown requested");
                    self.quit = true;
                }

                envelope = mailbox_rx.recv() => match envelope {
                    Some(envelope) => self.dispatch(envelope).await,
                    None => {
                        info!("RadioCore: mailbox closed, shutting down");
                        self.quit = true;
                    }
                },

                changed = playback_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *playback_rx.borrow_and_update();
                    if status.is_idle() {
                        if let Some(name) = self.now_playing.take() {
                            info!("RadioCore: {} is no longer playing", name);
                        }
                    }
                    self.publish().await;
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        let Envelope { token, origin, ack } = envelope;
        match Command::from_token(token) {
            Some(cmd) => {
                debug!("RadioCore: {:?} from {}", cmd, origin);
                self.handle_command(cmd).await;
            }
            None => {
                info!("RadioCore: unknown key {:?} from {}", token, origin);
                say("Unknown key");
            }
        }

        if !self.quit {
            self.announce_future();
        }
        self.publish().await;
        if let Some(ack) = ack {
            // The waiter may have timed out already.
            let _ = ack.send(());
        }
    }

    // ── command handlers ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Down => self.channels.select_down(),
            Command::Up => self.channels.select_up(),
            Command::PlayToggle => self.play_toggle().await,
            Command::CycleMode => self.cycle_mode().await,
            Command::ToggleFavourite => self.toggle_favourite(),
            Command::ListFavourites => self.list_favourites(),
            Command::SpeakPlaying => match self.now_playing.clone() {
                Some(name) => self.speak(&name, &name, false).await,
                None => warn!("Nothing is playing"),
            },
            Command::SpeakFuture => match self.channels.selected() {
                Some(channel) => self.speak(&channel.name, &channel.name, false).await,
                None => warn!("No channel selected in {}", self.channels.mode()),
            },
            Command::SpeakTime => {
                let text = time_announcement(&chrono::Local::now());
                self.speak(&text, "time_file", true).await;
            }
            Command::Quit => self.quit().await,
            Command::Help => say(HELP_TEXT),
            Command::EditStreams => self.show_streams_path(),
            Command::ApiProbe => self.api_probe().await,
        }
    }

    async fn play_toggle(&mut self) {
        if !self.player.status().is_idle() {
            say("Stopping playback");
            self.stop_playback().await;
            return;
        }

        let Some(channel) = self.channels.selected() else {
            warn!("No channel to play in {}", self.channels.mode());
            return;
        };
        say(&format!(
            "Attempting to play channel {}/{}",
            self.channels.selection(),
            channel.name
        ));
        match self.player.play(&channel.url) {
            Ok(_) => self.now_playing = Some(channel.name),
            Err(e) => error!("Failed to play {}: {}", channel.name, e),
        }
    }

    async fn cycle_mode(&mut self) {
        if !self.player.status().is_idle() {
            say("Waiting to stop playback before changing mode");
            self.stop_playback().await;
        }
        let mode = self.channels.cycle_mode();
        info!("RadioCore: mode is now {}", mode);
        say(&format!("Mode is now {}", mode));
    }

    fn toggle_favourite(&mut self) {
        let Some((outcome, channel)) = self.channels.toggle_favourite() else {
            warn!("No channel selected in {}", self.channels.mode());
            return;
        };
        match outcome {
            Toggle::Added => say(&format!("Adding channel {} to favourites", channel.name)),
            Toggle::Removed => say(&format!("Removing channel {} from favourites", channel.name)),
        }
        if let Err(e) = self.favourites_file.save(self.channels.favourites()) {
            error!("Failed to save favourites: {}", e);
        }
    }

    fn list_favourites(&self) {
        let favourites = self.channels.favourites();
        if favourites.is_empty() {
            warn!("No favourites set");
            return;
        }
        let mut text = String::from("Favourites:");
        for (name, url) in favourites.iter() {
            text.push_str(&format!("\n\t{} : {}", name, url));
        }
        say(&text);
    }

    async fn quit(&mut self) {
        say("Quit!");
        self.quit = true;
        if !self.player.status().is_idle() {
            say("Waiting to stop playback");
            self.stop_playback().await;
        }
    }

    fn show_streams_path(&self) {
        match &self.streams_path {
            Some(path) => say(&format!(
                "=== Streams List Editor ===\nPlease edit the file {} with your favourite editor",
                path.display()
            )),
            None => warn!("No streams list configured"),
        }
    }

    async fn api_probe(&self) {
        let Some(catalog) = &self.catalog else {
            warn!("No TV Headend server configured");
            return;
        };
        match catalog.api_probe().await {
            Ok(dump) => say(&dump),
            Err(e) => warn!("API probe failed: {:#}", e),
        }
    }

    async fn speak(&self, text: &str, key: &str, refresh: bool) {
        let Some(speech) = &self.speech else {
            warn!("Speech is not available");
            return;
        };
        let clip = match speech.render(text, key, refresh).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Speech failed for {:?}: {:#}", text, e);
                return;
            }
        };
        if let Err(e) = self.player.play_clip(&clip, &self.cancel).await {
            error!("Failed to play speech clip: {}", e);
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn stop_playback(&mut self) {
        self.player.stop_and_wait().await;
        self.now_playing = None;
    }

    fn announce_future(&self) {
        if let Some(channel) = self.channels.selected() {
            say(&format!("Playing next: {}", channel.name));
        }
    }

    fn snapshot(&self) -> RadioStatus {
        let selected = self.channels.selected();
        RadioStatus {
            rev: 0,
            mode: self.channels.mode(),
            now_playing: self.now_playing.clone(),
            future_index: selected.as_ref().map(|_| self.channels.selection()),
            future: selected.map(|c| c.name),
            channel_count: self.channels.active().len(),
            playback: self.player.status(),
            quitting: self.quit,
        }
    }

    async fn publish(&self) {
        let rev = self.board.publish(self.snapshot()).await;
        debug!("RadioCore: published status rev {}", rev);
    }

    async fn cleanup(&mut self) {
        info!("RadioCore: cleanup, stopping playback");
        if !self.player.status().is_idle() {
            self.stop_playback().await;
        }
        self.player.join().await;
        self.now_playing = None;
        self.publish().await;
        self.cancel.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use piradio_proto::channels::ChannelMap;
    use piradio_proto::protocol::{PlaybackState, RadioMode};
    use tempfile::TempDir;
    use tokio::task::JoinHandle;

    use crate::mailbox::{self, Delivery, Mailbox, Origin};

    fn catalog() -> ChannelMap {
        [
            ("Alpha", "/dev/null"),
            ("Bravo", "/dev/null"),
            ("Charlie", "/dev/null"),
        ]
        .into_iter()
        .collect()
    }

    struct FakeSpeech {
        dir: PathBuf,
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechSynth for FakeSpeech {
        fn render<'a>(&'a self, text: &'a str, key: &'a str, _refresh: bool) -> BoxFuture<'a, anyhow::Result<PathBuf>> {
            Box::pin(async move {
                self.spoken.lock().unwrap().push(text.to_string());
                Ok(self.dir.join(format!("{}.mp3", key)))
            })
        }
    }

    struct Harness {
        mailbox: Mailbox,
        board: Arc<StatusBoard>,
        cancel: CancellationToken,
        task: JoinHandle<anyhow::Result<()>>,
        favourites: PathBuf,
        spoken: Arc<Mutex<Vec<String>>>,
        _dir: TempDir,
    }

    impl Harness {
        fn start(player: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let favourites = dir.path().join("favourites_list.dat");
            let fav_file = ListFile::favourites(&favourites);
            let channels = Channels::new(catalog(), ChannelMap::new(), fav_file.load());
            let argv = player.split_whitespace().map(str::to_string).collect();
            let board = Arc::new(StatusBoard::new());
            let cancel = CancellationToken::new();
            let spoken = Arc::new(Mutex::new(Vec::new()));
            let speech = FakeSpeech {
                dir: dir.path().to_path_buf(),
                spoken: spoken.clone(),
            };

            let core = RadioCore::new(
                channels,
                Supervisor::new(argv),
                fav_file,
                board.clone(),
                cancel.clone(),
            )
            .with_speech(Box::new(speech));
            let (mailbox, rx) = mailbox::channel();
            let task = tokio::spawn(core.run(rx));
            Self {
                mailbox,
                board,
                cancel,
                task,
                favourites,
                spoken,
                _dir: dir,
            }
        }

        async fn send(&self, token: char) {
            let delivery = self
                .mailbox
                .post_and_wait(token, Origin::Keyboard, Duration::from_secs(5))
                .await;
            assert_eq!(delivery, Delivery::Applied, "token {:?}", token);
        }

        async fn status(&self) -> RadioStatus {
            self.board.get_state().await
        }

        async fn wait_until(&self, pred: impl Fn(&RadioStatus) -> bool) -> RadioStatus {
            for _ in 0..250 {
                let status = self.status().await;
                if pred(&status) {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("status never matched: {:?}", self.status().await);
        }

        async fn finish(self) {
            self.cancel.cancel();
            tokio::time::timeout(Duration::from_secs(5), self.task)
                .await
                .expect("loop exits")
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_up_up_down_moves_one() {
        let h = Harness::start("tail -f");
        for token in ['u', 'u', 'd'] {
            h.send(token).await;
        }
        let status = h.status().await;
        assert_eq!(status.mode, RadioMode::Catalog);
        assert_eq!(status.future_index, Some(1));
        assert_eq!(status.future.as_deref(), Some("Bravo"));
        h.finish().await;
    }

    #[tokio::test]
    async fn test_selection_stops_at_both_ends() {
        let h = Harness::start("tail -f");
        h.send('d').await;
        assert_eq!(h.status().await.future_index, Some(0));
        for _ in 0..5 {
            h.send('u').await;
        }
        let status = h.status().await;
        assert_eq!(status.future_index, Some(2));
        assert_eq!(status.future.as_deref(), Some("Charlie"));
        h.finish().await;
    }

    #[tokio::test]
    async fn test_unknown_token_changes_nothing() {
        let h = Harness::start("tail -f");
        h.send('u').await;
        let before = h.status().await;
        h.send('x').await;
        let after = h.status().await;
        assert!(after.rev > before.rev);
        assert_eq!(after.future_index, before.future_index);
        assert_eq!(after.mode, before.mode);
        assert!(after.playback.is_idle());
        h.finish().await;
    }

    #[tokio::test]
    async fn test_play_toggles() {
        let h = Harness::start("tail -f");
        h.send('p').await;
        let status = h.status().await;
        assert_eq!(status.playback.state, PlaybackState::Playing);
        assert!(status.playback.pid.is_some());
        assert_eq!(status.now_playing.as_deref(), Some("Alpha"));

        h.send('p').await;
        let status = h.status().await;
        assert!(status.playback.is_idle());
        assert_eq!(status.playback.pid, None);
        assert_eq!(status.now_playing, None);
        h.finish().await;
    }

    #[tokio::test]
    async fn test_mode_change_stops_playback_first() {
        let h = Harness::start("tail -f");
        h.send('u').await;
        h.send('p').await;
        assert_eq!(h.status().await.now_playing.as_deref(), Some("Bravo"));

        h.send('m').await;
        let status = h.status().await;
        assert!(status.playback.is_idle());
        assert_eq!(status.now_playing, None);
        assert_eq!(status.mode, RadioMode::StaticList);
        assert_eq!(status.channel_count, 0);
        assert_eq!(status.future, None);
        h.finish().await;
    }

    #[tokio::test]
    async fn test_favourite_is_persisted_and_selection_reclamped() {
        let h = Harness::start("tail -f");
        h.send('u').await;
        h.send('u').await;
        h.send('f').await;
        let saved = std::fs::read_to_string(&h.favourites).unwrap();
        assert!(saved.contains("Charlie\n/dev/null\n"));

        h.send('m').await;
        h.send('m').await;
        let status = h.status().await;
        assert_eq!(status.mode, RadioMode::Favourites);
        assert_eq!(status.channel_count, 1);
        assert_eq!(status.future.as_deref(), Some("Charlie"));

        h.send('f').await;
        let status = h.status().await;
        assert_eq!(status.channel_count, 0);
        assert_eq!(status.future, None);
        assert_eq!(status.future_index, None);
        let saved = std::fs::read_to_string(&h.favourites).unwrap();
        assert!(!saved.contains("Charlie"));
        h.finish().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_keeps_loop_running() {
        let h = Harness::start("/nonexistent/player");
        h.send('p').await;
        let status = h.status().await;
        assert!(status.playback.is_idle());
        assert_eq!(status.now_playing, None);

        h.send('u').await;
        assert_eq!(h.status().await.future_index, Some(1));
        h.finish().await;
    }

    #[tokio::test]
    async fn test_speak_playing_when_idle_is_noop() {
        let h = Harness::start("true");
        h.send('s').await;
        assert!(h.spoken.lock().unwrap().is_empty());
        h.finish().await;
    }

    #[tokio::test]
    async fn test_speak_future_and_time() {
        let h = Harness::start("true");
        h.send('u').await;
        h.send('S').await;
        h.send('t').await;
        let spoken = h.spoken.lock().unwrap().clone();
        assert_eq!(spoken.len(), 2);
        assert_eq!(spoken[0], "Bravo");
        assert!(spoken[1].starts_with("the time is "));
        h.finish().await;
    }

    #[tokio::test]
    async fn test_player_exit_clears_now_playing() {
        let h = Harness::start("true");
        h.send('p').await;
        let status = h
            .wait_until(|s| s.playback.is_idle() && s.now_playing.is_none())
            .await;
        assert_eq!(status.playback.pid, None);
        h.finish().await;
    }

    #[tokio::test]
    async fn test_quit_while_playing() {
        let h = Harness::start("tail -f");
        h.send('p').await;
        h.send('q').await;
        let status = h.status().await;
        assert!(status.quitting);
        assert!(status.playback.is_idle());

        tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("loop exits after quit")
            .unwrap()
            .unwrap();
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_stops_playback_and_loop() {
        let h = Harness::start("tail -f");
        h.send('p').await;
        let board = h.board.clone();
        h.finish().await;
        let status = board.get_state().await;
        assert!(status.quitting);
        assert!(status.playback.is_idle());
        assert_eq!(status.now_playing, None);
    }
}
