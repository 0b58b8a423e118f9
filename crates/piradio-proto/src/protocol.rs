use serde::{Deserialize, Serialize};

/// Single-character commands understood by the control loop.  Keyboard and
/// HTTP produce the same tokens; the loop does not care where one came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Down,
    Up,
    PlayToggle,
    CycleMode,
    ToggleFavourite,
    ListFavourites,
    SpeakPlaying,
    SpeakFuture,
    SpeakTime,
    Quit,
    Help,
    EditStreams,
    ApiProbe,
}

/// Tokens the HTTP remote is allowed to dispatch.  `q`, `e`, `h` and `A` are
/// keyboard-only.
pub const WEB_COMMANDS: [char; 9] = ['d', 'f', 'F', 'm', 'p', 's', 'S', 't', 'u'];

impl Command {
    pub fn from_token(token: char) -> Option<Self> {
        let cmd = match token {
            'd' => Command::Down,
            'u' => Command::Up,
            'p' => Command::PlayToggle,
            'm' => Command::CycleMode,
            'f' => Command::ToggleFavourite,
            'F' => Command::ListFavourites,
            's' => Command::SpeakPlaying,
            'S' => Command::SpeakFuture,
            't' => Command::SpeakTime,
            'q' => Command::Quit,
            'h' | '?' => Command::Help,
            'e' => Command::EditStreams,
            'A' => Command::ApiProbe,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn token(self) -> char {
        match self {
            Command::Down => 'd',
            Command::Up => 'u',
            Command::PlayToggle => 'p',
            Command::CycleMode => 'm',
            Command::ToggleFavourite => 'f',
            Command::ListFavourites => 'F',
            Command::SpeakPlaying => 's',
            Command::SpeakFuture => 'S',
            Command::SpeakTime => 't',
            Command::Quit => 'q',
            Command::Help => 'h',
            Command::EditStreams => 'e',
            Command::ApiProbe => 'A',
        }
    }

    pub fn is_web_token(token: char) -> bool {
        WEB_COMMANDS.contains(&token)
    }
}

pub const HELP_TEXT: &str = "=== Help
? - help
d - down a channel
e - edit streams list
f - favourite or unfavourite a channel
F - list favourites
h - help
m - mode change - TVH, stream or favourites
p - play/stop channel
q - quit
s - speak channel name
S - speak next channel name
t - speak time
u - up a channel";

/// Which channel source backs the current selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RadioMode {
    Catalog,
    StaticList,
    #[default]
    Favourites,
}

impl RadioMode {
    pub const ALL: [RadioMode; 3] = [RadioMode::Catalog, RadioMode::StaticList, RadioMode::Favourites];

    /// Fixed cycle: Catalog → StaticList → Favourites → Catalog.
    pub fn next(self) -> Self {
        match self {
            RadioMode::Catalog => RadioMode::StaticList,
            RadioMode::StaticList => RadioMode::Favourites,
            RadioMode::Favourites => RadioMode::Catalog,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RadioMode::Catalog => "TVHeadend",
            RadioMode::StaticList => "Stream List",
            RadioMode::Favourites => "Favourites List",
        }
    }
}

impl std::fmt::Display for RadioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of the single player subprocess.
///
/// Transitions:
///   Idle -> Playing            (play)
///   Playing -> Stopping        (stop requested)
///   Playing | Stopping -> Idle (process has actually exited)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Stopping,
}

/// Playback state plus the pid of the player.  `pid` is `None` exactly when
/// the state is `Idle`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub pid: Option<u32>,
}

impl PlaybackStatus {
    pub fn is_idle(&self) -> bool {
        self.state == PlaybackState::Idle
    }
}

/// Snapshot published by the control loop after every change.  `rev` is
/// incremented on every publish so readers can tell snapshots apart.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RadioStatus {
    #[serde(default)]
    pub rev: u64,
    pub mode: RadioMode,
    pub now_playing: Option<String>,
    /// Selected channel, i.e. what `p` would start next.
    pub future: Option<String>,
    pub future_index: Option<usize>,
    pub channel_count: usize,
    pub playback: PlaybackStatus,
    #[serde(default)]
    pub quitting: bool,
}
