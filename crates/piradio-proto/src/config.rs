use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("unknown setting {0}")]
    UnknownKey(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// How the TV Headend server expects credentials.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Plain,
    Digest,
}

impl std::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(AuthMode::Plain),
            "digest" => Ok(AuthMode::Digest),
            other => Err(format!("expected plain or digest, got {:?}", other)),
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Plain => f.write_str("plain"),
            AuthMode::Digest => f.write_str("digest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TV Headend web interface, without the trailing slash.
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_pass")]
    pub pass: String,
    #[serde(default)]
    pub auth: AuthMode,
    /// Persistent auth token appended to stream URLs.  Empty means none.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_channel_limit")]
    pub channel_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player program and arguments; the stream URL is appended.
    #[serde(default = "default_player_command")]
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 0 disables the remote control.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen on all interfaces instead of loopback only.
    #[serde(default)]
    pub bind_all: bool,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_streams_list")]
    pub streams_list: PathBuf,
    #[serde(default = "default_favourites_list")]
    pub favourites_list: PathBuf,
    /// Where synthesised speech clips are cached.
    #[serde(default = "default_speech_cache")]
    pub speech_cache: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            user: default_user(),
            pass: default_pass(),
            auth: AuthMode::default(),
            token: String::new(),
            channel_limit: default_channel_limit(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_all: false,
            assets_dir: default_assets_dir(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            streams_list: default_streams_list(),
            favourites_list: default_favourites_list(),
            speech_cache: default_speech_cache(),
        }
    }
}

fn default_server_url() -> String {
    "http://tvh.example.com:9981".to_string()
}

fn default_user() -> String {
    "ts_user".to_string()
}

fn default_pass() -> String {
    "ts_pass".to_string()
}

fn default_channel_limit() -> u32 {
    400
}

fn default_player_command() -> String {
    "mpv --no-video --really-quiet".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_assets_dir() -> PathBuf {
    platform::data_dir().join("images")
}

fn default_streams_list() -> PathBuf {
    platform::config_dir().join("streams_list.dat")
}

fn default_favourites_list() -> PathBuf {
    platform::config_dir().join("favourites_list.dat")
}

fn default_speech_cache() -> PathBuf {
    platform::cache_dir().join("speech")
}

impl PlayerConfig {
    /// Whitespace-split command template.
    pub fn argv(&self) -> Vec<String> {
        self.command.split_whitespace().map(str::to_string).collect()
    }
}

impl HttpConfig {
    pub fn enabled(&self) -> bool {
        self.port != 0
    }

    pub fn bind_address(&self) -> &'static str {
        if self.bind_all {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

// ── editable settings ─────────────────────────────────────────────────────────

/// One user-editable setting, as presented by the settings editor.
pub struct Setting {
    pub key: &'static str,
    pub title: &'static str,
    pub help: &'static str,
}

pub const SETTINGS: &[Setting] = &[
    Setting {
        key: "server.url",
        title: "URL",
        help: "This is the URL of the TV Headend Server main web interface, without the trailing slash",
    },
    Setting {
        key: "server.user",
        title: "User",
        help: "This is a user with API access and streaming rights",
    },
    Setting {
        key: "server.pass",
        title: "Pass",
        help: "Password on TVH server",
    },
    Setting {
        key: "server.auth",
        title: "Auth",
        help: "How the TVH server checks passwords: plain or digest",
    },
    Setting {
        key: "server.token",
        title: "P.A.T.",
        help: "The Persistent Auth Token can be found by logging into the TV headend, editing the \
               user to set persistent auth on, then saving, then re-edit and scroll down to see \
               the persistent auth value",
    },
    Setting {
        key: "server.channel_limit",
        title: "Channel limit",
        help: "Maximum number of channels to fetch from the TVH server",
    },
    Setting {
        key: "player.command",
        title: "Player",
        help: "Command to play media with arguments, try \"mpv --no-video --really-quiet\" or \
               \"vlc -I dummy --novideo --play-and-exit\"",
    },
    Setting {
        key: "http.port",
        title: "Web Port",
        help: "Web port (use 8080) or zero to disable",
    },
    Setting {
        key: "http.bind_all",
        title: "Web on all interfaces",
        help: "true to accept remote control from the network, false for this machine only",
    },
];

impl Config {
    /// Load settings from `path`.
    ///
    /// A missing or zero-length file is `Ok(None)` so the caller can run the
    /// settings editor; a file that exists but doesn't parse is an error.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
        };
        write().map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "server.url" => self.server.url.clone(),
            "server.user" => self.server.user.clone(),
            "server.pass" => self.server.pass.clone(),
            "server.auth" => self.server.auth.to_string(),
            "server.token" => self.server.token.clone(),
            "server.channel_limit" => self.server.channel_limit.to_string(),
            "player.command" => self.player.command.clone(),
            "http.port" => self.http.port.to_string(),
            "http.bind_all" => self.http.bind_all.to_string(),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let setting = SETTINGS
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: setting.key,
            value: value.to_string(),
            reason,
        };
        let value = value.trim();

        match setting.key {
            "server.url" => self.server.url = value.trim_end_matches('/').to_string(),
            "server.user" => self.server.user = value.to_string(),
            "server.pass" => self.server.pass = value.to_string(),
            "server.auth" => self.server.auth = value.parse().map_err(invalid)?,
            "server.token" => self.server.token = value.to_string(),
            "server.channel_limit" => {
                self.server.channel_limit = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "player.command" => {
                if value.is_empty() {
                    return Err(invalid("player command can't be empty".to_string()));
                }
                self.player.command = value.to_string()
            }
            "http.port" => self.http.port = value.parse().map_err(|e| invalid(format!("{}", e)))?,
            "http.bind_all" => {
                self.http.bind_all = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled());
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.bind_address(), "127.0.0.1");
        assert_eq!(config.server.auth, AuthMode::Plain);
        assert_eq!(config.server.channel_limit, 400);
        assert!(config.paths.favourites_list.ends_with("piradio/favourites_list.dat"));
        assert_eq!(config.player.argv()[0], "mpv");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "http://tvh.lan:9981"
            auth = "digest"

            [http]
            port = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.url, "http://tvh.lan:9981");
        assert_eq!(config.server.auth, AuthMode::Digest);
        assert_eq!(config.server.user, "ts_user");
        assert!(!config.http.enabled());
        assert_eq!(config.player.command, default_player_command());
    }

    #[test]
    fn test_load_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::load(&path).unwrap().is_none());

        std::fs::write(&path, "").unwrap();
        assert!(Config::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nurl = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.set("player.command", "vlc -I dummy").unwrap();
        config.set("http.bind_all", "true").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap().unwrap();
        assert_eq!(loaded.player.argv(), vec!["vlc", "-I", "dummy"]);
        assert_eq!(loaded.http.bind_address(), "0.0.0.0");
    }

    #[test]
    fn test_set_validates() {
        let mut config = Config::default();
        config.set("server.url", "http://tvh:9981/").unwrap();
        assert_eq!(config.server.url, "http://tvh:9981");
        assert!(config.set("http.port", "eighty").is_err());
        assert!(config.set("server.auth", "kerberos").is_err());
        assert!(config.set("player.command", "  ").is_err());
        assert!(matches!(config.set("nope", "1"), Err(ConfigError::UnknownKey(_))));
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_every_setting_is_readable() {
        let config = Config::default();
        for setting in SETTINGS {
            assert!(config.get(setting.key).is_ok(), "{}", setting.key);
        }
    }
}
