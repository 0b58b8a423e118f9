//! Spoken announcements: channel names and the time, rendered to cached
//! `.mp3` clips by a remote text-to-speech endpoint.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tracing::debug;

pub const GOOGLE_TTS_ENDPOINT: &str = "http://translate.google.com/translate_tts";
/// The endpoint refuses requests from unknown agents.
const TTS_USER_AGENT: &str = "VLC/3.0.2 LibVLC/3.0.2";

/// Turns text into a playable audio file.
pub trait SpeechSynth: Send + Sync {
    /// Render `text` to a clip cached under `key`.  An existing clip is reused
    /// unless `refresh` is set.
    fn render<'a>(&'a self, text: &'a str, key: &'a str, refresh: bool) -> BoxFuture<'a, Result<PathBuf>>;
}

pub struct GoogleTts {
    http: reqwest::Client,
    cache_dir: PathBuf,
    endpoint: String,
}

impl GoogleTts {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_endpoint(cache_dir, GOOGLE_TTS_ENDPOINT)
    }

    pub fn with_endpoint(cache_dir: impl Into<PathBuf>, endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(TTS_USER_AGENT)
            .build()
            .context("Failed to build TTS http client")?;
        Ok(Self {
            http,
            cache_dir: cache_dir.into(),
            endpoint: endpoint.into(),
        })
    }

    pub fn clip_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.mp3", cache_key(key)))
    }

    async fn fetch(&self, text: &str, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("ie", "UTF-8"), ("client", "tw-ob"), ("tl", "en"), ("q", text)])
            .send()
            .await
            .context("Failed to reach TTS endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("TTS endpoint returned status: {}", response.status());
        }

        let audio = response.bytes().await.context("Failed to read TTS audio")?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.cache_dir))?;
        // Write aside and rename so a half-written clip is never played.
        let partial = dest.with_extension("mp3.part");
        tokio::fs::write(&partial, &audio)
            .await
            .with_context(|| format!("Failed to write {:?}", partial))?;
        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Failed to move clip into {:?}", dest))?;
        Ok(())
    }
}

impl SpeechSynth for GoogleTts {
    fn render<'a>(&'a self, text: &'a str, key: &'a str, refresh: bool) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let path = self.clip_path(key);
            if !refresh && tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("speech: cached clip {:?}", path);
                return Ok(path);
            }
            debug!("speech: rendering {:?} into {:?}", text, path);
            self.fetch(text, &path).await?;
            Ok(path)
        })
    }
}

/// Channel names become file names; keep them to a safe alphabet.
pub fn cache_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// "the time is 5 minutes past 14, on Oct 15, 2026"
pub fn time_announcement<Tz>(now: &chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "the time is {} minutes past {}, on {}",
        now.format("%-M"),
        now.format("%-H"),
        now.format("%b %d, %Y")
    )
}
