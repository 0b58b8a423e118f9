use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::protocol::RadioMode;

pub const STREAMS_HEADER: &str = "# restart piradio after making changes made to this file
# this is the streams list. hashes are comments.
# the stream name is on one line, the next line is the URL.";

pub const FAVOURITES_HEADER: &str = "# DO NOT EDIT this file whilst piradio is running!
# this is the favourites list. hashes are comments.
# the stream name is on one line, the next line is the URL.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub url: String,
}

/// Outcome of [`ChannelMap::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

/// Name → stream locator, always iterated in ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    entries: BTreeMap<String, String>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace; returns the previous locator.
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) -> Option<String> {
        self.entries.insert(name.into(), url.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Remove `name` if present, otherwise add it.
    pub fn toggle(&mut self, name: &str, url: &str) -> Toggle {
        if self.entries.remove(name).is_some() {
            Toggle::Removed
        } else {
            self.entries.insert(name.to_string(), url.to_string());
            Toggle::Added
        }
    }

    pub fn channel_at(&self, idx: usize) -> Option<Channel> {
        self.entries.iter().nth(idx).map(|(name, url)| Channel {
            name: name.clone(),
            url: url.clone(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, u)| (n.as_str(), u.as_str()))
    }
}

impl<N: Into<String>, U: Into<String>> FromIterator<(N, U)> for ChannelMap {
    fn from_iter<I: IntoIterator<Item = (N, U)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, u)| (n.into(), u.into()))
                .collect(),
        }
    }
}

// ── list file format ──────────────────────────────────────────────────────────

/// Parse a streams/favourites list.
///
/// Any two consecutive non-comment lines are a (name, url) pair.  A `#` line
/// is a comment and restarts the pairing.  The first blank line ends the
/// list.
pub fn parse_list_str(content: &str) -> ChannelMap {
    let mut map = ChannelMap::new();
    let mut pending_name: Option<&str> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        if line.starts_with('#') {
            pending_name = None;
            continue;
        }

        match pending_name.take() {
            Some(name) => {
                map.insert(name, line);
            }
            None => pending_name = Some(line),
        }
    }

    map
}

pub fn render_list(header: &str, map: &ChannelMap) -> String {
    let mut out = String::with_capacity(header.len() + 1);
    out.push_str(header);
    out.push('\n');
    for (name, url) in map.iter() {
        out.push_str(name);
        out.push('\n');
        out.push_str(url);
        out.push('\n');
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to write list file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A list file on disk together with the comment header written on save.
#[derive(Debug, Clone)]
pub struct ListFile {
    path: PathBuf,
    header: &'static str,
}

impl ListFile {
    pub fn new(path: impl Into<PathBuf>, header: &'static str) -> Self {
        Self {
            path: path.into(),
            header,
        }
    }

    pub fn streams(path: impl Into<PathBuf>) -> Self {
        Self::new(path, STREAMS_HEADER)
    }

    pub fn favourites(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FAVOURITES_HEADER)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is an empty list, not an error.
    pub fn load(&self) -> ChannelMap {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let map = parse_list_str(&content);
                debug!("Read {} channels from {:?}", map.len(), self.path);
                map
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("List file {:?} does not exist", self.path);
                ChannelMap::new()
            }
            Err(e) => {
                warn!("List file {:?} unreadable: {}", self.path, e);
                ChannelMap::new()
            }
        }
    }

    pub fn save(&self, map: &ChannelMap) -> Result<(), ListError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, render_list(self.header, map))
        };
        write().map_err(|source| ListError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

// ── channel sources + selection ───────────────────────────────────────────────

/// The three channel sources, which one is active, and the selection into it.
///
/// Invariant: `selection < active().len()` whenever the active map is
/// non-empty; it is 0 otherwise.
#[derive(Debug, Clone)]
pub struct Channels {
    catalog: ChannelMap,
    streams: ChannelMap,
    favourites: ChannelMap,
    mode: RadioMode,
    selection: usize,
}

impl Channels {
    /// Starts in favourites mode, or catalog mode if there are no favourites.
    pub fn new(catalog: ChannelMap, streams: ChannelMap, favourites: ChannelMap) -> Self {
        let mode = if favourites.is_empty() {
            RadioMode::Catalog
        } else {
            RadioMode::Favourites
        };
        Self {
            catalog,
            streams,
            favourites,
            mode,
            selection: 0,
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn map(&self, mode: RadioMode) -> &ChannelMap {
        match mode {
            RadioMode::Catalog => &self.catalog,
            RadioMode::StaticList => &self.streams,
            RadioMode::Favourites => &self.favourites,
        }
    }

    pub fn active(&self) -> &ChannelMap {
        self.map(self.mode)
    }

    pub fn favourites(&self) -> &ChannelMap {
        &self.favourites
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    /// `None` when the active map is empty.
    pub fn selected(&self) -> Option<Channel> {
        self.active().channel_at(self.selection)
    }

    pub fn select_down(&mut self) {
        self.selection = self.selection.saturating_sub(1);
    }

    pub fn select_up(&mut self) {
        if self.selection + 1 < self.active().len() {
            self.selection += 1;
        }
    }

    pub fn cycle_mode(&mut self) -> RadioMode {
        self.mode = self.mode.next();
        self.selection = 0;
        self.mode
    }

    /// Toggle the selected channel in favourites.  Returns `None` when
    /// nothing is selected.
    pub fn toggle_favourite(&mut self) -> Option<(Toggle, Channel)> {
        let channel = self.selected()?;
        let outcome = self.favourites.toggle(&channel.name, &channel.url);
        self.clamp_selection();
        Some((outcome, channel))
    }

    fn clamp_selection(&mut self) {
        let len = self.active().len();
        self.selection = self.selection.min(len.saturating_sub(1));
    }
}
