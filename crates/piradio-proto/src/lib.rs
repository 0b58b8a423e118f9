//! Shared data model for the piradio appliance: channel lists and their file
//! format, command tokens, playback/status types, and settings.

pub mod channels;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
