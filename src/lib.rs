//! # Guild Jukebox
//!
//! Discord music bot with one playback queue per guild.
//!
//! - [`sources`] turns `/play` input into tracks (local files, YouTube,
//!   Spotify, free-text search)
//! - [`audio`] runs the per-guild session actors and the Songbird backend
//! - [`bot`] wires slash commands and voice events to the sessions

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
