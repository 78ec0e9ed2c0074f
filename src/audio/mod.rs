//! # Audio Module
//!
//! Per-guild queue and playback engine.
//!
//! ## Architecture
//!
//! ### [`queue`] - Session Queue
//! - FIFO of pending tracks plus the track that is currently playing
//! - Repeat-one and loop modes, shuffle of the pending part
//!
//! ### [`player`] - Playback Driver
//! - One actor task per guild owning the queue and the driver state
//! - Advances on end-of-track messages from the audio backend
//! - Applies resolved `/play` requests in the order they were issued
//! - Drains large playlists in the background
//!
//! ### [`registry`] - Session Registry
//! - Guild id to session handle, backed by `DashMap`
//!
//! ### [`backend`] / [`songbird_backend`] - Audio Subsystem
//! - `AudioBackend` opens a fresh handle from a track's recipe at play time
//! - Songbird implementation with end-of-track notification
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::{registry::SessionRegistry, songbird_backend::SongbirdBackend};
//! use serenity::all::{GuildId, UserId};
//! # use std::sync::Arc;
//! # async fn example(
//! #     registry: &SessionRegistry,
//! #     call: Arc<tokio::sync::Mutex<songbird::Call>>,
//! # ) -> guild_jukebox::error::Result<()> {
//! let guild_id = GuildId::new(123456789);
//!
//! let (session, _events) = registry.get_or_create(guild_id, || {
//!     SongbirdBackend::new(call, reqwest::Client::new(), 0.5)
//! });
//!
//! session.play("never gonna give you up", UserId::new(1)).await?;
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod player;
pub mod queue;
pub mod registry;
pub mod songbird_backend;
