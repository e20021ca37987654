//! # Audio Module
//!
//! Per-guild playback engine for BassBot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue
//! - One ordered list with a cursor: history, current and upcoming tracks
//! - Shuffle, move and remove only touch the upcoming slice
//! - Serializable for restoring after a restart
//!
//! ### [`session`] - Playback Session
//! - One task per guild owning the queue, loop mode and idle timer
//! - Commands and backend events arrive through a single mailbox
//! - Idle auto-disconnect when the voice channel empties
//!
//! ### [`manager`] - Session Registry
//! - Guild-keyed map of live sessions, stored in serenity's `TypeMap`
//!
//! ### [`backend`] / [`songbird_backend`] - Audio Backend
//! - Collaborator traits the session talks to
//! - songbird + yt-dlp implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # async fn example(manager: &bassbot::audio::manager::SessionManager) -> anyhow::Result<()> {
//! use serenity::all::{ChannelId, GuildId};
//!
//! let session = manager
//!     .get_or_create(GuildId::new(1), ChannelId::new(2), Some(ChannelId::new(3)))
//!     .await?;
//! session.next(None).await?;
//! session.set_paused(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod idle;
pub mod manager;
pub mod queue;
pub mod session;
pub mod songbird_backend;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
