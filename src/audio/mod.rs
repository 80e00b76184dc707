//! # Audio Module
//!
//! Per-guild playback queues and the sequencing engine that drives them.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Sequencer
//! - Control API used by the bot front-end (join, play, skip, pause, ...)
//! - Advance on track end or failure, tagged with a playback generation
//! - Idle auto-disconnect after a configurable timeout
//!
//! ### [`registry`] - Queue Registry
//! - One [`registry::GuildPlayer`] per connected guild, each behind its own lock
//! - Per-guild connect gate and per-guild volume memory
//!
//! ### [`queue`] - Guild Queue
//! - FIFO of pending tracks plus the now-playing slot
//!
//! ### [`voice`], [`source`] and [`driver`] - Voice Backend
//! - Traits for voice sessions and started streams
//! - songbird implementation used in production
//!
//! ## Concurrency
//!
//! Guilds progress independently. A guild's state is only mutated under its
//! lock and the lock is never held across an await, so resolution and
//! streaming in one guild never block commands in another.

pub mod driver;
pub mod error;
pub mod events;
pub mod player;
pub mod queue;
pub mod registry;
pub mod source;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MusicError, MusicResult};
pub use events::{DisconnectReason, PlayerEvent};
pub use player::{PlaybackSequencer, PlayerSettings};
pub use registry::PlaybackState;
