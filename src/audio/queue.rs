use rand::seq::SliceRandom;
use serenity::model::id::GuildId;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::sources::TrackRef;

/// Pending tracks and the now-playing slot of one guild.
///
/// Pure data: every method is synchronous, so a mutation can never be
/// interleaved with another one while the owner holds its lock.
#[derive(Debug)]
pub struct GuildQueue {
    guild_id: GuildId,
    pending: VecDeque<TrackRef>,
    now_playing: Option<TrackRef>,
    volume: f32,
    idle_deadline: Option<Instant>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(guild_id: GuildId, volume: f32, max_size: usize) -> Self {
        Self {
            guild_id,
            pending: VecDeque::new(),
            now_playing: None,
            volume,
            idle_deadline: None,
            max_size,
        }
    }

    /// Appends tracks in the given order, up to the queue capacity.
    /// Returns how many were accepted.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = TrackRef>) -> usize {
        let room = self.max_size.saturating_sub(self.pending.len());
        let before = self.pending.len();
        self.pending.extend(tracks.into_iter().take(room));

        let accepted = self.pending.len() - before;
        info!("➕ Queued {} track(s) in guild {}", accepted, self.guild_id);
        accepted
    }

    /// Moves the head of `pending` into the now-playing slot (FIFO).
    ///
    /// The previous now-playing track is dropped. Returns the new one, or
    /// `None` (with the slot cleared) when nothing is pending.
    pub fn advance(&mut self) -> Option<TrackRef> {
        self.now_playing = self.pending.pop_front();

        match &self.now_playing {
            Some(track) => debug!("➡️ Next in guild {}: {}", self.guild_id, track.title()),
            None => debug!("📭 Queue drained in guild {}", self.guild_id),
        }

        self.now_playing.clone()
    }

    /// Empties `pending` and the now-playing slot.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.now_playing = None;
        info!("🗑️ Queue cleared in guild {}", self.guild_id);
    }

    /// Randomly permutes `pending`. The now-playing track is never touched.
    /// Returns `false` if fewer than two tracks are pending.
    pub fn shuffle(&mut self) -> bool {
        if self.pending.len() < 2 {
            return false;
        }

        self.pending
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
        info!("🔀 Queue shuffled in guild {}", self.guild_id);
        true
    }

    /// Now-playing track (if any) followed by pending tracks, in play order.
    pub fn snapshot(&self) -> Vec<TrackRef> {
        self.now_playing
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    pub fn now_playing(&self) -> Option<&TrackRef> {
        self.now_playing.as_ref()
    }

    /// Records the stream URL resolved for the now-playing track.
    pub fn set_now_playing_stream(&mut self, stream_url: String) {
        if let Some(track) = self.now_playing.as_mut() {
            track.set_stream_url(stream_url);
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &TrackRef> {
        self.pending.iter()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub fn set_idle_deadline(&mut self, deadline: Option<Instant>) {
        self.idle_deadline = deadline;
    }
}
