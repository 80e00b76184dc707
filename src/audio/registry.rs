use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    queue::GuildQueue,
    source::{AudioSource, EndNotifier},
    voice::VoiceSession,
};

/// Generations are unique process-wide, so an end event can never match a
/// later connection of the same guild.
fn next_generation() -> u64 {
    static GENERATION: AtomicU64 = AtomicU64::new(1);
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Externally visible playback state of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Disconnected,
    /// Connected, nothing playing, idle timer running.
    Idle,
    Playing,
    Paused,
}

/// The stream currently attached to a guild.
pub(crate) struct ActiveStream {
    pub source: Box<dyn AudioSource>,
    pub notifier: EndNotifier,
}

impl ActiveStream {
    /// `true` once the stream reported its end, even if the player has not
    /// processed that event yet.
    pub fn has_ended(&self) -> bool {
        self.notifier.has_fired()
    }
}

/// Mutable per-guild state. Only ever touched under [`GuildPlayer::state`].
pub(crate) struct GuildState {
    pub queue: GuildQueue,
    pub phase: PlaybackState,
    /// Bumped on every transition away from the current stream; stream end
    /// events carrying an older value are stale.
    pub generation: u64,
    pub active: Option<ActiveStream>,
    pub idle_timer: Option<CancellationToken>,
    pub closed: bool,
}

impl GuildState {
    pub fn new(queue: GuildQueue) -> Self {
        Self {
            queue,
            phase: PlaybackState::Idle,
            generation: next_generation(),
            active: None,
            idle_timer: None,
            closed: false,
        }
    }

    /// Stops the active stream, if any, and invalidates its end event.
    pub fn stop_active(&mut self) {
        self.generation = next_generation();
        if let Some(active) = self.active.take() {
            active.source.stop();
        }
    }

    pub fn cancel_idle_timer(&mut self) {
        if let Some(token) = self.idle_timer.take() {
            token.cancel();
        }
        self.queue.set_idle_deadline(None);
    }

    /// Final transition before the guild is dropped from the registry.
    pub fn close(&mut self) {
        self.stop_active();
        self.cancel_idle_timer();
        self.queue.clear();
        self.phase = PlaybackState::Disconnected;
        self.closed = true;
    }
}

/// A connected guild: its voice session plus its serialized playback state.
pub struct GuildPlayer {
    guild_id: GuildId,
    session: Arc<dyn VoiceSession>,
    pub(crate) state: Mutex<GuildState>,
    /// Held from the last generation check until a started stream is
    /// attached or discarded, so two streams of one guild never overlap.
    pub(crate) start_gate: tokio::sync::Mutex<()>,
}

impl GuildPlayer {
    pub fn new(guild_id: GuildId, session: Arc<dyn VoiceSession>, queue: GuildQueue) -> Self {
        Self {
            guild_id,
            session,
            state: Mutex::new(GuildState::new(queue)),
            start_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn session(&self) -> &Arc<dyn VoiceSession> {
        &self.session
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.lock().phase
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Process-wide map of connected guilds.
///
/// Entries are inserted when a guild connects and removed when it
/// disconnects; a guild without an entry is `Disconnected`.
#[derive(Default)]
pub struct QueueRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    connect_gates: DashMap<GuildId, Arc<tokio::sync::Mutex<()>>>,
    volumes: DashMap<GuildId, f32>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, player: Arc<GuildPlayer>) {
        self.players.insert(player.guild_id(), player);
    }

    /// Removes the entry only if it still is `player`, so a stale teardown
    /// cannot evict a newer connection.
    pub fn remove(&self, player: &Arc<GuildPlayer>) -> bool {
        let removed = self
            .players
            .remove_if(&player.guild_id(), |_, current| Arc::ptr_eq(current, player))
            .is_some();

        if removed {
            debug!("🧹 Guild {} removed from registry", player.guild_id());
        }
        removed
    }

    /// Serializes voice connects for one guild.
    pub fn connect_gate(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        self.connect_gates
            .entry(guild_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Last volume chosen in a guild, kept across reconnects.
    pub fn volume_for(&self, guild_id: GuildId, default: f32) -> f32 {
        self.volumes
            .get(&guild_id)
            .map(|volume| *volume)
            .unwrap_or(default)
    }

    pub fn remember_volume(&self, guild_id: GuildId, volume: f32) {
        self.volumes.insert(guild_id, volume);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }
}
