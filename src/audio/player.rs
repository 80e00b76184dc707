use futures::{stream, StreamExt};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    error::{MusicError, MusicResult},
    events::{DisconnectReason, PlayerEvent},
    queue::GuildQueue,
    registry::{ActiveStream, GuildPlayer, GuildState, PlaybackState, QueueRegistry},
    source::{EndNotifier, TrackEnd, TrackOutcome},
    voice::VoiceConnector,
};
use crate::{
    config::Config,
    sources::{ResolveError, TrackRef, TrackResolver},
};

/// Tunables of the playback core.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
    pub resolve_concurrency: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(180),
            max_queue_size: 1000,
            resolve_concurrency: 4,
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            idle_timeout: config.idle_timeout,
            max_queue_size: config.max_queue_size,
            resolve_concurrency: config.resolve_concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueResult {
    pub started: bool,
    pub accepted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    pub started: bool,
    /// Titles of the accepted tracks, in queue order.
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueView {
    pub now_playing: Option<String>,
    pub upcoming: Vec<String>,
    /// Time left before an idle guild disconnects.
    pub idle_left: Option<Duration>,
}

/// A track popped by Advance and the generation it must start under.
struct AdvanceStep {
    generation: u64,
    track: TrackRef,
}

/// Per-guild playback state machine and the control API over it.
///
/// Every guild's state sits behind its own lock in the [`QueueRegistry`];
/// the lock is never held across an await. Stream end events arrive over a
/// channel tagged with the generation they were started under and only the
/// current generation may advance the queue.
#[derive(Clone)]
pub struct PlaybackSequencer {
    registry: Arc<QueueRegistry>,
    resolver: Arc<dyn TrackResolver>,
    connector: Arc<dyn VoiceConnector>,
    settings: Arc<PlayerSettings>,
    events: flume::Sender<PlayerEvent>,
    track_ends: flume::Sender<TrackEnd>,
    shutdown: CancellationToken,
}

impl PlaybackSequencer {
    /// Builds the sequencer and spawns its track-end loop. The returned
    /// receiver yields the notifications meant for the command layer.
    pub fn new(
        settings: PlayerSettings,
        resolver: Arc<dyn TrackResolver>,
        connector: Arc<dyn VoiceConnector>,
    ) -> (Self, flume::Receiver<PlayerEvent>) {
        let (events, events_rx) = flume::unbounded();
        let (track_ends, track_ends_rx) = flume::unbounded();

        let sequencer = Self {
            registry: Arc::new(QueueRegistry::new()),
            resolver,
            connector,
            settings: Arc::new(settings),
            events,
            track_ends,
            shutdown: CancellationToken::new(),
        };

        let worker = sequencer.clone();
        tokio::spawn(async move { worker.run_track_end_loop(track_ends_rx).await });

        (sequencer, events_rx)
    }

    /// Stops the track-end loop. Connected guilds are left as they are.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once [`shutdown`](Self::shutdown) was called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    #[allow(dead_code)]
    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    async fn run_track_end_loop(self, track_ends: flume::Receiver<TrackEnd>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                end = track_ends.recv_async() => match end {
                    Ok(end) => {
                        let sequencer = self.clone();
                        tokio::spawn(async move { sequencer.on_track_end(end).await });
                    }
                    Err(_) => break,
                },
            }
        }
        debug!("🛑 Track end loop stopped");
    }

    // ----- control API -----

    /// Connects to `channel_id`. Joining the channel the bot already sits in
    /// is a no-op.
    pub async fn join(&self, guild_id: GuildId, channel_id: Option<ChannelId>) -> MusicResult<ChannelId> {
        let channel_id = channel_id.ok_or(MusicError::NoChannel)?;
        self.ensure_connected(guild_id, channel_id, false).await?;
        Ok(channel_id)
    }

    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NotConnected)?;
        {
            let mut st = player.state.lock();
            if st.closed {
                return Err(MusicError::NotConnected);
            }
            st.close();
        }

        self.finish_disconnect(&player, DisconnectReason::Manual).await;
        Ok(())
    }

    /// Resolves `query`, connects to (or moves to) the caller's channel and
    /// enqueues the results.
    pub async fn play(&self, guild_id: GuildId, user_channel: Option<ChannelId>, query: &str) -> MusicResult<PlayOutcome> {
        let channel_id = user_channel.ok_or(MusicError::NotInVoice)?;
        let tracks = self.fetch_tracks(guild_id, query).await?;

        // a leave racing the connect closes the player under us; connect once more
        let mut attempts = 0;
        loop {
            attempts += 1;
            let player = self.ensure_connected(guild_id, channel_id, true).await?;
            match self.enqueue_on(&player, tracks.clone()).await {
                Err(MusicError::NotConnected) if attempts < 2 => continue,
                Err(e) => return Err(e),
                Ok(result) => {
                    let titles = tracks
                        .iter()
                        .take(result.accepted_count)
                        .map(|t| t.title().to_string())
                        .collect();
                    return Ok(PlayOutcome {
                        started: result.started,
                        titles,
                    });
                }
            }
        }
    }

    /// Appends already-resolved tracks to a connected guild.
    pub async fn enqueue(&self, guild_id: GuildId, tracks: Vec<TrackRef>) -> MusicResult<EnqueueResult> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NotConnected)?;
        self.enqueue_on(&player, tracks).await
    }

    /// Skips the now-playing track and returns it.
    ///
    /// If that track already ended and its end event is still in flight, the
    /// event performs the advance and the skip changes nothing.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<TrackRef> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NothingPlaying)?;

        let (skipped, step) = {
            let mut st = player.state.lock();
            let skipped = st.queue.now_playing().cloned().ok_or(MusicError::NothingPlaying)?;
            if st.closed {
                return Err(MusicError::NothingPlaying);
            }

            if st.active.as_ref().is_some_and(ActiveStream::has_ended) {
                debug!("⏭️ Skip in guild {} lost to a natural end", guild_id);
                return Ok(skipped);
            }

            (skipped, self.begin_advance(&player, &mut st))
        };

        info!("⏭️ Skipped in guild {}: {}", guild_id, skipped.title());
        if let Some(step) = step {
            self.run_advance(&player, step).await;
        }
        Ok(skipped)
    }

    pub fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NotPlaying)?;
        let mut st = player.state.lock();
        if st.phase != PlaybackState::Playing {
            return Err(MusicError::NotPlaying);
        }

        // while the next stream is still resolving there is nothing to pause yet
        if let Some(active) = &st.active {
            active.source.pause()?;
        }
        st.phase = PlaybackState::Paused;
        info!("⏸️ Paused in guild {}", guild_id);
        Ok(())
    }

    pub fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NotPaused)?;
        let mut st = player.state.lock();
        if st.phase != PlaybackState::Paused {
            return Err(MusicError::NotPaused);
        }

        if let Some(active) = &st.active {
            active.source.resume()?;
        }
        st.phase = PlaybackState::Playing;
        info!("▶️ Resumed in guild {}", guild_id);
        Ok(())
    }

    /// Clears the queue and stops the stream but stays connected.
    pub fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.registry.get(guild_id).ok_or(MusicError::NotConnected)?;
        let mut st = player.state.lock();
        if st.closed {
            return Err(MusicError::NotConnected);
        }

        st.queue.clear();
        st.stop_active();
        st.phase = PlaybackState::Idle;
        self.arm_idle_timer(&player, &mut st);
        info!("⏹️ Stopped in guild {}", guild_id);
        Ok(())
    }

    pub fn shuffle(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.registry.get(guild_id).ok_or(MusicError::InsufficientTracks)?;
        let mut st = player.state.lock();
        if st.queue.shuffle() {
            Ok(())
        } else {
            Err(MusicError::InsufficientTracks)
        }
    }

    /// Sets the volume in percent. Applies to the running stream and to every
    /// later track of the guild, including after a reconnect.
    pub fn set_volume(&self, guild_id: GuildId, percent: i64) -> MusicResult<()> {
        if !(1..=100).contains(&percent) {
            return Err(MusicError::InvalidVolume(percent));
        }

        let player = self.registry.get(guild_id).ok_or(MusicError::NotPlaying)?;
        let volume = percent as f32 / 100.0;
        {
            let mut st = player.state.lock();
            if st.queue.now_playing().is_none() {
                return Err(MusicError::NotPlaying);
            }

            st.queue.set_volume(volume);
            if let Some(active) = &st.active {
                active.source.set_volume(volume)?;
            }
        }

        self.registry.remember_volume(guild_id, volume);
        info!("🔊 Volume set to {}% in guild {}", percent, guild_id);
        Ok(())
    }

    /// Titles in play order; the first is the now-playing track if any.
    #[allow(dead_code)]
    pub fn get_queue(&self, guild_id: GuildId) -> Vec<String> {
        self.snapshot(guild_id)
            .iter()
            .map(|track| track.title().to_string())
            .collect()
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Vec<TrackRef> {
        self.registry
            .get(guild_id)
            .map(|player| player.state.lock().queue.snapshot())
            .unwrap_or_default()
    }

    /// Everything the queue display needs, read under one lock.
    pub fn queue_view(&self, guild_id: GuildId) -> QueueView {
        let Some(player) = self.registry.get(guild_id) else {
            return QueueView::default();
        };
        let st = player.state.lock();
        QueueView {
            now_playing: st.queue.now_playing().map(|t| t.title().to_string()),
            upcoming: st.queue.pending().map(|t| t.title().to_string()).collect(),
            idle_left: st
                .queue
                .idle_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
        }
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<TrackRef> {
        let player = self.registry.get(guild_id)?;
        let st = player.state.lock();
        st.queue.now_playing().cloned()
    }

    pub fn state(&self, guild_id: GuildId) -> PlaybackState {
        self.registry
            .get(guild_id)
            .map(|player| player.playback_state())
            .unwrap_or(PlaybackState::Disconnected)
    }

    /// Percent volume used for the guild's next stream.
    pub fn volume(&self, guild_id: GuildId) -> u8 {
        let volume = match self.registry.get(guild_id) {
            Some(player) => player.state.lock().queue.volume(),
            None => self.registry.volume_for(guild_id, self.settings.default_volume),
        };
        (volume * 100.0).round() as u8
    }

    #[allow(dead_code)]
    pub fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry
            .get(guild_id)
            .map(|player| player.session().channel_id())
    }

    /// The bot was removed from voice by someone else.
    pub async fn handle_external_disconnect(&self, guild_id: GuildId) {
        let Some(player) = self.registry.get(guild_id) else {
            return;
        };

        {
            let mut st = player.state.lock();
            if st.closed {
                return;
            }
            st.close();
        }

        warn!("🔌 Voice connection of guild {} dropped externally", guild_id);
        self.finish_disconnect(&player, DisconnectReason::Manual).await;
    }

    // ----- sequencing -----

    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        allow_move: bool,
    ) -> MusicResult<Arc<GuildPlayer>> {
        let gate = self.registry.connect_gate(guild_id);
        let _guard = gate.lock().await;

        if let Some(player) = self.registry.get(guild_id).filter(|p| !p.is_closed()) {
            let current = player.session().channel_id();
            if current != channel_id {
                if !allow_move {
                    return Err(MusicError::AlreadyConnectedElsewhere);
                }
                player.session().move_to(channel_id).await?;
                info!("🚚 Moved guild {} from {} to {}", guild_id, current, channel_id);
            }
            return Ok(player);
        }

        let session = self.connector.connect(guild_id, channel_id).await?;
        let queue = GuildQueue::new(
            guild_id,
            self.registry.volume_for(guild_id, self.settings.default_volume),
            self.settings.max_queue_size,
        );
        let player = Arc::new(GuildPlayer::new(guild_id, session, queue));
        {
            let mut st = player.state.lock();
            self.arm_idle_timer(&player, &mut st);
        }
        self.registry.insert(Arc::clone(&player));

        info!(
            "🔗 Connected to voice channel {} in guild {} ({} guilds connected)",
            channel_id,
            guild_id,
            self.registry.len()
        );
        Ok(player)
    }

    async fn enqueue_on(&self, player: &Arc<GuildPlayer>, tracks: Vec<TrackRef>) -> MusicResult<EnqueueResult> {
        if tracks.is_empty() {
            return Ok(EnqueueResult {
                started: false,
                accepted_count: 0,
            });
        }

        let (result, step) = {
            let mut st = player.state.lock();
            if st.closed {
                return Err(MusicError::NotConnected);
            }

            let accepted_count = st.queue.extend(tracks);
            if accepted_count == 0 {
                return Err(MusicError::QueueFull);
            }

            let step = if st.queue.now_playing().is_none() {
                self.begin_advance(player, &mut st)
            } else {
                None
            };

            let result = EnqueueResult {
                started: step.is_some(),
                accepted_count,
            };
            (result, step)
        };

        if let Some(step) = step {
            self.run_advance(player, step).await;
        }
        Ok(result)
    }

    /// Synchronous half of Advance: invalidates the current stream and pops
    /// the next track, or goes idle.
    fn begin_advance(&self, player: &Arc<GuildPlayer>, st: &mut GuildState) -> Option<AdvanceStep> {
        st.stop_active();

        match st.queue.advance() {
            Some(track) => {
                st.cancel_idle_timer();
                st.phase = PlaybackState::Playing;
                Some(AdvanceStep {
                    generation: st.generation,
                    track,
                })
            }
            None => {
                st.phase = PlaybackState::Idle;
                self.arm_idle_timer(player, st);
                None
            }
        }
    }

    /// Asynchronous half of Advance. A failing track pops the next one, so a
    /// queue of K unplayable tracks ends after K attempts.
    async fn run_advance(&self, player: &Arc<GuildPlayer>, mut step: AdvanceStep) {
        loop {
            let Err(e) = self.start_track(player, &step).await else {
                return;
            };

            let next = {
                let mut st = player.state.lock();
                // superseded while resolving or starting
                if st.closed || st.generation != step.generation {
                    debug!(
                        "🗑️ Ignoring failure of superseded track {} in guild {}",
                        step.track.title(),
                        player.guild_id()
                    );
                    return;
                }
                self.begin_advance(player, &mut st)
            };

            warn!(
                "❌ Could not play {} in guild {}: {}",
                step.track.title(),
                player.guild_id(),
                e
            );
            self.emit(PlayerEvent::PlaybackFailed {
                guild_id: player.guild_id(),
                title: step.track.title().to_string(),
                reason: e.to_string(),
            });

            match next {
                Some(next) => step = next,
                None => return,
            }
        }
    }

    /// Resolves and starts one track. Returns `Ok` without starting anything
    /// when the generation moved on meanwhile.
    ///
    /// The start gate is held from the generation check until the new stream
    /// is attached or stopped, so a superseded start can never play alongside
    /// the stream that replaced it.
    async fn start_track(&self, player: &Arc<GuildPlayer>, step: &AdvanceStep) -> MusicResult<()> {
        let guild_id = player.guild_id();
        let stream_url = match step.track.resolved_stream_url() {
            Some(url) => url.to_string(),
            None => self.resolver.resolve_stream(&step.track).await?,
        };

        let _start = player.start_gate.lock().await;

        let volume = {
            let mut st = player.state.lock();
            if st.closed || st.generation != step.generation {
                return Ok(());
            }
            st.queue.set_now_playing_stream(stream_url.clone());
            st.queue.volume()
        };

        let notifier = EndNotifier::new(guild_id, step.generation, self.track_ends.clone());
        let source = player
            .session()
            .start(&stream_url, volume, notifier.clone())
            .await?;

        {
            let mut st = player.state.lock();
            if st.closed || st.generation != step.generation {
                drop(st);
                debug!("🗑️ Discarding stale stream in guild {}", guild_id);
                source.stop();
                return Ok(());
            }

            // volume or pause changes made while the stream was starting
            if st.queue.volume() != volume {
                if let Err(e) = source.set_volume(st.queue.volume()) {
                    warn!("⚠️ Could not apply volume in guild {}: {}", guild_id, e);
                }
            }
            if st.phase == PlaybackState::Paused {
                if let Err(e) = source.pause() {
                    warn!("⚠️ Could not pause in guild {}: {}", guild_id, e);
                }
            }

            st.active = Some(ActiveStream { source, notifier });
        }

        info!("🎵 Now playing in guild {}: {}", guild_id, step.track.title());
        self.emit(PlayerEvent::NowPlaying {
            guild_id,
            title: step.track.title().to_string(),
        });
        Ok(())
    }

    async fn on_track_end(&self, end: TrackEnd) {
        let Some(player) = self.registry.get(end.guild_id) else {
            debug!("🗑️ Track end for disconnected guild {}", end.guild_id);
            return;
        };

        let (title, step) = {
            let mut st = player.state.lock();
            if st.closed || st.generation != end.generation {
                debug!("🗑️ Stale track end in guild {}", end.guild_id);
                return;
            }

            let title = st
                .queue
                .now_playing()
                .map(|track| track.title().to_string())
                .unwrap_or_default();
            // the stream is already over, nothing to stop
            st.active = None;
            (title, self.begin_advance(&player, &mut st))
        };

        match end.outcome {
            TrackOutcome::Completed => debug!("✅ Finished in guild {}: {}", end.guild_id, title),
            TrackOutcome::Failed(reason) => {
                warn!("❌ Stream failed in guild {}: {} ({})", end.guild_id, title, reason);
                self.emit(PlayerEvent::PlaybackFailed {
                    guild_id: end.guild_id,
                    title,
                    reason,
                });
            }
        }

        if let Some(step) = step {
            self.run_advance(&player, step).await;
        }
    }

    fn arm_idle_timer(&self, player: &Arc<GuildPlayer>, st: &mut GuildState) {
        st.cancel_idle_timer();

        let token = CancellationToken::new();
        let deadline = Instant::now() + self.settings.idle_timeout;
        st.idle_timer = Some(token.clone());
        st.queue.set_idle_deadline(Some(deadline));
        debug!("⏲️ Idle timer armed in guild {}", player.guild_id());

        let sequencer = self.clone();
        let player = Arc::clone(player);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => sequencer.on_idle_timeout(player, token).await,
            }
        });
    }

    async fn on_idle_timeout(&self, player: Arc<GuildPlayer>, token: CancellationToken) {
        {
            let mut st = player.state.lock();
            if st.closed || token.is_cancelled() || st.phase != PlaybackState::Idle {
                return;
            }
            st.close();
        }

        info!("💤 Guild {} idle, disconnecting", player.guild_id());
        self.finish_disconnect(&player, DisconnectReason::Idle).await;
    }

    /// Drops a closed player from the registry and its voice connection.
    async fn finish_disconnect(&self, player: &Arc<GuildPlayer>, reason: DisconnectReason) {
        let guild_id = player.guild_id();
        let gate = self.registry.connect_gate(guild_id);
        let _guard = gate.lock().await;

        // a newer connection already replaced this one; its voice call is live
        if !self.registry.remove(player) {
            return;
        }

        player.session().disconnect().await;
        info!("👋 Disconnected from guild {} ({:?})", guild_id, reason);
        self.emit(PlayerEvent::Disconnected { guild_id, reason });
    }

    /// Expands and searches `query`. Failing entries of an expanded list are
    /// reported and skipped.
    async fn fetch_tracks(&self, guild_id: GuildId, query: &str) -> MusicResult<Vec<TrackRef>> {
        let expanded = self.resolver.expand(query).await;
        let single = expanded.is_empty();
        let queries = if single { vec![query.to_string()] } else { expanded };

        let resolver = &self.resolver;
        let results: Vec<(String, Result<TrackRef, ResolveError>)> = stream::iter(queries)
            .map(|q| async move {
                let result = resolver.search(&q).await;
                (q, result)
            })
            .buffered(self.settings.resolve_concurrency.max(1))
            .collect()
            .await;

        let mut tracks = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (q, result) in results {
            match result {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    warn!("🔍 Lookup failed in guild {} for {}: {}", guild_id, q, e);
                    if !single {
                        self.emit(PlayerEvent::TrackFetchFailed {
                            guild_id,
                            query: q,
                            reason: e.to_string(),
                        });
                    }
                    last_error = Some(e);
                }
            }
        }

        if tracks.is_empty() {
            return Err(match last_error {
                Some(e) if single => e.into(),
                _ => MusicError::NoResults,
            });
        }
        Ok(tracks)
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            debug!("📭 No listener for player events");
        }
    }
}
