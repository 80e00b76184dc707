//! In-memory voice and resolver doubles for player tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

use super::{
    error::{MusicError, MusicResult},
    source::{AudioSource, EndNotifier, TrackOutcome},
    voice::{VoiceConnector, VoiceSession},
};
use crate::sources::{ResolveError, TrackRef, TrackResolver};

/// Lets spawned player tasks run to quiescence on the current-thread runtime.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    refuse: AtomicBool,
}

impl FakeConnector {
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Most recently opened session.
    pub fn session(&self) -> Arc<FakeSession> {
        Arc::clone(self.sessions.lock().last().expect("no session opened"))
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceSession>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(MusicError::Connection("gateway timeout".into()));
        }

        let session = Arc::new(FakeSession::new(channel_id));
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

pub struct StartedStream {
    pub url: String,
    pub notifier: EndNotifier,
    pub state: Arc<FakeSourceState>,
}

/// Number of streams currently playing in a session, and the most ever seen at once.
#[derive(Default)]
pub struct LiveStreams {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveStreams {
    fn started(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn ended(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeSession {
    channel: Mutex<ChannelId>,
    started: Mutex<Vec<StartedStream>>,
    unplayable: Mutex<Vec<String>>,
    start_hold: Mutex<Option<Arc<Notify>>>,
    live: Arc<LiveStreams>,
    disconnected: AtomicBool,
}

impl FakeSession {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            channel: Mutex::new(channel_id),
            started: Mutex::new(Vec::new()),
            unplayable: Mutex::new(Vec::new()),
            start_hold: Mutex::new(None),
            live: Arc::new(LiveStreams::default()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Makes the next `start` wait until the returned handle is notified.
    pub fn hold_next_start(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.start_hold.lock() = Some(Arc::clone(&release));
        release
    }

    /// Most streams that were ever playing at the same time.
    pub fn peak_live_streams(&self) -> usize {
        self.live.peak.load(Ordering::SeqCst)
    }

    /// Makes `start` fail for this stream URL.
    pub fn reject_stream(&self, url: &str) {
        self.unplayable.lock().push(url.to_string());
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.started.lock().iter().map(|s| s.url.clone()).collect()
    }

    /// Ends the `index`-th started stream the way the audio driver would.
    pub fn finish(&self, index: usize, outcome: TrackOutcome) -> bool {
        let started = self.started.lock();
        started[index].state.end();
        started[index].notifier.notify(outcome)
    }

    pub fn source_state(&self, index: usize) -> Arc<FakeSourceState> {
        Arc::clone(&self.started.lock()[index].state)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceSession for FakeSession {
    fn channel_id(&self) -> ChannelId {
        *self.channel.lock()
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        *self.channel.lock() = channel_id;
        Ok(())
    }

    async fn start(&self, stream_url: &str, volume: f32, notifier: EndNotifier) -> MusicResult<Box<dyn AudioSource>> {
        let hold = self.start_hold.lock().take();
        if let Some(release) = hold {
            release.notified().await;
        }

        if self.unplayable.lock().iter().any(|url| url == stream_url) {
            return Err(MusicError::Playback("cannot open stream".into()));
        }

        let state = Arc::new(FakeSourceState::new(volume, Arc::clone(&self.live)));
        self.live.started();
        self.started.lock().push(StartedStream {
            url: stream_url.to_string(),
            notifier: notifier.clone(),
            state: Arc::clone(&state),
        });

        Ok(Box::new(FakeSource { notifier, state }))
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub struct FakeSourceState {
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    volume: Mutex<f32>,
    ended: AtomicBool,
    live: Arc<LiveStreams>,
}

impl FakeSourceState {
    fn new(volume: f32, live: Arc<LiveStreams>) -> Self {
        Self {
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            volume: Mutex::new(volume),
            ended: AtomicBool::new(false),
            live,
        }
    }

    fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.live.ended();
        }
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct FakeSource {
    notifier: EndNotifier,
    state: Arc<FakeSourceState>,
}

impl AudioSource for FakeSource {
    fn pause(&self) -> MusicResult<()> {
        self.state.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> MusicResult<()> {
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        *self.state.volume.lock() = volume;
        Ok(())
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.end();
        // a stopped driver track still fires its end event
        self.notifier.notify(TrackOutcome::Completed);
    }
}

/// Resolver keyed on the query text:
/// `missing*` has no results, `down*` is a provider error and `broken*`
/// searches fine but its stream cannot be resolved.
#[derive(Default)]
pub struct FakeResolver {
    playlists: Mutex<HashMap<String, Vec<String>>>,
    stream_lookups: AtomicUsize,
    stream_hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeResolver {
    pub fn with_playlist(self, url: &str, queries: &[&str]) -> Self {
        self.playlists
            .lock()
            .insert(url.to_string(), queries.iter().map(|q| q.to_string()).collect());
        self
    }

    pub fn stream_lookups(&self) -> usize {
        self.stream_lookups.load(Ordering::SeqCst)
    }

    /// Makes the next stream resolution wait until the returned handle is notified.
    pub fn hold_next_stream(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.stream_hold.lock() = Some(Arc::clone(&release));
        release
    }
}

pub fn stream_for(title: &str) -> String {
    format!("https://cdn.example.com/{}", title.replace(' ', "-"))
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn search(&self, query: &str) -> Result<TrackRef, ResolveError> {
        if query.starts_with("missing") {
            return Err(ResolveError::NoResults);
        }
        if query.starts_with("down") {
            return Err(ResolveError::Provider("HTTP 503".into()));
        }
        Ok(TrackRef::new(query, format!("https://video.example.com/{}", query.replace(' ', "-"))))
    }

    async fn expand(&self, input: &str) -> Vec<String> {
        self.playlists.lock().get(input).cloned().unwrap_or_default()
    }

    async fn resolve_stream(&self, track: &TrackRef) -> Result<String, ResolveError> {
        self.stream_lookups.fetch_add(1, Ordering::SeqCst);

        let hold = self.stream_hold.lock().take();
        if let Some(release) = hold {
            release.notified().await;
        }

        if track.title().starts_with("broken") {
            return Err(ResolveError::Provider("video unavailable".into()));
        }
        Ok(stream_for(track.title()))
    }
}
