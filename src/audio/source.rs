use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::error::MusicResult;

/// Terminal outcome of one playing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Completed,
    Failed(String),
}

/// Message delivered to the player when a stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnd {
    pub guild_id: GuildId,
    /// Playback generation the stream was started under.
    pub generation: u64,
    pub outcome: TrackOutcome,
}

/// One-shot completion reporter handed to a started stream.
///
/// Clones share the same latch: whichever clone fires first wins and every
/// later call is dropped, so a stream reports at most one [`TrackEnd`].
#[derive(Clone)]
pub struct EndNotifier {
    guild_id: GuildId,
    generation: u64,
    tx: flume::Sender<TrackEnd>,
    fired: Arc<AtomicBool>,
}

impl EndNotifier {
    pub fn new(guild_id: GuildId, generation: u64, tx: flume::Sender<TrackEnd>) -> Self {
        Self {
            guild_id,
            generation,
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Reports the outcome. Returns `false` if this stream already reported.
    pub fn notify(&self, outcome: TrackOutcome) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        // the player going away mid-stream is not an error for the stream
        let _ = self.tx.send(TrackEnd {
            guild_id: self.guild_id,
            generation: self.generation,
            outcome,
        });
        true
    }
}

/// Control handle of a started, volume-adjustable stream.
pub trait AudioSource: Send + Sync {
    fn pause(&self) -> MusicResult<()>;

    fn resume(&self) -> MusicResult<()>;

    fn set_volume(&self, volume: f32) -> MusicResult<()>;

    /// Stops the stream. The stream's end is still reported through its notifier.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_fires_once_across_clones() {
        let (tx, rx) = flume::unbounded();
        let notifier = EndNotifier::new(GuildId::new(1), 7, tx);
        let on_error = notifier.clone();

        assert!(on_error.notify(TrackOutcome::Failed("decoder".into())));
        assert!(!notifier.notify(TrackOutcome::Completed));
        assert!(notifier.has_fired());

        let end = rx.try_recv().unwrap();
        assert_eq!(end.generation, 7);
        assert_eq!(end.outcome, TrackOutcome::Failed("decoder".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notifier_survives_closed_channel() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let notifier = EndNotifier::new(GuildId::new(1), 1, tx);
        assert!(notifier.notify(TrackOutcome::Completed));
    }
}
