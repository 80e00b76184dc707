use thiserror::Error;

use crate::sources::ResolveError;

/// Errors returned by the playback control API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("You need to be in a voice channel")]
    NotInVoice,

    #[error("No voice channel was given")]
    NoChannel,

    #[error("Already connected to another voice channel in this server")]
    AlreadyConnectedElsewhere,

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Playback is not running")]
    NotPlaying,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("Not enough songs in the queue to shuffle")]
    InsufficientTracks,

    #[error("Volume must be between 1 and 100, got {0}")]
    InvalidVolume(i64),

    #[error("The queue is full")]
    QueueFull,

    #[error("No playable results found")]
    NoResults,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Voice connection error: {0}")]
    Connection(String),
}

/// How an error is surfaced and whether the session survives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong state or bad input, shown to the user as is.
    UserInput,
    /// Search or resolution failure for one track.
    Provider,
    /// Stream start or mid-stream failure; the queue moves on.
    Playback,
    /// Voice connection failure; the guild stays disconnected.
    Infrastructure,
}

impl MusicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MusicError::NoResults | MusicError::Provider(_) => ErrorKind::Provider,
            MusicError::Playback(_) => ErrorKind::Playback,
            MusicError::Connection(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::UserInput,
        }
    }
}

impl From<ResolveError> for MusicError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoResults => MusicError::NoResults,
            ResolveError::Provider(reason) => MusicError::Provider(reason),
        }
    }
}

pub type MusicResult<T> = Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(MusicError::NotInVoice.kind(), ErrorKind::UserInput);
        assert_eq!(MusicError::InsufficientTracks.kind(), ErrorKind::UserInput);
        assert_eq!(MusicError::Provider("down".into()).kind(), ErrorKind::Provider);
        assert_eq!(MusicError::Playback("eof".into()).kind(), ErrorKind::Playback);
        assert_eq!(MusicError::Connection("timeout".into()).kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn test_resolve_errors_convert() {
        assert_eq!(MusicError::from(ResolveError::NoResults), MusicError::NoResults);
        assert_eq!(
            MusicError::from(ResolveError::Provider("429".into())),
            MusicError::Provider("429".into())
        );
    }
}
