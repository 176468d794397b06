//! The player capability contract and its implementations.
//!
//! A player is anything that can emit a uniform stream of timestamped
//! messages under playback control: seekable file-backed playback, an
//! unseekable live bridge connection, or a deterministic headless capture
//! run. Decorators implement the same contract while wrapping another
//! player, so callers interact with the outermost decorator exactly as they
//! would with a bare base player.

pub mod automated_run;
pub mod live_bridge;
pub mod ordering;
pub mod random_access;
#[cfg(test)]
pub(crate) mod test_mocks;
pub mod transform;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use automated_run::{AutomatedRunPlayer, CaptureProgress, CaptureSink, LoggingCaptureSink};
pub use live_bridge::{BridgeConnector, BridgeTransport, LiveBridgePlayer};
pub use ordering::OrderedPlayer;
pub use random_access::{RandomAccessPlayer, SeekTimeResolver};
pub use transform::{
    DiagnosticStage, ProgramStatus, TransformDiagnostic, TransformPrograms, TrustLevel,
    TrustRegistry, UserProgramFault, UserTransformPlayer,
};

use crate::message::{PlayerMessage, Timestamp, TopicInfo};

/// Unique identifier for a composed player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(uuid::Uuid);

impl PlayerId {
    /// Creates a new random player ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state machine.
///
/// `Constructed -> {Playing, Paused, Seeking} -> Closed`. The three middle
/// states form the active region; `Seeking` always returns to whichever of
/// `Playing`/`Paused` requested it. `Closed` is terminal and reachable from
/// every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Built but not yet activated.
    Constructed,
    /// Actively advancing playback time and emitting messages.
    Playing,
    /// Activated but holding playback time still.
    Paused,
    /// Repositioning; resolves back to `Playing` or `Paused`.
    Seeking,
    /// Torn down; all underlying resources released.
    Closed,
}

impl PlaybackState {
    /// Returns true for the active region of the state machine.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Seeking)
    }

    /// Checks whether the machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        match (self, next) {
            // Closing is always allowed and terminal.
            (_, Self::Closed) => true,
            (Self::Closed, _) => false,
            // Activation enters the active region directly.
            (Self::Constructed, Self::Playing | Self::Paused) => true,
            (Self::Constructed, _) => false,
            // Within the active region.
            (Self::Playing, Self::Paused | Self::Seeking) => true,
            (Self::Paused, Self::Playing | Self::Seeking) => true,
            (Self::Seeking, Self::Playing | Self::Paused) => true,
            // Self transitions are no-ops.
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Constructed => "constructed",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Which timestamp determines message emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrderingPolicy {
    /// Emit in arrival/log order, exactly as the source produced them.
    ReceiveTime,
    /// Resequence into non-decreasing embedded-timestamp order.
    HeaderTime,
}

impl Default for MessageOrderingPolicy {
    fn default() -> Self {
        Self::ReceiveTime
    }
}

impl fmt::Display for MessageOrderingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReceiveTime => write!(f, "receive-time"),
            Self::HeaderTime => write!(f, "header-time"),
        }
    }
}

impl std::str::FromStr for MessageOrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "receive-time" | "receive" => Ok(Self::ReceiveTime),
            "header-time" | "header" => Ok(Self::HeaderTime),
            _ => Err(format!(
                "Invalid ordering policy: '{s}'. Valid options are: receive-time, header-time"
            )),
        }
    }
}

/// One emission from a player: playback time plus the messages delivered
/// since the previous frame.
///
/// Pull model - pacing belongs to the caller; each `next_frame` call
/// advances at most one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerFrame {
    /// Playback time this frame represents.
    pub current_time: Timestamp,
    /// Messages delivered in this frame.
    pub messages: Vec<PlayerMessage>,
    /// Transform diagnostics raised while producing this frame.
    pub diagnostics: Vec<TransformDiagnostic>,
}

impl PlayerFrame {
    /// Creates a frame with no diagnostics.
    pub fn new(current_time: Timestamp, messages: Vec<PlayerMessage>) -> Self {
        Self {
            current_time,
            messages,
            diagnostics: Vec::new(),
        }
    }
}

/// Errors that can occur during playback operations.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// A seek was requested against a player that cannot seek.
    #[error("Seek is not supported by the {player} player")]
    Unseekable {
        /// Name of the player that rejected the seek.
        player: &'static str,
    },

    /// The requested state change is not permitted by the state machine.
    #[error("Invalid playback transition: {from} -> {to}")]
    InvalidTransition {
        /// State the player was in.
        from: PlaybackState,
        /// State that was requested.
        to: PlaybackState,
    },

    /// The player has been closed; no further operations are possible.
    #[error("Player is closed")]
    Closed,

    /// A physical source could not be opened or streamed.
    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        /// Identity of the failing source (path or URL).
        source_name: String,
        /// Description of the failure.
        reason: String,
    },

    /// The bridge connection failed.
    #[error("Bridge error: {reason}")]
    Bridge {
        /// Description of the connection failure.
        reason: String,
    },

    /// An inbound frame could not be decoded into a message.
    #[error("Failed to decode message frame: {reason}")]
    Decode {
        /// Description of the decode failure.
        reason: String,
    },

    /// I/O error from an underlying source.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// HTTP error from an underlying source.
    #[error("HTTP error")]
    Http(#[from] reqwest::Error),
}

/// The full player capability set.
///
/// Base players bind directly to a physical or live source; decorators hold
/// an owned inner player and forward every operation they do not augment.
/// Operations a concrete player has no use for (transform programs on a
/// bare base player, publish on a recorded source) are accepted and ignored
/// rather than rejected, so the contract stays uniform across the chain.
#[async_trait]
pub trait Player: Send {
    /// Short static name identifying the player kind, used in logs and
    /// error context.
    fn name(&self) -> &'static str;

    /// Current position in the playback state machine.
    fn playback_state(&self) -> PlaybackState;

    /// Topics currently known to this player, including any topics added
    /// by decorators.
    fn topics(&self) -> Vec<TopicInfo>;

    /// Starts or resumes playback.
    ///
    /// # Errors
    /// - `PlayerError::Closed` - the player was closed
    /// - `PlayerError::InvalidTransition` - not reachable from the current state
    async fn play(&mut self) -> Result<(), PlayerError>;

    /// Pauses playback, holding the current position.
    ///
    /// # Errors
    /// - `PlayerError::Closed` - the player was closed
    /// - `PlayerError::InvalidTransition` - not reachable from the current state
    async fn pause(&mut self) -> Result<(), PlayerError>;

    /// Repositions playback to `target`.
    ///
    /// # Errors
    /// - `PlayerError::Unseekable` - the player cannot seek (live bridge)
    /// - `PlayerError::Closed` - the player was closed
    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError>;

    /// Restricts delivery to the given topics. Players deliver every topic
    /// until the first explicit subscription set arrives.
    ///
    /// # Errors
    /// - `PlayerError::Closed` - the player was closed
    async fn set_subscriptions(&mut self, topics: Vec<String>) -> Result<(), PlayerError>;

    /// Publishes a message upstream. Only connection-backed players have a
    /// destination for publishes; recorded sources accept and drop them.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection rejected the publish
    /// - `PlayerError::Closed` - the player was closed
    async fn publish(
        &mut self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), PlayerError>;

    /// Selects the message-ordering policy. Only the order-correction
    /// decorator acts on this; other players record it and carry on.
    fn set_message_ordering(&mut self, policy: MessageOrderingPolicy);

    /// Replaces the set of user transform programs. Only the user-transform
    /// decorator acts on this; base players ignore it.
    fn set_transform_programs(&mut self, programs: TransformPrograms) {
        tracing::debug!(
            player = self.name(),
            count = programs.len(),
            "Transform programs ignored by this player"
        );
    }

    /// Per-program transform status (diagnostics, logs, trust). Empty for
    /// players without a transform decorator in their chain.
    fn transform_status(&self) -> Vec<ProgramStatus> {
        Vec::new()
    }

    /// Generated typing artifact describing available input topics, when a
    /// transform decorator is present.
    fn interface_artifact(&self) -> Option<String> {
        None
    }

    /// Emits the next frame, or `None` when playback has run to completion
    /// and nothing further will be emitted.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - the underlying source failed
    /// - `PlayerError::Closed` - the player was closed
    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError>;

    /// Closes the player, releasing underlying connections and file
    /// handles. Idempotent; every subsequent operation fails with
    /// `PlayerError::Closed`.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection failed to shut down cleanly
    async fn close(&mut self) -> Result<(), PlayerError>;
}

/// Validates and applies a state transition.
///
/// # Errors
/// - `PlayerError::Closed` - the player is already closed
/// - `PlayerError::InvalidTransition` - the machine forbids the move
pub(crate) fn transition(
    state: &mut PlaybackState,
    next: PlaybackState,
) -> Result<(), PlayerError> {
    if *state == PlaybackState::Closed && next != PlaybackState::Closed {
        return Err(PlayerError::Closed);
    }
    if !state.can_transition_to(next) {
        return Err(PlayerError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    *state = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_reachable_from_every_state() {
        for state in [
            PlaybackState::Constructed,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Seeking,
            PlaybackState::Closed,
        ] {
            assert!(state.can_transition_to(PlaybackState::Closed));
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(!PlaybackState::Closed.can_transition_to(PlaybackState::Playing));
        assert!(!PlaybackState::Closed.can_transition_to(PlaybackState::Paused));
    }

    #[test]
    fn test_seeking_returns_to_requested_state() {
        assert!(PlaybackState::Seeking.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Seeking.can_transition_to(PlaybackState::Paused));
        assert!(!PlaybackState::Seeking.can_transition_to(PlaybackState::Constructed));
    }

    #[test]
    fn test_constructed_cannot_seek_directly() {
        assert!(!PlaybackState::Constructed.can_transition_to(PlaybackState::Seeking));
    }

    #[test]
    fn test_transition_helper_reports_context() {
        let mut state = PlaybackState::Constructed;
        let err = transition(&mut state, PlaybackState::Seeking).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::InvalidTransition {
                from: PlaybackState::Constructed,
                to: PlaybackState::Seeking,
            }
        ));
        assert_eq!(state, PlaybackState::Constructed);

        transition(&mut state, PlaybackState::Paused).expect("activation");
        transition(&mut state, PlaybackState::Closed).expect("closing");
        assert!(matches!(
            transition(&mut state, PlaybackState::Playing),
            Err(PlayerError::Closed)
        ));
    }

    #[test]
    fn test_ordering_policy_parsing() {
        assert_eq!(
            "header-time".parse::<MessageOrderingPolicy>(),
            Ok(MessageOrderingPolicy::HeaderTime)
        );
        assert_eq!(
            "receive".parse::<MessageOrderingPolicy>(),
            Ok(MessageOrderingPolicy::ReceiveTime)
        );
        assert!("chronological".parse::<MessageOrderingPolicy>().is_err());
    }
}
