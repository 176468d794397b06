//! Command definitions for the orchestrator actor model.

use tokio::sync::oneshot;

use super::compose::{ComposeError, InputGesture, InputSet, PlayerDefinition};
use crate::message::Timestamp;
use crate::player::{MessageOrderingPolicy, PlayerFrame, ProgramStatus, TransformPrograms};

/// Externally visible summary of the active composed player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Human-readable description of the input set.
    pub description: String,
    /// Kind of the base player at the bottom of the decorator chain.
    pub source_kind: &'static str,
    /// Build generation that produced this player.
    pub generation: u64,
    /// When the player became current.
    pub activated_at: chrono::DateTime<chrono::Utc>,
}

/// Commands that can be sent to the orchestrator actor.
///
/// Each command carries a response channel. Message passing keeps all
/// mutable orchestrator state inside the actor, so there is exactly one
/// owner for the current player and no lock ordering to get wrong.
pub enum OrchestratorCommand {
    /// Replace or extend the input set, triggering an asynchronous build.
    SetInputs {
        inputs: InputSet,
        gesture: InputGesture,
        responder: oneshot::Sender<Result<(), ComposeError>>,
    },
    /// Forward a new message-ordering policy to the active player and
    /// remember it for future players.
    SetMessageOrdering {
        policy: MessageOrderingPolicy,
        responder: oneshot::Sender<()>,
    },
    /// Forward a new transform program set to the active player and
    /// remember it for future players.
    SetTransformPrograms {
        programs: TransformPrograms,
        responder: oneshot::Sender<()>,
    },
    /// Start or resume playback on the active player.
    Play {
        responder: oneshot::Sender<Result<(), ComposeError>>,
    },
    /// Pause playback on the active player.
    Pause {
        responder: oneshot::Sender<Result<(), ComposeError>>,
    },
    /// Seek the active player.
    Seek {
        target: Timestamp,
        responder: oneshot::Sender<Result<(), ComposeError>>,
    },
    /// Pull the next frame from the active player; `None` when no player
    /// is active or playback has completed.
    NextFrame {
        responder: oneshot::Sender<Result<Option<PlayerFrame>, ComposeError>>,
    },
    /// Per-program transform status of the active player.
    TransformStatus {
        responder: oneshot::Sender<Vec<ProgramStatus>>,
    },
    /// Generated typing artifact of the active player.
    InterfaceArtifact {
        responder: oneshot::Sender<Option<String>>,
    },
    /// Summary of the active player.
    CurrentPlayer {
        responder: oneshot::Sender<Option<PlayerSummary>>,
    },
    /// Shut the orchestrator down, closing the active player.
    Shutdown { responder: oneshot::Sender<()> },
    /// Internal notification that a spawned build finished.
    BuildCompleted {
        generation: u64,
        result: Result<Option<PlayerDefinition>, ComposeError>,
        responder: oneshot::Sender<Result<(), ComposeError>>,
    },
}
