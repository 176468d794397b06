//! Handle for communicating with the orchestrator actor.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

use super::commands::{OrchestratorCommand, PlayerSummary};
use super::compose::{ComposeError, InputGesture, InputSet};
use crate::message::Timestamp;
use crate::player::{MessageOrderingPolicy, PlayerFrame, ProgramStatus, TransformPrograms};

/// Handle for communicating with the orchestrator actor.
///
/// Provides an ergonomic async API over the orchestrator's command
/// channel. It can be cloned and shared across tasks safely; all cloned
/// handles talk to the same actor and the same current player.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorCommand>,
    summaries: watch::Receiver<Option<PlayerSummary>>,
}

impl OrchestratorHandle {
    /// Creates a new handle from the actor's channels.
    pub(crate) fn new(
        sender: mpsc::Sender<OrchestratorCommand>,
        summaries: watch::Receiver<Option<PlayerSummary>>,
    ) -> Self {
        Self { sender, summaries }
    }

    async fn send(&self, cmd: OrchestratorCommand) -> Result<(), ComposeError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| ComposeError::Shutdown)
    }

    /// Replaces or extends the input set.
    ///
    /// The response arrives once the resulting build has been applied or
    /// rejected; a request superseded by a newer one before its build
    /// completed resolves with `ComposeError::Superseded`.
    ///
    /// # Errors
    /// - `ComposeError::Descriptor` - more than two sources supplied
    /// - `ComposeError::Player` - a source could not be opened
    /// - `ComposeError::Superseded` - a newer input set arrived first
    pub async fn set_inputs(
        &self,
        inputs: InputSet,
        gesture: InputGesture,
    ) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::SetInputs {
            inputs,
            gesture,
            responder,
        })
        .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)?
    }

    /// Replaces the input set with local files.
    ///
    /// # Errors
    /// See [`OrchestratorHandle::set_inputs`].
    pub async fn set_local_files(&self, paths: Vec<PathBuf>) -> Result<(), ComposeError> {
        self.set_inputs(InputSet::LocalFiles(paths), InputGesture::Replace)
            .await
    }

    /// Adds a single local file as the prefixed second source.
    ///
    /// # Errors
    /// See [`OrchestratorHandle::set_inputs`].
    pub async fn add_second_local_file(&self, path: PathBuf) -> Result<(), ComposeError> {
        self.set_inputs(InputSet::LocalFiles(vec![path]), InputGesture::AddSecond)
            .await
    }

    /// Replaces the input set with remote URLs.
    ///
    /// # Errors
    /// See [`OrchestratorHandle::set_inputs`].
    pub async fn set_remote_urls(&self, urls: Vec<Url>) -> Result<(), ComposeError> {
        self.set_inputs(InputSet::RemoteFiles(urls), InputGesture::Replace)
            .await
    }

    /// Connects to a live bridge, replacing the input set.
    ///
    /// # Errors
    /// See [`OrchestratorHandle::set_inputs`].
    pub async fn connect_bridge(&self, url: Url) -> Result<(), ComposeError> {
        self.set_inputs(InputSet::Bridge(url), InputGesture::Replace)
            .await
    }

    /// Clears the input set, closing the active player.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn clear_inputs(&self) -> Result<(), ComposeError> {
        self.set_inputs(InputSet::None, InputGesture::Replace).await
    }

    /// Forwards a message-ordering policy to the active player without
    /// rebuilding it; future players inherit the policy too.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn set_message_ordering(
        &self,
        policy: MessageOrderingPolicy,
    ) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::SetMessageOrdering { policy, responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Forwards a transform program set to the active player; future
    /// players inherit the programs too.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn set_transform_programs(
        &self,
        programs: TransformPrograms,
    ) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::SetTransformPrograms {
            programs,
            responder,
        })
        .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Starts or resumes playback on the active player.
    ///
    /// # Errors
    /// - `ComposeError::Player` - no active player, or the player refused
    pub async fn play(&self) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Play { responder }).await?;
        rx.await.map_err(|_| ComposeError::Shutdown)?
    }

    /// Pauses playback on the active player.
    ///
    /// # Errors
    /// - `ComposeError::Player` - no active player, or the player refused
    pub async fn pause(&self) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Pause { responder }).await?;
        rx.await.map_err(|_| ComposeError::Shutdown)?
    }

    /// Seeks the active player.
    ///
    /// # Errors
    /// - `ComposeError::Player` - no active player, the player cannot
    ///   seek, or the seek failed
    pub async fn seek(&self, target: Timestamp) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Seek { target, responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)?
    }

    /// Pulls the next frame from the active player. `Ok(None)` means no
    /// player is active or playback has run to completion.
    ///
    /// # Errors
    /// - `ComposeError::Player` - the active player failed
    pub async fn next_frame(&self) -> Result<Option<PlayerFrame>, ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::NextFrame { responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)?
    }

    /// Per-program transform status of the active player.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn transform_status(&self) -> Result<Vec<ProgramStatus>, ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::TransformStatus { responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Generated typing artifact of the active player.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn interface_artifact(&self) -> Result<Option<String>, ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::InterfaceArtifact { responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Summary of the active player, if any.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator has shut down
    pub async fn current_player(&self) -> Result<Option<PlayerSummary>, ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::CurrentPlayer { responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Subscribes to published player summaries. The receiver observes
    /// `None` when no player is active.
    pub fn subscribe(&self) -> watch::Receiver<Option<PlayerSummary>> {
        self.summaries.clone()
    }

    /// Shuts the orchestrator down gracefully, closing the active player.
    ///
    /// # Errors
    /// - `ComposeError::Shutdown` - the orchestrator was already gone
    pub async fn shutdown(&self) -> Result<(), ComposeError> {
        let (responder, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Shutdown { responder })
            .await?;
        rx.await.map_err(|_| ComposeError::Shutdown)
    }

    /// Checks if the orchestrator actor is still running.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
