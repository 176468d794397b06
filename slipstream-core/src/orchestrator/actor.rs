//! Actor implementation for the composition orchestrator.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::commands::{OrchestratorCommand, PlayerSummary};
use super::compose::{
    ComposeDeps, ComposeError, InputGesture, InputSet, PlayerDefinition, compose_player,
    effective_inputs,
};
use super::handle::OrchestratorHandle;
use crate::config::SlipstreamConfig;
use crate::player::{MessageOrderingPolicy, Player, PlayerError, TransformPrograms};

/// Spawns the orchestrator actor and returns its handle.
///
/// The actor owns the single current composed player and processes
/// commands sequentially; input-set builds run as separate tasks so a slow
/// remote resolution never blocks the command stream, and their results
/// come back through an internal channel stamped with the generation that
/// started them.
pub fn spawn_orchestrator(config: SlipstreamConfig, deps: ComposeDeps) -> OrchestratorHandle {
    let (sender, receiver) = mpsc::channel(100);
    let (internal_sender, internal_receiver) = mpsc::unbounded_channel();
    let (summary_sender, summary_receiver) = watch::channel(None);

    let orchestrator = Orchestrator {
        config,
        deps: Arc::new(deps),
        internal: internal_sender,
        summaries: summary_sender,
        current: None,
        inputs: InputSet::None,
        generation: 0,
        ordering_policy: MessageOrderingPolicy::default(),
        programs: TransformPrograms::new(),
    };

    tokio::spawn(async move {
        run_actor_loop(orchestrator, receiver, internal_receiver).await;
    });

    OrchestratorHandle::new(sender, summary_receiver)
}

/// The active composed player together with what produced it.
struct ActivePlayer {
    player: Box<dyn Player>,
    summary: PlayerSummary,
    inputs: InputSet,
}

/// Actor state: the single owner of the current player.
struct Orchestrator {
    config: SlipstreamConfig,
    deps: Arc<ComposeDeps>,
    internal: mpsc::UnboundedSender<OrchestratorCommand>,
    summaries: watch::Sender<Option<PlayerSummary>>,
    current: Option<ActivePlayer>,
    /// Input set of the most recently started build (reverted to the
    /// active player's inputs when a build fails).
    inputs: InputSet,
    /// Monotonically increasing build generation; results from older
    /// generations are discarded, so the last request always wins.
    generation: u64,
    ordering_policy: MessageOrderingPolicy,
    programs: TransformPrograms,
}

/// Runs the main actor message processing loop.
///
/// Commands and internal build completions are processed one at a time in
/// arrival order, which keeps the replace-and-close protocol for the
/// current player free of races. The loop continues until the command
/// channel closes or a shutdown command arrives.
async fn run_actor_loop(
    mut orchestrator: Orchestrator,
    mut receiver: mpsc::Receiver<OrchestratorCommand>,
    mut internal_receiver: mpsc::UnboundedReceiver<OrchestratorCommand>,
) {
    debug!("Orchestrator actor started");

    loop {
        tokio::select! {
            Some(command) = receiver.recv() => {
                if !orchestrator.handle_command(command).await {
                    break;
                }
            }
            Some(command) = internal_receiver.recv() => {
                if !orchestrator.handle_command(command).await {
                    break;
                }
            }
            else => break,
        }
    }

    orchestrator.close_current().await;
    debug!("Orchestrator actor stopped");
}

impl Orchestrator {
    /// Handles a single command.
    /// Returns true to continue processing, false to shut down.
    async fn handle_command(&mut self, command: OrchestratorCommand) -> bool {
        match command {
            OrchestratorCommand::SetInputs {
                inputs,
                gesture,
                responder,
            } => {
                self.start_build(inputs, gesture, responder);
            }

            OrchestratorCommand::BuildCompleted {
                generation,
                result,
                responder,
            } => {
                self.finish_build(generation, result, responder).await;
            }

            OrchestratorCommand::SetMessageOrdering { policy, responder } => {
                self.ordering_policy = policy;
                if let Some(active) = &mut self.current {
                    active.player.set_message_ordering(policy);
                }
                let _ = responder.send(());
            }

            OrchestratorCommand::SetTransformPrograms {
                programs,
                responder,
            } => {
                self.programs = programs.clone();
                if let Some(active) = &mut self.current {
                    active.player.set_transform_programs(programs);
                }
                let _ = responder.send(());
            }

            OrchestratorCommand::Play { responder } => {
                let result = match &mut self.current {
                    Some(active) => active.player.play().await.map_err(ComposeError::from),
                    None => Err(ComposeError::Player(PlayerError::Closed)),
                };
                let _ = responder.send(result);
            }

            OrchestratorCommand::Pause { responder } => {
                let result = match &mut self.current {
                    Some(active) => active.player.pause().await.map_err(ComposeError::from),
                    None => Err(ComposeError::Player(PlayerError::Closed)),
                };
                let _ = responder.send(result);
            }

            OrchestratorCommand::Seek { target, responder } => {
                let result = match &mut self.current {
                    Some(active) => active.player.seek(target).await.map_err(ComposeError::from),
                    None => Err(ComposeError::Player(PlayerError::Closed)),
                };
                let _ = responder.send(result);
            }

            OrchestratorCommand::NextFrame { responder } => {
                let result = match &mut self.current {
                    Some(active) => active
                        .player
                        .next_frame()
                        .await
                        .map_err(ComposeError::from),
                    None => Ok(None),
                };
                let _ = responder.send(result);
            }

            OrchestratorCommand::TransformStatus { responder } => {
                let status = self
                    .current
                    .as_ref()
                    .map(|active| active.player.transform_status())
                    .unwrap_or_default();
                let _ = responder.send(status);
            }

            OrchestratorCommand::InterfaceArtifact { responder } => {
                let artifact = self
                    .current
                    .as_ref()
                    .and_then(|active| active.player.interface_artifact());
                let _ = responder.send(artifact);
            }

            OrchestratorCommand::CurrentPlayer { responder } => {
                let summary = self.current.as_ref().map(|active| active.summary.clone());
                let _ = responder.send(summary);
            }

            OrchestratorCommand::Shutdown { responder } => {
                self.close_current().await;
                let _ = self.summaries.send(None);
                let _ = responder.send(());
                return false;
            }
        }

        true
    }

    /// Starts an asynchronous build for a new input set.
    fn start_build(
        &mut self,
        inputs: InputSet,
        gesture: InputGesture,
        responder: oneshot::Sender<Result<(), ComposeError>>,
    ) {
        let effective = effective_inputs(&self.inputs, inputs, gesture);
        self.inputs = effective.clone();
        self.generation += 1;
        let generation = self.generation;
        debug!(generation, inputs = ?effective, "Starting input-set build");

        let config = self.config.clone();
        let deps = Arc::clone(&self.deps);
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = compose_player(&effective, &config, &deps).await;
            let _ = internal.send(OrchestratorCommand::BuildCompleted {
                generation,
                result,
                responder,
            });
        });
    }

    /// Applies a finished build, discarding it if a newer request has
    /// superseded it.
    async fn finish_build(
        &mut self,
        generation: u64,
        result: Result<Option<PlayerDefinition>, ComposeError>,
        responder: oneshot::Sender<Result<(), ComposeError>>,
    ) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale build result"
            );
            if let Ok(Some(mut definition)) = result {
                if let Err(error) = definition.player.close().await {
                    warn!(%error, "Failed to close superseded player");
                }
            }
            let _ = responder.send(Err(ComposeError::Superseded));
            return;
        }

        match result {
            Ok(Some(mut definition)) => {
                // Close the old player before the new one becomes visible:
                // no two active players may hold the same live resource.
                self.close_current().await;

                definition.player.set_message_ordering(self.ordering_policy);
                if !self.programs.is_empty() {
                    definition
                        .player
                        .set_transform_programs(self.programs.clone());
                }

                let summary = PlayerSummary {
                    description: definition.description,
                    source_kind: definition.source_kind,
                    generation,
                    activated_at: chrono::Utc::now(),
                };
                info!(
                    generation,
                    kind = summary.source_kind,
                    description = %summary.description,
                    "Activated composed player"
                );
                let _ = self.summaries.send(Some(summary.clone()));
                self.current = Some(ActivePlayer {
                    player: definition.player,
                    summary,
                    inputs: self.inputs.clone(),
                });
                let _ = responder.send(Ok(()));
            }
            Ok(None) => {
                self.close_current().await;
                let _ = self.summaries.send(None);
                let _ = responder.send(Ok(()));
            }
            Err(error) => {
                warn!(%error, "Input-set build failed; keeping current player");
                // The failed set was never applied; fall back to the
                // inputs of whatever is still active.
                self.inputs = self
                    .current
                    .as_ref()
                    .map(|active| active.inputs.clone())
                    .unwrap_or_default();
                let _ = responder.send(Err(error));
            }
        }
    }

    /// Closes and drops the current player, if any.
    async fn close_current(&mut self) {
        if let Some(mut active) = self.current.take() {
            if let Err(error) = active.player.close().await {
                warn!(%error, "Failed to close replaced player");
            }
        }
    }
}
