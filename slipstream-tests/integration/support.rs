//! Shared fixtures for orchestrator integration tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use slipstream_core::config::{PlaybackConfig, SlipstreamConfig};
use slipstream_core::descriptor::ContentIdResolver;
use slipstream_core::message::{PlayerMessage, Timestamp, TopicInfo};
use slipstream_core::orchestrator::{
    CaptureSinkProvider, ComposeDeps, OrchestratorHandle, spawn_orchestrator,
};
use slipstream_core::player::{BridgeConnector, PlayerFrame, TrustRegistry};
use slipstream_core::source::{ReaderFactory, StaticReaderFactory};
use slipstream_sim::ScriptedContentIdResolver;

/// Config whose frame interval covers an entire short fixture log, so one
/// frame pull delivers everything.
pub fn test_config() -> SlipstreamConfig {
    SlipstreamConfig {
        playback: PlaybackConfig {
            frame_interval: Duration::from_secs(60),
            ordering_lookahead: Duration::from_secs(1),
        },
        ..SlipstreamConfig::default()
    }
}

/// Registers each named file with a `/gps` topic and three messages.
pub fn gps_fixture(files: &[&str]) -> (StaticReaderFactory, Vec<PathBuf>) {
    let mut factory = StaticReaderFactory::new();
    let mut paths = Vec::new();
    for name in files {
        let path = PathBuf::from(name);
        factory = factory.with_local(
            &path,
            vec![TopicInfo::new("/gps", "nav/Fix")],
            (0..3)
                .map(|secs| {
                    PlayerMessage::new("/gps", Timestamp::from_secs(secs), json!({"seq": secs}))
                })
                .collect(),
        );
        paths.push(path);
    }
    (factory, paths)
}

/// Spawns an orchestrator over the given collaborators.
pub fn spawn_with(
    config: SlipstreamConfig,
    factory: impl ReaderFactory + 'static,
    resolver: impl ContentIdResolver + 'static,
    bridge: impl BridgeConnector + 'static,
    capture_sinks: Option<Arc<dyn CaptureSinkProvider>>,
) -> OrchestratorHandle {
    spawn_orchestrator(
        config,
        ComposeDeps {
            reader_factory: Arc::new(factory),
            bridge_connector: Arc::new(bridge),
            content_resolver: Arc::new(resolver),
            seek_resolver: None,
            capture_sinks,
            trust_registry: TrustRegistry::new(),
        },
    )
}

/// Spawns an orchestrator over a local-file fixture with default
/// collaborators everywhere else.
pub fn spawn_local(factory: StaticReaderFactory) -> OrchestratorHandle {
    spawn_with(
        test_config(),
        factory,
        ScriptedContentIdResolver::new(),
        slipstream_sim::ScriptedBridgeConnector::default(),
        None,
    )
}

/// Pulls up to `max` frames, stopping early when playback completes.
pub async fn collect_frames(handle: &OrchestratorHandle, max: usize) -> Vec<PlayerFrame> {
    let mut frames = Vec::new();
    for _ in 0..max {
        match handle.next_frame().await.expect("next_frame") {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }
    frames
}

/// Flattens the topics of every delivered message, in delivery order.
pub fn delivered_topics(frames: &[PlayerFrame]) -> Vec<String> {
    frames
        .iter()
        .flat_map(|frame| frame.messages.iter().map(|message| message.topic.clone()))
        .collect()
}
