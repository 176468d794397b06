//! Deterministic headless capture runs.

use std::sync::Arc;
use std::time::Duration;

use slipstream_core::config::SlipstreamConfig;
use slipstream_core::mode::SessionMode;
use slipstream_core::orchestrator::OrchestratorHandle;
use slipstream_core::player::PlayerFrame;
use slipstream_sim::{
    CollectingCaptureSink, ScriptedBridgeConnector, ScriptedContentIdResolver,
    SyntheticReaderFactory, SyntheticSourceConfig,
};

use super::support::spawn_with;

fn capture_config() -> SlipstreamConfig {
    let mut config = SlipstreamConfig::default();
    config.mode = SessionMode::Automated;
    config.capture.frame_duration = Duration::from_millis(500);
    config
}

fn synthetic_factory(seed: u64) -> SyntheticReaderFactory {
    SyntheticReaderFactory::new(SyntheticSourceConfig {
        seed,
        message_count: 20,
        interval: Duration::from_millis(100),
        ..SyntheticSourceConfig::default()
    })
}

fn spawn_capture(seed: u64) -> (OrchestratorHandle, CollectingCaptureSink) {
    let sink = CollectingCaptureSink::new();
    let handle = spawn_with(
        capture_config(),
        synthetic_factory(seed),
        ScriptedContentIdResolver::new(),
        ScriptedBridgeConnector::default(),
        Some(Arc::new(sink.clone())),
    );
    (handle, sink)
}

async fn run_capture(handle: &OrchestratorHandle) -> Vec<PlayerFrame> {
    handle
        .set_local_files(vec!["capture.rec".into()])
        .await
        .expect("set inputs");

    let mut frames = Vec::new();
    for _ in 0..100 {
        match handle.next_frame().await.expect("next_frame") {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }
    frames
}

#[tokio::test]
async fn test_automated_mode_selects_the_capture_player() {
    let (handle, _sink) = spawn_capture(42);
    handle
        .set_local_files(vec!["capture.rec".into()])
        .await
        .expect("set inputs");

    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert_eq!(summary.source_kind, "automated-run");
    assert!(summary.description.starts_with("Automated capture"));
}

#[tokio::test]
async fn test_capture_run_reports_monotonic_progress_to_completion() {
    let (handle, sink) = spawn_capture(42);
    let frames = run_capture(&handle).await;

    let delivered: usize = frames.iter().map(|frame| frame.messages.len()).sum();
    assert_eq!(delivered, 20);

    let progress = sink.progress();
    assert!(!progress.is_empty());
    assert!(
        progress
            .windows(2)
            .all(|pair| pair[0].fraction_complete <= pair[1].fraction_complete)
    );
    assert_eq!(progress.last().expect("progress").fraction_complete, 1.0);
    assert_eq!(sink.completions(), vec![(progress.len() as u64, 20)]);
}

#[tokio::test]
async fn test_same_seed_produces_identical_captures() {
    let (first_handle, first_sink) = spawn_capture(7);
    let (second_handle, second_sink) = spawn_capture(7);

    let first_frames = run_capture(&first_handle).await;
    let second_frames = run_capture(&second_handle).await;

    assert_eq!(first_frames, second_frames);
    assert_eq!(first_sink.progress(), second_sink.progress());
}

#[tokio::test]
async fn test_different_seeds_produce_different_captures() {
    let (first_handle, _) = spawn_capture(1);
    let (second_handle, _) = spawn_capture(2);

    let first_frames = run_capture(&first_handle).await;
    let second_frames = run_capture(&second_handle).await;
    assert_ne!(first_frames, second_frames);
}
