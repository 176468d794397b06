//! Input-set shapes, gestures, and player replacement through the
//! orchestrator.

use serde_json::json;
use slipstream_core::descriptor::{DescriptorError, SECOND_SOURCE_PREFIX};
use slipstream_core::message::Timestamp;
use slipstream_core::orchestrator::ComposeError;
use slipstream_core::player::PlayerError;
use slipstream_core::source::StaticReaderFactory;
use slipstream_sim::{ScriptedBridgeConnector, ScriptedContentIdResolver, message_frame};
use url::Url;

use super::support::{
    collect_frames, delivered_topics, gps_fixture, spawn_local, spawn_with, test_config,
};

#[tokio::test]
async fn test_empty_input_set_means_no_active_player() {
    let handle = spawn_local(StaticReaderFactory::new());

    handle.clear_inputs().await.expect("clear");
    assert_eq!(handle.current_player().await.expect("query"), None);
    assert!(handle.next_frame().await.expect("frame").is_none());
}

#[tokio::test]
async fn test_single_file_plays_unmodified_topics() {
    let (factory, paths) = gps_fixture(&["a.rec"]);
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert!(summary.description.contains("a.rec"));
    assert_eq!(summary.source_kind, "random-access");

    handle.play().await.expect("play");
    let frames = collect_frames(&handle, 3).await;
    let topics = delivered_topics(&frames);
    assert_eq!(topics.len(), 3);
    assert!(topics.iter().all(|topic| topic == "/gps"));
}

#[tokio::test]
async fn test_two_files_prefix_the_second_source() {
    let (factory, paths) = gps_fixture(&["a.rec", "b.rec"]);
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    let topics = delivered_topics(&frames);
    let prefixed = format!("{SECOND_SOURCE_PREFIX}/gps");
    assert_eq!(topics.iter().filter(|t| *t == "/gps").count(), 3);
    assert_eq!(topics.iter().filter(|t| **t == prefixed).count(), 3);

    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert!(summary.description.contains(SECOND_SOURCE_PREFIX));
}

#[tokio::test]
async fn test_three_files_are_rejected_and_current_player_survives() {
    let (factory, _) = gps_fixture(&["a.rec", "b.rec", "c.rec"]);
    let handle = spawn_local(factory);

    handle
        .set_local_files(vec!["a.rec".into()])
        .await
        .expect("set inputs");
    let before = handle.current_player().await.expect("query");

    let err = handle
        .set_local_files(vec!["a.rec".into(), "b.rec".into(), "c.rec".into()])
        .await
        .expect_err("three files must be rejected");
    assert!(matches!(
        err,
        ComposeError::Descriptor(DescriptorError::UnsupportedInputCount { count: 3 })
    ));

    // The previously active player is unchanged.
    let after = handle.current_player().await.expect("query");
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_add_second_gesture_extends_then_plain_input_replaces() {
    let (factory, _) = gps_fixture(&["a.rec", "b.rec", "c.rec"]);
    let handle = spawn_local(factory);

    handle
        .set_local_files(vec!["a.rec".into()])
        .await
        .expect("first file");
    handle
        .add_second_local_file("b.rec".into())
        .await
        .expect("add second");

    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert!(summary.description.contains("a.rec"));
    assert!(summary.description.contains("b.rec"));

    // A plain new single-file input discards both.
    handle
        .set_local_files(vec!["c.rec".into()])
        .await
        .expect("replace");
    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert!(summary.description.contains("c.rec"));
    assert!(!summary.description.contains("a.rec"));
}

#[tokio::test]
async fn test_missing_source_fails_build_without_activating() {
    let handle = spawn_local(StaticReaderFactory::new());

    let err = handle
        .set_local_files(vec!["nowhere.rec".into()])
        .await
        .expect_err("unregistered file cannot open");
    assert!(matches!(
        err,
        ComposeError::Player(PlayerError::SourceUnavailable { .. })
    ));
    assert_eq!(handle.current_player().await.expect("query"), None);
}

#[tokio::test]
async fn test_bridge_player_is_unseekable_and_streams() {
    let bridge = ScriptedBridgeConnector::new(vec![message_frame(
        "/chat",
        Timestamp::from_secs(5),
        json!({"text": "hello"}),
    )]);
    let handle = spawn_with(
        test_config(),
        StaticReaderFactory::new(),
        ScriptedContentIdResolver::new(),
        bridge,
        None,
    );

    let url = Url::parse("ws://bridge.local:9090").expect("url");
    handle.connect_bridge(url).await.expect("connect");

    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert_eq!(summary.source_kind, "live-bridge");

    let err = handle
        .seek(Timestamp::from_secs(0))
        .await
        .expect_err("bridge cannot seek");
    assert!(matches!(
        err,
        ComposeError::Player(PlayerError::Unseekable { .. })
    ));

    // Playback continues unaffected by the failed seek.
    let frames = collect_frames(&handle, 1).await;
    assert_eq!(delivered_topics(&frames), vec!["/chat".to_string()]);
}

#[tokio::test]
async fn test_replacing_the_bridge_closes_its_connection() {
    let bridge = ScriptedBridgeConnector::default();
    let (factory, paths) = gps_fixture(&["a.rec"]);
    let handle = spawn_with(
        test_config(),
        factory,
        ScriptedContentIdResolver::new(),
        bridge.clone(),
        None,
    );

    let url = Url::parse("ws://bridge.local:9090").expect("url");
    handle.connect_bridge(url).await.expect("connect");
    assert_eq!(bridge.connections(), 1);
    assert_eq!(bridge.closes(), 0);

    // Replacing the input set closes the bridge player's connection.
    handle.set_local_files(paths).await.expect("replace");
    assert_eq!(bridge.closes(), 1);
}

#[tokio::test]
async fn test_rebuilding_same_inputs_swaps_generation() {
    let (factory, paths) = gps_fixture(&["a.rec"]);
    let handle = spawn_local(factory);

    handle
        .set_local_files(paths.clone())
        .await
        .expect("first build");
    let first = handle
        .current_player()
        .await
        .expect("query")
        .expect("active");

    handle.set_local_files(paths).await.expect("second build");
    let second = handle
        .current_player()
        .await
        .expect("query")
        .expect("active");

    // Same description, newer generation.
    assert_eq!(first.description, second.description);
    assert!(second.generation > first.generation);
}
