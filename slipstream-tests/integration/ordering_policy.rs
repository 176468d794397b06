//! Message-ordering policy behavior through the composed chain.

use std::path::PathBuf;

use serde_json::json;
use slipstream_core::message::{PlayerMessage, Timestamp, TopicInfo};
use slipstream_core::player::{MessageOrderingPolicy, PlayerFrame};
use slipstream_core::source::StaticReaderFactory;

use super::support::{collect_frames, spawn_local};

/// One file whose messages arrive in log order 10, 11, 12 but carry
/// embedded stamps 5, 1, 3.
fn stamped_fixture() -> (StaticReaderFactory, Vec<PathBuf>) {
    let path = PathBuf::from("stamped.rec");
    let messages = [(10, 5), (11, 1), (12, 3)]
        .into_iter()
        .map(|(receive, stamp)| {
            PlayerMessage::new(
                "/imu",
                Timestamp::from_secs(receive),
                json!({"header": {"stamp": {"sec": stamp, "nsec": 0}}, "arrival": receive}),
            )
        })
        .collect();
    let factory = StaticReaderFactory::new().with_local(
        &path,
        vec![TopicInfo::new("/imu", "sensors/Imu")],
        messages,
    );
    (factory, vec![path])
}

fn stamps(frames: &[PlayerFrame]) -> Vec<i64> {
    frames
        .iter()
        .flat_map(|frame| frame.messages.iter().map(|m| m.ordering_key().secs()))
        .collect()
}

#[tokio::test]
async fn test_header_time_policy_emits_non_decreasing_stamps() {
    let (factory, paths) = stamped_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    handle
        .set_message_ordering(MessageOrderingPolicy::HeaderTime)
        .await
        .expect("set policy");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    assert_eq!(stamps(&frames), vec![1, 3, 5]);
}

#[tokio::test]
async fn test_arrival_order_policy_is_pass_through() {
    let (factory, paths) = stamped_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    assert_eq!(stamps(&frames), vec![5, 1, 3]);
}

#[tokio::test]
async fn test_policy_change_does_not_rebuild_the_player() {
    let (factory, paths) = stamped_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    let before = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");

    handle
        .set_message_ordering(MessageOrderingPolicy::HeaderTime)
        .await
        .expect("set policy");

    let after = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert_eq!(before.generation, after.generation);
}

#[tokio::test]
async fn test_requested_policy_carries_over_to_new_players() {
    let (factory, paths) = stamped_fixture();
    let handle = spawn_local(factory);

    // Policy requested while nothing is active yet.
    handle
        .set_message_ordering(MessageOrderingPolicy::HeaderTime)
        .await
        .expect("set policy");

    handle.set_local_files(paths).await.expect("set inputs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    assert_eq!(stamps(&frames), vec![1, 3, 5]);
}
