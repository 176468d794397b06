//! User-transform programs through the composed chain.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::json;
use slipstream_core::message::{PlayerMessage, Timestamp, TopicInfo};
use slipstream_core::player::DiagnosticStage;
use slipstream_core::source::StaticReaderFactory;

use super::support::{collect_frames, delivered_topics, spawn_local};

const OK_PROGRAM: &str = r#"{
    "input_topic": "/odom",
    "output_topic": "/transform/speed_kmh",
    "fields": {"kmh": {"path": "vel.x", "scale": 3.6}}
}"#;

/// References a payload path no message carries, so it faults on every
/// message.
const FAULTY_PROGRAM: &str = r#"{
    "input_topic": "/odom",
    "output_topic": "/transform/broken",
    "fields": {"v": {"path": "does.not.exist"}}
}"#;

fn odom_fixture() -> (StaticReaderFactory, Vec<PathBuf>) {
    let path = PathBuf::from("odom.rec");
    let messages = (0..3)
        .map(|secs| {
            PlayerMessage::new(
                "/odom",
                Timestamp::from_secs(secs),
                json!({"vel": {"x": secs as f64}}),
            )
        })
        .collect();
    let factory = StaticReaderFactory::new().with_local(
        &path,
        vec![TopicInfo::new("/odom", "nav/Odometry")],
        messages,
    );
    (factory, vec![path])
}

fn programs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, source)| (name.to_string(), source.to_string()))
        .collect()
}

#[tokio::test]
async fn test_failing_program_never_interrupts_delivery() {
    let (factory, paths) = odom_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    handle
        .set_transform_programs(programs(&[("ok", OK_PROGRAM), ("broken", FAULTY_PROGRAM)]))
        .await
        .expect("set programs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    let topics = delivered_topics(&frames);

    // Every base message arrived, and the healthy program produced output
    // for each of them; the faulting program produced none.
    assert_eq!(topics.iter().filter(|t| *t == "/odom").count(), 3);
    assert_eq!(
        topics.iter().filter(|t| *t == "/transform/speed_kmh").count(),
        3
    );
    assert!(!topics.iter().any(|t| t == "/transform/broken"));

    let statuses = handle.transform_status().await.expect("status");
    let broken = statuses
        .iter()
        .find(|status| status.name == "broken")
        .expect("broken status");
    assert_eq!(broken.diagnostics.len(), 1);
    assert_eq!(broken.diagnostics[0].stage, DiagnosticStage::Runtime);
    let ok = statuses
        .iter()
        .find(|status| status.name == "ok")
        .expect("ok status");
    assert!(ok.diagnostics.is_empty());
}

#[tokio::test]
async fn test_scaled_output_values_are_correct() {
    let (factory, paths) = odom_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    handle
        .set_transform_programs(programs(&[("ok", OK_PROGRAM)]))
        .await
        .expect("set programs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    let derived: Vec<f64> = frames
        .iter()
        .flat_map(|frame| &frame.messages)
        .filter(|m| m.topic == "/transform/speed_kmh")
        .map(|m| m.payload["kmh"].as_f64().expect("numeric"))
        .collect();
    assert_eq!(derived, vec![0.0, 3.6, 7.2]);
}

#[tokio::test]
async fn test_programs_carry_over_to_new_players() {
    let (factory, paths) = odom_fixture();
    let handle = spawn_local(factory);

    // Programs supplied while nothing is active yet.
    handle
        .set_transform_programs(programs(&[("ok", OK_PROGRAM)]))
        .await
        .expect("set programs");

    handle.set_local_files(paths).await.expect("set inputs");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 3).await;
    assert!(
        delivered_topics(&frames)
            .iter()
            .any(|t| t == "/transform/speed_kmh")
    );
}

#[tokio::test]
async fn test_interface_artifact_describes_inputs() {
    let (factory, paths) = odom_fixture();
    let handle = spawn_local(factory);

    handle.set_local_files(paths).await.expect("set inputs");
    let artifact = handle
        .interface_artifact()
        .await
        .expect("query")
        .expect("artifact present");
    assert!(artifact.contains("input \"/odom\": nav/Odometry"));
}
