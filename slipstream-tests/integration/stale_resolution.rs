//! Concurrent remote resolution and last-request-wins player activation.

use std::time::Duration;

use serde_json::json;
use slipstream_core::message::{PlayerMessage, Timestamp, TopicInfo};
use slipstream_core::orchestrator::ComposeError;
use slipstream_core::source::StaticReaderFactory;
use slipstream_sim::{ScriptedBridgeConnector, ScriptedContentIdResolver};
use url::Url;

use super::support::{collect_frames, delivered_topics, spawn_with, test_config};

fn remote_fixture(urls: &[&Url]) -> StaticReaderFactory {
    let mut factory = StaticReaderFactory::new();
    for url in urls {
        factory = factory.with_remote(
            (*url).clone(),
            vec![TopicInfo::new("/gps", "nav/Fix")],
            vec![PlayerMessage::new(
                "/gps",
                Timestamp::from_secs(0),
                json!({"seq": 0}),
            )],
        );
    }
    factory
}

#[tokio::test]
async fn test_stale_resolution_is_discarded_for_the_newer_request() {
    let slow = Url::parse("https://data.example.com/r1.rec").expect("url");
    let fast = Url::parse("https://data.example.com/r2.rec").expect("url");

    let resolver =
        ScriptedContentIdResolver::new().with_delay(&slow, Duration::from_millis(250));
    let handle = spawn_with(
        test_config(),
        remote_fixture(&[&slow, &fast]),
        resolver,
        ScriptedBridgeConnector::default(),
        None,
    );

    // Start the slow request, then supersede it while it is resolving.
    let slow_handle = handle.clone();
    let slow_url = slow.clone();
    let slow_task =
        tokio::spawn(async move { slow_handle.set_remote_urls(vec![slow_url]).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle
        .set_remote_urls(vec![fast.clone()])
        .await
        .expect("newer request builds");

    // The superseded request resolves eventually, but its result is
    // discarded rather than applied.
    let stale_result = slow_task.await.expect("task join");
    assert!(matches!(stale_result, Err(ComposeError::Superseded)));

    let summary = handle
        .current_player()
        .await
        .expect("query")
        .expect("active player");
    assert!(summary.description.contains("r2.rec"));
    assert!(!summary.description.contains("r1.rec"));
}

#[tokio::test]
async fn test_failed_resolution_degrades_but_source_still_plays() {
    let url = Url::parse("https://data.example.com/unverified.rec").expect("url");
    let resolver = ScriptedContentIdResolver::new().with_failure(&url);
    let handle = spawn_with(
        test_config(),
        remote_fixture(&[&url]),
        resolver,
        ScriptedBridgeConnector::default(),
        None,
    );

    handle
        .set_remote_urls(vec![url.clone()])
        .await
        .expect("degraded resolution is not fatal");
    handle.play().await.expect("play");

    let frames = collect_frames(&handle, 2).await;
    assert_eq!(delivered_topics(&frames), vec!["/gps".to_string()]);
}

#[tokio::test]
async fn test_both_remote_sources_resolve_concurrently_before_building() {
    let first = Url::parse("https://data.example.com/a.rec").expect("url");
    let second = Url::parse("https://data.example.com/b.rec").expect("url");

    // Both carry the same delay; resolutions running concurrently finish
    // in roughly one delay rather than two.
    let resolver = ScriptedContentIdResolver::new()
        .with_delay(&first, Duration::from_millis(100))
        .with_delay(&second, Duration::from_millis(100));
    let handle = spawn_with(
        test_config(),
        remote_fixture(&[&first, &second]),
        resolver,
        ScriptedBridgeConnector::default(),
        None,
    );

    let started = std::time::Instant::now();
    handle
        .set_remote_urls(vec![first, second])
        .await
        .expect("two-source build");
    assert!(started.elapsed() < Duration::from_millis(190));
}
