//! Unseekable playback over a live transport-bridge connection.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame, PlayerId, transition,
};
use crate::message::{PlayerMessage, Timestamp, TopicInfo};

/// A single persistent bridge connection.
///
/// The wire protocol behind the transport is an external concern; this
/// core only requires framed byte payloads in both directions.
#[async_trait]
pub trait BridgeTransport: Send {
    /// Receives the next inbound frame, or `None` once the connection has
    /// closed.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection failed
    async fn recv(&mut self) -> Result<Option<Bytes>, PlayerError>;

    /// Sends an outbound frame.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection failed or rejected the frame
    async fn send(&mut self, frame: Bytes) -> Result<(), PlayerError>;

    /// Shuts the connection down.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection failed to close cleanly
    async fn close(&mut self) -> Result<(), PlayerError>;
}

/// Establishes bridge connections for live-connection inputs.
#[async_trait]
pub trait BridgeConnector: Send + Sync {
    /// Opens a transport to the bridge at `url`.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection could not be established
    async fn connect(&self, url: &url::Url) -> Result<Box<dyn BridgeTransport>, PlayerError>;
}

/// Wire representation of a timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct WireTime {
    sec: i64,
    nsec: u32,
}

/// Inbound bridge frame carrying one message.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    topic: String,
    stamp: WireTime,
    payload: serde_json::Value,
    #[serde(default)]
    datatype: Option<String>,
}

/// Outbound control/publish frame.
#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topics: Option<&'a [String]>,
}

/// Socket-backed player over a single persistent bridge connection.
///
/// A live connection is playing as soon as it is established. It is
/// inherently unseekable; seek requests fail with
/// [`PlayerError::Unseekable`] and playback continues unaffected. While
/// paused the player stops reading, leaving flow control to the transport.
pub struct LiveBridgePlayer {
    id: PlayerId,
    transport: Option<Box<dyn BridgeTransport>>,
    state: PlaybackState,
    current_time: Timestamp,
    topics: Vec<TopicInfo>,
    seen_topics: HashSet<String>,
    subscriptions: Option<HashSet<String>>,
}

impl LiveBridgePlayer {
    /// Connects to the bridge at `url` and starts playing.
    ///
    /// # Errors
    /// - `PlayerError::Bridge` - the connection could not be established
    pub async fn connect(
        url: &url::Url,
        connector: &dyn BridgeConnector,
    ) -> Result<Self, PlayerError> {
        let transport = connector.connect(url).await?;
        let mut state = PlaybackState::Constructed;
        transition(&mut state, PlaybackState::Playing)?;
        info!(%url, "Live bridge connected");
        Ok(Self {
            id: PlayerId::new(),
            transport: Some(transport),
            state,
            current_time: Timestamp::default(),
            topics: Vec::new(),
            seen_topics: HashSet::new(),
            subscriptions: None,
        })
    }

    fn note_topic(&mut self, name: &str, datatype: Option<&str>) {
        if self.seen_topics.insert(name.to_string()) {
            self.topics.push(TopicInfo::new(
                name,
                datatype.unwrap_or("unknown"),
            ));
        }
    }

    fn subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .as_ref()
            .map_or(true, |topics| topics.contains(topic))
    }
}

#[async_trait]
impl Player for LiveBridgePlayer {
    fn name(&self) -> &'static str {
        "live-bridge"
    }

    fn playback_state(&self) -> PlaybackState {
        self.state
    }

    fn topics(&self) -> Vec<TopicInfo> {
        self.topics.clone()
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        transition(&mut self.state, PlaybackState::Playing)
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        transition(&mut self.state, PlaybackState::Paused)
    }

    async fn seek(&mut self, _target: Timestamp) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Closed {
            return Err(PlayerError::Closed);
        }
        Err(PlayerError::Unseekable {
            player: self.name(),
        })
    }

    async fn set_subscriptions(&mut self, topics: Vec<String>) -> Result<(), PlayerError> {
        let transport = self.transport.as_mut().ok_or(PlayerError::Closed)?;
        let frame = OutboundFrame {
            op: "subscribe",
            topic: None,
            payload: None,
            topics: Some(&topics),
        };
        let encoded = serde_json::to_vec(&frame).map_err(|e| PlayerError::Decode {
            reason: e.to_string(),
        })?;
        transport.send(Bytes::from(encoded)).await?;
        self.subscriptions = Some(topics.into_iter().collect());
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), PlayerError> {
        let transport = self.transport.as_mut().ok_or(PlayerError::Closed)?;
        let frame = OutboundFrame {
            op: "publish",
            topic: Some(topic),
            payload: Some(&payload),
            topics: None,
        };
        let encoded = serde_json::to_vec(&frame).map_err(|e| PlayerError::Decode {
            reason: e.to_string(),
        })?;
        transport.send(Bytes::from(encoded)).await
    }

    fn set_message_ordering(&mut self, policy: MessageOrderingPolicy) {
        debug!(player_id = %self.id, %policy, "Ordering policy noted; no resequencing at the source");
    }

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        match self.state {
            PlaybackState::Closed => return Err(PlayerError::Closed),
            PlaybackState::Playing => {}
            // Not reading while paused leaves flow control to the transport.
            _ => return Ok(Some(PlayerFrame::new(self.current_time, Vec::new()))),
        }

        let transport = self.transport.as_mut().ok_or(PlayerError::Closed)?;
        let Some(raw) = transport.recv().await? else {
            info!(player_id = %self.id, "Bridge connection closed by remote");
            self.transport = None;
            transition(&mut self.state, PlaybackState::Closed)?;
            return Ok(None);
        };

        let frame: InboundFrame = match serde_json::from_slice(&raw) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(player_id = %self.id, %error, "Dropping undecodable bridge frame");
                return Ok(Some(PlayerFrame::new(self.current_time, Vec::new())));
            }
        };

        let receive_time = Timestamp::new(frame.stamp.sec, frame.stamp.nsec);
        self.current_time = self.current_time.max(receive_time);
        self.note_topic(&frame.topic, frame.datatype.as_deref());

        let messages = if self.subscribed(&frame.topic) {
            vec![PlayerMessage::new(frame.topic, receive_time, frame.payload)]
        } else {
            Vec::new()
        };

        Ok(Some(PlayerFrame::new(self.current_time, messages)))
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
        }
        transition(&mut self.state, PlaybackState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::json;

    use super::*;

    /// Transport over canned inbound frames, recording outbound sends into
    /// a log the test keeps a handle to.
    struct ScriptedTransport {
        inbound: VecDeque<Bytes>,
        sent: std::sync::Arc<parking_lot::Mutex<Vec<Bytes>>>,
    }

    #[async_trait]
    impl BridgeTransport for ScriptedTransport {
        async fn recv(&mut self) -> Result<Option<Bytes>, PlayerError> {
            Ok(self.inbound.pop_front())
        }

        async fn send(&mut self, frame: Bytes) -> Result<(), PlayerError> {
            self.sent.lock().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), PlayerError> {
            Ok(())
        }
    }

    fn inbound_frame(topic: &str, sec: i64, payload: serde_json::Value) -> Bytes {
        Bytes::from(
            serde_json::to_vec(&json!({
                "topic": topic,
                "stamp": {"sec": sec, "nsec": 0},
                "payload": payload,
                "datatype": "test/Msg",
            }))
            .expect("encode"),
        )
    }

    fn player_over(
        frames: Vec<Bytes>,
    ) -> (
        LiveBridgePlayer,
        std::sync::Arc<parking_lot::Mutex<Vec<Bytes>>>,
    ) {
        let sent = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let player = LiveBridgePlayer {
            id: PlayerId::new(),
            transport: Some(Box::new(ScriptedTransport {
                inbound: frames.into(),
                sent: std::sync::Arc::clone(&sent),
            })),
            state: PlaybackState::Playing,
            current_time: Timestamp::default(),
            topics: Vec::new(),
            seen_topics: HashSet::new(),
            subscriptions: None,
        };
        (player, sent)
    }

    #[tokio::test]
    async fn test_inbound_frames_become_messages() {
        let (mut player, _sent) = player_over(vec![inbound_frame("/chat", 7, json!({"text": "hi"}))]);

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages.len(), 1);
        assert_eq!(frame.messages[0].topic, "/chat");
        assert_eq!(frame.current_time, Timestamp::from_secs(7));
        assert_eq!(player.topics()[0].datatype, "test/Msg");
    }

    #[tokio::test]
    async fn test_seek_is_unseekable_and_playback_continues() {
        let (mut player, _sent) = player_over(vec![inbound_frame("/chat", 1, json!({}))]);

        let err = player.seek(Timestamp::from_secs(0)).await.unwrap_err();
        assert!(matches!(
            err,
            PlayerError::Unseekable {
                player: "live-bridge"
            }
        ));
        assert_eq!(player.playback_state(), PlaybackState::Playing);

        // The stream is unaffected by the failed seek.
        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_dropped_not_fatal() {
        let (mut player, _sent) = player_over(vec![
            Bytes::from_static(b"not json"),
            inbound_frame("/chat", 2, json!({})),
        ]);

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert!(frame.messages.is_empty());
        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_close_completes_playback() {
        let (mut player, _sent) = player_over(Vec::new());
        assert!(player.next_frame().await.expect("frame").is_none());
        assert_eq!(player.playback_state(), PlaybackState::Closed);
    }

    #[tokio::test]
    async fn test_paused_player_does_not_read() {
        let (mut player, _sent) = player_over(vec![inbound_frame("/chat", 1, json!({}))]);
        player.pause().await.expect("pause");

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert!(frame.messages.is_empty());

        player.play().await.expect("play");
        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_is_sent_over_transport() {
        let (mut player, sent) = player_over(Vec::new());
        player
            .publish("/cmd", json!({"go": true}))
            .await
            .expect("publish");

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        let decoded: serde_json::Value = serde_json::from_slice(&sent[0]).expect("decode");
        assert_eq!(decoded["op"], "publish");
        assert_eq!(decoded["topic"], "/cmd");
    }
}
