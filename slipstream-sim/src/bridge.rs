//! Scripted bridge transports.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use slipstream_core::message::Timestamp;
use slipstream_core::player::{BridgeConnector, BridgeTransport, PlayerError};
use url::Url;

/// Encodes one inbound bridge frame in the wire format the live player
/// decodes.
pub fn message_frame(topic: &str, stamp: Timestamp, payload: serde_json::Value) -> Bytes {
    let frame = serde_json::json!({
        "topic": topic,
        "stamp": {"sec": stamp.secs(), "nsec": stamp.subsec_nanos()},
        "payload": payload,
        "datatype": "sim/Bridge",
    });
    Bytes::from(serde_json::to_vec(&frame).expect("frame encodes"))
}

/// Connector handing out transports over a canned frame sequence.
///
/// Every established transport replays the same inbound frames. Outbound
/// sends and close calls are recorded on shared counters so tests can
/// assert on connection lifecycle (for example that replacing a player
/// closed its connection).
#[derive(Clone, Default)]
pub struct ScriptedBridgeConnector {
    frames: Vec<Bytes>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    connections: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedBridgeConnector {
    /// Creates a connector replaying `frames` on every connection.
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    /// Frames sent outbound across all transports, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Number of connections established.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of transports that were closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeConnector for ScriptedBridgeConnector {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn BridgeTransport>, PlayerError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBridgeTransport {
            inbound: self.frames.clone().into(),
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct ScriptedBridgeTransport {
    inbound: VecDeque<Bytes>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BridgeTransport for ScriptedBridgeTransport {
    async fn recv(&mut self) -> Result<Option<Bytes>, PlayerError> {
        Ok(self.inbound.pop_front())
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), PlayerError> {
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector whose connections always fail.
#[derive(Debug, Clone, Default)]
pub struct FailingBridgeConnector;

#[async_trait]
impl BridgeConnector for FailingBridgeConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn BridgeTransport>, PlayerError> {
        Err(PlayerError::Bridge {
            reason: format!("connection refused: {url}"),
        })
    }
}
