//! Order-correction decorator.
//!
//! Recorded sources emit messages in log order, which for multi-node
//! systems is not the order the data was produced in. This decorator
//! resequences the (possibly transform-expanded) stream into non-decreasing
//! embedded-timestamp order by buffering a bounded look-ahead window, while
//! forwarding every other player operation to the wrapped player unchanged.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{
    MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame, ProgramStatus,
    TransformPrograms,
};
use crate::config::PlaybackConfig;
use crate::message::{PlayerMessage, Timestamp, TopicInfo};

/// Heap entry ordered by `(key, seq)` so equal keys keep arrival order.
struct Buffered {
    key: Timestamp,
    seq: u64,
    message: PlayerMessage,
}

impl PartialEq for Buffered {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for Buffered {}

impl PartialOrd for Buffered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Buffered {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the smallest key first.
        (other.key, other.seq).cmp(&(self.key, self.seq))
    }
}

/// Decorator resequencing messages by the current ordering policy.
///
/// Under [`MessageOrderingPolicy::HeaderTime`], messages are held back
/// until playback time has advanced past their ordering key by the
/// configured look-ahead window, and the frame's reported time is shifted
/// back by the same window; emission order is non-decreasing in the key.
/// Under [`MessageOrderingPolicy::ReceiveTime`] the decorator is a
/// pass-through. Policy changes take effect for messages emitted after the
/// change; the look-ahead buffer is flushed in key order at the switch, so
/// nothing is lost and nothing already delivered is reordered.
pub struct OrderedPlayer {
    inner: Box<dyn Player>,
    policy: MessageOrderingPolicy,
    lookahead: Duration,
    buffer: BinaryHeap<Buffered>,
    /// Messages flushed by a policy switch, delivered ahead of the next
    /// frame's own messages.
    pending_flush: Vec<PlayerMessage>,
    next_seq: u64,
    inner_complete: bool,
}

impl OrderedPlayer {
    /// Wraps `inner` with ordering correction. The initial policy is
    /// arrival order (pass-through).
    pub fn new(inner: Box<dyn Player>, config: &PlaybackConfig) -> Self {
        Self {
            inner,
            policy: MessageOrderingPolicy::default(),
            lookahead: config.ordering_lookahead,
            buffer: BinaryHeap::new(),
            pending_flush: Vec::new(),
            next_seq: 0,
            inner_complete: false,
        }
    }

    fn buffer_message(&mut self, message: PlayerMessage) {
        self.buffer.push(Buffered {
            key: message.ordering_key(),
            seq: self.next_seq,
            message,
        });
        self.next_seq += 1;
    }

    /// Pops every buffered message with key at or before `horizon`, in
    /// non-decreasing key order.
    fn drain_until(&mut self, horizon: Timestamp) -> Vec<PlayerMessage> {
        let mut drained = Vec::new();
        while let Some(entry) = self.buffer.peek() {
            if entry.key > horizon {
                break;
            }
            drained.push(self.buffer.pop().expect("peeked entry exists").message);
        }
        drained
    }

    /// Drains the entire buffer in key order.
    fn drain_all(&mut self) -> Vec<PlayerMessage> {
        let mut drained = Vec::with_capacity(self.buffer.len());
        while let Some(entry) = self.buffer.pop() {
            drained.push(entry.message);
        }
        drained
    }
}

#[async_trait]
impl Player for OrderedPlayer {
    fn name(&self) -> &'static str {
        "order-correction"
    }

    fn playback_state(&self) -> PlaybackState {
        self.inner.playback_state()
    }

    fn topics(&self) -> Vec<TopicInfo> {
        self.inner.topics()
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.inner.play().await
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.inner.pause().await
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
        // Buffered messages belong to the pre-seek position.
        self.buffer.clear();
        self.pending_flush.clear();
        self.inner.seek(target).await
    }

    async fn set_subscriptions(&mut self, topics: Vec<String>) -> Result<(), PlayerError> {
        self.inner.set_subscriptions(topics).await
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), PlayerError> {
        self.inner.publish(topic, payload).await
    }

    fn set_message_ordering(&mut self, policy: MessageOrderingPolicy) {
        if policy == self.policy {
            return;
        }
        debug!(from = %self.policy, to = %policy, "Switching message ordering policy");
        // Flush so no buffered message is lost; already-delivered messages
        // are never revisited.
        let flushed = self.drain_all();
        self.pending_flush.extend(flushed);
        self.policy = policy;
    }

    fn set_transform_programs(&mut self, programs: TransformPrograms) {
        self.inner.set_transform_programs(programs);
    }

    fn transform_status(&self) -> Vec<ProgramStatus> {
        self.inner.transform_status()
    }

    fn interface_artifact(&self) -> Option<String> {
        self.inner.interface_artifact()
    }

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        if self.inner_complete {
            if self.buffer.is_empty() && self.pending_flush.is_empty() {
                return Ok(None);
            }
            // The source is done; everything still buffered is ready.
            let mut messages = std::mem::take(&mut self.pending_flush);
            messages.extend(self.drain_all());
            let current_time = messages
                .last()
                .map(|message| message.ordering_key())
                .unwrap_or_default();
            return Ok(Some(PlayerFrame::new(current_time, messages)));
        }

        let Some(mut frame) = self.inner.next_frame().await? else {
            self.inner_complete = true;
            // Re-enter to emit the final flush (or None).
            return self.next_frame().await;
        };

        let mut messages = std::mem::take(&mut self.pending_flush);
        match self.policy {
            MessageOrderingPolicy::ReceiveTime => {
                messages.append(&mut frame.messages);
            }
            MessageOrderingPolicy::HeaderTime => {
                for message in frame.messages.drain(..) {
                    self.buffer_message(message);
                }
                let horizon = frame.current_time.sub_duration(self.lookahead);
                messages.extend(self.drain_until(horizon));
                frame.current_time = horizon;
            }
        }

        frame.messages = messages;
        Ok(Some(frame))
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.buffer.clear();
        self.pending_flush.clear();
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::player::test_mocks::ScriptedPlayer;

    fn stamped(topic: &str, receive_secs: i64, header_secs: i64) -> PlayerMessage {
        PlayerMessage::with_header_time(
            topic,
            Timestamp::from_secs(receive_secs),
            Timestamp::from_secs(header_secs),
            json!({"stamp": header_secs}),
        )
    }

    fn config(lookahead_secs: u64) -> PlaybackConfig {
        PlaybackConfig {
            ordering_lookahead: Duration::from_secs(lookahead_secs),
            ..PlaybackConfig::default()
        }
    }

    fn header_stamps(frame: &PlayerFrame) -> Vec<i64> {
        frame
            .messages
            .iter()
            .map(|message| message.ordering_key().secs())
            .collect()
    }

    #[tokio::test]
    async fn test_header_policy_resequences_out_of_order_stamps() {
        let frame = PlayerFrame::new(
            Timestamp::from_secs(20),
            vec![
                stamped("/a", 10, 5),
                stamped("/a", 11, 1),
                stamped("/a", 12, 3),
            ],
        );
        let inner = ScriptedPlayer::new(vec![frame]);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(1));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        let emitted = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&emitted), vec![1, 3, 5]);
        // Reported time is shifted back by the look-ahead window.
        assert_eq!(emitted.current_time, Timestamp::from_secs(19));
    }

    #[tokio::test]
    async fn test_receive_policy_is_pass_through() {
        let frame = PlayerFrame::new(
            Timestamp::from_secs(20),
            vec![
                stamped("/a", 10, 5),
                stamped("/a", 11, 1),
                stamped("/a", 12, 3),
            ],
        );
        let inner = ScriptedPlayer::new(vec![frame]);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(1));

        let emitted = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&emitted), vec![5, 1, 3]);
        assert_eq!(emitted.current_time, Timestamp::from_secs(20));
    }

    #[tokio::test]
    async fn test_messages_inside_lookahead_are_held_back() {
        let frames = vec![
            PlayerFrame::new(
                Timestamp::from_secs(10),
                vec![stamped("/a", 10, 8), stamped("/a", 10, 10)],
            ),
            PlayerFrame::new(Timestamp::from_secs(12), Vec::new()),
        ];
        let inner = ScriptedPlayer::new(frames);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(1));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        // Horizon is 9: the stamp-8 message is ready, stamp-10 is held.
        let first = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&first), vec![8]);

        // Horizon advances to 11, releasing the held message.
        let second = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&second), vec![10]);
    }

    #[tokio::test]
    async fn test_emission_is_non_decreasing_across_frames() {
        let frames = vec![
            PlayerFrame::new(
                Timestamp::from_secs(10),
                vec![stamped("/a", 9, 9), stamped("/a", 10, 7)],
            ),
            PlayerFrame::new(
                Timestamp::from_secs(13),
                vec![stamped("/a", 11, 11), stamped("/a", 12, 8)],
            ),
            PlayerFrame::new(Timestamp::from_secs(30), Vec::new()),
        ];
        let inner = ScriptedPlayer::new(frames);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(3));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        let mut stamps = Vec::new();
        while let Some(frame) = player.next_frame().await.expect("frame") {
            stamps.extend(header_stamps(&frame));
        }
        assert_eq!(stamps, vec![7, 8, 9, 11]);
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn test_policy_switch_flushes_buffer_in_order() {
        let frames = vec![
            PlayerFrame::new(
                Timestamp::from_secs(10),
                vec![stamped("/a", 10, 9), stamped("/a", 10, 12)],
            ),
            PlayerFrame::new(Timestamp::from_secs(11), vec![stamped("/a", 11, 4)]),
        ];
        let inner = ScriptedPlayer::new(frames);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(5));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        // Horizon 5: both messages held back.
        let first = player.next_frame().await.expect("frame").expect("some");
        assert!(first.messages.is_empty());

        // Switch back to arrival order: the buffer flushes ahead of the
        // next frame's own (pass-through) messages.
        player.set_message_ordering(MessageOrderingPolicy::ReceiveTime);
        let second = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&second), vec![9, 12, 4]);
    }

    #[tokio::test]
    async fn test_source_completion_flushes_remaining_buffer() {
        let frames = vec![PlayerFrame::new(
            Timestamp::from_secs(10),
            vec![stamped("/a", 10, 9), stamped("/a", 10, 10)],
        )];
        let inner = ScriptedPlayer::new(frames);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(5));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        let first = player.next_frame().await.expect("frame").expect("some");
        assert!(first.messages.is_empty());

        let last = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(header_stamps(&last), vec![9, 10]);

        assert!(player.next_frame().await.expect("frame").is_none());
    }

    proptest::proptest! {
        /// Whatever the interleaving of header stamps, emission under the
        /// header-time policy is non-decreasing in the ordering key.
        #[test]
        fn test_header_ordering_is_non_decreasing(
            stamps in proptest::collection::vec(0i64..100, 1..40),
        ) {
            tokio_test::block_on(async move {
                let messages: Vec<PlayerMessage> = stamps
                    .iter()
                    .enumerate()
                    .map(|(i, &stamp)| stamped("/p", 100 + i as i64, stamp))
                    .collect();
                let frames = vec![PlayerFrame::new(Timestamp::from_secs(300), messages)];
                let inner = ScriptedPlayer::new(frames);
                let mut player = OrderedPlayer::new(Box::new(inner), &config(1));
                player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

                let mut emitted = Vec::new();
                while let Some(frame) = player.next_frame().await.expect("frame") {
                    emitted.extend(header_stamps(&frame));
                }
                assert_eq!(emitted.len(), stamps.len());
                assert!(emitted.windows(2).all(|pair| pair[0] <= pair[1]));
            });
        }
    }

    #[tokio::test]
    async fn test_seek_clears_buffered_messages() {
        let frames = vec![
            PlayerFrame::new(Timestamp::from_secs(10), vec![stamped("/a", 10, 9)]),
            PlayerFrame::new(Timestamp::from_secs(20), Vec::new()),
        ];
        let inner = ScriptedPlayer::new(frames);
        let mut player = OrderedPlayer::new(Box::new(inner), &config(5));
        player.set_message_ordering(MessageOrderingPolicy::HeaderTime);

        let first = player.next_frame().await.expect("frame").expect("some");
        assert!(first.messages.is_empty());

        player.seek(Timestamp::from_secs(0)).await.expect("seek");
        let second = player.next_frame().await.expect("frame").expect("some");
        assert!(second.messages.is_empty());
    }
}
