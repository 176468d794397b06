//! Seekable playback over a resolved descriptor tree.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame, PlayerId, transition,
};
use crate::config::PlaybackConfig;
use crate::descriptor::DataSourceDescriptor;
use crate::message::{PlayerMessage, Timestamp, TopicInfo};
use crate::source::{ReaderFactory, RecordReader, SourceInfo, build_reader};

/// Supplies the initial playback position for a newly opened source.
///
/// Callers use this to restore a previously shared position (for example
/// from a persisted session) without the player knowing where such
/// positions come from. Returning `None` starts at the beginning of the
/// log.
pub trait SeekTimeResolver: Send + Sync {
    /// Picks the initial seek target given the source's time range.
    fn initial_seek(&self, start: Timestamp, end: Timestamp) -> Option<Timestamp>;
}

impl<F> SeekTimeResolver for F
where
    F: Fn(Timestamp, Timestamp) -> Option<Timestamp> + Send + Sync,
{
    fn initial_seek(&self, start: Timestamp, end: Timestamp) -> Option<Timestamp> {
        self(start, end)
    }
}

/// Seekable, file-backed player consuming a resolved descriptor tree.
///
/// Each `next_frame` call while playing advances playback time by one
/// configured frame interval and delivers the messages inside it. Pacing
/// is owned by the caller. Playback auto-pauses at the end of the log;
/// seeking back resumes normally.
pub struct RandomAccessPlayer {
    id: PlayerId,
    reader: Option<Box<dyn RecordReader>>,
    seek_resolver: Option<Arc<dyn SeekTimeResolver>>,
    state: PlaybackState,
    current_time: Timestamp,
    /// Start and one-past-end of the log, known after activation.
    range: Option<(Timestamp, Timestamp)>,
    topics: Vec<TopicInfo>,
    subscriptions: Option<HashSet<String>>,
    frame_interval: Duration,
}

impl RandomAccessPlayer {
    /// Builds the reader pipeline for `descriptor` and constructs the
    /// player in the `Constructed` state.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - a leaf source cannot be opened
    pub fn new(
        descriptor: &DataSourceDescriptor,
        factory: &dyn ReaderFactory,
        config: &PlaybackConfig,
        seek_resolver: Option<Arc<dyn SeekTimeResolver>>,
    ) -> Result<Self, PlayerError> {
        let reader = build_reader(descriptor, factory)?;
        Ok(Self {
            id: PlayerId::new(),
            reader: Some(reader),
            seek_resolver,
            state: PlaybackState::Constructed,
            current_time: Timestamp::default(),
            range: None,
            topics: Vec::new(),
            subscriptions: None,
            frame_interval: config.frame_interval,
        })
    }

    /// Opens the underlying source, applies the initial seek, and enters
    /// the active region (paused). Idempotent once activated.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - the source cannot be streamed
    /// - `PlayerError::Closed` - the player was closed before activation
    pub async fn activate(&mut self) -> Result<(), PlayerError> {
        if self.state != PlaybackState::Constructed {
            if self.state == PlaybackState::Closed {
                return Err(PlayerError::Closed);
            }
            return Ok(());
        }

        let reader = self.reader.as_mut().ok_or(PlayerError::Closed)?;
        let SourceInfo { topics, start, end } = reader.initialize().await?;

        // Half-open range that still includes the final message.
        let log_end = end.add_duration(Duration::from_nanos(1));
        self.topics = topics;
        self.range = Some((start, log_end));
        self.current_time = start;

        if let Some(resolver) = &self.seek_resolver {
            if let Some(target) = resolver.initial_seek(start, end) {
                let target = target.clamp(start, end);
                reader.seek(target).await?;
                self.current_time = target;
                debug!(player_id = %self.id, time = %target, "Applied initial seek");
            }
        }

        transition(&mut self.state, PlaybackState::Paused)?;
        info!(player_id = %self.id, start = %start, end = %end, "Random-access player activated");
        Ok(())
    }

    fn filtered(&self, messages: Vec<PlayerMessage>) -> Vec<PlayerMessage> {
        match &self.subscriptions {
            None => messages,
            Some(topics) => messages
                .into_iter()
                .filter(|message| topics.contains(&message.topic))
                .collect(),
        }
    }
}

#[async_trait]
impl Player for RandomAccessPlayer {
    fn name(&self) -> &'static str {
        "random-access"
    }

    fn playback_state(&self) -> PlaybackState {
        self.state
    }

    fn topics(&self) -> Vec<TopicInfo> {
        self.topics.clone()
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.activate().await?;
        transition(&mut self.state, PlaybackState::Playing)
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.activate().await?;
        transition(&mut self.state, PlaybackState::Paused)
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
        self.activate().await?;

        let resume_to = match self.state {
            PlaybackState::Playing => PlaybackState::Playing,
            _ => PlaybackState::Paused,
        };
        transition(&mut self.state, PlaybackState::Seeking)?;

        let (start, log_end) = self.range.unwrap_or_default();
        let target = target.clamp(start, log_end);
        let reader = self.reader.as_mut().ok_or(PlayerError::Closed)?;
        reader.seek(target).await?;
        self.current_time = target;
        debug!(player_id = %self.id, time = %target, "Seek completed");

        transition(&mut self.state, resume_to)
    }

    async fn set_subscriptions(&mut self, topics: Vec<String>) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Closed {
            return Err(PlayerError::Closed);
        }
        self.subscriptions = Some(topics.into_iter().collect());
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        _payload: serde_json::Value,
    ) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Closed {
            return Err(PlayerError::Closed);
        }
        debug!(player_id = %self.id, topic, "Publish dropped: recorded source has no upstream");
        Ok(())
    }

    fn set_message_ordering(&mut self, policy: MessageOrderingPolicy) {
        // Resequencing belongs to the order-correction decorator.
        debug!(player_id = %self.id, %policy, "Ordering policy noted; no resequencing at the source");
    }

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        self.activate().await?;

        if self.state != PlaybackState::Playing {
            return Ok(Some(PlayerFrame::new(self.current_time, Vec::new())));
        }

        let (_, log_end) = self.range.unwrap_or_default();
        let frame_end = self.current_time.add_duration(self.frame_interval).min(log_end);
        let reader = self.reader.as_mut().ok_or(PlayerError::Closed)?;
        let messages = reader.read_until(frame_end).await?;
        self.current_time = frame_end;

        if frame_end >= log_end {
            transition(&mut self.state, PlaybackState::Paused)?;
            info!(player_id = %self.id, "End of log reached; pausing");
        }

        Ok(Some(PlayerFrame::new(
            self.current_time,
            self.filtered(messages),
        )))
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        // Dropping the reader releases the underlying file handles.
        self.reader = None;
        transition(&mut self.state, PlaybackState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::message::PlayerMessage;
    use crate::source::test_fixtures::StaticReaderFactory;

    fn fixture_player(seek_resolver: Option<Arc<dyn SeekTimeResolver>>) -> RandomAccessPlayer {
        let path = PathBuf::from("run.rec");
        let factory = StaticReaderFactory::new().with_local(
            &path,
            vec![TopicInfo::new("/odom", "nav/Odometry")],
            (0..5)
                .map(|i| {
                    PlayerMessage::new("/odom", Timestamp::from_secs(i), json!({"seq": i}))
                })
                .collect(),
        );
        let config = PlaybackConfig {
            frame_interval: Duration::from_secs(1),
            ..PlaybackConfig::default()
        };
        let descriptor = DataSourceDescriptor::LocalFile { path };
        RandomAccessPlayer::new(&descriptor, &factory, &config, seek_resolver)
            .expect("player builds")
    }

    #[tokio::test]
    async fn test_playback_advances_one_frame_per_call() {
        let mut player = fixture_player(None);
        player.play().await.expect("play");

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.current_time, Timestamp::from_secs(1));
        assert_eq!(frame.messages.len(), 1);
        assert_eq!(frame.messages[0].payload["seq"], 0);

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages[0].payload["seq"], 1);
    }

    #[tokio::test]
    async fn test_paused_frames_are_empty_and_hold_time() {
        let mut player = fixture_player(None);
        player.pause().await.expect("pause");

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.current_time, Timestamp::from_secs(0));
        assert!(frame.messages.is_empty());
        assert_eq!(player.playback_state(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_end_of_log_auto_pauses() {
        let mut player = fixture_player(None);
        player.play().await.expect("play");

        let mut delivered = 0;
        for _ in 0..10 {
            let frame = player.next_frame().await.expect("frame").expect("some");
            delivered += frame.messages.len();
            if player.playback_state() == PlaybackState::Paused {
                break;
            }
        }
        assert_eq!(delivered, 5);
        assert_eq!(player.playback_state(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_seek_resumes_to_requesting_state() {
        let mut player = fixture_player(None);
        player.play().await.expect("play");
        player.seek(Timestamp::from_secs(3)).await.expect("seek");
        assert_eq!(player.playback_state(), PlaybackState::Playing);

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages[0].payload["seq"], 3);

        player.pause().await.expect("pause");
        player.seek(Timestamp::from_secs(0)).await.expect("seek");
        assert_eq!(player.playback_state(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_initial_seek_resolver_is_applied_and_clamped() {
        let resolver = |_start: Timestamp, _end: Timestamp| Some(Timestamp::from_secs(100));
        let mut player = fixture_player(Some(Arc::new(resolver)));
        player.play().await.expect("play");

        // Requested position is past the end; clamped to the last message.
        let frame = player.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.messages[0].payload["seq"], 4);
    }

    #[tokio::test]
    async fn test_subscriptions_filter_delivery() {
        let mut player = fixture_player(None);
        player
            .set_subscriptions(vec!["/elsewhere".to_string()])
            .await
            .expect("subscribe");
        player.play().await.expect("play");

        let frame = player.next_frame().await.expect("frame").expect("some");
        assert!(frame.messages.is_empty());
    }

    #[tokio::test]
    async fn test_closed_player_rejects_operations() {
        let mut player = fixture_player(None);
        player.close().await.expect("close");
        assert_eq!(player.playback_state(), PlaybackState::Closed);
        assert!(matches!(player.play().await, Err(PlayerError::Closed)));
        assert!(matches!(
            player.next_frame().await,
            Err(PlayerError::Closed)
        ));
    }
}
