//! Deterministic headless playback for automated capture runs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame, PlayerId, transition,
};
use crate::config::CaptureConfig;
use crate::descriptor::DataSourceDescriptor;
use crate::message::{PlayerMessage, Timestamp, TopicInfo};
use crate::source::{ReaderFactory, RecordReader, SourceInfo, build_reader};

/// Progress notification emitted once per captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProgress {
    /// Zero-based index of the frame that was just emitted.
    pub frame_index: u64,
    /// Playback time at the end of the frame.
    pub current_time: Timestamp,
    /// Fraction of the log consumed so far, in `[0, 1]`.
    pub fraction_complete: f64,
    /// Messages delivered in this frame.
    pub messages_delivered: usize,
}

/// Receives capture progress as headless playback advances.
pub trait CaptureSink: Send {
    /// Called after each frame is emitted.
    fn frame_emitted(&mut self, progress: CaptureProgress);

    /// Called once when the run has consumed the entire log.
    fn run_complete(&mut self, total_frames: u64, total_messages: usize);
}

/// Sink that logs capture progress instead of recording it.
///
/// Used when an automated run is composed without a caller-supplied sink.
#[derive(Debug, Default)]
pub struct LoggingCaptureSink;

impl CaptureSink for LoggingCaptureSink {
    fn frame_emitted(&mut self, progress: CaptureProgress) {
        debug!(
            frame = progress.frame_index,
            time = %progress.current_time,
            fraction = progress.fraction_complete,
            messages = progress.messages_delivered,
            "Capture frame emitted"
        );
    }

    fn run_complete(&mut self, total_frames: u64, total_messages: usize) {
        info!(total_frames, total_messages, "Capture run complete");
    }
}

/// Headless player producing a deterministic, frame-synchronized sequence.
///
/// Playback time advances by exactly the configured frame duration per
/// frame with no wall-clock dependence, so identical inputs always produce
/// identical captures. Starts playing on activation and runs front to
/// back; `next_frame` returns `None` once the log is consumed, after the
/// sink's completion notification.
pub struct AutomatedRunPlayer {
    id: PlayerId,
    reader: Option<Box<dyn RecordReader>>,
    sink: Box<dyn CaptureSink>,
    state: PlaybackState,
    current_time: Timestamp,
    range: Option<(Timestamp, Timestamp)>,
    topics: Vec<TopicInfo>,
    subscriptions: Option<HashSet<String>>,
    frame_duration: Duration,
    frame_index: u64,
    total_messages: usize,
    complete: bool,
}

impl AutomatedRunPlayer {
    /// Builds the reader pipeline for `descriptor` and constructs the
    /// player in the `Constructed` state.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - a leaf source cannot be opened
    pub fn new(
        descriptor: &DataSourceDescriptor,
        factory: &dyn ReaderFactory,
        config: &CaptureConfig,
        sink: Box<dyn CaptureSink>,
    ) -> Result<Self, PlayerError> {
        let reader = build_reader(descriptor, factory)?;
        Ok(Self {
            id: PlayerId::new(),
            reader: Some(reader),
            sink,
            state: PlaybackState::Constructed,
            current_time: Timestamp::default(),
            range: None,
            topics: Vec::new(),
            subscriptions: None,
            frame_duration: config.frame_duration,
            frame_index: 0,
            total_messages: 0,
            complete: false,
        })
    }

    /// Opens the underlying source and starts playing; headless runs have
    /// no one to press play. Idempotent once activated.
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
        let log_end = end.add_duration(Duration::from_nanos(1));
        self.topics = topics;
        self.range = Some((start, log_end));
        self.current_time = start;

        transition(&mut self.state, PlaybackState::Playing)?;
        info!(player_id = %self.id, start = %start, end = %end, "Automated run started");
        Ok(())
    }

    fn fraction_complete(&self) -> f64 {
        let Some((start, log_end)) = self.range else {
            return 0.0;
        };
        let total = log_end.duration_since(start);
        if total.is_zero() {
            return 1.0;
        }
        self.current_time.duration_since(start).as_secs_f64() / total.as_secs_f64()
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
impl Player for AutomatedRunPlayer {
    fn name(&self) -> &'static str {
        "automated-run"
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
        self.complete = false;

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
        debug!(player_id = %self.id, topic, "Publish dropped: capture run has no upstream");
        Ok(())
    }

    fn set_message_ordering(&mut self, policy: MessageOrderingPolicy) {
        debug!(player_id = %self.id, %policy, "Ordering policy noted; no resequencing at the source");
    }

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        self.activate().await?;

        if self.complete {
            return Ok(None);
        }
        if self.state != PlaybackState::Playing {
            return Ok(Some(PlayerFrame::new(self.current_time, Vec::new())));
        }

        let (_, log_end) = self.range.unwrap_or_default();
        let frame_end = self
            .current_time
            .add_duration(self.frame_duration)
            .min(log_end);
        let reader = self.reader.as_mut().ok_or(PlayerError::Closed)?;
        let messages = reader.read_until(frame_end).await?;
        let messages = self.filtered(messages);
        self.current_time = frame_end;

        self.total_messages += messages.len();
        let progress = CaptureProgress {
            frame_index: self.frame_index,
            current_time: self.current_time,
            fraction_complete: self.fraction_complete(),
            messages_delivered: messages.len(),
        };
        self.frame_index += 1;
        self.sink.frame_emitted(progress);

        if frame_end >= log_end {
            self.complete = true;
            self.sink.run_complete(self.frame_index, self.total_messages);
            transition(&mut self.state, PlaybackState::Paused)?;
            info!(
                player_id = %self.id,
                frames = self.frame_index,
                messages = self.total_messages,
                "Automated run complete"
            );
        }

        Ok(Some(PlayerFrame::new(self.current_time, messages)))
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.reader = None;
        transition(&mut self.state, PlaybackState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::source::test_fixtures::StaticReaderFactory;

    #[derive(Default)]
    struct RecordingSink {
        progress: Arc<Mutex<Vec<CaptureProgress>>>,
        completions: Arc<Mutex<Vec<(u64, usize)>>>,
    }

    impl CaptureSink for RecordingSink {
        fn frame_emitted(&mut self, progress: CaptureProgress) {
            self.progress.lock().push(progress);
        }

        fn run_complete(&mut self, total_frames: u64, total_messages: usize) {
            self.completions.lock().push((total_frames, total_messages));
        }
    }

    fn fixture_player() -> (
        AutomatedRunPlayer,
        Arc<Mutex<Vec<CaptureProgress>>>,
        Arc<Mutex<Vec<(u64, usize)>>>,
    ) {
        let path = PathBuf::from("capture.rec");
        let factory = StaticReaderFactory::new().with_local(
            &path,
            vec![TopicInfo::new("/odom", "nav/Odometry")],
            (0..4)
                .map(|i| PlayerMessage::new("/odom", Timestamp::from_secs(i), json!({"seq": i})))
                .collect(),
        );
        let config = CaptureConfig {
            frame_duration: Duration::from_secs(2),
        };
        let sink = RecordingSink::default();
        let progress = Arc::clone(&sink.progress);
        let completions = Arc::clone(&sink.completions);
        let descriptor = DataSourceDescriptor::LocalFile { path };
        let player = AutomatedRunPlayer::new(&descriptor, &factory, &config, Box::new(sink))
            .expect("player builds");
        (player, progress, completions)
    }

    async fn run_to_completion(player: &mut AutomatedRunPlayer) -> Vec<PlayerFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = player.next_frame().await.expect("frame") {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_run_steps_fixed_frames_and_completes() {
        let (mut player, progress, completions) = fixture_player();
        let frames = run_to_completion(&mut player).await;

        // 3 seconds of log (plus the final-message nanosecond) at 2-second
        // frames -> two frames.
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].messages.len(), 2);
        assert_eq!(frames[1].messages.len(), 2);

        let progress = progress.lock();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].frame_index, 0);
        assert!(progress[0].fraction_complete < 1.0);
        assert_eq!(progress[1].fraction_complete, 1.0);
        assert_eq!(*completions.lock(), vec![(2, 4)]);
    }

    #[tokio::test]
    async fn test_identical_runs_are_identical() {
        let (mut first, first_progress, _) = fixture_player();
        let (mut second, second_progress, _) = fixture_player();

        let first_frames = run_to_completion(&mut first).await;
        let second_frames = run_to_completion(&mut second).await;

        assert_eq!(first_frames, second_frames);
        assert_eq!(*first_progress.lock(), *second_progress.lock());
    }

    #[tokio::test]
    async fn test_completed_run_returns_none_thereafter() {
        let (mut player, _, _) = fixture_player();
        run_to_completion(&mut player).await;
        assert!(player.next_frame().await.expect("frame").is_none());
        assert!(player.next_frame().await.expect("frame").is_none());
    }
}
