//! Mock player for decorator tests.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame};
use crate::message::{Timestamp, TopicInfo};

/// Player that replays a scripted frame sequence.
///
/// Control operations are accepted and tracked only as state changes; the
/// decorators under test forward them without inspecting the result.
pub(crate) struct ScriptedPlayer {
    pub frames: VecDeque<PlayerFrame>,
    pub state: PlaybackState,
    pub topics: Vec<TopicInfo>,
}

impl ScriptedPlayer {
    pub fn new(frames: Vec<PlayerFrame>) -> Self {
        Self {
            frames: frames.into(),
            state: PlaybackState::Playing,
            topics: Vec::new(),
        }
    }
}

#[async_trait]
impl Player for ScriptedPlayer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn playback_state(&self) -> PlaybackState {
        self.state
    }

    fn topics(&self) -> Vec<TopicInfo> {
        self.topics.clone()
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.state = PlaybackState::Playing;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.state = PlaybackState::Paused;
        Ok(())
    }

    async fn seek(&mut self, _target: Timestamp) -> Result<(), PlayerError> {
        Ok(())
    }

    async fn set_subscriptions(&mut self, _topics: Vec<String>) -> Result<(), PlayerError> {
        Ok(())
    }

    async fn publish(
        &mut self,
        _topic: &str,
        _payload: serde_json::Value,
    ) -> Result<(), PlayerError> {
        Ok(())
    }

    fn set_message_ordering(&mut self, _policy: MessageOrderingPolicy) {}

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        Ok(self.frames.pop_front())
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.state = PlaybackState::Closed;
        Ok(())
    }
}
