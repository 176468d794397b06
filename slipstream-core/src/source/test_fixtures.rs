//! In-memory record sources for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::{ReaderFactory, RecordReader, SourceInfo};
use crate::descriptor::DataSourceDescriptor;
use crate::message::{PlayerMessage, Timestamp, TopicInfo};
use crate::player::PlayerError;

/// Reader over a fixed, pre-sorted message sequence.
pub struct StaticRecordReader {
    topics: Vec<TopicInfo>,
    messages: Vec<PlayerMessage>,
    cursor: Timestamp,
}

impl StaticRecordReader {
    /// Creates a reader over `messages`, which are sorted by receive time
    /// on construction.
    pub fn new(topics: Vec<TopicInfo>, mut messages: Vec<PlayerMessage>) -> Self {
        messages.sort_by_key(|message| message.receive_time);
        let cursor = messages
            .first()
            .map(|message| message.receive_time)
            .unwrap_or_default();
        Self {
            topics,
            messages,
            cursor,
        }
    }
}

#[async_trait]
impl RecordReader for StaticRecordReader {
    async fn initialize(&mut self) -> Result<SourceInfo, PlayerError> {
        let start = self
            .messages
            .first()
            .map(|message| message.receive_time)
            .unwrap_or_default();
        let end = self
            .messages
            .last()
            .map(|message| message.receive_time)
            .unwrap_or_default();
        self.cursor = start;
        Ok(SourceInfo {
            topics: self.topics.clone(),
            start,
            end,
        })
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
        self.cursor = target;
        Ok(())
    }

    async fn read_until(&mut self, end: Timestamp) -> Result<Vec<PlayerMessage>, PlayerError> {
        let cursor = self.cursor;
        self.cursor = end;
        Ok(self
            .messages
            .iter()
            .filter(|message| message.receive_time >= cursor && message.receive_time < end)
            .cloned()
            .collect())
    }
}

/// Factory serving pre-registered message sets for known leaves.
///
/// Any leaf that was not registered fails with `SourceUnavailable`, which
/// makes the factory double as a fixture for open-failure paths.
#[derive(Default)]
pub struct StaticReaderFactory {
    locals: HashMap<PathBuf, (Vec<TopicInfo>, Vec<PlayerMessage>)>,
    remotes: HashMap<Url, (Vec<TopicInfo>, Vec<PlayerMessage>)>,
}

impl StaticReaderFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a local file with its topics and messages.
    pub fn with_local(
        mut self,
        path: &Path,
        topics: Vec<TopicInfo>,
        messages: Vec<PlayerMessage>,
    ) -> Self {
        self.locals.insert(path.to_path_buf(), (topics, messages));
        self
    }

    /// Registers a remote URL with its topics and messages.
    pub fn with_remote(
        mut self,
        url: Url,
        topics: Vec<TopicInfo>,
        messages: Vec<PlayerMessage>,
    ) -> Self {
        self.remotes.insert(url, (topics, messages));
        self
    }
}

impl ReaderFactory for StaticReaderFactory {
    fn open(&self, leaf: &DataSourceDescriptor) -> Result<Box<dyn RecordReader>, PlayerError> {
        let (source_name, entry) = match leaf {
            DataSourceDescriptor::LocalFile { path } => {
                (path.display().to_string(), self.locals.get(path))
            }
            DataSourceDescriptor::RemoteFile { url, .. } => {
                (url.to_string(), self.remotes.get(url))
            }
            other => {
                return Err(PlayerError::SourceUnavailable {
                    source_name: other.summary(),
                    reason: "not a leaf descriptor".to_string(),
                });
            }
        };

        let (topics, messages) = entry.ok_or_else(|| PlayerError::SourceUnavailable {
            source_name: source_name.clone(),
            reason: "no fixture registered".to_string(),
        })?;

        Ok(Box::new(StaticRecordReader::new(
            topics.clone(),
            messages.clone(),
        )))
    }
}
