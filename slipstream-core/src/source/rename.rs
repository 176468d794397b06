//! Topic-prefixing reader adapter.

use async_trait::async_trait;

use super::{RecordReader, SourceInfo};
use crate::message::{PlayerMessage, Timestamp, TopicInfo};
use crate::player::PlayerError;

/// Wraps a reader and prefixes every topic name it produces.
///
/// The inner reader never learns it is being renamed; merging two sources
/// stays collision-free without the underlying formats cooperating.
pub struct RenameReader {
    prefix: String,
    inner: Box<dyn RecordReader>,
}

impl RenameReader {
    /// Creates a renaming adapter around `inner`.
    pub fn new(prefix: impl Into<String>, inner: Box<dyn RecordReader>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn prefixed(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

#[async_trait]
impl RecordReader for RenameReader {
    async fn initialize(&mut self) -> Result<SourceInfo, PlayerError> {
        let info = self.inner.initialize().await?;
        Ok(SourceInfo {
            topics: info
                .topics
                .into_iter()
                .map(|topic| TopicInfo {
                    name: self.prefixed(&topic.name),
                    datatype: topic.datatype,
                })
                .collect(),
            start: info.start,
            end: info.end,
        })
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
        self.inner.seek(target).await
    }

    async fn read_until(&mut self, end: Timestamp) -> Result<Vec<PlayerMessage>, PlayerError> {
        let mut messages = self.inner.read_until(end).await?;
        for message in &mut messages {
            message.topic = self.prefixed(&message.topic);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::source::test_fixtures::StaticRecordReader;

    #[tokio::test]
    async fn test_rename_prefixes_topics_and_messages() {
        let inner = StaticRecordReader::new(
            vec![TopicInfo::new("/gps", "nav/Fix")],
            vec![PlayerMessage::new(
                "/gps",
                Timestamp::from_secs(1),
                json!({"lat": 1.0}),
            )],
        );
        let mut reader = RenameReader::new("/source_2", Box::new(inner));

        let info = reader.initialize().await.expect("initialize");
        assert_eq!(info.topics[0].name, "/source_2/gps");
        assert_eq!(info.topics[0].datatype, "nav/Fix");

        let messages = reader
            .read_until(Timestamp::from_secs(10))
            .await
            .expect("read");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "/source_2/gps");
    }
}
