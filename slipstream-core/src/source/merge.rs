//! Multi-source merge adapter and descriptor-tree interpretation.

use async_trait::async_trait;

use super::{ReaderFactory, RecordReader, RenameReader, SourceInfo};
use crate::descriptor::DataSourceDescriptor;
use crate::message::{PlayerMessage, Timestamp};
use crate::player::PlayerError;

/// Merges two or more readers into one stream ordered by receive time.
///
/// Ties keep child order, so the merge is deterministic for identical
/// inputs. Topics are the union of the children's topics; the time range
/// spans the earliest start to the latest end.
pub struct MergeReader {
    children: Vec<Box<dyn RecordReader>>,
}

impl MergeReader {
    /// Creates a merge over the given child readers.
    pub fn new(children: Vec<Box<dyn RecordReader>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl RecordReader for MergeReader {
    async fn initialize(&mut self) -> Result<SourceInfo, PlayerError> {
        let mut topics = Vec::new();
        let mut start: Option<Timestamp> = None;
        let mut end: Option<Timestamp> = None;

        for child in &mut self.children {
            let info = child.initialize().await?;
            topics.extend(info.topics);
            start = Some(start.map_or(info.start, |s| s.min(info.start)));
            end = Some(end.map_or(info.end, |e| e.max(info.end)));
        }

        Ok(SourceInfo {
            topics,
            start: start.unwrap_or_default(),
            end: end.unwrap_or_default(),
        })
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
        for child in &mut self.children {
            child.seek(target).await?;
        }
        Ok(())
    }

    async fn read_until(&mut self, end: Timestamp) -> Result<Vec<PlayerMessage>, PlayerError> {
        let mut merged = Vec::new();
        for child in &mut self.children {
            merged.extend(child.read_until(end).await?);
        }
        // Stable sort keeps child order for equal receive times.
        merged.sort_by_key(|message| message.receive_time);
        Ok(merged)
    }
}

/// Assembles the reader pipeline for a descriptor tree.
///
/// The reader structure mirrors the tree: leaves open through the factory,
/// rename nodes wrap their child in a [`RenameReader`], combine nodes merge
/// their children with a [`MergeReader`].
///
/// # Errors
/// - `PlayerError::SourceUnavailable` - a leaf cannot be opened
pub fn build_reader(
    descriptor: &DataSourceDescriptor,
    factory: &dyn ReaderFactory,
) -> Result<Box<dyn RecordReader>, PlayerError> {
    match descriptor {
        DataSourceDescriptor::LocalFile { .. } | DataSourceDescriptor::RemoteFile { .. } => {
            factory.open(descriptor)
        }
        DataSourceDescriptor::Rename { prefix, child } => {
            let inner = build_reader(child, factory)?;
            Ok(Box::new(RenameReader::new(prefix.clone(), inner)))
        }
        DataSourceDescriptor::Combine { children } => {
            let readers = children
                .iter()
                .map(|child| build_reader(child, factory))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(MergeReader::new(readers)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::descriptor::{SECOND_SOURCE_PREFIX, build_tree};
    use crate::message::TopicInfo;
    use crate::source::test_fixtures::{StaticReaderFactory, StaticRecordReader};

    fn message(topic: &str, secs: i64) -> PlayerMessage {
        PlayerMessage::new(topic, Timestamp::from_secs(secs), json!({"n": secs}))
    }

    #[tokio::test]
    async fn test_merge_orders_by_receive_time() {
        let left = StaticRecordReader::new(
            vec![TopicInfo::new("/a", "test/Msg")],
            vec![message("/a", 1), message("/a", 5)],
        );
        let right = StaticRecordReader::new(
            vec![TopicInfo::new("/b", "test/Msg")],
            vec![message("/b", 2), message("/b", 4)],
        );
        let mut reader = MergeReader::new(vec![Box::new(left), Box::new(right)]);

        let info = reader.initialize().await.expect("initialize");
        assert_eq!(info.start, Timestamp::from_secs(1));
        assert_eq!(info.end, Timestamp::from_secs(5));
        assert_eq!(info.topics.len(), 2);

        let messages = reader
            .read_until(Timestamp::from_secs(10))
            .await
            .expect("read");
        let times: Vec<i64> = messages.iter().map(|m| m.receive_time.secs()).collect();
        assert_eq!(times, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_built_reader_mirrors_two_source_tree() {
        let first = PathBuf::from("a.rec");
        let second = PathBuf::from("b.rec");
        let factory = StaticReaderFactory::new()
            .with_local(
                &first,
                vec![TopicInfo::new("/gps", "nav/Fix")],
                vec![message("/gps", 1)],
            )
            .with_local(
                &second,
                vec![TopicInfo::new("/gps", "nav/Fix")],
                vec![message("/gps", 2)],
            );

        let tree = build_tree(vec![
            DataSourceDescriptor::LocalFile { path: first },
            DataSourceDescriptor::LocalFile { path: second },
        ])
        .expect("tree")
        .expect("non-empty");

        let mut reader = build_reader(&tree, &factory).expect("build");
        let info = reader.initialize().await.expect("initialize");

        let names: Vec<&str> = info.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["/gps", "/source_2/gps"]);

        let messages = reader
            .read_until(Timestamp::from_secs(10))
            .await
            .expect("read");
        assert_eq!(messages[0].topic, "/gps");
        assert_eq!(
            messages[1].topic,
            format!("{SECOND_SOURCE_PREFIX}/gps")
        );
    }

    #[tokio::test]
    async fn test_unknown_leaf_surfaces_source_unavailable() {
        let factory = StaticReaderFactory::new();
        let tree = DataSourceDescriptor::LocalFile {
            path: PathBuf::from("missing.rec"),
        };
        let err = build_reader(&tree, &factory).err().expect("should fail");
        assert!(matches!(err, PlayerError::SourceUnavailable { .. }));
    }
}
