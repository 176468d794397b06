//! Record source abstraction consumed by file-backed players.
//!
//! Provides a consistent interface for reading timestamped messages out of
//! recorded-data sources. The concrete on-disk and on-the-wire formats live
//! behind [`RecordReader`] and [`ReaderFactory`]; this module owns only the
//! contract plus the structural adapters (topic renaming, multi-source
//! merging) that mirror a descriptor tree.

pub mod merge;
pub mod rename;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use async_trait::async_trait;

pub use merge::{MergeReader, build_reader};
pub use rename::RenameReader;
#[cfg(any(test, feature = "test-utils"))]
pub use test_fixtures::{StaticReaderFactory, StaticRecordReader};

use crate::descriptor::DataSourceDescriptor;
use crate::message::{PlayerMessage, Timestamp, TopicInfo};
use crate::player::PlayerError;

/// Metadata a source advertises once it has been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Topics present in the source.
    pub topics: Vec<TopicInfo>,
    /// Timestamp of the earliest message.
    pub start: Timestamp,
    /// Timestamp of the latest message.
    pub end: Timestamp,
}

/// Cursor-based access to one logical recorded-data source.
///
/// A reader owns a playback cursor. `read_until` returns every message with
/// a receive time in `[cursor, end)` in log order and advances the cursor
/// to `end`; `seek` repositions the cursor arbitrarily.
#[async_trait]
pub trait RecordReader: Send {
    /// Opens the source and returns its topics and time range.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - source cannot be opened/streamed
    async fn initialize(&mut self) -> Result<SourceInfo, PlayerError>;

    /// Repositions the cursor to `target`.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - underlying source failed
    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError>;

    /// Reads messages from the cursor up to (but excluding) `end`,
    /// advancing the cursor to `end`. Messages are returned in log order.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - underlying source failed
    async fn read_until(&mut self, end: Timestamp) -> Result<Vec<PlayerMessage>, PlayerError>;
}

/// Opens readers for leaf descriptors.
///
/// The factory is the seam between this core and the physical source
/// formats it does not own; implementations decide how a local path or a
/// remote URL (with optional content identifier) becomes a reader.
pub trait ReaderFactory: Send + Sync {
    /// Opens a reader for a leaf descriptor.
    ///
    /// # Errors
    /// - `PlayerError::SourceUnavailable` - the leaf cannot be opened, or
    ///   the descriptor is not a leaf
    fn open(&self, leaf: &DataSourceDescriptor) -> Result<Box<dyn RecordReader>, PlayerError>;
}
