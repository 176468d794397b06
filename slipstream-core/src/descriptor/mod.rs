//! Declarative descriptor tree for logical data sources.
//!
//! A descriptor tree describes how one logical message source is built from
//! physical recorded-data sources: plain leaves for single files or URLs, a
//! combine node that merges two sources into one stream, and a rename node
//! that prefixes every topic a source produces. Trees are constructed once
//! per input-set change and are immutable afterwards; the playback engine
//! consuming a tree mirrors its shape when assembling readers.

pub mod resolve;

use std::fmt;
use std::path::PathBuf;

use sha1::{Digest, Sha1};
use url::Url;

pub use resolve::{
    ContentIdResolver, HttpContentIdResolver, RemoteSourceHandle, resolve_local, resolve_remote,
    resolve_remote_set,
};

/// Topic-name prefix applied to the second source of a two-source combine.
///
/// Keeps topic names from the two sources from colliding without the
/// underlying readers knowing they are being merged.
pub const SECOND_SOURCE_PREFIX: &str = "/source_2";

/// SHA-1 digest identifying remote source content.
///
/// 20-byte stable identifier derived from a remote source's validator
/// headers. Used by downstream readers to key caching and deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId([u8; 20]);

impl ContentId {
    /// Creates a ContentId from a 20-byte SHA-1 digest.
    pub fn new(digest: [u8; 20]) -> Self {
        Self(digest)
    }

    /// Computes a ContentId by hashing the given parts in order.
    pub fn digest_of(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Returns reference to the underlying 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Errors raised while constructing a descriptor tree.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// More inputs were supplied than the combine rule supports.
    #[error("Unsupported input count: {count} (at most 2 sources may be combined)")]
    UnsupportedInputCount { count: usize },

    /// A combine node was requested with fewer than two children.
    #[error("Combine requires at least 2 children, got {count}")]
    CombineTooFewChildren { count: usize },
}

/// Immutable tree describing how to construct a logical message source.
///
/// Modeled as a tagged sum type rather than trait objects: the tree is
/// small, closed, and inspected structurally, and derived equality keeps
/// the rebuild-idempotence property trivial to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceDescriptor {
    /// A single local recorded-data file.
    LocalFile {
        /// Location of the file on disk.
        path: PathBuf,
    },
    /// A single remote recorded-data file.
    RemoteFile {
        /// Source location.
        url: Url,
        /// Stable content identifier, absent when resolution failed or is
        /// unsupported for this URL.
        content_id: Option<ContentId>,
    },
    /// Merge of two or more child sources into one stream.
    Combine {
        /// Ordered children, merged by receive time.
        children: Vec<DataSourceDescriptor>,
    },
    /// A child source with a prefix applied to every topic name it produces.
    Rename {
        /// Prefix prepended to each topic name.
        prefix: String,
        /// The wrapped source.
        child: Box<DataSourceDescriptor>,
    },
}

impl DataSourceDescriptor {
    /// Creates a combine node, enforcing the two-child minimum.
    ///
    /// # Errors
    /// - `DescriptorError::CombineTooFewChildren` - fewer than 2 children
    pub fn combine(children: Vec<DataSourceDescriptor>) -> Result<Self, DescriptorError> {
        if children.len() < 2 {
            return Err(DescriptorError::CombineTooFewChildren {
                count: children.len(),
            });
        }
        Ok(Self::Combine { children })
    }

    /// Creates a rename node wrapping a single child.
    pub fn rename(prefix: impl Into<String>, child: DataSourceDescriptor) -> Self {
        Self::Rename {
            prefix: prefix.into(),
            child: Box::new(child),
        }
    }

    /// Returns true for leaf nodes (local or remote files).
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::LocalFile { .. } | Self::RemoteFile { .. })
    }

    /// Short human-readable summary of this node, used in player
    /// descriptions.
    pub fn summary(&self) -> String {
        match self {
            Self::LocalFile { path } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::RemoteFile { url, .. } => url.to_string(),
            Self::Combine { children } => children
                .iter()
                .map(DataSourceDescriptor::summary)
                .collect::<Vec<_>>()
                .join(" + "),
            Self::Rename { prefix, child } => {
                format!("{} (topics prefixed {prefix})", child.summary())
            }
        }
    }
}

/// Builds the descriptor tree for an ordered set of leaf descriptors.
///
/// Deterministic: the same count and order of inputs always produces the
/// same tree shape.
///
/// - 0 leaves -> `None` (callers treat this as "no active player")
/// - 1 leaf -> that leaf unchanged
/// - 2 leaves -> `Combine(first, Rename(SECOND_SOURCE_PREFIX, second))`
///
/// # Errors
/// - `DescriptorError::UnsupportedInputCount` - more than 2 leaves
pub fn build_tree(
    leaves: Vec<DataSourceDescriptor>,
) -> Result<Option<DataSourceDescriptor>, DescriptorError> {
    match leaves.len() {
        0 => Ok(None),
        1 => Ok(leaves.into_iter().next()),
        2 => {
            let mut iter = leaves.into_iter();
            let first = iter.next().expect("length checked");
            let second = iter.next().expect("length checked");
            let tree = DataSourceDescriptor::combine(vec![
                first,
                DataSourceDescriptor::rename(SECOND_SOURCE_PREFIX, second),
            ])?;
            Ok(Some(tree))
        }
        count => Err(DescriptorError::UnsupportedInputCount { count }),
    }
}
