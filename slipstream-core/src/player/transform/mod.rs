//! User-authored stream transforms.
//!
//! Transform programs are supplied externally as named source texts, run
//! against every message the wrapped player emits, and produce derived
//! messages on their own output topics. Each program carries its own
//! diagnostics, log lines, and trust classification; a fault in one program
//! never interrupts delivery for the underlying stream or for the others.

pub mod player;
pub mod program;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

pub use player::UserTransformPlayer;
pub use program::{CompiledTransform, UserProgramFault};

use crate::descriptor::ContentId;
use crate::message::TopicInfo;

/// Mapping from program name to program source text.
pub type TransformPrograms = BTreeMap<String, String>;

/// Privilege level assigned to a transform program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Default level: output topics are confined to the transform prefix.
    Sandboxed,
    /// Explicitly vetted source: may publish to any output topic.
    Trusted,
}

/// Which phase of a program's lifecycle raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticStage {
    /// Raised while compiling the program source.
    Compile,
    /// Raised while running the program against a message.
    Runtime,
}

/// A single diagnostic attributed to one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDiagnostic {
    /// Name of the program that raised the diagnostic.
    pub program: String,
    /// Lifecycle phase the diagnostic belongs to.
    pub stage: DiagnosticStage,
    /// Human-readable description, actionable without further context.
    pub message: String,
}

/// Externally visible state of one transform program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramStatus {
    /// Program name as supplied by the caller.
    pub name: String,
    /// Trust classification derived from the source digest.
    pub trust: TrustLevel,
    /// Output topic, when the program compiled.
    pub output_topic: Option<String>,
    /// Current diagnostics (compile errors persist until the source
    /// changes; runtime faults persist until the program next succeeds).
    pub diagnostics: Vec<TransformDiagnostic>,
    /// Log lines the program has appended, oldest first, capped.
    pub log_lines: Vec<String>,
}

/// Registry of vetted program sources.
///
/// Trust follows the source text itself: a program is trusted only while
/// its SHA-1 digest matches one that was explicitly registered, so editing
/// a trusted program silently demotes it to sandboxed.
#[derive(Debug, Clone, Default)]
pub struct TrustRegistry {
    trusted: HashSet<ContentId>,
}

impl TrustRegistry {
    /// Creates an empty registry; every program classifies as sandboxed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source text as trusted.
    pub fn register_trusted(&mut self, source: &str) {
        self.trusted.insert(Self::digest(source));
    }

    /// Classifies a source text.
    pub fn classify(&self, source: &str) -> TrustLevel {
        if self.trusted.contains(&Self::digest(source)) {
            TrustLevel::Trusted
        } else {
            TrustLevel::Sandboxed
        }
    }

    fn digest(source: &str) -> ContentId {
        ContentId::digest_of(&[source.as_bytes()])
    }
}

/// Generates the typing artifact describing available input topics.
///
/// The artifact is handed to the external program-editing surface so users
/// can see what their programs may read. Topics are sorted for stable
/// output.
pub fn generate_interface(topics: &[TopicInfo]) -> String {
    let mut lines = vec!["// Generated input interface. Do not edit.".to_string()];
    let mut sorted: Vec<&TopicInfo> = topics.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for topic in sorted {
        lines.push(format!("input \"{}\": {}", topic.name, topic.datatype));
    }
    lines.join("\n")
}
