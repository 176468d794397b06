//! User-transform decorator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::info;

use super::program::{CompiledTransform, TransformOutput};
use super::{
    DiagnosticStage, ProgramStatus, TransformDiagnostic, TransformPrograms, TrustLevel,
    TrustRegistry, generate_interface,
};
use crate::config::TransformConfig;
use crate::message::{Timestamp, TopicInfo};
use crate::player::{
    MessageOrderingPolicy, PlaybackState, Player, PlayerError, PlayerFrame,
};

/// Per-program state held by the decorator.
struct ProgramEntry {
    trust: TrustLevel,
    compiled: Option<CompiledTransform>,
    compile_diagnostics: Vec<TransformDiagnostic>,
    runtime_diagnostics: Vec<TransformDiagnostic>,
    log_lines: Vec<String>,
}

/// Decorator running user-authored transform programs over every message.
///
/// Derived messages are appended to each frame after the originals. A
/// program fault updates that program's diagnostics and omits its output
/// for the offending message; delivery of the underlying stream and of
/// every other program's output continues. All other player operations are
/// forwarded to the wrapped player unchanged.
pub struct UserTransformPlayer {
    inner: Box<dyn Player>,
    programs: BTreeMap<String, ProgramEntry>,
    registry: TrustRegistry,
    config: TransformConfig,
}

impl UserTransformPlayer {
    /// Wraps `inner` with an empty program set.
    pub fn new(inner: Box<dyn Player>, registry: TrustRegistry, config: TransformConfig) -> Self {
        Self {
            inner,
            programs: BTreeMap::new(),
            registry,
            config,
        }
    }

    fn append_log_line(entry: &mut ProgramEntry, line: String, max_log_lines: usize) {
        entry.log_lines.push(line);
        let excess = entry.log_lines.len().saturating_sub(max_log_lines);
        if excess > 0 {
            entry.log_lines.drain(..excess);
        }
    }
}

#[async_trait]
impl Player for UserTransformPlayer {
    fn name(&self) -> &'static str {
        "user-transform"
    }

    fn playback_state(&self) -> PlaybackState {
        self.inner.playback_state()
    }

    fn topics(&self) -> Vec<TopicInfo> {
        let mut topics = self.inner.topics();
        for entry in self.programs.values() {
            if let Some(program) = &entry.compiled {
                topics.push(TopicInfo::new(program.output_topic(), "transform/Message"));
            }
        }
        topics
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.inner.play().await
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.inner.pause().await
    }

    async fn seek(&mut self, target: Timestamp) -> Result<(), PlayerError> {
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
        self.inner.set_message_ordering(policy);
    }

    fn set_transform_programs(&mut self, programs: TransformPrograms) {
        let mut compiled_count = 0;
        self.programs = programs
            .into_iter()
            .map(|(name, source)| {
                let trust = self.registry.classify(&source);
                let entry = match CompiledTransform::compile(
                    &source,
                    trust,
                    self.config.output_topic_prefix,
                ) {
                    Ok(program) => {
                        compiled_count += 1;
                        ProgramEntry {
                            trust,
                            compiled: Some(program),
                            compile_diagnostics: Vec::new(),
                            runtime_diagnostics: Vec::new(),
                            log_lines: Vec::new(),
                        }
                    }
                    Err(fault) => ProgramEntry {
                        trust,
                        compiled: None,
                        compile_diagnostics: vec![TransformDiagnostic {
                            program: name.clone(),
                            stage: DiagnosticStage::Compile,
                            message: fault.to_string(),
                        }],
                        runtime_diagnostics: Vec::new(),
                        log_lines: Vec::new(),
                    },
                };
                (name, entry)
            })
            .collect();
        info!(
            total = self.programs.len(),
            compiled = compiled_count,
            "Transform programs replaced"
        );
    }

    fn transform_status(&self) -> Vec<ProgramStatus> {
        self.programs
            .iter()
            .map(|(name, entry)| {
                let mut diagnostics = entry.compile_diagnostics.clone();
                diagnostics.extend(entry.runtime_diagnostics.iter().cloned());
                ProgramStatus {
                    name: name.clone(),
                    trust: entry.trust,
                    output_topic: entry
                        .compiled
                        .as_ref()
                        .map(|program| program.output_topic().to_string()),
                    diagnostics,
                    log_lines: entry.log_lines.clone(),
                }
            })
            .collect()
    }

    fn interface_artifact(&self) -> Option<String> {
        Some(generate_interface(&self.inner.topics()))
    }

    async fn next_frame(&mut self) -> Result<Option<PlayerFrame>, PlayerError> {
        let Some(mut frame) = self.inner.next_frame().await? else {
            return Ok(None);
        };

        let max_log_lines = self.config.max_log_lines;
        let mut derived = Vec::new();
        let mut raised = Vec::new();

        for (name, entry) in &mut self.programs {
            let Some(program) = entry.compiled.clone() else {
                continue;
            };

            let mut faults = Vec::new();
            let mut ran = false;
            for message in &frame.messages {
                if message.topic != program.input_topic() {
                    continue;
                }
                ran = true;
                match program.apply(message) {
                    Ok(TransformOutput { message, log_line }) => {
                        derived.push(message);
                        if let Some(line) = log_line {
                            Self::append_log_line(entry, line, max_log_lines);
                        }
                    }
                    Err(fault) => faults.push(TransformDiagnostic {
                        program: name.clone(),
                        stage: DiagnosticStage::Runtime,
                        message: fault.to_string(),
                    }),
                }
            }

            // Runtime diagnostics track the most recent batch the program
            // actually saw; an idle frame leaves them untouched.
            if ran {
                raised.extend(faults.iter().cloned());
                entry.runtime_diagnostics = faults;
            }
        }

        frame.messages.extend(derived);
        frame.diagnostics.extend(raised);
        Ok(Some(frame))
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.inner.close().await
    }
}
