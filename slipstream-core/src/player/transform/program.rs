//! Transform program compilation and evaluation.
//!
//! Program source is a declarative JSON mapping: an input topic, an output
//! topic, and a set of field projections (payload path plus optional
//! numeric scale). Compilation validates the source against the trust
//! rules; evaluation projects one input message into one derived message.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::TrustLevel;
use crate::message::PlayerMessage;

/// Fault raised by a user-authored transform program.
///
/// Faults are isolated to the raising program: its output is omitted and
/// its diagnostics updated, while the underlying stream and every other
/// program continue untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserProgramFault {
    /// The source text is not a valid program.
    #[error("Invalid program source: {reason}")]
    InvalidSource {
        /// Description of the parse/validation failure.
        reason: String,
    },

    /// A sandboxed program tried to publish outside the transform prefix.
    #[error("Output topic {topic} not permitted: sandboxed programs must publish under {prefix}")]
    OutputTopicNotPermitted {
        /// The offending output topic.
        topic: String,
        /// The required prefix.
        prefix: String,
    },

    /// A projected field is missing from the message payload.
    #[error("Input field '{path}' missing from message on {topic}")]
    MissingField {
        /// Dotted payload path that failed to resolve.
        path: String,
        /// Topic of the offending message.
        topic: String,
    },

    /// A scaled field did not hold a numeric value.
    #[error("Input field '{path}' is not numeric and cannot be scaled")]
    NotNumeric {
        /// Dotted payload path of the non-numeric value.
        path: String,
    },
}

/// Raw program source as written by the user.
#[derive(Debug, Deserialize)]
struct ProgramSource {
    input_topic: String,
    output_topic: String,
    fields: BTreeMap<String, FieldSource>,
    #[serde(default)]
    log: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldSource {
    path: String,
    #[serde(default)]
    scale: Option<f64>,
}

/// One output field: dotted payload path plus optional scale factor.
#[derive(Debug, Clone)]
struct FieldProjection {
    path: Vec<String>,
    scale: Option<f64>,
}

/// Output of evaluating a program against one message.
#[derive(Debug, Clone)]
pub(crate) struct TransformOutput {
    /// The derived message, stamped like its input.
    pub message: PlayerMessage,
    /// Log line the program appended for this message, if any.
    pub log_line: Option<String>,
}

/// A validated, ready-to-run transform program.
#[derive(Debug, Clone)]
pub struct CompiledTransform {
    input_topic: String,
    output_topic: String,
    fields: BTreeMap<String, FieldProjection>,
    log_path: Option<Vec<String>>,
}

impl CompiledTransform {
    /// Compiles program source, enforcing the trust rules.
    ///
    /// # Errors
    /// - `UserProgramFault::InvalidSource` - malformed or incomplete source
    /// - `UserProgramFault::OutputTopicNotPermitted` - sandboxed program
    ///   publishing outside `output_prefix`
    pub fn compile(
        source: &str,
        trust: TrustLevel,
        output_prefix: &str,
    ) -> Result<Self, UserProgramFault> {
        let parsed: ProgramSource =
            serde_json::from_str(source).map_err(|e| UserProgramFault::InvalidSource {
                reason: e.to_string(),
            })?;

        if parsed.input_topic.is_empty() {
            return Err(UserProgramFault::InvalidSource {
                reason: "input_topic must not be empty".to_string(),
            });
        }
        if parsed.output_topic.is_empty() {
            return Err(UserProgramFault::InvalidSource {
                reason: "output_topic must not be empty".to_string(),
            });
        }
        if parsed.fields.is_empty() {
            return Err(UserProgramFault::InvalidSource {
                reason: "at least one output field is required".to_string(),
            });
        }
        if trust == TrustLevel::Sandboxed && !parsed.output_topic.starts_with(output_prefix) {
            return Err(UserProgramFault::OutputTopicNotPermitted {
                topic: parsed.output_topic,
                prefix: output_prefix.to_string(),
            });
        }

        let fields = parsed
            .fields
            .into_iter()
            .map(|(name, field)| {
                let path = parse_path(&field.path)?;
                Ok((
                    name,
                    FieldProjection {
                        path,
                        scale: field.scale,
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>, UserProgramFault>>()?;

        let log_path = parsed.log.as_deref().map(parse_path).transpose()?;

        Ok(Self {
            input_topic: parsed.input_topic,
            output_topic: parsed.output_topic,
            fields,
            log_path,
        })
    }

    /// Topic this program consumes.
    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    /// Topic this program publishes derived messages on.
    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Evaluates the program against one message.
    ///
    /// # Errors
    /// - `UserProgramFault::MissingField` - a projected path is absent
    /// - `UserProgramFault::NotNumeric` - a scaled path is not a number
    pub(crate) fn apply(&self, input: &PlayerMessage) -> Result<TransformOutput, UserProgramFault> {
        let mut output = serde_json::Map::new();
        for (name, projection) in &self.fields {
            let value =
                lookup(&input.payload, &projection.path).ok_or(UserProgramFault::MissingField {
                    path: projection.path.join("."),
                    topic: input.topic.clone(),
                })?;

            let value = match projection.scale {
                None => value.clone(),
                Some(scale) => {
                    let number = value.as_f64().ok_or(UserProgramFault::NotNumeric {
                        path: projection.path.join("."),
                    })?;
                    serde_json::Value::from(number * scale)
                }
            };
            output.insert(name.clone(), value);
        }

        let log_line = match &self.log_path {
            None => None,
            Some(path) => {
                let value = lookup(&input.payload, path).ok_or(UserProgramFault::MissingField {
                    path: path.join("."),
                    topic: input.topic.clone(),
                })?;
                Some(stringify(value))
            }
        };

        let mut message = PlayerMessage::new(
            self.output_topic.clone(),
            input.receive_time,
            serde_json::Value::Object(output),
        );
        // Derived messages inherit the input's ordering key.
        message.header_time = input.header_time;

        Ok(TransformOutput { message, log_line })
    }
}

/// Splits a dotted path into segments, rejecting empty ones.
fn parse_path(path: &str) -> Result<Vec<String>, UserProgramFault> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(UserProgramFault::InvalidSource {
            reason: format!("invalid field path '{path}'"),
        });
    }
    Ok(path.split('.').map(str::to_string).collect())
}

fn lookup<'a>(payload: &'a serde_json::Value, path: &[String]) -> Option<&'a serde_json::Value> {
    let mut current = payload;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::Timestamp;

    const PREFIX: &str = "/transform/";

    fn speed_program() -> CompiledTransform {
        CompiledTransform::compile(
            r#"{
                "input_topic": "/odom",
                "output_topic": "/transform/speed_kmh",
                "fields": {
                    "kmh": {"path": "vel.x", "scale": 3.6},
                    "frame": {"path": "frame_id"}
                },
                "log": "frame_id"
            }"#,
            TrustLevel::Sandboxed,
            PREFIX,
        )
        .expect("compiles")
    }

    #[test]
    fn test_apply_projects_and_scales_fields() {
        let program = speed_program();
        let input = PlayerMessage::new(
            "/odom",
            Timestamp::from_secs(5),
            json!({"vel": {"x": 10.0}, "frame_id": "base"}),
        );

        let output = program.apply(&input).expect("applies");
        assert_eq!(output.message.topic, "/transform/speed_kmh");
        assert_eq!(output.message.receive_time, Timestamp::from_secs(5));
        assert_eq!(output.message.payload["kmh"], 36.0);
        assert_eq!(output.message.payload["frame"], "base");
        assert_eq!(output.log_line.as_deref(), Some("base"));
    }

    #[test]
    fn test_missing_field_is_a_fault_with_context() {
        let program = speed_program();
        let input = PlayerMessage::new("/odom", Timestamp::from_secs(5), json!({"frame_id": "x"}));

        let fault = program.apply(&input).unwrap_err();
        match fault {
            UserProgramFault::MissingField { path, topic } => {
                assert_eq!(path, "vel.x");
                assert_eq!(topic, "/odom");
            }
            other => panic!("unexpected fault: {other}"),
        }
    }

    #[test]
    fn test_scaling_non_numeric_field_is_a_fault() {
        let program = CompiledTransform::compile(
            r#"{"input_topic": "/a", "output_topic": "/transform/out",
                "fields": {"v": {"path": "name", "scale": 2.0}}}"#,
            TrustLevel::Sandboxed,
            PREFIX,
        )
        .expect("compiles");
        let input = PlayerMessage::new("/a", Timestamp::from_secs(1), json!({"name": "bob"}));
        assert!(matches!(
            program.apply(&input).unwrap_err(),
            UserProgramFault::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_malformed_source_fails_compilation() {
        let fault =
            CompiledTransform::compile("not json at all", TrustLevel::Sandboxed, PREFIX)
                .unwrap_err();
        assert!(matches!(fault, UserProgramFault::InvalidSource { .. }));
    }

    #[test]
    fn test_sandboxed_output_topic_is_confined() {
        let source = r#"{"input_topic": "/a", "output_topic": "/anywhere",
                         "fields": {"v": {"path": "x"}}}"#;
        let fault = CompiledTransform::compile(source, TrustLevel::Sandboxed, PREFIX).unwrap_err();
        assert!(matches!(
            fault,
            UserProgramFault::OutputTopicNotPermitted { .. }
        ));

        // The same source compiles once trusted.
        assert!(CompiledTransform::compile(source, TrustLevel::Trusted, PREFIX).is_ok());
    }

    #[test]
    fn test_derived_message_inherits_ordering_key() {
        let program = speed_program();
        let input = PlayerMessage::with_header_time(
            "/odom",
            Timestamp::from_secs(5),
            Timestamp::from_secs(3),
            json!({"vel": {"x": 1.0}, "frame_id": "base"}),
        );
        let output = program.apply(&input).expect("applies");
        assert_eq!(output.message.header_time, Some(Timestamp::from_secs(3)));
    }
}
