//! Slipstream Core - Player composition and data-source tree
//!
//! This crate provides the building blocks that feed a time-series
//! visualization tool with a uniform stream of timestamped messages:
//! descriptor trees describing how physical sources combine into one
//! logical stream, base players for recorded, live, and headless-capture
//! sources, decorators layering user transforms and ordering correction
//! onto any player, and the orchestrator owning the single current
//! composed player.

pub mod config;
pub mod descriptor;
pub mod message;
pub mod mode;
pub mod orchestrator;
pub mod player;
pub mod source;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SlipstreamConfig;
pub use descriptor::{DataSourceDescriptor, DescriptorError};
pub use message::{PlayerMessage, Timestamp};
pub use mode::SessionMode;
pub use orchestrator::{ComposeError, OrchestratorHandle, spawn_orchestrator};
pub use player::{MessageOrderingPolicy, Player, PlayerError};

/// Core errors that can bubble up from any Slipstream subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlipstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SlipstreamError::Player(e) => match e {
                PlayerError::Unseekable { player } => {
                    format!("This source ({player}) does not support seeking")
                }
                PlayerError::SourceUnavailable { source_name, .. } => {
                    format!("Could not open source: {source_name}")
                }
                PlayerError::Closed => "The player has been closed".to_string(),
                _ => "Playback error occurred".to_string(),
            },
            SlipstreamError::Descriptor(DescriptorError::UnsupportedInputCount { count }) => {
                format!("Cannot open {count} sources at once; at most 2 are supported")
            }
            SlipstreamError::Descriptor(_) => "Invalid source combination".to_string(),
            SlipstreamError::Compose(ComposeError::Superseded) => {
                "A newer source selection replaced this one".to_string()
            }
            SlipstreamError::Compose(_) => "Failed to load the selected sources".to_string(),
            SlipstreamError::Configuration { .. } => "Configuration error occurred".to_string(),
            SlipstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SlipstreamError::Configuration { .. }
                | SlipstreamError::Descriptor(DescriptorError::UnsupportedInputCount { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_count_errors_are_user_errors() {
        let error =
            SlipstreamError::from(DescriptorError::UnsupportedInputCount { count: 4 });
        assert!(error.is_user_error());
        assert!(error.user_message().contains('4'));
    }

    #[test]
    fn test_unseekable_message_names_the_player() {
        let error = SlipstreamError::from(PlayerError::Unseekable {
            player: "live-bridge",
        });
        assert!(!error.is_user_error());
        assert!(error.user_message().contains("live-bridge"));
    }
}
