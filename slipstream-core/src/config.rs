//! Centralized configuration for Slipstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::mode::SessionMode;

/// Central configuration for all Slipstream components.
///
/// Groups related configuration settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct SlipstreamConfig {
    pub mode: SessionMode,
    pub playback: PlaybackConfig,
    pub resolution: ResolutionConfig,
    pub transform: TransformConfig,
    pub capture: CaptureConfig,
}

/// Interactive playback configuration.
///
/// Controls how much playback time a single frame covers and how much
/// look-ahead the order-correction decorator buffers.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Playback time advanced per emitted frame.
    pub frame_interval: Duration,
    /// Look-ahead window buffered when resequencing by embedded timestamp.
    /// Messages are held back until playback time has advanced past their
    /// ordering key by this much.
    pub ordering_lookahead: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100), // 10 frames per second
            ordering_lookahead: Duration::from_secs(1),
        }
    }
}

/// Remote content-identifier resolution configuration.
///
/// Controls HTTP behavior and memoization for resolving stable content
/// identifiers from remote source URLs.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// HTTP request timeout for content-identifier resolution.
    pub request_timeout: Duration,
    /// User agent for HTTP requests.
    pub user_agent: &'static str,
    /// Maximum number of URL -> content-id entries memoized.
    pub content_id_cache_size: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: "slipstream/0.1.0",
            content_id_cache_size: 128,
        }
    }
}

/// User-transform decorator configuration.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Maximum log lines retained per transform program.
    pub max_log_lines: usize,
    /// Topic prefix sandboxed programs must publish under.
    pub output_topic_prefix: &'static str,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_log_lines: 100,
            output_topic_prefix: "/transform/",
        }
    }
}

/// Automated capture run configuration.
///
/// Automated runs step playback by a fixed frame duration with no
/// wall-clock dependence, so identical inputs produce identical captures.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Playback time covered by one captured frame.
    pub frame_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_duration: Duration::from_millis(40), // 25 fps capture
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_interactive() {
        let config = SlipstreamConfig::default();
        assert!(config.mode.is_interactive());
        assert_eq!(config.playback.frame_interval, Duration::from_millis(100));
        assert_eq!(config.playback.ordering_lookahead, Duration::from_secs(1));
    }

    #[test]
    fn test_transform_prefix_is_rooted() {
        let config = TransformConfig::default();
        assert!(config.output_topic_prefix.starts_with('/'));
        assert!(config.output_topic_prefix.ends_with('/'));
    }
}
