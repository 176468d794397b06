//! Session mode configuration for Slipstream.

use serde::{Deserialize, Serialize};

/// Session mode for player construction.
///
/// Controls whether playback is interactive or a headless automated capture
/// run. Automated mode always selects the deterministic capture player for
/// recorded-data inputs, regardless of how many inputs were supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Interactive mode - seekable playback driven by a user.
    Interactive,
    /// Automated mode - headless, deterministic, frame-captured playback.
    Automated,
}

impl SessionMode {
    /// Check if running an automated capture session.
    pub fn is_automated(self) -> bool {
        matches!(self, Self::Automated)
    }

    /// Check if running an interactive session.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Interactive)
    }
}

impl Default for SessionMode {
    fn default() -> Self {
        Self::Interactive
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interactive => write!(f, "INTERACTIVE"),
            Self::Automated => write!(f, "AUTOMATED"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "automated" | "headless" => Ok(Self::Automated),
            _ => Err(format!(
                "Invalid session mode: '{s}'. Valid options are: interactive, automated"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("automated".parse::<SessionMode>(), Ok(SessionMode::Automated));
        assert_eq!("headless".parse::<SessionMode>(), Ok(SessionMode::Automated));
        assert_eq!(
            "Interactive".parse::<SessionMode>(),
            Ok(SessionMode::Interactive)
        );
        assert!("batch".parse::<SessionMode>().is_err());
    }

    #[test]
    fn test_default_is_interactive() {
        assert!(SessionMode::default().is_interactive());
    }
}
