//! Slipstream Simulation - deterministic components for player testing.
//!
//! Provides seeded synthetic record sources, scripted bridge transports,
//! collecting capture sinks, and scriptable content-id resolvers, so the
//! player chain and orchestrator can be exercised under controlled,
//! reproducible conditions. The same seed always produces identical
//! message sequences.

pub mod bridge;
pub mod capture;
pub mod resolver;
pub mod source;

pub use bridge::{FailingBridgeConnector, ScriptedBridgeConnector, message_frame};
pub use capture::CollectingCaptureSink;
pub use resolver::ScriptedContentIdResolver;
pub use source::{SyntheticReaderFactory, SyntheticSourceConfig, generate_messages};
