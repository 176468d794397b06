//! Collecting capture sinks.

use std::sync::Arc;

use parking_lot::Mutex;
use slipstream_core::orchestrator::CaptureSinkProvider;
use slipstream_core::player::{CaptureProgress, CaptureSink};

/// Capture sink accumulating progress into shared storage.
///
/// Clones share the same storage, and the sink doubles as a
/// [`CaptureSinkProvider`], so a test can hand it to the orchestrator and
/// later read everything any composed automated run reported.
#[derive(Debug, Clone, Default)]
pub struct CollectingCaptureSink {
    progress: Arc<Mutex<Vec<CaptureProgress>>>,
    completions: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl CollectingCaptureSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All progress notifications received so far, in order.
    pub fn progress(&self) -> Vec<CaptureProgress> {
        self.progress.lock().clone()
    }

    /// All `(total_frames, total_messages)` completion notifications.
    pub fn completions(&self) -> Vec<(u64, usize)> {
        self.completions.lock().clone()
    }
}

impl CaptureSink for CollectingCaptureSink {
    fn frame_emitted(&mut self, progress: CaptureProgress) {
        self.progress.lock().push(progress);
    }

    fn run_complete(&mut self, total_frames: u64, total_messages: usize) {
        self.completions.lock().push((total_frames, total_messages));
    }
}

impl CaptureSinkProvider for CollectingCaptureSink {
    fn create(&self) -> Box<dyn CaptureSink> {
        Box::new(self.clone())
    }
}
