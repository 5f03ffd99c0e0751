//! Animation-frame scheduling seam.
//!
//! The into-view loop runs one iteration per frame. Production uses a
//! ~16 ms interval; tests inject the immediate scheduler.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends callers until the next animation frame.
#[async_trait]
pub trait FrameScheduler: Send + Sync {
    async fn next_frame(&self);
}

/// Frame scheduler ticking at a fixed interval (default ~60 Hz).
#[derive(Debug, Clone)]
pub struct IntervalFrames {
    interval: Duration,
}

impl IntervalFrames {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for IntervalFrames {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl FrameScheduler for IntervalFrames {
    async fn next_frame(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

/// Frame scheduler that yields immediately; for tests.
#[derive(Debug, Clone, Default)]
pub struct ImmediateFrames;

#[async_trait]
impl FrameScheduler for ImmediateFrames {
    async fn next_frame(&self) {
        tokio::task::yield_now().await;
    }
}
