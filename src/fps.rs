// Frames-per-second as "how many frames finished in the last second".
// Each frame pushes a timestamp; anything older than the window falls off the front.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct FrameCounter {
    samples: VecDeque<Instant>,
    window: Duration,
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameCounter {
    pub fn new(window: Duration) -> Self {
        Self { samples: VecDeque::with_capacity(256), window }
    }

    /// Record a frame at `now` and drop samples that left the window.
    pub fn record(&mut self, now: Instant) {
        self.samples.push_back(now);
        self.evict(now);
    }

    /// Drop every sample older than the window, measured from `now`.
    /// Samples are pushed in order, so only the front needs checking.
    pub fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.samples.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Frames in the last window.
    pub fn fps(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn samples(&self) -> impl Iterator<Item = &Instant> {
        self.samples.iter()
    }
}
