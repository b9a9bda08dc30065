//! Transfer speed over a sliding window, for the progress line.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct SpeedMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    max_samples: usize,
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl SpeedMeter {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            max_samples: max_samples.max(2),
        }
    }

    /// Records the running byte count.
    pub fn record(&mut self, total_bytes: u64) {
        self.record_at(total_bytes, Instant::now());
    }

    fn record_at(&mut self, total_bytes: u64, now: Instant) {
        self.samples.push_back((now, total_bytes));
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) <= self.window && self.samples.len() <= self.max_samples {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Average bytes per second across the window; 0.0 with fewer than two
    /// samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last_at.duration_since(first_at).as_secs_f64();
        if self.samples.len() < 2 || elapsed <= 0.0 {
            return 0.0;
        }
        last.saturating_sub(first) as f64 / elapsed
    }

    /// Estimated time until `total` bytes, if the speed is known.
    pub fn eta(&self, total: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        let done = self.samples.back().map(|&(_, b)| b)?;
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            total.saturating_sub(done) as f64 / speed,
        ))
    }
}

/// Formats a byte count with binary units, e.g. `1.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
