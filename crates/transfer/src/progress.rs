use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Snapshot handed to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Bytes present remotely, resume baseline included. Never above `total`.
    pub transferred: u64,
    pub total: u64,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

/// Receives progress for one file. Called from a single task only.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, update: &ProgressUpdate);

    /// Called once after the last update.
    fn finish(&mut self) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressUpdate) + Send,
{
    fn on_progress(&mut self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Reports bytes written by chunk tasks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u64>,
}

impl ProgressReporter {
    pub fn report(&self, bytes: u64) {
        // The aggregator only goes away once every reporter is dropped.
        let _ = self.tx.send(bytes);
    }
}

/// Single consumer folding concurrent byte reports into one counter.
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Spawns the consumer task, starting the counter at `baseline`.
    ///
    /// The task calls [`ProgressSink::finish`] once every reporter has been
    /// dropped, then resolves to the sum of all reported bytes.
    pub fn start(
        baseline: u64,
        total: u64,
        mut sink: Box<dyn ProgressSink>,
    ) -> (ProgressReporter, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();

        let handle = tokio::spawn(async move {
            let mut speed = SpeedCalculator::new(None, None);
            let mut transferred = baseline.min(total);
            let mut reported = 0u64;

            sink.on_progress(&ProgressUpdate {
                transferred,
                total,
                bytes_per_second: 0.0,
                eta: None,
            });

            while let Some(bytes) = rx.recv().await {
                reported += bytes;
                transferred = transferred.saturating_add(bytes).min(total);
                speed.add_sample(bytes);
                sink.on_progress(&ProgressUpdate {
                    transferred,
                    total,
                    bytes_per_second: speed.bytes_per_second(),
                    eta: speed.eta(total - transferred),
                });
            }

            sink.finish();
            reported
        });

        (ProgressReporter { tx }, handle)
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(100),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(self.window_size) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample's bytes were sent before the window opened.
        let total_bytes: u64 = self.samples.iter().skip(1).map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }
}
