//! Throughput bookkeeping for tracks that are recording.

use std::collections::BTreeMap;
use std::time::Duration;

use studio_transport::TrackId;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackMetrics {
    started: Duration,
    chunks: usize,
    total_bytes: usize,
    last_chunk: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub duration: Duration,
    pub chunks: usize,
    pub total_bytes: usize,
    pub average_chunk_bytes: f64,
    /// Bytes per second since monitoring started.
    pub data_rate: f64,
    pub since_last_chunk: Duration,
}

#[derive(Debug, Default)]
pub struct RecordingMonitor {
    metrics: BTreeMap<TrackId, TrackMetrics>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or restart) monitoring `track`.
    pub fn start(&mut self, track: TrackId, now: Duration) {
        self.metrics.insert(
            track,
            TrackMetrics {
                started: now,
                chunks: 0,
                total_bytes: 0,
                last_chunk: now,
            },
        );
    }

    pub fn record_chunk(&mut self, track: TrackId, bytes: usize, now: Duration) {
        if let Some(metric) = self.metrics.get_mut(&track) {
            metric.chunks += 1;
            metric.total_bytes += bytes;
            metric.last_chunk = now;
        }
    }

    pub fn snapshot(&self, track: TrackId, now: Duration) -> Option<MetricsSnapshot> {
        let metric = self.metrics.get(&track)?;
        let duration = now.saturating_sub(metric.started);

        let average_chunk_bytes = if metric.chunks == 0 {
            0.0
        } else {
            metric.total_bytes as f64 / metric.chunks as f64
        };
        let data_rate = if duration.is_zero() {
            0.0
        } else {
            metric.total_bytes as f64 / duration.as_secs_f64()
        };

        Some(MetricsSnapshot {
            duration,
            chunks: metric.chunks,
            total_bytes: metric.total_bytes,
            average_chunk_bytes,
            data_rate,
            since_last_chunk: now.saturating_sub(metric.last_chunk),
        })
    }

    /// Stop monitoring `track`, returning its final figures.
    pub fn finish(&mut self, track: TrackId, now: Duration) -> Option<MetricsSnapshot> {
        let snapshot = self.snapshot(track, now);
        self.metrics.remove(&track);
        snapshot
    }
}
