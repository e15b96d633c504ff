//! Hot-path performance counters.
//!
//! Latency is recorded per processed event into a bounded sample ring
//! (p99/max) plus running totals (average). Keys-per-second is a sliding
//! five-second window. CPU usage is a best-effort read of `/proc/self/stat`
//! deltas on Linux and reports 0.0 elsewhere.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const LATENCY_RING_CAP: usize = 4096;
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Point-in-time view served over IPC and the notification bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub latency_avg_ns: u64,
    pub latency_p99_ns: u64,
    pub latency_max_ns: u64,
    pub cpu_usage_percent: f64,
    pub keys_per_second: f64,
}

#[derive(Default)]
pub struct Metrics {
    key_count: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_max_ns: AtomicU64,
    samples: Mutex<VecDeque<u64>>,
    stamps: Mutex<VecDeque<Instant>>,
    cpu: Mutex<Option<CpuSample>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration) {
        let ns = latency.as_nanos() as u64;
        self.key_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.latency_max_ns.fetch_max(ns, Ordering::Relaxed);

        let mut samples = self.samples.lock().expect("metrics samples poisoned");
        if samples.len() == LATENCY_RING_CAP {
            samples.pop_front();
        }
        samples.push_back(ns);
        drop(samples);

        let now = Instant::now();
        let mut stamps = self.stamps.lock().expect("metrics stamps poisoned");
        stamps.push_back(now);
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) > RATE_WINDOW {
                stamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn key_count(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.key_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_ns.load(Ordering::Relaxed);
        let avg = if count == 0 { 0 } else { sum / count };

        let p99 = {
            let samples = self.samples.lock().expect("metrics samples poisoned");
            percentile_99(&samples)
        };

        let keys_per_second = {
            let stamps = self.stamps.lock().expect("metrics stamps poisoned");
            match (stamps.front(), stamps.back()) {
                (Some(first), Some(last)) if stamps.len() > 1 => {
                    let span = last.duration_since(*first).as_secs_f64();
                    if span > 0.0 {
                        (stamps.len() - 1) as f64 / span
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            }
        };

        MetricsSnapshot {
            latency_avg_ns: avg,
            latency_p99_ns: p99,
            latency_max_ns: self.latency_max_ns.load(Ordering::Relaxed),
            cpu_usage_percent: self.cpu_usage(),
            keys_per_second,
        }
    }

    fn cpu_usage(&self) -> f64 {
        let mut slot = self.cpu.lock().expect("metrics cpu poisoned");
        let Some(current) = CpuSample::take() else {
            return 0.0;
        };
        let usage = match slot.as_ref() {
            Some(prev) => {
                let wall = current.at.duration_since(prev.at).as_secs_f64();
                if wall > 0.0 {
                    let ticks = current.ticks.saturating_sub(prev.ticks) as f64;
                    // USER_HZ clock ticks; 100 on every mainstream Linux.
                    (ticks / 100.0 / wall * 100.0).min(100.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        *slot = Some(current);
        usage
    }
}

struct CpuSample {
    ticks: u64,
    at: Instant,
}

impl CpuSample {
    #[cfg(target_os = "linux")]
    fn take() -> Option<Self> {
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        // Skip past the parenthesized comm field, which may contain spaces.
        let rest = stat.rsplit_once(')').map(|(_, r)| r)?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // Fields after comm: state is index 0, utime is index 11, stime 12.
        let utime: u64 = fields.get(11)?.parse().ok()?;
        let stime: u64 = fields.get(12)?.parse().ok()?;
        Some(Self {
            ticks: utime + stime,
            at: Instant::now(),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn take() -> Option<Self> {
        None
    }
}

fn percentile_99(samples: &VecDeque<u64>) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let rank = (sorted.len() as f64 * 0.99).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_report_zeroes() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.latency_avg_ns, 0);
        assert_eq!(snap.latency_p99_ns, 0);
        assert_eq!(snap.latency_max_ns, 0);
        assert_eq!(snap.keys_per_second, 0.0);
    }

    #[test]
    fn latency_aggregates_track_recordings() {
        let metrics = Metrics::new();
        for ns in [100u64, 200, 300, 400] {
            metrics.record(Duration::from_nanos(ns));
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.latency_avg_ns, 250);
        assert_eq!(snap.latency_max_ns, 400);
        assert_eq!(snap.latency_p99_ns, 400);
        assert_eq!(metrics.key_count(), 4);
    }

    #[test]
    fn p99_ignores_the_extreme_tail() {
        let metrics = Metrics::new();
        for _ in 0..99 {
            metrics.record(Duration::from_nanos(100));
        }
        metrics.record(Duration::from_nanos(10_000));
        let snap = metrics.snapshot();
        // The 99th percentile of 100 samples is the 99th sorted value.
        assert_eq!(snap.latency_p99_ns, 100);
        assert_eq!(snap.latency_max_ns, 10_000);
    }

    #[test]
    fn sample_ring_stays_bounded() {
        let metrics = Metrics::new();
        for i in 0..(LATENCY_RING_CAP + 100) {
            metrics.record(Duration::from_nanos(i as u64));
        }
        assert_eq!(metrics.samples.lock().unwrap().len(), LATENCY_RING_CAP);
    }
}
