//! Operation counters and per-operation duration rings

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Samples retained per operation name
pub const MAX_SAMPLES: usize = 100;

#[derive(Debug, Default)]
struct OperationMetric {
    samples: VecDeque<f64>,
    average_ms: f64,
    total_runs: u64,
}

impl OperationMetric {
    fn record(&mut self, duration_ms: f64) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);
        self.total_runs += 1;
        self.average_ms = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
    }

    fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            samples: self.samples.len(),
            total_runs: self.total_runs,
            average_ms: self.average_ms,
            min_ms: self.samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: self.samples.iter().copied().fold(0.0, f64::max),
            last_ms: self.samples.back().copied().unwrap_or_default(),
        }
    }
}

/// Per-operation view inside [`PerformanceMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub samples: usize,
    pub total_runs: u64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Read-only snapshot returned by `Manager::performance_metrics`
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub operation_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub operations: BTreeMap<String, OperationSnapshot>,
}

#[derive(Debug, Default)]
pub struct Metrics {
    operations: AtomicU64,
    errors: AtomicU64,
    per_operation: Mutex<HashMap<String, OperationMetric>>,
    started: Mutex<Option<(Instant, DateTime<Utc>)>>,
}

// Counters and rings stay valid after a panicking holder
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        *lock(&self.started) = Some((Instant::now(), Utc::now()));
    }

    pub fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, operation: &str, duration: Duration) {
        lock(&self.per_operation)
            .entry(operation.to_string())
            .or_default()
            .record(duration.as_secs_f64() * 1000.0);
    }

    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Retained samples for one operation, oldest first
    pub fn samples(&self, operation: &str) -> Vec<f64> {
        lock(&self.per_operation)
            .get(operation)
            .map(|m| m.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn average(&self, operation: &str) -> Option<f64> {
        lock(&self.per_operation).get(operation).map(|m| m.average_ms)
    }

    pub fn uptime(&self) -> Duration {
        lock(&self.started)
            .as_ref()
            .map(|(instant, _)| instant.elapsed())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        let operation_count = self.operation_count();
        let error_count = self.error_count();
        let operations = lock(&self.per_operation)
            .iter()
            .map(|(k, v)| (k.clone(), v.snapshot()))
            .collect();
        let started_at = lock(&self.started).as_ref().map(|(_, at)| *at);

        PerformanceMetrics {
            started_at,
            uptime_secs: self.uptime().as_secs(),
            operation_count,
            error_count,
            error_rate: if operation_count == 0 {
                0.0
            } else {
                error_count as f64 / operation_count as f64
            },
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_capped_and_average_matches_retained() {
        let metrics = Metrics::new();
        for i in 1..=250u64 {
            metrics.record_duration("balance", Duration::from_millis(i));
        }

        let samples = metrics.samples("balance");
        assert_eq!(samples.len(), MAX_SAMPLES);
        // Oldest retained sample is the 151st
        assert!((samples[0] - 151.0).abs() < 1e-6);

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let average = metrics.average("balance").unwrap();
        assert!((average - mean).abs() < 1e-9);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations["balance"].total_runs, 250);
        assert_eq!(snapshot.operations["balance"].samples, MAX_SAMPLES);
    }

    #[test]
    fn test_recording_continues_after_poisoned_lock() {
        let metrics = std::sync::Arc::new(Metrics::new());
        metrics.record_duration("transfer", Duration::from_millis(4));

        let held = metrics.clone();
        let panicked = std::thread::spawn(move || {
            let _map = held.per_operation.lock().unwrap();
            panic!("poison the ring map");
        })
        .join();
        assert!(panicked.is_err());
        assert!(metrics.per_operation.is_poisoned());

        metrics.record_duration("transfer", Duration::from_millis(8));
        assert_eq!(metrics.samples("transfer").len(), 2);
        assert!((metrics.average("transfer").unwrap() - 6.0).abs() < 1e-9);
        assert_eq!(metrics.snapshot().operations["transfer"].total_runs, 2);
    }

    #[test]
    fn test_error_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().error_rate, 0.0);
        for _ in 0..4 {
            metrics.record_operation();
        }
        metrics.record_error();
        assert_eq!(metrics.snapshot().error_rate, 0.25);
    }
}
