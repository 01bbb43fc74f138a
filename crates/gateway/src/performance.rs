//! In-process latency tracking for gateway operations.
//!
//! Keeps the most recent samples per operation and reports percentiles
//! against the response-time targets.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::warn;

pub const AGENT_RESPONSE: &str = "agent_response";
pub const LLM_CALL: &str = "llm_call";
pub const PATTERN_ANALYSIS: &str = "pattern_analysis";

/// p95 target for a whole agent turn, in milliseconds.
pub const AGENT_TARGET_MS: f64 = 2000.0;
/// p95 target for the completion part of a turn, in milliseconds.
pub const LLM_TARGET_MS: f64 = 1500.0;

const MAX_SAMPLES: usize = 1000;

/// Summary of one operation's samples, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub target: f64,
    pub actual: f64,
    pub passing: bool,
}

impl Target {
    fn new(target: f64, stats: Option<PerformanceStats>) -> Self {
        let actual = stats.map(|s| s.p95).unwrap_or(0.0);
        Self {
            target,
            actual,
            passing: actual < target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    pub agent_response_time: Target,
    pub llm_call_time: Target,
}

impl Targets {
    pub fn passing(&self) -> bool {
        self.agent_response_time.passing && self.llm_call_time.passing
    }
}

#[derive(Default)]
pub struct PerformanceMonitor {
    samples: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample, keeping the newest 1000 per operation.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_micros() as f64 / 1000.0;
        if name.contains("agent") && ms > AGENT_TARGET_MS {
            warn!(operation = name, ms, "Slow agent response");
        }
        if name.contains("llm") && ms > LLM_TARGET_MS {
            warn!(operation = name, ms, "Slow completion call");
        }

        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        let series = samples.entry(name.to_string()).or_default();
        series.push_back(ms);
        if series.len() > MAX_SAMPLES {
            series.pop_front();
        }
    }

    pub fn stats(&self, name: &str) -> Option<PerformanceStats> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        summarize(samples.get(name)?)
    }

    pub fn all_stats(&self) -> BTreeMap<String, PerformanceStats> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        samples
            .iter()
            .filter_map(|(name, series)| Some((name.clone(), summarize(series)?)))
            .collect()
    }

    pub fn check_targets(&self) -> Targets {
        Targets {
            agent_response_time: Target::new(AGENT_TARGET_MS, self.stats(AGENT_RESPONSE)),
            llm_call_time: Target::new(LLM_TARGET_MS, self.stats(LLM_CALL)),
        }
    }
}

fn summarize(series: &VecDeque<f64>) -> Option<PerformanceStats> {
    if series.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = series.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let total: f64 = sorted.iter().sum();

    // Linear interpolation between the closest ranks
    let percentile = |p: f64| {
        let index = p / 100.0 * (count - 1) as f64;
        let lower = index.floor() as usize;
        let upper = index.ceil() as usize;
        let weight = index - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    };

    Some(PerformanceStats {
        count,
        total,
        average: total / count as f64,
        min: sorted[0],
        max: sorted[count - 1],
        p50: percentile(50.0),
        p95: percentile(95.0),
        p99: percentile(99.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn percentiles_interpolate() {
        let monitor = PerformanceMonitor::new();
        for n in 1..=5 {
            monitor.record("op", ms(n * 100));
        }
        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 500.0);
        assert_eq!(stats.average, 300.0);
        assert_eq!(stats.p50, 300.0);
        assert!((stats.p95 - 480.0).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let monitor = PerformanceMonitor::new();
        monitor.record(LLM_CALL, ms(42));
        let stats = monitor.stats(LLM_CALL).unwrap();
        assert_eq!((stats.p50, stats.p95, stats.p99), (42.0, 42.0, 42.0));
    }

    #[test]
    fn keeps_only_recent_samples() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..MAX_SAMPLES {
            monitor.record("op", ms(900));
        }
        monitor.record("op", ms(1));
        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.count, MAX_SAMPLES);
        assert_eq!(stats.min, 1.0);
    }

    #[test]
    fn targets_pass_without_samples_and_fail_when_slow() {
        let monitor = PerformanceMonitor::new();
        assert!(monitor.check_targets().passing());
        assert!(monitor.stats(AGENT_RESPONSE).is_none());

        monitor.record(AGENT_RESPONSE, ms(2500));
        let targets = monitor.check_targets();
        assert!(!targets.agent_response_time.passing);
        assert_eq!(targets.agent_response_time.actual, 2500.0);
        assert!(targets.llm_call_time.passing);

        let json = serde_json::to_value(&targets).unwrap();
        assert_eq!(json["agentResponseTime"]["target"], 2000.0);
        assert_eq!(monitor.all_stats().len(), 1);
    }
}
