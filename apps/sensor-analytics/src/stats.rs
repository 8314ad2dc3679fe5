use crate::reading::{Metric, Reading};
use serde::Serialize;

pub const DEFAULT_TREND_WINDOW: usize = 10;
pub const MIN_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub average: f64,
    /// Mean of the newest `trend_window` values minus the mean of the block just before them.
    pub trend: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub moisture: MetricStats,
    pub temperature: MetricStats,
    pub light: MetricStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsOutcome {
    Ready(Statistics),
    InsufficientData { count: usize },
}

impl StatsOutcome {
    pub fn statistics(&self) -> Option<&Statistics> {
        match self {
            StatsOutcome::Ready(stats) => Some(stats),
            StatsOutcome::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsEngine {
    trend_window: usize,
}

impl StatsEngine {
    pub fn new(trend_window: usize) -> Self {
        Self {
            trend_window: trend_window.max(1),
        }
    }

    pub fn trend_window(&self) -> usize {
        self.trend_window
    }

    pub fn compute(&self, series: &[Reading]) -> StatsOutcome {
        if series.len() < MIN_POINTS {
            return StatsOutcome::InsufficientData {
                count: series.len(),
            };
        }

        StatsOutcome::Ready(Statistics {
            moisture: self.metric_stats(series, Metric::Moisture),
            temperature: self.metric_stats(series, Metric::Temperature),
            light: self.metric_stats(series, Metric::Light),
        })
    }

    fn metric_stats(&self, series: &[Reading], metric: Metric) -> MetricStats {
        let values: Vec<f64> = series.iter().map(|reading| reading.value(metric)).collect();

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in &values {
            min = min.min(*value);
            max = max.max(*value);
        }

        MetricStats {
            average: mean(&values),
            trend: self.trend(&values),
            min,
            max,
            count: values.len(),
        }
    }

    fn trend(&self, values: &[f64]) -> f64 {
        let n = values.len();
        let tail_len = self.trend_window.min(n);
        let preceding_len = self.trend_window.min(n - tail_len);
        if preceding_len == 0 {
            return 0.0;
        }

        let tail_start = n - tail_len;
        let tail = &values[tail_start..];
        let preceding = &values[tail_start - preceding_len..tail_start];
        mean(tail) - mean(preceding)
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_WINDOW)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
