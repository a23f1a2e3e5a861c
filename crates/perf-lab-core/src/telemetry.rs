use serde::Serialize;
use std::collections::VecDeque;

/// Number of ticks kept for charting.
pub const TELEMETRY_CAPACITY: usize = 100;

/// Tick label for "now": local wall clock at second granularity.
pub fn wall_clock_label() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Bandwidth,
    LatencyAvg,
    LatencyP99,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::Bandwidth, Series::LatencyAvg, Series::LatencyP99];

    pub fn name(&self) -> &'static str {
        match self {
            Series::Bandwidth => "bandwidth",
            Series::LatencyAvg => "latency_avg",
            Series::LatencyP99 => "latency_p99",
        }
    }

    fn index(&self) -> usize {
        match self {
            Series::Bandwidth => 0,
            Series::LatencyAvg => 1,
            Series::LatencyP99 => 2,
        }
    }
}

/// Chart-ready copy of the buffer; `None` marks a tick where the series had no value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub bandwidth: Vec<Option<f64>>,
    pub latency_avg: Vec<Option<f64>>,
    pub latency_p99: Vec<Option<f64>>,
}

/// Fixed-capacity multi-series store, one entry per tick label.
///
/// Every series always has exactly as many slots as there are labels; a slot
/// stays `None` until a value for that series arrives in that tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryBuffer {
    capacity: usize,
    labels: VecDeque<String>,
    series: [VecDeque<Option<f64>>; 3],
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(TELEMETRY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            labels: VecDeque::with_capacity(capacity + 1),
            series: std::array::from_fn(|_| VecDeque::with_capacity(capacity + 1)),
        }
    }

    /// Record `value` for `series` in the tick `now_label`.
    ///
    /// A new label is appended only when it differs from the last one; updates
    /// within the same tick overwrite the value at the last index.
    pub fn append_or_update(&mut self, series: Series, value: f64, now_label: &str) {
        if self.labels.back().map(String::as_str) != Some(now_label) {
            self.labels.push_back(now_label.to_string());
            for values in &mut self.series {
                values.push_back(None);
            }
            if self.labels.len() > self.capacity {
                self.labels.pop_front();
                for values in &mut self.series {
                    values.pop_front();
                }
            }
        }
        if let Some(slot) = self.series[series.index()].back_mut() {
            *slot = Some(value);
        }
    }

    pub fn reset(&mut self) {
        self.labels.clear();
        for values in &mut self.series {
            values.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn labels(&self) -> &VecDeque<String> {
        &self.labels
    }

    pub fn values(&self, series: Series) -> &VecDeque<Option<f64>> {
        &self.series[series.index()]
    }

    /// Most recent value of `series`, looking back past empty slots.
    pub fn latest(&self, series: Series) -> Option<f64> {
        self.values(series).iter().rev().find_map(|v| *v)
    }

    /// `(index, value)` pairs for plotting, skipping empty slots.
    pub fn points(&self, series: Series) -> Vec<(f64, f64)> {
        self.values(series)
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
            .collect()
    }

    pub fn chart_data(&self) -> ChartData {
        ChartData {
            labels: self.labels.iter().cloned().collect(),
            bandwidth: self.values(Series::Bandwidth).iter().copied().collect(),
            latency_avg: self.values(Series::LatencyAvg).iter().copied().collect(),
            latency_p99: self.values(Series::LatencyP99).iter().copied().collect(),
        }
    }
}
