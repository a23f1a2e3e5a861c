use chrono::{DateTime, Utc};
use perf_lab_abstract::{Metrics, Mode, SweepPoint, TestRequest};
use serde::Serialize;
use std::fmt::Write as _;

use crate::state::ClientState;
use crate::telemetry::ChartData;

pub const SWEEP_CSV_HEADER: &str =
    "Message Size (bytes),Avg Latency (μs),Min (μs),P50 (μs),P90 (μs),P99 (μs),Max (μs)";

#[derive(Debug, Clone, Serialize)]
pub struct ExportResults {
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sweep: Vec<SweepPoint>,
}

/// Point-in-time dump of a run, written as pretty JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub timestamp: String,
    pub mode: Mode,
    pub configuration: TestRequest,
    pub results: ExportResults,
    pub chart_data: ChartData,
}

impl ExportDocument {
    pub fn capture(state: &ClientState) -> Self {
        Self::capture_at(state, Utc::now())
    }

    pub fn capture_at(state: &ClientState, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.to_rfc3339(),
            mode: state.session.mode(),
            configuration: state.request.clone(),
            results: ExportResults {
                metrics: state.latest.clone(),
                sweep: state.sweep.results().to_vec(),
            },
            chart_data: state.telemetry.chart_data(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One row per sweep point, values to two decimals.
pub fn sweep_csv(points: &[SweepPoint]) -> String {
    let mut out = String::from(SWEEP_CSV_HEADER);
    out.push('\n');
    for p in points {
        let _ = writeln!(
            out,
            "{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            p.payload_size, p.avg, p.min, p.p50, p.p90, p.p99, p.max
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Series;
    use chrono::TimeZone;

    #[test]
    fn csv_has_header_and_one_row_per_point() {
        let points = vec![
            SweepPoint {
                payload_size: 64,
                avg: 25.456,
                min: 20.0,
                p50: 24.0,
                p90: 30.0,
                p99: 45.5,
                max: 120.0,
            },
            SweepPoint {
                payload_size: 1500,
                ..Default::default()
            },
        ];
        let csv = sweep_csv(&points);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SWEEP_CSV_HEADER);
        assert_eq!(lines[1], "64,25.46,20.00,24.00,30.00,45.50,120.00");
        assert_eq!(lines[2], "1500,0.00,0.00,0.00,0.00,0.00,0.00");
    }

    #[test]
    fn json_document_carries_state() {
        let mut state = ClientState::default();
        state.telemetry.append_or_update(Series::Bandwidth, 941.2, "10:00:00");
        state.latest.bandwidth_mbps = Some(941.2);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let doc = ExportDocument::capture_at(&state, at);
        let value: serde_json::Value =
            serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();

        assert_eq!(value["timestamp"], "2024-05-01T12:00:00+00:00");
        assert_eq!(value["mode"], "generator");
        assert_eq!(value["configuration"]["kind"], "throughput_tcp");
        assert_eq!(value["results"]["metrics"]["bandwidth_mbps"], 941.2);
        assert!(value["results"].get("sweep").is_none());
        assert_eq!(value["chart_data"]["labels"][0], "10:00:00");
        assert!(value["chart_data"]["latency_avg"][0].is_null());
    }
}
