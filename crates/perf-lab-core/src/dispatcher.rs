use perf_lab_abstract::{Event, LifecyclePhase, LifecycleSource, Metrics, ToolStats};
use tracing::debug;

use crate::activity::LogLevel;
use crate::format::{format_bandwidth, format_jitter, format_latency, format_percent};
use crate::state::ClientState;
use crate::telemetry::{Series, TelemetryBuffer};

/// Capabilities the dispatcher needs from its owner.
pub trait DispatchContext {
    /// Label of the current reporting tick (second granularity, `HH:MM:SS`).
    fn now_label(&self) -> String;

    /// Ask the backend for a fresh server status.
    fn request_server_status(&mut self);

    /// Surface an error to the user.
    fn report_error(&mut self, message: &str);
}

/// Apply one inbound event to the client state.
pub fn dispatch(state: &mut ClientState, event: Event, ctx: &mut dyn DispatchContext) {
    let label = ctx.now_label();

    match event {
        Event::Connected { message } => {
            let message = message.unwrap_or_else(|| "Connected to backend".to_string());
            state.log.push(&label, LogLevel::Info, message);
        }
        Event::ServerLifecycle {
            source,
            phase,
            message,
        } => {
            let message = message.unwrap_or_else(|| lifecycle_text(source, phase).to_string());
            state.log.push(&label, LogLevel::Info, message);
            ctx.request_server_status();
        }
        Event::TestStarted { message } => {
            if let Some(message) = message {
                state.log.push(&label, LogLevel::Info, message);
            }
        }
        Event::TestStopped { message } => {
            let ended = state.session.finish();
            let message = message.unwrap_or_else(|| match ended {
                Some(kind) => format!("{kind} stopped"),
                None => "Test stopped".to_string(),
            });
            state.log.push(&label, LogLevel::Info, message);
        }
        Event::Progress(metrics) => {
            record_chart_values(&mut state.telemetry, &metrics, &label);
            state.latest.absorb(&metrics);
            debug!("progress at {label}: {metrics:?}");
        }
        Event::TestComplete(metrics) => {
            record_chart_values(&mut state.telemetry, &metrics, &label);
            state.latest.absorb(&metrics);
            let ended = state.session.finish();
            let name = ended.map(|k| k.label()).unwrap_or("Test");
            state.log.push(
                &label,
                LogLevel::Success,
                format!("{name} complete: {}", summarize(&metrics)),
            );
        }
        Event::Error { message } => {
            ctx.report_error(&message);
        }
        Event::ServerStatus(status) => {
            debug!("server status: {status:?}");
            state.server_status = status;
        }
        Event::Stats(stats) => {
            state.log.push(&label, LogLevel::Info, stats_text(&stats));
        }
        Event::SweepStarted { message } => {
            let total = state
                .pending_sweep_total
                .take()
                .unwrap_or(state.request.msg_sizes.len());
            state.sweep.start(total);
            state.session.sweep_started();
            let message = message.unwrap_or_else(|| "Latency sweep started".to_string());
            state.log.push(&label, LogLevel::Info, message);
        }
        Event::SweepProgress(progress) => {
            state.sweep.announce_total(progress.total_count);
            state
                .sweep
                .progress(progress.current_size, progress.current_index);
        }
        Event::SweepPointResult(point) => {
            state.log.push(
                &label,
                LogLevel::Info,
                format!(
                    "Size {} bytes: avg {}, p99 {}",
                    point.payload_size,
                    format_latency(point.avg),
                    format_latency(point.p99)
                ),
            );
            state.sweep.record_point(point);
        }
        Event::SweepComplete { results } => {
            let count = state.sweep.finalize(results).len();
            state.session.finish();
            state.log.push(
                &label,
                LogLevel::Success,
                format!("Latency sweep complete: {count} sizes measured"),
            );
        }
        Event::Unknown { kind } => {
            state
                .log
                .push(&label, LogLevel::Info, format!("Unhandled message type: {kind}"));
        }
    }
}

/// One buffer update per chart field present in `metrics`.
fn record_chart_values(buffer: &mut TelemetryBuffer, metrics: &Metrics, label: &str) {
    let fields = [
        (Series::Bandwidth, metrics.bandwidth_mbps),
        (Series::LatencyAvg, metrics.latency_avg_us),
        (Series::LatencyP99, metrics.latency_p99_us),
    ];
    for (series, value) in fields {
        if let Some(value) = value {
            buffer.append_or_update(series, value, label);
        }
    }
}

fn lifecycle_text(source: LifecycleSource, phase: LifecyclePhase) -> &'static str {
    match (source, phase) {
        (LifecycleSource::Iperf, _) => "iperf3 test started",
        (LifecycleSource::Sockperf, _) => "sockperf test started",
        (LifecycleSource::Server, LifecyclePhase::Started) => "Server started",
        (LifecycleSource::Server, LifecyclePhase::Stopped) => "Server stopped",
    }
}

fn summarize(metrics: &Metrics) -> String {
    let mut parts = Vec::new();
    if let Some(v) = metrics.bandwidth_mbps {
        parts.push(format_bandwidth(v));
    }
    if let Some(v) = metrics.latency_avg_us {
        parts.push(format!("avg {}", format_latency(v)));
    }
    if let Some(v) = metrics.latency_p99_us {
        parts.push(format!("p99 {}", format_latency(v)));
    }
    if let Some(v) = metrics.jitter_ms {
        parts.push(format!("jitter {}", format_jitter(v)));
    }
    if let Some(v) = metrics.loss_percent() {
        parts.push(format!("loss {}", format_percent(v)));
    }
    if parts.is_empty() {
        "no measurements reported".to_string()
    } else {
        parts.join(", ")
    }
}

fn stats_text(stats: &ToolStats) -> String {
    format!(
        "iperf3: {} | sockperf: {}",
        summarize(&stats.iperf),
        summarize(&stats.sockperf)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RunStatus;
    use perf_lab_abstract::{ServerStatus, SweepPoint, SweepProgress, TestKind};

    struct RecordingContext {
        label: String,
        refreshes: usize,
        errors: Vec<String>,
    }

    impl RecordingContext {
        fn at(label: &str) -> Self {
            Self {
                label: label.to_string(),
                refreshes: 0,
                errors: Vec::new(),
            }
        }
    }

    impl DispatchContext for RecordingContext {
        fn now_label(&self) -> String {
            self.label.clone()
        }

        fn request_server_status(&mut self) {
            self.refreshes += 1;
        }

        fn report_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn progress(bandwidth: Option<f64>, latency: Option<f64>) -> Event {
        Event::Progress(Metrics {
            bandwidth_mbps: bandwidth,
            latency_avg_us: latency,
            ..Default::default()
        })
    }

    #[test]
    fn same_tick_progress_yields_one_label() {
        let mut state = ClientState::default();
        let mut ctx = RecordingContext::at("09:00:00");
        dispatch(&mut state, progress(Some(900.0), None), &mut ctx);
        dispatch(&mut state, progress(None, Some(40.0)), &mut ctx);
        dispatch(&mut state, progress(Some(905.0), None), &mut ctx);
        ctx.label = "09:00:01".into();
        dispatch(&mut state, progress(Some(910.0), Some(41.0)), &mut ctx);

        assert_eq!(state.telemetry.len(), 2);
        assert_eq!(
            state.telemetry.values(Series::Bandwidth),
            &[Some(905.0), Some(910.0)]
        );
        assert_eq!(state.latest.bandwidth_mbps, Some(910.0));
        assert_eq!(state.session.status(), RunStatus::Idle);
    }

    #[test]
    fn test_complete_returns_session_to_idle() {
        let mut state = ClientState::default();
        state.session.begin(TestKind::ThroughputUdp).unwrap();
        let mut ctx = RecordingContext::at("09:00:05");
        let done = Event::TestComplete(Metrics {
            bandwidth_mbps: Some(1500.0),
            latency_p99_us: Some(120.0),
            lost_percent: Some(0.5),
            ..Default::default()
        });
        dispatch(&mut state, done, &mut ctx);

        assert!(state.session.is_idle());
        assert_eq!(state.session.active_test(), None);
        assert_eq!(state.telemetry.latest(Series::LatencyP99), Some(120.0));
        let last = state.log.last().unwrap();
        assert_eq!(last.level, LogLevel::Success);
        assert!(last.message.contains("1.50 Gbps"), "{}", last.message);
    }

    #[test]
    fn errors_go_to_the_reporter_without_touching_status() {
        let mut state = ClientState::default();
        state.session.begin(TestKind::LatencyPingPong).unwrap();
        let mut ctx = RecordingContext::at("t");
        dispatch(
            &mut state,
            Event::Error {
                message: "Failed to start sockperf test".into(),
            },
            &mut ctx,
        );
        assert_eq!(ctx.errors, vec!["Failed to start sockperf test"]);
        assert_eq!(state.session.status(), RunStatus::Running);
    }

    #[test]
    fn server_lifecycle_requests_status_refresh() {
        let mut state = ClientState::default();
        let mut ctx = RecordingContext::at("t");
        dispatch(
            &mut state,
            Event::ServerLifecycle {
                source: LifecycleSource::Server,
                phase: LifecyclePhase::Stopped,
                message: None,
            },
            &mut ctx,
        );
        assert_eq!(ctx.refreshes, 1);

        let status = ServerStatus {
            throughput_running: true,
            latency_running: true,
        };
        dispatch(&mut state, Event::ServerStatus(status), &mut ctx);
        assert_eq!(state.server_status, status);
        assert_eq!(ctx.refreshes, 1);
    }

    #[test]
    fn stop_acknowledgement_ends_a_stopping_run() {
        let mut state = ClientState::default();
        state.session.begin(TestKind::ThroughputTcp).unwrap();
        state.session.request_stop().unwrap();
        let mut ctx = RecordingContext::at("t");
        dispatch(&mut state, Event::TestStopped { message: None }, &mut ctx);
        assert!(state.session.is_idle());
        assert_eq!(state.log.last().unwrap().message, "TCP Throughput stopped");
    }

    #[test]
    fn sweep_events_drive_the_aggregator() {
        let mut state = ClientState::default();
        state.pending_sweep_total = Some(3);
        let mut ctx = RecordingContext::at("t");
        dispatch(&mut state, Event::SweepStarted { message: None }, &mut ctx);
        assert_eq!(state.session.active_test(), Some(TestKind::LatencySweep));
        assert_eq!(state.sweep.state().unwrap().total, 3);

        dispatch(
            &mut state,
            Event::SweepProgress(SweepProgress {
                current_size: 128,
                current_index: 2,
                total_count: 3,
                progress: 33.3,
            }),
            &mut ctx,
        );
        assert_eq!(state.sweep.percent(), 67);
        assert_eq!(state.sweep.state().unwrap().current_size, 128);

        for size in [512, 64, 256] {
            dispatch(
                &mut state,
                Event::SweepPointResult(SweepPoint {
                    payload_size: size,
                    ..Default::default()
                }),
                &mut ctx,
            );
        }
        dispatch(
            &mut state,
            Event::SweepComplete {
                results: Vec::new(),
            },
            &mut ctx,
        );
        assert!(state.session.is_idle());
        let sizes: Vec<u32> = state
            .sweep
            .final_results()
            .unwrap()
            .iter()
            .map(|p| p.payload_size)
            .collect();
        assert_eq!(sizes, vec![512, 64, 256]);
    }

    #[test]
    fn unknown_events_are_logged() {
        let mut state = ClientState::default();
        let mut ctx = RecordingContext::at("t");
        dispatch(
            &mut state,
            Event::Unknown {
                kind: "future_thing".into(),
            },
            &mut ctx,
        );
        assert_eq!(state.log.last().unwrap().level, LogLevel::Info);
        assert!(ctx.errors.is_empty());
    }
}
