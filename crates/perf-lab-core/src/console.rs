use perf_lab_abstract::{ClientConfig, Command, Event, Mode, Param, TestKind, TestRequest};
use tracing::{debug, warn};

use crate::activity::LogLevel;
use crate::dispatcher::{DispatchContext, dispatch};
use crate::encoder::{DeliveryError, Intent, Rejection, encode};
use crate::session::SessionError;
use crate::state::{ClientState, Connectivity};
use crate::telemetry::wall_clock_label;

/// Where validated commands go. Implemented by the connection supervisor handle.
pub trait CommandSink {
    fn is_connected(&self) -> bool;

    /// Deliver now or fail; implementations never queue for later.
    fn send(&mut self, command: &Command) -> Result<(), DeliveryError>;
}

/// Follow-up actions collected while an event is dispatched.
#[derive(Default)]
struct ActionBuffer {
    refresh_status: bool,
    errors: Vec<String>,
}

struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    label: &'a str,
}

impl<'a> DispatchContext for ScopedContext<'a> {
    fn now_label(&self) -> String {
        self.label.to_string()
    }

    fn request_server_status(&mut self) {
        self.buffer.refresh_status = true;
    }

    fn report_error(&mut self, message: &str) {
        self.buffer.errors.push(message.to_string());
    }
}

/// Single owner of the client state: dispatches inbound events one at a time and
/// turns user intents into commands.
pub struct Console<S: CommandSink> {
    state: ClientState,
    sink: S,
    reconnect_delay_ms: u64,
}

impl<S: CommandSink> Console<S> {
    pub fn new(config: &ClientConfig, sink: S) -> Self {
        let mut state = ClientState::new(config.test.clone());
        // A fresh session is idle, so switching mode cannot fail.
        let _ = state.session.set_mode(config.mode);
        Self {
            state,
            sink,
            reconnect_delay_ms: config.reconnect_delay_ms,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Immutable copy for presentation.
    pub fn snapshot(&self) -> ClientState {
        self.state.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Decode and dispatch one raw inbound message.
    pub fn handle_payload(&mut self, text: &str) {
        self.handle_payload_at(text, &wall_clock_label());
    }

    pub fn handle_payload_at(&mut self, text: &str, label: &str) {
        match Event::decode(text) {
            Ok(event) => self.handle_event_at(event, label),
            Err(err) => {
                warn!("dropping inbound message: {err}");
                self.state
                    .log
                    .push(label, LogLevel::Info, format!("Ignored message: {err}"));
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        self.handle_event_at(event, &wall_clock_label());
    }

    pub fn handle_event_at(&mut self, event: Event, label: &str) {
        debug!("dispatching {event:?}");
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                label,
            };
            dispatch(&mut self.state, event, &mut ctx);
        }
        self.process_actions(buffer, label);
    }

    fn process_actions(&mut self, buffer: ActionBuffer, label: &str) {
        for message in buffer.errors {
            self.state.log.push(label, LogLevel::Error, message);
        }
        if buffer.refresh_status {
            let _ = self.submit_at(Intent::RefreshServerStatus, label);
        }
    }

    /// The transport came up. Session state is left alone.
    pub fn on_connected(&mut self) {
        let label = wall_clock_label();
        self.state.connectivity = Connectivity::Connected;
        self.state
            .log
            .push(&label, LogLevel::Success, "Connected to backend");
        let _ = self.submit_at(Intent::RefreshServerStatus, &label);
    }

    /// The transport went away. Session state is left alone; the backend stays authoritative.
    pub fn on_disconnected(&mut self) {
        let label = wall_clock_label();
        self.state.connectivity = Connectivity::Disconnected;
        self.state.log.push(
            &label,
            LogLevel::Error,
            format!(
                "Disconnected from backend, reconnecting in {:.1}s",
                self.reconnect_delay_ms as f64 / 1000.0
            ),
        );
    }

    pub fn submit(&mut self, intent: Intent) -> Result<(), Rejection> {
        self.submit_at(intent, &wall_clock_label())
    }

    /// Validate, encode and send one intent. Rejections are logged and returned;
    /// a rejected intent sends nothing and changes nothing.
    pub fn submit_at(&mut self, intent: Intent, label: &str) -> Result<(), Rejection> {
        let result = encode(
            intent,
            &self.state.request,
            &self.state.session,
            self.sink.is_connected(),
        )
        .and_then(|command| {
            self.sink.send(&command)?;
            Ok(command)
        });

        match result {
            Ok(command) => {
                self.apply_sent(intent, &command, label);
                Ok(())
            }
            Err(rejection) => {
                self.state
                    .log
                    .push(label, LogLevel::Error, rejection.to_string());
                Err(rejection)
            }
        }
    }

    fn apply_sent(&mut self, intent: Intent, command: &Command, label: &str) {
        debug!("sent {}", command.name());
        match intent {
            Intent::StartTest => {
                let request = &self.state.request;
                let kind = request.kind;
                let target = if kind.accepts(Param::Port) {
                    format!("{}:{}", request.host, request.effective_port())
                } else {
                    request.host.clone()
                };
                if kind.is_sweep() {
                    self.state.pending_sweep_total = Some(request.msg_sizes.len());
                } else {
                    self.state.telemetry.reset();
                }
                self.state.latest = Default::default();
                if let Err(err) = self.state.session.begin(kind) {
                    warn!("session refused a validated start: {err}");
                }
                self.state
                    .log
                    .push(label, LogLevel::Info, format!("Starting {kind} to {target}"));
            }
            Intent::StopTest => {
                if let Ok(kind) = self.state.session.request_stop() {
                    self.state
                        .log
                        .push(label, LogLevel::Info, format!("Stopping {kind}"));
                }
            }
            Intent::StartServer(server) => {
                self.state
                    .log
                    .push(label, LogLevel::Info, format!("Starting {server} server"));
            }
            Intent::StopServer(server) => {
                self.state
                    .log
                    .push(label, LogLevel::Info, format!("Stopping {server} server"));
            }
            Intent::RefreshServerStatus | Intent::RequestStats => {}
        }
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), SessionError> {
        let label = wall_clock_label();
        match self.state.session.set_mode(mode) {
            Ok(()) => {
                self.state
                    .log
                    .push(&label, LogLevel::Info, format!("Switched to {mode} mode"));
                Ok(())
            }
            Err(err) => {
                self.state.log.push(&label, LogLevel::Error, err.to_string());
                Err(err)
            }
        }
    }

    pub fn select_test(&mut self, kind: TestKind) -> Result<(), SessionError> {
        self.configure(|request| request.kind = kind)
    }

    /// Edit the parameters of the next test. Refused while a test is in progress.
    pub fn configure(&mut self, edit: impl FnOnce(&mut TestRequest)) -> Result<(), SessionError> {
        if let Err(err) = self.state.session.check_reconfigure() {
            self.state
                .log
                .push(&wall_clock_label(), LogLevel::Error, err.to_string());
            return Err(err);
        }
        edit(&mut self.state.request);
        Ok(())
    }

    /// Add a user-facing log entry stamped with the current tick.
    pub fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        self.state.log.push(&wall_clock_label(), level, message);
    }

    /// Forget run data and return to idle.
    pub fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RunStatus;
    use crate::telemetry::Series;
    use perf_lab_abstract::{DEFAULT_SWEEP_SIZES, Metrics, SweepPoint};

    #[derive(Default)]
    struct RecordingSink {
        connected: bool,
        fail_next: bool,
        sent: Vec<Command>,
    }

    impl CommandSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, command: &Command) -> Result<(), DeliveryError> {
            if !self.connected {
                return Err(DeliveryError::NotConnected);
            }
            if self.fail_next {
                self.fail_next = false;
                return Err(DeliveryError::Closed);
            }
            self.sent.push(command.clone());
            Ok(())
        }
    }

    fn console() -> Console<RecordingSink> {
        Console::new(
            &ClientConfig::default(),
            RecordingSink {
                connected: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn listener_mode_start_sends_nothing() {
        let mut console = console();
        console.set_mode(Mode::Listener).unwrap();
        let result = console.submit(Intent::StartTest);
        assert!(matches!(
            result,
            Err(Rejection::Session(SessionError::ListenerMode))
        ));
        assert!(console.sink().sent.is_empty());
        assert!(console.state().session.is_idle());
        assert_eq!(console.state().log.errors().count(), 1);
    }

    #[test]
    fn start_is_accepted_again_after_completion() {
        let mut console = console();
        console.submit(Intent::StartTest).unwrap();
        assert_eq!(console.state().session.status(), RunStatus::Running);
        assert!(console.submit(Intent::StartTest).is_err());

        console.handle_payload_at(
            r#"{"type":"test_complete","data":{"bandwidth_mbps":940.0}}"#,
            "10:00:10",
        );
        assert!(console.state().session.is_idle());
        assert!(console.submit(Intent::StartTest).is_ok());
        assert_eq!(console.sink().sent.len(), 2);
    }

    #[test]
    fn new_single_run_clears_the_chart() {
        let mut console = console();
        console.submit(Intent::StartTest).unwrap();
        console.handle_event_at(
            Event::TestComplete(Metrics {
                bandwidth_mbps: Some(100.0),
                ..Default::default()
            }),
            "10:00:00",
        );
        assert_eq!(console.state().telemetry.len(), 1);
        console.submit(Intent::StartTest).unwrap();
        assert!(console.state().telemetry.is_empty());
        assert_eq!(console.state().latest, Metrics::default());
    }

    #[test]
    fn sweep_round_trip_keeps_arrival_order() {
        let mut console = console();
        console.select_test(TestKind::LatencySweep).unwrap();
        console.submit(Intent::StartTest).unwrap();
        match &console.sink().sent[0] {
            Command::StartSockperfMultisize { msg_sizes, .. } => {
                assert_eq!(msg_sizes, &DEFAULT_SWEEP_SIZES.to_vec())
            }
            other => panic!("unexpected {other:?}"),
        }

        console.handle_event_at(Event::SweepStarted { message: None }, "t");
        assert_eq!(console.state().sweep.state().unwrap().total, 6);
        for size in [1500, 64, 512, 128, 1024] {
            console.handle_event_at(
                Event::SweepPointResult(SweepPoint {
                    payload_size: size,
                    avg: size as f64 / 10.0,
                    ..Default::default()
                }),
                "t",
            );
            let sweep = console.state().sweep.state().unwrap();
            assert!(sweep.results.len() <= sweep.total);
        }
        console.handle_event_at(
            Event::SweepComplete {
                results: Vec::new(),
            },
            "t",
        );

        let state = console.state();
        assert!(state.session.is_idle());
        let sizes: Vec<u32> = state
            .sweep
            .final_results()
            .unwrap()
            .iter()
            .map(|p| p.payload_size)
            .collect();
        assert_eq!(sizes, vec![1500, 64, 512, 128, 1024]);
    }

    #[test]
    fn lifecycle_event_triggers_status_request() {
        let mut console = console();
        console.handle_payload_at(r#"{"type":"server_started","message":"ok"}"#, "t");
        assert_eq!(console.sink().sent, vec![Command::GetServerStatus]);
    }

    #[test]
    fn backend_errors_are_logged_verbatim() {
        let mut console = console();
        console.handle_payload_at(r#"{"type":"error","message":"Ping failed: timeout"}"#, "t");
        let last = console.state().log.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.message, "Ping failed: timeout");
    }

    #[test]
    fn disconnect_leaves_the_session_alone() {
        let mut console = console();
        console.on_connected();
        console.submit(Intent::StartTest).unwrap();
        console.sink.connected = false;
        console.on_disconnected();

        let state = console.state();
        assert_eq!(state.connectivity, Connectivity::Disconnected);
        assert_eq!(state.session.status(), RunStatus::Running);
        assert_eq!(state.session.active_test(), Some(TestKind::ThroughputTcp));
    }

    #[test]
    fn failed_delivery_does_not_start_a_run() {
        let mut console = console();
        console.sink.fail_next = true;
        let result = console.submit(Intent::StartTest);
        assert!(matches!(
            result,
            Err(Rejection::Delivery(DeliveryError::Closed))
        ));
        assert!(console.state().session.is_idle());
    }

    #[test]
    fn not_connected_is_rejected_locally() {
        let mut console = Console::new(&ClientConfig::default(), RecordingSink::default());
        assert!(matches!(
            console.submit(Intent::StartTest),
            Err(Rejection::NotConnected)
        ));
        assert!(console.sink().sent.is_empty());
    }

    #[test]
    fn selection_is_locked_while_running() {
        let mut console = console();
        console.submit(Intent::StartTest).unwrap();
        assert!(console.select_test(TestKind::IcmpPing).is_err());
        assert!(console.set_mode(Mode::Listener).is_err());
        assert_eq!(console.state().request.kind, TestKind::ThroughputTcp);
    }

    #[test]
    fn progress_feeds_the_chart() {
        let mut console = console();
        console.submit(Intent::StartTest).unwrap();
        console.handle_payload_at(r#"{"type":"progress","data":{"bandwidth_mbps":1500}}"#, "a");
        console.handle_payload_at(r#"{"type":"progress","data":{"bandwidth_mbps":1400}}"#, "a");
        assert_eq!(console.state().telemetry.len(), 1);
        assert_eq!(
            console.state().telemetry.latest(Series::Bandwidth),
            Some(1400.0)
        );
    }

    #[test]
    fn malformed_messages_are_ignored() {
        let mut console = console();
        console.handle_payload_at("{oops", "t");
        assert!(console.state().session.is_idle());
        assert_eq!(console.state().log.errors().count(), 0);
    }
}
