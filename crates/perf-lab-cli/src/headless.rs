use anyhow::{Context, Result, bail};
use perf_lab_abstract::{ClientConfig, Event, Mode};
use perf_lab_client::{Inbound, Supervisor, SupervisorConfig};
use perf_lab_core::format::{format_bandwidth, format_jitter, format_latency, format_percent};
use perf_lab_core::{ClientState, CommandSink, Console, Intent};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::export::{ExportTargets, write_exports};

/// Connect, run the configured test once, write exports.
pub async fn run(
    config: ClientConfig,
    supervisor: SupervisorConfig,
    targets: ExportTargets,
) -> Result<()> {
    let (handle, mut inbound, task) = Supervisor::spawn(supervisor);
    let mut console = Console::new(&config, handle.clone());

    let outcome = drive(&mut console, &mut inbound).await;

    handle.shutdown();
    let _ = task.await;

    let state = console.snapshot();
    summarize(&state);
    if !targets.is_empty() {
        for path in write_exports(&state, &targets)? {
            info!("Wrote {}", path.display());
        }
    }
    outcome
}

/// Feed supervisor notifications into the console until the run is over.
/// A generator run ends with the test, a listener run only on Ctrl-C.
async fn drive<S: CommandSink>(
    console: &mut Console<S>,
    inbound: &mut UnboundedReceiver<Inbound>,
) -> Result<()> {
    let mut launched = false;
    loop {
        let message = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                if launched && !console.state().session.is_idle() {
                    let _ = console.submit(Intent::StopTest);
                }
                return Ok(());
            }
            message = inbound.recv() => message,
        };

        match message {
            None => bail!("connection supervisor stopped unexpectedly"),
            Some(Inbound::Connected) => {
                console.on_connected();
                if !launched {
                    launch(console)?;
                    launched = true;
                }
            }
            Some(Inbound::Disconnected) => console.on_disconnected(),
            Some(Inbound::Payload(text)) => {
                let event = match Event::decode(&text) {
                    Ok(event) => event,
                    Err(_) => {
                        console.handle_payload(&text);
                        continue;
                    }
                };
                let failure = match &event {
                    Event::Error { message } => Some(message.clone()),
                    _ => None,
                };
                console.handle_event(event);

                let generating = launched && console.state().session.mode() == Mode::Generator;
                if generating {
                    if let Some(message) = failure {
                        bail!("backend reported an error: {message}");
                    }
                    if console.state().session.is_idle() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn launch<S: CommandSink>(console: &mut Console<S>) -> Result<()> {
    let kind = console.state().request.kind;
    match console.state().session.mode() {
        Mode::Generator => {
            console
                .submit(Intent::StartTest)
                .with_context(|| format!("Failed to start {kind}"))?;
        }
        Mode::Listener => {
            let server = kind
                .server()
                .with_context(|| format!("{kind} does not need a listening server"))?;
            console
                .submit(Intent::StartServer(server))
                .with_context(|| format!("Failed to start the {server} server"))?;
            info!("Listening with {server}, press Ctrl-C to stop");
        }
    }
    Ok(())
}

fn summarize(state: &ClientState) {
    let latest = &state.latest;
    if let Some(v) = latest.bandwidth_mbps {
        info!("Bandwidth:   {}", format_bandwidth(v));
    }
    if let Some(v) = latest.latency_avg_us {
        info!("Latency avg: {}", format_latency(v));
    }
    if let Some(v) = latest.latency_p99_us {
        info!("Latency p99: {}", format_latency(v));
    }
    if let Some(v) = latest.jitter_ms {
        info!("Jitter:      {}", format_jitter(v));
    }
    if let Some(v) = latest.loss_percent() {
        info!("Loss:        {}", format_percent(v));
    }
    for point in state.sweep.results() {
        info!(
            "{:>6} bytes  avg {}  p99 {}",
            point.payload_size,
            format_latency(point.avg),
            format_latency(point.p99)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_lab_abstract::{Command, ServerKind, TestKind, TestRequest};
    use perf_lab_core::DeliveryError;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Command>,
    }

    impl CommandSink for RecordingSink {
        fn is_connected(&self) -> bool {
            true
        }

        fn send(&mut self, command: &Command) -> Result<(), DeliveryError> {
            self.sent.push(command.clone());
            Ok(())
        }
    }

    fn console(mode: Mode, kind: TestKind) -> Console<RecordingSink> {
        let config = ClientConfig {
            mode,
            test: TestRequest {
                kind,
                ..Default::default()
            },
            ..Default::default()
        };
        Console::new(&config, RecordingSink::default())
    }

    async fn drive_through(
        console: &mut Console<RecordingSink>,
        messages: Vec<Inbound>,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for message in messages {
            tx.send(message).unwrap();
        }
        drop(tx);
        timeout(WAIT, drive(console, &mut rx)).await.unwrap()
    }

    fn starts(console: &Console<RecordingSink>) -> usize {
        console
            .sink()
            .sent
            .iter()
            .filter(|command| matches!(command, Command::StartIperfClient { .. }))
            .count()
    }

    #[tokio::test]
    async fn reconnect_does_not_start_the_test_twice() {
        let mut console = console(Mode::Generator, TestKind::ThroughputTcp);
        let result = drive_through(
            &mut console,
            vec![
                Inbound::Connected,
                Inbound::Disconnected,
                Inbound::Connected,
                Inbound::Payload(
                    r#"{"type":"test_complete","data":{"bandwidth_mbps":940.0}}"#.into(),
                ),
            ],
        )
        .await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(starts(&console), 1);
        assert!(console.state().session.is_idle());
        assert_eq!(console.state().latest.bandwidth_mbps, Some(940.0));
    }

    #[tokio::test]
    async fn backend_error_fails_a_generator_run() {
        let mut console = console(Mode::Generator, TestKind::ThroughputTcp);
        let result = drive_through(
            &mut console,
            vec![
                Inbound::Connected,
                Inbound::Payload(r#"{"type":"error","data":{"message":"iperf3 not found"}}"#.into()),
            ],
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("iperf3 not found"), "{err}");
        assert_eq!(starts(&console), 1);
    }

    #[tokio::test]
    async fn closed_inbound_channel_is_an_error() {
        let mut console = console(Mode::Generator, TestKind::ThroughputTcp);
        let result = drive_through(&mut console, vec![Inbound::Connected]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn listener_sweep_starts_the_latency_server() {
        let mut console = console(Mode::Listener, TestKind::LatencySweep);
        let _ = drive_through(&mut console, vec![Inbound::Connected]).await;

        let server_starts: Vec<_> = console
            .sink()
            .sent
            .iter()
            .filter(|command| matches!(command, Command::StartServer { .. }))
            .collect();
        assert_eq!(
            server_starts,
            vec![&Command::StartServer {
                server: ServerKind::Latency
            }]
        );
        let wire = server_starts[0].to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["type"], "start_server");
        assert_eq!(value["data"]["server"], "sockperf");
    }

    #[tokio::test]
    async fn listener_ping_has_no_server_to_start() {
        let mut console = console(Mode::Listener, TestKind::IcmpPing);
        let err = drive_through(&mut console, vec![Inbound::Connected])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("does not need a listening server"), "{err}");
        assert!(
            !console
                .sink()
                .sent
                .iter()
                .any(|command| matches!(command, Command::StartServer { .. }))
        );
    }
}
