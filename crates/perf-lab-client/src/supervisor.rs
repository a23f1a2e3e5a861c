use futures::{SinkExt, StreamExt};
use perf_lab_abstract::{Command, DEFAULT_RECONNECT_DELAY_MS};
use perf_lab_core::{CommandSink, DeliveryError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Writer side of the live connection, `None` while disconnected.
type Outbox = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub endpoint: Url,
    pub reconnect_delay: Duration,
}

impl SupervisorConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// What the supervisor hands to the dispatch loop, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Connected,
    Disconnected,
    Payload(String),
}

/// Keeps one WebSocket connection to the backend alive.
///
/// After any close or failed attempt it waits a fixed delay and tries again,
/// forever, until shut down. Outbound commands are only accepted while
/// connected; nothing is queued across a disconnect.
pub struct Supervisor {
    config: SupervisorConfig,
    inbound: mpsc::UnboundedSender<Inbound>,
    outbox: Outbox,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Start supervising on the current tokio runtime.
    pub fn spawn(
        config: SupervisorConfig,
    ) -> (SupervisorHandle, mpsc::UnboundedReceiver<Inbound>, JoinHandle<()>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let outbox: Outbox = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let handle = SupervisorHandle {
            outbox: outbox.clone(),
            state: state_rx,
            cancel: cancel.clone(),
        };
        let supervisor = Supervisor {
            config,
            inbound: inbound_tx,
            outbox,
            state: state_tx,
            cancel,
        };
        let task = tokio::spawn(supervisor.run());
        (handle, inbound_rx, task)
    }

    async fn run(self) {
        let endpoint = self.config.endpoint.to_string();
        info!("supervising connection to {endpoint}");

        loop {
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                attempt = connect_async(endpoint.as_str()) => attempt,
            };
            match attempt {
                Ok((socket, _response)) => self.serve(socket).await,
                Err(err) => warn!("connect to {endpoint} failed: {err}"),
            }

            debug!("reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        self.install(None);
        self.state.send_replace(LinkState::Disconnected);
        info!("connection supervisor stopped");
    }

    async fn serve(&self, socket: Socket) {
        let (mut writer, mut reader) = socket.split();
        let (tx, mut outgoing) = mpsc::unbounded_channel::<Message>();
        self.install(Some(tx));
        self.state.send_replace(LinkState::Connected);
        let _ = self.inbound.send(Inbound::Connected);
        info!("connected to {}", self.config.endpoint);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = writer.send(Message::Close(None)).await;
                    break;
                }
                message = outgoing.recv() => {
                    let Some(message) = message else { break };
                    if let Err(err) = writer.send(message).await {
                        warn!("write failed: {err}");
                        break;
                    }
                }
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.inbound.send(Inbound::Payload(text));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("backend closed the connection: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("read failed: {err}");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.install(None);
        let dropped = discard_undelivered(&mut outgoing);
        if dropped > 0 {
            warn!("{dropped} queued command(s) were never written to the backend");
        }
        self.state.send_replace(LinkState::Disconnected);
        let _ = self.inbound.send(Inbound::Disconnected);
        info!("disconnected from {}", self.config.endpoint);
    }

    fn install(&self, writer: Option<mpsc::UnboundedSender<Message>>) {
        match self.outbox.lock() {
            Ok(mut slot) => *slot = writer,
            Err(poisoned) => *poisoned.into_inner() = writer,
        }
    }
}

/// Close the writer queue and log whatever the socket never took.
fn discard_undelivered(outgoing: &mut mpsc::UnboundedReceiver<Message>) -> usize {
    outgoing.close();
    let mut dropped = 0;
    while let Ok(message) = outgoing.try_recv() {
        match message {
            Message::Text(text) => debug!("discarding undelivered {text}"),
            other => debug!("discarding undelivered frame {other:?}"),
        }
        dropped += 1;
    }
    dropped
}

/// Cloneable control surface of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    outbox: Outbox,
    state: watch::Receiver<LinkState>,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    pub fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Resolve once the link reaches `target`, or `false` if the supervisor is gone.
    pub async fn wait_for(&mut self, target: LinkState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl CommandSink for SupervisorHandle {
    fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    /// `Ok` means the command was handed to the live connection's writer
    /// queue, not that it reached the backend. A drop racing the write
    /// loses it; `serve` logs such commands when it winds down.
    fn send(&mut self, command: &Command) -> Result<(), DeliveryError> {
        let text = command.to_json()?;
        let slot = self.outbox.lock().map_err(|_| DeliveryError::Closed)?;
        let writer = slot.as_ref().ok_or(DeliveryError::NotConnected)?;
        writer
            .send(Message::Text(text))
            .map_err(|_| DeliveryError::Closed)?;
        debug!("queued {} for the writer", command.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        (listener, url)
    }

    fn config(endpoint: Url, delay_ms: u64) -> SupervisorConfig {
        SupervisorConfig {
            endpoint,
            reconnect_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Inbound>) -> Inbound {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn relays_payloads_and_commands() {
        let (listener, url) = listener().await;
        let (seen_tx, seen_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"connected"}"#.into()))
                .await
                .unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    let _ = seen_tx.send(text);
                    break;
                }
            }
        });

        let (mut handle, mut inbound, _task) = Supervisor::spawn(config(url, 50));
        assert_eq!(next(&mut inbound).await, Inbound::Connected);
        assert!(handle.is_connected());
        assert_eq!(
            next(&mut inbound).await,
            Inbound::Payload(r#"{"type":"connected"}"#.into())
        );

        handle.send(&Command::GetServerStatus).unwrap();
        let seen = timeout(WAIT, seen_rx).await.unwrap().unwrap();
        assert_eq!(seen, r#"{"type":"get_server_status"}"#);
        handle.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_the_backend_drops() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let ws = accept_async(stream).await.unwrap();
                drop(ws);
            }
        });

        let (mut handle, mut inbound, _task) = Supervisor::spawn(config(url, 50));
        assert_eq!(next(&mut inbound).await, Inbound::Connected);
        assert_eq!(next(&mut inbound).await, Inbound::Disconnected);
        assert!(!handle.is_connected());
        assert!(matches!(
            handle.send(&Command::GetStats),
            Err(DeliveryError::NotConnected)
        ));
        assert_eq!(next(&mut inbound).await, Inbound::Connected);
        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_a_pending_reconnect() {
        let (listener, url) = listener().await;
        drop(listener);

        let (mut handle, mut inbound, task) = Supervisor::spawn(config(url, 60_000));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.link_state(), LinkState::Disconnected);
        assert!(matches!(
            handle.send(&Command::GetServerStatus),
            Err(DeliveryError::NotConnected)
        ));

        handle.shutdown();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn wait_for_observes_the_link() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (mut handle, _inbound, task) = Supervisor::spawn(config(url, 50));
        assert!(timeout(WAIT, handle.wait_for(LinkState::Connected)).await.unwrap());
        handle.shutdown();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(handle.link_state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn secure_origins_reach_the_tls_handshake() {
        use tokio_tungstenite::tungstenite::error::{Error, UrlError};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let url = crate::ws_endpoint(&format!("https://127.0.0.1:{port}")).unwrap();
        assert_eq!(url.scheme(), "wss");
        let result = timeout(WAIT, connect_async(url.as_str())).await.unwrap();
        match result {
            Err(Error::Url(UrlError::TlsFeatureNotEnabled)) => {
                panic!("wss endpoints need a TLS backend")
            }
            Err(_) => {}
            Ok(_) => panic!("a bare TCP listener cannot complete a TLS handshake"),
        }
    }

    #[test]
    fn undelivered_commands_are_counted_and_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Message::Text(r#"{"type":"get_stats"}"#.into())).unwrap();
        tx.send(Message::Text(r#"{"type":"stop_ping"}"#.into())).unwrap();

        assert_eq!(discard_undelivered(&mut rx), 2);
        assert!(tx.send(Message::Text("late".into())).is_err());
        assert_eq!(discard_undelivered(&mut rx), 0);
    }
}
