use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw inbound record: `{ type, data?, message? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Measurement fields reported by `progress` and `test_complete`.
/// Every field is optional; absent fields were not measured by the tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_avg_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_min_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_max_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p50_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p90_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p99_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmits: Option<u64>,
}

impl Metrics {
    /// Overwrite every field that `other` reports, keep the rest.
    pub fn absorb(&mut self, other: &Metrics) {
        fn take<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.bandwidth_mbps, other.bandwidth_mbps);
        take(&mut self.latency_avg_us, other.latency_avg_us);
        take(&mut self.latency_min_us, other.latency_min_us);
        take(&mut self.latency_max_us, other.latency_max_us);
        take(&mut self.latency_p50_us, other.latency_p50_us);
        take(&mut self.latency_p90_us, other.latency_p90_us);
        take(&mut self.latency_p99_us, other.latency_p99_us);
        take(&mut self.jitter_ms, other.jitter_ms);
        take(&mut self.lost_percent, other.lost_percent);
        take(&mut self.packet_loss, other.packet_loss);
        take(&mut self.packets_sent, other.packets_sent);
        take(&mut self.packets_received, other.packets_received);
        take(&mut self.retransmits, other.retransmits);
    }

    /// Loss as reported by either tool (iperf3 says `lost_percent`, sockperf and ping `packet_loss`).
    pub fn loss_percent(&self) -> Option<f64> {
        self.lost_percent.or(self.packet_loss)
    }
}

/// One row of a latency sweep, in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    #[serde(rename = "msg_size")]
    pub payload_size: u32,
    #[serde(rename = "latency_avg_us", default)]
    pub avg: f64,
    #[serde(rename = "latency_min_us", default)]
    pub min: f64,
    #[serde(rename = "latency_p50_us", default)]
    pub p50: f64,
    #[serde(rename = "latency_p90_us", default)]
    pub p90: f64,
    #[serde(rename = "latency_p99_us", default)]
    pub p99: f64,
    #[serde(rename = "latency_max_us", default)]
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepProgress {
    #[serde(default)]
    pub current_size: u32,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub progress: f64,
}

/// Which backend servers are up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(rename = "iperf_running", default)]
    pub throughput_running: bool,
    #[serde(rename = "sockperf_running", default)]
    pub latency_running: bool,
}

/// Counters returned for `get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    #[serde(default)]
    pub iperf: Metrics,
    #[serde(default)]
    pub sockperf: Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSource {
    Iperf,
    Sockperf,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Started,
    Stopped,
}

/// Decoded inbound event. `Unknown` keeps the client forward compatible.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected {
        message: Option<String>,
    },
    ServerLifecycle {
        source: LifecycleSource,
        phase: LifecyclePhase,
        message: Option<String>,
    },
    TestStarted {
        message: Option<String>,
    },
    TestStopped {
        message: Option<String>,
    },
    Progress(Metrics),
    TestComplete(Metrics),
    Error {
        message: String,
    },
    ServerStatus(ServerStatus),
    Stats(ToolStats),
    SweepStarted {
        message: Option<String>,
    },
    SweepProgress(SweepProgress),
    SweepPointResult(SweepPoint),
    SweepComplete {
        results: Vec<SweepPoint>,
    },
    Unknown {
        kind: String,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("`{kind}` message carries no data")]
    MissingPayload { kind: String },
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct CompletePayload {
    #[serde(default)]
    results: Vec<SweepPoint>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

impl Event {
    pub fn decode(text: &str) -> Result<Event, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Event::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Event, DecodeError> {
        let Envelope {
            kind,
            data,
            message,
        } = envelope;

        let event = match kind.as_str() {
            "connected" => Event::Connected { message },
            "iperf_started" => lifecycle(LifecycleSource::Iperf, LifecyclePhase::Started, message),
            "sockperf_started" => {
                lifecycle(LifecycleSource::Sockperf, LifecyclePhase::Started, message)
            }
            "server_started" => {
                lifecycle(LifecycleSource::Server, LifecyclePhase::Started, message)
            }
            "server_stopped" => {
                lifecycle(LifecycleSource::Server, LifecyclePhase::Stopped, message)
            }
            "ping_started" => Event::TestStarted { message },
            "iperf_stopped" | "sockperf_stopped" | "ping_stopped" => {
                Event::TestStopped { message }
            }
            "progress" => Event::Progress(optional_payload(&kind, data)?),
            "test_complete" => Event::TestComplete(optional_payload(&kind, data)?),
            "error" => {
                let nested = match data {
                    Some(data) => payload::<ErrorPayload>(&kind, data)?.message,
                    None => None,
                };
                Event::Error {
                    message: nested
                        .or(message)
                        .unwrap_or_else(|| "unknown backend error".to_string()),
                }
            }
            "server_status" => Event::ServerStatus(required_payload(&kind, data)?),
            "stats" => Event::Stats(optional_payload(&kind, data)?),
            "sockperf_multisize_started" => Event::SweepStarted { message },
            "multi_size_progress" => Event::SweepProgress(required_payload(&kind, data)?),
            "multi_size_result" => Event::SweepPointResult(required_payload(&kind, data)?),
            "multi_size_complete" => {
                let body: CompletePayload = match data {
                    Some(data) => payload(&kind, data)?,
                    None => CompletePayload {
                        results: Vec::new(),
                    },
                };
                Event::SweepComplete {
                    results: body.results,
                }
            }
            _ => Event::Unknown { kind },
        };
        Ok(event)
    }

    /// Terminal events end a run on the backend.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::TestComplete(_) | Event::TestStopped { .. } | Event::SweepComplete { .. }
        )
    }
}

fn lifecycle(source: LifecycleSource, phase: LifecyclePhase, message: Option<String>) -> Event {
    Event::ServerLifecycle {
        source,
        phase,
        message,
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: kind.to_string(),
        source,
    })
}

fn required_payload<T: DeserializeOwned>(kind: &str, data: Option<Value>) -> Result<T, DecodeError> {
    match data {
        Some(data) => payload(kind, data),
        None => Err(DecodeError::MissingPayload {
            kind: kind.to_string(),
        }),
    }
}

fn optional_payload<T: DeserializeOwned + Default>(
    kind: &str,
    data: Option<Value>,
) -> Result<T, DecodeError> {
    match data {
        Some(data) => payload(kind, data),
        None => Ok(T::default()),
    }
}
