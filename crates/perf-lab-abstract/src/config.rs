use serde::{Deserialize, Serialize};

use crate::kind::{Mode, TestKind};

/// Payload sizes used by a latency sweep when none are configured.
pub const DEFAULT_SWEEP_SIZES: [u32; 6] = [64, 128, 256, 512, 1024, 1500];

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Parameters of the next test to start. Which fields end up on the wire is decided
/// by the capability table of `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRequest {
    pub kind: TestKind,
    pub host: String,
    /// `None` uses the default port of the tool behind `kind`.
    pub port: Option<u16>,
    pub duration: u32,
    pub bandwidth: Option<String>,
    pub msg_size: u32,
    pub mps: u32,
    pub msg_sizes: Vec<u32>,
    pub count: u32,
}

impl Default for TestRequest {
    fn default() -> Self {
        Self {
            kind: TestKind::default(),
            host: "127.0.0.1".to_string(),
            port: None,
            duration: 10,
            bandwidth: Some("100M".to_string()),
            msg_size: 64,
            mps: 10000,
            msg_sizes: DEFAULT_SWEEP_SIZES.to_vec(),
            count: 10,
        }
    }
}

impl TestRequest {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the backend web UI, e.g. `http://127.0.0.1:9000`.
    pub origin: String,
    pub reconnect_delay_ms: u64,
    pub mode: Mode,
    pub test: TestRequest,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:9000".to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            mode: Mode::default(),
            test: TestRequest::default(),
        }
    }
}
