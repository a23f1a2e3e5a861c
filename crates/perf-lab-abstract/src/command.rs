use serde::{Deserialize, Serialize};

use crate::kind::ServerKind;

/// Outbound messages, serialized as `{"type": ..., "data": {...}}`.
/// Unit variants carry no `data` field at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    StartServer {
        server: ServerKind,
    },
    StopServer {
        server: ServerKind,
    },
    GetServerStatus,
    GetStats,
    StartIperfClient {
        host: String,
        duration: u32,
        port: u16,
        udp: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bandwidth: Option<String>,
    },
    StartSockperfPingpong {
        host: String,
        duration: u32,
        port: u16,
        msg_size: u32,
    },
    StartSockperfLoad {
        host: String,
        duration: u32,
        port: u16,
        msg_size: u32,
        mps: u32,
    },
    StartSockperfMultisize {
        host: String,
        duration: u32,
        port: u16,
        msg_sizes: Vec<u32>,
    },
    StartPing {
        host: String,
        count: u32,
    },
    StopIperf,
    StopSockperf,
    StopPing,
}

impl Command {
    /// Wire name of the command (`type` field).
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartServer { .. } => "start_server",
            Command::StopServer { .. } => "stop_server",
            Command::GetServerStatus => "get_server_status",
            Command::GetStats => "get_stats",
            Command::StartIperfClient { .. } => "start_iperf_client",
            Command::StartSockperfPingpong { .. } => "start_sockperf_pingpong",
            Command::StartSockperfLoad { .. } => "start_sockperf_load",
            Command::StartSockperfMultisize { .. } => "start_sockperf_multisize",
            Command::StartPing { .. } => "start_ping",
            Command::StopIperf => "stop_iperf",
            Command::StopSockperf => "stop_sockperf",
            Command::StopPing => "stop_ping",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
