use perf_lab_abstract::{Command, Param, ServerKind, TestKind, TestRequest};
use thiserror::Error;

use crate::session::{Session, SessionError};

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    StartTest,
    StopTest,
    StartServer(ServerKind),
    StopServer(ServerKind),
    RefreshServerStatus,
    RequestStats,
}

/// Local delivery failure reported by a command sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed before the command could be written")]
    Closed,
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a command was not sent.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("missing required parameter `{param}` for {kind}")]
    MissingParam { kind: TestKind, param: Param },
    #[error("latency sweep needs at least one payload size")]
    EmptySweep,
    #[error("not connected to backend")]
    NotConnected,
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Turn an intent into exactly one command, or reject it without side effects.
pub fn encode(
    intent: Intent,
    request: &TestRequest,
    session: &Session,
    connected: bool,
) -> Result<Command, Rejection> {
    let command = match intent {
        Intent::StartTest => {
            session.check_can_start()?;
            start_command(request)?
        }
        Intent::StopTest => session.stop_target()?.stop_command(),
        Intent::StartServer(server) => {
            session.check_listener()?;
            Command::StartServer { server }
        }
        Intent::StopServer(server) => {
            session.check_listener()?;
            Command::StopServer { server }
        }
        Intent::RefreshServerStatus => Command::GetServerStatus,
        Intent::RequestStats => Command::GetStats,
    };
    if !connected {
        return Err(Rejection::NotConnected);
    }
    Ok(command)
}

/// Shape the start command for `request.kind`, carrying only the fields that kind declares.
pub fn start_command(request: &TestRequest) -> Result<Command, Rejection> {
    let kind = request.kind;
    let missing = |param| Rejection::MissingParam { kind, param };

    let host = request.host.trim();
    if host.is_empty() {
        return Err(missing(Param::Host));
    }
    let host = host.to_string();
    if kind.requires(Param::Duration) && request.duration == 0 {
        return Err(missing(Param::Duration));
    }
    if kind.requires(Param::MsgSize) && request.msg_size == 0 {
        return Err(missing(Param::MsgSize));
    }
    if kind.requires(Param::Mps) && request.mps == 0 {
        return Err(missing(Param::Mps));
    }
    if kind.requires(Param::Count) && request.count == 0 {
        return Err(missing(Param::Count));
    }
    let duration = request.duration;
    let port = request.effective_port();

    let command = match kind {
        TestKind::ThroughputTcp | TestKind::ThroughputUdp => Command::StartIperfClient {
            host,
            duration,
            port,
            udp: kind == TestKind::ThroughputUdp,
            bandwidth: if kind.accepts(Param::Bandwidth) {
                request
                    .bandwidth
                    .as_deref()
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
            } else {
                None
            },
        },
        TestKind::LatencyPingPong => Command::StartSockperfPingpong {
            host,
            duration,
            port,
            msg_size: request.msg_size,
        },
        TestKind::LatencyUnderLoad => Command::StartSockperfLoad {
            host,
            duration,
            port,
            msg_size: request.msg_size,
            mps: request.mps,
        },
        TestKind::LatencySweep => {
            if request.msg_sizes.is_empty() {
                return Err(Rejection::EmptySweep);
            }
            Command::StartSockperfMultisize {
                host,
                duration,
                port,
                msg_sizes: request.msg_sizes.clone(),
            }
        }
        TestKind::IcmpPing => Command::StartPing {
            host,
            count: request.count,
        },
    };
    Ok(command)
}
