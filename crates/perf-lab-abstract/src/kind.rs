use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::command::Command;

/// Which side of a test this client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Generator,
    Listener,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Generator => Mode::Listener,
            Mode::Listener => Mode::Generator,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Generator => "generator",
            Mode::Listener => "listener",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generator" | "gen" => Ok(Mode::Generator),
            "listener" | "server" => Ok(Mode::Listener),
            other => Err(format!("unknown mode '{other}', expected generator or listener")),
        }
    }
}

/// Backend servers that can be started in listener mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerKind {
    #[serde(rename = "iperf3")]
    Throughput,
    #[serde(rename = "sockperf")]
    Latency,
}

impl ServerKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            ServerKind::Throughput => "iperf3",
            ServerKind::Latency => "sockperf",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Parameters a test command may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Host,
    Duration,
    Port,
    Bandwidth,
    MsgSize,
    Mps,
    MsgSizes,
    Count,
}

impl Param {
    pub fn name(&self) -> &'static str {
        match self {
            Param::Host => "host",
            Param::Duration => "duration",
            Param::Port => "port",
            Param::Bandwidth => "bandwidth",
            Param::MsgSize => "msg_size",
            Param::Mps => "mps",
            Param::MsgSizes => "msg_sizes",
            Param::Count => "count",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub param: Param,
    pub required: bool,
}

const fn req(param: Param) -> ParamSpec {
    ParamSpec {
        param,
        required: true,
    }
}

const fn opt(param: Param) -> ParamSpec {
    ParamSpec {
        param,
        required: false,
    }
}

const THROUGHPUT_TCP: &[ParamSpec] = &[req(Param::Host), req(Param::Duration), req(Param::Port)];
const THROUGHPUT_UDP: &[ParamSpec] = &[
    req(Param::Host),
    req(Param::Duration),
    req(Param::Port),
    opt(Param::Bandwidth),
];
const PING_PONG: &[ParamSpec] = &[
    req(Param::Host),
    req(Param::Duration),
    req(Param::Port),
    req(Param::MsgSize),
];
const UNDER_LOAD: &[ParamSpec] = &[
    req(Param::Host),
    req(Param::Duration),
    req(Param::Port),
    req(Param::MsgSize),
    req(Param::Mps),
];
const SWEEP: &[ParamSpec] = &[
    req(Param::Host),
    req(Param::Duration),
    req(Param::Port),
    req(Param::MsgSizes),
];
const ICMP_PING: &[ParamSpec] = &[req(Param::Host), req(Param::Count)];

/// The backend tool that executes a test kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Iperf,
    Sockperf,
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    #[default]
    ThroughputTcp,
    ThroughputUdp,
    LatencyPingPong,
    LatencyUnderLoad,
    LatencySweep,
    IcmpPing,
}

impl TestKind {
    pub const ALL: [TestKind; 6] = [
        TestKind::ThroughputTcp,
        TestKind::ThroughputUdp,
        TestKind::LatencyPingPong,
        TestKind::LatencyUnderLoad,
        TestKind::LatencySweep,
        TestKind::IcmpPing,
    ];

    /// Capability table: every parameter this kind accepts, and whether it is required.
    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            TestKind::ThroughputTcp => THROUGHPUT_TCP,
            TestKind::ThroughputUdp => THROUGHPUT_UDP,
            TestKind::LatencyPingPong => PING_PONG,
            TestKind::LatencyUnderLoad => UNDER_LOAD,
            TestKind::LatencySweep => SWEEP,
            TestKind::IcmpPing => ICMP_PING,
        }
    }

    pub fn accepts(&self, param: Param) -> bool {
        self.params().iter().any(|p| p.param == param)
    }

    pub fn requires(&self, param: Param) -> bool {
        self.params().iter().any(|p| p.param == param && p.required)
    }

    pub fn tool(&self) -> Tool {
        match self {
            TestKind::ThroughputTcp | TestKind::ThroughputUdp => Tool::Iperf,
            TestKind::LatencyPingPong | TestKind::LatencyUnderLoad | TestKind::LatencySweep => {
                Tool::Sockperf
            }
            TestKind::IcmpPing => Tool::Ping,
        }
    }

    /// Server that must be listening on the far end for this kind, if any.
    pub fn server(&self) -> Option<ServerKind> {
        match self.tool() {
            Tool::Iperf => Some(ServerKind::Throughput),
            Tool::Sockperf => Some(ServerKind::Latency),
            Tool::Ping => None,
        }
    }

    pub fn is_sweep(&self) -> bool {
        matches!(self, TestKind::LatencySweep)
    }

    /// Port used when the request does not name one.
    pub fn default_port(&self) -> u16 {
        match self.tool() {
            Tool::Iperf => 5201,
            Tool::Sockperf => 11111,
            Tool::Ping => 0,
        }
    }

    /// The command that stops a running test of this kind.
    pub fn stop_command(&self) -> Command {
        match self.tool() {
            Tool::Iperf => Command::StopIperf,
            Tool::Sockperf => Command::StopSockperf,
            Tool::Ping => Command::StopPing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestKind::ThroughputTcp => "TCP Throughput",
            TestKind::ThroughputUdp => "UDP Throughput",
            TestKind::LatencyPingPong => "Latency Ping-Pong",
            TestKind::LatencyUnderLoad => "Latency Under Load",
            TestKind::LatencySweep => "Latency Sweep",
            TestKind::IcmpPing => "ICMP Ping",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "tcp" | "throughput_tcp" => Ok(TestKind::ThroughputTcp),
            "udp" | "throughput_udp" => Ok(TestKind::ThroughputUdp),
            "pingpong" | "ping_pong" | "latency_ping_pong" => Ok(TestKind::LatencyPingPong),
            "load" | "under_load" | "latency_under_load" => Ok(TestKind::LatencyUnderLoad),
            "sweep" | "multisize" | "latency_sweep" => Ok(TestKind::LatencySweep),
            "ping" | "icmp" | "icmp_ping" => Ok(TestKind::IcmpPing),
            other => Err(format!(
                "unknown test kind '{other}', expected one of tcp, udp, pingpong, load, sweep, ping"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_udp_accepts_a_bandwidth_cap() {
        for kind in TestKind::ALL {
            assert_eq!(
                kind.accepts(Param::Bandwidth),
                kind == TestKind::ThroughputUdp,
                "{kind}"
            );
        }
        assert!(!TestKind::ThroughputUdp.requires(Param::Bandwidth));
    }

    #[test]
    fn icmp_ping_has_no_port_or_duration() {
        let kind = TestKind::IcmpPing;
        assert!(kind.requires(Param::Host));
        assert!(kind.requires(Param::Count));
        assert!(!kind.accepts(Param::Port));
        assert!(!kind.accepts(Param::Duration));
    }

    #[test]
    fn kinds_parse_from_short_and_long_names() {
        assert_eq!("sweep".parse::<TestKind>(), Ok(TestKind::LatencySweep));
        assert_eq!(
            "latency-under-load".parse::<TestKind>(),
            Ok(TestKind::LatencyUnderLoad)
        );
        assert!("bogus".parse::<TestKind>().is_err());
        assert_eq!("Listener".parse::<Mode>(), Ok(Mode::Listener));
    }

    #[test]
    fn stop_command_follows_the_tool() {
        assert_eq!(TestKind::ThroughputUdp.stop_command(), Command::StopIperf);
        assert_eq!(TestKind::LatencySweep.stop_command(), Command::StopSockperf);
        assert_eq!(TestKind::IcmpPing.stop_command(), Command::StopPing);
        assert_eq!(TestKind::LatencySweep.server(), Some(ServerKind::Latency));
        assert_eq!(TestKind::IcmpPing.server(), None);
    }
}
