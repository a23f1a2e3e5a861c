use perf_lab_abstract::{Metrics, ServerStatus, TestRequest};
use serde::Serialize;

use crate::activity::ActivityLog;
use crate::session::Session;
use crate::sweep::SweepAggregator;
use crate::telemetry::TelemetryBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Disconnected,
    Connected,
}

/// Everything the client knows, owned by a single dispatch loop.
///
/// Presentation gets `&ClientState` or a cloned snapshot; mutation goes through
/// the dispatcher and the console only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientState {
    pub session: Session,
    pub telemetry: TelemetryBuffer,
    pub sweep: SweepAggregator,
    pub server_status: ServerStatus,
    pub latest: Metrics,
    pub log: ActivityLog,
    pub connectivity: Connectivity,
    pub request: TestRequest,
    /// Size count of a sweep we asked for and the backend has not acknowledged yet.
    #[serde(skip)]
    pub(crate) pending_sweep_total: Option<usize>,
}

impl ClientState {
    pub fn new(request: TestRequest) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }

    /// Drop run data and return the session to idle. Mode, configuration,
    /// connectivity and the log survive.
    pub fn reset(&mut self) {
        self.session.reset();
        self.telemetry.reset();
        self.sweep.reset();
        self.latest = Metrics::default();
        self.pending_sweep_total = None;
    }
}
