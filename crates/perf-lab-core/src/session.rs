use perf_lab_abstract::{Mode, TestKind};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Client-side view of whether a run is in progress. The backend stays
/// authoritative; this only gates what the user may do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Stopping => "stopping",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("listener mode: tests can only be started in generator mode")]
    ListenerMode,
    #[error("generator mode: servers are controlled in listener mode")]
    GeneratorMode,
    #[error("a test is already {0}")]
    Busy(RunStatus),
    #[error("no test is running")]
    NotRunning,
    #[error("cannot switch mode while a test is {0}")]
    ModeLocked(RunStatus),
    #[error("cannot change the test selection while a test is {0}")]
    SelectionLocked(RunStatus),
}

/// Mode, active test and run status.
///
/// Invariant: `active_test` is `None` exactly when `status` is `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    mode: Mode,
    active_test: Option<TestKind>,
    status: RunStatus,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            mode: Mode::Generator,
            active_test: None,
            status: RunStatus::Idle,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn active_test(&self) -> Option<TestKind> {
        self.active_test
    }

    pub fn is_idle(&self) -> bool {
        self.status == RunStatus::Idle
    }

    pub fn check_can_start(&self) -> Result<(), SessionError> {
        if self.mode == Mode::Listener {
            return Err(SessionError::ListenerMode);
        }
        if self.status != RunStatus::Idle {
            return Err(SessionError::Busy(self.status));
        }
        Ok(())
    }

    /// The test a stop command should target.
    pub fn stop_target(&self) -> Result<TestKind, SessionError> {
        match (self.status, self.active_test) {
            (RunStatus::Running | RunStatus::Stopping, Some(kind)) => Ok(kind),
            _ => Err(SessionError::NotRunning),
        }
    }

    pub fn check_listener(&self) -> Result<(), SessionError> {
        match self.mode {
            Mode::Listener => Ok(()),
            Mode::Generator => Err(SessionError::GeneratorMode),
        }
    }

    /// Test parameters and selection may only change between runs.
    pub fn check_reconfigure(&self) -> Result<(), SessionError> {
        if self.status != RunStatus::Idle {
            return Err(SessionError::SelectionLocked(self.status));
        }
        Ok(())
    }

    /// `Idle -> Running` after a start command went out.
    pub fn begin(&mut self, kind: TestKind) -> Result<(), SessionError> {
        self.check_can_start()?;
        debug!("session: idle -> running ({kind})");
        self.status = RunStatus::Running;
        self.active_test = Some(kind);
        Ok(())
    }

    /// `Running -> Stopping` after a stop command went out.
    pub fn request_stop(&mut self) -> Result<TestKind, SessionError> {
        let kind = self.stop_target()?;
        debug!("session: {} -> stopping ({kind})", self.status);
        self.status = RunStatus::Stopping;
        Ok(kind)
    }

    /// A terminal event arrived. Returns the test that ended, if one was active.
    pub fn finish(&mut self) -> Option<TestKind> {
        if self.status == RunStatus::Idle {
            debug!("session: terminal event while idle");
        } else {
            debug!("session: {} -> idle", self.status);
        }
        self.status = RunStatus::Idle;
        self.active_test.take()
    }

    /// The backend announced a sweep. It wins over whatever the client believed.
    pub fn sweep_started(&mut self) {
        if let Some(kind) = self.active_test
            && kind != TestKind::LatencySweep
        {
            debug!("session: sweep replaces active {kind}");
        }
        self.status = RunStatus::Running;
        self.active_test = Some(TestKind::LatencySweep);
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), SessionError> {
        if mode == self.mode {
            return Ok(());
        }
        if self.status != RunStatus::Idle {
            return Err(SessionError::ModeLocked(self.status));
        }
        debug!("session: mode {} -> {}", self.mode, mode);
        self.mode = mode;
        Ok(())
    }

    /// Back to `Idle` with no active test, keeping the mode.
    pub fn reset(&mut self) {
        self.status = RunStatus::Idle;
        self.active_test = None;
    }
}
