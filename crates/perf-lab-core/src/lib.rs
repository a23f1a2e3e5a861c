pub mod activity;
pub mod console;
pub mod dispatcher;
pub mod encoder;
pub mod export;
pub mod format;
pub mod session;
pub mod state;
pub mod sweep;
pub mod telemetry;

pub use activity::{ACTIVITY_CAPACITY, ActivityLog, LogEntry, LogLevel};
pub use console::{CommandSink, Console};
pub use dispatcher::{DispatchContext, dispatch};
pub use encoder::{DeliveryError, Intent, Rejection, encode, start_command};
pub use export::{ExportDocument, SWEEP_CSV_HEADER, sweep_csv};
pub use session::{RunStatus, Session, SessionError};
pub use state::{ClientState, Connectivity};
pub use sweep::{SweepAggregator, SweepState};
pub use telemetry::{ChartData, Series, TELEMETRY_CAPACITY, TelemetryBuffer, wall_clock_label};
