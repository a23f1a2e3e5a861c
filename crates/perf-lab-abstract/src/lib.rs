pub mod command;
pub mod config;
pub mod event;
pub mod kind;
pub mod profile;

pub use command::Command;
pub use config::{ClientConfig, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SWEEP_SIZES, TestRequest};
pub use event::{
    DecodeError, Envelope, Event, LifecyclePhase, LifecycleSource, Metrics, ServerStatus,
    SweepPoint, SweepProgress, ToolStats,
};
pub use kind::{Mode, Param, ParamSpec, ServerKind, TestKind, Tool};
pub use profile::{ClientConfigOverride, Profile, TestRequestOverride};
