pub mod endpoint;
pub mod supervisor;

pub use endpoint::{EndpointError, ws_endpoint};
pub use supervisor::{Inbound, LinkState, Supervisor, SupervisorConfig, SupervisorHandle};
