use anyhow::{Context, Result};
use clap::Parser;
use perf_lab_abstract::ClientConfig;
use perf_lab_client::{SupervisorConfig, ws_endpoint};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod args;
mod export;
mod headless;
mod logbuf;
#[cfg(feature = "tui")]
mod tui;

use args::Args;
use export::ExportTargets;
use logbuf::MemoryLogBuffer;

fn main() -> Result<()> {
    let args = Args::parse();
    let log_buffer = init_logging(args.tui);
    info!("perf-lab starting…");

    let config = args.resolve()?;
    let endpoint = ws_endpoint(&config.origin)?;
    let supervisor = SupervisorConfig {
        endpoint,
        reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
    };
    let targets = args.export_targets();
    let runtime = Runtime::new().context("Failed to start the async runtime")?;

    if args.tui {
        run_tui(&runtime, config, supervisor, log_buffer, targets)
    } else {
        runtime.block_on(headless::run(config, supervisor, targets))
    }
}

/// `RUST_LOG` directives win; otherwise everything at `info` and above.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_logging(use_tui: bool) -> Option<MemoryLogBuffer> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(directives.as_deref());
    if use_tui {
        let buffer = MemoryLogBuffer::new();
        let writer = buffer.clone();
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .init();
        Some(buffer)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

#[cfg(feature = "tui")]
fn run_tui(
    runtime: &Runtime,
    config: ClientConfig,
    supervisor: SupervisorConfig,
    log_buffer: Option<MemoryLogBuffer>,
    targets: ExportTargets,
) -> Result<()> {
    use perf_lab_client::Supervisor;
    use perf_lab_core::Console;

    let (handle, inbound, task) = {
        let _guard = runtime.enter();
        Supervisor::spawn(supervisor)
    };
    let console = Console::new(&config, handle.clone());
    let mut app = tui::Dashboard::new(console, inbound, log_buffer, targets.clone());
    let result = app.run();

    handle.shutdown();
    let _ = runtime.block_on(task);

    if !targets.is_empty() {
        let state = app.into_console().snapshot();
        for path in export::write_exports(&state, &targets)? {
            info!("Wrote {}", path.display());
        }
    }
    result
}

#[cfg(not(feature = "tui"))]
fn run_tui(
    _runtime: &Runtime,
    _config: ClientConfig,
    _supervisor: SupervisorConfig,
    _log_buffer: Option<MemoryLogBuffer>,
    _targets: ExportTargets,
) -> Result<()> {
    anyhow::bail!("perf-lab was built without the `tui` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn log_filter_honours_directives() {
        let filter = log_filter(Some("perf_lab_client=trace,warn"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn unparsable_directives_fall_back_to_info() {
        let filter = log_filter(Some("perf_lab_client=loud"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
