use anyhow::{Context, Result};
use clap::Parser;
use perf_lab_abstract::{
    ClientConfig, ClientConfigOverride, Mode, Profile, TestKind, TestRequestOverride,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::export::ExportTargets;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live client for iperf3 / sockperf test backends")]
pub struct Args {
    /// Origin of the backend web service, e.g. http://192.168.1.10:9000.
    #[arg(long)]
    pub origin: Option<String>,

    /// Load a test profile (TOML) from disk.
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Launch the terminal dashboard.
    #[arg(long, default_value_t = false)]
    pub tui: bool,

    /// generator or listener.
    #[arg(long)]
    pub mode: Option<Mode>,

    /// tcp, udp, pingpong, load, sweep or ping.
    #[arg(long = "test")]
    pub kind: Option<TestKind>,

    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub duration: Option<u32>,

    /// UDP bandwidth cap, e.g. 100M.
    #[arg(long)]
    pub bandwidth: Option<String>,

    #[arg(long)]
    pub msg_size: Option<u32>,
    #[arg(long)]
    pub mps: Option<u32>,

    /// Comma separated payload sizes for a latency sweep.
    #[arg(long, value_delimiter = ',')]
    pub sizes: Option<Vec<u32>>,

    /// Echo requests for an ICMP ping.
    #[arg(long)]
    pub count: Option<u32>,

    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Write a JSON export of the finished run.
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Write the sweep results as CSV.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,
}

impl Args {
    /// Defaults, then the profile file, then flags.
    pub fn resolve(&self) -> Result<ClientConfig> {
        let profile = match &self.profile {
            Some(path) => {
                let profile = load_profile(path)?;
                info!("Loaded profile '{}' from {}", profile.name, path.display());
                Some(profile)
            }
            None => None,
        };
        Ok(self.resolve_with(profile.as_ref()))
    }

    fn resolve_with(&self, profile: Option<&Profile>) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(profile) = profile {
            profile.apply_to(&mut config);
        }
        self.client_overrides().apply_to(&mut config);
        self.test_overrides().apply_to(&mut config.test);
        config
    }

    fn client_overrides(&self) -> ClientConfigOverride {
        ClientConfigOverride {
            origin: self.origin.clone(),
            reconnect_delay_ms: self.reconnect_delay_ms,
            mode: self.mode,
        }
    }

    fn test_overrides(&self) -> TestRequestOverride {
        TestRequestOverride {
            kind: self.kind,
            host: self.host.clone(),
            port: self.port,
            duration: self.duration,
            bandwidth: self.bandwidth.clone(),
            msg_size: self.msg_size,
            mps: self.mps,
            msg_sizes: self.sizes.clone(),
            count: self.count,
        }
    }

    pub fn export_targets(&self) -> ExportTargets {
        ExportTargets {
            json: self.export_json.clone(),
            csv: self.export_csv.clone(),
        }
    }
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file {}", path.display()))?;
    parse_profile(&content)
}

fn parse_profile(content: &str) -> Result<Profile> {
    toml::from_str(content).context("Failed to parse profile file")
}
