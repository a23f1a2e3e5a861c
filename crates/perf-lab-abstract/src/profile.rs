use serde::Deserialize;

use crate::config::{ClientConfig, TestRequest};
use crate::kind::{Mode, TestKind};

/// A named test profile, usually loaded from a TOML file.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub client: ClientConfigOverride,
    #[serde(default)]
    pub test: TestRequestOverride,
}

impl Profile {
    pub fn apply_to(&self, config: &mut ClientConfig) {
        self.client.apply_to(config);
        self.test.apply_to(&mut config.test);
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClientConfigOverride {
    pub origin: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub mode: Option<Mode>,
}

impl ClientConfigOverride {
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(v) = &self.origin {
            config.origin = v.clone();
        }
        if let Some(v) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = v;
        }
        if let Some(v) = self.mode {
            config.mode = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TestRequestOverride {
    pub kind: Option<TestKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub duration: Option<u32>,
    pub bandwidth: Option<String>,
    pub msg_size: Option<u32>,
    pub mps: Option<u32>,
    pub msg_sizes: Option<Vec<u32>>,
    pub count: Option<u32>,
}

impl TestRequestOverride {
    pub fn apply_to(&self, request: &mut TestRequest) {
        if let Some(v) = self.kind {
            request.kind = v;
        }
        if let Some(v) = &self.host {
            request.host = v.clone();
        }
        if let Some(v) = self.port {
            request.port = Some(v);
        }
        if let Some(v) = self.duration {
            request.duration = v;
        }
        if let Some(v) = &self.bandwidth {
            request.bandwidth = Some(v.clone());
        }
        if let Some(v) = self.msg_size {
            request.msg_size = v;
        }
        if let Some(v) = self.mps {
            request.mps = v;
        }
        if let Some(v) = &self.msg_sizes {
            request.msg_sizes = v.clone();
        }
        if let Some(v) = self.count {
            request.count = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_touch_given_fields() {
        let mut config = ClientConfig::default();
        let profile = Profile {
            name: "lab".into(),
            client: ClientConfigOverride {
                reconnect_delay_ms: Some(500),
                ..Default::default()
            },
            test: TestRequestOverride {
                kind: Some(TestKind::LatencyUnderLoad),
                mps: Some(2000),
                ..Default::default()
            },
            ..Default::default()
        };
        profile.apply_to(&mut config);

        assert_eq!(config.reconnect_delay_ms, 500);
        assert_eq!(config.origin, "http://127.0.0.1:9000");
        assert_eq!(config.test.kind, TestKind::LatencyUnderLoad);
        assert_eq!(config.test.mps, 2000);
        assert_eq!(config.test.msg_size, 64);
        assert_eq!(config.test.effective_port(), 11111);
    }
}
