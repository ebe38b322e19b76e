pub mod capture;
pub mod display;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod utils;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, SnapshotSource};
pub use envelope::{Event, EventKind, FrameId, RoadCameraState, Transform};
pub use error::{CaptureError, EnvelopeError, PipelineError, PublishError};
pub use pipeline::{CaptureLoop, LoopStats};
pub use publish::{PubSocket, Publisher, SubSocket};

/// Default location of the optional configuration file.
pub const CONFIG_FILE: &str = "roadcam.toml";

/// Prefix of environment overrides, e.g. `ROADCAM__PIPELINE__PERIOD_MS`.
pub const ENV_PREFIX: &str = "ROADCAM";

/// System configuration
///
/// Every field has a default, so an absent file means the fixed
/// behavior: 50 ms period, `roadCameraState` on its derived port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub publish: PublishConfig,
    pub preview: PreviewConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// X display to capture; `$DISPLAY` when unset.
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target loop period in milliseconds.
    pub period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub topic: String,
    pub bind_addr: IpAddr,
    /// Overrides the port derived from the topic name.
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { period_ms: 50 } // 20 Hz
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic: publish::ROAD_CAMERA_STATE.into(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            title: "roadcam preview".into(),
            width: 1024,
            height: 768,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "roadcam=info".into(),
        }
    }
}

impl PipelineConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl PublishConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        let port = self
            .port
            .unwrap_or_else(|| publish::port_for_topic(&self.topic));
        SocketAddr::new(self.bind_addr, port)
    }
}

impl Config {
    /// Load `path` if it exists, then apply `ROADCAM__*` overrides.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }
}
