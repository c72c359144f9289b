use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::HttpVersion;

/// Settings for one transport channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Base URL resource names are joined onto.
    pub base_url: String,
    pub http_version: HttpVersion,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Connections the multiplexed channel may open per host. Requests share
    /// them once the peer confirms multiplexing. Legacy always uses one.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> usize {
    8
}

impl ChannelConfig {
    pub fn multiplexed_default() -> Self {
        Self {
            base_url: "https://localhost:6121".to_string(),
            http_version: HttpVersion::Http3,
            connect_timeout_secs: default_connect_timeout_secs(),
            max_connections: default_max_connections(),
        }
    }

    pub fn legacy_default() -> Self {
        Self {
            base_url: "http://localhost:6060".to_string(),
            http_version: HttpVersion::Http1,
            connect_timeout_secs: default_connect_timeout_secs(),
            max_connections: 1,
        }
    }
}

/// Global configuration loaded from `~/.config/duofetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bytes requested per chunk by the pull loop.
    pub chunk_size: u64,
    /// Pause between pull-loop chunks, in milliseconds.
    pub settle_interval_ms: u64,
    /// Race deadline relative to race start, in milliseconds.
    pub race_deadline_ms: u64,
    /// Pause between racing the multiplexed and the legacy channel.
    pub race_pause_ms: u64,
    /// Optional per-request timeout in seconds (None = no limit).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Skip TLS peer and host verification.
    #[serde(default)]
    pub insecure: bool,
    /// Where libcurl should write TLS key material (SSLKEYLOGFILE).
    #[serde(default)]
    pub keylog_file: Option<PathBuf>,
    /// Write per-request trace records.
    #[serde(default)]
    pub trace: bool,
    /// Trace destination; defaults to `duofetch-trace.jsonl` in the state dir.
    #[serde(default)]
    pub trace_path: Option<PathBuf>,
    pub multiplexed: ChannelConfig,
    pub legacy: ChannelConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            settle_interval_ms: 1000,
            race_deadline_ms: 3000,
            race_pause_ms: 10_000,
            request_timeout_secs: None,
            insecure: false,
            keylog_file: None,
            trace: false,
            trace_path: None,
            multiplexed: ChannelConfig::multiplexed_default(),
            legacy: ChannelConfig::legacy_default(),
        }
    }
}

/// Command-line overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub quiet: bool,
    pub insecure: bool,
    pub keylog_file: Option<PathBuf>,
    pub trace: bool,
    pub chunk_size: Option<u64>,
    pub settle_interval_ms: Option<u64>,
    pub race_deadline_ms: Option<u64>,
}

impl FetchConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn race_deadline(&self) -> Duration {
        Duration::from_millis(self.race_deadline_ms)
    }

    pub fn race_pause(&self) -> Duration {
        Duration::from_millis(self.race_pause_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Apply CLI overrides. Flags only ever switch features on; they never
    /// turn off something the file enabled.
    pub fn apply(&mut self, o: &SessionOverrides) {
        if o.insecure {
            self.insecure = true;
        }
        if o.keylog_file.is_some() {
            self.keylog_file = o.keylog_file.clone();
        }
        if o.trace {
            self.trace = true;
        }
        if let Some(n) = o.chunk_size {
            self.chunk_size = n;
        }
        if let Some(ms) = o.settle_interval_ms {
            self.settle_interval_ms = ms;
        }
        if let Some(ms) = o.race_deadline_ms {
            self.race_deadline_ms = ms;
        }
    }

    /// Pretty TOML, as written to the config file.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        for (label, ch) in [("multiplexed", &self.multiplexed), ("legacy", &self.legacy)] {
            if let Err(e) = url::Url::parse(&ch.base_url) {
                bail!("{} base_url {:?} is invalid: {}", label, ch.base_url, e);
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("duofetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default trace destination under the XDG state dir.
pub fn default_trace_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("duofetch")?;
    Ok(xdg_dirs.place_state_file("duofetch-trace.jsonl")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: FetchConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = FetchConfig::default();
        assert_eq!(cfg.chunk_size, 100);
        assert_eq!(cfg.settle_interval(), Duration::from_secs(1));
        assert_eq!(cfg.race_deadline(), Duration::from_secs(3));
        assert_eq!(cfg.race_pause(), Duration::from_secs(10));
        assert_eq!(cfg.multiplexed.base_url, "https://localhost:6121");
        assert_eq!(cfg.multiplexed.http_version, HttpVersion::Http3);
        assert_eq!(cfg.legacy.base_url, "http://localhost:6060");
        assert!(!cfg.insecure);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = FetchConfig::default();
        let toml = cfg.to_toml().unwrap();
        let parsed: FetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.chunk_size, cfg.chunk_size);
        assert_eq!(parsed.race_deadline_ms, cfg.race_deadline_ms);
        assert_eq!(parsed.legacy.base_url, cfg.legacy.base_url);
        assert_eq!(parsed.multiplexed.http_version, cfg.multiplexed.http_version);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            chunk_size = 4096
            settle_interval_ms = 0
            race_deadline_ms = 500
            race_pause_ms = 0
            request_timeout_secs = 5
            trace = true

            [multiplexed]
            base_url = "https://cdn.example:8443/files"
            http_version = "http2"

            [legacy]
            base_url = "http://cdn.example:8080/files"
            http_version = "http1"
        "#;
        let cfg: FetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunk_size, 4096);
        assert_eq!(cfg.settle_interval(), Duration::ZERO);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(5)));
        assert!(cfg.trace);
        assert!(cfg.trace_path.is_none());
        assert_eq!(cfg.multiplexed.http_version, HttpVersion::Http2);
        assert_eq!(cfg.multiplexed.max_connections, 8);
        assert_eq!(cfg.legacy.connect_timeout_secs, 30);
    }

    #[test]
    fn overrides_only_switch_on() {
        let mut cfg = FetchConfig {
            trace: true,
            ..FetchConfig::default()
        };
        cfg.apply(&SessionOverrides {
            insecure: true,
            chunk_size: Some(37),
            race_deadline_ms: Some(250),
            ..SessionOverrides::default()
        });
        assert!(cfg.insecure);
        assert!(cfg.trace, "file-enabled trace stays on");
        assert_eq!(cfg.chunk_size, 37);
        assert_eq!(cfg.race_deadline_ms, 250);
        assert_eq!(cfg.settle_interval_ms, 1000);
    }

    #[test]
    fn validate_rejects_zero_chunk_and_bad_url() {
        let cfg = FetchConfig {
            chunk_size: 0,
            ..FetchConfig::default()
        };
        assert!(cfg.validate().is_err());
        let mut cfg = FetchConfig::default();
        cfg.legacy.base_url = "localhost without scheme".into();
        assert!(cfg.validate().is_err());
    }
}
