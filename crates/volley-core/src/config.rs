use crate::error::{Result, VolleyError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the game world, e.g. `https://en140.tribalwars.net/`.
    #[serde(default)]
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// PacingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Normal-mode delay before each request is a random whole number of
    /// seconds in `[3 * delay, 7 * delay]`.
    #[serde(default = "default_delay")]
    pub delay: f64,
}

fn default_delay() -> f64 {
    1.0
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay: default_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// A batch activates once its completion instant is this close.
    #[serde(default = "default_horizon")]
    pub horizon_secs: u64,
    /// A request whose send instant is not at least this far ahead aborts the batch.
    #[serde(default = "default_margin")]
    pub min_margin_secs: u64,
    /// Gap before each submission in the dispatch phase.
    #[serde(default = "default_spacing")]
    pub spacing_ms: u64,
    /// Remaining waits above this use coarse sleeps with progress logging.
    #[serde(default = "default_coarse_threshold")]
    pub coarse_threshold_secs: u64,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    #[serde(default = "default_coarse_step")]
    pub coarse_step_ms: u64,
    #[serde(default = "default_fine_step")]
    pub fine_step_ms: u64,
    /// Control loop period between activation checks.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

fn default_horizon() -> u64 {
    1500
}

fn default_margin() -> u64 {
    30
}

fn default_spacing() -> u64 {
    100
}

fn default_coarse_threshold() -> u64 {
    60
}

fn default_progress_interval() -> u64 {
    30
}

fn default_coarse_step() -> u64 {
    1000
}

fn default_fine_step() -> u64 {
    100
}

fn default_tick() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            horizon_secs: default_horizon(),
            min_margin_secs: default_margin(),
            spacing_ms: default_spacing(),
            coarse_threshold_secs: default_coarse_threshold(),
            progress_interval_secs: default_progress_interval(),
            coarse_step_ms: default_coarse_step(),
            fine_step_ms: default_fine_step(),
            tick_secs: default_tick(),
        }
    }
}

impl DispatchConfig {
    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Substring in a response body that means the server wants a human.
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Absent means wait for clearance forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_marker() -> String {
    r#"data-bot-protect="forced""#.to_string()
}

fn default_poll_interval() -> u64 {
    30
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Minimum gap between two non-forced messages.
    #[serde(default = "default_message_delay")]
    pub message_delay_secs: u64,
}

fn default_bot_name() -> String {
    "volley".to_string()
}

fn default_message_delay() -> u64 {
    7200
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            channel_id: None,
            bot_name: default_bot_name(),
            message_delay_secs: default_message_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_speed")]
    pub unit_speed: f64,
    /// Unit → base minutes per field, overriding the built-in table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, f64>,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            unit_speed: default_speed(),
            units: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Account label used in notifications and logs.
    pub account: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub world: WorldConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            version: 1,
            account: account.into(),
            server: ServerConfig::default(),
            pacing: PacingConfig::default(),
            dispatch: DispatchConfig::default(),
            gate: GateConfig::default(),
            notifications: NotificationConfig::default(),
            world: WorldConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(VolleyError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        let endpoint = self.server.endpoint.trim();
        if endpoint.is_empty() {
            warn(
                WarnLevel::Error,
                "server.endpoint is empty: gateway calls cannot be made".to_string(),
            );
        } else if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            warn(
                WarnLevel::Error,
                format!("server.endpoint '{endpoint}' is not an http(s) URL"),
            );
        }

        if self.pacing.delay < 0.0 {
            warn(
                WarnLevel::Error,
                format!("pacing.delay={} must not be negative", self.pacing.delay),
            );
        }

        let d = &self.dispatch;
        if d.horizon_secs <= d.min_margin_secs {
            warn(
                WarnLevel::Error,
                format!(
                    "dispatch.horizon_secs={} must exceed dispatch.min_margin_secs={}",
                    d.horizon_secs, d.min_margin_secs
                ),
            );
        }
        if d.spacing_ms > 1000 {
            warn(
                WarnLevel::Warning,
                format!(
                    "dispatch.spacing_ms={} spreads a batch over more than a second per request",
                    d.spacing_ms
                ),
            );
        }
        if d.fine_step_ms == 0 || d.coarse_step_ms == 0 {
            warn(
                WarnLevel::Error,
                "dispatch sleep steps must be above zero".to_string(),
            );
        }
        if d.fine_step_ms >= 1000 {
            warn(
                WarnLevel::Warning,
                format!(
                    "dispatch.fine_step_ms={} allows a send to overshoot by a second or more",
                    d.fine_step_ms
                ),
            );
        }

        if self.gate.marker.trim().is_empty() {
            warn(
                WarnLevel::Error,
                "gate.marker is empty: every response would look like a challenge".to_string(),
            );
        }
        if self.gate.poll_interval_secs == 0 {
            warn(
                WarnLevel::Error,
                "gate.poll_interval_secs must be above zero".to_string(),
            );
        }

        if self.notifications.enabled
            && (self.notifications.token.is_none() || self.notifications.channel_id.is_none())
        {
            warn(
                WarnLevel::Warning,
                "notifications.enabled is set but token or channel_id is missing".to_string(),
            );
        }

        if self.world.speed <= 0.0 || self.world.unit_speed <= 0.0 {
            warn(
                WarnLevel::Error,
                "world.speed and world.unit_speed must be positive".to_string(),
            );
        }
        for (unit, minutes) in &self.world.units {
            if *minutes <= 0.0 {
                warn(
                    WarnLevel::Error,
                    format!("world.units.{unit}={minutes} must be positive"),
                );
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
