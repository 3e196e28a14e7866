use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{DoorError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub users: UserConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub face_service: FaceServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_unlock_duration")]
    pub unlock_duration_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Record rejected PINs as unauthorized PIN attempts
    #[serde(default)]
    pub log_failed_pin_attempts: bool,
}

fn default_unlock_duration() -> u64 { 300 }
fn default_cooldown() -> u64 { 10 }

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            unlock_duration_secs: default_unlock_duration(),
            cooldown_secs: default_cooldown(),
            log_failed_pin_attempts: false,
        }
    }
}

impl LockConfig {
    pub fn unlock_duration(&self) -> Duration {
        Duration::from_secs(self.unlock_duration_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_tick_ms() -> u64 { 100 }
fn default_debounce_ms() -> u64 { 1000 }
fn default_alert_interval() -> u64 { 300 }
fn default_join_timeout_ms() -> u64 { 2000 }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            debounce_ms: default_debounce_ms(),
            alert_interval_secs: default_alert_interval(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl PollConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Relative store files are anchored at the directory of the config file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PinConfig {
    #[serde(default = "default_pin_file")]
    pub file: PathBuf,
}

fn default_pin_file() -> PathBuf {
    PathBuf::from("auth_config.json")
}

impl Default for PinConfig {
    fn default() -> Self {
        Self { file: default_pin_file() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserConfig {
    #[serde(default = "default_user_file")]
    pub file: PathBuf,
}

fn default_user_file() -> PathBuf {
    PathBuf::from("authorized_users.json")
}

impl Default for UserConfig {
    fn default() -> Self {
        Self { file: default_user_file() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_door_name")]
    pub door_name: String,
    #[serde(default = "default_control_topic")]
    pub control_topic: String,
    #[serde(default = "default_alert_topic")]
    pub alert_topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_true() -> bool { true }
fn default_broker_host() -> String { "192.168.1.100".to_string() }
fn default_broker_port() -> u16 { 1883 }
fn default_client_id() -> String { "door-sup".to_string() }
fn default_door_name() -> String { "Front Door".to_string() }
fn default_control_topic() -> String { "central_main/control".to_string() }
fn default_alert_topic() -> String { "home/security/unauthorized".to_string() }
fn default_keep_alive() -> u64 { 60 }

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            door_name: default_door_name(),
            control_topic: default_control_topic(),
            alert_topic: default_alert_topic(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FaceServiceConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_service_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub shared_secret_file: Option<PathBuf>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(crate::service::protocol::SOCKET_PATH)
}
fn default_service_timeout() -> u64 { 500 }

impl Default for FaceServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            timeout_ms: default_service_timeout(),
            shared_secret_file: None,
        }
    }
}

impl FaceServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DoorError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| DoorError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// A missing file is not fatal: the door still runs with defaults.
    /// A file that exists but does not parse or validate is.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock.unlock_duration_secs == 0 || self.lock.unlock_duration_secs > 86_400 {
            return Err(DoorError::Config(format!(
                "Unlock duration must be between 1 and 86400 seconds, got {}",
                self.lock.unlock_duration_secs
            )));
        }
        if self.lock.cooldown_secs > 3600 {
            return Err(DoorError::Config(format!(
                "Cooldown must be at most 3600 seconds, got {}", self.lock.cooldown_secs
            )));
        }

        if self.poll.tick_ms == 0 || self.poll.tick_ms > 10_000 {
            return Err(DoorError::Config(format!(
                "Poll tick must be between 1 and 10000 ms, got {}", self.poll.tick_ms
            )));
        }
        if self.poll.debounce_ms < self.poll.tick_ms {
            return Err(DoorError::Config(format!(
                "Debounce ({} ms) must not be shorter than the poll tick ({} ms)",
                self.poll.debounce_ms, self.poll.tick_ms
            )));
        }
        if self.poll.join_timeout_ms == 0 {
            return Err(DoorError::Config("Join timeout must be non-zero".into()));
        }

        if self.mqtt.enabled {
            if self.mqtt.broker_host.trim().is_empty() {
                return Err(DoorError::Config("MQTT broker host is empty".into()));
            }
            if self.mqtt.broker_port == 0 {
                return Err(DoorError::Config("MQTT broker port must be non-zero".into()));
            }
            if self.mqtt.keep_alive_secs < 5 || self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
                return Err(DoorError::Config(format!(
                    "MQTT keep-alive must be between 5 and {} seconds, got {}",
                    u16::MAX,
                    self.mqtt.keep_alive_secs
                )));
            }
            if self.mqtt.control_topic.is_empty() || self.mqtt.alert_topic.is_empty() {
                return Err(DoorError::Config("MQTT topics must not be empty".into()));
            }
        }

        if self.face_service.timeout_ms == 0 || self.face_service.timeout_ms > 60_000 {
            return Err(DoorError::Config(format!(
                "Face service timeout must be between 1 and 60000 ms, got {}",
                self.face_service.timeout_ms
            )));
        }

        Ok(())
    }
}
