use crate::connection::RetryPolicy;
use crate::connection::protocol::endpoint_url;
use crate::device::{DeviceIdentity, DeviceRole};
use crate::error::{GatewayError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};

/// Delay of the test `shooting` event after each connect in local mode.
pub const TEST_SHOT_DELAY: Duration = Duration::from_millis(1500);

/// Load environment variables from a .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv(path: &Path) {
    if !path.exists() {
        return;
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the runtime spawns any task
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }
    pairs
}

/// Deployment mode from `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RunMode {
    /// Development: fires a test shot after each connect.
    Local,
    /// On the device: inbound hits drive the indicator.
    Pi,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SensorKind {
    #[default]
    None,
    Strain,
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SamplingMode {
    /// Low-rate diagnostics, logged locally.
    #[default]
    Poll,
    /// High-rate forwarding while the coordinator asks for it.
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub run_mode: RunMode,
    pub sensor: SensorKind,
    pub sampling: SamplingMode,
    pub reconnect: ReconnectConfig,
    pub debounce_ms: u64,
    pub simulate_inputs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub role: DeviceRole,
    pub display_name: Option<String>,
    pub device_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub port: u16,
    pub asset_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub attempts: u32,
    pub delay_ms: u64,
    pub delay_max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 1000,
            delay_max_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(GatewayError::MissingConfig(key));

        let role = required("DEVICE_TYPE")?;
        let role = DeviceRole::from_str(role.trim()).map_err(|_| GatewayError::InvalidConfig {
            key: "DEVICE_TYPE",
            value: role.clone(),
        })?;

        let run_mode = get("NODE_ENV")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default();

        Ok(Self {
            device: DeviceConfig {
                role,
                display_name: get("SWORD_NAME"),
                device_number: required("PI_DEVICE_NUMBER")?.trim().to_string(),
            },
            server: ServerConfig {
                host: required("SERVER")?.trim().to_string(),
                port: parse_or(get("SERVER_PORT"), "SERVER_PORT", 3000)?,
            },
            http: HttpConfig {
                port: parse_or(get("HTTP_PORT"), "HTTP_PORT", 8080)?,
                asset_path: get("ASSET_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("public/index.html")),
            },
            run_mode,
            sensor: parse_or(get("SENSOR"), "SENSOR", SensorKind::None)?,
            sampling: parse_or(get("SAMPLING_MODE"), "SAMPLING_MODE", SamplingMode::Poll)?,
            reconnect: ReconnectConfig {
                attempts: parse_or(get("RECONNECT_ATTEMPTS"), "RECONNECT_ATTEMPTS", 5)?,
                delay_ms: parse_or(get("RECONNECT_DELAY_MS"), "RECONNECT_DELAY_MS", 1000)?,
                delay_max_ms: parse_or(
                    get("RECONNECT_DELAY_MAX_MS"),
                    "RECONNECT_DELAY_MAX_MS",
                    5000,
                )?,
            },
            debounce_ms: parse_or(get("DEBOUNCE_MS"), "DEBOUNCE_MS", 250)?,
            simulate_inputs: match get("SIMULATE_INPUTS") {
                Some(v) => parse_flag(&v).ok_or(GatewayError::InvalidConfig {
                    key: "SIMULATE_INPUTS",
                    value: v,
                })?,
                None => false,
            },
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(
            self.device.role.clone(),
            self.device.display_name.clone(),
            self.device.device_number.clone(),
        )
    }

    /// WebSocket URL of the coordinator.
    pub fn endpoint(&self) -> String {
        endpoint_url(&self.server.host, self.server.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.reconnect.delay_ms);
        RetryPolicy {
            max_attempts: self.reconnect.attempts,
            initial_delay: delay,
            step: delay,
            max_delay: Duration::from_millis(self.reconnect.delay_max_ms),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether inbound hits drive the indicator.
    pub fn actuate_on_hit(&self) -> bool {
        self.run_mode == RunMode::Pi
    }

    pub fn test_shot_delay(&self) -> Option<Duration> {
        (self.run_mode == RunMode::Local).then_some(TEST_SHOT_DELAY)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| GatewayError::InvalidConfig { key, value }),
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DEVICE_TYPE", "gun"),
        ("PI_DEVICE_NUMBER", "3"),
        ("SERVER", "10.0.0.5"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.device.role, DeviceRole::Gun);
        assert_eq!(config.device.display_name, None);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.asset_path, PathBuf::from("public/index.html"));
        assert_eq!(config.run_mode, RunMode::Other);
        assert_eq!(config.sensor, SensorKind::None);
        assert_eq!(config.sampling, SamplingMode::Poll);
        assert_eq!(config.debounce_window(), Duration::from_millis(250));
        assert!(!config.simulate_inputs);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(
            config.endpoint(),
            "ws://10.0.0.5:3000/socket.io/?EIO=4&transport=websocket"
        );
        assert!(!config.actuate_on_hit());
        assert_eq!(config.test_shot_delay(), None);
    }

    #[test]
    fn test_missing_required_key() {
        for missing in ["DEVICE_TYPE", "PI_DEVICE_NUMBER", "SERVER"] {
            let pairs: Vec<_> = MINIMAL
                .iter()
                .copied()
                .filter(|(k, _)| *k != missing)
                .collect();
            match Config::from_lookup(lookup(&pairs)) {
                Err(GatewayError::MissingConfig(key)) => assert_eq!(key, missing),
                other => panic!("expected MissingConfig({}), got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn test_blank_required_key_counts_as_missing() {
        let pairs = [("DEVICE_TYPE", "gun"), ("PI_DEVICE_NUMBER", "  "), ("SERVER", "h")];
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(GatewayError::MissingConfig("PI_DEVICE_NUMBER"))
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("SERVER_PORT", "http"),
            ("SENSOR", "thermometer"),
            ("SAMPLING_MODE", "burst"),
            ("SIMULATE_INPUTS", "maybe"),
        ] {
            let mut pairs = MINIMAL.to_vec();
            pairs.push((key, value));
            match Config::from_lookup(lookup(&pairs)) {
                Err(GatewayError::InvalidConfig { key: k, value: v }) => {
                    assert_eq!(k, key);
                    assert_eq!(v, value);
                }
                other => panic!("expected InvalidConfig for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_full_configuration() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("DEVICE_TYPE", "Sword"),
            ("SWORD_NAME", "Excalibur"),
            ("NODE_ENV", "pi"),
            ("SENSOR", "strain"),
            ("SAMPLING_MODE", "stream"),
            ("RECONNECT_ATTEMPTS", "3"),
            ("RECONNECT_DELAY_MS", "200"),
            ("RECONNECT_DELAY_MAX_MS", "600"),
            ("DEBOUNCE_MS", "100"),
            ("SIMULATE_INPUTS", "true"),
            ("HTTP_PORT", "9000"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.device.role, DeviceRole::Sword);
        assert_eq!(config.identity().display_name.as_deref(), Some("Excalibur"));
        assert_eq!(config.sensor, SensorKind::Strain);
        assert_eq!(config.sampling, SamplingMode::Stream);
        assert!(config.actuate_on_hit());
        assert!(config.simulate_inputs);
        assert_eq!(config.http.port, 9000);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(200),
                step: Duration::from_millis(200),
                max_delay: Duration::from_millis(600),
            }
        );
    }

    #[test]
    fn test_unknown_role_and_mode() {
        let pairs = [
            ("DEVICE_TYPE", "shield"),
            ("PI_DEVICE_NUMBER", "1"),
            ("SERVER", "h"),
            ("NODE_ENV", "production"),
        ];
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.device.role, DeviceRole::Other("shield".into()));
        assert_eq!(config.run_mode, RunMode::Other);

        let local = [
            ("DEVICE_TYPE", "gun"),
            ("PI_DEVICE_NUMBER", "1"),
            ("SERVER", "h"),
            ("NODE_ENV", "local"),
        ];
        let config = Config::from_lookup(lookup(&local)).unwrap();
        assert_eq!(config.test_shot_delay(), Some(TEST_SHOT_DELAY));
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# comment\n\nSERVER = 10.0.0.5\nSWORD_NAME=\"Blade of Dawn\"\nEMPTY=\nno_equals\nQUOTE='x'\n";
        assert_eq!(
            parse_dotenv(content),
            vec![
                ("SERVER", "10.0.0.5"),
                ("SWORD_NAME", "Blade of Dawn"),
                ("EMPTY", ""),
                ("QUOTE", "x"),
            ]
        );
    }
}
