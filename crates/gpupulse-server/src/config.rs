use std::time::Duration;

use tracing::warn;

/// Runtime configuration, read from the environment (a `.env` file is
/// honored via dotenvy). Invalid values fall back to defaults with a
/// warning rather than aborting startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub channel_capacity: usize,
    pub smi_binary: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            poll_interval: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(5000),
            channel_capacity: 16,
            smi_binary: "nvidia-smi".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env_string("GPUPULSE_BIND").unwrap_or(defaults.bind_addr),
            poll_interval: parse_duration_ms(
                "GPUPULSE_POLL_INTERVAL_MS",
                env_string("GPUPULSE_POLL_INTERVAL_MS").as_deref(),
                defaults.poll_interval,
            ),
            read_timeout: parse_duration_ms(
                "GPUPULSE_READ_TIMEOUT_MS",
                env_string("GPUPULSE_READ_TIMEOUT_MS").as_deref(),
                defaults.read_timeout,
            ),
            channel_capacity: parse_capacity(
                env_string("GPUPULSE_CHANNEL_CAPACITY").as_deref(),
                defaults.channel_capacity,
            ),
            smi_binary: env_string("GPUPULSE_SMI_BIN").unwrap_or(defaults.smi_binary),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_duration_ms(key: &str, raw: Option<&str>, default: Duration) -> Duration {
    match raw {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                warn!(
                    "invalid {}={:?}, using {}ms",
                    key,
                    raw,
                    default.as_millis()
                );
                default
            }
        },
    }
}

fn parse_capacity(raw: Option<&str>, default: usize) -> usize {
    match raw {
        None => default,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("invalid GPUPULSE_CHANNEL_CAPACITY={:?}, using {}", raw, default);
                default
            }
        },
    }
}
