use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RESULTS_COUNTDOWN_SECS: u64 = 3;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_SESSION_MINUTES: u64 = 120;
pub const DEFAULT_PIN_MAX_ATTEMPTS: u32 = 32;
pub const DEFAULT_SPEED_FLOOR: f64 = 0.5;
pub const DEFAULT_ENDED_RETENTION_SECS: u64 = 600;
pub const DEFAULT_SUMMARY_RETRY_COUNT: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Timing and policy knobs for the session engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between the results reveal and the next question
    pub results_countdown: Duration,
    pub sweep_interval: Duration,
    /// Used when a quiz does not carry its own maximum duration
    pub default_max_session_minutes: u64,
    pub pin_max_attempts: u32,
    /// Lowest speed factor a correct answer can earn
    pub speed_floor: f64,
    /// How long ended sessions are remembered for "session has ended" replies
    pub ended_retention: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub quiz_dir: String,
    pub summary_dir: String,
    pub summary_retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT` on its own so logging can start before the rest of the config
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        env::var("LOG_FORMAT").map_or(LogFormat::Text, |raw| Self::parse(&raw))
    }

    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            results_countdown: Duration::from_secs(DEFAULT_RESULTS_COUNTDOWN_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            default_max_session_minutes: DEFAULT_MAX_SESSION_MINUTES,
            pin_max_attempts: DEFAULT_PIN_MAX_ATTEMPTS,
            speed_floor: DEFAULT_SPEED_FLOOR,
            ended_retention: Duration::from_secs(DEFAULT_ENDED_RETENTION_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 8080),
            },
            engine: EngineConfig {
                results_countdown: Duration::from_secs(env_or(
                    "RESULTS_COUNTDOWN_SECS",
                    DEFAULT_RESULTS_COUNTDOWN_SECS,
                )),
                sweep_interval: Duration::from_secs(
                    env_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1),
                ),
                default_max_session_minutes: env_or(
                    "DEFAULT_MAX_SESSION_MINUTES",
                    DEFAULT_MAX_SESSION_MINUTES,
                ),
                pin_max_attempts: env_or("PIN_MAX_ATTEMPTS", DEFAULT_PIN_MAX_ATTEMPTS).max(1),
                speed_floor: speed_floor(env_or("SPEED_FLOOR", DEFAULT_SPEED_FLOOR)),
                ended_retention: Duration::from_secs(env_or(
                    "ENDED_RETENTION_SECS",
                    DEFAULT_ENDED_RETENTION_SECS,
                )),
            },
            storage: StorageConfig {
                quiz_dir: env::var("QUIZ_DIR").unwrap_or_else(|_| "./quizzes".to_string()),
                summary_dir: env::var("SUMMARY_DIR").unwrap_or_else(|_| "./summaries".to_string()),
                summary_retry_count: env_or("SUMMARY_RETRY_COUNT", DEFAULT_SUMMARY_RETRY_COUNT),
            },
            log_format: LogFormat::from_env(),
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

/// Reads and parses an environment variable, falling back on absence or garbage
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid value in environment, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Keeps the speed floor inside [0, 1]; NaN and infinities fall back to the default
pub fn speed_floor(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        tracing::warn!(value = raw, "SPEED_FLOOR is not a finite number, using default");
        DEFAULT_SPEED_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_host(host: &str, port: u16) -> Config {
        Config {
            server: ServerConfig {
                host: host.to_string(),
                port,
            },
            engine: EngineConfig::default(),
            storage: StorageConfig {
                quiz_dir: "./quizzes".to_string(),
                summary_dir: "./summaries".to_string(),
                summary_retry_count: DEFAULT_SUMMARY_RETRY_COUNT,
            },
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_parse_localhost() {
        let config = config_with_host("localhost", 8080);
        assert_eq!(config.bind_address(), ([127, 0, 0, 1], 8080));
    }

    #[test]
    fn test_parse_ipv4_address() {
        let config = config_with_host("192.168.1.1", 3000);
        assert_eq!(config.bind_address(), ([192, 168, 1, 1], 3000));
    }

    #[test]
    fn test_parse_empty_host() {
        let config = config_with_host("", 8080);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 8080));
    }

    #[test]
    fn test_parse_invalid_hostname_defaults_to_all() {
        let config = config_with_host("invalid-hostname", 9000);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 9000));
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.results_countdown, Duration::from_secs(3));
        assert_eq!(engine.pin_max_attempts, 32);
        assert!((engine.speed_floor - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_speed_floor_rejects_non_finite() {
        assert!((speed_floor(f64::NAN) - DEFAULT_SPEED_FLOOR).abs() < f64::EPSILON);
        assert!((speed_floor(f64::INFINITY) - DEFAULT_SPEED_FLOOR).abs() < f64::EPSILON);
        assert!((speed_floor(1.7) - 1.0).abs() < f64::EPSILON);
        assert!((speed_floor(-0.3)).abs() < f64::EPSILON);
        assert!((speed_floor(0.25) - 0.25).abs() < f64::EPSILON);

        env::set_var("QUIZWAVE_TEST_NAN_FLOOR", "NaN");
        let parsed = env_or("QUIZWAVE_TEST_NAN_FLOOR", DEFAULT_SPEED_FLOOR);
        assert!(parsed.is_nan());
        assert!((speed_floor(parsed) - DEFAULT_SPEED_FLOOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("QUIZWAVE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("QUIZWAVE_TEST_GARBAGE", 7u64), 7);
        env::set_var("QUIZWAVE_TEST_NUMBER", " 12 ");
        assert_eq!(env_or("QUIZWAVE_TEST_NUMBER", 7u64), 12);
        assert_eq!(env_or("QUIZWAVE_TEST_MISSING_KEY", 5u32), 5);
    }
}
