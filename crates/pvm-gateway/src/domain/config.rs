//! Gateway configuration with validation.

use pvm_mempool::OperatorCredentials;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration (RPC, health, stats and the WebSocket upgrade)
    pub http: HttpConfig,
    /// WebSocket session configuration
    pub websocket: WebSocketConfig,
    /// Request validation limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Identity reported by `get_client`
    pub node: NodeIdentityConfig,
    /// Credential pair for `purge`, `shutdown` and `reset_blockchain`
    pub operator: OperatorCredentials,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;
        if ws.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_connections cannot be 0".into(),
            ));
        }
        if ws.message_buffer_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "message_buffer_size cannot be 0".into(),
            ));
        }
        if ws.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }
        if ws.rate_limit_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "rate_limit_per_second cannot be 0".into(),
            ));
        }
        if ws.ping_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "ping_interval cannot be 0".into(),
            ));
        }
        if ws.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "idle_timeout cannot be 0".into(),
            ));
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }
        if self.limits.max_batch_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_batch_size cannot be 0".into(),
            ));
        }

        if self.node.name.trim().is_empty() {
            return Err(ConfigError::Invalid("node name cannot be empty".into()));
        }
        if self.operator.username.is_empty() != self.operator.password.is_empty() {
            return Err(ConfigError::Invalid(
                "operator username and password must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 3000)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
        }
    }
}

/// WebSocket session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Connections accepted at once; further upgrades are closed with 1013
    pub max_connections: usize,
    /// Outbound frames queued per connection before delivery counts as failed
    pub message_buffer_size: usize,
    /// Largest inbound frame in bytes
    pub max_message_size: usize,
    /// Inbound messages allowed per connection per second
    pub rate_limit_per_second: u32,
    /// Ping interval
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Connections silent for this long are closed
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Honour `tableAddress`/`playerId` query parameters without a signature
    pub allow_unsigned_url_subscribe: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            message_buffer_size: 256,
            max_message_size: 64 * 1024,
            rate_limit_per_second: 50,
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            allow_unsigned_url_subscribe: true,
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes (default: 1MB)
    pub max_request_size: usize,
    /// Max batch size (number of requests in batch)
    pub max_batch_size: usize,
    /// Max blocks returned by `get_blocks`
    pub max_block_range: u64,
    /// Max transactions returned by `get_transactions`
    pub max_transactions: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024, // 1MB
            max_batch_size: 100,
            max_block_range: 100,
            max_transactions: 1_000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Node identity as reported to peers and clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeIdentityConfig {
    /// Human-readable node name
    pub name: String,
    /// Public URL peers reach this node at
    pub url: String,
    /// Client implementation name
    pub client: String,
}

impl Default for NodeIdentityConfig {
    fn default() -> Self {
        Self {
            name: "pvm-node".to_string(),
            url: "http://localhost:3000".to_string(),
            client: crate::client_version(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as "30s", "500ms", "5m" or plain seconds.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a duration string.
    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.websocket.max_connections, 1000);
        assert!(config.websocket.allow_unsigned_url_subscribe);
    }

    #[test]
    fn test_config_address() {
        let config = GatewayConfig::default();
        assert_eq!(config.http_addr().port(), 3000);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.idle_timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_half_configured_operator_rejected() {
        let mut config = GatewayConfig::default();
        config.operator.username = "admin".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.operator.password = "secret".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"http": {"port": 8080}, "websocket": {"idle_timeout": "2m", "ping_interval": "500ms"}}"#,
        )
        .unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.websocket.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.websocket.ping_interval, Duration::from_millis(500));
        assert_eq!(config.websocket.message_buffer_size, 256);
    }

    #[test]
    fn test_parse_duration_forms() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("12"), Ok(Duration::from_secs(12)));
        assert!(parse_duration("soon").is_err());
    }
}
