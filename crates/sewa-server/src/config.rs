//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// JSON file with users, listings and packages loaded at startup.
    /// Env: `SEED_PATH`
    pub seed_path: Option<PathBuf>,

    /// Longest wait for the database connection. A call that got it runs to completion.
    /// Env: `REQUEST_TIMEOUT_MS`
    /// Default: 5000
    pub request_timeout: Duration,

    /// Time without frames in either direction after which a chat socket is closed.
    /// Env: `WS_IDLE_TIMEOUT_SECS`
    /// Default: 300
    pub ws_idle_timeout: Duration,

    // -- SMS --

    /// Env: `SMS_API_URL`
    pub sms_api_url: String,

    /// Without a key, notifications are only logged.
    /// Env: `SMS_API_KEY`
    pub sms_api_key: Option<String>,

    /// Env: `SMS_SENDER`
    pub sms_sender: String,

    // -- Payments --

    /// Form endpoint of the payment gateway.
    /// Env: `PAYMENT_GATEWAY_URL`
    pub payment_gateway_url: String,

    /// Env: `PAYMENT_PRODUCT_CODE`
    pub payment_product_code: String,

    /// Base URL the gateway calls back on.
    /// Env: `PUBLIC_BASE_URL`
    pub public_base_url: String,

    /// Where callbacks redirect the browser.
    /// Env: `FRONTEND_URL`
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            seed_path: None,
            request_timeout: Duration::from_millis(5000),
            ws_idle_timeout: Duration::from_secs(300),
            sms_api_url: "https://api.sparrowsms.com/v2/sms/".to_string(),
            sms_api_key: None,
            sms_sender: "InfoSMS".to_string(),
            payment_gateway_url: "https://uat.esewa.com.np/epay/main".to_string(),
            payment_product_code: "EPAYTEST".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("SEED_PATH").filter(|p| !p.is_empty()) {
            config.seed_path = Some(PathBuf::from(path));
        }

        if let Some(val) = var("REQUEST_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.request_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid REQUEST_TIMEOUT_MS, using default"),
            }
        }

        if let Some(val) = var("WS_IDLE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.ws_idle_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid WS_IDLE_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(url) = var("SMS_API_URL") {
            config.sms_api_url = url;
        }
        if let Some(key) = var("SMS_API_KEY").filter(|k| !k.is_empty()) {
            config.sms_api_key = Some(key);
        }
        if let Some(sender) = var("SMS_SENDER") {
            config.sms_sender = sender;
        }

        if let Some(url) = var("PAYMENT_GATEWAY_URL") {
            config.payment_gateway_url = url;
        }
        if let Some(code) = var("PAYMENT_PRODUCT_CODE") {
            config.payment_product_code = code;
        }
        if let Some(url) = var("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = var("FRONTEND_URL") {
            config.frontend_url = url.trim_end_matches('/').to_string();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.sms_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("REQUEST_TIMEOUT_MS", "250"),
            ("SMS_API_KEY", "k"),
            ("FRONTEND_URL", "https://sewa.example/"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.sms_api_key.as_deref(), Some("k"));
        assert_eq!(config.frontend_url, "https://sewa.example");
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = from_map(&[("HTTP_ADDR", "nowhere"), ("WS_IDLE_TIMEOUT_SECS", "0")]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.ws_idle_timeout, Duration::from_secs(300));
    }
}
