use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::transport::backoff::ReconnectPolicy;

pub const DEFAULT_SERVER: &str = "127.0.0.1:8000";
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_SPEED_WINDOW: usize = 20;

/// Dashboard client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Monitor backend address (`host:port`, optionally with a path prefix)
    pub server: String,
    /// Use `wss`/`https` instead of `ws`/`http`
    pub secure: bool,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Ping results kept for charting and statistics
    pub history_capacity: usize,
    /// Throughput samples kept for the trend line
    pub speed_window: usize,
    /// Lifetime of ordinary notifications
    pub notice_ttl: Duration,
    /// Lifetime of failure alerts
    pub alert_ttl: Duration,
    /// Apply successful commands to the local store before the server echo arrives
    pub optimistic_updates: bool,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut config = match env::var("NETPULSE_SERVER") {
            Ok(server) => defaults.with_server(&server),
            Err(_) => defaults,
        };
        if let Some(secure) = env_flag("NETPULSE_SECURE") {
            config.secure = secure;
        }
        if let Some(secs) = env_parse::<u64>("NETPULSE_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = env_parse::<u64>("NETPULSE_RECONNECT_BASE_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("NETPULSE_RECONNECT_CAP_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("NETPULSE_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(capacity) = env_parse::<usize>("NETPULSE_HISTORY_CAPACITY") {
            config.history_capacity = capacity.max(1);
        }
        if let Some(window) = env_parse::<usize>("NETPULSE_SPEED_WINDOW") {
            config.speed_window = window.max(1);
        }
        if let Some(optimistic) = env_flag("NETPULSE_OPTIMISTIC") {
            config.optimistic_updates = optimistic;
        }
        config
    }

    /// Point the client at `server`. A `ws://`, `wss://`, `http://` or
    /// `https://` prefix is stripped and decides `secure`.
    pub fn with_server(mut self, server: &str) -> Self {
        let server = server.trim().trim_end_matches('/');
        let (secure, rest) = match server.split_once("://") {
            Some((scheme, rest)) => (
                Some(scheme.eq_ignore_ascii_case("wss") || scheme.eq_ignore_ascii_case("https")),
                rest,
            ),
            None => (None, server),
        };
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        self.server = if rest.starts_with("localhost:") {
            rest.replacen("localhost", "127.0.0.1", 1)
        } else {
            rest.to_string()
        };
        if let Some(secure) = secure {
            self.secure = secure;
        }
        self
    }

    /// `ws(s)://<server>/ws`
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/ws", scheme, self.server)
    }

    /// `http(s)://<server>`
    pub fn api_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.server)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            secure: false,
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            speed_window: DEFAULT_SPEED_WINDOW,
            notice_ttl: Duration::from_secs(3),
            alert_ttl: Duration::from_secs(10),
            optimistic_updates: false,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}
