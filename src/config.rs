use clap::Parser;

/// Realtime presence and message router
#[derive(Parser, Clone, Debug)]
#[command(name = "rtchat-backend", version, about = "Realtime presence and message router")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// HS256 secret used to verify auth tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Emit JSON logs instead of human-readable ones
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Frames buffered per connection before further sends are dropped
    #[arg(long, env = "WS_OUTBOUND_BUFFER", default_value_t = 64)]
    pub outbound_buffer: usize,

    /// Seconds between server-sent WebSocket pings
    #[arg(long, env = "WS_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    /// Close connections that have sent no frame, pongs included, for this many seconds
    #[arg(long, env = "WS_PING_TIMEOUT_SECS", default_value_t = 300)]
    pub ping_timeout_secs: u64,

    /// How often to look for stale connections
    #[arg(long, env = "WS_PRUNE_INTERVAL_SECS", default_value_t = 60)]
    pub prune_interval_secs: u64,

    /// Largest accepted inbound WebSocket message, in bytes
    #[arg(long, env = "WS_MAX_MESSAGE_BYTES", default_value_t = 64 * 1024)]
    pub max_message_bytes: usize,
}

impl Config {
    /// `.env` first, then environment and CLI flags.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Config::parse()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "rtchat-backend",
            "--jwt-secret",
            "s3cret",
            "--port",
            "4000",
            "--bind-address",
            "127.0.0.1",
            "--outbound-buffer",
            "8",
            "--ping-interval-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:4000");
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.ping_interval_secs, 5);
        assert_eq!(config.jwt_secret, "s3cret");
    }
}
