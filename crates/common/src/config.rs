use std::net::SocketAddr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    pub bind_address: SocketAddr,

    /// JWT secret used to sign and verify access and refresh tokens
    pub jwt_secret: String,

    /// Access token expiry in hours (default: 24)
    pub jwt_expiry_hours: u64,

    /// Refresh token expiry in hours (default: 168 = 7 days)
    pub jwt_refresh_expiry_hours: u64,

    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,

    /// Outbound queue size of a single live WebSocket channel
    pub ws_channel_buffer: usize,

    /// Seconds between keep-alive pings on a live WebSocket channel
    pub ws_ping_interval_secs: u64,

    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BIND_ADDRESS must be a valid socket address"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            jwt_refresh_expiry_hours: std::env::var("JWT_REFRESH_EXPIRY_HOURS")
                .unwrap_or_else(|_| "168".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_REFRESH_EXPIRY_HOURS must be a valid u64"))?,
            allowed_origins: parse_origins(&std::env::var("ALLOWED_ORIGINS").unwrap_or_default()),
            ws_channel_buffer: std::env::var("WS_CHANNEL_BUFFER")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WS_CHANNEL_BUFFER must be a valid usize"))?,
            ws_ping_interval_secs: std::env::var("WS_PING_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WS_PING_INTERVAL_SECS must be a valid u64"))?,
            log_json: std::env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

/// Split a comma separated origin list, dropping blanks.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
