use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags actually passed override the lower layers.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "order-hub-server", version, about = "Real-time order notification hub")]
pub struct Cli {
    /// Path to TOML config file
    #[arg(long, default_value = "./order-hub.toml")]
    #[serde(skip)]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Seconds a connection may stay unauthenticated
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_timeout_secs: Option<u64>,

    /// Also deliver OrderCreated to the ordering customer
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub notify_customer_on_create: bool,
}

/// Hub server configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Enable structured JSON logging
    pub json_logs: bool,

    /// Seconds a connection may stay unauthenticated before it is closed
    pub auth_timeout_secs: u64,

    /// Outbound frames buffered per connection before sends start failing
    pub outbound_buffer: usize,

    /// Seconds between server pings
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing
    pub pong_timeout_secs: u64,

    /// Also deliver OrderCreated to the ordering customer's own room
    pub notify_customer_on_create: bool,

    /// Live orders remembered for routing bare status updates
    pub order_capacity: usize,

    /// Shared secret required in `x-hub-token` on POST /api/events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_token: Option<String>,

    /// Identity used for events submitted over POST /api/events
    pub service_id: String,
    pub service_name: String,

    /// Burst size of the per-IP rate limit on /ws and /api/events
    pub rate_limit_burst: u32,

    /// Milliseconds to replenish one rate limit token
    pub rate_limit_replenish_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            auth_timeout_secs: 30,
            outbound_buffer: 256,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            notify_customer_on_create: false,
            order_capacity: crate::hub::orders::DEFAULT_ORDER_CAPACITY,
            internal_token: None,
            service_id: "order-service".to_string(),
            service_name: "Order Service".to_string(),
            rate_limit_burst: 60,
            rate_limit_replenish_ms: 500,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (ORDER_HUB_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("ORDER_HUB_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Order Notification Hub Configuration
# Place this file at ./order-hub.toml or specify with --config <path>
# All settings can be overridden via environment variables (ORDER_HUB_PORT, etc.)

# Server port (default: 3001)
# port = 3001

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Connections ----

# Seconds a connection may stay unauthenticated before it is closed
# auth_timeout_secs = 30

# Frames buffered per connection; a full buffer drops deliveries to that
# connection only
# outbound_buffer = 256

# Keepalive
# ping_interval_secs = 30
# pong_timeout_secs = 10

# ---- Routing ----

# Also deliver OrderCreated to the ordering customer (default: off)
# notify_customer_on_create = false

# Live orders remembered for status updates that only carry an order id.
# The oldest is evicted once full.
# order_capacity = 10000

# ---- Internal API (POST /api/events) ----

# Shared secret expected in the x-hub-token header. Unset: no check.
# internal_token = ""

# Identity stamped on events submitted through the internal API
# service_id = "order-service"
# service_name = "Order Service"

# Per-IP rate limit on /ws and /api/events
# rate_limit_burst = 60
# rate_limit_replenish_ms = 500
"#
    .to_string()
}
