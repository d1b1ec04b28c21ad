use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::hub::{Hub, HubSettings, Identity, Role};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The notification hub (registry, router, dispatcher)
    pub hub: Arc<Hub>,
    /// Outbound frames buffered per connection
    pub outbound_buffer: usize,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Pong deadline after each ping
    pub pong_timeout: Duration,
    /// Shared secret for POST /api/events, if any
    pub internal_token: Option<String>,
    /// Identity stamped on events submitted through the internal API
    pub service_identity: Identity,
    /// Per-IP rate limit on /ws and /api/events
    pub rate_limit_burst: u32,
    pub rate_limit_replenish: Duration,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let hub = Hub::new(HubSettings {
            auth_timeout: Duration::from_secs(config.auth_timeout_secs),
            notify_customer_on_create: config.notify_customer_on_create,
            order_capacity: config.order_capacity,
        });

        Self {
            hub: Arc::new(hub),
            outbound_buffer: config.outbound_buffer,
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs.max(1)),
            internal_token: config.internal_token.clone().filter(|t| !t.is_empty()),
            service_identity: Identity::new(
                config.service_id.clone(),
                config.service_name.clone(),
                Role::Admin,
            ),
            rate_limit_burst: config.rate_limit_burst,
            rate_limit_replenish: Duration::from_millis(config.rate_limit_replenish_ms),
        }
    }
}
