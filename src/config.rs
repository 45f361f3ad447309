//! # Engine Configuration
//!
//! Server-side limits and defaults of the subscription engine.
//!
//! ## Quick Start
//!
//! The defaults are sized for a small embedded server:
//!
//! ```no_run
//! use opcua_publish_engine::{EngineConfig, MemoryAddressSpace};
//! use std::sync::Arc;
//!
//! # async fn example() -> opcua_publish_engine::Result<()> {
//! let engine = opcua_publish_engine::configure()
//!     .start(Arc::new(MemoryAddressSpace::new())).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder Pattern
//!
//! ```
//! use opcua_publish_engine::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .min_publishing_interval(100.0)
//!     .max_subscriptions_per_session(10)
//!     .max_monitored_items_per_subscription(500)
//!     .publish_request_timeout(Duration::from_secs(30))
//!     .build();
//! ```
//!
//! ## Revision of Client Parameters
//!
//! Clients request publishing intervals, keep-alive counts, sampling intervals
//! and queue sizes. The server revises them into the configured bounds and
//! reports the revised values back:
//!
//! | Requested | Revised to |
//! |-----------|------------|
//! | publishing interval NaN or below `min_publishing_interval` | `min_publishing_interval` |
//! | publishing interval above `max_publishing_interval` | `max_publishing_interval` |
//! | keep-alive count 0 | `default_keep_alive_count` |
//! | keep-alive count above `max_keep_alive_count` | `max_keep_alive_count` |
//! | lifetime count 0 | 3 × revised keep-alive count |
//! | lifetime count above `max_lifetime_count` | `max_lifetime_count` |
//! | sampling interval negative | the subscription's publishing interval |
//! | sampling interval outside the sampling bounds | nearest bound |
//! | queue size 0 | 1 (data items) / `default_event_queue_size` (event items) |
//! | queue size above `max_queue_size` | `max_queue_size` |
//!
//! ## Configuration Options Reference
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `min_publishing_interval` | 50 ms | Fastest publishing cycle |
//! | `max_publishing_interval` | 3 600 000 ms | Slowest publishing cycle |
//! | `default_keep_alive_count` | 10 | Used when the client requests 0 |
//! | `max_keep_alive_count` | 12 000 | |
//! | `max_lifetime_count` | 864 000 | |
//! | `max_notifications_per_publish` | 0 | Server cap per message, 0 = unlimited |
//! | `min_sampling_interval` | 50 ms | |
//! | `max_sampling_interval` | 3 600 000 ms | |
//! | `max_queue_size` | 1000 | Per monitored item |
//! | `default_event_queue_size` | 1000 | Event items requesting queue size 0 |
//! | `max_sessions` | 100 | |
//! | `max_subscriptions` | 1000 | Engine wide |
//! | `max_subscriptions_per_session` | 100 | |
//! | `max_monitored_items` | 100 000 | Engine wide |
//! | `max_monitored_items_per_subscription` | 10 000 | |
//! | `max_publish_requests_per_session` | 20 | Oldest is rejected on overflow |
//! | `publish_request_timeout` | 60 s | Used when `timeout_hint` is 0 |
//! | `max_retransmission_queue_size` | 20 | Messages kept for Republish |
//! | `max_continuation_points_per_session` | 10 | |
//! | `command_channel_capacity` | 64 | Handle → engine queue |
//! | `event_channel_capacity` | 64 | Per [`SubscriptionEvents`](crate::SubscriptionEvents) stream |

use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Fastest publishing interval in milliseconds.
pub const DEFAULT_MIN_PUBLISHING_INTERVAL: f64 = 50.0;

/// Slowest publishing interval in milliseconds (1 hour).
pub const DEFAULT_MAX_PUBLISHING_INTERVAL: f64 = 3_600_000.0;

/// Keep-alive count applied when a client requests 0.
pub const DEFAULT_KEEP_ALIVE_COUNT: u32 = 10;

pub const DEFAULT_MAX_KEEP_ALIVE_COUNT: u32 = 12_000;

pub const DEFAULT_MAX_LIFETIME_COUNT: u32 = 864_000;

pub const DEFAULT_MIN_SAMPLING_INTERVAL: f64 = 50.0;

pub const DEFAULT_MAX_SAMPLING_INTERVAL: f64 = 3_600_000.0;

pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 1000;

pub const DEFAULT_EVENT_QUEUE_SIZE: u32 = 1000;

pub const DEFAULT_MAX_SESSIONS: usize = 100;

pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 1000;

pub const DEFAULT_MAX_SUBSCRIPTIONS_PER_SESSION: usize = 100;

pub const DEFAULT_MAX_MONITORED_ITEMS: usize = 100_000;

pub const DEFAULT_MAX_MONITORED_ITEMS_PER_SUBSCRIPTION: usize = 10_000;

/// Queued Publish requests per session before the oldest is rejected with
/// `BadTooManyPublishRequests`.
pub const DEFAULT_MAX_PUBLISH_REQUESTS_PER_SESSION: usize = 20;

/// Publish request timeout applied when the request's `timeout_hint` is 0.
pub const DEFAULT_PUBLISH_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_MAX_RETRANSMISSION_QUEUE_SIZE: usize = 20;

pub const DEFAULT_MAX_CONTINUATION_POINTS_PER_SESSION: usize = 10;

pub const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timer resolution of the engine in milliseconds.
///
/// Interval bounds below this are raised to it so a misconfigured engine
/// cannot spin.
pub const MIN_TIMER_RESOLUTION: f64 = 1.0;

/// Longest interval bound in milliseconds (about 49.7 days).
pub const MAX_INTERVAL: f64 = u32::MAX as f64;

/// Clamp a configured interval to the timer resolution, logging a warning if
/// it had to be raised.
pub(crate) fn clamp_interval(interval: f64, field_name: &str) -> f64 {
    if interval.is_nan() || interval < MIN_TIMER_RESOLUTION {
        warn!(
            "{} value {} is below the timer resolution, clamping to {} ms",
            field_name, interval, MIN_TIMER_RESOLUTION
        );
        MIN_TIMER_RESOLUTION
    } else {
        interval
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Fastest publishing interval in ms (default: 50)
    pub min_publishing_interval: f64,
    /// Slowest publishing interval in ms (default: 3 600 000)
    pub max_publishing_interval: f64,
    /// Keep-alive count for clients requesting 0 (default: 10)
    pub default_keep_alive_count: u32,
    /// Upper bound for the keep-alive count (default: 12 000)
    pub max_keep_alive_count: u32,
    /// Upper bound for the lifetime count (default: 864 000)
    pub max_lifetime_count: u32,
    /// Server cap on notifications per message, 0 = unlimited (default: 0)
    pub max_notifications_per_publish: u32,
    /// Fastest sampling interval in ms (default: 50)
    pub min_sampling_interval: f64,
    /// Slowest sampling interval in ms (default: 3 600 000)
    pub max_sampling_interval: f64,
    /// Upper bound for a monitored item's queue (default: 1000)
    pub max_queue_size: u32,
    /// Queue size given to event items requesting 0 (default: 1000)
    pub default_event_queue_size: u32,
    /// Concurrent sessions (default: 100)
    pub max_sessions: usize,
    /// Subscriptions across all sessions, orphans included (default: 1000)
    pub max_subscriptions: usize,
    /// Subscriptions per session (default: 100)
    pub max_subscriptions_per_session: usize,
    /// Monitored items across all subscriptions (default: 100 000)
    pub max_monitored_items: usize,
    /// Monitored items per subscription (default: 10 000)
    pub max_monitored_items_per_subscription: usize,
    /// Queued Publish requests per session (default: 20)
    pub max_publish_requests_per_session: usize,
    /// Publish timeout when the request carries no hint (default: 60 s)
    pub publish_request_timeout: Duration,
    /// Sent messages kept per subscription for Republish (default: 20)
    pub max_retransmission_queue_size: usize,
    /// Live continuation points per session (default: 10)
    pub max_continuation_points_per_session: usize,
    /// Capacity of the handle → engine command channel (default: 64)
    pub command_channel_capacity: usize,
    /// Capacity of each subscription event stream (default: 64)
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_publishing_interval: DEFAULT_MIN_PUBLISHING_INTERVAL,
            max_publishing_interval: DEFAULT_MAX_PUBLISHING_INTERVAL,
            default_keep_alive_count: DEFAULT_KEEP_ALIVE_COUNT,
            max_keep_alive_count: DEFAULT_MAX_KEEP_ALIVE_COUNT,
            max_lifetime_count: DEFAULT_MAX_LIFETIME_COUNT,
            max_notifications_per_publish: 0,
            min_sampling_interval: DEFAULT_MIN_SAMPLING_INTERVAL,
            max_sampling_interval: DEFAULT_MAX_SAMPLING_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            default_event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            max_subscriptions_per_session: DEFAULT_MAX_SUBSCRIPTIONS_PER_SESSION,
            max_monitored_items: DEFAULT_MAX_MONITORED_ITEMS,
            max_monitored_items_per_subscription: DEFAULT_MAX_MONITORED_ITEMS_PER_SUBSCRIPTION,
            max_publish_requests_per_session: DEFAULT_MAX_PUBLISH_REQUESTS_PER_SESSION,
            publish_request_timeout: DEFAULT_PUBLISH_REQUEST_TIMEOUT,
            max_retransmission_queue_size: DEFAULT_MAX_RETRANSMISSION_QUEUE_SIZE,
            max_continuation_points_per_session: DEFAULT_MAX_CONTINUATION_POINTS_PER_SESSION,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create a builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Check the configuration for inconsistencies that cannot be clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_channel_capacity == 0 {
            return Err(ConfigError::new("command_channel_capacity must be non-zero"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::new("event_channel_capacity must be non-zero"));
        }
        for (name, interval) in [
            ("min_publishing_interval", self.min_publishing_interval),
            ("max_publishing_interval", self.max_publishing_interval),
            ("min_sampling_interval", self.min_sampling_interval),
            ("max_sampling_interval", self.max_sampling_interval),
        ] {
            if !interval.is_finite() || interval > MAX_INTERVAL {
                return Err(ConfigError::new(format!(
                    "{} ({}) must be a finite number of milliseconds up to {}",
                    name, interval, MAX_INTERVAL
                )));
            }
        }
        if self.min_publishing_interval > self.max_publishing_interval {
            return Err(ConfigError::new(format!(
                "min_publishing_interval ({}) exceeds max_publishing_interval ({})",
                self.min_publishing_interval, self.max_publishing_interval
            )));
        }
        if self.min_sampling_interval > self.max_sampling_interval {
            return Err(ConfigError::new(format!(
                "min_sampling_interval ({}) exceeds max_sampling_interval ({})",
                self.min_sampling_interval, self.max_sampling_interval
            )));
        }
        if self.max_publish_requests_per_session == 0 {
            return Err(ConfigError::new(
                "max_publish_requests_per_session must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Builder for `EngineConfig`
#[derive(Default)]
#[must_use]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Fastest publishing interval in milliseconds.
    ///
    /// Values below the timer resolution (1 ms) are raised to it.
    ///
    /// Default: 50 ms
    pub fn min_publishing_interval(mut self, interval_ms: f64) -> Self {
        self.config.min_publishing_interval = clamp_interval(interval_ms, "min_publishing_interval");
        self
    }

    /// Slowest publishing interval in milliseconds.
    ///
    /// Default: 3 600 000 ms
    pub fn max_publishing_interval(mut self, interval_ms: f64) -> Self {
        self.config.max_publishing_interval = clamp_interval(interval_ms, "max_publishing_interval");
        self
    }

    /// Keep-alive count used when a client requests 0.
    ///
    /// Default: 10
    pub fn default_keep_alive_count(mut self, count: u32) -> Self {
        if count == 0 {
            warn!("default_keep_alive_count 0 is invalid, using 1");
        }
        self.config.default_keep_alive_count = count.max(1);
        self
    }

    /// Default: 12 000
    pub fn max_keep_alive_count(mut self, count: u32) -> Self {
        self.config.max_keep_alive_count = count.max(1);
        self
    }

    /// Default: 864 000
    pub fn max_lifetime_count(mut self, count: u32) -> Self {
        self.config.max_lifetime_count = count.max(1);
        self
    }

    /// Server cap on notifications in one message. 0 leaves it to the client.
    ///
    /// Default: 0
    pub fn max_notifications_per_publish(mut self, count: u32) -> Self {
        self.config.max_notifications_per_publish = count;
        self
    }

    /// Fastest sampling interval in milliseconds.
    ///
    /// Default: 50 ms
    pub fn min_sampling_interval(mut self, interval_ms: f64) -> Self {
        self.config.min_sampling_interval = clamp_interval(interval_ms, "min_sampling_interval");
        self
    }

    /// Default: 3 600 000 ms
    pub fn max_sampling_interval(mut self, interval_ms: f64) -> Self {
        self.config.max_sampling_interval = clamp_interval(interval_ms, "max_sampling_interval");
        self
    }

    /// Default: 1000
    pub fn max_queue_size(mut self, size: u32) -> Self {
        self.config.max_queue_size = size.max(1);
        self
    }

    /// Default: 1000
    pub fn default_event_queue_size(mut self, size: u32) -> Self {
        self.config.default_event_queue_size = size.max(1);
        self
    }

    /// Default: 100
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    /// Default: 1000
    pub fn max_subscriptions(mut self, count: usize) -> Self {
        self.config.max_subscriptions = count;
        self
    }

    /// Default: 100
    pub fn max_subscriptions_per_session(mut self, count: usize) -> Self {
        self.config.max_subscriptions_per_session = count;
        self
    }

    /// Engine-wide monitored item limit, shared by all sessions.
    ///
    /// Default: 100 000
    pub fn max_monitored_items(mut self, count: usize) -> Self {
        self.config.max_monitored_items = count;
        self
    }

    /// Default: 10 000
    pub fn max_monitored_items_per_subscription(mut self, count: usize) -> Self {
        self.config.max_monitored_items_per_subscription = count;
        self
    }

    /// Queued Publish requests per session.
    ///
    /// When a new request arrives at the limit, the oldest queued request is
    /// answered with `BadTooManyPublishRequests`.
    ///
    /// Default: 20
    pub fn max_publish_requests_per_session(mut self, count: usize) -> Self {
        self.config.max_publish_requests_per_session = count;
        self
    }

    /// Default: 60 s
    pub fn publish_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.publish_request_timeout = timeout;
        self
    }

    /// Default: 20
    pub fn max_retransmission_queue_size(mut self, count: usize) -> Self {
        self.config.max_retransmission_queue_size = count;
        self
    }

    /// Default: 10
    pub fn max_continuation_points_per_session(mut self, count: usize) -> Self {
        self.config.max_continuation_points_per_session = count;
        self
    }

    /// Default: 64
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.command_channel_capacity = capacity;
        self
    }

    /// Default: 64
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
