//! Builder for configuring and starting an engine.
//!
//! ## Quick Start
//!
//! For most servers, the defaults work out of the box:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use opcua_publish_engine::MemoryAddressSpace;
//! # async fn example() -> opcua_publish_engine::Result<()> {
//! let engine = opcua_publish_engine::configure()
//!     .start(Arc::new(MemoryAddressSpace::new()))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder Pattern
//!
//! The most common limits have their own setter. Anything else goes
//! through a full [`EngineConfig`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use opcua_publish_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let engine = opcua_publish_engine::configure()
//!     .config(EngineConfig::builder().max_queue_size(100).build())
//!     .max_sessions(10)
//!     .min_publishing_interval(100.0)
//!     .publish_request_timeout(Duration::from_secs(30))
//!     .start(Arc::new(MemoryAddressSpace::new()))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Limits and Revision
//!
//! Interval and count bounds are not errors: a client asking for a faster
//! publishing interval than `min_publishing_interval` simply gets the
//! minimum back as its revised value. Only inconsistent bounds (for example
//! a minimum above its maximum) make [`EngineBuilder::start`] fail with
//! [`Error::Config`](crate::Error::Config).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::address_space::AddressSpace;
use crate::config::{clamp_interval, EngineConfig};
use crate::error::Result;
use crate::handles::engine::EngineInner;
use crate::handles::ServerEngine;
use crate::runtime::event_loop::engine_task;
use crate::runtime::state::EngineState;

/// Builder for configuring and starting a [`ServerEngine`].
///
/// Created via [`configure()`](crate::configure).
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration. Setters called afterwards still
    /// apply on top of it.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 100
    pub const fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    /// Default: 1000
    pub const fn max_subscriptions(mut self, count: usize) -> Self {
        self.config.max_subscriptions = count;
        self
    }

    /// Default: 100
    pub const fn max_subscriptions_per_session(mut self, count: usize) -> Self {
        self.config.max_subscriptions_per_session = count;
        self
    }

    /// Default: 100 000
    pub const fn max_monitored_items(mut self, count: usize) -> Self {
        self.config.max_monitored_items = count;
        self
    }

    /// Fastest publishing interval handed out, in ms.
    ///
    /// Values below the timer resolution are clamped. Default: 50
    pub fn min_publishing_interval(mut self, interval_ms: f64) -> Self {
        self.config.min_publishing_interval = clamp_interval(interval_ms, "min_publishing_interval");
        self
    }

    /// Fastest sampling interval handed out, in ms.
    ///
    /// Values below the timer resolution are clamped. Default: 50
    pub fn min_sampling_interval(mut self, interval_ms: f64) -> Self {
        self.config.min_sampling_interval = clamp_interval(interval_ms, "min_sampling_interval");
        self
    }

    /// Default: 20
    pub const fn max_publish_requests_per_session(mut self, count: usize) -> Self {
        self.config.max_publish_requests_per_session = count;
        self
    }

    /// How long a Publish request without a timeout hint may wait.
    ///
    /// Default: 60 s
    pub const fn publish_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.publish_request_timeout = timeout;
        self
    }

    /// Validate the configuration and spawn the engine task.
    ///
    /// `address_space` is consulted for node lookups, sampling and event
    /// filter evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is inconsistent.
    pub async fn start(self, address_space: Arc<dyn AddressSpace>) -> Result<ServerEngine> {
        self.config.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_channel_capacity);
        let state = EngineState::new(self.config.clone(), address_space);
        let task = tokio::spawn(engine_task(cmd_rx, state));
        info!(
            "Engine started (publishing {}..{} ms, {} sessions max)",
            self.config.min_publishing_interval, self.config.max_publishing_interval, self.config.max_sessions
        );
        let inner = Arc::new(EngineInner {
            cmd_tx,
            config: self.config,
        });
        Ok(ServerEngine::new(inner, task))
    }
}
