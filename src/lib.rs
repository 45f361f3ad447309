//! # opcua-publish-engine
//!
//! An **async OPC-UA Subscription and Publish engine** for [tokio](https://tokio.rs).
//!
//! OPC-UA clients do not poll servers for data. They create *subscriptions*
//! holding *monitored items*, then keep a few `Publish` requests outstanding.
//! The server samples the monitored attributes, queues changes and events,
//! and answers each `Publish` request with a sequenced notification message,
//! or a keep-alive when nothing changed. This crate is that server-side
//! machinery, without the transport and encoding layers around it.
//!
//! ## Features
//!
//! - **Subscription state machine**: publishing intervals, keep-alives,
//!   lifetime expiry and late delivery
//! - **Monitored items**: sampling, deadband and event filters, bounded
//!   queues with overflow reporting, monitoring modes and triggering
//! - **Publish queue**: FIFO request handling, timeouts, acknowledgements
//!   and a retransmission queue for `Republish`
//! - **Session transfer**: subscriptions survive their session and can be
//!   picked up by another one
//! - **Deterministic timing**: a single event loop driven by tokio's clock,
//!   so tests run with a paused clock
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use opcua_publish_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let space = Arc::new(MemoryAddressSpace::new());
//!     let temperature = NodeId::numeric(1, 1000);
//!     space.add_variable(temperature.clone(), "Temperature", DataValue::new(20.0));
//!
//!     let engine = opcua_publish_engine::configure().start(space.clone()).await?;
//!     let session = engine.create_session().await?;
//!
//!     let created = session
//!         .create_subscription(CreateSubscriptionRequest {
//!             requested_publishing_interval: 250.0,
//!             ..Default::default()
//!         })
//!         .await?;
//!     session
//!         .create_monitored_items(
//!             created.subscription_id,
//!             TimestampsToReturn::Source,
//!             vec![MonitoredItemCreateRequest::value(temperature.clone(), 1)
//!                 .with_sampling_interval(100.0)],
//!         )
//!         .await?;
//!
//!     space.write_value(&temperature, DataValue::new(21.0));
//!     let response = session.publish(PublishRequest::default()).await?;
//!     for change in response.notification_message.data_changes() {
//!         println!("item {} = {:?}", change.client_handle, change.value.value);
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! # Architecture Overview
//!
//! ## Conceptual Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Server Application                            │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────────────┐  │
//! │  │ ServerEngine │    │   Session    │    │ AddressSpace (trait)     │  │
//! │  │ (data, events)│   │  (services)  │    │ MemoryAddressSpace       │  │
//! │  └──────┬───────┘    └──────┬───────┘    └────────────┬─────────────┘  │
//! └─────────┼───────────────────┼─────────────────────────┼────────────────┘
//!           │ Commands          │ Commands                │ reads
//!           ▼                   ▼                         │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine (Event Loop)                            │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                        EngineState                                │  │
//! │  │  • sessions: HashMap<SessionId, ServerSession>                    │  │
//! │  │      • subscriptions: BTreeMap<u32, Subscription>                 │  │
//! │  │      • publish_engine: queued Publish requests                    │  │
//! │  │      • continuation_points                                        │  │
//! │  │  • orphans: subscriptions of closed sessions                      │  │
//! │  │  • item counter, id generators, cumulated counters                │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Event Loop (select!):                                                  │
//! │    • Command channel (from handles)                                     │
//! │    • Sleep until the next deadline (publishing, sampling, timeouts)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Visibility | Responsibility |
//! |--------|------------|----------------|
//! | [`handles`] | Public | `ServerEngine`, `Session`, event streams |
//! | [`types`] | Public | Service requests, responses and notification types |
//! | [`status`] | Public | `StatusCode` and the codes the engine produces |
//! | [`address_space`] | Public | The `AddressSpace` trait and an in-memory implementation |
//! | [`continuation`] | Public | Paging of large results behind continuation points |
//! | [`config`] | Public | `EngineConfig` and its builder |
//! | [`error`] | Public | `Error` and `Result` |
//! | `runtime` | Internal | Event loop, state, subscriptions, items, publish queue |
//!
//! ## Contributor Notes
//!
//! When adding a new service:
//!
//! 1. Add a command variant to `runtime/command.rs`
//! 2. Add the handler to `EngineState` in `runtime/state.rs`
//! 3. Dispatch it in `runtime/event_loop.rs`
//! 4. Add the public method to `handles/session.rs` or `handles/engine.rs`
//! 5. Cover it in `tests/`

use std::fmt;

// Internal modules for the engine implementation
pub(crate) mod runtime;

// Public modules
pub mod address_space;
pub mod builder;
pub mod config;
pub mod continuation;
pub mod error;
pub mod handles;
pub mod status;
pub mod types;

pub use address_space::{AddressSpace, EuRange, MemoryAddressSpace, NodeInfo};
pub use builder::EngineBuilder;
pub use config::{EngineConfig, EngineConfigBuilder};
pub use continuation::{ContinuationPointManager, Page};
pub use error::{ConfigError, Error, Result};
pub use handles::{PendingPublish, ServerEngine, Session, SubscriptionEvent, SubscriptionEvents};
pub use runtime::state::EngineDiagnostics;
pub use runtime::subscription::SubscriptionState;
pub use status::StatusCode;
pub use types::*;

/// Start configuring an engine.
///
/// ```no_run
/// # use std::sync::Arc;
/// # async fn example() -> opcua_publish_engine::Result<()> {
/// let space = Arc::new(opcua_publish_engine::MemoryAddressSpace::new());
/// let engine = opcua_publish_engine::configure().max_sessions(4).start(space).await?;
/// # Ok(())
/// # }
/// ```
pub fn configure() -> EngineBuilder {
    EngineBuilder::new()
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Session identifier, unique among the engine's open sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub mod prelude {
    pub use crate::address_space::{AddressSpace, EuRange, MemoryAddressSpace};
    pub use crate::types::{
        AttributeId, CreateSubscriptionRequest, CreateSubscriptionResponse, DataChangeFilter,
        DataChangeTrigger, DataValue, DeadbandType, EventData, EventFilter, ModifySubscriptionRequest,
        MonitoredItemCreateRequest, MonitoredItemModifyRequest, MonitoredItemNotification,
        MonitoringFilter, MonitoringMode, MonitoringParameters, NodeId, NotificationMessage,
        PublishRequest, PublishResponse, SimpleAttributeOperand, SubscriptionAcknowledgement,
        TimestampsToReturn, Variant,
    };
    pub use crate::{
        EngineConfig, EngineDiagnostics, Error, Result, ServerEngine, Session, SessionId, StatusCode,
        SubscriptionEvent, SubscriptionState,
    };
}
