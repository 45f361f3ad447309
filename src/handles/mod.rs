//! # Handle Types
//!
//! This module provides the **user-facing API** of the engine. Every
//! operation goes through a handle, which internally sends a command to the
//! engine's event loop.
//!
//! ## Handle Types Overview
//!
//! | Handle | Role | Notes |
//! |--------|------|-------|
//! | [`ServerEngine`] | Create sessions, feed data changes and events, shut down | Created via [`configure()`](crate::configure) |
//! | [`Session`] | Subscription, monitored item and Publish services | Drop orphans its subscriptions |
//! | [`PendingPublish`] | One outstanding Publish request | Resolves to a `PublishResponse` |
//! | [`SubscriptionEvents`] | Lifecycle events of one subscription | Ends after `Closed` |
//!
//! ## Typical Flow
//!
//! ```no_run
//! use std::sync::Arc;
//! use opcua_publish_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let space = Arc::new(MemoryAddressSpace::new());
//!     let engine = opcua_publish_engine::configure().start(space).await?;
//!
//!     // 1. Open a session and create a subscription
//!     let session = engine.create_session().await?;
//!     let created = session.create_subscription(CreateSubscriptionRequest::default()).await?;
//!
//!     // 2. Subscribe to all events of the server
//!     let filter = EventFilter {
//!         select_clauses: vec![SimpleAttributeOperand::field("Message")],
//!         where_clause: Vec::new(),
//!     };
//!     session
//!         .create_monitored_items(
//!             created.subscription_id,
//!             TimestampsToReturn::Neither,
//!             vec![MonitoredItemCreateRequest::events(NodeId::SERVER, 7, filter)],
//!         )
//!         .await?;
//!
//!     // 3. Keep two Publish requests in flight
//!     let first = session.send_publish(PublishRequest::default()).await?;
//!     let second = session.send_publish(PublishRequest::default()).await?;
//!     let (first, second) = tokio::join!(first, second);
//!     println!("{:?} {:?}", first?.service_result, second?.service_result);
//!     Ok(())
//! }
//! ```
//!
//! ## Thread Safety
//!
//! Handles hold an `Arc` to the shared engine channel and can be used from
//! any tokio task.

pub mod engine;
pub mod events;
pub mod session;

pub use engine::ServerEngine;
pub use events::{SubscriptionEvent, SubscriptionEvents};
pub use session::{PendingPublish, Session};
