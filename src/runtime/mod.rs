//! # Engine Implementation (Internal)
//!
//! This module contains the internal implementation of the subscription and
//! publish engine. It is `pub(crate)`, internal to the library.
//!
//! ## Module Structure
//!
//! - [`command`]: Command enum for handle→engine communication
//! - [`state`]: `EngineState`, the service handlers and id management
//! - [`session`]: Per-session subscriptions, publish queue and continuation points
//! - [`subscription`]: The publishing state machine and retransmission queue
//! - [`monitored_item`]: Sampling, queueing and the item capability trait
//! - [`filter`]: Data-change and event filter validation and evaluation
//! - [`publish_engine`]: FIFO of outstanding Publish requests
//! - [`event_loop`]: The main engine task and event loop

pub mod command;
pub mod event_loop;
pub mod filter;
pub mod monitored_item;
pub mod publish_engine;
pub mod session;
pub mod state;
pub mod subscription;

pub(crate) use command::Command;
