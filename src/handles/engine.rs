//! # `ServerEngine`
//!
//! The engine is the **central coordinator** for subscriptions and
//! publishing. It owns every session, subscription and monitored item and
//! drives all timers.
//!
//! ## Role in the Architecture
//!
//! The engine implements an **event loop pattern** where:
//!
//! 1. All state lives in a single `EngineState` struct
//! 2. Handles send `Command` messages via a channel
//! 3. The event loop processes commands and timers in a `tokio::select!` loop
//! 4. Responses flow back through oneshot channels
//!
//! This design keeps the engine **free of locks**: subscriptions, publish
//! queues and counters are only ever touched by the engine task.
//!
//! ## Lifetime and Shutdown
//!
//! The engine task runs until:
//! - [`ServerEngine::shutdown`] is called
//! - All handles (`ServerEngine` and every [`Session`]) are dropped
//!
//! Either way, outstanding Publish requests are answered with `BadShutdown`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::handles::session::Session;
use crate::runtime::state::EngineDiagnostics;
use crate::runtime::Command;
use crate::types::{AttributeId, DataValue, EventData, NodeId};

// ============================================================================
// ENGINE INNER
// ============================================================================

/// Shared state between the handles and the engine task.
///
/// This is an implementation detail. Users interact with [`ServerEngine`]
/// and [`Session`] directly.
#[derive(Debug)]
pub(crate) struct EngineInner {
    /// Channel to send commands to the engine task.
    pub(crate) cmd_tx: mpsc::Sender<Command>,
    pub(crate) config: EngineConfig,
}

impl EngineInner {
    /// Send a command and wait for its reply.
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(response_tx))
            .await
            .map_err(|_| Error::RuntimeShutdown)?;
        response_rx.await.map_err(|_| Error::RuntimeShutdown)?
    }

    pub(crate) async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::RuntimeShutdown)
    }
}

// ============================================================================
// SERVER ENGINE
// ============================================================================

/// OPC-UA subscription and publish engine.
///
/// Create one `ServerEngine` per server. It manages:
///
/// - **Sessions**: each with its own Publish request queue
/// - **Subscriptions**: publishing timers, keep-alives, lifetime expiry and
///   retransmission queues
/// - **Monitored items**: sampling, filtering, queueing and triggering
/// - **Data sources**: value changes and events pushed by the server
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use opcua_publish_engine::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let space = Arc::new(MemoryAddressSpace::new());
///     space.add_variable(NodeId::numeric(1, 1000), "Temperature", DataValue::new(21.5));
///
///     let engine = opcua_publish_engine::configure().start(space.clone()).await?;
///     let session = engine.create_session().await?;
///     let subscription = session
///         .create_subscription(CreateSubscriptionRequest::default())
///         .await?;
///     session
///         .create_monitored_items(
///             subscription.subscription_id,
///             TimestampsToReturn::Both,
///             vec![MonitoredItemCreateRequest::value(NodeId::numeric(1, 1000), 1)],
///         )
///         .await?;
///
///     let response = session.publish(PublishRequest::default()).await?;
///     for change in response.notification_message.data_changes() {
///         println!("{}: {:?}", change.client_handle, change.value.value);
///     }
///
///     engine.shutdown().await;
///     Ok(())
/// }
/// ```
///
/// # Thread Safety
///
/// The engine and its sessions can be used from any task. Internally, all
/// state is managed by a single event loop task.
pub struct ServerEngine {
    inner: Arc<EngineInner>,
    /// Handle to the engine task, used for graceful shutdown
    engine_task: Option<tokio::task::JoinHandle<()>>,
}

impl ServerEngine {
    pub(crate) fn new(inner: Arc<EngineInner>, engine_task: tokio::task::JoinHandle<()>) -> Self {
        Self {
            inner,
            engine_task: Some(engine_task),
        }
    }

    /// The configuration the engine was started with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Open a new session.
    ///
    /// Fails with `BadTooManySessions` once `max_sessions` are open.
    pub async fn create_session(&self) -> Result<Session> {
        let id = self
            .inner
            .request(|response| Command::CreateSession { response })
            .await?;
        Ok(Session::new(Arc::clone(&self.inner), id))
    }

    /// Push a new attribute value to every monitored item watching it.
    ///
    /// Items that sample periodically pick changes up on their own; this is
    /// for exception-based sources.
    pub async fn notify_data_change(
        &self,
        node_id: NodeId,
        attribute_id: AttributeId,
        value: DataValue,
    ) -> Result<()> {
        self.inner
            .send(Command::NotifyDataChange {
                node_id,
                attribute_id,
                value,
            })
            .await
    }

    /// Raise an event. It reaches event items on the emitting node and on
    /// the Server object.
    pub async fn raise_event(&self, event: EventData) -> Result<()> {
        self.inner.send(Command::RaiseEvent { event }).await
    }

    /// Snapshot of the engine's counters.
    pub async fn diagnostics(&self) -> Result<EngineDiagnostics> {
        let (response, response_rx) = oneshot::channel();
        self.inner.send(Command::Diagnostics { response }).await?;
        response_rx.await.map_err(|_| Error::RuntimeShutdown)
    }

    /// Shut the engine down gracefully.
    ///
    /// Every queued Publish request is answered with `BadShutdown` and all
    /// subscriptions are closed before this returns. Calls on surviving
    /// [`Session`] handles fail with [`Error::RuntimeShutdown`] afterwards.
    pub async fn shutdown(mut self) {
        let (response, response_rx) = oneshot::channel();
        if self.inner.send(Command::Shutdown { response }).await.is_ok() {
            let _ = response_rx.await;
        }

        // Wait for the engine task to complete
        if let Some(handle) = self.engine_task.take() {
            let _ = handle.await;
        }
    }
}
