//! # `Session`
//!
//! Client-session view of the engine. Every OPC-UA subscription service is a
//! method here; calls are serialized through the engine task, so two calls
//! on the same session are applied in the order they were issued.
//!
//! Dropping a `Session` closes it without deleting its subscriptions. They
//! become orphans that keep running until their lifetime expires or another
//! session picks them up with
//! [`transfer_subscriptions`](Session::transfer_subscriptions). Use
//! [`close`](Session::close) to choose explicitly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;

use crate::continuation::Page;
use crate::error::{Error, Result};
use crate::handles::engine::EngineInner;
use crate::handles::events::SubscriptionEvents;
use crate::runtime::Command;
use crate::status::StatusCode;
use crate::types::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, ModifySubscriptionRequest,
    ModifySubscriptionResponse, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoredItemModifyRequest, MonitoredItemModifyResult, MonitoringMode, NotificationMessage,
    PublishRequest, PublishResponse, ReferenceDescription, SetTriggeringResponse, TimestampsToReturn,
    TransferResult,
};
use crate::SessionId;

/// A session with the engine.
///
/// Created via [`ServerEngine::create_session`](crate::ServerEngine::create_session).
///
/// # Example
///
/// ```no_run
/// use opcua_publish_engine::prelude::*;
///
/// # async fn example(session: Session) -> Result<()> {
/// let created = session
///     .create_subscription(CreateSubscriptionRequest {
///         requested_publishing_interval: 500.0,
///         ..Default::default()
///     })
///     .await?;
///
/// let mut acknowledgements = Vec::new();
/// loop {
///     let response = session
///         .publish(PublishRequest {
///             subscription_acknowledgements: std::mem::take(&mut acknowledgements),
///             ..Default::default()
///         })
///         .await?;
///     if response.service_result.is_bad() {
///         break;
///     }
///     if !response.notification_message.is_keep_alive() {
///         acknowledgements.push(SubscriptionAcknowledgement {
///             subscription_id: response.subscription_id,
///             sequence_number: response.notification_message.sequence_number,
///         });
///     }
/// }
/// # let _ = created;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    inner: Arc<EngineInner>,
    id: SessionId,
    closed: bool,
}

impl Session {
    pub(crate) fn new(inner: Arc<EngineInner>, id: SessionId) -> Self {
        Self {
            inner,
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Create a subscription. Requested parameters are revised into the
    /// server's bounds; the revised values are returned.
    pub async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<CreateSubscriptionResponse> {
        let session = self.id;
        self.inner
            .request(|response| Command::CreateSubscription {
                session,
                request,
                response,
            })
            .await
    }

    pub async fn modify_subscription(&self, request: ModifySubscriptionRequest) -> Result<ModifySubscriptionResponse> {
        let session = self.id;
        self.inner
            .request(|response| Command::ModifySubscription {
                session,
                request,
                response,
            })
            .await
    }

    /// Delete subscriptions. Returns one status per id.
    ///
    /// Publish requests still queued when the last subscription goes away
    /// are answered with `BadNoSubscription`.
    pub async fn delete_subscriptions(&self, subscription_ids: &[u32]) -> Result<Vec<StatusCode>> {
        let session = self.id;
        let subscription_ids = subscription_ids.to_vec();
        self.inner
            .request(|response| Command::DeleteSubscriptions {
                session,
                subscription_ids,
                response,
            })
            .await
    }

    pub async fn set_publishing_mode(&self, publishing_enabled: bool, subscription_ids: &[u32]) -> Result<Vec<StatusCode>> {
        let session = self.id;
        let subscription_ids = subscription_ids.to_vec();
        self.inner
            .request(|response| Command::SetPublishingMode {
                session,
                publishing_enabled,
                subscription_ids,
                response,
            })
            .await
    }

    /// Take over subscriptions owned by another session, or orphaned by a
    /// closed one.
    ///
    /// The previous owner receives a `GoodSubscriptionTransferred` status
    /// change on its next Publish response. With `send_initial_values`, the
    /// current value of every reporting item is queued again.
    pub async fn transfer_subscriptions(
        &self,
        subscription_ids: &[u32],
        send_initial_values: bool,
    ) -> Result<Vec<TransferResult>> {
        let session = self.id;
        let subscription_ids = subscription_ids.to_vec();
        self.inner
            .request(|response| Command::TransferSubscriptions {
                session,
                subscription_ids,
                send_initial_values,
                response,
            })
            .await
    }

    /// Observe state changes and messages of one subscription.
    pub async fn watch_subscription(&self, subscription_id: u32) -> Result<SubscriptionEvents> {
        let session = self.id;
        let events = self
            .inner
            .request(|response| Command::WatchSubscription {
                session,
                subscription_id,
                response,
            })
            .await?;
        Ok(SubscriptionEvents::new(subscription_id, events))
    }

    // ========================================================================
    // MONITORED ITEMS
    // ========================================================================

    /// Create monitored items. Each item gets its own result; a failed item
    /// does not fail the call.
    pub async fn create_monitored_items(
        &self,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items: Vec<MonitoredItemCreateRequest>,
    ) -> Result<Vec<MonitoredItemCreateResult>> {
        let session = self.id;
        self.inner
            .request(|response| Command::CreateMonitoredItems {
                session,
                subscription_id,
                timestamps_to_return,
                items,
                response,
            })
            .await
    }

    pub async fn modify_monitored_items(
        &self,
        subscription_id: u32,
        items: Vec<MonitoredItemModifyRequest>,
    ) -> Result<Vec<MonitoredItemModifyResult>> {
        let session = self.id;
        self.inner
            .request(|response| Command::ModifyMonitoredItems {
                session,
                subscription_id,
                items,
                response,
            })
            .await
    }

    pub async fn set_monitoring_mode(
        &self,
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        monitored_item_ids: &[u32],
    ) -> Result<Vec<StatusCode>> {
        let session = self.id;
        let monitored_item_ids = monitored_item_ids.to_vec();
        self.inner
            .request(|response| Command::SetMonitoringMode {
                session,
                subscription_id,
                monitoring_mode,
                monitored_item_ids,
                response,
            })
            .await
    }

    pub async fn delete_monitored_items(&self, subscription_id: u32, monitored_item_ids: &[u32]) -> Result<Vec<StatusCode>> {
        let session = self.id;
        let monitored_item_ids = monitored_item_ids.to_vec();
        self.inner
            .request(|response| Command::DeleteMonitoredItems {
                session,
                subscription_id,
                monitored_item_ids,
                response,
            })
            .await
    }

    /// Link `links_to_add` to the triggering item so that they report when
    /// it does. Removals are applied first.
    pub async fn set_triggering(
        &self,
        subscription_id: u32,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) -> Result<SetTriggeringResponse> {
        let session = self.id;
        let links_to_add = links_to_add.to_vec();
        let links_to_remove = links_to_remove.to_vec();
        self.inner
            .request(|response| Command::SetTriggering {
                session,
                subscription_id,
                triggering_item_id,
                links_to_add,
                links_to_remove,
                response,
            })
            .await
    }

    /// Queue the current value of every reporting item again.
    pub async fn resend_data(&self, subscription_id: u32) -> Result<()> {
        let session = self.id;
        self.inner
            .request(|response| Command::ResendData {
                session,
                subscription_id,
                response,
            })
            .await
    }

    // ========================================================================
    // PUBLISH
    // ========================================================================

    /// Send a Publish request and wait for its response.
    ///
    /// The response arrives once a subscription has a message or a
    /// keep-alive due, or the request times out. Faults such as
    /// `BadNoSubscription` or `BadTimeout` are reported in
    /// [`PublishResponse::service_result`], not as `Err`.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResponse> {
        self.send_publish(request).await?.await
    }

    /// Queue a Publish request without waiting for the response.
    ///
    /// Useful to keep several requests outstanding.
    pub async fn send_publish(&self, request: PublishRequest) -> Result<PendingPublish> {
        let (response, response_rx) = oneshot::channel();
        self.inner
            .send(Command::Publish {
                session: self.id,
                request,
                response,
            })
            .await?;
        Ok(PendingPublish { response_rx })
    }

    /// Ask for a message that is still in the retransmission queue.
    pub async fn republish(&self, subscription_id: u32, retransmit_sequence_number: u32) -> Result<NotificationMessage> {
        let session = self.id;
        self.inner
            .request(|response| Command::Republish {
                session,
                subscription_id,
                retransmit_sequence_number,
                response,
            })
            .await
    }

    // ========================================================================
    // CONTINUATION POINTS
    // ========================================================================

    /// Return the first `max_references` references (0 = all) and keep the
    /// rest behind a continuation point.
    pub async fn register_references(
        &self,
        max_references: u32,
        references: Vec<ReferenceDescription>,
    ) -> Result<Page<ReferenceDescription>> {
        let session = self.id;
        self.inner
            .request(|response| Command::RegisterReferences {
                session,
                max_references,
                references,
                response,
            })
            .await
    }

    pub async fn next_references(&self, continuation_point: Bytes) -> Result<Page<ReferenceDescription>> {
        let session = self.id;
        self.inner
            .request(|response| Command::NextReferences {
                session,
                continuation_point,
                response,
            })
            .await
    }

    pub async fn release_continuation_point(&self, continuation_point: Bytes) -> Result<()> {
        let session = self.id;
        self.inner
            .request(|response| Command::ReleaseContinuationPoint {
                session,
                continuation_point,
                response,
            })
            .await
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Close the session.
    ///
    /// Queued Publish requests are answered with `BadSessionClosed`. With
    /// `delete_subscriptions` false, subscriptions are kept as orphans.
    pub async fn close(mut self, delete_subscriptions: bool) -> Result<()> {
        self.closed = true;
        let session = self.id;
        self.inner
            .request(|response| Command::CloseSession {
                session,
                delete_subscriptions,
                response: Some(response),
            })
            .await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Drop cannot be async. If the channel is full the session stays
        // open; its subscriptions still expire through their lifetime.
        let cmd = Command::CloseSession {
            session: self.id,
            delete_subscriptions: false,
            response: None,
        };
        if let Err(e) = self.inner.cmd_tx.try_send(cmd) {
            match e {
                TrySendError::Full(_) => {
                    tracing::warn!(
                        "Failed to close session {}: command channel full. \
                         Subscriptions will expire through their lifetime.",
                        self.id
                    );
                }
                TrySendError::Closed(_) => {
                    tracing::debug!("Close of session {} skipped: engine already shut down", self.id);
                }
            }
        }
    }
}

/// A queued Publish request. Resolves to its response.
///
/// Dropping it abandons the request; the engine skips it and delivers the
/// message to the next queued request instead.
#[derive(Debug)]
#[must_use = "a PendingPublish does nothing unless awaited"]
pub struct PendingPublish {
    response_rx: oneshot::Receiver<PublishResponse>,
}

impl PendingPublish {
    /// Take the response if it has already arrived.
    pub fn try_response(&mut self) -> Option<PublishResponse> {
        self.response_rx.try_recv().ok()
    }
}

impl Future for PendingPublish {
    type Output = Result<PublishResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response_rx)
            .poll(cx)
            .map_err(|_| Error::RuntimeShutdown)
    }
}
