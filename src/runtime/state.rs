//! # Engine State (Internal)
//!
//! All mutable state of a running engine lives in [`EngineState`]. The event
//! loop owns it exclusively, so no locks are needed. Each service handler
//! takes `&mut EngineState` plus an explicit `now` and returns
//! `Result<_, StatusCode>`; the event loop maps errors onto
//! [`Error::Service`](crate::Error::Service).
//!
//! ## Key Data Structures
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`EngineState`] | Top-level state container |
//! | [`ServerSession`] | Subscriptions, publish queue and continuation points of one session |
//! | [`Subscription`] | Publishing state machine |
//! | `orphans` | Subscriptions whose session closed without deleting them |
//! | [`EngineDiagnostics`] | Counters reported by [`ServerEngine::diagnostics`](crate::ServerEngine::diagnostics) |
//!
//! ## Id Management
//!
//! Session and subscription ids start at 1, wrap past `u32::MAX` back to 1
//! and skip ids still in use. Subscription ids are unique across the whole
//! engine, so a transfer never renumbers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::address_space::AddressSpace;
use crate::config::EngineConfig;
use crate::continuation::{ContinuationPointManager, Page};
use crate::handles::events::SubscriptionEvent;
use crate::runtime::monitored_item::ItemCounter;
use crate::runtime::publish_engine::PublishEngine;
use crate::runtime::session::ServerSession;
use crate::runtime::subscription::{Subscription, SubscriptionSettings};
use crate::status::StatusCode;
use crate::types::{
    AttributeId, CreateSubscriptionRequest, CreateSubscriptionResponse, DataValue, EventData,
    ModifySubscriptionRequest, ModifySubscriptionResponse, MonitoredItemCreateRequest,
    MonitoredItemCreateResult, MonitoredItemModifyRequest, MonitoredItemModifyResult, MonitoringMode,
    NodeId, NotificationMessage, PublishRequest, PublishResponse, ReferenceDescription,
    SetTriggeringResponse, TimestampsToReturn, TransferResult,
};
use crate::SessionId;

/// Snapshot of engine-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    pub current_session_count: usize,
    /// Sessions created since start.
    pub cumulated_session_count: usize,
    /// Live subscriptions, including orphans.
    pub current_subscription_count: usize,
    /// Subscriptions created since start.
    pub cumulated_subscription_count: usize,
    pub orphaned_subscription_count: usize,
    pub monitored_item_count: usize,
    /// Publish requests queued across all sessions.
    pub pending_publish_request_count: usize,
}

pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    address_space: Arc<dyn AddressSpace>,
    sessions: HashMap<SessionId, ServerSession>,
    /// Subscriptions kept alive after their session closed, awaiting transfer.
    orphans: BTreeMap<u32, Subscription>,
    item_counter: ItemCounter,
    next_session_id: u32,
    next_subscription_id: u32,
    cumulated_sessions: usize,
    cumulated_subscriptions: usize,
}

fn session_mut(
    sessions: &mut HashMap<SessionId, ServerSession>,
    id: SessionId,
) -> Result<&mut ServerSession, StatusCode> {
    sessions.get_mut(&id).ok_or(StatusCode::BAD_SESSION_ID_INVALID)
}

impl EngineState {
    pub(crate) fn new(config: EngineConfig, address_space: Arc<dyn AddressSpace>) -> Self {
        Self {
            config,
            address_space,
            sessions: HashMap::new(),
            orphans: BTreeMap::new(),
            item_counter: ItemCounter::default(),
            next_session_id: 1,
            next_subscription_id: 1,
            cumulated_sessions: 0,
            cumulated_subscriptions: 0,
        }
    }

    fn subscription_count(&self) -> usize {
        self.sessions
            .values()
            .map(|s| s.subscriptions.len())
            .sum::<usize>()
            + self.orphans.len()
    }

    fn subscription_exists(&self, id: u32) -> bool {
        self.orphans.contains_key(&id) || self.sessions.values().any(|s| s.subscriptions.contains_key(&id))
    }

    fn allocate_subscription_id(&mut self) -> u32 {
        loop {
            let id = self.next_subscription_id;
            self.next_subscription_id = self.next_subscription_id.wrapping_add(1).max(1);
            if !self.subscription_exists(id) {
                return id;
            }
        }
    }

    fn allocate_session_id(&mut self) -> SessionId {
        loop {
            let id = SessionId::new(self.next_session_id);
            self.next_session_id = self.next_session_id.wrapping_add(1).max(1);
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    pub(crate) fn create_session(&mut self) -> Result<SessionId, StatusCode> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(StatusCode::BAD_TOO_MANY_SESSIONS);
        }
        let id = self.allocate_session_id();
        let session = ServerSession::new(
            id,
            PublishEngine::new(
                self.config.max_publish_requests_per_session,
                self.config.publish_request_timeout,
            ),
            ContinuationPointManager::new(self.config.max_continuation_points_per_session),
        );
        self.sessions.insert(id, session);
        self.cumulated_sessions += 1;
        info!("Session {} created", id);
        Ok(id)
    }

    /// Close a session. Its subscriptions are either deleted or kept as
    /// orphans that a later `TransferSubscriptions` can pick up.
    pub(crate) fn close_session(&mut self, id: SessionId, delete_subscriptions: bool) -> Result<(), StatusCode> {
        let mut session = self.sessions.remove(&id).ok_or(StatusCode::BAD_SESSION_ID_INVALID)?;
        session.publish_engine.drain(StatusCode::BAD_SESSION_CLOSED);
        session.publish_engine.clear_closed_messages();
        session.continuation_points.clear();
        let subscriptions = std::mem::take(&mut session.subscriptions);
        if delete_subscriptions {
            info!("Session {} closed, deleting {} subscriptions", id, subscriptions.len());
            for mut subscription in subscriptions.into_values() {
                subscription.close();
            }
        } else {
            if !subscriptions.is_empty() {
                info!("Session {} closed, {} subscriptions orphaned", id, subscriptions.len());
            }
            self.orphans.extend(subscriptions);
        }
        Ok(())
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    pub(crate) fn create_subscription(
        &mut self,
        session_id: SessionId,
        request: &CreateSubscriptionRequest,
        now: Instant,
    ) -> Result<CreateSubscriptionResponse, StatusCode> {
        let per_session = session_mut(&mut self.sessions, session_id)?.subscriptions.len();
        if self.subscription_count() >= self.config.max_subscriptions
            || per_session >= self.config.max_subscriptions_per_session
        {
            return Err(StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS);
        }
        let settings = SubscriptionSettings::revise(
            &self.config,
            request.requested_publishing_interval,
            request.requested_lifetime_count,
            request.requested_max_keep_alive_count,
            request.max_notifications_per_publish,
            request.priority,
        );
        let id = self.allocate_subscription_id();
        let subscription = Subscription::new(
            id,
            settings,
            request.publishing_enabled,
            self.config.max_retransmission_queue_size,
            now,
        );
        session_mut(&mut self.sessions, session_id)?
            .subscriptions
            .insert(id, subscription);
        self.cumulated_subscriptions += 1;
        info!(
            "Session {}: subscription {} created (interval {} ms, keep-alive {}, lifetime {})",
            session_id, id, settings.publishing_interval, settings.max_keep_alive_count, settings.lifetime_count
        );
        Ok(CreateSubscriptionResponse {
            subscription_id: id,
            revised_publishing_interval: settings.publishing_interval,
            revised_lifetime_count: settings.lifetime_count,
            revised_max_keep_alive_count: settings.max_keep_alive_count,
        })
    }

    pub(crate) fn modify_subscription(
        &mut self,
        session_id: SessionId,
        request: &ModifySubscriptionRequest,
        now: Instant,
    ) -> Result<ModifySubscriptionResponse, StatusCode> {
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(request.subscription_id)?;
        let settings = SubscriptionSettings::revise(
            &self.config,
            request.requested_publishing_interval,
            request.requested_lifetime_count,
            request.requested_max_keep_alive_count,
            request.max_notifications_per_publish,
            request.priority,
        );
        subscription.modify(settings, now);
        Ok(ModifySubscriptionResponse {
            revised_publishing_interval: settings.publishing_interval,
            revised_lifetime_count: settings.lifetime_count,
            revised_max_keep_alive_count: settings.max_keep_alive_count,
        })
    }

    pub(crate) fn delete_subscriptions(
        &mut self,
        session_id: SessionId,
        subscription_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if subscription_ids.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let session = session_mut(&mut self.sessions, session_id)?;
        Ok(subscription_ids
            .iter()
            .map(|id| match session.detach_subscription(*id, None) {
                Some(mut subscription) => {
                    subscription.close();
                    info!("Session {}: subscription {} deleted", session_id, id);
                    StatusCode::GOOD
                }
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect())
    }

    pub(crate) fn set_publishing_mode(
        &mut self,
        session_id: SessionId,
        publishing_enabled: bool,
        subscription_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if subscription_ids.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let session = session_mut(&mut self.sessions, session_id)?;
        Ok(subscription_ids
            .iter()
            .map(|id| match session.subscription_mut(*id) {
                Ok(subscription) => {
                    subscription.set_publishing_enabled(publishing_enabled);
                    StatusCode::GOOD
                }
                Err(status_code) => status_code,
            })
            .collect())
    }

    /// Move subscriptions to `target`, from another session or from the
    /// orphans. The source session receives `GoodSubscriptionTransferred`.
    pub(crate) fn transfer_subscriptions(
        &mut self,
        target: SessionId,
        subscription_ids: &[u32],
        send_initial_values: bool,
        now: Instant,
    ) -> Result<Vec<TransferResult>, StatusCode> {
        if subscription_ids.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        session_mut(&mut self.sessions, target)?;
        let results = subscription_ids
            .iter()
            .map(|id| self.transfer_subscription(target, *id, send_initial_values))
            .collect();
        if let Some(session) = self.sessions.get_mut(&target) {
            session.process_late_subscriptions(now);
        }
        Ok(results)
    }

    fn transfer_subscription(&mut self, target: SessionId, id: u32, send_initial_values: bool) -> TransferResult {
        let failed = |status_code| TransferResult {
            status_code,
            available_sequence_numbers: Vec::new(),
        };
        let Some(target_session) = self.sessions.get(&target) else {
            return failed(StatusCode::BAD_SESSION_ID_INVALID);
        };
        if let Ok(subscription) = target_session.subscription(id) {
            return TransferResult {
                status_code: StatusCode::GOOD,
                available_sequence_numbers: subscription.available_sequence_numbers(),
            };
        }
        if target_session.subscriptions.len() >= self.config.max_subscriptions_per_session {
            return failed(StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS);
        }

        let source = self
            .sessions
            .values()
            .find(|s| s.subscriptions.contains_key(&id))
            .map(ServerSession::id);
        let detached = match source {
            Some(source) => self
                .sessions
                .get_mut(&source)
                .and_then(|s| s.detach_subscription(id, Some(StatusCode::GOOD_SUBSCRIPTION_TRANSFERRED))),
            None => self.orphans.remove(&id),
        };
        let Some(mut subscription) = detached else {
            return failed(StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };

        subscription.transferred(target, send_initial_values, self.address_space.as_ref());
        let available_sequence_numbers = subscription.available_sequence_numbers();
        match source {
            Some(source) => info!("Subscription {} transferred from session {} to {}", id, source, target),
            None => info!("Orphaned subscription {} adopted by session {}", id, target),
        }
        match self.sessions.get_mut(&target) {
            Some(session) => {
                session.subscriptions.insert(id, subscription);
                TransferResult {
                    status_code: StatusCode::GOOD,
                    available_sequence_numbers,
                }
            }
            None => failed(StatusCode::BAD_SESSION_ID_INVALID),
        }
    }

    pub(crate) fn watch_subscription(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
    ) -> Result<mpsc::Receiver<SubscriptionEvent>, StatusCode> {
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        subscription.add_listener(tx);
        Ok(rx)
    }

    // ========================================================================
    // MONITORED ITEMS
    // ========================================================================

    pub(crate) fn create_monitored_items(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items: &[MonitoredItemCreateRequest],
        now: Instant,
    ) -> Result<Vec<MonitoredItemCreateResult>, StatusCode> {
        if items.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        let space = self.address_space.as_ref();
        Ok(items
            .iter()
            .map(|item| {
                subscription.create_monitored_item(
                    item,
                    timestamps_to_return,
                    &self.config,
                    space,
                    &self.item_counter,
                    now,
                )
            })
            .collect())
    }

    pub(crate) fn modify_monitored_items(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        items: &[MonitoredItemModifyRequest],
        now: Instant,
    ) -> Result<Vec<MonitoredItemModifyResult>, StatusCode> {
        if items.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        let space = self.address_space.as_ref();
        Ok(items
            .iter()
            .map(|item| subscription.modify_monitored_item(item, &self.config, space, now))
            .collect())
    }

    pub(crate) fn set_monitoring_mode(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        mode: MonitoringMode,
        monitored_item_ids: &[u32],
        now: Instant,
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if monitored_item_ids.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        Ok(subscription.set_monitoring_mode(mode, monitored_item_ids, self.address_space.as_ref(), now))
    }

    pub(crate) fn delete_monitored_items(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if monitored_item_ids.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        Ok(subscription.delete_monitored_items(monitored_item_ids))
    }

    pub(crate) fn set_triggering(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) -> Result<SetTriggeringResponse, StatusCode> {
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        let (add_results, remove_results) =
            subscription.set_triggering(triggering_item_id, links_to_add, links_to_remove)?;
        Ok(SetTriggeringResponse {
            status_code: StatusCode::GOOD,
            add_results,
            remove_results,
        })
    }

    pub(crate) fn resend_data(&mut self, session_id: SessionId, subscription_id: u32) -> Result<(), StatusCode> {
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        subscription.resend_data(self.address_space.as_ref());
        Ok(())
    }

    // ========================================================================
    // PUBLISH
    // ========================================================================

    /// Queue a Publish request. Never fails at call level: faults travel
    /// in the response's `service_result`.
    pub(crate) fn publish(
        &mut self,
        session_id: SessionId,
        request: PublishRequest,
        responder: oneshot::Sender<PublishResponse>,
        now: Instant,
    ) {
        match self.sessions.get_mut(&session_id) {
            Some(session) => session.on_publish_request(now, request, responder),
            None => {
                debug!("Publish request for unknown session {}", session_id);
                let _ = responder.send(PublishResponse::fault(
                    request.request_handle,
                    StatusCode::BAD_SESSION_ID_INVALID,
                    Vec::new(),
                ));
            }
        }
    }

    pub(crate) fn republish(
        &mut self,
        session_id: SessionId,
        subscription_id: u32,
        retransmit_sequence_number: u32,
    ) -> Result<NotificationMessage, StatusCode> {
        let subscription = session_mut(&mut self.sessions, session_id)?.subscription_mut(subscription_id)?;
        // A Republish shows the client is alive.
        subscription.reset_lifetime_counter();
        subscription.republish(retransmit_sequence_number)
    }

    // ========================================================================
    // CONTINUATION POINTS
    // ========================================================================

    pub(crate) fn register_references(
        &mut self,
        session_id: SessionId,
        max_references: u32,
        references: Vec<ReferenceDescription>,
    ) -> Result<Page<ReferenceDescription>, StatusCode> {
        session_mut(&mut self.sessions, session_id)?
            .continuation_points
            .register(max_references, references)
    }

    pub(crate) fn next_references(
        &mut self,
        session_id: SessionId,
        continuation_point: &Bytes,
    ) -> Result<Page<ReferenceDescription>, StatusCode> {
        session_mut(&mut self.sessions, session_id)?
            .continuation_points
            .get_next(continuation_point)
    }

    pub(crate) fn release_continuation_point(
        &mut self,
        session_id: SessionId,
        continuation_point: &Bytes,
    ) -> Result<(), StatusCode> {
        if session_mut(&mut self.sessions, session_id)?
            .continuation_points
            .cancel(continuation_point)
        {
            Ok(())
        } else {
            Err(StatusCode::BAD_CONTINUATION_POINT_INVALID)
        }
    }

    // ========================================================================
    // DATA SOURCES
    // ========================================================================

    fn all_subscriptions(&mut self) -> impl Iterator<Item = &mut Subscription> {
        self.sessions
            .values_mut()
            .flat_map(|s| s.subscriptions.values_mut())
            .chain(self.orphans.values_mut())
    }

    /// Push a new attribute value to every item monitoring it.
    pub(crate) fn notify_data_change(&mut self, node_id: &NodeId, attribute_id: AttributeId, value: &DataValue) {
        let space = Arc::clone(&self.address_space);
        for subscription in self.all_subscriptions() {
            subscription.on_data_change(node_id, attribute_id, value, space.as_ref());
        }
    }

    /// Deliver an event to every event item whose node is the emitter or
    /// the Server object.
    pub(crate) fn raise_event(&mut self, event: &EventData) {
        let space = Arc::clone(&self.address_space);
        debug!("Event {} raised by {}", event.event_type, event.emitter);
        for subscription in self.all_subscriptions() {
            subscription.on_event(event, space.as_ref());
        }
    }

    // ========================================================================
    // TIMING
    // ========================================================================

    /// Run everything that is due at `now`.
    pub(crate) fn poll(&mut self, now: Instant) {
        let space = self.address_space.as_ref();
        for session in self.sessions.values_mut() {
            for closed in session.poll(now, space) {
                debug!("Session {}: subscription {} removed", session.id(), closed.id());
            }
        }
        for orphan in self.orphans.values_mut() {
            orphan.poll(now, None, space);
        }
        self.orphans.retain(|id, subscription| {
            if subscription.is_closed() {
                info!("Orphaned subscription {} expired", id);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(ServerSession::next_deadline)
            .chain(self.orphans.values().filter_map(Subscription::next_deadline))
            .min()
    }

    pub(crate) fn diagnostics(&self) -> EngineDiagnostics {
        EngineDiagnostics {
            current_session_count: self.sessions.len(),
            cumulated_session_count: self.cumulated_sessions,
            current_subscription_count: self.subscription_count(),
            cumulated_subscription_count: self.cumulated_subscriptions,
            orphaned_subscription_count: self.orphans.len(),
            monitored_item_count: self.item_counter.current(),
            pending_publish_request_count: self
                .sessions
                .values()
                .map(|s| s.publish_engine.pending_publish_request_count())
                .sum(),
        }
    }

    /// Answer every queued request with `BadShutdown` and close everything.
    pub(crate) fn shutdown(&mut self) {
        info!(
            "Shutting down: {} sessions, {} subscriptions",
            self.sessions.len(),
            self.subscription_count()
        );
        for (_, mut session) in self.sessions.drain() {
            session.publish_engine.drain(StatusCode::BAD_SHUTDOWN);
            for subscription in session.subscriptions.values_mut() {
                subscription.close();
            }
        }
        for subscription in self.orphans.values_mut() {
            subscription.close();
        }
        self.orphans.clear();
    }
}
