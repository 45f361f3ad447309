//! # Server Session (Internal)
//!
//! A session owns its subscriptions, its [`PublishEngine`] and its
//! continuation points. Engine-wide concerns (limits, orphans, transfer
//! between sessions) live in [`EngineState`](super::state::EngineState).
//!
//! ## Publish Request Flow
//!
//! 1. No subscription and no terminal message waiting: answer
//!    `BadNoSubscription` right away.
//! 2. Process acknowledgements into per-ack results.
//! 3. Reset the lifetime counter of every subscription of the session.
//! 4. Queue the request, deliver waiting terminal messages.
//! 5. Serve LATE subscriptions: those with data before those owing only a
//!    keep-alive, then oldest obligation first (ties by id).

use std::collections::BTreeMap;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::address_space::AddressSpace;
use crate::continuation::ContinuationPointManager;
use crate::runtime::publish_engine::PublishEngine;
use crate::runtime::subscription::{Subscription, SubscriptionState};
use crate::status::StatusCode;
use crate::types::{PublishRequest, PublishResponse, ReferenceDescription};
use crate::SessionId;

pub(crate) struct ServerSession {
    id: SessionId,
    pub(crate) subscriptions: BTreeMap<u32, Subscription>,
    pub(crate) publish_engine: PublishEngine,
    pub(crate) continuation_points: ContinuationPointManager<ReferenceDescription>,
}

impl ServerSession {
    pub(crate) fn new(
        id: SessionId,
        publish_engine: PublishEngine,
        continuation_points: ContinuationPointManager<ReferenceDescription>,
    ) -> Self {
        Self {
            id,
            subscriptions: BTreeMap::new(),
            publish_engine,
            continuation_points,
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn subscription(&self, id: u32) -> Result<&Subscription, StatusCode> {
        self.subscriptions
            .get(&id)
            .ok_or(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
    }

    pub(crate) fn subscription_mut(&mut self, id: u32) -> Result<&mut Subscription, StatusCode> {
        self.subscriptions
            .get_mut(&id)
            .ok_or(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
    }

    /// Handle a Publish request.
    pub(crate) fn on_publish_request(
        &mut self,
        now: Instant,
        request: PublishRequest,
        responder: oneshot::Sender<PublishResponse>,
    ) {
        let results: Vec<StatusCode> = request
            .subscription_acknowledgements
            .iter()
            .map(|ack| match self.subscriptions.get_mut(&ack.subscription_id) {
                Some(subscription) => subscription.acknowledge(ack.sequence_number),
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect();

        if self.subscriptions.is_empty() && !self.publish_engine.has_closed_messages() {
            debug!("Session {}: publish request {} without subscription", self.id, request.request_handle);
            let _ = responder.send(PublishResponse::fault(
                request.request_handle,
                StatusCode::BAD_NO_SUBSCRIPTION,
                results,
            ));
            return;
        }

        for subscription in self.subscriptions.values_mut() {
            subscription.reset_lifetime_counter();
        }
        self.publish_engine
            .enqueue(now, request.request_handle, request.timeout_hint, results, responder);
        self.publish_engine.flush_closed_messages();
        self.process_late_subscriptions(now);
        if self.subscriptions.is_empty() {
            self.publish_engine.drain(StatusCode::BAD_NO_SUBSCRIPTION);
        }
    }

    /// Serve LATE subscriptions while requests are available.
    pub(crate) fn process_late_subscriptions(&mut self, now: Instant) {
        while self.publish_engine.has_pending_request() {
            let next = self
                .subscriptions
                .values()
                .filter(|s| s.state() == SubscriptionState::Late)
                .filter_map(|s| s.late_since().map(|since| (!s.owes_data(), since, s.id())))
                .min();
            let Some((_, _, id)) = next else {
                return;
            };
            let served = self
                .subscriptions
                .get_mut(&id)
                .is_some_and(|s| s.process_late(now, &mut self.publish_engine));
            if !served {
                return;
            }
        }
    }

    /// Run due sampling and publishing work of every subscription.
    ///
    /// Returns the subscriptions that closed during this poll.
    pub(crate) fn poll(&mut self, now: Instant, space: &dyn AddressSpace) -> Vec<Subscription> {
        self.publish_engine.expire(now);
        for subscription in self.subscriptions.values_mut() {
            subscription.poll(now, Some(&mut self.publish_engine), space);
        }
        let closed: Vec<u32> = self
            .subscriptions
            .values()
            .filter(|s| s.is_closed())
            .map(Subscription::id)
            .collect();
        let removed: Vec<Subscription> = closed
            .iter()
            .filter_map(|id| self.subscriptions.remove(id))
            .collect();
        if !removed.is_empty() && self.subscriptions.is_empty() {
            self.publish_engine.flush_closed_messages();
            self.publish_engine.drain(StatusCode::BAD_NO_SUBSCRIPTION);
        }
        removed
    }

    /// Remove a subscription that is being deleted or transferred away.
    ///
    /// With `status` set, a terminal `StatusChangeNotification` is queued for
    /// the next Publish request. If it was the last subscription, remaining
    /// requests are answered with `BadNoSubscription`.
    pub(crate) fn detach_subscription(&mut self, id: u32, status: Option<StatusCode>) -> Option<Subscription> {
        let mut subscription = self.subscriptions.remove(&id)?;
        if let Some(status) = status {
            let message = subscription.status_change_message(status);
            self.publish_engine.push_closed_message(id, message);
        }
        if self.subscriptions.is_empty() {
            self.publish_engine.flush_closed_messages();
            self.publish_engine.drain(StatusCode::BAD_NO_SUBSCRIPTION);
        }
        subscription.reset_lifetime_counter();
        Some(subscription)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.subscriptions
            .values()
            .filter_map(Subscription::next_deadline)
            .chain(self.publish_engine.next_deadline())
            .min()
    }
}
