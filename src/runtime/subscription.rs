//! # Subscription State Machine (Internal)
//!
//! A subscription owns monitored items and turns their queued notifications
//! into sequenced [`NotificationMessage`]s, one publishing interval at a time.
//!
//! ## States
//!
//! ```text
//!            first tick, data or request       request arrives
//!  CREATING ─────────────────────────▶ NORMAL ◀───────────── LATE
//!      │                                 │  ▲                  ▲
//!      │ no request                      │  │ data             │ owed response,
//!      └─────────────────────────────────┼──┼──────────────────┤ no request
//!                                        ▼  │                  │
//!                                      KEEPALIVE ──────────────┘
//!
//!  LATE ── lifetime counter reaches lifetime count ──▶ CLOSED
//! ```
//!
//! ## Per Tick
//!
//! 1. `lifetime_counter += 1`; reaching `lifetime_count` while LATE closes
//!    the subscription with a `StatusChangeNotification(BadTimeout)`. Every
//!    response sent and every Publish request resets the counter.
//! 2. Publishing enabled and notifications queued: send a data message if a
//!    Publish request is waiting, otherwise go LATE.
//! 3. Otherwise a keep-alive is due on the first tick and every
//!    `max_keep_alive_count` ticks after a response; it is sent if a request
//!    is waiting, otherwise the subscription goes LATE.
//!
//! A LATE subscription is served as soon as a Publish request arrives
//! ([`Subscription::process_late`]).
//!
//! ## Sequence Numbers
//!
//! Data messages consume a sequence number (1, 2, ..., `u32::MAX`, 1, ...).
//! Keep-alives carry the next number without consuming it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address_space::AddressSpace;
use crate::config::EngineConfig;
use crate::handles::events::SubscriptionEvent;
use crate::runtime::monitored_item::{ItemContext, ItemCounter, MonitoredItem, MonitoredItemOps};
use crate::runtime::publish_engine::PublishEngine;
use crate::status::StatusCode;
use crate::types::{
    AttributeId, DataValue, EventData, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoredItemModifyRequest, MonitoredItemModifyResult, MonitoringMode, NodeId,
    Notification, NotificationMessage, TimestampsToReturn,
};
use crate::SessionId;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Created, first publishing interval not yet elapsed.
    Creating,
    /// Last response was a data message.
    Normal,
    /// A response is owed but no Publish request is available.
    Late,
    /// Last response was a keep-alive.
    KeepAlive,
    /// Deleted or expired. Terminal.
    Closed,
}

/// Revised subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SubscriptionSettings {
    pub publishing_interval: f64,
    pub max_keep_alive_count: u32,
    pub lifetime_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
}

impl SubscriptionSettings {
    /// Revise client-requested parameters into the server's bounds.
    pub(crate) fn revise(
        config: &EngineConfig,
        publishing_interval: f64,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
    ) -> Self {
        let interval = if publishing_interval.is_nan() || publishing_interval < config.min_publishing_interval {
            config.min_publishing_interval
        } else {
            publishing_interval.min(config.max_publishing_interval)
        };
        let keep_alive = match max_keep_alive_count {
            0 => config.default_keep_alive_count,
            n => n,
        }
        .min(config.max_keep_alive_count)
        .max(1);
        let lifetime = match lifetime_count {
            0 => keep_alive.saturating_mul(3),
            n => n,
        }
        .min(config.max_lifetime_count)
        .max(1);
        if lifetime < keep_alive.saturating_mul(3) {
            warn!(
                "Lifetime count {} is less than three times the keep-alive count {}",
                lifetime, keep_alive
            );
        }
        let max_notifications = match (max_notifications_per_publish, config.max_notifications_per_publish) {
            (0, server) => server,
            (n, 0) => n,
            (n, server) => n.min(server),
        };
        Self {
            publishing_interval: interval,
            max_keep_alive_count: keep_alive,
            lifetime_count: lifetime,
            max_notifications_per_publish: max_notifications,
            priority,
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.publishing_interval / 1000.0)
    }
}

pub(crate) struct Subscription {
    id: u32,
    settings: SubscriptionSettings,
    publishing_enabled: bool,
    state: SubscriptionState,
    keep_alive_counter: u32,
    lifetime_counter: u32,
    next_sequence_number: u32,
    /// A data message has been sent.
    message_sent: bool,
    /// Any response (data or keep-alive) has been sent.
    responded: bool,
    items: BTreeMap<u32, Box<dyn MonitoredItemOps>>,
    next_item_id: u32,
    /// Triggering item id → items to report.
    triggering: HashMap<u32, BTreeSet<u32>>,
    /// Harvested notifications not yet sent.
    pending_notifications: VecDeque<Notification>,
    retransmission: VecDeque<NotificationMessage>,
    max_retransmission: usize,
    next_tick: Instant,
    late_since: Option<Instant>,
    listeners: Vec<mpsc::Sender<SubscriptionEvent>>,
}

impl Subscription {
    pub(crate) fn new(
        id: u32,
        settings: SubscriptionSettings,
        publishing_enabled: bool,
        max_retransmission: usize,
        now: Instant,
    ) -> Self {
        Self {
            id,
            settings,
            publishing_enabled,
            state: SubscriptionState::Creating,
            keep_alive_counter: 0,
            lifetime_counter: 0,
            next_sequence_number: 1,
            message_sent: false,
            responded: false,
            items: BTreeMap::new(),
            next_item_id: 1,
            triggering: HashMap::new(),
            pending_notifications: VecDeque::new(),
            retransmission: VecDeque::new(),
            max_retransmission,
            next_tick: now + settings.interval(),
            late_since: None,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state
    }

    pub(crate) fn settings(&self) -> &SubscriptionSettings {
        &self.settings
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == SubscriptionState::Closed
    }

    pub(crate) fn message_sent(&self) -> bool {
        self.message_sent
    }

    pub(crate) fn item_count(&self) -> usize {
        self.items.len()
    }

    /// When the subscription started owing a response, if it does.
    pub(crate) fn late_since(&self) -> Option<Instant> {
        self.late_since
    }

    pub(crate) fn modify(&mut self, settings: SubscriptionSettings, now: Instant) {
        debug!(
            "Subscription {} modified: interval {} ms, keep-alive {}, lifetime {}",
            self.id, settings.publishing_interval, settings.max_keep_alive_count, settings.lifetime_count
        );
        self.settings = settings;
        self.lifetime_counter = 0;
        self.next_tick = now + settings.interval();
    }

    pub(crate) fn set_publishing_enabled(&mut self, enabled: bool) {
        self.publishing_enabled = enabled;
        self.lifetime_counter = 0;
    }

    pub(crate) fn reset_lifetime_counter(&mut self) {
        self.lifetime_counter = 0;
    }

    pub(crate) fn add_listener(&mut self, listener: mpsc::Sender<SubscriptionEvent>) {
        self.listeners.push(listener);
    }

    // ========================================================================
    // MONITORED ITEMS
    // ========================================================================

    fn item_context<'a>(
        &self,
        config: &'a EngineConfig,
        space: &'a dyn AddressSpace,
        now: Instant,
    ) -> ItemContext<'a> {
        ItemContext {
            config,
            space,
            publishing_interval: self.settings.publishing_interval,
            now,
        }
    }

    /// Insert an already built item and return its id.
    pub(crate) fn insert_item(&mut self, item: Box<dyn MonitoredItemOps>) -> u32 {
        let id = item.id();
        self.next_item_id = self.next_item_id.max(id.wrapping_add(1)).max(1);
        self.items.insert(id, item);
        id
    }

    pub(crate) fn create_monitored_item(
        &mut self,
        request: &MonitoredItemCreateRequest,
        timestamps_to_return: TimestampsToReturn,
        config: &EngineConfig,
        space: &dyn AddressSpace,
        counter: &ItemCounter,
        now: Instant,
    ) -> MonitoredItemCreateResult {
        if self.items.len() >= config.max_monitored_items_per_subscription {
            return MonitoredItemCreateResult::failed(StatusCode::BAD_TOO_MANY_MONITORED_ITEMS);
        }
        let Some(permit) = counter.try_acquire(config.max_monitored_items) else {
            return MonitoredItemCreateResult::failed(StatusCode::BAD_TOO_MANY_MONITORED_ITEMS);
        };
        let id = self.next_item_id;
        let ctx = self.item_context(config, space, now);
        let mut item = match MonitoredItem::new(id, request, timestamps_to_return, permit, &ctx) {
            Ok(item) => item,
            Err(status_code) => {
                debug!("Subscription {}: monitored item on {} rejected: {}", self.id, request.node_id, status_code);
                return MonitoredItemCreateResult::failed(status_code);
            }
        };
        item.start(space, now);
        let result = MonitoredItemCreateResult {
            status_code: StatusCode::GOOD,
            monitored_item_id: id,
            revised_sampling_interval: item.revised_sampling_interval(),
            revised_queue_size: item.revised_queue_size(),
        };
        self.insert_item(Box::new(item));
        self.emit(SubscriptionEvent::MonitoredItemCreated {
            monitored_item_id: id,
            client_handle: request.parameters.client_handle,
        });
        result
    }

    pub(crate) fn modify_monitored_item(
        &mut self,
        request: &MonitoredItemModifyRequest,
        config: &EngineConfig,
        space: &dyn AddressSpace,
        now: Instant,
    ) -> MonitoredItemModifyResult {
        let ctx = self.item_context(config, space, now);
        let Some(item) = self.items.get_mut(&request.monitored_item_id) else {
            return MonitoredItemModifyResult::failed(StatusCode::BAD_MONITORED_ITEM_ID_INVALID);
        };
        item.modify(request, &ctx)
            .unwrap_or_else(MonitoredItemModifyResult::failed)
    }

    pub(crate) fn set_monitoring_mode(
        &mut self,
        mode: MonitoringMode,
        ids: &[u32],
        space: &dyn AddressSpace,
        now: Instant,
    ) -> Vec<StatusCode> {
        ids.iter()
            .map(|id| match self.items.get_mut(id) {
                Some(item) => {
                    item.set_monitoring_mode(mode, space, now);
                    StatusCode::GOOD
                }
                None => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            })
            .collect()
    }

    pub(crate) fn delete_monitored_items(&mut self, ids: &[u32]) -> Vec<StatusCode> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut item) = self.items.remove(id) else {
                results.push(StatusCode::BAD_MONITORED_ITEM_ID_INVALID);
                continue;
            };
            item.terminate();
            item.dispose();
            self.triggering.remove(id);
            for links in self.triggering.values_mut() {
                links.remove(id);
            }
            self.emit(SubscriptionEvent::MonitoredItemDeleted {
                monitored_item_id: *id,
            });
            results.push(StatusCode::GOOD);
        }
        results
    }

    /// Add and remove triggering links of `triggering_item_id`.
    ///
    /// Removals are applied before additions. Per-link failures are reported
    /// in the returned vectors, aligned with the inputs.
    pub(crate) fn set_triggering(
        &mut self,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) -> Result<(Vec<StatusCode>, Vec<StatusCode>), StatusCode> {
        if links_to_add.is_empty() && links_to_remove.is_empty() {
            return Err(StatusCode::BAD_NOTHING_TO_DO);
        }
        if !self.items.contains_key(&triggering_item_id) {
            return Err(StatusCode::BAD_MONITORED_ITEM_ID_INVALID);
        }
        let links = self.triggering.entry(triggering_item_id).or_default();
        let remove_results = links_to_remove
            .iter()
            .map(|id| {
                if links.remove(id) {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_MONITORED_ITEM_ID_INVALID
                }
            })
            .collect();
        let add_results = links_to_add
            .iter()
            .map(|id| {
                if *id == triggering_item_id || !self.items.contains_key(id) {
                    StatusCode::BAD_MONITORED_ITEM_ID_INVALID
                } else {
                    links.insert(*id);
                    StatusCode::GOOD
                }
            })
            .collect();
        if links.is_empty() {
            self.triggering.remove(&triggering_item_id);
        }
        Ok((add_results, remove_results))
    }

    /// Force linked Sampling items to report after `item_id` queued a value.
    fn fire_triggers(&mut self, item_id: u32, space: &dyn AddressSpace) {
        let Some(mode) = self.items.get(&item_id).map(|item| item.monitoring_mode()) else {
            return;
        };
        if mode == MonitoringMode::Disabled {
            return;
        }
        let Some(links) = self.triggering.get(&item_id) else {
            return;
        };
        let links: Vec<u32> = links.iter().copied().collect();
        for link in links {
            if let Some(item) = self.items.get_mut(&link) {
                if item.monitoring_mode() == MonitoringMode::Sampling {
                    item.trigger(space);
                }
            }
        }
    }

    /// Queue the current value of every Reporting item.
    pub(crate) fn resend_data(&mut self, space: &dyn AddressSpace) {
        for item in self.items.values_mut() {
            if item.monitoring_mode() == MonitoringMode::Reporting {
                item.resend_initial_value(space);
            }
        }
    }

    pub(crate) fn on_data_change(
        &mut self,
        node_id: &NodeId,
        attribute_id: AttributeId,
        value: &DataValue,
        space: &dyn AddressSpace,
    ) {
        let queued: Vec<u32> = self
            .items
            .values_mut()
            .filter_map(|item| item.on_data_change(node_id, attribute_id, value).then(|| item.id()))
            .collect();
        for id in queued {
            self.fire_triggers(id, space);
        }
    }

    pub(crate) fn on_event(&mut self, event: &EventData, space: &dyn AddressSpace) {
        let queued: Vec<u32> = self
            .items
            .values_mut()
            .filter_map(|item| item.on_event(event, space).then(|| item.id()))
            .collect();
        for id in queued {
            self.fire_triggers(id, space);
        }
    }

    pub(crate) fn has_notifications(&self) -> bool {
        !self.pending_notifications.is_empty() || self.items.values().any(|item| item.has_notifications())
    }

    /// Has a data message to send, as opposed to owing only a keep-alive.
    pub(crate) fn owes_data(&self) -> bool {
        self.publishing_enabled && self.has_notifications()
    }

    // ========================================================================
    // TIMING
    // ========================================================================

    /// Earliest instant [`poll`](Self::poll) has work to do.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        if self.is_closed() {
            return None;
        }
        self.items
            .values()
            .filter_map(|item| item.next_sample_at())
            .chain(std::iter::once(self.next_tick))
            .min()
    }

    /// Sample due items, then run the publishing tick if it is due.
    ///
    /// `engine` is `None` for orphaned subscriptions.
    pub(crate) fn poll(&mut self, now: Instant, engine: Option<&mut PublishEngine>, space: &dyn AddressSpace) {
        if self.is_closed() {
            return;
        }
        let due: Vec<u32> = self
            .items
            .values()
            .filter(|item| item.next_sample_at().is_some_and(|at| at <= now))
            .map(|item| item.id())
            .collect();
        for id in due {
            let queued = self.items.get_mut(&id).is_some_and(|item| item.sample(now, space));
            if queued {
                self.fire_triggers(id, space);
            }
        }
        if now >= self.next_tick {
            self.tick(now, engine);
            let interval = self.settings.interval();
            self.next_tick += interval;
            if self.next_tick <= now {
                self.next_tick = now + interval;
            }
        }
    }

    /// One publishing interval elapsed.
    pub(crate) fn tick(&mut self, now: Instant, mut engine: Option<&mut PublishEngine>) {
        if self.is_closed() {
            return;
        }
        self.lifetime_counter += 1;
        if self.state == SubscriptionState::Late && self.lifetime_counter >= self.settings.lifetime_count {
            self.expire(engine);
            return;
        }
        let can_publish = engine.as_deref().is_some_and(PublishEngine::has_pending_request);

        if self.owes_data() {
            match engine.as_deref_mut() {
                Some(engine) if can_publish => self.publish_notifications(now, engine),
                _ => self.become_late(now),
            }
            return;
        }

        let keep_alive_due = if !self.responded || self.state == SubscriptionState::Late {
            true
        } else {
            self.keep_alive_counter += 1;
            self.keep_alive_counter >= self.settings.max_keep_alive_count
        };
        if keep_alive_due {
            let sent = match engine.as_deref_mut() {
                Some(engine) if can_publish => self.send_keep_alive(engine),
                _ => false,
            };
            if !sent {
                self.become_late(now);
            }
        }
    }

    /// Serve an owed response now that a Publish request is available.
    ///
    /// Returns `true` if a response was sent.
    pub(crate) fn process_late(&mut self, now: Instant, engine: &mut PublishEngine) -> bool {
        if self.state != SubscriptionState::Late || !engine.has_pending_request() {
            return false;
        }
        if self.owes_data() {
            self.publish_notifications(now, engine);
            true
        } else {
            self.send_keep_alive(engine)
        }
    }

    fn become_late(&mut self, now: Instant) {
        if self.state != SubscriptionState::Late {
            self.late_since = Some(now);
            self.set_state(SubscriptionState::Late);
        }
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    fn consume_sequence_number(&mut self) -> u32 {
        let sequence_number = self.next_sequence_number;
        self.next_sequence_number = match sequence_number {
            u32::MAX => 1,
            n => n + 1,
        };
        sequence_number
    }

    /// Harvest items and build one data message of at most
    /// `max_notifications_per_publish` notifications.
    fn build_data_message(&mut self) -> NotificationMessage {
        for item in self.items.values_mut() {
            if item.has_notifications() {
                self.pending_notifications.extend(item.extract_notifications());
            }
        }
        let available = self.pending_notifications.len();
        let take = match self.settings.max_notifications_per_publish as usize {
            0 => available,
            max => max.min(available),
        };
        let batch: Vec<Notification> = self.pending_notifications.drain(..take).collect();
        let message = NotificationMessage::from_notifications(self.consume_sequence_number(), batch);
        if self.max_retransmission > 0 {
            if self.retransmission.len() >= self.max_retransmission {
                self.retransmission.pop_front();
            }
            self.retransmission.push_back(message.clone());
        }
        message
    }

    /// Send data messages while notifications and requests remain.
    fn publish_notifications(&mut self, now: Instant, engine: &mut PublishEngine) {
        loop {
            let message = self.build_data_message();
            let more = self.has_notifications();
            let sequence_number = message.sequence_number;
            if !self.listeners.is_empty() {
                self.emit(SubscriptionEvent::Notification(message.clone()));
            }
            if !engine.send_notification_message(self.id, message, more, self.available_sequence_numbers()) {
                debug!(
                    "Subscription {}: message {} kept for republish, no request left",
                    self.id, sequence_number
                );
            }
            self.message_sent = true;
            self.responded = true;
            self.keep_alive_counter = 0;
            self.lifetime_counter = 0;
            if !more {
                self.late_since = None;
                self.set_state(SubscriptionState::Normal);
                return;
            }
            if !engine.has_pending_request() {
                // Still owes the rest; queue behind other late subscriptions.
                self.late_since = Some(now);
                self.set_state(SubscriptionState::Late);
                return;
            }
        }
    }

    fn send_keep_alive(&mut self, engine: &mut PublishEngine) -> bool {
        let sequence_number = self.next_sequence_number;
        if !engine.send_keep_alive_response(self.id, sequence_number, self.available_sequence_numbers()) {
            return false;
        }
        debug!("Subscription {}: keep-alive {}", self.id, sequence_number);
        self.responded = true;
        self.keep_alive_counter = 0;
        self.lifetime_counter = 0;
        self.late_since = None;
        self.set_state(SubscriptionState::KeepAlive);
        self.emit(SubscriptionEvent::KeepAlive { sequence_number });
        true
    }

    pub(crate) fn available_sequence_numbers(&self) -> Vec<u32> {
        self.retransmission.iter().map(|m| m.sequence_number).collect()
    }

    /// Drop an acknowledged message from the retransmission queue.
    pub(crate) fn acknowledge(&mut self, sequence_number: u32) -> StatusCode {
        match self
            .retransmission
            .iter()
            .position(|m| m.sequence_number == sequence_number)
        {
            Some(index) => {
                self.retransmission.remove(index);
                StatusCode::GOOD
            }
            None => StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN,
        }
    }

    pub(crate) fn republish(&self, sequence_number: u32) -> Result<NotificationMessage, StatusCode> {
        self.retransmission
            .iter()
            .find(|m| m.sequence_number == sequence_number)
            .cloned()
            .ok_or(StatusCode::BAD_MESSAGE_NOT_AVAILABLE)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    fn set_state(&mut self, state: SubscriptionState) {
        if self.state == state {
            return;
        }
        debug!("Subscription {}: {:?} -> {:?}", self.id, self.state, state);
        let from = self.state;
        self.state = state;
        self.emit(SubscriptionEvent::StateChanged { from, to: state });
    }

    /// Build a `StatusChangeNotification` message, consuming a sequence number.
    pub(crate) fn status_change_message(&mut self, status: StatusCode) -> NotificationMessage {
        NotificationMessage::for_status(self.consume_sequence_number(), status)
    }

    /// Lifetime elapsed without Publish requests.
    fn expire(&mut self, engine: Option<&mut PublishEngine>) {
        info!(
            "Subscription {} expired after {} publishing intervals without a publish request",
            self.id, self.lifetime_counter
        );
        let message = self.status_change_message(StatusCode::BAD_TIMEOUT);
        match engine {
            Some(engine) => engine.push_closed_message(self.id, message),
            None => debug!("Subscription {} is orphaned, dropping its timeout status", self.id),
        }
        self.emit(SubscriptionEvent::Expired);
        self.close();
    }

    /// The subscription moved to another session.
    pub(crate) fn transferred(&mut self, to: SessionId, send_initial_values: bool, space: &dyn AddressSpace) {
        self.lifetime_counter = 0;
        if send_initial_values {
            self.resend_data(space);
        }
        self.emit(SubscriptionEvent::Transferred { to });
    }

    /// Terminate and dispose every item, then enter CLOSED.
    pub(crate) fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        for item in self.items.values_mut() {
            item.terminate();
            item.dispose();
        }
        self.items.clear();
        self.triggering.clear();
        self.pending_notifications.clear();
        self.late_since = None;
        self.set_state(SubscriptionState::Closed);
        self.emit(SubscriptionEvent::Closed);
        self.listeners.clear();
    }

    fn emit(&mut self, event: SubscriptionEvent) {
        if self.listeners.is_empty() {
            return;
        }
        let id = self.id;
        self.listeners.retain(|listener| match listener.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Event listener of subscription {} is full, event dropped", id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Items hold engine-wide slots; make sure they are released.
        for item in self.items.values_mut() {
            item.dispose();
        }
    }
}
