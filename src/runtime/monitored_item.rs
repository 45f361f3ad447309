//! # Monitored Items (Internal)
//!
//! A monitored item watches one attribute of one node. Data items sample the
//! attribute through the [`AddressSpace`] (or receive pushed values) and
//! queue every reportable change; event items queue the selected fields of
//! events that pass their filter.
//!
//! The owning subscription only relies on the [`MonitoredItemOps`] surface,
//! so tests can drive a subscription with scripted items.
//!
//! ## Queue Policy
//!
//! | `queue_size` | `discard_oldest` | On overflow |
//! |--------------|------------------|-------------|
//! | 1 | any | the queued value is replaced |
//! | > 1 | `true` | oldest dropped, overflow bit on the new oldest |
//! | > 1 | `false` | new value dropped, overflow bit on the newest queued |
//!
//! ## Monitoring Modes
//!
//! | Mode | Samples | Reports |
//! |------|---------|---------|
//! | `Disabled` | no | no |
//! | `Sampling` | yes | only after being triggered |
//! | `Reporting` | yes | yes |

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::address_space::{AddressSpace, EuRange};
use crate::config::EngineConfig;
use crate::runtime::filter::{is_data_change, validate_filter};
use crate::status::StatusCode;
use crate::types::{
    AttributeId, DataChangeFilter, DataValue, EventData, EventFieldList, EventFilter,
    MonitoredItemCreateRequest, MonitoredItemModifyRequest, MonitoredItemModifyResult,
    MonitoredItemNotification, MonitoringFilter, MonitoringMode, MonitoringParameters, NodeId,
    Notification, TimestampsToReturn,
};

// ============================================================================
// GLOBAL ITEM ACCOUNTING
// ============================================================================

/// Engine-wide count of live monitored items.
#[derive(Debug, Clone, Default)]
pub(crate) struct ItemCounter(Arc<AtomicUsize>);

impl ItemCounter {
    /// Reserve a slot if fewer than `max` items are live.
    pub(crate) fn try_acquire(&self, max: usize) -> Option<ItemPermit> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| ItemPermit(Arc::clone(&self.0)))
    }

    pub(crate) fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// One reserved slot of the [`ItemCounter`]. Released on drop, so a slot
/// can only ever be returned once.
#[derive(Debug)]
pub(crate) struct ItemPermit(Arc<AtomicUsize>);

impl Drop for ItemPermit {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// SUBSCRIPTION-FACING SURFACE
// ============================================================================

/// Environment shared by item operations.
pub(crate) struct ItemContext<'a> {
    pub config: &'a EngineConfig,
    pub space: &'a dyn AddressSpace,
    /// Revised publishing interval of the owning subscription, in ms.
    pub publishing_interval: f64,
    pub now: Instant,
}

/// What a subscription needs from a monitored item.
pub(crate) trait MonitoredItemOps: Send {
    fn id(&self) -> u32;

    fn monitoring_mode(&self) -> MonitoringMode;

    /// Notifications are ready to be reported.
    fn has_notifications(&self) -> bool;

    /// Take every reportable notification out of the queue.
    fn extract_notifications(&mut self) -> Vec<Notification>;

    /// Queue the current value regardless of the filter.
    fn resend_initial_value(&mut self, space: &dyn AddressSpace);

    fn set_monitoring_mode(&mut self, mode: MonitoringMode, space: &dyn AddressSpace, now: Instant);

    /// Stop sampling. The item reports nothing afterwards.
    fn terminate(&mut self);

    /// Drop queued notifications and release the engine-wide slot.
    fn dispose(&mut self);

    /// Next instant the item wants [`sample`](Self::sample) to be called.
    fn next_sample_at(&self) -> Option<Instant> {
        None
    }

    /// Take a sample if due. Returns `true` if a notification was queued.
    fn sample(&mut self, _now: Instant, _space: &dyn AddressSpace) -> bool {
        false
    }

    /// Forced sample on behalf of a triggering item; marks queued values reportable.
    fn trigger(&mut self, _space: &dyn AddressSpace) {}

    /// Pushed value for a node. Returns `true` if a notification was queued.
    fn on_data_change(&mut self, _node_id: &NodeId, _attribute_id: AttributeId, _value: &DataValue) -> bool {
        false
    }

    /// Raised event. Returns `true` if a notification was queued.
    fn on_event(&mut self, _event: &EventData, _space: &dyn AddressSpace) -> bool {
        false
    }

    fn modify(
        &mut self,
        _request: &MonitoredItemModifyRequest,
        _ctx: &ItemContext<'_>,
    ) -> Result<MonitoredItemModifyResult, StatusCode> {
        Err(StatusCode::BAD_NOT_SUPPORTED)
    }
}

// ============================================================================
// MONITORED ITEM
// ============================================================================

#[derive(Debug)]
enum Source {
    Data {
        filter: DataChangeFilter,
        eu_range: Option<EuRange>,
        last_value: Option<DataValue>,
    },
    Event {
        filter: EventFilter,
    },
}

/// Production monitored item.
#[derive(Debug)]
pub(crate) struct MonitoredItem {
    id: u32,
    client_handle: u32,
    node_id: NodeId,
    attribute_id: AttributeId,
    mode: MonitoringMode,
    /// Revised, in ms. 0 for event items.
    sampling_interval: f64,
    queue_size: u32,
    discard_oldest: bool,
    timestamps_to_return: TimestampsToReturn,
    source: Source,
    queue: VecDeque<Notification>,
    next_sample: Option<Instant>,
    triggered: bool,
    terminated: bool,
    permit: Option<ItemPermit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Revised {
    sampling_interval: f64,
    queue_size: u32,
}

impl MonitoredItem {
    /// Validate a create request and build the item.
    ///
    /// The caller reserves the engine-wide slot; the initial sample is taken
    /// by [`start`](Self::start).
    pub(crate) fn new(
        id: u32,
        request: &MonitoredItemCreateRequest,
        timestamps_to_return: TimestampsToReturn,
        permit: ItemPermit,
        ctx: &ItemContext<'_>,
    ) -> Result<Self, StatusCode> {
        let node = ctx
            .space
            .find_node(&request.node_id)
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        match request.attribute_id {
            AttributeId::Value if !node.is_variable() => {
                return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID)
            }
            AttributeId::EventNotifier if !node.event_notifier => {
                return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID)
            }
            _ => {}
        }
        validate_filter(&request.parameters.filter, request.attribute_id, &node)?;

        let source = match &request.parameters.filter {
            MonitoringFilter::Event(filter) => Source::Event {
                filter: filter.clone(),
            },
            MonitoringFilter::DataChange(filter) => Source::Data {
                filter: *filter,
                eu_range: node.eu_range,
                last_value: None,
            },
            MonitoringFilter::None if request.attribute_id == AttributeId::EventNotifier => {
                Source::Event {
                    filter: EventFilter::default(),
                }
            }
            MonitoringFilter::None => Source::Data {
                filter: DataChangeFilter::default(),
                eu_range: node.eu_range,
                last_value: None,
            },
        };
        let is_event = matches!(source, Source::Event { .. });
        let revised = revise(&request.parameters, is_event, ctx);

        Ok(Self {
            id,
            client_handle: request.parameters.client_handle,
            node_id: request.node_id.clone(),
            attribute_id: request.attribute_id,
            mode: request.monitoring_mode,
            sampling_interval: revised.sampling_interval,
            queue_size: revised.queue_size,
            discard_oldest: request.parameters.discard_oldest,
            timestamps_to_return,
            source,
            queue: VecDeque::new(),
            next_sample: None,
            triggered: false,
            terminated: false,
            permit: Some(permit),
        })
    }

    /// Take the initial sample and arm the sampling timer.
    pub(crate) fn start(&mut self, space: &dyn AddressSpace, now: Instant) {
        if self.mode != MonitoringMode::Disabled {
            self.sample_now(space, true);
            self.arm(now);
        }
    }

    pub(crate) fn revised_sampling_interval(&self) -> f64 {
        self.sampling_interval
    }

    pub(crate) fn revised_queue_size(&self) -> u32 {
        self.queue_size
    }

    fn is_event_item(&self) -> bool {
        matches!(self.source, Source::Event { .. })
    }

    fn arm(&mut self, now: Instant) {
        self.next_sample = match self.source {
            Source::Data { .. } if self.sampling_interval > 0.0 && !self.terminated => {
                Some(now + interval_duration(self.sampling_interval))
            }
            _ => None,
        };
    }

    fn sample_now(&mut self, space: &dyn AddressSpace, force: bool) -> bool {
        let value = space.read_value(&self.node_id, self.attribute_id);
        self.offer_value(value, force)
    }

    /// Queue `value` if it is a reportable change (or `force` is set).
    fn offer_value(&mut self, value: DataValue, force: bool) -> bool {
        let Source::Data {
            filter,
            eu_range,
            last_value,
        } = &mut self.source
        else {
            return false;
        };
        if !force && !is_data_change(filter, *eu_range, last_value.as_ref(), &value) {
            return false;
        }
        *last_value = Some(value.clone());
        let value = apply_timestamps(value, self.timestamps_to_return);
        trace!("Item {} queued value with status {}", self.id, value.status);
        self.enqueue(Notification::DataChange(MonitoredItemNotification {
            client_handle: self.client_handle,
            value,
        }));
        true
    }

    fn enqueue(&mut self, notification: Notification) {
        let capacity = self.queue_size.max(1) as usize;
        if self.queue.len() < capacity {
            self.queue.push_back(notification);
            return;
        }
        if capacity == 1 {
            self.queue.clear();
            self.queue.push_back(notification);
            return;
        }
        debug!("Item {} queue overflow (size {})", self.id, capacity);
        if self.discard_oldest {
            self.queue.pop_front();
            self.queue.push_back(notification);
            if let Some(front) = self.queue.front_mut() {
                mark_overflow(front);
            }
        } else if let Some(back) = self.queue.back_mut() {
            mark_overflow(back);
        }
    }

    fn shrink_queue(&mut self) {
        let capacity = self.queue_size.max(1) as usize;
        while self.queue.len() > capacity {
            if self.discard_oldest {
                self.queue.pop_front();
            } else {
                self.queue.pop_back();
            }
        }
    }
}

impl MonitoredItemOps for MonitoredItem {
    fn id(&self) -> u32 {
        self.id
    }

    fn monitoring_mode(&self) -> MonitoringMode {
        self.mode
    }

    fn has_notifications(&self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        match self.mode {
            MonitoringMode::Reporting => true,
            MonitoringMode::Sampling => self.triggered,
            MonitoringMode::Disabled => false,
        }
    }

    fn extract_notifications(&mut self) -> Vec<Notification> {
        if !self.has_notifications() {
            return Vec::new();
        }
        self.triggered = false;
        self.queue.drain(..).collect()
    }

    fn resend_initial_value(&mut self, space: &dyn AddressSpace) {
        if self.mode != MonitoringMode::Disabled && !self.terminated {
            self.sample_now(space, true);
        }
    }

    fn set_monitoring_mode(&mut self, mode: MonitoringMode, space: &dyn AddressSpace, now: Instant) {
        if mode == self.mode || self.terminated {
            return;
        }
        let was_disabled = self.mode == MonitoringMode::Disabled;
        debug!("Item {} monitoring mode {:?} -> {:?}", self.id, self.mode, mode);
        self.mode = mode;
        match mode {
            MonitoringMode::Disabled => {
                self.queue.clear();
                self.triggered = false;
                self.next_sample = None;
                if let Source::Data { last_value, .. } = &mut self.source {
                    *last_value = None;
                }
            }
            _ if was_disabled => {
                self.sample_now(space, true);
                self.arm(now);
            }
            _ => {}
        }
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.next_sample = None;
    }

    fn dispose(&mut self) {
        self.terminate();
        self.queue.clear();
        self.permit = None;
    }

    fn next_sample_at(&self) -> Option<Instant> {
        match self.mode {
            MonitoringMode::Disabled => None,
            _ => self.next_sample,
        }
    }

    fn sample(&mut self, now: Instant, space: &dyn AddressSpace) -> bool {
        let Some(due) = self.next_sample_at() else {
            return false;
        };
        if due > now {
            return false;
        }
        let queued = self.sample_now(space, false);
        let interval = interval_duration(self.sampling_interval);
        let mut next = due + interval;
        if next <= now {
            next = now + interval;
        }
        self.next_sample = Some(next);
        queued
    }

    fn trigger(&mut self, space: &dyn AddressSpace) {
        if self.mode != MonitoringMode::Sampling || self.terminated {
            return;
        }
        if !self.is_event_item() {
            self.sample_now(space, true);
        }
        self.triggered = !self.queue.is_empty();
    }

    fn on_data_change(&mut self, node_id: &NodeId, attribute_id: AttributeId, value: &DataValue) -> bool {
        if self.mode == MonitoringMode::Disabled
            || self.terminated
            || self.attribute_id != attribute_id
            || &self.node_id != node_id
        {
            return false;
        }
        self.offer_value(value.clone(), false)
    }

    fn on_event(&mut self, event: &EventData, space: &dyn AddressSpace) -> bool {
        if self.mode == MonitoringMode::Disabled || self.terminated {
            return false;
        }
        let Source::Event { filter } = &self.source else {
            return false;
        };
        if event.emitter != self.node_id && self.node_id != NodeId::SERVER {
            return false;
        }
        if !space.evaluate_filter(event, filter) {
            return false;
        }
        let event_fields = filter.select_clauses.iter().map(|clause| event.field(clause)).collect();
        self.enqueue(Notification::Event(EventFieldList {
            client_handle: self.client_handle,
            event_fields,
        }));
        true
    }

    fn modify(
        &mut self,
        request: &MonitoredItemModifyRequest,
        ctx: &ItemContext<'_>,
    ) -> Result<MonitoredItemModifyResult, StatusCode> {
        let parameters = &request.parameters;
        match (&parameters.filter, &mut self.source) {
            (MonitoringFilter::Event(_), Source::Data { .. }) => {
                return Err(StatusCode::BAD_FILTER_NOT_ALLOWED)
            }
            (MonitoringFilter::DataChange(_), Source::Event { .. }) => {
                return Err(StatusCode::BAD_FILTER_NOT_ALLOWED)
            }
            _ => {}
        }
        if !matches!(parameters.filter, MonitoringFilter::None) {
            let node = ctx
                .space
                .find_node(&self.node_id)
                .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
            validate_filter(&parameters.filter, self.attribute_id, &node)?;
        }

        let revised = revise(parameters, self.is_event_item(), ctx);
        match (&parameters.filter, &mut self.source) {
            (MonitoringFilter::DataChange(new), Source::Data { filter, .. }) => *filter = *new,
            (MonitoringFilter::None, Source::Data { filter, .. }) => *filter = DataChangeFilter::default(),
            (MonitoringFilter::Event(new), Source::Event { filter }) => *filter = new.clone(),
            _ => {}
        }
        self.client_handle = parameters.client_handle;
        self.discard_oldest = parameters.discard_oldest;
        self.queue_size = revised.queue_size;
        self.shrink_queue();
        if (revised.sampling_interval - self.sampling_interval).abs() > f64::EPSILON {
            self.sampling_interval = revised.sampling_interval;
            if self.mode != MonitoringMode::Disabled {
                self.arm(ctx.now);
            }
        }
        Ok(MonitoredItemModifyResult {
            status_code: StatusCode::GOOD,
            revised_sampling_interval: self.sampling_interval,
            revised_queue_size: self.queue_size,
        })
    }
}

fn revise(parameters: &MonitoringParameters, is_event: bool, ctx: &ItemContext<'_>) -> Revised {
    let config = ctx.config;
    if is_event {
        let queue_size = match parameters.queue_size {
            0 => config.default_event_queue_size,
            size => size.min(config.max_queue_size),
        };
        return Revised {
            sampling_interval: 0.0,
            queue_size,
        };
    }
    let requested = if parameters.sampling_interval.is_nan() || parameters.sampling_interval < 0.0 {
        ctx.publishing_interval
    } else {
        parameters.sampling_interval
    };
    Revised {
        sampling_interval: requested.clamp(config.min_sampling_interval, config.max_sampling_interval),
        queue_size: parameters.queue_size.clamp(1, config.max_queue_size.max(1)),
    }
}

fn interval_duration(ms: f64) -> Duration {
    Duration::from_secs_f64(ms.max(0.0) / 1000.0)
}

fn mark_overflow(notification: &mut Notification) {
    if let Notification::DataChange(item) = notification {
        item.value.status = item.value.status.with_overflow();
    }
}

fn apply_timestamps(mut value: DataValue, timestamps: TimestampsToReturn) -> DataValue {
    match timestamps {
        TimestampsToReturn::Source => value.server_timestamp = None,
        TimestampsToReturn::Server => {
            value.source_timestamp = None;
            value.server_timestamp.get_or_insert_with(SystemTime::now);
        }
        TimestampsToReturn::Both => {
            value.server_timestamp.get_or_insert_with(SystemTime::now);
        }
        TimestampsToReturn::Neither => {
            value.source_timestamp = None;
            value.server_timestamp = None;
        }
    }
    value
}
