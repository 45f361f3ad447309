//! # Protocol Data Types
//!
//! Plain data structures exchanged with the subscription and publish services.
//! They mirror the OPC-UA Part 4 request/response structures closely enough
//! that a protocol adapter can map its decoded messages onto them field by
//! field. Encoding is not part of this crate.
//!
//! | Group | Types |
//! |-------|-------|
//! | Addressing | [`NodeId`], [`AttributeId`] |
//! | Values | [`Variant`], [`DataType`], [`DataValue`], [`LocalizedText`] |
//! | Filters | [`MonitoringFilter`], [`DataChangeFilter`], [`EventFilter`] |
//! | MonitoredItem services | [`MonitoredItemCreateRequest`], [`MonitoredItemModifyRequest`], results |
//! | Subscription services | [`CreateSubscriptionRequest`], [`ModifySubscriptionRequest`], responses |
//! | Publish | [`PublishRequest`], [`PublishResponse`], [`NotificationMessage`] |
//! | Events | [`EventData`] |

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;

use crate::status::StatusCode;

// ============================================================================
// ADDRESSING
// ============================================================================

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid([u8; 16]),
    Opaque(Bytes),
}

/// OPC-UA node identifier: namespace index plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    /// The `Server` object (`i=2253`), the default event notifier.
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);

    pub const fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(id),
        }
    }

    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(id.into()),
        }
    }

    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(id) => write!(f, "i={id}"),
            Identifier::String(id) => write!(f, "s={id}"),
            Identifier::Guid(id) => {
                write!(f, "g=")?;
                for byte in id {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Identifier::Opaque(id) => write!(f, "b=<{} bytes>", id.len()),
        }
    }
}

/// Node attribute identifiers (OPC-UA Part 6, `AttributeIds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    WriteMask = 6,
    UserWriteMask = 7,
    IsAbstract = 8,
    Symmetric = 9,
    InverseName = 10,
    ContainsNoLoops = 11,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    ArrayDimensions = 16,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
    Historizing = 20,
    Executable = 21,
    UserExecutable = 22,
}

impl AttributeId {
    pub fn from_u32(value: u32) -> Option<Self> {
        let id = match value {
            1 => Self::NodeId,
            2 => Self::NodeClass,
            3 => Self::BrowseName,
            4 => Self::DisplayName,
            5 => Self::Description,
            6 => Self::WriteMask,
            7 => Self::UserWriteMask,
            8 => Self::IsAbstract,
            9 => Self::Symmetric,
            10 => Self::InverseName,
            11 => Self::ContainsNoLoops,
            12 => Self::EventNotifier,
            13 => Self::Value,
            14 => Self::DataType,
            15 => Self::ValueRank,
            16 => Self::ArrayDimensions,
            17 => Self::AccessLevel,
            18 => Self::UserAccessLevel,
            19 => Self::MinimumSamplingInterval,
            20 => Self::Historizing,
            21 => Self::Executable,
            22 => Self::UserExecutable,
            _ => return None,
        };
        Some(id)
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// Built-in data types relevant to monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    ByteString,
    LocalizedText,
    StatusCode,
    NodeId,
    /// `BaseDataType`: any value is accepted.
    Variant,
}

impl DataType {
    /// Numeric types are the only ones a deadband can be applied to.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Float
                | Self::Double
        )
    }
}

/// Human readable text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

/// A value of any built-in type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(SystemTime),
    ByteString(Bytes),
    LocalizedText(LocalizedText),
    StatusCode(StatusCode),
    NodeId(Box<NodeId>),
    Array(Vec<Variant>),
}

impl Variant {
    /// Numeric value as `f64`, for deadband arithmetic.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::SByte(v) => f64::from(*v),
            Self::Byte(v) => f64::from(*v),
            Self::Int16(v) => f64::from(*v),
            Self::UInt16(v) => f64::from(*v),
            Self::Int32(v) => f64::from(*v),
            Self::UInt32(v) => f64::from(*v),
            Self::Int64(v) => *v as f64,
            Self::UInt64(v) => *v as f64,
            Self::Float(v) => f64::from(*v),
            Self::Double(v) => *v,
            _ => return None,
        };
        Some(value)
    }

    /// The built-in type of a scalar value. Arrays report their element type.
    pub fn data_type(&self) -> Option<DataType> {
        let data_type = match self {
            Self::Empty => return None,
            Self::Boolean(_) => DataType::Boolean,
            Self::SByte(_) => DataType::SByte,
            Self::Byte(_) => DataType::Byte,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::DateTime(_) => DataType::DateTime,
            Self::ByteString(_) => DataType::ByteString,
            Self::LocalizedText(_) => DataType::LocalizedText,
            Self::StatusCode(_) => DataType::StatusCode,
            Self::NodeId(_) => DataType::NodeId,
            Self::Array(values) => return values.first().and_then(Variant::data_type),
        };
        Some(data_type)
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A value with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<SystemTime>,
    pub server_timestamp: Option<SystemTime>,
}

impl DataValue {
    /// A good value stamped with the current time as source timestamp.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(SystemTime::now()),
            server_timestamp: None,
        }
    }

    /// A value-less result carrying only a status.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            value: Variant::Empty,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

/// Which timestamps the server returns with monitored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampsToReturn {
    Source,
    Server,
    #[default]
    Both,
    Neither,
}

// ============================================================================
// FILTERS
// ============================================================================

/// Monitoring mode of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MonitoringMode {
    /// No sampling, no reporting.
    Disabled,
    /// Sampling and queueing, reported only when triggered.
    Sampling,
    /// Sampling, queueing and reporting.
    #[default]
    Reporting,
}

/// What constitutes a data change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataChangeTrigger {
    Status,
    #[default]
    StatusValue,
    StatusValueTimestamp,
}

/// Deadband applied to numeric value changes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DeadbandType {
    #[default]
    None,
    /// Report when the absolute change exceeds the given value.
    Absolute(f64),
    /// Report when the change exceeds the given percentage (0-100) of the EURange.
    Percent(f64),
}

impl DeadbandType {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataChangeFilter {
    pub trigger: DataChangeTrigger,
    pub deadband: DeadbandType,
}

/// Reference to an event field by browse path from the event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleAttributeOperand {
    pub type_definition_id: NodeId,
    pub browse_path: Vec<String>,
}

impl SimpleAttributeOperand {
    /// Operand for a field of `BaseEventType` (e.g. `"Message"`, `"Severity"`).
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            type_definition_id: NodeId::numeric(0, 2041),
            browse_path: vec![name.into()],
        }
    }

    /// The browse path joined with `/`, as used to look up [`EventData`] fields.
    pub fn path(&self) -> String {
        self.browse_path.join("/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    IsNull,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Not,
    And,
    Or,
    OfType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperand {
    Literal(Variant),
    Attribute(SimpleAttributeOperand),
    /// Index of another element of the same content filter.
    Element(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentFilterElement {
    pub operator: FilterOperator,
    pub operands: Vec<FilterOperand>,
}

/// Event filter: the fields to return and the where clause selecting events.
///
/// The where clause is opaque to the engine; it is handed to
/// [`AddressSpace::evaluate_filter`](crate::address_space::AddressSpace::evaluate_filter).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFilter {
    pub select_clauses: Vec<SimpleAttributeOperand>,
    pub where_clause: Vec<ContentFilterElement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MonitoringFilter {
    #[default]
    None,
    DataChange(DataChangeFilter),
    Event(EventFilter),
}

// ============================================================================
// MONITORED ITEM SERVICES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    /// Milliseconds. Negative selects the publishing interval.
    pub sampling_interval: f64,
    pub filter: MonitoringFilter,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            client_handle: 0,
            sampling_interval: -1.0,
            filter: MonitoringFilter::None,
            queue_size: 1,
            discard_oldest: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateRequest {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
    pub monitoring_mode: MonitoringMode,
    pub parameters: MonitoringParameters,
}

impl MonitoredItemCreateRequest {
    /// Report changes of the `Value` attribute of `node_id` with default parameters.
    pub fn value(node_id: NodeId, client_handle: u32) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
            monitoring_mode: MonitoringMode::Reporting,
            parameters: MonitoringParameters {
                client_handle,
                ..MonitoringParameters::default()
            },
        }
    }

    /// Report events emitted by `node_id`.
    pub fn events(node_id: NodeId, client_handle: u32, filter: EventFilter) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::EventNotifier,
            monitoring_mode: MonitoringMode::Reporting,
            parameters: MonitoringParameters {
                client_handle,
                sampling_interval: 0.0,
                filter: MonitoringFilter::Event(filter),
                queue_size: 0,
                discard_oldest: true,
            },
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MonitoringMode) -> Self {
        self.monitoring_mode = mode;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: MonitoringFilter) -> Self {
        self.parameters.filter = filter;
        self
    }

    #[must_use]
    pub fn with_sampling_interval(mut self, interval_ms: f64) -> Self {
        self.parameters.sampling_interval = interval_ms;
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue_size: u32, discard_oldest: bool) -> Self {
        self.parameters.queue_size = queue_size;
        self.parameters.discard_oldest = discard_oldest;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

impl MonitoredItemCreateResult {
    pub(crate) fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            monitored_item_id: 0,
            revised_sampling_interval: 0.0,
            revised_queue_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemModifyRequest {
    pub monitored_item_id: u32,
    pub parameters: MonitoringParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemModifyResult {
    pub status_code: StatusCode,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

impl MonitoredItemModifyResult {
    pub(crate) fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            revised_sampling_interval: 0.0,
            revised_queue_size: 0,
        }
    }
}

/// Per-link outcome of `SetTriggering`, aligned with the request lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTriggeringResponse {
    pub status_code: StatusCode,
    pub add_results: Vec<StatusCode>,
    pub remove_results: Vec<StatusCode>,
}

// ============================================================================
// SUBSCRIPTION SERVICES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionRequest {
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

impl Default for CreateSubscriptionRequest {
    fn default() -> Self {
        Self {
            requested_publishing_interval: 1000.0,
            requested_lifetime_count: 60,
            requested_max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: u32,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifySubscriptionRequest {
    pub subscription_id: u32,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifySubscriptionResponse {
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub status_code: StatusCode,
    pub available_sequence_numbers: Vec<u32>,
}

// ============================================================================
// NOTIFICATIONS AND PUBLISH
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventFieldList {
    pub client_handle: u32,
    pub event_fields: Vec<Variant>,
}

/// One notification produced by a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DataChange(MonitoredItemNotification),
    Event(EventFieldList),
}

/// Content of a [`NotificationMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationData {
    DataChange(Vec<MonitoredItemNotification>),
    Events(Vec<EventFieldList>),
    StatusChange(StatusCode),
}

/// A message delivered in a Publish response. Keep-alives have no data.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: SystemTime,
    pub notification_data: Vec<NotificationData>,
}

impl NotificationMessage {
    pub(crate) fn keep_alive(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            publish_time: SystemTime::now(),
            notification_data: Vec::new(),
        }
    }

    pub(crate) fn for_status(sequence_number: u32, status: StatusCode) -> Self {
        Self {
            sequence_number,
            publish_time: SystemTime::now(),
            notification_data: vec![NotificationData::StatusChange(status)],
        }
    }

    /// Build a data message, grouping data changes and events.
    pub(crate) fn from_notifications(sequence_number: u32, notifications: Vec<Notification>) -> Self {
        let mut data_changes = Vec::new();
        let mut events = Vec::new();
        for notification in notifications {
            match notification {
                Notification::DataChange(n) => data_changes.push(n),
                Notification::Event(e) => events.push(e),
            }
        }
        let mut notification_data = Vec::with_capacity(2);
        if !data_changes.is_empty() {
            notification_data.push(NotificationData::DataChange(data_changes));
        }
        if !events.is_empty() {
            notification_data.push(NotificationData::Events(events));
        }
        Self {
            sequence_number,
            publish_time: SystemTime::now(),
            notification_data,
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }

    /// The status carried by a `StatusChangeNotification`, if this message is one.
    pub fn status_change(&self) -> Option<StatusCode> {
        self.notification_data.iter().find_map(|data| match data {
            NotificationData::StatusChange(status) => Some(*status),
            _ => None,
        })
    }

    pub fn data_changes(&self) -> impl Iterator<Item = &MonitoredItemNotification> {
        self.notification_data
            .iter()
            .filter_map(|data| match data {
                NotificationData::DataChange(items) => Some(items.iter()),
                _ => None,
            })
            .flatten()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventFieldList> {
        self.notification_data
            .iter()
            .filter_map(|data| match data {
                NotificationData::Events(events) => Some(events.iter()),
                _ => None,
            })
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishRequest {
    /// Opaque handle echoed in the response.
    pub request_handle: u32,
    /// Milliseconds the client is willing to wait; 0 uses the server default.
    pub timeout_hint: u32,
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishResponse {
    pub request_handle: u32,
    /// `Good` when a message is delivered, otherwise the reason the request
    /// was completed without one (`BadTimeout`, `BadNoSubscription`, ...).
    pub service_result: StatusCode,
    pub subscription_id: u32,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    pub results: Vec<StatusCode>,
}

impl PublishResponse {
    pub(crate) fn fault(request_handle: u32, service_result: StatusCode, results: Vec<StatusCode>) -> Self {
        Self {
            request_handle,
            service_result,
            subscription_id: 0,
            available_sequence_numbers: Vec::new(),
            more_notifications: false,
            notification_message: NotificationMessage::keep_alive(0),
            results,
        }
    }
}

// ============================================================================
// EVENTS AND BROWSE RESULTS
// ============================================================================

/// An event raised in the address space.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// The notifier the event is emitted on.
    pub emitter: NodeId,
    pub event_type: NodeId,
    /// Field values keyed by browse path (`"Message"`, `"Severity"`, ...).
    pub fields: HashMap<String, Variant>,
}

impl EventData {
    pub fn new(emitter: NodeId, event_type: NodeId) -> Self {
        Self {
            emitter,
            event_type,
            fields: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, path: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.fields.insert(path.into(), value.into());
        self
    }

    /// Value of a selected field; unknown fields are `Empty`.
    pub fn field(&self, operand: &SimpleAttributeOperand) -> Variant {
        match operand.path().as_str() {
            "EventType" => Variant::NodeId(Box::new(self.event_type.clone())),
            "SourceNode" => Variant::NodeId(Box::new(self.emitter.clone())),
            path => self.fields.get(path).cloned().unwrap_or_default(),
        }
    }
}

/// Reference returned by browse-like services and paged through
/// continuation points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceDescription {
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub node_id: NodeId,
    pub browse_name: String,
}
