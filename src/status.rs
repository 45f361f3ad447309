//! # OPC-UA Status Codes
//!
//! Every service outcome in this crate is reported as a [`StatusCode`], a thin
//! wrapper around the 32-bit code defined by OPC-UA Part 4 / Part 6.
//!
//! ## Layout
//!
//! | Bits | Meaning |
//! |------|---------|
//! | 31-30 | Severity: `00` Good, `01` Uncertain, `10` Bad |
//! | 29-16 | Sub-code (the name, e.g. `BadTimeout`) |
//! | 15-0 | Info bits (e.g. the DataValue overflow flag) |
//!
//! Only the codes used by the subscription and publish services are named
//! here. Comparisons between codes ignore nothing: use [`StatusCode::sub_code`]
//! when the info bits should not matter.

use std::fmt;

/// OPC-UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(u32);

const SEVERITY_MASK: u32 = 0xC000_0000;
const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
const SEVERITY_BAD: u32 = 0x8000_0000;
const SUB_CODE_MASK: u32 = 0xFFFF_0000;

/// InfoType = DataValue (bit 10) together with the Overflow bit (bit 7).
const INFO_OVERFLOW: u32 = 0x0000_0480;

macro_rules! status_codes {
    ($($(#[$doc:meta])* $name:ident = $value:literal, $text:literal;)+) => {
        impl StatusCode {
            $(
                $(#[$doc])*
                pub const $name: Self = Self($value);
            )+

            /// Symbolic name of the sub-code, if it is one this crate knows.
            pub fn name(&self) -> Option<&'static str> {
                match self.sub_code().0 {
                    $($value => Some($text),)+
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    /// The operation succeeded.
    GOOD = 0x0000_0000, "Good";
    /// The subscription was transferred to another session.
    GOOD_SUBSCRIPTION_TRANSFERRED = 0x002D_0000, "GoodSubscriptionTransferred";
    /// An unexpected error occurred.
    BAD_UNEXPECTED_ERROR = 0x8001_0000, "BadUnexpectedError";
    /// An internal error occurred as a result of a programming or configuration error.
    BAD_INTERNAL_ERROR = 0x8002_0000, "BadInternalError";
    /// The operation timed out.
    BAD_TIMEOUT = 0x800A_0000, "BadTimeout";
    /// The server is shutting down.
    BAD_SHUTDOWN = 0x800C_0000, "BadShutdown";
    /// There was nothing to do because the client passed a list of operations with no elements.
    BAD_NOTHING_TO_DO = 0x800F_0000, "BadNothingToDo";
    /// The session id is not valid.
    BAD_SESSION_ID_INVALID = 0x8025_0000, "BadSessionIdInvalid";
    /// The session was closed by the client.
    BAD_SESSION_CLOSED = 0x8026_0000, "BadSessionClosed";
    /// The subscription id is not valid.
    BAD_SUBSCRIPTION_ID_INVALID = 0x8028_0000, "BadSubscriptionIdInvalid";
    /// The timestamps to return parameter is invalid.
    BAD_TIMESTAMPS_TO_RETURN_INVALID = 0x802B_0000, "BadTimestampsToReturnInvalid";
    /// Waiting for the server to obtain values from the underlying data source.
    BAD_WAITING_FOR_INITIAL_DATA = 0x8032_0000, "BadWaitingForInitialData";
    /// The node id refers to a node that does not exist in the server address space.
    BAD_NODE_ID_UNKNOWN = 0x8034_0000, "BadNodeIdUnknown";
    /// The attribute is not supported for the specified node.
    BAD_ATTRIBUTE_ID_INVALID = 0x8035_0000, "BadAttributeIdInvalid";
    /// The requested operation is not supported.
    BAD_NOT_SUPPORTED = 0x803D_0000, "BadNotSupported";
    /// The monitoring mode is invalid.
    BAD_MONITORING_MODE_INVALID = 0x8041_0000, "BadMonitoringModeInvalid";
    /// The monitored item id does not refer to a valid monitored item.
    BAD_MONITORED_ITEM_ID_INVALID = 0x8042_0000, "BadMonitoredItemIdInvalid";
    /// The monitored item filter parameter is not valid.
    BAD_MONITORED_ITEM_FILTER_INVALID = 0x8043_0000, "BadMonitoredItemFilterInvalid";
    /// The server does not support the requested monitored item filter.
    BAD_MONITORED_ITEM_FILTER_UNSUPPORTED = 0x8044_0000, "BadMonitoredItemFilterUnsupported";
    /// A monitoring filter cannot be used in combination with the attribute specified.
    BAD_FILTER_NOT_ALLOWED = 0x8045_0000, "BadFilterNotAllowed";
    /// The event filter is not valid.
    BAD_EVENT_FILTER_INVALID = 0x8047_0000, "BadEventFilterInvalid";
    /// The continuation point provided is longer valid.
    BAD_CONTINUATION_POINT_INVALID = 0x804A_0000, "BadContinuationPointInvalid";
    /// The operation could not be processed because all continuation points have been allocated.
    BAD_NO_CONTINUATION_POINTS = 0x804B_0000, "BadNoContinuationPoints";
    /// The server has reached its maximum number of sessions.
    BAD_TOO_MANY_SESSIONS = 0x8056_0000, "BadTooManySessions";
    /// The server has reached its maximum number of subscriptions.
    BAD_TOO_MANY_SUBSCRIPTIONS = 0x8077_0000, "BadTooManySubscriptions";
    /// The server has reached the maximum number of queued publish requests.
    BAD_TOO_MANY_PUBLISH_REQUESTS = 0x8078_0000, "BadTooManyPublishRequests";
    /// There is no subscription available for this session.
    BAD_NO_SUBSCRIPTION = 0x8079_0000, "BadNoSubscription";
    /// The sequence number is unknown to the server.
    BAD_SEQUENCE_NUMBER_UNKNOWN = 0x807A_0000, "BadSequenceNumberUnknown";
    /// The requested notification message is no longer available.
    BAD_MESSAGE_NOT_AVAILABLE = 0x807B_0000, "BadMessageNotAvailable";
    /// The deadband filter is not valid.
    BAD_DEADBAND_FILTER_INVALID = 0x808E_0000, "BadDeadbandFilterInvalid";
    /// The request could not be processed because there are too many monitored items in the subscription.
    BAD_TOO_MANY_MONITORED_ITEMS = 0x80DB_0000, "BadTooManyMonitoredItems";
}

impl StatusCode {
    /// Wrap a raw 32-bit code.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw 32-bit code, info bits included.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// The code with all info bits cleared.
    pub const fn sub_code(&self) -> Self {
        Self(self.0 & SUB_CODE_MASK)
    }

    pub const fn is_good(&self) -> bool {
        self.0 & SEVERITY_MASK == 0
    }

    pub const fn is_uncertain(&self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_UNCERTAIN
    }

    pub const fn is_bad(&self) -> bool {
        self.0 & SEVERITY_BAD != 0
    }

    /// Set the DataValue overflow info bits.
    #[must_use]
    pub const fn with_overflow(self) -> Self {
        Self(self.0 | INFO_OVERFLOW)
    }

    /// Check whether the DataValue overflow info bits are set.
    pub const fn has_overflow(&self) -> bool {
        self.0 & INFO_OVERFLOW == INFO_OVERFLOW
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) if self.0 & !SUB_CODE_MASK == 0 => write!(f, "{name}"),
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}
