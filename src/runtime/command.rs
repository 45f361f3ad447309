//! # Commands (Internal)
//!
//! This module defines the [`Command`] enum used for communication between
//! the user-facing handles and the engine's event loop.
//!
//! ## Design Pattern
//!
//! Handles never touch engine state. They send [`Command`] messages through
//! an MPSC channel to the engine task, which applies them one at a time:
//!
//! ```text
//! ┌─────────────────┐      Command channel      ┌─────────────────┐
//! │  ServerEngine   │ ───────────────────────▶ │     Engine      │
//! │    Session      │   cmd_tx.send(Command)   │   Event Loop    │
//! └─────────────────┘                          └─────────────────┘
//!          ▲                                            │
//!          └──────────── oneshot response ──────────────┘
//! ```
//!
//! ## Command Categories
//!
//! | Category | Commands | Description |
//! |----------|----------|-------------|
//! | Session | `CreateSession`, `CloseSession` | Session lifecycle |
//! | Subscription | `CreateSubscription`, `ModifySubscription`, `DeleteSubscriptions`, `SetPublishingMode`, `TransferSubscriptions` | Subscription service set |
//! | Monitored items | `CreateMonitoredItems`, `ModifyMonitoredItems`, `SetMonitoringMode`, `DeleteMonitoredItems`, `SetTriggering`, `ResendData` | Monitored item service set |
//! | Publish | `Publish`, `Republish` | Notification delivery |
//! | Browse paging | `RegisterReferences`, `NextReferences`, `ReleaseContinuationPoint` | Continuation points |
//! | Data sources | `NotifyDataChange`, `RaiseEvent` | Fire-and-forget input from the server |
//! | Engine | `WatchSubscription`, `Diagnostics`, `Shutdown` | Observability and lifecycle |
//!
//! ## Response Pattern
//!
//! Commands that need a response carry a `oneshot::Sender<Result<T>>`.
//! `Publish` is the exception: its faults travel inside the
//! [`PublishResponse`], so its sender carries the response directly.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::continuation::Page;
use crate::error::Result;
use crate::handles::events::SubscriptionEvent;
use crate::runtime::state::EngineDiagnostics;
use crate::status::StatusCode;
use crate::types::{
    AttributeId, CreateSubscriptionRequest, CreateSubscriptionResponse, DataValue, EventData,
    ModifySubscriptionRequest, ModifySubscriptionResponse, MonitoredItemCreateRequest,
    MonitoredItemCreateResult, MonitoredItemModifyRequest, MonitoredItemModifyResult, MonitoringMode,
    NodeId, NotificationMessage, PublishRequest, PublishResponse, ReferenceDescription,
    SetTriggeringResponse, TimestampsToReturn, TransferResult,
};
use crate::SessionId;

/// Commands sent from handles to the engine task
#[derive(Debug)]
pub(crate) enum Command {
    CreateSession {
        response: oneshot::Sender<Result<SessionId>>,
    },
    /// `response` is `None` when sent from a handle's `Drop`.
    CloseSession {
        session: SessionId,
        delete_subscriptions: bool,
        response: Option<oneshot::Sender<Result<()>>>,
    },

    CreateSubscription {
        session: SessionId,
        request: CreateSubscriptionRequest,
        response: oneshot::Sender<Result<CreateSubscriptionResponse>>,
    },
    ModifySubscription {
        session: SessionId,
        request: ModifySubscriptionRequest,
        response: oneshot::Sender<Result<ModifySubscriptionResponse>>,
    },
    DeleteSubscriptions {
        session: SessionId,
        subscription_ids: Vec<u32>,
        response: oneshot::Sender<Result<Vec<StatusCode>>>,
    },
    SetPublishingMode {
        session: SessionId,
        publishing_enabled: bool,
        subscription_ids: Vec<u32>,
        response: oneshot::Sender<Result<Vec<StatusCode>>>,
    },
    TransferSubscriptions {
        session: SessionId,
        subscription_ids: Vec<u32>,
        send_initial_values: bool,
        response: oneshot::Sender<Result<Vec<TransferResult>>>,
    },

    CreateMonitoredItems {
        session: SessionId,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items: Vec<MonitoredItemCreateRequest>,
        response: oneshot::Sender<Result<Vec<MonitoredItemCreateResult>>>,
    },
    ModifyMonitoredItems {
        session: SessionId,
        subscription_id: u32,
        items: Vec<MonitoredItemModifyRequest>,
        response: oneshot::Sender<Result<Vec<MonitoredItemModifyResult>>>,
    },
    SetMonitoringMode {
        session: SessionId,
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        monitored_item_ids: Vec<u32>,
        response: oneshot::Sender<Result<Vec<StatusCode>>>,
    },
    DeleteMonitoredItems {
        session: SessionId,
        subscription_id: u32,
        monitored_item_ids: Vec<u32>,
        response: oneshot::Sender<Result<Vec<StatusCode>>>,
    },
    SetTriggering {
        session: SessionId,
        subscription_id: u32,
        triggering_item_id: u32,
        links_to_add: Vec<u32>,
        links_to_remove: Vec<u32>,
        response: oneshot::Sender<Result<SetTriggeringResponse>>,
    },
    ResendData {
        session: SessionId,
        subscription_id: u32,
        response: oneshot::Sender<Result<()>>,
    },

    Publish {
        session: SessionId,
        request: PublishRequest,
        response: oneshot::Sender<PublishResponse>,
    },
    Republish {
        session: SessionId,
        subscription_id: u32,
        retransmit_sequence_number: u32,
        response: oneshot::Sender<Result<NotificationMessage>>,
    },

    RegisterReferences {
        session: SessionId,
        max_references: u32,
        references: Vec<ReferenceDescription>,
        response: oneshot::Sender<Result<Page<ReferenceDescription>>>,
    },
    NextReferences {
        session: SessionId,
        continuation_point: Bytes,
        response: oneshot::Sender<Result<Page<ReferenceDescription>>>,
    },
    ReleaseContinuationPoint {
        session: SessionId,
        continuation_point: Bytes,
        response: oneshot::Sender<Result<()>>,
    },

    NotifyDataChange {
        node_id: NodeId,
        attribute_id: AttributeId,
        value: DataValue,
    },
    RaiseEvent {
        event: EventData,
    },

    WatchSubscription {
        session: SessionId,
        subscription_id: u32,
        response: oneshot::Sender<Result<mpsc::Receiver<SubscriptionEvent>>>,
    },
    Diagnostics {
        response: oneshot::Sender<EngineDiagnostics>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}
