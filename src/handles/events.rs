//! Subscription lifecycle events.
//!
//! - [`SubscriptionEvent`]: one observable step in a subscription's life
//! - [`SubscriptionEvents`]: receiver returned by
//!   [`Session::watch_subscription`](crate::handles::Session::watch_subscription)

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::runtime::subscription::SubscriptionState;
use crate::types::NotificationMessage;
use crate::SessionId;

/// Something that happened to a watched subscription.
///
/// Events are delivered best-effort: a listener that does not keep up loses
/// events rather than stalling the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The subscription state machine moved.
    StateChanged {
        from: SubscriptionState,
        to: SubscriptionState,
    },
    /// A keep-alive message was sent.
    KeepAlive { sequence_number: u32 },
    /// A data or event notification message was sent.
    Notification(NotificationMessage),
    MonitoredItemCreated {
        monitored_item_id: u32,
        client_handle: u32,
    },
    MonitoredItemDeleted { monitored_item_id: u32 },
    /// The lifetime elapsed without Publish requests.
    Expired,
    /// The subscription now belongs to another session.
    Transferred { to: SessionId },
    /// Terminal. No further events follow.
    Closed,
}

/// Stream of [`SubscriptionEvent`]s for one subscription.
///
/// Ends after [`SubscriptionEvent::Closed`] or when the engine shuts down.
///
/// ```no_run
/// use opcua_publish_engine::prelude::*;
///
/// # async fn example(session: Session, subscription_id: u32) -> Result<()> {
/// let mut events = session.watch_subscription(subscription_id).await?;
/// while let Some(event) = events.next().await {
///     if let SubscriptionEvent::StateChanged { from, to } = event {
///         println!("{from:?} -> {to:?}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SubscriptionEvents {
    subscription_id: u32,
    events: mpsc::Receiver<SubscriptionEvent>,
}

impl SubscriptionEvents {
    pub(crate) fn new(subscription_id: u32, events: mpsc::Receiver<SubscriptionEvent>) -> Self {
        Self {
            subscription_id,
            events,
        }
    }

    /// The watched subscription.
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    /// Receive the next event, or `None` once the subscription is gone.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_next(&mut self) -> Option<SubscriptionEvent> {
        self.events.try_recv().ok()
    }
}

impl Stream for SubscriptionEvents {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}
