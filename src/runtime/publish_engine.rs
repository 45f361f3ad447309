//! # Server-Side Publish Engine (Internal)
//!
//! One per session. Holds the client's outstanding Publish requests in FIFO
//! order and answers them with whatever the session's subscriptions produce.
//!
//! ```text
//!   Publish request ──▶ pending (FIFO, bounded) ──▶ oldest request answered
//!                                                    by the next message
//!   Subscription tick ─▶ send_notification_message / send_keep_alive_response
//!   Subscription closed ─▶ closed_messages ──▶ next request
//! ```
//!
//! A request whose client side has gone away (receiver dropped) is skipped
//! and never consumes a message.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::status::StatusCode;
use crate::types::{NotificationMessage, PublishResponse};

/// A queued Publish request.
#[derive(Debug)]
pub(crate) struct PendingPublish {
    pub request_handle: u32,
    pub deadline: Instant,
    /// Acknowledgement results computed when the request arrived.
    pub results: Vec<StatusCode>,
    pub responder: oneshot::Sender<PublishResponse>,
}

/// Terminal message of a subscription that no longer exists.
#[derive(Debug)]
struct ClosedMessage {
    subscription_id: u32,
    message: NotificationMessage,
}

#[derive(Debug)]
pub(crate) struct PublishEngine {
    pending: VecDeque<PendingPublish>,
    closed_messages: VecDeque<ClosedMessage>,
    max_pending: usize,
    default_timeout: Duration,
}

impl PublishEngine {
    pub(crate) fn new(max_pending: usize, default_timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            closed_messages: VecDeque::new(),
            max_pending: max_pending.max(1),
            default_timeout,
        }
    }

    /// Outstanding requests whose client is still waiting.
    pub(crate) fn pending_publish_request_count(&self) -> usize {
        self.pending.iter().filter(|p| !p.responder.is_closed()).count()
    }

    pub(crate) fn has_pending_request(&self) -> bool {
        self.pending.iter().any(|p| !p.responder.is_closed())
    }

    pub(crate) fn has_closed_messages(&self) -> bool {
        !self.closed_messages.is_empty()
    }

    /// Queue a request. At capacity, the oldest queued request is answered
    /// with `BadTooManyPublishRequests` to make room.
    pub(crate) fn enqueue(
        &mut self,
        now: Instant,
        request_handle: u32,
        timeout_hint: u32,
        results: Vec<StatusCode>,
        responder: oneshot::Sender<PublishResponse>,
    ) {
        self.pending.retain(|p| !p.responder.is_closed());
        while self.pending.len() >= self.max_pending {
            let Some(oldest) = self.pending.pop_front() else {
                break;
            };
            warn!(
                "Too many publish requests queued ({}), rejecting request {}",
                self.max_pending, oldest.request_handle
            );
            answer(oldest, StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS);
        }
        let timeout = match timeout_hint {
            0 => self.default_timeout,
            ms => Duration::from_millis(u64::from(ms)),
        };
        trace!("Publish request {} queued", request_handle);
        self.pending.push_back(PendingPublish {
            request_handle,
            deadline: now + timeout,
            results,
            responder,
        });
    }

    /// Answer the oldest live request with a data or status message.
    ///
    /// Returns `false` if no request was available.
    pub(crate) fn send_notification_message(
        &mut self,
        subscription_id: u32,
        message: NotificationMessage,
        more_notifications: bool,
        available_sequence_numbers: Vec<u32>,
    ) -> bool {
        let mut response = PublishResponse {
            request_handle: 0,
            service_result: StatusCode::GOOD,
            subscription_id,
            available_sequence_numbers,
            more_notifications,
            notification_message: message,
            results: Vec::new(),
        };
        while let Some(request) = self.pending.pop_front() {
            response.request_handle = request.request_handle;
            response.results = request.results;
            match request.responder.send(response) {
                Ok(()) => return true,
                Err(returned) => {
                    debug!("Publish request {} abandoned by client", returned.request_handle);
                    response = returned;
                }
            }
        }
        false
    }

    /// Answer the oldest live request with a keep-alive carrying the next
    /// sequence number. Returns `false` (nothing consumed) if none is waiting.
    pub(crate) fn send_keep_alive_response(
        &mut self,
        subscription_id: u32,
        sequence_number: u32,
        available_sequence_numbers: Vec<u32>,
    ) -> bool {
        if !self.has_pending_request() {
            return false;
        }
        self.send_notification_message(
            subscription_id,
            NotificationMessage::keep_alive(sequence_number),
            false,
            available_sequence_numbers,
        )
    }

    /// Keep the terminal message of a closed subscription for the next request.
    pub(crate) fn push_closed_message(&mut self, subscription_id: u32, message: NotificationMessage) {
        self.closed_messages.push_back(ClosedMessage {
            subscription_id,
            message,
        });
        self.flush_closed_messages();
    }

    /// Deliver terminal messages while requests are available.
    pub(crate) fn flush_closed_messages(&mut self) {
        while self.has_pending_request() {
            let Some(closed) = self.closed_messages.pop_front() else {
                return;
            };
            debug!(
                "Delivering terminal status {:?} of subscription {}",
                closed.message.status_change(),
                closed.subscription_id
            );
            if !self.send_notification_message(closed.subscription_id, closed.message, false, Vec::new()) {
                return;
            }
        }
    }

    /// Answer requests whose deadline has passed with `BadTimeout`.
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for request in self.pending.drain(..) {
            if request.deadline <= now {
                debug!("Publish request {} timed out", request.request_handle);
                answer(request, StatusCode::BAD_TIMEOUT);
                expired += 1;
            } else {
                kept.push_back(request);
            }
        }
        self.pending = kept;
        expired
    }

    /// Answer every queued request with `status`, in FIFO order.
    pub(crate) fn drain(&mut self, status: StatusCode) -> usize {
        let count = self.pending.len();
        for request in self.pending.drain(..) {
            answer(request, status);
        }
        if count > 0 {
            debug!("Answered {} publish requests with {}", count, status);
        }
        count
    }

    /// Drop terminal messages nobody will collect.
    pub(crate) fn clear_closed_messages(&mut self) {
        self.closed_messages.clear();
    }

    /// Earliest request deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.deadline).min()
    }
}

/// Complete a request without a message.
pub(crate) fn answer(request: PendingPublish, status: StatusCode) {
    let response = PublishResponse::fault(request.request_handle, status, request.results);
    let _ = request.responder.send(response);
}
