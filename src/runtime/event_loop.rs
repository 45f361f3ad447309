//! # Engine Event Loop
//!
//! Internal event loop that owns [`EngineState`] and applies commands.
//!
//! This module contains the `engine_task` function which is the core of the
//! engine. It runs as a background tokio task and alternates between:
//!
//! - Commands from [`ServerEngine`](crate::ServerEngine) and
//!   [`Session`](crate::Session) handles
//! - The earliest due timer: a publishing interval, a sampling interval, a
//!   Publish request timeout or a lifetime expiry
//!
//! There is no fixed ticker. The loop sleeps until
//! [`EngineState::next_deadline`] and polls the state at that instant, so a
//! paused tokio clock drives it deterministically.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Error;
use crate::runtime::{state::EngineState, Command};

// ============================================================================
// ENGINE TASK
// ============================================================================

/// The main engine task
pub(crate) async fn engine_task(mut cmd_rx: mpsc::Receiver<Command>, mut state: EngineState) {
    loop {
        let deadline = state.next_deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("All engine handles dropped, stopping");
                    state.shutdown();
                    break;
                };
                if !handle_command(cmd, &mut state) {
                    break;
                }
            }
            () = sleep_until(deadline) => {
                trace!("Engine timer fired");
                state.poll(Instant::now());
            }
        }
    }
    debug!("Engine task finished");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

/// Apply one command. Returns `false` once the engine should stop.
fn handle_command(cmd: Command, state: &mut EngineState) -> bool {
    let now = Instant::now();

    match cmd {
        Command::CreateSession { response } => {
            let _ = response.send(state.create_session().map_err(Error::Service));
        }
        Command::CloseSession {
            session,
            delete_subscriptions,
            response,
        } => {
            let result = state
                .close_session(session, delete_subscriptions)
                .map_err(Error::Service);
            match response {
                Some(response) => {
                    let _ = response.send(result);
                }
                None => {
                    if let Err(e) = result {
                        debug!("Close of dropped session {} failed: {}", session, e);
                    }
                }
            }
        }

        Command::CreateSubscription {
            session,
            request,
            response,
        } => {
            let _ = response.send(
                state
                    .create_subscription(session, &request, now)
                    .map_err(Error::Service),
            );
        }
        Command::ModifySubscription {
            session,
            request,
            response,
        } => {
            let _ = response.send(
                state
                    .modify_subscription(session, &request, now)
                    .map_err(Error::Service),
            );
        }
        Command::DeleteSubscriptions {
            session,
            subscription_ids,
            response,
        } => {
            let _ = response.send(
                state
                    .delete_subscriptions(session, &subscription_ids)
                    .map_err(Error::Service),
            );
        }
        Command::SetPublishingMode {
            session,
            publishing_enabled,
            subscription_ids,
            response,
        } => {
            let _ = response.send(
                state
                    .set_publishing_mode(session, publishing_enabled, &subscription_ids)
                    .map_err(Error::Service),
            );
        }
        Command::TransferSubscriptions {
            session,
            subscription_ids,
            send_initial_values,
            response,
        } => {
            let _ = response.send(
                state
                    .transfer_subscriptions(session, &subscription_ids, send_initial_values, now)
                    .map_err(Error::Service),
            );
        }

        Command::CreateMonitoredItems {
            session,
            subscription_id,
            timestamps_to_return,
            items,
            response,
        } => {
            let _ = response.send(
                state
                    .create_monitored_items(session, subscription_id, timestamps_to_return, &items, now)
                    .map_err(Error::Service),
            );
        }
        Command::ModifyMonitoredItems {
            session,
            subscription_id,
            items,
            response,
        } => {
            let _ = response.send(
                state
                    .modify_monitored_items(session, subscription_id, &items, now)
                    .map_err(Error::Service),
            );
        }
        Command::SetMonitoringMode {
            session,
            subscription_id,
            monitoring_mode,
            monitored_item_ids,
            response,
        } => {
            let _ = response.send(
                state
                    .set_monitoring_mode(session, subscription_id, monitoring_mode, &monitored_item_ids, now)
                    .map_err(Error::Service),
            );
        }
        Command::DeleteMonitoredItems {
            session,
            subscription_id,
            monitored_item_ids,
            response,
        } => {
            let _ = response.send(
                state
                    .delete_monitored_items(session, subscription_id, &monitored_item_ids)
                    .map_err(Error::Service),
            );
        }
        Command::SetTriggering {
            session,
            subscription_id,
            triggering_item_id,
            links_to_add,
            links_to_remove,
            response,
        } => {
            let _ = response.send(
                state
                    .set_triggering(
                        session,
                        subscription_id,
                        triggering_item_id,
                        &links_to_add,
                        &links_to_remove,
                    )
                    .map_err(Error::Service),
            );
        }
        Command::ResendData {
            session,
            subscription_id,
            response,
        } => {
            let _ = response.send(state.resend_data(session, subscription_id).map_err(Error::Service));
        }

        Command::Publish {
            session,
            request,
            response,
        } => {
            state.publish(session, request, response, now);
        }
        Command::Republish {
            session,
            subscription_id,
            retransmit_sequence_number,
            response,
        } => {
            let _ = response.send(
                state
                    .republish(session, subscription_id, retransmit_sequence_number)
                    .map_err(Error::Service),
            );
        }

        Command::RegisterReferences {
            session,
            max_references,
            references,
            response,
        } => {
            let _ = response.send(
                state
                    .register_references(session, max_references, references)
                    .map_err(Error::Service),
            );
        }
        Command::NextReferences {
            session,
            continuation_point,
            response,
        } => {
            let _ = response.send(
                state
                    .next_references(session, &continuation_point)
                    .map_err(Error::Service),
            );
        }
        Command::ReleaseContinuationPoint {
            session,
            continuation_point,
            response,
        } => {
            let _ = response.send(
                state
                    .release_continuation_point(session, &continuation_point)
                    .map_err(Error::Service),
            );
        }

        Command::NotifyDataChange {
            node_id,
            attribute_id,
            value,
        } => {
            state.notify_data_change(&node_id, attribute_id, &value);
        }
        Command::RaiseEvent { event } => {
            state.raise_event(&event);
        }

        Command::WatchSubscription {
            session,
            subscription_id,
            response,
        } => {
            let _ = response.send(
                state
                    .watch_subscription(session, subscription_id)
                    .map_err(Error::Service),
            );
        }
        Command::Diagnostics { response } => {
            let _ = response.send(state.diagnostics());
        }
        Command::Shutdown { response } => {
            state.shutdown();
            let _ = response.send(());
            return false;
        }
    }

    true
}
