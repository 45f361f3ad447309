//! Publish queue behavior: faults, timeouts, acknowledgements and republish.

use opcua_publish_engine::prelude::*;
use tokio::time::Instant;

use crate::helpers::{self, assert_elapsed, TEMPERATURE};

#[test_log::test(tokio::test(start_paused = true))]
async fn publish_without_subscription_fails_immediately() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();

    let start = Instant::now();
    let response = session
        .publish(PublishRequest {
            request_handle: 42,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_elapsed(start, 0);
    assert_eq!(response.request_handle, 42);
    assert_eq!(response.service_result, StatusCode::BAD_NO_SUBSCRIPTION);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn timeout_hint_expires_a_waiting_request() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&session).await;

    let start = Instant::now();
    let response = session
        .publish(PublishRequest {
            timeout_hint: 500,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_elapsed(start, 500);
    assert_eq!(response.service_result, StatusCode::BAD_TIMEOUT);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn queue_overflow_rejects_the_oldest_request() {
    let fixture = helpers::start_with(opcua_publish_engine::configure().max_publish_requests_per_session(2)).await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let first = session
        .send_publish(PublishRequest {
            request_handle: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    let second = session
        .send_publish(PublishRequest {
            request_handle: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    let _third = session
        .send_publish(PublishRequest {
            request_handle: 3,
            ..Default::default()
        })
        .await
        .unwrap();

    let rejected = first.await.unwrap();
    assert_eq!(rejected.request_handle, 1);
    assert_eq!(rejected.service_result, StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS);

    let served = second.await.unwrap();
    assert_eq!(served.request_handle, 2);
    assert_eq!(served.subscription_id, subscription_id);
    assert!(served.notification_message.is_keep_alive());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn deleting_the_last_subscription_answers_every_pending_request() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(session.send_publish(PublishRequest::default()).await.unwrap());
    }
    let results = session.delete_subscriptions(&[subscription_id]).await.unwrap();
    assert_eq!(results, vec![StatusCode::GOOD]);

    for request in pending {
        let response = request.await.unwrap();
        assert_eq!(response.service_result, StatusCode::BAD_NO_SUBSCRIPTION);
    }
    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.pending_publish_request_count, 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn deleting_one_of_two_subscriptions_keeps_requests_queued() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let deleted = helpers::subscribe(&session).await;
    let remaining = helpers::subscribe(&session).await;

    let start = Instant::now();
    let first = session.send_publish(PublishRequest::default()).await.unwrap();
    let _second = session.send_publish(PublishRequest::default()).await.unwrap();
    let results = session.delete_subscriptions(&[deleted]).await.unwrap();
    assert_eq!(results, vec![StatusCode::GOOD]);

    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.pending_publish_request_count, 2);

    let response = first.await.unwrap();
    assert_elapsed(start, 1000);
    assert_eq!(response.service_result, StatusCode::GOOD);
    assert_eq!(response.subscription_id, remaining);
    assert!(response.notification_message.is_keep_alive());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn abandoned_requests_are_skipped() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&session).await;

    let abandoned = session
        .send_publish(PublishRequest {
            request_handle: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    drop(abandoned);

    let response = session
        .publish(PublishRequest {
            request_handle: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.request_handle, 2);
    assert!(response.notification_message.is_keep_alive());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn acknowledged_messages_can_no_longer_be_republished() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;

    let data = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(data.notification_message.sequence_number, 1);
    assert_eq!(data.available_sequence_numbers, vec![1]);

    let again = session.republish(subscription_id, 1).await.unwrap();
    assert_eq!(again, data.notification_message);

    let acked = session
        .publish(helpers::acknowledge(subscription_id, 1))
        .await
        .unwrap();
    assert_eq!(acked.results, vec![StatusCode::GOOD]);
    assert!(acked.notification_message.is_keep_alive());
    assert_eq!(acked.notification_message.sequence_number, 2);
    assert!(acked.available_sequence_numbers.is_empty());

    assert_eq!(
        session.republish(subscription_id, 1).await.unwrap_err(),
        Error::Service(StatusCode::BAD_MESSAGE_NOT_AVAILABLE)
    );

    let mut request = helpers::acknowledge(subscription_id, 1);
    request.subscription_acknowledgements.push(SubscriptionAcknowledgement {
        subscription_id: 999,
        sequence_number: 1,
    });
    let response = session.publish(request).await.unwrap();
    assert_eq!(
        response.results,
        vec![StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN, StatusCode::BAD_SUBSCRIPTION_ID_INVALID]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn republish_of_unknown_subscription_fails() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();

    assert_eq!(
        session.republish(7, 1).await.unwrap_err(),
        Error::Service(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn large_batches_are_split_across_requests() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe_with(
        &session,
        CreateSubscriptionRequest {
            max_notifications_per_publish: 2,
            ..Default::default()
        },
    )
    .await;
    let items = [
        helpers::TEMPERATURE,
        helpers::PRESSURE,
        helpers::FLAG,
        helpers::NAME,
        helpers::LABEL,
    ]
    .into_iter()
    .zip(1..)
    .map(|(node, handle)| MonitoredItemCreateRequest::value(node, handle))
    .collect();
    session
        .create_monitored_items(subscription_id, TimestampsToReturn::Neither, items)
        .await
        .unwrap();

    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(session.send_publish(PublishRequest::default()).await.unwrap());
    }
    let mut responses = Vec::new();
    for request in pending {
        responses.push(request.await.unwrap());
    }

    let sizes: Vec<usize> = responses
        .iter()
        .map(|r| r.notification_message.data_changes().count())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let sequence_numbers: Vec<u32> = responses
        .iter()
        .map(|r| r.notification_message.sequence_number)
        .collect();
    assert_eq!(sequence_numbers, vec![1, 2, 3]);
    let more: Vec<bool> = responses.iter().map(|r| r.more_notifications).collect();
    assert_eq!(more, vec![true, true, false]);
}
