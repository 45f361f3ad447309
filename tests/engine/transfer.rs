//! Orphaned subscriptions and TransferSubscriptions.

use std::time::Duration;

use opcua_publish_engine::prelude::*;

use crate::helpers::{self, TEMPERATURE};

fn short_lived() -> CreateSubscriptionRequest {
    CreateSubscriptionRequest {
        requested_publishing_interval: 100.0,
        requested_lifetime_count: 3,
        requested_max_keep_alive_count: 1,
        ..Default::default()
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn transfer_notifies_the_source_session() {
    let fixture = helpers::start().await;
    let source = fixture.engine.create_session().await.unwrap();
    let target = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&source).await;

    let first = source.send_publish(PublishRequest::default()).await.unwrap();
    let second = source.send_publish(PublishRequest::default()).await.unwrap();

    let results = target
        .transfer_subscriptions(&[subscription_id], false)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status_code, StatusCode::GOOD);

    let transferred = first.await.unwrap();
    assert_eq!(transferred.service_result, StatusCode::GOOD);
    assert_eq!(transferred.subscription_id, subscription_id);
    assert_eq!(
        transferred.notification_message.status_change(),
        Some(StatusCode::GOOD_SUBSCRIPTION_TRANSFERRED)
    );
    assert_eq!(transferred.notification_message.sequence_number, 1);
    assert_eq!(second.await.unwrap().service_result, StatusCode::BAD_NO_SUBSCRIPTION);

    // The status message used sequence number 1.
    let keep_alive = target.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(keep_alive.subscription_id, subscription_id);
    assert!(keep_alive.notification_message.is_keep_alive());
    assert_eq!(keep_alive.notification_message.sequence_number, 2);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn dropped_session_leaves_an_orphan_to_adopt() {
    let fixture = helpers::start().await;
    let original = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&original).await;
    helpers::monitor(&original, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;
    drop(original);

    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.current_session_count, 0);
    assert_eq!(diagnostics.orphaned_subscription_count, 1);

    let adopter = fixture.engine.create_session().await.unwrap();
    let results = adopter
        .transfer_subscriptions(&[subscription_id], true)
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::GOOD);
    assert_eq!(
        fixture.engine.diagnostics().await.unwrap().orphaned_subscription_count,
        0
    );

    let response = adopter.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(response.subscription_id, subscription_id);
    assert_eq!(helpers::values(&response), vec![Variant::Double(20.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn orphan_expires_after_its_lifetime() {
    let fixture = helpers::start().await;
    let original = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe_with(&original, short_lived()).await;
    original.close(false).await.unwrap();
    assert_eq!(
        fixture.engine.diagnostics().await.unwrap().orphaned_subscription_count,
        1
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.orphaned_subscription_count, 0);
    assert_eq!(diagnostics.current_subscription_count, 0);

    let adopter = fixture.engine.create_session().await.unwrap();
    let results = adopter
        .transfer_subscriptions(&[subscription_id], false)
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn closing_with_delete_answers_pending_requests() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&session).await;
    let pending = session.send_publish(PublishRequest::default()).await.unwrap();

    session.close(true).await.unwrap();

    assert_eq!(pending.await.unwrap().service_result, StatusCode::BAD_SESSION_CLOSED);
    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.current_subscription_count, 0);
    assert_eq!(diagnostics.orphaned_subscription_count, 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn transfer_reports_each_subscription() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let owned = helpers::subscribe(&session).await;

    assert_eq!(
        session.transfer_subscriptions(&[], false).await.unwrap_err(),
        Error::Service(StatusCode::BAD_NOTHING_TO_DO)
    );

    let results = session
        .transfer_subscriptions(&[owned, owned + 1000], false)
        .await
        .unwrap();
    let statuses: Vec<StatusCode> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        statuses,
        vec![StatusCode::GOOD, StatusCode::BAD_SUBSCRIPTION_ID_INVALID]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn target_session_limit_applies_to_transfers() {
    let fixture = helpers::start_with(opcua_publish_engine::configure().max_subscriptions_per_session(1)).await;
    let source = fixture.engine.create_session().await.unwrap();
    let target = fixture.engine.create_session().await.unwrap();
    let moving = helpers::subscribe(&source).await;
    helpers::subscribe(&target).await;

    let results = target.transfer_subscriptions(&[moving], false).await.unwrap();
    assert_eq!(results[0].status_code, StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS);
}
