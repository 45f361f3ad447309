//! Subscription event streams, limits, session close and engine shutdown.

use opcua_publish_engine::prelude::*;

use crate::helpers::{self, TEMPERATURE};

#[test_log::test(tokio::test(start_paused = true))]
async fn watched_subscription_reports_its_lifecycle() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let mut events = session.watch_subscription(subscription_id).await.unwrap();
    assert_eq!(events.subscription_id(), subscription_id);

    let item = helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 9)).await;
    assert_eq!(
        events.next().await,
        Some(SubscriptionEvent::MonitoredItemCreated {
            monitored_item_id: item,
            client_handle: 9,
        })
    );

    let response = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(
        events.next().await,
        Some(SubscriptionEvent::Notification(response.notification_message))
    );
    assert_eq!(
        events.next().await,
        Some(SubscriptionEvent::StateChanged {
            from: SubscriptionState::Creating,
            to: SubscriptionState::Normal,
        })
    );

    session.delete_monitored_items(subscription_id, &[item]).await.unwrap();
    assert_eq!(
        events.next().await,
        Some(SubscriptionEvent::MonitoredItemDeleted { monitored_item_id: item })
    );

    session.delete_subscriptions(&[subscription_id]).await.unwrap();
    assert_eq!(
        events.next().await,
        Some(SubscriptionEvent::StateChanged {
            from: SubscriptionState::Normal,
            to: SubscriptionState::Closed,
        })
    );
    assert_eq!(events.next().await, Some(SubscriptionEvent::Closed));
    assert_eq!(events.next().await, None);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn watching_an_unknown_subscription_fails() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();

    let err = session.watch_subscription(3).await.unwrap_err();
    assert_eq!(err, Error::Service(StatusCode::BAD_SUBSCRIPTION_ID_INVALID));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn session_and_subscription_limits() {
    let fixture = helpers::start_with(
        opcua_publish_engine::configure()
            .max_sessions(1)
            .max_subscriptions_per_session(1),
    )
    .await;
    let session = fixture.engine.create_session().await.unwrap();
    assert_eq!(
        fixture.engine.create_session().await.unwrap_err(),
        Error::Service(StatusCode::BAD_TOO_MANY_SESSIONS)
    );

    helpers::subscribe(&session).await;
    assert_eq!(
        session
            .create_subscription(CreateSubscriptionRequest::default())
            .await
            .unwrap_err(),
        Error::Service(StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS)
    );

    session.close(true).await.unwrap();
    let reopened = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&reopened).await;

    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.current_session_count, 1);
    assert_eq!(diagnostics.cumulated_session_count, 2);
    assert_eq!(diagnostics.current_subscription_count, 1);
    assert_eq!(diagnostics.cumulated_subscription_count, 2);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn modify_subscription_revises_parameters() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let revised = session
        .modify_subscription(ModifySubscriptionRequest {
            subscription_id,
            requested_publishing_interval: 500.0,
            requested_lifetime_count: 30,
            requested_max_keep_alive_count: 5,
            max_notifications_per_publish: 0,
            priority: 1,
        })
        .await
        .unwrap();
    assert_eq!(revised.revised_publishing_interval, 500.0);
    assert_eq!(revised.revised_lifetime_count, 30);
    assert_eq!(revised.revised_max_keep_alive_count, 5);

    let err = session
        .modify_subscription(ModifySubscriptionRequest {
            subscription_id: subscription_id + 1,
            requested_publishing_interval: 500.0,
            requested_lifetime_count: 30,
            requested_max_keep_alive_count: 5,
            max_notifications_per_publish: 0,
            priority: 0,
        })
        .await
        .unwrap_err();
    assert_eq!(err, Error::Service(StatusCode::BAD_SUBSCRIPTION_ID_INVALID));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn shutdown_answers_pending_requests() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&session).await;
    let pending = session.send_publish(PublishRequest::default()).await.unwrap();

    fixture.engine.shutdown().await;

    assert_eq!(pending.await.unwrap().service_result, StatusCode::BAD_SHUTDOWN);
    assert_eq!(
        session
            .create_subscription(CreateSubscriptionRequest::default())
            .await
            .unwrap_err(),
        Error::RuntimeShutdown
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn dropped_session_answers_pending_requests() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    helpers::subscribe(&session).await;
    let pending = session.send_publish(PublishRequest::default()).await.unwrap();

    drop(session);

    assert_eq!(pending.await.unwrap().service_result, StatusCode::BAD_SESSION_CLOSED);
    let diagnostics = fixture.engine.diagnostics().await.unwrap();
    assert_eq!(diagnostics.current_session_count, 0);
    assert_eq!(diagnostics.orphaned_subscription_count, 1);
}
