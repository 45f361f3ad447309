//! Monitored item creation limits, filters, queues and monitoring modes.

use std::time::Duration;

use opcua_publish_engine::prelude::*;

use crate::helpers::{self, BLOB, FLAG, LABEL, NAME, PRESSURE, TEMPERATURE};

fn absolute(deadband: f64) -> MonitoringFilter {
    MonitoringFilter::DataChange(DataChangeFilter {
        trigger: DataChangeTrigger::StatusValue,
        deadband: DeadbandType::Absolute(deadband),
    })
}

#[test_log::test(tokio::test(start_paused = true))]
async fn per_subscription_item_limit_fails_only_the_excess() {
    let fixture = helpers::start_with(
        opcua_publish_engine::configure()
            .config(EngineConfig::builder().max_monitored_items_per_subscription(6).build()),
    )
    .await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let baseline = fixture.engine.diagnostics().await.unwrap().monitored_item_count;

    let requests = (1..=7)
        .map(|handle| MonitoredItemCreateRequest::value(TEMPERATURE, handle))
        .collect();
    let results = session
        .create_monitored_items(subscription_id, TimestampsToReturn::Both, requests)
        .await
        .unwrap();

    assert_eq!(results.len(), 7);
    assert!(results[..6].iter().all(|r| r.status_code == StatusCode::GOOD));
    assert_eq!(results[6].status_code, StatusCode::BAD_TOO_MANY_MONITORED_ITEMS);
    assert_eq!(
        fixture.engine.diagnostics().await.unwrap().monitored_item_count,
        baseline + 6
    );

    session.delete_subscriptions(&[subscription_id]).await.unwrap();
    assert_eq!(
        fixture.engine.diagnostics().await.unwrap().monitored_item_count,
        baseline
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn server_wide_item_limit_spans_subscriptions() {
    let fixture = helpers::start_with(opcua_publish_engine::configure().max_monitored_items(2)).await;
    let session = fixture.engine.create_session().await.unwrap();
    let first = helpers::subscribe(&session).await;
    let second = helpers::subscribe(&session).await;

    helpers::monitor(&session, first, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;
    helpers::monitor(&session, second, MonitoredItemCreateRequest::value(PRESSURE, 2)).await;
    let results = session
        .create_monitored_items(
            second,
            TimestampsToReturn::Both,
            vec![MonitoredItemCreateRequest::value(FLAG, 3)],
        )
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::BAD_TOO_MANY_MONITORED_ITEMS);

    // Freed slots are available again.
    session.delete_subscriptions(&[first]).await.unwrap();
    helpers::monitor(&session, second, MonitoredItemCreateRequest::value(FLAG, 3)).await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn empty_item_lists_are_rejected() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let nothing_to_do = Error::Service(StatusCode::BAD_NOTHING_TO_DO);

    assert_eq!(
        session
            .create_monitored_items(subscription_id, TimestampsToReturn::Both, Vec::new())
            .await
            .unwrap_err(),
        nothing_to_do
    );
    assert_eq!(
        session
            .modify_monitored_items(subscription_id, Vec::new())
            .await
            .unwrap_err(),
        nothing_to_do
    );
    assert_eq!(
        session
            .set_monitoring_mode(subscription_id, MonitoringMode::Sampling, &[])
            .await
            .unwrap_err(),
        nothing_to_do
    );
    assert_eq!(
        session
            .delete_monitored_items(subscription_id, &[])
            .await
            .unwrap_err(),
        nothing_to_do
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn unknown_subscription_and_node_are_reported() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let err = session
        .create_monitored_items(
            subscription_id + 1,
            TimestampsToReturn::Both,
            vec![MonitoredItemCreateRequest::value(TEMPERATURE, 1)],
        )
        .await
        .unwrap_err();
    assert_eq!(err, Error::Service(StatusCode::BAD_SUBSCRIPTION_ID_INVALID));

    let results = session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Both,
            vec![
                MonitoredItemCreateRequest::value(NodeId::numeric(9, 9), 1),
                MonitoredItemCreateRequest::value(helpers::BOILER, 2),
            ],
        )
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::BAD_NODE_ID_UNKNOWN);
    assert_eq!(results[1].status_code, StatusCode::BAD_ATTRIBUTE_ID_INVALID);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn deadband_requires_a_numeric_variable() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let requests = [FLAG, NAME, BLOB, LABEL]
        .into_iter()
        .zip(1..)
        .map(|(node, handle)| MonitoredItemCreateRequest::value(node, handle).with_filter(absolute(1.0)))
        .collect();
    let results = session
        .create_monitored_items(subscription_id, TimestampsToReturn::Both, requests)
        .await
        .unwrap();
    for result in &results {
        assert_eq!(result.status_code, StatusCode::BAD_FILTER_NOT_ALLOWED);
    }

    let no_deadband = MonitoringFilter::DataChange(DataChangeFilter {
        trigger: DataChangeTrigger::StatusValue,
        deadband: DeadbandType::None,
    });
    let results = session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Both,
            vec![
                MonitoredItemCreateRequest::value(FLAG, 10).with_filter(no_deadband.clone()),
                MonitoredItemCreateRequest::value(TEMPERATURE, 11).with_filter(no_deadband),
                MonitoredItemCreateRequest::value(TEMPERATURE, 12).with_filter(absolute(0.5)),
                MonitoredItemCreateRequest::value(TEMPERATURE, 13).with_filter(absolute(-1.0)),
            ],
        )
        .await
        .unwrap();
    let statuses: Vec<StatusCode> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        statuses,
        vec![
            StatusCode::GOOD,
            StatusCode::GOOD,
            StatusCode::GOOD,
            StatusCode::BAD_DEADBAND_FILTER_INVALID,
        ]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn percent_deadband_uses_the_eu_range() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let percent = MonitoringFilter::DataChange(DataChangeFilter {
        trigger: DataChangeTrigger::StatusValue,
        deadband: DeadbandType::Percent(10.0),
    });

    let results = session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Both,
            vec![
                MonitoredItemCreateRequest::value(PRESSURE, 1)
                    .with_filter(percent.clone())
                    .with_sampling_interval(100.0),
                MonitoredItemCreateRequest::value(TEMPERATURE, 2).with_filter(percent),
            ],
        )
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::GOOD);
    assert_ne!(results[1].status_code, StatusCode::GOOD);

    let initial = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(helpers::values(&initial), vec![Variant::Double(100.0)]);

    // 10 % of a 200 wide range: a change of 15 stays inside the deadband.
    fixture.space.write_value(&PRESSURE, DataValue::new(115.0));
    tokio::time::sleep(Duration::from_millis(150)).await;
    fixture.space.write_value(&PRESSURE, DataValue::new(125.0));

    let next = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(helpers::values(&next), vec![Variant::Double(125.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn full_queue_discards_the_oldest_and_flags_overflow() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let created = session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Neither,
            vec![MonitoredItemCreateRequest::value(TEMPERATURE, 1)
                .with_sampling_interval(100.0)
                .with_queue(3, true)],
        )
        .await
        .unwrap();
    assert_eq!(created[0].revised_sampling_interval, 100.0);
    assert_eq!(created[0].revised_queue_size, 3);

    let response = session.send_publish(PublishRequest::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for value in [1.0, 2.0, 3.0] {
        fixture.space.write_value(&TEMPERATURE, DataValue::new(value));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let response = response.await.unwrap();

    let changes: Vec<&MonitoredItemNotification> = response.notification_message.data_changes().collect();
    let values: Vec<Variant> = changes.iter().map(|c| c.value.value.clone()).collect();
    assert_eq!(values, vec![Variant::Double(1.0), Variant::Double(2.0), Variant::Double(3.0)]);
    assert!(changes[0].value.status.has_overflow());
    assert!(!changes[1].value.status.has_overflow());
    assert!(!changes[2].value.status.has_overflow());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn full_queue_can_keep_the_oldest_values() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::value(TEMPERATURE, 1)
            .with_sampling_interval(100.0)
            .with_queue(2, false),
    )
    .await;

    let response = session.send_publish(PublishRequest::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for value in [1.0, 2.0] {
        fixture.space.write_value(&TEMPERATURE, DataValue::new(value));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let response = response.await.unwrap();

    let changes: Vec<&MonitoredItemNotification> = response.notification_message.data_changes().collect();
    let values: Vec<Variant> = changes.iter().map(|c| c.value.value.clone()).collect();
    assert_eq!(values, vec![Variant::Double(20.0), Variant::Double(1.0)]);
    assert!(changes[1].value.status.has_overflow());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn disabled_items_stay_silent_until_reenabled() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let item = helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::value(TEMPERATURE, 1).with_mode(MonitoringMode::Disabled),
    )
    .await;

    let first = session.publish(PublishRequest::default()).await.unwrap();
    assert!(first.notification_message.is_keep_alive());

    let results = session
        .set_monitoring_mode(subscription_id, MonitoringMode::Reporting, &[item, item + 100])
        .await
        .unwrap();
    assert_eq!(
        results,
        vec![StatusCode::GOOD, StatusCode::BAD_MONITORED_ITEM_ID_INVALID]
    );

    let second = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(helpers::values(&second), vec![Variant::Double(20.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn modify_revises_and_deleted_items_are_unknown() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let item = helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;

    let results = session
        .modify_monitored_items(
            subscription_id,
            vec![
                MonitoredItemModifyRequest {
                    monitored_item_id: item,
                    parameters: MonitoringParameters {
                        client_handle: 5,
                        sampling_interval: 1.0,
                        queue_size: 4,
                        ..Default::default()
                    },
                },
                MonitoredItemModifyRequest {
                    monitored_item_id: item + 1,
                    parameters: MonitoringParameters::default(),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::GOOD);
    assert_eq!(
        results[0].revised_sampling_interval,
        fixture.engine.config().min_sampling_interval
    );
    assert_eq!(results[0].revised_queue_size, 4);
    assert_eq!(results[1].status_code, StatusCode::BAD_MONITORED_ITEM_ID_INVALID);

    let deleted = session
        .delete_monitored_items(subscription_id, &[item, item])
        .await
        .unwrap();
    assert_eq!(
        deleted,
        vec![StatusCode::GOOD, StatusCode::BAD_MONITORED_ITEM_ID_INVALID]
    );
}
