//! Values and events travelling from the address space to Publish responses.

use std::time::Duration;

use opcua_publish_engine::prelude::*;
use opcua_publish_engine::{ContentFilterElement, FilterOperand, FilterOperator};
use tokio::time::Instant;

use crate::helpers::{self, assert_elapsed, ALARM_TYPE, BOILER, PUMP, TEMPERATURE};

fn message_and_severity() -> EventFilter {
    EventFilter {
        select_clauses: vec![
            SimpleAttributeOperand::field("Message"),
            SimpleAttributeOperand::field("Severity"),
        ],
        where_clause: Vec::new(),
    }
}

fn alarm(emitter: NodeId, message: &str, severity: u32) -> EventData {
    EventData::new(emitter, ALARM_TYPE)
        .with_field("Message", message)
        .with_field("Severity", severity)
}

#[test_log::test(tokio::test(start_paused = true))]
async fn initial_value_then_sampled_change() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 7)).await;

    let start = Instant::now();
    let first = session.publish(PublishRequest::default()).await.unwrap();
    assert_elapsed(start, 1000);
    assert_eq!(first.notification_message.sequence_number, 1);
    assert_eq!(helpers::values(&first), vec![Variant::Double(20.0)]);
    let change = first.notification_message.data_changes().next().unwrap();
    assert_eq!(change.client_handle, 7);
    assert!(change.value.server_timestamp.is_some());

    fixture.space.write_value(&TEMPERATURE, DataValue::new(21.0));
    let second = session.publish(PublishRequest::default()).await.unwrap();
    assert_elapsed(start, 2000);
    assert_eq!(second.notification_message.sequence_number, 2);
    assert_eq!(helpers::values(&second), vec![Variant::Double(21.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn pushed_values_reach_exception_based_items() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::value(TEMPERATURE, 1).with_sampling_interval(60_000.0),
    )
    .await;
    let _initial = session.publish(PublishRequest::default()).await.unwrap();

    fixture
        .engine
        .notify_data_change(TEMPERATURE, AttributeId::Value, DataValue::new(30.0))
        .await
        .unwrap();
    fixture
        .engine
        .notify_data_change(NodeId::numeric(1, 1001), AttributeId::Value, DataValue::new(1.0))
        .await
        .unwrap();

    let response = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(helpers::values(&response), vec![Variant::Double(30.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn timestamps_follow_the_requested_selection() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Neither,
            vec![MonitoredItemCreateRequest::value(TEMPERATURE, 1)],
        )
        .await
        .unwrap();

    let response = session.publish(PublishRequest::default()).await.unwrap();
    let change = response.notification_message.data_changes().next().unwrap();
    assert!(change.value.source_timestamp.is_none());
    assert!(change.value.server_timestamp.is_none());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn disabled_publishing_holds_data_back() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe_with(
        &session,
        CreateSubscriptionRequest {
            publishing_enabled: false,
            ..Default::default()
        },
    )
    .await;
    helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;

    let held = session.publish(PublishRequest::default()).await.unwrap();
    assert!(held.notification_message.is_keep_alive());

    let results = session
        .set_publishing_mode(true, &[subscription_id, subscription_id + 1])
        .await
        .unwrap();
    assert_eq!(
        results,
        vec![StatusCode::GOOD, StatusCode::BAD_SUBSCRIPTION_ID_INVALID]
    );

    let released = session.publish(PublishRequest::default()).await.unwrap();
    assert_eq!(released.notification_message.sequence_number, 1);
    assert_eq!(helpers::values(&released), vec![Variant::Double(20.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn resend_data_requeues_current_values() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(&session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;
    let _initial = session.publish(PublishRequest::default()).await.unwrap();

    session.resend_data(subscription_id).await.unwrap();

    let start = Instant::now();
    let response = session.publish(PublishRequest::default()).await.unwrap();
    assert_elapsed(start, 1000);
    assert_eq!(helpers::values(&response), vec![Variant::Double(20.0)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn events_reach_the_emitter_and_the_server_object() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::events(NodeId::SERVER, 1, message_and_severity()),
    )
    .await;
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::events(BOILER, 2, message_and_severity()),
    )
    .await;

    fixture.engine.raise_event(alarm(BOILER, "boiler hot", 700)).await.unwrap();
    fixture.engine.raise_event(alarm(PUMP, "pump dry", 300)).await.unwrap();

    let response = session.publish(PublishRequest::default()).await.unwrap();
    let mut events: Vec<(u32, Vec<Variant>)> = response
        .notification_message
        .events()
        .map(|e| (e.client_handle, e.event_fields.clone()))
        .collect();
    events.sort_by_key(|(handle, _)| *handle);

    let boiler = vec![Variant::from("boiler hot"), Variant::UInt32(700)];
    let pump = vec![Variant::from("pump dry"), Variant::UInt32(300)];
    assert_eq!(events, vec![(1, boiler.clone()), (1, pump), (2, boiler)]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn where_clause_filters_events() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    let filter = EventFilter {
        where_clause: vec![ContentFilterElement {
            operator: FilterOperator::GreaterThan,
            operands: vec![
                FilterOperand::Attribute(SimpleAttributeOperand::field("Severity")),
                FilterOperand::Literal(Variant::UInt32(500)),
            ],
        }],
        ..message_and_severity()
    };
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::events(NodeId::SERVER, 1, filter),
    )
    .await;

    fixture.engine.raise_event(alarm(BOILER, "minor", 100)).await.unwrap();
    fixture.engine.raise_event(alarm(BOILER, "major", 900)).await.unwrap();

    let response = session.publish(PublishRequest::default()).await.unwrap();
    let messages: Vec<Variant> = response
        .notification_message
        .events()
        .map(|e| e.event_fields[0].clone())
        .collect();
    assert_eq!(messages, vec![Variant::from("major")]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn invalid_event_items_are_rejected() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;

    let results = session
        .create_monitored_items(
            subscription_id,
            TimestampsToReturn::Neither,
            vec![
                MonitoredItemCreateRequest::events(NodeId::SERVER, 1, EventFilter::default()),
                MonitoredItemCreateRequest::events(TEMPERATURE, 2, message_and_severity()),
                MonitoredItemCreateRequest::value(TEMPERATURE, 3)
                    .with_filter(MonitoringFilter::Event(message_and_severity())),
            ],
        )
        .await
        .unwrap();
    let statuses: Vec<StatusCode> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        statuses,
        vec![
            StatusCode::BAD_EVENT_FILTER_INVALID,
            StatusCode::BAD_ATTRIBUTE_ID_INVALID,
            StatusCode::BAD_FILTER_NOT_ALLOWED,
        ]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn event_queue_overflow_keeps_the_newest_events() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let subscription_id = helpers::subscribe(&session).await;
    helpers::monitor(
        &session,
        subscription_id,
        MonitoredItemCreateRequest::events(NodeId::SERVER, 1, message_and_severity()).with_queue(2, true),
    )
    .await;

    for severity in [100, 200, 300] {
        fixture
            .engine
            .raise_event(alarm(PUMP, "tick", severity))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = session.publish(PublishRequest::default()).await.unwrap();
    let severities: Vec<Variant> = response
        .notification_message
        .events()
        .map(|e| e.event_fields[1].clone())
        .collect();
    assert_eq!(severities, vec![Variant::UInt32(200), Variant::UInt32(300)]);
}
