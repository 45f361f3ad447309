//! SetTriggering link results and triggered reporting.

use std::collections::BTreeSet;

use opcua_publish_engine::prelude::*;

use crate::helpers::{self, FLAG, TEMPERATURE};

async fn two_items(session: &Session) -> (u32, u32, u32) {
    let subscription_id = helpers::subscribe(session).await;
    let trigger = helpers::monitor(session, subscription_id, MonitoredItemCreateRequest::value(TEMPERATURE, 1)).await;
    let linked = helpers::monitor(
        session,
        subscription_id,
        MonitoredItemCreateRequest::value(FLAG, 2).with_mode(MonitoringMode::Sampling),
    )
    .await;
    (subscription_id, trigger, linked)
}

#[test_log::test(tokio::test(start_paused = true))]
async fn empty_link_lists_are_nothing_to_do() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let (subscription_id, trigger, _) = two_items(&session).await;

    let err = session
        .set_triggering(subscription_id, trigger, &[], &[])
        .await
        .unwrap_err();
    assert_eq!(err, Error::Service(StatusCode::BAD_NOTHING_TO_DO));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn unknown_triggering_item_fails_the_call() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let (subscription_id, trigger, linked) = two_items(&session).await;

    let err = session
        .set_triggering(subscription_id, trigger + linked + 10, &[linked], &[])
        .await
        .unwrap_err();
    assert_eq!(err, Error::Service(StatusCode::BAD_MONITORED_ITEM_ID_INVALID));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn self_link_fails_only_its_own_entry() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let (subscription_id, trigger, linked) = two_items(&session).await;

    let response = session
        .set_triggering(subscription_id, trigger, &[trigger, linked], &[])
        .await
        .unwrap();
    assert_eq!(response.status_code, StatusCode::GOOD);
    assert_eq!(
        response.add_results,
        vec![StatusCode::BAD_MONITORED_ITEM_ID_INVALID, StatusCode::GOOD]
    );
    assert!(response.remove_results.is_empty());

    // Removal happens before addition, so the same id can be re-linked.
    let response = session
        .set_triggering(subscription_id, trigger, &[linked], &[linked, trigger])
        .await
        .unwrap();
    assert_eq!(response.add_results, vec![StatusCode::GOOD]);
    assert_eq!(
        response.remove_results,
        vec![StatusCode::GOOD, StatusCode::BAD_MONITORED_ITEM_ID_INVALID]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn sampling_item_reports_when_its_trigger_reports() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let (subscription_id, trigger, linked) = two_items(&session).await;

    let first = session.publish(PublishRequest::default()).await.unwrap();
    let handles: BTreeSet<u32> = first
        .notification_message
        .data_changes()
        .map(|c| c.client_handle)
        .collect();
    assert_eq!(handles, BTreeSet::from([1]));

    session
        .set_triggering(subscription_id, trigger, &[linked], &[])
        .await
        .unwrap();
    fixture.space.write_value(&TEMPERATURE, DataValue::new(25.0));

    let second = session.publish(PublishRequest::default()).await.unwrap();
    let reported: Vec<(u32, Variant)> = second
        .notification_message
        .data_changes()
        .map(|c| (c.client_handle, c.value.value.clone()))
        .collect();
    assert_eq!(reported.len(), 2, "{reported:?}");
    assert!(reported.contains(&(1, Variant::Double(25.0))));
    assert!(reported.contains(&(2, Variant::Boolean(true))));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn removed_link_stops_triggering() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let (subscription_id, trigger, linked) = two_items(&session).await;
    session
        .set_triggering(subscription_id, trigger, &[linked], &[])
        .await
        .unwrap();
    let _initial = session.publish(PublishRequest::default()).await.unwrap();

    session
        .set_triggering(subscription_id, trigger, &[], &[linked])
        .await
        .unwrap();
    fixture.space.write_value(&TEMPERATURE, DataValue::new(25.0));

    let next = session.publish(PublishRequest::default()).await.unwrap();
    let handles: Vec<u32> = next
        .notification_message
        .data_changes()
        .map(|c| c.client_handle)
        .collect();
    assert_eq!(handles, vec![1]);
}
