//! Continuation point paging through a session.

use bytes::Bytes;
use opcua_publish_engine::prelude::*;
use opcua_publish_engine::ReferenceDescription;

use crate::helpers;

fn references(count: u32) -> Vec<ReferenceDescription> {
    (0..count)
        .map(|i| ReferenceDescription {
            reference_type_id: NodeId::numeric(0, 47),
            is_forward: true,
            node_id: NodeId::numeric(1, 5000 + i),
            browse_name: format!("Child{i}"),
        })
        .collect()
}

#[test_log::test(tokio::test(start_paused = true))]
async fn pages_until_exhausted() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let all = references(10);

    let mut page = session.register_references(3, all.clone()).await.unwrap();
    let mut collected = Vec::new();
    let mut sizes = Vec::new();
    loop {
        sizes.push(page.items.len());
        collected.extend(page.items);
        let Some(token) = page.continuation_point else {
            break;
        };
        page = session.next_references(token).await.unwrap();
    }

    assert_eq!(sizes, vec![3, 3, 3, 1]);
    assert_eq!(collected, all);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn small_results_need_no_token() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();

    let page = session.register_references(0, references(10)).await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert!(page.continuation_point.is_none());

    let page = session.register_references(5, references(5)).await.unwrap();
    assert!(page.continuation_point.is_none());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn tokens_are_single_use() {
    let fixture = helpers::start().await;
    let session = fixture.engine.create_session().await.unwrap();
    let invalid = Error::Service(StatusCode::BAD_CONTINUATION_POINT_INVALID);

    let page = session.register_references(2, references(6)).await.unwrap();
    let token = page.continuation_point.unwrap();
    session.next_references(token.clone()).await.unwrap();
    assert_eq!(session.next_references(token).await.unwrap_err(), invalid);

    let page = session.register_references(2, references(6)).await.unwrap();
    let token = page.continuation_point.unwrap();
    session.release_continuation_point(token.clone()).await.unwrap();
    assert_eq!(session.next_references(token.clone()).await.unwrap_err(), invalid);
    assert_eq!(session.release_continuation_point(token).await.unwrap_err(), invalid);

    assert_eq!(
        session
            .next_references(Bytes::from_static(b"bogus"))
            .await
            .unwrap_err(),
        invalid
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn tokens_are_limited_per_session() {
    let fixture = helpers::start_with(
        opcua_publish_engine::configure()
            .config(EngineConfig::builder().max_continuation_points_per_session(1).build()),
    )
    .await;
    let session = fixture.engine.create_session().await.unwrap();
    let other = fixture.engine.create_session().await.unwrap();

    let held = session.register_references(2, references(4)).await.unwrap();
    assert!(held.continuation_point.is_some());
    assert_eq!(
        session.register_references(2, references(4)).await.unwrap_err(),
        Error::Service(StatusCode::BAD_NO_CONTINUATION_POINTS)
    );

    // Tokens belong to the session that created them.
    let token = held.continuation_point.unwrap();
    assert_eq!(
        other.next_references(token.clone()).await.unwrap_err(),
        Error::Service(StatusCode::BAD_CONTINUATION_POINT_INVALID)
    );
    assert!(other.register_references(2, references(4)).await.is_ok());

    session.release_continuation_point(token).await.unwrap();
    assert!(session.register_references(2, references(4)).await.is_ok());
}
