use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use courier_gateway::jetstream::{AckPolicy, RetentionPolicy};
use courier_gateway::{Error, GatewayConfig, JetStream, ResourceKind, TransportError};
use courier_gateway_memory::{MemoryTransport, connect};
use futures::StreamExt;

fn jetstream() -> JetStream<MemoryTransport> {
    connect(GatewayConfig::new("memory://local"))
        .unwrap()
        .jetstream()
}

#[tokio::test]
async fn test_ensure_stream_is_idempotent() {
    let js = jetstream();

    let first = js
        .ensure_stream("ORDERS", &["created", "cancelled"])
        .await
        .unwrap();
    let second = js
        .ensure_stream("ORDERS", &["created", "cancelled"])
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        second.config.subjects,
        vec!["ORDERS.created", "ORDERS.cancelled"]
    );
    assert_eq!(second.config.retention, RetentionPolicy::WorkQueue);
    assert_eq!(second.config.max_consumers, -1);
    assert_eq!(second.config.max_message_size, -1);
    assert!(!second.config.no_ack);
}

#[tokio::test]
async fn test_ensure_stream_leaves_existing_subjects_alone() {
    let js = jetstream();

    js.ensure_stream("ORDERS", &["created"]).await.unwrap();
    let info = js.ensure_stream("ORDERS", &["shipped"]).await.unwrap();

    assert_eq!(info.config.subjects, vec!["ORDERS.created"]);
}

#[tokio::test]
async fn test_similar_stream_names_do_not_collide() {
    let js = jetstream();

    js.ensure_stream("ORDER", &["created"]).await.unwrap();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();

    let ack = js
        .publish("ORDERS", "created", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    assert_eq!(ack.stream, "ORDERS");
}

#[tokio::test]
async fn test_dotted_stream_names_are_rejected() {
    let js = jetstream();

    let result = js.ensure_stream("ORDERS.EU", &["created"]).await;
    assert_matches!(result, Err(Error::InvalidStreamName(name)) if name == "ORDERS.EU");
    assert!(js.stream_info("ORDERS").await.unwrap().is_none());

    js.ensure_stream("ORDERS", &["EU.created"]).await.unwrap();

    let ack = js
        .publish("ORDERS", "EU.created", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    assert_eq!(ack.stream, "ORDERS");

    let result = js
        .publish("ORDERS.EU", "created", Bytes::from_static(b"{}"))
        .await;
    assert_matches!(result, Err(Error::InvalidStreamName(_)));

    for result in [
        js.ensure_consumer("ORDERS.EU", "created", "billing").await.map(|_| ()),
        js.delete_stream("ORDERS.EU").await,
        js.subscribe("ORDERS.EU", "created").await.map(|_| ()),
        js.queue_subscribe("ORDERS.EU", "created", "billing").await.map(|_| ()),
        js.pull_subscribe("ORDERS.EU", "created", "billing").await.map(|_| ()),
    ] {
        assert_matches!(result, Err(Error::InvalidStreamName(_)));
    }
}

#[tokio::test]
async fn test_extend_stream_subjects_is_monotonic() {
    let js = jetstream();

    js.ensure_stream("ORDERS", &["created", "cancelled"])
        .await
        .unwrap();

    let info = js
        .extend_stream_subjects("ORDERS", &["cancelled", "shipped", "shipped"])
        .await
        .unwrap();
    assert_eq!(
        info.config.subjects,
        vec!["ORDERS.created", "ORDERS.cancelled", "ORDERS.shipped"]
    );

    let again = js
        .extend_stream_subjects("ORDERS", &["created"])
        .await
        .unwrap();
    assert_eq!(again.config.subjects, info.config.subjects);

    let empty: [&str; 0] = [];
    let unchanged = js.extend_stream_subjects("ORDERS", &empty).await.unwrap();
    assert_eq!(unchanged.config.subjects, info.config.subjects);
}

#[tokio::test]
async fn test_extend_missing_stream() {
    let js = jetstream();

    let result = js.extend_stream_subjects("MISSING", &["created"]).await;

    assert_matches!(
        result,
        Err(Error::NotFound { kind: ResourceKind::Stream, name }) if name == "MISSING"
    );
}

#[tokio::test]
async fn test_delete_stream() {
    let js = jetstream();

    js.ensure_stream("ORDERS", &["created"]).await.unwrap();
    js.delete_stream("ORDERS").await.unwrap();

    assert!(js.stream_info("ORDERS").await.unwrap().is_none());
    assert_matches!(
        js.delete_stream("ORDERS").await,
        Err(Error::NotFound {
            kind: ResourceKind::Stream,
            ..
        })
    );
}

#[tokio::test]
async fn test_ensure_consumer_is_idempotent() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();

    let first = js
        .ensure_consumer("ORDERS", "created", "billing")
        .await
        .unwrap();
    let second = js
        .ensure_consumer("ORDERS", "created", "billing")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.config.filter_subject, "ORDERS.created");
    assert_eq!(first.config.durable_name.as_deref(), Some("billing"));
    assert_eq!(first.config.ack_policy, AckPolicy::Explicit);

    let info = js.stream_info("ORDERS").await.unwrap().unwrap();
    assert_eq!(info.consumer_count, 1);
}

#[tokio::test]
async fn test_ensure_consumer_on_missing_stream() {
    let js = jetstream();

    let result = js.ensure_consumer("MISSING", "created", "billing").await;

    assert_matches!(
        result,
        Err(Error::NotFound {
            kind: ResourceKind::Stream,
            ..
        })
    );
}

#[tokio::test]
async fn test_pull_subscribe_needs_consumer() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();

    let result = js.pull_subscribe("ORDERS", "created", "billing").await;

    assert_matches!(
        result,
        Err(Error::NotFound { kind: ResourceKind::Consumer, name }) if name == "billing"
    );
}

#[tokio::test]
async fn test_work_queue_removes_acknowledged_messages() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created", "cancelled"])
        .await
        .unwrap();
    js.ensure_consumer("ORDERS", "created", "billing")
        .await
        .unwrap();

    js.publish("ORDERS", "created", Bytes::from_static(b"1"))
        .await
        .unwrap();
    js.publish("ORDERS", "cancelled", Bytes::from_static(b"2"))
        .await
        .unwrap();
    js.publish("ORDERS", "created", Bytes::from_static(b"3"))
        .await
        .unwrap();

    let subscription = js
        .pull_subscribe("ORDERS", "created", "billing")
        .await
        .unwrap();
    assert_eq!(subscription.subject(), "ORDERS.created");

    let deliveries = subscription
        .fetch(10, Duration::from_millis(100))
        .await
        .unwrap();
    let payloads: Vec<_> = deliveries
        .iter()
        .map(|delivery| delivery.message.payload.clone())
        .collect();
    assert_eq!(
        payloads,
        vec![Bytes::from_static(b"1"), Bytes::from_static(b"3")]
    );

    let info = js.consumer_info("ORDERS", "billing").await.unwrap().unwrap();
    assert_eq!(info.num_ack_pending, 2);
    assert_eq!(info.num_pending, 0);

    for delivery in deliveries {
        delivery.ack().await.unwrap();
    }

    let stream = js.stream_info("ORDERS").await.unwrap().unwrap();
    assert_eq!(stream.messages, 1);

    let info = js.consumer_info("ORDERS", "billing").await.unwrap().unwrap();
    assert_eq!(info.num_ack_pending, 0);
}

#[tokio::test]
async fn test_fetch_waits_for_publish() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();
    js.ensure_consumer("ORDERS", "created", "billing")
        .await
        .unwrap();

    let subscription = js
        .pull_subscribe("ORDERS", "created", "billing")
        .await
        .unwrap();

    let publisher = js.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        publisher
            .publish("ORDERS", "created", Bytes::from_static(b"late"))
            .await
            .unwrap();
    });

    let deliveries = subscription
        .fetch(1, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].message.payload, Bytes::from_static(b"late"));
}

#[tokio::test]
async fn test_fetch_expires_empty() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();
    js.ensure_consumer("ORDERS", "created", "billing")
        .await
        .unwrap();

    let subscription = js
        .pull_subscribe("ORDERS", "created", "billing")
        .await
        .unwrap();

    let deliveries = subscription
        .fetch(5, Duration::from_millis(50))
        .await
        .unwrap();

    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn test_subscribe_receives_backlog_and_new_messages() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();

    js.publish("ORDERS", "created", Bytes::from_static(b"before"))
        .await
        .unwrap();

    let mut deliveries = js.subscribe("ORDERS", "created").await.unwrap();

    js.publish("ORDERS", "created", Bytes::from_static(b"after"))
        .await
        .unwrap();

    let first = deliveries.next().await.unwrap();
    let second = deliveries.next().await.unwrap();

    assert_eq!(first.message.payload, Bytes::from_static(b"before"));
    assert_eq!(second.message.payload, Bytes::from_static(b"after"));

    first.ack().await.unwrap();
    second.ack().await.unwrap();

    let stream = js.stream_info("ORDERS").await.unwrap().unwrap();
    assert_eq!(stream.messages, 0);
}

#[tokio::test]
async fn test_queue_subscribe_shares_work() {
    let js = jetstream();
    js.ensure_stream("ORDERS", &["created"]).await.unwrap();

    let first = js
        .queue_subscribe("ORDERS", "created", "billing")
        .await
        .unwrap();
    let second = js
        .queue_subscribe("ORDERS", "created", "billing")
        .await
        .unwrap();

    for i in 0..4u8 {
        js.publish("ORDERS", "created", Bytes::from(vec![i]))
            .await
            .unwrap();
    }

    let first: Vec<_> = first.take(2).collect().await;
    let second: Vec<_> = second.take(2).collect().await;

    assert_eq!(first.len() + second.len(), 4);

    let info = js.stream_info("ORDERS").await.unwrap().unwrap();
    assert_eq!(info.consumer_count, 1);
}

#[tokio::test]
async fn test_publish_without_stream() {
    let js = jetstream();

    let result = js
        .publish("NOWHERE", "created", Bytes::from_static(b"{}"))
        .await;

    assert_matches!(
        result,
        Err(Error::Transport {
            source: TransportError::NoResponders,
            ..
        })
    );
}
