//! Consumer discovery and load-balancing tests.

mod common;

use common::{Behavior, MockServer, Reply};
use dubbo_client::{CallOptions, ConsumerOptions, DubboClient, Error};
use dubbo_codec::Packet;
use dubbo_codec_json::JsonCodecFactory;
use dubbo_registry_memory::MemoryRegistry;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(registry: Arc<MemoryRegistry>) -> DubboClient<JsonCodecFactory, MemoryRegistry> {
    DubboClient::builder()
        .registry(registry)
        .codec_factory(Arc::new(JsonCodecFactory))
        .app_name("unittest")
        .build()
        .unwrap()
}

fn options() -> ConsumerOptions {
    ConsumerOptions::new("com.example.HelloService").with_version("1.0.0")
}

#[tokio::test]
async fn static_address_invoke() {
    let server = MockServer::spawn(Behavior::default()).await;
    let client = client(Arc::new(MemoryRegistry::new()));

    let consumer = client
        .create_consumer(options().with_address(server.addr.to_string()))
        .await
        .unwrap();
    let value = consumer
        .invoke("sayHello", vec![json!("static")], CallOptions::new())
        .await
        .unwrap();
    assert_eq!(value, json!("static"));

    client.close().await;
}

#[tokio::test]
async fn round_robin_visits_every_endpoint_in_stable_order() {
    let client = client(Arc::new(MemoryRegistry::new()));
    let consumer = client
        .create_consumer(options().with_address("10.0.0.1:7001,10.0.0.2:7002,10.0.0.3:7003"))
        .await
        .unwrap();

    let keys = ["10.0.0.1:7001", "10.0.0.2:7002", "10.0.0.3:7003"];
    let selections: Vec<String> = (0..4)
        .map(|_| consumer.select_endpoint("sayHello").unwrap().remote_key())
        .collect();

    // N+1 selections: the first endpoint repeats, the others appear once.
    assert_eq!(selections[0], selections[3]);
    let mut first_three = selections[..3].to_vec();
    first_three.sort();
    assert_eq!(first_three, keys);

    // Stable relative order: each selection is the list successor of the
    // previous one.
    for window in selections.windows(2) {
        let position = keys.iter().position(|key| *key == window[0]).unwrap();
        assert_eq!(window[1], keys[(position + 1) % keys.len()]);
    }
}

#[tokio::test]
async fn static_round_robin_spreads_calls_across_servers() {
    let mut server_a = MockServer::spawn(Behavior::default()).await;
    let mut server_b = MockServer::spawn(Behavior::default()).await;
    let client = client(Arc::new(MemoryRegistry::new()));

    let consumer = client
        .create_consumer(
            options().with_address(format!("{},{}", server_a.addr, server_b.addr)),
        )
        .await
        .unwrap();

    for _ in 0..2 {
        consumer
            .invoke("sayHello", vec![json!("spread")], CallOptions::new())
            .await
            .unwrap();
    }

    // Two calls over two endpoints: exactly one invocation each.
    assert!(matches!(server_a.next_packet().await, Packet::Request(_)));
    assert!(matches!(server_b.next_packet().await, Packet::Request(_)));

    client.close().await;
}

#[tokio::test]
async fn push_discovery_becomes_ready_on_first_update() {
    let server = MockServer::spawn(Behavior::default()).await;
    let registry = Arc::new(MemoryRegistry::new());
    let client = client(registry.clone());

    let consumer = client.create_consumer(options()).await.unwrap();

    // Not published yet: readiness is still pending, so run the publish
    // concurrently with the first invoke.
    let invoke = {
        let consumer = consumer.clone();
        tokio::spawn(async move {
            consumer
                .invoke("sayHello", vec![json!("pushed")], CallOptions::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    registry.publish(&options().descriptor(), vec![server.url("heartbeat=0")]);

    assert_eq!(invoke.await.unwrap().unwrap(), json!("pushed"));

    client.close().await;
}

#[tokio::test]
async fn push_update_replaces_the_endpoint_list() {
    let server_a = MockServer::spawn(Behavior::default()).await;
    let server_b =
        MockServer::spawn(Behavior::reply(Reply::Exception("from-b".to_string()))).await;
    let registry = Arc::new(MemoryRegistry::new());
    let client = client(registry.clone());

    registry.publish(&options().descriptor(), vec![server_a.url("heartbeat=0")]);
    let consumer = client.create_consumer(options()).await.unwrap();
    let value = consumer
        .invoke("sayHello", vec![json!("a")], CallOptions::new())
        .await
        .unwrap();
    assert_eq!(value, json!("a"));

    // The push delivers a complete replacement list.
    registry.publish(&options().descriptor(), vec![server_b.url("heartbeat=0")]);

    // The swap is applied by the update task; poll until it lands.
    let mut routed_to_b = false;
    for _ in 0..40 {
        match consumer
            .invoke("sayHello", vec![json!("b")], CallOptions::new())
            .await
        {
            Err(Error::RemoteApplication(message)) if message == "from-b" => {
                routed_to_b = true;
                break;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(routed_to_b, "calls never routed to the replacement endpoint");

    client.close().await;
}

#[tokio::test]
async fn empty_endpoint_list_fails_with_no_provider() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = client(registry.clone());

    registry.publish(&options().descriptor(), vec![]);
    let consumer = client.create_consumer(options()).await.unwrap();

    let err = consumer
        .invoke("sayHello", vec![], CallOptions::new())
        .await
        .unwrap_err();
    match err {
        Error::NoProvider { service, method } => {
            assert_eq!(service, "com.example.HelloService:1.0.0");
            assert_eq!(method, "sayHello");
        }
        other => panic!("expected NoProvider, got {other}"),
    }

    client.close().await;
}

#[tokio::test]
async fn unsupported_schemes_are_filtered_out() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = client(registry.clone());

    registry.publish(
        &options().descriptor(),
        vec!["http://10.0.0.1:8080/com.example.HelloService".to_string()],
    );
    let consumer = client.create_consumer(options()).await.unwrap();

    assert!(matches!(
        consumer.invoke("sayHello", vec![], CallOptions::new()).await,
        Err(Error::NoProvider { .. })
    ));

    client.close().await;
}

#[tokio::test]
async fn consumer_level_timeout_overrides_endpoint_default() {
    let server = MockServer::spawn(Behavior::reply(Reply::Silent)).await;
    let client = client(Arc::new(MemoryRegistry::new()));

    // URL says 10s, the consumer override says 200ms.
    let consumer = client
        .create_consumer(
            options()
                .with_address(server.url("heartbeat=0&timeout=10000"))
                .with_call_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let err = consumer
        .invoke("sayHello", vec![], CallOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CallTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));

    client.close().await;
}

#[tokio::test]
async fn close_unsubscribes_from_the_registry() {
    let registry = Arc::new(MemoryRegistry::new());
    let client = client(registry.clone());

    registry.publish(&options().descriptor(), vec![]);
    let consumer = client.create_consumer(options()).await.unwrap();
    consumer.close().await.unwrap();

    // The subscription is gone; publishing again reaches nobody.
    registry.publish(&options().descriptor(), vec![]);
}
