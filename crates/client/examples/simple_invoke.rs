//! Simple invoke example.
//!
//! Spins up an in-process echo provider speaking the framed-JSON codec,
//! publishes it through the in-memory registry, and invokes it through the
//! client facade.

use bytes::BytesMut;
use dubbo_client::{CallOptions, ConsumerOptions, DubboClient};
use dubbo_codec::{Codec, Packet, Response, RpcResult};
use dubbo_codec_json::{JsonCodec, JsonCodecFactory};
use dubbo_registry_memory::MemoryRegistry;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Echo provider answering every invocation with its first argument.
async fn run_provider() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(handle_connection(stream));
        }
    });

    addr
}

async fn handle_connection(mut stream: TcpStream) {
    let mut codec = JsonCodec::new();
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let Ok(n) = stream.read_buf(&mut buf).await else {
            return;
        };
        if n == 0 {
            return;
        }

        while let Some(packet) = codec.decode(&mut buf).expect("provider decode failed") {
            let Packet::Request(request) = packet else {
                continue;
            };
            let response = if request.is_heartbeat() {
                Response::heartbeat(request.id)
            } else {
                let invocation = request.invocation.unwrap();
                println!(
                    "provider: {}({}) for path {}",
                    invocation.method_name,
                    invocation.args.len(),
                    invocation.attachments["path"],
                );
                Response::new(
                    request.id,
                    RpcResult {
                        value: invocation.args.into_iter().next(),
                        exception: None,
                    },
                )
            };

            let mut out = BytesMut::new();
            codec.encode_response(&response, &mut out).unwrap();
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let provider_addr = run_provider().await;

    let registry = Arc::new(MemoryRegistry::new());
    let options = ConsumerOptions::new("com.example.HelloService").with_version("1.0.0");
    registry.publish(
        &options.descriptor(),
        vec![format!(
            "dubbo://{provider_addr}/com.example.HelloService?version=1.0.0"
        )],
    );

    let client = DubboClient::builder()
        .registry(registry)
        .codec_factory(Arc::new(JsonCodecFactory))
        .app_name("simple-invoke")
        .build()
        .unwrap();

    let consumer = client.create_consumer(options).await.unwrap();
    let reply = consumer
        .invoke("sayHello", vec![json!("world")], CallOptions::new())
        .await
        .unwrap();
    println!("consumer: got {reply}");

    client.close().await;
}
