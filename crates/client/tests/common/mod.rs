//! Shared test support: an in-process provider speaking the framed-JSON
//! codec.
#![allow(dead_code)]

use bytes::BytesMut;
use dubbo_codec::packet::status;
use dubbo_codec::{Codec, Packet, Response, RpcResult};
use dubbo_codec_json::JsonCodec;
use dubbo_registry::{Endpoint, ServiceDescriptor};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// What the provider writes as soon as a client connects.
#[derive(Clone, Default)]
pub enum OnConnect {
    /// Nothing.
    #[default]
    Nothing,
    /// A response whose id matches no pending call.
    StrayResponse,
    /// A heartbeat probe the client must answer.
    HeartbeatProbe,
    /// Raw bytes that are not a frame.
    Garbage,
    /// Close the connection after a delay without answering anything.
    CloseAfter(Duration),
}

/// How the provider answers invocation requests.
#[derive(Clone, Default)]
pub enum Reply {
    /// Success echoing the first argument (or null).
    #[default]
    Echo,
    /// Success carrying the invocation's attachments as the value.
    EchoAttachments,
    /// Never answer.
    Silent,
    /// Protocol-level failure status.
    SystemError {
        status: u8,
        message: String,
    },
    /// Success carrying a business exception.
    Exception(String),
    /// Echo after a delay.
    DelayedEcho(Duration),
}

#[derive(Clone, Default)]
pub struct Behavior {
    pub on_connect: OnConnect,
    pub reply: Reply,
}

impl Behavior {
    pub fn reply(reply: Reply) -> Self {
        Self {
            on_connect: OnConnect::Nothing,
            reply,
        }
    }

    pub fn on_connect(on_connect: OnConnect) -> Self {
        Self {
            on_connect,
            reply: Reply::Echo,
        }
    }
}

/// In-process provider accepting framed-JSON connections.
pub struct MockServer {
    pub addr: SocketAddr,
    /// Every packet decoded from any client connection, in arrival order.
    pub packets: mpsc::UnboundedReceiver<Packet>,
}

impl MockServer {
    pub async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (packets_tx, packets) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(handle_connection(
                    stream,
                    behavior.clone(),
                    packets_tx.clone(),
                ));
            }
        });

        Self { addr, packets }
    }

    /// A service descriptor for tests.
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("com.example.HelloService").with_version("1.0.0")
    }

    /// Endpoint pointing at this server, extra query parameters allowed.
    pub fn endpoint(&self, query: &str) -> Endpoint {
        Endpoint::parse(&self.url(query), &Self::descriptor()).unwrap()
    }

    /// Provider URL for this server.
    pub fn url(&self, query: &str) -> String {
        format!(
            "dubbo://{}/com.example.HelloService?version=1.0.0&{}",
            self.addr, query
        )
    }

    /// Next recorded packet, failing the test after two seconds.
    pub async fn next_packet(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(2), self.packets.recv())
            .await
            .expect("timed out waiting for a packet")
            .expect("packet channel closed")
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    behavior: Behavior,
    packets_tx: mpsc::UnboundedSender<Packet>,
) {
    match behavior.on_connect {
        OnConnect::Nothing => {}
        OnConnect::StrayResponse => {
            let stray = Response::new(
                4242,
                RpcResult {
                    value: Some(json!("stray")),
                    exception: None,
                },
            );
            write_response(&mut stream, &stray).await;
        }
        OnConnect::HeartbeatProbe => {
            let probe = dubbo_codec::Request::heartbeat(7777);
            let mut codec = JsonCodec::new();
            let mut buf = BytesMut::new();
            codec.encode_request(&probe, &mut buf).unwrap();
            stream.write_all(&buf).await.unwrap();
        }
        OnConnect::Garbage => {
            stream.write_all(b"this is not a frame").await.unwrap();
            return;
        }
        OnConnect::CloseAfter(delay) => {
            tokio::time::sleep(delay).await;
            return;
        }
    }

    let mut codec = JsonCodec::new();
    let mut read_buf = BytesMut::with_capacity(4096);
    loop {
        let n = match tokio::io::AsyncReadExt::read_buf(&mut stream, &mut read_buf).await {
            Ok(n) => n,
            Err(_) => return,
        };
        if n == 0 {
            return;
        }

        while let Some(packet) = codec.decode(&mut read_buf).expect("server decode failed") {
            let _ = packets_tx.send(packet.clone());
            match packet {
                Packet::Request(request) if request.is_heartbeat() => {
                    write_response(&mut stream, &Response::heartbeat(request.id)).await;
                }
                Packet::Request(request) => {
                    let invocation = request.invocation.expect("invocation request without body");
                    match &behavior.reply {
                        Reply::Echo => {
                            let value = invocation.args.first().cloned().unwrap_or(Value::Null);
                            write_response(&mut stream, &success(request.id, value)).await;
                        }
                        Reply::EchoAttachments => {
                            let value = json!(invocation.attachments);
                            write_response(&mut stream, &success(request.id, value)).await;
                        }
                        Reply::Silent => {}
                        Reply::SystemError { status, message } => {
                            let response = Response {
                                id: request.id,
                                status: *status,
                                error_msg: Some(message.clone()),
                                event: false,
                                result: None,
                            };
                            write_response(&mut stream, &response).await;
                        }
                        Reply::Exception(message) => {
                            let response = Response::new(
                                request.id,
                                RpcResult {
                                    value: None,
                                    exception: Some(message.clone()),
                                },
                            );
                            write_response(&mut stream, &response).await;
                        }
                        Reply::DelayedEcho(delay) => {
                            tokio::time::sleep(*delay).await;
                            let value = invocation.args.first().cloned().unwrap_or(Value::Null);
                            write_response(&mut stream, &success(request.id, value)).await;
                        }
                    }
                }
                // Responses from the client (heartbeat acks) are only
                // recorded.
                Packet::Response(_) => {}
            }
        }
    }
}

fn success(id: i64, value: Value) -> Response {
    Response::new(
        id,
        RpcResult {
            value: Some(value),
            exception: None,
        },
    )
}

async fn write_response(stream: &mut TcpStream, response: &Response) {
    let mut codec = JsonCodec::new();
    let mut buf = BytesMut::new();
    codec.encode_response(response, &mut buf).unwrap();
    let _ = stream.write_all(&buf).await;
}

/// Protocol-level failure reply with the server-error status.
pub fn server_error(message: &str) -> Reply {
    Reply::SystemError {
        status: status::SERVER_ERROR,
        message: message.to_string(),
    }
}
