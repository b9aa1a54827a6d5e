//! End-to-end tests over a real TCP connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use ferrumslot::cluster::{NodeInfo, OwnershipValidator, SlotRange, SlotTopology};
use ferrumslot::protocol::{RespCodec, RespValue};
use ferrumslot::{server, Services};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;

struct Client {
    stream: TcpStream,
    codec: RespCodec,
    buffer: BytesMut,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        Client {
            stream: TcpStream::connect(addr).await.unwrap(),
            codec: RespCodec::new(),
            buffer: BytesMut::new(),
        }
    }

    async fn send(&mut self, parts: &[&str]) {
        let frame = RespValue::array(
            parts
                .iter()
                .map(|p| RespValue::bulk_string(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        );
        self.stream
            .write_all(&RespCodec::encode_to_bytes(&frame))
            .await
            .unwrap();
    }

    async fn read(&mut self) -> RespValue {
        loop {
            if let Some(value) = self.codec.decode(&mut self.buffer).unwrap() {
                return value;
            }
            let n = self.stream.read_buf(&mut self.buffer).await.unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    async fn call(&mut self, parts: &[&str]) -> RespValue {
        self.send(parts).await;
        self.read().await
    }
}

async fn start(cluster: OwnershipValidator) -> std::net::SocketAddr {
    let services = Services::start(Arc::new(cluster)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, services));
    addr
}

fn bulk(s: &str) -> RespValue {
    RespValue::bulk_string(Bytes::copy_from_slice(s.as_bytes()))
}

#[tokio::test]
async fn ping_set_get() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.call(&["PING"]).await, RespValue::simple_string("PONG"));
    assert_eq!(client.call(&["SET", "foo", "bar"]).await, RespValue::ok());
    assert_eq!(client.call(&["GET", "foo"]).await, bulk("bar"));
    assert_eq!(client.call(&["GET", "missing"]).await, RespValue::Null);
}

#[tokio::test]
async fn pipelined_requests_answer_in_order() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut client = Client::connect(addr).await;

    client.send(&["SET", "n", "1"]).await;
    client.send(&["INCR", "n"]).await;
    client.send(&["GET", "n"]).await;

    assert_eq!(client.read().await, RespValue::ok());
    assert_eq!(client.read().await, RespValue::integer(2));
    assert_eq!(client.read().await, bulk("2"));
}

#[tokio::test]
async fn multi_exec_over_the_wire() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.call(&["MULTI"]).await, RespValue::ok());
    assert_eq!(
        client.call(&["SET", "a", "1"]).await,
        RespValue::simple_string("QUEUED")
    );
    assert_eq!(
        client.call(&["INCR", "a"]).await,
        RespValue::simple_string("QUEUED")
    );
    assert_eq!(
        client.call(&["EXEC"]).await,
        RespValue::array(vec![RespValue::ok(), RespValue::integer(2)])
    );
}

#[tokio::test]
async fn blpop_wakes_on_push_from_another_client() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut waiter = Client::connect(addr).await;
    let mut pusher = Client::connect(addr).await;

    waiter.send(&["BLPOP", "jobs", "0"]).await;
    // Give the pop time to park before pushing
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pusher.call(&["RPUSH", "jobs", "x"]).await, RespValue::integer(1));

    let popped = tokio::time::timeout(Duration::from_secs(2), waiter.read())
        .await
        .expect("blocked pop never woke");
    assert_eq!(popped, RespValue::array(vec![bulk("jobs"), bulk("x")]));
    assert_eq!(pusher.call(&["LLEN", "jobs"]).await, RespValue::integer(0));
}

#[tokio::test]
async fn protocol_error_closes_the_connection() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut client = Client::connect(addr).await;

    client.stream.write_all(b"*1\r\n$x\r\n").await.unwrap();
    assert!(client.read().await.is_error());

    let mut rest = Vec::new();
    let n = client.stream.read_to_end(&mut rest).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn quit_closes_the_connection() {
    let addr = start(OwnershipValidator::standalone("local")).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.call(&["QUIT"]).await, RespValue::ok());
    let mut rest = Vec::new();
    assert_eq!(client.stream.read_to_end(&mut rest).await.unwrap(), 0);
}

/// This node ("a") owns 0..=8191; "b" owns the rest
fn node_a() -> OwnershipValidator {
    let topology = SlotTopology::new(vec![
        NodeInfo {
            id: "a".to_string(),
            host: "127.0.0.1".to_string(),
            port: 7000,
            slots: vec![SlotRange { start: 0, end: 8191 }],
        },
        NodeInfo {
            id: "b".to_string(),
            host: "10.0.0.2".to_string(),
            port: 7001,
            slots: vec![SlotRange { start: 8192, end: 16383 }],
        },
    ])
    .unwrap();
    OwnershipValidator::new("a", Arc::new(topology))
}

#[tokio::test]
async fn cluster_redirects_and_rejects_cross_slot() {
    let addr = start(node_a()).await;
    let mut client = Client::connect(addr).await;

    // bar hashes to 5061, served here
    assert_eq!(client.call(&["SET", "bar", "1"]).await, RespValue::ok());
    // foo hashes to 12182, served by b
    assert_eq!(
        client.call(&["GET", "foo"]).await,
        RespValue::error("MOVED 12182 10.0.0.2:7001")
    );
    assert_eq!(
        client.call(&["MGET", "foo", "bar"]).await,
        RespValue::error("CROSSSLOT Keys in request don't hash to the same slot")
    );
    // Hash tags keep related keys together
    assert_eq!(
        client.call(&["MSET", "{user}:1", "x", "{user}:2", "y"]).await,
        RespValue::ok()
    );
    assert_eq!(
        client.call(&["CLUSTER", "KEYSLOT", "foo"]).await,
        RespValue::integer(12182)
    );
}
