//! End-to-end tests for the multicast binding.
//!
//! # Test Strategy
//!
//! 1. **Round trips**: one datagram per message, payload intact
//! 2. **Group filtering**: datagrams for other groups never surface
//! 3. **Limits**: oversized messages, bind exhaustion
//! 4. **Channel setup**: rate hints and same-role suppression
//! 5. **Lifecycle**: stop unblocks receive

use std::sync::Arc;
use std::time::Duration;

use corelib::{DataType, Message, Meta, Node, NodeId, Role, Segment};
use tokio::net::UdpSocket;
use transport::{
    BindingKind, MulticastBinding, Transport, TransportConfig, TransportError, Van,
};

const SERVER: NodeId = NodeId(8);
const WORKER: NodeId = NodeId(9);

fn node(role: Role, id: NodeId, port: i32) -> Node {
    Node::new(role, "127.0.0.1", port).with_id(id)
}

async fn bound(me: Node) -> Van {
    let van = Van::new(BindingKind::Multicast, me, TransportConfig::default());
    van.start().await.unwrap();
    van.bind(&van.local_node(), 20).await.unwrap();
    van
}

fn message(to: NodeId, head: i32, payload: &[u8]) -> Message {
    let mut meta = Meta::default();
    meta.receiver = to;
    meta.head = head;
    meta.simple_app = true;
    let mut msg = Message::new(meta);
    msg.add_data(DataType::Char, Segment::copy_from_slice(payload));
    msg.add_data(DataType::Int32, Segment::copy_from_slice(&head.to_le_bytes()));
    msg
}

async fn receive_soon(van: &Van) -> Message {
    tokio::time::timeout(Duration::from_secs(5), van.receive())
        .await
        .expect("no datagram arrived")
        .unwrap()
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_datagram_round_trip() {
    let server = bound(node(Role::Server, SERVER, 0)).await;
    let worker = bound(node(Role::Worker, WORKER, 0)).await;
    worker.connect(&server.local_node()).await.unwrap();

    let sent = worker.send(message(SERVER, 4, b"gradient")).await.unwrap();
    assert!(sent > 8 + 4);

    let msg = receive_soon(&server).await;
    assert_eq!(msg.meta.sender, WORKER);
    assert_eq!(msg.meta.receiver, SERVER);
    assert_eq!(msg.meta.head, 4);
    assert!(msg.meta.simple_app);
    assert_eq!(msg.meta.data_type, vec![DataType::Char, DataType::Int32]);
    assert_eq!(&msg.data[0][..], b"gradient");
    assert_eq!(&msg.data[1][..], &4i32.to_le_bytes());

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

// ============================================================================
// Group Filtering
// ============================================================================

#[tokio::test]
async fn test_foreign_group_is_never_delivered() {
    let server = bound(node(Role::Server, SERVER, 0)).await;
    let worker = bound(node(Role::Worker, WORKER, 0)).await;
    worker.connect(&server.local_node()).await.unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = format!("127.0.0.1:{}", server.local_node().port);
    let mut foreign = vec![2u8, b'X', b'X'];
    foreign.extend_from_slice(b"not for this group");
    raw.send_to(&foreign, &target).await.unwrap();
    // Untagged noise.
    raw.send_to(&[0u8], &target).await.unwrap();

    worker.send(message(SERVER, 7, b"for PS")).await.unwrap();
    let msg = receive_soon(&server).await;
    assert_eq!(msg.meta.head, 7);
    assert_eq!(&msg.data[0][..], b"for PS");

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test]
async fn test_oversized_message_fails() {
    let server = bound(node(Role::Server, SERVER, 0)).await;
    let worker = bound(node(Role::Worker, WORKER, 0)).await;
    worker.connect(&server.local_node()).await.unwrap();

    let err = worker
        .send(message(SERVER, 1, &vec![0u8; 70_000]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Send { node, .. } if node == SERVER));

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_bind_exhaustion() {
    let taken = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let van = Van::new(
        BindingKind::Multicast,
        node(Role::Server, SERVER, i32::from(port)),
        TransportConfig::default(),
    );
    van.start().await.unwrap();
    let err = van.bind(&van.local_node(), 0).await.unwrap_err();
    assert!(matches!(err, TransportError::BindExhausted { attempts: 1 }));
    assert!(!err.is_fatal());

    // With retries a fallback port is found.
    let bound = van.bind(&van.local_node(), 50).await.unwrap();
    assert_ne!(bound, port);
    van.stop().await.unwrap();
}

#[tokio::test]
async fn test_group_join_failure_exhausts_bind() {
    // Longer than a group name may be, so every join fails.
    let config = TransportConfig::default().group("a-group-name-too-long");
    let van = Van::new(BindingKind::Multicast, node(Role::Server, SERVER, 0), config);
    van.start().await.unwrap();

    let err = van.bind(&van.local_node(), 2).await.unwrap_err();
    assert!(matches!(err, TransportError::BindExhausted { attempts: 3 }));
    assert!(matches!(van.receive().await, Err(TransportError::NotBound)));
    van.stop().await.unwrap();
}

// ============================================================================
// Channel Setup
// ============================================================================

#[tokio::test]
async fn test_rate_hint_needs_assigned_id() {
    let server = bound(node(Role::Server, SERVER, 0)).await;

    let known = MulticastBinding::new(node(Role::Worker, WORKER, 0), TransportConfig::default());
    known.start().await.unwrap();
    known.connect(&server.local_node()).await.unwrap();
    assert_eq!(known.channel_rate(SERVER).await, Some(4000));

    let newcomer = MulticastBinding::new(
        Node::new(Role::Worker, "127.0.0.1", 0),
        TransportConfig::default(),
    );
    newcomer.start().await.unwrap();
    newcomer.connect(&server.local_node()).await.unwrap();
    assert_eq!(newcomer.channel_rate(SERVER).await, None);

    known.stop().await.unwrap();
    newcomer.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_same_role_peers_are_not_connected() {
    let a = bound(node(Role::Server, NodeId(8), 0)).await;
    let b = bound(node(Role::Server, NodeId(10), 0)).await;

    a.connect(&b.local_node()).await.unwrap();
    assert!(a.connected_peers().await.is_empty());

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stop_unblocks_receive() {
    let server = Arc::new(bound(node(Role::Server, SERVER, 0)).await);

    let pending = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.stop().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("receive stayed blocked after stop")
        .unwrap();
    assert!(matches!(result, Err(TransportError::Closed)));
}
