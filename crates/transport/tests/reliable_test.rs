//! End-to-end tests for the reliable binding.
//!
//! # Test Strategy
//!
//! 1. **Round trips**: TCP and local-mode Unix sockets, with and without payload
//! 2. **Channel rules**: same-role suppression, missing channels, unknown senders
//! 3. **Concurrency**: parallel senders never interleave frames, a cut-short
//!    send never corrupts the next message
//! 4. **Lifecycle**: stop unblocks receive and send, operations outside
//!    start..stop fail

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corelib::{Command, Control, DataType, Message, Meta, Node, NodeId, Role, Segment};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use transport::{BindingKind, Transport, TransportConfig, TransportError, Van};

const SERVER: NodeId = NodeId(8);
const WORKER: NodeId = NodeId(9);

fn node(role: Role, id: NodeId, port: i32) -> Node {
    Node::new(role, "127.0.0.1", port).with_id(id)
}

async fn bound(me: Node, config: TransportConfig) -> Van {
    let van = Van::new(BindingKind::Reliable, me, config);
    van.start().await.unwrap();
    let port = van.bind(&van.local_node(), 20).await.unwrap();
    assert_eq!(van.local_node().port, i32::from(port));
    van
}

/// A started and bound server/worker pair, worker connected to server.
async fn pair(config: TransportConfig, server_port: i32, worker_port: i32) -> (Van, Van) {
    let server = bound(node(Role::Server, SERVER, server_port), config.clone()).await;
    let worker = bound(node(Role::Worker, WORKER, worker_port), config).await;
    worker.connect(&server.local_node()).await.unwrap();
    (server, worker)
}

fn data_message(to: NodeId, head: i32, segments: &[&str]) -> Message {
    let mut meta = Meta::default();
    meta.receiver = to;
    meta.head = head;
    meta.request = true;
    meta.push = true;
    meta.customer_id = 3;
    meta.timestamp = 77;
    let mut msg = Message::new(meta);
    for segment in segments {
        msg.add_data(DataType::UInt8, Segment::copy_from_slice(segment.as_bytes()));
    }
    msg
}

/// A peer that accepts one connection and never reads from it, so large
/// sends stall once the socket buffers fill up.
async fn stalled_peer() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let holder = tokio::spawn(async move {
        let (_conn, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    (port, holder)
}

/// A message far larger than any socket buffer.
fn bulk_message(to: NodeId) -> Message {
    let mut msg = data_message(to, 1, &[]);
    msg.add_data(DataType::Char, Segment::with_release(vec![1u8; 64 << 20], || {}));
    msg
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_tcp_round_trip() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;

    let sent = worker
        .send(data_message(SERVER, 1, &["keys-keys-keys", "vals"]))
        .await
        .unwrap();
    assert!(sent > 18);

    let msg = server.receive().await.unwrap();
    assert_eq!(msg.meta.sender, WORKER);
    assert_eq!(msg.meta.receiver, SERVER);
    assert_eq!(msg.meta.head, 1);
    assert_eq!(msg.meta.customer_id, 3);
    assert_eq!(msg.meta.timestamp, 77);
    assert!(msg.meta.request && msg.meta.push);
    assert_eq!(msg.meta.data_type, vec![DataType::UInt8, DataType::UInt8]);
    assert_eq!(&msg.data[0][..], b"keys-keys-keys");
    assert_eq!(&msg.data[1][..], b"vals");

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_local_mode_round_trip() {
    let base = 20000 + (std::process::id() % 15000) as i32 * 2;
    let config = TransportConfig::default().local(true);
    let (server, worker) = pair(config, base, base + 1).await;
    let socket_file = format!("/tmp/{}", server.local_node().port);
    assert!(Path::new(&socket_file).exists());

    worker.send(data_message(SERVER, 5, &["over unix"])).await.unwrap();
    let msg = server.receive().await.unwrap();
    assert_eq!(msg.meta.sender, WORKER);
    assert_eq!(&msg.data[0][..], b"over unix");

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
    assert!(!Path::new(&socket_file).exists());
}

#[tokio::test]
async fn test_control_message_without_payload() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;

    let mut meta = Meta::default();
    meta.receiver = SERVER;
    meta.control = Control::with_nodes(Command::AddNode, vec![worker.local_node()]);
    meta.body = Some("hello".to_string());
    worker.send(Message::new(meta.clone())).await.unwrap();

    let msg = server.receive().await.unwrap();
    assert!(msg.data.is_empty());
    assert_eq!(msg.meta.control, meta.control);
    assert_eq!(msg.meta.body.as_deref(), Some("hello"));

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_messages_from_one_peer_keep_order() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;

    for head in 0..10 {
        worker.send(data_message(SERVER, head, &["x"])).await.unwrap();
    }
    for head in 0..10 {
        assert_eq!(server.receive().await.unwrap().meta.head, head);
    }

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unassigned_sender_is_empty() {
    let server = bound(node(Role::Server, SERVER, 0), TransportConfig::default()).await;
    let newcomer = bound(
        Node::new(Role::Worker, "127.0.0.1", 0),
        TransportConfig::default(),
    )
    .await;
    newcomer.connect(&server.local_node()).await.unwrap();

    newcomer.send(data_message(SERVER, 1, &[])).await.unwrap();
    let msg = server.receive().await.unwrap();
    assert_eq!(msg.meta.sender, NodeId::EMPTY);

    newcomer.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_release_runs_once_after_send() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;
    let released = Arc::new(AtomicUsize::new(0));

    let mut msg = data_message(SERVER, 1, &[]);
    let counter = Arc::clone(&released);
    msg.add_data(
        DataType::Float,
        Segment::with_release(vec![0u8; 4096], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    worker.send(msg).await.unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let msg = server.receive().await.unwrap();
    assert_eq!(msg.data[0].len(), 4096);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

// ============================================================================
// Channel Rules
// ============================================================================

#[tokio::test]
async fn test_same_role_peers_are_not_connected() {
    let a = bound(node(Role::Worker, NodeId(9), 0), TransportConfig::default()).await;
    let b = bound(node(Role::Worker, NodeId(11), 0), TransportConfig::default()).await;

    a.connect(&b.local_node()).await.unwrap();
    assert!(a.connected_peers().await.is_empty());

    // Connecting to ourselves is allowed.
    a.connect(&a.local_node()).await.unwrap();
    assert_eq!(a.connected_peers().await, vec![NodeId(9)]);

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_replaces_channel() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;
    worker.connect(&server.local_node()).await.unwrap();
    assert_eq!(worker.connected_peers().await, vec![SERVER]);

    worker.send(data_message(SERVER, 2, &["after reconnect"])).await.unwrap();
    assert_eq!(server.receive().await.unwrap().meta.head, 2);

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_send_without_channel() {
    let worker = bound(node(Role::Worker, WORKER, 0), TransportConfig::default()).await;

    let err = worker.send(data_message(NodeId(42), 1, &[])).await.unwrap_err();
    assert!(matches!(err, TransportError::NoChannel(NodeId(42))));
    assert!(!err.is_fatal());
    assert!(worker.connected_peers().await.is_empty());

    worker.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_rejects_unaddressable_nodes() {
    let worker = bound(node(Role::Worker, WORKER, 0), TransportConfig::default()).await;

    let no_id = Node::new(Role::Server, "127.0.0.1", 9000);
    assert!(matches!(
        worker.connect(&no_id).await,
        Err(TransportError::Core(_))
    ));
    let no_port = node(Role::Server, SERVER, Node::EMPTY_PORT);
    assert!(matches!(
        worker.connect(&no_port).await,
        Err(TransportError::Core(_))
    ));

    worker.stop().await.unwrap();
}

#[tokio::test]
async fn test_mismatched_data_types_are_rejected() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;

    let mut msg = data_message(SERVER, 1, &["a"]);
    msg.meta.data_type.clear();
    assert!(matches!(worker.send(msg).await, Err(TransportError::Core(_))));

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_do_not_interleave() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;
    let worker = Arc::new(worker);

    let senders = 8;
    let per_sender = 20;
    let mut tasks = Vec::new();
    for s in 0..senders {
        let worker = Arc::clone(&worker);
        tasks.push(tokio::spawn(async move {
            for i in 0..per_sender {
                let head = s * 1000 + i;
                let fill = char::from(s as u8).to_string().repeat(1500);
                let msg = data_message(SERVER, head, &[&fill, &fill, &fill]);
                worker.send(msg).await.unwrap();
            }
        }));
    }

    let mut next = vec![0; senders as usize];
    for _ in 0..senders * per_sender {
        let msg = server.receive().await.unwrap();
        let s = msg.meta.head / 1000;
        assert_eq!(msg.meta.head % 1000, next[s as usize]);
        next[s as usize] += 1;
        assert_eq!(msg.data.len(), 3);
        for segment in &msg.data {
            assert!(segment.iter().all(|b| *b == s as u8));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_cut_short_send_drops_the_channel() {
    let (stalled_port, holder) = stalled_peer().await;
    let worker = bound(node(Role::Worker, WORKER, 0), TransportConfig::default()).await;
    worker
        .connect(&node(Role::Server, SERVER, i32::from(stalled_port)))
        .await
        .unwrap();

    let cut =
        tokio::time::timeout(Duration::from_millis(200), worker.send(bulk_message(SERVER))).await;
    assert!(cut.is_err(), "bulk send finished against a peer that never reads");

    // The stream now ends mid-frame; nothing more may go out on it.
    let err = worker
        .send(data_message(SERVER, 2, &["small"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Send { node, .. } if node == SERVER));
    assert!(worker.connected_peers().await.is_empty());

    // A fresh channel to the same id delivers intact messages.
    let server = bound(node(Role::Server, SERVER, 0), TransportConfig::default()).await;
    worker.connect(&server.local_node()).await.unwrap();
    worker.send(data_message(SERVER, 3, &["after"])).await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(5), server.receive())
        .await
        .expect("message after reconnect never arrived")
        .unwrap();
    assert_eq!(msg.meta.head, 3);
    assert_eq!(&msg.data[0][..], b"after");

    holder.abort();
    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_send_before_writing_keeps_the_channel() {
    let (server, worker) = pair(TransportConfig::default(), 0, 0).await;

    // Dropped before its first poll, so nothing reached the stream.
    drop(worker.send(data_message(SERVER, 1, &["never sent"])));
    worker.send(data_message(SERVER, 2, &["sent"])).await.unwrap();

    let msg = server.receive().await.unwrap();
    assert_eq!(msg.meta.head, 2);
    assert_eq!(worker.connected_peers().await, vec![SERVER]);

    worker.stop().await.unwrap();
    server.stop().await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stop_unblocks_receive() {
    let server = Arc::new(bound(node(Role::Server, SERVER, 0), TransportConfig::default()).await);

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

#[tokio::test]
async fn test_stop_unblocks_send() {
    let (stalled_port, holder) = stalled_peer().await;
    let worker = Arc::new(bound(node(Role::Worker, WORKER, 0), TransportConfig::default()).await);
    worker
        .connect(&node(Role::Server, SERVER, i32::from(stalled_port)))
        .await
        .unwrap();

    let pending = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.send(bulk_message(SERVER)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.stop().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("send stayed blocked after stop")
        .unwrap();
    assert!(matches!(result, Err(TransportError::Closed)));
    holder.abort();
}

#[tokio::test]
async fn test_operations_outside_start_stop() {
    let van = Van::new(
        BindingKind::Reliable,
        node(Role::Server, SERVER, 0),
        TransportConfig::default(),
    );
    assert!(matches!(
        van.bind(&van.local_node(), 0).await,
        Err(TransportError::NotStarted)
    ));
    assert!(matches!(van.stop().await, Err(TransportError::NotStarted)));

    van.start().await.unwrap();
    assert!(matches!(van.start().await, Err(TransportError::AlreadyStarted)));
    assert!(matches!(van.receive().await, Err(TransportError::NotBound)));

    van.stop().await.unwrap();
    assert!(matches!(van.receive().await, Err(TransportError::NotStarted)));
}
