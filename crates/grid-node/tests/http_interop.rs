//! RemoteNode ↔ node server interoperability over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;

use grid_node::{node_router, CommandRequest, LocalNode, Node, NodeError, RemoteNode};
use grid_proto::{Capabilities, SessionId};
use http::Method;

fn firefox() -> Capabilities {
    Capabilities::new().with("browserName", "firefox")
}

fn chrome() -> Capabilities {
    Capabilities::new().with("browserName", "chrome")
}

/// Serve a one-firefox-slot local node on an ephemeral port.
async fn serve_node() -> (Arc<LocalNode>, SocketAddr) {
    let node = Arc::new(
        LocalNode::builder("http://worker-1:5555")
            .add_stereotype(firefox(), 1)
            .build(),
    );
    let app = node_router(node.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (node, addr)
}

async fn connect_remote(addr: SocketAddr) -> RemoteNode {
    RemoteNode::connect(format!("http://{addr}"))
        .await
        .expect("connect to served node")
}

#[tokio::test]
async fn connect_learns_node_id_from_status() {
    let (node, addr) = serve_node().await;
    let remote = connect_remote(addr).await;
    assert_eq!(remote.id(), node.id());
}

#[tokio::test]
async fn remote_session_lifecycle() {
    let (_node, addr) = serve_node().await;
    let remote = connect_remote(addr).await;

    assert!(remote.is_ready().await);
    assert!(remote.is_supporting(&firefox()).await);
    assert!(!remote.is_supporting(&chrome()).await);

    let session = remote.new_session(firefox()).await.expect("create session");
    assert_eq!(session.uri, "http://worker-1:5555");

    let fetched = remote.get_session(session.id).await.expect("fetch session");
    assert_eq!(fetched.id, session.id);
    assert!(remote.is_session_owner(session.id).await);
    assert!(!remote.is_session_owner(SessionId::new()).await);

    remote.stop_session(session.id).await.expect("stop session");
    assert!(matches!(
        remote.stop_session(session.id).await,
        Err(NodeError::NotFound(_))
    ));
}

#[tokio::test]
async fn remote_no_capacity_when_slot_taken() {
    let (node, addr) = serve_node().await;
    let remote = connect_remote(addr).await;

    node.new_session(firefox()).await.expect("occupy the slot");

    let result = remote.new_session(firefox()).await;
    assert!(matches!(result, Err(NodeError::NoCapacity)));
}

#[tokio::test]
async fn remote_status_snapshot_is_frozen() {
    let (_node, addr) = serve_node().await;
    let remote = connect_remote(addr).await;

    let session = remote.new_session(firefox()).await.expect("create session");
    let snapshot = remote.status().await.expect("status");

    remote.stop_session(session.id).await.expect("stop");

    assert_eq!(snapshot.session_ids(), vec![session.id]);
    let fresh = remote.status().await.expect("fresh status");
    assert!(fresh.session_ids().is_empty());
}

#[tokio::test]
async fn remote_command_pass_through() {
    let (_node, addr) = serve_node().await;
    let remote = connect_remote(addr).await;

    let session = remote.new_session(firefox()).await.expect("create session");

    let command = CommandRequest::new(
        session.id,
        Method::POST,
        format!("/session/{}/url", session.id),
    )
    .with_body(br#"{"url":"https://example.com"}"#.to_vec());

    let response = remote.execute_command(command).await.expect("forward command");
    assert_eq!(response.status, http::StatusCode::OK);

    // Commands against a session nobody owns come back as 404 verbatim.
    let command = CommandRequest::new(
        SessionId::new(),
        Method::GET,
        format!("/session/{}/url", SessionId::new()),
    );
    let response = remote.execute_command(command).await.expect("forward command");
    assert_eq!(response.status, http::StatusCode::NOT_FOUND);
}
