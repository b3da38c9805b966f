//! Whole-grid scenarios: distributor, queue, directory, nodes and the
//! client-facing proxy wired together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use grid_distributor::{proxy_router, Distributor, DistributorConfig, SchedulingError};
use grid_node::{node_router, LocalNode, Node, RemoteNode};
use grid_proto::{Capabilities, EventBus, Session};
use grid_queue::NewSessionQueue;
use grid_sessions::{InMemorySessionMap, SessionCleanup, SessionMap, SessionMapError};

fn firefox() -> Capabilities {
    Capabilities::new().with("browserName", "firefox")
}

struct Grid {
    distributor: Arc<Distributor>,
    map: Arc<InMemorySessionMap>,
    queue: Arc<NewSessionQueue>,
    bus: EventBus,
}

fn make_grid(request_timeout: Duration) -> Grid {
    let map = Arc::new(InMemorySessionMap::new());
    let queue = Arc::new(NewSessionQueue::new(request_timeout));
    let bus = EventBus::new();
    let distributor = Distributor::builder(map.clone(), queue.clone(), bus.clone())
        .config(DistributorConfig {
            request_timeout,
            ..DistributorConfig::default()
        })
        .build()
        .expect("valid config");
    Grid {
        distributor,
        map,
        queue,
        bus,
    }
}

async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::test]
async fn queued_request_satisfied_when_capacity_frees() {
    let grid = make_grid(Duration::from_secs(5));
    let node = Arc::new(
        LocalNode::builder("http://worker-1:5555")
            .add_stereotype(firefox(), 1)
            .build(),
    );
    grid.distributor.add_node(node).await.expect("register");

    // A takes the only slot and lands in the directory.
    let session_a = grid
        .distributor
        .new_session(firefox())
        .await
        .expect("first session");
    assert!(grid.map.get(session_a.id).await.is_ok());

    // B has nowhere to go and parks in the queue.
    let distributor = grid.distributor.clone();
    let waiter = tokio::spawn(async move { distributor.new_session(firefox()).await });
    for _ in 0..100 {
        if grid.queue.size() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(grid.queue.size(), 1);

    // Stopping A frees the slot; B gets a fresh session on it.
    grid.distributor
        .stop_session(session_a.id)
        .await
        .expect("stop first session");

    let session_b = waiter
        .await
        .expect("join")
        .expect("queued session satisfied");
    assert_ne!(session_b.id, session_a.id);
    assert_eq!(session_b.uri, "http://worker-1:5555");

    assert!(matches!(
        grid.map.get(session_a.id).await,
        Err(SessionMapError::NotFound(_))
    ));
    assert!(grid.map.get(session_b.id).await.is_ok());
    assert_eq!(grid.queue.size(), 0);
}

#[tokio::test]
async fn queued_request_times_out_without_capacity() {
    let grid = make_grid(Duration::from_millis(100));
    let node = Arc::new(
        LocalNode::builder("http://worker-1:5555")
            .add_stereotype(firefox(), 1)
            .build(),
    );
    grid.distributor.add_node(node).await.expect("register");
    grid.distributor
        .new_session(firefox())
        .await
        .expect("occupy the slot");

    let result = grid.distributor.new_session(firefox()).await;
    assert!(matches!(result, Err(SchedulingError::Timeout)));
    assert_eq!(grid.queue.size(), 0);
}

#[tokio::test]
async fn node_removal_evicts_directory_entries() {
    let grid = make_grid(Duration::from_millis(100));
    let _cleanup = SessionCleanup::spawn(&grid.bus, grid.map.clone());

    let node = Arc::new(
        LocalNode::builder("http://worker-1:5555")
            .add_stereotype(firefox(), 1)
            .build(),
    );
    grid.distributor
        .add_node(node.clone())
        .await
        .expect("register");
    let session = grid
        .distributor
        .new_session(firefox())
        .await
        .expect("session");

    grid.distributor
        .remove_node(node.id())
        .await
        .expect("deregister");

    // The cleanup listener reacts to the published removal.
    for _ in 0..100 {
        if matches!(
            grid.map.get(session.id).await,
            Err(SessionMapError::NotFound(_))
        ) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session of removed node was not evicted");
}

#[tokio::test]
async fn proxy_drives_a_remote_node_over_sockets() {
    let grid = make_grid(Duration::from_millis(500));

    // Bind the worker first so its advertised uri is the socket it
    // actually answers on; forwarded commands resolve through that uri.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind worker port");
    let worker_addr = listener.local_addr().expect("local addr");
    let worker_uri = format!("http://{worker_addr}");
    let worker = Arc::new(
        LocalNode::builder(worker_uri.clone())
            .add_stereotype(firefox(), 1)
            .build(),
    );
    let app = node_router(worker);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let remote = RemoteNode::connect(worker_uri.clone())
        .await
        .expect("connect to worker");
    grid.distributor
        .add_node(Arc::new(remote))
        .await
        .expect("register remote node");

    let proxy_addr = serve(proxy_router(grid.distributor.clone(), grid.map.clone())).await;
    let proxy = format!("http://{proxy_addr}");
    let client = reqwest::Client::new();

    // Readiness reflects the registered worker.
    let response = client
        .get(format!("{proxy}/readyz"))
        .send()
        .await
        .expect("readyz");
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    // Create a session through the proxy.
    let response = client
        .post(format!("{proxy}/se/grid/session"))
        .json(&serde_json::json!({"capabilities": {"browserName": "firefox"}}))
        .send()
        .await
        .expect("create session");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session: Session = response.json().await.expect("session body");
    assert!(grid.map.get(session.id).await.is_ok());

    // An arbitrary command is forwarded to the owning worker verbatim.
    let response = client
        .post(format!("{proxy}/session/{}/url", session.id))
        .body(r#"{"url":"https://example.com"}"#)
        .send()
        .await
        .expect("forward command");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // Tear the session down and confirm routing stops.
    let response = client
        .delete(format!("{proxy}/se/grid/session/{}", session.id))
        .send()
        .await
        .expect("stop session");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = client
        .post(format!("{proxy}/session/{}/url", session.id))
        .send()
        .await
        .expect("forward after stop");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // A second session through the proxy works on the freed slot.
    let response = client
        .post(format!("{proxy}/se/grid/session"))
        .json(&serde_json::json!({"capabilities": {"browserName": "firefox"}}))
        .send()
        .await
        .expect("second session");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let second: Session = response.json().await.expect("session body");
    assert_ne!(second.id, session.id);
}
