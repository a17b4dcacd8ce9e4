//! End-to-end tests against real HTTP nodes served by axum

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tscluster_client::{CancellationToken, Client, ClientConfig, Request};
use tscluster_topology::{Topology, TopologyDocument, TopologyNode};

#[derive(Clone)]
struct MockNode {
    id: String,
    hash: String,
    document: Arc<String>,
    gossip_age: Arc<Mutex<f64>>,
}

async fn state(State(node): State<MockNode>) -> Json<Value> {
    Json(json!({
        "identity": node.id,
        "semver": "1.4.2",
        "topology": {"current": node.hash, "next": "-"},
    }))
}

async fn gossip(State(node): State<MockNode>) -> Json<Value> {
    let age = *node.gossip_age.lock();
    Json(json!([{
        "id": node.id,
        "gossip_time": "1700000000.000",
        "gossip_age": format!("{:.3}", age),
        "topo_current": node.hash,
        "topo_next": "-",
        "topo_state": "n/a",
        "latency": {},
    }]))
}

async fn topology(State(node): State<MockNode>, Path(hash): Path<String>) -> Response {
    if hash == node.hash {
        node.document.as_str().to_owned().into_response()
    } else {
        (StatusCode::NOT_FOUND, "unknown topology").into_response()
    }
}

async fn echo(State(node): State<MockNode>, body: String) -> impl IntoResponse {
    ([("x-topo-0", node.hash.clone())], format!("{}:{}", node.id, body))
}

struct TestCluster {
    seed: String,
    ages: Vec<Arc<Mutex<f64>>>,
    hash: String,
}

/// Start `live` HTTP nodes; the topology also lists one unreachable member
async fn start_cluster(live: usize) -> TestCluster {
    let mut listeners = Vec::new();
    for _ in 0..live {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let dead_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut members: Vec<TopologyNode> = listeners
        .iter()
        .enumerate()
        .map(|(i, l)| {
            TopologyNode::new(format!("node-{}", i + 1), "127.0.0.1", l.local_addr().unwrap().port(), 16)
        })
        .collect();
    members.push(TopologyNode::new("node-dead", "127.0.0.1", dead_port, 16));

    let hash = Topology::compile(members.clone(), None, 2)
        .unwrap()
        .hash()
        .to_string();
    let document = Arc::new(
        serde_json::to_string(&TopologyDocument {
            write_copies: 2,
            legacy_write_copies: 0,
            nodes: members,
        })
        .unwrap(),
    );

    let mut ages = Vec::new();
    let mut seed = String::new();
    for (i, listener) in listeners.into_iter().enumerate() {
        let age = Arc::new(Mutex::new(0.25));
        ages.push(age.clone());
        if i == 0 {
            seed = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        }

        let node = MockNode {
            id: format!("node-{}", i + 1),
            hash: hash.clone(),
            document: document.clone(),
            gossip_age: age,
        };
        let app = Router::new()
            .route("/state", get(state))
            .route("/gossip/json", get(gossip))
            .route("/topology/json/:hash", get(topology))
            .route("/echo", post(echo))
            .with_state(node);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
    }

    TestCluster { seed, ages, hash }
}

fn config(cluster: &TestCluster) -> ClientConfig {
    ClientConfig::new([cluster.seed.clone()])
        .with_discover(true)
        .with_dial_timeout(Duration::from_millis(200))
        .with_timeout(Duration::from_secs(2))
        .with_watch_interval(Duration::ZERO)
}

#[tokio::test]
async fn test_discovery_over_http() {
    let cluster = start_cluster(3).await;
    let client = Client::connect(config(&cluster)).await.unwrap();

    assert_eq!(client.pool().active_len(), 3);
    assert_eq!(client.pool().inactive_len(), 1);
    assert!(client.pool().find_by_id("node-dead").is_some());
    assert_eq!(client.current_topology(), cluster.hash);

    let topology = client.cached_topology().unwrap();
    assert_eq!(topology.len(), 4 * 16);

    let cancel = CancellationToken::new();
    let response = client
        .do_request(&cancel, Request::post("/echo", "hello"))
        .await
        .unwrap();
    assert!(response.text().ends_with(":hello"));
    assert_eq!(response.header("X-Topo-0"), Some(cluster.hash.as_str()));
}

#[tokio::test]
async fn test_stale_gossip_demotes_and_fresh_gossip_promotes() {
    let cluster = start_cluster(3).await;
    let client = Client::connect(config(&cluster)).await.unwrap();
    let cancel = CancellationToken::new();

    let verdicts = Arc::new(Mutex::new(Vec::new()));
    let seen = verdicts.clone();
    client.set_watch_hook(Some(Arc::new(move |node: &tscluster_client::Node, active: bool| {
        seen.lock().push((node.id(), active));
    })));

    *cluster.ages[2].lock() = 42.0;
    client.check_nodes(&cancel).await;
    assert_eq!(client.pool().active_len(), 2);
    assert!(client.pool().find_by_id("node-3").is_some());
    assert!(verdicts.lock().contains(&("node-3".to_string(), false)));
    assert!(verdicts.lock().contains(&("node-dead".to_string(), false)));

    *cluster.ages[2].lock() = 0.5;
    client.check_nodes(&cancel).await;
    assert_eq!(client.pool().active_len(), 3);
    assert!(verdicts.lock().contains(&("node-3".to_string(), true)));
}

#[tokio::test]
async fn test_watcher_loop_runs_until_cancelled() {
    let cluster = start_cluster(2).await;
    let client = Client::connect(config(&cluster).with_watch_interval(Duration::from_millis(20)))
        .await
        .unwrap();
    assert_eq!(client.pool().active_len(), 2);

    *cluster.ages[1].lock() = 60.0;
    let cancel = CancellationToken::new();
    let handle = client.watch_and_update(cancel.clone()).unwrap();

    let mut demoted = false;
    for _ in 0..100 {
        if client.pool().active_len() == 1 {
            demoted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(demoted);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_watcher_disabled_with_zero_interval() {
    let cluster = start_cluster(1).await;
    let client = Client::connect(config(&cluster)).await.unwrap();
    assert!(client.watch_and_update(CancellationToken::new()).is_none());
}
