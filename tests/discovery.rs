use std::net::SocketAddr;
use std::time::{Duration, Instant};

use burrow::config::Config;
use burrow::node::{BurrowNode, probe};

fn test_config(bootstrap: Option<SocketAddr>) -> Config {
    let mut config = Config::default();
    config.network.listen_host = "127.0.0.1".to_string();
    config.network.listen_port = 0;
    config.network.bootstrap_node = bootstrap.map(|addr| addr.to_string());
    config.dht.ping_timeout = 1.0;
    config.dht.request_timeout = 2.0;
    config.dht.lookup_timeout = 10.0;
    config
}

async fn spawn_node(bootstrap: Option<SocketAddr>) -> BurrowNode {
    let node = BurrowNode::new(test_config(bootstrap))
        .await
        .expect("bind failed");
    node.start().await.expect("start failed");
    node
}

#[tokio::test]
async fn joining_node_lands_in_the_bootstrap_routing_table() {
    let bootstrap = spawn_node(None).await;
    let joiner = spawn_node(Some(bootstrap.local_addr())).await;

    // The bootstrap served the joiner's FIND_NODE before replying, so
    // by the time start() returns the joiner is already known there.
    let rt = bootstrap.routing_table.read().await;
    assert!(rt.exists(&joiner.node_id));

    joiner.stop().await;
    bootstrap.stop().await;
}

#[tokio::test]
async fn lookup_across_three_nodes_finds_the_exact_contact() {
    let bootstrap = spawn_node(None).await;
    let node_b = spawn_node(Some(bootstrap.local_addr())).await;
    let node_c = spawn_node(Some(bootstrap.local_addr())).await;

    // C seeds from its own table (it learned the bootstrap and B while
    // joining) and must resolve B's exact contact: the bootstrap has B
    // in its table, so the terminal hop answers Found within two rounds.
    let result = node_c.dht_protocol.lookup(&node_b.node_id, None).await;

    let found = result.found.expect("lookup did not find the target");
    assert_eq!(found.node_id, node_b.node_id);
    assert_eq!(found.address().unwrap(), node_b.local_addr());
    assert_eq!(result.closest.first().map(|c| c.node_id), Some(node_b.node_id));

    node_c.stop().await;
    node_b.stop().await;
    bootstrap.stop().await;
}

#[tokio::test]
async fn join_failure_leaves_the_node_serving() {
    // Reserve an address nothing will be listening on.
    let unused = {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap()
    };

    let lonely = spawn_node(Some(unused)).await;
    assert!(lonely.routing_table.read().await.is_empty());

    // Still answers probes despite the failed join.
    let reachable = probe(&test_config(None), lonely.local_addr())
        .await
        .unwrap();
    assert!(reachable);

    lonely.stop().await;
}

#[tokio::test]
async fn probe_of_a_dead_address_fails_within_the_timeout() {
    let unused = {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap()
    };

    let started = Instant::now();
    let reachable = probe(&test_config(None), unused).await.unwrap();
    assert!(!reachable);
    // ping_timeout is 1s in the test config; leave slack for a slow CI.
    assert!(started.elapsed() < Duration::from_secs(5));
}
