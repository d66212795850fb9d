use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::dht::node::{Contact, NodeID};
use crate::dht::protocol::{DhtProtocol, RpcClient};
use crate::dht::routing_table::RoutingTable;
use crate::exceptions::Result;
use crate::network::protocol::NetworkProtocol;
use crate::network::transport::UdpTransport;

/// A running burrow node: identity, routing table, RPC service, and the
/// lookup coordinator, wired together.
///
/// Construction binds the socket (so an ephemeral port is resolved
/// before the node's own contact is built); `start` begins serving and
/// runs the join sequence.
pub struct BurrowNode {
    pub config: Config,
    pub node_id: NodeID,
    pub self_contact: Contact,
    pub routing_table: Arc<RwLock<RoutingTable>>,
    pub transport: Arc<UdpTransport>,
    pub network_protocol: Arc<NetworkProtocol>,
    pub dht_protocol: Arc<DhtProtocol>,
    local_addr: SocketAddr,
}

impl BurrowNode {
    pub async fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(UdpTransport::new(
            &config.network.listen_host,
            config.network.listen_port,
        ));
        let local_addr = transport.bind().await?;

        let node_id = NodeID::generate();
        let self_contact = Contact::from_addr(node_id, local_addr);
        info!(node_id = %hex::encode(&node_id.0[..8]), address = %local_addr, "Node identity created");

        let routing_table = Arc::new(RwLock::new(RoutingTable::new(node_id, config.dht.k)));

        let network_protocol = Arc::new(NetworkProtocol::new(
            transport.clone(),
            self_contact.clone(),
            routing_table.clone(),
            &config.dht,
        ));

        let dht_protocol = Arc::new(DhtProtocol::new(
            node_id,
            routing_table.clone(),
            network_protocol.clone() as Arc<dyn RpcClient>,
            &config.dht,
        ));
        network_protocol.set_dht(dht_protocol.clone()).await;

        Ok(Self {
            config,
            node_id,
            self_contact,
            routing_table,
            transport,
            network_protocol,
            dht_protocol,
            local_addr,
        })
    }

    /// Serve requests and join the network.
    ///
    /// A failed join is a warning, not a fatal error: the node keeps
    /// serving as a single-node network.
    pub async fn start(&self) -> Result<()> {
        self.network_protocol.clone().start().await?;

        match self.bootstrap_contact()? {
            Some(bootstrap) => {
                if let Err(e) = self.dht_protocol.join(bootstrap).await {
                    warn!(error = %e, "Join failed, continuing as a single-node network");
                }
            }
            None => {
                info!("No bootstrap peer, acting as the designated bootstrap node");
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        self.network_protocol.stop().await;
        info!("Node stopped");
    }

    /// The bootstrap contact to join through, or None when this node is
    /// itself the designated bootstrap.
    ///
    /// The bootstrap's real ID is unknown until it answers, so the
    /// contact carries the zero placeholder ID.
    fn bootstrap_contact(&self) -> Result<Option<Contact>> {
        let Some(configured) = &self.config.network.bootstrap_node else {
            return Ok(None);
        };
        let address: SocketAddr = configured
            .parse()
            .map_err(|_| crate::exceptions::NetworkError::BadAddress(configured.clone()))?;
        if address == self.local_addr {
            return Ok(None);
        }
        Ok(Some(Contact::from_addr(NodeID::zero(), address)))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Send a single PING to `address` from a throwaway socket and report
/// whether anything answered within the configured timeout.
pub async fn probe(config: &Config, address: SocketAddr) -> Result<bool> {
    let transport = Arc::new(UdpTransport::new("0.0.0.0", 0));
    transport.bind().await?;

    let node_id = NodeID::generate();
    let local = transport
        .local_addr()
        .await
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let self_contact = Contact::from_addr(node_id, local);
    let routing_table = Arc::new(RwLock::new(RoutingTable::new(node_id, config.dht.k)));
    let protocol = Arc::new(NetworkProtocol::new(
        transport.clone(),
        self_contact,
        routing_table,
        &config.dht,
    ));
    protocol.clone().start().await?;

    let target = Contact::from_addr(NodeID::zero(), address);
    let reachable = protocol.ping(&target).await;
    protocol.stop().await;
    Ok(reachable)
}
