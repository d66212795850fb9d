use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::DhtConfig;
use crate::dht::node::{Contact, NodeID};
use crate::dht::protocol::{DhtProtocol, FoundNodes, RpcClient};
use crate::dht::routing_table::RoutingTable;
use crate::exceptions::{NetworkError, Result};
use crate::network::consts::*;
use crate::network::transport::{Message, UdpTransport};

/// Envelope framing every datagram: a tag byte for dispatch, a random
/// correlation id matching replies to requests, and the sender's ID so
/// every message names its origin.
#[derive(Serialize, Deserialize, Debug)]
pub struct Envelope {
    pub msg_type: u8,
    pub id: [u8; 16],
    pub node_id: NodeID,
    /// rmp-encoded message body
    pub payload: Vec<u8>,
}

/// PING carries no payload; the caller is identified by the envelope.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PingRequest {}

/// Reply to PING.
#[derive(Serialize, Deserialize, Debug)]
pub struct Pong {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrMsg")]
    pub err_msg: String,
}

/// Request for the contacts closest to `desired_node_id`.
#[derive(Serialize, Deserialize, Debug)]
pub struct FindNodeRequest {
    #[serde(rename = "RequestFrom")]
    pub request_from: Contact,
    #[serde(rename = "DesiredNodeID")]
    pub desired_node_id: NodeID,
}

/// Reply to FIND_NODE: the exact contact when `found`, otherwise up to
/// k contacts nearest the desired ID.
#[derive(Serialize, Deserialize, Debug)]
pub struct FindNodeReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Found")]
    pub found: bool,
    #[serde(rename = "Contacts")]
    pub contacts: Vec<Contact>,
    #[serde(rename = "ErrMsg")]
    pub err_msg: String,
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(body).map_err(|e| NetworkError::Protocol(e.to_string()).into())
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    rmp_serde::from_slice(data).map_err(|e| NetworkError::Protocol(e.to_string()).into())
}

type ResponseSender = oneshot::Sender<(u8, NodeID, Vec<u8>)>;

/// Request/response RPC boundary over UDP.
///
/// Serves PING and FIND_NODE, matches replies to in-flight requests by
/// correlation id, and feeds every peer that talks to us into the
/// routing table.
pub struct NetworkProtocol {
    pub transport: Arc<UdpTransport>,
    pub node_id: NodeID,
    /// Our own contact, sent as RequestFrom in FIND_NODE requests.
    pub self_contact: Contact,
    pub routing_table: Arc<RwLock<RoutingTable>>,
    /// Lookup coordinator, wired after construction to break the
    /// protocol/coordinator cycle.
    dht: RwLock<Option<Arc<DhtProtocol>>>,
    /// Requests awaiting a matching reply.
    pending_requests: Arc<Mutex<HashMap<[u8; 16], ResponseSender>>>,
    pub request_timeout: Duration,
    pub ping_timeout: Duration,
}

impl NetworkProtocol {
    pub fn new(
        transport: Arc<UdpTransport>,
        self_contact: Contact,
        routing_table: Arc<RwLock<RoutingTable>>,
        config: &DhtConfig,
    ) -> Self {
        Self {
            transport,
            node_id: self_contact.node_id,
            self_contact,
            routing_table,
            dht: RwLock::new(None),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            request_timeout: Duration::from_secs_f64(config.request_timeout),
            ping_timeout: Duration::from_secs_f64(config.ping_timeout),
        }
    }

    /// Wire in the lookup coordinator once it exists.
    pub async fn set_dht(&self, dht: Arc<DhtProtocol>) {
        let mut slot = self.dht.write().await;
        *slot = Some(dht);
    }

    /// Start serving requests on the already-bound transport.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let proto = self.clone();
        let transport = self.transport.clone();

        transport
            .start(move |msg| {
                let p = proto.clone();
                Box::pin(async move {
                    p.handle_incoming_message(msg).await;
                })
            })
            .await?;

        info!("Network protocol started");
        Ok(())
    }

    pub async fn stop(&self) {
        self.transport.stop().await;
        info!("Network protocol stopped");
    }

    /// Decode a datagram and route it: matched replies complete the
    /// waiting request, everything else is dispatched as a request.
    pub async fn handle_incoming_message(&self, message: Message) {
        let envelope: Envelope = match decode(&message.data) {
            Ok(env) => env,
            Err(e) => {
                debug!(address = %message.address, error = %e, "Dropping undecodable datagram");
                return;
            }
        };

        {
            let mut pending = self.pending_requests.lock().await;
            if let Some(sender) = pending.remove(&envelope.id) {
                let _ = sender.send((envelope.msg_type, envelope.node_id, envelope.payload));
                return;
            }
        }

        if let Err(e) = self.handle_request(envelope, message.address).await {
            error!(error = %e, "Error handling request");
        }
    }

    /// Serve one inbound request.
    ///
    /// The sender is admitted into the routing table before the reply
    /// is computed; this is how the contact graph propagates.
    async fn handle_request(&self, envelope: Envelope, address: SocketAddr) -> Result<()> {
        match envelope.msg_type {
            MSG_PING => {
                let caller = Contact::from_addr(envelope.node_id, address);
                self.admit(caller).await;

                let pong = Pong {
                    success: true,
                    err_msg: String::new(),
                };
                self.send_response(MSG_PONG, envelope.id, encode(&pong)?, address)
                    .await
            }

            MSG_FIND_NODE => {
                let request: FindNodeRequest = decode(&envelope.payload)?;
                self.admit(request.request_from).await;

                let reply = {
                    let rt = self.routing_table.read().await;
                    match rt.get(&request.desired_node_id) {
                        Some(exact) => FindNodeReply {
                            success: true,
                            found: true,
                            contacts: vec![exact],
                            err_msg: String::new(),
                        },
                        None => FindNodeReply {
                            success: true,
                            found: false,
                            contacts: rt.find_closest(&request.desired_node_id, rt.k),
                            err_msg: String::new(),
                        },
                    }
                };
                self.send_response(MSG_FIND_NODE_RESPONSE, envelope.id, encode(&reply)?, address)
                    .await
            }

            other => {
                debug!(msg_type = other, "Unhandled message type");
                Ok(())
            }
        }
    }

    /// Feed a peer into the routing table.
    ///
    /// Goes through the lookup coordinator so a full bucket triggers the
    /// liveness probe; before the coordinator is wired, falls back to a
    /// plain insert that keeps the existing head.
    async fn admit(&self, contact: Contact) {
        let dht = { self.dht.read().await.clone() };
        match dht {
            Some(dht) => dht.add_contact(contact).await,
            None => {
                let mut rt = self.routing_table.write().await;
                let _ = rt.add(contact);
            }
        }
    }

    async fn send_response(
        &self,
        msg_type: u8,
        msg_id: [u8; 16],
        payload: Vec<u8>,
        address: SocketAddr,
    ) -> Result<()> {
        let data = self.pack_message(msg_type, msg_id, payload)?;
        self.transport.send(&data, address).await
    }

    fn pack_message(&self, msg_type: u8, msg_id: [u8; 16], payload: Vec<u8>) -> Result<Vec<u8>> {
        let envelope = Envelope {
            msg_type,
            id: msg_id,
            node_id: self.node_id,
            payload,
        };
        encode(&envelope)
    }

    /// Send a request and wait for its correlated reply.
    ///
    /// A timeout or send failure makes the peer unreachable for this
    /// call only; nothing else is concluded from it.
    async fn request(
        &self,
        address: SocketAddr,
        msg_type: u8,
        payload: Vec<u8>,
        wait: Duration,
    ) -> Result<(u8, NodeID, Vec<u8>)> {
        let msg_id: [u8; 16] = rand::random();
        let (tx, rx) = oneshot::channel();

        self.pending_requests.lock().await.insert(msg_id, tx);

        let data = self.pack_message(msg_type, msg_id, payload)?;
        if let Err(e) = self.transport.send(&data, address).await {
            self.pending_requests.lock().await.remove(&msg_id);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            _ => {
                self.pending_requests.lock().await.remove(&msg_id);
                Err(NetworkError::Timeout.into())
            }
        }
    }
}

#[async_trait]
impl RpcClient for NetworkProtocol {
    async fn ping(&self, contact: &Contact) -> bool {
        let Ok(address) = contact.address() else {
            warn!(contact = %contact, "Cannot ping contact with invalid address");
            return false;
        };
        let Ok(payload) = encode(&PingRequest::default()) else {
            return false;
        };

        match self
            .request(address, MSG_PING, payload, self.ping_timeout)
            .await
        {
            Ok((MSG_PONG, responder_id, payload)) => {
                let alive = matches!(decode::<Pong>(&payload), Ok(pong) if pong.success);
                if alive {
                    // An answered probe is an RPC from the responder.
                    self.admit(Contact::from_addr(responder_id, address)).await;
                }
                alive
            }
            _ => false,
        }
    }

    async fn find_node(&self, contact: &Contact, target: &NodeID) -> Result<FoundNodes> {
        let address = contact.address()?;
        let request = FindNodeRequest {
            request_from: self.self_contact.clone(),
            desired_node_id: *target,
        };

        let (msg_type, responder_id, payload) = self
            .request(address, MSG_FIND_NODE, encode(&request)?, self.request_timeout)
            .await?;
        if msg_type != MSG_FIND_NODE_RESPONSE {
            return Err(NetworkError::Protocol(format!("unexpected reply tag {msg_type}")).into());
        }

        let reply: FindNodeReply = decode(&payload)?;
        if !reply.success {
            return Err(NetworkError::Protocol(reply.err_msg).into());
        }

        self.admit(Contact::from_addr(responder_id, address)).await;

        Ok(FoundNodes {
            found: reply.found,
            contacts: reply.contacts,
        })
    }
}
