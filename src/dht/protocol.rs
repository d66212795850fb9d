use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DhtConfig;
use crate::dht::node::{Contact, ID_LENGTH, NodeID};
use crate::dht::routing_table::{AddOutcome, RoutingTable};
use crate::exceptions::{DhtError, NetworkError, Result};

/// What a single FIND_NODE call against one peer produced.
#[derive(Debug, Clone)]
pub struct FoundNodes {
    /// The peer had the desired ID in its own routing table.
    pub found: bool,
    pub contacts: Vec<Contact>,
}

/// Outbound RPC surface, implemented by the network layer.
///
/// The seam exists so lookup and eviction logic can be exercised against
/// a scripted network in tests.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Liveness probe. False covers both "no" and "unreachable".
    async fn ping(&self, contact: &Contact) -> bool;

    /// Ask a peer for the contacts it knows closest to `target`.
    async fn find_node(&self, contact: &Contact, target: &NodeID) -> Result<FoundNodes>;
}

/// Result of one iterative lookup invocation.
#[derive(Debug, Clone)]
pub struct LookupResult {
    /// The exact contact, when some peer reported it.
    pub found: Option<Contact>,
    /// Up to k contacts closest to the target, ascending by distance.
    /// Peers that failed their query during this lookup are excluded.
    pub closest: Vec<Contact>,
}

/// Iterative node lookup and the contact admission policy, built on the
/// routing table and the RPC client.
pub struct DhtProtocol {
    pub node_id: NodeID,
    pub routing_table: Arc<RwLock<RoutingTable>>,
    network: Arc<dyn RpcClient>,
    pub alpha: usize,
    pub k: usize,
    pub max_rounds: usize,
    pub lookup_timeout: Duration,
}

impl DhtProtocol {
    pub fn new(
        node_id: NodeID,
        routing_table: Arc<RwLock<RoutingTable>>,
        network: Arc<dyn RpcClient>,
        config: &DhtConfig,
    ) -> Self {
        Self {
            node_id,
            routing_table,
            network,
            alpha: config.alpha,
            k: config.k,
            max_rounds: config.max_rounds,
            lookup_timeout: Duration::from_secs_f64(config.lookup_timeout),
        }
    }

    /// Admit a contact into the routing table.
    ///
    /// When its bucket is full, the least-recently-seen entry is probed
    /// with PING while no table lock is held; the lock is re-acquired
    /// only to commit the keep-or-evict decision. An unresponsive head
    /// is the only path that ever evicts a contact.
    pub async fn add_contact(&self, contact: Contact) {
        if contact.node_id == self.node_id {
            return;
        }

        let outcome = {
            let mut rt = self.routing_table.write().await;
            rt.add(contact.clone())
        };

        if let AddOutcome::Full { head } = outcome {
            let alive = self.network.ping(&head).await;
            let mut rt = self.routing_table.write().await;
            if alive {
                debug!(head = %head, "Bucket head answered probe, keeping it");
                rt.keep_head(&head.node_id);
            } else {
                debug!(head = %head, newcomer = %contact, "Evicting unresponsive bucket head");
                rt.replace_head(&head.node_id, contact);
            }
        }
    }

    /// Iterative nearest-node search.
    ///
    /// Runs rounds of up to `alpha` concurrent FIND_NODE calls against
    /// the unqueried shortlist entries nearest to `target`, merging every
    /// reply back into the shortlist and the routing table. Terminates on
    /// an exact match, on a round that improves nothing while the k
    /// nearest entries are all queried, on shortlist exhaustion, or on
    /// the hard round cap. The overall deadline returns the best
    /// shortlist accumulated so far instead of failing.
    pub async fn lookup(&self, target: &NodeID, seeds: Option<Vec<Contact>>) -> LookupResult {
        let deadline = Instant::now() + self.lookup_timeout;

        let mut shortlist: Vec<Contact> = match seeds {
            Some(seeds) => seeds,
            None => {
                let rt = self.routing_table.read().await;
                rt.find_closest(target, self.k)
            }
        };
        shortlist.sort_by_key(|c| c.node_id.distance_to(target));
        shortlist.dedup_by_key(|c| c.node_id);

        let mut queried: HashSet<NodeID> = HashSet::new();
        let mut failed: HashSet<NodeID> = HashSet::new();
        let mut found: Option<Contact> = None;
        let mut best: Option<[u8; ID_LENGTH]> =
            shortlist.first().map(|c| c.node_id.distance_to(target));

        for round in 0..self.max_rounds {
            if Instant::now() >= deadline {
                warn!(round, "Lookup deadline reached, returning best shortlist");
                break;
            }

            let candidates: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.node_id))
                .take(self.alpha)
                .cloned()
                .collect();
            if candidates.is_empty() {
                break;
            }

            let calls = candidates.iter().map(|c| self.network.find_node(c, target));
            let results = join_all(calls).await;

            // Queried regardless of outcome, so failed peers are never retried.
            for candidate in &candidates {
                queried.insert(candidate.node_id);
            }

            let mut merged: Vec<Contact> = Vec::new();
            for (peer, result) in candidates.iter().zip(results) {
                match result {
                    Ok(reply) => {
                        if reply.found {
                            if let Some(exact) =
                                reply.contacts.iter().find(|c| &c.node_id == target)
                            {
                                found = Some(exact.clone());
                            }
                        }
                        merged.extend(reply.contacts);
                    }
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Peer unreachable during lookup round");
                        failed.insert(peer.node_id);
                    }
                }
            }
            // A peer that just failed its query is known not-live and
            // must not rank in the result.
            shortlist.retain(|c| !failed.contains(&c.node_id));

            for contact in merged {
                if contact.node_id == self.node_id || failed.contains(&contact.node_id) {
                    continue;
                }
                if shortlist.iter().all(|c| c.node_id != contact.node_id) {
                    shortlist.push(contact.clone());
                }
                self.add_contact(contact).await;
            }
            shortlist.sort_by_key(|c| c.node_id.distance_to(target));

            if found.is_some() {
                break;
            }

            let new_best = shortlist.first().map(|c| c.node_id.distance_to(target));
            let improved = match (&best, &new_best) {
                (Some(old), Some(new)) => new < old,
                (None, Some(_)) => true,
                _ => false,
            };
            let nearest_all_queried = shortlist
                .iter()
                .take(self.k)
                .all(|c| queried.contains(&c.node_id));
            if !improved && nearest_all_queried {
                break;
            }
            if improved {
                best = new_best;
            }
        }

        let mut closest: Vec<Contact> = shortlist.into_iter().take(self.k).collect();
        if let Some(exact) = &found {
            if closest.iter().all(|c| c.node_id != exact.node_id) {
                closest.insert(0, exact.clone());
                closest.truncate(self.k);
            }
        }

        LookupResult { found, closest }
    }

    /// Locate the exact contact for `target` in the network.
    ///
    /// Seeds the search from the routing table. Fails with
    /// [`DhtError::NodeNotFound`] when no queried peer reported the
    /// target.
    pub async fn find_contact(&self, target: &NodeID) -> Result<Contact> {
        let result = self.lookup(target, None).await;
        result.found.ok_or_else(|| DhtError::NodeNotFound.into())
    }

    /// Join the network through a bootstrap contact.
    ///
    /// One lookup for the node's own ID, seeded with the single
    /// bootstrap contact, populates the routing table and announces this
    /// node to every peer it queries.
    pub async fn join(&self, bootstrap: Contact) -> Result<usize> {
        info!(bootstrap = %bootstrap, "Joining network");
        let own_id = self.node_id;
        let _ = self.lookup(&own_id, Some(vec![bootstrap])).await;

        let learned = self.routing_table.read().await.contact_count();
        if learned == 0 {
            return Err(NetworkError::Bootstrap.into());
        }
        info!(contacts = learned, "Join completed");
        Ok(learned)
    }
}
