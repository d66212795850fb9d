use std::collections::HashSet;

use crate::dht::node::{Contact, ID_BITS, NodeID, common_prefix_length};

/// K-Bucket: fixed-capacity contact list ordered by recency.
///
/// Index 0 is the least-recently-seen contact, the tail the most
/// recently seen. Node IDs within a bucket are unique.
pub struct KBucket {
    k: usize,
    contacts: Vec<Contact>,
}

impl KBucket {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            contacts: Vec::with_capacity(k),
        }
    }

    /// Index of the contact with this ID, if present.
    pub fn find(&self, id: &NodeID) -> Option<usize> {
        self.contacts.iter().position(|c| &c.node_id == id)
    }

    /// Append to the tail. The caller checks capacity and duplicates.
    pub fn push(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    pub fn remove_at(&mut self, index: usize) -> Contact {
        self.contacts.remove(index)
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.k
    }

    /// Move an existing entry to the tail, marking it most recently seen.
    ///
    /// Returns false when the ID is not in this bucket.
    pub fn touch(&mut self, id: &NodeID) -> bool {
        match self.find(id) {
            Some(index) => {
                let contact = self.contacts.remove(index);
                self.contacts.push(contact);
                true
            }
            None => false,
        }
    }

    /// The least-recently-seen contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }
}

/// What `RoutingTable::add` decided about a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The contact is the local node itself; a node never stores itself.
    SelfContact,
    /// Already known; moved to the tail of its bucket.
    Refreshed,
    /// Appended to a bucket with room.
    Added,
    /// The target bucket is full. The caller must probe `head` for
    /// liveness without holding the table lock, then commit the outcome
    /// via `keep_head` or `replace_head`.
    Full { head: Contact },
}

/// XOR-distance indexed contact table: one bucket per common-prefix
/// length with the local node ID, plus a membership set for O(1)
/// existence checks.
///
/// All mutation goes through `add` / `keep_head` / `replace_head`, which
/// keep the membership set exactly equal to the union of bucket contents.
pub struct RoutingTable {
    pub node_id: NodeID,
    pub k: usize,
    buckets: Vec<KBucket>,
    members: HashSet<NodeID>,
}

impl RoutingTable {
    pub fn new(node_id: NodeID, k: usize) -> Self {
        let mut buckets = Vec::with_capacity(ID_BITS);
        for _ in 0..ID_BITS {
            buckets.push(KBucket::new(k));
        }

        Self {
            node_id,
            k,
            buckets,
            members: HashSet::new(),
        }
    }

    /// Bucket index for an ID: the common prefix length of its XOR
    /// distance to the local ID. None for the local ID itself.
    fn bucket_index(&self, id: &NodeID) -> Option<usize> {
        let distance = self.node_id.distance_to(id);
        let index = common_prefix_length(&distance);
        if index >= ID_BITS { None } else { Some(index) }
    }

    /// Admit or refresh a contact.
    ///
    /// When the target bucket is full, no eviction happens here: the
    /// decision is returned so the caller can probe the bucket head
    /// outside the lock.
    pub fn add(&mut self, contact: Contact) -> AddOutcome {
        let Some(index) = self.bucket_index(&contact.node_id) else {
            return AddOutcome::SelfContact;
        };

        let bucket = &mut self.buckets[index];
        if bucket.touch(&contact.node_id) {
            return AddOutcome::Refreshed;
        }

        if !bucket.is_full() {
            self.members.insert(contact.node_id);
            bucket.push(contact);
            return AddOutcome::Added;
        }

        match bucket.head() {
            Some(head) => AddOutcome::Full { head: head.clone() },
            // k = 0 corner: nothing can ever be stored
            None => AddOutcome::Refreshed,
        }
    }

    /// Commit a successful liveness probe: the head answered, so it is
    /// refreshed and the candidate that triggered the probe is dropped.
    pub fn keep_head(&mut self, head_id: &NodeID) {
        if let Some(index) = self.bucket_index(head_id) {
            self.buckets[index].touch(head_id);
        }
    }

    /// Commit a failed liveness probe: evict the stale head and admit
    /// the replacement.
    ///
    /// Re-checks the state under the lock, since the table may have
    /// changed while the probe was in flight.
    pub fn replace_head(&mut self, stale_id: &NodeID, replacement: Contact) {
        if let Some(index) = self.bucket_index(stale_id) {
            if let Some(position) = self.buckets[index].find(stale_id) {
                let removed = self.buckets[index].remove_at(position);
                self.members.remove(&removed.node_id);
            }
        }

        let Some(index) = self.bucket_index(&replacement.node_id) else {
            return;
        };
        let bucket = &mut self.buckets[index];
        if bucket.touch(&replacement.node_id) {
            return;
        }
        if !bucket.is_full() {
            self.members.insert(replacement.node_id);
            bucket.push(replacement);
        }
    }

    /// O(1) membership check through the tracking set.
    pub fn exists(&self, id: &NodeID) -> bool {
        self.members.contains(id)
    }

    /// Exact contact fetch, used for the FIND_NODE exact-match reply.
    pub fn get(&self, id: &NodeID) -> Option<Contact> {
        if !self.members.contains(id) {
            return None;
        }
        let index = self.bucket_index(id)?;
        let bucket = &self.buckets[index];
        bucket.find(id).map(|position| bucket.contacts()[position].clone())
    }

    /// Up to `count` contacts closest to `target`, ascending by XOR
    /// distance.
    ///
    /// Buckets are visited outward from the target's ideal index in both
    /// directions until enough contacts are collected or the table is
    /// exhausted; a one-directional scan under-returns whenever the
    /// buckets below the ideal index are sparse.
    pub fn find_closest(&self, target: &NodeID, count: usize) -> Vec<Contact> {
        let ideal = self.bucket_index(target).unwrap_or(ID_BITS - 1);
        let mut collected: Vec<Contact> = Vec::new();

        for offset in 0..ID_BITS {
            if let Some(below) = ideal.checked_sub(offset) {
                collected.extend(self.buckets[below].contacts().iter().cloned());
            }
            let above = ideal + offset;
            if offset > 0 && above < ID_BITS {
                collected.extend(self.buckets[above].contacts().iter().cloned());
            }
            if collected.len() >= count {
                break;
            }
        }

        collected.sort_by_key(|c| c.node_id.distance_to(target));
        collected.truncate(count);
        collected
    }

    /// Total number of contacts across all buckets.
    pub fn contact_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::node::ID_LENGTH;

    fn contact_with_prefix(first: u8, second: u8) -> Contact {
        let mut id = [0u8; ID_LENGTH];
        id[0] = first;
        id[1] = second;
        Contact::new(NodeID::new(id), "127.0.0.1", "9000")
    }

    fn table() -> RoutingTable {
        RoutingTable::new(NodeID::zero(), 20)
    }

    #[test]
    fn never_stores_the_local_node() {
        let mut rt = table();
        let this = Contact::new(rt.node_id, "127.0.0.1", "9000");
        assert_eq!(rt.add(this), AddOutcome::SelfContact);
        assert!(rt.is_empty());
    }

    #[test]
    fn bucket_never_exceeds_k() {
        let mut rt = table();
        // All first-bit-set IDs land in bucket 0 relative to the zero ID.
        for second in 0..40u8 {
            rt.add(contact_with_prefix(0x80, second));
        }
        assert_eq!(rt.contact_count(), 20);
    }

    #[test]
    fn re_adding_refreshes_instead_of_duplicating() {
        let mut rt = table();
        let a = contact_with_prefix(0x80, 1);
        let b = contact_with_prefix(0x80, 2);
        assert_eq!(rt.add(a.clone()), AddOutcome::Added);
        assert_eq!(rt.add(b.clone()), AddOutcome::Added);
        assert_eq!(rt.add(a.clone()), AddOutcome::Refreshed);
        assert_eq!(rt.contact_count(), 2);

        // The refreshed contact became most recently seen, so a full
        // bucket now reports b as the probe candidate.
        for second in 3..30u8 {
            rt.add(contact_with_prefix(0x80, second));
        }
        let outcome = rt.add(contact_with_prefix(0x80, 60));
        assert_eq!(
            outcome,
            AddOutcome::Full {
                head: b
            }
        );
    }

    #[test]
    fn full_bucket_defers_the_eviction_decision() {
        let mut rt = table();
        for second in 0..20u8 {
            assert_eq!(
                rt.add(contact_with_prefix(0x80, second)),
                AddOutcome::Added
            );
        }
        let newcomer = contact_with_prefix(0x80, 99);
        let outcome = rt.add(newcomer.clone());
        let AddOutcome::Full { head } = outcome else {
            panic!("expected a full bucket");
        };
        assert_eq!(head, contact_with_prefix(0x80, 0));
        // Not admitted yet, caller decides.
        assert!(!rt.exists(&newcomer.node_id));

        rt.replace_head(&head.node_id, newcomer.clone());
        assert!(!rt.exists(&head.node_id));
        assert!(rt.exists(&newcomer.node_id));
        assert_eq!(rt.contact_count(), 20);
    }

    #[test]
    fn keep_head_refreshes_the_probed_contact() {
        let mut rt = table();
        for second in 0..20u8 {
            rt.add(contact_with_prefix(0x80, second));
        }
        let head = contact_with_prefix(0x80, 0);
        rt.keep_head(&head.node_id);
        // The old head answered its probe, so the next full-bucket add
        // must offer a different candidate.
        let outcome = rt.add(contact_with_prefix(0x80, 77));
        assert_eq!(
            outcome,
            AddOutcome::Full {
                head: contact_with_prefix(0x80, 1)
            }
        );
    }

    #[test]
    fn find_closest_searches_both_directions() {
        let mut rt = table();
        // Target has common prefix length 1 with the local ID, so its
        // ideal bucket is 1 and stays empty here.
        let target = NodeID::new({
            let mut id = [0u8; ID_LENGTH];
            id[0] = 0x40;
            id
        });
        let lower = contact_with_prefix(0x80, 0); // bucket 0
        let higher = contact_with_prefix(0x20, 0); // bucket 2
        rt.add(lower.clone());
        rt.add(higher.clone());

        let closest = rt.find_closest(&target, 2);
        assert_eq!(closest.len(), 2);
        // 0x20 XOR 0x40 = 0x60 < 0xC0 = 0x80 XOR 0x40
        assert_eq!(closest[0], higher);
        assert_eq!(closest[1], lower);
    }

    #[test]
    fn find_closest_sorts_and_bounds_the_result() {
        let mut rt = table();
        for second in 0..30u8 {
            rt.add(contact_with_prefix(0x80, second));
            rt.add(contact_with_prefix(0x01, second));
        }
        let target = contact_with_prefix(0x80, 7).node_id;
        let closest = rt.find_closest(&target, 20);

        assert_eq!(closest.len(), 20);
        for pair in closest.windows(2) {
            assert!(pair[0].node_id.distance_to(&target) < pair[1].node_id.distance_to(&target));
        }
        let mut seen = HashSet::new();
        assert!(closest.iter().all(|c| seen.insert(c.node_id)));
        assert_eq!(closest[0].node_id, target);
    }

    #[test]
    fn exists_and_get_track_bucket_contents() {
        let mut rt = table();
        let contact = contact_with_prefix(0x08, 3);
        assert!(!rt.exists(&contact.node_id));
        assert!(rt.get(&contact.node_id).is_none());

        rt.add(contact.clone());
        assert!(rt.exists(&contact.node_id));
        assert_eq!(rt.get(&contact.node_id), Some(contact));
    }
}
