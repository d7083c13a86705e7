//! C2: the per-owner-name node.
//!
//! A [`NameNode`] is the cache's unit of sharing: one entry per owner
//! name, holding every type currently cached at that name. The header
//! chain is protected by the node's own lock (the "per-node
//! spinlock" of §5 — modeled here with `std::sync::Mutex`, which is
//! held only ever briefly to inspect or mutate the chain, never
//! across a blocking call).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dns_types::protocol::types::DomainName;

use crate::header::{attr, SlabHeader, TypePair};

/// Whether, and how, a node participates in the auxiliary NSEC trie
/// (§3, C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsecTag {
    /// This name has no active NSEC record.
    None,
    /// This name's value *is* an NSEC record: it belongs in the NSEC
    /// trie, keyed on its own owner name.
    IsNsec,
    /// This name has an NSEC record cached but is not itself used as
    /// an NSEC-trie entry (reserved for future multi-NSEC-per-name
    /// schemes; current production use only produces `IsNsec`).
    HasNsec,
}

/// One type's current header at this name. The version chain of
/// anything it displaced hangs off `current.down`.
#[derive(Debug, Clone)]
pub struct HeaderSlot {
    pub type_pair: TypePair,
    pub current: Arc<SlabHeader>,
}

#[derive(Debug)]
pub(crate) struct NameNodeInner {
    pub(crate) headers: Vec<HeaderSlot>,
    pub(crate) nsec_tag: NsecTag,
    pub(crate) dirty: bool,
}

/// Per-owner-name container: the header chain plus reference
/// book-keeping that decides when the node can be reclaimed.
#[derive(Debug)]
pub struct NameNode {
    pub name: DomainName,
    inner: Mutex<NameNodeInner>,
    /// Handles held by callers (cache lookups that returned this node,
    /// find results, etc). The node is only a deletion candidate once
    /// this drops to zero.
    external_refs: AtomicUsize,
    /// The cache's own root node is never deleted even when it holds
    /// no data — see invariant 1 in §8.
    is_origin: bool,
}

impl NameNode {
    pub fn new(name: DomainName, is_origin: bool) -> Self {
        NameNode {
            name,
            inner: Mutex::new(NameNodeInner {
                headers: Vec::new(),
                nsec_tag: NsecTag::None,
                dirty: false,
            }),
            external_refs: AtomicUsize::new(0),
            is_origin,
        }
    }

    /// `newref`: take an external handle on this node. Release/acquire
    /// on the counter, as required by §5.
    pub fn newref(&self) -> usize {
        self.external_refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// `decref`: drop an external handle. Returns `true` if the node
    /// is now a candidate for the dead-node list (refcount zero, no
    /// data, not the origin) — invariant 1 in §8.
    pub fn decref(&self) -> bool {
        let prev = self.external_refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "decref on a node with no external refs");
        prev == 1 && !self.is_origin && !self.has_data()
    }

    pub fn external_refcount(&self) -> usize {
        self.external_refs.load(Ordering::Acquire)
    }

    pub fn is_origin(&self) -> bool {
        self.is_origin
    }

    /// Lock the header chain — the "per-node spinlock". Held only
    /// across chain inspection/mutation, never across a second node's
    /// lock or a find-lock acquisition (§5).
    pub(crate) fn lock(&self) -> MutexGuard<'_, NameNodeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_data(&self) -> bool {
        !self.inner.lock().unwrap_or_else(|e| e.into_inner()).headers.is_empty()
    }

    pub fn nsec_tag(&self) -> NsecTag {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).nsec_tag
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).dirty
    }

    /// `clean()`: drop any NONEXISTENT or ANCIENT header from the
    /// chain (and, unless `keep_stale` is set, STALE ones too). The
    /// `down` version chain of a dropped header is always freed along
    /// with it — dropping the `Arc` is sufficient once no reader holds
    /// a clone.
    pub fn clean(&self, keep_stale: bool) {
        let mut inner = self.lock();
        inner.headers.retain(|slot| {
            let h = &slot.current;
            if h.is_nonexistent() || h.is_ancient() {
                return false;
            }
            if h.is_set(attr::STALE) && !keep_stale {
                return false;
            }
            true
        });
    }
}

impl NameNodeInner {
    pub fn find_slot(&self, type_pair: TypePair) -> Option<&HeaderSlot> {
        self.headers.iter().find(|s| s.type_pair == type_pair)
    }

    pub fn find_slot_mut(&mut self, type_pair: TypePair) -> Option<&mut HeaderSlot> {
        self.headers.iter_mut().find(|s| s.type_pair == type_pair)
    }

    pub fn headers(&self) -> &[HeaderSlot] {
        &self.headers
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn set_nsec_tag(&mut self, tag: NsecTag) {
        self.nsec_tag = tag;
    }

    /// Insert (or replace) the slot for `type_pair`, honoring
    /// priority-type ordering for a first-time insert (§4.5 step 6).
    pub fn upsert(&mut self, type_pair: TypePair, header: Arc<SlabHeader>) {
        if let Some(slot) = self.find_slot_mut(type_pair) {
            slot.current = header;
            return;
        }

        let priority = type_pair.insertion_priority();
        let pos = self
            .headers
            .iter()
            .position(|s| s.type_pair.insertion_priority() > priority)
            .unwrap_or(self.headers.len());
        self.headers.insert(pos, HeaderSlot { type_pair, current: header });
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Trust;
    use dns_types::protocol::types::test_util::domain;
    use dns_types::protocol::types::{RecordType, RecordTypeWithData};

    fn a_header(ttl: u64) -> Arc<SlabHeader> {
        Arc::new(SlabHeader::new(
            TypePair::Ordinary(RecordType::A),
            vec![RecordTypeWithData::A {
                address: "1.1.1.1".parse().unwrap(),
            }],
            ttl,
            Trust::Answer,
        ))
    }

    #[test]
    fn decref_to_zero_with_no_data_is_a_dead_candidate() {
        let node = NameNode::new(domain("example.com."), false);
        node.newref();
        assert!(node.decref());
    }

    #[test]
    fn decref_with_data_is_not_a_dead_candidate() {
        let node = NameNode::new(domain("example.com."), false);
        node.newref();
        node.lock().upsert(TypePair::Ordinary(RecordType::A), a_header(100));
        assert!(!node.decref());
    }

    #[test]
    fn origin_is_never_a_dead_candidate() {
        let node = NameNode::new(domain("."), true);
        node.newref();
        assert!(!node.decref());
    }

    #[test]
    fn clean_drops_ancient_and_nonexistent_headers() {
        let node = NameNode::new(domain("example.com."), false);
        let live = a_header(100);
        let ancient = a_header(50);
        ancient.mark(attr::ANCIENT);

        node.lock()
            .upsert(TypePair::Ordinary(RecordType::AAAA), ancient);
        node.lock().upsert(TypePair::Ordinary(RecordType::A), live);

        node.clean(false);
        assert_eq!(1, node.lock().headers().len());
    }

    #[test]
    fn upsert_orders_by_priority_on_first_insert() {
        let node = NameNode::new(domain("example.com."), false);
        node.lock()
            .upsert(TypePair::Ordinary(RecordType::TXT), a_header(100));
        node.lock()
            .upsert(TypePair::Ordinary(RecordType::SOA), a_header(100));
        node.lock()
            .upsert(TypePair::Ordinary(RecordType::A), a_header(100));

        let inner = node.lock();
        let types: Vec<_> = inner.headers().iter().map(|s| s.type_pair).collect();
        assert_eq!(
            vec![
                TypePair::Ordinary(RecordType::SOA),
                TypePair::Ordinary(RecordType::A),
                TypePair::Ordinary(RecordType::TXT),
            ],
            types
        );
    }
}
