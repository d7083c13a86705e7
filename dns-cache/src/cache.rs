//! C3: the answer cache.
//!
//! Two ordered maps stand in for the tries of §3 ("a concurrent trie
//! ... keyed by wire-format name"): [`DomainName`]'s `Ord` impl sorts
//! in RFC 4034 §6.1 canonical order, so a `BTreeMap<DomainName, _>`
//! gives the same adjacency a PATRICIA trie would — a name's
//! predecessor (needed for covering-NSEC) is just the previous
//! `BTreeMap` entry. This is the same order of simplification the
//! upstream resolver itself makes (a `HashMap` plus separate priority
//! queues, rather than a literal trie).
//!
//! The whole structure is protected by one `RwLock` per map rather
//! than true RCU; see the concurrency note in the crate root for why
//! that substitution is in scope.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use priority_queue::PriorityQueue;

use dns_types::protocol::types::{DomainName, RecordType, RecordTypeWithData};

use crate::header::{attr, SlabHeader, Trust, TypePair};
use crate::node::{NameNode, NsecTag};
use crate::options::{find_opt, AddMode};
use crate::result::{AddOutcome, FindOutcome};
use crate::stats::CacheStats;

/// Minimum TTL the cache will store for any record, per §4.9a / §8
/// boundary behavior 10.
pub const CACHE_TTL_MINIMUM: u64 = 10;
/// Maximum TTL the cache will store for any record.
pub const CACHE_TTL_MAXIMUM: u64 = 86_400;

/// Clamp an imported TTL to the cache's bounds. Glue/additional trust
/// is clamped to the minimum regardless of the RRset's own TTL;
/// ultimate-trust negatives always get TTL 0.
pub fn clamp_ttl(ttl: u64, trust: Trust, negative: bool) -> u64 {
    if negative && trust == Trust::Ultimate {
        return 0;
    }
    if trust == Trust::Glue || trust == Trust::Additional {
        return CACHE_TTL_MINIMUM;
    }
    ttl.clamp(CACHE_TTL_MINIMUM, CACHE_TTL_MAXIMUM)
}

fn is_ns_a_aaaa_ds(type_pair: TypePair) -> bool {
    matches!(
        type_pair,
        TypePair::Ordinary(RecordType::NS)
            | TypePair::Ordinary(RecordType::A)
            | TypePair::Ordinary(RecordType::AAAA)
            | TypePair::Ordinary(RecordType::DS)
    )
}

/// Two type pairs occupy the same logical slot on a name node when an
/// ordinary RRset and its negative-cache shadow both describe the same
/// underlying record type (§4.5 step 2: "find the topheader matching
/// `new.type_pair` or its paired negation").
fn logical_slot(type_pair: TypePair) -> Option<(TypePair, TypePair)> {
    match type_pair {
        TypePair::Ordinary(t) | TypePair::Negative(t) => {
            Some((TypePair::Ordinary(t), TypePair::Negative(t)))
        }
        TypePair::Sig(_) | TypePair::NegativeAny => None,
    }
}

/// A new RRset ready to be inserted, as handed to [`Cache::add`].
pub struct NewHeader {
    pub type_pair: TypePair,
    pub rdata: Vec<RecordTypeWithData>,
    pub ttl: u64,
    pub trust: Trust,
    /// Noqname/closest-encloser proofs to attach (or, on a refresh
    /// that turns out byte-equal to what's cached, to merge into the
    /// existing header — §3, §4.5 step 4).
    pub noqname: Option<crate::header::NegativeProof>,
    pub closest: Option<crate::header::NegativeProof>,
}

impl NewHeader {
    /// Convenience constructor for the common case of no attached
    /// negative proofs.
    pub fn new(type_pair: TypePair, rdata: Vec<RecordTypeWithData>, ttl: u64, trust: Trust) -> Self {
        NewHeader {
            type_pair,
            rdata,
            ttl,
            trust,
            noqname: None,
            closest: None,
        }
    }
}

type HeapKey = (DomainName, TypePair);

/// The answer cache itself.
pub struct Cache {
    origin: DomainName,
    main: RwLock<BTreeMap<DomainName, Arc<NameNode>>>,
    nsec: RwLock<BTreeMap<DomainName, Arc<NameNode>>>,
    heap: Mutex<PriorityQueue<HeapKey, Reverse<u64>>>,
    dead: Mutex<VecDeque<DomainName>>,
    stats: Option<Arc<CacheStats>>,
    serve_stale_ttl: AtomicU64,
    serve_stale_refresh: AtomicU64,
}

impl Cache {
    pub fn new(origin: DomainName) -> Self {
        let mut main = BTreeMap::new();
        main.insert(origin.clone(), Arc::new(NameNode::new(origin.clone(), true)));
        Cache {
            origin,
            main: RwLock::new(main),
            nsec: RwLock::new(BTreeMap::new()),
            heap: Mutex::new(PriorityQueue::new()),
            dead: Mutex::new(VecDeque::new()),
            stats: None,
            serve_stale_ttl: AtomicU64::new(0),
            serve_stale_refresh: AtomicU64::new(30),
        }
    }

    /// `setcachestats`.
    pub fn set_stats(&mut self, stats: Arc<CacheStats>) {
        self.stats = Some(stats);
    }

    /// `setservestalettl`.
    pub fn set_servestalettl(&self, seconds: u64) {
        self.serve_stale_ttl.store(seconds, Ordering::Release);
    }

    /// `setservestalerefresh`.
    pub fn set_servestalerefresh(&self, seconds: u64) {
        self.serve_stale_refresh.store(seconds, Ordering::Release);
    }

    fn get_or_create_node(&self, name: &DomainName) -> Arc<NameNode> {
        if let Some(node) = self.main.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return Arc::clone(node);
        }
        let mut main = self.main.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            main.entry(name.clone())
                .or_insert_with(|| Arc::new(NameNode::new(name.clone(), false))),
        )
    }

    fn find_node(&self, name: &DomainName) -> Option<Arc<NameNode>> {
        self.main
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(Arc::clone)
    }

    /// §4.3: `find(name, type, now, options) → result`.
    pub fn find(&self, name: &DomainName, qtype: RecordType, now: u64, options: u32) -> FindOutcome {
        if let Some(node) = self.find_node(name) {
            if let Some(outcome) = self.scan_node(&node, name, qtype, now, options) {
                self.record_find_stats(&outcome);
                return outcome;
            }
        }

        // Partial match: walk ancestors looking for an active DNAME,
        // then (if asked) a covering NSEC, then the deepest zone cut.
        for ancestor in name.ancestors() {
            if let Some(node) = self.find_node(&ancestor) {
                let inner = node.lock();
                if let Some(slot) = inner.find_slot(TypePair::Ordinary(RecordType::DNAME)) {
                    if slot.current.is_active(now) {
                        let outcome = FindOutcome::Dname {
                            found_name: ancestor.clone(),
                            rdataset: Arc::clone(&slot.current),
                            ttl: slot.current.remaining_ttl(now),
                        };
                        self.record_find_stats(&outcome);
                        return outcome;
                    }
                }
                if let Some(slot) = inner.find_slot(TypePair::Ordinary(RecordType::NS)) {
                    if slot.current.is_active(now) && ancestor != self.origin {
                        let outcome = FindOutcome::Delegation {
                            found_name: ancestor.clone(),
                            rdataset: Arc::clone(&slot.current),
                            ttl: slot.current.remaining_ttl(now),
                        };
                        self.record_find_stats(&outcome);
                        return outcome;
                    }
                }
            }
        }

        if options & find_opt::COVERINGNSEC != 0 {
            if let Some((owner, rrset, rrsig)) = self.covering_nsec(name, now) {
                let ttl = rrset.remaining_ttl(now);
                let outcome = FindOutcome::CoveringNsec {
                    found_name: owner,
                    rdataset: rrset,
                    sigrdataset: rrsig,
                    ttl,
                };
                self.record_find_stats(&outcome);
                return outcome;
            }
        }

        if self.find_node(name).is_some() || name.ancestors().iter().any(|a| self.find_node(a).is_some()) {
            let outcome = FindOutcome::PartialMatch {
                found_name: name.clone(),
            };
            self.record_find_stats(&outcome);
            return outcome;
        }

        self.record_find_stats(&FindOutcome::NotFound);
        FindOutcome::NotFound
    }

    fn record_find_stats(&self, outcome: &FindOutcome) {
        let Some(stats) = &self.stats else { return };
        match outcome {
            FindOutcome::NotFound => stats.record_miss(),
            FindOutcome::CoveringNsec { .. } => {
                stats.record_hit();
                stats.record_coveringnsec();
            }
            _ => stats.record_hit(),
        }
    }

    /// Try an exact match at `node`. Returns `None` if the node holds
    /// no header usable for this query (the caller then falls back to
    /// the ancestor walk, per §4.3 step 5's `empty_node`).
    fn scan_node(
        &self,
        node: &NameNode,
        name: &DomainName,
        qtype: RecordType,
        now: u64,
        options: u32,
    ) -> Option<FindOutcome> {
        let inner = node.lock();

        if let Some(slot) = inner.find_slot(TypePair::NegativeAny) {
            if self.header_usable(&slot.current, now, options) {
                let found_name = name.clone();
                let ttl = slot.current.remaining_ttl(now);
                return Some(if slot.current.is_set(attr::NXDOMAIN) {
                    FindOutcome::NcacheNxdomain {
                        found_name,
                        rdataset: Arc::clone(&slot.current),
                        ttl,
                    }
                } else {
                    FindOutcome::NcacheNxrrset {
                        found_name,
                        rdataset: Arc::clone(&slot.current),
                        ttl,
                    }
                });
            }
        }

        if let Some(slot) = inner.find_slot(TypePair::Ordinary(qtype)) {
            if self.header_usable(&slot.current, now, options) {
                return Some(FindOutcome::Success {
                    found_name: name.clone(),
                    ttl: slot.current.remaining_ttl(now),
                    rdataset: Arc::clone(&slot.current),
                    sigrdataset: inner
                        .find_slot(TypePair::Sig(qtype))
                        .map(|s| Arc::clone(&s.current)),
                });
            }
        }

        if let Some(slot) = inner.find_slot(TypePair::Negative(qtype)) {
            if self.header_usable(&slot.current, now, options) {
                return Some(FindOutcome::NcacheNxrrset {
                    found_name: name.clone(),
                    ttl: slot.current.remaining_ttl(now),
                    rdataset: Arc::clone(&slot.current),
                });
            }
        }

        if qtype != RecordType::CNAME && options & find_opt::ALLOWCNAME != 0 {
            if let Some(slot) = inner.find_slot(TypePair::Ordinary(RecordType::CNAME)) {
                if self.header_usable(&slot.current, now, options) {
                    return Some(FindOutcome::Cname {
                        found_name: name.clone(),
                        ttl: slot.current.remaining_ttl(now),
                        rdataset: Arc::clone(&slot.current),
                    });
                }
            }
        }

        None
    }

    /// Whether a header can satisfy a lookup right now: active
    /// outright, or stale-but-permitted under the option bits and the
    /// per-database `serve_stale_ttl` (§4.3's stale-serve paragraph).
    fn header_usable(&self, header: &SlabHeader, now: u64, options: u32) -> bool {
        if header.is_active(now) {
            return true;
        }
        if !header.exists() || header.is_ignore() || header.is_ancient() {
            return false;
        }
        let stale_ok = options & find_opt::STALEOK != 0 && options & find_opt::STALEENABLED != 0;
        if !stale_ok {
            return false;
        }
        let stale_ttl = self.serve_stale_ttl.load(Ordering::Acquire);
        stale_ttl > 0 && now < header.ttl() + stale_ttl
    }

    /// §4.4: covering-NSEC lookup. Finds the predecessor of `name` in
    /// the NSEC trie and reads its NSEC/RRSIG(NSEC) headers.
    fn covering_nsec(
        &self,
        name: &DomainName,
        now: u64,
    ) -> Option<(DomainName, Arc<SlabHeader>, Option<Arc<SlabHeader>>)> {
        let nsec = self.nsec.read().unwrap_or_else(|e| e.into_inner());
        let (owner, _) = nsec.range(..name.clone()).next_back()?;
        let owner = owner.clone();
        drop(nsec);

        let node = self.find_node(&owner)?;
        let inner = node.lock();
        let slot = inner.find_slot(TypePair::Ordinary(RecordType::NSEC))?;
        if !slot.current.is_active(now) {
            return None;
        }
        let rrset = Arc::clone(&slot.current);
        let rrsig = inner
            .find_slot(TypePair::Sig(RecordType::NSEC))
            .map(|s| Arc::clone(&s.current));
        Some((owner, rrset, rrsig))
    }

    /// §4.5: `add(node, newheader, options, now)`. Returns the outcome
    /// plus the name's now-current header for this type pair, bound
    /// for read-back the way the original's `addedrdataset` output
    /// parameter is (§4.5 step 7).
    pub fn add(&self, name: &DomainName, new: NewHeader, now: u64, mode: AddMode) -> (AddOutcome, Arc<SlabHeader>) {
        let node = self.get_or_create_node(name);
        // `new.ttl` is a duration in seconds, as supplied by the
        // caller; the header stores an absolute expiry (§3), so the
        // clamped duration is anchored to `now` right here, once, at
        // insertion time.
        let ttl = now
            + clamp_ttl(
                new.ttl,
                new.trust,
                matches!(new.type_pair, TypePair::Negative(_) | TypePair::NegativeAny),
            );
        let new_is_nonexistent = new.rdata.is_empty() && new.type_pair == TypePair::NegativeAny;

        let mut inner = node.lock();

        if new.type_pair == TypePair::NegativeAny {
            let headers: Vec<Arc<SlabHeader>> = inner.headers().iter().map(|s| Arc::clone(&s.current)).collect();
            for header in &headers {
                self.stat_transition(header, now, || header.mark(attr::ANCIENT));
            }
        }

        let existing = logical_slot(new.type_pair)
            .and_then(|(a, b)| inner.find_slot(a).or_else(|| inner.find_slot(b)))
            .or_else(|| inner.find_slot(new.type_pair))
            .map(|s| (s.type_pair, Arc::clone(&s.current)));

        if let Some((existing_type_pair, header)) = existing {
            if header.is_ignore() {
                // Nothing current to compare against; fall through to insert.
            } else {
                if new_is_nonexistent && header.is_nonexistent() {
                    return (AddOutcome::Unchanged, header);
                }
                if new.trust < header.trust && (header.is_active(now) || header.is_nonexistent()) {
                    return (AddOutcome::Unchanged, header);
                }
                if header.is_active(now)
                    && is_ns_a_aaaa_ds(existing_type_pair)
                    && new.trust >= header.trust
                    && rdata_equal(&new.rdata, &header.rdata)
                {
                    if mode == AddMode::Prefetch
                        && matches!(
                            existing_type_pair,
                            TypePair::Ordinary(RecordType::A)
                                | TypePair::Ordinary(RecordType::AAAA)
                                | TypePair::Ordinary(RecordType::DS)
                        )
                    {
                        return (AddOutcome::Unchanged, header);
                    }
                    self.stat_transition(&header, now, || header.set_ttl(header.ttl().min(ttl)));
                    header.merge_proofs(new.noqname, new.closest);
                    return (AddOutcome::Unchanged, header);
                }

                let mut ttl = ttl;
                if existing_type_pair == TypePair::Ordinary(RecordType::NS) && new.trust <= header.trust {
                    ttl = ttl.min(header.ttl());
                }

                let down = if mode == AddMode::BulkLoad {
                    None
                } else {
                    Some(Arc::clone(&header))
                };
                self.stat_transition(&header, now, || header.mark(attr::ANCIENT));
                if let Some(sig_slot) = inner.find_slot(TypePair::Sig(new.type_pair_covered())) {
                    self.stat_transition(&sig_slot.current, now, || sig_slot.current.mark(attr::ANCIENT));
                }

                let type_pair = new.type_pair;
                let new_header = Arc::new(
                    SlabHeader::new(type_pair, new.rdata, ttl, new.trust)
                        .with_down(down)
                        .with_proofs(new.noqname, new.closest),
                );
                self.stat_bump_new(&new_header, now);
                inner.upsert(type_pair, Arc::clone(&new_header));
                self.heap_push(name.clone(), type_pair, new_header.ttl());
                if type_pair == TypePair::Ordinary(RecordType::NSEC) {
                    inner.set_nsec_tag(NsecTag::IsNsec);
                    self.nsec
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(name.clone(), Arc::clone(&node));
                }
                inner.set_dirty(true);
                return (AddOutcome::Added, new_header);
            }
        }

        let type_pair = new.type_pair;
        let new_header = Arc::new(
            SlabHeader::new(type_pair, new.rdata, ttl, new.trust).with_proofs(new.noqname, new.closest),
        );
        self.stat_bump_new(&new_header, now);
        inner.upsert(type_pair, Arc::clone(&new_header));
        self.heap_push(name.clone(), type_pair, new_header.ttl());
        if type_pair == TypePair::Ordinary(RecordType::NSEC) {
            inner.set_nsec_tag(NsecTag::IsNsec);
            self.nsec
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(name.clone(), Arc::clone(&node));
        }
        (AddOutcome::Added, new_header)
    }

    /// Record a brand new, currently-counted header in its RRset
    /// statistics bucket (§4.1's construction side of the stats
    /// recount).
    fn stat_bump_new(&self, header: &SlabHeader, now: u64) {
        if let Some(stats) = &self.stats {
            stats.bump_bucket(header.stat_key(now));
            header.mark(attr::STATCOUNT);
        }
    }

    /// Apply `mutate` (an attribute/TTL change) to a header, recounting
    /// its RRset-statistics bucket if its `(rtype, kind, state)` key
    /// moved as a result (§4.1: "decrement old mask, re-increment new
    /// mask"). A no-op if this header was never counted.
    fn stat_transition(&self, header: &SlabHeader, now: u64, mutate: impl FnOnce()) {
        let Some(stats) = &self.stats else {
            mutate();
            return;
        };
        if !header.is_statcounted() {
            mutate();
            return;
        }
        let old_key = header.stat_key(now);
        mutate();
        let new_key = header.stat_key(now);
        if old_key != new_key {
            stats.decrement_bucket(old_key);
            stats.bump_bucket(new_key);
        }
    }

    fn heap_push(&self, name: DomainName, type_pair: TypePair, ttl: u64) {
        self.heap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, type_pair), Reverse(ttl));
    }

    /// §4.6 TTL-driven expiry. Expires up to `batch` headers whose
    /// absolute TTL has fallen below `now`, returning how many were
    /// expired.
    pub fn expire_tick(&self, now: u64, batch: usize) -> usize {
        let mut expired = 0;
        while expired < batch {
            let next = {
                let heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
                heap.peek().map(|((n, tp), Reverse(ttl))| (n.clone(), *tp, *ttl))
            };
            let Some((name, type_pair, ttl)) = next else { break };
            if ttl > now {
                break;
            }
            self.heap.lock().unwrap_or_else(|e| e.into_inner()).pop();

            let Some(node) = self.find_node(&name) else { continue };
            let inner = node.lock();
            if let Some(slot) = inner.find_slot(type_pair) {
                self.stat_transition(&slot.current, now, || {
                    slot.current.set_ttl(0);
                    slot.current.mark(attr::ANCIENT);
                });
                drop(inner);
                node.lock().set_dirty(true);
                if let Some(stats) = &self.stats {
                    stats.record_deletettl();
                }
                expired += 1;
                if node.external_refcount() == 0 {
                    self.reclaim_if_dead(&name, &node);
                }
            }
        }
        expired
    }

    /// §4.6 overmem cleaning: force-expire a fraction of cached
    /// headers. `fraction` is expressed as a percentage (10 ⇒ 10%).
    pub fn overmem_clean(&self, now: u64, fraction: u8) -> usize {
        let keys: Vec<HeapKey> = self
            .heap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return 0;
        }
        let take = (keys.len() * fraction as usize / 100).max(1);
        let mut evicted = 0;
        for (name, type_pair) in keys.into_iter().take(take) {
            if let Some(node) = self.find_node(&name) {
                let inner = node.lock();
                if let Some(slot) = inner.find_slot(type_pair) {
                    self.stat_transition(&slot.current, now, || {
                        slot.current.set_ttl(0);
                        slot.current.mark(attr::ANCIENT);
                    });
                    drop(inner);
                    if let Some(stats) = &self.stats {
                        stats.record_deletelru();
                    }
                    evicted += 1;
                    if node.external_refcount() == 0 {
                        self.reclaim_if_dead(&name, &node);
                    }
                }
            }
        }
        evicted
    }

    fn reclaim_if_dead(&self, name: &DomainName, node: &Arc<NameNode>) {
        node.clean(self.serve_stale_ttl.load(Ordering::Acquire) > 0);
        if !node.is_origin() && node.external_refcount() == 0 && !node.has_data() {
            self.dead.lock().unwrap_or_else(|e| e.into_inner()).push_back(name.clone());
            self.reclaim_dead();
        }
    }

    /// Splice the dead-node queue and physically delete each node,
    /// plus its NSEC-trie sibling if any (§4.6).
    pub fn reclaim_dead(&self) {
        let mut dead = self.dead.lock().unwrap_or_else(|e| e.into_inner());
        let names: Vec<DomainName> = dead.drain(..).collect();
        drop(dead);

        let mut main = self.main.write().unwrap_or_else(|e| e.into_inner());
        let mut nsec = self.nsec.write().unwrap_or_else(|e| e.into_inner());
        for name in names {
            if let Some(node) = main.get(&name) {
                if node.external_refcount() == 0 && !node.has_data() && !node.is_origin() {
                    main.remove(&name);
                    nsec.remove(&name);
                }
            }
        }
    }

    /// Human-readable `dump(writer)` (§6): a comment-prefixed,
    /// line-oriented text form, not meant to be parsed back.
    pub fn dump<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "; answer cache dump")?;
        let main = self.main.read().unwrap_or_else(|e| e.into_inner());
        for (name, node) in main.iter() {
            let inner = node.lock();
            if inner.headers().is_empty() {
                continue;
            }
            writeln!(writer, "{name} ; refs={}", node.external_refcount())?;
            for slot in inner.headers() {
                writeln!(
                    writer,
                    "    {:?} ttl={} trust={:?} attrs={:#x}",
                    slot.type_pair,
                    slot.current.ttl(),
                    slot.current.trust,
                    slot.current.attributes()
                )?;
            }
        }
        Ok(())
    }
}

impl NewHeader {
    fn type_pair_covered(&self) -> RecordType {
        match self.type_pair {
            TypePair::Ordinary(t) | TypePair::Negative(t) | TypePair::Sig(t) => t,
            TypePair::NegativeAny => RecordType::Unknown(0),
        }
    }
}

fn rdata_equal(a: &[RecordTypeWithData], b: &[RecordTypeWithData]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.data_equal(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::domain;

    fn a_new_header(ttl: u64, trust: Trust) -> NewHeader {
        NewHeader::new(
            TypePair::Ordinary(RecordType::A),
            vec![RecordTypeWithData::A {
                address: "10.0.0.1".parse().unwrap(),
            }],
            ttl,
            trust,
        )
    }

    #[test]
    fn s1_positive_lookup_round_trips() {
        let cache = Cache::new(domain("."));
        let name = domain("example.org.");
        cache.add(&name, a_new_header(3600, Trust::Answer), 1000, AddMode::Normal);

        match cache.find(&name, RecordType::A, 1002, 0) {
            FindOutcome::Success { ttl, .. } => {
                assert!(ttl > 3590 && ttl < 3600, "ttl was {ttl}");
            }
            other => panic!("expected SUCCESS, got {other}"),
        }
    }

    #[test]
    fn s2_nxdomain_import_returns_ncache_nxdomain() {
        let cache = Cache::new(domain("."));
        let name = domain("nxdomain.example.org.");
        let negative = NewHeader::new(TypePair::NegativeAny, vec![], 3600, Trust::Answer);
        cache.add(&name, negative, 1000, AddMode::Normal);
        let node = cache.find_node(&name).unwrap();
        node.lock()
            .find_slot(TypePair::NegativeAny)
            .unwrap()
            .current
            .mark(attr::NXDOMAIN);

        match cache.find(&name, RecordType::A, 1000, 0) {
            FindOutcome::NcacheNxdomain { ttl, .. } => {
                assert!(ttl >= 3590 && ttl <= 3600, "ttl was {ttl}");
            }
            other => panic!("expected NCACHE_NXDOMAIN, got {other}"),
        }
    }

    #[test]
    fn s3_ns_replacement_never_raises_ttl() {
        let cache = Cache::new(domain("."));
        let name = domain("example.org.");
        let ns = NewHeader::new(
            TypePair::Ordinary(RecordType::NS),
            vec![RecordTypeWithData::NS {
                nsdname: domain("ns1.example.org."),
            }],
            100,
            Trust::Answer,
        );
        cache.add(&name, ns, 0, AddMode::Normal);

        let replacement = NewHeader::new(
            TypePair::Ordinary(RecordType::NS),
            vec![RecordTypeWithData::NS {
                nsdname: domain("ns2.example.org."),
            }],
            1000,
            Trust::Answer,
        );
        cache.add(&name, replacement, 0, AddMode::Normal);

        let node = cache.find_node(&name).unwrap();
        let inner = node.lock();
        let current = &inner.find_slot(TypePair::Ordinary(RecordType::NS)).unwrap().current;
        assert_eq!(100, current.ttl());
    }

    #[test]
    fn s4_cname_chain_returns_cname_result() {
        let cache = Cache::new(domain("."));
        let name = domain("a.example.");
        let cname = NewHeader::new(
            TypePair::Ordinary(RecordType::CNAME),
            vec![RecordTypeWithData::CNAME {
                cname: domain("b.example."),
            }],
            300,
            Trust::Answer,
        );
        cache.add(&name, cname, 0, AddMode::Normal);

        match cache.find(&name, RecordType::A, 0, find_opt::ALLOWCNAME) {
            FindOutcome::Cname { rdataset, .. } => {
                assert_eq!(
                    &RecordTypeWithData::CNAME {
                        cname: domain("b.example.")
                    },
                    &rdataset.rdata[0]
                );
            }
            other => panic!("expected CNAME, got {other}"),
        }
    }

    #[test]
    fn dname_above_returns_dname_result() {
        let cache = Cache::new(domain("."));
        let owner = domain("example.");
        let dname = NewHeader::new(
            TypePair::Ordinary(RecordType::DNAME),
            vec![RecordTypeWithData::DNAME {
                target: domain("other.example."),
            }],
            300,
            Trust::Answer,
        );
        cache.add(&owner, dname, 0, AddMode::Normal);

        match cache.find(&domain("a.example."), RecordType::A, 0, 0) {
            FindOutcome::Dname { found_name, rdataset, .. } => {
                assert_eq!(owner, found_name);
                assert_eq!(
                    &RecordTypeWithData::DNAME {
                        target: domain("other.example.")
                    },
                    &rdataset.rdata[0]
                );
            }
            other => panic!("expected DNAME, got {other}"),
        }
    }

    #[test]
    fn s6_covering_nsec_returns_predecessor() {
        let cache = Cache::new(domain("."));
        let owner = domain("a.example.");
        let nsec = NewHeader::new(
            TypePair::Ordinary(RecordType::NSEC),
            vec![RecordTypeWithData::NSEC {
                next_domain_name: domain("c.example."),
                type_bit_maps: vec![RecordType::A],
            }],
            3600,
            Trust::Secure,
        );
        cache.add(&owner, nsec, 0, AddMode::Normal);

        match cache.find(&domain("b.example."), RecordType::A, 0, find_opt::COVERINGNSEC) {
            FindOutcome::CoveringNsec { found_name, .. } => assert_eq!(owner, found_name),
            other => panic!("expected COVERINGNSEC, got {other}"),
        }
    }

    #[test]
    fn duplicate_add_is_unchanged() {
        let cache = Cache::new(domain("."));
        let name = domain("example.org.");
        assert_eq!(
            AddOutcome::Added,
            cache.add(&name, a_new_header(3600, Trust::Answer), 0, AddMode::Normal).0
        );
        assert_eq!(
            AddOutcome::Unchanged,
            cache.add(&name, a_new_header(3600, Trust::Answer), 0, AddMode::Normal).0
        );
    }

    #[test]
    fn lower_trust_never_overrides_active_higher_trust() {
        let cache = Cache::new(domain("."));
        let name = domain("example.org.");
        cache.add(&name, a_new_header(3600, Trust::Secure), 0, AddMode::Normal);
        let (outcome, _) = cache.add(&name, a_new_header(3600, Trust::Additional), 0, AddMode::Normal);
        assert_eq!(AddOutcome::Unchanged, outcome);

        let node = cache.find_node(&name).unwrap();
        let inner = node.lock();
        assert_eq!(
            Trust::Secure,
            inner.find_slot(TypePair::Ordinary(RecordType::A)).unwrap().current.trust
        );
    }

    #[test]
    fn refresh_of_byte_equal_rdata_merges_noqname_proof() {
        let cache = Cache::new(domain("."));
        let name = domain("ns.example.org.");
        let ns = NewHeader::new(
            TypePair::Ordinary(RecordType::NS),
            vec![RecordTypeWithData::NS {
                nsdname: domain("a.ns.example.org."),
            }],
            100,
            Trust::Answer,
        );
        cache.add(&name, ns, 0, AddMode::Normal);

        let proof_rrset = Arc::new(SlabHeader::new(
            TypePair::Ordinary(RecordType::NSEC),
            vec![RecordTypeWithData::NSEC {
                next_domain_name: domain("z.example.org."),
                type_bit_maps: vec![],
            }],
            3600,
            Trust::Secure,
        ));
        let mut repeat = NewHeader::new(
            TypePair::Ordinary(RecordType::NS),
            vec![RecordTypeWithData::NS {
                nsdname: domain("a.ns.example.org."),
            }],
            100,
            Trust::Answer,
        );
        repeat.noqname = Some(crate::header::NegativeProof {
            owner: domain("nonexistent.example.org."),
            rrset: proof_rrset,
            rrsig: None,
        });
        let (outcome, current) = cache.add(&name, repeat, 0, AddMode::Normal);
        assert_eq!(AddOutcome::Unchanged, outcome);
        assert_eq!(domain("nonexistent.example.org."), current.noqname().unwrap().owner);
    }

    #[test]
    fn clamp_ttl_enforces_minimum_and_maximum() {
        assert_eq!(CACHE_TTL_MINIMUM, clamp_ttl(1, Trust::Answer, false));
        assert_eq!(CACHE_TTL_MAXIMUM, clamp_ttl(999_999, Trust::Answer, false));
        assert_eq!(CACHE_TTL_MINIMUM, clamp_ttl(999_999, Trust::Glue, false));
        assert_eq!(0, clamp_ttl(999_999, Trust::Ultimate, true));
    }

    #[test]
    fn expire_tick_marks_ancient_and_stops_at_batch() {
        let cache = Cache::new(domain("."));
        for i in 0..5 {
            let name = domain(&format!("h{i}.example."));
            cache.add(&name, a_new_header(0, Trust::Answer), 0, AddMode::Normal);
        }
        // ttl=0 clamps to CACHE_TTL_MINIMUM (10s) and is stored as the
        // absolute expiry `0 + 10`; tick past it to see the entries fall due.
        let expired = cache.expire_tick(11, 10);
        assert_eq!(5, expired);
    }
}
