//! C1: the slab header and RRset store.
//!
//! A [`SlabHeader`] is the cache's unit of storage: one logical
//! RRset (or one negative-cache marker), its TTL, trust level, and a
//! set of atomic status flags. Headers form a version chain (`down`)
//! so that a reader mid-traversal can keep using a header even after
//! a writer has replaced it at the head of the name node's chain.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dns_types::protocol::types::{DomainName, RecordType, RecordTypeWithData};

/// `(type, covers)` as described in §3 of the spec, but expressed as
/// a closed enum instead of a packed 32-bit integer — there is no
/// wire format to pack it for here, and the enum makes illegal states
/// (e.g. an "ordinary RRset" with a nonsensical `covers`)
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypePair {
    /// An ordinary, positive RRset of this type.
    Ordinary(RecordType),
    /// An RRSIG whose `type_covered` is `RecordType`.
    Sig(RecordType),
    /// A negative (NXRRSET) entry: this type does not exist at this
    /// name, but the name itself does.
    Negative(RecordType),
    /// `NCACHE_ANY`: an NXDOMAIN-style entry that shadows every type
    /// at this name.
    NegativeAny,
}

impl TypePair {
    /// Whether a header with this type pair can answer a query of the
    /// given record type (used while scanning a name node's header
    /// chain in `find`).
    pub fn matches_query(&self, qtype: RecordType) -> bool {
        match self {
            TypePair::Ordinary(t) => *t == qtype,
            TypePair::Sig(_) => false,
            TypePair::Negative(t) => *t == qtype,
            TypePair::NegativeAny => true,
        }
    }

    pub fn is_rrsig_for(&self, qtype: RecordType) -> bool {
        matches!(self, TypePair::Sig(t) if *t == qtype)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, TypePair::Negative(_) | TypePair::NegativeAny)
    }

    /// The "priority type" used to order a brand new name node's
    /// first headers (§4.5 step 6).
    pub fn insertion_priority(&self) -> u8 {
        match self {
            TypePair::Ordinary(t) | TypePair::Sig(t) | TypePair::Negative(t) => {
                t.insertion_priority()
            }
            TypePair::NegativeAny => 0,
        }
    }
}

/// Provenance ranking used by the replacement algorithm in §4.5.
/// Ordered ascending: lower-trust data never overrides live
/// higher-trust data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trust {
    Additional,
    Glue,
    Answer,
    AuthAnswer,
    Secure,
    Ultimate,
}

/// Atomic attribute bits on a [`SlabHeader`].
pub mod attr {
    pub const NONEXISTENT: u32 = 1 << 0;
    pub const IGNORE: u32 = 1 << 1;
    pub const NXDOMAIN: u32 = 1 << 2;
    pub const NEGATIVE: u32 = 1 << 3;
    pub const OPTOUT: u32 = 1 << 4;
    pub const PREFETCH: u32 = 1 << 5;
    pub const ZEROTTL: u32 = 1 << 6;
    pub const STALE: u32 = 1 << 7;
    pub const ANCIENT: u32 = 1 << 8;
    pub const STALE_WINDOW: u32 = 1 << 9;
    pub const STATCOUNT: u32 = 1 << 10;
}

/// A noqname/closest-encloser proof attached to a header: the owner
/// name the proof is for, the negative (NSEC/NSEC3) RRset, and its
/// RRSIG if cached.
#[derive(Debug, Clone)]
pub struct NegativeProof {
    pub owner: DomainName,
    pub rrset: Arc<SlabHeader>,
    pub rrsig: Option<Arc<SlabHeader>>,
}

/// One logical RRset (or negative-cache marker) plus its metadata.
///
/// `down` is the version chain: the header this one displaced, kept
/// alive (via `Arc`) for as long as some in-flight reader might still
/// hold a clone of it. It is set once at construction and never
/// mutated afterwards — only the *head* of a name node's chain
/// changes, by swapping which `SlabHeader` is current.
#[derive(Debug)]
pub struct SlabHeader {
    pub type_pair: TypePair,
    pub rdata: Vec<RecordTypeWithData>,
    pub trust: Trust,
    ttl: AtomicU64,
    attributes: AtomicU32,
    count: AtomicU32,
    last_refresh_fail_ts: AtomicU64,
    /// Mutex rather than a plain field: §4.5 step 4 requires merging a
    /// freshly-added header's proofs into an existing, unchanged
    /// header after it has already been published and shared via
    /// `Arc` — the version chain itself is append-only, but the proofs
    /// on the *current* header can still be refreshed in place.
    noqname: Mutex<Option<NegativeProof>>,
    closest: Mutex<Option<NegativeProof>>,
    pub down: Option<Arc<SlabHeader>>,
}

impl SlabHeader {
    /// Build a new, current header from a parsed rdataset: rdata is
    /// sorted and deduplicated, matching §4.1 ("packed into a sorted,
    /// deduplicated byte slab"). We don't have a wire form to sort by
    /// here (out of scope), so we sort by the typed representation,
    /// which gives the same dedup/determinism guarantee.
    pub fn new(
        type_pair: TypePair,
        mut rdata: Vec<RecordTypeWithData>,
        ttl: u64,
        trust: Trust,
    ) -> Self {
        rdata.sort();
        rdata.dedup();
        SlabHeader {
            type_pair,
            rdata,
            trust,
            ttl: AtomicU64::new(ttl),
            attributes: AtomicU32::new(0),
            count: AtomicU32::new(0),
            last_refresh_fail_ts: AtomicU64::new(0),
            noqname: Mutex::new(None),
            closest: Mutex::new(None),
            down: None,
        }
    }

    pub fn with_down(mut self, down: Option<Arc<SlabHeader>>) -> Self {
        self.down = down;
        self
    }

    pub fn with_proofs(
        self,
        noqname: Option<NegativeProof>,
        closest: Option<NegativeProof>,
    ) -> Self {
        if noqname.is_some() {
            *self.noqname.lock().unwrap_or_else(|e| e.into_inner()) = noqname;
        }
        if closest.is_some() {
            *self.closest.lock().unwrap_or_else(|e| e.into_inner()) = closest;
        }
        self
    }

    pub fn noqname(&self) -> Option<NegativeProof> {
        self.noqname.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn closest(&self) -> Option<NegativeProof> {
        self.closest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// §4.5 step 4: "merge in any new noqname/closest proofs" when a
    /// refresh finds the incoming rdata byte-equal to what's already
    /// active. `None` leaves the existing proof (if any) untouched —
    /// this is a merge, not an overwrite.
    pub fn merge_proofs(&self, noqname: Option<NegativeProof>, closest: Option<NegativeProof>) {
        if let Some(p) = noqname {
            *self.noqname.lock().unwrap_or_else(|e| e.into_inner()) = Some(p);
        }
        if let Some(p) = closest {
            *self.closest.lock().unwrap_or_else(|e| e.into_inner()) = Some(p);
        }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl.load(Ordering::Acquire)
    }

    /// Seconds remaining until expiry, as of `now` — the value a
    /// caller actually wants to put on the wire, since `ttl()` itself
    /// is the absolute expiry timestamp, not a duration.
    pub fn remaining_ttl(&self, now: u64) -> u64 {
        self.ttl().saturating_sub(now)
    }

    /// `setttl`: update the absolute expiry. Heap repositioning (sift
    /// up/down) is the cache's responsibility (it owns the heap); this
    /// only updates the header's own view of its TTL.
    pub fn set_ttl(&self, new: u64) {
        self.ttl.store(new, Ordering::Release);
    }

    pub fn attributes(&self) -> u32 {
        self.attributes.load(Ordering::Acquire)
    }

    pub fn is_set(&self, flag: u32) -> bool {
        self.attributes() & flag != 0
    }

    /// `mark(flag)`: atomically set a bit. Statistics recounting (the
    /// "decrement old mask, increment new mask" dance in §4.1) is
    /// performed by the cache, which is the only thing that knows
    /// whether this header is stats-counted and what the stats handle
    /// is.
    pub fn mark(&self, flag: u32) {
        self.attributes.fetch_or(flag, Ordering::AcqRel);
    }

    pub fn unmark(&self, flag: u32) {
        self.attributes.fetch_and(!flag, Ordering::AcqRel);
    }

    pub fn exists(&self) -> bool {
        !self.is_set(attr::NONEXISTENT)
    }

    pub fn is_ancient(&self) -> bool {
        self.is_set(attr::ANCIENT)
    }

    pub fn is_ignore(&self) -> bool {
        self.is_set(attr::IGNORE)
    }

    pub fn is_nonexistent(&self) -> bool {
        self.is_set(attr::NONEXISTENT)
    }

    /// Active iff it exists, isn't IGNOREd, and isn't ANCIENT.
    pub fn is_active(&self, now: u64) -> bool {
        self.exists() && !self.is_ignore() && !self.is_ancient() && self.ttl() > now
    }

    /// `count`: used to rotate round-robin answers.
    pub fn next_count(&self) -> u32 {
        self.count.fetch_add(1, Ordering::AcqRel)
    }

    pub fn last_refresh_fail_ts(&self) -> u64 {
        self.last_refresh_fail_ts.load(Ordering::Acquire)
    }

    pub fn set_last_refresh_fail_ts(&self, now: u64) {
        self.last_refresh_fail_ts.store(now, Ordering::Release);
    }

    /// The `(rtype, kind, state)` bucket this header currently belongs
    /// to for RRset statistics (§6, §4.1's "decrement on the old mask,
    /// re-increment on the new"). `NegativeAny` has no single covered
    /// type, so it reports `RecordType::Unknown(0)` as a stand-in for
    /// "any".
    pub fn stat_key(&self, now: u64) -> crate::stats::BucketKey {
        use crate::stats::{BucketKind, BucketState};

        let rtype = match self.type_pair {
            TypePair::Ordinary(t) | TypePair::Sig(t) | TypePair::Negative(t) => t,
            TypePair::NegativeAny => RecordType::Unknown(0),
        };
        let kind = if self.type_pair.is_negative() {
            if self.is_set(attr::NXDOMAIN) {
                BucketKind::NxdomainNegative
            } else {
                BucketKind::NxrrsetNegative
            }
        } else {
            BucketKind::Normal
        };
        let state = if self.is_active(now) {
            BucketState::Active
        } else if self.is_ancient() {
            BucketState::Ancient
        } else {
            BucketState::Stale
        };
        crate::stats::BucketKey { rtype, kind, state }
    }

    pub fn is_statcounted(&self) -> bool {
        self.is_set(attr::STATCOUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ttl: u64, trust: Trust) -> SlabHeader {
        SlabHeader::new(
            TypePair::Ordinary(RecordType::A),
            vec![RecordTypeWithData::A {
                address: "1.1.1.1".parse().unwrap(),
            }],
            ttl,
            trust,
        )
    }

    #[test]
    fn mark_sets_bit_without_disturbing_others() {
        let h = header(100, Trust::Answer);
        h.mark(attr::ANCIENT);
        h.mark(attr::STALE);
        assert!(h.is_set(attr::ANCIENT));
        assert!(h.is_set(attr::STALE));
        assert!(!h.is_set(attr::NXDOMAIN));

        h.unmark(attr::ANCIENT);
        assert!(!h.is_set(attr::ANCIENT));
        assert!(h.is_set(attr::STALE));
    }

    #[test]
    fn rdata_is_sorted_and_deduplicated() {
        let rdata = vec![
            RecordTypeWithData::A {
                address: "2.2.2.2".parse().unwrap(),
            },
            RecordTypeWithData::A {
                address: "1.1.1.1".parse().unwrap(),
            },
            RecordTypeWithData::A {
                address: "1.1.1.1".parse().unwrap(),
            },
        ];
        let h = SlabHeader::new(TypePair::Ordinary(RecordType::A), rdata, 100, Trust::Answer);
        assert_eq!(2, h.rdata.len());
        assert_eq!(
            RecordTypeWithData::A {
                address: "1.1.1.1".parse().unwrap()
            },
            h.rdata[0]
        );
    }

    #[test]
    fn is_active_respects_ttl_and_ancient() {
        let h = header(100, Trust::Answer);
        assert!(h.is_active(50));
        assert!(!h.is_active(100));
        h.mark(attr::ANCIENT);
        assert!(!h.is_active(50));
    }

    #[test]
    fn down_chain_keeps_displaced_header_alive() {
        let old = Arc::new(header(100, Trust::Answer));
        old.mark(attr::ANCIENT);
        let new = header(200, Trust::Secure).with_down(Some(Arc::clone(&old)));
        assert!(new.down.as_ref().unwrap().is_ancient());
        assert_eq!(100, new.down.as_ref().unwrap().ttl());
    }
}
