//! C4: the per-socket-address ADB entry.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::quota::{AtrState, QuotaConfig};

pub mod flags {
    pub const GOODEDNS: u32 = 1 << 0;
    pub const NOEDNS0: u32 = 1 << 1;
    pub const COOKIE: u32 = 1 << 2;
}

/// Per-entry health metrics, negotiation state, and concurrency quota
/// for one resolved address (§3, §4.9).
#[derive(Debug)]
pub struct Entry {
    pub addr: IpAddr,
    /// Smoothed round-trip time, in microseconds.
    srtt: AtomicU64,
    flags: AtomicU32,
    edns: AtomicU8,
    ednsto: AtomicU8,
    plain: AtomicU8,
    plainto: AtomicU8,
    cookie: Mutex<Vec<u8>>,
    quota: AtomicU32,
    active: AtomicU32,
    expires: AtomicU64,
    atr: Mutex<AtrState>,
    dead: AtomicBool,
    /// How many namehooks currently reference this entry — the
    /// "intrusive list of pointers back" of §9, reduced to a count
    /// since nothing here ever needs to walk the referring namehooks
    /// themselves, only know whether any remain.
    referrers: AtomicU32,
    last_rtt_update_ms: AtomicU64,
}

impl Entry {
    /// `EDNSTOS`: once `ednsto` reaches this many timeouts, callers
    /// deciding whether to retry a query without EDNS should treat
    /// this server as having given up on it. The decision itself
    /// belongs to the resolver iterator; this is just the threshold.
    pub const EDNSTOS: u8 = 3;

    pub fn new(addr: IpAddr, initial_quota: u32) -> Self {
        Entry {
            addr,
            srtt: AtomicU64::new(0),
            flags: AtomicU32::new(0),
            edns: AtomicU8::new(0),
            ednsto: AtomicU8::new(0),
            plain: AtomicU8::new(0),
            plainto: AtomicU8::new(0),
            cookie: Mutex::new(Vec::new()),
            quota: AtomicU32::new(initial_quota),
            active: AtomicU32::new(0),
            expires: AtomicU64::new(0),
            atr: Mutex::new(AtrState::default()),
            dead: AtomicBool::new(false),
            referrers: AtomicU32::new(0),
            last_rtt_update_ms: AtomicU64::new(0),
        }
    }

    pub fn srtt(&self) -> u64 {
        self.srtt.load(Ordering::Acquire)
    }

    /// `adb_adjsrtt`: exponentially blended update, with a once-per-
    /// wall-clock-second 0.98 decay (`RTTADJAGE`) applied first.
    pub fn update_srtt(&self, rtt_micros: u64, factor: u64, now_ms: u64) {
        debug_assert!(factor <= 10);
        let last = self.last_rtt_update_ms.swap(now_ms, Ordering::AcqRel);
        let mut old = self.srtt.load(Ordering::Acquire);
        if now_ms > last && last != 0 {
            old = ((old as f64) * RTTADJAGE) as u64;
        }
        let new = (old / 10) * factor + (rtt_micros / 10) * (10 - factor);
        self.srtt.store(new, Ordering::Release);
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn set_flag(&self, flag: u32) {
        self.flags.fetch_or(flag, Ordering::AcqRel);
    }

    pub fn clear_flag(&self, flag: u32) {
        self.flags.fetch_and(!flag, Ordering::AcqRel);
    }

    /// Bump one of the four saturating EDNS/plain counters; when any
    /// reaches 0xFF, age out all four by one bit (§4.9, §8 boundary
    /// behavior 12).
    pub fn bump_edns(&self) {
        self.bump(&self.edns);
    }
    pub fn bump_ednsto(&self) {
        self.bump(&self.ednsto);
    }
    pub fn bump_plain(&self) {
        self.bump(&self.plain);
    }
    pub fn bump_plainto(&self) {
        self.bump(&self.plainto);
    }

    fn bump(&self, counter: &AtomicU8) {
        let prev = counter.fetch_add(1, Ordering::AcqRel);
        if prev == 0xFF {
            self.age_out_counters();
        }
    }

    fn age_out_counters(&self) {
        for counter in [&self.edns, &self.ednsto, &self.plain, &self.plainto] {
            let v = counter.load(Ordering::Acquire);
            counter.store(v >> 1, Ordering::Release);
        }
    }

    pub fn edns(&self) -> u8 {
        self.edns.load(Ordering::Acquire)
    }
    pub fn ednsto(&self) -> u8 {
        self.ednsto.load(Ordering::Acquire)
    }
    pub fn plain(&self) -> u8 {
        self.plain.load(Ordering::Acquire)
    }
    pub fn plainto(&self) -> u8 {
        self.plainto.load(Ordering::Acquire)
    }

    pub fn set_cookie(&self, cookie: Vec<u8>) {
        *self.cookie.lock().unwrap_or_else(|e| e.into_inner()) = cookie;
        self.set_flag(flags::COOKIE);
    }

    pub fn cookie(&self) -> Vec<u8> {
        self.cookie.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn quota(&self) -> u32 {
        self.quota.load(Ordering::Acquire)
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// `begin_udp_fetch`.
    pub fn begin_udp_fetch(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    /// `end_udp_fetch`.
    pub fn end_udp_fetch(&self) {
        let prev = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "end_udp_fetch with no matching begin_udp_fetch");
    }

    /// `overquota(entry) ⇔ quota ≠ 0 ∧ active ≥ quota`.
    pub fn overquota(&self) -> bool {
        let quota = self.quota();
        quota != 0 && self.active() >= quota
    }

    /// Record a fetch completion against this entry's ATR state and,
    /// if the result crosses a recompute boundary, re-derive the
    /// quota via the `quota_adj` table (§4.9).
    pub fn record_fetch_completion(&self, timed_out: bool, config: &QuotaConfig) {
        let mut atr = self.atr.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(new_quota) = atr.record_completion(timed_out, config) {
            self.quota.store(new_quota, Ordering::Release);
        }
    }

    pub fn expires(&self) -> u64 {
        self.expires.load(Ordering::Acquire)
    }

    pub fn set_expires(&self, at: u64) {
        self.expires.store(at, Ordering::Release);
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub fn add_referrer(&self) -> u32 {
        self.referrers.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the remaining referrer count; zero means this entry can
    /// be reclaimed once also absent from the entries table.
    pub fn remove_referrer(&self) -> u32 {
        let prev = self.referrers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "remove_referrer with no outstanding referrers");
        prev - 1
    }

    pub fn referrer_count(&self) -> u32 {
        self.referrers.load(Ordering::Acquire)
    }
}

/// `RTTADJAGE`: SRTT is multiplied by this factor once per
/// wall-clock second that passes between updates.
pub const RTTADJAGE: f64 = 0.98;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_counters_age_out_together() {
        let e = Entry::new("127.0.0.1".parse().unwrap(), 0);
        for _ in 0..255 {
            e.bump_edns();
        }
        assert_eq!(255, e.edns());
        e.bump_edns();
        // All four counters right-shift once together.
        assert_eq!(128, e.edns());
        assert_eq!(0, e.ednsto());
    }

    #[test]
    fn begin_and_end_udp_fetch_balance() {
        let e = Entry::new("127.0.0.1".parse().unwrap(), 4);
        e.begin_udp_fetch();
        e.begin_udp_fetch();
        assert_eq!(2, e.active());
        assert!(!e.overquota());
        e.begin_udp_fetch();
        e.begin_udp_fetch();
        assert!(e.overquota());
        e.end_udp_fetch();
        assert!(!e.overquota());
    }

    #[test]
    fn referrer_count_tracks_namehooks() {
        let e = Entry::new("127.0.0.1".parse().unwrap(), 0);
        e.add_referrer();
        e.add_referrer();
        assert_eq!(1, e.remove_referrer());
        assert_eq!(1, e.referrer_count());
    }
}
