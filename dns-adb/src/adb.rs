//! C5: the Address Database — two concurrent tables (names and
//! entries), the fetch coordinator, and find lifecycle.
//!
//! Locking order throughout: **tree < name < find < entry** (§4.7).
//! `tree` here is the `RwLock` guarding the `names`/`entries` maps.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use dns_types::protocol::types::{DomainName, RecordType};

use crate::entry::Entry;
use crate::fetch::{FetchOutcome, FetchService, SharedFetchService};
use crate::find::{family, opt, AdbError, Addrinfo, Find, FindStatus};
use crate::name::AdbName;
use crate::namehook::NameHook;
use crate::quota::QuotaConfig;

type NameKey = (DomainName, bool);

/// `setadbsize`: memory high/low watermarks.
#[derive(Debug, Clone, Copy, Default)]
struct Watermarks {
    high: u64,
    low: u64,
}

pub struct Adb {
    names: RwLock<HashMap<NameKey, Arc<AdbName>>>,
    entries: RwLock<HashMap<IpAddr, Arc<Entry>>>,
    fetch_service: SharedFetchService,
    shutting_down: AtomicBool,
    quota: Mutex<QuotaConfig>,
    watermarks: Mutex<Watermarks>,
    next_fetch_id: AtomicU64,
    overmem_running: AtomicBool,
}

impl Adb {
    pub fn new(fetch_service: SharedFetchService) -> Self {
        Adb {
            names: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            fetch_service,
            shutting_down: AtomicBool::new(false),
            quota: Mutex::new(QuotaConfig::default()),
            watermarks: Mutex::new(Watermarks::default()),
            next_fetch_id: AtomicU64::new(1),
            overmem_running: AtomicBool::new(false),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// `setadbsize(bytes)`: high-water `bytes - bytes/8`, low-water
    /// `bytes - bytes/4`; zero disables the watermark.
    pub fn set_adbsize(&self, bytes: u64) {
        let mut wm = self.watermarks.lock().unwrap_or_else(|e| e.into_inner());
        if bytes == 0 {
            *wm = Watermarks::default();
        } else {
            wm.high = bytes - bytes / 8;
            wm.low = bytes - bytes / 4;
        }
    }

    pub fn set_quota(&self, quota: u32, atr_freq: u32, atr_low: f64, atr_high: f64, atr_discount: f64) {
        *self.quota.lock().unwrap_or_else(|e| e.into_inner()) = QuotaConfig {
            quota,
            atr_freq,
            atr_low,
            atr_high,
            atr_discount,
        };
    }

    fn quota_config(&self) -> QuotaConfig {
        *self.quota.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_or_create_name(&self, name: &DomainName, start_at_zone: bool) -> Arc<AdbName> {
        let key = (name.clone(), start_at_zone);
        if let Some(n) = self.names.read().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Arc::clone(n);
        }
        let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            names
                .entry(key)
                .or_insert_with(|| Arc::new(AdbName::new(name.clone(), start_at_zone))),
        )
    }

    fn get_or_create_entry(&self, addr: IpAddr) -> Arc<Entry> {
        if let Some(e) = self.entries.read().unwrap_or_else(|e| e.into_inner()).get(&addr) {
            return Arc::clone(e);
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let quota = self.quota_config().quota;
        Arc::clone(entries.entry(addr).or_insert_with(|| Arc::new(Entry::new(addr, quota))))
    }

    /// §4.7: `createfind`.
    pub fn createfind(
        &self,
        name: &DomainName,
        wanted: u32,
        options: u32,
        now: u64,
        callback: Box<dyn Fn(Arc<Find>) + Send + Sync>,
    ) -> (Arc<Find>, FindStatus) {
        let find = Find::new(wanted, options, callback);

        if self.is_shutting_down() {
            find.fire(FindStatus::ShuttingDown);
            return (find, FindStatus::ShuttingDown);
        }

        let start_at_zone = options & opt::STARTATZONE != 0;
        let adb_name = self.get_or_create_name(name, start_at_zone);
        adb_name.touch(now);

        adb_name.expire_stale(now);

        if let Some(target) = adb_name.alias_if_unexpired(now) {
            let _ = target;
            find.fire(FindStatus::Alias);
            return (find, FindStatus::Alias);
        }

        let mut still_wanted = 0u32;
        for fam in [family::INET, family::INET6] {
            if wanted & fam == 0 {
                continue;
            }
            if adb_name.has_namehooks(fam) {
                for entry in adb_name.namehook_entries(fam) {
                    if entry.overquota() {
                        find.set_overquota();
                        continue;
                    }
                    find.push_addrinfo(Addrinfo::from_entry(&entry, 0));
                }
            } else if !adb_name.has_fetch(fam) {
                still_wanted |= fam;
            }
        }

        let avoid = options & opt::AVOIDFETCHES != 0 && !find.addrinfo_list().is_empty();
        let no_fetch = options & opt::NOFETCH != 0;
        if still_wanted != 0 && !avoid && !no_fetch {
            self.start_fetches(&adb_name, still_wanted, now);
        }

        let any_pending = [family::INET, family::INET6]
            .into_iter()
            .any(|fam| wanted & fam != 0 && adb_name.has_fetch(fam));

        let satisfied = !find.addrinfo_list().is_empty() && options & opt::EMPTYEVENT == 0;
        if options & opt::WANTEVENT != 0 && !satisfied && any_pending {
            adb_name.link_find(Arc::clone(&find));
        } else {
            find.mark_event_sent();
        }

        let (err_v4, err_v6) = adb_name.errors();
        if let Some(e) = err_v4 {
            find.set_result(family::INET, e);
        }
        if let Some(e) = err_v6 {
            find.set_result(family::INET6, e);
        }

        let status = if find.event_already_sent() {
            FindStatus::MoreAddresses
        } else {
            FindStatus::Pending
        };
        (find, status)
    }

    fn start_fetches(&self, adb_name: &Arc<AdbName>, wanted: u32, _now: u64) {
        for fam in [family::INET, family::INET6] {
            if wanted & fam == 0 {
                continue;
            }
            let qtype = if fam == family::INET { RecordType::A } else { RecordType::AAAA };
            match self.fetch_service.create_fetch(&adb_name.name, qtype, 0, 0) {
                Ok(mut handle) => {
                    handle.id = self.next_fetch_id.fetch_add(1, Ordering::AcqRel);
                    adb_name.set_fetch(fam, handle);
                }
                Err(e) => {
                    warn!(name = %adb_name.name, ?e, "failed to start fetch");
                    adb_name.set_error(fam, e);
                }
            }
        }
    }

    /// §4.7: `cancelfind`.
    pub fn cancelfind(&self, name: &DomainName, start_at_zone: bool, find: &Arc<Find>) {
        if !find.is_linked() {
            find.fire(FindStatus::Canceled);
            return;
        }
        let key = (name.clone(), start_at_zone);
        if let Some(adb_name) = self.names.read().unwrap_or_else(|e| e.into_inner()).get(&key).cloned() {
            adb_name.unlink_find(find);
        }
        find.unlink();
        find.fire(FindStatus::Canceled);
    }

    /// §4.8: `fetch_callback`.
    pub fn fetch_callback(&self, name: &DomainName, start_at_zone: bool, fetch_id: u64, outcome: FetchOutcome, now: u64) {
        let key = (name.clone(), start_at_zone);
        let Some(adb_name) = self.names.read().unwrap_or_else(|e| e.into_inner()).get(&key).cloned() else {
            return;
        };

        let Some(fam) = adb_name.clear_fetch_by_id(fetch_id) else {
            debug!(name = %name, "fetch_callback for unknown fetch id");
            return;
        };

        if adb_name.is_dead() || self.is_shutting_down() {
            adb_name.drain_waiting_finds(fam);
            return;
        }

        let added_address = match outcome {
            FetchOutcome::Negative { error, ttl } => {
                adb_name.set_expiry(fam, now + ttl.max(1));
                adb_name.set_error(fam, error);
                false
            }
            FetchOutcome::Alias { target, ttl } => {
                adb_name.set_alias(target, now + ttl.max(1));
                false
            }
            FetchOutcome::Failure { error, depth } => {
                if depth <= 1 {
                    adb_name.set_expiry(fam, now + 10);
                }
                adb_name.set_error(fam, error);
                false
            }
            FetchOutcome::Success { rdata, ttl, .. } => {
                let mut added = false;
                for rr in rdata {
                    if let Some(addr) = address_of(&rr) {
                        let entry = self.get_or_create_entry(addr);
                        entry.set_expires(now + ttl.max(1));
                        adb_name.add_namehook(fam, NameHook::new(entry));
                        added = true;
                    }
                }
                adb_name.set_expiry(fam, now + ttl.max(1));
                added
            }
        };
        // §4.8: a waiting find only gets MORE_ADDRESSES when this fetch
        // actually produced one; a negative, alias, failed, or empty
        // success result is a terminal no-more-addresses completion.
        let status_for_waiters = if added_address {
            FindStatus::MoreAddresses
        } else {
            FindStatus::NoMoreAddresses
        };

        let waiting = adb_name.drain_waiting_finds(fam);
        for find in waiting {
            let (err_v4, err_v6) = adb_name.errors();
            if let Some(e) = err_v4 {
                find.set_result(family::INET, e);
            }
            if let Some(e) = err_v6 {
                find.set_result(family::INET6, e);
            }
            for family_bit in [family::INET, family::INET6] {
                if find.wanted & family_bit != 0 {
                    for entry in adb_name.namehook_entries(family_bit) {
                        find.push_addrinfo(Addrinfo::from_entry(&entry, 0));
                    }
                }
            }
            find.fire(status_for_waiters);
        }
    }

    /// §5: `shutdown`. Sets the flag, then fires every outstanding
    /// find with a terminal status exactly once (§8 invariant 5).
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let names: Vec<Arc<AdbName>> = self
            .names
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for adb_name in names {
            adb_name.mark_dead();
            for find in adb_name.drain_waiting_finds(family::INET | family::INET6) {
                find.fire(FindStatus::ShuttingDown);
            }
        }
    }

    /// Overmem eviction worker: single-flight via CAS on
    /// `overmem_running`, drops a `fraction`% of dead-weight names
    /// (no data, no external interest) per pass.
    pub fn overmem_clean(&self, fraction: u8) -> usize {
        if self
            .overmem_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }
        let removed = {
            let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
            let candidates: Vec<NameKey> = names
                .iter()
                .filter(|(_, n)| !n.has_data())
                .map(|(k, _)| k.clone())
                .collect();
            let take = (candidates.len() * fraction as usize / 100).max(candidates.len().min(1));
            let mut removed = 0;
            for key in candidates.into_iter().take(take) {
                names.remove(&key);
                removed += 1;
            }
            removed
        };
        self.overmem_running.store(false, Ordering::Release);
        removed
    }

    pub fn dump<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "; adb dump")?;
        let names = self.names.read().unwrap_or_else(|e| e.into_inner());
        for ((name, start_at_zone), adb_name) in names.iter() {
            writeln!(
                writer,
                "{name} startatzone={start_at_zone} last_used={}",
                adb_name.last_used()
            )?;
        }
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        for (addr, entry) in entries.iter() {
            writeln!(
                writer,
                "    entry {addr} srtt={} quota={} active={} referrers={}",
                entry.srtt(),
                entry.quota(),
                entry.active(),
                entry.referrer_count()
            )?;
        }
        Ok(())
    }
}

fn address_of(rr: &dns_types::protocol::types::RecordTypeWithData) -> Option<IpAddr> {
    use dns_types::protocol::types::RecordTypeWithData;
    match rr {
        RecordTypeWithData::A { address } => Some(IpAddr::V4(*address)),
        RecordTypeWithData::AAAA { address } => Some(IpAddr::V6(*address)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchHandle, NullFetchService};
    use dns_types::protocol::types::test_util::domain;
    use std::sync::atomic::AtomicUsize;

    struct CountingFetchService {
        count: AtomicUsize,
    }

    impl FetchService for CountingFetchService {
        fn create_fetch(
            &self,
            _owner: &DomainName,
            qtype: RecordType,
            _depth: u32,
            _options: u32,
        ) -> Result<FetchHandle, AdbError> {
            let id = self.count.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(FetchHandle { id, qtype })
        }
        fn cancel_fetch(&self, _fetch: &FetchHandle) {}
        fn destroy_fetch(&self, _fetch: FetchHandle) {}
    }

    #[test]
    fn shutdown_fires_every_pending_find_exactly_once() {
        let adb = Adb::new(Arc::new(CountingFetchService { count: AtomicUsize::new(0) }));
        let name = domain("ns.example.");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let (find, status) = adb.createfind(
            &name,
            family::INET | family::INET6,
            opt::WANTEVENT,
            0,
            Box::new(move |_f| {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(FindStatus::Pending, status);

        adb.shutdown();
        assert_eq!(1, fired.load(Ordering::SeqCst));
        assert_eq!(FindStatus::ShuttingDown, find.status());

        // A second shutdown must not refire anything.
        adb.shutdown();
        assert_eq!(1, fired.load(Ordering::SeqCst));
    }

    #[test]
    fn createfind_after_shutdown_returns_shuttingdown() {
        let adb = Adb::new(Arc::new(NullFetchService));
        adb.shutdown();
        let (_find, status) = adb.createfind(
            &domain("ns.example."),
            family::INET,
            0,
            0,
            Box::new(|_f| {}),
        );
        assert_eq!(FindStatus::ShuttingDown, status);
    }

    #[test]
    fn cancelfind_does_not_strand_sibling_finds() {
        let service = Arc::new(CountingFetchService { count: AtomicUsize::new(0) });
        let adb = Adb::new(service as SharedFetchService);
        let name = domain("ns.example.");

        let sibling_fired = Arc::new(AtomicUsize::new(0));
        let sibling_fired2 = Arc::clone(&sibling_fired);
        let (cancel_me, _) = adb.createfind(&name, family::INET, opt::WANTEVENT, 0, Box::new(|_f| {}));
        let (sibling, _) = adb.createfind(
            &name,
            family::INET,
            opt::WANTEVENT,
            0,
            Box::new(move |_f| {
                sibling_fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        adb.cancelfind(&name, false, &cancel_me);
        assert_eq!(FindStatus::Canceled, cancel_me.status());

        adb.fetch_callback(
            &name,
            false,
            0,
            FetchOutcome::Negative { error: AdbError::Nxdomain, ttl: 60 },
            1,
        );
        assert_eq!(1, sibling_fired.load(Ordering::SeqCst));
        assert_eq!(FindStatus::NoMoreAddresses, sibling.status());
    }

    #[test]
    fn fetch_callback_fires_no_more_addresses_on_negative_outcome() {
        let service = Arc::new(CountingFetchService { count: AtomicUsize::new(0) });
        let adb = Adb::new(service as SharedFetchService);
        let name = domain("ns.example.");

        let (find, status) = adb.createfind(&name, family::INET, opt::WANTEVENT, 0, Box::new(|_f| {}));
        assert_eq!(FindStatus::Pending, status);

        adb.fetch_callback(
            &name,
            false,
            0,
            FetchOutcome::Negative { error: AdbError::Nxdomain, ttl: 60 },
            1,
        );
        assert_eq!(FindStatus::NoMoreAddresses, find.status());
    }

    #[test]
    fn s5_concurrent_createfind_shares_one_fetch_per_family() {
        let service = Arc::new(CountingFetchService { count: AtomicUsize::new(0) });
        let adb = Adb::new(service.clone() as SharedFetchService);
        let name = domain("ns.example.");

        let (_f1, _s1) = adb.createfind(&name, family::INET | family::INET6, opt::WANTEVENT, 0, Box::new(|_f| {}));
        let (_f2, _s2) = adb.createfind(&name, family::INET | family::INET6, opt::WANTEVENT, 0, Box::new(|_f| {}));

        // Second createfind observed fetches already in flight and
        // did not start new ones.
        assert_eq!(2, service.count.load(Ordering::SeqCst));
    }
}
