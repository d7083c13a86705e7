//! Part of C5: the per-owner-name ADB record.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use dns_types::protocol::types::DomainName;

use crate::fetch::FetchHandle;
use crate::find::{family, AdbError, Find};
use crate::namehook::NameHook;

struct AdbNameInner {
    v4_namehooks: Vec<NameHook>,
    v6_namehooks: Vec<NameHook>,
    expire_v4: u64,
    expire_v6: u64,
    alias_target: Option<(DomainName, u64)>,
    fetch_a: Option<FetchHandle>,
    fetch_aaaa: Option<FetchHandle>,
    waiting_finds: VecDeque<Arc<Find>>,
    error_v4: Option<AdbError>,
    error_v6: Option<AdbError>,
    last_used: u64,
    dead: bool,
}

/// `(owner name, start-at-zone)` is the hash key (§4.7 step 3): a
/// bailiwick query never shares state with a normal one.
pub struct AdbName {
    pub name: DomainName,
    pub start_at_zone: bool,
    inner: Mutex<AdbNameInner>,
}

impl AdbName {
    pub fn new(name: DomainName, start_at_zone: bool) -> Self {
        AdbName {
            name,
            start_at_zone,
            inner: Mutex::new(AdbNameInner {
                v4_namehooks: Vec::new(),
                v6_namehooks: Vec::new(),
                expire_v4: 0,
                expire_v6: 0,
                alias_target: None,
                fetch_a: None,
                fetch_aaaa: None,
                waiting_finds: VecDeque::new(),
                error_v4: None,
                error_v6: None,
                last_used: 0,
                dead: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdbNameInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn touch(&self, now: u64) {
        self.lock().last_used = now;
    }

    pub fn last_used(&self) -> u64 {
        self.lock().last_used
    }

    pub fn is_dead(&self) -> bool {
        self.lock().dead
    }

    pub fn mark_dead(&self) {
        self.lock().dead = true;
    }

    /// §4.7 step 4: expire a family whose expiry has passed and has no
    /// active fetch, dropping its namehooks. Also drops an expired
    /// alias target. Returns which families were expired.
    pub fn expire_stale(&self, now: u64) -> (bool, bool) {
        let mut inner = self.lock();
        let mut expired_v4 = false;
        let mut expired_v6 = false;

        if inner.expire_v4 != 0 && inner.expire_v4 <= now && inner.fetch_a.is_none() {
            inner.v4_namehooks.clear();
            inner.expire_v4 = 0;
            inner.error_v4 = None;
            expired_v4 = true;
        }
        if inner.expire_v6 != 0 && inner.expire_v6 <= now && inner.fetch_aaaa.is_none() {
            inner.v6_namehooks.clear();
            inner.expire_v6 = 0;
            inner.error_v6 = None;
            expired_v6 = true;
        }
        if let Some((_, expiry)) = inner.alias_target {
            if expiry <= now {
                inner.alias_target = None;
            }
        }

        (expired_v4, expired_v6)
    }

    pub fn alias_if_unexpired(&self, now: u64) -> Option<DomainName> {
        let inner = self.lock();
        inner.alias_target.as_ref().and_then(|(target, expiry)| {
            if *expiry > now {
                Some(target.clone())
            } else {
                None
            }
        })
    }

    pub fn set_alias(&self, target: DomainName, expiry: u64) {
        self.lock().alias_target = Some((target, expiry));
    }

    /// Invariant 3 (§8): a namehook list and an in-flight fetch for
    /// the same family are mutually exclusive.
    pub fn has_fetch(&self, fam: u32) -> bool {
        let inner = self.lock();
        (fam & family::INET != 0 && inner.fetch_a.is_some())
            || (fam & family::INET6 != 0 && inner.fetch_aaaa.is_some())
    }

    pub fn has_namehooks(&self, fam: u32) -> bool {
        let inner = self.lock();
        (fam & family::INET != 0 && !inner.v4_namehooks.is_empty())
            || (fam & family::INET6 != 0 && !inner.v6_namehooks.is_empty())
    }

    pub fn set_fetch(&self, fam: u32, handle: FetchHandle) {
        let mut inner = self.lock();
        debug_assert!(
            !((fam & family::INET != 0 && !inner.v4_namehooks.is_empty())
                || (fam & family::INET6 != 0 && !inner.v6_namehooks.is_empty())),
            "starting a fetch while namehooks for the same family are present"
        );
        if fam & family::INET != 0 {
            inner.fetch_a = Some(handle);
        } else if fam & family::INET6 != 0 {
            inner.fetch_aaaa = Some(handle);
        }
    }

    /// Clear whichever fetch slot matches `handle.id`, returning the
    /// family it belonged to (§4.8 step 1).
    pub fn clear_fetch_by_id(&self, id: u64) -> Option<u32> {
        let mut inner = self.lock();
        if inner.fetch_a.as_ref().is_some_and(|f| f.id == id) {
            inner.fetch_a = None;
            return Some(family::INET);
        }
        if inner.fetch_aaaa.as_ref().is_some_and(|f| f.id == id) {
            inner.fetch_aaaa = None;
            return Some(family::INET6);
        }
        None
    }

    pub fn add_namehook(&self, fam: u32, hook: NameHook) {
        let mut inner = self.lock();
        if fam & family::INET != 0 {
            inner.v4_namehooks.push(hook);
        } else {
            inner.v6_namehooks.push(hook);
        }
    }

    pub fn namehook_entries(&self, fam: u32) -> Vec<Arc<crate::entry::Entry>> {
        let inner = self.lock();
        let hooks = if fam & family::INET != 0 {
            &inner.v4_namehooks
        } else {
            &inner.v6_namehooks
        };
        hooks.iter().map(|h| Arc::clone(&h.entry)).collect()
    }

    pub fn set_expiry(&self, fam: u32, at: u64) {
        let mut inner = self.lock();
        if fam & family::INET != 0 {
            inner.expire_v4 = at;
        } else {
            inner.expire_v6 = at;
        }
    }

    pub fn set_error(&self, fam: u32, err: AdbError) {
        let mut inner = self.lock();
        if fam & family::INET != 0 {
            inner.error_v4 = Some(err);
        } else {
            inner.error_v6 = Some(err);
        }
    }

    pub fn errors(&self) -> (Option<AdbError>, Option<AdbError>) {
        let inner = self.lock();
        (inner.error_v4, inner.error_v6)
    }

    pub fn link_find(&self, find: Arc<Find>) {
        find.link();
        self.lock().waiting_finds.push_back(find);
    }

    /// Remove exactly one find from the wait list, by identity, not by
    /// family (§4.7 `cancelfind`): cancelling one find must not evict
    /// siblings waiting on the same name for an overlapping family.
    pub fn unlink_find(&self, find: &Arc<Find>) -> bool {
        let mut inner = self.lock();
        let before = inner.waiting_finds.len();
        inner.waiting_finds.retain(|f| !Arc::ptr_eq(f, find));
        let removed = before != inner.waiting_finds.len();
        if removed {
            find.unlink();
        }
        removed
    }

    /// Walk the wait list for `fam`-relevant finds, unlinking each
    /// (§4.8 step 7). Order of linking is preserved.
    pub fn drain_waiting_finds(&self, fam_mask: u32) -> Vec<Arc<Find>> {
        let mut inner = self.lock();
        let mut matched = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(find) = inner.waiting_finds.pop_front() {
            if find.wanted & fam_mask != 0 {
                find.unlink();
                matched.push(find);
            } else {
                remaining.push_back(find);
            }
        }
        inner.waiting_finds = remaining;
        matched
    }

    pub fn has_data(&self) -> bool {
        let inner = self.lock();
        !inner.v4_namehooks.is_empty()
            || !inner.v6_namehooks.is_empty()
            || inner.alias_target.is_some()
            || inner.fetch_a.is_some()
            || inner.fetch_aaaa.is_some()
            || !inner.waiting_finds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::domain;

    #[test]
    fn expire_stale_clears_namehooks_without_active_fetch() {
        let name = AdbName::new(domain("ns.example."), false);
        let entry = Arc::new(crate::entry::Entry::new("127.0.0.1".parse().unwrap(), 0));
        name.add_namehook(family::INET, NameHook::new(entry));
        name.set_expiry(family::INET, 100);

        let (v4, v6) = name.expire_stale(50);
        assert!(!v4 && !v6);
        assert!(name.has_namehooks(family::INET));

        let (v4, v6) = name.expire_stale(200);
        assert!(v4 && !v6);
        assert!(!name.has_namehooks(family::INET));
    }

    #[test]
    fn fetch_and_namehooks_are_mutually_exclusive_per_family() {
        let name = AdbName::new(domain("ns.example."), false);
        name.set_fetch(family::INET, FetchHandle { id: 1, qtype: dns_types::protocol::types::RecordType::A });
        assert!(name.has_fetch(family::INET));
        assert!(!name.has_namehooks(family::INET));
    }

    #[test]
    fn alias_target_expires() {
        let name = AdbName::new(domain("a.example."), false);
        name.set_alias(domain("b.example."), 100);
        assert_eq!(Some(domain("b.example.")), name.alias_if_unexpired(50));
        assert_eq!(None, name.alias_if_unexpired(150));
    }

    #[test]
    fn unlink_find_does_not_evict_siblings() {
        let name = AdbName::new(domain("ns.example."), false);
        let a = Find::new(family::INET, 0, Box::new(|_| {}));
        let b = Find::new(family::INET, 0, Box::new(|_| {}));
        name.link_find(Arc::clone(&a));
        name.link_find(Arc::clone(&b));

        assert!(name.unlink_find(&a));
        assert!(!a.is_linked());
        assert!(b.is_linked());
        assert_eq!(1, name.lock().waiting_finds.len());

        assert!(!name.unlink_find(&a));
    }
}
