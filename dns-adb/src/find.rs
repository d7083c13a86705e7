//! The caller-owned find handle and its result view (§3, §4.7).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::entry::Entry;

pub mod family {
    pub const INET: u32 = 1 << 0;
    pub const INET6: u32 = 1 << 1;
}

pub mod opt {
    pub const WANTEVENT: u32 = 1 << 0;
    pub const STARTATZONE: u32 = 1 << 1;
    pub const AVOIDFETCHES: u32 = 1 << 2;
    pub const NOFETCH: u32 = 1 << 3;
    pub const EMPTYEVENT: u32 = 1 << 4;
}

/// Per-family error recorded on the ADB name and copied into a find's
/// result fields (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdbError {
    Nxdomain,
    Nxrrset,
    Failure,
    Timedout,
    Unexpected,
}

/// Terminal status of a find, delivered exactly once (§4.8 step 7,
/// §8 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStatus {
    Pending,
    MoreAddresses,
    /// A fetch this find was waiting on completed without adding any
    /// addresses (negative, alias, or failed lookup).
    NoMoreAddresses,
    Alias,
    Canceled,
    ShuttingDown,
}

impl fmt::Display for FindStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A cheap per-find view over one entry: port, and a snapshot of the
/// entry's RTT/flags taken at the moment it was copied into the find.
#[derive(Debug, Clone)]
pub struct Addrinfo {
    pub port: u16,
    pub entry: Arc<Entry>,
    pub rtt_snapshot: u64,
    pub flags_snapshot: u32,
}

impl Addrinfo {
    pub fn from_entry(entry: &Arc<Entry>, port: u16) -> Self {
        Addrinfo {
            port,
            entry: Arc::clone(entry),
            rtt_snapshot: entry.srtt(),
            flags_snapshot: entry.flags(),
        }
    }
}

type Callback = Box<dyn Fn(Arc<Find>) + Send + Sync>;

/// A caller-owned ticket representing an in-flight or completed ADB
/// lookup.
pub struct Find {
    pub wanted: u32,
    pub options: u32,
    list: Mutex<Vec<Addrinfo>>,
    status: Mutex<FindStatus>,
    result_v4: Mutex<Option<AdbError>>,
    result_v6: Mutex<Option<AdbError>>,
    event_sent: AtomicBool,
    overquota: AtomicBool,
    linked: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl fmt::Debug for Find {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Find")
            .field("wanted", &self.wanted)
            .field("options", &self.options)
            .field("status", &*self.status.lock().unwrap_or_else(|e| e.into_inner()))
            .finish()
    }
}

impl Find {
    pub fn new(wanted: u32, options: u32, callback: Callback) -> Arc<Self> {
        Arc::new(Find {
            wanted,
            options,
            list: Mutex::new(Vec::new()),
            status: Mutex::new(FindStatus::Pending),
            result_v4: Mutex::new(None),
            result_v6: Mutex::new(None),
            event_sent: AtomicBool::new(false),
            overquota: AtomicBool::new(false),
            linked: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        })
    }

    pub fn push_addrinfo(&self, info: Addrinfo) {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).push(info);
    }

    pub fn addrinfo_list(&self) -> Vec<Addrinfo> {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_overquota(&self) {
        self.overquota.store(true, Ordering::Release);
    }

    pub fn is_overquota(&self) -> bool {
        self.overquota.load(Ordering::Acquire)
    }

    pub fn set_result(&self, fam: u32, err: AdbError) {
        if fam & family::INET != 0 {
            *self.result_v4.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
        }
        if fam & family::INET6 != 0 {
            *self.result_v6.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
        }
    }

    pub fn result_v4(&self) -> Option<AdbError> {
        *self.result_v4.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn result_v6(&self) -> Option<AdbError> {
        *self.result_v6.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> FindStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_status(&self, status: FindStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn link(&self) {
        self.linked.store(true, Ordering::Release);
    }

    pub fn unlink(&self) -> bool {
        self.linked.swap(false, Ordering::AcqRel)
    }

    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    pub fn mark_event_sent(&self) -> bool {
        !self.event_sent.swap(true, Ordering::AcqRel)
    }

    pub fn event_already_sent(&self) -> bool {
        self.event_sent.load(Ordering::Acquire)
    }

    /// Fire the completion callback exactly once, per `FIND_EVENT_SENT`
    /// semantics (§4.8 step 7). Delivery itself is the caller's
    /// responsibility — dispatch this onto the find's event loop,
    /// never inline on the thread completing the fetch (§9).
    pub fn fire(self: &Arc<Self>, status: FindStatus) -> bool {
        if !self.mark_event_sent() {
            return false;
        }
        self.set_status(status);
        if let Some(callback) = self.callback.lock().unwrap_or_else(|e| e.into_inner()).take() {
            callback(Arc::clone(self));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fire_dispatches_callback_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let find = Find::new(
            family::INET,
            opt::WANTEVENT,
            Box::new(move |_f| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(find.fire(FindStatus::MoreAddresses));
        assert!(!find.fire(FindStatus::Canceled));
        assert_eq!(1, count.load(Ordering::SeqCst));
        assert_eq!(FindStatus::MoreAddresses, find.status());
    }
}
