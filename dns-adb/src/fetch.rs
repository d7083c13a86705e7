//! §6: the resolver fetch contract the ADB consumes to resolve
//! A/AAAA records. The resolver iterator itself is out of scope; this
//! trait is the seam a real implementation plugs into.

use std::sync::Arc;

use dns_types::protocol::types::{DomainName, RecordType, RecordTypeWithData};

use crate::find::AdbError;

pub mod opt {
    pub const NOVALIDATE: u32 = 1 << 0;
    /// "start-at-zone": this fetch must not share in-flight state with
    /// an ordinary lookup for the same name.
    pub const UNSHARED: u32 = 1 << 1;
    pub const QMINIMIZE: u32 = 1 << 2;
    pub const QMIN_SKIP_IP6A: u32 = 1 << 3;
    pub const QMIN_STRICT: u32 = 1 << 4;
}

/// An opaque handle to an in-flight fetch, returned by
/// [`FetchService::create_fetch`] and later passed back to
/// `cancel_fetch`/`destroy_fetch`.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    pub id: u64,
    pub qtype: RecordType,
}

/// What a fetch resolved to, delivered to `fetch_callback` (§4.8).
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        found_name: DomainName,
        rdata: Vec<RecordTypeWithData>,
        ttl: u64,
    },
    Alias {
        target: DomainName,
        ttl: u64,
    },
    Negative {
        error: AdbError,
        ttl: u64,
    },
    Failure {
        error: AdbError,
        depth: u32,
    },
}

/// The contract the ADB relies on to start, cancel, and tear down
/// upstream fetches (§6 "Resolver fetch API").
pub trait FetchService: Send + Sync {
    /// `resolver_createfetch`.
    fn create_fetch(
        &self,
        owner: &DomainName,
        qtype: RecordType,
        depth: u32,
        options: u32,
    ) -> Result<FetchHandle, AdbError>;

    /// `resolver_cancelfetch`.
    fn cancel_fetch(&self, fetch: &FetchHandle);

    /// `resolver_destroyfetch`.
    fn destroy_fetch(&self, fetch: FetchHandle);
}

/// A [`FetchService`] that never succeeds, useful for `NOFETCH`-style
/// callers and for tests exercising the ADB without a real resolver.
pub struct NullFetchService;

impl FetchService for NullFetchService {
    fn create_fetch(
        &self,
        _owner: &DomainName,
        _qtype: RecordType,
        _depth: u32,
        _options: u32,
    ) -> Result<FetchHandle, AdbError> {
        Err(AdbError::Unexpected)
    }

    fn cancel_fetch(&self, _fetch: &FetchHandle) {}
    fn destroy_fetch(&self, _fetch: FetchHandle) {}
}

pub type SharedFetchService = Arc<dyn FetchService>;
