//! Outcomes of a [`crate::cache::Cache::find`] or
//! [`crate::cache::Cache::add`] call (§4.3, §4.5, §7).

use std::fmt;
use std::sync::Arc;

use dns_types::protocol::types::DomainName;

use crate::header::SlabHeader;

/// What a lookup found, and the data needed to answer it.
///
/// Every `ttl` field here is seconds remaining as of the `now` passed
/// to `find` — not the header's own `ttl()`, which is an absolute
/// expiry timestamp (§3) and would otherwise never appear to
/// decrease across calls.
#[derive(Debug, Clone)]
pub enum FindOutcome {
    /// An exact, positive match.
    Success {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        sigrdataset: Option<Arc<SlabHeader>>,
        ttl: u64,
    },
    /// The queried name holds a CNAME and the query wasn't for CNAME.
    Cname {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        ttl: u64,
    },
    /// An active DNAME was found above the queried name.
    Dname {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        ttl: u64,
    },
    /// No data at the queried name or below; the deepest zone cut
    /// found on the way up is returned.
    Delegation {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        ttl: u64,
    },
    /// A cached negative entry, the queried name itself does not exist.
    NcacheNxdomain {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        ttl: u64,
    },
    /// A cached negative entry, the name exists but not this type.
    NcacheNxrrset {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        ttl: u64,
    },
    /// A covering NSEC record proves the name doesn't exist.
    CoveringNsec {
        found_name: DomainName,
        rdataset: Arc<SlabHeader>,
        sigrdataset: Option<Arc<SlabHeader>>,
        ttl: u64,
    },
    /// Trie lookup bottomed out on an ancestor with no usable data.
    PartialMatch { found_name: DomainName },
    /// No partial match at all — not even the origin held anything.
    NotFound,
}

impl FindOutcome {
    pub fn found_name(&self) -> Option<&DomainName> {
        match self {
            FindOutcome::Success { found_name, .. }
            | FindOutcome::Cname { found_name, .. }
            | FindOutcome::Dname { found_name, .. }
            | FindOutcome::Delegation { found_name, .. }
            | FindOutcome::NcacheNxdomain { found_name, .. }
            | FindOutcome::NcacheNxrrset { found_name, .. }
            | FindOutcome::CoveringNsec { found_name, .. }
            | FindOutcome::PartialMatch { found_name } => Some(found_name),
            FindOutcome::NotFound => None,
        }
    }
}

impl fmt::Display for FindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FindOutcome::Success { .. } => "SUCCESS",
            FindOutcome::Cname { .. } => "CNAME",
            FindOutcome::Dname { .. } => "DNAME",
            FindOutcome::Delegation { .. } => "DELEGATION",
            FindOutcome::NcacheNxdomain { .. } => "NCACHE_NXDOMAIN",
            FindOutcome::NcacheNxrrset { .. } => "NCACHE_NXRRSET",
            FindOutcome::CoveringNsec { .. } => "COVERINGNSEC",
            FindOutcome::PartialMatch { .. } => "PARTIALMATCH",
            FindOutcome::NotFound => "NOTFOUND",
        };
        write!(f, "{label}")
    }
}

/// Result of [`crate::cache::Cache::add`] (§4.5 step 4, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The new header was stored as the node's current header for its
    /// type pair.
    Added,
    /// An existing active header of equal-or-higher trust already
    /// covers this; its TTL may have been refreshed but `new` was
    /// dropped. Also returned for an exact NONEXISTENT/NONEXISTENT
    /// match and for a duplicate `add` (round-trip property 8).
    Unchanged,
}
