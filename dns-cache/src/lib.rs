//! The answer cache: a per-name store of resource-record sets with
//! TTL expiry, trust-ranked replacement, negative caching,
//! stale-serve, and a covering-NSEC index.
//!
//! Wire-format parsing and serialization are out of scope (see
//! `dns-types`); this crate works entirely in terms of the typed
//! record representation.

pub mod cache;
pub mod header;
pub mod node;
pub mod options;
pub mod result;
pub mod stats;

pub use cache::{Cache, NewHeader};
pub use header::{NegativeProof, SlabHeader, Trust, TypePair};
pub use node::{HeaderSlot, NameNode, NsecTag};
pub use options::{find_opt, AddMode};
pub use result::{AddOutcome, FindOutcome};
pub use stats::CacheStats;
