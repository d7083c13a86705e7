//! The Address Database: nameserver-name-to-address cache, per-address
//! health metrics and concurrency quotas, and in-flight A/AAAA fetch
//! coordination.

pub mod adb;
pub mod entry;
pub mod fetch;
pub mod find;
pub mod name;
pub mod namehook;
pub mod quota;

pub use adb::Adb;
pub use entry::Entry;
pub use fetch::{FetchHandle, FetchOutcome, FetchService, NullFetchService, SharedFetchService};
pub use find::{family, opt, AdbError, Addrinfo, Find, FindStatus};
pub use name::AdbName;
pub use namehook::NameHook;
pub use quota::{AtrState, QuotaConfig};
