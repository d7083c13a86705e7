//! Core DNS data types shared by the answer cache and the address
//! database.
//!
//! This crate intentionally does not implement wire-format parsing or
//! serialisation: that is the job of a separate, out-of-scope
//! rdata/wire library. What lives here is just the in-memory shape of
//! names, record types, and resource records that the cache and the
//! ADB need to agree on.

pub mod protocol;
