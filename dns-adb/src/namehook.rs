//! The edge record linking one ADB name to one ADB entry (§9).
//!
//! Namehooks are owned by the ADB name's namehook list; the entry
//! only tracks how many hooks reference it ([`Entry::referrer_count`])
//! so deletion never has to walk a back-pointer list under lock. The
//! referrer count is incremented on construction and decremented on
//! drop, so no name-side code needs to remember to call back into the
//! entry explicitly.

use std::sync::Arc;

use crate::entry::Entry;

#[derive(Debug)]
pub struct NameHook {
    pub entry: Arc<Entry>,
}

impl NameHook {
    pub fn new(entry: Arc<Entry>) -> Self {
        entry.add_referrer();
        NameHook { entry }
    }
}

impl Drop for NameHook {
    fn drop(&mut self) {
        self.entry.remove_referrer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn dropping_a_namehook_releases_its_referrer_count() {
        let entry = Arc::new(Entry::new("127.0.0.1".parse::<IpAddr>().unwrap(), 0));
        {
            let _hook = NameHook::new(Arc::clone(&entry));
            assert_eq!(1, entry.referrer_count());
        }
        assert_eq!(0, entry.referrer_count());
    }
}
