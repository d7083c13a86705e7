use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A fully-qualified domain name: a sequence of length-prefixed
/// labels.
///
/// Canonical comparison (`Eq`, `Ord`, `Hash`) is case-insensitive over
/// ASCII labels and follows the "most significant label first" order
/// used by NSEC covering (RFC 4034 section 6.1) — so a `BTreeMap`
/// keyed on `DomainName` yields names in an order where a domain's
/// ancestors sort immediately around it. Display (`to_dotted_string`)
/// preserves the case the name was constructed with.
#[derive(Clone)]
pub struct DomainName {
    /// Labels as given, most-specific first, terminated by the empty
    /// root label. Used only for display.
    display_labels: Vec<Vec<u8>>,
    /// Same labels, ASCII-lowercased. Used for comparison, hashing,
    /// and the subdomain/canonical-order relations.
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            display_labels: vec![vec![]],
            labels: vec![vec![]],
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1
    }

    /// The labels, most-specific first, lowercased. Used as the
    /// canonical key by the cache's trie.
    pub fn canonical_labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        self.labels.ends_with(&other.labels)
    }

    /// The immediate parent of this name, or `None` if this is the
    /// root.
    pub fn parent(&self) -> Option<DomainName> {
        if self.is_root() {
            None
        } else {
            Some(DomainName {
                display_labels: self.display_labels[1..].to_vec(),
                labels: self.labels[1..].to_vec(),
            })
        }
    }

    /// All ancestors of this name, from the immediate parent up to
    /// (and including) the root, nearest first.
    pub fn ancestors(&self) -> Vec<DomainName> {
        let mut out = Vec::new();
        let mut cur = self.clone();
        while let Some(parent) = cur.parent() {
            out.push(parent.clone());
            cur = parent;
        }
        out
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::new();
        for label in &self.display_labels {
            for octet in label {
                out.push(*octet as char);
            }
            out.push('.');
        }
        out
    }

    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len());
        for (i, label) in chunks.iter().enumerate() {
            if label.is_empty() && i != chunks.len() - 1 {
                return None;
            }
            labels.push(label.as_bytes().to_vec());
        }
        Self::from_labels(labels)
    }

    pub fn from_labels(mixed_case_labels: Vec<Vec<u8>>) -> Option<Self> {
        if mixed_case_labels.is_empty() {
            return None;
        }

        let mut display_labels = Vec::with_capacity(mixed_case_labels.len());
        let mut labels = Vec::with_capacity(mixed_case_labels.len());
        let mut total_octets = 0usize;
        let mut blank_label = false;

        for mc_label in &mixed_case_labels {
            if blank_label {
                return None;
            }
            blank_label = mc_label.is_empty();

            if mc_label.len() > 63 {
                return None;
            }
            if !mc_label.iter().all(u8::is_ascii) {
                return None;
            }

            total_octets += 1 + mc_label.len();
            labels.push(mc_label.iter().map(u8::to_ascii_lowercase).collect());
            display_labels.push(mc_label.clone());
        }

        if blank_label && total_octets <= 255 {
            Some(Self {
                display_labels,
                labels,
            })
        } else {
            None
        }
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labels.hash(state);
    }
}

/// Canonical DNS name ordering: compare from the most significant
/// (rightmost / closest to the root) label down to the least
/// significant. This is the order NSEC covering relies on to find the
/// predecessor of a nonexistent name.
impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels
            .iter()
            .rev()
            .cmp(other.labels.iter().rev())
    }
}

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The class of a resource record. Only `IN` is meaningfully
/// supported; others round-trip as `Unknown`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    Unknown(u16),
}

/// A DNS record type.
///
/// This extends the upstream resolver's `RecordType` (which only
/// covers plain, non-DNSSEC-aware resolution) with the record types
/// the answer cache needs in order to implement trust-ranked
/// replacement, negative caching, and covering-NSEC lookup: `NSEC`,
/// `NSEC3`, `RRSIG`, `DS`, and `DNSKEY`. We cache these records and
/// their signatures but never validate them (see Non-goals).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    DS,
    DNSKEY,
    NSEC,
    NSEC3,
    RRSIG,
    /// A DNAME redirects an entire subtree to another name (RFC 6672).
    /// Cached and consulted by the answer cache's delegation walk
    /// (§4.3 step 2) but, like everything else here, never validated.
    DNAME,
    Unknown(u16),
}

impl RecordType {
    pub fn is_unknown(&self) -> bool {
        matches!(self, RecordType::Unknown(_))
    }

    pub fn matches(&self, qtype: &QueryType) -> bool {
        match qtype {
            QueryType::Wildcard => true,
            QueryType::Record(rtype) => rtype == self,
            _ => false,
        }
    }

    /// Whether this type participates in the priority ordering used
    /// when inserting a brand new name node's first headers (§4.5
    /// step 6): SOA, A, AAAA, NS, NSEC, NSEC3, DS, CNAME, and their
    /// signatures sort to the front.
    pub fn insertion_priority(&self) -> u8 {
        match self {
            RecordType::SOA => 0,
            RecordType::A => 1,
            RecordType::AAAA => 2,
            RecordType::NS => 3,
            RecordType::NSEC => 4,
            RecordType::NSEC3 => 5,
            RecordType::DS => 6,
            RecordType::CNAME => 7,
            RecordType::RRSIG => 8,
            _ => 9,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::DS => write!(f, "DS"),
            RecordType::DNSKEY => write!(f, "DNSKEY"),
            RecordType::NSEC => write!(f, "NSEC"),
            RecordType::NSEC3 => write!(f, "NSEC3"),
            RecordType::RRSIG => write!(f, "RRSIG"),
            RecordType::DNAME => write!(f, "DNAME"),
            RecordType::Unknown(n) => write!(f, "TYPE{n}"),
        }
    }
}

/// Query types are a superset of record types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QueryType {
    Record(RecordType),
    Wildcard,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Record(rtype) => write!(f, "{rtype}"),
            QueryType::Wildcard => write!(f, "*"),
        }
    }
}

/// Query classes are a superset of record classes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    Wildcard,
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryClass::Record(RecordClass::IN) => write!(f, "IN"),
            QueryClass::Record(RecordClass::Unknown(n)) => write!(f, "CLASS{n}"),
            QueryClass::Wildcard => write!(f, "*"),
        }
    }
}

/// A single question: what's being asked.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// One RR's type-specific data.
///
/// `Unknown` carries the raw rdata bytes (as produced by the, here
/// out-of-scope, wire-format library) so that unsupported types can
/// still be cached and served without this crate understanding their
/// contents.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum RecordTypeWithData {
    A {
        address: Ipv4Addr,
    },
    AAAA {
        address: Ipv6Addr,
    },
    NS {
        nsdname: DomainName,
    },
    CNAME {
        cname: DomainName,
    },
    DNAME {
        target: DomainName,
    },
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    PTR {
        ptrdname: DomainName,
    },
    MX {
        preference: u16,
        exchange: DomainName,
    },
    TXT {
        octets: Vec<Vec<u8>>,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
    DS {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    DNSKEY {
        flags: u16,
        protocol: u8,
        algorithm: u8,
        public_key: Vec<u8>,
    },
    NSEC {
        next_domain_name: DomainName,
        type_bit_maps: Vec<RecordType>,
    },
    NSEC3 {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
        next_hashed_owner_name: Vec<u8>,
        type_bit_maps: Vec<RecordType>,
    },
    RRSIG {
        type_covered: RecordType,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        signature_expiration: u32,
        signature_inception: u32,
        key_tag: u16,
        signer_name: DomainName,
        signature: Vec<u8>,
    },
    Unknown {
        rtype: u16,
        octets: Vec<u8>,
    },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::AAAA { .. } => RecordType::AAAA,
            RecordTypeWithData::NS { .. } => RecordType::NS,
            RecordTypeWithData::CNAME { .. } => RecordType::CNAME,
            RecordTypeWithData::DNAME { .. } => RecordType::DNAME,
            RecordTypeWithData::SOA { .. } => RecordType::SOA,
            RecordTypeWithData::PTR { .. } => RecordType::PTR,
            RecordTypeWithData::MX { .. } => RecordType::MX,
            RecordTypeWithData::TXT { .. } => RecordType::TXT,
            RecordTypeWithData::SRV { .. } => RecordType::SRV,
            RecordTypeWithData::DS { .. } => RecordType::DS,
            RecordTypeWithData::DNSKEY { .. } => RecordType::DNSKEY,
            RecordTypeWithData::NSEC { .. } => RecordType::NSEC,
            RecordTypeWithData::NSEC3 { .. } => RecordType::NSEC3,
            RecordTypeWithData::RRSIG { .. } => RecordType::RRSIG,
            RecordTypeWithData::Unknown { rtype, .. } => RecordType::Unknown(*rtype),
        }
    }

    /// Byte-equality ignoring TTL, used by the replacement algorithm
    /// (§4.5) to decide whether a refresh merely extends an existing
    /// RRset rather than replacing it. Since this crate does not parse
    /// wire rdata, we compare the typed representation directly,
    /// which is equivalent for every type it understands.
    pub fn data_equal(&self, other: &Self) -> bool {
        self == other
    }
}

/// A single resource record: an owner name plus its type-specific
/// data, class, and TTL (seconds remaining, relative to "now" at the
/// point this value was produced).
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,
    pub ttl: u32,
}

#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;

    pub fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::A { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::AAAA { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn ns_record(name: &str, nsdname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::NS {
                nsdname: domain(nsdname),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn cname_record(name: &str, cname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::CNAME {
                cname: domain(cname),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn dname_record(name: &str, target: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::DNAME {
                target: domain(target),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn nsec_record(name: &str, next: &str, types: &[RecordType]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::NSEC {
                next_domain_name: domain(next),
                type_bit_maps: types.to_vec(),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn rrsig_record(name: &str, type_covered: RecordType, signer: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::RRSIG {
                type_covered,
                algorithm: 8,
                labels: 2,
                original_ttl: 300,
                signature_expiration: 2_000_000_000,
                signature_inception: 1_000_000_000,
                key_tag: 1234,
                signer_name: domain(signer),
                signature: vec![1, 2, 3, 4],
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn soa_record(name: &str, mname: &str, rname: &str, minimum: u32) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::SOA {
                mname: domain(mname),
                rname: domain(rname),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 604800,
                minimum,
            },
            rclass: RecordClass::IN,
            ttl: minimum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn domain_name_eq_is_case_insensitive() {
        assert_eq!(domain("Example.COM."), domain("example.com."));
    }

    #[test]
    fn domain_name_display_preserves_case() {
        let d = domain("Example.COM.");
        assert_eq!("Example.COM.", d.to_dotted_string());
    }

    #[test]
    fn domain_name_is_subdomain_of() {
        assert!(domain("www.example.com.").is_subdomain_of(&domain("example.com.")));
        assert!(!domain("www.example.com.").is_subdomain_of(&domain("example.net.")));
    }

    #[test]
    fn domain_name_canonical_order() {
        // "b.example." sorts before "a.b.example." which sorts before
        // "z.example." — the TLD-down comparison means names sharing a
        // deep suffix cluster together.
        let mut names = vec![
            domain("z.example."),
            domain("a.b.example."),
            domain("b.example."),
        ];
        names.sort();
        assert_eq!(
            vec![
                domain("b.example."),
                domain("a.b.example."),
                domain("z.example."),
            ],
            names
        );
    }

    #[test]
    fn domain_name_ancestors() {
        let ancestors = domain("www.example.com.").ancestors();
        assert_eq!(
            vec![domain("example.com."), domain("com."), domain(".")],
            ancestors
        );
    }

    #[test]
    fn record_type_insertion_priority_orders_soa_first() {
        assert!(RecordType::SOA.insertion_priority() < RecordType::A.insertion_priority());
        assert!(RecordType::CNAME.insertion_priority() < RecordType::Unknown(999).insertion_priority());
    }
}
