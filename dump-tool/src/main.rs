//! A thin `clap` shell around the answer cache and the ADB, in the
//! same spirit as `dnsq`/`htoz`/`ztoh`: exercise the library from the
//! command line and print its human-readable `dump(writer)` output.
//!
//! This is a manual-inspection tool, not a server: it seeds a cache
//! and/or an ADB name from the given flags, applies the tunables, and
//! dumps the resulting state to stdout.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

use dns_adb::{family, opt, Adb, NullFetchService};
use dns_cache::{AddMode, Cache, NewHeader, Trust, TypePair};
use dns_types::protocol::types::{DomainName, RecordType, RecordTypeWithData};

#[derive(Parser)]
/// Seed the answer cache and/or the ADB with one record and dump the
/// resulting state.
struct Args {
    /// Owner name to seed, e.g. `ns.example.org.`
    #[clap(value_parser)]
    name: String,

    /// IPv4 address to cache an A record for
    #[clap(long, value_parser)]
    address: Option<Ipv4Addr>,

    /// TTL, in seconds, for the seeded record
    #[clap(long, default_value_t = 3600)]
    ttl: u64,

    /// `setservestalettl`: how long an expired record may still serve
    #[clap(long, default_value_t = 0)]
    serve_stale_ttl: u64,

    /// `setservestalerefresh`: the stale-refresh bypass window
    #[clap(long, default_value_t = 30)]
    serve_stale_refresh: u64,

    /// `setquota`: base concurrency quota per ADB entry, 0 disables it
    #[clap(long, default_value_t = 0)]
    quota: u32,

    /// Also create an ADB find for `name` and dump the ADB's state
    #[clap(long, action(clap::ArgAction::SetTrue))]
    adb: bool,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs()
}

fn main() {
    begin_logging();

    let args = Args::parse();
    let Some(owner) = DomainName::from_dotted_string(&args.name) else {
        eprintln!("invalid domain name: {}", args.name);
        std::process::exit(1);
    };

    let cache = Cache::new(DomainName::root_domain());
    cache.set_servestalettl(args.serve_stale_ttl);
    cache.set_servestalerefresh(args.serve_stale_refresh);

    let now = now();

    if let Some(address) = args.address {
        let header = NewHeader::new(
            TypePair::Ordinary(RecordType::A),
            vec![RecordTypeWithData::A { address }],
            args.ttl,
            Trust::Answer,
        );
        let (outcome, _) = cache.add(&owner, header, now, AddMode::Normal);
        tracing::info!(name = %owner, %address, ?outcome, "seeded cache");
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    cache.dump(&mut handle).expect("writing to stdout");

    if args.adb {
        let adb = Adb::new(Arc::new(NullFetchService));
        adb.set_quota(args.quota, 20, 0.3, 0.5, 0.7);
        let (_find, status) = adb.createfind(
            &owner,
            family::INET,
            opt::WANTEVENT | opt::NOFETCH,
            now,
            Box::new(|_f| {}),
        );
        tracing::info!(name = %owner, ?status, "createfind (dump-tool, no-fetch)");
        adb.dump(&mut handle).expect("writing to stdout");
    }
}

fn begin_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
