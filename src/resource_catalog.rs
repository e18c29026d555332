use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use ipnetwork::IpNetwork;
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::delegation::{DelegationReader, DelegationRecord, Resource};
use crate::error::Error;
use crate::observation::AsHop;
use crate::shared::{Country, ASN};

const LOOKUP_CACHE_SIZE: usize = 10_000;

#[derive(Debug, Default)]
struct PrefixNode {
    country: Option<Country>,
    left: Option<Box<PrefixNode>>,
    right: Option<Box<PrefixNode>>,
}

/// Binary trie keyed on the leading bits of a network address.
///
/// Keys are left-aligned in a `u128` so the same structure serves both
/// address families; `max_len` is 32 for IPv4 and 128 for IPv6.
#[derive(Debug)]
pub struct PrefixTrie {
    root: PrefixNode,
    max_len: u8,
    len: usize,
}

impl PrefixTrie {
    pub fn new(max_len: u8) -> Self {
        PrefixTrie {
            root: PrefixNode::default(),
            max_len,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `country` for the block `bits/length`. An existing entry for
    /// the exact same block is overwritten.
    pub fn insert(&mut self, bits: u128, length: u8, country: Country) {
        let length = length.min(self.max_len);
        if Self::insert_at_node(&mut self.root, bits, length, 0, country) {
            self.len += 1;
        }
    }

    fn insert_at_node(
        node: &mut PrefixNode,
        bits: u128,
        length: u8,
        index: u8,
        country: Country,
    ) -> bool {
        if index == length {
            return node.country.replace(country).is_none();
        }

        let child = if bit_at(bits, index) == 0 {
            &mut node.left
        } else {
            &mut node.right
        };

        Self::insert_at_node(
            child.get_or_insert_with(Box::default),
            bits,
            length,
            index + 1,
            country,
        )
    }

    /// Country of the longest stored block covering `bits/length`.
    pub fn longest_match(&self, bits: u128, length: u8) -> Option<Country> {
        let length = length.min(self.max_len);
        let mut node = &self.root;
        let mut best = node.country;

        for index in 0..length {
            let child = if bit_at(bits, index) == 0 {
                &node.left
            } else {
                &node.right
            };
            match child {
                Some(child_node) => {
                    node = child_node;
                    if node.country.is_some() {
                        best = node.country;
                    }
                }
                None => break,
            }
        }

        best
    }
}

fn bit_at(bits: u128, index: u8) -> u8 {
    ((bits >> (127 - u32::from(index))) & 1) as u8
}

fn network_bits(network: &IpNetwork) -> (u128, u8) {
    match network {
        IpNetwork::V4(net) => (u128::from(u32::from(net.ip())) << 96, net.prefix()),
        IpNetwork::V6(net) => (u128::from(net.ip()), net.prefix()),
    }
}

/// Summary of a catalog load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub records: usize,
    pub asns: usize,
    pub ipv4_blocks: usize,
    pub ipv6_blocks: usize,
    pub inexact_ipv4_blocks: usize,
}

/// Prefix and AS number registry built from delegation records.
///
/// Every lookup answers with a [`Country`]; a miss is `Country::Unknown`,
/// never an error. The catalog is meant to be filled once and then shared
/// read-only between workers.
pub struct ResourceCatalog {
    ipv4: PrefixTrie,
    ipv6: PrefixTrie,
    ases: HashMap<ASN, Country>,
    cache: Mutex<LruCache<IpNetwork, Country>>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        ResourceCatalog {
            ipv4: PrefixTrie::new(32),
            ipv6: PrefixTrie::new(128),
            ases: HashMap::new(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(LOOKUP_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Builds a catalog from a delegation feed on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        info!("Loading delegated resources from {:?}", path);
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut catalog = ResourceCatalog::new();
        let mut reader = DelegationReader::new(reader);
        let stats = catalog.load(reader.by_ref())?;
        info!(
            records = stats.records,
            skipped = reader.skipped(),
            asns = stats.asns,
            ipv4 = stats.ipv4_blocks,
            ipv6 = stats.ipv6_blocks,
            "Delegated resources loaded"
        );
        Ok(catalog)
    }

    /// Inserts every record of `records`, stopping at the first error.
    ///
    /// A failed load leaves a partially filled catalog behind; callers are
    /// expected to abort the run rather than classify against it.
    pub fn load<I>(&mut self, records: I) -> Result<LoadStats, Error>
    where
        I: IntoIterator<Item = Result<DelegationRecord, Error>>,
    {
        let mut stats = LoadStats::default();
        for record in records {
            let record = record?;
            stats.records += 1;
            match record.resource {
                Resource::Asn { .. } => stats.asns += self.insert_record(&record),
                Resource::Ipv4 { .. } => {
                    if !record.resource.is_exact() {
                        stats.inexact_ipv4_blocks += 1;
                    }
                    stats.ipv4_blocks += self.insert_record(&record);
                }
                Resource::Ipv6 { .. } => stats.ipv6_blocks += self.insert_record(&record),
            }
        }
        if stats.inexact_ipv4_blocks > 0 {
            warn!(
                count = stats.inexact_ipv4_blocks,
                "IPv4 blocks with non power-of-two sizes were truncated to a single prefix"
            );
        }
        Ok(stats)
    }

    /// Inserts one record and returns how many catalog entries it produced.
    /// AS ranges without a country are not registered.
    pub fn insert_record(&mut self, record: &DelegationRecord) -> usize {
        if let Some(asns) = record.resource.asns() {
            if record.country.is_unknown() {
                return 0;
            }
            let mut inserted = 0;
            for asn in asns {
                self.add_asn(asn, record.country);
                inserted += 1;
            }
            return inserted;
        }

        match record.resource.network() {
            Some(network) => {
                if !record.resource.is_exact() {
                    debug!(%network, resource = ?record.resource, "inexact IPv4 block size");
                }
                self.add_prefix(network, record.country);
                1
            }
            None => 0,
        }
    }

    pub fn add_prefix(&mut self, network: IpNetwork, country: Country) {
        let (bits, length) = network_bits(&network);
        match network {
            IpNetwork::V4(_) => self.ipv4.insert(bits, length, country),
            IpNetwork::V6(_) => self.ipv6.insert(bits, length, country),
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn add_asn(&mut self, asn: ASN, country: Country) {
        self.ases.insert(asn, country);
    }

    /// Longest-prefix match for a whole network.
    pub fn lookup_prefix(&self, network: &IpNetwork) -> Country {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(country) = cache.get(network) {
                return *country;
            }
        }

        let (bits, length) = network_bits(network);
        let found = match network {
            IpNetwork::V4(_) => self.ipv4.longest_match(bits, length),
            IpNetwork::V6(_) => self.ipv6.longest_match(bits, length),
        };
        let country = found.unwrap_or_else(|| {
            debug!(%network, "no delegated block covers prefix");
            Country::Unknown
        });

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(*network, country);
        }
        country
    }

    /// Longest-prefix match for a single address.
    pub fn lookup_address(&self, address: IpAddr) -> Country {
        self.lookup_prefix(&IpNetwork::from(address))
    }

    pub fn lookup_as(&self, asn: ASN) -> Country {
        self.ases.get(&asn).copied().unwrap_or(Country::Unknown)
    }

    /// Tokens that never parsed as an AS number resolve to `Unknown`.
    pub fn lookup_hop(&self, hop: &AsHop) -> Country {
        match hop {
            AsHop::Asn(asn) => self.lookup_as(*asn),
            AsHop::Unresolved(_) => Country::Unknown,
        }
    }

    pub fn asn_count(&self) -> usize {
        self.ases.len()
    }

    pub fn prefix_count(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}
