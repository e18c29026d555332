//! Peer to origin tree of the routes visible at one exchange point.
//!
//! Each route adds its prefix under `peer -> origin`, where the origin is
//! labelled with its country if it belongs to the exchange's home region,
//! with its region otherwise, or `other` when it is not in the region
//! table. Hop count and prepend histograms are kept on the side.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ipnetwork::IpNetwork;
use serde::Serialize;

use crate::error::ObservationError;
use crate::observation::{country_path, AsHop, Observation};
use crate::region_catalog::{RegionBucket, RegionCatalog};
use crate::resource_catalog::ResourceCatalog;
use crate::shared::{Country, Registry};

/// A node of the tree: its label, the nodes below it and the prefixes
/// announced through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingCountry<C> {
    pub country: C,
    pub branches: BTreeMap<AsHop, RoutingCountry<RegionBucket>>,
    pub prefixes4: HashSet<IpNetwork>,
    pub prefixes6: HashSet<IpNetwork>,
}

impl<C> RoutingCountry<C> {
    pub fn new(country: C) -> Self {
        RoutingCountry {
            country,
            branches: BTreeMap::new(),
            prefixes4: HashSet::new(),
            prefixes6: HashSet::new(),
        }
    }

    pub fn add_prefix(&mut self, prefix: IpNetwork) {
        match prefix {
            IpNetwork::V4(_) => self.prefixes4.insert(prefix),
            IpNetwork::V6(_) => self.prefixes6.insert(prefix),
        };
    }
}

/// Flattened `peer -> origin` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingRow {
    pub peer_cc: Country,
    pub peer_asn: AsHop,
    pub origin_cc: RegionBucket,
    pub origin_asn: AsHop,
    pub prefixes_ipv4: Vec<IpNetwork>,
    pub prefixes_ipv6: Vec<IpNetwork>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HopsRow {
    pub country: RegionBucket,
    pub hops: usize,
    pub frequency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrependRow {
    pub prepend: usize,
    pub frequency: u64,
}

/// Per bucket totals of the tree. Peers are folded into buckets the same
/// way as origins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IxpSummaryRow {
    pub country: RegionBucket,
    pub peer_ases: usize,
    pub origin_ases: usize,
    pub prefixes_ipv4: usize,
    pub prefixes_ipv6: usize,
    pub prefixes: usize,
    /// Addresses covered once nested prefixes are collapsed.
    pub addresses_ipv4: u128,
    pub addresses_ipv6: u128,
    pub prefix_length_ipv4_mean: Option<f64>,
    pub prefix_length_ipv6_mean: Option<f64>,
    /// Frequency weighted over the hop histogram.
    pub path_length_mean: Option<f64>,
    pub path_length_min: Option<usize>,
    pub path_length_max: Option<usize>,
    pub total_paths: u64,
}

#[derive(Default)]
struct BucketTotals<'a> {
    peers: BTreeSet<&'a AsHop>,
    origins: BTreeSet<&'a AsHop>,
    prefixes4: HashSet<IpNetwork>,
    prefixes6: HashSet<IpNetwork>,
}

pub struct RoutingTable {
    pub table: BTreeMap<AsHop, RoutingCountry<Country>>,
    pub hopstable: BTreeMap<RegionBucket, BTreeMap<usize, u64>>,
    pub prependstable: BTreeMap<usize, u64>,
    region: Registry,
    regions: RegionCatalog,
}

impl RoutingTable {
    pub fn new(region: Registry, regions: RegionCatalog) -> Self {
        RoutingTable {
            table: BTreeMap::new(),
            hopstable: BTreeMap::new(),
            prependstable: BTreeMap::new(),
            region,
            regions,
        }
    }

    pub fn region(&self) -> Registry {
        self.region
    }

    /// Adds one route. `cc_path` carries the registered country of every
    /// hop of `as_path`, peer first.
    pub fn add_path(
        &mut self,
        prefix: IpNetwork,
        as_path: &[AsHop],
        cc_path: &[Country],
    ) -> Result<(), ObservationError> {
        if as_path.len() != cc_path.len() {
            return Err(ObservationError::CountryPathMismatch {
                hops: as_path.len(),
                countries: cc_path.len(),
            });
        }
        let (Some(peer), Some(origin)) = (as_path.first(), as_path.last()) else {
            return Err(ObservationError::EmptyPath(prefix.to_string()));
        };
        let peer_cc = cc_path[0];
        let origin_cc = self.regions.bucket(cc_path[cc_path.len() - 1], self.region);

        self.table
            .entry(peer.clone())
            .or_insert_with(|| RoutingCountry::new(peer_cc))
            .branches
            .entry(origin.clone())
            .or_insert_with(|| RoutingCountry::new(origin_cc))
            .add_prefix(prefix);

        let hops = as_path.len();
        *self
            .hopstable
            .entry(origin_cc)
            .or_default()
            .entry(hops)
            .or_insert(0) += 1;

        // every occurrence of the origin counts, not only the trailing run
        if hops > 1 {
            let prepend_length = as_path.iter().filter(|hop| *hop == origin).count();
            if prepend_length > 1 {
                *self.prependstable.entry(prepend_length).or_insert(0) += 1;
            }
        }

        Ok(())
    }

    /// Resolves the hop countries of `observation` and adds it. Routes
    /// whose origin cannot be resolved are skipped and `false` returned.
    pub fn add_observation(
        &mut self,
        catalog: &ResourceCatalog,
        observation: &Observation,
    ) -> Result<bool, ObservationError> {
        let Some(hops) = observation.resolved_hops() else {
            return Ok(false);
        };
        let countries = country_path(catalog, &hops);
        self.add_path(observation.prefix, &hops, &countries)?;
        Ok(true)
    }

    pub fn rows(&self) -> Vec<RoutingRow> {
        let mut rows = Vec::new();
        for (peer_asn, peer) in &self.table {
            for (origin_asn, origin) in &peer.branches {
                rows.push(RoutingRow {
                    peer_cc: peer.country,
                    peer_asn: peer_asn.clone(),
                    origin_cc: origin.country,
                    origin_asn: origin_asn.clone(),
                    prefixes_ipv4: sorted(&origin.prefixes4),
                    prefixes_ipv6: sorted(&origin.prefixes6),
                });
            }
        }
        rows
    }

    pub fn hops_rows(&self) -> Vec<HopsRow> {
        self.hopstable
            .iter()
            .flat_map(|(&country, freq)| {
                freq.iter().map(move |(&hops, &frequency)| HopsRow {
                    country,
                    hops,
                    frequency,
                })
            })
            .collect()
    }

    pub fn prepend_rows(&self) -> Vec<PrependRow> {
        self.prependstable
            .iter()
            .map(|(&prepend, &frequency)| PrependRow { prepend, frequency })
            .collect()
    }

    /// One row per bucket seen as a peer, an origin or in the hop
    /// histogram, in bucket order.
    pub fn summary_rows(&self) -> Vec<IxpSummaryRow> {
        let mut totals: BTreeMap<RegionBucket, BucketTotals> = BTreeMap::new();
        for (peer_asn, peer) in &self.table {
            let peer_bucket = self.regions.bucket(peer.country, self.region());
            totals.entry(peer_bucket).or_default().peers.insert(peer_asn);
            for (origin_asn, origin) in &peer.branches {
                let entry = totals.entry(origin.country).or_default();
                entry.origins.insert(origin_asn);
                entry.prefixes4.extend(origin.prefixes4.iter().copied());
                entry.prefixes6.extend(origin.prefixes6.iter().copied());
            }
        }
        for &bucket in self.hopstable.keys() {
            totals.entry(bucket).or_default();
        }

        totals
            .into_iter()
            .map(|(country, bucket)| {
                let hops = self.hopstable.get(&country);
                let total_paths: u64 = hops.map(|freq| freq.values().sum()).unwrap_or(0);
                let path_length_mean = hops.filter(|_| total_paths > 0).map(|freq| {
                    let weighted: f64 = freq
                        .iter()
                        .map(|(&length, &frequency)| length as f64 * frequency as f64)
                        .sum();
                    weighted / total_paths as f64
                });
                IxpSummaryRow {
                    country,
                    peer_ases: bucket.peers.len(),
                    origin_ases: bucket.origins.len(),
                    prefixes_ipv4: bucket.prefixes4.len(),
                    prefixes_ipv6: bucket.prefixes6.len(),
                    prefixes: bucket.prefixes4.len() + bucket.prefixes6.len(),
                    addresses_ipv4: covered_addresses(&bucket.prefixes4),
                    addresses_ipv6: covered_addresses(&bucket.prefixes6),
                    prefix_length_ipv4_mean: mean_prefix_length(&bucket.prefixes4),
                    prefix_length_ipv6_mean: mean_prefix_length(&bucket.prefixes6),
                    path_length_mean,
                    path_length_min: hops.and_then(|freq| freq.keys().next().copied()),
                    path_length_max: hops.and_then(|freq| freq.keys().next_back().copied()),
                    total_paths,
                }
            })
            .collect()
    }
}

fn mean_prefix_length(prefixes: &HashSet<IpNetwork>) -> Option<f64> {
    if prefixes.is_empty() {
        return None;
    }
    let sum: u64 = prefixes.iter().map(|net| u64::from(net.prefix())).sum();
    Some(sum as f64 / prefixes.len() as f64)
}

/// Size of the union of `prefixes`. Prefixes are either nested or
/// disjoint, so dropping the nested ones leaves disjoint blocks.
fn covered_addresses(prefixes: &HashSet<IpNetwork>) -> u128 {
    let mut outer: Option<IpNetwork> = None;
    let mut total: u128 = 0;
    for net in sorted(prefixes) {
        if let Some(kept) = outer {
            if kept.prefix() <= net.prefix() && kept.contains(net.network()) {
                continue;
            }
        }
        total = total.saturating_add(block_size(net));
        outer = Some(net);
    }
    total
}

fn block_size(net: IpNetwork) -> u128 {
    let bits: u32 = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    1u128
        .checked_shl(bits - u32::from(net.prefix()))
        .unwrap_or(u128::MAX)
}

fn sorted(prefixes: &HashSet<IpNetwork>) -> Vec<IpNetwork> {
    let mut prefixes: Vec<IpNetwork> = prefixes.iter().copied().collect();
    prefixes.sort_by_key(|net| (net.network(), net.prefix()));
    prefixes
}
