//! Cross-border AS and prefix flows derived from the per-AS records.
//!
//! For every AS that carries traffic of a tracked country, this answers
//! who carries it: a domestic transit AS, or a foreign AS whose region
//! becomes the flow destination.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ipnetwork::IpNetwork;
use serde::Serialize;

use crate::observation::AsHop;
use crate::region_catalog::{RegionBucket, RegionCatalog};
use crate::resource_catalog::ResourceCatalog;
use crate::routing_database::RoutingDatabase;
use crate::shared::{Country, CountryCode, IpVersion, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowRow {
    pub origin: CountryCode,
    pub destination: RegionBucket,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginAsRow {
    pub country: CountryCode,
    pub asn: AsHop,
    pub prefixes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitAsRow {
    pub country: CountryCode,
    pub asn: AsHop,
    pub downstream_ases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamAsRow {
    pub asn: AsHop,
    pub country: CountryCode,
    pub downstream_ases: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AsFlows {
    /// destination region -> source country -> prefixes
    pub pfx_flow: BTreeMap<RegionBucket, BTreeMap<CountryCode, HashSet<IpNetwork>>>,
    /// destination region -> source country -> ASes
    pub as_flow: BTreeMap<RegionBucket, BTreeMap<CountryCode, BTreeSet<AsHop>>>,
    /// country -> origin AS -> originated prefix count
    pub origin_ases: BTreeMap<CountryCode, BTreeMap<AsHop, usize>>,
    /// country -> domestic transit AS -> domestic ASes below it
    pub transit_ases: BTreeMap<CountryCode, BTreeMap<AsHop, BTreeSet<AsHop>>>,
    /// foreign AS -> country -> ASes of that country below it
    pub upstream_ases: BTreeMap<AsHop, BTreeMap<CountryCode, BTreeSet<AsHop>>>,
}

impl AsFlows {
    /// Derives the flows of the countries of `region`.
    pub fn build(
        db: &RoutingDatabase,
        catalog: &ResourceCatalog,
        regions: &RegionCatalog,
        region: Registry,
    ) -> Self {
        let countries = regions.countries(region);
        let tracked = |country: Country| country.code().filter(|cc| countries.contains(cc));

        let mut flows = AsFlows::default();
        for &cc in &countries {
            flows.origin_ases.insert(cc, BTreeMap::new());
            flows.transit_ases.insert(cc, BTreeMap::new());
        }

        for (dst_asn, record) in db.ases() {
            let dst_cc = record.country;
            let dst_rir = regions.region_bucket(dst_cc);

            for src_asn in &record.downstream_ases {
                let Some(src_cc) = tracked(catalog.lookup_hop(src_asn)) else {
                    continue;
                };
                if Country::Known(src_cc) == dst_cc {
                    flows
                        .transit_ases
                        .entry(src_cc)
                        .or_default()
                        .entry(dst_asn.clone())
                        .or_default()
                        .insert(src_asn.clone());
                } else {
                    flows
                        .as_flow
                        .entry(dst_rir)
                        .or_default()
                        .entry(src_cc)
                        .or_default()
                        .insert(src_asn.clone());
                    flows
                        .upstream_ases
                        .entry(dst_asn.clone())
                        .or_default()
                        .entry(src_cc)
                        .or_default()
                        .insert(src_asn.clone());
                }
            }

            for version in IpVersion::ALL {
                for prefix in record.downstream_prefixes(version) {
                    let Some(src_cc) = tracked(catalog.lookup_prefix(prefix)) else {
                        continue;
                    };
                    if Country::Known(src_cc) != dst_cc {
                        flows
                            .pfx_flow
                            .entry(dst_rir)
                            .or_default()
                            .entry(src_cc)
                            .or_default()
                            .insert(*prefix);
                    }
                }
            }

            if let Some(cc) = tracked(dst_cc) {
                let originated = record.ipv4_prefixes.len() + record.ipv6_prefixes.len();
                if originated > 0 {
                    flows
                        .origin_ases
                        .entry(cc)
                        .or_default()
                        .insert(dst_asn.clone(), originated);
                }
            }
        }

        flows
    }

    pub fn as_flow_rows(&self) -> Vec<FlowRow> {
        flow_rows(&self.as_flow, |ases: &BTreeSet<AsHop>| ases.len())
    }

    pub fn prefix_flow_rows(&self) -> Vec<FlowRow> {
        flow_rows(&self.pfx_flow, |prefixes: &HashSet<IpNetwork>| prefixes.len())
    }

    pub fn origin_rows(&self) -> Vec<OriginAsRow> {
        self.origin_ases
            .iter()
            .flat_map(|(&country, ases)| {
                ases.iter().map(move |(asn, &prefixes)| OriginAsRow {
                    country,
                    asn: asn.clone(),
                    prefixes,
                })
            })
            .collect()
    }

    pub fn transit_rows(&self) -> Vec<TransitAsRow> {
        self.transit_ases
            .iter()
            .flat_map(|(&country, ases)| {
                ases.iter().map(move |(asn, downstream)| TransitAsRow {
                    country,
                    asn: asn.clone(),
                    downstream_ases: downstream.len(),
                })
            })
            .collect()
    }

    pub fn upstream_rows(&self) -> Vec<UpstreamAsRow> {
        self.upstream_ases
            .iter()
            .flat_map(|(asn, countries)| {
                countries.iter().map(move |(&country, downstream)| UpstreamAsRow {
                    asn: asn.clone(),
                    country,
                    downstream_ases: downstream.len(),
                })
            })
            .collect()
    }
}

fn flow_rows<S>(
    flows: &BTreeMap<RegionBucket, BTreeMap<CountryCode, S>>,
    len: impl Fn(&S) -> usize,
) -> Vec<FlowRow> {
    flows
        .iter()
        .flat_map(|(&destination, sources)| {
            sources.iter().map(move |(&origin, members)| (origin, destination, members))
        })
        .map(|(origin, destination, members)| FlowRow {
            origin,
            destination,
            count: len(members),
        })
        .collect()
}
