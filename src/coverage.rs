//! How much of a country's routing an exchange point sees.

use std::collections::HashSet;
use std::hash::Hash;

use ipnetwork::IpNetwork;
use serde::Serialize;

use crate::observation::AsHop;
use crate::region_catalog::RegionBucket;
use crate::routing_database::RoutingDatabase;
use crate::routing_table::RoutingTable;
use crate::shared::{Country, CountryCode};

/// One resource kind split between both views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Split<T> {
    pub shared: Vec<T>,
    pub ixp_only: Vec<T>,
    pub country_only: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitCounts {
    pub total: usize,
    pub shared: usize,
    pub ixp_only: usize,
    pub country_only: usize,
}

impl<T: Clone + Eq + Hash> Split<T> {
    fn new<K: Ord>(ixp: &HashSet<T>, country: &HashSet<T>, key: impl Fn(&T) -> K) -> Self {
        let collect = |items: Vec<&T>| {
            let mut items: Vec<T> = items.into_iter().cloned().collect();
            items.sort_by_key(|item| key(item));
            items
        };
        Split {
            shared: collect(ixp.intersection(country).collect()),
            ixp_only: collect(ixp.difference(country).collect()),
            country_only: collect(country.difference(ixp).collect()),
        }
    }

    pub fn counts(&self) -> SplitCounts {
        SplitCounts {
            total: self.shared.len() + self.ixp_only.len() + self.country_only.len(),
            shared: self.shared.len(),
            ixp_only: self.ixp_only.len(),
            country_only: self.country_only.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub country: CountryCode,
    pub asn: Split<AsHop>,
    pub ipv4: Split<IpNetwork>,
    pub ipv6: Split<IpNetwork>,
}

impl Coverage {
    /// Compares the origins and prefixes the exchange sees for `country`
    /// with those attributed to it across the whole routing database.
    pub fn build(table: &RoutingTable, db: &RoutingDatabase, country: CountryCode) -> Self {
        let mut ix_asns = HashSet::new();
        let mut ix_pf4s = HashSet::new();
        let mut ix_pf6s = HashSet::new();
        for peer in table.table.values() {
            for (origin_asn, origin) in &peer.branches {
                if origin.country == RegionBucket::Country(country) {
                    ix_asns.insert(origin_asn.clone());
                    ix_pf4s.extend(origin.prefixes4.iter().copied());
                    ix_pf6s.extend(origin.prefixes6.iter().copied());
                }
            }
        }

        let mut cc_asns = HashSet::new();
        let mut cc_pf4s = HashSet::new();
        let mut cc_pf6s = HashSet::new();
        for (prefix, record) in db.prefixes() {
            if record.country != Country::Known(country) {
                continue;
            }
            cc_asns.insert(AsHop::Asn(record.origin_asn));
            match prefix {
                IpNetwork::V4(_) => cc_pf4s.insert(*prefix),
                IpNetwork::V6(_) => cc_pf6s.insert(*prefix),
            };
        }

        let net_key = |net: &IpNetwork| (net.network(), net.prefix());
        Coverage {
            country,
            asn: Split::new(&ix_asns, &cc_asns, AsHop::clone),
            ipv4: Split::new(&ix_pf4s, &cc_pf4s, net_key),
            ipv6: Split::new(&ix_pf6s, &cc_pf6s, net_key),
        }
    }
}
