//! Per-country AS role classification over announced AS paths.
//!
//! Every observation is a prefix, the country owning it and the AS path it
//! was seen with. The origin AS is compared against the prefix country:
//!
//! * same country: the origin is an `origin` AS, and the path is walked
//!   from the hop next to the origin toward the peer. Same-country hops are
//!   `transit`; the first foreign hop is `upstream` and ends the walk. The
//!   peer itself (first hop) is never classified.
//! * origin not registered: the origin is `unregistered`.
//! * origin registered elsewhere: the origin is `offshore`.
//!
//! Alongside the role sets, every touched AS gets a record of the prefixes
//! it originates or carries and of the ASes seen below it, and every prefix
//! accumulates its path count and total path length.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use ipnetwork::IpNetwork;
use serde::Serialize;
use tracing::{debug, trace};

use crate::observation::{resolve_origin, AsHop};
use crate::resource_catalog::ResourceCatalog;
use crate::shared::{Country, CountryCode, IpVersion, Role, ASN};

/// The five role sets of one (country, version) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleSets {
    pub origin: BTreeSet<AsHop>,
    pub transit: BTreeSet<AsHop>,
    pub upstream: BTreeSet<AsHop>,
    pub unregistered: BTreeSet<AsHop>,
    pub offshore: BTreeSet<AsHop>,
}

impl RoleSets {
    pub fn get(&self, role: Role) -> &BTreeSet<AsHop> {
        match role {
            Role::Origin => &self.origin,
            Role::Transit => &self.transit,
            Role::Upstream => &self.upstream,
            Role::Unregistered => &self.unregistered,
            Role::Offshore => &self.offshore,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut BTreeSet<AsHop> {
        match role {
            Role::Origin => &mut self.origin,
            Role::Transit => &mut self.transit,
            Role::Upstream => &mut self.upstream,
            Role::Unregistered => &mut self.unregistered,
            Role::Offshore => &mut self.offshore,
        }
    }

    pub fn counts(&self) -> RoleCounts {
        RoleCounts::from_fn(|role| self.get(role).len())
    }

    fn merge(&mut self, other: RoleSets) {
        self.origin.extend(other.origin);
        self.transit.extend(other.transit);
        self.upstream.extend(other.upstream);
        self.unregistered.extend(other.unregistered);
        self.offshore.extend(other.offshore);
    }
}

/// Role sets of one country, split by address family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountryRoles {
    pub ipv4: RoleSets,
    pub ipv6: RoleSets,
}

impl CountryRoles {
    pub fn version(&self, version: IpVersion) -> &RoleSets {
        match version {
            IpVersion::Ipv4 => &self.ipv4,
            IpVersion::Ipv6 => &self.ipv6,
        }
    }

    pub fn version_mut(&mut self, version: IpVersion) -> &mut RoleSets {
        match version {
            IpVersion::Ipv4 => &mut self.ipv4,
            IpVersion::Ipv6 => &mut self.ipv6,
        }
    }

    /// Members of `role` in either address family.
    pub fn union(&self, role: Role) -> BTreeSet<&AsHop> {
        self.ipv4.get(role).iter().chain(self.ipv6.get(role)).collect()
    }
}

/// What one AS was seen doing across all observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsRecord {
    /// Registered country at first sight.
    pub country: Country,
    pub ipv4_prefixes: HashSet<IpNetwork>,
    pub ipv6_prefixes: HashSet<IpNetwork>,
    pub ipv4_downstream_prefixes: HashSet<IpNetwork>,
    pub ipv6_downstream_prefixes: HashSet<IpNetwork>,
    /// ASes seen between this AS and the origin, origin included.
    pub downstream_ases: BTreeSet<AsHop>,
}

impl AsRecord {
    pub fn new(country: Country) -> Self {
        AsRecord {
            country,
            ipv4_prefixes: HashSet::new(),
            ipv6_prefixes: HashSet::new(),
            ipv4_downstream_prefixes: HashSet::new(),
            ipv6_downstream_prefixes: HashSet::new(),
            downstream_ases: BTreeSet::new(),
        }
    }

    /// Prefixes originated by this AS.
    pub fn prefixes(&self, version: IpVersion) -> &HashSet<IpNetwork> {
        match version {
            IpVersion::Ipv4 => &self.ipv4_prefixes,
            IpVersion::Ipv6 => &self.ipv6_prefixes,
        }
    }

    /// Prefixes carried by this AS on behalf of someone else.
    pub fn downstream_prefixes(&self, version: IpVersion) -> &HashSet<IpNetwork> {
        match version {
            IpVersion::Ipv4 => &self.ipv4_downstream_prefixes,
            IpVersion::Ipv6 => &self.ipv6_downstream_prefixes,
        }
    }

    fn add_prefix(&mut self, prefix: IpNetwork, originated: bool) {
        let set = match (IpVersion::of(&prefix), originated) {
            (IpVersion::Ipv4, true) => &mut self.ipv4_prefixes,
            (IpVersion::Ipv6, true) => &mut self.ipv6_prefixes,
            (IpVersion::Ipv4, false) => &mut self.ipv4_downstream_prefixes,
            (IpVersion::Ipv6, false) => &mut self.ipv6_downstream_prefixes,
        };
        set.insert(prefix);
    }

    fn merge(&mut self, other: AsRecord) {
        self.ipv4_prefixes.extend(other.ipv4_prefixes);
        self.ipv6_prefixes.extend(other.ipv6_prefixes);
        self.ipv4_downstream_prefixes.extend(other.ipv4_downstream_prefixes);
        self.ipv6_downstream_prefixes.extend(other.ipv6_downstream_prefixes);
        self.downstream_ases.extend(other.downstream_ases);
    }
}

/// Path statistics of one prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrefixRecord {
    pub version: IpVersion,
    pub country: Country,
    /// Origin of the latest observation.
    pub origin_asn: ASN,
    /// Sum of the AS-path lengths of every observation.
    pub jumps: u64,
    pub paths: u64,
}

impl PrefixRecord {
    pub fn mean_path_length(&self) -> f64 {
        if self.paths == 0 {
            return 0.0;
        }
        self.jumps as f64 / self.paths as f64
    }
}

/// An observation whose AS path could not be used as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub prefix: IpNetwork,
    pub path: Vec<String>,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.prefix, self.path.join(" "))
    }
}

impl Serialize for Anomaly {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a single observation was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutcome {
    /// Origin registered to the prefix country; the path was walked.
    Consistent,
    /// Origin AS has no registered country.
    Unregistered,
    /// Origin AS registered to another country.
    Offshore,
    /// Origin could not be resolved; nothing but the anomaly log changed.
    Anomaly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub origin: usize,
    pub transit: usize,
    pub upstream: usize,
    pub unregistered: usize,
    pub offshore: usize,
}

impl RoleCounts {
    fn from_fn(mut f: impl FnMut(Role) -> usize) -> Self {
        RoleCounts {
            origin: f(Role::Origin),
            transit: f(Role::Transit),
            upstream: f(Role::Upstream),
            unregistered: f(Role::Unregistered),
            offshore: f(Role::Offshore),
        }
    }
}

/// Role counts of one country per family and across both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountrySummary {
    pub country: Country,
    pub total: RoleCounts,
    pub ipv4: RoleCounts,
    pub ipv6: RoleCounts,
    /// Distinct origin or transit ASes over both families.
    pub total_local_asns: usize,
}

/// Prefix and path length figures of one (country, version) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrefixSummary {
    pub country: Country,
    pub version: IpVersion,
    pub prefix_count: usize,
    pub prefix_length_mean: f64,
    /// Sample standard deviation, absent for a single prefix.
    pub prefix_length_std: Option<f64>,
    pub path_length_mean: f64,
    pub path_count: u64,
}

/// Aggregated classification state of a processing run.
#[derive(Debug, Clone, Default)]
pub struct RoutingDatabase {
    countries: BTreeMap<Country, CountryRoles>,
    ases: BTreeMap<AsHop, AsRecord>,
    prefixes: HashMap<IpNetwork, PrefixRecord>,
    anomalies: Vec<Anomaly>,
}

impl RoutingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an empty role table for each of `countries`, so they are
    /// reported even when no path is seen for them.
    pub fn with_countries(countries: impl IntoIterator<Item = CountryCode>) -> Self {
        let mut db = Self::new();
        for cc in countries {
            db.countries.entry(Country::Known(cc)).or_default();
        }
        db
    }

    /// Classifies one observed path of `prefix`, owned by `prefix_country`.
    ///
    /// `as_path` holds the raw tokens, peer first and origin last.
    pub fn add_path<S: AsRef<str>>(
        &mut self,
        catalog: &ResourceCatalog,
        prefix: IpNetwork,
        prefix_country: Country,
        as_path: &[S],
    ) -> PathOutcome {
        let version = IpVersion::of(&prefix);

        let Some(origin) = resolve_origin(as_path) else {
            self.add_anomaly(prefix, as_path);
            return PathOutcome::Anomaly;
        };
        let origin_hop = AsHop::Asn(origin);
        let origin_country = catalog.lookup_as(origin);
        self.add_prefix_to_as(&origin_hop, origin_country, prefix, true, &BTreeSet::new());

        let outcome = if origin_country == prefix_country {
            self.role_set(prefix_country, version, Role::Origin)
                .insert(origin_hop.clone());
            self.walk_path(catalog, prefix, prefix_country, as_path, origin_hop);
            PathOutcome::Consistent
        } else if origin_country.is_unknown() {
            self.role_set(prefix_country, version, Role::Unregistered)
                .insert(origin_hop);
            PathOutcome::Unregistered
        } else {
            self.role_set(prefix_country, version, Role::Offshore)
                .insert(origin_hop);
            PathOutcome::Offshore
        };

        let hops = as_path.len() as u64;
        let record = self.prefixes.entry(prefix).or_insert(PrefixRecord {
            version,
            country: prefix_country,
            origin_asn: origin,
            jumps: 0,
            paths: 0,
        });
        record.version = version;
        record.country = prefix_country;
        record.origin_asn = origin;
        record.jumps += hops;
        record.paths += 1;

        outcome
    }

    /// Walks the hops between the origin and the peer, origin side first.
    ///
    /// Hops already seen on this path (prepends, loops) are skipped.
    /// Unparsable tokens are logged as anomalies but still classified, and
    /// since they never resolve to a country they end up as `upstream`.
    fn walk_path<S: AsRef<str>>(
        &mut self,
        catalog: &ResourceCatalog,
        prefix: IpNetwork,
        prefix_country: Country,
        as_path: &[S],
        origin: AsHop,
    ) {
        let version = IpVersion::of(&prefix);
        let inner = as_path
            .get(1..as_path.len().saturating_sub(1))
            .unwrap_or(&[]);

        let mut seen = BTreeSet::from([origin]);
        for token in inner.iter().rev() {
            let hop = AsHop::parse(token.as_ref());
            if !hop.is_resolved() {
                self.add_anomaly(prefix, as_path);
            }
            if seen.contains(&hop) {
                continue;
            }

            let country = catalog.lookup_hop(&hop);
            self.add_prefix_to_as(&hop, country, prefix, false, &seen);
            if country == prefix_country {
                self.role_set(prefix_country, version, Role::Transit)
                    .insert(hop.clone());
                seen.insert(hop);
            } else {
                trace!(%prefix, %hop, "upstream reached");
                self.role_set(prefix_country, version, Role::Upstream)
                    .insert(hop);
                break;
            }
        }
    }

    fn role_set(&mut self, country: Country, version: IpVersion, role: Role) -> &mut BTreeSet<AsHop> {
        self.countries
            .entry(country)
            .or_default()
            .version_mut(version)
            .get_mut(role)
    }

    fn add_prefix_to_as(
        &mut self,
        hop: &AsHop,
        country: Country,
        prefix: IpNetwork,
        originated: bool,
        downstream: &BTreeSet<AsHop>,
    ) {
        let record = match self.ases.entry(hop.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(asn = %hop, %country, "new AS record");
                entry.insert(AsRecord::new(country))
            }
        };
        record.downstream_ases.extend(downstream.iter().cloned());
        record.add_prefix(prefix, originated);
    }

    fn add_anomaly<S: AsRef<str>>(&mut self, prefix: IpNetwork, as_path: &[S]) {
        let anomaly = Anomaly {
            prefix,
            path: as_path.iter().map(|t| t.as_ref().to_string()).collect(),
        };
        debug!(%anomaly, "path anomaly");
        self.anomalies.push(anomaly);
    }

    /// Folds a database built from a later part of the same observation
    /// stream into this one.
    ///
    /// Sets are unioned and counters summed. Prefix fields written last
    /// come from `other`; AS countries keep the value seen first here.
    pub fn merge(&mut self, other: RoutingDatabase) {
        for (country, roles) in other.countries {
            let entry = self.countries.entry(country).or_default();
            entry.ipv4.merge(roles.ipv4);
            entry.ipv6.merge(roles.ipv6);
        }

        for (hop, record) in other.ases {
            match self.ases.entry(hop) {
                Entry::Occupied(mut entry) => entry.get_mut().merge(record),
                Entry::Vacant(entry) => {
                    entry.insert(record);
                }
            }
        }

        for (prefix, record) in other.prefixes {
            self.prefixes
                .entry(prefix)
                .and_modify(|existing| {
                    existing.version = record.version;
                    existing.country = record.country;
                    existing.origin_asn = record.origin_asn;
                    existing.jumps += record.jumps;
                    existing.paths += record.paths;
                })
                .or_insert(record);
        }

        self.anomalies.extend(other.anomalies);
    }

    pub fn country_roles(&self, country: Country) -> Option<&CountryRoles> {
        self.countries.get(&country)
    }

    pub fn countries(&self) -> impl Iterator<Item = (&Country, &CountryRoles)> {
        self.countries.iter()
    }

    /// Members of `role` for `country` and `version`; empty when the
    /// country was never seen.
    pub fn members(&self, country: Country, version: IpVersion, role: Role) -> Vec<&AsHop> {
        self.countries
            .get(&country)
            .map(|roles| roles.version(version).get(role).iter().collect())
            .unwrap_or_default()
    }

    pub fn as_record(&self, hop: &AsHop) -> Option<&AsRecord> {
        self.ases.get(hop)
    }

    pub fn ases(&self) -> impl Iterator<Item = (&AsHop, &AsRecord)> {
        self.ases.iter()
    }

    pub fn prefix(&self, prefix: &IpNetwork) -> Option<&PrefixRecord> {
        self.prefixes.get(prefix)
    }

    /// Prefix records ordered by family, address and length.
    pub fn prefixes(&self) -> Vec<(&IpNetwork, &PrefixRecord)> {
        let mut prefixes: Vec<_> = self.prefixes.iter().collect();
        prefixes.sort_by_key(|(net, _)| (net.is_ipv6(), net.network(), net.prefix()));
        prefixes
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn country_summary(&self) -> Vec<CountrySummary> {
        self.countries
            .iter()
            .map(|(&country, roles)| {
                let origin = roles.union(Role::Origin);
                let transit = roles.union(Role::Transit);
                CountrySummary {
                    country,
                    total: RoleCounts::from_fn(|role| roles.union(role).len()),
                    ipv4: roles.ipv4.counts(),
                    ipv6: roles.ipv6.counts(),
                    total_local_asns: origin.union(&transit).count(),
                }
            })
            .collect()
    }

    pub fn prefix_summary(&self) -> Vec<PrefixSummary> {
        let mut groups: BTreeMap<(Country, IpVersion), Vec<(&IpNetwork, &PrefixRecord)>> =
            BTreeMap::new();
        for (net, record) in &self.prefixes {
            groups
                .entry((record.country, record.version))
                .or_default()
                .push((net, record));
        }

        groups
            .into_iter()
            .map(|((country, version), records)| {
                let n = records.len();
                let lengths: Vec<f64> = records.iter().map(|(net, _)| f64::from(net.prefix())).collect();
                let mean = lengths.iter().sum::<f64>() / n as f64;
                let std = (n > 1).then(|| {
                    let var = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                    var.sqrt()
                });
                let jumps: u64 = records.iter().map(|(_, r)| r.jumps).sum();
                let paths: u64 = records.iter().map(|(_, r)| r.paths).sum();
                PrefixSummary {
                    country,
                    version,
                    prefix_count: n,
                    prefix_length_mean: mean,
                    prefix_length_std: std,
                    path_length_mean: if paths == 0 { 0.0 } else { jumps as f64 / paths as f64 },
                    path_count: paths,
                }
            })
            .collect()
    }
}
