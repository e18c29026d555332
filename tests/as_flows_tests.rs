use rirstats::as_flows::AsFlows;
use rirstats::coverage::Coverage;
use rirstats::observation::AsHop;
use rirstats::region_catalog::{RegionBucket, RegionCatalog};
use rirstats::resource_catalog::ResourceCatalog;
use rirstats::routing_database::RoutingDatabase;
use rirstats::routing_table::RoutingTable;
use rirstats::shared::{Country, CountryCode, Registry};
use ipnetwork::IpNetwork;
use std::str::FromStr;

fn cc(code: &str) -> Country {
    Country::from_str(code).unwrap()
}

fn code(code: &str) -> CountryCode {
    code.parse().unwrap()
}

fn net(text: &str) -> IpNetwork {
    IpNetwork::from_str(text).unwrap()
}

fn catalog() -> ResourceCatalog {
    let mut catalog = ResourceCatalog::new();
    for asn in [300, 301, 305] {
        catalog.add_asn(asn, cc("AR"));
    }
    catalog.add_asn(28000, cc("BR"));
    catalog.add_asn(3320, cc("DE"));
    catalog.add_prefix(net("200.0.0.0/16"), cc("AR"));
    catalog.add_prefix(net("2800:40::/32"), cc("AR"));
    catalog
}

#[test]
fn test_as_flows() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["10", "28000", "301", "300"]);
    db.add_path(&catalog, net("200.0.2.0/24"), cc("AR"), &["10", "3320", "300"]);

    let flows = AsFlows::build(&db, &catalog, &RegionCatalog::builtin(), Registry::Lacnic);

    let as_flow = flows.as_flow_rows();
    assert_eq!(as_flow.len(), 2);
    assert_eq!(
        (as_flow[0].origin, as_flow[0].destination, as_flow[0].count),
        (code("AR"), RegionBucket::Region(Registry::Lacnic), 2)
    );
    assert_eq!(
        (as_flow[1].origin, as_flow[1].destination, as_flow[1].count),
        (code("AR"), RegionBucket::Region(Registry::RipeNcc), 1)
    );

    let prefix_flow = flows.prefix_flow_rows();
    assert_eq!(prefix_flow.len(), 2);
    assert!(prefix_flow.iter().all(|row| row.count == 1));

    let origins = flows.origin_rows();
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].asn, AsHop::Asn(300));
    assert_eq!(origins[0].prefixes, 2);

    let transit = flows.transit_rows();
    assert_eq!(transit.len(), 1);
    assert_eq!(transit[0].asn, AsHop::Asn(301));
    assert_eq!(transit[0].downstream_ases, 1);

    let upstream = flows.upstream_rows();
    assert_eq!(upstream.len(), 2);
    assert_eq!(upstream[0].asn, AsHop::Asn(3320));
    assert_eq!(upstream[0].downstream_ases, 1);
    assert_eq!(upstream[1].asn, AsHop::Asn(28000));
    assert_eq!(upstream[1].downstream_ases, 2);
}

#[test]
fn test_flows_ignore_untracked_sources() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["10", "3320", "301", "300"]);

    // AR is not served by RIPE NCC, so nothing flows from a tracked country
    let flows = AsFlows::build(&db, &catalog, &RegionCatalog::builtin(), Registry::RipeNcc);
    assert!(flows.as_flow_rows().is_empty());
    assert!(flows.prefix_flow_rows().is_empty());
    assert!(flows.origin_rows().is_empty());
    assert!(flows.upstream_rows().is_empty());
}

#[test]
fn test_ixp_coverage() {
    let catalog = catalog();
    let ar = cc("AR");
    let uy = cc("UY");

    let mut table = RoutingTable::new(Registry::Lacnic, RegionCatalog::builtin());
    let paths = [
        ("200.0.1.0/24", 300),
        ("200.0.9.0/24", 305),
        ("2800:40::/32", 300),
    ];
    for (prefix, origin) in paths {
        table
            .add_path(net(prefix), &[AsHop::Asn(10), AsHop::Asn(origin)], &[uy, ar])
            .unwrap();
    }

    let mut db = RoutingDatabase::new();
    db.add_path(&catalog, net("200.0.1.0/24"), ar, &["10", "300"]);
    db.add_path(&catalog, net("200.0.5.0/24"), ar, &["10", "301"]);

    let coverage = Coverage::build(&table, &db, code("AR"));
    assert_eq!(coverage.asn.shared, vec![AsHop::Asn(300)]);
    assert_eq!(coverage.asn.ixp_only, vec![AsHop::Asn(305)]);
    assert_eq!(coverage.asn.country_only, vec![AsHop::Asn(301)]);

    assert_eq!(coverage.ipv4.shared, vec![net("200.0.1.0/24")]);
    assert_eq!(coverage.ipv4.ixp_only, vec![net("200.0.9.0/24")]);
    assert_eq!(coverage.ipv4.country_only, vec![net("200.0.5.0/24")]);
    assert_eq!(coverage.ipv6.ixp_only, vec![net("2800:40::/32")]);
    assert!(coverage.ipv6.country_only.is_empty());

    let counts = coverage.asn.counts();
    assert_eq!((counts.total, counts.shared), (3, 1));
}
