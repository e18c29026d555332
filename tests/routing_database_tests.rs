use rirstats::observation::AsHop;
use rirstats::resource_catalog::ResourceCatalog;
use rirstats::routing_database::{PathOutcome, RoutingDatabase};
use rirstats::shared::{Country, CountryCode, IpVersion, Role};
use ipnetwork::IpNetwork;
use std::str::FromStr;

fn cc(code: &str) -> Country {
    Country::from_str(code).unwrap()
}

fn net(text: &str) -> IpNetwork {
    IpNetwork::from_str(text).unwrap()
}

fn hops(asns: &[u32]) -> Vec<AsHop> {
    asns.iter().map(|&asn| AsHop::Asn(asn)).collect()
}

/// AS 200, 300, 50 and 65000 in AR, 100 in BR, 400 in CL.
fn catalog() -> ResourceCatalog {
    let mut catalog = ResourceCatalog::new();
    for asn in [50, 200, 300, 65000] {
        catalog.add_asn(asn, cc("AR"));
    }
    catalog.add_asn(100, cc("BR"));
    catalog.add_asn(400, cc("CL"));
    catalog.add_prefix(net("200.0.0.0/16"), cc("AR"));
    catalog.add_prefix(net("2800:40::/32"), cc("AR"));
    catalog
}

fn members(db: &RoutingDatabase, role: Role) -> Vec<AsHop> {
    db.members(cc("AR"), IpVersion::Ipv4, role)
        .into_iter()
        .cloned()
        .collect()
}

#[test]
fn test_origin_transit_upstream() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    let outcome = db.add_path(&catalog, prefix, cc("AR"), &["10", "50", "100", "200", "300"]);
    assert_eq!(outcome, PathOutcome::Consistent);

    assert_eq!(members(&db, Role::Origin), hops(&[300]));
    assert_eq!(members(&db, Role::Transit), hops(&[200]));
    assert_eq!(members(&db, Role::Upstream), hops(&[100]));
    // AS 50 is domestic but sits beyond the first foreign hop
    assert!(db.as_record(&AsHop::Asn(50)).is_none());
    // the peer is never classified
    assert!(db.as_record(&AsHop::Asn(10)).is_none());
    assert!(db.members(cc("AR"), IpVersion::Ipv6, Role::Origin).is_empty());
}

#[test]
fn test_three_hop_path_leaves_peer_unclassified() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();

    let outcome = db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["100", "200", "300"]);
    assert_eq!(outcome, PathOutcome::Consistent);

    assert_eq!(members(&db, Role::Origin), hops(&[300]));
    assert_eq!(members(&db, Role::Transit), hops(&[200]));
    // AS 100 is foreign but it is the peer, so no upstream is recorded
    assert!(members(&db, Role::Upstream).is_empty());
    assert!(db.as_record(&AsHop::Asn(100)).is_none());
}

#[test]
fn test_as_records_track_downstream() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");
    db.add_path(&catalog, prefix, cc("AR"), &["10", "100", "200", "300"]);

    let origin = db.as_record(&AsHop::Asn(300)).unwrap();
    assert_eq!(origin.country, cc("AR"));
    assert!(origin.ipv4_prefixes.contains(&prefix));
    assert!(origin.downstream_ases.is_empty());

    let transit = db.as_record(&AsHop::Asn(200)).unwrap();
    assert!(transit.ipv4_prefixes.is_empty());
    assert!(transit.ipv4_downstream_prefixes.contains(&prefix));
    assert_eq!(transit.downstream_ases.iter().cloned().collect::<Vec<_>>(), hops(&[300]));

    let upstream = db.as_record(&AsHop::Asn(100)).unwrap();
    assert_eq!(upstream.country, cc("BR"));
    assert_eq!(
        upstream.downstream_ases.iter().cloned().collect::<Vec<_>>(),
        hops(&[200, 300])
    );
}

#[test]
fn test_prepends_are_not_double_counted() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    db.add_path(&catalog, prefix, cc("AR"), &["10", "100", "200", "300", "300"]);
    assert_eq!(members(&db, Role::Origin), hops(&[300]));
    assert_eq!(members(&db, Role::Transit), hops(&[200]));
    assert_eq!(members(&db, Role::Upstream), hops(&[100]));
    assert!(db.as_record(&AsHop::Asn(300)).unwrap().downstream_ases.is_empty());

    // a loop back to an already seen AS is skipped as well
    let mut looped = RoutingDatabase::new();
    looped.add_path(&catalog, prefix, cc("AR"), &["10", "200", "300", "200", "300"]);
    assert_eq!(members(&looped, Role::Transit), hops(&[200]));
    assert!(members(&looped, Role::Upstream).is_empty());
}

#[test]
fn test_bracketed_origin() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    let outcome = db.add_path(&catalog, prefix, cc("AR"), &["100", "{65000}"]);
    assert_eq!(outcome, PathOutcome::Consistent);
    assert_eq!(members(&db, Role::Origin), hops(&[65000]));
    assert_eq!(db.prefix(&prefix).unwrap().origin_asn, 65000);
    assert!(db.anomalies().is_empty());
}

#[test]
fn test_unresolved_origin_is_only_logged() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    let outcome = db.add_path(&catalog, prefix, cc("AR"), &["100", "AS-FOO"]);
    assert_eq!(outcome, PathOutcome::Anomaly);
    assert!(db.country_roles(cc("AR")).is_none());
    assert!(db.prefix(&prefix).is_none());
    assert_eq!(db.ases().count(), 0);
    assert_eq!(db.anomalies().len(), 1);
    assert_eq!(db.anomalies()[0].to_string(), "200.0.1.0/24|100 AS-FOO");
}

#[test]
fn test_mid_path_anomaly_still_classified() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    let outcome = db.add_path(&catalog, prefix, cc("AR"), &["10", "100", "AS-X", "300"]);
    assert_eq!(outcome, PathOutcome::Consistent);
    assert_eq!(db.anomalies().len(), 1);
    // the unresolved token has no country, so it ends the walk as upstream
    assert_eq!(
        members(&db, Role::Upstream),
        vec![AsHop::Unresolved("AS-X".to_string())]
    );
    assert!(db.as_record(&AsHop::Asn(100)).is_none());
}

#[test]
fn test_offshore_and_unregistered_origins() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();

    let offshore = db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["10", "200", "400"]);
    assert_eq!(offshore, PathOutcome::Offshore);
    let unregistered =
        db.add_path(&catalog, net("200.0.2.0/24"), cc("AR"), &["10", "200", "999"]);
    assert_eq!(unregistered, PathOutcome::Unregistered);

    assert_eq!(members(&db, Role::Offshore), hops(&[400]));
    assert_eq!(members(&db, Role::Unregistered), hops(&[999]));
    assert!(members(&db, Role::Origin).is_empty());
    // no walk past an inconsistent origin
    assert!(members(&db, Role::Transit).is_empty());
    assert!(db.as_record(&AsHop::Asn(200)).is_none());

    // nothing is filed under the origin's own country
    assert!(db.country_roles(cc("CL")).is_none());
    assert_eq!(db.as_record(&AsHop::Asn(999)).unwrap().country, Country::Unknown);
    assert_eq!(db.prefix(&net("200.0.1.0/24")).unwrap().paths, 1);
}

#[test]
fn test_repeated_observation() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");
    let path = ["10", "100", "200", "300"];

    db.add_path(&catalog, prefix, cc("AR"), &path);
    let roles = db.country_roles(cc("AR")).unwrap().clone();
    db.add_path(&catalog, prefix, cc("AR"), &path);

    assert_eq!(db.country_roles(cc("AR")).unwrap(), &roles);
    let record = db.prefix(&prefix).unwrap();
    assert_eq!(record.paths, 2);
    assert_eq!(record.jumps, 8);
    assert_eq!(record.mean_path_length(), 4.0);
}

#[test]
fn test_prefix_record_last_write_wins() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    let prefix = net("200.0.1.0/24");

    db.add_path(&catalog, prefix, cc("AR"), &["10", "300"]);
    db.add_path(&catalog, prefix, cc("AR"), &["10", "200", "400"]);

    let record = db.prefix(&prefix).unwrap();
    assert_eq!(record.origin_asn, 400);
    assert_eq!(record.paths, 2);
    assert_eq!(record.jumps, 5);
    assert_eq!(record.version, IpVersion::Ipv4);
}

#[test]
fn test_country_summary() {
    let catalog = catalog();
    let mut db = RoutingDatabase::with_countries(["UY".parse::<CountryCode>().unwrap()]);
    db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["10", "100", "200", "300"]);
    db.add_path(&catalog, net("2800:40::/32"), cc("AR"), &["10", "200", "300"]);

    let summary = db.country_summary();
    assert_eq!(summary.len(), 2);

    let ar = &summary[0];
    assert_eq!(ar.country, cc("AR"));
    assert_eq!((ar.ipv4.origin, ar.ipv4.transit, ar.ipv4.upstream), (1, 1, 1));
    assert_eq!((ar.ipv6.origin, ar.ipv6.transit, ar.ipv6.upstream), (1, 1, 0));
    assert_eq!(ar.total.origin, 1);
    assert_eq!(ar.total.transit, 1);
    assert_eq!(ar.total_local_asns, 2);

    // seeded countries are reported even without paths
    let uy = &summary[1];
    assert_eq!(uy.country, cc("UY"));
    assert_eq!(uy.total_local_asns, 0);
}

#[test]
fn test_prefix_summary() {
    let catalog = catalog();
    let mut db = RoutingDatabase::new();
    db.add_path(&catalog, net("200.0.1.0/24"), cc("AR"), &["10", "100", "200", "300"]);
    db.add_path(&catalog, net("200.0.0.0/22"), cc("AR"), &["10", "300"]);

    let summary = db.prefix_summary();
    assert_eq!(summary.len(), 1);
    let v4 = &summary[0];
    assert_eq!(v4.version, IpVersion::Ipv4);
    assert_eq!(v4.prefix_count, 2);
    assert_eq!(v4.prefix_length_mean, 23.0);
    assert_eq!(v4.path_count, 2);
    assert_eq!(v4.path_length_mean, 3.0);
    assert!(v4.prefix_length_std.is_some());
}
