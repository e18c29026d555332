//! JSON reports of a processing run.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use serde::Serialize;
use tracing::info;

use crate::as_flows::AsFlows;
use crate::coverage::Coverage;
use crate::error::Error;
use crate::observation::AsHop;
use crate::pipeline::RunStats;
use crate::routing_database::{PrefixRecord, RoutingDatabase};
use crate::routing_table::RoutingTable;
use crate::shared::{Country, IpVersion, Role};

#[derive(Debug, Serialize)]
struct RoleRow<'a> {
    country: Country,
    version: IpVersion,
    role: Role,
    asns: Vec<&'a AsHop>,
}

#[derive(Debug, Serialize)]
struct PrefixRow<'a> {
    prefix: &'a IpNetwork,
    #[serde(flatten)]
    record: &'a PrefixRecord,
    mean_path_length: f64,
}

#[derive(Debug, Serialize)]
struct AsRow<'a> {
    asn: &'a AsHop,
    country: Country,
    ipv4_prefixes: usize,
    ipv6_prefixes: usize,
    ipv4_downstream_prefixes: usize,
    ipv6_downstream_prefixes: usize,
    downstream_ases: Vec<&'a AsHop>,
}

/// Writes `<name>-<date>.json` files into one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    date: String,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, date: impl Into<String>) -> Result<Self, Error> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(ReportWriter {
            output_dir,
            date: date.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}-{}.json", name, self.date))
    }

    pub fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf, Error> {
        let path = self.path(name);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, value)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// Country roles, prefix statistics, AS records and anomalies of a
    /// classification run, plus the derived flows.
    pub fn write_countries(
        &self,
        db: &RoutingDatabase,
        flows: &AsFlows,
        stats: &RunStats,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut roles = Vec::new();
        for (&country, country_roles) in db.countries() {
            for version in IpVersion::ALL {
                for role in Role::ALL {
                    roles.push(RoleRow {
                        country,
                        version,
                        role,
                        asns: country_roles.version(version).get(role).iter().collect(),
                    });
                }
            }
        }
        let country_data = serde_json::json!({
            "stats": stats,
            "summary": db.country_summary(),
            "roles": roles,
        });

        let prefixes: Vec<PrefixRow> = db
            .prefixes()
            .into_iter()
            .map(|(prefix, record)| PrefixRow {
                prefix,
                record,
                mean_path_length: record.mean_path_length(),
            })
            .collect();
        let prefix_data = serde_json::json!({
            "summary": db.prefix_summary(),
            "prefixes": prefixes,
        });

        let ases: Vec<AsRow> = db
            .ases()
            .map(|(asn, record)| AsRow {
                asn,
                country: record.country,
                ipv4_prefixes: record.ipv4_prefixes.len(),
                ipv6_prefixes: record.ipv6_prefixes.len(),
                ipv4_downstream_prefixes: record.ipv4_downstream_prefixes.len(),
                ipv6_downstream_prefixes: record.ipv6_downstream_prefixes.len(),
                downstream_ases: record.downstream_ases.iter().collect(),
            })
            .collect();

        let as_flows = serde_json::json!({
            "as_flow": flows.as_flow_rows(),
            "prefix_flow": flows.prefix_flow_rows(),
            "origin_ases": flows.origin_rows(),
            "transit_ases": flows.transit_rows(),
            "upstream_ases": flows.upstream_rows(),
        });

        Ok(vec![
            self.write("country-data", &country_data)?,
            self.write("prefix-data", &prefix_data)?,
            self.write("as-data", &ases)?,
            self.write("anomalies", db.anomalies())?,
            self.write("as-flows", &as_flows)?,
        ])
    }

    /// Peer tree and path histograms of an exchange point.
    pub fn write_ixp(
        &self,
        table: &RoutingTable,
        coverage: Option<&Coverage>,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut written = vec![
            self.write("ixp-routing", &table.rows())?,
            self.write("aspath-freq", &table.hops_rows())?,
            self.write("prepend-freq", &table.prepend_rows())?,
            self.write("ixp-summary", &table.summary_rows())?,
        ];
        if let Some(coverage) = coverage {
            let report = serde_json::json!({
                "country": coverage.country,
                "counts": {
                    "asn": coverage.asn.counts(),
                    "ipv4": coverage.ipv4.counts(),
                    "ipv6": coverage.ipv6.counts(),
                },
                "asn": coverage.asn,
                "ipv4": coverage.ipv4,
                "ipv6": coverage.ipv6,
            });
            written.push(self.write(&format!("coverage-{}", coverage.country), &report)?);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use crate::pipeline::classify;
    use crate::region_catalog::RegionCatalog;
    use crate::resource_catalog::ResourceCatalog;
    use crate::shared::{CountryCode, Registry};
    use std::collections::BTreeSet;

    #[test]
    fn test_report_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("out"), "20240115").unwrap();
        let path = writer.write("anomalies", &Vec::<String>::new()).unwrap();
        assert_eq!(path, dir.path().join("out").join("anomalies-20240115.json"));
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "[]");
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn cc(code: &str) -> Country {
        Country::parse(code).unwrap()
    }

    #[test]
    fn test_country_reports_shape() {
        let mut catalog = ResourceCatalog::new();
        catalog.add_asn(300, cc("AR"));
        catalog.add_asn(301, cc("AR"));
        catalog.add_prefix("200.0.0.0/16".parse().unwrap(), cc("AR"));
        let tracked: BTreeSet<CountryCode> = ["AR", "UY"].iter().map(|c| c.parse().unwrap()).collect();
        let mut db = RoutingDatabase::with_countries(tracked.clone());
        let observations = vec![
            Observation::parse_line("200.0.1.0/24|10 301 300").unwrap(),
            Observation::parse_line("200.0.2.0/24|10 300").unwrap(),
        ];
        let stats = classify(&catalog, &tracked, &observations, &mut db);
        let flows = AsFlows::build(&db, &catalog, &RegionCatalog::builtin(), Registry::Lacnic);

        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "20240115").unwrap();
        let written = writer.write_countries(&db, &flows, &stats).unwrap();
        assert_eq!(written.len(), 5);

        let country_data = read_json(&writer.path("country-data"));
        let keys: Vec<&str> = country_data
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["roles", "stats", "summary"]);
        assert_eq!(country_data["stats"]["observations"], 2);
        // two tracked countries, each with every version and role
        let roles = country_data["roles"].as_array().unwrap();
        assert_eq!(roles.len(), 2 * IpVersion::ALL.len() * Role::ALL.len());

        let prefix_data = read_json(&writer.path("prefix-data"));
        assert_eq!(prefix_data["prefixes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_ixp_reports_shape() {
        let mut table = RoutingTable::new(Registry::Lacnic, RegionCatalog::builtin());
        let paths = [
            ("200.0.1.0/24", vec![10, 300], vec![cc("UY"), cc("AR")]),
            ("2800:40::/32", vec![10, 300], vec![cc("UY"), cc("AR")]),
            ("193.0.0.0/21", vec![20, 3333], vec![cc("UY"), cc("NL")]),
        ];
        for (prefix, asns, countries) in paths {
            let hops: Vec<AsHop> = asns.into_iter().map(AsHop::Asn).collect();
            table
                .add_path(prefix.parse().unwrap(), &hops, &countries)
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "20240115").unwrap();
        let written = writer.write_ixp(&table, None).unwrap();
        assert_eq!(written.len(), 4);

        let routing = read_json(&writer.path("ixp-routing"));
        let rows = routing.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["peer_cc"], "UY");
        assert_eq!(rows[0]["origin_cc"], "AR");
        assert_eq!(rows[0]["prefixes_ipv4"], serde_json::json!(["200.0.1.0/24"]));
        assert_eq!(rows[0]["prefixes_ipv6"], serde_json::json!(["2800:40::/32"]));
        assert_eq!(rows[1]["origin_cc"], "ripencc");

        let summary = read_json(&writer.path("ixp-summary"));
        let buckets: Vec<&str> = summary
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["country"].as_str().unwrap())
            .collect();
        assert_eq!(buckets, ["AR", "UY", "ripencc"]);
    }
}
