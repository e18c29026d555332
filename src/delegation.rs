//! Registry delegation records.
//!
//! A delegation feed (`delegated-*-extended` or the NRO `combined-stat`)
//! is a pipe separated text file:
//!
//! ```text
//! registry|cc|type|start|value|date|status[|opaque-id[|extensions]]
//! lacnic|AR|asn|7303|1|19960520|allocated
//! lacnic|AR|ipv4|181.0.0.0|65536|20100520|allocated
//! lacnic|AR|ipv6|2800:40::|32|20050921|allocated
//! ```
//!
//! Version headers, summary lines and records from registries other than
//! the five RIRs are skipped without error.

use std::io::BufRead;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use tracing::debug;

use crate::error::{DelegationError, Error};
use crate::shared::{Country, Registry, ASN};

const MIN_FIELDS: usize = 5;
const STATUS_FIELD: usize = 6;

/// The resource a delegation record hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// `count` consecutive AS numbers starting at `start`.
    Asn { start: ASN, count: u32 },
    /// A block of `count` IPv4 addresses starting at `start`.
    Ipv4 { start: Ipv4Addr, count: u64 },
    /// An IPv6 block given directly by its prefix length.
    Ipv6 { start: Ipv6Addr, length: u8 },
}

impl Resource {
    /// AS numbers covered by an `asn` record, `None` for address records.
    pub fn asns(&self) -> Option<impl Iterator<Item = ASN>> {
        match *self {
            // bounds were checked when parsing
            Resource::Asn { start, count } => Some((0..count).map(move |i| start + i)),
            _ => None,
        }
    }

    /// Network covered by an address record.
    ///
    /// IPv4 block sizes are turned into a prefix length as
    /// `32 - floor(log2(count))`, which is exact only for power-of-two
    /// counts. Other sizes get the length of the largest power of two not
    /// exceeding them; see [`Resource::is_exact`].
    pub fn network(&self) -> Option<IpNetwork> {
        match *self {
            Resource::Asn { .. } => None,
            Resource::Ipv4 { start, count } => {
                let length = ipv4_length(count)?;
                Ipv4Network::new(start, length).ok().map(IpNetwork::V4)
            }
            Resource::Ipv6 { start, length } => {
                Ipv6Network::new(start, length).ok().map(IpNetwork::V6)
            }
        }
    }

    /// False for IPv4 blocks whose size is not a power of two.
    pub fn is_exact(&self) -> bool {
        match *self {
            Resource::Ipv4 { count, .. } => count.is_power_of_two(),
            _ => true,
        }
    }
}

fn ipv4_length(count: u64) -> Option<u8> {
    if count == 0 || count > (1u64 << 32) {
        return None;
    }
    let log2 = 63 - count.leading_zeros();
    Some((32 - log2) as u8)
}

/// One allocation or assignment line from a registry feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRecord {
    pub registry: Registry,
    pub country: Country,
    pub resource: Resource,
    pub status: Option<String>,
}

impl DelegationRecord {
    /// Parses one feed line. Returns `Ok(None)` for lines that carry no
    /// resource for the catalog: comments, version headers, summaries,
    /// unknown registries and resource types other than asn/ipv4/ipv6.
    pub fn parse_line(line: &str) -> Result<Option<Self>, DelegationError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split('|').collect();
        let registry = match fields[0].parse::<Registry>() {
            Ok(registry) => registry,
            Err(()) => return Ok(None),
        };
        if fields.len() < MIN_FIELDS {
            return Err(DelegationError::MissingFields {
                expected: MIN_FIELDS,
                actual: fields.len(),
            });
        }
        if fields[1] == "*" || fields[3] == "*" {
            return Ok(None);
        }

        let resource = match fields[2] {
            "asn" => parse_asn(fields[3], fields[4])?,
            "ipv4" => parse_ipv4(fields[3], fields[4])?,
            "ipv6" => parse_ipv6(fields[3], fields[4])?,
            _ => return Ok(None),
        };

        Ok(Some(DelegationRecord {
            registry,
            country: Country::parse(fields[1])?,
            resource,
            status: fields
                .get(STATUS_FIELD)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }))
    }
}

impl FromStr for DelegationRecord {
    type Err = DelegationError;

    /// Strict variant of [`DelegationRecord::parse_line`]: lines that would
    /// be skipped are reported as missing fields.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DelegationRecord::parse_line(s)?.ok_or(DelegationError::MissingFields {
            expected: MIN_FIELDS,
            actual: s.split('|').count(),
        })
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, DelegationError> {
    value.trim().parse().map_err(|_| DelegationError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_asn(start: &str, count: &str) -> Result<Resource, DelegationError> {
    let start: ASN = parse_number("start", start)?;
    let count: u64 = parse_number("count", count)?;
    let last = u64::from(start) + count.saturating_sub(1);
    if count > u64::from(ASN::MAX) || last > u64::from(ASN::MAX) {
        return Err(DelegationError::AsnRangeOverflow { start, count });
    }
    Ok(Resource::Asn {
        start,
        count: count as u32,
    })
}

fn parse_ipv4(start: &str, count: &str) -> Result<Resource, DelegationError> {
    let start: Ipv4Addr = start
        .trim()
        .parse()
        .map_err(|_| DelegationError::InvalidAddress(start.to_string()))?;
    let count: u64 = parse_number("count", count)?;
    if ipv4_length(count).is_none() {
        return Err(DelegationError::InvalidBlockSize(count));
    }
    Ok(Resource::Ipv4 { start, count })
}

fn parse_ipv6(start: &str, length: &str) -> Result<Resource, DelegationError> {
    let start: Ipv6Addr = start
        .trim()
        .parse()
        .map_err(|_| DelegationError::InvalidAddress(start.to_string()))?;
    let length: u32 = parse_number("length", length)?;
    if length > 128 {
        return Err(DelegationError::InvalidPrefixLength(length));
    }
    Ok(Resource::Ipv6 {
        start,
        length: length as u8,
    })
}

/// Iterator over the resource records of a delegation feed.
///
/// Yields an error, tagged with its 1-based line number, for every line
/// that names a known registry but cannot be parsed.
pub struct DelegationReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    skipped: usize,
}

impl<R: BufRead> DelegationReader<R> {
    pub fn new(reader: R) -> Self {
        DelegationReader {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines skipped so far (headers, summaries, foreign registries).
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for DelegationReader<R> {
    type Item = Result<DelegationRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            self.line_no += 1;

            match DelegationRecord::parse_line(&line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.skipped += 1;
                    debug!(line = self.line_no, "skipping delegation line");
                }
                Err(source) => {
                    return Some(Err(Error::Delegation {
                        line: self.line_no,
                        source,
                    }))
                }
            }
        }
    }
}
