//! Path observations handed to the classifiers.

use std::fmt;
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::{Error, ObservationError};
use crate::resource_catalog::ResourceCatalog;
use crate::shared::{Country, IpVersion, ASN};

/// One AS-path token. Anything that is not a plain decimal AS number is
/// kept verbatim so it can still be reported and looked up (as unknown).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AsHop {
    Asn(ASN),
    Unresolved(String),
}

impl AsHop {
    pub fn parse(token: &str) -> Self {
        parse_asn(token)
            .map(AsHop::Asn)
            .unwrap_or_else(|| AsHop::Unresolved(token.to_string()))
    }

    pub fn asn(&self) -> Option<ASN> {
        match self {
            AsHop::Asn(asn) => Some(*asn),
            AsHop::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, AsHop::Asn(_))
    }
}

impl From<ASN> for AsHop {
    fn from(asn: ASN) -> Self {
        AsHop::Asn(asn)
    }
}

impl fmt::Display for AsHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsHop::Asn(asn) => write!(f, "{}", asn),
            AsHop::Unresolved(token) => write!(f, "{}", token),
        }
    }
}

impl Serialize for AsHop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AsHop::Asn(asn) => serializer.serialize_u32(*asn),
            AsHop::Unresolved(token) => serializer.serialize_str(token),
        }
    }
}

/// Plain non-negative decimal AS number, no sign and no surrounding text.
fn parse_asn(token: &str) -> Option<ASN> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Origin AS of a path: its last token, or the last token with one leading
/// and one trailing character removed when it is written as an AS set or
/// confederation segment (`{65000}`, `(65000)`).
pub fn resolve_origin<S: AsRef<str>>(as_path: &[S]) -> Option<ASN> {
    let last = as_path.last()?.as_ref();
    if let Some(asn) = parse_asn(last) {
        return Some(asn);
    }
    let mut chars = last.chars();
    chars.next();
    chars.next_back();
    parse_asn(chars.as_str())
}

/// Parses an observed prefix and clears its host bits.
///
/// A bare IPv4 address gets its classful length (/8, /16 or /24); any
/// other bare address is treated as a host route.
pub fn parse_prefix(text: &str) -> Result<IpNetwork, ObservationError> {
    let text = text.trim();
    let invalid = || ObservationError::InvalidPrefix(text.to_string());

    let network = if text.contains('/') {
        IpNetwork::from_str(text).map_err(|_| invalid())?
    } else {
        let address = IpAddr::from_str(text).map_err(|_| invalid())?;
        let length = match address {
            IpAddr::V4(v4) => classful_length(v4),
            IpAddr::V6(_) => 128,
        };
        IpNetwork::new(address, length).map_err(|_| invalid())?
    };

    IpNetwork::new(network.network(), network.prefix()).map_err(|_| invalid())
}

fn classful_length(address: Ipv4Addr) -> u8 {
    match address.octets()[0] {
        0..=127 => 8,
        128..=191 => 16,
        192..=223 => 24,
        _ => 32,
    }
}

/// Resolves the registered country of every hop, peer first.
pub fn country_path(catalog: &ResourceCatalog, hops: &[AsHop]) -> Vec<Country> {
    hops.iter().map(|hop| catalog.lookup_hop(hop)).collect()
}

/// A single announced route: prefix plus the raw AS-path tokens, peer
/// adjacent end first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub prefix: IpNetwork,
    pub as_path: Vec<String>,
}

impl Observation {
    pub fn new<S: Into<String>>(
        prefix: IpNetwork,
        as_path: impl IntoIterator<Item = S>,
    ) -> Self {
        Observation {
            prefix,
            as_path: as_path.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses `prefix|as path`, where the path is whitespace separated.
    pub fn parse_line(line: &str) -> Result<Self, ObservationError> {
        let (prefix, path) = line
            .split_once('|')
            .ok_or_else(|| ObservationError::MalformedLine(line.to_string()))?;
        let prefix = parse_prefix(prefix)?;
        let as_path: Vec<String> = path.split_whitespace().map(str::to_string).collect();
        if as_path.is_empty() {
            return Err(ObservationError::EmptyPath(prefix.to_string()));
        }
        Ok(Observation { prefix, as_path })
    }

    pub fn version(&self) -> IpVersion {
        IpVersion::of(&self.prefix)
    }

    pub fn hops(&self) -> Vec<AsHop> {
        self.as_path.iter().map(|t| AsHop::parse(t)).collect()
    }

    /// Hops with the origin token replaced by its resolved AS number, or
    /// `None` when the origin cannot be resolved.
    pub fn resolved_hops(&self) -> Option<Vec<AsHop>> {
        let origin = resolve_origin(&self.as_path)?;
        let mut hops = self.hops();
        if let Some(last) = hops.last_mut() {
            *last = AsHop::Asn(origin);
        }
        Some(hops)
    }
}

/// Iterator over a `prefix|as path` file.
///
/// Blank lines and `#` comments are ignored. Malformed lines are logged
/// and counted, never fatal: a RIB dump always carries a few.
pub struct ObservationReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    malformed: usize,
}

impl<R: BufRead> ObservationReader<R> {
    pub fn new(reader: R) -> Self {
        ObservationReader {
            lines: reader.lines(),
            line_no: 0,
            malformed: 0,
        }
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for ObservationReader<R> {
    type Item = Result<Observation, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Observation::parse_line(line) {
                Ok(observation) => return Some(Ok(observation)),
                Err(e) => {
                    self.malformed += 1;
                    warn!(line = self.line_no, error = %e, "skipping observation");
                }
            }
        }
    }
}
