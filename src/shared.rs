use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::DelegationError;

pub type ASN = u32;

/// Marker used by the registries for resources without a country.
pub const UNKNOWN_COUNTRY: &str = "ZZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum IpVersion {
    Ipv4 = 0,
    Ipv6 = 1,
}

impl IpVersion {
    pub const ALL: [IpVersion; 2] = [IpVersion::Ipv4, IpVersion::Ipv6];

    pub fn of(prefix: &ipnetwork::IpNetwork) -> Self {
        match prefix {
            ipnetwork::IpNetwork::V4(_) => IpVersion::Ipv4,
            ipnetwork::IpNetwork::V6(_) => IpVersion::Ipv6,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IpVersion::Ipv4 => "ipv4",
            IpVersion::Ipv6 => "ipv6",
        };
        write!(f, "{}", s)
    }
}

/// Structural role of an AS relative to the country owning a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    Origin = 0,
    Transit = 1,
    Upstream = 2,
    Unregistered = 3,
    Offshore = 4,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Origin,
        Role::Transit,
        Role::Upstream,
        Role::Unregistered,
        Role::Offshore,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Origin => "origin",
            Role::Transit => "transit",
            Role::Upstream => "upstream",
            Role::Unregistered => "unregistered",
            Role::Offshore => "offshore",
        };
        write!(f, "{}", s)
    }
}

/// The five regional Internet registries. Doubles as the region identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registry {
    Afrinic,
    Apnic,
    Arin,
    Lacnic,
    RipeNcc,
}

impl Registry {
    pub const ALL: [Registry; 5] = [
        Registry::Afrinic,
        Registry::Apnic,
        Registry::Arin,
        Registry::Lacnic,
        Registry::RipeNcc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Registry::Afrinic => "afrinic",
            Registry::Apnic => "apnic",
            Registry::Arin => "arin",
            Registry::Lacnic => "lacnic",
            Registry::RipeNcc => "ripencc",
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Registry {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Registry::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or(())
    }
}

/// Two-letter upper-case country code as published by the registries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        // always two ASCII letters, see `FromStr`
        std::str::from_utf8(&self.0).unwrap_or(UNKNOWN_COUNTRY)
    }
}

impl FromStr for CountryCode {
    type Err = DelegationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(DelegationError::InvalidCountry(s.to_string()));
        }
        Ok(CountryCode([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
        ]))
    }
}

impl fmt::Debug for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Country attribution of a resource. Every lookup miss and every `ZZ`
/// marker collapses into `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Country {
    Known(CountryCode),
    Unknown,
}

impl Country {
    /// Parses a registry country field. Empty and `ZZ` become `Unknown`.
    pub fn parse(s: &str) -> Result<Self, DelegationError> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(UNKNOWN_COUNTRY) {
            return Ok(Country::Unknown);
        }
        Ok(Country::Known(s.parse()?))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Country::Unknown)
    }

    pub fn code(&self) -> Option<CountryCode> {
        match self {
            Country::Known(cc) => Some(*cc),
            Country::Unknown => None,
        }
    }
}

impl From<CountryCode> for Country {
    fn from(cc: CountryCode) -> Self {
        Country::Known(cc)
    }
}

impl FromStr for Country {
    type Err = DelegationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Country::parse(s)
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Country::Known(cc) => write!(f, "{}", cc),
            Country::Unknown => write!(f, "{}", UNKNOWN_COUNTRY),
        }
    }
}

impl Serialize for Country {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_parse() {
        assert_eq!(Country::parse("ZZ").unwrap(), Country::Unknown);
        assert_eq!(Country::parse("").unwrap(), Country::Unknown);
        assert_eq!(Country::parse("ar").unwrap().to_string(), "AR");
        assert!(Country::parse("ARG").is_err());
        assert!(Country::parse("1A").is_err());
    }

    #[test]
    fn test_registry_names() {
        for registry in Registry::ALL {
            assert_eq!(registry.as_str().parse::<Registry>(), Ok(registry));
        }
        assert!("iana".parse::<Registry>().is_err());
    }
}
