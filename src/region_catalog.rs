use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::shared::{Country, CountryCode, Registry};

const AFRINIC_COUNTRIES: &[&str] = &[
    "AO", "BF", "BI", "BJ", "BW", "CD", "CF", "CG", "CI", "CM", "CV", "DJ", "DZ", "EG", "EH",
    "ER", "ET", "GA", "GH", "GM", "GN", "GQ", "GW", "KE", "KM", "LR", "LS", "LY", "MA", "MG",
    "ML", "MR", "MU", "MW", "MZ", "NA", "NE", "NG", "RE", "RW", "SC", "SD", "SL", "SN", "SO",
    "SS", "ST", "SZ", "TD", "TG", "TN", "TZ", "UG", "YT", "ZA", "ZM", "ZW",
];

const APNIC_COUNTRIES: &[&str] = &[
    "AF", "AP", "AS", "AU", "BD", "BN", "BT", "CC", "CK", "CN", "CX", "FJ", "FM", "GU", "HK",
    "ID", "IN", "IO", "JP", "KH", "KI", "KP", "KR", "LA", "LK", "MH", "MM", "MN", "MO", "MP",
    "MV", "MY", "NC", "NF", "NP", "NR", "NU", "NZ", "PF", "PG", "PH", "PK", "PN", "PW", "SB",
    "SG", "TH", "TK", "TL", "TO", "TV", "TW", "VN", "VU", "WF", "WS",
];

const ARIN_COUNTRIES: &[&str] = &[
    "AG", "AI", "AQ", "BB", "BL", "BM", "BS", "BV", "CA", "DM", "GD", "GP", "HM", "JM", "KN",
    "KY", "LC", "MF", "MQ", "MS", "PM", "PR", "SH", "TC", "UM", "US", "VC", "VG", "VI",
];

const LACNIC_COUNTRIES: &[&str] = &[
    "AR", "AW", "BO", "BQ", "BR", "BZ", "CL", "CO", "CR", "CU", "CW", "DO", "EC", "FK", "GF",
    "GS", "GT", "GY", "HN", "HT", "MX", "NI", "PA", "PE", "PY", "SR", "SV", "SX", "TT", "UY",
    "VE",
];

const RIPENCC_COUNTRIES: &[&str] = &[
    "AD", "AE", "AL", "AM", "AT", "AX", "AZ", "BA", "BE", "BG", "BH", "BY", "CH", "CY", "CZ",
    "DE", "DK", "EE", "ES", "EU", "FI", "FO", "FR", "GB", "GE", "GG", "GI", "GL", "GR", "HR",
    "HU", "IE", "IL", "IM", "IQ", "IR", "IS", "IT", "JE", "JO", "KG", "KW", "KZ", "LB", "LI",
    "LT", "LU", "LV", "MC", "MD", "ME", "MK", "MT", "NL", "NO", "OM", "PL", "PS", "PT", "QA",
    "RO", "RS", "RU", "SA", "SE", "SI", "SJ", "SK", "SM", "SY", "TF", "TJ", "TM", "TR", "UA",
    "UZ", "VA", "YE",
];

fn builtin_countries(registry: Registry) -> &'static [&'static str] {
    match registry {
        Registry::Afrinic => AFRINIC_COUNTRIES,
        Registry::Apnic => APNIC_COUNTRIES,
        Registry::Arin => ARIN_COUNTRIES,
        Registry::Lacnic => LACNIC_COUNTRIES,
        Registry::RipeNcc => RIPENCC_COUNTRIES,
    }
}

lazy_static::lazy_static! {
    static ref BUILTIN_REGIONS: HashMap<CountryCode, Registry> = Registry::ALL
        .iter()
        .flat_map(|&registry| {
            builtin_countries(registry)
                .iter()
                .filter_map(move |cc| cc.parse::<CountryCode>().ok().map(|cc| (cc, registry)))
        })
        .collect();
}

/// Where a country lands once foreign countries are folded into their
/// registry region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionBucket {
    /// A country of the home region, kept as is.
    Country(CountryCode),
    /// A country of another region.
    Region(Registry),
    /// Not in the region table (including unknown countries).
    Other,
}

impl fmt::Display for RegionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionBucket::Country(cc) => write!(f, "{}", cc),
            RegionBucket::Region(registry) => write!(f, "{}", registry),
            RegionBucket::Other => write!(f, "other"),
        }
    }
}

impl Serialize for RegionBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Country code to registry region table.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: HashMap<CountryCode, Registry>,
}

impl RegionCatalog {
    pub fn new() -> Self {
        RegionCatalog {
            regions: HashMap::new(),
        }
    }

    /// The service regions of the five registries.
    pub fn builtin() -> Self {
        RegionCatalog {
            regions: BUILTIN_REGIONS.clone(),
        }
    }

    /// Loads a `{ "<registry>": ["CC", ...] }` JSON table.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading region table from {:?}", path);
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let table: HashMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut catalog = RegionCatalog::new();
        for (name, countries) in table {
            let registry: Registry = name
                .parse()
                .map_err(|()| ConfigError::UnknownRegion(name.clone()))?;
            for cc in countries {
                let code: CountryCode = cc.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "regions",
                    reason: format!("invalid country code {:?} in {}", cc, name),
                })?;
                catalog.insert(code, registry);
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, country: CountryCode, registry: Registry) {
        if let Some(previous) = self.regions.insert(country, registry) {
            if previous != registry {
                warn!(%country, %previous, %registry, "country listed under two regions");
            }
        }
    }

    pub fn region_of(&self, country: Country) -> Option<Registry> {
        country.code().and_then(|cc| self.regions.get(&cc).copied())
    }

    /// Countries served by `registry`, sorted.
    pub fn countries(&self, registry: Registry) -> BTreeSet<CountryCode> {
        self.regions
            .iter()
            .filter(|(_, &r)| r == registry)
            .map(|(&cc, _)| cc)
            .collect()
    }

    /// Keeps home-region countries, folds foreign ones into their region
    /// and everything else into [`RegionBucket::Other`].
    pub fn bucket(&self, country: Country, home: Registry) -> RegionBucket {
        match (country.code(), self.region_of(country)) {
            (Some(cc), Some(region)) if region == home => RegionBucket::Country(cc),
            (_, Some(region)) => RegionBucket::Region(region),
            _ => RegionBucket::Other,
        }
    }

    /// Region of `country` as a bucket: the region itself or `Other`.
    pub fn region_bucket(&self, country: Country) -> RegionBucket {
        self.region_of(country)
            .map(RegionBucket::Region)
            .unwrap_or(RegionBucket::Other)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
