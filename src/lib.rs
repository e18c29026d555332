// Re-export all public modules
pub mod shared;
pub mod error;
pub mod config;
pub mod delegation;
pub mod resource_catalog;
pub mod region_catalog;
pub mod observation;
pub mod routing_database;
pub mod routing_table;
pub mod as_flows;
pub mod coverage;
pub mod pipeline;
pub mod report;

// Re-export commonly used types at the crate root
pub use config::{load_config, Mode, RunConfig};
pub use delegation::{DelegationReader, DelegationRecord, Resource};
pub use error::{ConfigError, DelegationError, Error, ObservationError, Result};
pub use observation::{AsHop, Observation, ObservationReader};
pub use region_catalog::{RegionBucket, RegionCatalog};
pub use resource_catalog::ResourceCatalog;
pub use routing_database::{PathOutcome, RoutingDatabase};
pub use routing_table::RoutingTable;
pub use shared::{Country, CountryCode, IpVersion, Registry, Role, ASN};
