use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::thread;

use tracing::{debug, info};

use crate::error::Error;
use crate::observation::Observation;
use crate::region_catalog::RegionCatalog;
use crate::resource_catalog::ResourceCatalog;
use crate::routing_database::{PathOutcome, RoutingDatabase};
use crate::routing_table::RoutingTable;
use crate::shared::{CountryCode, Registry};

/// Counters of a classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    pub observations: usize,
    /// Prefix attributed to a country outside the tracked set.
    pub untracked: usize,
    pub consistent: usize,
    pub unregistered: usize,
    pub offshore: usize,
    /// Observations dropped because their origin could not be resolved.
    pub anomalies: usize,
}

impl RunStats {
    fn record(&mut self, outcome: PathOutcome) {
        match outcome {
            PathOutcome::Consistent => self.consistent += 1,
            PathOutcome::Unregistered => self.unregistered += 1,
            PathOutcome::Offshore => self.offshore += 1,
            PathOutcome::Anomaly => self.anomalies += 1,
        }
    }
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, other: RunStats) {
        self.observations += other.observations;
        self.untracked += other.untracked;
        self.consistent += other.consistent;
        self.unregistered += other.unregistered;
        self.offshore += other.offshore;
        self.anomalies += other.anomalies;
    }
}

/// Counters of an exchange point run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IxpStats {
    pub observations: usize,
    /// Routes added to the peer tree.
    pub routes: usize,
    /// Routes whose origin could not be resolved.
    pub skipped: usize,
}

/// Feeds `observations` into `db`, in order, skipping prefixes whose
/// country is not in `countries`.
pub fn classify<'a>(
    catalog: &ResourceCatalog,
    countries: &BTreeSet<CountryCode>,
    observations: impl IntoIterator<Item = &'a Observation>,
    db: &mut RoutingDatabase,
) -> RunStats {
    let mut stats = RunStats::default();
    for observation in observations {
        stats.observations += 1;
        let prefix_country = catalog.lookup_prefix(&observation.prefix);
        let tracked = prefix_country
            .code()
            .is_some_and(|cc| countries.contains(&cc));
        if !tracked {
            stats.untracked += 1;
            continue;
        }
        let outcome = db.add_path(
            catalog,
            observation.prefix,
            prefix_country,
            observation.as_path.as_slice(),
        );
        stats.record(outcome);
    }
    stats
}

/// Same result as [`classify`] over a fresh database, computed by
/// `workers` threads over contiguous chunks of the input.
///
/// Partial databases are merged in input order, so fields written last
/// and the anomaly log come out exactly as in a sequential run.
pub fn classify_parallel(
    catalog: &ResourceCatalog,
    countries: &BTreeSet<CountryCode>,
    observations: &[Observation],
    workers: usize,
) -> (RoutingDatabase, RunStats) {
    let workers = if workers == 0 { num_cpus::get() } else { workers }.max(1);
    let chunk_size = observations.len().div_ceil(workers).max(1);
    info!(
        observations = observations.len(),
        workers,
        chunk_size,
        "Classifying AS paths"
    );

    let partials: Vec<(RoutingDatabase, RunStats)> = thread::scope(|scope| {
        let handles: Vec<_> = observations
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                scope.spawn(move || {
                    let mut db = RoutingDatabase::new();
                    let stats = classify(catalog, countries, chunk, &mut db);
                    debug!(chunk = index, ?stats, "chunk classified");
                    (db, stats)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(partial) => partial,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut db = RoutingDatabase::with_countries(countries.iter().copied());
    let mut stats = RunStats::default();
    for (partial, partial_stats) in partials {
        db.merge(partial);
        stats += partial_stats;
    }

    info!(?stats, "Classification done");
    (db, stats)
}

/// Builds the peer tree of one exchange point whose home region is
/// `region`.
pub fn build_routing_table<'a>(
    catalog: &ResourceCatalog,
    regions: &RegionCatalog,
    region: Registry,
    observations: impl IntoIterator<Item = &'a Observation>,
) -> Result<(RoutingTable, IxpStats), Error> {
    let mut table = RoutingTable::new(region, regions.clone());
    let mut stats = IxpStats::default();
    for observation in observations {
        stats.observations += 1;
        if table.add_observation(catalog, observation)? {
            stats.routes += 1;
        } else {
            stats.skipped += 1;
        }
    }
    info!(
        peers = table.table.len(),
        routes = stats.routes,
        skipped = stats.skipped,
        "Exchange routing table built"
    );
    Ok((table, stats))
}
