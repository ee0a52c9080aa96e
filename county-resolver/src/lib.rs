//! # county-resolver
//!
//! Classification concurrente d'un flux de points longitude/latitude dans des
//! régions administratives (comtés), avec comptage par région.
//!
//! ## Features
//!
//! - Découpage du flux en batches de taille fixe, classifiés en parallèle (pool `rayon`)
//! - Contenance stricte: un point sur une frontière n'appartient à aucune des régions adjacentes
//! - Agrégation sans perte sur une map shardée de compteurs atomiques (`dashmap`)
//! - Régions GeoJSON (Polygon / MultiPolygon, trous et multi-parties supportés)
//! - Sources de points pull: itérateurs, closures, fichiers CSV (parsing `memchr` + `fast-float`)
//! - Échecs de batch isolés (mode strict optionnel), annulation coopérative
//!
//! ## Usage
//!
//! ```rust,ignore
//! use county_resolver::{CountyResolver, CsvOptions, CsvPointSource, GeoJsonFile, ResolverConfig};
//! use std::path::Path;
//!
//! let regions = GeoJsonFile::new("usa_counties.geojson");
//! let mut resolver = CountyResolver::new(ResolverConfig::default(), regions)?;
//!
//! let mut points = CsvPointSource::open(Path::new("locations.csv"), CsvOptions::default())?;
//! let resolution = resolver.resolve(&mut points)?;
//!
//! for (county, count) in &resolution.counts {
//!     println!("{}: {}", county, count);
//! }
//! resolver.close();
//! ```

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod error;
pub mod pool;
pub mod regions;
pub mod resolver;
pub mod source;
pub mod types;

pub use aggregate::ResultAggregator;
pub use batch::PointBatcher;
pub use classify::{classify, PartialCounts};
pub use error::{ClassificationTaskError, GeometryLoadError, PointSourceError, ResolutionError};
pub use pool::WorkerPool;
pub use regions::{
    BruteForceIndex, BundledGeoJson, ContainmentIndex, GeoJsonFile, GeometrySource,
    InMemoryRegions, Region, RegionSet,
};
pub use resolver::{classify_stream, CountyResolver, RunState};
pub use source::{CoordinateOrder, CsvOptions, CsvPointSource, IterSource, PointSource};
pub use types::{Batch, CancelFlag, Point, Resolution, ResolverConfig, ResultMap};

use std::sync::Arc;

/// Classe un flux contre un ensemble de régions déjà chargé
///
/// Raccourci sans gestion de source de géométries: pas d'état de run, pas de
/// ressources à libérer.
pub fn resolve<S: PointSource + ?Sized>(
    regions: Arc<RegionSet>,
    source: &mut S,
    config: &ResolverConfig,
) -> Result<Resolution, ResolutionError> {
    let fingerprint = regions.fingerprint();
    let region_count = regions.len();
    let index: Arc<dyn ContainmentIndex> = Arc::new(BruteForceIndex::new(regions));

    let mut resolution =
        classify_stream(index, source, config, &CancelFlag::new(), &mut |_| {})?;
    resolution.region_count = region_count;
    resolution.fingerprint = fingerprint;
    Ok(resolution)
}
