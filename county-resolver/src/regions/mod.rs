//! Régions (comtés) et leurs géométries
//!
//! Un [`RegionSet`] est construit une fois par run depuis une [`GeometrySource`],
//! puis partagé en lecture seule par tous les workers.

pub mod index;
pub mod loader;

use std::collections::HashMap;

use blake3::Hasher;
use geo::{LineString, MultiPolygon};

use crate::error::GeometryLoadError;

pub use self::index::{BruteForceIndex, ContainmentIndex};
pub use self::loader::{BundledGeoJson, GeoJsonFile, DEFAULT_ID_PROPERTY};

/// Une région nommée et sa géométrie (éventuellement multi-parties, avec trous)
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(id: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id: id.into(),
            geometry: geometry.into(),
        }
    }
}

/// Fournisseur de géométries de régions
///
/// `release` libère les ressources acquises par `load` (fichiers temporaires);
/// doit pouvoir être appelé plusieurs fois, y compris sans `load` préalable.
pub trait GeometrySource: Send {
    /// Charge toutes les régions
    fn load(&mut self) -> Result<Vec<Region>, GeometryLoadError>;

    /// Libère les ressources temporaires
    fn release(&mut self) {}

    /// Description courte pour les logs
    fn describe(&self) -> String;
}

impl<G: GeometrySource + ?Sized> GeometrySource for Box<G> {
    fn load(&mut self) -> Result<Vec<Region>, GeometryLoadError> {
        (**self).load()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Régions déjà parsées, en mémoire
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegions {
    regions: Vec<Region>,
}

impl InMemoryRegions {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl GeometrySource for InMemoryRegions {
    fn load(&mut self) -> Result<Vec<Region>, GeometryLoadError> {
        Ok(self.regions.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory ({} regions)", self.regions.len())
    }
}

/// Ensemble immuable identifiant -> géométrie
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    by_id: HashMap<String, usize>,
}

impl RegionSet {
    /// Charge les régions depuis une source
    pub fn load<G: GeometrySource + ?Sized>(source: &mut G) -> Result<Self, GeometryLoadError> {
        Self::from_regions(source.load()?)
    }

    /// Construit l'ensemble en refusant les identifiants dupliqués
    pub fn from_regions(
        regions: impl IntoIterator<Item = Region>,
    ) -> Result<Self, GeometryLoadError> {
        let mut set = Self::default();
        for region in regions {
            if set.by_id.contains_key(&region.id) {
                return Err(GeometryLoadError::DuplicateRegion(region.id));
            }
            set.by_id.insert(region.id.clone(), set.regions.len());
            set.regions.push(region);
        }
        Ok(set)
    }

    /// Itère sur les paires (identifiant, géométrie)
    pub fn regions(&self) -> impl Iterator<Item = (&str, &MultiPolygon<f64>)> + '_ {
        self.regions.iter().map(|r| (r.id.as_str(), &r.geometry))
    }

    pub fn get(&self, id: &str) -> Option<&MultiPolygon<f64>> {
        self.by_id.get(id).map(|&idx| &self.regions[idx].geometry)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Région par position d'insertion
    pub(crate) fn region_at(&self, idx: usize) -> &Region {
        &self.regions[idx]
    }

    /// Empreinte blake3 du contenu, indépendante de l'ordre de chargement
    ///
    /// Deux chargements de la même source donnent la même empreinte.
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<&String> = self.by_id.keys().collect();
        ids.sort();

        let mut hasher = Hasher::new();
        for id in ids {
            hasher.update(b"REGION");
            hasher.update(&(id.len() as u64).to_le_bytes());
            hasher.update(id.as_bytes());
            for polygon in &self.regions[self.by_id[id]].geometry {
                hasher.update(b"POLY");
                hash_ring(&mut hasher, polygon.exterior());
                for interior in polygon.interiors() {
                    hasher.update(b"INT");
                    hash_ring(&mut hasher, interior);
                }
            }
        }

        hasher.finalize().to_hex().to_string()
    }
}

/// Hash exact des coordonnées (bits IEEE, sans arrondi)
fn hash_ring(hasher: &mut Hasher, ring: &LineString<f64>) {
    hasher.update(&(ring.0.len() as u64).to_le_bytes());
    for coord in &ring.0 {
        hasher.update(&coord.x.to_bits().to_le_bytes());
        hasher.update(&coord.y.to_bits().to_le_bytes());
    }
}

/// Carré axis-aligned, pratique pour les tests et benchmarks
pub fn square(x: f64, y: f64, side: f64) -> MultiPolygon<f64> {
    let ring = LineString::from(vec![
        (x, y),
        (x + side, y),
        (x + side, y + side),
        (x, y + side),
        (x, y),
    ]);
    MultiPolygon::new(vec![geo::Polygon::new(ring, vec![])])
}
