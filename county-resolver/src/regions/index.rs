//! Requêtes de contenance sur un ensemble de régions
//!
//! Le classifieur ne dépend que de [`ContainmentIndex`]; [`BruteForceIndex`]
//! teste chaque région avec un pré-filtre par rectangle englobant.

use std::sync::Arc;

use geo::{BoundingRect, Contains, Point as GeoPoint, Rect};

use super::RegionSet;
use crate::types::Point;

/// Quelles régions contiennent strictement un point
///
/// La contenance est stricte: un point sur la frontière d'une région n'est pas
/// dans cette région.
pub trait ContainmentIndex: Send + Sync {
    /// Nombre de régions indexées; les positions vont de 0 à `region_count() - 1`
    fn region_count(&self) -> usize;

    /// Identifiant de la région à une position
    fn region_id(&self, position: usize) -> &str;

    /// Ajoute à `hits` la position de chaque région contenant `point`
    fn containing(&self, point: Point, hits: &mut Vec<usize>);
}

/// Test exhaustif de toutes les régions
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    regions: Arc<RegionSet>,
    bounds: Vec<Option<Rect<f64>>>,
}

impl BruteForceIndex {
    pub fn new(regions: Arc<RegionSet>) -> Self {
        let bounds = (0..regions.len())
            .map(|idx| regions.region_at(idx).geometry.bounding_rect())
            .collect();
        Self { regions, bounds }
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }
}

/// Un point strictement intérieur à un polygone est strictement intérieur à son rectangle englobant
#[inline]
fn strictly_inside(rect: &Rect<f64>, point: Point) -> bool {
    point.x > rect.min().x && point.x < rect.max().x && point.y > rect.min().y && point.y < rect.max().y
}

impl ContainmentIndex for BruteForceIndex {
    fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn region_id(&self, position: usize) -> &str {
        &self.regions.region_at(position).id
    }

    fn containing(&self, point: Point, hits: &mut Vec<usize>) {
        let geo_point = GeoPoint::from(point);
        for (idx, bounds) in self.bounds.iter().enumerate() {
            // Géométrie vide
            let Some(rect) = bounds else {
                continue;
            };
            if !strictly_inside(rect, point) {
                continue;
            }
            if self.regions.region_at(idx).geometry.contains(&geo_point) {
                hits.push(idx);
            }
        }
    }
}
