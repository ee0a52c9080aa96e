//! Chargement des régions depuis GeoJSON
//!
//! Chaque feature d'une FeatureCollection donne une région: l'identifiant est lu
//! dans une propriété (par défaut `LVL_2_ID`), la géométrie doit être un
//! Polygon ou un MultiPolygon.

use std::fs;
use std::path::{Path, PathBuf};

use ::geojson::{GeoJson, JsonValue};
use geo::{Geometry, MultiPolygon};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::{GeometrySource, Region};
use crate::error::GeometryLoadError;

/// Propriété portant l'identifiant du comté dans les jeux de données usuels
pub const DEFAULT_ID_PROPERTY: &str = "LVL_2_ID";

/// Parse une FeatureCollection GeoJSON en régions
///
/// `origin` sert uniquement aux messages d'erreur.
pub fn parse_regions(
    text: &str,
    origin: &str,
    id_property: &str,
) -> Result<Vec<Region>, GeometryLoadError> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: ::geojson::Error| GeometryLoadError::format(origin, e.to_string()))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(GeometryLoadError::format(
                origin,
                "expected a FeatureCollection, found a bare Geometry",
            ))
        }
    };

    let mut regions = Vec::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let id = match feature.property(id_property) {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => {
                return Err(GeometryLoadError::missing_attribute(
                    origin,
                    index,
                    id_property,
                ))
            }
        };

        let Some(geometry) = feature.geometry else {
            return Err(GeometryLoadError::missing_attribute(origin, index, "geometry"));
        };

        let geometry = Geometry::<f64>::try_from(geometry).map_err(|e| {
            GeometryLoadError::format(origin, format!("feature {}: {}", id, e))
        })?;

        regions.push(Region {
            geometry: into_multi_polygon(&id, geometry)?,
            id,
        });
    }

    if regions.is_empty() {
        warn!(origin = origin, "Geometry source contains no regions");
    }

    Ok(regions)
}

/// Normalise Polygon / MultiPolygon en MultiPolygon
fn into_multi_polygon(
    id: &str,
    geometry: Geometry<f64>,
) -> Result<MultiPolygon<f64>, GeometryLoadError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        other => Err(GeometryLoadError::UnsupportedGeometry {
            id: id.to_string(),
            kind: geometry_kind(&other).to_string(),
        }),
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn read_regions(path: &Path, id_property: &str) -> Result<Vec<Region>, GeometryLoadError> {
    let text = fs::read_to_string(path).map_err(|source| GeometryLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_regions(&text, &path.display().to_string(), id_property)
}

/// Fichier GeoJSON sur disque
#[derive(Debug, Clone)]
pub struct GeoJsonFile {
    path: PathBuf,
    id_property: String,
}

impl GeoJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
        }
    }

    /// Change la propriété lue comme identifiant de région
    pub fn with_id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = property.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GeometrySource for GeoJsonFile {
    fn load(&mut self) -> Result<Vec<Region>, GeometryLoadError> {
        read_regions(&self.path, &self.id_property)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// GeoJSON embarqué (ex: `include_bytes!`), extrait dans un répertoire temporaire
///
/// L'extraction a lieu au premier `load`; `release` supprime le répertoire.
#[derive(Debug)]
pub struct BundledGeoJson {
    name: String,
    data: Vec<u8>,
    id_property: String,
    extracted: Option<TempDir>,
}

impl BundledGeoJson {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
            extracted: None,
        }
    }

    pub fn with_id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = property.into();
        self
    }

    /// Chemin du fichier extrait, tant qu'il n'a pas été libéré
    pub fn extracted_path(&self) -> Option<PathBuf> {
        self.extracted
            .as_ref()
            .map(|dir| dir.path().join(format!("{}.geojson", self.name)))
    }

    fn extract(&mut self) -> Result<PathBuf, GeometryLoadError> {
        if let Some(path) = self.extracted_path() {
            return Ok(path);
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", self.name))
            .tempdir()
            .map_err(|source| GeometryLoadError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let path = dir.path().join(format!("{}.geojson", self.name));
        fs::write(&path, &self.data).map_err(|source| GeometryLoadError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), bytes = self.data.len(), "Extracted bundled geometry");
        self.extracted = Some(dir);
        Ok(path)
    }
}

impl GeometrySource for BundledGeoJson {
    fn load(&mut self) -> Result<Vec<Region>, GeometryLoadError> {
        let path = self.extract()?;
        read_regions(&path, &self.id_property)
    }

    fn release(&mut self) {
        if let Some(dir) = self.extracted.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "Removed extracted geometry"),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    fn describe(&self) -> String {
        format!("bundled:{}", self.name)
    }
}

impl Drop for BundledGeoJson {
    fn drop(&mut self) {
        self.release();
    }
}
