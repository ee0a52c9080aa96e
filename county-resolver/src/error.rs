//! Types d'erreurs pour le crate county-resolver

use std::path::PathBuf;

use thiserror::Error;

/// Erreurs lors du chargement des géométries des régions
///
/// Toujours fatales: le run est abandonné avant toute classification.
#[derive(Debug, Error)]
pub enum GeometryLoadError {
    /// Fichier de géométries introuvable ou illisible
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Contenu non parsable
    #[error("Invalid geometry source {origin}: {reason}")]
    Format { origin: String, reason: String },

    /// Attribut obligatoire absent (identifiant ou géométrie)
    #[error("Feature #{index} in {origin} is missing required attribute '{attribute}'")]
    MissingAttribute {
        origin: String,
        index: usize,
        attribute: String,
    },

    /// Géométrie non polygonale
    #[error("Region {id}: unsupported geometry type {kind} (expected Polygon or MultiPolygon)")]
    UnsupportedGeometry { id: String, kind: String },

    /// Deux régions avec le même identifiant
    #[error("Duplicate region identifier: {0}")]
    DuplicateRegion(String),
}

impl GeometryLoadError {
    /// Crée une erreur de format avec contexte
    pub fn format(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'attribut manquant
    pub fn missing_attribute(
        origin: impl Into<String>,
        index: usize,
        attribute: impl Into<String>,
    ) -> Self {
        Self::MissingAttribute {
            origin: origin.into(),
            index,
            attribute: attribute.into(),
        }
    }
}

/// Erreurs remontées par une source de points
#[derive(Debug, Error)]
pub enum PointSourceError {
    /// Erreur d'I/O sur le flux sous-jacent
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ligne non interprétable comme un point
    #[error("Malformed point at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    /// Échec générique d'un fournisseur de points
    #[error("Point source failed: {0}")]
    Failed(String),
}

impl PointSourceError {
    /// Crée une erreur de ligne mal formée
    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Échec de la classification d'un batch
///
/// Récupérable: la contribution du batch est ignorée, les autres continuent.
#[derive(Debug, Clone, Error)]
pub enum ClassificationTaskError {
    /// Point avec une coordonnée non finie (NaN, infini)
    #[error("Batch {batch}: malformed point #{offset} ({x}, {y})")]
    MalformedPoint {
        batch: u64,
        offset: usize,
        x: f64,
        y: f64,
    },

    /// Panique pendant l'évaluation
    #[error("Batch {batch}: worker panicked: {message}")]
    Panicked { batch: u64, message: String },
}

impl ClassificationTaskError {
    /// Numéro de séquence du batch en échec
    pub fn batch(&self) -> u64 {
        match self {
            Self::MalformedPoint { batch, .. } | Self::Panicked { batch, .. } => *batch,
        }
    }
}

/// Erreur retournée à l'appelant de `resolve()`
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Régions non chargées, aucun point classifié
    #[error("Geometry load failed: {0}")]
    GeometryLoad(#[from] GeometryLoadError),

    /// Source de points en échec pendant le streaming; les résultats partiels sont jetés
    #[error("Point source failed after {consumed} points: {source}")]
    PointSource {
        consumed: u64,
        source: PointSourceError,
    },

    /// Mode strict: au moins un batch a échoué
    #[error("{} classification task(s) failed", failures.len())]
    TaskFailures {
        failures: Vec<ClassificationTaskError>,
    },

    /// Run annulé par l'appelant
    #[error("Run cancelled after {consumed} points")]
    Cancelled { consumed: u64 },

    /// Configuration invalide
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Impossible de démarrer le pool de workers
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Resolver déjà fermé
    #[error("Resolver is closed")]
    Closed,
}

impl ResolutionError {
    /// Vrai si l'erreur est survenue avant le premier point consommé
    pub fn is_before_start(&self) -> bool {
        matches!(
            self,
            Self::GeometryLoad(_) | Self::InvalidConfig(_) | Self::WorkerPool(_) | Self::Closed
        )
    }
}
