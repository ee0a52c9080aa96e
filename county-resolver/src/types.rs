//! Types de données pour le crate county-resolver

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ClassificationTaskError, ResolutionError};

/// Un point longitude/latitude (x = longitude, y = latitude)
pub type Point = geo::Coord<f64>;

/// Comptage final: identifiant de région -> nombre de points contenus
pub type ResultMap = HashMap<String, u64>;

/// Nombre de workers par défaut
pub const DEFAULT_WORKER_COUNT: usize = 100;

/// Taille de batch par défaut
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Groupe de points traité comme une unité de travail
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Numéro d'ordre d'émission (à partir de 0)
    pub sequence: u64,

    /// Points dans l'ordre d'arrivée
    pub points: Vec<Point>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Configuration d'un resolver, fixée à la construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Nombre de workers concurrents
    pub worker_count: usize,

    /// Nombre de points par batch
    pub batch_size: usize,

    /// Escalader les échecs de batch en échec du run
    pub strict: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            strict: false,
        }
    }
}

impl ResolverConfig {
    pub fn new(worker_count: usize, batch_size: usize) -> Self {
        Self {
            worker_count,
            batch_size,
            ..Default::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Vérifie que les paramètres sont utilisables
    pub fn validate(&self) -> Result<(), ResolutionError> {
        if self.worker_count == 0 {
            return Err(ResolutionError::InvalidConfig(
                "worker_count must be greater than 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ResolutionError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Résultat d'un run terminé
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Comptage par région (seules les régions avec au moins un point)
    pub counts: ResultMap,

    /// Nombre de points tirés de la source
    pub points_consumed: u64,

    /// Nombre de batches soumis
    pub batches: u64,

    /// Nombre de régions chargées
    pub region_count: usize,

    /// Empreinte blake3 des régions utilisées
    pub fingerprint: String,

    /// Batches en échec (non fatals hors mode strict)
    pub task_errors: Vec<ClassificationTaskError>,
}

impl Resolution {
    /// Somme des comptages (peut excéder le nombre de points si des régions se chevauchent)
    pub fn resolved_total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Vrai si des batches ont échoué
    pub fn has_warnings(&self) -> bool {
        !self.task_errors.is_empty()
    }

    pub fn count(&self, region: &str) -> u64 {
        self.counts.get(region).copied().unwrap_or(0)
    }
}

/// Signal d'annulation partagé entre l'appelant et le run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demande l'arrêt: plus aucun point n'est tiré, les batches en vol se terminent
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
