//! Accumulateur concurrent des comptages par région
//!
//! Map shardée (`DashMap`) de compteurs atomiques: deux régions différentes ne
//! se bloquent pas mutuellement, et l'incrément d'une région existante ne prend
//! qu'un verrou de lecture sur son shard. La création d'une entrée passe par
//! l'API `entry`, sous verrou d'écriture du shard: deux premiers incréments
//! concurrents pour la même région ne peuvent pas se perdre.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::classify::PartialCounts;
use crate::types::ResultMap;

/// Comptages partagés entre workers
#[derive(Debug, Default)]
pub struct ResultAggregator {
    counts: DashMap<String, AtomicU64>,
    merged_batches: AtomicU64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute `delta` au compteur d'une région (créé à la première contribution)
    pub fn add(&self, region: &str, delta: u64) {
        if delta == 0 {
            return;
        }
        if let Some(counter) = self.counts.get(region) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counts
            .entry(region.to_string())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Fusionne les incréments d'un batch
    pub fn merge(&self, partial: PartialCounts) {
        for (region, delta) in &partial {
            self.add(region, *delta);
        }
        self.merged_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Nombre de batches fusionnés
    pub fn merged_batches(&self) -> u64 {
        self.merged_batches.load(Ordering::Relaxed)
    }

    pub fn get(&self, region: &str) -> u64 {
        self.counts
            .get(region)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Instantané final, à appeler une fois tous les workers terminés
    pub fn finalize(&self) -> ResultMap {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect()
    }
}
