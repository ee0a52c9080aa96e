//! Rapport de run
//!
//! Collecte les comptages, le débit et les échecs d'un run `resolve`, puis les
//! affiche ou les sérialise en JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use county_resolver::{ClassificationTaskError, Resolution, ResolutionError};
use serde::Serialize;

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Tous les batches classifiés
    Success,
    /// Résultat produit, certains batches en échec
    PartialSuccess,
    /// Aucun résultat
    Failed,
}

/// Niveau de sévérité des erreurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Run abandonné
    Fatal,
    /// Batch ignoré
    Error,
}

/// Erreur de run avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub level: ErrorLevel,
    /// Numéro du batch concerné (optionnel)
    pub batch: Option<u64>,
    pub message: String,
}

/// Rapport complet d'un run
#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    /// Fichier de régions
    pub regions_source: String,
    /// Fichier de points
    pub points_source: String,
    pub duration_secs: f64,
    pub status: RunStatus,

    pub worker_count: usize,
    pub batch_size: usize,
    pub region_count: usize,
    /// Empreinte blake3 des régions
    pub fingerprint: String,

    /// Points tirés de la source
    pub points_read: u64,
    /// Somme des comptages par région
    pub points_resolved: u64,
    pub batches: u64,
    pub failed_batches: usize,

    /// Comptage par région, trié par identifiant
    pub by_region: BTreeMap<String, u64>,

    pub errors: Vec<RunError>,
}

impl ResolveReport {
    pub fn new(regions_source: &str, points_source: &str) -> Self {
        Self {
            regions_source: regions_source.to_string(),
            points_source: points_source.to_string(),
            duration_secs: 0.0,
            status: RunStatus::Success,
            worker_count: 0,
            batch_size: 0,
            region_count: 0,
            fingerprint: String::new(),
            points_read: 0,
            points_resolved: 0,
            batches: 0,
            failed_batches: 0,
            by_region: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Paramètres du moteur utilisés pour le run
    pub fn record_config(&mut self, worker_count: usize, batch_size: usize) {
        self.worker_count = worker_count;
        self.batch_size = batch_size;
    }

    /// Enregistre le résultat d'un run terminé
    pub fn record_resolution(&mut self, resolution: &Resolution) {
        self.region_count = resolution.region_count;
        self.fingerprint = resolution.fingerprint.clone();
        self.points_read = resolution.points_consumed;
        self.points_resolved = resolution.resolved_total();
        self.batches = resolution.batches;
        self.by_region = resolution
            .counts
            .iter()
            .map(|(id, count)| (id.clone(), *count))
            .collect();

        for failure in &resolution.task_errors {
            self.record_task_error(failure);
        }
    }

    /// Enregistre un batch en échec
    pub fn record_task_error(&mut self, failure: &ClassificationTaskError) {
        self.failed_batches += 1;
        self.errors.push(RunError {
            level: ErrorLevel::Error,
            batch: Some(failure.batch()),
            message: failure.to_string(),
        });
    }

    /// Enregistre l'échec du run
    pub fn record_failure(&mut self, error: &ResolutionError) {
        match error {
            ResolutionError::TaskFailures { failures } => {
                for failure in failures {
                    self.record_task_error(failure);
                }
                self.points_read = 0;
            }
            ResolutionError::PointSource { consumed, .. }
            | ResolutionError::Cancelled { consumed } => {
                self.points_read = *consumed;
            }
            _ => {}
        }
        self.by_region.clear();
        self.points_resolved = 0;
        self.errors.push(RunError {
            level: ErrorLevel::Fatal,
            batch: None,
            message: error.to_string(),
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final basé sur les erreurs
    pub fn finalize(&mut self) {
        let has_fatal = self.errors.iter().any(|e| e.level == ErrorLevel::Fatal);

        self.status = if has_fatal {
            RunStatus::Failed
        } else if self.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };
    }

    /// Points résolus / points lus (0 si rien n'a été lu)
    pub fn resolved_fraction(&self) -> f64 {
        if self.points_read == 0 {
            0.0
        } else {
            self.points_resolved as f64 / self.points_read as f64
        }
    }

    /// Points résolus par seconde
    pub fn rate_per_sec(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.points_resolved as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Vérifie les seuils de qualité et de débit
    pub fn check_thresholds(&self, min_fraction: Option<f64>, min_rate: Option<f64>) -> Result<()> {
        if let Some(min) = min_fraction {
            let fraction = self.resolved_fraction();
            if fraction < min {
                anyhow::bail!(
                    "Resolved fraction {:.3} below threshold {:.3} ({} of {} points)",
                    fraction,
                    min,
                    self.points_resolved,
                    self.points_read
                );
            }
        }
        if let Some(min) = min_rate {
            let rate = self.rate_per_sec();
            if rate < min {
                anyhow::bail!("Throughput {:.0} points/s below threshold {:.0}", rate, min);
            }
        }
        Ok(())
    }

    /// Affiche le rapport sur la console
    pub fn display(&self, top: usize) {
        println!("\n{}", "=".repeat(60));
        println!("RESOLVE REPORT - {}", self.points_source);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Regions: {} loaded from {} (fingerprint {})",
            self.region_count,
            self.regions_source,
            short_fingerprint(&self.fingerprint)
        );
        println!(
            "Engine: {} workers, batches of {}",
            self.worker_count, self.batch_size
        );
        println!(
            "Points: {} read, {} resolved ({:.1}%), {} batches, {} failed",
            self.points_read,
            self.points_resolved,
            self.resolved_fraction() * 100.0,
            self.batches,
            self.failed_batches
        );
        println!("Throughput: {:.0} points/s", self.rate_per_sec());

        if !self.by_region.is_empty() {
            println!("\n--- BY REGION ({}) ---", self.by_region.len());
            let mut regions: Vec<_> = self.by_region.iter().collect();
            regions.sort_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)));
            for (id, count) in regions.iter().take(top) {
                println!("  {}: {}", id, count);
            }
            if regions.len() > top {
                println!("  ... and {} more", regions.len() - top);
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = e.batch.map(|b| format!("[batch {}]", b)).unwrap_or_default();
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} points, {} resolved in {} regions, {} errors",
            self.points_source,
            self.points_read,
            self.points_resolved,
            self.by_region.len(),
            self.errors.len()
        )
    }
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolution(counts: &[(&str, u64)], consumed: u64) -> Resolution {
        Resolution {
            counts: counts
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
            points_consumed: consumed,
            batches: 2,
            region_count: 3,
            fingerprint: "0123456789abcdef".to_string(),
            task_errors: Vec::new(),
        }
    }

    fn failed_batch(batch: u64) -> ClassificationTaskError {
        ClassificationTaskError::Panicked {
            batch,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_record_resolution() {
        let mut report = ResolveReport::new("counties.geojson", "points.csv");
        report.record_resolution(&resolution(&[("A", 9), ("B", 9)], 41));
        report.finalize();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.points_read, 41);
        assert_eq!(report.points_resolved, 18);
        assert_eq!(report.by_region.get("A"), Some(&9));
        assert_eq!(report.region_count, 3);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = ResolveReport::new("r", "p");
        let mut res = resolution(&[("A", 5)], 10);
        res.task_errors.push(failed_batch(1));
        report.record_resolution(&res);
        report.finalize();

        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.errors[0].batch, Some(1));
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = ResolveReport::new("r", "p");
        report.record_failure(&ResolutionError::Cancelled { consumed: 30 });
        report.finalize();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.points_read, 30);
        assert!(report.by_region.is_empty());
    }

    #[test]
    fn test_strict_failure_lists_batches() {
        let mut report = ResolveReport::new("r", "p");
        report.record_failure(&ResolutionError::TaskFailures {
            failures: vec![failed_batch(3), failed_batch(7)],
        });
        report.finalize();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_batches, 2);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_resolved_fraction_and_rate() {
        let mut report = ResolveReport::new("r", "p");
        assert_eq!(report.resolved_fraction(), 0.0);
        assert_eq!(report.rate_per_sec(), 0.0);

        report.record_resolution(&resolution(&[("A", 90)], 100));
        report.set_duration(Duration::from_millis(500));
        assert!((report.resolved_fraction() - 0.9).abs() < 1e-12);
        assert!((report.rate_per_sec() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_thresholds() {
        let mut report = ResolveReport::new("r", "p");
        report.record_resolution(&resolution(&[("A", 95)], 100));
        report.set_duration(Duration::from_secs(1));

        assert!(report.check_thresholds(Some(0.9), Some(50.0)).is_ok());
        assert!(report.check_thresholds(None, None).is_ok());

        let err = report.check_thresholds(Some(0.99), None).unwrap_err();
        assert!(err.to_string().contains("Resolved fraction"));

        let err = report.check_thresholds(None, Some(5000.0)).unwrap_err();
        assert!(err.to_string().contains("Throughput"));
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = ResolveReport::new("r", "p");
        report.record_resolution(&resolution(&[("B", 2), ("A", 1)], 3));
        report.finalize();
        report.save_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "Success");
        assert_eq!(value["by_region"]["A"], 1);
        assert_eq!(value["points_read"], 3);
    }

    #[test]
    fn test_summary() {
        let mut report = ResolveReport::new("r", "points.csv");
        report.record_resolution(&resolution(&[("A", 9), ("B", 9)], 41));

        let summary = report.summary();
        assert!(summary.contains("points.csv"));
        assert!(summary.contains("18 resolved in 2 regions"));
    }

    #[test]
    fn test_short_fingerprint() {
        assert_eq!(short_fingerprint("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_fingerprint("abc"), "abc");
    }
}
