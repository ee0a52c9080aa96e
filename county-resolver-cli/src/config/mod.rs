//! Configuration du run
//!
//! Ordre de priorité: valeurs par défaut, fichier JSON (`--config`),
//! variables d'environnement `COUNTY_RESOLVER_*` (`.env` inclus), puis flags CLI.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use county_resolver::regions::DEFAULT_ID_PROPERTY;
use county_resolver::types::{DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT};
use county_resolver::{CoordinateOrder, CsvOptions, ResolverConfig};
use serde::{Deserialize, Serialize};

pub const ENV_WORKERS: &str = "COUNTY_RESOLVER_WORKERS";
pub const ENV_BATCH_SIZE: &str = "COUNTY_RESOLVER_BATCH_SIZE";
pub const ENV_STRICT: &str = "COUNTY_RESOLVER_STRICT";

/// Paramètres d'un run `resolve`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// Nombre de threads de classification
    pub workers: usize,

    /// Nombre de points par batch
    pub batch_size: usize,

    /// Un batch en échec fait échouer le run
    pub strict: bool,

    /// Propriété GeoJSON portant l'identifiant de région
    pub id_property: String,

    /// Séparateur CSV (un caractère ASCII)
    pub delimiter: char,

    /// Colonnes `latitude,longitude` au lieu de `longitude,latitude`
    pub lat_first: bool,

    /// Première ligne du CSV = en-tête
    pub has_header: bool,

    /// Seuil minimal de points résolus / points lus
    pub min_resolved_fraction: Option<f64>,

    /// Seuil minimal de débit (points résolus par seconde)
    pub min_rate: Option<f64>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            strict: false,
            id_property: DEFAULT_ID_PROPERTY.to_string(),
            delimiter: ',',
            lat_first: false,
            has_header: false,
            min_resolved_fraction: None,
            min_rate: None,
        }
    }
}

impl ResolverSettings {
    /// Charge les paramètres depuis un fichier JSON (champs absents = défaut)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Paramètres par défaut surchargés par l'environnement
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    /// Applique les variables `COUNTY_RESOLVER_*` du process
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Applique des variables lues via `lookup` (absentes ou vides = ignorées)
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_WORKERS) {
            self.workers = parse_var(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = value(ENV_BATCH_SIZE) {
            self.batch_size = parse_var(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = value(ENV_STRICT) {
            self.strict = parse_bool(&raw)
                .with_context(|| format!("Invalid value for {}: {}", ENV_STRICT, raw))?;
        }
        Ok(())
    }

    /// Configuration du moteur (validée)
    pub fn resolver_config(&self) -> Result<ResolverConfig> {
        let config = ResolverConfig::new(self.workers, self.batch_size).strict(self.strict);
        config.validate().context("Invalid resolver settings")?;
        Ok(config)
    }

    /// Options de lecture du CSV de points
    pub fn csv_options(&self) -> Result<CsvOptions> {
        if !self.delimiter.is_ascii() {
            anyhow::bail!("CSV delimiter must be an ASCII character, got {:?}", self.delimiter);
        }

        Ok(CsvOptions {
            delimiter: self.delimiter as u8,
            order: if self.lat_first {
                CoordinateOrder::LatLon
            } else {
                CoordinateOrder::LonLat
            },
            has_header: self.has_header,
        })
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", name, raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = ResolverSettings::default();
        assert_eq!(settings.workers, 100);
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.id_property, "LVL_2_ID");
        assert!(!settings.strict);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.json");
        std::fs::write(&path, r#"{"workers": 8, "delimiter": ";", "min_rate": 5000}"#).unwrap();

        let settings = ResolverSettings::load(&path).unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.delimiter, ';');
        assert_eq!(settings.min_rate, Some(5000.0));
    }

    #[test]
    fn test_load_rejects_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.json");
        std::fs::write(&path, r#"{"threads": 8}"#).unwrap();

        assert!(ResolverSettings::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ResolverSettings::load(Path::new("/nonexistent/resolver.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_apply_vars() {
        let env = vars(&[
            (ENV_WORKERS, "16"),
            (ENV_BATCH_SIZE, " 250 "),
            (ENV_STRICT, "yes"),
        ]);
        let mut settings = ResolverSettings::default();
        settings.apply_vars(|k| env.get(k).cloned()).unwrap();

        assert_eq!(settings.workers, 16);
        assert_eq!(settings.batch_size, 250);
        assert!(settings.strict);
    }

    #[test]
    fn test_apply_vars_ignores_empty() {
        let env = vars(&[(ENV_WORKERS, "")]);
        let mut settings = ResolverSettings::default();
        settings.apply_vars(|k| env.get(k).cloned()).unwrap();
        assert_eq!(settings.workers, 100);
    }

    #[test]
    fn test_apply_vars_invalid() {
        let env = vars(&[(ENV_BATCH_SIZE, "lots")]);
        let mut settings = ResolverSettings::default();
        let err = settings.apply_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains(ENV_BATCH_SIZE));

        let env = vars(&[(ENV_STRICT, "maybe")]);
        assert!(settings.apply_vars(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_resolver_config_validation() {
        let settings = ResolverSettings {
            workers: 0,
            ..Default::default()
        };
        assert!(settings.resolver_config().is_err());

        let config = ResolverSettings {
            strict: true,
            ..Default::default()
        }
        .resolver_config()
        .unwrap();
        assert!(config.strict);
        assert_eq!(config.worker_count, 100);
    }

    #[test]
    fn test_csv_options() {
        let settings = ResolverSettings {
            delimiter: ';',
            lat_first: true,
            has_header: true,
            ..Default::default()
        };
        let options = settings.csv_options().unwrap();
        assert_eq!(options.delimiter, b';');
        assert_eq!(options.order, CoordinateOrder::LatLon);
        assert!(options.has_header);

        let settings = ResolverSettings {
            delimiter: '§',
            ..Default::default()
        };
        assert!(settings.csv_options().is_err());
    }
}
