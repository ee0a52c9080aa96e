//! Définition et implémentation des commandes CLI
//!
//! - `resolve`: régions GeoJSON + points CSV → comptage par région
//! - `inspect`: contrôle d'un fichier de régions

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use county_resolver::{CountyResolver, CsvPointSource, GeoJsonFile, RegionSet};
use county_resolver_cli::{ResolveReport, ResolverSettings};
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum Commands {
    /// Count points per county
    Resolve(ResolveArgs),

    /// Load a region file and print its summary
    Inspect {
        /// Path to the GeoJSON region file
        #[arg(short, long)]
        regions: PathBuf,

        /// Feature property holding the region id (défaut: LVL_2_ID)
        #[arg(long)]
        id_property: Option<String>,

        /// Print every region id
        #[arg(long)]
        list: bool,
    },
}

/// Arguments de la commande `resolve`
///
/// Les options absentes gardent la valeur du fichier `--config` ou de
/// l'environnement.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the GeoJSON region file (FeatureCollection of Polygon/MultiPolygon)
    #[arg(short, long)]
    pub regions: PathBuf,

    /// Path to the CSV points file (longitude,latitude per line)
    #[arg(short, long)]
    pub points: PathBuf,

    /// JSON settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Feature property holding the region id (défaut: LVL_2_ID)
    #[arg(long)]
    pub id_property: Option<String>,

    /// Number of classification threads (défaut: env COUNTY_RESOLVER_WORKERS / 100)
    #[arg(long, alias = "threads")]
    pub workers: Option<usize>,

    /// Points per batch (défaut: env COUNTY_RESOLVER_BATCH_SIZE / 1000)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Fail the run if any batch fails
    #[arg(long)]
    pub strict: bool,

    /// CSV columns are latitude,longitude
    #[arg(long)]
    pub lat_first: bool,

    /// Skip the first CSV line
    #[arg(long)]
    pub has_header: bool,

    /// CSV delimiter: a single ASCII character, or "tab"
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// Save the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Fail if resolved points / points read is below this value
    #[arg(long)]
    pub min_resolved_fraction: Option<f64>,

    /// Fail if throughput (resolved points per second) is below this value
    #[arg(long)]
    pub min_rate: Option<f64>,

    /// Number of regions shown in the console report
    #[arg(long, default_value_t = 20)]
    pub top: usize,
}

impl ResolveArgs {
    /// Paramètres effectifs: défaut, fichier, environnement, puis flags
    pub fn settings(&self) -> Result<ResolverSettings> {
        let mut settings = match &self.config {
            Some(path) => ResolverSettings::load(path)?,
            None => ResolverSettings::default(),
        };
        settings.apply_env()?;
        self.apply_overrides(&mut settings);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut ResolverSettings) {
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(ref property) = self.id_property {
            settings.id_property = property.clone();
        }
        if let Some(delimiter) = self.delimiter {
            settings.delimiter = delimiter;
        }
        if self.min_resolved_fraction.is_some() {
            settings.min_resolved_fraction = self.min_resolved_fraction;
        }
        if self.min_rate.is_some() {
            settings.min_rate = self.min_rate;
        }
        settings.strict |= self.strict;
        settings.lat_first |= self.lat_first;
        settings.has_header |= self.has_header;
    }
}

/// Exécute la commande resolve
pub fn cmd_resolve(args: ResolveArgs) -> Result<()> {
    let settings = args.settings()?;
    let config = settings.resolver_config()?;
    let csv_options = settings.csv_options()?;

    info!(
        workers = config.worker_count,
        batch_size = config.batch_size,
        strict = config.strict,
        id_property = %settings.id_property,
        "Resolver settings"
    );

    let geometry = GeoJsonFile::new(&args.regions).with_id_property(settings.id_property.clone());
    let mut resolver =
        CountyResolver::new(config, geometry).context("Failed to create resolver")?;

    let mut points = CsvPointSource::open(&args.points, csv_options)
        .with_context(|| format!("Failed to open points file: {}", args.points.display()))?;

    let mut report = ResolveReport::new(
        &args.regions.display().to_string(),
        &args.points.display().to_string(),
    );
    report.record_config(config.worker_count, config.batch_size);

    let start = Instant::now();
    let outcome = resolver.resolve(&mut points);
    report.set_duration(start.elapsed());
    resolver.close();

    match &outcome {
        Ok(resolution) => report.record_resolution(resolution),
        Err(e) => report.record_failure(e),
    }
    report.finalize();
    report.display(args.top);

    if let Some(ref path) = args.report {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }

    let resolution = outcome.context("Resolution failed")?;
    if resolution.has_warnings() {
        warn!(
            failed_batches = resolution.task_errors.len(),
            "Some batches were not classified"
        );
    }

    report.check_thresholds(settings.min_resolved_fraction, settings.min_rate)?;
    info!("{}", report.summary());

    Ok(())
}

/// Exécute la commande inspect
pub fn cmd_inspect(path: &Path, id_property: Option<String>, list: bool) -> Result<()> {
    let mut source = GeoJsonFile::new(path);
    if let Some(property) = id_property {
        source = source.with_id_property(property);
    }

    let start = Instant::now();
    let regions = RegionSet::load(&mut source)
        .with_context(|| format!("Failed to load regions: {}", path.display()))?;
    let elapsed = start.elapsed();

    let polygons: usize = regions.regions().map(|(_, geometry)| geometry.0.len()).sum();

    println!("File: {}", path.display());
    println!("Regions: {}", regions.len());
    println!("Polygons: {}", polygons);
    println!("Fingerprint: {}", regions.fingerprint());
    println!("Loaded in {:.2}s", elapsed.as_secs_f64());

    if list {
        let mut ids: Vec<(&str, usize)> = regions
            .regions()
            .map(|(id, geometry)| (id, geometry.0.len()))
            .collect();
        ids.sort_unstable();
        for (id, parts) in ids {
            println!("  {} ({} polygon{})", id, parts, if parts > 1 { "s" } else { "" });
        }
    }

    Ok(())
}

/// Parse un séparateur CSV: un caractère ASCII, `tab` ou `\t`
fn parse_delimiter(raw: &str) -> Result<char, String> {
    match raw {
        "tab" | "\\t" | "\t" => return Ok('\t'),
        _ => {}
    }

    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(format!(
            "Invalid delimiter: {:?}. Use a single ASCII character or \"tab\"",
            raw
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ResolveArgs,
    }

    fn parse(argv: &[&str]) -> ResolveArgs {
        let mut full = vec!["test", "--regions", "r.geojson", "--points", "p.csv"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), ',');
        assert_eq!(parse_delimiter(";").unwrap(), ';');
        assert_eq!(parse_delimiter("tab").unwrap(), '\t');
        assert_eq!(parse_delimiter("\\t").unwrap(), '\t');
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter(",,").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let args = parse(&[
            "--workers",
            "4",
            "--batch-size",
            "50",
            "--strict",
            "--lat-first",
            "--delimiter",
            ";",
            "--min-rate",
            "5000",
        ]);

        let mut settings = ResolverSettings {
            workers: 32,
            min_resolved_fraction: Some(0.9),
            ..Default::default()
        };
        args.apply_overrides(&mut settings);

        assert_eq!(settings.workers, 4);
        assert_eq!(settings.batch_size, 50);
        assert!(settings.strict);
        assert!(settings.lat_first);
        assert!(!settings.has_header);
        assert_eq!(settings.delimiter, ';');
        assert_eq!(settings.min_rate, Some(5000.0));
        // Non fourni en flag: valeur du fichier conservée
        assert_eq!(settings.min_resolved_fraction, Some(0.9));
    }

    #[test]
    fn test_absent_flags_keep_settings() {
        let args = parse(&[]);
        let mut settings = ResolverSettings {
            workers: 12,
            strict: true,
            id_property: "GEOID".to_string(),
            ..Default::default()
        };
        args.apply_overrides(&mut settings);

        assert_eq!(settings.workers, 12);
        assert!(settings.strict);
        assert_eq!(settings.id_property, "GEOID");
        assert_eq!(args.top, 20);
    }

    #[test]
    fn test_invalid_delimiter_rejected_by_parser() {
        let result = TestCli::try_parse_from([
            "test",
            "--regions",
            "r.geojson",
            "--points",
            "p.csv",
            "--delimiter",
            "ab",
        ]);
        assert!(result.is_err());
    }
}
