//! # county-resolver-cli
//!
//! Outil en ligne de commande autour de `county-resolver`: compte des points
//! CSV par comté à partir d'un fichier de régions GeoJSON.
//!
//! ## Usage CLI
//!
//! ```bash
//! # Comptage par comté, rapport JSON
//! county-resolver resolve --regions ./counties.geojson --points ./locations.csv --report run.json
//!
//! # Contrôle d'un fichier de régions
//! county-resolver inspect --regions ./counties.geojson
//! ```

pub mod config;
pub mod report;

pub use config::ResolverSettings;
pub use report::{ResolveReport, RunStatus};
