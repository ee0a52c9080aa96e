//! Source de points depuis un fichier texte délimité (CSV)
//!
//! Une ligne = un point, les deux premières colonnes sont les coordonnées.
//! Lignes vides et commentaires (`#`) ignorés.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use geo::coord;
use memchr::memchr;

use super::PointSource;
use crate::error::PointSourceError;
use crate::types::Point;

/// Ordre des deux premières colonnes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordinateOrder {
    /// longitude, latitude (défaut)
    #[default]
    LonLat,
    /// latitude, longitude
    LatLon,
}

impl std::str::FromStr for CoordinateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ','], "").as_str() {
            "lonlat" | "xy" => Ok(CoordinateOrder::LonLat),
            "latlon" | "yx" => Ok(CoordinateOrder::LatLon),
            _ => Err(format!("Invalid coordinate order: {}. Use: lonlat, latlon", s)),
        }
    }
}

/// Options de lecture
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub order: CoordinateOrder,
    /// Ignorer la première ligne
    pub has_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            order: CoordinateOrder::LonLat,
            has_header: false,
        }
    }
}

/// Lecteur de points ligne à ligne
#[derive(Debug)]
pub struct CsvPointSource<R> {
    reader: R,
    options: CsvOptions,
    line: Vec<u8>,
    line_number: u64,
    points_read: u64,
    done: bool,
}

impl CsvPointSource<BufReader<File>> {
    /// Ouvre un fichier
    pub fn open(path: &Path, options: CsvOptions) -> Result<Self, PointSourceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(64 * 1024, file), options))
    }
}

impl<R: BufRead> CsvPointSource<R> {
    pub fn new(reader: R, options: CsvOptions) -> Self {
        Self {
            reader,
            options,
            line: Vec::with_capacity(64),
            line_number: 0,
            points_read: 0,
            done: false,
        }
    }

    /// Nombre de points lus jusqu'ici
    pub fn points_read(&self) -> u64 {
        self.points_read
    }

    /// Numéro de la dernière ligne lue (à partir de 1)
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

impl<R: BufRead> PointSource for CsvPointSource<R> {
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError> {
        if self.done {
            return Ok(None);
        }

        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                self.done = true;
                return Ok(None);
            }
            self.line_number += 1;

            if self.line_number == 1 && self.options.has_header {
                continue;
            }

            let line = self.line.trim_ascii();
            if line.is_empty() || line[0] == b'#' {
                continue;
            }

            let (first, second) = parse_pair(line, self.options.delimiter)
                .map_err(|reason| PointSourceError::malformed(self.line_number, reason))?;

            let point = match self.options.order {
                CoordinateOrder::LonLat => coord! { x: first, y: second },
                CoordinateOrder::LatLon => coord! { x: second, y: first },
            };
            self.points_read += 1;
            return Ok(Some(point));
        }
    }
}

/// Extrait les deux premières colonnes numériques d'une ligne
fn parse_pair(line: &[u8], delimiter: u8) -> Result<(f64, f64), String> {
    let Some(first_end) = memchr(delimiter, line) else {
        return Err(format!(
            "expected two columns in '{}'",
            String::from_utf8_lossy(line)
        ));
    };
    let rest = &line[first_end + 1..];
    let second_end = memchr(delimiter, rest).unwrap_or(rest.len());

    let first = parse_f64(&line[..first_end])?;
    let second = parse_f64(&rest[..second_end])?;
    Ok((first, second))
}

/// Parse f64 via fast-float (colonnes éventuellement entourées d'espaces ou de guillemets)
#[inline]
fn parse_f64(field: &[u8]) -> Result<f64, String> {
    let field = field.trim_ascii();
    let field = field
        .strip_prefix(b"\"")
        .and_then(|f| f.strip_suffix(b"\""))
        .unwrap_or(field);
    fast_float::parse(field)
        .map_err(|_| format!("invalid number '{}'", String::from_utf8_lossy(field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str, options: CsvOptions) -> CsvPointSource<Cursor<Vec<u8>>> {
        CsvPointSource::new(Cursor::new(text.as_bytes().to_vec()), options)
    }

    fn drain<R: BufRead>(src: &mut CsvPointSource<R>) -> Vec<Point> {
        let mut points = Vec::new();
        while let Some(p) = src.next_point().unwrap() {
            points.push(p);
        }
        points
    }

    #[test]
    fn test_parse_simple() {
        let mut src = source("-73.98,40.75\n-118.24,34.05\n", CsvOptions::default());
        let points = drain(&mut src);
        assert_eq!(points.len(), 2);
        assert!((points[0].x + 73.98).abs() < 1e-9);
        assert!((points[0].y - 40.75).abs() < 1e-9);
        assert_eq!(src.points_read(), 2);
    }

    #[test]
    fn test_header_comments_blank_lines() {
        let text = "longitude,latitude\n# commentaire\n\n1.5, 2.5\r\n  3,4  \n";
        let mut src = source(
            text,
            CsvOptions {
                has_header: true,
                ..Default::default()
            },
        );
        let points = drain(&mut src);
        assert_eq!(points, vec![coord! { x: 1.5, y: 2.5 }, coord! { x: 3.0, y: 4.0 }]);
    }

    #[test]
    fn test_lat_lon_order_and_extra_columns() {
        let mut src = source(
            "40.75;-73.98;NYC;extra\n",
            CsvOptions {
                delimiter: b';',
                order: CoordinateOrder::LatLon,
                has_header: false,
            },
        );
        let points = drain(&mut src);
        assert_eq!(points, vec![coord! { x: -73.98, y: 40.75 }]);
    }

    #[test]
    fn test_quoted_fields() {
        let mut src = source("\"1.25\",\"2.5\"\n", CsvOptions::default());
        assert_eq!(drain(&mut src), vec![coord! { x: 1.25, y: 2.5 }]);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut src = source("1,2\n3;4\n", CsvOptions::default());
        assert!(src.next_point().unwrap().is_some());
        match src.next_point() {
            Err(PointSourceError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number() {
        let mut src = source("abc,2\n", CsvOptions::default());
        assert!(matches!(
            src.next_point(),
            Err(PointSourceError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_end_of_stream_is_sticky() {
        let mut src = source("1,2", CsvOptions::default());
        assert!(src.next_point().unwrap().is_some());
        assert!(src.next_point().unwrap().is_none());
        assert!(src.next_point().unwrap().is_none());
    }

    #[test]
    fn test_coordinate_order_from_str() {
        assert_eq!("lonlat".parse::<CoordinateOrder>(), Ok(CoordinateOrder::LonLat));
        assert_eq!("lat,lon".parse::<CoordinateOrder>(), Ok(CoordinateOrder::LatLon));
        assert_eq!("LAT-LON".parse::<CoordinateOrder>(), Ok(CoordinateOrder::LatLon));
        assert!("lonlatlon".parse::<CoordinateOrder>().is_err());
    }
}
