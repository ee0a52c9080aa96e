//! Découpage d'un flux de points en batches de taille fixe

use crate::error::PointSourceError;
use crate::source::PointSource;
use crate::types::Batch;

/// Regroupe les points d'une source en batches de `batch_size`
///
/// Le dernier batch peut être partiel; un batch vide n'est jamais émis.
#[derive(Debug)]
pub struct PointBatcher<'s, S: PointSource + ?Sized> {
    source: &'s mut S,
    batch_size: usize,
    next_sequence: u64,
    consumed: u64,
    exhausted: bool,
}

impl<'s, S: PointSource + ?Sized> PointBatcher<'s, S> {
    /// `batch_size` est ramené à 1 au minimum
    pub fn new(source: &'s mut S, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            next_sequence: 0,
            consumed: 0,
            exhausted: false,
        }
    }

    /// Batch suivant, `None` une fois la source épuisée
    pub fn next_batch(&mut self) -> Result<Option<Batch>, PointSourceError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut points = Vec::with_capacity(self.batch_size);
        while points.len() < self.batch_size {
            match self.source.next_point()? {
                Some(point) => {
                    points.push(point);
                    self.consumed += 1;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if points.is_empty() {
            return Ok(None);
        }

        let batch = Batch {
            sequence: self.next_sequence,
            points,
        };
        self.next_sequence += 1;
        Ok(Some(batch))
    }

    /// Points tirés de la source jusqu'ici
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Batches émis jusqu'ici
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
