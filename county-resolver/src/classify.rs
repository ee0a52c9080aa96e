//! Classification d'un batch de points contre toutes les régions

use std::collections::HashMap;

use crate::error::ClassificationTaskError;
use crate::regions::ContainmentIndex;
use crate::types::Batch;

/// Incréments produits par un batch: région -> nombre de points contenus
pub type PartialCounts = HashMap<String, u64>;

/// Compte, pour chaque région, les points du batch qu'elle contient strictement
///
/// Un point hors de toute région ne compte pas; un point dans plusieurs régions
/// (chevauchement) compte pour chacune. Un point à coordonnée non finie fait
/// échouer tout le batch: aucun incrément n'est produit.
pub fn classify(
    batch: &Batch,
    index: &dyn ContainmentIndex,
) -> Result<PartialCounts, ClassificationTaskError> {
    let mut tally = vec![0u64; index.region_count()];
    let mut hits = Vec::with_capacity(4);

    for (offset, point) in batch.points.iter().enumerate() {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(ClassificationTaskError::MalformedPoint {
                batch: batch.sequence,
                offset,
                x: point.x,
                y: point.y,
            });
        }

        hits.clear();
        index.containing(*point, &mut hits);
        for &position in &hits {
            tally[position] += 1;
        }
    }

    Ok(tally
        .into_iter()
        .enumerate()
        .filter(|&(_, count)| count > 0)
        .map(|(position, count)| (index.region_id(position).to_string(), count))
        .collect())
}
