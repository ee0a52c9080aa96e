//! Pilotage d'un run de classification
//!
//! ```text
//! NotStarted -> LoadingRegions -> StreamingAndClassifying -> AwaitingCompletion -> Finalized
//!                     |                      |                       |
//!                     +----------------------+-----------------------+--> Failed
//! ```
//!
//! Les ressources du run (fichiers temporaires de géométrie, pool de workers)
//! sont libérées à l'entrée dans `Finalized` ou `Failed`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::aggregate::ResultAggregator;
use crate::batch::PointBatcher;
use crate::error::ResolutionError;
use crate::pool::WorkerPool;
use crate::regions::{BruteForceIndex, ContainmentIndex, GeometrySource, RegionSet};
use crate::source::PointSource;
use crate::types::{CancelFlag, Resolution, ResolverConfig};

/// Fréquence des logs de progression (en batches)
const PROGRESS_EVERY: u64 = 100;

/// État d'un run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    LoadingRegions,
    StreamingAndClassifying,
    AwaitingCompletion,
    Finalized,
    /// Run abandonné sur erreur fatale
    Failed,
}

impl RunState {
    /// Transitions autorisées; aucune étape n'est sautée
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (NotStarted, LoadingRegions)
                | (LoadingRegions, StreamingAndClassifying)
                | (StreamingAndClassifying, AwaitingCompletion)
                | (AwaitingCompletion, Finalized)
                | (LoadingRegions | StreamingAndClassifying | AwaitingCompletion, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finalized | RunState::Failed)
    }
}

/// Resolver de comtés: charge les régions, classe un flux de points, agrège
///
/// Chaque appel à `resolve` est un run complet. `close` libère les ressources
/// de la source de géométries; il est aussi appelé au drop.
pub struct CountyResolver {
    config: ResolverConfig,
    geometry: Box<dyn GeometrySource>,
    state: RunState,
    closed: bool,
}

impl CountyResolver {
    pub fn new(
        config: ResolverConfig,
        geometry: impl GeometrySource + 'static,
    ) -> Result<Self, ResolutionError> {
        config.validate()?;
        Ok(Self {
            config,
            geometry: Box::new(geometry),
            state: RunState::NotStarted,
            closed: false,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// État du dernier run
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Classe tous les points de la source
    pub fn resolve<S: PointSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Resolution, ResolutionError> {
        self.resolve_with_cancel(source, &CancelFlag::new())
    }

    /// Comme `resolve`, arrêtable via `cancel`
    pub fn resolve_with_cancel<S: PointSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancelFlag,
    ) -> Result<Resolution, ResolutionError> {
        if self.closed {
            return Err(ResolutionError::Closed);
        }

        // Nouveau run
        self.state = RunState::NotStarted;
        let started_at = Instant::now();
        info!(
            geometry = %self.geometry.describe(),
            workers = self.config.worker_count,
            batch_size = self.config.batch_size,
            strict = self.config.strict,
            "Starting resolution"
        );

        let outcome = self.run(source, cancel);
        self.geometry.release();

        match outcome {
            Ok(resolution) => {
                self.transition(RunState::Finalized);
                info!(
                    points = resolution.points_consumed,
                    resolved = resolution.resolved_total(),
                    regions_matched = resolution.counts.len(),
                    batches = resolution.batches,
                    failed_batches = resolution.task_errors.len(),
                    elapsed = ?started_at.elapsed(),
                    "Resolution complete"
                );
                Ok(resolution)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                warn!(elapsed = ?started_at.elapsed(), "Resolution failed: {}", e);
                Err(e)
            }
        }
    }

    fn run<S: PointSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancelFlag,
    ) -> Result<Resolution, ResolutionError> {
        self.transition(RunState::LoadingRegions);
        let regions = Arc::new(RegionSet::load(self.geometry.as_mut())?);
        info!(regions = regions.len(), "Regions loaded");

        let fingerprint = regions.fingerprint();
        let region_count = regions.len();
        let index: Arc<dyn ContainmentIndex> = Arc::new(BruteForceIndex::new(regions));

        let config = self.config;
        let mut on_state = |state| self.transition(state);
        let mut resolution = classify_stream(index, source, &config, cancel, &mut on_state)?;
        resolution.region_count = region_count;
        resolution.fingerprint = fingerprint;
        Ok(resolution)
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid run transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
    }

    /// Libère les ressources; sans effet si déjà fermé
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.geometry.release();
        self.closed = true;
        debug!(geometry = %self.geometry.describe(), "Resolver closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for CountyResolver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CountyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountyResolver")
            .field("config", &self.config)
            .field("geometry", &self.geometry.describe())
            .field("state", &self.state)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Streaming + classification + agrégation contre un index déjà construit
///
/// `on_state` est notifié à l'entrée de `StreamingAndClassifying` puis
/// d'`AwaitingCompletion`. `region_count` et `fingerprint` du résultat sont
/// laissés vides: c'est à l'appelant de les renseigner.
pub fn classify_stream<S: PointSource + ?Sized>(
    index: Arc<dyn ContainmentIndex>,
    source: &mut S,
    config: &ResolverConfig,
    cancel: &CancelFlag,
    on_state: &mut dyn FnMut(RunState),
) -> Result<Resolution, ResolutionError> {
    config.validate()?;

    let aggregator = Arc::new(ResultAggregator::new());
    let pool = WorkerPool::new(config.worker_count, index, Arc::clone(&aggregator))?;

    on_state(RunState::StreamingAndClassifying);
    let mut batcher = PointBatcher::new(source, config.batch_size);
    let streamed: Result<(), ResolutionError> = loop {
        if cancel.is_cancelled() {
            break Err(ResolutionError::Cancelled {
                consumed: batcher.consumed(),
            });
        }
        match batcher.next_batch() {
            Ok(Some(batch)) => {
                pool.submit(batch);
                let emitted = batcher.emitted();
                if emitted % PROGRESS_EVERY == 0 {
                    debug!(batches = emitted, points = batcher.consumed(), "Streaming progress");
                }
            }
            Ok(None) => break Ok(()),
            Err(source) => {
                break Err(ResolutionError::PointSource {
                    consumed: batcher.consumed(),
                    source,
                })
            }
        }
    };

    // Les batches en vol se terminent dans tous les cas
    on_state(RunState::AwaitingCompletion);
    let failures = pool.await_all();
    streamed?;

    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            batches = batcher.emitted(),
            "Some batches failed; their points are not counted"
        );
        if config.strict {
            return Err(ResolutionError::TaskFailures { failures });
        }
    }

    Ok(Resolution {
        counts: aggregator.finalize(),
        points_consumed: batcher.consumed(),
        batches: batcher.emitted(),
        region_count: 0,
        fingerprint: String::new(),
        task_errors: failures,
    })
}
