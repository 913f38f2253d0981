//! Track fit orchestration.
//!
//! [`TrackFitter`] runs one forward Kalman pass over the hits of a track;
//! [`IterativeTrackFitter`] alternates forward fits and smoothing, dropping
//! hits whose smoothed chi² exceeds a cut until nothing more is removed.
//!
//! ## Per-hit step
//! ```text
//! propagate (navigator → extrapolator → material, per slab)
//!   → record predicted state + transport
//!   → Kalman update with the hit
//!   → record filtered state + chi²
//! ```
//! Any failing step aborts the fit and marks the track [`TrackQuality::Bad`].

use crate::error::{FitError, FitResult};
use crate::extrapolator::TrackExtrapolator;
use crate::hit;
use crate::kalman::KalmanUpdater;
use crate::propagator::TrackPropagator;
use crate::smoother::KalmanSmoother;
use crate::track::{FitNode, Track, TrackQuality};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Single pass
// ---------------------------------------------------------------------------

/// One forward (or backward) Kalman filter pass.
#[derive(Clone, Debug)]
pub struct TrackFitter<E> {
    propagator: TrackPropagator<E>,
    updater: KalmanUpdater,
}

struct PassResult {
    nodes: Vec<FitNode>,
    chi_sq: f64,
    length: f64,
}

impl<E: TrackExtrapolator> TrackFitter<E> {
    pub fn new(propagator: TrackPropagator<E>) -> Self {
        Self {
            propagator,
            updater: KalmanUpdater::default(),
        }
    }

    pub fn with_updater(mut self, updater: KalmanUpdater) -> Self {
        self.updater = updater;
        self
    }

    pub fn propagator(&self) -> &TrackPropagator<E> {
        &self.propagator
    }

    pub fn updater(&self) -> KalmanUpdater {
        self.updater
    }

    /// Filter `track` in increasing z (`downstream`) or decreasing z.
    ///
    /// The pass is seeded from the track's first parameters when going
    /// downstream and from its last parameters otherwise. On failure the
    /// track is marked bad and keeps its previous parameters.
    pub fn fit(&self, track: &mut Track, downstream: bool) -> FitResult<()> {
        if track.hits().is_empty() {
            track.set_quality(TrackQuality::Bad);
            return Err(FitError::InsufficientHits {
                remaining: 0,
                required: 1,
            });
        }
        track.sort_hits(downstream);

        let pass = match self.run(track, downstream) {
            Ok(pass) => pass,
            Err(err) => {
                warn!(%err, hits = track.hits().len(), "track fit failed");
                track.set_quality(TrackQuality::Bad);
                return Err(err);
            }
        };

        if let (Some(start), Some(end)) = (pass.nodes.first(), pass.nodes.last()) {
            let (start, end) = (start.filtered, end.filtered);
            if downstream {
                track.set_first(start);
                track.set_last(end);
            } else {
                track.set_first(end);
                track.set_last(start);
            }
        }
        *track.nodes_mut() = pass.nodes;
        let ndf = hit::ndf(track.hits());
        track.set_fit_summary(pass.chi_sq, ndf);
        track.set_length(pass.length);
        track.set_quality(TrackQuality::Good);
        debug!(
            hits = track.hits().len(),
            chi_sq = pass.chi_sq,
            ndf,
            downstream,
            "track fitted"
        );
        Ok(())
    }

    fn run(&self, track: &Track, downstream: bool) -> FitResult<PassResult> {
        let particle = track.particle();
        let mut state = if downstream { *track.first() } else { *track.last() };
        let mut nodes = Vec::with_capacity(track.hits().len());
        let mut chi_sq = 0.0;
        let mut length = 0.0;

        for hit in track.hits() {
            let step = self.propagator.propagate(&state, hit.z(), particle)?;
            let mut node = FitNode::new(step.state, step.transport);
            let update = self.updater.update(&step.state, hit)?;
            node.filtered = update.state;
            node.chi_sq_filtered = update.chi_sq;
            trace!(z = hit.z(), chi_sq = update.chi_sq, "filtered node");

            chi_sq += update.chi_sq;
            length += step.length;
            state = update.state;
            nodes.push(node);
        }
        Ok(PassResult {
            nodes,
            chi_sq,
            length,
        })
    }
}

// ---------------------------------------------------------------------------
// Iterative fit with outlier removal
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterativeFitConfig {
    /// Number of fit + smooth passes (the last one never prunes)
    pub max_iterations: usize,
    /// Hits with a smoothed chi² above this are removed
    pub chi_sq_cut: f64,
    /// Minimum number of hits left after pruning
    pub min_hits: usize,
    /// Filter direction
    pub downstream: bool,
}

impl Default for IterativeFitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            chi_sq_cut: 15.0,
            min_hits: 3,
            downstream: true,
        }
    }
}

/// Summary of a successful iterative fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitOutcome {
    /// Fit + smooth passes performed
    pub iterations: usize,
    /// Hits removed as outliers
    pub removed: usize,
}

/// Fit, smooth and prune until stable.
#[derive(Clone, Debug)]
pub struct IterativeTrackFitter<E> {
    fitter: TrackFitter<E>,
    smoother: KalmanSmoother,
    config: IterativeFitConfig,
}

impl<E: TrackExtrapolator> IterativeTrackFitter<E> {
    pub fn new(fitter: TrackFitter<E>, config: IterativeFitConfig) -> Self {
        Self {
            fitter,
            smoother: KalmanSmoother::new(),
            config,
        }
    }

    pub fn fitter(&self) -> &TrackFitter<E> {
        &self.fitter
    }

    pub fn config(&self) -> &IterativeFitConfig {
        &self.config
    }

    /// Fit `track`, removing outliers between passes.
    ///
    /// Every pass starts from the parameters the track carried on entry.
    pub fn fit(&self, track: &mut Track) -> FitResult<FitOutcome> {
        let cfg = &self.config;
        let (seed_first, seed_last) = (*track.first(), *track.last());
        let iterations = cfg.max_iterations.max(1);
        let mut removed = 0;

        let mut iteration = 0;
        loop {
            iteration += 1;
            track.set_first(seed_first);
            track.set_last(seed_last);
            self.fitter.fit(track, cfg.downstream)?;
            if let Err(err) = self.smoother.smooth(track) {
                warn!(%err, "smoothing failed");
                track.set_quality(TrackQuality::Bad);
                return Err(err);
            }

            if iteration >= iterations {
                return Ok(FitOutcome {
                    iterations: iteration,
                    removed,
                });
            }

            let cut = cfg.chi_sq_cut;
            let pruned = track.retain_nodes(|_, node| node.chi_sq_smoothed <= cut);
            if pruned == 0 {
                return Ok(FitOutcome {
                    iterations: iteration,
                    removed,
                });
            }
            removed += pruned;
            debug!(iteration, pruned, remaining = track.hits().len(), "removed outliers");

            if track.hits().len() < cfg.min_hits {
                warn!(
                    remaining = track.hits().len(),
                    required = cfg.min_hits,
                    "too few hits after outlier removal"
                );
                track.set_quality(TrackQuality::Bad);
                return Err(FitError::InsufficientHits {
                    remaining: track.hits().len(),
                    required: cfg.min_hits,
                });
            }
        }
    }

    /// Fit independent tracks in parallel.
    pub fn fit_all(&self, tracks: &mut [Track]) -> Vec<FitResult<FitOutcome>>
    where
        E: Sync,
    {
        tracks.par_iter_mut().map(|track| self.fit(track)).collect()
    }
}
