//! Track: hits, per-hit fit nodes and the fitted summary.

use crate::hit::Hit;
use crate::linalg::TransportMatrix;
use crate::particle::ParticleHypothesis;
use crate::types::TrackState;
use serde::{Deserialize, Serialize};

/// Outcome flag of the last fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackQuality {
    /// Fitted successfully
    #[default]
    Good,
    /// A fit step failed; parameters are not trustworthy
    Bad,
    /// Good fit produced from merged segments
    GoodMerge,
}

/// Per-hit snapshot of the fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitNode {
    /// State propagated to the hit, before the update
    pub predicted: TrackState,
    /// State after fusing the hit
    pub filtered: TrackState,
    /// Set by the smoother
    pub smoothed: Option<TrackState>,
    /// Jacobian from the previous node (or the seed) to `predicted`
    pub transport: TransportMatrix,
    pub chi_sq_filtered: f64,
    pub chi_sq_smoothed: f64,
}

impl FitNode {
    pub fn new(predicted: TrackState, transport: TransportMatrix) -> Self {
        Self {
            predicted,
            filtered: predicted,
            smoothed: None,
            transport,
            chi_sq_filtered: 0.0,
            chi_sq_smoothed: 0.0,
        }
    }

    /// Smoothed state if available, otherwise the filtered one.
    pub fn best(&self) -> &TrackState {
        self.smoothed.as_ref().unwrap_or(&self.filtered)
    }
}

/// A charged-particle track candidate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    hits: Vec<Hit>,
    /// Empty before a fit, one per hit afterwards
    nodes: Vec<FitNode>,
    /// Parameters at the upstream end
    first: TrackState,
    /// Parameters at the downstream end
    last: TrackState,
    chi_sq: f64,
    ndf: usize,
    quality: TrackQuality,
    particle: ParticleHypothesis,
    /// Path length covered by the last fit (mm)
    length: f64,
}

impl Track {
    /// New track seeded at both ends with `seed`.
    pub fn new(seed: TrackState, particle: ParticleHypothesis) -> Self {
        Self {
            hits: Vec::new(),
            nodes: Vec::new(),
            first: seed,
            last: seed,
            chi_sq: 0.0,
            ndf: 0,
            quality: TrackQuality::default(),
            particle,
            length: 0.0,
        }
    }

    /// Append a hit. Existing fit nodes are discarded.
    pub fn add_hit(&mut self, hit: impl Into<Hit>) {
        self.nodes.clear();
        self.hits.push(hit.into());
    }

    pub fn with_hits<I, H>(mut self, hits: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Hit>,
    {
        for hit in hits {
            self.add_hit(hit);
        }
        self
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn nodes(&self) -> &[FitNode] {
        &self.nodes
    }

    pub fn first(&self) -> &TrackState {
        &self.first
    }

    pub fn last(&self) -> &TrackState {
        &self.last
    }

    pub fn chi_sq(&self) -> f64 {
        self.chi_sq
    }

    pub fn ndf(&self) -> usize {
        self.ndf
    }

    pub fn chi_sq_per_ndf(&self) -> f64 {
        self.chi_sq / self.ndf.max(1) as f64
    }

    pub fn quality(&self) -> TrackQuality {
        self.quality
    }

    pub fn particle(&self) -> ParticleHypothesis {
        self.particle
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Replace the start-side parameters, e.g. with a better seed.
    pub fn set_first(&mut self, state: TrackState) {
        self.first = state;
    }

    /// Replace the end-side parameters.
    pub fn set_last(&mut self, state: TrackState) {
        self.last = state;
    }

    pub fn set_particle(&mut self, particle: ParticleHypothesis) {
        self.particle = particle;
    }

    // -----------------------------------------------------------------------
    // Fitter / smoother access
    // -----------------------------------------------------------------------

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<FitNode> {
        &mut self.nodes
    }

    pub(crate) fn set_fit_summary(&mut self, chi_sq: f64, ndf: usize) {
        self.chi_sq = chi_sq;
        self.ndf = ndf;
    }

    pub(crate) fn set_quality(&mut self, quality: TrackQuality) {
        self.quality = quality;
    }

    pub(crate) fn set_length(&mut self, length: f64) {
        self.length = length;
    }

    /// Order hits by z, ascending for downstream fits. Drops any nodes.
    pub(crate) fn sort_hits(&mut self, downstream: bool) {
        self.nodes.clear();
        if downstream {
            self.hits.sort_by(|a, b| a.z().total_cmp(&b.z()));
        } else {
            self.hits.sort_by(|a, b| b.z().total_cmp(&a.z()));
        }
    }

    /// Remove every hit (and its node) for which `keep` is false.
    /// Returns the number removed.
    pub(crate) fn retain_nodes(&mut self, mut keep: impl FnMut(&Hit, &FitNode) -> bool) -> usize {
        debug_assert_eq!(self.hits.len(), self.nodes.len());
        let before = self.hits.len();
        let (hits, nodes): (Vec<_>, Vec<_>) = self
            .hits
            .drain(..)
            .zip(self.nodes.drain(..))
            .filter(|(h, n)| keep(h, n))
            .unzip();
        self.hits = hits;
        self.nodes = nodes;
        before - self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::{PixelHit, StripHit};
    use crate::linalg::SymMatrix5;
    use crate::types::StateVec;

    fn seed() -> TrackState {
        TrackState::new(0.0, StateVec::new(0.0, 0.0, 0.1, 0.0, 0.5), SymMatrix5::identity())
    }

    fn node(chi: f64) -> FitNode {
        let mut n = FitNode::new(seed(), TransportMatrix::identity());
        n.chi_sq_smoothed = chi;
        n
    }

    #[test]
    fn new_track_is_seeded_at_both_ends() {
        let t = Track::new(seed(), ParticleHypothesis::muon());
        assert_eq!(*t.first(), seed());
        assert_eq!(*t.last(), seed());
        assert!(t.hits().is_empty());
        assert!(t.nodes().is_empty());
        assert_eq!(t.quality(), TrackQuality::Good);
    }

    #[test]
    fn adding_a_hit_discards_nodes() {
        let mut t = Track::new(seed(), ParticleHypothesis::pion());
        t.add_hit(StripHit::new(0.0, 0.1, 0.0, 100.0));
        t.nodes_mut().push(node(1.0));
        t.add_hit(PixelHit::new(0.0, 0.0, 0.1, 0.1, 0.0, 200.0));
        assert_eq!(t.hits().len(), 2);
        assert!(t.nodes().is_empty());
    }

    #[test]
    fn sort_follows_direction() {
        let mut t = Track::new(seed(), ParticleHypothesis::pion()).with_hits([
            StripHit::new(0.0, 0.1, 0.0, 300.0),
            StripHit::new(0.0, 0.1, 0.0, 100.0),
            StripHit::new(0.0, 0.1, 0.0, 200.0),
        ]);
        t.sort_hits(true);
        let z: Vec<f64> = t.hits().iter().map(Hit::z).collect();
        assert_eq!(z, vec![100.0, 200.0, 300.0]);
        t.sort_hits(false);
        let z: Vec<f64> = t.hits().iter().map(Hit::z).collect();
        assert_eq!(z, vec![300.0, 200.0, 100.0]);
    }

    #[test]
    fn retain_keeps_hits_and_nodes_aligned() {
        let mut t = Track::new(seed(), ParticleHypothesis::pion()).with_hits(
            (1..=4).map(|i| StripHit::new(i as f64, 0.1, 0.0, 100.0 * i as f64)),
        );
        for chi in [1.0, 40.0, 2.0, 30.0] {
            t.nodes_mut().push(node(chi));
        }
        let removed = t.retain_nodes(|_, n| n.chi_sq_smoothed <= 15.0);
        assert_eq!(removed, 2);
        let z: Vec<f64> = t.hits().iter().map(Hit::z).collect();
        assert_eq!(z, vec![100.0, 300.0]);
        assert_eq!(t.nodes().len(), 2);
        assert_eq!(t.nodes()[1].chi_sq_smoothed, 2.0);
    }

    #[test]
    fn best_prefers_smoothed() {
        let mut n = node(0.0);
        assert_eq!(*n.best(), n.filtered);
        let mut s = seed();
        s.z = 5.0;
        n.smoothed = Some(s);
        assert_eq!(n.best().z, 5.0);
    }
}
