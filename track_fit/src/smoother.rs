//! Rauch-Tung-Striebel smoother over the fit nodes of a track.
//!
//! Runs backwards from the last node, whose smoothed state is its filtered
//! state. With F the transport stored on node i+1:
//! ```text
//! A     = C_f(i) · Fᵀ · C_p(i+1)⁻¹
//! x_s(i) = x_f(i) + A · (x_s(i+1) − x_p(i+1))
//! C_s(i) = C_f(i) + A · (C_s(i+1) − C_p(i+1)) · Aᵀ
//! ```
//! A is obtained by solving `A·C_p = C_f·Fᵀ` rather than by forming C_p⁻¹.

use crate::error::FitResult;
use crate::hit;
use crate::kalman::smoothed_chi_sq;
use crate::track::Track;
use crate::types::TrackState;
use tracing::trace;

#[derive(Clone, Copy, Debug, Default)]
pub struct KalmanSmoother;

impl KalmanSmoother {
    pub fn new() -> Self {
        Self
    }

    /// Smooth every node of a fitted `track`, then recompute its chi² and
    /// NDF from the smoothed states and move its end parameters onto them.
    pub fn smooth(&self, track: &mut Track) -> FitResult<()> {
        let n = track.nodes().len();
        if n == 0 {
            return Ok(());
        }

        let nodes = track.nodes_mut();
        nodes[n - 1].smoothed = Some(nodes[n - 1].filtered);
        for i in (0..n - 1).rev() {
            let next = &nodes[i + 1];
            let next_smoothed = next.smoothed.unwrap_or(next.filtered);
            let filtered = nodes[i].filtered;

            // A·C_p = C_f·Fᵀ
            let gain = next
                .predicted
                .cov
                .solve_right(&filtered.cov.mul_dense(&next.transport.transpose()))?;
            let params = filtered.params
                + gain.mul_vec(&(next_smoothed.params - next.predicted.params));
            let cov = filtered.cov + (next_smoothed.cov - next.predicted.cov).similarity(&gain);
            nodes[i].smoothed = Some(TrackState::new(filtered.z, params, cov));
        }

        let mut chi_sq = 0.0;
        let hits = track.hits().to_vec();
        for (node, hit) in track.nodes_mut().iter_mut().zip(&hits) {
            node.chi_sq_smoothed = smoothed_chi_sq(node.best(), hit)?;
            chi_sq += node.chi_sq_smoothed;
            trace!(z = node.filtered.z, chi_sq = node.chi_sq_smoothed, "smoothed node");
        }
        track.set_fit_summary(chi_sq, hit::ndf(&hits));

        let (a, b) = (*track.nodes()[0].best(), *track.nodes()[n - 1].best());
        let (first, last) = if a.z <= b.z { (a, b) } else { (b, a) };
        track.set_first(first);
        track.set_last(last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrapolator::LineExtrapolator;
    use crate::fitter::TrackFitter;
    use crate::hit::StripHit;
    use crate::linalg::SymMatrix5;
    use crate::particle::ParticleHypothesis;
    use crate::propagator::TrackPropagator;
    use crate::types::StateVec;
    use approx::assert_abs_diff_eq;

    fn fitted() -> Track {
        let seed = TrackState::new(
            0.0,
            StateVec::new(0.0, 0.0, 0.0, 0.0, 0.5),
            SymMatrix5::from_diagonal([1.0, 1.0, 0.01, 0.01, 1.0]),
        );
        let hits = [(100.0, 0.0, 1.1), (200.0, 1.2, 1.9), (300.0, 0.0, 3.2), (400.0, 0.9, 4.0)]
            .into_iter()
            .map(|(z, phi, u)| StripHit::new(u, 0.1, phi, z));
        let mut track = Track::new(seed, ParticleHypothesis::pion()).with_hits(hits);
        let fitter = TrackFitter::new(TrackPropagator::vacuum(LineExtrapolator::default()));
        fitter.fit(&mut track, true).unwrap();
        track
    }

    #[test]
    fn last_node_smoothed_equals_filtered() {
        let mut track = fitted();
        KalmanSmoother::new().smooth(&mut track).unwrap();
        let last = track.nodes().last().unwrap();
        assert_eq!(last.smoothed, Some(last.filtered));
    }

    #[test]
    fn smoothing_never_loosens_filtered_errors() {
        let mut track = fitted();
        KalmanSmoother::new().smooth(&mut track).unwrap();
        for node in track.nodes() {
            let s = node.smoothed.unwrap();
            for k in 0..5 {
                assert!(s.cov.get(k, k) <= node.filtered.cov.get(k, k) * (1.0 + 1e-9));
            }
        }
    }

    #[test]
    fn summary_is_recomputed_from_smoothed_nodes() {
        let mut track = fitted();
        KalmanSmoother::new().smooth(&mut track).unwrap();
        let sum: f64 = track.nodes().iter().map(|n| n.chi_sq_smoothed).sum();
        assert_abs_diff_eq!(track.chi_sq(), sum, epsilon = 1e-12);
        assert_eq!(track.ndf(), 1);
        assert_eq!(*track.first(), track.nodes()[0].smoothed.unwrap());
        assert_eq!(*track.last(), track.nodes()[3].smoothed.unwrap());
    }

    #[test]
    fn empty_track_is_left_alone() {
        let seed = TrackState::new(0.0, StateVec::zeros(), SymMatrix5::identity());
        let mut track = Track::new(seed, ParticleHypothesis::pion());
        KalmanSmoother::new().smooth(&mut track).unwrap();
        assert_eq!(track.chi_sq(), 0.0);
    }
}
