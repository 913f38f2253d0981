//! Propagation through material: navigator, extrapolator and material
//! effects chained along one segment of a track.

use crate::error::FitResult;
use crate::extrapolator::TrackExtrapolator;
use crate::geometry::MaterialSlab;
use crate::linalg::TransportMatrix;
use crate::material::MaterialEffects;
use crate::navigator::GeometryNavigator;
use crate::particle::ParticleHypothesis;
use crate::types::TrackState;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagatorConfig {
    /// Apply energy loss and scattering for every crossed slab
    pub apply_material: bool,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            apply_material: true,
        }
    }
}

/// Outcome of one propagation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Propagation {
    pub state: TrackState,
    /// Product of every extrapolation step's transport matrix
    pub transport: TransportMatrix,
    /// Chord length travelled (mm)
    pub length: f64,
}

/// Extrapolator plus the material it has to cross.
#[derive(Clone, Debug)]
pub struct TrackPropagator<E> {
    extrapolator: E,
    navigator: GeometryNavigator<MaterialSlab>,
    material: MaterialEffects,
    config: PropagatorConfig,
}

impl<E: TrackExtrapolator> TrackPropagator<E> {
    pub fn new(
        extrapolator: E,
        navigator: GeometryNavigator<MaterialSlab>,
        material: MaterialEffects,
        config: PropagatorConfig,
    ) -> Self {
        Self {
            extrapolator,
            navigator,
            material,
            config,
        }
    }

    /// Propagator for a detector without material.
    pub fn vacuum(extrapolator: E) -> Self {
        Self::new(
            extrapolator,
            GeometryNavigator::new(),
            MaterialEffects::default(),
            PropagatorConfig::default(),
        )
    }

    pub fn extrapolator(&self) -> &E {
        &self.extrapolator
    }

    pub fn navigator(&self) -> &GeometryNavigator<MaterialSlab> {
        &self.navigator
    }

    /// Move `state` to `z_out`, stopping at every slab on the way to apply
    /// material effects.
    pub fn propagate(
        &self,
        state: &TrackState,
        z_out: f64,
        particle: ParticleHypothesis,
    ) -> FitResult<Propagation> {
        let downstream = z_out >= state.z;
        let mut current = *state;
        let mut transport = TransportMatrix::identity();
        let mut length = 0.0;

        if self.config.apply_material {
            for slab in self.navigator.find_intersections(state.z, z_out) {
                let step = self.extrapolator.extrapolate(&current, slab.z)?;
                length += chord(&current, &step.state);
                transport = step.transport * transport;
                current = self.material.update(&step.state, slab, particle, downstream)?;
                trace!(slab = %slab.name, z = slab.z, qp = current.qp(), "crossed material");
            }
        }

        let step = self.extrapolator.extrapolate(&current, z_out)?;
        length += chord(&current, &step.state);
        Ok(Propagation {
            state: step.state,
            transport: step.transport * transport,
            length,
        })
    }
}

fn chord(from: &TrackState, to: &TrackState) -> f64 {
    (to.position() - from.position()).norm()
}
