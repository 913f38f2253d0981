//! Kalman update: fusion of one hit into a predicted track state.
//!
//! # Measurement models
//! - strip: `m = x·cosφ + y·sinφ`, H = [cosφ, sinφ, 0, 0, 0]
//! - pixel: `m = (x, y)`, H = [I₂ 0]
//! - plane strip: `m = u(x, y, z_hit)` in the plane's local frame; H is
//!   the xy projection of the plane's measurement direction.
//!
//! # Forms
//! Two algebraically equivalent updates are provided:
//! - [`UpdateForm::Gain`] (default): K = C·Hᵀ·(V + H·C·Hᵀ)⁻¹, rank-1/rank-2
//!   downdate of the packed covariance.
//! - [`UpdateForm::Information`]: weighted mean, C_f = (C⁻¹ + Hᵀ·V⁻¹·H)⁻¹.
//!
//! The filtered chi² is always the filtered residual weighted by its own
//! covariance, `V − H·C_f·Hᵀ`.

use crate::error::{FitError, FitResult};
use crate::hit::{Hit, PixelHit, PlaneStripHit, StripHit};
use crate::linalg::SymMatrix5;
use crate::types::{param, StateVec, TrackState};
use nalgebra::{Matrix2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Which algebraic form of the update to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateForm {
    #[default]
    Gain,
    Information,
}

/// Result of a Kalman update step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KfUpdateResult {
    /// Filtered state
    pub state: TrackState,
    /// Filtered chi² contribution of the hit
    pub chi_sq: f64,
}

/// Hit fusion, dispatched on the hit kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanUpdater {
    pub form: UpdateForm,
}

impl KalmanUpdater {
    pub fn new(form: UpdateForm) -> Self {
        Self { form }
    }

    /// Fuse `hit` into the predicted `state`.
    pub fn update(&self, state: &TrackState, hit: &Hit) -> FitResult<KfUpdateResult> {
        match (hit, self.form) {
            (Hit::Pixel(h), UpdateForm::Gain) => pixel_gain(state, h),
            (Hit::Pixel(h), UpdateForm::Information) => pixel_information(state, h),
            (Hit::Strip(h), form) => strip_update(state, &StripModel::from_strip(state, h), form),
            (Hit::PlaneStrip(h), form) => {
                strip_update(state, &StripModel::from_plane_strip(state, h), form)
            }
        }
    }
}

/// Chi² of `hit` against a smoothed `state`, weighted by `V − H·C·Hᵀ`.
pub fn smoothed_chi_sq(state: &TrackState, hit: &Hit) -> FitResult<f64> {
    match hit {
        Hit::Pixel(h) => {
            let r = pixel_residual(state, h);
            let cov = pixel_v(h) - position_block(&state.cov);
            quadratic_form(&cov, &r, "smoothed pixel residual covariance")
        }
        Hit::Strip(h) => StripModel::from_strip(state, h).smoothed_chi_sq(&state.cov),
        Hit::PlaneStrip(h) => StripModel::from_plane_strip(state, h).smoothed_chi_sq(&state.cov),
    }
}

// ---------------------------------------------------------------------------
// One-dimensional (strip) measurements
// ---------------------------------------------------------------------------

/// Linearised 1D measurement: m ≈ predicted + cx·δx + cy·δy.
struct StripModel {
    u: f64,
    variance: f64,
    cx: f64,
    cy: f64,
    /// Measurement predicted from the state the model was built at
    predicted: f64,
}

impl StripModel {
    fn from_strip(state: &TrackState, hit: &StripHit) -> Self {
        let (c, s) = hit.direction();
        Self {
            u: hit.u(),
            variance: hit.du() * hit.du(),
            cx: c,
            cy: s,
            predicted: c * state.x() + s * state.y(),
        }
    }

    fn from_plane_strip(state: &TrackState, hit: &PlaneStripHit) -> Self {
        let plane = hit.plane();
        let point = Vector3::new(state.x(), state.y(), hit.z());
        Self {
            u: hit.u(),
            variance: hit.du() * hit.du(),
            cx: plane.u_dir().x,
            cy: plane.u_dir().y,
            predicted: plane.u(&point),
        }
    }

    /// H·C·Hᵀ
    fn hch(&self, c: &SymMatrix5) -> f64 {
        self.cx * self.cx * c.get(0, 0)
            + 2.0 * self.cx * self.cy * c.get(0, 1)
            + self.cy * self.cy * c.get(1, 1)
    }

    /// Residual after moving the state by `dx`.
    fn residual_after(&self, dx: &StateVec) -> f64 {
        self.u - self.predicted - self.cx * dx[param::X] - self.cy * dx[param::Y]
    }

    fn smoothed_chi_sq(&self, c: &SymMatrix5) -> FitResult<f64> {
        let variance = self.variance - self.hch(c);
        if !(variance > 0.0) {
            return Err(FitError::SingularMatrix("smoothed strip residual variance"));
        }
        let r = self.u - self.predicted;
        Ok(r * r / variance)
    }
}

fn strip_update(state: &TrackState, m: &StripModel, form: UpdateForm) -> FitResult<KfUpdateResult> {
    match form {
        UpdateForm::Gain => strip_gain(state, m),
        UpdateForm::Information => strip_information(state, m),
    }
}

fn strip_gain(state: &TrackState, m: &StripModel) -> FitResult<KfUpdateResult> {
    let c = &state.cov;
    let s = m.variance + m.hch(c);
    if !(s > 0.0) || !s.is_finite() {
        return Err(FitError::SingularMatrix("strip residual variance"));
    }
    let r_inv = 1.0 / s;
    let r = m.u - m.predicted;

    // K = C·Hᵀ (unnormalised gain)
    let k: [f64; 5] = std::array::from_fn(|i| c.get(i, 0) * m.cx + c.get(i, 1) * m.cy);

    let mut out = *state;
    for i in 0..5 {
        out.params[i] += k[i] * r_inv * r;
        for j in i..5 {
            out.cov.add_at(i, j, -k[i] * k[j] * r_inv);
        }
    }

    // V − H·C_f·Hᵀ = V²/(V + H·C·Hᵀ)
    let r_f = m.residual_after(&(out.params - state.params));
    let chi_sq = r_f * r_f / (m.variance * m.variance * r_inv);
    Ok(KfUpdateResult { state: out, chi_sq })
}

fn strip_information(state: &TrackState, m: &StripModel) -> FitResult<KfUpdateResult> {
    if !(m.variance > 0.0) {
        return Err(FitError::SingularMatrix("strip measurement variance"));
    }
    let c_inv = state.cov.inverse_scaled()?;
    let w = 1.0 / m.variance;

    let mut info = c_inv;
    info.add_at(0, 0, m.cx * m.cx * w);
    info.add_at(0, 1, m.cx * m.cy * w);
    info.add_at(1, 1, m.cy * m.cy * w);
    let cov = info.inverse_scaled()?;

    // Measurement with the affine offset of the model removed.
    let u_eff = m.u - (m.predicted - m.cx * state.x() - m.cy * state.y());
    let mut b = c_inv.mul_vec(&state.params);
    b[param::X] += m.cx * u_eff * w;
    b[param::Y] += m.cy * u_eff * w;
    let params = cov.mul_vec(&b);

    let dx = params - state.params;
    let r_f = m.residual_after(&dx);
    let chi_sq = r_f * r_f * w + dx.dot(&c_inv.mul_vec(&dx));
    Ok(KfUpdateResult {
        state: TrackState::new(state.z, params, cov),
        chi_sq,
    })
}

// ---------------------------------------------------------------------------
// Two-dimensional (pixel) measurements
// ---------------------------------------------------------------------------

fn pixel_v(hit: &PixelHit) -> Matrix2<f64> {
    let (vxx, vxy, vyy) = hit.covariance();
    Matrix2::new(vxx, vxy, vxy, vyy)
}

/// H·C·Hᵀ for H = [I₂ 0].
fn position_block(c: &SymMatrix5) -> Matrix2<f64> {
    Matrix2::new(c.get(0, 0), c.get(0, 1), c.get(0, 1), c.get(1, 1))
}

fn pixel_residual(state: &TrackState, hit: &PixelHit) -> Vector2<f64> {
    Vector2::new(hit.x() - state.x(), hit.y() - state.y())
}

/// Closed-form inverse of a symmetric positive-definite 2×2.
fn invert_2x2(m: &Matrix2<f64>, what: &'static str) -> FitResult<Matrix2<f64>> {
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    if !(m[(0, 0)] > 0.0) || !(det > 0.0) || !det.is_finite() {
        return Err(FitError::SingularMatrix(what));
    }
    Ok(Matrix2::new(m[(1, 1)], -m[(0, 1)], -m[(1, 0)], m[(0, 0)]) / det)
}

fn quadratic_form(cov: &Matrix2<f64>, r: &Vector2<f64>, what: &'static str) -> FitResult<f64> {
    let inv = invert_2x2(cov, what)?;
    Ok(r.dot(&(inv * r)))
}

fn pixel_gain(state: &TrackState, hit: &PixelHit) -> FitResult<KfUpdateResult> {
    let c = &state.cov;
    let v = pixel_v(hit);
    let s_inv = invert_2x2(&(v + position_block(c)), "pixel residual covariance")?;
    let r = pixel_residual(state, hit);

    // K = C·Hᵀ·S⁻¹ (5×2)
    let k: [[f64; 2]; 5] = std::array::from_fn(|i| {
        let (c0, c1) = (c.get(i, 0), c.get(i, 1));
        [
            c0 * s_inv[(0, 0)] + c1 * s_inv[(1, 0)],
            c0 * s_inv[(0, 1)] + c1 * s_inv[(1, 1)],
        ]
    });

    let mut out = *state;
    for i in 0..5 {
        out.params[i] += k[i][0] * r.x + k[i][1] * r.y;
        for j in i..5 {
            out.cov.add_at(i, j, -(k[i][0] * c.get(0, j) + k[i][1] * c.get(1, j)));
        }
    }

    // V − H·C_f·Hᵀ = V·S⁻¹·V
    let r_f = Vector2::new(hit.x() - out.x(), hit.y() - out.y());
    let chi_sq = quadratic_form(&(v * s_inv * v), &r_f, "filtered pixel residual covariance")?;
    Ok(KfUpdateResult { state: out, chi_sq })
}

fn pixel_information(state: &TrackState, hit: &PixelHit) -> FitResult<KfUpdateResult> {
    let c_inv = state.cov.inverse_scaled()?;
    let w = invert_2x2(&pixel_v(hit), "pixel measurement covariance")?;

    let mut info = c_inv;
    info.add_at(0, 0, w[(0, 0)]);
    info.add_at(0, 1, w[(0, 1)]);
    info.add_at(1, 1, w[(1, 1)]);
    let cov = info.inverse_scaled()?;

    let wm = w * Vector2::new(hit.x(), hit.y());
    let mut b = c_inv.mul_vec(&state.params);
    b[param::X] += wm.x;
    b[param::Y] += wm.y;
    let params = cov.mul_vec(&b);

    let dx = params - state.params;
    let r_f = Vector2::new(hit.x() - params[param::X], hit.y() - params[param::Y]);
    let chi_sq = r_f.dot(&(w * r_f)) + dx.dot(&c_inv.mul_vec(&dx));
    Ok(KfUpdateResult {
        state: TrackState::new(state.z, params, cov),
        chi_sq,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrapolator::{LineExtrapolator, TrackExtrapolator};
    use crate::geometry::DetectorPlane;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::Matrix5;
    use std::sync::Arc;

    fn predicted() -> TrackState {
        let a = Matrix5::from_fn(|i, j| ((i * 5 + j) as f64 * 0.61).cos() * 0.1);
        let cov = a * a.transpose() + Matrix5::from_diagonal(&StateVec::new(0.04, 0.05, 1e-3, 1e-3, 1e-2));
        TrackState::new(
            300.0,
            StateVec::new(1.2, -0.4, 0.02, -0.01, 0.9),
            SymMatrix5::from_matrix(&cov),
        )
    }

    fn strip() -> Hit {
        StripHit::new(1.05, 0.05, 0.3, 300.0).into()
    }

    fn pixel() -> Hit {
        PixelHit::new(1.1, -0.3, 0.05, 0.07, 0.001, 300.0).into()
    }

    fn plane_strip() -> Hit {
        let plane = DetectorPlane::new(
            "L3s",
            Vector3::new(0.4, -0.2, 300.0),
            Vector3::z(),
            Vector3::new(0.995, 0.0998, 0.0),
            0.0035,
        );
        PlaneStripHit::new(Arc::new(plane), 0.75, 0.04).into()
    }

    fn assert_states_close(a: &TrackState, b: &TrackState) {
        for i in 0..5 {
            assert_relative_eq!(a.params[i], b.params[i], epsilon = 1e-12, max_relative = 1e-8);
        }
        for (x, y) in a.cov.as_packed().iter().zip(b.cov.as_packed()) {
            assert_relative_eq!(x, y, epsilon = 1e-12, max_relative = 1e-7);
        }
    }

    #[test]
    fn measured_variances_never_grow() {
        let s = predicted();
        for hit in [strip(), pixel(), plane_strip()] {
            let out = KalmanUpdater::default().update(&s, &hit).unwrap();
            assert!(out.state.cov.get(0, 0) <= s.cov.get(0, 0));
            assert!(out.state.cov.get(1, 1) <= s.cov.get(1, 1));
            assert!(out.chi_sq >= 0.0);
        }
    }

    #[test]
    fn gain_and_information_forms_agree() {
        let s = predicted();
        let gain = KalmanUpdater::new(UpdateForm::Gain);
        let info = KalmanUpdater::new(UpdateForm::Information);
        for hit in [strip(), pixel(), plane_strip()] {
            let a = gain.update(&s, &hit).unwrap();
            let b = info.update(&s, &hit).unwrap();
            assert_states_close(&a.state, &b.state);
            assert_relative_eq!(a.chi_sq, b.chi_sq, max_relative = 1e-7);
        }
    }

    #[test]
    fn forms_agree_for_tight_pixels_after_a_loose_seed() {
        let line = LineExtrapolator::default();
        let mut state = TrackState::new(
            0.0,
            StateVec::new(0.0, 0.0, 0.0, 0.0, 0.5),
            SymMatrix5::from_diagonal([1.0, 1.0, 0.01, 0.01, 1.0]),
        );
        let gain = KalmanUpdater::new(UpdateForm::Gain);
        let info = KalmanUpdater::new(UpdateForm::Information);
        for z in [100.0, 200.0, 300.0] {
            let predicted = line.extrapolate(&state, z).unwrap().state;
            let hit: Hit = PixelHit::new(0.1 * z + 0.02, 0.05 * z - 0.01, 1e-4, 1e-4, 0.0, z).into();
            let a = gain.update(&predicted, &hit).unwrap();
            let b = info.update(&predicted, &hit).unwrap();
            for i in 0..5 {
                assert_abs_diff_eq!(a.state.params[i], b.state.params[i], epsilon = 1e-9);
                assert_relative_eq!(a.state.cov.get(i, i), b.state.cov.get(i, i), max_relative = 1e-5);
            }
            assert_abs_diff_eq!(a.chi_sq, b.chi_sq, epsilon = 1e-6);
            state = a.state;
        }
    }

    #[test]
    fn axial_strip_is_a_scalar_kalman_update() {
        let s = predicted();
        let hit: Hit = StripHit::new(1.3, 0.1, 0.0, 300.0).into();
        let out = KalmanUpdater::default().update(&s, &hit).unwrap();
        let c00 = s.cov.get(0, 0);
        let gain = c00 / (c00 + 0.01);
        assert_relative_eq!(out.state.x(), 1.2 + gain * 0.1, max_relative = 1e-12);
        assert_relative_eq!(out.state.cov.get(0, 0), c00 * (1.0 - gain), max_relative = 1e-12);
        // Filtered chi² equals the predicted-residual form r²/(V + HCHᵀ).
        assert_relative_eq!(out.chi_sq, 0.01 / (c00 + 0.01), max_relative = 1e-10);
    }

    #[test]
    fn plane_strip_on_axis_matches_flat_strip() {
        let s = predicted();
        let phi = 0.2_f64;
        let plane = Arc::new(DetectorPlane::z_plane("L4s", 300.0, phi, 0.003));
        let u = 1.2 * phi.cos() - 0.1 * phi.sin();
        let a = KalmanUpdater::default()
            .update(&s, &PlaneStripHit::new(plane, u, 0.02).into())
            .unwrap();
        let b = KalmanUpdater::default()
            .update(&s, &StripHit::new(u, 0.02, phi, 300.0).into())
            .unwrap();
        assert_states_close(&a.state, &b.state);
        assert_relative_eq!(a.chi_sq, b.chi_sq, max_relative = 1e-9);
    }

    #[test]
    fn smoothed_chi_sq_uses_reduced_variance() {
        let s = predicted();
        let hit: Hit = StripHit::new(1.3, 0.5, 0.0, 300.0).into();
        let chi = smoothed_chi_sq(&s, &hit).unwrap();
        assert_relative_eq!(chi, 0.01 / (0.25 - s.cov.get(0, 0)), max_relative = 1e-12);

        let p = PixelHit::new(1.2, -0.4, 0.01, 0.01, 0.0, 300.0);
        let tight: Hit = p.into();
        assert!(matches!(
            smoothed_chi_sq(&s, &tight),
            Err(FitError::SingularMatrix(_))
        ));
    }

    #[test]
    fn degenerate_pixel_is_singular() {
        let s = TrackState::new(0.0, StateVec::zeros(), SymMatrix5::zeros());
        let hit: Hit = PixelHit::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0).into();
        let err = KalmanUpdater::default().update(&s, &hit).unwrap_err();
        assert!(matches!(err, FitError::SingularMatrix(_)));
    }

    #[test]
    fn update_is_pure() {
        let s = predicted();
        let copy = s;
        let _ = KalmanUpdater::default().update(&s, &pixel()).unwrap();
        assert_eq!(s, copy);
        assert_abs_diff_eq!(s.x(), 1.2);
    }
}
