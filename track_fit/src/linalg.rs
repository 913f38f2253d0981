//! Fixed-size 5×5 linear algebra for track parameters.
//!
//! Two storage forms are used throughout the crate:
//! - [`SymMatrix5`]: symmetric 5×5 packed into 15 slots (upper triangle, row
//!   by row). Every covariance uses this form.
//! - [`TransportMatrix`]: dense row-major 5×5 (25 slots), `F[i][j] = ∂out_i/∂in_j`.
//!
//! ## Packed index map
//! ```text
//!       0   1   2   3   4
//!   0 [ 0   1   2   3   4 ]
//!   1 [     5   6   7   8 ]
//!   2 [         9  10  11 ]
//!   3 [            12  13 ]
//!   4 [                14 ]
//! ```
//! All covariance reads and writes go through [`sym_index`] (or
//! [`SymMatrix5::get`] / [`SymMatrix5::set`]), so the map exists only here.
//!
//! Length mismatches in the slice-level helpers are caller bugs and panic.

use crate::error::{FitError, FitResult};
use crate::types::StateVec;
use nalgebra::Matrix5;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Number of slots in a packed symmetric 5×5 matrix.
pub const SYM5_LEN: usize = 15;
/// Number of slots in a dense 5×5 matrix.
pub const DENSE5_LEN: usize = 25;

const SYM5_INDEX: [[usize; 5]; 5] = [
    [0, 1, 2, 3, 4],
    [1, 5, 6, 7, 8],
    [2, 6, 9, 10, 11],
    [3, 7, 10, 12, 13],
    [4, 8, 11, 13, 14],
];

/// Packed slot of element (i, j) of a symmetric 5×5 matrix.
#[inline]
pub const fn sym_index(i: usize, j: usize) -> usize {
    SYM5_INDEX[i][j]
}

// ---------------------------------------------------------------------------
// Slice-level kernel
// ---------------------------------------------------------------------------

/// Element-wise `out = a + b`.
pub fn add(a: &[f64], b: &[f64], out: &mut [f64]) {
    assert_eq!(a.len(), b.len(), "add: operand lengths differ");
    assert_eq!(a.len(), out.len(), "add: output length differs");
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x + y;
    }
}

/// Element-wise `out = a - b`.
pub fn subtract(a: &[f64], b: &[f64], out: &mut [f64]) {
    assert_eq!(a.len(), b.len(), "subtract: operand lengths differ");
    assert_eq!(a.len(), out.len(), "subtract: output length differs");
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

// ---------------------------------------------------------------------------
// Packed symmetric matrix
// ---------------------------------------------------------------------------

/// Symmetric 5×5 matrix stored packed in 15 slots.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymMatrix5([f64; SYM5_LEN]);

impl Default for SymMatrix5 {
    fn default() -> Self {
        Self::zeros()
    }
}

impl SymMatrix5 {
    pub const fn zeros() -> Self {
        Self([0.0; SYM5_LEN])
    }

    pub fn identity() -> Self {
        Self::from_diagonal([1.0; 5])
    }

    pub fn from_diagonal(diag: [f64; 5]) -> Self {
        let mut m = Self::zeros();
        for (i, d) in diag.into_iter().enumerate() {
            m.set(i, i, d);
        }
        m
    }

    pub const fn from_packed(values: [f64; SYM5_LEN]) -> Self {
        Self(values)
    }

    /// Build from a packed slice; panics unless it holds exactly 15 values.
    pub fn from_slice(values: &[f64]) -> Self {
        assert_eq!(
            values.len(),
            SYM5_LEN,
            "packed symmetric 5x5 needs {SYM5_LEN} values"
        );
        let mut m = Self::zeros();
        m.0.copy_from_slice(values);
        m
    }

    pub fn as_packed(&self) -> &[f64; SYM5_LEN] {
        &self.0
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[sym_index(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.0[sym_index(i, j)] = value;
    }

    /// `self[i][j] += value` (and its mirror).
    #[inline]
    pub fn add_at(&mut self, i: usize, j: usize, value: f64) {
        self.0[sym_index(i, j)] += value;
    }

    pub fn diagonal(&self) -> [f64; 5] {
        std::array::from_fn(|i| self.get(i, i))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Symmetric matrix times a 5-vector.
    pub fn mul_vec(&self, v: &StateVec) -> StateVec {
        StateVec::from_fn(|i, _| (0..5).map(|k| self.get(i, k) * v[k]).sum())
    }

    /// `self · b` (packed × dense → dense).
    pub fn mul_dense(&self, b: &TransportMatrix) -> TransportMatrix {
        let mut out = TransportMatrix::zeros();
        for i in 0..5 {
            for j in 0..5 {
                out.set(i, j, (0..5).map(|k| self.get(i, k) * b.get(k, j)).sum());
            }
        }
        out
    }

    /// Similarity transform `a · self · aᵀ`, result packed.
    pub fn similarity(&self, a: &TransportMatrix) -> SymMatrix5 {
        let ab = a.mul_sym(self);
        let mut out = SymMatrix5::zeros();
        for i in 0..5 {
            for j in i..5 {
                out.set(i, j, (0..5).map(|k| ab.get(i, k) * a.get(j, k)).sum());
            }
        }
        out
    }

    /// Inverse by explicit cofactor expansion.
    ///
    /// Works on a private dense copy. Fails with [`FitError::SingularMatrix`]
    /// when the 5×5 determinant is exactly zero or not finite.
    pub fn inverse(&self) -> FitResult<SymMatrix5> {
        let m: [[f64; 5]; 5] = std::array::from_fn(|i| std::array::from_fn(|j| self.get(i, j)));

        // Cofactors of a symmetric matrix are symmetric: the upper triangle suffices.
        let mut cof = SymMatrix5::zeros();
        for i in 0..5 {
            for j in i..5 {
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                cof.set(i, j, sign * det4(&minor::<5, 4>(&m, i, j)));
            }
        }

        let det: f64 = (0..5).map(|j| m[0][j] * cof.get(0, j)).sum();
        if det == 0.0 || !det.is_finite() {
            return Err(FitError::SingularMatrix("symmetric 5x5 inversion"));
        }

        let inv_det = 1.0 / det;
        let mut out = cof;
        out.0.iter_mut().for_each(|v| *v *= inv_det);
        Ok(out)
    }

    /// `X` with `X · self = b`, for a positive-definite `self`.
    ///
    /// LU-solves on the diagonally scaled matrix `D·self·D`,
    /// `D = diag(1/√self_ii)`, then applies one step of iterative
    /// refinement. Use this instead of [`inverse`](Self::inverse) for
    /// covariances whose diagonal spans many orders of magnitude.
    pub fn solve_right(&self, b: &TransportMatrix) -> FitResult<TransportMatrix> {
        let diag = self.diagonal();
        if diag.iter().any(|v| !(*v > 0.0) || !v.is_finite()) {
            return Err(FitError::SingularMatrix("scaled 5x5 solve"));
        }
        let d = diag.map(|v| v.sqrt().recip());
        let c = self.to_matrix();
        let lu = Matrix5::from_fn(|i, j| c[(i, j)] * d[i] * d[j]).lu();

        // X·C = B  ⇔  S·Y = D·Bᵀ with Y = D⁻¹·Xᵀ
        let solve = |rhs: &Matrix5<f64>| -> FitResult<Matrix5<f64>> {
            let y = lu
                .solve(&Matrix5::from_fn(|i, j| d[i] * rhs[(j, i)]))
                .ok_or(FitError::SingularMatrix("scaled 5x5 solve"))?;
            Ok(Matrix5::from_fn(|i, j| d[j] * y[(j, i)]))
        };

        let b = b.to_matrix();
        let mut x = solve(&b)?;
        let residual = b - x * c;
        x += solve(&residual)?;
        if !x.iter().all(|v| v.is_finite()) {
            return Err(FitError::SingularMatrix("scaled 5x5 solve"));
        }
        Ok(TransportMatrix::from_matrix(&x))
    }

    /// Inverse through [`solve_right`](Self::solve_right), symmetrised.
    pub fn inverse_scaled(&self) -> FitResult<SymMatrix5> {
        let x = self.solve_right(&TransportMatrix::identity())?;
        let mut out = SymMatrix5::zeros();
        for i in 0..5 {
            for j in i..5 {
                out.set(i, j, 0.5 * (x.get(i, j) + x.get(j, i)));
            }
        }
        Ok(out)
    }

    pub fn to_matrix(&self) -> Matrix5<f64> {
        Matrix5::from_fn(|i, j| self.get(i, j))
    }

    /// Pack the upper triangle of a dense nalgebra matrix.
    pub fn from_matrix(m: &Matrix5<f64>) -> Self {
        let mut out = Self::zeros();
        for i in 0..5 {
            for j in i..5 {
                out.set(i, j, m[(i, j)]);
            }
        }
        out
    }
}

impl Add for SymMatrix5 {
    type Output = SymMatrix5;

    fn add(self, rhs: SymMatrix5) -> SymMatrix5 {
        let mut out = SymMatrix5::zeros();
        add(&self.0, &rhs.0, &mut out.0);
        out
    }
}

impl Sub for SymMatrix5 {
    type Output = SymMatrix5;

    fn sub(self, rhs: SymMatrix5) -> SymMatrix5 {
        let mut out = SymMatrix5::zeros();
        subtract(&self.0, &rhs.0, &mut out.0);
        out
    }
}

/// Remove row `row` and column `col` from an N×N matrix.
fn minor<const N: usize, const M: usize>(a: &[[f64; N]; N], row: usize, col: usize) -> [[f64; M]; M] {
    debug_assert_eq!(M + 1, N);
    let mut out = [[0.0; M]; M];
    for (oi, i) in (0..N).filter(|&i| i != row).enumerate() {
        for (oj, j) in (0..N).filter(|&j| j != col).enumerate() {
            out[oi][oj] = a[i][j];
        }
    }
    out
}

fn det3(a: &[[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

fn det4(a: &[[f64; 4]; 4]) -> f64 {
    (0..4)
        .map(|j| {
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            sign * a[0][j] * det3(&minor::<4, 3>(a, 0, j))
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Dense transport matrix
// ---------------------------------------------------------------------------

/// Dense row-major 5×5 Jacobian mapping a state perturbation at `z_in` to
/// one at `z_out`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportMatrix([f64; DENSE5_LEN]);

impl Default for TransportMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransportMatrix {
    pub const fn zeros() -> Self {
        Self([0.0; DENSE5_LEN])
    }

    pub fn identity() -> Self {
        let mut m = Self::zeros();
        for i in 0..5 {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn from_rows(rows: [[f64; 5]; 5]) -> Self {
        let mut m = Self::zeros();
        for (i, row) in rows.iter().enumerate() {
            m.0[i * 5..i * 5 + 5].copy_from_slice(row);
        }
        m
    }

    /// Build from a row-major slice; panics unless it holds exactly 25 values.
    pub fn from_slice(values: &[f64]) -> Self {
        assert_eq!(values.len(), DENSE5_LEN, "dense 5x5 needs {DENSE5_LEN} values");
        let mut m = Self::zeros();
        m.0.copy_from_slice(values);
        m
    }

    pub fn as_slice(&self) -> &[f64; DENSE5_LEN] {
        &self.0
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[i * 5 + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.0[i * 5 + j] = value;
    }

    pub fn transpose(&self) -> TransportMatrix {
        let mut out = TransportMatrix::zeros();
        for i in 0..5 {
            for j in 0..5 {
                out.set(j, i, self.get(i, j));
            }
        }
        out
    }

    /// `self · rhs`.
    pub fn mul_dense(&self, rhs: &TransportMatrix) -> TransportMatrix {
        let mut out = TransportMatrix::zeros();
        for i in 0..5 {
            for j in 0..5 {
                out.set(i, j, (0..5).map(|k| self.get(i, k) * rhs.get(k, j)).sum());
            }
        }
        out
    }

    /// `self · b` (dense × packed → dense).
    pub fn mul_sym(&self, b: &SymMatrix5) -> TransportMatrix {
        let mut out = TransportMatrix::zeros();
        for i in 0..5 {
            for j in 0..5 {
                out.set(i, j, (0..5).map(|k| self.get(i, k) * b.get(k, j)).sum());
            }
        }
        out
    }

    pub fn mul_vec(&self, v: &StateVec) -> StateVec {
        StateVec::from_fn(|i, _| (0..5).map(|k| self.get(i, k) * v[k]).sum())
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn to_matrix(&self) -> Matrix5<f64> {
        Matrix5::from_fn(|i, j| self.get(i, j))
    }

    pub fn from_matrix(m: &Matrix5<f64>) -> Self {
        let mut out = Self::zeros();
        for i in 0..5 {
            for j in 0..5 {
                out.set(i, j, m[(i, j)]);
            }
        }
        out
    }
}

impl Mul for TransportMatrix {
    type Output = TransportMatrix;

    fn mul(self, rhs: TransportMatrix) -> TransportMatrix {
        self.mul_dense(&rhs)
    }
}
