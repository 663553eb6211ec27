// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the `Mat4` type, its inverses and the projection builders.

use super::{Vec3, Vec4, EPSILON};
use approx::AbsDiffEq;
use std::ops::Mul;

/// A 4x4 column-major matrix.
///
/// The memory layout is column-major, so `as_cols_array` can be handed to
/// either backend's uniform upload without transposing.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat4 {
    /// The columns of the matrix. `cols[0]` is the first column, and so on.
    pub cols: [Vec4; 4],
}

impl Mat4 {
    /// The 4x4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
    };

    /// Creates a new matrix from four column vectors.
    #[inline]
    pub fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self {
            cols: [c0, c1, c2, c3],
        }
    }

    /// Returns a row of the matrix as a `Vec4`.
    #[inline]
    pub fn get_row(&self, index: usize) -> Vec4 {
        Vec4 {
            x: self.cols[0].get(index),
            y: self.cols[1].get(index),
            z: self.cols[2].get(index),
            w: self.cols[3].get(index),
        }
    }

    /// Creates a translation matrix.
    #[inline]
    pub fn from_translation(v: Vec3) -> Self {
        Self::from_cols(Vec4::X, Vec4::Y, Vec4::Z, Vec4::from_vec3(v, 1.0))
    }

    /// Creates a rotation of `angle` radians around the Y axis.
    #[inline]
    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_cols(
            Vec4::new(c, 0.0, -s, 0.0),
            Vec4::Y,
            Vec4::new(s, 0.0, c, 0.0),
            Vec4::W,
        )
    }

    /// Creates a perspective projection from the six planes of a view frustum,
    /// mapping depth to `[-1, 1]`.
    ///
    /// # Arguments
    ///
    /// * `left`, `right`: Horizontal extents of the near plane.
    /// * `bottom`, `top`: Vertical extents of the near plane.
    /// * `near`, `far`: Distances to the clipping planes (both positive).
    pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let rml = right - left;
        let tmb = top - bottom;
        let fmn = far - near;
        Self::from_cols(
            Vec4::new(2.0 * near / rml, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * near / tmb, 0.0, 0.0),
            Vec4::new(
                (right + left) / rml,
                (top + bottom) / tmb,
                -(far + near) / fmn,
                -1.0,
            ),
            Vec4::new(0.0, 0.0, -2.0 * far * near / fmn, 0.0),
        )
    }

    /// Creates an orthographic projection mapping depth to `[-1, 1]`.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let rml = right - left;
        let tmb = top - bottom;
        let fmn = far - near;
        Self::from_cols(
            Vec4::new(2.0 / rml, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / tmb, 0.0, 0.0),
            Vec4::new(0.0, 0.0, -2.0 / fmn, 0.0),
            Vec4::new(
                -(right + left) / rml,
                -(top + bottom) / tmb,
                -(far + near) / fmn,
                1.0,
            ),
        )
    }

    /// Returns the transpose of the matrix, where rows and columns are swapped.
    #[inline]
    pub fn transpose(&self) -> Self {
        Self::from_cols(
            self.get_row(0),
            self.get_row(1),
            self.get_row(2),
            self.get_row(3),
        )
    }

    /// Computes the inverse of the matrix.
    /// Returns `None` if the matrix is not invertible.
    pub fn inverse(&self) -> Option<Self> {
        let [c0, c1, c2, c3] = self.cols;

        let a00 = c1.y * (c2.z * c3.w - c3.z * c2.w) - c2.y * (c1.z * c3.w - c3.z * c1.w)
            + c3.y * (c1.z * c2.w - c2.z * c1.w);
        let a01 = -(c1.x * (c2.z * c3.w - c3.z * c2.w) - c2.x * (c1.z * c3.w - c3.z * c1.w)
            + c3.x * (c1.z * c2.w - c2.z * c1.w));
        let a02 = c1.x * (c2.y * c3.w - c3.y * c2.w) - c2.x * (c1.y * c3.w - c3.y * c1.w)
            + c3.x * (c1.y * c2.w - c2.y * c1.w);
        let a03 = -(c1.x * (c2.y * c3.z - c3.y * c2.z) - c2.x * (c1.y * c3.z - c3.y * c1.z)
            + c3.x * (c1.y * c2.z - c2.y * c1.z));

        let a10 = -(c0.y * (c2.z * c3.w - c3.z * c2.w) - c2.y * (c0.z * c3.w - c3.z * c0.w)
            + c3.y * (c0.z * c2.w - c2.z * c0.w));
        let a11 = c0.x * (c2.z * c3.w - c3.z * c2.w) - c2.x * (c0.z * c3.w - c3.z * c0.w)
            + c3.x * (c0.z * c2.w - c2.z * c0.w);
        let a12 = -(c0.x * (c2.y * c3.w - c3.y * c2.w) - c2.x * (c0.y * c3.w - c3.y * c0.w)
            + c3.x * (c0.y * c2.w - c2.y * c0.w));
        let a13 = c0.x * (c2.y * c3.z - c3.y * c2.z) - c2.x * (c0.y * c3.z - c3.y * c0.z)
            + c3.x * (c0.y * c2.z - c2.y * c0.z);

        let a20 = c0.y * (c1.z * c3.w - c3.z * c1.w) - c1.y * (c0.z * c3.w - c3.z * c0.w)
            + c3.y * (c0.z * c1.w - c1.z * c0.w);
        let a21 = -(c0.x * (c1.z * c3.w - c3.z * c1.w) - c1.x * (c0.z * c3.w - c3.z * c0.w)
            + c3.x * (c0.z * c1.w - c1.z * c0.w));
        let a22 = c0.x * (c1.y * c3.w - c3.y * c1.w) - c1.x * (c0.y * c3.w - c3.y * c0.w)
            + c3.x * (c0.y * c1.w - c1.y * c0.w);
        let a23 = -(c0.x * (c1.y * c3.z - c3.y * c1.z) - c1.x * (c0.y * c3.z - c3.y * c0.z)
            + c3.x * (c0.y * c1.z - c1.y * c0.z));

        let a30 = -(c0.y * (c1.z * c2.w - c2.z * c1.w) - c1.y * (c0.z * c2.w - c2.z * c0.w)
            + c2.y * (c0.z * c1.w - c1.z * c0.w));
        let a31 = c0.x * (c1.z * c2.w - c2.z * c1.w) - c1.x * (c0.z * c2.w - c2.z * c0.w)
            + c2.x * (c0.z * c1.w - c1.z * c0.w);
        let a32 = -(c0.x * (c1.y * c2.w - c2.y * c1.w) - c1.x * (c0.y * c2.w - c2.y * c0.w)
            + c2.x * (c0.y * c1.w - c1.y * c0.w));
        let a33 = c0.x * (c1.y * c2.z - c2.y * c1.z) - c1.x * (c0.y * c2.z - c2.y * c0.z)
            + c2.x * (c0.y * c1.z - c1.y * c0.z);

        let det = c0.x * a00 + c1.x * a10 + c2.x * a20 + c3.x * a30;
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        Some(Self::from_cols(
            Vec4::new(a00 * inv_det, a10 * inv_det, a20 * inv_det, a30 * inv_det),
            Vec4::new(a01 * inv_det, a11 * inv_det, a21 * inv_det, a31 * inv_det),
            Vec4::new(a02 * inv_det, a12 * inv_det, a22 * inv_det, a32 * inv_det),
            Vec4::new(a03 * inv_det, a13 * inv_det, a23 * inv_det, a33 * inv_det),
        ))
    }

    /// Inverts a rigid transform (rotation plus translation).
    ///
    /// The upper 3x3 block is assumed orthonormal, so its inverse is its
    /// transpose and the translation becomes `-Rᵀ·t`. The result is wrong for
    /// matrices carrying scale or shear; use [`Mat4::inverse`] for those.
    pub fn invert_orthonormal(&self) -> Self {
        let [c0, c1, c2, c3] = self.cols;
        let t = c3.truncate();
        Self::from_cols(
            Vec4::new(c0.x, c1.x, c2.x, 0.0),
            Vec4::new(c0.y, c1.y, c2.y, 0.0),
            Vec4::new(c0.z, c1.z, c2.z, 0.0),
            Vec4::new(
                -c0.truncate().dot(t),
                -c1.truncate().dot(t),
                -c2.truncate().dot(t),
                1.0,
            ),
        )
    }

    /// Returns the 16 elements in column-major order.
    #[inline]
    pub fn to_cols_array(&self) -> [f32; 16] {
        bytemuck::cast(self.cols)
    }
}

impl Default for Mat4 {
    /// Returns the 4x4 identity matrix.
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Mat4> for Mat4 {
    type Output = Self;
    /// Matrix product. Not commutative: `a * b` applies `b` first.
    #[inline]
    fn mul(self, rhs: Mat4) -> Self::Output {
        let mut cols = [Vec4::ZERO; 4];
        for (col, rhs_col) in cols.iter_mut().zip(rhs.cols) {
            *col = self * rhs_col;
        }
        Mat4 { cols }
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;
    /// Transforms a `Vec4` by this matrix.
    #[inline]
    fn mul(self, rhs: Vec4) -> Self::Output {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z + self.cols[3] * rhs.w
    }
}

impl AbsDiffEq for Mat4 {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.cols
            .iter()
            .zip(other.cols.iter())
            .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_identity() {
        assert_eq!(Mat4::default(), Mat4::IDENTITY);
        let p = Vec4::new(1.0, 2.0, 3.0, 1.0);
        assert_eq!(Mat4::IDENTITY * p, p);
    }

    #[test]
    fn test_transpose() {
        let m = Mat4::from_cols(
            Vec4::new(1., 2., 3., 4.),
            Vec4::new(5., 6., 7., 8.),
            Vec4::new(9., 10., 11., 12.),
            Vec4::new(13., 14., 15., 16.),
        );
        let mt = m.transpose();
        assert_eq!(mt.cols[0], Vec4::new(1., 5., 9., 13.));
        assert_eq!(mt.cols[3], Vec4::new(4., 8., 12., 16.));
        assert_eq!(mt.transpose(), m);
    }

    #[test]
    fn test_mul_order() {
        let t = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let r = Mat4::from_rotation_y(PI / 2.0);
        let p = Vec4::new(1.0, 0.0, 0.0, 1.0);
        // Translate first, then rotate: (2, 0, 0) ends on -Z.
        assert_abs_diff_eq!((r * t) * p, Vec4::new(0.0, 0.0, -2.0, 1.0));
        // Rotate first, then translate.
        assert_abs_diff_eq!((t * r) * p, Vec4::new(1.0, 0.0, -1.0, 1.0));
    }

    #[test]
    fn test_inverse() {
        let m = Mat4::from_translation(Vec3::new(1., 2., 3.)) * Mat4::from_rotation_y(PI / 4.0);
        let inv = m.inverse().expect("Matrix should be invertible");
        assert_abs_diff_eq!(m * inv, Mat4::IDENTITY);

        let singular = Mat4::from_cols(Vec4::X, Vec4::ZERO, Vec4::Z, Vec4::W);
        assert!(singular.inverse().is_none());
    }

    #[test]
    fn test_invert_orthonormal_matches_general_inverse() {
        let m = Mat4::from_translation(Vec3::new(-4.0, 0.5, 12.0)) * Mat4::from_rotation_y(0.7);
        let general = m.inverse().expect("rigid transforms are invertible");
        assert_abs_diff_eq!(m.invert_orthonormal(), general, epsilon = 1e-4);
    }

    #[test]
    fn test_frustum_layout() {
        let (n, f) = (0.125, 4096.0);
        let m = Mat4::frustum(-n, n, -n, n, n, f);
        assert_abs_diff_eq!(m.cols[0], Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_abs_diff_eq!(m.cols[1], Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_abs_diff_eq!(m.cols[2].z, -(f + n) / (f - n));
        assert_eq!(m.cols[2].w, -1.0);
        assert_abs_diff_eq!(m.cols[3].z, -2.0 * f * n / (f - n), epsilon = 1e-3);
        assert_eq!(m.cols[3].w, 0.0);
    }

    #[test]
    fn test_frustum_maps_near_and_far_to_clip_bounds() {
        let m = Mat4::frustum(-1.0, 1.0, -1.0, 1.0, 1.0, 10.0);
        let near = m * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far = m * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert_abs_diff_eq!(near.z / near.w, -1.0);
        assert_abs_diff_eq!(far.z / far.w, 1.0);
    }

    #[test]
    fn test_orthographic_maps_box_to_unit_cube() {
        let m = Mat4::orthographic(-2.0, 2.0, -1.0, 1.0, 0.5, 8.0);
        assert_abs_diff_eq!(m * Vec4::new(2.0, 1.0, -0.5, 1.0), Vec4::new(1.0, 1.0, -1.0, 1.0));
        assert_abs_diff_eq!(m * Vec4::new(-2.0, -1.0, -8.0, 1.0), Vec4::new(-1.0, -1.0, 1.0, 1.0));
    }

    #[test]
    fn test_cols_array_is_column_major() {
        let m = Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0));
        let a = m.to_cols_array();
        assert_eq!(&a[12..], &[7.0, 8.0, 9.0, 1.0]);
    }
}
