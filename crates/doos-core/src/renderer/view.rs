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

//! Camera, projection and lighting parameters of a frame.

use crate::math::{Mat4, Vec4};

/// The model/view properties an application sets once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Model to world transform.
    pub model_space: Mat4,
    /// Camera to world transform.
    pub camera_space: Mat4,
    /// Horizontal zoom factor.
    pub zoom_x: f32,
    /// Vertical zoom factor.
    pub zoom_y: f32,
    /// Horizontal centre offset.
    pub center_x: f32,
    /// Vertical centre offset.
    pub center_y: f32,
    /// Near clipping plane distance.
    pub near_clip: f32,
    /// Far clipping plane distance.
    pub far_clip: f32,
    /// Light position in world space.
    pub light_pos: Vec4,
    /// Light direction in world space.
    pub light_dir: Vec4,
    /// Light colour, packed RGBA8 with red in the low byte.
    pub light_color: u32,
    /// Orthographic projection instead of perspective.
    pub orthogonal: bool,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
}

impl ViewState {
    /// Identity transforms, unit zoom and a `[0.125, 4096]` depth range.
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            model_space: Mat4::IDENTITY,
            camera_space: Mat4::IDENTITY,
            zoom_x: 1.0,
            zoom_y: 1.0,
            center_x: 0.0,
            center_y: 0.0,
            near_clip: 0.125,
            far_clip: 4096.0,
            light_pos: Vec4::ZERO,
            light_dir: Vec4::ZERO,
            light_color: 0,
            orthogonal: false,
            viewport_width,
            viewport_height,
        }
    }

    /// The projection matrix. The view volume spans `zoom * near` on each
    /// side of the axis at the near plane.
    pub fn projection(&self) -> Mat4 {
        let top = self.zoom_y * self.near_clip;
        let right = self.zoom_x * self.near_clip;
        let (bottom, left) = (-top, -right);
        if self.orthogonal {
            Mat4::orthographic(left, right, bottom, top, self.near_clip, self.far_clip)
        } else {
            Mat4::frustum(left, right, bottom, top, self.near_clip, self.far_clip)
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
