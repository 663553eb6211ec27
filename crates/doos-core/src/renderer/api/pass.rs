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

//! Render pass descriptors and the per-frame drawable.

use super::texture::SamplerFlags;
use crate::doos_bitflags;
use crate::renderer::handle::{Handle, NO_HANDLE};
use std::any::Any;
use std::fmt;

doos_bitflags! {
    /// Which attachments a pass clears when it begins.
    pub struct ClearFlags: i32 {
        /// The colour attachment.
        const COLOR = 1;
        /// The depth attachment.
        const DEPTH = 2;
    }
}

/// Describes the target and the clears of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDescriptor {
    /// The framebuffer to render into, or `-1` for the screen.
    pub frame_buffer_handle: Handle,
    /// Texture channel the framebuffer's colour texture is bound to.
    pub frame_buffer_channel: i32,
    /// Sampler flags used when binding the framebuffer's colour texture.
    pub frame_buffer_flags: SamplerFlags,
    /// Viewport width, or `-1` to use the framebuffer's.
    pub w: i32,
    /// Viewport height, or `-1` to use the framebuffer's.
    pub h: i32,
    /// Attachments cleared at the start of the pass.
    pub clear_flags: ClearFlags,
    /// Clear colour, packed RGBA8 with red in the low byte.
    pub clear_color: u32,
    /// Clear depth.
    pub clear_depth: f32,
    /// Depth texture used when rendering to the screen, or `-1`.
    pub depth_texture_handle: Handle,
    /// `true` for a compute pass, which skips every attachment setup.
    pub compute_shader: bool,
}

impl Default for RenderPassDescriptor {
    fn default() -> Self {
        Self {
            frame_buffer_handle: NO_HANDLE,
            frame_buffer_channel: 0,
            frame_buffer_flags: SamplerFlags::REPEAT | SamplerFlags::LINEAR,
            w: -1,
            h: -1,
            clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
            clear_color: 0xff00_0000,
            clear_depth: 1.0,
            depth_texture_handle: NO_HANDLE,
            compute_shader: false,
        }
    }
}

impl RenderPassDescriptor {
    /// A descriptor for a compute pass.
    pub fn compute() -> Self {
        Self {
            compute_shader: true,
            ..Self::default()
        }
    }

    /// `true` when the pass renders to the screen.
    pub fn targets_screen(&self) -> bool {
        self.frame_buffer_handle < 0
    }

    /// The clear colour as normalized `[r, g, b, a]`.
    pub fn clear_rgba(&self) -> [f32; 4] {
        unpack_rgba8(self.clear_color)
    }

    /// The viewport size: the explicit `(w, h)` when both are set, else `fallback`.
    pub fn viewport(&self, fallback: Option<(i32, i32)>) -> Option<(i32, i32)> {
        if self.w >= 0 && self.h >= 0 {
            Some((self.w, self.h))
        } else {
            fallback
        }
    }
}

/// Unpacks an RGBA8 colour with red in the low byte.
pub fn unpack_rgba8(color: u32) -> [f32; 4] {
    color.to_le_bytes().map(|c| c as f32 / 255.0)
}

/// The surface a frame presents to, if any.
///
/// The payload is backend-specific: the command-buffer backend expects a
/// `wgpu::SurfaceTexture`. An empty drawable renders offscreen only.
#[derive(Default)]
pub struct RenderDrawables {
    screen: Option<Box<dyn Any + Send>>,
}

impl RenderDrawables {
    /// A drawable with nothing to present.
    pub fn none() -> Self {
        Self::default()
    }

    /// Wraps a backend surface.
    pub fn with_screen<T: Any + Send>(screen: T) -> Self {
        Self {
            screen: Some(Box::new(screen)),
        }
    }

    /// Takes the surface out if it has type `T`. Other payloads are kept.
    pub fn take_screen<T: Any + Send>(&mut self) -> Option<T> {
        match self.screen.take()?.downcast::<T>() {
            Ok(screen) => Some(*screen),
            Err(other) => {
                self.screen = Some(other);
                None
            }
        }
    }

    /// `true` when a surface is present.
    pub fn has_screen(&self) -> bool {
        self.screen.is_some()
    }
}

impl fmt::Debug for RenderDrawables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderDrawables")
            .field("screen", &self.screen.is_some())
            .finish()
    }
}
