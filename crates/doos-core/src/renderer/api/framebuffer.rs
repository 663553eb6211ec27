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

//! Offscreen render targets.

use crate::renderer::handle::Handle;

/// The public view of a framebuffer: a colour texture plus either a depth
/// texture or a render buffer, created and destroyed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBufferInfo {
    /// The colour attachment, a texture handle.
    pub texture: Handle,
    /// The depth attachment when it is a texture, else `-1`.
    pub depth_texture: Handle,
    /// The depth attachment when it is a render buffer, else `-1`.
    pub render_buffer: Handle,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl FrameBufferInfo {
    /// `true` when depth is held in a texture.
    pub fn has_depth_texture(&self) -> bool {
        self.depth_texture >= 0
    }
}
