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

use crate::renderer::api::*;
use crate::renderer::config::{RenderConfig, RendererType};
use crate::renderer::error::RenderResult;
use crate::renderer::handle::Handle;

/// A backend that owns GPU resources behind integer handles and records
/// draws and dispatches against them.
///
/// Creation calls answer [`NO_HANDLE`](crate::renderer::handle::NO_HANDLE)
/// when their table is full. Calls taking a handle ignore free or
/// out-of-range handles. Errors are reserved for failures the caller cannot
/// retry: shader compilation, linking, driver errors and frame misuse.
///
/// Calls must come from one thread at a time, in frame order:
/// `frame_begin`, then any number of passes, then `frame_end`.
pub trait RenderContext: Send {
    /// The backend this context drives.
    fn backend(&self) -> RendererType;

    /// `true` once the context is ready and until [`RenderContext::destroy`].
    fn is_initialized(&self) -> bool;

    /// The configuration the context was created with.
    fn config(&self) -> &RenderConfig;

    // --- Frames and passes ---

    /// Waits for the previous frame to finish on the GPU, then opens a new one.
    ///
    /// ## Errors
    ///
    /// [`RenderError::FrameInProgress`](crate::RenderError::FrameInProgress)
    /// when the previous frame was never ended.
    fn frame_begin(&mut self, drawables: RenderDrawables) -> RenderResult<()>;

    /// Submits the frame. With `wait_until_completed` the call returns once
    /// the GPU is done with it.
    fn frame_end(&mut self, wait_until_completed: bool) -> RenderResult<()>;

    /// Opens a pass against the screen or a framebuffer.
    fn renderpass_begin(&mut self, descriptor: &RenderPassDescriptor) -> RenderResult<()>;

    /// Closes the open pass.
    fn renderpass_end(&mut self) -> RenderResult<()>;

    // --- Textures ---

    /// Creates a 2D texture, optionally filled with `data`.
    fn add_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        data: Option<TextureData<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle>;

    /// Creates a cube texture of six `w` x `h` RGBA8 faces.
    fn add_cubemap_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        faces: Option<&CubeFaces<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle>;

    /// Replaces the whole content of a texture.
    ///
    /// Returns `false` when the handle is unknown, the data kind does not
    /// convert to the texture's format, or the data is too short.
    fn update_texture(&mut self, handle: Handle, data: TextureData<'_>) -> RenderResult<bool>;

    /// Frees a texture.
    fn remove_texture(&mut self, handle: Handle);

    /// Makes a texture visible to shaders on `channel`.
    fn bind_texture_to_channel(&mut self, handle: Handle, channel: i32, flags: SamplerFlags);

    /// Describes a texture.
    fn get_texture(&self, handle: Handle) -> Option<TextureInfo>;

    /// Reads the texture back. Nothing is written when `out` is too small.
    fn get_data_from_texture(&mut self, handle: Handle, out: &mut [u8]);

    // --- Geometry ---

    /// Creates a geometry with the given vertex layout.
    fn add_geometry(&mut self, layout: VertexLayout) -> Handle;

    /// Frees a geometry and its stream buffers.
    ///
    /// # Panics
    ///
    /// When a stream is still locked by `geometry_begin`.
    fn remove_geometry(&mut self, handle: Handle);

    /// Locks the requested streams and hands back views into their CPU shadows.
    fn geometry_begin(
        &mut self,
        handle: Handle,
        number_of_vertices: i32,
        number_of_indices: i32,
        update: GeometryStreams,
    ) -> RenderResult<GeometryLock<'_>>;

    /// Uploads the locked shadows and unlocks them.
    fn geometry_end(&mut self, handle: Handle) -> RenderResult<()>;

    /// Draws `instances` copies of the geometry's indexed triangles.
    fn geometry_draw_instanced(
        &mut self,
        handle: Handle,
        instances: u32,
        depth_test: bool,
    ) -> RenderResult<()>;

    /// Draws the geometry once with depth testing.
    fn geometry_draw(&mut self, handle: Handle) -> RenderResult<()> {
        self.geometry_draw_instanced(handle, 1, true)
    }

    // --- Buffer objects ---

    /// Creates a storage buffer of `size` bytes, initialised from `data` when given.
    fn add_buffer_object(&mut self, data: Option<&[u8]>, size: usize) -> RenderResult<Handle>;

    /// Frees a buffer object.
    fn remove_buffer_object(&mut self, handle: Handle);

    /// Writes `data` to the start of a buffer, resizing its storage if needed.
    fn update_buffer_object(&mut self, handle: Handle, data: &[u8]) -> RenderResult<()>;

    /// Binds a buffer object to a shader slot.
    fn bind_buffer_object(&mut self, handle: Handle, channel: i32, target: BindTarget);

    /// Reads back the first `out.len()` bytes of a buffer.
    fn get_data_from_buffer_object(&mut self, handle: Handle, out: &mut [u8]);

    /// Describes a buffer object.
    fn get_buffer_object(&self, handle: Handle) -> Option<BufferInfo>;

    /// Copies `size` bytes between two buffers on the GPU.
    fn copy_buffer_object_data(
        &mut self,
        source: Handle,
        destination: Handle,
        read_offset: u32,
        write_offset: u32,
        size: u32,
    ) -> RenderResult<()>;

    // --- Framebuffers ---

    /// Creates an RGBA8 render target with a depth texture or a depth render buffer.
    fn add_frame_buffer(&mut self, w: i32, h: i32, make_depth_texture: bool)
        -> RenderResult<Handle>;

    /// Frees a framebuffer and its attachments.
    fn remove_frame_buffer(&mut self, handle: Handle);

    /// Describes a framebuffer.
    fn get_frame_buffer(&self, handle: Handle) -> Option<FrameBufferInfo>;

    /// Creates a depth render buffer. Backends without render buffers answer `-1`.
    fn add_render_buffer(&mut self) -> RenderResult<Handle>;

    /// Frees a render buffer.
    fn remove_render_buffer(&mut self, handle: Handle);

    // --- Shaders and programs ---

    /// Compiles a shader. A second call with the same `name` returns the first handle.
    fn add_shader(&mut self, source: &str, stage: ShaderStage, name: &str)
        -> RenderResult<Handle>;

    /// Frees a shader and every cached pipeline built from it.
    fn remove_shader(&mut self, handle: Handle);

    /// Creates a program from a vertex/fragment pair or a compute shader.
    fn add_program(&mut self, vs: Handle, fs: Handle, cs: Handle) -> RenderResult<Handle>;

    /// Frees a program.
    fn remove_program(&mut self, handle: Handle);

    /// Makes a program current. Unlinked programs are ignored.
    fn bind_program(&mut self, handle: Handle) -> RenderResult<()>;

    // --- Uniforms ---

    /// The uniform table.
    fn uniforms(&self) -> &UniformTable;

    /// The uniform table, mutably.
    fn uniforms_mut(&mut self) -> &mut UniformTable;

    /// Declares a uniform of `num` values of `ty`.
    fn add_uniform(&mut self, name: &str, ty: UniformType, num: u16) -> Handle {
        self.uniforms_mut().add(name, ty, num)
    }

    /// Releases a uniform.
    fn remove_uniform(&mut self, handle: Handle) {
        self.uniforms_mut().remove(handle)
    }

    /// Stores raw bytes into a uniform.
    fn set_uniform(&mut self, handle: Handle, values: &[u8]) {
        self.uniforms_mut().set(handle, values)
    }

    /// Hands a uniform's current value to `program`.
    fn bind_uniform(&mut self, program: Handle, uniform: Handle) -> RenderResult<()>;

    // --- Blending ---

    /// The blend state used by subsequent draws.
    fn blend_state_mut(&mut self) -> &mut BlendState;

    /// Turns blending on or off.
    fn set_blending_enabled(&mut self, enabled: bool) {
        self.blend_state_mut().enabled = enabled;
    }

    /// Sets the source and destination factors.
    fn set_blending_function(&mut self, src: BlendFactor, dst: BlendFactor) {
        let state = self.blend_state_mut();
        state.src = src;
        state.dst = dst;
    }

    /// Sets the blend equation.
    fn set_blending_equation(&mut self, equation: BlendEquation) {
        self.blend_state_mut().equation = equation;
    }

    // --- Compute ---

    /// Runs the bound compute program over `groups` workgroups.
    ///
    /// `local_size` is the workgroup size the shader was written for. Backends
    /// that read it from the shader ignore it.
    fn dispatch_compute(&mut self, groups: [u32; 3], local_size: [u32; 3]) -> RenderResult<()>;

    // --- Queries ---

    /// Creates a timestamp query.
    fn add_query(&mut self) -> Handle;

    /// Frees a query.
    fn remove_query(&mut self, handle: Handle);

    /// Records the GPU time into the query.
    fn query_timestamp(&mut self, handle: Handle);

    /// The recorded time in nanoseconds, `u64::MAX` for an unknown handle.
    fn get_query_result(&mut self, handle: Handle) -> u64;

    // --- Lifetime ---

    /// Releases every resource. The context is unusable afterwards.
    fn destroy(&mut self);
}
