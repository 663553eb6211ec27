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

//! The direct-state render context.

use super::api::{GlApi, GlName};
use super::conversions;
use doos_core::renderer::api::*;
use doos_core::renderer::handle::{
    Handle, SlotTable, MAX_BUFFER_OBJECTS, MAX_FRAME_BUFFERS, MAX_GEOMETRIES, MAX_PROGRAMS,
    MAX_QUERIES, MAX_RENDER_BUFFERS, MAX_SHADERS, MAX_TEXTURES, MAX_TEXTURE_CHANNELS, NO_HANDLE,
};
use doos_core::renderer::{FrameThrottle, RenderConfig, RendererType};
use doos_core::{RenderContext, RenderError, RenderResult};

#[derive(Debug)]
struct GlTexture {
    info: TextureInfo,
    name: GlName,
}

#[derive(Debug)]
struct GlGeometry {
    record: GeometryRecord,
    vao: GlName,
}

#[derive(Debug)]
struct GlFrameBuffer {
    info: FrameBufferInfo,
    name: GlName,
}

fn gl_texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::D2 => glow::TEXTURE_2D,
        TextureTarget::Cube => glow::TEXTURE_CUBE_MAP,
    }
}

fn gl_shader_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
    }
}

/// A [`RenderContext`] that talks to OpenGL 4.5 through a [`GlApi`].
///
/// Every resource is created eagerly and bound on demand. Geometry streams
/// and storage buffers share one buffer table; transfers go through the
/// `COPY_READ`/`COPY_WRITE` binding points so they never disturb the vertex
/// array state.
#[derive(Debug)]
pub struct GlRenderContext<G: GlApi> {
    gl: G,
    config: RenderConfig,
    initialized: bool,
    textures: SlotTable<GlTexture>,
    geometries: SlotTable<GlGeometry>,
    buffers: SlotTable<BufferRecord<GlName>>,
    shaders: SlotTable<ShaderRecord<GlName>>,
    programs: SlotTable<ProgramRecord<GlName>>,
    frame_buffers: SlotTable<GlFrameBuffer>,
    render_buffers: SlotTable<GlName>,
    uniforms: UniformTable,
    queries: SlotTable<GlName>,
    blend: BlendState,
    throttle: FrameThrottle,
    frame_open: bool,
}

impl<G: GlApi> GlRenderContext<G> {
    /// Creates a context over `gl`, which must be current on this thread.
    pub fn new(gl: G, config: RenderConfig) -> Self {
        gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        log::info!(
            "GlRenderContext: created (strict uniforms: {}, driver checks: {})",
            config.strict_uniforms,
            config.check_driver_errors
        );
        Self {
            gl,
            config,
            initialized: true,
            textures: SlotTable::new(MAX_TEXTURES),
            geometries: SlotTable::new(MAX_GEOMETRIES),
            buffers: SlotTable::new(MAX_BUFFER_OBJECTS),
            shaders: SlotTable::new(MAX_SHADERS),
            programs: SlotTable::new(MAX_PROGRAMS),
            frame_buffers: SlotTable::new(MAX_FRAME_BUFFERS),
            render_buffers: SlotTable::new(MAX_RENDER_BUFFERS),
            uniforms: UniformTable::new(),
            queries: SlotTable::new(MAX_QUERIES),
            blend: BlendState::default(),
            throttle: FrameThrottle::new(),
            frame_open: false,
        }
    }

    /// The API calls are issued through.
    pub fn gl(&self) -> &G {
        &self.gl
    }

    /// Polls the driver's error queue when `check_driver_errors` is set.
    ///
    /// The whole queue is drained; the first code is reported.
    #[track_caller]
    fn check(&self) -> RenderResult<()> {
        if !self.config.check_driver_errors {
            return Ok(());
        }
        let code = self.gl.get_error();
        if code == glow::NO_ERROR {
            return Ok(());
        }
        // A lost context can report errors forever.
        for _ in 0..32 {
            if self.gl.get_error() == glow::NO_ERROR {
                break;
            }
        }
        let err = RenderError::driver(code, conversions::error_name(code));
        log::error!("GlRenderContext: {err}");
        Err(err)
    }

    fn upload_texels(&self, target: u32, info: &TextureInfo, data: TextureData<'_>) -> bool {
        let format = conversions::upload_format(info.format);
        let packed = pack_texels(info.format, info.width, info.height, data);
        match (format, packed) {
            (Some((format, ty)), Some(bytes)) => {
                self.gl
                    .tex_sub_image_2d(target, info.width, info.height, format, ty, &bytes);
                true
            }
            _ => false,
        }
    }

    fn create_texture(
        &mut self,
        info: TextureInfo,
        upload: impl FnOnce(&Self, &TextureInfo),
    ) -> RenderResult<Handle> {
        let handle = self.textures.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: texture table is full");
            return Ok(NO_HANDLE);
        }
        if info.format == TextureFormat::None {
            log::warn!("GlRenderContext: textures need a format");
            return Ok(NO_HANDLE);
        }
        if info.width <= 0 || info.height <= 0 {
            log::warn!(
                "GlRenderContext: texture size {}x{} is not supported",
                info.width,
                info.height
            );
            return Ok(NO_HANDLE);
        }
        let target = gl_texture_target(info.target);
        let name = self.gl.create_texture().map_err(RenderError::Backend)?;
        self.gl.bind_texture(target, name);
        self.gl.tex_storage_2d(
            target,
            1,
            conversions::internal_format(info.format),
            info.width,
            info.height,
        );
        upload(&*self, &info);
        self.gl.bind_texture(target, 0);
        self.textures.insert_at(handle, GlTexture { info, name });
        self.check()?;
        log::debug!(
            "GlRenderContext: created {:?} texture {handle} ({}x{} {:?})",
            info.target,
            info.width,
            info.height,
            info.format
        );
        Ok(handle)
    }

    /// Allocates native storage for a geometry stream after `reserve_stream`.
    fn allocate_stream(&mut self, buffer: Handle, alloc: StreamAlloc) -> RenderResult<()> {
        let Some(record) = self.buffers.get_mut(buffer) else {
            return Ok(());
        };
        let fresh = record.native.is_none();
        let name = match record.native {
            Some(name) => name,
            None => {
                let name = self.gl.create_buffer().map_err(RenderError::Backend)?;
                record.native = Some(name);
                name
            }
        };
        if fresh || alloc == StreamAlloc::Reallocated {
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, name);
            self.gl
                .buffer_data_size(glow::COPY_WRITE_BUFFER, record.size as i32, glow::DYNAMIC_DRAW);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, 0);
        }
        self.check()
    }

    /// Reserves one stream of a geometry and gives it native storage.
    ///
    /// The stream is marked locked only once both steps succeed. Returns the
    /// stream's buffer, or `None` when the stream is already open.
    fn open_stream(
        &mut self,
        handle: Handle,
        stream: GeometryStreams,
        count: i32,
    ) -> RenderResult<Option<Handle>> {
        let Some(geometry) = self.geometries.get_mut(handle) else {
            return Ok(None);
        };
        let record = &mut geometry.record;
        if record.locked.contains(stream) {
            return Ok(None);
        }
        let (target, kind, element_size) = if stream == GeometryStreams::VERTEX {
            (&mut record.vertex, BufferKind::Vertex, record.layout.stride())
        } else {
            (&mut record.index, BufferKind::Index, std::mem::size_of::<u32>())
        };
        let alloc = reserve_stream(&mut self.buffers, target, kind, count, element_size)?;
        let buffer = target.buffer;
        self.allocate_stream(buffer, alloc)?;
        if let Some(geometry) = self.geometries.get_mut(handle) {
            geometry.record.locked.insert(stream);
        }
        Ok(Some(buffer))
    }

    fn unlock_stream(&mut self, handle: Handle, stream: GeometryStreams) {
        if let Some(geometry) = self.geometries.get_mut(handle) {
            geometry.record.locked.remove(stream);
        }
    }

    fn upload_stream(&self, buffer: Handle) {
        let Some(record) = self.buffers.get(buffer) else {
            return;
        };
        let Some(name) = record.native else {
            return;
        };
        let bytes = record.shadow_bytes();
        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, name);
        self.gl
            .buffer_data_size(glow::COPY_WRITE_BUFFER, bytes.len() as i32, glow::DYNAMIC_DRAW);
        self.gl.buffer_sub_data(glow::COPY_WRITE_BUFFER, 0, bytes);
        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, 0);
    }

    fn release_buffer(&mut self, handle: Handle) {
        if let Some(record) = self.buffers.remove(handle) {
            if let Some(name) = record.native {
                self.gl.delete_buffer(name);
            }
        }
    }

    fn apply_blend_state(&self) {
        if !self.blend.enabled {
            self.gl.disable(glow::BLEND);
            return;
        }
        self.gl.enable(glow::BLEND);
        self.gl.blend_func(
            conversions::blend_factor(self.blend.src),
            conversions::blend_factor(self.blend.dst),
        );
        self.gl
            .blend_equation(conversions::blend_equation(self.blend.equation));
    }

    fn upload_uniform(&self, location: u32, uniform: &UniformRecord) {
        let floats = || -> Vec<f32> {
            uniform
                .raw
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect()
        };
        let ints = || -> Vec<i32> {
            uniform
                .raw
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<i32>)
                .collect()
        };
        let components = uniform.ty.components();
        match uniform.ty {
            UniformType::Sampler | UniformType::Integer => {
                self.gl.uniform_i32(location, 1, &ints())
            }
            UniformType::Uvec2 | UniformType::Uvec3 | UniformType::Uvec4 => {
                self.gl.uniform_i32(location, components, &ints())
            }
            UniformType::Real
            | UniformType::Vec2
            | UniformType::Vec3
            | UniformType::Vec4 => self.gl.uniform_f32(location, components, &floats()),
            UniformType::Mat3 => self.gl.uniform_matrix_f32(location, 3, &floats()),
            UniformType::Mat4 => self.gl.uniform_matrix_f32(location, 4, &floats()),
        }
    }
}

impl<G: GlApi> RenderContext for GlRenderContext<G> {
    fn backend(&self) -> RendererType {
        RendererType::OpenGl
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn frame_begin(&mut self, drawables: RenderDrawables) -> RenderResult<()> {
        if self.frame_open {
            log::error!("GlRenderContext: frame_begin called twice without frame_end");
            return Err(RenderError::FrameInProgress);
        }
        if drawables.has_screen() {
            log::trace!("GlRenderContext: drawable ignored, the window system presents");
        }
        self.throttle.acquire();
        self.frame_open = true;
        Ok(())
    }

    fn frame_end(&mut self, wait_until_completed: bool) -> RenderResult<()> {
        if !self.frame_open {
            log::error!("GlRenderContext: frame_end called without an open frame");
            return Err(RenderError::NoFrameInProgress);
        }
        if wait_until_completed {
            self.gl.finish();
        }
        self.frame_open = false;
        self.throttle.release();
        self.check()
    }

    fn renderpass_begin(&mut self, descriptor: &RenderPassDescriptor) -> RenderResult<()> {
        if descriptor.compute_shader {
            return Ok(());
        }

        let viewport = if descriptor.targets_screen() {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, 0);
            descriptor.viewport(None)
        } else {
            let Some(fb) = self.frame_buffers.get(descriptor.frame_buffer_handle) else {
                log::warn!(
                    "GlRenderContext: render pass targets unknown framebuffer {}",
                    descriptor.frame_buffer_handle
                );
                return Ok(());
            };
            let (name, info) = (fb.name, fb.info);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, name);
            self.bind_texture_to_channel(
                info.texture,
                descriptor.frame_buffer_channel,
                descriptor.frame_buffer_flags,
            );
            descriptor.viewport(Some((info.width, info.height)))
        };
        if let Some((w, h)) = viewport {
            self.gl.viewport(0, 0, w, h);
        }

        let mut mask = 0;
        if descriptor.clear_flags.contains(ClearFlags::COLOR) {
            let [r, g, b, a] = descriptor.clear_rgba();
            self.gl.clear_color(r, g, b, a);
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if descriptor.clear_flags.contains(ClearFlags::DEPTH) {
            self.gl.clear_depth(descriptor.clear_depth);
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if mask != 0 {
            self.gl.clear(mask);
        }
        self.check()
    }

    fn renderpass_end(&mut self) -> RenderResult<()> {
        Ok(())
    }

    fn add_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        data: Option<TextureData<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle> {
        let info = TextureInfo {
            width: w,
            height: h,
            format,
            usage,
            target: TextureTarget::D2,
        };
        self.create_texture(info, |ctx, info| {
            if let Some(data) = data {
                if !ctx.upload_texels(glow::TEXTURE_2D, info, data) {
                    log::warn!("GlRenderContext: initial data does not fit a {format:?} texture");
                }
            }
        })
    }

    fn add_cubemap_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        faces: Option<&CubeFaces<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle> {
        let info = TextureInfo {
            width: w,
            height: h,
            format,
            usage,
            target: TextureTarget::Cube,
        };
        self.create_texture(info, |ctx, info| {
            let Some(faces) = faces else {
                return;
            };
            for (layer, face) in faces.in_layer_order().into_iter().enumerate() {
                let target = glow::TEXTURE_CUBE_MAP_POSITIVE_X + layer as u32;
                if !ctx.upload_texels(target, info, TextureData::Bytes(face)) {
                    log::warn!("GlRenderContext: cube face {layer} skipped");
                }
            }
        })
    }

    fn update_texture(&mut self, handle: Handle, data: TextureData<'_>) -> RenderResult<bool> {
        let Some(texture) = self.textures.get(handle) else {
            return Ok(false);
        };
        if texture.info.target != TextureTarget::D2 {
            log::warn!("GlRenderContext: update_texture only replaces 2D textures");
            return Ok(false);
        }
        let (info, name) = (texture.info, texture.name);
        self.gl.bind_texture(glow::TEXTURE_2D, name);
        let uploaded = self.upload_texels(glow::TEXTURE_2D, &info, data);
        self.gl.bind_texture(glow::TEXTURE_2D, 0);
        self.check()?;
        Ok(uploaded)
    }

    fn remove_texture(&mut self, handle: Handle) {
        if let Some(texture) = self.textures.remove(handle) {
            self.gl.delete_texture(texture.name);
            log::debug!("GlRenderContext: removed texture {handle}");
        }
    }

    fn bind_texture_to_channel(&mut self, handle: Handle, channel: i32, flags: SamplerFlags) {
        if !(0..MAX_TEXTURE_CHANNELS as i32).contains(&channel) {
            log::warn!("GlRenderContext: texture channel {channel} out of range");
            return;
        }
        let Some(texture) = self.textures.get(handle) else {
            return;
        };
        let unit = channel as u32;
        let target = gl_texture_target(texture.info.target);
        let (wrap, min, mag) = conversions::sampler_parameters(flags);

        self.gl.active_texture(unit);
        self.gl.bind_texture(target, texture.name);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap);
        if target == glow::TEXTURE_CUBE_MAP {
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap);
        }
        self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag);

        // Image units cannot hold depth or cube textures.
        if target == glow::TEXTURE_2D && !texture.info.format.is_depth() {
            let access = image_access(texture.info.usage, flags);
            self.gl.bind_image_texture(
                unit,
                texture.name,
                conversions::image_access(access),
                conversions::internal_format(texture.info.format),
            );
        }
    }

    fn get_texture(&self, handle: Handle) -> Option<TextureInfo> {
        self.textures.get(handle).map(|t| t.info)
    }

    fn get_data_from_texture(&mut self, handle: Handle, out: &mut [u8]) {
        let Some(texture) = self.textures.get(handle) else {
            return;
        };
        let info = texture.info;
        if info.target != TextureTarget::D2 {
            log::warn!("GlRenderContext: cube textures cannot be read back");
            return;
        }
        let (Some(bytes_per_texel), Some((format, ty))) = (
            info.format.readback_bytes_per_texel(),
            conversions::readback_format(info.format),
        ) else {
            log::warn!("GlRenderContext: {:?} textures cannot be read back", info.format);
            return;
        };
        let needed = info.texel_count() * bytes_per_texel;
        if out.len() < needed {
            return;
        }

        self.gl.bind_texture(glow::TEXTURE_2D, texture.name);
        if info.format == TextureFormat::Rgba32f {
            let mut staging = vec![0u8; info.texel_count() * 16];
            self.gl
                .get_tex_image(glow::TEXTURE_2D, format, ty, &mut staging);
            let floats: Vec<f32> = staging
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();
            narrow_rgba32f(&floats, &mut out[..needed]);
        } else {
            self.gl
                .get_tex_image(glow::TEXTURE_2D, format, ty, &mut out[..needed]);
        }
        self.gl.bind_texture(glow::TEXTURE_2D, 0);
    }

    fn add_geometry(&mut self, layout: VertexLayout) -> Handle {
        let handle = self.geometries.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: geometry table is full");
            return NO_HANDLE;
        }
        let vao = match self.gl.create_vertex_array() {
            Ok(vao) => vao,
            Err(e) => {
                log::error!("GlRenderContext: failed to create a vertex array: {e}");
                return NO_HANDLE;
            }
        };
        self.geometries.insert_at(
            handle,
            GlGeometry {
                record: GeometryRecord::new(layout),
                vao,
            },
        );
        log::debug!("GlRenderContext: created {layout:?} geometry {handle}");
        handle
    }

    fn remove_geometry(&mut self, handle: Handle) {
        if let Some(geometry) = self.geometries.get(handle) {
            assert!(
                geometry.record.locked.is_empty(),
                "geometry {handle} removed while locked"
            );
        }
        let Some(geometry) = self.geometries.remove(handle) else {
            return;
        };
        self.gl.delete_vertex_array(geometry.vao);
        self.release_buffer(geometry.record.vertex.buffer);
        self.release_buffer(geometry.record.index.buffer);
        log::debug!("GlRenderContext: removed geometry {handle}");
    }

    fn geometry_begin(
        &mut self,
        handle: Handle,
        number_of_vertices: i32,
        number_of_indices: i32,
        update: GeometryStreams,
    ) -> RenderResult<GeometryLock<'_>> {
        if !self.geometries.contains(handle) {
            return Ok(GeometryLock::default());
        }
        let vertex = if update.contains(GeometryStreams::VERTEX) {
            self.open_stream(handle, GeometryStreams::VERTEX, number_of_vertices)?
        } else {
            None
        };
        let index = if update.contains(GeometryStreams::INDEX) {
            match self.open_stream(handle, GeometryStreams::INDEX, number_of_indices) {
                Ok(index) => index,
                Err(e) => {
                    if vertex.is_some() {
                        self.unlock_stream(handle, GeometryStreams::VERTEX);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };
        Ok(lock_views(&mut self.buffers, vertex, index))
    }

    fn geometry_end(&mut self, handle: Handle) -> RenderResult<()> {
        let Some(geometry) = self.geometries.get_mut(handle) else {
            return Ok(());
        };
        let record = &mut geometry.record;
        let locked = std::mem::take(&mut record.locked);
        let (vertex, index) = (record.vertex.buffer, record.index.buffer);

        if locked.contains(GeometryStreams::VERTEX) {
            self.upload_stream(vertex);
        }
        if locked.contains(GeometryStreams::INDEX) {
            self.upload_stream(index);
        }
        self.check()
    }

    fn geometry_draw_instanced(
        &mut self,
        handle: Handle,
        instances: u32,
        depth_test: bool,
    ) -> RenderResult<()> {
        let Some(geometry) = self.geometries.get(handle) else {
            return Ok(());
        };
        let record = &geometry.record;
        let native = |stream: &StreamRef| self.buffers.get(stream.buffer).and_then(|b| b.native);
        let (Some(vertex_buffer), Some(index_buffer)) =
            (native(&record.vertex), native(&record.index))
        else {
            log::trace!("GlRenderContext: geometry {handle} has no uploaded streams");
            return Ok(());
        };
        if record.index.count <= 0 {
            return Ok(());
        }

        self.apply_blend_state();
        self.gl.bind_vertex_array(geometry.vao);
        self.gl.bind_buffer(glow::ARRAY_BUFFER, vertex_buffer);
        self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, index_buffer);

        let stride = record.layout.stride() as i32;
        for attribute in record.layout.attributes() {
            self.gl.enable_vertex_attrib_array(attribute.location);
            match attribute.kind {
                VertexAttributeKind::Float32 => self.gl.vertex_attrib_pointer_f32(
                    attribute.location,
                    attribute.components,
                    glow::FLOAT,
                    false,
                    stride,
                    attribute.offset,
                ),
                VertexAttributeKind::Uint32 => self.gl.vertex_attrib_pointer_i32(
                    attribute.location,
                    attribute.components,
                    glow::UNSIGNED_INT,
                    stride,
                    attribute.offset,
                ),
            }
        }

        if depth_test {
            self.gl.enable(glow::DEPTH_TEST);
        } else {
            self.gl.disable(glow::DEPTH_TEST);
        }
        self.gl.draw_elements_instanced(
            glow::TRIANGLES,
            record.index.count,
            glow::UNSIGNED_INT,
            0,
            instances as i32,
        );
        self.gl.bind_vertex_array(0);
        self.gl.bind_buffer(glow::ARRAY_BUFFER, 0);

        log::trace!(
            "GlRenderContext: drew geometry {handle} ({} indices x {instances})",
            record.index.count
        );
        self.check()
    }

    fn add_buffer_object(&mut self, data: Option<&[u8]>, size: usize) -> RenderResult<Handle> {
        if size == 0 {
            return Ok(NO_HANDLE);
        }
        let handle = self.buffers.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: buffer table is full");
            return Ok(NO_HANDLE);
        }

        let name = self.gl.create_buffer().map_err(RenderError::Backend)?;
        let target = glow::SHADER_STORAGE_BUFFER;
        self.gl.bind_buffer(target, name);
        match data {
            Some(data) if data.len() >= size => {
                self.gl.buffer_data(target, &data[..size], glow::DYNAMIC_DRAW)
            }
            Some(data) => {
                self.gl.buffer_data_size(target, size as i32, glow::DYNAMIC_DRAW);
                self.gl.buffer_sub_data(target, 0, data);
            }
            None => self.gl.buffer_data_size(target, size as i32, glow::DYNAMIC_DRAW),
        }
        self.gl.bind_buffer(target, 0);
        self.buffers
            .insert_at(handle, BufferRecord::compute(size, name));
        self.check()?;
        log::debug!("GlRenderContext: created buffer object {handle} ({size} bytes)");
        Ok(handle)
    }

    fn remove_buffer_object(&mut self, handle: Handle) {
        if self.buffers.contains(handle) {
            self.release_buffer(handle);
            log::debug!("GlRenderContext: removed buffer object {handle}");
        }
    }

    fn update_buffer_object(&mut self, handle: Handle, data: &[u8]) -> RenderResult<()> {
        let Some(record) = self.buffers.get_mut(handle) else {
            return Ok(());
        };
        let Some(name) = record.native else {
            return Ok(());
        };

        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, name);
        if data.len() != record.size {
            self.gl
                .buffer_data_size(glow::COPY_WRITE_BUFFER, data.len() as i32, glow::DYNAMIC_DRAW);
            record.size = data.len();
        }
        self.gl.buffer_sub_data(glow::COPY_WRITE_BUFFER, 0, data);
        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, 0);

        // Geometry streams keep their shadow in step with the GPU copy.
        if let Some(shadow) = record.shadow.as_mut() {
            let words = words_for(data.len()).max(shadow.len());
            shadow.resize(words, 0);
            bytemuck::cast_slice_mut::<u32, u8>(shadow)[..data.len()].copy_from_slice(data);
        }
        self.check()
    }

    fn bind_buffer_object(&mut self, handle: Handle, channel: i32, _target: BindTarget) {
        let Ok(index) = u32::try_from(channel) else {
            log::warn!("GlRenderContext: buffer channel {channel} out of range");
            return;
        };
        let Some(name) = self.buffers.get(handle).and_then(|b| b.native) else {
            return;
        };
        // Every kind is visible to shaders as storage, vertex streams included.
        self.gl
            .bind_buffer_base(glow::SHADER_STORAGE_BUFFER, index, name);
    }

    fn get_data_from_buffer_object(&mut self, handle: Handle, out: &mut [u8]) {
        let Some(record) = self.buffers.get(handle) else {
            return;
        };
        let Some(name) = record.native else {
            return;
        };
        let n = out.len().min(record.size);
        self.gl.bind_buffer(glow::COPY_READ_BUFFER, name);
        self.gl
            .get_buffer_sub_data(glow::COPY_READ_BUFFER, 0, &mut out[..n]);
        self.gl.bind_buffer(glow::COPY_READ_BUFFER, 0);
    }

    fn get_buffer_object(&self, handle: Handle) -> Option<BufferInfo> {
        self.buffers.get(handle).map(BufferRecord::info)
    }

    fn copy_buffer_object_data(
        &mut self,
        source: Handle,
        destination: Handle,
        read_offset: u32,
        write_offset: u32,
        size: u32,
    ) -> RenderResult<()> {
        let (Some(src), Some(dst)) = (self.buffers.get(source), self.buffers.get(destination))
        else {
            return Ok(());
        };
        let (Some(src_name), Some(dst_name)) = (src.native, dst.native) else {
            return Ok(());
        };
        let fits = |offset: u32, capacity: usize| offset as usize + size as usize <= capacity;
        if !fits(read_offset, src.size) || !fits(write_offset, dst.size) {
            log::warn!("GlRenderContext: buffer copy of {size} bytes is out of bounds");
            return Ok(());
        }

        self.gl.bind_buffer(glow::COPY_READ_BUFFER, src_name);
        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, dst_name);
        self.gl.copy_buffer_sub_data(
            glow::COPY_READ_BUFFER,
            glow::COPY_WRITE_BUFFER,
            read_offset as i32,
            write_offset as i32,
            size as i32,
        );
        self.gl.bind_buffer(glow::COPY_READ_BUFFER, 0);
        self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, 0);
        self.check()
    }

    fn add_frame_buffer(
        &mut self,
        w: i32,
        h: i32,
        make_depth_texture: bool,
    ) -> RenderResult<Handle> {
        let handle = self.frame_buffers.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: framebuffer table is full");
            return Ok(NO_HANDLE);
        }

        let usage = TextureUsage::RENDER_TARGET | TextureUsage::READ;
        let texture = self.add_texture(w, h, TextureFormat::Rgba8, None, usage)?;
        if texture == NO_HANDLE {
            return Ok(NO_HANDLE);
        }
        let (depth_texture, render_buffer) = if make_depth_texture {
            let depth = self.add_texture(
                w,
                h,
                TextureFormat::Depth,
                None,
                TextureUsage::RENDER_TARGET,
            )?;
            (depth, NO_HANDLE)
        } else {
            (NO_HANDLE, self.add_render_buffer()?)
        };
        let info = FrameBufferInfo {
            texture,
            depth_texture,
            render_buffer,
            width: w,
            height: h,
        };
        if depth_texture == NO_HANDLE && render_buffer == NO_HANDLE {
            self.remove_texture(texture);
            return Ok(NO_HANDLE);
        }

        let name = self.gl.create_framebuffer().map_err(RenderError::Backend)?;
        self.gl.bind_framebuffer(glow::FRAMEBUFFER, name);
        if let Some(color) = self.textures.get(texture) {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                color.name,
            );
        }
        if let Some(depth) = self.textures.get(depth_texture) {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::TEXTURE_2D,
                depth.name,
            );
        } else if let Some(&rb) = self.render_buffers.get(render_buffer) {
            self.gl.bind_renderbuffer(rb);
            self.gl.renderbuffer_storage(glow::DEPTH_COMPONENT24, w, h);
            self.gl
                .framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, rb);
            self.gl.bind_renderbuffer(0);
        }
        let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
        self.gl.bind_framebuffer(glow::FRAMEBUFFER, 0);

        let bundle = GlFrameBuffer { info, name };
        if status != glow::FRAMEBUFFER_COMPLETE {
            self.release_frame_buffer(bundle);
            log::error!("GlRenderContext: framebuffer incomplete ({status:#06x})");
            return Err(RenderError::IncompleteFrameBuffer { status });
        }
        self.frame_buffers.insert_at(handle, bundle);
        self.check()?;
        log::debug!("GlRenderContext: created framebuffer {handle} ({w}x{h})");
        Ok(handle)
    }

    fn remove_frame_buffer(&mut self, handle: Handle) {
        if let Some(bundle) = self.frame_buffers.remove(handle) {
            self.release_frame_buffer(bundle);
            log::debug!("GlRenderContext: removed framebuffer {handle}");
        }
    }

    fn get_frame_buffer(&self, handle: Handle) -> Option<FrameBufferInfo> {
        self.frame_buffers.get(handle).map(|fb| fb.info)
    }

    fn add_render_buffer(&mut self) -> RenderResult<Handle> {
        let handle = self.render_buffers.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: render buffer table is full");
            return Ok(NO_HANDLE);
        }
        let name = self
            .gl
            .create_renderbuffer()
            .map_err(RenderError::Backend)?;
        self.render_buffers.insert_at(handle, name);
        Ok(handle)
    }

    fn remove_render_buffer(&mut self, handle: Handle) {
        if let Some(name) = self.render_buffers.remove(handle) {
            self.gl.delete_renderbuffer(name);
        }
    }

    fn add_shader(
        &mut self,
        source: &str,
        stage: ShaderStage,
        name: &str,
    ) -> RenderResult<Handle> {
        if let Some((handle, _)) = self.shaders.iter().find(|(_, s)| s.name == name) {
            return Ok(handle);
        }
        let handle = self.shaders.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: shader table is full");
            return Ok(NO_HANDLE);
        }

        let shader = self
            .gl
            .create_shader(gl_shader_stage(stage))
            .map_err(RenderError::Backend)?;
        self.gl.shader_source(shader, source);
        self.gl.compile_shader(shader);
        if !self.gl.get_shader_compile_status(shader) {
            let log = self.gl.get_shader_info_log(shader);
            self.gl.delete_shader(shader);
            log::error!("GlRenderContext: shader '{name}' failed to compile:\n{log}");
            return Err(RenderError::ShaderCompilation {
                name: name.to_owned(),
                log,
            });
        }

        self.shaders.insert_at(
            handle,
            ShaderRecord {
                stage,
                name: name.to_owned(),
                compiled: true,
                native: shader,
            },
        );
        log::debug!("GlRenderContext: compiled {stage:?} shader '{name}' as {handle}");
        Ok(handle)
    }

    fn remove_shader(&mut self, handle: Handle) {
        if let Some(shader) = self.shaders.remove(handle) {
            self.gl.delete_shader(shader.native);
            log::debug!("GlRenderContext: removed shader '{}'", shader.name);
        }
    }

    fn add_program(&mut self, vs: Handle, fs: Handle, cs: Handle) -> RenderResult<Handle> {
        if !program_triple_is_valid(vs, fs, cs) {
            log::warn!("GlRenderContext: invalid program triple ({vs}, {fs}, {cs})");
            return Ok(NO_HANDLE);
        }
        if let Some((handle, _)) = self.programs.iter().find(|(_, p)| p.matches(vs, fs, cs)) {
            return Ok(handle);
        }
        let handle = self.programs.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: program table is full");
            return Ok(NO_HANDLE);
        }

        let stages: Vec<GlName> = [vs, fs, cs]
            .into_iter()
            .filter(|&h| h >= 0)
            .filter_map(|h| self.shaders.get(h))
            .filter(|s| s.compiled)
            .map(|s| s.native)
            .collect();
        let expected = [vs, fs, cs].iter().filter(|&&h| h >= 0).count();
        let ready = stages.len() == expected;

        let program = self.gl.create_program().map_err(RenderError::Backend)?;
        if ready {
            for &shader in &stages {
                self.gl.attach_shader(program, shader);
            }
            self.gl.link_program(program);
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                log::error!("GlRenderContext: program {handle} failed to link:\n{log}");
                return Err(RenderError::ProgramLink {
                    program: handle,
                    log,
                });
            }
            for &shader in &stages {
                self.gl.detach_shader(program, shader);
            }
        }

        self.programs.insert_at(
            handle,
            ProgramRecord {
                vs,
                fs,
                cs,
                linked: ready,
                native: program,
            },
        );
        log::debug!("GlRenderContext: created program {handle} (linked: {ready})");
        Ok(handle)
    }

    fn remove_program(&mut self, handle: Handle) {
        if let Some(program) = self.programs.remove(handle) {
            self.gl.delete_program(program.native);
            log::debug!("GlRenderContext: removed program {handle}");
        }
    }

    fn bind_program(&mut self, handle: Handle) -> RenderResult<()> {
        let Some(program) = self.programs.get(handle).filter(|p| p.linked) else {
            return Ok(());
        };
        self.gl.use_program(program.native);
        self.check()
    }

    fn uniforms(&self) -> &UniformTable {
        &self.uniforms
    }

    fn uniforms_mut(&mut self) -> &mut UniformTable {
        &mut self.uniforms
    }

    fn bind_uniform(&mut self, program: Handle, uniform: Handle) -> RenderResult<()> {
        let Some(program) = self.programs.get(program).filter(|p| p.linked) else {
            return Ok(());
        };
        let Some(record) = self.uniforms.get(uniform) else {
            return Ok(());
        };
        let Some(location) = self.gl.get_uniform_location(program.native, &record.name) else {
            if self.config.strict_uniforms {
                log::error!("GlRenderContext: uniform '{}' is not active", record.name);
                return Err(RenderError::UnresolvedUniform {
                    name: record.name.clone(),
                });
            }
            log::trace!("GlRenderContext: uniform '{}' ignored", record.name);
            return Ok(());
        };

        self.gl.use_program(program.native);
        self.upload_uniform(location, record);
        self.check()
    }

    fn blend_state_mut(&mut self) -> &mut BlendState {
        &mut self.blend
    }

    fn dispatch_compute(&mut self, groups: [u32; 3], _local_size: [u32; 3]) -> RenderResult<()> {
        let [x, y, z] = groups;
        self.gl.memory_barrier(glow::ALL_BARRIER_BITS);
        self.gl.dispatch_compute(x, y, z);
        log::trace!("GlRenderContext: dispatched {x}x{y}x{z} workgroups");
        self.check()
    }

    fn add_query(&mut self) -> Handle {
        let handle = self.queries.first_free();
        if handle == NO_HANDLE {
            log::warn!("GlRenderContext: query table is full");
            return NO_HANDLE;
        }
        match self.gl.create_query() {
            Ok(name) => {
                self.queries.insert_at(handle, name);
                handle
            }
            Err(e) => {
                log::error!("GlRenderContext: failed to create a query: {e}");
                NO_HANDLE
            }
        }
    }

    fn remove_query(&mut self, handle: Handle) {
        if let Some(name) = self.queries.remove(handle) {
            self.gl.delete_query(name);
        }
    }

    fn query_timestamp(&mut self, handle: Handle) {
        if let Some(&name) = self.queries.get(handle) {
            self.gl.query_counter(name, glow::TIMESTAMP);
        }
    }

    fn get_query_result(&mut self, handle: Handle) -> u64 {
        let Some(&name) = self.queries.get(handle) else {
            return u64::MAX;
        };
        while self
            .gl
            .get_query_parameter_u32(name, glow::QUERY_RESULT_AVAILABLE)
            == 0
        {
            std::hint::spin_loop();
        }
        u64::from(self.gl.get_query_parameter_u32(name, glow::QUERY_RESULT))
    }

    fn destroy(&mut self) {
        if !self.initialized {
            return;
        }
        for handle in self.textures.handles() {
            self.remove_texture(handle);
        }
        for handle in self.geometries.handles() {
            if let Some(geometry) = self.geometries.remove(handle) {
                self.gl.delete_vertex_array(geometry.vao);
            }
        }
        for handle in self.frame_buffers.handles() {
            if let Some(bundle) = self.frame_buffers.remove(handle) {
                self.gl.delete_framebuffer(bundle.name);
            }
        }
        for handle in self.render_buffers.handles() {
            self.remove_render_buffer(handle);
        }
        for handle in self.programs.handles() {
            self.remove_program(handle);
        }
        for handle in self.shaders.handles() {
            self.remove_shader(handle);
        }
        for handle in self.uniforms.handles() {
            self.uniforms.remove(handle);
        }
        for handle in self.buffers.handles() {
            self.release_buffer(handle);
        }
        for handle in self.queries.handles() {
            self.remove_query(handle);
        }
        if self.frame_open {
            self.frame_open = false;
            self.throttle.release();
        }
        self.initialized = false;
        log::info!("GlRenderContext: destroyed");
    }
}

impl<G: GlApi> GlRenderContext<G> {
    fn release_frame_buffer(&mut self, bundle: GlFrameBuffer) {
        self.gl.delete_framebuffer(bundle.name);
        self.remove_texture(bundle.info.texture);
        self.remove_texture(bundle.info.depth_texture);
        self.remove_render_buffer(bundle.info.render_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::{GlCall, RecordingGl};

    fn context() -> (GlRenderContext<RecordingGl>, RecordingGl) {
        context_with(RenderConfig::default())
    }

    fn context_with(config: RenderConfig) -> (GlRenderContext<RecordingGl>, RecordingGl) {
        let gl = RecordingGl::new();
        (GlRenderContext::new(gl.clone(), config), gl)
    }

    #[test]
    fn test_texture_round_trip() {
        let (mut ctx, _) = context();
        let texels: Vec<u8> = (0..16).collect();
        let h = ctx
            .add_texture(
                2,
                2,
                TextureFormat::Rgba8,
                Some(TextureData::Bytes(&texels)),
                TextureUsage::READ,
            )
            .unwrap();
        assert_eq!(h, 0);

        let mut out = [0u8; 16];
        ctx.get_data_from_texture(h, &mut out);
        assert_eq!(out.to_vec(), texels);

        let mut short = [7u8; 15];
        ctx.get_data_from_texture(h, &mut short);
        assert_eq!(short, [7u8; 15]);
    }

    #[test]
    fn test_rgba32f_reads_back_as_rgba8() {
        let (mut ctx, _) = context();
        let h = ctx
            .add_texture(
                1,
                1,
                TextureFormat::Rgba32f,
                Some(TextureData::Floats(&[1.0, 0.5, 0.0, 2.0])),
                TextureUsage::READ,
            )
            .unwrap();
        let mut out = [0u8; 4];
        ctx.get_data_from_texture(h, &mut out);
        assert_eq!(out, [255, 128, 0, 255]);
    }

    #[test]
    fn test_texture_table_exhaustion_returns_no_handle() {
        let (mut ctx, _) = context();
        for i in 0..MAX_TEXTURES {
            let h = ctx
                .add_texture(1, 1, TextureFormat::R8ui, None, TextureUsage::READ)
                .unwrap();
            assert_eq!(h, i as Handle);
        }
        let full = ctx
            .add_texture(1, 1, TextureFormat::R8ui, None, TextureUsage::READ)
            .unwrap();
        assert_eq!(full, NO_HANDLE);

        ctx.remove_texture(17);
        let reused = ctx
            .add_texture(1, 1, TextureFormat::R8ui, None, TextureUsage::READ)
            .unwrap();
        assert_eq!(reused, 17);
    }

    #[test]
    fn test_degenerate_textures_are_refused() {
        let (mut ctx, gl) = context();
        gl.take_calls();
        let empty = ctx
            .add_texture(0, 0, TextureFormat::Rgba8, None, TextureUsage::READ)
            .unwrap();
        let negative = ctx
            .add_texture(4, -1, TextureFormat::Rgba8, None, TextureUsage::READ)
            .unwrap();
        let formatless = ctx
            .add_texture(4, 4, TextureFormat::None, None, TextureUsage::READ)
            .unwrap();
        let cube = ctx
            .add_cubemap_texture(0, 0, TextureFormat::Rgba8, None, TextureUsage::READ)
            .unwrap();
        assert_eq!([empty, negative, formatless, cube], [NO_HANDLE; 4]);
        assert!(gl.calls().is_empty());
        assert_eq!(gl.live_objects("texture"), 0);

        assert_eq!(ctx.add_frame_buffer(0, 4, true).unwrap(), NO_HANDLE);
    }

    #[test]
    fn test_update_texture_rejects_mismatched_data() {
        let (mut ctx, _) = context();
        let h = ctx
            .add_texture(2, 1, TextureFormat::R32ui, None, TextureUsage::READ)
            .unwrap();
        assert!(!ctx.update_texture(h, TextureData::Bytes(&[0; 8])).unwrap());
        assert!(ctx.update_texture(h, TextureData::Wide(&[1, 2])).unwrap());
        assert!(!ctx.update_texture(99, TextureData::Wide(&[1, 2])).unwrap());
    }

    #[test]
    fn test_channel_binding_sets_sampler_and_image() {
        let (mut ctx, gl) = context();
        let h = ctx
            .add_texture(4, 4, TextureFormat::Rgba8, None, TextureUsage::WRITE)
            .unwrap();
        gl.take_calls();

        ctx.bind_texture_to_channel(h, 3, SamplerFlags::CLAMP | SamplerFlags::WRITE);
        let calls = gl.take_calls();
        assert_eq!(calls[0], GlCall::ActiveTexture(3));
        assert!(calls.contains(&GlCall::TexParameter {
            parameter: glow::TEXTURE_WRAP_S,
            value: glow::CLAMP_TO_EDGE as i32,
        }));
        assert!(matches!(
            calls.last(),
            Some(GlCall::BindImageTexture { unit: 3, access, .. }) if *access == glow::WRITE_ONLY
        ));

        ctx.bind_texture_to_channel(h, MAX_TEXTURE_CHANNELS as i32, SamplerFlags::LINEAR);
        assert!(gl.take_calls().is_empty());
    }

    #[test]
    fn test_cubemap_uploads_six_faces() {
        let (mut ctx, gl) = context();
        let face = [0u8; 4];
        let faces = CubeFaces {
            front: &face,
            back: &face,
            left: &face,
            right: &face,
            top: &face,
            bottom: &face,
        };
        let h = ctx
            .add_cubemap_texture(1, 1, TextureFormat::Rgba8, Some(&faces), TextureUsage::READ)
            .unwrap();
        assert_eq!(ctx.get_texture(h).unwrap().target, TextureTarget::Cube);
        let uploads = gl.count(|c| matches!(c, GlCall::TexSubImage2D { .. }));
        assert_eq!(uploads, 6);
    }

    #[test]
    fn test_geometry_lock_is_idempotent_and_uploads_everything() {
        let (mut ctx, gl) = context();
        let g = ctx.add_geometry(VertexLayout::Compact);
        let streams = GeometryStreams::VERTEX | GeometryStreams::INDEX;

        {
            let lock = ctx.geometry_begin(g, 3, 3, streams).unwrap();
            let vertices = lock.vertices.unwrap();
            assert_eq!(vertices.len(), 12);
            vertices[3] = f32::from_bits(0xff00_00ff);
            lock.indices.unwrap().copy_from_slice(&[0, 1, 2]);
        }
        let again = ctx.geometry_begin(g, 3, 3, streams).unwrap();
        assert!(again.vertices.is_none());
        assert!(again.indices.is_none());

        gl.take_calls();
        ctx.geometry_end(g).unwrap();
        let uploads: Vec<usize> = gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::BufferSubData { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![48, 12]);

        ctx.geometry_draw_instanced(g, 4, false).unwrap();
        let calls = gl.take_calls();
        assert!(calls.contains(&GlCall::VertexAttribI32 {
            index: 1,
            size: 1,
            offset: 12,
        }));
        assert!(calls.contains(&GlCall::Disable(glow::DEPTH_TEST)));
        assert!(calls.contains(&GlCall::DrawElementsInstanced {
            count: 3,
            instances: 4,
        }));

        ctx.remove_geometry(g);
        assert_eq!(gl.live_objects("buffer"), 0);
        assert_eq!(gl.live_objects("vertex array"), 0);
    }

    #[test]
    #[should_panic(expected = "removed while locked")]
    fn test_removing_locked_geometry_panics() {
        let (mut ctx, _) = context();
        let g = ctx.add_geometry(VertexLayout::Standard);
        let _ = ctx.geometry_begin(g, 1, 0, GeometryStreams::VERTEX).unwrap();
        ctx.remove_geometry(g);
    }

    #[test]
    fn test_geometry_begin_out_of_buffers_leaves_geometry_unlocked() {
        let (mut ctx, _) = context();
        let g = ctx.add_geometry(VertexLayout::Standard);
        for _ in 0..MAX_BUFFER_OBJECTS - 1 {
            ctx.add_buffer_object(None, 4).unwrap();
        }
        let streams = GeometryStreams::VERTEX | GeometryStreams::INDEX;

        let err = ctx.geometry_begin(g, 4, 6, streams).map(|_| ());
        assert!(matches!(err, Err(RenderError::OutOfMemory { .. })));
        assert!(ctx.geometries.get(g).unwrap().record.locked.is_empty());

        ctx.remove_buffer_object(0);
        {
            let lock = ctx.geometry_begin(g, 4, 6, streams).unwrap();
            assert_eq!(lock.indices.unwrap().len(), 6);
            assert!(lock.vertices.is_some());
        }
        ctx.geometry_end(g).unwrap();
        ctx.remove_geometry(g);
    }

    #[test]
    fn test_buffer_objects() {
        let (mut ctx, _) = context();
        assert_eq!(ctx.add_buffer_object(None, 0).unwrap(), NO_HANDLE);

        let a = ctx.add_buffer_object(Some(&[1, 2, 3, 4]), 4).unwrap();
        let b = ctx.add_buffer_object(None, 8).unwrap();
        ctx.copy_buffer_object_data(a, b, 0, 4, 4).unwrap();
        let mut out = [0u8; 8];
        ctx.get_data_from_buffer_object(b, &mut out);
        assert_eq!(out, [0, 0, 0, 0, 1, 2, 3, 4]);

        ctx.update_buffer_object(a, &[9; 6]).unwrap();
        assert_eq!(ctx.get_buffer_object(a).unwrap().size, 6);
        assert_eq!(ctx.get_buffer_object(a).unwrap().kind, BufferKind::Compute);

        ctx.copy_buffer_object_data(a, 42, 0, 0, 4).unwrap();
        ctx.remove_buffer_object(a);
        assert!(ctx.get_buffer_object(a).is_none());
    }

    #[test]
    fn test_shaders_and_programs_are_deduplicated() {
        let (mut ctx, gl) = context();
        let vs = ctx.add_shader("void main() {}", ShaderStage::Vertex, "vs").unwrap();
        let fs = ctx.add_shader("void main() {}", ShaderStage::Fragment, "fs").unwrap();
        assert_eq!(ctx.add_shader("ignored", ShaderStage::Vertex, "vs").unwrap(), vs);

        let p = ctx.add_program(vs, fs, NO_HANDLE).unwrap();
        assert_eq!(ctx.add_program(vs, fs, NO_HANDLE).unwrap(), p);
        assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 1);
        assert_eq!(ctx.add_program(vs, NO_HANDLE, NO_HANDLE).unwrap(), NO_HANDLE);

        gl.take_calls();
        ctx.bind_program(p).unwrap();
        assert!(matches!(gl.calls()[..], [GlCall::UseProgram(_)]));
    }

    #[test]
    fn test_compile_and_link_failures_are_fatal() {
        let (mut ctx, gl) = context();
        let err = ctx
            .add_shader("#error broken", ShaderStage::Compute, "broken.cs")
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompilation { ref name, .. } if name == "broken.cs"
        ));

        let cs = ctx.add_shader("void main() {}", ShaderStage::Compute, "ok.cs").unwrap();
        gl.fail_links(true);
        let err = ctx.add_program(NO_HANDLE, NO_HANDLE, cs).unwrap_err();
        assert!(matches!(err, RenderError::ProgramLink { program: 0, .. }));
    }

    #[test]
    fn test_uniforms_use_the_typed_calls() {
        let (mut ctx, gl) = context();
        let color_location = gl.declare_uniform("Color");
        let mvp_location = gl.declare_uniform("ViewProject");
        let tex_location = gl.declare_uniform("Tex0");
        let vs = ctx.add_shader("void main() {}", ShaderStage::Vertex, "vs").unwrap();
        let fs = ctx.add_shader("void main() {}", ShaderStage::Fragment, "fs").unwrap();
        let p = ctx.add_program(vs, fs, NO_HANDLE).unwrap();

        let color = ctx.add_uniform("Color", UniformType::Vec4, 1);
        ctx.set_uniform(color, bytemuck::cast_slice(&[0.25f32, 0.5, 0.75, 1.0]));
        let mvp = ctx.add_uniform("ViewProject", UniformType::Mat4, 1);
        let tex = ctx.add_uniform("Tex0", UniformType::Sampler, 1);
        ctx.set_uniform(tex, &2i32.to_le_bytes());

        gl.take_calls();
        ctx.bind_uniform(p, color).unwrap();
        ctx.bind_uniform(p, mvp).unwrap();
        ctx.bind_uniform(p, tex).unwrap();
        let uploads: Vec<GlCall> = gl
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, GlCall::UseProgram(_)))
            .collect();
        assert_eq!(
            uploads,
            vec![
                GlCall::UniformF32 {
                    location: color_location,
                    components: 4,
                    values: vec![0.25, 0.5, 0.75, 1.0],
                },
                GlCall::UniformMatrix {
                    location: mvp_location,
                    dimension: 4,
                    values: vec![0.0; 16],
                },
                GlCall::UniformI32 {
                    location: tex_location,
                    components: 1,
                    values: vec![2],
                },
            ]
        );
    }

    #[test]
    fn test_unresolved_uniforms() {
        let config = RenderConfig {
            strict_uniforms: true,
            ..RenderConfig::default()
        };
        for strict in [false, true] {
            let (mut ctx, _) = if strict {
                context_with(config.clone())
            } else {
                context()
            };
            let cs = ctx.add_shader("void main() {}", ShaderStage::Compute, "cs").unwrap();
            let p = ctx.add_program(NO_HANDLE, NO_HANDLE, cs).unwrap();
            let u = ctx.add_uniform("Missing", UniformType::Real, 1);
            let result = ctx.bind_uniform(p, u);
            if strict {
                assert!(matches!(result, Err(RenderError::UnresolvedUniform { .. })));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn test_frame_buffer_bundles() {
        let (mut ctx, gl) = context();
        let fb = ctx.add_frame_buffer(64, 32, true).unwrap();
        let info = ctx.get_frame_buffer(fb).unwrap();
        assert!(info.has_depth_texture());
        assert_eq!(info.render_buffer, NO_HANDLE);
        assert_eq!(ctx.get_texture(info.texture).unwrap().width, 64);
        assert!(ctx.get_texture(info.depth_texture).unwrap().format.is_depth());

        let with_rb = ctx.add_frame_buffer(16, 16, false).unwrap();
        let rb_info = ctx.get_frame_buffer(with_rb).unwrap();
        assert!(rb_info.render_buffer >= 0);
        assert!(gl.calls().contains(&GlCall::RenderbufferStorage {
            internal_format: glow::DEPTH_COMPONENT24,
            width: 16,
            height: 16,
        }));

        ctx.remove_frame_buffer(fb);
        assert!(ctx.get_texture(info.texture).is_none());
        assert!(ctx.get_texture(info.depth_texture).is_none());
        ctx.remove_frame_buffer(with_rb);
        assert_eq!(gl.live_objects("renderbuffer"), 0);
        assert_eq!(gl.live_objects("framebuffer"), 0);
    }

    #[test]
    fn test_incomplete_frame_buffer_is_reported_and_released() {
        let (mut ctx, gl) = context();
        gl.set_framebuffer_status(glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        let err = ctx.add_frame_buffer(8, 8, true).unwrap_err();
        assert!(matches!(err, RenderError::IncompleteFrameBuffer { .. }));
        assert_eq!(gl.live_objects("texture"), 0);
    }

    #[test]
    fn test_frame_misuse_is_detected() {
        let (mut ctx, _) = context();
        assert!(matches!(ctx.frame_end(false), Err(RenderError::NoFrameInProgress)));
        ctx.frame_begin(RenderDrawables::none()).unwrap();
        assert!(matches!(
            ctx.frame_begin(RenderDrawables::none()),
            Err(RenderError::FrameInProgress)
        ));
        ctx.frame_end(true).unwrap();
        ctx.frame_begin(RenderDrawables::none()).unwrap();
        ctx.frame_end(false).unwrap();
    }

    #[test]
    fn test_render_pass_clears_and_viewport() {
        let (mut ctx, gl) = context();
        let fb = ctx.add_frame_buffer(320, 200, false).unwrap();
        gl.take_calls();

        ctx.renderpass_begin(&RenderPassDescriptor {
            frame_buffer_handle: fb,
            clear_color: 0xff00_00ff,
            clear_depth: 0.5,
            ..RenderPassDescriptor::default()
        })
        .unwrap();
        let calls = gl.take_calls();
        assert!(calls.contains(&GlCall::Viewport(0, 0, 320, 200)));
        assert!(calls.contains(&GlCall::ClearColor([1.0, 0.0, 0.0, 1.0])));
        assert!(calls.contains(&GlCall::ClearDepth(0.5)));
        assert!(calls.contains(&GlCall::Clear(
            glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT
        )));

        ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
        assert!(gl.take_calls().is_empty());
    }

    #[test]
    fn test_driver_errors_surface_when_checked() {
        let config = RenderConfig {
            check_driver_errors: true,
            ..RenderConfig::default()
        };
        let (mut ctx, gl) = context_with(config);
        gl.inject_error(glow::INVALID_OPERATION);
        gl.inject_error(glow::INVALID_VALUE);
        let err = ctx.dispatch_compute([1, 1, 1], [8, 8, 1]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Driver { code, message: "GL_INVALID_OPERATION", .. }
                if code == glow::INVALID_OPERATION
        ));
        ctx.dispatch_compute([1, 1, 1], [8, 8, 1]).unwrap();
    }

    #[test]
    fn test_queries() {
        let (mut ctx, gl) = context();
        gl.set_query_result(1234);
        let q = ctx.add_query();
        ctx.query_timestamp(q);
        assert_eq!(ctx.get_query_result(q), 1234);
        assert_eq!(ctx.get_query_result(q + 1), u64::MAX);
        for _ in 1..MAX_QUERIES {
            assert_ne!(ctx.add_query(), NO_HANDLE);
        }
        assert_eq!(ctx.add_query(), NO_HANDLE);
    }

    #[test]
    fn test_blend_state_is_applied_at_draw() {
        let (mut ctx, gl) = context();
        let g = ctx.add_geometry(VertexLayout::Standard);
        {
            let lock = ctx
                .geometry_begin(g, 3, 3, GeometryStreams::VERTEX | GeometryStreams::INDEX)
                .unwrap();
            lock.indices.unwrap().copy_from_slice(&[0, 1, 2]);
        }
        ctx.geometry_end(g).unwrap();
        ctx.set_blending_enabled(true);
        ctx.set_blending_function(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        gl.take_calls();

        ctx.geometry_draw(g).unwrap();
        let calls = gl.take_calls();
        assert!(calls.contains(&GlCall::Enable(glow::BLEND)));
        assert!(calls.contains(&GlCall::BlendFunc(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA)));
        assert!(calls.contains(&GlCall::Enable(glow::DEPTH_TEST)));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (mut ctx, gl) = context();
        ctx.add_frame_buffer(4, 4, true).unwrap();
        ctx.add_buffer_object(None, 16).unwrap();
        ctx.add_query();
        ctx.destroy();
        assert!(!ctx.is_initialized());
        for kind in ["texture", "framebuffer", "buffer", "query"] {
            assert_eq!(gl.live_objects(kind), 0, "{kind}");
        }
    }
}
