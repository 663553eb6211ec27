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

//! [`GlApi`] over a live `glow` context.

use super::api::{GlApi, GlName};
use glow::HasContext;
use std::fmt;
use std::num::NonZeroU32;

/// Forwards [`GlApi`] calls to a `glow::Context`.
pub struct GlowApi {
    gl: glow::Context,
}

impl fmt::Debug for GlowApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowApi")
            .field("version", self.gl.version())
            .finish()
    }
}

impl GlowApi {
    /// Wraps a context created by the windowing layer.
    ///
    /// # Safety
    ///
    /// The context must stay current on the thread that drives the render
    /// context, for as long as the returned value is used.
    pub unsafe fn new(gl: glow::Context) -> Self {
        log::info!("OpenGL context: {:?}", gl.version());
        Self { gl }
    }

    /// The wrapped context.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

macro_rules! native {
    ($name:ident, $ty:ident) => {
        fn $name(name: GlName) -> Option<glow::$ty> {
            NonZeroU32::new(name).map(glow::$ty)
        }
    };
}

native!(texture, NativeTexture);
native!(buffer, NativeBuffer);
native!(vertex_array, NativeVertexArray);
native!(shader, NativeShader);
native!(program, NativeProgram);
native!(framebuffer, NativeFramebuffer);
native!(renderbuffer, NativeRenderbuffer);
native!(query, NativeQuery);

// SAFETY (all blocks below): `GlowApi::new` requires the context to be current
// on the calling thread. Object names come from this context.
impl GlApi for GlowApi {
    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn enable(&self, capability: u32) {
        unsafe { self.gl.enable(capability) }
    }

    fn disable(&self, capability: u32) {
        unsafe { self.gl.disable(capability) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear_depth(&self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn blend_func(&self, src: u32, dst: u32) {
        unsafe { self.gl.blend_func(src, dst) }
    }

    fn blend_equation(&self, mode: u32) {
        unsafe { self.gl.blend_equation(mode) }
    }

    fn pixel_store_i32(&self, parameter: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(parameter, value) }
    }

    fn finish(&self) {
        unsafe { self.gl.finish() }
    }

    fn create_texture(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_texture() }.map(|t| t.0.get())
    }

    fn delete_texture(&self, name: GlName) {
        if let Some(t) = texture(name) {
            unsafe { self.gl.delete_texture(t) }
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, name: GlName) {
        unsafe { self.gl.bind_texture(target, texture(name)) }
    }

    fn tex_storage_2d(
        &self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        unsafe {
            self.gl
                .tex_storage_2d(target, levels, internal_format, width, height)
        }
    }

    fn tex_sub_image_2d(
        &self,
        target: u32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                0,
                0,
                0,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(Some(pixels)),
            )
        }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn get_tex_image(&self, target: u32, format: u32, ty: u32, out: &mut [u8]) {
        unsafe {
            self.gl
                .get_tex_image(target, 0, format, ty, glow::PixelPackData::Slice(Some(out)))
        }
    }

    fn bind_image_texture(&self, unit: u32, name: GlName, access: u32, format: u32) {
        unsafe {
            self.gl
                .bind_image_texture(unit, texture(name), 0, false, 0, access, format)
        }
    }

    fn create_buffer(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_buffer() }.map(|b| b.0.get())
    }

    fn delete_buffer(&self, name: GlName) {
        if let Some(b) = buffer(name) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn bind_buffer(&self, target: u32, name: GlName) {
        unsafe { self.gl.bind_buffer(target, buffer(name)) }
    }

    fn buffer_data_size(&self, target: u32, size: i32, usage: u32) {
        unsafe { self.gl.buffer_data_size(target, size, usage) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset, data) }
    }

    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]) {
        unsafe { self.gl.get_buffer_sub_data(target, offset, out) }
    }

    fn copy_buffer_sub_data(
        &self,
        read_target: u32,
        write_target: u32,
        read_offset: i32,
        write_offset: i32,
        size: i32,
    ) {
        unsafe {
            self.gl.copy_buffer_sub_data(
                read_target,
                write_target,
                read_offset,
                write_offset,
                size,
            )
        }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, name: GlName) {
        unsafe { self.gl.bind_buffer_base(target, index, buffer(name)) }
    }

    fn create_vertex_array(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_vertex_array() }.map(|v| v.0.get())
    }

    fn delete_vertex_array(&self, name: GlName) {
        if let Some(v) = vertex_array(name) {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    fn bind_vertex_array(&self, name: GlName) {
        unsafe { self.gl.bind_vertex_array(vertex_array(name)) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, ty, normalized, stride, offset)
        }
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, ty: u32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_i32(index, size, ty, stride, offset)
        }
    }

    fn draw_elements_instanced(&self, mode: u32, count: i32, ty: u32, offset: i32, instances: i32) {
        unsafe {
            self.gl
                .draw_elements_instanced(mode, count, ty, offset, instances)
        }
    }

    fn create_shader(&self, stage: u32) -> Result<GlName, String> {
        unsafe { self.gl.create_shader(stage) }.map(|s| s.0.get())
    }

    fn shader_source(&self, name: GlName, source: &str) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&self, name: GlName) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn get_shader_compile_status(&self, name: GlName) -> bool {
        shader(name).is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn get_shader_info_log(&self, name: GlName) -> String {
        shader(name)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, name: GlName) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn create_program(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_program() }.map(|p| p.0.get())
    }

    fn attach_shader(&self, program_name: GlName, shader_name: GlName) {
        if let (Some(p), Some(s)) = (program(program_name), shader(shader_name)) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }

    fn detach_shader(&self, program_name: GlName, shader_name: GlName) {
        if let (Some(p), Some(s)) = (program(program_name), shader(shader_name)) {
            unsafe { self.gl.detach_shader(p, s) }
        }
    }

    fn link_program(&self, name: GlName) {
        if let Some(p) = program(name) {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn get_program_link_status(&self, name: GlName) -> bool {
        program(name).is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn get_program_info_log(&self, name: GlName) -> String {
        program(name)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn delete_program(&self, name: GlName) {
        if let Some(p) = program(name) {
            unsafe { self.gl.delete_program(p) }
        }
    }

    fn use_program(&self, name: GlName) {
        unsafe { self.gl.use_program(program(name)) }
    }

    fn get_uniform_location(&self, name: GlName, uniform: &str) -> Option<u32> {
        let p = program(name)?;
        unsafe { self.gl.get_uniform_location(p, uniform) }.map(|l| l.0)
    }

    fn uniform_f32(&self, location: u32, components: usize, values: &[f32]) {
        let location = glow::NativeUniformLocation(location);
        let location = Some(&location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(location, values),
                2 => self.gl.uniform_2_f32_slice(location, values),
                3 => self.gl.uniform_3_f32_slice(location, values),
                4 => self.gl.uniform_4_f32_slice(location, values),
                _ => log::warn!("glUniform{components}f does not exist"),
            }
        }
    }

    fn uniform_i32(&self, location: u32, components: usize, values: &[i32]) {
        let location = glow::NativeUniformLocation(location);
        let location = Some(&location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(location, values),
                2 => self.gl.uniform_2_i32_slice(location, values),
                3 => self.gl.uniform_3_i32_slice(location, values),
                4 => self.gl.uniform_4_i32_slice(location, values),
                _ => log::warn!("glUniform{components}i does not exist"),
            }
        }
    }

    fn uniform_matrix_f32(&self, location: u32, dimension: usize, values: &[f32]) {
        let location = glow::NativeUniformLocation(location);
        let location = Some(&location);
        unsafe {
            match dimension {
                3 => self.gl.uniform_matrix_3_f32_slice(location, false, values),
                4 => self.gl.uniform_matrix_4_f32_slice(location, false, values),
                _ => log::warn!("glUniformMatrix{dimension}f is not used"),
            }
        }
    }

    fn create_framebuffer(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_framebuffer() }.map(|f| f.0.get())
    }

    fn delete_framebuffer(&self, name: GlName) {
        if let Some(f) = framebuffer(name) {
            unsafe { self.gl.delete_framebuffer(f) }
        }
    }

    fn bind_framebuffer(&self, target: u32, name: GlName) {
        unsafe { self.gl.bind_framebuffer(target, framebuffer(name)) }
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        name: GlName,
    ) {
        unsafe {
            self.gl
                .framebuffer_texture_2d(target, attachment, texture_target, texture(name), 0)
        }
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        unsafe { self.gl.check_framebuffer_status(target) }
    }

    fn create_renderbuffer(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_renderbuffer() }.map(|r| r.0.get())
    }

    fn delete_renderbuffer(&self, name: GlName) {
        if let Some(r) = renderbuffer(name) {
            unsafe { self.gl.delete_renderbuffer(r) }
        }
    }

    fn bind_renderbuffer(&self, name: GlName) {
        unsafe { self.gl.bind_renderbuffer(glow::RENDERBUFFER, renderbuffer(name)) }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe {
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, internal_format, width, height)
        }
    }

    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, name: GlName) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                target,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer(name),
            )
        }
    }

    fn memory_barrier(&self, barriers: u32) {
        unsafe { self.gl.memory_barrier(barriers) }
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        unsafe { self.gl.dispatch_compute(x, y, z) }
    }

    fn create_query(&self) -> Result<GlName, String> {
        unsafe { self.gl.create_query() }.map(|q| q.0.get())
    }

    fn delete_query(&self, name: GlName) {
        if let Some(q) = query(name) {
            unsafe { self.gl.delete_query(q) }
        }
    }

    fn query_counter(&self, name: GlName, target: u32) {
        if let Some(q) = query(name) {
            unsafe { self.gl.query_counter(q, target) }
        }
    }

    fn get_query_parameter_u32(&self, name: GlName, parameter: u32) -> u32 {
        query(name)
            .map(|q| unsafe { self.gl.get_query_parameter_u32(q, parameter) })
            .unwrap_or(0)
    }
}
