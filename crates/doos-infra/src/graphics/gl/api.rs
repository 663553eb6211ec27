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

//! The slice of OpenGL the direct-state backend needs.

/// An OpenGL object name. Zero is the null object.
pub type GlName = u32;

/// OpenGL entry points used by [`GlRenderContext`](super::GlRenderContext).
///
/// Enumerations are the raw GL constants found in `glow`. Objects are plain
/// names so that implementations do not need to share an object type.
///
/// Every call is made from the thread the context is current on.
pub trait GlApi: Send {
    // --- State ---

    /// `glGetError`.
    fn get_error(&self) -> u32;
    /// `glEnable`.
    fn enable(&self, capability: u32);
    /// `glDisable`.
    fn disable(&self, capability: u32);
    /// `glViewport`.
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    /// `glClearColor`.
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    /// `glClearDepthf`.
    fn clear_depth(&self, depth: f32);
    /// `glClear`.
    fn clear(&self, mask: u32);
    /// `glBlendFunc`.
    fn blend_func(&self, src: u32, dst: u32);
    /// `glBlendEquation`.
    fn blend_equation(&self, mode: u32);
    /// `glPixelStorei`.
    fn pixel_store_i32(&self, parameter: u32, value: i32);
    /// `glFinish`.
    fn finish(&self);

    // --- Textures ---

    /// `glCreateTextures` / `glGenTextures`.
    fn create_texture(&self) -> Result<GlName, String>;
    /// `glDeleteTextures`.
    fn delete_texture(&self, texture: GlName);
    /// `glActiveTexture`, with `unit` already offset from `GL_TEXTURE0`.
    fn active_texture(&self, unit: u32);
    /// `glBindTexture`.
    fn bind_texture(&self, target: u32, texture: GlName);
    /// `glTexStorage2D`.
    fn tex_storage_2d(
        &self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
    /// `glTexSubImage2D` of a whole level-0 image.
    fn tex_sub_image_2d(
        &self,
        target: u32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );
    /// `glTexParameteri`.
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    /// `glGetTexImage` of level 0.
    fn get_tex_image(&self, target: u32, format: u32, ty: u32, out: &mut [u8]);
    /// `glBindImageTexture` of level 0, not layered.
    fn bind_image_texture(&self, unit: u32, texture: GlName, access: u32, format: u32);

    // --- Buffers ---

    /// `glGenBuffers`.
    fn create_buffer(&self) -> Result<GlName, String>;
    /// `glDeleteBuffers`.
    fn delete_buffer(&self, buffer: GlName);
    /// `glBindBuffer`.
    fn bind_buffer(&self, target: u32, buffer: GlName);
    /// `glBufferData` without initial contents.
    fn buffer_data_size(&self, target: u32, size: i32, usage: u32);
    /// `glBufferData` with initial contents.
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    /// `glBufferSubData`.
    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]);
    /// `glGetBufferSubData`.
    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]);
    /// `glCopyBufferSubData`.
    fn copy_buffer_sub_data(
        &self,
        read_target: u32,
        write_target: u32,
        read_offset: i32,
        write_offset: i32,
        size: i32,
    );
    /// `glBindBufferBase`.
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: GlName);

    // --- Vertex input and draws ---

    /// `glGenVertexArrays`.
    fn create_vertex_array(&self) -> Result<GlName, String>;
    /// `glDeleteVertexArrays`.
    fn delete_vertex_array(&self, vertex_array: GlName);
    /// `glBindVertexArray`.
    fn bind_vertex_array(&self, vertex_array: GlName);
    /// `glEnableVertexAttribArray`.
    fn enable_vertex_attrib_array(&self, index: u32);
    /// `glVertexAttribPointer`.
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    /// `glVertexAttribIPointer`.
    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, ty: u32, stride: i32, offset: i32);
    /// `glDrawElementsInstanced`.
    fn draw_elements_instanced(&self, mode: u32, count: i32, ty: u32, offset: i32, instances: i32);

    // --- Shaders and programs ---

    /// `glCreateShader`.
    fn create_shader(&self, stage: u32) -> Result<GlName, String>;
    /// `glShaderSource`.
    fn shader_source(&self, shader: GlName, source: &str);
    /// `glCompileShader`.
    fn compile_shader(&self, shader: GlName);
    /// `GL_COMPILE_STATUS`.
    fn get_shader_compile_status(&self, shader: GlName) -> bool;
    /// `glGetShaderInfoLog`.
    fn get_shader_info_log(&self, shader: GlName) -> String;
    /// `glDeleteShader`.
    fn delete_shader(&self, shader: GlName);
    /// `glCreateProgram`.
    fn create_program(&self) -> Result<GlName, String>;
    /// `glAttachShader`.
    fn attach_shader(&self, program: GlName, shader: GlName);
    /// `glDetachShader`.
    fn detach_shader(&self, program: GlName, shader: GlName);
    /// `glLinkProgram`.
    fn link_program(&self, program: GlName);
    /// `GL_LINK_STATUS`.
    fn get_program_link_status(&self, program: GlName) -> bool;
    /// `glGetProgramInfoLog`.
    fn get_program_info_log(&self, program: GlName) -> String;
    /// `glDeleteProgram`.
    fn delete_program(&self, program: GlName);
    /// `glUseProgram`.
    fn use_program(&self, program: GlName);
    /// `glGetUniformLocation`. `None` for names that are not active.
    fn get_uniform_location(&self, program: GlName, name: &str) -> Option<u32>;
    /// `glUniform{components}fv` over `values.len() / components` elements.
    fn uniform_f32(&self, location: u32, components: usize, values: &[f32]);
    /// `glUniform{components}iv` over `values.len() / components` elements.
    fn uniform_i32(&self, location: u32, components: usize, values: &[i32]);
    /// `glUniformMatrix{dimension}fv`, column-major.
    fn uniform_matrix_f32(&self, location: u32, dimension: usize, values: &[f32]);

    // --- Framebuffers ---

    /// `glGenFramebuffers`.
    fn create_framebuffer(&self) -> Result<GlName, String>;
    /// `glDeleteFramebuffers`.
    fn delete_framebuffer(&self, framebuffer: GlName);
    /// `glBindFramebuffer`.
    fn bind_framebuffer(&self, target: u32, framebuffer: GlName);
    /// `glFramebufferTexture2D` of level 0.
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: GlName,
    );
    /// `glCheckFramebufferStatus`.
    fn check_framebuffer_status(&self, target: u32) -> u32;
    /// `glGenRenderbuffers`.
    fn create_renderbuffer(&self) -> Result<GlName, String>;
    /// `glDeleteRenderbuffers`.
    fn delete_renderbuffer(&self, renderbuffer: GlName);
    /// `glBindRenderbuffer`.
    fn bind_renderbuffer(&self, renderbuffer: GlName);
    /// `glRenderbufferStorage`.
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32);
    /// `glFramebufferRenderbuffer`.
    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, renderbuffer: GlName);

    // --- Compute ---

    /// `glMemoryBarrier`.
    fn memory_barrier(&self, barriers: u32);
    /// `glDispatchCompute`.
    fn dispatch_compute(&self, x: u32, y: u32, z: u32);

    // --- Queries ---

    /// `glGenQueries`.
    fn create_query(&self) -> Result<GlName, String>;
    /// `glDeleteQueries`.
    fn delete_query(&self, query: GlName);
    /// `glQueryCounter`.
    fn query_counter(&self, query: GlName, target: u32);
    /// `glGetQueryObjectuiv`.
    fn get_query_parameter_u32(&self, query: GlName, parameter: u32) -> u32;
}
