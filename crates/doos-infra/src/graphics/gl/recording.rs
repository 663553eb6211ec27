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

//! A [`GlApi`] that records calls instead of issuing them.
//!
//! It keeps enough state to answer queries consistently: texture and buffer
//! contents round-trip, shaders containing `#error` fail to compile, and
//! uniform locations exist only for declared names. Clones share state, so a
//! test can keep one handle while a render context owns another.

use super::api::{GlApi, GlName};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded state-changing call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Create(&'static str, GlName),
    Delete(&'static str, GlName),
    Enable(u32),
    Disable(u32),
    Viewport(i32, i32, i32, i32),
    ClearColor([f32; 4]),
    ClearDepth(f32),
    Clear(u32),
    BlendFunc(u32, u32),
    BlendEquation(u32),
    Finish,
    ActiveTexture(u32),
    BindTexture {
        target: u32,
        texture: GlName,
    },
    TexStorage2D {
        target: u32,
        internal_format: u32,
        width: i32,
        height: i32,
    },
    TexSubImage2D {
        target: u32,
        format: u32,
        ty: u32,
        bytes: usize,
    },
    TexParameter {
        parameter: u32,
        value: i32,
    },
    BindImageTexture {
        unit: u32,
        texture: GlName,
        access: u32,
        format: u32,
    },
    BufferData {
        target: u32,
        size: usize,
    },
    BufferSubData {
        target: u32,
        offset: i32,
        size: usize,
    },
    BindBufferBase {
        target: u32,
        index: u32,
        buffer: GlName,
    },
    CopyBufferSubData {
        read_offset: i32,
        write_offset: i32,
        size: i32,
    },
    VertexAttribF32 {
        index: u32,
        size: i32,
        offset: i32,
    },
    VertexAttribI32 {
        index: u32,
        size: i32,
        offset: i32,
    },
    DrawElementsInstanced {
        count: i32,
        instances: i32,
    },
    AttachShader {
        program: GlName,
        shader: GlName,
    },
    LinkProgram(GlName),
    UseProgram(GlName),
    UniformF32 {
        location: u32,
        components: usize,
        values: Vec<f32>,
    },
    UniformI32 {
        location: u32,
        components: usize,
        values: Vec<i32>,
    },
    UniformMatrix {
        location: u32,
        dimension: usize,
        values: Vec<f32>,
    },
    BindFramebuffer(GlName),
    FramebufferTexture {
        attachment: u32,
        texture: GlName,
    },
    FramebufferRenderbuffer {
        attachment: u32,
        renderbuffer: GlName,
    },
    RenderbufferStorage {
        internal_format: u32,
        width: i32,
        height: i32,
    },
    MemoryBarrier(u32),
    DispatchCompute(u32, u32, u32),
    QueryCounter(GlName),
}

#[derive(Debug)]
struct State {
    next_name: GlName,
    calls: Vec<GlCall>,
    errors: VecDeque<u32>,
    bound_buffers: HashMap<u32, GlName>,
    bound_textures: HashMap<u32, GlName>,
    buffers: HashMap<GlName, Vec<u8>>,
    texels: HashMap<(GlName, u32), Vec<u8>>,
    shader_sources: HashMap<GlName, String>,
    uniforms: HashMap<String, u32>,
    fail_link: bool,
    framebuffer_status: u32,
    query_result: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_name: 1,
            calls: Vec::new(),
            errors: VecDeque::new(),
            bound_buffers: HashMap::new(),
            bound_textures: HashMap::new(),
            buffers: HashMap::new(),
            texels: HashMap::new(),
            shader_sources: HashMap::new(),
            uniforms: HashMap::new(),
            fail_link: false,
            framebuffer_status: glow::FRAMEBUFFER_COMPLETE,
            query_result: 0,
        }
    }
}

impl State {
    fn create(&mut self, kind: &'static str) -> GlName {
        let name = self.next_name;
        self.next_name += 1;
        self.calls.push(GlCall::Create(kind, name));
        name
    }

    fn texture_target(target: u32) -> u32 {
        if (glow::TEXTURE_CUBE_MAP_POSITIVE_X..glow::TEXTURE_CUBE_MAP_POSITIVE_X + 6)
            .contains(&target)
        {
            glow::TEXTURE_CUBE_MAP
        } else {
            target
        }
    }

    fn bound_texture(&self, target: u32) -> GlName {
        self.bound_textures
            .get(&Self::texture_target(target))
            .copied()
            .unwrap_or(0)
    }

    fn bound_buffer_mut(&mut self, target: u32) -> Option<&mut Vec<u8>> {
        let name = self.bound_buffers.get(&target).copied()?;
        self.buffers.get_mut(&name)
    }
}

/// A headless [`GlApi`].
#[derive(Debug, Clone, Default)]
pub struct RecordingGl {
    state: Arc<Mutex<State>>,
}

impl RecordingGl {
    /// A recorder with no declared uniform and complete framebuffers.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: GlCall) {
        self.state().calls.push(call);
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<GlCall> {
        self.state().calls.clone()
    }

    /// Returns the recorded calls and forgets them.
    pub fn take_calls(&self) -> Vec<GlCall> {
        std::mem::take(&mut self.state().calls)
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GlCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Makes `name` resolvable in every program and returns its location.
    pub fn declare_uniform(&self, name: &str) -> u32 {
        let mut state = self.state();
        let next = state.uniforms.len() as u32;
        *state.uniforms.entry(name.to_owned()).or_insert(next)
    }

    /// Queues an error code for the next `get_error`.
    pub fn inject_error(&self, code: u32) {
        self.state().errors.push_back(code);
    }

    /// Makes every subsequent link fail.
    pub fn fail_links(&self, fail: bool) {
        self.state().fail_link = fail;
    }

    /// The status reported by `check_framebuffer_status`.
    pub fn set_framebuffer_status(&self, status: u32) {
        self.state().framebuffer_status = status;
    }

    /// The value timestamp queries resolve to.
    pub fn set_query_result(&self, value: u32) {
        self.state().query_result = value;
    }

    /// The contents of a buffer object.
    pub fn buffer_contents(&self, buffer: GlName) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer).cloned()
    }

    /// Names created minus names deleted, for one object kind.
    pub fn live_objects(&self, kind: &str) -> usize {
        let state = self.state();
        let created = state
            .calls
            .iter()
            .filter(|c| matches!(c, GlCall::Create(k, _) if *k == kind))
            .count();
        let deleted = state
            .calls
            .iter()
            .filter(|c| matches!(c, GlCall::Delete(k, _) if *k == kind))
            .count();
        created.saturating_sub(deleted)
    }
}

impl GlApi for RecordingGl {
    fn get_error(&self) -> u32 {
        self.state().errors.pop_front().unwrap_or(glow::NO_ERROR)
    }

    fn enable(&self, capability: u32) {
        self.record(GlCall::Enable(capability));
    }

    fn disable(&self, capability: u32) {
        self.record(GlCall::Disable(capability));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear_depth(&self, depth: f32) {
        self.record(GlCall::ClearDepth(depth));
    }

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn blend_func(&self, src: u32, dst: u32) {
        self.record(GlCall::BlendFunc(src, dst));
    }

    fn blend_equation(&self, mode: u32) {
        self.record(GlCall::BlendEquation(mode));
    }

    fn pixel_store_i32(&self, _parameter: u32, _value: i32) {}

    fn finish(&self) {
        self.record(GlCall::Finish);
    }

    fn create_texture(&self) -> Result<GlName, String> {
        Ok(self.state().create("texture"))
    }

    fn delete_texture(&self, texture: GlName) {
        let mut state = self.state();
        state.texels.retain(|(name, _), _| *name != texture);
        state.calls.push(GlCall::Delete("texture", texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: GlName) {
        let mut state = self.state();
        state.bound_textures.insert(target, texture);
        state.calls.push(GlCall::BindTexture { target, texture });
    }

    fn tex_storage_2d(
        &self,
        target: u32,
        _levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        self.record(GlCall::TexStorage2D {
            target,
            internal_format,
            width,
            height,
        });
    }

    fn tex_sub_image_2d(
        &self,
        target: u32,
        _width: i32,
        _height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        let mut state = self.state();
        let texture = state.bound_texture(target);
        state.texels.insert((texture, target), pixels.to_vec());
        state.calls.push(GlCall::TexSubImage2D {
            target,
            format,
            ty,
            bytes: pixels.len(),
        });
    }

    fn tex_parameter_i32(&self, _target: u32, parameter: u32, value: i32) {
        self.record(GlCall::TexParameter { parameter, value });
    }

    fn get_tex_image(&self, target: u32, _format: u32, _ty: u32, out: &mut [u8]) {
        let state = self.state();
        let texture = state.bound_texture(target);
        if let Some(texels) = state.texels.get(&(texture, target)) {
            let n = texels.len().min(out.len());
            out[..n].copy_from_slice(&texels[..n]);
        }
    }

    fn bind_image_texture(&self, unit: u32, texture: GlName, access: u32, format: u32) {
        self.record(GlCall::BindImageTexture {
            unit,
            texture,
            access,
            format,
        });
    }

    fn create_buffer(&self) -> Result<GlName, String> {
        let mut state = self.state();
        let name = state.create("buffer");
        state.buffers.insert(name, Vec::new());
        Ok(name)
    }

    fn delete_buffer(&self, buffer: GlName) {
        let mut state = self.state();
        state.buffers.remove(&buffer);
        state.calls.push(GlCall::Delete("buffer", buffer));
    }

    fn bind_buffer(&self, target: u32, buffer: GlName) {
        self.state().bound_buffers.insert(target, buffer);
    }

    fn buffer_data_size(&self, target: u32, size: i32, _usage: u32) {
        let mut state = self.state();
        let size = size.max(0) as usize;
        if let Some(data) = state.bound_buffer_mut(target) {
            *data = vec![0; size];
        }
        state.calls.push(GlCall::BufferData { target, size });
    }

    fn buffer_data(&self, target: u32, data: &[u8], _usage: u32) {
        let mut state = self.state();
        if let Some(contents) = state.bound_buffer_mut(target) {
            *contents = data.to_vec();
        }
        state.calls.push(GlCall::BufferData {
            target,
            size: data.len(),
        });
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        let mut state = self.state();
        if let Some(contents) = state.bound_buffer_mut(target) {
            let start = offset.max(0) as usize;
            let end = (start + data.len()).min(contents.len());
            if start < end {
                contents[start..end].copy_from_slice(&data[..end - start]);
            }
        }
        state.calls.push(GlCall::BufferSubData {
            target,
            offset,
            size: data.len(),
        });
    }

    fn get_buffer_sub_data(&self, target: u32, offset: i32, out: &mut [u8]) {
        let mut state = self.state();
        if let Some(contents) = state.bound_buffer_mut(target) {
            let start = (offset.max(0) as usize).min(contents.len());
            let n = (contents.len() - start).min(out.len());
            out[..n].copy_from_slice(&contents[start..start + n]);
        }
    }

    fn copy_buffer_sub_data(
        &self,
        read_target: u32,
        write_target: u32,
        read_offset: i32,
        write_offset: i32,
        size: i32,
    ) {
        let mut state = self.state();
        let (ro, wo, n) = (
            read_offset.max(0) as usize,
            write_offset.max(0) as usize,
            size.max(0) as usize,
        );
        let source = state
            .bound_buffer_mut(read_target)
            .and_then(|src| src.get(ro..ro + n).map(<[u8]>::to_vec));
        if let (Some(source), Some(dst)) = (source, state.bound_buffer_mut(write_target)) {
            if let Some(window) = dst.get_mut(wo..wo + n) {
                window.copy_from_slice(&source);
            }
        }
        state.calls.push(GlCall::CopyBufferSubData {
            read_offset,
            write_offset,
            size,
        });
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: GlName) {
        self.record(GlCall::BindBufferBase {
            target,
            index,
            buffer,
        });
    }

    fn create_vertex_array(&self) -> Result<GlName, String> {
        Ok(self.state().create("vertex array"))
    }

    fn delete_vertex_array(&self, vertex_array: GlName) {
        self.record(GlCall::Delete("vertex array", vertex_array));
    }

    fn bind_vertex_array(&self, _vertex_array: GlName) {}

    fn enable_vertex_attrib_array(&self, _index: u32) {}

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        _ty: u32,
        _normalized: bool,
        _stride: i32,
        offset: i32,
    ) {
        self.record(GlCall::VertexAttribF32 {
            index,
            size,
            offset,
        });
    }

    fn vertex_attrib_pointer_i32(
        &self,
        index: u32,
        size: i32,
        _ty: u32,
        _stride: i32,
        offset: i32,
    ) {
        self.record(GlCall::VertexAttribI32 {
            index,
            size,
            offset,
        });
    }

    fn draw_elements_instanced(
        &self,
        _mode: u32,
        count: i32,
        _ty: u32,
        _offset: i32,
        instances: i32,
    ) {
        self.record(GlCall::DrawElementsInstanced { count, instances });
    }

    fn create_shader(&self, _stage: u32) -> Result<GlName, String> {
        Ok(self.state().create("shader"))
    }

    fn shader_source(&self, shader: GlName, source: &str) {
        self.state().shader_sources.insert(shader, source.to_owned());
    }

    fn compile_shader(&self, _shader: GlName) {}

    fn get_shader_compile_status(&self, shader: GlName) -> bool {
        self.state()
            .shader_sources
            .get(&shader)
            .is_some_and(|source| !source.contains("#error"))
    }

    fn get_shader_info_log(&self, shader: GlName) -> String {
        if self.get_shader_compile_status(shader) {
            String::new()
        } else {
            "0:1(1): error: #error directive".to_owned()
        }
    }

    fn delete_shader(&self, shader: GlName) {
        let mut state = self.state();
        state.shader_sources.remove(&shader);
        state.calls.push(GlCall::Delete("shader", shader));
    }

    fn create_program(&self) -> Result<GlName, String> {
        Ok(self.state().create("program"))
    }

    fn attach_shader(&self, program: GlName, shader: GlName) {
        self.record(GlCall::AttachShader { program, shader });
    }

    fn detach_shader(&self, _program: GlName, _shader: GlName) {}

    fn link_program(&self, program: GlName) {
        self.record(GlCall::LinkProgram(program));
    }

    fn get_program_link_status(&self, _program: GlName) -> bool {
        !self.state().fail_link
    }

    fn get_program_info_log(&self, _program: GlName) -> String {
        if self.state().fail_link {
            "error: vertex output 'uv' is not read by the fragment stage".to_owned()
        } else {
            String::new()
        }
    }

    fn delete_program(&self, program: GlName) {
        self.record(GlCall::Delete("program", program));
    }

    fn use_program(&self, program: GlName) {
        self.record(GlCall::UseProgram(program));
    }

    fn get_uniform_location(&self, _program: GlName, name: &str) -> Option<u32> {
        self.state().uniforms.get(name).copied()
    }

    fn uniform_f32(&self, location: u32, components: usize, values: &[f32]) {
        self.record(GlCall::UniformF32 {
            location,
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_i32(&self, location: u32, components: usize, values: &[i32]) {
        self.record(GlCall::UniformI32 {
            location,
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_matrix_f32(&self, location: u32, dimension: usize, values: &[f32]) {
        self.record(GlCall::UniformMatrix {
            location,
            dimension,
            values: values.to_vec(),
        });
    }

    fn create_framebuffer(&self) -> Result<GlName, String> {
        Ok(self.state().create("framebuffer"))
    }

    fn delete_framebuffer(&self, framebuffer: GlName) {
        self.record(GlCall::Delete("framebuffer", framebuffer));
    }

    fn bind_framebuffer(&self, _target: u32, framebuffer: GlName) {
        self.record(GlCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(
        &self,
        _target: u32,
        attachment: u32,
        _texture_target: u32,
        texture: GlName,
    ) {
        self.record(GlCall::FramebufferTexture {
            attachment,
            texture,
        });
    }

    fn check_framebuffer_status(&self, _target: u32) -> u32 {
        self.state().framebuffer_status
    }

    fn create_renderbuffer(&self) -> Result<GlName, String> {
        Ok(self.state().create("renderbuffer"))
    }

    fn delete_renderbuffer(&self, renderbuffer: GlName) {
        self.record(GlCall::Delete("renderbuffer", renderbuffer));
    }

    fn bind_renderbuffer(&self, _renderbuffer: GlName) {}

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        self.record(GlCall::RenderbufferStorage {
            internal_format,
            width,
            height,
        });
    }

    fn framebuffer_renderbuffer(&self, _target: u32, attachment: u32, renderbuffer: GlName) {
        self.record(GlCall::FramebufferRenderbuffer {
            attachment,
            renderbuffer,
        });
    }

    fn memory_barrier(&self, barriers: u32) {
        self.record(GlCall::MemoryBarrier(barriers));
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        self.record(GlCall::DispatchCompute(x, y, z));
    }

    fn create_query(&self) -> Result<GlName, String> {
        Ok(self.state().create("query"))
    }

    fn delete_query(&self, query: GlName) {
        self.record(GlCall::Delete("query", query));
    }

    fn query_counter(&self, query: GlName, _target: u32) {
        self.record(GlCall::QueryCounter(query));
    }

    fn get_query_parameter_u32(&self, _query: GlName, parameter: u32) -> u32 {
        match parameter {
            glow::QUERY_RESULT_AVAILABLE => 1,
            _ => self.state().query_result,
        }
    }
}
