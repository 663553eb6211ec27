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

//! Drives the direct-state backend through whole frames against the recorder.

use doos_core::renderer::api::*;
use doos_core::renderer::{RenderConfig, RendererType, NO_HANDLE};
use doos_core::RenderContext;
use doos_infra::graphics::gl::GlCall;
use doos_infra::{GlRenderContext, RecordingGl};

const VS: &str = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";
const FS: &str = "#version 450\nout vec4 color;\nvoid main() { color = vec4(1.0); }\n";
const CS: &str = "#version 450\nlayout(local_size_x = 64) in;\nvoid main() {}\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_compute_then_render_frame() {
    init_logging();
    let gl = RecordingGl::new();
    gl.declare_uniform("Scale");
    let mut ctx = GlRenderContext::new(gl.clone(), RenderConfig::default());

    let cs = ctx.add_shader(CS, ShaderStage::Compute, "scale.cs").unwrap();
    let compute = ctx.add_program(NO_HANDLE, NO_HANDLE, cs).unwrap();
    let vs = ctx.add_shader(VS, ShaderStage::Vertex, "quad.vs").unwrap();
    let fs = ctx.add_shader(FS, ShaderStage::Fragment, "quad.fs").unwrap();
    let draw = ctx.add_program(vs, fs, NO_HANDLE).unwrap();

    let particles = ctx
        .add_buffer_object(Some(bytemuck::cast_slice(&[1.0f32; 64])), 256)
        .unwrap();
    let scale = ctx.add_uniform("Scale", UniformType::Real, 1);
    ctx.set_uniform(scale, &2.0f32.to_le_bytes());

    let quad = ctx.add_geometry(VertexLayout::Standard);
    {
        let lock = ctx
            .geometry_begin(quad, 4, 6, GeometryStreams::VERTEX | GeometryStreams::INDEX)
            .unwrap();
        lock.vertices.unwrap().fill(0.5);
        lock.indices.unwrap().copy_from_slice(&[0, 1, 2, 2, 3, 0]);
    }
    ctx.geometry_end(quad).unwrap();

    ctx.frame_begin(RenderDrawables::none()).unwrap();

    ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
    ctx.bind_program(compute).unwrap();
    ctx.bind_uniform(compute, scale).unwrap();
    ctx.bind_buffer_object(particles, 0, BindTarget::Default);
    ctx.dispatch_compute([1, 1, 1], [64, 1, 1]).unwrap();
    ctx.renderpass_end().unwrap();

    ctx.renderpass_begin(&RenderPassDescriptor {
        w: 640,
        h: 480,
        ..RenderPassDescriptor::default()
    })
    .unwrap();
    ctx.bind_program(draw).unwrap();
    ctx.geometry_draw(quad).unwrap();
    ctx.renderpass_end().unwrap();

    ctx.frame_end(true).unwrap();

    let calls = gl.calls();
    let position = |wanted: &GlCall| calls.iter().position(|c| c == wanted);
    let dispatch = position(&GlCall::DispatchCompute(1, 1, 1)).unwrap();
    let viewport = position(&GlCall::Viewport(0, 0, 640, 480)).unwrap();
    let drawn = position(&GlCall::DrawElementsInstanced {
        count: 6,
        instances: 1,
    })
    .unwrap();
    let finish = position(&GlCall::Finish).unwrap();
    assert!(dispatch < viewport && viewport < drawn && drawn < finish);

    assert!(calls.contains(&GlCall::UniformF32 {
        location: 0,
        components: 1,
        values: vec![2.0],
    }));
    assert!(calls.iter().any(|c| matches!(
        c,
        GlCall::BindBufferBase { index: 0, target, .. } if *target == glow::SHADER_STORAGE_BUFFER
    )));

    ctx.destroy();
    assert_eq!(gl.live_objects("buffer"), 0);
    assert_eq!(gl.live_objects("program"), 0);
    assert_eq!(gl.live_objects("shader"), 0);
}

#[test]
fn test_frames_alternate_with_the_throttle() {
    init_logging();
    let mut ctx = GlRenderContext::new(RecordingGl::new(), RenderConfig::default());
    for _ in 0..3 {
        ctx.frame_begin(RenderDrawables::none()).unwrap();
        ctx.renderpass_begin(&RenderPassDescriptor::default()).unwrap();
        ctx.renderpass_end().unwrap();
        ctx.frame_end(false).unwrap();
    }
}

#[test]
fn test_context_is_usable_as_a_trait_object() {
    init_logging();
    let mut ctx: Box<dyn RenderContext> =
        Box::new(GlRenderContext::new(RecordingGl::new(), RenderConfig::default()));
    let texels = [0x11u8, 0x22, 0x33, 0x44];
    let h = ctx
        .add_texture(
            1,
            1,
            TextureFormat::Rgba8ui,
            Some(TextureData::Bytes(&texels)),
            TextureUsage::READ,
        )
        .unwrap();
    let mut out = [0u8; 4];
    ctx.get_data_from_texture(h, &mut out);
    assert_eq!(out, texels);
    assert_eq!(ctx.backend(), RendererType::OpenGl);
}
