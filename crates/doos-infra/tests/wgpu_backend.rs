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

//! Runs the command-buffer backend on a real adapter. Every test is skipped
//! when the machine has none.

use doos_core::renderer::api::*;
use doos_core::renderer::handle::{Handle, MAX_BUFFER_OBJECTS};
use doos_core::renderer::{RenderConfig, RendererType, NO_HANDLE};
use doos_core::{RenderContext, RenderError};
use doos_infra::WgpuRenderContext;

const QUAD_VS: &str = r#"
@group(0) @binding(0) var<storage, read> vertices: array<f32>;

@vertex
fn main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    let base = i * 8u;
    return vec4<f32>(vertices[base], vertices[base + 1u], vertices[base + 2u], 1.0);
}
"#;

const SOLID_FS: &str = r#"
struct Uniforms {
    color: vec4<f32>,
}
@group(0) @binding(10) var<uniform> u: Uniforms;

@fragment
fn main() -> @location(0) vec4<f32> {
    return u.color;
}
"#;

const GREEN_FS: &str = r#"
@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0, 1.0, 0.0, 1.0);
}
"#;

const DOUBLE_CS: &str = r#"
@group(2) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    data[id.x] = data[id.x] * 2u;
}
"#;

const FILL_CS: &str = r#"
@group(1) @binding(0) var img: texture_storage_2d<r32float, write>;

@compute @workgroup_size(1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    textureStore(img, vec2<i32>(id.xy), vec4<f32>(2.5, 0.0, 0.0, 0.0));
}
"#;

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_test_context() -> Option<WgpuRenderContext> {
    init_logging();
    WgpuRenderContext::headless(RenderConfig::default()).ok()
}

macro_rules! context_or_skip {
    ($name:literal) => {
        match create_test_context() {
            Some(ctx) => ctx,
            None => {
                println!("Skipping {}: could not create test device.", $name);
                return;
            }
        }
    };
}

#[test]
fn test_texture_round_trip() {
    let mut ctx = context_or_skip!("test_texture_round_trip");
    assert_eq!(ctx.backend(), RendererType::Wgpu);

    let texels: Vec<u8> = (0..36).collect();
    let h = ctx
        .add_texture(
            3,
            3,
            TextureFormat::Rgba8,
            Some(TextureData::Bytes(&texels)),
            TextureUsage::READ,
        )
        .unwrap();
    assert_ne!(h, NO_HANDLE);

    let mut out = [0u8; 36];
    ctx.get_data_from_texture(h, &mut out);
    assert_eq!(out.to_vec(), texels);

    let replaced = vec![200u8; 36];
    assert!(ctx.update_texture(h, TextureData::Bytes(&replaced)).unwrap());
    ctx.get_data_from_texture(h, &mut out);
    assert_eq!(out.to_vec(), replaced);

    // Too little data leaves the texture alone.
    assert!(!ctx.update_texture(h, TextureData::Bytes(&[1, 2, 3])).unwrap());
    ctx.destroy();
}

#[test]
fn test_float_texture_reads_back_narrowed() {
    let mut ctx = context_or_skip!("test_float_texture_reads_back_narrowed");
    let floats = [1.0f32, 0.0, 0.5, 1.0];
    let h = ctx
        .add_texture(
            1,
            1,
            TextureFormat::Rgba32f,
            Some(TextureData::Floats(&floats)),
            TextureUsage::READ,
        )
        .unwrap();
    let mut out = [0u8; 4];
    ctx.get_data_from_texture(h, &mut out);
    assert_eq!(out[0], 255);
    assert_eq!(out[1], 0);
    assert!((127..=128).contains(&out[2]));
    assert_eq!(out[3], 255);
}

#[test]
fn test_invalid_textures_are_refused() {
    let mut ctx = context_or_skip!("test_invalid_textures_are_refused");
    let none = ctx
        .add_texture(4, 4, TextureFormat::None, None, TextureUsage::READ)
        .unwrap();
    assert_eq!(none, NO_HANDLE);
    let empty = ctx
        .add_texture(0, 4, TextureFormat::Rgba8, None, TextureUsage::READ)
        .unwrap();
    assert_eq!(empty, NO_HANDLE);
}

#[test]
fn test_buffer_round_trip_and_copy() {
    let mut ctx = context_or_skip!("test_buffer_round_trip_and_copy");
    let values: Vec<u32> = (1..=8).collect();
    let src = ctx
        .add_buffer_object(Some(bytemuck::cast_slice(&values)), 32)
        .unwrap();
    let dst = ctx.add_buffer_object(None, 32).unwrap();
    assert_eq!(
        ctx.get_buffer_object(src),
        Some(BufferInfo {
            kind: BufferKind::Compute,
            size: 32
        })
    );

    let mut out = [0u8; 32];
    ctx.get_data_from_buffer_object(src, &mut out);
    assert_eq!(words(&out), values);

    ctx.copy_buffer_object_data(src, dst, 8, 0, 16).unwrap();
    ctx.get_data_from_buffer_object(dst, &mut out);
    assert_eq!(&words(&out)[..4], &[3, 4, 5, 6]);

    // A different size replaces the storage.
    ctx.update_buffer_object(dst, &[1u8; 12]).unwrap();
    assert_eq!(ctx.get_buffer_object(dst).map(|b| b.size), Some(12));
    let mut small = [0u8; 12];
    ctx.get_data_from_buffer_object(dst, &mut small);
    assert_eq!(small, [1u8; 12]);
}

#[test]
fn test_quad_renders_into_frame_buffer() {
    let mut ctx = context_or_skip!("test_quad_renders_into_frame_buffer");
    let fb = ctx.add_frame_buffer(4, 4, true).unwrap();
    let info = ctx.get_frame_buffer(fb).unwrap();
    assert!(info.has_depth_texture());
    assert_eq!(info.render_buffer, NO_HANDLE);
    assert_eq!(ctx.add_render_buffer().unwrap(), NO_HANDLE);

    let vs = ctx.add_shader(QUAD_VS, ShaderStage::Vertex, "quad.vs").unwrap();
    let fs = ctx
        .add_shader(SOLID_FS, ShaderStage::Fragment, "solid.fs")
        .unwrap();
    let program = ctx.add_program(vs, fs, NO_HANDLE).unwrap();
    assert_ne!(program, NO_HANDLE);

    let color = ctx.add_uniform("color", UniformType::Vec4, 1);
    ctx.set_uniform(color, bytemuck::cast_slice(&[1.0f32, 0.0, 0.0, 1.0]));

    let quad = ctx.add_geometry(VertexLayout::Standard);
    {
        let lock = ctx
            .geometry_begin(quad, 4, 6, GeometryStreams::VERTEX | GeometryStreams::INDEX)
            .unwrap();
        let vertices = lock.vertices.unwrap();
        for (i, (x, y)) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .enumerate()
        {
            vertices[i * 8] = x;
            vertices[i * 8 + 1] = y;
        }
        lock.indices.unwrap().copy_from_slice(&[0, 1, 2, 2, 3, 0]);
    }
    ctx.geometry_end(quad).unwrap();

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor {
        frame_buffer_handle: fb,
        clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
        clear_color: 0xff00_ff00,
        ..Default::default()
    })
    .unwrap();
    ctx.bind_program(program).unwrap();
    ctx.bind_uniform(program, color).unwrap();
    ctx.geometry_draw(quad).unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();

    let mut pixels = [0u8; 64];
    ctx.get_data_from_texture(info.texture, &mut pixels);
    for texel in pixels.chunks_exact(4) {
        assert_eq!(texel, [255, 0, 0, 255]);
    }

    ctx.remove_geometry(quad);
    ctx.remove_frame_buffer(fb);
    assert!(ctx.get_texture(info.texture).is_none());
    assert!(ctx.get_texture(info.depth_texture).is_none());
}

fn fill_quad(ctx: &mut WgpuRenderContext) -> Handle {
    let quad = ctx.add_geometry(VertexLayout::Standard);
    {
        let lock = ctx
            .geometry_begin(quad, 4, 6, GeometryStreams::VERTEX | GeometryStreams::INDEX)
            .unwrap();
        let vertices = lock.vertices.unwrap();
        for (i, (x, y)) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .enumerate()
        {
            vertices[i * 8] = x;
            vertices[i * 8 + 1] = y;
        }
        lock.indices.unwrap().copy_from_slice(&[0, 1, 2, 2, 3, 0]);
    }
    ctx.geometry_end(quad).unwrap();
    quad
}

fn draw_frame(ctx: &mut WgpuRenderContext, fb: Handle, program: Handle, quad: Handle) {
    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor {
        frame_buffer_handle: fb,
        clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
        clear_color: 0xffff_0000,
        ..Default::default()
    })
    .unwrap();
    ctx.bind_program(program).unwrap();
    ctx.geometry_draw(quad).unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();
}

#[test]
fn test_removed_shader_stops_drawing_until_relinked() {
    let mut ctx = context_or_skip!("test_removed_shader_stops_drawing_until_relinked");
    let fb = ctx.add_frame_buffer(2, 2, true).unwrap();
    let texture = ctx.get_frame_buffer(fb).unwrap().texture;
    let quad = fill_quad(&mut ctx);
    let mut pixels = [0u8; 16];

    let vs = ctx.add_shader(QUAD_VS, ShaderStage::Vertex, "quad.vs").unwrap();
    let fs = ctx
        .add_shader(SOLID_FS, ShaderStage::Fragment, "solid.fs")
        .unwrap();
    let program = ctx.add_program(vs, fs, NO_HANDLE).unwrap();
    let color = ctx.add_uniform("color", UniformType::Vec4, 1);
    ctx.set_uniform(color, bytemuck::cast_slice(&[1.0f32, 0.0, 0.0, 1.0]));

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor {
        frame_buffer_handle: fb,
        clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
        ..Default::default()
    })
    .unwrap();
    ctx.bind_program(program).unwrap();
    ctx.bind_uniform(program, color).unwrap();
    ctx.geometry_draw(quad).unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();
    ctx.get_data_from_texture(texture, &mut pixels);
    assert_eq!(&pixels[..4], &[255, 0, 0, 255]);

    // The program is unlinked: only the clear (blue) lands.
    ctx.remove_shader(fs);
    draw_frame(&mut ctx, fb, program, quad);
    ctx.get_data_from_texture(texture, &mut pixels);
    assert_eq!(&pixels[..4], &[0, 0, 255, 255]);

    // Same name and slot, new source: a stale pipeline would still draw red.
    let green = ctx
        .add_shader(GREEN_FS, ShaderStage::Fragment, "solid.fs")
        .unwrap();
    assert_eq!(green, fs);
    let relinked = ctx.add_program(vs, green, NO_HANDLE).unwrap();
    draw_frame(&mut ctx, fb, relinked, quad);
    ctx.get_data_from_texture(texture, &mut pixels);
    for texel in pixels.chunks_exact(4) {
        assert_eq!(texel, [0, 255, 0, 255]);
    }
}

#[test]
fn test_geometry_begin_out_of_buffers_leaves_geometry_unlocked() {
    let mut ctx = context_or_skip!("test_geometry_begin_out_of_buffers_leaves_geometry_unlocked");
    let g = ctx.add_geometry(VertexLayout::Standard);
    for _ in 0..MAX_BUFFER_OBJECTS - 1 {
        assert_ne!(ctx.add_buffer_object(None, 4).unwrap(), NO_HANDLE);
    }
    let streams = GeometryStreams::VERTEX | GeometryStreams::INDEX;

    let err = ctx.geometry_begin(g, 4, 6, streams).map(|_| ());
    assert!(matches!(err, Err(RenderError::OutOfMemory { .. })));
    // Nothing was left locked, so removal and a retry both work.
    ctx.remove_buffer_object(0);
    {
        let lock = ctx.geometry_begin(g, 4, 6, streams).unwrap();
        assert_eq!(lock.indices.unwrap().len(), 6);
    }
    ctx.geometry_end(g).unwrap();
    ctx.remove_geometry(g);
}

#[test]
fn test_clear_only_pass() {
    let mut ctx = context_or_skip!("test_clear_only_pass");
    let fb = ctx.add_frame_buffer(2, 2, false).unwrap();
    let texture = ctx.get_frame_buffer(fb).unwrap().texture;

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor {
        frame_buffer_handle: fb,
        clear_flags: ClearFlags::COLOR,
        clear_color: 0xff20_4080,
        ..Default::default()
    })
    .unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();

    let mut pixels = [0u8; 16];
    ctx.get_data_from_texture(texture, &mut pixels);
    assert_eq!(&pixels[..4], &[0x80, 0x40, 0x20, 0xff]);
}

#[test]
fn test_compute_doubles_buffer() {
    let mut ctx = context_or_skip!("test_compute_doubles_buffer");
    let values: Vec<u32> = (0..16).collect();
    let data = ctx
        .add_buffer_object(Some(bytemuck::cast_slice(&values)), 64)
        .unwrap();
    let cs = ctx
        .add_shader(DOUBLE_CS, ShaderStage::Compute, "double.cs")
        .unwrap();
    let program = ctx.add_program(NO_HANDLE, NO_HANDLE, cs).unwrap();

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
    ctx.bind_program(program).unwrap();
    ctx.bind_buffer_object(data, 0, BindTarget::Default);
    ctx.dispatch_compute([1, 1, 1], [16, 1, 1]).unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();

    let mut out = [0u8; 64];
    ctx.get_data_from_buffer_object(data, &mut out);
    let doubled: Vec<u32> = values.iter().map(|v| v * 2).collect();
    assert_eq!(words(&out), doubled);
}

#[test]
fn test_compute_writes_storage_texture() {
    let mut ctx = context_or_skip!("test_compute_writes_storage_texture");
    let image = ctx
        .add_texture(2, 2, TextureFormat::R32f, None, TextureUsage::WRITE)
        .unwrap();
    let cs = ctx.add_shader(FILL_CS, ShaderStage::Compute, "fill.cs").unwrap();
    let program = ctx.add_program(NO_HANDLE, NO_HANDLE, cs).unwrap();

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
    ctx.bind_program(program).unwrap();
    ctx.bind_texture_to_channel(image, 0, SamplerFlags::WRITE);
    ctx.dispatch_compute([2, 2, 1], [1, 1, 1]).unwrap();
    ctx.renderpass_end().unwrap();
    ctx.frame_end(true).unwrap();

    let mut out = [0u8; 16];
    ctx.get_data_from_texture(image, &mut out);
    for texel in words(&out) {
        approx::assert_relative_eq!(f32::from_bits(texel), 2.5);
    }
}

#[test]
fn test_shader_errors_and_dedupe() {
    let mut ctx = context_or_skip!("test_shader_errors_and_dedupe");
    let err = ctx.add_shader("fn broken(", ShaderStage::Vertex, "broken.vs");
    assert!(matches!(err, Err(RenderError::ShaderCompilation { .. })));

    let first = ctx.add_shader(QUAD_VS, ShaderStage::Vertex, "quad.vs").unwrap();
    let again = ctx.add_shader(QUAD_VS, ShaderStage::Vertex, "quad.vs").unwrap();
    assert_eq!(first, again);

    // A compute program needs a compute shader.
    let wrong = ctx.add_program(NO_HANDLE, NO_HANDLE, first).unwrap();
    ctx.bind_program(wrong).unwrap();
    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
    ctx.dispatch_compute([1, 1, 1], [1, 1, 1]).unwrap();
    ctx.frame_end(true).unwrap();
}

#[test]
fn test_queries_record_increasing_times() {
    let mut ctx = context_or_skip!("test_queries_record_increasing_times");
    let a = ctx.add_query();
    let b = ctx.add_query();
    ctx.query_timestamp(a);
    std::thread::sleep(std::time::Duration::from_millis(2));
    ctx.query_timestamp(b);
    assert!(ctx.get_query_result(b) > ctx.get_query_result(a));
    assert_eq!(ctx.get_query_result(99), u64::MAX);
}

#[test]
fn test_queries_inside_a_frame_resolve_after_submit() {
    let mut ctx = context_or_skip!("test_queries_inside_a_frame_resolve_after_submit");
    let in_pass = ctx.add_query();
    let after_pass = ctx.add_query();
    let never = ctx.add_query();

    ctx.frame_begin(RenderDrawables::none()).unwrap();
    ctx.renderpass_begin(&RenderPassDescriptor::compute()).unwrap();
    ctx.query_timestamp(in_pass);
    ctx.renderpass_end().unwrap();
    ctx.query_timestamp(after_pass);
    if ctx.has_device_timestamps() {
        assert_eq!(ctx.get_query_result(after_pass), 0);
    }
    ctx.frame_end(true).unwrap();

    let first = ctx.get_query_result(in_pass);
    let second = ctx.get_query_result(after_pass);
    assert!(second >= first);
    assert_ne!(second, u64::MAX);
    // A resolved value is kept.
    assert_eq!(ctx.get_query_result(after_pass), second);
    assert_eq!(ctx.get_query_result(never), 0);

    ctx.remove_query(in_pass);
    assert_eq!(ctx.get_query_result(in_pass), u64::MAX);
}
